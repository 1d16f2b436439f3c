//! Primary archiving service (Wayback-style)
//!
//! Submission flow:
//! 1. Query the availability API; a closest snapshot short-circuits to
//!    `AlreadyArchived` without touching the submission bucket
//! 2. POST the target to the save endpoint under the retry policy
//! 3. Find the archive URL (final URL of the save, else the availability API)
//! 4. GET the archive URL once to confirm it resolves (enhanced mode)
//!
//! Steps 1, 3 and 4 are reads and draw from the service's check bucket.

use crate::config::DispatchMode;
use crate::dispatch::{Executor, HttpRequest, RateLimiter};
use crate::outcome::{LookupResult, Outcome, SourceLookup, SubmissionAttempt, SubmissionResult};
use crate::services::context::{failure_detail, AdapterContext};
use crate::services::{ServiceAdapter, ServiceProfile};
use crate::url::origin_of;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tokio::time::Instant;
use url::Url;

#[derive(Debug, Deserialize)]
struct Availability {
    #[serde(default)]
    archived_snapshots: ArchivedSnapshots,
}

#[derive(Debug, Default, Deserialize)]
struct ArchivedSnapshots {
    closest: Option<Snapshot>,
}

/// Closest snapshot reported by the availability API
#[derive(Debug, Clone, Deserialize)]
struct Snapshot {
    #[serde(default)]
    available: bool,
    #[serde(default)]
    url: String,
    #[serde(default)]
    timestamp: Option<String>,
}

fn parse_availability(body: &str) -> Option<Snapshot> {
    let availability: Availability = serde_json::from_str(body).ok()?;
    availability
        .archived_snapshots
        .closest
        .filter(|snapshot| snapshot.available && !snapshot.url.is_empty())
}

/// Adapter for a service with an availability API and a save endpoint
pub struct WaybackAdapter {
    ctx: AdapterContext,
}

impl WaybackAdapter {
    pub fn new(
        profile: ServiceProfile,
        mode: DispatchMode,
        limiter: Arc<RateLimiter>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        Self {
            ctx: AdapterContext::new(profile, mode, limiter, executor),
        }
    }

    /// Queries the availability API
    ///
    /// # Returns
    ///
    /// * `None` - No check endpoint is configured
    /// * `Some((attempt, snapshot))` - The check attempt and the closest snapshot, if any
    async fn availability(
        &self,
        target: &Url,
        deadline: Option<Instant>,
    ) -> Option<(SubmissionAttempt, Option<Snapshot>)> {
        let template = self.ctx.profile.check_endpoint.as_deref()?;
        let url = self
            .ctx
            .profile
            .expand(template, target, &self.ctx.profile.primary_origin());

        let attempt = self.ctx.send_check(&self.ctx.get(url), deadline).await;
        let snapshot = if attempt.outcome == Outcome::Success {
            parse_availability(&attempt.body)
        } else {
            None
        };
        Some((attempt, snapshot))
    }

    /// Finds and confirms the archive URL after an accepted submission
    async fn confirm(
        &self,
        target: &Url,
        final_url: Option<String>,
        mut calls: u32,
        started: Instant,
        deadline: Option<Instant>,
    ) -> SubmissionResult {
        let name = self.ctx.name();
        let rules = &self.ctx.profile.rules;
        let mut archive_url = final_url.filter(|url| rules.is_archive_url(url));

        if !self.ctx.verifies() {
            return SubmissionResult::new(
                name,
                Outcome::Success,
                calls,
                started.elapsed(),
                archive_url,
                "Submitted (not verified)",
            );
        }

        if archive_url.is_none() {
            if let Some((check, snapshot)) = self.availability(target, deadline).await {
                calls += 1;
                if check.outcome == Outcome::Timeout {
                    return SubmissionResult::timeout(name, calls, started.elapsed());
                }
                archive_url = snapshot.map(|s| s.url);
            }
        }

        let Some(url) = archive_url else {
            return SubmissionResult::new(
                name,
                Outcome::TransientError,
                calls,
                started.elapsed(),
                None,
                "Submission accepted but the archived copy is not yet confirmed",
            );
        };

        let check = self.ctx.send_check(&self.ctx.get(url.clone()), deadline).await;
        calls += 1;

        match check.outcome {
            Outcome::Success | Outcome::AlreadyArchived => {
                tracing::info!("{} archived {} at {}", name, target, url);
                SubmissionResult::new(
                    name,
                    Outcome::Success,
                    calls,
                    started.elapsed(),
                    Some(url),
                    "Archived and verified",
                )
            }
            Outcome::Timeout => SubmissionResult::new(
                name,
                Outcome::Timeout,
                calls,
                started.elapsed(),
                Some(url),
                "Deadline reached while confirming the archived copy",
            ),
            _ => SubmissionResult::new(
                name,
                Outcome::TransientError,
                calls,
                started.elapsed(),
                Some(url),
                format!(
                    "Submission accepted but the archived copy is not yet confirmed: {}",
                    check.describe()
                ),
            ),
        }
    }
}

#[async_trait]
impl ServiceAdapter for WaybackAdapter {
    fn name(&self) -> &str {
        self.ctx.name()
    }

    fn profile(&self) -> &ServiceProfile {
        &self.ctx.profile
    }

    async fn submit(&self, target: &Url, deadline: Option<Instant>) -> SubmissionResult {
        let started = Instant::now();
        let name = self.ctx.name();
        let mut calls = 0;

        if let Some((check, snapshot)) = self.availability(target, deadline).await {
            calls += 1;
            if check.outcome == Outcome::Timeout {
                return SubmissionResult::timeout(name, calls, started.elapsed());
            }
            if let Some(snapshot) = snapshot {
                tracing::info!("{} already holds {}: {}", name, target, snapshot.url);
                return SubmissionResult::new(
                    name,
                    Outcome::AlreadyArchived,
                    calls,
                    started.elapsed(),
                    Some(snapshot.url),
                    format!(
                        "Already archived (snapshot {})",
                        snapshot.timestamp.as_deref().unwrap_or("of unknown date")
                    ),
                );
            }
            if !check.outcome.is_success() {
                tracing::debug!(
                    "{} availability check failed ({}); submitting anyway",
                    name,
                    check.describe()
                );
            }
        }

        let Some(endpoint) = self.ctx.profile.endpoints.first() else {
            return SubmissionResult::new(
                name,
                Outcome::PermanentError,
                calls,
                started.elapsed(),
                None,
                "No submission endpoint configured",
            );
        };

        let origin = origin_of(endpoint);
        let submit_url = self.ctx.profile.expand(endpoint, target, &origin);
        let timeout = self.ctx.profile.timeout;

        tracing::debug!("{} submitting {} to {}", name, target, submit_url);
        let run = self
            .ctx
            .send_with_retry(deadline, |_, _| {
                HttpRequest::post_form(
                    submit_url.clone(),
                    vec![("url".to_string(), target.to_string())],
                    timeout,
                )
                .with_header("Referer", &origin)
            })
            .await;
        calls += run.attempts;

        match run.outcome() {
            Outcome::Success => {
                self.confirm(target, run.last.final_url, calls, started, deadline)
                    .await
            }
            Outcome::AlreadyArchived => {
                let rules = &self.ctx.profile.rules;
                let archive_url = run.last.final_url.filter(|url| rules.is_archive_url(url));
                SubmissionResult::new(
                    name,
                    Outcome::AlreadyArchived,
                    calls,
                    started.elapsed(),
                    archive_url,
                    "Already archived",
                )
            }
            outcome => {
                tracing::warn!("{} failed for {}: {}", name, target, run.last.describe());
                SubmissionResult::new(
                    name,
                    outcome,
                    calls,
                    started.elapsed(),
                    None,
                    failure_detail(&run),
                )
            }
        }
    }

    async fn lookup(&self, target: &Url, deadline: Option<Instant>) -> LookupResult {
        let started = Instant::now();
        let mut sources = Vec::new();

        if let Some((check, snapshot)) = self.availability(target, deadline).await {
            sources.push(match snapshot {
                Some(snapshot) => SourceLookup {
                    source: "availability".to_string(),
                    outcome: Outcome::Success,
                    message: format!(
                        "Closest snapshot {}",
                        snapshot.timestamp.as_deref().unwrap_or("of unknown date")
                    ),
                    snapshots: vec![snapshot.url],
                },
                None if check.outcome.is_success() => SourceLookup {
                    source: "availability".to_string(),
                    outcome: Outcome::Success,
                    snapshots: Vec::new(),
                    message: "No snapshot found".to_string(),
                },
                None => SourceLookup {
                    source: "availability".to_string(),
                    outcome: check.outcome,
                    snapshots: Vec::new(),
                    message: check.describe(),
                },
            });
        }

        if let Some(template) = &self.ctx.profile.lookup_endpoint {
            let link = self
                .ctx
                .profile
                .expand(template, target, &self.ctx.profile.primary_origin());
            sources.push(self.ctx.listing_source("listing", vec![link]));
        }

        LookupResult {
            service: self.ctx.name().to_string(),
            sources,
            elapsed: started.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MarkerConfig, ServiceConfig, ServiceKind};
    use crate::dispatch::testing::{Reply, ScriptedExecutor};
    use crate::dispatch::{BucketSpec, Method};
    use std::time::Duration;

    const ARCHIVED: &str = r#"{"archived_snapshots":{"closest":{"available":true,"url":"https://web.archive.test/web/20240101000000/https://example.com/","timestamp":"20240101000000","status":"200"}}}"#;
    const NOT_ARCHIVED: &str = r#"{"url":"https://example.com/","archived_snapshots":{}}"#;

    fn profile() -> ServiceProfile {
        ServiceProfile::from_config(&ServiceConfig {
            name: "wayback".to_string(),
            kind: ServiceKind::Primary,
            rate: 100.0,
            burst: 10,
            timeout_ms: 5_000,
            endpoints: vec!["https://web.archive.test/save/".to_string()],
            check_endpoint: Some("https://api.archive.test/available?url={url_encoded}".to_string()),
            lookup_endpoint: Some("https://web.archive.test/web/*/{url}".to_string()),
            retry_schedule_ms: vec![5_000, 10_000],
            max_total_wait_ms: 60_000,
            max_attempts: 3,
            shuffle_mirrors: false,
            markers: MarkerConfig {
                archive_url: vec!["/web/".to_string()],
                ..MarkerConfig::default()
            },
            sources: vec![],
        })
    }

    fn adapter(executor: Arc<ScriptedExecutor>, mode: DispatchMode) -> (WaybackAdapter, Arc<RateLimiter>) {
        let limiter = Arc::new(
            RateLimiter::new(BucketSpec::new(1.0, 1))
                .with_bucket("wayback", BucketSpec::new(100.0, 10))
                .with_bucket("wayback:check", BucketSpec::new(100.0, 10)),
        );
        let adapter = WaybackAdapter::new(profile(), mode, Arc::clone(&limiter), executor);
        (adapter, limiter)
    }

    fn target() -> Url {
        Url::parse("https://example.com/").unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_archived_uses_one_slot() {
        let executor = Arc::new(ScriptedExecutor::new(|_, _| Reply::ok(ARCHIVED)));
        let (adapter, limiter) = adapter(executor.clone(), DispatchMode::Enhanced);

        let result = adapter.submit(&target(), None).await;

        assert_eq!(result.outcome, Outcome::AlreadyArchived);
        assert_eq!(limiter.grants("wayback"), 0);
        assert_eq!(limiter.grants("wayback:check"), 1);
        assert_eq!(executor.calls(), 1);
        assert_eq!(
            result.archive_url.as_deref(),
            Some("https://web.archive.test/web/20240101000000/https://example.com/")
        );
        assert!(result.message.contains("20240101000000"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_availability_check_spares_submission_bucket() {
        let executor = Arc::new(ScriptedExecutor::new(|request, _| {
            if request.url.starts_with("https://api.archive.test/") {
                Reply::ok(NOT_ARCHIVED)
            } else {
                Reply::ok("saved")
            }
        }));
        let limiter = Arc::new(
            RateLimiter::new(BucketSpec::new(1.0, 1))
                .with_bucket("wayback", BucketSpec::new(0.2, 1))
                .with_bucket("wayback:check", BucketSpec::new(0.2, 1)),
        );
        let adapter = WaybackAdapter::new(profile(), DispatchMode::Basic, Arc::clone(&limiter), executor.clone());
        let started = Instant::now();
        let deadline = started + Duration::from_secs(2);

        let result = adapter.submit(&target(), Some(deadline)).await;

        assert_eq!(result.outcome, Outcome::Success);
        assert_eq!(executor.calls(), 2);
        assert_eq!(limiter.grants("wayback"), 1);
        assert_eq!(limiter.grants("wayback:check"), 1);
        // No refill wait between the check and the save
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_redirect_is_verified() {
        let executor = Arc::new(ScriptedExecutor::new(|request, _| {
            if request.url.starts_with("https://api.archive.test/") {
                Reply::ok(NOT_ARCHIVED)
            } else if request.method == Method::Post {
                Reply::ok("saved").with_final_url(
                    "https://web.archive.test/web/20240102000000/https://example.com/",
                )
            } else {
                Reply::ok("<html>archived copy</html>")
            }
        }));
        let (adapter, _limiter) = adapter(executor.clone(), DispatchMode::Enhanced);

        let result = adapter.submit(&target(), None).await;

        assert_eq!(result.outcome, Outcome::Success);
        assert_eq!(result.attempts, 3);
        assert_eq!(result.message, "Archived and verified");

        let requests = executor.requests();
        assert_eq!(requests[1].form_value("url"), Some("https://example.com/"));
        assert_eq!(
            requests[2].url,
            "https://web.archive.test/web/20240102000000/https://example.com/"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unconfirmed_archive_is_transient() {
        let executor = Arc::new(ScriptedExecutor::new(|request, _| {
            if request.url.starts_with("https://api.archive.test/") {
                Reply::ok(NOT_ARCHIVED)
            } else {
                Reply::ok("job queued")
            }
        }));
        let (adapter, _limiter) = adapter(executor, DispatchMode::Enhanced);

        let result = adapter.submit(&target(), None).await;

        assert_eq!(result.outcome, Outcome::TransientError);
        assert!(result.message.contains("not yet confirmed"));
        assert!(result.message.contains("may succeed if retried later"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_basic_mode_skips_verification_and_retries() {
        let executor = Arc::new(ScriptedExecutor::new(|request, _| {
            if request.url.starts_with("https://api.archive.test/") {
                Reply::ok(NOT_ARCHIVED)
            } else {
                Reply::status(503)
            }
        }));
        let (adapter, _limiter) = adapter(executor.clone(), DispatchMode::Basic);

        let result = adapter.submit(&target(), None).await;

        assert_eq!(result.outcome, Outcome::TransientError);
        assert_eq!(executor.calls(), 2);
        assert_eq!(result.attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_is_reported() {
        let executor = Arc::new(ScriptedExecutor::new(|request, _| {
            if request.url.starts_with("https://api.archive.test/") {
                Reply::ok(NOT_ARCHIVED)
            } else {
                Reply::status(403)
            }
        }));
        let (adapter, _limiter) = adapter(executor.clone(), DispatchMode::Enhanced);

        let result = adapter.submit(&target(), None).await;

        assert_eq!(result.outcome, Outcome::PermanentError);
        assert_eq!(executor.calls(), 2);
        assert!(result.message.contains("will not succeed if retried"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_during_retries_reports_timeout() {
        let executor = Arc::new(ScriptedExecutor::new(|request, _| {
            if request.url.starts_with("https://api.archive.test/") {
                Reply::ok(NOT_ARCHIVED)
            } else {
                Reply::status(502)
            }
        }));
        let (adapter, _limiter) = adapter(executor, DispatchMode::Enhanced);
        let deadline = Instant::now() + Duration::from_secs(8);

        let result = adapter.submit(&target(), Some(deadline)).await;

        assert_eq!(result.outcome, Outcome::Timeout);
        assert_eq!(result.attempts, 3);
        assert!(Instant::now() < deadline);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_reports_closest_and_listing() {
        let executor = Arc::new(ScriptedExecutor::new(|_, _| Reply::ok(ARCHIVED)));
        let (adapter, _limiter) = adapter(executor, DispatchMode::Enhanced);

        let result = adapter.lookup(&target(), None).await;

        assert_eq!(result.sources.len(), 2);
        assert_eq!(result.responded(), 2);
        assert_eq!(
            result.snapshots(),
            vec![
                "https://web.archive.test/web/20240101000000/https://example.com/",
                "https://web.archive.test/web/*/https://example.com/",
            ]
        );
    }

    #[test]
    fn test_parse_availability_ignores_unavailable() {
        assert!(parse_availability(NOT_ARCHIVED).is_none());
        assert!(parse_availability("not json").is_none());
        let unavailable = r#"{"archived_snapshots":{"closest":{"available":false,"url":"x"}}}"#;
        assert!(parse_availability(unavailable).is_none());
        assert!(parse_availability(ARCHIVED).is_some());
    }
}
