//! Mirror-rotating archiving service
//!
//! An attempt that ends in a transient failure or throttling moves the next
//! attempt to the following mirror in the list. Every mirror
//! attempt consumes one slot of the retry schedule. CAPTCHA pages end the
//! submission immediately with guidance for a human.

use crate::config::DispatchMode;
use crate::dispatch::{Executor, HttpRequest, RateLimiter};
use crate::outcome::{LookupResult, Outcome, SubmissionResult};
use crate::services::context::{failure_detail, AdapterContext};
use crate::services::{ServiceAdapter, ServiceProfile};
use crate::url::origin_of;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::sync::Arc;
use tokio::time::Instant;
use url::Url;

/// Adapter for a service reachable through interchangeable mirror hosts
pub struct MirrorAdapter {
    ctx: AdapterContext,
}

impl MirrorAdapter {
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

    /// Mirror order for one submission
    fn mirror_order(&self) -> Vec<String> {
        let mut mirrors = self.ctx.profile.endpoints.clone();
        if self.ctx.profile.shuffle_mirrors {
            mirrors.shuffle(&mut rand::thread_rng());
        }
        mirrors
    }

    /// Looks for the archive link on the mirror that accepted the submission
    async fn find_archive_link(
        &self,
        target: &Url,
        mirror: &str,
        deadline: Option<Instant>,
    ) -> Option<String> {
        let template = self.ctx.profile.lookup_endpoint.as_deref()?;
        let url = self.ctx.profile.expand(template, target, mirror);
        let attempt = self.ctx.send_check(&self.ctx.get(url), deadline).await;

        if !attempt.outcome.is_success() {
            tracing::debug!(
                "{} archive link lookup failed: {}",
                self.ctx.name(),
                attempt.describe()
            );
            return None;
        }
        attempt
            .final_url
            .filter(|url| self.ctx.profile.rules.is_archive_url(url))
    }
}

#[async_trait]
impl ServiceAdapter for MirrorAdapter {
    fn name(&self) -> &str {
        self.ctx.name()
    }

    fn profile(&self) -> &ServiceProfile {
        &self.ctx.profile
    }

    async fn submit(&self, target: &Url, deadline: Option<Instant>) -> SubmissionResult {
        let started = Instant::now();
        let name = self.ctx.name();
        let mirrors = self.mirror_order();

        if mirrors.is_empty() {
            return SubmissionResult::new(
                name,
                Outcome::PermanentError,
                0,
                started.elapsed(),
                None,
                "No mirrors configured",
            );
        }

        let timeout = self.ctx.profile.timeout;
        let mut position = 0;
        let run = self
            .ctx
            .send_with_retry(deadline, |_, previous| {
                if previous.is_some_and(|outcome| outcome.should_rotate_mirror()) {
                    position = (position + 1) % mirrors.len();
                    tracing::warn!("{}: rotating to mirror {}", name, origin_of(&mirrors[position]));
                }
                let endpoint = &mirrors[position];
                let origin = origin_of(endpoint);
                HttpRequest::post_form(
                    self.ctx.profile.expand(endpoint, target, &origin),
                    vec![("url".to_string(), target.to_string())],
                    timeout,
                )
                .with_header("Referer", origin)
            })
            .await;

        let mut calls = run.attempts;
        let mirror = origin_of(&run.last.url);
        let tried = mirrors.len().min(run.attempts as usize);

        match run.outcome() {
            Outcome::Success => {
                let rules = &self.ctx.profile.rules;
                let mut archive_url = run
                    .last
                    .final_url
                    .clone()
                    .filter(|url| rules.is_archive_url(url));

                if archive_url.is_none()
                    && self.ctx.verifies()
                    && self.ctx.profile.lookup_endpoint.is_some()
                {
                    calls += 1;
                    archive_url = self.find_archive_link(target, &mirror, deadline).await;
                }

                let message = match &archive_url {
                    Some(_) => format!("Archived via {}", mirror),
                    None => format!("Submitted via {}; archive link not yet available", mirror),
                };
                tracing::info!("{}: {} ({})", name, message, target);
                SubmissionResult::new(
                    name,
                    Outcome::Success,
                    calls,
                    started.elapsed(),
                    archive_url,
                    message,
                )
            }
            Outcome::AlreadyArchived => {
                let rules = &self.ctx.profile.rules;
                let archive_url = run
                    .last
                    .final_url
                    .clone()
                    .filter(|url| rules.is_archive_url(url));
                SubmissionResult::new(
                    name,
                    Outcome::AlreadyArchived,
                    calls,
                    started.elapsed(),
                    archive_url,
                    format!("Already archived on {}", mirror),
                )
            }
            Outcome::CaptchaRequired => {
                tracing::warn!("{}: CAPTCHA required by {}", name, mirror);
                SubmissionResult::new(
                    name,
                    Outcome::CaptchaRequired,
                    calls,
                    started.elapsed(),
                    None,
                    format!(
                        "CAPTCHA required by {0}. Open {0} in a browser, complete the CAPTCHA, then resubmit",
                        mirror
                    ),
                )
            }
            Outcome::Timeout => SubmissionResult::new(
                name,
                Outcome::Timeout,
                calls,
                started.elapsed(),
                None,
                failure_detail(&run),
            ),
            outcome => {
                tracing::warn!("{}: failed across {} mirror(s) for {}", name, tried, target);
                SubmissionResult::new(
                    name,
                    outcome,
                    calls,
                    started.elapsed(),
                    None,
                    format!("Tried {} mirror(s). {}", tried, failure_detail(&run)),
                )
            }
        }
    }

    async fn lookup(&self, target: &Url, _deadline: Option<Instant>) -> LookupResult {
        let started = Instant::now();
        let mut sources = Vec::new();

        if let Some(template) = &self.ctx.profile.lookup_endpoint {
            let links = self
                .ctx
                .profile
                .endpoints
                .iter()
                .map(|endpoint| self.ctx.profile.expand(template, target, &origin_of(endpoint)))
                .collect();
            sources.push(self.ctx.listing_source("listing", links));
        }

        LookupResult {
            service: self.ctx.name().to_string(),
            sources,
            elapsed: started.elapsed(),
        }
    }
}
