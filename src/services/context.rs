//! Machinery shared by every adapter: limiter, executor, retry policy

use crate::config::DispatchMode;
use crate::dispatch::{Executor, HttpRequest, RateLimiter, RetryController, RetryOutcome};
use crate::outcome::{Outcome, SourceLookup, SubmissionAttempt};
use crate::services::ServiceProfile;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::time::Instant;

pub(crate) struct AdapterContext {
    pub(crate) profile: ServiceProfile,
    mode: DispatchMode,
    limiter: Arc<RateLimiter>,
    executor: Arc<dyn Executor>,
    retry: RetryController,
}

impl AdapterContext {
    pub(crate) fn new(
        profile: ServiceProfile,
        mode: DispatchMode,
        limiter: Arc<RateLimiter>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        let retry = RetryController::new(profile.retry_policy(mode));
        Self {
            profile,
            mode,
            limiter,
            executor,
            retry,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.profile.name
    }

    /// Whether post-submit confirmation requests are made
    pub(crate) fn verifies(&self) -> bool {
        self.mode == DispatchMode::Enhanced
    }

    pub(crate) fn get(&self, url: impl Into<String>) -> HttpRequest {
        HttpRequest::get(url, self.profile.timeout)
    }

    /// Takes a slot from the service's submission bucket, then sends one request
    ///
    /// Both the limiter wait and the request are bounded by `deadline`.
    pub(crate) async fn send(&self, request: &HttpRequest, deadline: Option<Instant>) -> SubmissionAttempt {
        self.send_via(&self.profile.name, request, deadline).await
    }

    /// Sends a read-only request (availability query, archive confirmation)
    ///
    /// Reads draw from the service's check bucket, so they never spend the
    /// tokens that pace submissions.
    pub(crate) async fn send_check(
        &self,
        request: &HttpRequest,
        deadline: Option<Instant>,
    ) -> SubmissionAttempt {
        self.send_via(&self.profile.check_bucket(), request, deadline)
            .await
    }

    async fn send_via(
        &self,
        bucket: &str,
        request: &HttpRequest,
        deadline: Option<Instant>,
    ) -> SubmissionAttempt {
        let Ok(throttled) = self.limiter.until_ready(bucket, deadline).await else {
            return SubmissionAttempt::timed_out(request.url.clone());
        };

        let call = self.executor.execute(request, &self.profile.rules);
        let mut attempt = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, call)
                .await
                .unwrap_or_else(|_| SubmissionAttempt::timed_out(request.url.clone())),
            None => call.await,
        };
        attempt.throttled = throttled;
        attempt
    }

    /// Sends requests under the retry policy
    ///
    /// `make_request` gets the attempt index and the outcome of the previous
    /// attempt (`None` for the first).
    pub(crate) async fn send_with_retry<F>(&self, deadline: Option<Instant>, mut make_request: F) -> RetryOutcome
    where
        F: FnMut(u32, Option<Outcome>) -> HttpRequest,
    {
        let previous = Mutex::new(None);
        let previous = &previous;
        self.retry
            .run(deadline, |index| {
                let last = *previous.lock().unwrap_or_else(PoisonError::into_inner);
                let request = make_request(index, last);
                async move {
                    let attempt = self.send(&request, deadline).await;
                    *previous.lock().unwrap_or_else(PoisonError::into_inner) = Some(attempt.outcome);
                    attempt
                }
            })
            .await
    }

    /// A listing link reported without contacting the service
    pub(crate) fn listing_source(&self, name: &str, links: Vec<String>) -> SourceLookup {
        SourceLookup {
            source: name.to_string(),
            outcome: Outcome::Success,
            message: format!("{} listing link(s)", links.len()),
            snapshots: links,
        }
    }
}

/// Diagnostic text for a retry run that did not succeed
pub(crate) fn failure_detail(run: &RetryOutcome) -> String {
    let last = run.last.describe();
    match run.outcome() {
        Outcome::RateLimited => format!("Rate limited after {} attempt(s): {}", run.attempts, last),
        Outcome::TransientError => {
            format!("Service unavailable after {} attempt(s): {}", run.attempts, last)
        }
        Outcome::PermanentError => format!("Submission rejected: {}", last),
        Outcome::CaptchaRequired => format!("CAPTCHA required: {}", last),
        Outcome::Timeout => format!(
            "Deadline reached after {} attempt(s); last: {}",
            run.attempts, last
        ),
        Outcome::Success | Outcome::AlreadyArchived => last,
    }
}
