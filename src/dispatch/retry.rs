//! Retry controller
//!
//! Drives repeated executor calls along a fixed wait schedule. After each
//! attempt:
//!
//! | Outcome | Action |
//! |---------|--------|
//! | `Success`, `AlreadyArchived` | Stop, return the attempt |
//! | `PermanentError`, `CaptchaRequired` | Stop, never retried |
//! | `RateLimited`, `TransientError` | Sleep for the next schedule entry, retry |
//! | Schedule or attempt limit exhausted | Stop, return the last attempt |
//! | Total wait ceiling would be exceeded | Stop, return the last attempt |
//!
//! The total wait counts both the scheduled sleeps and the time each attempt
//! spent queued on the rate limiter (`SubmissionAttempt::throttled`).
//! | Deadline reached | Stop, report `Timeout` |

use crate::outcome::{Outcome, SubmissionAttempt};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Retry schedule and limits for one service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Wait before retry N (retry N happens after attempt N fails)
    pub schedule: Vec<Duration>,

    /// Upper bound on attempts, on top of `schedule.len() + 1`
    pub max_attempts: u32,

    /// Upper bound on the sum of all waits, rate-limiter waits included
    pub max_total_wait: Option<Duration>,
}

impl RetryPolicy {
    /// A policy that retries once per schedule entry
    pub fn new(schedule: Vec<Duration>) -> Self {
        let max_attempts = u32::try_from(schedule.len()).map_or(u32::MAX, |n| n.saturating_add(1));
        Self {
            schedule,
            max_attempts,
            max_total_wait: None,
        }
    }

    /// A policy that never retries
    pub fn single_attempt() -> Self {
        Self::new(Vec::new())
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_max_total_wait(mut self, ceiling: Duration) -> Self {
        self.max_total_wait = Some(ceiling);
        self
    }

    /// Effective attempt limit: `min(max_attempts, schedule.len() + 1)`, at least 1
    pub fn attempt_limit(&self) -> u32 {
        let by_schedule = u32::try_from(self.schedule.len()).map_or(u32::MAX, |n| n.saturating_add(1));
        self.max_attempts.min(by_schedule).max(1)
    }
}

/// What a retry run produced
#[derive(Debug, Clone)]
pub struct RetryOutcome {
    /// The final attempt, classification intact (or `Timeout` on deadline)
    pub last: SubmissionAttempt,

    /// Number of times the operation was started
    pub attempts: u32,

    /// Total time spent waiting: scheduled sleeps plus rate-limiter waits
    pub waited: Duration,
}

impl RetryOutcome {
    pub fn outcome(&self) -> Outcome {
        self.last.outcome
    }
}

/// Runs an operation under a retry policy
#[derive(Debug, Clone)]
pub struct RetryController {
    policy: RetryPolicy,
}

impl RetryController {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs `operation` until a stop condition holds
    ///
    /// Attempts are strictly sequential: attempt N+1 starts only after attempt N
    /// finished and its scheduled wait elapsed.
    ///
    /// # Arguments
    ///
    /// * `deadline` - Optional instant after which nothing new is started;
    ///   an in-flight attempt is abandoned when it passes
    /// * `operation` - Called with the zero-based attempt index
    ///
    /// # Returns
    ///
    /// The last attempt, how many attempts were made and how long was waited
    pub async fn run<F, Fut>(&self, deadline: Option<Instant>, mut operation: F) -> RetryOutcome
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = SubmissionAttempt>,
    {
        let limit = self.policy.attempt_limit();
        let mut attempts: u32 = 0;
        let mut waited = Duration::ZERO;

        loop {
            let index = attempts;
            attempts += 1;

            let last = match deadline {
                Some(deadline) => {
                    match tokio::time::timeout_at(deadline, operation(index)).await {
                        Ok(attempt) => attempt,
                        Err(_) => {
                            tracing::debug!("Attempt {} abandoned at the deadline", attempts);
                            SubmissionAttempt::timed_out(String::new())
                        }
                    }
                }
                None => operation(index).await,
            };
            waited += last.throttled;

            if last.outcome.is_terminal() {
                return RetryOutcome {
                    last,
                    attempts,
                    waited,
                };
            }

            if attempts >= limit {
                tracing::debug!(
                    "Retry schedule exhausted after {} attempt(s): {}",
                    attempts,
                    last.describe()
                );
                return RetryOutcome {
                    last,
                    attempts,
                    waited,
                };
            }

            let wait = self
                .policy
                .schedule
                .get(index as usize)
                .copied()
                .unwrap_or_default();

            if let Some(ceiling) = self.policy.max_total_wait {
                if waited + wait > ceiling {
                    tracing::warn!(
                        "Not retrying {}: waiting {:?} more would exceed the {:?} ceiling",
                        last.url,
                        wait,
                        ceiling
                    );
                    return RetryOutcome {
                        last,
                        attempts,
                        waited,
                    };
                }
            }

            if let Some(deadline) = deadline {
                if Instant::now() + wait >= deadline {
                    tracing::debug!(
                        "Retry of {} in {:?} would start after the deadline",
                        last.url,
                        wait
                    );
                    let mut last = last;
                    last.outcome = Outcome::Timeout;
                    return RetryOutcome {
                        last,
                        attempts,
                        waited,
                    };
                }
            }

            tracing::warn!(
                "Attempt {}/{} ended {}: {}; retrying in {:?}",
                attempts,
                limit,
                last.outcome,
                last.describe(),
                wait
            );
            tokio::time::sleep(wait).await;
            waited += wait;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::AttemptStatus;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn attempt(outcome: Outcome) -> SubmissionAttempt {
        SubmissionAttempt {
            url: "https://svc.example/save".to_string(),
            status: AttemptStatus::Http(match outcome {
                Outcome::Success => 200,
                Outcome::RateLimited => 429,
                Outcome::PermanentError => 404,
                _ => 503,
            }),
            final_url: None,
            body: String::new(),
            retry_after: None,
            elapsed: Duration::ZERO,
            throttled: Duration::ZERO,
            outcome,
        }
    }

    fn secs(values: &[u64]) -> Vec<Duration> {
        values.iter().map(|s| Duration::from_secs(*s)).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_transient_exhausts_schedule() {
        let controller = RetryController::new(RetryPolicy::new(secs(&[5, 10, 15, 20, 30])));
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result = controller
            .run(None, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { attempt(Outcome::TransientError) }
            })
            .await;

        assert_eq!(result.attempts, 6);
        assert_eq!(calls.load(Ordering::SeqCst), 6);
        assert_eq!(result.waited, Duration::from_secs(80));
        assert_eq!(start.elapsed(), Duration::from_secs(80));
        assert_eq!(result.outcome(), Outcome::TransientError);
    }

    #[tokio::test(start_paused = true)]
    async fn test_captcha_stops_immediately() {
        let controller = RetryController::new(RetryPolicy::new(secs(&[5, 10, 15, 20, 30])));
        let start = Instant::now();

        let result = controller
            .run(None, |_| async { attempt(Outcome::CaptchaRequired) })
            .await;

        assert_eq!(result.attempts, 1);
        assert_eq!(result.waited, Duration::ZERO);
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(result.outcome(), Outcome::CaptchaRequired);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_is_not_retried() {
        let controller = RetryController::new(RetryPolicy::new(secs(&[1, 1])));
        let result = controller
            .run(None, |_| async { attempt(Outcome::PermanentError) })
            .await;
        assert_eq!(result.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_rate_limit() {
        let controller = RetryController::new(RetryPolicy::new(secs(&[2, 4, 8])));

        let result = controller
            .run(None, |index| async move {
                if index < 2 {
                    attempt(Outcome::RateLimited)
                } else {
                    attempt(Outcome::Success)
                }
            })
            .await;

        assert_eq!(result.attempts, 3);
        assert_eq!(result.waited, Duration::from_secs(6));
        assert_eq!(result.outcome(), Outcome::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_attempts_caps_schedule() {
        let policy = RetryPolicy::new(secs(&[1, 1, 1, 1])).with_max_attempts(2);
        assert_eq!(policy.attempt_limit(), 2);

        let result = RetryController::new(policy)
            .run(None, |_| async { attempt(Outcome::TransientError) })
            .await;
        assert_eq!(result.attempts, 2);
        assert_eq!(result.waited, Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_total_wait_ceiling() {
        let policy =
            RetryPolicy::new(secs(&[5, 10, 15])).with_max_total_wait(Duration::from_secs(20));

        let result = RetryController::new(policy)
            .run(None, |_| async { attempt(Outcome::TransientError) })
            .await;

        // 5 + 10 fits, 5 + 10 + 15 does not
        assert_eq!(result.attempts, 3);
        assert_eq!(result.waited, Duration::from_secs(15));
        assert_eq!(result.outcome(), Outcome::TransientError);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_stops_retries() {
        let controller = RetryController::new(RetryPolicy::new(secs(&[5, 10])));
        let deadline = Instant::now() + Duration::from_secs(12);

        let result = controller
            .run(Some(deadline), |_| async { attempt(Outcome::TransientError) })
            .await;

        assert_eq!(result.attempts, 2);
        assert_eq!(result.outcome(), Outcome::Timeout);
        assert_eq!(result.last.status, AttemptStatus::Http(503));
        assert!(Instant::now() < deadline);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_abandons_in_flight_attempt() {
        let controller = RetryController::new(RetryPolicy::new(secs(&[1])));
        let deadline = Instant::now() + Duration::from_secs(3);

        let result = controller
            .run(Some(deadline), |_| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                attempt(Outcome::Success)
            })
            .await;

        assert_eq!(result.attempts, 1);
        assert_eq!(result.outcome(), Outcome::Timeout);
        assert!(Instant::now() >= deadline);
        assert!(Instant::now() < deadline + Duration::from_secs(1));
    }

    #[test]
    fn test_single_attempt_policy() {
        let policy = RetryPolicy::single_attempt();
        assert_eq!(policy.attempt_limit(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_limiter_waits_count_toward_ceiling() {
        let policy =
            RetryPolicy::new(secs(&[5, 5, 5])).with_max_total_wait(Duration::from_secs(20));

        let result = RetryController::new(policy)
            .run(None, |_| async {
                let mut attempt = attempt(Outcome::RateLimited);
                attempt.throttled = Duration::from_secs(4);
                attempt
            })
            .await;

        // Sleeps alone (15s) would fit; with 4s queued per attempt the third
        // retry would bring the total to 27s
        assert_eq!(result.attempts, 3);
        assert_eq!(result.waited, Duration::from_secs(22));
        assert_eq!(result.outcome(), Outcome::RateLimited);
    }
}
