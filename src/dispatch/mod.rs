//! Dispatch module: the machinery between a target URL and the archiving services
//!
//! This module contains:
//! - Per-service token-bucket rate limiting
//! - The HTTP request executor and response classification
//! - The retry controller with fixed wait schedules
//! - The orchestrator that fans a submission out to adapters

mod classify;
pub mod clock;
mod executor;
mod limiter;
mod orchestrator;
mod retry;

#[cfg(test)]
pub(crate) mod testing;

pub use classify::ClassificationRules;
pub use clock::{Clock, ManualClock, SystemClock};
pub use executor::{build_http_client, parse_retry_after, Executor, HttpExecutor, HttpRequest, Method};
pub use limiter::{BucketSpec, RateLimiter, TokenBucket};
pub use orchestrator::Orchestrator;
pub(crate) use executor::BROWSER_ACCEPT;
pub use retry::{RetryController, RetryOutcome, RetryPolicy};

use thiserror::Error;

/// The overall deadline passed (or would pass) before work could start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("deadline reached")]
pub struct DeadlineReached;
