//! Outcome module for archiving operations
//!
//! # Components
//!
//! - `Outcome`: how a single HTTP call or a whole adapter operation ended
//! - `SubmissionAttempt`: one HTTP call's result, produced by the executor
//! - `SubmissionResult` / `SubmissionReport`: per-service and aggregate results
//! - `LookupResult` / `LookupReport`: snapshot lookups with per-source outcomes

mod attempt;
mod classification;
mod result;

// Re-export main types
pub use attempt::{AttemptStatus, SubmissionAttempt, TransportErrorKind};
pub use classification::{Outcome, RetryAdvice};
pub use result::{LookupReport, LookupResult, SourceLookup, SubmissionReport, SubmissionResult};
