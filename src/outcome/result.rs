use crate::outcome::{Outcome, RetryAdvice};
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::time::Duration;

fn serialize_millis<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.as_millis() as u64)
}

/// Per-service outcome returned to the caller
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionResult {
    /// The service that produced this result
    pub service: String,

    /// Final classification
    pub outcome: Outcome,

    /// Number of HTTP calls made, including existence checks and verification
    pub attempts: u32,

    /// Wall-clock time spent in the adapter
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,

    /// Link to the archived copy, when one is known
    pub archive_url: Option<String>,

    /// Human-readable diagnostic
    pub message: String,

    /// Whether a retry affordance makes sense
    pub retry_advice: RetryAdvice,
}

impl SubmissionResult {
    /// Builds a result, appending retry guidance to failure messages
    ///
    /// # Arguments
    ///
    /// * `service` - Service name
    /// * `outcome` - Final classification
    /// * `attempts` - HTTP calls made
    /// * `elapsed` - Time spent
    /// * `archive_url` - Link to the archived copy, if any
    /// * `detail` - What happened, in plain words
    pub fn new(
        service: impl Into<String>,
        outcome: Outcome,
        attempts: u32,
        elapsed: Duration,
        archive_url: Option<String>,
        detail: impl Into<String>,
    ) -> Self {
        let advice = outcome.retry_advice();
        let detail = detail.into();
        let message = if outcome.is_success() {
            detail
        } else {
            format!("{} ({})", detail, advice.describe())
        };

        Self {
            service: service.into(),
            outcome,
            attempts,
            elapsed,
            archive_url,
            message,
            retry_advice: advice,
        }
    }

    /// A result for an adapter stopped by the overall deadline
    pub fn timeout(service: impl Into<String>, attempts: u32, elapsed: Duration) -> Self {
        Self::new(
            service,
            Outcome::Timeout,
            attempts,
            elapsed,
            None,
            format!(
                "Deadline reached after {:.1}s; remaining retries were abandoned",
                elapsed.as_secs_f64()
            ),
        )
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

/// Aggregate result of one submission fan-out
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionReport {
    /// The validated target URL
    pub target: String,

    /// When the last adapter finished
    pub completed_at: DateTime<Utc>,

    /// Results keyed by service name
    pub results: BTreeMap<String, SubmissionResult>,
}

impl SubmissionReport {
    pub fn get(&self, service: &str) -> Option<&SubmissionResult> {
        self.results.get(service)
    }

    /// Number of services that archived (or already held) the target
    pub fn success_count(&self) -> usize {
        self.results.values().filter(|r| r.is_success()).count()
    }

    /// Returns true if every service succeeded
    pub fn all_succeeded(&self) -> bool {
        self.results.values().all(SubmissionResult::is_success)
    }
}

/// Lookup answer from one snapshot source
#[derive(Debug, Clone, Serialize)]
pub struct SourceLookup {
    pub source: String,
    pub outcome: Outcome,
    pub snapshots: Vec<String>,
    pub message: String,
}

impl SourceLookup {
    /// Returns true if the source answered (with or without snapshots)
    pub fn responded(&self) -> bool {
        self.outcome.is_success()
    }
}

/// Per-service lookup result; failures stay per source
#[derive(Debug, Clone, Serialize)]
pub struct LookupResult {
    pub service: String,
    pub sources: Vec<SourceLookup>,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

impl LookupResult {
    /// Number of sources that answered
    pub fn responded(&self) -> usize {
        self.sources.iter().filter(|s| s.responded()).count()
    }

    /// All snapshot URLs across sources, in source order
    pub fn snapshots(&self) -> Vec<&str> {
        self.sources
            .iter()
            .flat_map(|s| s.snapshots.iter().map(String::as_str))
            .collect()
    }

    /// One-line summary such as "6 of 9 sources responded"
    pub fn summary(&self) -> String {
        format!(
            "{} of {} sources responded, {} snapshot link(s)",
            self.responded(),
            self.sources.len(),
            self.snapshots().len()
        )
    }
}

/// Aggregate result of one lookup fan-out
#[derive(Debug, Clone, Serialize)]
pub struct LookupReport {
    pub target: String,
    pub completed_at: DateTime<Utc>,
    pub results: BTreeMap<String, LookupResult>,
}
