use crate::outcome::Outcome;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Why a request produced no HTTP response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    /// The request exceeded its timeout
    Timeout,
    /// The connection could not be established or was reset
    Connect,
    /// The request could not be built (bad URL, bad header)
    InvalidRequest,
    /// The response body could not be read
    Body,
    /// Any other transport failure
    Other,
}

impl TransportErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connect => "connection failure",
            Self::InvalidRequest => "invalid request",
            Self::Body => "unreadable body",
            Self::Other => "transport error",
        }
    }
}

/// What came back from the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    /// The server answered with this status code
    Http(u16),
    /// No usable response
    Transport(TransportErrorKind),
    /// The attempt never reached the network (deadline)
    NotSent,
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(code) => write!(f, "HTTP {}", code),
            Self::Transport(kind) => write!(f, "{}", kind.as_str()),
            Self::NotSent => write!(f, "no response before the deadline"),
        }
    }
}

/// The result of one HTTP call
///
/// Created by the executor and consumed by the retry controller and adapters.
#[derive(Debug, Clone)]
pub struct SubmissionAttempt {
    /// The URL that was requested
    pub url: String,

    /// HTTP status or transport failure
    pub status: AttemptStatus,

    /// URL after redirects, when a response arrived
    pub final_url: Option<String>,

    /// Response body (possibly truncated), or the transport error text
    pub body: String,

    /// Parsed `Retry-After` header
    pub retry_after: Option<Duration>,

    /// Time spent in the call
    pub elapsed: Duration,

    /// Time spent waiting on the rate limiter before the call was sent
    pub throttled: Duration,

    pub outcome: Outcome,
}

impl SubmissionAttempt {
    /// An attempt abandoned because the deadline expired before it was sent
    pub fn timed_out(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: AttemptStatus::NotSent,
            final_url: None,
            body: String::new(),
            retry_after: None,
            elapsed: Duration::ZERO,
            throttled: Duration::ZERO,
            outcome: Outcome::Timeout,
        }
    }

    /// Returns the HTTP status code, if a response arrived
    pub fn status_code(&self) -> Option<u16> {
        match self.status {
            AttemptStatus::Http(code) => Some(code),
            _ => None,
        }
    }

    /// A short description of what happened, for diagnostics
    pub fn describe(&self) -> String {
        let mut text = format!("{} from {}", self.status, self.url);
        if let Some(wait) = self.retry_after {
            text.push_str(&format!(" (Retry-After: {}s)", wait.as_secs()));
        }
        text
    }
}
