/// Outcome classification for archiving operations
///
/// Every executor call, adapter operation, and lookup source ends in exactly one
/// of these classifications.
use serde::Serialize;
use std::fmt;

/// Represents how an archiving operation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    // ===== Success States =====
    /// The service accepted (and, where possible, confirmed) the capture
    Success,

    /// The service already holds a capture of the target
    AlreadyArchived,

    // ===== Retryable States =====
    /// HTTP 429 or a service-specific throttling marker
    RateLimited,

    /// 5xx, timeout, connection reset
    TransientError,

    // ===== Terminal Failure States =====
    /// The service demands a human to solve a CAPTCHA
    CaptchaRequired,

    /// 4xx other than 429, malformed request
    PermanentError,

    /// The overall deadline expired before the operation finished
    Timeout,
}

/// What the caller can expect if it tries again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryAdvice {
    /// Nothing to retry
    NotNeeded,
    /// Retrying later may succeed
    MaySucceedLater,
    /// Retrying will not help until a person acts (e.g. solves a CAPTCHA)
    NeedsHumanAction,
    /// Retrying will not succeed
    WillNotSucceed,
}

impl Outcome {
    /// Returns true if the target is now (or already was) archived
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success | Self::AlreadyArchived)
    }

    /// Returns true if the retry controller may try again after this outcome
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::TransientError)
    }

    /// Returns true if the retry controller must stop after this outcome
    pub fn is_terminal(&self) -> bool {
        !self.is_retryable()
    }

    /// Returns true for outcomes that should make a mirror-rotating adapter move on
    pub fn should_rotate_mirror(&self) -> bool {
        matches!(self, Self::TransientError | Self::RateLimited)
    }

    /// Tells the caller whether a retry affordance makes sense
    pub fn retry_advice(&self) -> RetryAdvice {
        match self {
            Self::Success | Self::AlreadyArchived => RetryAdvice::NotNeeded,
            Self::RateLimited | Self::TransientError | Self::Timeout => {
                RetryAdvice::MaySucceedLater
            }
            Self::CaptchaRequired => RetryAdvice::NeedsHumanAction,
            Self::PermanentError => RetryAdvice::WillNotSucceed,
        }
    }

    /// Converts the outcome to a stable string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::AlreadyArchived => "already_archived",
            Self::RateLimited => "rate_limited",
            Self::TransientError => "transient_error",
            Self::CaptchaRequired => "captcha_required",
            Self::PermanentError => "permanent_error",
            Self::Timeout => "timeout",
        }
    }

    /// Returns all possible outcomes
    pub fn all() -> [Self; 7] {
        [
            Self::Success,
            Self::AlreadyArchived,
            Self::RateLimited,
            Self::TransientError,
            Self::CaptchaRequired,
            Self::PermanentError,
            Self::Timeout,
        ]
    }
}

impl RetryAdvice {
    /// Human-readable suffix for diagnostic messages
    pub fn describe(&self) -> &'static str {
        match self {
            Self::NotNeeded => "no action needed",
            Self::MaySucceedLater => "may succeed if retried later",
            Self::NeedsHumanAction => "will not succeed if retried until the CAPTCHA is solved",
            Self::WillNotSucceed => "will not succeed if retried",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
