//! Archive-Dispatch: submit URLs to web-archiving services and keep WARC captures
//!
//! This crate implements a rate-limited, retrying, mirror-aware dispatcher that
//! submits a URL to third-party archiving services, looks up historical snapshots,
//! and reads/writes captures in the WARC 1.0 container format.

pub mod config;
pub mod dispatch;
pub mod outcome;
pub mod output;
pub mod services;
pub mod upload;
pub mod url;
pub mod warc;

use thiserror::Error;

/// Main error type for Archive-Dispatch operations
///
/// Remote-service failures are not errors: adapters report them as
/// [`outcome::Outcome`] values inside a [`outcome::SubmissionResult`].
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] UrlError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("HTTP error for {url}: status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("WARC error: {0}")]
    Warc(#[from] warc::WarcError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DispatchError {
    /// Returns true if the error was caused by caller input rather than a remote service
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidInput(_) | Self::InvalidUrl(_))
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid endpoint in config: {0}")]
    InvalidEndpoint(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Archive-Dispatch operations
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use dispatch::{Orchestrator, RateLimiter, RetryController, RetryPolicy};
pub use outcome::{Outcome, SubmissionAttempt, SubmissionReport, SubmissionResult};
pub use url::validate_target_url;
