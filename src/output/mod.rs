//! Output module for reports and the plain-text inputs of collaborators
//!
//! This module handles:
//! - Markdown and JSON reports of submission and lookup results
//! - Visible-text extraction from captured pages
//! - Unified diffs between two texts

mod diff;
mod report;
mod text;

pub use diff::{unified_diff, unified_diff_labeled};
pub use report::{format_json_report, format_markdown_report, write_markdown_report};
pub use text::{extract_text, fetch_text, page_title};

use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("Failed to format output: {0}")]
    Format(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;
