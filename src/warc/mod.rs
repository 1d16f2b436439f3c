//! WARC 1.0 container codec
//!
//! This module handles everything related to WARC containers:
//! - The record model with case-insensitive, order-insensitive headers
//! - Writing containers, optionally gzip-compressed per record
//! - Lazy, forward-only reading that survives corrupt records
//! - Capturing a live page as a request/response pair
//! - Managing containers on disk (atomic creation, recompression, listing)

mod capture;
mod reader;
mod record;
mod store;
mod writer;

pub use capture::{archive_page, capture_page, CapturedExchange};
pub use reader::{summarize_container, ContainerSummary, WarcReader};
pub use record::{RecordType, WarcHeaders, WarcRecord, WarcRecordBuilder};
pub use store::{compress_container, list_containers, StoredContainer};
pub use writer::{WarcInfo, WarcWriter};

use thiserror::Error;

/// Errors raised while reading or writing a container
///
/// `Corrupt` is scoped to one record: a reader that yields it keeps going
/// with the next record it can find.
#[derive(Debug, Error)]
pub enum WarcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt record at byte {offset}: {reason}")]
    Corrupt { offset: u64, reason: String },

    #[error("Truncated record at byte {offset}: {reason}")]
    Truncated { offset: u64, reason: String },
}

impl WarcError {
    /// Returns true if reading can continue after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Corrupt { .. })
    }
}

/// Result type alias for WARC operations
pub type WarcResult<T> = std::result::Result<T, WarcError>;
