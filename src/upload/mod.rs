//! Upload handoff
//!
//! Prepares a finished WARC container for the cloud-archive collaborator:
//! the container is re-read to prove it is well-formed and closed, then
//! checksummed and described by a flat metadata mapping.

use crate::warc::summarize_container;
use crate::{DispatchError, Result};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Prefix of generated item identifiers
pub const IDENTIFIER_PREFIX: &str = "archive_dispatch";

/// Separator used for multi-valued metadata such as subjects
pub const LIST_SEPARATOR: &str = ";";

const DEFAULT_SUBJECTS: &[&str] = &["web archiving", "WARC", "preservation"];

const HASH_CHUNK: usize = 8192;

/// A verified container ready to be handed to the upload collaborator
#[derive(Debug, Clone)]
pub struct UploadHandoff {
    /// Path of the container
    pub path: PathBuf,

    /// Unique item identifier
    pub identifier: String,

    /// Metadata mapping, with caller overrides applied
    pub metadata: BTreeMap<String, String>,
}

impl UploadHandoff {
    /// Returns a metadata value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Returns the subjects as a list
    pub fn subjects(&self) -> Vec<&str> {
        self.get("subject")
            .map(|s| {
                s.split(LIST_SEPARATOR)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// File checksums, as lowercase hex
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksums {
    pub md5: String,
    pub sha256: String,
}

/// Prepares a container for upload
///
/// # Arguments
///
/// * `path` - Path of a finished WARC container
/// * `overrides` - Metadata entries that replace the generated ones
///
/// # Returns
///
/// * `Ok(UploadHandoff)` - The container is well-formed and described
/// * `Err(DispatchError::InvalidInput)` - The container is empty or has damaged records
/// * `Err(DispatchError::Warc)` / `Err(DispatchError::Io)` - The container could not be read
pub fn prepare_upload(
    path: impl AsRef<Path>,
    overrides: &BTreeMap<String, String>,
) -> Result<UploadHandoff> {
    prepare_upload_at(path.as_ref(), overrides, Utc::now())
}

fn prepare_upload_at(
    path: &Path,
    overrides: &BTreeMap<String, String>,
    now: DateTime<Utc>,
) -> Result<UploadHandoff> {
    let summary = summarize_container(path)?;
    if summary.records == 0 {
        return Err(DispatchError::InvalidInput(format!(
            "{} contains no WARC records",
            path.display()
        )));
    }
    if !summary.is_clean() {
        return Err(DispatchError::InvalidInput(format!(
            "{} is not a well-formed WARC container: {}",
            path.display(),
            summary.errors.join("; ")
        )));
    }
    debug!(
        "Verified {} ({} records) for upload",
        path.display(),
        summary.records
    );

    let checksums = checksum_file(path)?;
    let size = std::fs::metadata(path)?.len();
    let identifier = generate_identifier(&checksums.md5, now);

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = path
        .file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut metadata = BTreeMap::new();
    let mut put = |key: &str, value: String| {
        metadata.insert(key.to_string(), value);
    };
    put("identifier", identifier.clone());
    put("title", format!("Web Archive - {}", stem));
    put(
        "description",
        format!(
            "Web archive created by {}. Original file: {}",
            env!("CARGO_PKG_NAME"),
            file_name
        ),
    );
    put("creator", env!("CARGO_PKG_NAME").to_string());
    put("subject", DEFAULT_SUBJECTS.join(LIST_SEPARATOR));
    put("mediatype", "web".to_string());
    put("collection", "opensource".to_string());
    put("date", now.format("%Y-%m-%d").to_string());
    put("language", "eng".to_string());
    put("warc_file_name", file_name);
    put("warc_file_size", size.to_string());
    put("warc_record_count", summary.records.to_string());
    put("md5_checksum", checksums.md5);
    put("sha256_checksum", checksums.sha256);
    if let Some(target) = summary.targets.first() {
        put("source", target.clone());
    }

    for (key, value) in overrides {
        metadata.insert(key.clone(), value.clone());
    }

    info!("Prepared {} for upload as {}", path.display(), identifier);

    Ok(UploadHandoff {
        path: path.to_path_buf(),
        identifier,
        metadata,
    })
}

/// Computes the MD5 and SHA-256 of a file in one pass
pub fn checksum_file(path: impl AsRef<Path>) -> Result<Checksums> {
    let mut file = File::open(path.as_ref())?;
    let mut md5 = md5::Context::new();
    let mut sha = Sha256::new();
    let mut buf = [0u8; HASH_CHUNK];

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        md5.consume(&buf[..n]);
        sha.update(&buf[..n]);
    }

    Ok(Checksums {
        md5: format!("{:x}", md5.compute()),
        sha256: hex::encode(sha.finalize()),
    })
}

/// Builds `{prefix}_{YYYYmmdd_HHMMSS}_{first 8 hex digits of the MD5}`
fn generate_identifier(md5_hex: &str, now: DateTime<Utc>) -> String {
    let short = md5_hex.get(..8).unwrap_or(md5_hex);
    format!(
        "{}_{}_{}",
        IDENTIFIER_PREFIX,
        now.format("%Y%m%d_%H%M%S"),
        short
    )
}
