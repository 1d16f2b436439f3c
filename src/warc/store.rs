//! Containers on disk: creating, recompressing and listing them

use super::{WarcError, WarcReader, WarcResult, WarcWriter};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

/// Suffix of a container that is still being written
const PART_SUFFIX: &str = ".part";

/// A container found in the local store
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredContainer {
    pub path: PathBuf,

    /// Size on disk in bytes
    pub size: u64,

    /// Last modification time
    pub modified: DateTime<Utc>,

    /// Whether the name marks it as gzip-compressed
    pub compressed: bool,
}

impl StoredContainer {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Size in MiB, for display
    pub fn size_mib(&self) -> f64 {
        self.size as f64 / (1024.0 * 1024.0)
    }
}

/// Creates the container at `path` through a sibling `.part` file
///
/// `write` receives the open `.part` file and returns it once everything is
/// written. On success the file is synced and renamed to `path`; on any error
/// the `.part` file is removed and `path` is never created. An existing `path`
/// is never overwritten.
pub(crate) fn write_container_file<F>(path: &Path, write: F) -> WarcResult<()>
where
    F: FnOnce(File) -> WarcResult<File>,
{
    if path.exists() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} already exists", path.display()),
        )
        .into());
    }

    let part = with_suffix(path, PART_SUFFIX);
    let file = OpenOptions::new().write(true).create_new(true).open(&part)?;

    let written = write(file).and_then(|file| {
        file.sync_all()?;
        std::fs::rename(&part, path)?;
        Ok(())
    });

    if let Err(e) = &written {
        tracing::warn!("Discarding partial container {}: {}", part.display(), e);
        if let Err(remove) = std::fs::remove_file(&part) {
            tracing::warn!("Could not remove {}: {}", part.display(), remove);
        }
    }
    written
}

/// Recompresses a plain container as `{name}.gz`, one gzip member per record
///
/// Records are copied unchanged, the original `warcinfo` included, and the
/// plain container is left in place. A container that is already compressed
/// is returned as-is.
///
/// # Returns
///
/// * `Ok(PathBuf)` - Path of the compressed container
/// * `Err(WarcError::Corrupt)` / `Err(WarcError::Truncated)` - A record could
///   not be read; nothing is written
/// * `Err(WarcError::Io)` - Reading or writing failed, or `{name}.gz` exists
pub fn compress_container(path: impl AsRef<Path>) -> WarcResult<PathBuf> {
    let path = path.as_ref();
    let mut reader = WarcReader::open(path)?;

    let first = match reader.next() {
        Some(item) => item?,
        None => {
            return Err(WarcError::Corrupt {
                offset: 0,
                reason: "container holds no records".to_string(),
            })
        }
    };
    if reader.is_compressed() == Some(true) {
        tracing::debug!("{} is already compressed", path.display());
        return Ok(path.to_path_buf());
    }

    let dest = with_suffix(path, ".gz");
    let mut copied = 0;
    write_container_file(&dest, |file| {
        let mut writer = WarcWriter::copying(BufWriter::new(file), true);
        writer.write_record(&first)?;
        for item in reader.by_ref() {
            writer.write_record(&item?)?;
        }
        copied = writer.records_written();
        Ok(writer.finish()?.into_inner().map_err(|e| e.into_error())?)
    })?;

    tracing::info!(
        "Compressed {} record(s) from {} into {}",
        copied,
        path.display(),
        dest.display()
    );
    Ok(dest)
}

/// Lists the `.warc` and `.warc.gz` containers in `dir`, sorted by name
///
/// A missing directory holds no containers.
pub fn list_containers(dir: impl AsRef<Path>) -> WarcResult<Vec<StoredContainer>> {
    let dir = dir.as_ref();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut containers = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !is_container_name(&name) {
            continue;
        }
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }
        containers.push(StoredContainer {
            path: entry.path(),
            size: metadata.len(),
            modified: DateTime::<Utc>::from(metadata.modified()?),
            compressed: name.ends_with(".gz"),
        });
    }

    containers.sort_by(|a, b| a.path.cmp(&b.path));
    tracing::debug!("{} container(s) in {}", containers.len(), dir.display());
    Ok(containers)
}

fn is_container_name(name: &str) -> bool {
    name.ends_with(".warc") || name.ends_with(".warc.gz")
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}
