use crate::url::extract_domain;
use chrono::{DateTime, Utc};
use url::Url;

/// Builds the deterministic file name of a container for a captured URL
///
/// Format: `{host}_{YYYYmmddHHMMSS}.warc` (or `.warc.gz` when compressed). The
/// host keeps only characters that are safe in file names on every platform.
///
/// # Examples
///
/// ```
/// use archive_dispatch::url::container_file_name;
/// use chrono::{TimeZone, Utc};
/// use url::Url;
///
/// let url = Url::parse("https://example.com/page").unwrap();
/// let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();
/// assert_eq!(container_file_name(&url, at, true), "example.com_20240301123005.warc.gz");
/// ```
pub fn container_file_name(target: &Url, captured_at: DateTime<Utc>, compressed: bool) -> String {
    let host = extract_domain(target).unwrap_or_else(|| "unknown-host".to_string());
    let mut stem: String = host
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if let Some(port) = target.port() {
        stem.push_str(&format!("_{}", port));
    }

    let extension = if compressed { "warc.gz" } else { "warc" };
    format!("{}_{}.{}", stem, captured_at.format("%Y%m%d%H%M%S"), extension)
}
