use crate::UrlError;
use url::Url;

/// Scheme prefixes that get duplicated when users paste into a pre-filled field
const DUPLICATED_PREFIXES: &[(&str, &str)] = &[
    ("https://https://", "https://"),
    ("http://http://", "http://"),
    ("https://http://", "https://"),
    ("http://https://", "https://"),
];

/// Cleans up a user-supplied URL string
///
/// Trims surrounding whitespace and collapses duplicated scheme prefixes
/// (`https://https://example.com` becomes `https://example.com`).
///
/// # Examples
///
/// ```
/// use archive_dispatch::url::clean_url;
///
/// assert_eq!(clean_url("  https://https://example.com "), "https://example.com");
/// ```
pub fn clean_url(raw: &str) -> String {
    let mut cleaned = raw.trim().to_string();
    for (duplicated, single) in DUPLICATED_PREFIXES {
        if let Some(rest) = cleaned.strip_prefix(duplicated) {
            cleaned = format!("{}{}", single, rest);
        }
    }
    cleaned
}

/// Validates a target URL before any network activity
///
/// # Validation Steps
///
/// 1. Clean the input (see [`clean_url`]); reject if empty
/// 2. Parse the URL; reject if malformed
/// 3. Require an `http` or `https` scheme
/// 4. Require a host
/// 5. Drop the fragment, which archiving services ignore
///
/// # Arguments
///
/// * `raw` - The URL string supplied by the caller
///
/// # Returns
///
/// * `Ok(Url)` - A well-formed HTTP(S) URL
/// * `Err(UrlError)` - The input cannot be archived
///
/// # Examples
///
/// ```
/// use archive_dispatch::url::validate_target_url;
///
/// assert!(validate_target_url("https://example.com").is_ok());
/// assert!(validate_target_url("not-a-url").is_err());
/// assert!(validate_target_url("ftp://example.com/file").is_err());
/// ```
pub fn validate_target_url(raw: &str) -> Result<Url, UrlError> {
    let cleaned = clean_url(raw);
    if cleaned.is_empty() {
        return Err(UrlError::Malformed("URL is empty".to_string()));
    }

    let mut url = Url::parse(&cleaned).map_err(|e| UrlError::Parse(format!("{}: {}", cleaned, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => {}
        _ => return Err(UrlError::MissingDomain),
    }

    url.set_fragment(None);

    Ok(url)
}
