use url::Url;

/// Extracts the domain from a URL
///
/// This function retrieves the host portion of a URL and converts it to lowercase.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use archive_dispatch::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Returns `scheme://host[:port]` for an endpoint URL string
///
/// Falls back to the input when it cannot be parsed, so callers can still use
/// it as a Referer or in messages.
///
/// # Examples
///
/// ```
/// use archive_dispatch::url::origin_of;
///
/// assert_eq!(origin_of("https://archive.ph/submit/"), "https://archive.ph");
/// assert_eq!(origin_of("http://127.0.0.1:8080/a/b"), "http://127.0.0.1:8080");
/// ```
pub fn origin_of(endpoint: &str) -> String {
    match Url::parse(endpoint) {
        Ok(url) => url.origin().ascii_serialization(),
        Err(_) => endpoint.trim_end_matches('/').to_string(),
    }
}
