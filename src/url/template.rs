use url::form_urlencoded::byte_serialize;

/// Expands an endpoint template for a target URL
///
/// Supported placeholders:
///
/// | Placeholder | Replaced with |
/// |-------------|---------------|
/// | `{url}` | the target URL, verbatim |
/// | `{url_encoded}` | the target URL, percent-encoded for a query string |
/// | `{origin}` | `scheme://host[:port]` of the endpoint in use |
///
/// # Examples
///
/// ```
/// use archive_dispatch::url::expand_template;
///
/// let expanded = expand_template("{origin}/{url}", "https://example.com/", "https://archive.ph");
/// assert_eq!(expanded, "https://archive.ph/https://example.com/");
/// ```
pub fn expand_template(template: &str, target: &str, origin: &str) -> String {
    let encoded: String = byte_serialize(target.as_bytes()).collect();
    template
        .replace("{url_encoded}", &encoded)
        .replace("{origin}", origin.trim_end_matches('/'))
        .replace("{url}", target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_raw_url() {
        assert_eq!(
            expand_template("https://web.archive.org/web/*/{url}", "https://example.com/a", ""),
            "https://web.archive.org/web/*/https://example.com/a"
        );
    }

    #[test]
    fn test_expand_encoded_url() {
        assert_eq!(
            expand_template(
                "https://archive.org/wayback/available?url={url_encoded}",
                "https://example.com/a?b=c",
                ""
            ),
            "https://archive.org/wayback/available?url=https%3A%2F%2Fexample.com%2Fa%3Fb%3Dc"
        );
    }

    #[test]
    fn test_expand_origin_trims_trailing_slash() {
        assert_eq!(
            expand_template("{origin}/{url}", "https://example.com", "https://archive.is/"),
            "https://archive.is/https://example.com"
        );
    }

    #[test]
    fn test_template_without_placeholders() {
        assert_eq!(
            expand_template("https://archive.today/submit/", "https://example.com", "x"),
            "https://archive.today/submit/"
        );
    }
}
