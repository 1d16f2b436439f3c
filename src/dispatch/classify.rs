//! Response classification
//!
//! Maps an HTTP status, body and final URL (or a transport failure) onto an
//! [`Outcome`]. Service-specific markers come from configuration.

use crate::config::MarkerConfig;
use crate::outcome::{Outcome, TransportErrorKind};

/// Marker lists used to classify one service's responses
///
/// All body markers are matched case-insensitively as substrings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassificationRules {
    /// Body markers of a CAPTCHA or bot challenge page
    pub captcha: Vec<String>,

    /// Body or final-URL markers meaning the target was captured before
    pub already_archived: Vec<String>,

    /// Body markers of a throttling page served without a 429
    pub rate_limited: Vec<String>,

    /// Final-URL markers identifying a link to an archived copy
    pub archive_url: Vec<String>,
}

fn lowercase_all(values: &[String]) -> Vec<String> {
    values
        .iter()
        .filter(|v| !v.trim().is_empty())
        .map(|v| v.to_lowercase())
        .collect()
}

fn contains_any(haystack: &str, markers: &[String]) -> bool {
    markers.iter().any(|marker| haystack.contains(marker.as_str()))
}

impl ClassificationRules {
    /// Builds rules from configured markers
    pub fn from_markers(markers: &MarkerConfig) -> Self {
        Self {
            captcha: lowercase_all(&markers.captcha),
            already_archived: lowercase_all(&markers.already_archived),
            rate_limited: lowercase_all(&markers.rate_limited),
            archive_url: lowercase_all(&markers.archive_url),
        }
    }

    /// Classifies a response that arrived
    ///
    /// # Precedence
    ///
    /// | Check | Outcome |
    /// |-------|---------|
    /// | CAPTCHA marker in body | `CaptchaRequired` |
    /// | HTTP 429 or rate-limit marker | `RateLimited` |
    /// | HTTP 5xx | `TransientError` |
    /// | Other HTTP 4xx | `PermanentError` |
    /// | Already-archived marker in body or final URL | `AlreadyArchived` |
    /// | HTTP 2xx | `Success` |
    /// | Anything else | `PermanentError` |
    pub fn classify_response(&self, status: u16, body: &str, final_url: Option<&str>) -> Outcome {
        let body = body.to_lowercase();

        if contains_any(&body, &self.captcha) {
            return Outcome::CaptchaRequired;
        }

        if status == 429 || contains_any(&body, &self.rate_limited) {
            return Outcome::RateLimited;
        }

        if (500..600).contains(&status) {
            return Outcome::TransientError;
        }

        if (400..500).contains(&status) {
            return Outcome::PermanentError;
        }

        let final_url = final_url.map(str::to_lowercase).unwrap_or_default();
        if contains_any(&body, &self.already_archived)
            || contains_any(&final_url, &self.already_archived)
        {
            return Outcome::AlreadyArchived;
        }

        if (200..300).contains(&status) {
            return Outcome::Success;
        }

        Outcome::PermanentError
    }

    /// Classifies a request that produced no response
    pub fn classify_transport(&self, kind: TransportErrorKind) -> Outcome {
        match kind {
            TransportErrorKind::InvalidRequest => Outcome::PermanentError,
            TransportErrorKind::Timeout
            | TransportErrorKind::Connect
            | TransportErrorKind::Body
            | TransportErrorKind::Other => Outcome::TransientError,
        }
    }

    /// Returns true if `url` looks like a link to an archived copy
    pub fn is_archive_url(&self, url: &str) -> bool {
        let url = url.to_lowercase();
        contains_any(&url, &self.archive_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> ClassificationRules {
        ClassificationRules::from_markers(&MarkerConfig {
            captcha: vec!["g-recaptcha".to_string()],
            already_archived: vec!["Already Archived".to_string()],
            rate_limited: vec!["slow down".to_string()],
            archive_url: vec!["/web/".to_string()],
        })
    }

    #[test]
    fn test_plain_statuses() {
        let rules = ClassificationRules::default();
        assert_eq!(rules.classify_response(200, "", None), Outcome::Success);
        assert_eq!(rules.classify_response(204, "", None), Outcome::Success);
        assert_eq!(rules.classify_response(429, "", None), Outcome::RateLimited);
        assert_eq!(rules.classify_response(503, "", None), Outcome::TransientError);
        assert_eq!(rules.classify_response(404, "", None), Outcome::PermanentError);
        assert_eq!(rules.classify_response(400, "", None), Outcome::PermanentError);
        assert_eq!(rules.classify_response(304, "", None), Outcome::PermanentError);
    }

    #[test]
    fn test_captcha_wins_over_status() {
        let rules = rules();
        let body = "<div class=\"G-RECAPTCHA\"></div>";
        assert_eq!(rules.classify_response(200, body, None), Outcome::CaptchaRequired);
        assert_eq!(rules.classify_response(429, body, None), Outcome::CaptchaRequired);
        assert_eq!(rules.classify_response(503, body, None), Outcome::CaptchaRequired);
    }

    #[test]
    fn test_rate_limit_marker_on_success_status() {
        assert_eq!(
            rules().classify_response(200, "Please slow down", None),
            Outcome::RateLimited
        );
    }

    #[test]
    fn test_already_archived_in_body_or_final_url() {
        let rules = ClassificationRules::from_markers(&MarkerConfig {
            already_archived: vec!["already archived".to_string(), "/cached/".to_string()],
            ..MarkerConfig::default()
        });
        assert_eq!(
            rules.classify_response(200, "This page was already archived", None),
            Outcome::AlreadyArchived
        );
        assert_eq!(
            rules.classify_response(200, "", Some("https://svc.example/cached/1")),
            Outcome::AlreadyArchived
        );
        // A 5xx never reads as already archived
        assert_eq!(
            rules.classify_response(502, "already archived", None),
            Outcome::TransientError
        );
    }

    #[test]
    fn test_transport_failures() {
        let rules = ClassificationRules::default();
        assert_eq!(
            rules.classify_transport(TransportErrorKind::Timeout),
            Outcome::TransientError
        );
        assert_eq!(
            rules.classify_transport(TransportErrorKind::Connect),
            Outcome::TransientError
        );
        assert_eq!(
            rules.classify_transport(TransportErrorKind::InvalidRequest),
            Outcome::PermanentError
        );
    }

    #[test]
    fn test_archive_url_markers() {
        let rules = rules();
        assert!(rules.is_archive_url("https://web.archive.org/web/2024/https://example.com/"));
        assert!(!rules.is_archive_url("https://web.archive.org/save/"));
    }

    #[test]
    fn test_blank_markers_are_ignored() {
        let rules = ClassificationRules::from_markers(&MarkerConfig {
            captcha: vec!["  ".to_string()],
            ..MarkerConfig::default()
        });
        assert_eq!(rules.classify_response(200, "anything", None), Outcome::Success);
    }
}
