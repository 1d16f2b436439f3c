//! Built-in defaults
//!
//! An empty configuration file yields the three services below with the
//! per-service rates and bursts they are known to tolerate.

use crate::config::types::{MarkerConfig, ServiceConfig, ServiceKind, SourceConfig, SourceFormat};

pub(crate) fn deadline_ms() -> Option<u64> {
    Some(180_000)
}

pub(crate) fn default_rate() -> f64 {
    0.33
}

pub(crate) fn default_burst() -> u32 {
    2
}

pub(crate) fn identity() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/124.0 Safari/537.36"
        .to_string()
}

pub(crate) fn accept_language() -> String {
    "en-US,en;q=0.5".to_string()
}

pub(crate) fn warc_dir() -> String {
    "local_archives".to_string()
}

pub(crate) fn compress() -> bool {
    true
}

pub(crate) fn timeout_ms() -> u64 {
    30_000
}

pub(crate) fn max_total_wait_ms() -> u64 {
    180_000
}

pub(crate) fn max_attempts() -> u32 {
    6
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// The default service set
pub fn default_services() -> Vec<ServiceConfig> {
    vec![wayback_machine(), archive_today(), memento()]
}

fn wayback_machine() -> ServiceConfig {
    ServiceConfig {
        name: "wayback_machine".to_string(),
        kind: ServiceKind::Primary,
        rate: 0.2,
        burst: 2,
        timeout_ms: 30_000,
        endpoints: strings(&["https://web.archive.org/save/"]),
        check_endpoint: Some("https://archive.org/wayback/available?url={url_encoded}".to_string()),
        lookup_endpoint: Some("https://web.archive.org/web/*/{url}".to_string()),
        retry_schedule_ms: vec![5_000, 10_000, 15_000, 20_000, 30_000],
        max_total_wait_ms: 180_000,
        max_attempts: 6,
        shuffle_mirrors: false,
        markers: MarkerConfig {
            captcha: vec![],
            already_archived: strings(&["has already been captured", "already archived"]),
            rate_limited: strings(&["too many captures", "you have already reached the limit"]),
            archive_url: strings(&["/web/"]),
        },
        sources: vec![],
    }
}

fn archive_today() -> ServiceConfig {
    ServiceConfig {
        name: "archive_today".to_string(),
        kind: ServiceKind::Mirror,
        rate: 0.1,
        burst: 1,
        timeout_ms: 60_000,
        endpoints: strings(&[
            "https://archive.today/submit/",
            "https://archive.ph/submit/",
            "https://archive.is/submit/",
            "https://archive.fo/submit/",
        ]),
        check_endpoint: None,
        lookup_endpoint: Some("{origin}/{url}".to_string()),
        retry_schedule_ms: vec![2_000, 4_000, 8_000],
        max_total_wait_ms: 120_000,
        max_attempts: 4,
        shuffle_mirrors: true,
        markers: MarkerConfig {
            captcha: strings(&["hcaptcha", "g-recaptcha", "cf-challenge", "captcha"]),
            already_archived: strings(&["this page was last archived", "my url is alive and i want to archive its content"]),
            rate_limited: strings(&["too many requests"]),
            archive_url: strings(&["/archive/", "/wip/"]),
        },
        sources: vec![],
    }
}

fn memento() -> ServiceConfig {
    let source = |name: &str, template: &str, format: SourceFormat| SourceConfig {
        name: name.to_string(),
        template: template.to_string(),
        format,
    };

    ServiceConfig {
        name: "memento".to_string(),
        kind: ServiceKind::Aggregate,
        rate: 0.5,
        burst: 3,
        timeout_ms: 30_000,
        endpoints: vec![],
        check_endpoint: None,
        lookup_endpoint: None,
        retry_schedule_ms: vec![],
        max_total_wait_ms: 60_000,
        max_attempts: 1,
        shuffle_mirrors: false,
        markers: MarkerConfig::default(),
        sources: vec![
            source(
                "Memento",
                "http://timetravel.mementoweb.org/api/json/{url}",
                SourceFormat::MementoJson,
            ),
            source("Wayback Machine", "https://web.archive.org/web/*/{url}", SourceFormat::Link),
            source("Archive.today", "https://archive.today/{url}", SourceFormat::Link),
            source("Archive.is", "https://archive.is/{url}", SourceFormat::Link),
            source("WebCite", "http://www.webcitation.org/query?url={url_encoded}", SourceFormat::Link),
            source("Megalodon", "http://megalodon.jp/?url={url_encoded}", SourceFormat::Link),
            source("TimeTravel", "https://timetravel.mementoweb.org/list/{url}", SourceFormat::Link),
            source("Perma.cc", "https://perma.cc/search?q={url_encoded}", SourceFormat::Link),
        ],
    }
}
