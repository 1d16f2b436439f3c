//! Integration tests for the dispatcher
//!
//! These tests use wiremock to stand in for archiving services and drive
//! full submissions through the orchestrator, adapters and HTTP executor.

use archive_dispatch::config::{parse_config, Config, DispatchMode};
use archive_dispatch::dispatch::{
    BucketSpec, ClassificationRules, Executor, HttpExecutor, HttpRequest, RateLimiter,
};
use archive_dispatch::outcome::{Outcome, SubmissionAttempt};
use archive_dispatch::services::{build_adapter, ServiceProfile};
use archive_dispatch::Orchestrator;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Mirror service with three mirrors on one mock server
fn mirror_config(base: &str) -> Config {
    parse_config(&format!(
        r#"
[dispatcher]
deadline-ms = 10000

[[service]]
name = "archive_today"
kind = "mirror"
rate = 10.0
burst = 5
timeout-ms = 2000
endpoints = ["{base}/m1/submit/", "{base}/m2/submit/", "{base}/m3/submit/"]
retry-schedule-ms = [10, 10, 10]
max-attempts = 4

[service.markers]
captcha = ["g-recaptcha"]
archive-url = ["/archive/"]
"#
    ))
    .expect("Failed to parse mirror config")
}

/// Executor that counts calls before delegating to HTTP
struct CountingExecutor {
    inner: HttpExecutor,
    calls: AtomicUsize,
}

impl CountingExecutor {
    fn new() -> Self {
        Self {
            inner: HttpExecutor::with_client(reqwest::Client::new()),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Executor for CountingExecutor {
    async fn execute(&self, request: &HttpRequest, rules: &ClassificationRules) -> SubmissionAttempt {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.execute(request, rules).await
    }
}

/// Builds an orchestrator whose only adapter uses `executor`
fn counting_orchestrator(config: &Config, executor: Arc<CountingExecutor>) -> Orchestrator {
    let limiter = Arc::new(RateLimiter::from_config(config));
    let profile = ServiceProfile::from_config(&config.services[0]);
    let adapter = build_adapter(profile, DispatchMode::Enhanced, Arc::clone(&limiter), executor);
    Orchestrator::new(limiter, Some(Duration::from_secs(10))).with_adapter(adapter)
}

#[tokio::test]
async fn test_mirror_rotation_reaches_third_mirror() {
    let server = MockServer::start().await;
    let base = server.uri();

    for failing in ["/m1/submit/", "/m2/submit/"] {
        Mock::given(method("POST"))
            .and(path(failing))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;
    }
    Mock::given(method("POST"))
        .and(path("/m3/submit/"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/archive/abc"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/archive/abc"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<p>archived copy</p>"))
        .mount(&server)
        .await;

    let config = mirror_config(&base);
    let orchestrator = Orchestrator::from_config(&config).unwrap();
    let report = orchestrator
        .submit_all("https://example.com/article", &["archive_today"])
        .await
        .unwrap();

    let result = report.get("archive_today").unwrap();
    assert_eq!(result.outcome, Outcome::Success);
    assert_eq!(result.attempts, 3);
    assert_eq!(result.archive_url.as_deref(), Some(format!("{}/archive/abc", base).as_str()));
    assert_eq!(orchestrator.limiter().grants("archive_today"), 3);
}

#[tokio::test]
async fn test_captcha_stops_rotation() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/m1/submit/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"<form><div class="g-recaptcha"></div></form>"#),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/m2/submit/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let config = mirror_config(&server.uri());
    let orchestrator = Orchestrator::from_config(&config).unwrap();
    let report = orchestrator
        .submit_all("https://example.com/", &["archive_today"])
        .await
        .unwrap();

    let result = report.get("archive_today").unwrap();
    assert_eq!(result.outcome, Outcome::CaptchaRequired);
    assert_eq!(result.attempts, 1);
    assert!(result.message.contains("CAPTCHA"));
    assert!(!result.outcome.is_retryable());
}

#[tokio::test]
async fn test_already_archived_spends_no_submission_slot() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/wayback/available"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            r#"{{"archived_snapshots":{{"closest":{{"available":true,"status":"200","timestamp":"20240101000000","url":"{}/web/20240101000000/https://example.com/"}}}}}}"#,
            base
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/save/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let config = parse_config(&format!(
        r#"
[[service]]
name = "wayback_machine"
kind = "primary"
rate = 0.2
burst = 2
endpoints = ["{base}/save/"]
check-endpoint = "{base}/wayback/available?url={{url_encoded}}"
retry-schedule-ms = [10, 10]

[service.markers]
archive-url = ["/web/"]
"#
    ))
    .unwrap();

    let orchestrator = Orchestrator::from_config(&config).unwrap();
    let report = orchestrator
        .submit_all("https://example.com", &["wayback_machine"])
        .await
        .unwrap();

    let result = report.get("wayback_machine").unwrap();
    assert_eq!(result.outcome, Outcome::AlreadyArchived);
    assert!(result.archive_url.as_deref().unwrap().contains("/web/20240101000000/"));
    assert_eq!(orchestrator.limiter().grants("wayback_machine"), 0);
    assert_eq!(orchestrator.limiter().grants("wayback_machine:check"), 1);
}

#[tokio::test]
async fn test_availability_check_leaves_submission_token() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/wayback/available"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"url":"https://example.com/","archived_snapshots":{}}"#),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/save/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("saved"))
        .expect(1)
        .mount(&server)
        .await;

    let config = parse_config(&format!(
        r#"
[dispatcher]
mode = "basic"

[[service]]
name = "wayback_machine"
kind = "primary"
rate = 0.2
burst = 1
endpoints = ["{base}/save/"]
check-endpoint = "{base}/wayback/available?url={{url_encoded}}"
"#
    ))
    .unwrap();

    let orchestrator = Orchestrator::from_config(&config).unwrap();
    let started = std::time::Instant::now();
    let report = orchestrator
        .submit_all_with_deadline(
            "https://example.com/",
            &["wayback_machine"],
            Some(Duration::from_secs(2)),
        )
        .await
        .unwrap();

    let result = report.get("wayback_machine").unwrap();
    assert_eq!(result.outcome, Outcome::Success);
    assert_eq!(result.attempts, 2);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(orchestrator.limiter().grants("wayback_machine"), 1);
    assert_eq!(orchestrator.limiter().grants("wayback_machine:check"), 1);
}

#[tokio::test]
async fn test_deadline_keeps_finished_results() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("POST"))
        .and(path("/fast/submit/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("queued"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/slow/submit/"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let config = parse_config(&format!(
        r#"
[[service]]
name = "fast"
kind = "mirror"
rate = 10.0
burst = 5
endpoints = ["{base}/fast/submit/"]

[[service]]
name = "slow"
kind = "mirror"
rate = 10.0
burst = 5
endpoints = ["{base}/slow/submit/"]
"#
    ))
    .unwrap();

    let orchestrator = Orchestrator::from_config(&config).unwrap();
    let started = std::time::Instant::now();
    let report = orchestrator
        .submit_all_with_deadline(
            "https://example.com/",
            &["fast", "slow"],
            Some(Duration::from_millis(300)),
        )
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(report.results.len(), 2);
    assert_eq!(report.get("fast").unwrap().outcome, Outcome::Success);
    assert_eq!(report.get("slow").unwrap().outcome, Outcome::Timeout);
    assert_eq!(report.success_count(), 1);
}

#[tokio::test]
async fn test_invalid_target_makes_no_calls() {
    let server = MockServer::start().await;
    let config = mirror_config(&server.uri());
    let executor = Arc::new(CountingExecutor::new());
    let orchestrator = counting_orchestrator(&config, Arc::clone(&executor));

    let err = orchestrator
        .submit_all("not-a-url", &["archive_today"])
        .await
        .unwrap_err();
    assert!(err.is_invalid_input());

    let err = orchestrator
        .submit_all("ftp://example.com/file", &["archive_today"])
        .await
        .unwrap_err();
    assert!(err.is_invalid_input());

    let none: [&str; 0] = [];
    let err = orchestrator
        .submit_all("https://example.com/", &none)
        .await
        .unwrap_err();
    assert!(err.is_invalid_input());

    assert_eq!(executor.calls(), 0);
    assert_eq!(orchestrator.limiter().total_acquisitions(), 0);
}

#[tokio::test]
async fn test_persistent_failure_exhausts_schedule() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let config = mirror_config(&server.uri());
    let executor = Arc::new(CountingExecutor::new());
    let orchestrator = counting_orchestrator(&config, Arc::clone(&executor));

    let report = orchestrator
        .submit_all("https://example.com/", &["archive_today"])
        .await
        .unwrap();

    let result = report.get("archive_today").unwrap();
    assert_eq!(result.outcome, Outcome::TransientError);
    assert_eq!(result.attempts, 4);
    assert_eq!(executor.calls(), 4);
    assert!(result.message.contains("may succeed if retried later"));
}

#[tokio::test]
async fn test_limiter_spacing_between_submissions() {
    let limiter = RateLimiter::new(BucketSpec::new(1.0, 1)).with_bucket("svc", BucketSpec::new(20.0, 1));

    assert_eq!(limiter.acquire("svc"), Duration::ZERO);
    let wait = limiter.acquire("svc");
    assert!(wait > Duration::ZERO && wait <= Duration::from_millis(50));
    assert_eq!(limiter.acquire("other"), Duration::ZERO);
}
