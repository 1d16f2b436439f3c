//! HTTP request executor
//!
//! This module issues exactly one network call per `execute` and classifies
//! the result:
//! - Building HTTP clients with a browser-like identity
//! - Form submissions and plain GETs with per-request timeouts
//! - Retry-After capture
//! - Transport error classification
//!
//! The executor never touches the rate limiter; callers acquire first.

use crate::config::UserAgentConfig;
use crate::dispatch::ClassificationRules;
use crate::outcome::{AttemptStatus, SubmissionAttempt, TransportErrorKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, RETRY_AFTER};
use reqwest::{redirect::Policy, Client};
use std::time::Duration;
use tokio::time::Instant;

/// Largest response body kept on an attempt
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Accept header a desktop browser sends for a page navigation
pub(crate) const BROWSER_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// HTTP method of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// One outgoing request, independent of the HTTP client in use
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub url: String,
    pub method: Method,
    /// Extra headers on top of the client defaults
    pub headers: Vec<(String, String)>,
    /// URL-encoded form fields (POST only)
    pub form: Vec<(String, String)>,
    pub timeout: Duration,
}

impl HttpRequest {
    /// A GET request
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            method: Method::Get,
            headers: Vec::new(),
            form: Vec::new(),
            timeout,
        }
    }

    /// A POST request with a URL-encoded form body
    pub fn post_form(url: impl Into<String>, form: Vec<(String, String)>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            method: Method::Post,
            headers: Vec::new(),
            form,
            timeout,
        }
    }

    /// Adds a header
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    /// Returns the value of a form field
    pub fn form_value(&self, name: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Issues one network call and classifies the result
///
/// Implementations must not retry, sleep for rate limiting, or fail: every
/// problem is reported through the returned attempt's outcome.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, request: &HttpRequest, rules: &ClassificationRules) -> SubmissionAttempt;
}

/// Builds an HTTP client with proper configuration
///
/// The client keeps cookies and pooled connections for its lifetime, so one
/// client per service acts as that service's session.
///
/// # Arguments
///
/// * `config` - The user agent configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
    if let Ok(language) = HeaderValue::from_str(&config.accept_language) {
        headers.insert(ACCEPT_LANGUAGE, language);
    }

    Client::builder()
        .user_agent(config.identity.as_str())
        .default_headers(headers)
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .cookie_store(true)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Executor backed by a reqwest client
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    client: Client,
}

impl HttpExecutor {
    /// Creates an executor with its own client (and so its own session)
    pub fn new(config: &UserAgentConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config)?,
        })
    }

    /// Wraps an existing client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn transport_failure(
        request: &HttpRequest,
        rules: &ClassificationRules,
        error: &reqwest::Error,
        started: Instant,
    ) -> SubmissionAttempt {
        let kind = transport_kind(error);
        tracing::debug!(
            "{} {} failed: {} ({})",
            method_name(request.method),
            request.url,
            error,
            kind.as_str()
        );

        SubmissionAttempt {
            url: request.url.clone(),
            status: AttemptStatus::Transport(kind),
            final_url: None,
            body: error.to_string(),
            retry_after: None,
            elapsed: started.elapsed(),
            throttled: Duration::ZERO,
            outcome: rules.classify_transport(kind),
        }
    }
}

#[async_trait]
impl Executor for HttpExecutor {
    async fn execute(&self, request: &HttpRequest, rules: &ClassificationRules) -> SubmissionAttempt {
        let started = Instant::now();

        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        }
        .timeout(request.timeout);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.form.is_empty() {
            builder = builder.form(&request.form);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => return Self::transport_failure(request, rules, &e, started),
        };

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let retry_after = parse_retry_after(response.headers());

        let body = match read_capped(response).await {
            Ok(body) => body,
            Err(e) => return Self::transport_failure(request, rules, &e, started),
        };

        let outcome = rules.classify_response(status, &body, Some(&final_url));
        tracing::debug!(
            "{} {} -> HTTP {} ({}) in {:?}",
            method_name(request.method),
            request.url,
            status,
            outcome,
            started.elapsed()
        );

        SubmissionAttempt {
            url: request.url.clone(),
            status: AttemptStatus::Http(status),
            final_url: Some(final_url),
            body,
            retry_after,
            elapsed: started.elapsed(),
            throttled: Duration::ZERO,
            outcome,
        }
    }
}

fn method_name(method: Method) -> &'static str {
    match method {
        Method::Get => "GET",
        Method::Post => "POST",
    }
}

/// Maps a reqwest error onto a transport failure kind
fn transport_kind(error: &reqwest::Error) -> TransportErrorKind {
    if error.is_timeout() {
        TransportErrorKind::Timeout
    } else if error.is_connect() {
        TransportErrorKind::Connect
    } else if error.is_builder() {
        TransportErrorKind::InvalidRequest
    } else if error.is_body() || error.is_decode() {
        TransportErrorKind::Body
    } else {
        TransportErrorKind::Other
    }
}

/// Reads the body chunk by chunk, stopping once `MAX_BODY_BYTES` are held
///
/// The remainder of a larger body is never downloaded.
async fn read_capped(mut response: reqwest::Response) -> reqwest::Result<String> {
    let mut bytes = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        let room = MAX_BODY_BYTES - bytes.len();
        if chunk.len() >= room {
            bytes.extend_from_slice(&chunk[..room]);
            break;
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(body_text(bytes))
}

/// Decodes a (possibly cut) body as UTF-8
///
/// A character split by the cap is dropped; other invalid bytes are replaced.
fn body_text(mut bytes: Vec<u8>) -> String {
    if let Err(e) = std::str::from_utf8(&bytes) {
        if e.error_len().is_none() {
            bytes.truncate(e.valid_up_to());
        }
    }
    String::from_utf8(bytes).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

/// Parses a `Retry-After` header given in seconds or as an HTTP date
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    (at - Utc::now()).to_std().ok()
}
