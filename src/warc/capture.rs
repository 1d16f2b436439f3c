//! Live page capture
//!
//! Fetches a page and keeps the exchange in a form the writer can turn into
//! a `request`/`response` record pair.

use super::store::write_container_file;
use super::{WarcInfo, WarcWriter};
use crate::config::{Config, UserAgentConfig};
use crate::dispatch::{build_http_client, BROWSER_ACCEPT};
use crate::output::page_title;
use crate::url::{container_file_name, validate_target_url};
use crate::Result;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::{Client, StatusCode};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::{Position, Url};

/// Timeout for fetching the page being captured
const CAPTURE_TIMEOUT: Duration = Duration::from_secs(30);

/// Response headers that no longer describe the stored (decoded) body
const STALE_RESPONSE_HEADERS: [&str; 3] = ["content-encoding", "transfer-encoding", "content-length"];

/// One captured HTTP exchange
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedExchange {
    /// The URL that produced the response (after redirects)
    pub url: Url,
    pub method: String,
    pub request_headers: Vec<(String, String)>,
    pub status: u16,
    pub reason: String,
    pub response_headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub captured_at: DateTime<Utc>,
}

impl CapturedExchange {
    /// Creates a GET exchange with the given response
    pub fn new(url: Url, status: u16, response_headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
        let reason = StatusCode::from_u16(status)
            .ok()
            .and_then(|code| code.canonical_reason())
            .unwrap_or_default()
            .to_string();

        Self {
            url,
            method: "GET".to_string(),
            request_headers: Vec::new(),
            status,
            reason,
            response_headers,
            body,
            captured_at: Utc::now(),
        }
    }

    /// The raw HTTP request, as stored in the `request` record
    pub fn request_block(&self) -> Vec<u8> {
        let mut head = format!(
            "{} {} HTTP/1.1\r\n",
            self.method,
            &self.url[Position::BeforePath..Position::AfterQuery]
        );

        let has_host = self
            .request_headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case("host"));
        if !has_host {
            head.push_str(&format!("Host: {}\r\n", host_header(&self.url)));
        }
        for (name, value) in &self.request_headers {
            head.push_str(&format!("{}: {}\r\n", name, value));
        }
        head.push_str("\r\n");
        head.into_bytes()
    }

    /// The raw HTTP response, as stored in the `response` record
    pub fn response_block(&self) -> Vec<u8> {
        let mut head = format!("HTTP/1.1 {} {}", self.status, self.reason)
            .trim_end()
            .to_string();
        head.push_str("\r\n");
        for (name, value) in &self.response_headers {
            head.push_str(&format!("{}: {}\r\n", name, value));
        }
        head.push_str("\r\n");

        let mut block = head.into_bytes();
        block.extend_from_slice(&self.body);
        block
    }
}

fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

/// Fetches a page and records the exchange
///
/// Any status is captured, including errors. The body is stored decoded, so
/// encoding headers are dropped and `Content-Length` matches the stored body.
///
/// # Arguments
///
/// * `client` - The HTTP client (see [`build_http_client`])
/// * `user_agent` - Identity headers sent, and recorded, with the request
/// * `target` - The page to capture
/// * `timeout` - Timeout for the whole fetch
pub async fn capture_page(
    client: &Client,
    user_agent: &UserAgentConfig,
    target: &Url,
    timeout: Duration,
) -> Result<CapturedExchange> {
    let captured_at = Utc::now();
    let request = client
        .get(target.clone())
        .header(USER_AGENT, user_agent.identity.as_str())
        .header(ACCEPT, BROWSER_ACCEPT)
        .header(ACCEPT_LANGUAGE, user_agent.accept_language.as_str())
        .timeout(timeout)
        .build()?;

    let request_headers: Vec<(String, String)> = request
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect();

    let response = client.execute(request).await?;
    let status = response.status();
    let final_url = response.url().clone();
    if &final_url != target {
        tracing::debug!("Capture of {} redirected to {}", target, final_url);
    }

    let response_headers: Vec<(String, String)> = response
        .headers()
        .iter()
        .filter(|(name, _)| !STALE_RESPONSE_HEADERS.contains(&name.as_str()))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect();

    let body = response.bytes().await?.to_vec();
    tracing::info!("Captured {} ({} bytes, status {})", final_url, body.len(), status.as_u16());

    let mut exchange = CapturedExchange::new(final_url, status.as_u16(), response_headers, body);
    exchange
        .response_headers
        .push(("Content-Length".to_string(), exchange.body.len().to_string()));
    exchange.request_headers = request_headers;
    exchange.captured_at = captured_at;
    Ok(exchange)
}

/// Captures a page into a new container under the configured WARC directory
///
/// The container holds a `warcinfo` record, the `request`/`response` pair
/// and, when `screenshot` is given, a `metadata` record pointing at it. The
/// file is flushed and synced before its path is returned. A failed write
/// leaves no file behind.
///
/// # Returns
///
/// * `Ok(PathBuf)` - Path of the closed container
/// * `Err(DispatchError)` - Invalid URL, fetch failure or write failure
pub async fn archive_page(config: &Config, target: &str, screenshot: Option<&Path>) -> Result<PathBuf> {
    let url = validate_target_url(target)?;
    let client = build_http_client(&config.user_agent)?;
    let exchange = capture_page(&client, &config.user_agent, &url, CAPTURE_TIMEOUT).await?;

    let compress = config.output.compress;
    let dir = PathBuf::from(&config.output.warc_dir);
    std::fs::create_dir_all(&dir)?;

    let name = container_file_name(&url, exchange.captured_at, compress);
    let path = dir.join(&name);

    let mut info = WarcInfo::new(&name).with_field("description", format!("Capture of {}", url));
    if let Some(title) = page_title(&String::from_utf8_lossy(&exchange.body)) {
        info = info.with_field("title", title);
    }

    let (mut records, mut bytes) = (0, 0);
    write_container_file(&path, |file| {
        let mut writer = WarcWriter::new(BufWriter::new(file), compress, info);
        let response_id = writer.write_capture(&exchange)?;

        if let Some(screenshot) = screenshot {
            writer.write_metadata(
                &response_id,
                exchange.url.as_str(),
                &[("screenshot".to_string(), screenshot.display().to_string())],
            )?;
        }

        records = writer.records_written();
        bytes = writer.bytes_written();
        Ok(writer.finish()?.into_inner().map_err(|e| e.into_error())?)
    })?;

    tracing::info!("Wrote {} record(s), {} bytes to {}", records, bytes, path.display());
    Ok(path)
}
