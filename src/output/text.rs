//! Visible-text extraction from HTML
//!
//! Produces the plain text handed to diffing and to the AI collaborator:
//! - Script, style and other non-visible elements are dropped
//! - Block elements start new lines
//! - Whitespace is collapsed and empty lines removed

use crate::dispatch::BROWSER_ACCEPT;
use crate::{DispatchError, Result};
use reqwest::header::ACCEPT;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use url::Url;

/// Elements whose content is never visible text
const HIDDEN_ELEMENTS: &[&str] = &[
    "head", "script", "style", "noscript", "template", "meta", "link", "svg", "iframe",
];

/// Elements that break the text flow
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "figcaption",
    "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main",
    "nav", "ol", "p", "pre", "section", "table", "td", "th", "tr", "ul",
];

/// Extracts the visible text of an HTML document
///
/// # Examples
///
/// ```
/// use archive_dispatch::output::extract_text;
///
/// let html = "<html><head><title>T</title></head><body><p>Hello\n   world</p><script>x()</script><p>Bye</p></body></html>";
/// assert_eq!(extract_text(html), "Hello\nworld\nBye");
/// ```
pub fn extract_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut raw = String::new();
    collect_text(document.root_element(), &mut raw);

    raw.lines()
        .flat_map(|line| line.split("  "))
        .map(|chunk| chunk.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|chunk| !chunk.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn collect_text(element: ElementRef, out: &mut String) {
    let name = element.value().name();
    if HIDDEN_ELEMENTS.contains(&name) {
        return;
    }

    let block = BLOCK_ELEMENTS.contains(&name);
    if block {
        out.push('\n');
    }
    for child in element.children() {
        if let Some(child) = ElementRef::wrap(child) {
            collect_text(child, out);
        } else if let Some(text) = child.value().as_text() {
            out.push_str(text);
        }
    }
    if block {
        out.push('\n');
    }
}

/// Extracts the page title
pub fn page_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("title").ok()?;

    document
        .select(&selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|title| !title.is_empty())
}

/// Fetches a page and extracts its visible text
///
/// # Returns
///
/// * `Ok(String)` - The extracted text
/// * `Err(DispatchError::HttpStatus)` - The page answered with a non-2xx status
/// * `Err(DispatchError::Reqwest)` - The page could not be fetched
pub async fn fetch_text(client: &Client, url: &Url, timeout: Duration) -> Result<String> {
    let response = client
        .get(url.clone())
        .header(ACCEPT, BROWSER_ACCEPT)
        .timeout(timeout)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(DispatchError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let html = response.text().await?;
    Ok(extract_text(&html))
}
