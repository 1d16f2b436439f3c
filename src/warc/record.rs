use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::{self, Write};
use uuid::Uuid;

/// Version line written at the start of every record
pub const WARC_VERSION: &str = "WARC/1.0";

/// MIME type of request/response blocks holding a raw HTTP message
pub const HTTP_RESPONSE_TYPE: &str = "application/http; msgtype=response";
pub const HTTP_REQUEST_TYPE: &str = "application/http; msgtype=request";

/// The kind of a WARC record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordType {
    Warcinfo,
    Request,
    Response,
    Metadata,
    Resource,
    /// Any type this crate does not handle specially
    Other(String),
}

impl RecordType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Warcinfo => "warcinfo",
            Self::Request => "request",
            Self::Response => "response",
            Self::Metadata => "metadata",
            Self::Resource => "resource",
            Self::Other(name) => name,
        }
    }

    /// Parses a `WARC-Type` value; matching is case-insensitive
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "warcinfo" => Self::Warcinfo,
            "request" => Self::Request,
            "response" => Self::Response,
            "metadata" => Self::Metadata,
            "resource" => Self::Resource,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named header fields of a record
///
/// Lookups ignore case. Serialization keeps insertion order, but two header
/// sets are equal when they hold the same fields in any order.
#[derive(Debug, Clone, Default)]
pub struct WarcHeaders {
    entries: Vec<(String, String)>,
}

impl WarcHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the first value of a header
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Replaces a header in place, or appends it when absent
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
        {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name.to_string(), value)),
        }
    }

    /// Appends a header, keeping existing values with the same name
    pub fn append(&mut self, name: &str, value: impl Into<String>) {
        self.entries.push((name.to_string(), value.into()));
    }

    /// Removes every value of a header, returning the first
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let mut removed = None;
        self.entries.retain(|(key, value)| {
            if key.eq_ignore_ascii_case(name) {
                if removed.is_none() {
                    removed = Some(value.clone());
                }
                false
            } else {
                true
            }
        });
        removed
    }

    /// Iterates headers in serialization order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn normalized(&self) -> Vec<(String, &str)> {
        let mut fields: Vec<(String, &str)> = self
            .entries
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.as_str()))
            .collect();
        fields.sort();
        fields
    }
}

impl PartialEq for WarcHeaders {
    fn eq(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }
}

impl Eq for WarcHeaders {}

/// One record of a WARC container
///
/// Records are immutable once built; `Content-Length` always equals the
/// block length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarcRecord {
    headers: WarcHeaders,
    block: Vec<u8>,
}

impl WarcRecord {
    /// Starts building a new record of the given type
    pub fn builder(record_type: RecordType) -> WarcRecordBuilder {
        WarcRecordBuilder::new(record_type)
    }

    /// Assembles a parsed record; the caller guarantees the block was read
    /// using the declared content length
    pub(crate) fn from_parts(headers: WarcHeaders, block: Vec<u8>) -> Self {
        Self { headers, block }
    }

    pub fn headers(&self) -> &WarcHeaders {
        &self.headers
    }

    pub fn record_type(&self) -> RecordType {
        RecordType::parse(self.headers.get("WARC-Type").unwrap_or_default())
    }

    pub fn record_id(&self) -> Option<&str> {
        self.headers.get("WARC-Record-ID")
    }

    pub fn target_uri(&self) -> Option<&str> {
        self.headers.get("WARC-Target-URI")
    }

    pub fn date(&self) -> Option<DateTime<Utc>> {
        self.headers
            .get("WARC-Date")
            .and_then(|value| DateTime::parse_from_rfc3339(value).ok())
            .map(|date| date.with_timezone(&Utc))
    }

    /// The declared `Content-Length`
    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .get("Content-Length")
            .and_then(|value| value.trim().parse().ok())
    }

    /// The whole record block
    pub fn block(&self) -> &[u8] {
        &self.block
    }

    /// Returns true if the block holds a raw HTTP message
    pub fn is_http(&self) -> bool {
        matches!(self.record_type(), RecordType::Request | RecordType::Response)
            && self
                .headers
                .get("Content-Type")
                .map(|value| value.trim_start().to_ascii_lowercase().starts_with("application/http"))
                .unwrap_or(false)
    }

    /// The HTTP start line and headers of a request/response block
    pub fn http_head(&self) -> Option<&[u8]> {
        if !self.is_http() {
            return None;
        }
        let end = head_end(&self.block).unwrap_or(self.block.len());
        Some(&self.block[..end])
    }

    /// The content carried by the record
    ///
    /// For HTTP request/response records this is the entity body after the
    /// HTTP headers; for every other record it is the whole block.
    pub fn payload(&self) -> &[u8] {
        if !self.is_http() {
            return &self.block;
        }
        match head_end(&self.block) {
            Some(end) => &self.block[end + 4..],
            None => &[],
        }
    }

    /// The status code of an HTTP response record
    pub fn http_status(&self) -> Option<u16> {
        if self.record_type() != RecordType::Response {
            return None;
        }
        let head = self.http_head()?;
        let line_end = head.iter().position(|&b| b == b'\n').unwrap_or(head.len());
        String::from_utf8_lossy(&head[..line_end])
            .split_whitespace()
            .nth(1)
            .and_then(|code| code.parse().ok())
    }

    /// Checks `WARC-Block-Digest` against the block
    ///
    /// # Returns
    ///
    /// * `Some(bool)` - Whether a sha256 digest matches
    /// * `None` - No digest, or an algorithm other than sha256
    pub fn digest_matches(&self) -> Option<bool> {
        let declared = self.headers.get("WARC-Block-Digest")?;
        let (algorithm, value) = declared.split_once(':')?;
        if !algorithm.trim().eq_ignore_ascii_case("sha256") {
            return None;
        }
        Some(value.trim().eq_ignore_ascii_case(&hex::encode(Sha256::digest(&self.block))))
    }

    /// Writes the record with WARC 1.0 framing
    ///
    /// Version line, header lines, a blank line, the block, then two CRLFs.
    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        write!(out, "{}\r\n", WARC_VERSION)?;
        for (name, value) in self.headers.iter() {
            write!(out, "{}: {}\r\n", name, value)?;
        }
        out.write_all(b"\r\n")?;
        out.write_all(&self.block)?;
        out.write_all(b"\r\n\r\n")
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.block.len() + 512);
        // Writing into a Vec cannot fail
        let _ = self.write_to(&mut bytes);
        bytes
    }
}

fn head_end(block: &[u8]) -> Option<usize> {
    block.windows(4).position(|window| window == b"\r\n\r\n")
}

/// Generates a fresh `WARC-Record-ID`
pub fn new_record_id() -> String {
    format!("<urn:uuid:{}>", Uuid::new_v4())
}

/// Formats a timestamp the way `WARC-Date` expects
pub fn format_warc_date(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Headers `build` always sets itself
const COMPUTED_HEADERS: [&str; 5] = [
    "WARC-Type",
    "WARC-Record-ID",
    "WARC-Date",
    "Content-Length",
    "WARC-Block-Digest",
];

/// Builder for [`WarcRecord`]
///
/// `build` fills in `WARC-Record-ID`, `WARC-Date`, `Content-Length` and a
/// sha256 `WARC-Block-Digest`.
#[derive(Debug, Clone)]
pub struct WarcRecordBuilder {
    record_type: RecordType,
    record_id: Option<String>,
    date: Option<DateTime<Utc>>,
    headers: WarcHeaders,
    block: Vec<u8>,
}

impl WarcRecordBuilder {
    fn new(record_type: RecordType) -> Self {
        Self {
            record_type,
            record_id: None,
            date: None,
            headers: WarcHeaders::new(),
            block: Vec::new(),
        }
    }

    pub fn record_id(mut self, id: impl Into<String>) -> Self {
        self.record_id = Some(id.into());
        self
    }

    pub fn date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    pub fn target_uri(self, uri: &str) -> Self {
        self.header("WARC-Target-URI", uri)
    }

    pub fn content_type(self, content_type: &str) -> Self {
        self.header("Content-Type", content_type)
    }

    pub fn concurrent_to(self, record_id: &str) -> Self {
        self.header("WARC-Concurrent-To", record_id)
    }

    /// Sets any other header
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    pub fn block(mut self, block: impl Into<Vec<u8>>) -> Self {
        self.block = block.into();
        self
    }

    pub fn build(self) -> WarcRecord {
        let mut headers = WarcHeaders::new();
        headers.set("WARC-Type", self.record_type.as_str());
        headers.set("WARC-Record-ID", self.record_id.unwrap_or_else(new_record_id));
        headers.set("WARC-Date", format_warc_date(self.date.unwrap_or_else(Utc::now)));

        for (name, value) in self.headers.iter() {
            let computed = COMPUTED_HEADERS
                .iter()
                .any(|reserved| reserved.eq_ignore_ascii_case(name));
            if !computed {
                headers.append(name, value);
            }
        }

        headers.set("Content-Length", self.block.len().to_string());
        headers.set(
            "WARC-Block-Digest",
            format!("sha256:{}", hex::encode(Sha256::digest(&self.block))),
        );

        WarcRecord {
            headers,
            block: self.block,
        }
    }
}
