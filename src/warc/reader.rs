//! Lazy, forward-only container reader
//!
//! Records are parsed one at a time as the iterator advances. A damaged
//! record yields a recoverable [`WarcError::Corrupt`] and the reader moves on
//! to the next record boundary it can find; a container that ends in the
//! middle of a record yields [`WarcError::Truncated`] and iteration stops.

use super::record::{WarcHeaders, WarcRecord};
use super::{WarcError, WarcResult};
use flate2::bufread::GzDecoder;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor, Read};
use std::path::Path;

/// Leading bytes of every gzip member
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Keeps track of how many bytes have been consumed from a source
struct Counting<R> {
    inner: R,
    position: u64,
}

impl<R: BufRead> Read for Counting<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.inner.read(buf)?;
        self.position += read as u64;
        Ok(read)
    }
}

impl<R: BufRead> BufRead for Counting<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.inner.consume(amt);
        self.position += amt as u64;
    }
}

enum Parsed {
    End,
    Record(WarcRecord),
    Corrupt(String),
    Truncated(String),
}

fn preview(text: &str) -> String {
    text.chars().take(40).collect()
}

/// Parses the next record of an uncompressed stream
///
/// Blank lines before the version line are skipped. Any other line there is
/// reported as corrupt, unless `skip_garbage` is set.
fn parse_record<B: BufRead>(src: &mut B, skip_garbage: bool) -> io::Result<Parsed> {
    let mut line = Vec::new();
    loop {
        line.clear();
        if src.read_until(b'\n', &mut line)? == 0 {
            return Ok(Parsed::End);
        }
        let text = String::from_utf8_lossy(&line);
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        if text.starts_with("WARC/") {
            break;
        }
        if !skip_garbage {
            return Ok(Parsed::Corrupt(format!(
                "expected a WARC version line, found {:?}",
                preview(text)
            )));
        }
    }

    let mut headers = WarcHeaders::new();
    let mut last_name: Option<String> = None;
    loop {
        line.clear();
        if src.read_until(b'\n', &mut line)? == 0 {
            return Ok(Parsed::Truncated("stream ended inside the header block".to_string()));
        }
        let raw = String::from_utf8_lossy(&line);
        let text = raw.trim_end_matches(['\r', '\n']);
        if text.is_empty() {
            break;
        }

        // Folded header value
        if text.starts_with([' ', '\t']) {
            match &last_name {
                Some(name) => {
                    let folded = format!("{} {}", headers.get(name).unwrap_or_default(), text.trim());
                    headers.set(name, folded);
                    continue;
                }
                None => {
                    return Ok(Parsed::Corrupt("continuation line before any header".to_string()));
                }
            }
        }

        match text.split_once(':') {
            Some((name, value)) if !name.trim().is_empty() => {
                headers.append(name.trim(), value.trim());
                last_name = Some(name.trim().to_string());
            }
            _ => {
                return Ok(Parsed::Corrupt(format!(
                    "malformed header line {:?}",
                    preview(text)
                )));
            }
        }
    }

    let length: u64 = match headers.get("Content-Length").map(|v| v.trim().parse()) {
        Some(Ok(length)) => length,
        Some(Err(_)) => {
            return Ok(Parsed::Corrupt(format!(
                "invalid Content-Length {:?}",
                headers.get("Content-Length").unwrap_or_default()
            )));
        }
        None => return Ok(Parsed::Corrupt("missing Content-Length".to_string())),
    };

    let mut block = Vec::new();
    let read = src.by_ref().take(length).read_to_end(&mut block)? as u64;
    if read < length {
        return Ok(Parsed::Truncated(format!(
            "block has {} of {} declared bytes",
            read, length
        )));
    }

    Ok(Parsed::Record(WarcRecord::from_parts(headers, block)))
}

/// Iterator over the records of a container
///
/// Compression is detected from the first bytes. The sequence can be
/// consumed once; it never rewinds.
pub struct WarcReader<R: BufRead> {
    source: Counting<R>,
    compressed: Option<bool>,
    pending: VecDeque<WarcResult<WarcRecord>>,
    resyncing: bool,
    finished: bool,
}

impl WarcReader<BufReader<File>> {
    /// Opens a container file
    pub fn open(path: impl AsRef<Path>) -> WarcResult<Self> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: BufRead> WarcReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            source: Counting {
                inner: source,
                position: 0,
            },
            compressed: None,
            pending: VecDeque::new(),
            resyncing: false,
            finished: false,
        }
    }

    /// Whether the container is gzip-compressed; `None` before the first read
    pub fn is_compressed(&self) -> Option<bool> {
        self.compressed
    }

    /// Bytes consumed from the underlying source so far
    pub fn position(&self) -> u64 {
        self.source.position
    }

    fn next_plain(&mut self) -> Option<WarcResult<WarcRecord>> {
        let offset = self.source.position;
        match parse_record(&mut self.source, self.resyncing) {
            Ok(Parsed::End) => None,
            Ok(Parsed::Record(record)) => {
                self.resyncing = false;
                Some(Ok(record))
            }
            Ok(Parsed::Corrupt(reason)) => {
                tracing::warn!("Skipping corrupt record at byte {}: {}", offset, reason);
                self.resyncing = true;
                Some(Err(WarcError::Corrupt { offset, reason }))
            }
            Ok(Parsed::Truncated(reason)) => {
                self.finished = true;
                Some(Err(WarcError::Truncated { offset, reason }))
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e.into()))
            }
        }
    }

    fn next_member(&mut self) -> Option<WarcResult<WarcRecord>> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Some(item);
            }

            let offset = self.source.position;
            let buf = match self.source.fill_buf() {
                Ok(buf) => buf,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e.into()));
                }
            };
            if buf.is_empty() {
                return None;
            }

            let skip = buf
                .iter()
                .position(|&b| b == GZIP_MAGIC[0])
                .unwrap_or(buf.len());
            if skip > 0 {
                self.source.consume(skip);
                if !self.resyncing {
                    self.resyncing = true;
                    return Some(Err(WarcError::Corrupt {
                        offset,
                        reason: format!("{} byte(s) outside any gzip member", skip),
                    }));
                }
                continue;
            }

            let mut data = Vec::new();
            let decoded = GzDecoder::new(&mut self.source).read_to_end(&mut data);
            match decoded {
                Ok(_) => {
                    self.resyncing = false;
                    self.parse_member(offset, data);
                }
                Err(e) => {
                    let at_end = self.source.fill_buf().map(|b| b.is_empty()).unwrap_or(true);
                    if at_end {
                        self.finished = true;
                        return Some(Err(WarcError::Truncated {
                            offset,
                            reason: format!("stream ended inside a gzip member: {}", e),
                        }));
                    }
                    if self.source.position == offset {
                        self.source.consume(1);
                    }
                    if !self.resyncing {
                        tracing::warn!("Skipping undecodable gzip member at byte {}: {}", offset, e);
                        self.resyncing = true;
                        return Some(Err(WarcError::Corrupt {
                            offset,
                            reason: format!("undecodable gzip member: {}", e),
                        }));
                    }
                }
            }
        }
    }

    /// Queues the records of one decompressed member
    fn parse_member(&mut self, offset: u64, data: Vec<u8>) {
        let mut cursor = Cursor::new(data);
        loop {
            match parse_record(&mut cursor, false) {
                Ok(Parsed::End) => break,
                Ok(Parsed::Record(record)) => self.pending.push_back(Ok(record)),
                // The member boundary is intact, so the next member is still readable
                Ok(Parsed::Corrupt(reason)) | Ok(Parsed::Truncated(reason)) => {
                    self.pending.push_back(Err(WarcError::Corrupt { offset, reason }));
                    break;
                }
                Err(e) => {
                    self.pending.push_back(Err(e.into()));
                    break;
                }
            }
        }
    }
}

impl<R: BufRead> Iterator for WarcReader<R> {
    type Item = WarcResult<WarcRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(item) = self.pending.pop_front() {
            return Some(item);
        }
        if self.finished {
            return None;
        }

        let compressed = match self.compressed {
            Some(compressed) => compressed,
            None => match self.source.fill_buf() {
                Ok(buf) => {
                    let compressed = buf.starts_with(&GZIP_MAGIC);
                    self.compressed = Some(compressed);
                    compressed
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e.into()));
                }
            },
        };

        let item = if compressed {
            self.next_member()
        } else {
            self.next_plain()
        };
        if item.is_none() {
            self.finished = true;
        }
        item
    }
}

/// Overview of a container's contents
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContainerSummary {
    pub compressed: bool,
    /// Records read successfully
    pub records: usize,
    pub by_type: BTreeMap<String, usize>,
    /// Distinct `WARC-Target-URI` values, in order of appearance
    pub targets: Vec<String>,
    /// One message per record that could not be read
    pub errors: Vec<String>,
}

impl ContainerSummary {
    /// Returns true if every record was read without error
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn count(&self, record_type: &str) -> usize {
        self.by_type.get(record_type).copied().unwrap_or(0)
    }
}

/// Reads a whole container and summarizes it
///
/// Record-level errors are collected rather than returned; only failing to
/// open the file is an error.
pub fn summarize_container(path: impl AsRef<Path>) -> WarcResult<ContainerSummary> {
    let mut reader = WarcReader::open(path)?;
    let mut summary = ContainerSummary::default();

    for item in reader.by_ref() {
        match item {
            Ok(record) => {
                summary.records += 1;
                *summary
                    .by_type
                    .entry(record.record_type().to_string())
                    .or_insert(0) += 1;
                if let Some(uri) = record.target_uri() {
                    if !summary.targets.iter().any(|known| known == uri) {
                        summary.targets.push(uri.to_string());
                    }
                }
            }
            Err(e) => summary.errors.push(e.to_string()),
        }
    }

    summary.compressed = reader.is_compressed().unwrap_or(false);
    tracing::debug!(
        "Read {} record(s) from {} byte(s), {} damaged",
        summary.records,
        reader.position(),
        summary.errors.len()
    );
    Ok(summary)
}
