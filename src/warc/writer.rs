use super::record::{RecordType, WarcRecord, HTTP_REQUEST_TYPE, HTTP_RESPONSE_TYPE};
use super::{CapturedExchange, WarcResult};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;

/// Contents of the `warcinfo` record that opens a container
#[derive(Debug, Clone, PartialEq)]
pub struct WarcInfo {
    pub filename: String,
    pub fields: Vec<(String, String)>,
}

impl WarcInfo {
    /// Describes a container written by this crate
    pub fn new(filename: &str) -> Self {
        Self {
            filename: filename.to_string(),
            fields: vec![
                (
                    "software".to_string(),
                    format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
                ),
                ("format".to_string(), "WARC File Format 1.0".to_string()),
            ],
        }
    }

    pub fn with_field(mut self, name: &str, value: impl Into<String>) -> Self {
        self.fields.push((name.to_string(), value.into()));
        self
    }

    fn to_record(&self) -> WarcRecord {
        WarcRecord::builder(RecordType::Warcinfo)
            .header("WARC-Filename", self.filename.as_str())
            .content_type("application/warc-fields")
            .block(warc_fields(&self.fields))
            .build()
    }
}

/// Renders `name: value` lines as an `application/warc-fields` block
fn warc_fields(fields: &[(String, String)]) -> Vec<u8> {
    fields
        .iter()
        .map(|(name, value)| format!("{}: {}\r\n", name, value))
        .collect::<String>()
        .into_bytes()
}

/// Writes records to a container
///
/// The `warcinfo` record is written once, before the first other record (or
/// at `finish` for an otherwise empty container). In compressed mode every
/// record is its own gzip member, so readers can skip a damaged record.
pub struct WarcWriter<W: Write> {
    out: W,
    compress: bool,
    info: Option<WarcInfo>,
    info_written: bool,
    records: usize,
    bytes: u64,
}

impl<W: Write> WarcWriter<W> {
    /// Creates a writer
    ///
    /// # Arguments
    ///
    /// * `out` - Destination of the container bytes
    /// * `compress` - Gzip each record separately
    /// * `info` - Contents of the opening `warcinfo` record
    pub fn new(out: W, compress: bool, info: WarcInfo) -> Self {
        Self {
            out,
            compress,
            info: Some(info),
            info_written: false,
            records: 0,
            bytes: 0,
        }
    }

    /// Creates a writer that adds no `warcinfo` of its own
    ///
    /// Used to re-encode an existing container, whose records (its own
    /// `warcinfo` included) are passed through unchanged.
    pub fn copying(out: W, compress: bool) -> Self {
        Self {
            out,
            compress,
            info: None,
            info_written: true,
            records: 0,
            bytes: 0,
        }
    }

    pub fn is_compressed(&self) -> bool {
        self.compress
    }

    /// Number of records written so far, `warcinfo` included
    pub fn records_written(&self) -> usize {
        self.records
    }

    /// Number of bytes written so far, after compression
    pub fn bytes_written(&self) -> u64 {
        self.bytes
    }

    /// Appends a record
    pub fn write_record(&mut self, record: &WarcRecord) -> WarcResult<()> {
        self.write_info()?;
        self.emit(record)
    }

    /// Appends a `request`/`response` pair for a captured exchange
    ///
    /// The response names the request in `WARC-Concurrent-To`.
    ///
    /// # Returns
    ///
    /// * `Ok(String)` - The `WARC-Record-ID` of the response record
    pub fn write_capture(&mut self, exchange: &CapturedExchange) -> WarcResult<String> {
        let request = WarcRecord::builder(RecordType::Request)
            .date(exchange.captured_at)
            .target_uri(exchange.url.as_str())
            .content_type(HTTP_REQUEST_TYPE)
            .block(exchange.request_block())
            .build();
        let request_id = request.record_id().unwrap_or_default().to_string();

        let response = WarcRecord::builder(RecordType::Response)
            .date(exchange.captured_at)
            .target_uri(exchange.url.as_str())
            .content_type(HTTP_RESPONSE_TYPE)
            .concurrent_to(&request_id)
            .block(exchange.response_block())
            .build();
        let response_id = response.record_id().unwrap_or_default().to_string();

        self.write_record(&request)?;
        self.write_record(&response)?;
        tracing::debug!(
            "Wrote capture of {} ({} byte body)",
            exchange.url,
            exchange.body.len()
        );
        Ok(response_id)
    }

    /// Appends a `metadata` record linked to another record
    ///
    /// # Arguments
    ///
    /// * `concurrent_to` - `WARC-Record-ID` of the record described
    /// * `target_uri` - The captured URL
    /// * `fields` - `name: value` pairs, e.g. a screenshot path
    pub fn write_metadata(
        &mut self,
        concurrent_to: &str,
        target_uri: &str,
        fields: &[(String, String)],
    ) -> WarcResult<String> {
        let record = WarcRecord::builder(RecordType::Metadata)
            .target_uri(target_uri)
            .concurrent_to(concurrent_to)
            .content_type("application/warc-fields")
            .block(warc_fields(fields))
            .build();
        let id = record.record_id().unwrap_or_default().to_string();
        self.write_record(&record)?;
        Ok(id)
    }

    /// Flushes the container and returns the destination
    pub fn finish(mut self) -> WarcResult<W> {
        self.write_info()?;
        self.out.flush()?;
        Ok(self.out)
    }

    fn write_info(&mut self) -> WarcResult<()> {
        if self.info_written {
            return Ok(());
        }
        let Some(record) = self.info.as_ref().map(WarcInfo::to_record) else {
            return Ok(());
        };
        self.emit(&record)?;
        self.info_written = true;
        Ok(())
    }

    fn emit(&mut self, record: &WarcRecord) -> WarcResult<()> {
        let raw = record.to_bytes();
        let encoded = if self.compress {
            let mut encoder = GzEncoder::new(Vec::with_capacity(raw.len() / 2), Compression::default());
            encoder.write_all(&raw)?;
            encoder.finish()?
        } else {
            raw
        };

        self.out.write_all(&encoded)?;
        self.records += 1;
        self.bytes += encoded.len() as u64;
        tracing::trace!("{} record: {} bytes on disk", record.record_type(), encoded.len());
        Ok(())
    }
}
