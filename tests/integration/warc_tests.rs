//! Integration tests for the WARC codec
//!
//! These tests write containers to real files and read them back through
//! the public reader, including damaged containers.

use archive_dispatch::upload::prepare_upload;
use archive_dispatch::warc::{
    compress_container, list_containers, summarize_container, CapturedExchange, RecordType,
    WarcError, WarcInfo, WarcReader, WarcRecord, WarcWriter,
};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use url::Url;

const BODY_LEN: usize = 1024;

/// One captured page: status 200, 3 headers, 1KB body
fn sample_exchange() -> CapturedExchange {
    let body = vec![b'a'; BODY_LEN];
    CapturedExchange::new(
        Url::parse("https://example.com/index.html").unwrap(),
        200,
        vec![
            ("Content-Type".to_string(), "text/html; charset=utf-8".to_string()),
            ("Server".to_string(), "nginx".to_string()),
            ("Content-Length".to_string(), BODY_LEN.to_string()),
        ],
        body,
    )
}

fn write_container(dir: &TempDir, name: &str, compress: bool) -> PathBuf {
    let path = dir.path().join(name);
    let file = File::create(&path).unwrap();
    let mut writer = WarcWriter::new(file, compress, WarcInfo::new(name));
    writer.write_capture(&sample_exchange()).unwrap();
    writer.finish().unwrap().sync_all().unwrap();
    path
}

fn read_all(path: &Path) -> Vec<Result<WarcRecord, WarcError>> {
    WarcReader::open(path).unwrap().collect()
}

fn responses(records: &[Result<WarcRecord, WarcError>]) -> Vec<&WarcRecord> {
    records
        .iter()
        .filter_map(|r| r.as_ref().ok())
        .filter(|r| r.record_type() == RecordType::Response)
        .collect()
}

#[test]
fn test_plain_round_trip_of_one_page() {
    let dir = TempDir::new().unwrap();
    let path = write_container(&dir, "example.com_20240101000000.warc", false);

    let records = read_all(&path);
    assert!(records.iter().all(|r| r.is_ok()));

    let responses = responses(&records);
    assert_eq!(responses.len(), 1);

    let response = responses[0];
    assert_eq!(response.payload().len(), BODY_LEN);
    assert_eq!(response.content_length(), Some(response.block().len() as u64));
    assert_eq!(response.http_status(), Some(200));
    assert_eq!(response.target_uri(), Some("https://example.com/index.html"));
    assert_eq!(response.digest_matches(), Some(true));
}

#[test]
fn test_gzip_round_trip_of_one_page() {
    let dir = TempDir::new().unwrap();
    let path = write_container(&dir, "example.com_20240101000000.warc.gz", true);

    let mut reader = WarcReader::new(BufReader::new(File::open(&path).unwrap()));
    let records: Vec<_> = reader.by_ref().collect();
    assert_eq!(reader.is_compressed(), Some(true));

    let responses = responses(&records);
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].payload().len(), BODY_LEN);
    assert_eq!(
        responses[0].content_length(),
        Some(responses[0].block().len() as u64)
    );
}

#[test]
fn test_capture_records_are_linked() {
    let dir = TempDir::new().unwrap();
    let path = write_container(&dir, "linked.warc", false);

    let records: Vec<WarcRecord> = read_all(&path).into_iter().map(Result::unwrap).collect();
    let types: Vec<RecordType> = records.iter().map(WarcRecord::record_type).collect();
    assert_eq!(
        types,
        vec![RecordType::Warcinfo, RecordType::Request, RecordType::Response]
    );

    let request_id = records[1].record_id().unwrap();
    assert_eq!(
        records[2].headers().get("WARC-Concurrent-To"),
        Some(request_id)
    );
}

#[test]
fn test_corrupt_record_does_not_abort_the_read() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("damaged.warc");

    let mut first = Vec::new();
    let mut writer = WarcWriter::new(&mut first, false, WarcInfo::new("damaged.warc"));
    writer.write_capture(&sample_exchange()).unwrap();
    writer.finish().unwrap();

    let mut file = File::create(&path).unwrap();
    file.write_all(&first).unwrap();
    file.write_all(b"WARC/1.0\r\nWARC-Type: resource\r\nContent-Length: lots\r\n\r\nbroken\r\n\r\n")
        .unwrap();

    let mut second = Vec::new();
    let mut writer = WarcWriter::new(&mut second, false, WarcInfo::new("damaged.warc"));
    writer.write_capture(&sample_exchange()).unwrap();
    writer.finish().unwrap();
    file.write_all(&second).unwrap();
    drop(file);

    let records = read_all(&path);
    let errors: Vec<_> = records.iter().filter_map(|r| r.as_ref().err()).collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].is_recoverable());
    assert_eq!(responses(&records).len(), 2);

    let summary = summarize_container(&path).unwrap();
    assert_eq!(summary.count("response"), 2);
    assert!(!summary.is_clean());
}

#[test]
fn test_damaged_gzip_member_is_skipped() {
    let dir = TempDir::new().unwrap();
    let path = write_container(&dir, "good.warc.gz", true);
    let good = std::fs::read(&path).unwrap();

    // A member that is not valid deflate data
    let mut damaged = good.clone();
    damaged.extend_from_slice(&[0x1f, 0x8b, 0x08, 0, 0, 0, 0, 0, 0, 0xff, 0xde, 0xad, 0xbe, 0xef]);
    damaged.extend_from_slice(&good);
    let damaged_path = dir.path().join("damaged.warc.gz");
    std::fs::write(&damaged_path, &damaged).unwrap();

    let records = read_all(&damaged_path);
    assert!(records.iter().any(|r| r.is_err()));
    assert_eq!(responses(&records).len(), 2);
}

#[test]
fn test_summary_and_upload_handoff() {
    let dir = TempDir::new().unwrap();
    let path = write_container(&dir, "example.com_20240101000000.warc.gz", true);

    let summary = summarize_container(&path).unwrap();
    assert!(summary.compressed);
    assert!(summary.is_clean());
    assert_eq!(summary.records, 3);
    assert_eq!(summary.targets, vec!["https://example.com/index.html".to_string()]);

    let handoff = prepare_upload(&path, &BTreeMap::new()).unwrap();
    assert_eq!(handoff.get("warc_record_count"), Some("3"));
    assert!(handoff.identifier.starts_with("archive_dispatch_"));
}

#[test]
fn test_compress_then_list_store() {
    let dir = TempDir::new().unwrap();
    let plain = write_container(&dir, "example.com_20240101000000.warc", false);

    let compressed = compress_container(&plain).unwrap();
    assert_eq!(
        compressed.file_name().unwrap(),
        "example.com_20240101000000.warc.gz"
    );

    let mut reader = WarcReader::open(&compressed).unwrap();
    let records: Vec<_> = reader.by_ref().collect();
    assert_eq!(reader.is_compressed(), Some(true));
    assert_eq!(responses(&records).len(), 1);
    assert_eq!(responses(&records)[0].payload().len(), BODY_LEN);

    let listed = list_containers(dir.path()).unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].path, plain);
    assert_eq!(listed[1].path, compressed);
    assert!(listed[1].compressed);
    assert!(listed[1].size < listed[0].size);

    let handoff = prepare_upload(&compressed, &BTreeMap::new()).unwrap();
    assert_eq!(handoff.get("warc_record_count"), Some("3"));
}
