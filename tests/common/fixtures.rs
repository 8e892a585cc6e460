//! Index responses and archive records served by the mock servers

use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::Write;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Index snapshot name used by every mock
pub const TEST_INDEX: &str = "CC-TEST";

/// A line long enough to survive extraction
pub const LONG_LINE: &str = "Hello world this is a sufficiently long line of text content";

/// One capture as the index would report it
#[derive(Clone, Debug)]
pub struct Capture {
    pub filename: String,
    pub offset: u64,
    pub length: u64,
    pub mime: String,
    pub status: String,
    pub languages: String,
}

impl Capture {
    /// An English HTML capture with status 200
    pub fn html(filename: &str, offset: u64, length: u64) -> Self {
        Self {
            filename: filename.to_string(),
            offset,
            length,
            mime: "text/html".to_string(),
            status: "200".to_string(),
            languages: "eng".to_string(),
        }
    }

    /// The capture as one JSON index line
    pub fn to_line(&self) -> String {
        serde_json::json!({
            "urlkey": "com,example)/",
            "timestamp": "20200524210325",
            "url": "https://example.com/",
            "mime": self.mime,
            "mime-detected": self.mime,
            "status": self.status,
            "digest": "AAAABBBBCCCCDDDD",
            "length": self.length.to_string(),
            "offset": self.offset.to_string(),
            "filename": self.filename,
            "languages": self.languages,
            "encoding": "UTF-8",
        })
        .to_string()
    }

    /// `bytes=start-end` for this capture
    pub fn range(&self) -> String {
        format!("bytes={}-{}", self.offset, self.offset + self.length - 1)
    }
}

/// Newline-joined index body
pub fn index_body(captures: &[Capture]) -> String {
    captures
        .iter()
        .map(Capture::to_line)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Gzip `bytes` as a single member
pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

/// Compressed archive record carrying `html` as its HTTP body
pub fn html_record(html: &str) -> Vec<u8> {
    gzip(
        format!(
            "WARC/1.0\r\nWARC-Type: response\r\nContent-Type: application/http\r\n\r\n\
             HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\n\r\n{}",
            html
        )
        .as_bytes(),
    )
}

/// Serve `captures` for `pattern`
pub async fn mount_index(server: &MockServer, pattern: &str, captures: &[Capture]) {
    Mock::given(method("GET"))
        .and(path(format!("/{}-index", TEST_INDEX)))
        .and(query_param("url", pattern))
        .and(query_param("output", "json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(index_body(captures)))
        .mount(server)
        .await;
}

/// Answer `pattern` with a 404, as the index does for unknown URLs
pub async fn mount_index_not_found(server: &MockServer, pattern: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/{}-index", TEST_INDEX)))
        .and(query_param("url", pattern))
        .respond_with(ResponseTemplate::new(404).set_body_string("No Captures found"))
        .mount(server)
        .await;
}

/// Serve `record` as a 206 for the capture's byte range
pub async fn mount_record(server: &MockServer, capture: &Capture, record: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(format!("/{}", capture.filename)))
        .and(header("Range", capture.range().as_str()))
        .respond_with(ResponseTemplate::new(206).set_body_bytes(record))
        .mount(server)
        .await;
}

/// Fail the capture's range read `times` times with `status` before any
/// later mounted response applies
pub async fn mount_record_failures(server: &MockServer, capture: &Capture, status: u16, times: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/{}", capture.filename)))
        .and(header("Range", capture.range().as_str()))
        .respond_with(ResponseTemplate::new(status))
        .up_to_n_times(times)
        .with_priority(1)
        .mount(server)
        .await;
}
