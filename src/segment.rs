//! Archive segment retrieval (stage 2)
//!
//! A segment is one gzip member inside a large concatenated archive file. It
//! holds a single transaction record made of three CRLF-CRLF separated parts:
//!
//! ```text
//! WARC/1.0\r\nWARC-Type: response\r\n...\r\n\r\n
//! HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n...\r\n\r\n
//! <html>...payload...</html>
//! ```
//!
//! [`SegmentFetcher`] reads exactly the segment's byte range and turns it
//! into a [`FetchResult`]. It never touches the filesystem.

use crate::config::ArchiveConfig;
use crate::error::{Error, ErrorKind, Result, SkipReason};
use crate::extract::DocumentExtractor;
use crate::types::SegmentDescriptor;
use flate2::read::GzDecoder;
use std::io::Read;
use tracing::{debug, instrument};

/// Separator between envelope, HTTP headers and payload
const RECORD_SEPARATOR: &str = "\r\n\r\n";

/// Outcome of fetching one segment
///
/// Transient failures are not represented here; they surface as `Err` from
/// [`SegmentSource::fetch`] so the harvester can requeue the descriptor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchResult {
    /// Segment that was fetched
    pub descriptor: SegmentDescriptor,
    /// Decompressed record bytes, absent when decompression failed
    pub raw: Option<Vec<u8>>,
    /// Body text of the payload (unfiltered), absent on error or when the
    /// payload has no `<body>`
    pub extracted_text: Option<String>,
    /// Item-terminal error, if any
    pub error: Option<ErrorKind>,
    /// Why the record was dropped, set together with [`ErrorKind::MalformedRecord`]
    pub skip_reason: Option<SkipReason>,
}

impl FetchResult {
    /// Decompress, decode and split a gzip-compressed record, then extract
    /// the payload's body text
    pub fn from_compressed(
        descriptor: SegmentDescriptor,
        compressed: &[u8],
        extractor: &DocumentExtractor,
    ) -> Self {
        let raw = match decompress(compressed) {
            Ok(raw) => raw,
            Err(e) => {
                debug!(segment = %descriptor, error = %e, "gzip decompression failed");
                return Self::malformed(descriptor, None, SkipReason::Decompress);
            }
        };

        let text = match String::from_utf8(raw) {
            Ok(text) => text,
            Err(e) => {
                debug!(segment = %descriptor, error = %e, "payload is not valid UTF-8");
                return Self {
                    descriptor,
                    raw: Some(e.into_bytes()),
                    extracted_text: None,
                    error: Some(ErrorKind::PayloadDecode),
                    skip_reason: None,
                };
            }
        };

        let Some(payload) = split_record(&text) else {
            debug!(segment = %descriptor, "record did not split into three parts");
            return Self::malformed(descriptor, Some(text.into_bytes()), SkipReason::Unsplittable);
        };

        let extracted_text = extractor.extract_text(payload);
        Self {
            descriptor,
            raw: Some(text.into_bytes()),
            extracted_text,
            error: None,
            skip_reason: None,
        }
    }

    fn malformed(descriptor: SegmentDescriptor, raw: Option<Vec<u8>>, reason: SkipReason) -> Self {
        Self {
            descriptor,
            raw,
            extracted_text: None,
            error: Some(ErrorKind::MalformedRecord),
            skip_reason: Some(reason),
        }
    }

    /// The item-terminal error as an [`Error`], for logging
    pub fn to_error(&self) -> Option<Error> {
        match self.error? {
            ErrorKind::MalformedRecord => Some(Error::MalformedRecord {
                filename: self.descriptor.filename.clone(),
                reason: self.skip_reason.unwrap_or(SkipReason::Unsplittable),
            }),
            ErrorKind::PayloadDecode => {
                let raw = self.raw.clone().unwrap_or_default();
                String::from_utf8(raw).err().map(|source| Error::PayloadDecode {
                    filename: self.descriptor.filename.clone(),
                    source,
                })
            }
            _ => None,
        }
    }
}

/// Decompress a single gzip member
///
/// Trailing bytes after the first member are ignored.
pub fn decompress(compressed: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(compressed);
    let mut raw = Vec::with_capacity(compressed.len() * 4);
    decoder.read_to_end(&mut raw)?;
    Ok(raw)
}

/// Payload part of a transaction record
///
/// The record is trimmed, then split on the first two CRLF-CRLF boundaries.
/// Anything other than exactly three parts yields `None`.
///
/// ```
/// use warc_harvest::segment::split_record;
///
/// let record = "WARC/1.0\r\n\r\nHTTP/1.1 200 OK\r\n\r\n<p>a</p>\r\n\r\n<p>b</p>";
/// assert_eq!(split_record(record), Some("<p>a</p>\r\n\r\n<p>b</p>"));
/// assert_eq!(split_record("WARC/1.0\r\n\r\nno payload"), None);
/// ```
pub fn split_record(record: &str) -> Option<&str> {
    let mut parts = record.trim().splitn(3, RECORD_SEPARATOR);
    let _envelope = parts.next()?;
    let _headers = parts.next()?;
    parts.next()
}

/// Source of archive segments
///
/// [`SegmentFetcher`] is the production implementation.
#[async_trait::async_trait]
pub trait SegmentSource: Send + Sync {
    /// Fetch and process one segment
    ///
    /// Returns `Err` only for failures worth retrying (or fatal ones);
    /// record-level problems are reported inside the [`FetchResult`].
    async fn fetch(&self, descriptor: &SegmentDescriptor) -> Result<FetchResult>;
}

/// HTTP range reader for archive storage
#[derive(Clone, Debug)]
pub struct SegmentFetcher {
    http: reqwest::Client,
    base_url: String,
    extractor: DocumentExtractor,
}

impl SegmentFetcher {
    /// Build a fetcher with its own connection pool and the configured timeout
    pub fn new(config: &ArchiveConfig, user_agent: &str, extractor: DocumentExtractor) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| Error::config("archive", format!("failed to create HTTP client: {}", e)))?;

        Ok(Self::with_client(http, config, extractor))
    }

    /// Use an existing HTTP client
    pub fn with_client(http: reqwest::Client, config: &ArchiveConfig, extractor: DocumentExtractor) -> Self {
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            extractor,
        }
    }

    /// URL of the archive file holding `descriptor`
    pub fn segment_url(&self, descriptor: &SegmentDescriptor) -> String {
        format!(
            "{}/{}",
            self.base_url,
            descriptor.filename.trim_start_matches('/')
        )
    }

    /// Read the segment's byte range and process it
    ///
    /// Anything but `206 Partial Content` is an [`Error::HttpStatus`]. The
    /// whole body is read before processing starts.
    #[instrument(skip(self, descriptor), fields(segment = %descriptor))]
    pub async fn fetch(&self, descriptor: &SegmentDescriptor) -> Result<FetchResult> {
        let url = self.segment_url(descriptor);
        let response = self
            .http
            .get(&url)
            .header(reqwest::header::RANGE, descriptor.range_header())
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::PARTIAL_CONTENT {
            return Err(Error::HttpStatus {
                url,
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        debug!(bytes = body.len(), "segment received");

        Ok(FetchResult::from_compressed(
            descriptor.clone(),
            &body,
            &self.extractor,
        ))
    }
}

#[async_trait::async_trait]
impl SegmentSource for SegmentFetcher {
    async fn fetch(&self, descriptor: &SegmentDescriptor) -> Result<FetchResult> {
        SegmentFetcher::fetch(self, descriptor).await
    }
}
