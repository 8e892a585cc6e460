//! Web-archive index lookup (stage 1)
//!
//! Resolves a URL search pattern into the [`SegmentDescriptor`]s of all
//! matching captures. The index answers with newline-delimited JSON, one
//! capture per line:
//!
//! ```text
//! {"urlkey": "...", "filename": "crawl-data/...warc.gz", "offset": "1234", "length": "5678",
//!  "mime-detected": "text/html", "status": "200", "languages": "eng", ...}
//! ```
//!
//! Only captures matching the configured MIME type, HTTP status 200 and the
//! configured language survive. The client performs exactly one request per
//! call; retries belong to the harvester.

use crate::config::IndexConfig;
use crate::error::{Error, Result, SkipReason};
use crate::types::SegmentDescriptor;
use serde_json::Value;
use tracing::{debug, instrument};

/// Lines this short cannot hold a capture record
const MIN_LINE_BYTES: usize = 10;

/// Status a capture must carry to be worth fetching
const ACCEPTED_STATUS: &str = "200";

/// Source of segment descriptors for a search pattern
///
/// [`IndexClient`] is the production implementation. The trait exists so the
/// harvester can be driven by an in-memory source in tests.
#[async_trait::async_trait]
pub trait DescriptorSource: Send + Sync {
    /// All descriptors matching `pattern`; empty when the index has no captures
    async fn resolve(&self, pattern: &str) -> Result<Vec<SegmentDescriptor>>;
}

/// Outcome of parsing an index response body
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParsedIndex {
    /// Captures that passed the filter, in response order
    pub descriptors: Vec<SegmentDescriptor>,
    /// Captures that were well-formed but did not match the filter
    pub filtered: usize,
    /// Lines that were not JSON or carried unusable filename/offset/length
    pub invalid: usize,
}

/// Parse a newline-delimited index response
///
/// Lines of 10 bytes or fewer are ignored without being counted.
pub fn parse_index_lines(body: &str, target_mime: &str, target_language: &str) -> ParsedIndex {
    let mut parsed = ParsedIndex::default();

    for line in body.lines() {
        if line.len() <= MIN_LINE_BYTES {
            continue;
        }

        let record: Value = match serde_json::from_str(line) {
            Ok(value @ Value::Object(_)) => value,
            _ => {
                debug!(reason = %SkipReason::InvalidIndexLine, bytes = line.len(), "skipping index line");
                parsed.invalid += 1;
                continue;
            }
        };

        let mime = text_field(&record, "mime-detected");
        let status = text_field(&record, "status");
        let language = text_field(&record, "languages");

        let matches = mime.as_deref() == Some(target_mime)
            && status.as_deref() == Some(ACCEPTED_STATUS)
            && language.as_deref() == Some(target_language);
        if !matches {
            parsed.filtered += 1;
            continue;
        }

        let filename = record.get("filename").and_then(Value::as_str);
        let offset = number_field(&record, "offset");
        let length = number_field(&record, "length");

        match (filename, offset, length) {
            (Some(filename), Some(offset), Some(length))
                if !filename.is_empty() && length > 0 && offset.checked_add(length).is_some() =>
            {
                parsed.descriptors.push(SegmentDescriptor {
                    filename: filename.to_string(),
                    offset,
                    length,
                    mime_detected: mime.unwrap_or_default(),
                    http_status: status.unwrap_or_default(),
                    language: language.unwrap_or_default(),
                });
            }
            _ => {
                debug!(reason = %SkipReason::InvalidIndexLine, bytes = line.len(), "index line lacks a usable location");
                parsed.invalid += 1;
            }
        }
    }

    parsed
}

// String fields occasionally arrive as numbers (status in particular)
fn text_field(record: &Value, key: &str) -> Option<String> {
    match record.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// Common Crawl encodes offset and length as strings
fn number_field(record: &Value, key: &str) -> Option<u64> {
    match record.get(key)? {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

/// HTTP client for a CDX-style index server
#[derive(Clone, Debug)]
pub struct IndexClient {
    http: reqwest::Client,
    base_url: String,
    index_name: String,
    target_mime: String,
    target_language: String,
}

impl IndexClient {
    /// Build a client with its own connection pool and the configured timeout
    pub fn new(config: &IndexConfig, user_agent: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| Error::config("index", format!("failed to create HTTP client: {}", e)))?;

        Ok(Self::with_client(http, config))
    }

    /// Use an existing HTTP client
    pub fn with_client(http: reqwest::Client, config: &IndexConfig) -> Self {
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            index_name: config.index_name.clone(),
            target_mime: config.target_mime.clone(),
            target_language: config.target_language.clone(),
        }
    }

    /// Query URL for `pattern`
    ///
    /// The pattern is percent-encoded with no characters exempt, so `/` and
    /// `*` travel as `%2F` and `%2A`.
    pub fn query_url(&self, pattern: &str) -> String {
        format!(
            "{}/{}-index?url={}&output=json",
            self.base_url,
            self.index_name,
            urlencoding::encode(pattern)
        )
    }

    /// Look up every capture matching `pattern`
    ///
    /// A 404 means the index holds no captures for the pattern and yields an
    /// empty list. Any other non-success status is an
    /// [`Error::HttpStatus`]; transport failures are [`Error::Network`].
    #[instrument(skip(self), fields(index = %self.index_name))]
    pub async fn resolve(&self, pattern: &str) -> Result<Vec<SegmentDescriptor>> {
        let url = self.query_url(pattern);
        let response = self.http.get(&url).send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            debug!("no captures in index");
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(Error::HttpStatus {
                url,
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        let parsed = parse_index_lines(&body, &self.target_mime, &self.target_language);

        debug!(
            matched = parsed.descriptors.len(),
            filtered = parsed.filtered,
            invalid = parsed.invalid,
            "index response parsed"
        );

        Ok(parsed.descriptors)
    }
}

#[async_trait::async_trait]
impl DescriptorSource for IndexClient {
    async fn resolve(&self, pattern: &str) -> Result<Vec<SegmentDescriptor>> {
        IndexClient::resolve(self, pattern).await
    }
}
