//! Error types for warc-harvest
//!
//! This module provides error handling for the library, including:
//! - The main [`Error`] type with context-carrying variants
//! - [`ErrorKind`], the classification the harvester uses to decide between
//!   requeueing an item, dropping it, or aborting the run
//! - [`SkipReason`], the structured reason attached to every dropped item

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for warc-harvest operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for warc-harvest
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "index.workers")
        key: Option<String>,
    },

    /// Transport-level HTTP failure (connect, timeout, body read)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Remote answered with a status the caller did not expect
    #[error("unexpected HTTP status {status} from {url}")]
    HttpStatus {
        /// Requested URL
        url: String,
        /// Status code returned by the server
        status: u16,
    },

    /// Transaction record could not be turned into a document
    #[error("malformed record {filename}: {reason}")]
    MalformedRecord {
        /// Archive filename of the offending segment
        filename: String,
        /// Why the record was rejected
        reason: SkipReason,
    },

    /// Segment payload is not valid UTF-8
    #[error("payload of {filename} is not valid UTF-8: {source}")]
    PayloadDecode {
        /// Archive filename of the offending segment
        filename: String,
        /// Underlying decode error
        #[source]
        source: std::string::FromUtf8Error,
    },

    /// I/O error tied to a specific path
    #[error("I/O error at {path}: {source}")]
    PathIo {
        /// Path that was being accessed
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The document name derived from an index record cannot exist on this filesystem
    #[error("unusable document name {path}: {source}")]
    InvalidDocumentName {
        /// Path that was rejected
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Every search pattern exhausted its retry budget
    #[error("all {failed} search patterns failed permanently")]
    PatternsExhausted {
        /// Number of patterns that failed
        failed: usize,
    },

    /// Run was cancelled before it could finish
    #[error("run cancelled")]
    Cancelled,
}

/// Coarse error classification
///
/// Every [`Error`] maps onto exactly one kind. The harvester only looks at the
/// kind: `TransientNetwork` items are requeued, `MalformedRecord` and
/// `PayloadDecode` items are finished without (useful) output, and `Fatal`
/// aborts the whole run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connection failure, timeout, 5xx or any other unexpected status
    TransientNetwork,
    /// The index has no captures for the pattern (not an error for callers)
    NotFound,
    /// Unsplittable transaction record, corrupt gzip stream, bad index line
    MalformedRecord,
    /// Payload bytes are not UTF-8; an empty placeholder is persisted
    PayloadDecode,
    /// Unrecoverable condition (unwritable output directory, bad config)
    Fatal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::TransientNetwork => "transient_network",
            ErrorKind::NotFound => "not_found",
            ErrorKind::MalformedRecord => "malformed_record",
            ErrorKind::PayloadDecode => "payload_decode",
            ErrorKind::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

/// Why an item was dropped without producing a document
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Record did not split into envelope, HTTP headers and payload
    Unsplittable,
    /// Range body was not a valid gzip member
    Decompress,
    /// Index line was not JSON or carried unusable offset/length values
    InvalidIndexLine,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SkipReason::Unsplittable => "unsplittable record",
            SkipReason::Decompress => "gzip decompression failed",
            SkipReason::InvalidIndexLine => "invalid index line",
        };
        f.write_str(name)
    }
}

impl Error {
    /// Create a configuration error for the given key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Network(e) => {
                // Builder and redirect-policy errors will not go away on retry
                if e.is_builder() || e.is_redirect() {
                    ErrorKind::Fatal
                } else {
                    ErrorKind::TransientNetwork
                }
            }
            Error::HttpStatus { status, .. } if *status == 404 => ErrorKind::NotFound,
            Error::HttpStatus { .. } => ErrorKind::TransientNetwork,
            Error::MalformedRecord { .. } => ErrorKind::MalformedRecord,
            Error::PayloadDecode { .. } => ErrorKind::PayloadDecode,
            Error::InvalidDocumentName { .. } => ErrorKind::MalformedRecord,
            Error::Config { .. } | Error::PathIo { .. } => ErrorKind::Fatal,
            Error::PatternsExhausted { .. } | Error::Cancelled => ErrorKind::Fatal,
        }
    }

    /// Returns true when this error must abort the whole run
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Fatal
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_classification() {
        let not_found = Error::HttpStatus {
            url: "http://index.example/CC-MAIN-2020-24-index".to_string(),
            status: 404,
        };
        assert_eq!(not_found.kind(), ErrorKind::NotFound);

        for status in [403, 416, 500, 503] {
            let err = Error::HttpStatus {
                url: "http://archive.example/seg".to_string(),
                status,
            };
            assert_eq!(
                err.kind(),
                ErrorKind::TransientNetwork,
                "status {status} should be transient"
            );
        }
    }

    #[test]
    fn test_record_errors_are_item_terminal() {
        let malformed = Error::MalformedRecord {
            filename: "crawl/seg-001".to_string(),
            reason: SkipReason::Unsplittable,
        };
        assert_eq!(malformed.kind(), ErrorKind::MalformedRecord);
        assert!(!malformed.is_fatal());

        let bad_utf8 = String::from_utf8(vec![0xff, 0xfe, 0xfd]).unwrap_err();
        let decode = Error::PayloadDecode {
            filename: "crawl/seg-001".to_string(),
            source: bad_utf8,
        };
        assert_eq!(decode.kind(), ErrorKind::PayloadDecode);
    }

    #[test]
    fn test_io_and_config_are_fatal() {
        let io = Error::PathIo {
            path: PathBuf::from("/data/commoncrawl"),
            source: std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only file system",
            ),
        };
        assert!(io.is_fatal());

        let name = Error::InvalidDocumentName {
            path: PathBuf::from("/data/commoncrawl/xxx--0-99.txt"),
            source: std::io::Error::new(std::io::ErrorKind::InvalidFilename, "File name too long"),
        };
        assert_eq!(name.kind(), ErrorKind::MalformedRecord);
        assert!(!name.is_fatal());

        let config = Error::config("index.workers", "must be at least 1");
        assert!(config.is_fatal());
        assert_eq!(config.to_string(), "configuration error: must be at least 1");
    }

    #[test]
    fn test_error_display() {
        let err = Error::HttpStatus {
            url: "https://archive.example/crawl/seg-001".to_string(),
            status: 503,
        };
        assert_eq!(
            err.to_string(),
            "unexpected HTTP status 503 from https://archive.example/crawl/seg-001"
        );

        let err = Error::MalformedRecord {
            filename: "crawl/seg-001".to_string(),
            reason: SkipReason::Decompress,
        };
        assert_eq!(
            err.to_string(),
            "malformed record crawl/seg-001: gzip decompression failed"
        );

        let err = Error::PatternsExhausted { failed: 3 };
        assert_eq!(err.to_string(), "all 3 search patterns failed permanently");
    }

    #[test]
    fn test_kind_serialization() {
        let json = serde_json::to_string(&ErrorKind::PayloadDecode).unwrap();
        assert_eq!(json, "\"payload_decode\"");
        let json = serde_json::to_string(&SkipReason::InvalidIndexLine).unwrap();
        assert_eq!(json, "\"invalid_index_line\"");
    }
}
