//! Core types for warc-harvest

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{ErrorKind, SkipReason};

/// Location of one captured HTTP transaction inside an archive file
///
/// Produced by the index lookup, consumed exactly once by the segment
/// fetcher. Two descriptors with equal fields are the same segment.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SegmentDescriptor {
    /// Path of the archive file relative to the storage base URL
    pub filename: String,
    /// Byte position of the gzip member inside the archive file
    pub offset: u64,
    /// Length of the gzip member in bytes (never zero)
    pub length: u64,
    /// MIME type detected by the crawler
    pub mime_detected: String,
    /// HTTP status of the captured response, as reported by the index
    pub http_status: String,
    /// Language code(s) reported by the index
    pub language: String,
}

impl SegmentDescriptor {
    /// Last byte of the segment (inclusive)
    pub fn offset_end(&self) -> u64 {
        self.offset + self.length.saturating_sub(1)
    }

    /// Value of the `Range` header selecting exactly this segment
    pub fn range_header(&self) -> String {
        format!("bytes={}-{}", self.offset, self.offset_end())
    }
}

impl std::fmt::Display for SegmentDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}-{}", self.filename, self.offset, self.offset_end())
    }
}

/// Harvest stage
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Resolving search patterns against the index
    Resolve,
    /// Fetching and extracting archive segments
    Fetch,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Resolve => f.write_str("resolve"),
            Stage::Fetch => f.write_str("fetch"),
        }
    }
}

/// How a fetched segment ended up on disk
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveKind {
    /// Extracted text was written
    Written,
    /// A document with the same name already existed; nothing was written
    AlreadyPresent,
    /// An empty placeholder was written (undecodable payload or no body)
    Placeholder,
}

/// Events emitted during a harvest run
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A stage started with the given number of items
    StageStarted {
        /// Stage that started
        stage: Stage,
        /// Items queued for the stage
        total: usize,
    },

    /// A search pattern was resolved
    PatternResolved {
        /// The pattern
        pattern: String,
        /// Matching descriptors (zero when the index had no captures)
        descriptors: usize,
    },

    /// A segment was persisted
    DocumentSaved {
        /// Segment that was fetched
        descriptor: SegmentDescriptor,
        /// Output path
        path: PathBuf,
        /// What happened on disk
        kind: SaveKind,
    },

    /// An item failed transiently and was put back at the end of its queue
    ItemRequeued {
        /// Stage of the item
        stage: Stage,
        /// Pattern or descriptor, rendered for display
        item: String,
        /// Retry attempt that is scheduled (1-based)
        attempt: u32,
        /// Backoff before the item becomes available again
        delay_ms: u64,
        /// Error message
        error: String,
    },

    /// An item was dropped without producing a document
    ItemSkipped {
        /// Stage of the item
        stage: Stage,
        /// Pattern or descriptor, rendered for display
        item: String,
        /// Why it was dropped
        reason: SkipReason,
    },

    /// An item failed permanently
    ItemFailed {
        /// Stage of the item
        stage: Stage,
        /// Pattern or descriptor, rendered for display
        item: String,
        /// Classification of the final error
        kind: ErrorKind,
        /// Error message
        error: String,
    },

    /// Periodic progress update
    Progress {
        /// Stage being reported
        stage: Stage,
        /// Items finished with output (or empty result)
        completed: u64,
        /// Items finished without output
        failed: u64,
        /// Items in the stage
        total: u64,
        /// Finished items as a percentage of total (0.0 to 100.0)
        percent: f32,
    },

    /// A stage finished
    StageComplete {
        /// Stage that finished
        stage: Stage,
        /// Items finished with output
        completed: u64,
        /// Items finished without output
        failed: u64,
    },

    /// The run was cancelled; in-flight items were allowed to finish
    Cancelled,

    /// The run finished
    RunComplete {
        /// Final counts
        report: RunReport,
    },
}

/// Summary of a harvest run
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Patterns submitted
    pub patterns: usize,
    /// Patterns resolved (including those with zero matches)
    pub patterns_resolved: usize,
    /// Patterns that failed permanently
    pub patterns_failed: usize,
    /// Descriptors produced by the index stage
    pub descriptors: usize,
    /// Documents written with extracted text
    pub written: usize,
    /// Documents that already existed
    pub already_present: usize,
    /// Empty placeholders written
    pub placeholders: usize,
    /// Segments dropped as malformed
    pub skipped: usize,
    /// Segments that failed permanently
    pub failed: usize,
    /// Items abandoned because the run was cancelled
    pub cancelled: usize,
    /// Run start
    pub started_at: Option<DateTime<Utc>>,
    /// Run end
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunReport {
    /// Descriptors that ended with a document on disk
    pub fn persisted(&self) -> usize {
        self.written + self.already_present + self.placeholders
    }

    /// Descriptors that ended without a document
    pub fn errored(&self) -> usize {
        self.skipped + self.failed
    }
}
