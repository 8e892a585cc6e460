//! Configuration types for warc-harvest

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::{path::PathBuf, time::Duration};

/// Common Crawl index snapshot queried when none is configured
pub const DEFAULT_INDEX_NAME: &str = "CC-MAIN-2020-24";

/// Longest retry backoff `Config::validate` accepts
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Index lookup settings (stage 1)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Index server base URL (default: "http://index.commoncrawl.org")
    #[serde(default = "default_index_base_url")]
    pub base_url: String,

    /// Index snapshot identifier (default: "CC-MAIN-2020-24")
    #[serde(default = "default_index_name")]
    pub index_name: String,

    /// Only captures with this detected MIME type are kept (default: "text/html")
    #[serde(default = "default_target_mime")]
    pub target_mime: String,

    /// Only captures whose language field equals this code are kept (default: "eng")
    #[serde(default = "default_target_language")]
    pub target_language: String,

    /// Concurrent index queries (default: 5)
    #[serde(default = "default_index_workers")]
    pub workers: usize,

    /// Per-request timeout (default: 60 seconds)
    #[serde(default = "default_index_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            base_url: default_index_base_url(),
            index_name: default_index_name(),
            target_mime: default_target_mime(),
            target_language: default_target_language(),
            workers: default_index_workers(),
            timeout: default_index_timeout(),
        }
    }
}

/// Archive storage settings (stage 2)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Archive storage base URL (default: "https://commoncrawl.s3.amazonaws.com")
    #[serde(default = "default_archive_base_url")]
    pub base_url: String,

    /// Concurrent range reads (default: 8)
    #[serde(default = "default_archive_workers")]
    pub workers: usize,

    /// Per-request timeout (default: 120 seconds)
    #[serde(default = "default_archive_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            base_url: default_archive_base_url(),
            workers: default_archive_workers(),
            timeout: default_archive_timeout(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts per item (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Text extraction settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Lines with fewer characters are dropped before persistence (default: 50)
    ///
    /// Short lines are overwhelmingly navigation and boilerplate.
    #[serde(default = "default_min_line_chars")]
    pub min_line_chars: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_line_chars: default_min_line_chars(),
        }
    }
}

/// Corpus compaction settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CorpusConfig {
    /// Documents per shard file (default: 1000)
    #[serde(default = "default_docs_per_shard")]
    pub docs_per_shard: usize,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            docs_per_shard: default_docs_per_shard(),
        }
    }
}

/// Main configuration for [`Harvester`](crate::Harvester)
///
/// Every field has a default, so `Config { patterns, ..Default::default() }`
/// is a complete configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// URL search patterns (array or comma-separated string)
    #[serde(default, deserialize_with = "patterns_serde::deserialize")]
    pub patterns: Vec<String>,

    /// Directory receiving one text file per fetched segment (default: "commoncrawl")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Index lookup settings
    #[serde(default)]
    pub index: IndexConfig,

    /// Archive storage settings
    #[serde(default)]
    pub archive: ArchiveConfig,

    /// Retry policy shared by both stages
    #[serde(default)]
    pub retry: RetryConfig,

    /// Text extraction settings
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Corpus compaction settings
    #[serde(default)]
    pub corpus: CorpusConfig,

    /// Interval between progress events (default: 500 ms)
    #[serde(default = "default_progress_interval", with = "millis_serde")]
    pub progress_interval: Duration,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            output_dir: default_output_dir(),
            index: IndexConfig::default(),
            archive: ArchiveConfig::default(),
            retry: RetryConfig::default(),
            extraction: ExtractionConfig::default(),
            corpus: CorpusConfig::default(),
            progress_interval: default_progress_interval(),
            user_agent: default_user_agent(),
        }
    }
}

impl Config {
    /// Split a comma-separated pattern list, dropping blanks
    ///
    /// ```
    /// use warc_harvest::Config;
    ///
    /// let patterns = Config::parse_patterns("reddit.com/r/space/*, reddit.com/r/AMA*,");
    /// assert_eq!(patterns, vec!["reddit.com/r/space/*", "reddit.com/r/AMA*"]);
    /// ```
    pub fn parse_patterns(list: &str) -> Vec<String> {
        list.split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Check the configuration for values that can never work
    pub fn validate(&self) -> Result<()> {
        if self.index.workers == 0 {
            return Err(Error::config("index.workers", "must be at least 1"));
        }
        if self.archive.workers == 0 {
            return Err(Error::config("archive.workers", "must be at least 1"));
        }
        if self.corpus.docs_per_shard == 0 {
            return Err(Error::config("corpus.docs_per_shard", "must be at least 1"));
        }
        for (key, delay) in [
            ("retry.initial_delay", self.retry.initial_delay),
            ("retry.max_delay", self.retry.max_delay),
        ] {
            if delay > MAX_RETRY_DELAY {
                return Err(Error::config(
                    key,
                    format!(
                        "must be at most {} seconds, got {}",
                        MAX_RETRY_DELAY.as_secs(),
                        delay.as_secs()
                    ),
                ));
            }
        }
        if self.progress_interval.is_zero() {
            return Err(Error::config("progress_interval", "must be greater than zero"));
        }
        if self.index.index_name.trim().is_empty() {
            return Err(Error::config("index.index_name", "must not be empty"));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(Error::config(
                "retry.backoff_multiplier",
                format!(
                    "must be at least 1.0, got {}",
                    self.retry.backoff_multiplier
                ),
            ));
        }
        for (key, value) in [
            ("index.base_url", &self.index.base_url),
            ("archive.base_url", &self.archive.base_url),
        ] {
            url::Url::parse(value)
                .map_err(|e| Error::config(key, format!("invalid URL '{}': {}", value, e)))?;
        }
        Ok(())
    }
}

fn default_index_base_url() -> String {
    "http://index.commoncrawl.org".to_string()
}

fn default_index_name() -> String {
    DEFAULT_INDEX_NAME.to_string()
}

fn default_target_mime() -> String {
    "text/html".to_string()
}

fn default_target_language() -> String {
    "eng".to_string()
}

fn default_index_workers() -> usize {
    5
}

fn default_index_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_archive_base_url() -> String {
    "https://commoncrawl.s3.amazonaws.com".to_string()
}

fn default_archive_workers() -> usize {
    8
}

fn default_archive_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

fn default_min_line_chars() -> usize {
    50
}

fn default_docs_per_shard() -> usize {
    1000
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("commoncrawl")
}

fn default_progress_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_user_agent() -> String {
    format!("warc-harvest/{}", env!("CARGO_PKG_VERSION"))
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds)
mod millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

// Accepts either ["a", "b"] or "a,b"
mod patterns_serde {
    use super::{Config, Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PatternList {
        List(Vec<String>),
        Joined(String),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match PatternList::deserialize(deserializer)? {
            PatternList::List(items) => items
                .into_iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
            PatternList::Joined(joined) => Config::parse_patterns(&joined),
        })
    }
}
