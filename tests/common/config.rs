//! Harvester configuration for mock and live runs

use std::path::Path;
use std::time::Duration;
use warc_harvest::config::{ArchiveConfig, IndexConfig, RetryConfig};
use warc_harvest::{Config, Harvester};
use wiremock::MockServer;

use super::fixtures::TEST_INDEX;

/// Fast retries so transient-failure tests stay quick
pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        initial_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
        backoff_multiplier: 2.0,
        jitter: false,
    }
}

/// Config pointing both stages at `server`
pub fn mock_config(server: &MockServer, output_dir: &Path, patterns: &[&str]) -> Config {
    Config {
        patterns: patterns.iter().map(|p| p.to_string()).collect(),
        output_dir: output_dir.to_path_buf(),
        index: IndexConfig {
            base_url: server.uri(),
            index_name: TEST_INDEX.to_string(),
            workers: 2,
            timeout: Duration::from_secs(5),
            ..Default::default()
        },
        archive: ArchiveConfig {
            base_url: server.uri(),
            workers: 4,
            timeout: Duration::from_secs(5),
        },
        retry: fast_retry(),
        progress_interval: Duration::from_millis(20),
        ..Default::default()
    }
}

/// Harvester against `server`
pub fn mock_harvester(server: &MockServer, output_dir: &Path, patterns: &[&str]) -> Harvester {
    Harvester::new(mock_config(server, output_dir, patterns)).unwrap()
}

/// Whether live tests were explicitly enabled via `.env` or the environment
///
/// Live tests talk to the public Common Crawl services and only run when
/// `WARC_HARVEST_LIVE=1` is set.
pub fn live_enabled() -> bool {
    dotenvy::dotenv().ok();
    std::env::var("WARC_HARVEST_LIVE")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Config against the real services
///
/// Optional environment variables:
/// - `CC_INDEX_NAME` - index snapshot (default: the crate default)
/// - `CC_LIVE_PATTERN` - pattern to harvest (default: a small single-page pattern)
pub fn live_config(output_dir: &Path) -> Config {
    dotenvy::dotenv().ok();

    let mut config = Config {
        patterns: vec![
            std::env::var("CC_LIVE_PATTERN").unwrap_or_else(|_| "commoncrawl.org/".to_string()),
        ],
        output_dir: output_dir.to_path_buf(),
        ..Default::default()
    };
    if let Ok(name) = std::env::var("CC_INDEX_NAME") {
        config.index.index_name = name;
    }
    config.index.workers = 1;
    config.archive.workers = 2;
    config
}

/// Return early from a live test unless live runs are enabled
#[macro_export]
macro_rules! skip_if_not_live {
    () => {
        if !$crate::common::live_enabled() {
            eprintln!("Skipping: set WARC_HARVEST_LIVE=1 to run live tests");
            return;
        }
    };
}
