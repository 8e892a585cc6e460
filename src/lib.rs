//! # warc-harvest
//!
//! Web-corpus acquisition from the Common Crawl archive.
//!
//! Given a list of URL search patterns, warc-harvest asks the crawl index
//! which captures match, reads exactly those byte ranges out of the archive
//! files, strips the HTML and writes one plain-text document per capture.
//!
//! ## Design Philosophy
//!
//! - **Two bounded stages** - index lookups and range reads run in separate
//!   worker pools, sized for what each service tolerates
//! - **Failures stay local** - transient errors requeue the item with
//!   backoff, malformed records are skipped, only fatal conditions end a run
//! - **Rerunnable** - document names derive from the capture, so a second run
//!   never duplicates or corrupts earlier output
//! - **Event-driven** - consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use warc_harvest::{Config, Harvester};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         patterns: Config::parse_patterns("reddit.com/r/space/*,reddit.com/r/AMA*"),
//!         output_dir: "commoncrawl".into(),
//!         ..Default::default()
//!     };
//!
//!     let harvester = Harvester::new(config)?;
//!
//!     // Subscribe to events
//!     let mut events = harvester.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let report = harvester.run().await?;
//!     println!("{} documents written", report.written);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Corpus compaction into shard files
pub mod corpus;
/// Error types
pub mod error;
/// HTML to text extraction
pub mod extract;
/// Two-stage harvest coordinator
pub mod harvester;
/// Crawl index lookup
pub mod index;
/// Retry classification and exponential backoff
pub mod retry;
/// Archive segment retrieval
pub mod segment;
/// Output directory management
pub mod storage;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use corpus::{CompactionReport, CorpusCompactor};
pub use error::{Error, ErrorKind, Result, SkipReason};
pub use extract::DocumentExtractor;
pub use harvester::{Harvester, ProgressMonitor, ProgressSnapshot};
pub use index::{DescriptorSource, IndexClient};
pub use segment::{FetchResult, SegmentFetcher, SegmentSource};
pub use storage::{OutputStore, WriteOutcome};
pub use types::{Event, RunReport, SaveKind, SegmentDescriptor, Stage};

/// Run the harvester, cancelling it gracefully on a termination signal.
///
/// On a signal the harvester stops dispatching new work, lets in-flight items
/// finish, and the partial report is returned.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use warc_harvest::{Config, Harvester, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config {
///         patterns: vec!["example.com/*".to_string()],
///         ..Default::default()
///     };
///     let harvester = Harvester::new(config)?;
///
///     let report = run_with_shutdown(harvester).await?;
///     println!("{} cancelled items", report.cancelled);
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(harvester: Harvester) -> Result<RunReport> {
    let token = harvester.cancellation_token();
    let run = harvester.run();
    tokio::pin!(run);

    tokio::select! {
        result = &mut run => return result,
        _ = wait_for_signal() => {
            tracing::info!("finishing in-flight items before exit");
            token.cancel();
        }
    }

    run.await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal registration can fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
