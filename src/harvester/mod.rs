//! Two-stage harvest coordinator
//!
//! Stage 1 resolves every search pattern against the index with a small
//! worker pool. Once all patterns are settled, the per-pattern descriptor
//! lists are concatenated in pattern order and stage 2 fetches every segment
//! with a second, larger pool, persisting one document per segment.
//!
//! Transient failures put the item back at the end of its stage's queue after
//! an exponential backoff; items that exhaust the retry budget are reported
//! and dropped. Only fatal errors (output directory unusable, broken
//! configuration) and the loss of every pattern end a run with an error.

mod fetch;
pub mod progress;
pub mod queue;
mod resolve;


pub use progress::{ProgressMonitor, ProgressSnapshot};
pub use queue::{WorkItem, WorkQueue};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::extract::DocumentExtractor;
use crate::index::{DescriptorSource, IndexClient};
use crate::retry::backoff_delay;
use crate::segment::{SegmentFetcher, SegmentSource};
use crate::storage::OutputStore;
use crate::types::{Event, RunReport, Stage};
use chrono::Utc;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// State shared by every worker of a run
pub(crate) struct StageContext {
    config: Arc<Config>,
    event_tx: broadcast::Sender<Event>,
    /// Cancelled by the caller or by a fatal error
    cancel_token: CancellationToken,
    fatal: Mutex<Option<Error>>,
}

impl StageContext {
    fn new(
        config: Arc<Config>,
        event_tx: broadcast::Sender<Event>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            config,
            event_tx,
            cancel_token,
            fatal: Mutex::new(None),
        }
    }

    fn emit(&self, event: Event) {
        // send() returns Err if there are no receivers, which is fine - we just drop the event
        self.event_tx.send(event).ok();
    }

    /// Record the first fatal error and stop all workers
    fn abort(&self, error: Error) {
        error!(error = %error, "fatal error, aborting run");
        let mut slot = self.fatal.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_none() {
            *slot = Some(error);
        }
        drop(slot);
        self.cancel_token.cancel();
    }

    fn take_fatal(&self) -> Option<Error> {
        self.fatal.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    /// Schedule another attempt for `work`, or return false when the retry
    /// budget is spent
    ///
    /// On `true` the queue owns the item again and the caller must not call
    /// [`WorkQueue::complete`] for it.
    fn requeue<T: Send + 'static>(
        &self,
        queue: &Arc<WorkQueue<T>>,
        work: WorkItem<T>,
        stage: Stage,
        label: &str,
        error: &Error,
    ) -> bool {
        let attempt = work.attempt + 1;
        if attempt > self.config.retry.max_attempts {
            return false;
        }

        let delay = backoff_delay(&self.config.retry, attempt);
        let delay_ms = delay.as_millis() as u64;
        warn!(
            stage = %stage,
            item = %label,
            attempt,
            delay_ms,
            error = %error,
            "transient failure, requeueing"
        );
        self.emit(Event::ItemRequeued {
            stage,
            item: label.to_string(),
            attempt,
            delay_ms,
            error: error.to_string(),
        });

        queue.retry_after(
            WorkItem {
                item: work.item,
                attempt,
            },
            delay,
            self.cancel_token.clone(),
        );
        true
    }
}

/// Web-corpus harvester
///
/// Cloning is cheap and every clone drives the same event channel and
/// cancellation token, so a clone can cancel a run started from another.
///
/// # Example
///
/// ```no_run
/// use warc_harvest::{Config, Harvester};
///
/// # async fn example() -> warc_harvest::Result<()> {
/// let config = Config {
///     patterns: vec!["example.com/*".to_string()],
///     output_dir: "corpus".into(),
///     ..Default::default()
/// };
///
/// let harvester = Harvester::new(config)?;
/// let mut events = harvester.subscribe();
/// tokio::spawn(async move {
///     while let Ok(event) = events.recv().await {
///         println!("{:?}", event);
///     }
/// });
///
/// let report = harvester.run().await?;
/// println!("{} documents written", report.written);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Harvester {
    config: Arc<Config>,
    index: Arc<dyn DescriptorSource>,
    segments: Arc<dyn SegmentSource>,
    store: OutputStore,
    extractor: DocumentExtractor,
    event_tx: broadcast::Sender<Event>,
    cancel_token: CancellationToken,
    progress: Arc<Mutex<Option<ProgressMonitor>>>,
}

impl Harvester {
    /// Create a harvester talking to the configured index and archive storage
    ///
    /// Both HTTP clients are built here, once, and shared by all workers.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let extractor = DocumentExtractor::new(config.extraction.min_line_chars);
        let index = IndexClient::new(&config.index, &config.user_agent)?;
        let segments = SegmentFetcher::new(&config.archive, &config.user_agent, extractor)?;

        Self::with_sources(config, Arc::new(index), Arc::new(segments))
    }

    /// Create a harvester with caller-supplied descriptor and segment sources
    pub fn with_sources(
        config: Config,
        index: Arc<dyn DescriptorSource>,
        segments: Arc<dyn SegmentSource>,
    ) -> Result<Self> {
        config.validate()?;

        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            store: OutputStore::new(config.output_dir.clone()),
            extractor: DocumentExtractor::new(config.extraction.min_line_chars),
            config: Arc::new(config),
            index,
            segments,
            event_tx,
            cancel_token: CancellationToken::new(),
            progress: Arc::new(Mutex::new(None)),
        })
    }

    /// Subscribe to run events
    ///
    /// Events sent while nobody listens are dropped. A receiver that falls
    /// more than 1000 events behind observes `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Current configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Store receiving the documents
    pub fn output_store(&self) -> &OutputStore {
        &self.store
    }

    /// Stop dispatching new work
    ///
    /// In-flight items finish and are persisted; pending and deferred items
    /// are abandoned and counted in [`RunReport::cancelled`]. A cancelled
    /// harvester cannot start another run.
    pub fn cancel(&self) {
        info!("cancellation requested");
        self.cancel_token.cancel();
    }

    /// Token that cancels this harvester when triggered
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Counters of the stage currently (or most recently) running
    pub fn progress(&self) -> Option<ProgressSnapshot> {
        self.progress
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(ProgressMonitor::snapshot)
    }

    fn begin_stage(&self, stage: Stage, total: usize) -> ProgressMonitor {
        let monitor = ProgressMonitor::new(stage, total);
        *self.progress.lock().unwrap_or_else(|e| e.into_inner()) = Some(monitor.clone());
        self.emit_event(Event::StageStarted { stage, total });
        info!(stage = %stage, total, "stage started");
        monitor
    }

    fn end_stage(&self, monitor: &ProgressMonitor) {
        let snapshot = monitor.snapshot();
        info!(
            stage = %snapshot.stage,
            completed = snapshot.completed,
            failed = snapshot.failed,
            "stage complete"
        );
        self.emit_event(Event::StageComplete {
            stage: snapshot.stage,
            completed: snapshot.completed,
            failed: snapshot.failed,
        });
    }

    pub(crate) fn emit_event(&self, event: Event) {
        // send() returns Err if there are no receivers, which is fine - we just drop the event
        self.event_tx.send(event).ok();
    }

    /// Run both stages to completion
    ///
    /// Returns the run report, also when the run was cancelled part-way.
    ///
    /// # Errors
    ///
    /// - [`Error::PathIo`] when the output directory cannot be created or
    ///   written to
    /// - [`Error::PatternsExhausted`] when patterns were given and every one
    ///   of them failed permanently
    /// - [`Error::Cancelled`] when the harvester was cancelled before the run
    ///   started
    pub async fn run(&self) -> Result<RunReport> {
        if self.cancel_token.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let patterns = self.config.patterns.clone();
        let mut report = RunReport {
            patterns: patterns.len(),
            started_at: Some(Utc::now()),
            ..Default::default()
        };

        self.store.ensure_dir().await?;

        let ctx = Arc::new(StageContext::new(
            Arc::clone(&self.config),
            self.event_tx.clone(),
            self.cancel_token.child_token(),
        ));

        info!(
            patterns = patterns.len(),
            index = %self.config.index.index_name,
            output_dir = %self.store.dir().display(),
            "harvest started"
        );

        // Stage 1: patterns -> descriptors
        let monitor = self.begin_stage(Stage::Resolve, patterns.len());
        let reporter_token = CancellationToken::new();
        let reporter = monitor.spawn(
            self.config.progress_interval,
            self.event_tx.clone(),
            reporter_token.clone(),
        );
        let resolved =
            resolve::run_resolve_stage(&ctx, Arc::clone(&self.index), patterns, &monitor).await;
        reporter_token.cancel();
        reporter.await.ok();
        self.end_stage(&monitor);

        report.patterns_resolved = resolved.resolved;
        report.patterns_failed = resolved.failed;
        report.descriptors = resolved.descriptors.len();
        report.cancelled += resolved.cancelled;

        if let Some(fatal) = ctx.take_fatal() {
            return Err(fatal);
        }
        if ctx.cancel_token.is_cancelled() {
            // Resolved descriptors are never fetched
            report.cancelled += report.descriptors;
            return Ok(self.finish(report, true));
        }
        if report.patterns > 0 && report.patterns_failed == report.patterns {
            error!(failed = report.patterns_failed, "every search pattern failed");
            return Err(Error::PatternsExhausted {
                failed: report.patterns_failed,
            });
        }

        // Stage 2: descriptors -> documents
        let monitor = self.begin_stage(Stage::Fetch, resolved.descriptors.len());
        let reporter_token = CancellationToken::new();
        let reporter = monitor.spawn(
            self.config.progress_interval,
            self.event_tx.clone(),
            reporter_token.clone(),
        );
        let fetched = fetch::run_fetch_stage(
            &ctx,
            Arc::clone(&self.segments),
            self.store.clone(),
            self.extractor.clone(),
            resolved.descriptors,
            &monitor,
        )
        .await;
        reporter_token.cancel();
        reporter.await.ok();
        self.end_stage(&monitor);

        report.written = fetched.written;
        report.already_present = fetched.already_present;
        report.placeholders = fetched.placeholders;
        report.skipped = fetched.skipped;
        report.failed = fetched.failed;
        report.cancelled += fetched.cancelled;

        if let Some(fatal) = ctx.take_fatal() {
            return Err(fatal);
        }

        let cancelled = ctx.cancel_token.is_cancelled();
        Ok(self.finish(report, cancelled))
    }

    fn finish(&self, mut report: RunReport, cancelled: bool) -> RunReport {
        report.finished_at = Some(Utc::now());
        if cancelled {
            warn!(abandoned = report.cancelled, "harvest cancelled");
            self.emit_event(Event::Cancelled);
        }
        info!(
            written = report.written,
            already_present = report.already_present,
            placeholders = report.placeholders,
            skipped = report.skipped,
            failed = report.failed,
            "harvest finished"
        );
        self.emit_event(Event::RunComplete {
            report: report.clone(),
        });
        report
    }
}
