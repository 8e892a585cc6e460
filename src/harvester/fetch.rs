//! Stage 2 workers: segment descriptors to documents

use super::{ProgressMonitor, StageContext, WorkQueue};
use crate::error::{Error, ErrorKind, Result, SkipReason};
use crate::extract::DocumentExtractor;
use crate::retry::IsRetryable;
use crate::segment::{FetchResult, SegmentSource};
use crate::storage::{OutputStore, WriteOutcome};
use crate::types::{Event, SaveKind, SegmentDescriptor, Stage};
use futures::future::join_all;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, error, warn};

#[derive(Debug, Default)]
pub(super) struct FetchOutcome {
    pub written: usize,
    pub already_present: usize,
    pub placeholders: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: usize,
}

#[derive(Default)]
struct Counters {
    written: AtomicUsize,
    already_present: AtomicUsize,
    placeholders: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
}

struct Shared {
    ctx: Arc<StageContext>,
    source: Arc<dyn SegmentSource>,
    store: OutputStore,
    extractor: DocumentExtractor,
    queue: Arc<WorkQueue<SegmentDescriptor>>,
    counters: Counters,
    monitor: ProgressMonitor,
}

/// What became of a fetched segment
enum Persisted {
    Saved { path: PathBuf, kind: SaveKind },
    Skipped(SkipReason),
}

pub(super) async fn run_fetch_stage(
    ctx: &Arc<StageContext>,
    source: Arc<dyn SegmentSource>,
    store: OutputStore,
    extractor: DocumentExtractor,
    descriptors: Vec<SegmentDescriptor>,
    monitor: &ProgressMonitor,
) -> FetchOutcome {
    let total = descriptors.len();
    let shared = Arc::new(Shared {
        ctx: Arc::clone(ctx),
        source,
        store,
        extractor,
        queue: Arc::new(WorkQueue::new(descriptors)),
        counters: Counters::default(),
        monitor: monitor.clone(),
    });

    let workers = ctx.config.archive.workers.min(total).max(1);
    let handles: Vec<_> = (0..workers)
        .map(|worker| tokio::spawn(fetch_worker(worker, Arc::clone(&shared))))
        .collect();

    for result in join_all(handles).await {
        if let Err(e) = result {
            error!(error = %e, "fetch worker panicked");
        }
    }

    let counters = &shared.counters;
    FetchOutcome {
        written: counters.written.load(Ordering::Relaxed),
        already_present: counters.already_present.load(Ordering::Relaxed),
        placeholders: counters.placeholders.load(Ordering::Relaxed),
        skipped: counters.skipped.load(Ordering::Relaxed),
        failed: counters.failed.load(Ordering::Relaxed),
        cancelled: shared.queue.unfinished(),
    }
}

async fn fetch_worker(worker: usize, shared: Arc<Shared>) {
    let ctx = &shared.ctx;

    while let Some(work) = shared.queue.next(&ctx.cancel_token).await {
        let descriptor = work.item.clone();
        let label = descriptor.to_string();
        debug!(worker, segment = %label, attempt = work.attempt, "fetching segment");

        match shared.source.fetch(&descriptor).await {
            Ok(result) => {
                match persist(&shared, result).await {
                    Ok(Persisted::Saved { path, kind }) => {
                        let counter = match kind {
                            SaveKind::Written => &shared.counters.written,
                            SaveKind::AlreadyPresent => &shared.counters.already_present,
                            SaveKind::Placeholder => &shared.counters.placeholders,
                        };
                        counter.fetch_add(1, Ordering::Relaxed);
                        shared.monitor.record_completed();
                        ctx.emit(Event::DocumentSaved {
                            descriptor,
                            path,
                            kind,
                        });
                    }
                    Ok(Persisted::Skipped(reason)) => {
                        warn!(segment = %label, reason = %reason, "skipping malformed record");
                        shared.counters.skipped.fetch_add(1, Ordering::Relaxed);
                        shared.monitor.record_failed();
                        ctx.emit(Event::ItemSkipped {
                            stage: Stage::Fetch,
                            item: label,
                            reason,
                        });
                    }
                    Err(e) if e.is_fatal() => {
                        shared.counters.failed.fetch_add(1, Ordering::Relaxed);
                        shared.monitor.record_failed();
                        ctx.abort(e);
                    }
                    Err(e) => {
                        warn!(segment = %label, error = %e, "document could not be stored");
                        shared.counters.failed.fetch_add(1, Ordering::Relaxed);
                        shared.monitor.record_failed();
                        ctx.emit(Event::ItemFailed {
                            stage: Stage::Fetch,
                            item: label,
                            kind: e.kind(),
                            error: e.to_string(),
                        });
                    }
                }
                shared.queue.complete();
            }
            Err(e) if e.is_fatal() => {
                shared.counters.failed.fetch_add(1, Ordering::Relaxed);
                shared.monitor.record_failed();
                shared.queue.complete();
                ctx.abort(e);
            }
            // A missing archive object is an unexpected status like any other
            Err(e) if e.is_retryable() || e.kind() == ErrorKind::NotFound => {
                if !ctx.requeue(&shared.queue, work, Stage::Fetch, &label, &e) {
                    give_up(&shared, label, &e);
                    shared.queue.complete();
                }
            }
            Err(e) => {
                give_up(&shared, label, &e);
                shared.queue.complete();
            }
        }
    }
}

/// Write the document for a fetched segment
///
/// Only storage failures are returned as errors; they are fatal.
async fn persist(shared: &Shared, result: FetchResult) -> Result<Persisted> {
    let content = match result.error {
        None => match &result.extracted_text {
            Some(text) => shared.extractor.filter_lines(text),
            None => {
                debug!(segment = %result.descriptor, "payload has no body, writing placeholder");
                String::new()
            }
        },
        Some(ErrorKind::PayloadDecode) => {
            if let Some(e) = result.to_error() {
                warn!(error = %e, "undecodable payload, writing placeholder");
            }
            String::new()
        }
        Some(_) => {
            return Ok(Persisted::Skipped(
                result.skip_reason.unwrap_or(SkipReason::Unsplittable),
            ));
        }
    };

    let placeholder = result.error.is_some() || result.extracted_text.is_none();
    let path = shared.store.path_for(&result.descriptor);
    let kind = match shared
        .store
        .write_document(&result.descriptor, &content)
        .await?
    {
        WriteOutcome::AlreadyPresent => SaveKind::AlreadyPresent,
        WriteOutcome::Written if placeholder => SaveKind::Placeholder,
        WriteOutcome::Written => SaveKind::Written,
    };

    Ok(Persisted::Saved { path, kind })
}

fn give_up(shared: &Shared, label: String, error: &Error) {
    warn!(segment = %label, error = %error, kind = %error.kind(), "segment failed permanently");
    let counter = match error.kind() {
        ErrorKind::MalformedRecord | ErrorKind::PayloadDecode => &shared.counters.skipped,
        _ => &shared.counters.failed,
    };
    counter.fetch_add(1, Ordering::Relaxed);
    shared.monitor.record_failed();
    shared.ctx.emit(Event::ItemFailed {
        stage: Stage::Fetch,
        item: label,
        kind: error.kind(),
        error: error.to_string(),
    });
}
