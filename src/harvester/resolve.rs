//! Stage 1 workers: search patterns to segment descriptors

use super::{ProgressMonitor, StageContext, WorkQueue};
use crate::error::{Error, ErrorKind};
use crate::index::DescriptorSource;
use crate::retry::IsRetryable;
use crate::types::{Event, SegmentDescriptor, Stage};
use futures::future::join_all;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, warn};

/// Pattern together with its position in the configured list
type PatternItem = (usize, String);

pub(super) struct ResolveOutcome {
    /// Descriptors of all resolved patterns, in pattern order
    pub descriptors: Vec<SegmentDescriptor>,
    pub resolved: usize,
    pub failed: usize,
    pub cancelled: usize,
}

struct Shared {
    ctx: Arc<StageContext>,
    source: Arc<dyn DescriptorSource>,
    queue: Arc<WorkQueue<PatternItem>>,
    results: Mutex<Vec<Option<Vec<SegmentDescriptor>>>>,
    monitor: ProgressMonitor,
}

pub(super) async fn run_resolve_stage(
    ctx: &Arc<StageContext>,
    source: Arc<dyn DescriptorSource>,
    patterns: Vec<String>,
    monitor: &ProgressMonitor,
) -> ResolveOutcome {
    let total = patterns.len();
    let shared = Arc::new(Shared {
        ctx: Arc::clone(ctx),
        source,
        queue: Arc::new(WorkQueue::new(patterns.into_iter().enumerate())),
        results: Mutex::new(vec![None; total]),
        monitor: monitor.clone(),
    });

    let workers = ctx.config.index.workers.min(total).max(1);
    let handles: Vec<_> = (0..workers)
        .map(|worker| tokio::spawn(resolve_worker(worker, Arc::clone(&shared))))
        .collect();

    for result in join_all(handles).await {
        if let Err(e) = result {
            error!(error = %e, "resolve worker panicked");
        }
    }

    let cancelled = shared.queue.unfinished();
    let results = std::mem::take(&mut *shared.results.lock().unwrap_or_else(|e| e.into_inner()));
    let snapshot = monitor.snapshot();

    ResolveOutcome {
        descriptors: results.into_iter().flatten().flatten().collect(),
        resolved: snapshot.completed as usize,
        failed: snapshot.failed as usize,
        cancelled,
    }
}

async fn resolve_worker(worker: usize, shared: Arc<Shared>) {
    let ctx = &shared.ctx;

    while let Some(work) = shared.queue.next(&ctx.cancel_token).await {
        let (position, pattern) = work.item.clone();
        debug!(worker, pattern = %pattern, attempt = work.attempt, "resolving pattern");

        let result = match shared.source.resolve(&pattern).await {
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            other => other,
        };

        match result {
            Ok(descriptors) => {
                debug!(pattern = %pattern, descriptors = descriptors.len(), "pattern resolved");
                ctx.emit(Event::PatternResolved {
                    pattern,
                    descriptors: descriptors.len(),
                });
                if let Some(slot) = shared
                    .results
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .get_mut(position)
                {
                    *slot = Some(descriptors);
                }
                shared.monitor.record_completed();
                shared.queue.complete();
            }
            Err(e) if e.is_fatal() => {
                shared.monitor.record_failed();
                shared.queue.complete();
                ctx.abort(e);
            }
            Err(e) if e.is_retryable() => {
                if !ctx.requeue(&shared.queue, work, Stage::Resolve, &pattern, &e) {
                    give_up(&shared, &pattern, &e);
                    shared.queue.complete();
                }
            }
            Err(e) => {
                give_up(&shared, &pattern, &e);
                shared.queue.complete();
            }
        }
    }
}

fn give_up(shared: &Shared, pattern: &str, error: &Error) {
    warn!(pattern = %pattern, error = %error, kind = %error.kind(), "pattern failed permanently");
    shared.ctx.emit(Event::ItemFailed {
        stage: Stage::Resolve,
        item: pattern.to_string(),
        kind: error.kind(),
        error: error.to_string(),
    });
    shared.monitor.record_failed();
}
