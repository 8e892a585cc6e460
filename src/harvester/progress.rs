//! Stage progress tracking
//!
//! Workers bump atomic counters; a reporter task samples them on a fixed tick
//! and broadcasts [`Event::Progress`]. Nothing here touches the filesystem.

use crate::types::{Event, Stage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Point-in-time view of a stage's counters
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Stage being tracked
    pub stage: Stage,
    /// Items finished with output persisted (or an empty resolution)
    pub completed: u64,
    /// Items finished without output
    pub failed: u64,
    /// Items in the stage
    pub total: u64,
}

impl ProgressSnapshot {
    /// Finished items (completed + failed)
    pub fn finished(&self) -> u64 {
        self.completed + self.failed
    }

    /// Finished items as a percentage of the total; 100 for an empty stage
    pub fn percent(&self) -> f32 {
        if self.total == 0 {
            100.0
        } else {
            (self.finished() as f32 / self.total as f32 * 100.0).min(100.0)
        }
    }

    /// The snapshot as a progress event
    pub fn to_event(&self) -> Event {
        Event::Progress {
            stage: self.stage,
            completed: self.completed,
            failed: self.failed,
            total: self.total,
            percent: self.percent(),
        }
    }
}

#[derive(Debug)]
struct Counters {
    stage: Stage,
    total: u64,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Shared counters for one stage
///
/// Cloning is cheap; all clones observe the same counters.
#[derive(Clone, Debug)]
pub struct ProgressMonitor {
    counters: Arc<Counters>,
}

impl ProgressMonitor {
    /// Counters for `stage` with `total` items
    pub fn new(stage: Stage, total: usize) -> Self {
        Self {
            counters: Arc::new(Counters {
                stage,
                total: total as u64,
                completed: AtomicU64::new(0),
                failed: AtomicU64::new(0),
            }),
        }
    }

    /// An item reached a terminal state with its output in place
    pub fn record_completed(&self) {
        self.counters.completed.fetch_add(1, Ordering::Relaxed);
    }

    /// An item reached a terminal state without output
    pub fn record_failed(&self) {
        self.counters.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Current counter values
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            stage: self.counters.stage,
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            total: self.counters.total,
        }
    }

    /// Spawn the reporter task
    ///
    /// Emits a progress event every `interval` until `cancel_token` fires,
    /// then one final event with the closing counts.
    pub fn spawn(
        &self,
        interval: Duration,
        event_tx: broadcast::Sender<Event>,
        cancel_token: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        event_tx.send(monitor.snapshot().to_event()).ok();
                    }
                    _ = cancel_token.cancelled() => {
                        break;
                    }
                }
            }

            event_tx.send(monitor.snapshot().to_event()).ok();
        })
    }
}
