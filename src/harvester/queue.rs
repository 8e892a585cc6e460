//! FIFO work queue shared by the workers of one stage
//!
//! Each item is in exactly one place at a time: pending in the queue, in
//! flight in a worker, or deferred (sleeping out a retry backoff before it is
//! appended to the back of the queue again). The queue is drained once all
//! three are empty.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// A queued item together with the number of failed attempts behind it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkItem<T> {
    /// The payload (pattern or descriptor)
    pub item: T,
    /// Failed attempts so far; 0 for an item that was never tried
    pub attempt: u32,
}

impl<T> WorkItem<T> {
    /// Fresh item that was never tried
    pub fn new(item: T) -> Self {
        Self { item, attempt: 0 }
    }
}

#[derive(Debug)]
struct QueueState<T> {
    pending: VecDeque<WorkItem<T>>,
    in_flight: usize,
    deferred: usize,
    abandoned: usize,
}

impl<T> QueueState<T> {
    fn is_drained(&self) -> bool {
        self.pending.is_empty() && self.in_flight == 0 && self.deferred == 0
    }
}

/// Typed FIFO with in-flight and deferred bookkeeping
#[derive(Debug)]
pub struct WorkQueue<T> {
    state: Mutex<QueueState<T>>,
    notify: Notify,
}

impl<T> WorkQueue<T> {
    /// Queue holding `items` in order
    pub fn new(items: impl IntoIterator<Item = T>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                pending: items.into_iter().map(WorkItem::new).collect(),
                in_flight: 0,
                deferred: 0,
                abandoned: 0,
            }),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        // Critical sections never panic mid-update, so a poisoned lock is still consistent
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Take the next item, waiting while others are in flight or deferred
    ///
    /// Returns `None` once the queue is drained or `cancel` fires. A returned
    /// item counts as in flight until [`complete`](Self::complete) or
    /// [`retry_after`](Self::retry_after) is called for it.
    pub async fn next(&self, cancel: &CancellationToken) -> Option<WorkItem<T>> {
        loop {
            if cancel.is_cancelled() {
                return None;
            }

            // Register for wake-ups before inspecting state so no notification is lost
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(item) = state.pending.pop_front() {
                    state.in_flight += 1;
                    return Some(item);
                }
                if state.is_drained() {
                    return None;
                }
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = cancel.cancelled() => return None,
            }
        }
    }

    /// Mark an in-flight item as finished
    pub fn complete(&self) {
        let mut state = self.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        drop(state);
        self.notify.notify_waiters();
    }

    /// Number of items waiting to be taken
    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    /// Items that will never be processed because of cancellation
    ///
    /// Counts pending items, deferred items still sleeping, and deferred
    /// items whose re-append was dropped.
    pub fn unfinished(&self) -> usize {
        let state = self.lock();
        state.pending.len() + state.deferred + state.abandoned
    }

    /// Whether nothing is pending, in flight or deferred
    pub fn is_drained(&self) -> bool {
        self.lock().is_drained()
    }

    fn push_back(&self, item: WorkItem<T>) {
        let mut state = self.lock();
        state.deferred = state.deferred.saturating_sub(1);
        state.pending.push_back(item);
        drop(state);
        self.notify.notify_waiters();
    }

    fn abandon(&self) {
        let mut state = self.lock();
        state.deferred = state.deferred.saturating_sub(1);
        state.abandoned += 1;
        drop(state);
        self.notify.notify_waiters();
    }
}

impl<T: Send + 'static> WorkQueue<T> {
    /// Release an in-flight item and append it to the back of the queue after `delay`
    ///
    /// The delay elapses in a detached task, so the calling worker is free to
    /// take other items meanwhile. If `cancel` fires first the item is
    /// abandoned instead.
    pub fn retry_after(
        self: &Arc<Self>,
        item: WorkItem<T>,
        delay: Duration,
        cancel: CancellationToken,
    ) {
        {
            let mut state = self.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
            state.deferred += 1;
        }

        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => queue.push_back(item),
                _ = cancel.cancelled() => queue.abandon(),
            }
        });
    }
}
