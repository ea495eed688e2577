//! Priority-ordered cooperative work scheduler.
//!
//! A fixed pool of worker threads drains one shared queue, always taking the
//! highest-priority item next. Running actions cooperate through their
//! [`WorkHandle`]:
//!
//! - [`yield_now`](WorkHandle::yield_now) runs a strictly more important
//!   queued item to completion on the current thread, then reports whether
//!   the caller has been cancelled;
//! - [`wait_for`](WorkHandle::wait_for) blocks on another item, lending it
//!   the caller's priority (plus one) and running it directly when it is
//!   still queued;
//! - [`cancel`](WorkHandle::cancel) and
//!   [`set_priority`](WorkHandle::set_priority) reposition the item in the
//!   queue.
//!
//! The queue mutex is only held for push / pop / reorder, never while an
//! action runs, so nested execution cannot deadlock on it. A failing or
//! panicking action is reported as a [`WorkEvent`] and logged; its worker
//! carries on with the next item.

mod handle;

pub use handle::{WorkHandle, WorkState};

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::error::WorkError;
use handle::{ItemState, NestingGuard};

/// Work priority. Higher values are served first.
pub type Priority = i32;

/// Priority given to cancelled items so they are serviced immediately.
pub const MAX_PRIORITY: Priority = Priority::MAX;

pub(crate) type Action = Box<dyn FnOnce(&WorkHandle) -> Result<(), WorkError> + Send + 'static>;

pub type WorkEventSender = mpsc::UnboundedSender<WorkEvent>;
pub type WorkEventReceiver = mpsc::UnboundedReceiver<WorkEvent>;

// ── WorkEvent ────────────────────────────────────────────────────

/// Per-item outcome reported by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkEvent {
    Completed(u64),
    Cancelled(u64),
    Failed(u64, WorkError),
}

// ── SchedulerConfig ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Worker threads. `0` means nothing runs until
    /// [`WorkScheduler::run_pending`] is called.
    pub workers: usize,
    /// Sleep between polls of an empty queue.
    pub idle_backoff_ms: u64,
    /// Maximum number of actions stacked on one thread through `yield_now`.
    pub max_nesting: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let cores = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        Self {
            // Overprovisioned: workers may sit in sleeps or busy-waits.
            workers: cores * 2,
            idle_backoff_ms: 5,
            max_nesting: 16,
        }
    }
}

/// Counters snapshot returned by [`WorkScheduler::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub completed: u64,
    pub cancelled: u64,
    pub failed: u64,
    pub queued: usize,
}

// ── Shared ───────────────────────────────────────────────────────

pub(crate) struct Shared {
    /// Sorted ascending by priority; the next item is at the end.
    pub(crate) queue: Mutex<Vec<Arc<ItemState>>>,
    pub(crate) max_nesting: usize,
    idle_backoff: Duration,
    shutdown: AtomicBool,
    next_id: AtomicU64,
    events: Option<WorkEventSender>,
    completed: AtomicU64,
    cancelled: AtomicU64,
    failed: AtomicU64,
}

impl Shared {
    /// Insert after every item of strictly lower priority, i.e. in front of
    /// existing items of equal priority, which keeps equal priorities
    /// first-in first-out when popping from the end.
    pub(crate) fn insert_sorted(queue: &mut Vec<Arc<ItemState>>, item: Arc<ItemState>) {
        let priority = item.priority();
        let pos = queue.partition_point(|q| q.priority() < priority);
        queue.insert(pos, item);
    }

    pub(crate) fn submit(shared: &Arc<Shared>, priority: Priority, action: Action) -> WorkHandle {
        let id = shared.next_id.fetch_add(1, Ordering::Relaxed);
        let item = Arc::new(ItemState::new(id, priority, action));
        {
            let mut queue = shared.queue.lock();
            Shared::insert_sorted(&mut queue, Arc::clone(&item));
        }
        WorkHandle {
            item,
            shared: Arc::clone(shared),
        }
    }

    /// Run one item to completion on the current thread and report it.
    pub(crate) fn execute(shared: &Arc<Shared>, item: Arc<ItemState>) {
        let Some(action) = item.take_action() else {
            return;
        };
        item.set_state(WorkState::Running);
        let id = item.id;
        let handle = WorkHandle {
            item,
            shared: Arc::clone(shared),
        };

        let outcome = {
            let _nesting = NestingGuard::enter();
            panic::catch_unwind(AssertUnwindSafe(|| action(&handle)))
        };
        let event = match outcome {
            Ok(Ok(())) => {
                shared.completed.fetch_add(1, Ordering::Relaxed);
                WorkEvent::Completed(id)
            }
            Ok(Err(WorkError::Cancelled)) => {
                shared.cancelled.fetch_add(1, Ordering::Relaxed);
                debug!(item = id, "work item cancelled");
                WorkEvent::Cancelled(id)
            }
            Ok(Err(e)) => {
                shared.failed.fetch_add(1, Ordering::Relaxed);
                error!(item = id, "work item failed: {e}");
                WorkEvent::Failed(id, e)
            }
            Err(payload) => {
                shared.failed.fetch_add(1, Ordering::Relaxed);
                let message = panic_message(payload.as_ref());
                error!(item = id, "work item panicked: {message}");
                WorkEvent::Failed(id, WorkError::Panicked(message))
            }
        };

        if let Some(tx) = &shared.events {
            // Nobody listening is fine.
            let _ = tx.send(event);
        }
        handle.item.set_state(WorkState::Finished);
    }

    fn pop(&self) -> Option<Arc<ItemState>> {
        self.queue.lock().pop()
    }

    /// Remove `item` from the queue if no thread has taken it yet.
    pub(crate) fn take(&self, item: &Arc<ItemState>) -> Option<Arc<ItemState>> {
        let mut queue = self.queue.lock();
        let pos = queue.iter().position(|q| Arc::ptr_eq(q, item))?;
        Some(queue.remove(pos))
    }

    pub(crate) fn is_queued(&self, item: &Arc<ItemState>) -> bool {
        self.queue.lock().iter().any(|q| Arc::ptr_eq(q, item))
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ── WorkScheduler ────────────────────────────────────────────────

/// A pool of worker threads sharing one priority queue.
///
/// Dropping the scheduler stops the workers once their current item
/// finishes and discards anything still queued. Long-running items should be
/// [cancelled](WorkHandle::cancel) first.
pub struct WorkScheduler {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkScheduler {
    /// Start a scheduler without an event sink.
    pub fn new(config: SchedulerConfig) -> Self {
        Self::start(config, None)
    }

    /// Start a scheduler that reports every item outcome on `events`.
    pub fn with_event_sink(config: SchedulerConfig, events: WorkEventSender) -> Self {
        Self::start(config, Some(events))
    }

    fn start(config: SchedulerConfig, events: Option<WorkEventSender>) -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(Vec::new()),
            max_nesting: config.max_nesting.max(1),
            idle_backoff: Duration::from_millis(config.idle_backoff_ms.max(1)),
            shutdown: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            events,
            completed: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        });

        let mut workers = Vec::with_capacity(config.workers);
        for index in 0..config.workers {
            let shared = Arc::clone(&shared);
            let spawned = thread::Builder::new()
                .name(format!("tilecast-worker-{index}"))
                .spawn(move || worker_loop(shared, index));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => warn!("failed to spawn worker {index}: {e}"),
            }
        }
        debug!(workers = workers.len(), "scheduler started");

        Self { shared, workers }
    }

    /// Queue `action` at `priority` and return its handle.
    pub fn submit<F>(&self, priority: Priority, action: F) -> WorkHandle
    where
        F: FnOnce(&WorkHandle) -> Result<(), WorkError> + Send + 'static,
    {
        Shared::submit(&self.shared, priority, Box::new(action))
    }

    /// Drain the queue on the calling thread, highest priority first.
    /// Returns the number of items executed at the top level.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Some(item) = self.shared.pop() {
            Shared::execute(&self.shared, item);
            ran += 1;
        }
        ran
    }

    /// Number of live worker threads.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn queued(&self) -> usize {
        self.shared.queue.lock().len()
    }

    /// Priorities of the queued items in service order (next first).
    pub fn queued_priorities(&self) -> Vec<Priority> {
        self.shared.queue.lock().iter().rev().map(|i| i.priority()).collect()
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            completed: self.shared.completed.load(Ordering::Relaxed),
            cancelled: self.shared.cancelled.load(Ordering::Relaxed),
            failed: self.shared.failed.load(Ordering::Relaxed),
            queued: self.queued(),
        }
    }
}

impl Drop for WorkScheduler {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("worker thread exited abnormally");
            }
        }
        // Queued actions may hold handles back into `shared`.
        let dropped = std::mem::take(&mut *self.shared.queue.lock());
        if !dropped.is_empty() {
            debug!(items = dropped.len(), "discarding queued work on shutdown");
        }
    }
}

fn worker_loop(shared: Arc<Shared>, index: usize) {
    debug!(worker = index, "worker started");
    while !shared.shutdown.load(Ordering::SeqCst) {
        match shared.pop() {
            Some(item) => Shared::execute(&shared, item),
            None => thread::sleep(shared.idle_backoff),
        }
    }
    debug!(worker = index, "worker stopped");
}

// ── Tests ────────────────────────────────────────────────────────
