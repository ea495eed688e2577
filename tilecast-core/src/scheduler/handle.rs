//! Work items and the handles actions use to cooperate with the pool.

use std::cell::Cell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU8, Ordering};

use parking_lot::Mutex;

use crate::error::WorkError;

use super::{Action, Priority, Shared, MAX_PRIORITY};

thread_local! {
    /// How many work items are currently stacked on this thread.
    static NESTING: Cell<usize> = const { Cell::new(0) };
}

// ── WorkState ────────────────────────────────────────────────────

/// Lifecycle of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkState {
    /// Waiting in the queue.
    Queued,
    /// Its action is executing on some thread.
    Running,
    /// The action returned, failed or panicked.
    Finished,
}

impl WorkState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => WorkState::Queued,
            1 => WorkState::Running,
            _ => WorkState::Finished,
        }
    }
}

// ── ItemState ────────────────────────────────────────────────────

pub(crate) struct ItemState {
    pub(crate) id: u64,
    priority: AtomicI32,
    state: AtomicU8,
    cancel_requested: AtomicBool,
    action: Mutex<Option<Action>>,
}

impl ItemState {
    pub(crate) fn new(id: u64, priority: Priority, action: Action) -> Self {
        Self {
            id,
            priority: AtomicI32::new(priority),
            state: AtomicU8::new(WorkState::Queued as u8),
            cancel_requested: AtomicBool::new(false),
            action: Mutex::new(Some(action)),
        }
    }

    pub(crate) fn priority(&self) -> Priority {
        self.priority.load(Ordering::Acquire)
    }

    /// Must be called with the queue lock held so the queue never observes
    /// a priority that disagrees with its position.
    pub(crate) fn store_priority(&self, priority: Priority) {
        self.priority.store(priority, Ordering::Release);
    }

    pub(crate) fn state(&self) -> WorkState {
        WorkState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: WorkState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn take_action(&self) -> Option<Action> {
        self.action.lock().take()
    }
}

// ── WorkHandle ───────────────────────────────────────────────────

/// Shared handle to a submitted work item.
///
/// The running action receives a handle to itself and uses it to
/// [`yield_now`](Self::yield_now) at checkpoints, to
/// [`wait_for`](Self::wait_for) other items and to observe cancellation.
/// Handles are cheap to clone and may be held by any thread.
#[derive(Clone)]
pub struct WorkHandle {
    pub(crate) item: Arc<ItemState>,
    pub(crate) shared: Arc<Shared>,
}

impl WorkHandle {
    /// Scheduler-assigned identifier, unique per scheduler.
    pub fn id(&self) -> u64 {
        self.item.id
    }

    pub fn priority(&self) -> Priority {
        self.item.priority()
    }

    /// Change the priority; a queued item is moved to its new position.
    pub fn set_priority(&self, priority: Priority) {
        let mut queue = self.shared.queue.lock();
        self.item.store_priority(priority);
        if let Some(pos) = queue.iter().position(|q| Arc::ptr_eq(q, &self.item)) {
            let item = queue.remove(pos);
            Shared::insert_sorted(&mut queue, item);
        }
    }

    pub fn state(&self) -> WorkState {
        self.item.state()
    }

    pub fn is_running(&self) -> bool {
        self.state() == WorkState::Running
    }

    pub fn is_finished(&self) -> bool {
        self.state() == WorkState::Finished
    }

    pub fn is_cancellation_requested(&self) -> bool {
        self.item.cancel_requested.load(Ordering::Acquire)
    }

    /// Ask the item to stop.
    ///
    /// The priority is raised to [`MAX_PRIORITY`] so a queued item is picked
    /// up immediately and can observe the flag; a running action sees it at
    /// its next [`yield_now`](Self::yield_now).
    pub fn cancel(&self) {
        self.set_priority(MAX_PRIORITY);
        self.item.cancel_requested.store(true, Ordering::Release);
    }

    /// Cooperative checkpoint.
    ///
    /// If the head of the queue strictly outranks this item, it is removed
    /// and run to completion on the current thread before this call returns.
    /// This is nested execution on the caller's stack, bounded by the
    /// scheduler's `max_nesting`; at the cap the checkpoint only reports
    /// cancellation.
    ///
    /// Returns `true` when cancellation has been requested.
    pub fn yield_now(&self) -> bool {
        if NESTING.with(Cell::get) < self.shared.max_nesting {
            let own = self.priority();
            let next = {
                let mut queue = self.shared.queue.lock();
                match queue.last() {
                    Some(top) if top.priority() > own => queue.pop(),
                    _ => None,
                }
            };
            if let Some(item) = next {
                Shared::execute(&self.shared, item);
            }
        }
        self.is_cancellation_requested()
    }

    /// Queue another item on the same scheduler.
    pub fn submit<F>(&self, priority: Priority, action: F) -> WorkHandle
    where
        F: FnOnce(&WorkHandle) -> Result<(), WorkError> + Send + 'static,
    {
        Shared::submit(&self.shared, priority, Box::new(action))
    }

    /// Block (cooperatively) until `other` has finished.
    ///
    /// While waiting, `other` inherits a priority strictly above this item's
    /// so it cannot be starved by the waiter. If `other` is still queued it
    /// is taken out of the queue and run on this thread, whatever the two
    /// priorities are; if it runs elsewhere the waiter keeps yielding.
    ///
    /// Fails with [`WorkError::Blocked`] when `other` is still queued and
    /// this thread is already at the scheduler's `max_nesting`.
    pub fn wait_for(&self, other: &WorkHandle) -> Result<(), WorkError> {
        if Arc::ptr_eq(&self.item, &other.item) {
            return Ok(());
        }
        while !other.is_finished() {
            let own = self.priority();
            if other.priority() <= own {
                other.set_priority(own.saturating_add(1));
            }
            if NESTING.with(Cell::get) < self.shared.max_nesting {
                if let Some(item) = self.shared.take(&other.item) {
                    Shared::execute(&self.shared, item);
                    continue;
                }
            } else if self.shared.is_queued(&other.item) {
                return Err(WorkError::Blocked(other.id()));
            }
            self.yield_now();
            std::thread::yield_now();
        }
        Ok(())
    }
}

impl std::fmt::Debug for WorkHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkHandle")
            .field("id", &self.id())
            .field("priority", &self.priority())
            .field("state", &self.state())
            .field("cancel_requested", &self.is_cancellation_requested())
            .finish()
    }
}

/// Tracks nesting depth for the lifetime of one executing action.
pub(crate) struct NestingGuard;

impl NestingGuard {
    pub(crate) fn enter() -> Self {
        NESTING.with(|n| n.set(n.get() + 1));
        NestingGuard
    }
}

impl Drop for NestingGuard {
    fn drop(&mut self) {
        NESTING.with(|n| n.set(n.get().saturating_sub(1)));
    }
}
