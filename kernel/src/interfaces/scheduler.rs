/*!
 * Scheduler Interface
 */

use crate::thread::{Thread, ThreadState};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Run-queue operations the lifecycle code calls
pub trait Scheduler: Send + Sync {
    /// `thread` became runnable
    fn enqueue_ready(&self, thread: &Arc<Thread>);

    /// `current` is leaving the CPU (blocked, suspended or exiting)
    fn reschedule(&self, current: &Arc<Thread>);

    fn on_thread_create(&self, thread: &Arc<Thread>);

    /// Called by the undertaker right before the final reference drops
    fn on_thread_destroy(&self, thread: &Arc<Thread>);
}

/// FIFO run queue (membership only, no policy)
pub struct RunQueue {
    ready: Mutex<VecDeque<Weak<Thread>>>,
    created: AtomicU64,
    destroyed: AtomicU64,
    reschedules: AtomicU64,
}

impl RunQueue {
    pub fn new() -> Self {
        Self {
            ready: Mutex::new(VecDeque::new()),
            created: AtomicU64::new(0),
            destroyed: AtomicU64::new(0),
            reschedules: AtomicU64::new(0),
        }
    }

    /// Threads waiting to run
    pub fn len(&self) -> usize {
        self.ready.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pop the oldest thread that is still ready
    pub fn dequeue(&self) -> Option<Arc<Thread>> {
        let mut ready = self.ready.lock();
        while let Some(weak) = ready.pop_front() {
            if let Some(thread) = weak.upgrade() {
                if thread.state() == ThreadState::Ready {
                    return Some(thread);
                }
            }
        }
        None
    }

    pub fn created_count(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    pub fn destroyed_count(&self) -> u64 {
        self.destroyed.load(Ordering::Relaxed)
    }

    pub fn reschedule_count(&self) -> u64 {
        self.reschedules.load(Ordering::Relaxed)
    }

    fn remove(&self, thread: &Arc<Thread>) {
        let target = Arc::as_ptr(thread);
        self.ready
            .lock()
            .retain(|w| w.strong_count() > 0 && !std::ptr::eq(w.as_ptr(), target));
    }
}

impl Default for RunQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for RunQueue {
    fn enqueue_ready(&self, thread: &Arc<Thread>) {
        let target = Arc::as_ptr(thread);
        let mut ready = self.ready.lock();
        if !ready.iter().any(|w| std::ptr::eq(w.as_ptr(), target)) {
            ready.push_back(Arc::downgrade(thread));
        }
    }

    fn reschedule(&self, current: &Arc<Thread>) {
        self.reschedules.fetch_add(1, Ordering::Relaxed);
        if matches!(
            current.state(),
            ThreadState::FreeOnResched | ThreadState::Suspended
        ) {
            self.remove(current);
        }
    }

    fn on_thread_create(&self, _thread: &Arc<Thread>) {
        self.created.fetch_add(1, Ordering::Relaxed);
    }

    fn on_thread_destroy(&self, thread: &Arc<Thread>) {
        self.destroyed.fetch_add(1, Ordering::Relaxed);
        self.remove(thread);
    }
}
