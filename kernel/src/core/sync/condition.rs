/*!
 * Condition Variables
 *
 * Kernel-style condition variables built on parking_lot::Condvar.
 *
 * A waiter first publishes an entry (usually while still holding the lock
 * that guards the condition), then drops that lock and blocks on the entry.
 * A notification that races with the unlock is therefore never lost: it
 * marks the already-published entry. Each entry is woken at most once, with
 * the status of whoever woke it first.
 */

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// Why a wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// The condition variable was notified
    Notified,
    /// The waiter was interrupted (pending signal, thread exit)
    Interrupted,
}

struct WaiterSlot {
    status: Mutex<Option<WaitStatus>>,
    wakeup: Condvar,
}

impl WaiterSlot {
    fn new() -> Self {
        Self {
            status: Mutex::new(None),
            wakeup: Condvar::new(),
        }
    }

    fn wake(&self, status: WaitStatus) -> bool {
        let mut slot = self.status.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(status);
        self.wakeup.notify_one();
        true
    }
}

/// Shared handle to a published entry
///
/// Stored in a thread's blocking descriptor so the kernel can interrupt the
/// wait from another thread.
#[derive(Clone)]
pub struct WaitHandle(Arc<WaiterSlot>);

impl WaitHandle {
    /// Wake the entry with `status`; false if it was already woken
    pub fn wake(&self, status: WaitStatus) -> bool {
        self.0.wake(status)
    }

    pub fn is_woken(&self) -> bool {
        self.0.status.lock().is_some()
    }
}

impl fmt::Debug for WaitHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitHandle")
            .field("woken", &self.is_woken())
            .finish()
    }
}

/// Named condition variable
pub struct ConditionVariable {
    name: &'static str,
    waiters: Mutex<VecDeque<Arc<WaiterSlot>>>,
}

impl ConditionVariable {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            waiters: Mutex::new(VecDeque::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Publish a new entry; it observes every notification from now on
    pub fn add_entry(&self) -> ConditionEntry<'_> {
        let slot = Arc::new(WaiterSlot::new());
        self.waiters.lock().push_back(Arc::clone(&slot));
        ConditionEntry {
            variable: self,
            slot,
        }
    }

    /// Wake the oldest waiter that has not been woken yet
    pub fn notify_one(&self) -> bool {
        let mut waiters = self.waiters.lock();
        while let Some(slot) = waiters.pop_front() {
            if slot.wake(WaitStatus::Notified) {
                return true;
            }
        }
        false
    }

    /// Wake every published waiter; returns how many were woken
    pub fn notify_all(&self) -> usize {
        let drained: Vec<_> = self.waiters.lock().drain(..).collect();
        drained
            .iter()
            .filter(|slot| slot.wake(WaitStatus::Notified))
            .count()
    }

    /// Entries published and not yet notified
    pub fn waiter_count(&self) -> usize {
        self.waiters.lock().len()
    }
}

impl fmt::Debug for ConditionVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionVariable")
            .field("name", &self.name)
            .field("waiters", &self.waiter_count())
            .finish()
    }
}

/// A published wait on a [`ConditionVariable`]
///
/// Dropping an entry that was never notified unpublishes it.
pub struct ConditionEntry<'a> {
    variable: &'a ConditionVariable,
    slot: Arc<WaiterSlot>,
}

impl ConditionEntry<'_> {
    pub fn handle(&self) -> WaitHandle {
        WaitHandle(Arc::clone(&self.slot))
    }

    pub fn variable_name(&self) -> &'static str {
        self.variable.name
    }

    /// Block the calling host thread until the entry is woken
    pub fn wait(&self) -> WaitStatus {
        let mut status = self.slot.status.lock();
        loop {
            if let Some(status) = *status {
                return status;
            }
            self.slot.wakeup.wait(&mut status);
        }
    }

    /// Wake this entry without notifying the variable
    pub fn cancel(&self, status: WaitStatus) -> bool {
        self.slot.wake(status)
    }
}

impl Drop for ConditionEntry<'_> {
    fn drop(&mut self) {
        let mut waiters = self.variable.waiters.lock();
        if let Some(pos) = waiters.iter().position(|w| Arc::ptr_eq(w, &self.slot)) {
            waiters.remove(pos);
        }
    }
}
