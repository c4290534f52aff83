/*!
 * Group Registry
 *
 * Global id -> group map plus the deferred orphan-check queue. The map holds
 * weak references, so a group that lost its last member and job-control
 * reference disappears from it on drop.
 */

use super::process_group::ProcessGroup;
use super::session::ProcessSession;
use crate::core::errors::{KernelError, KernelResult};
use crate::core::types::GroupId;
use ahash::RandomState;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

pub struct GroupRegistry {
    groups: Mutex<HashMap<GroupId, Weak<ProcessGroup>, RandomState>>,
    orphan_checks: Mutex<VecDeque<Weak<ProcessGroup>>>,
}

impl GroupRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            groups: Mutex::new(HashMap::with_hasher(RandomState::new())),
            orphan_checks: Mutex::new(VecDeque::new()),
        })
    }

    /// Published group with this id
    pub fn get(&self, id: GroupId) -> Option<Arc<ProcessGroup>> {
        self.groups.lock().get(&id).and_then(Weak::upgrade)
    }

    /// Number of published groups still alive
    pub fn len(&self) -> usize {
        self.groups
            .lock()
            .values()
            .filter(|g| g.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tie `group` to `session` and make it visible
    ///
    /// Fails with `Busy` if a live group with the same id was published in
    /// the meantime; the caller restarts its create-or-find sequence.
    pub(crate) fn publish(
        &self,
        group: &Arc<ProcessGroup>,
        session: &Arc<ProcessSession>,
    ) -> KernelResult<()> {
        let mut groups = self.groups.lock();
        if groups.get(&group.id()).is_some_and(|g| g.strong_count() > 0) {
            return Err(KernelError::busy(format!("group {} already published", group.id())));
        }
        if !group.set_session(Arc::clone(session)) {
            crate::kernel_fault!("group {} published twice", group.id());
        }
        groups.insert(group.id(), Arc::downgrade(group));
        debug!(group = %group.id(), session = %session.id(), "Process group published");
        Ok(())
    }

    pub(crate) fn unregister(&self, id: GroupId, group: *const ProcessGroup) {
        let mut groups = self.groups.lock();
        if groups.get(&id).is_some_and(|g| std::ptr::eq(g.as_ptr(), group)) {
            groups.remove(&id);
            trace!(group = %id, "Process group unregistered");
        }
    }

    /// Queue `group` for the deferred orphan check (idempotent)
    pub fn schedule_orphan_check(&self, group: &Arc<ProcessGroup>) {
        let mut queue = self.orphan_checks.lock();
        if group.enter_orphan_check() {
            queue.push_back(Arc::downgrade(group));
            trace!(group = %group.id(), "Orphan check scheduled");
        }
    }

    pub(crate) fn take_next_orphan_check(&self) -> Option<Arc<ProcessGroup>> {
        let mut queue = self.orphan_checks.lock();
        while let Some(weak) = queue.pop_front() {
            if let Some(group) = weak.upgrade() {
                group.leave_orphan_check();
                return Some(group);
            }
        }
        None
    }

    pub fn pending_orphan_checks(&self) -> usize {
        self.orphan_checks.lock().len()
    }
}
