/*!
 * Thread Lifecycle
 *
 * Creation and the per-thread control calls. New threads start suspended;
 * stopping and killing go through the signal path so that they take effect
 * when the thread next leaves the kernel.
 */

use super::stack::UserStack;
use super::types::{Thread, ThreadAttributes, ThreadState};
use crate::core::errors::{KernelError, KernelResult};
use crate::core::limits::{LOWEST_ACTIVE_PRIORITY, MAX_PRIORITY};
use crate::core::types::{CpuTimes, Priority, TeamId, ThreadId};
use crate::kernel::{Kernel, KernelEvent};
use crate::signals::{Signal, SignalInfo};
use crate::team::{Team, TeamState};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

impl Kernel {
    /// Create a suspended thread in `team`
    ///
    /// Fails with `BadTeamId` once the team is shutting down and with
    /// `NoMoreThreads` when the thread table is full.
    pub fn spawn_thread(
        &self,
        team: TeamId,
        attributes: ThreadAttributes,
    ) -> KernelResult<ThreadId> {
        let team = self.team(team).ok_or(KernelError::BadTeamId(team))?;
        let id = ThreadId(self.inner.ids.next());
        self.register_thread(&team, id, &attributes)?;

        self.publish(KernelEvent::ThreadAdded {
            thread: id,
            team: team.id(),
        });
        debug!(thread = %id, team = %team.id(), name = %attributes.name, "Thread spawned");
        Ok(id)
    }

    /// Build a thread and link it into its team and the thread table
    ///
    /// A thread whose id equals the team id becomes the main thread. No
    /// event is published; the caller does that once the thread is final.
    pub(crate) fn register_thread(
        &self,
        team: &Arc<Team>,
        id: ThreadId,
        attributes: &ThreadAttributes,
    ) -> KernelResult<Arc<Thread>> {
        let kernel_stack = self.inner.stacks.allocate()?;
        let user_stack = if team.is_root() {
            None
        } else {
            attributes
                .user_stack_size
                .map(|size| UserStack::for_thread(id.raw(), size))
        };
        let thread = Thread::new(id, team, attributes, kernel_stack, user_stack);

        {
            let mut locked = team.lock();
            if !matches!(locked.state, TeamState::Birth | TeamState::Normal) {
                return Err(KernelError::BadTeamId(team.id()));
            }
            self.inner.threads.insert(Arc::clone(&thread))?;
            locked.threads.push(Arc::clone(&thread));
            if id == ThreadId::from(team.id()) {
                locked.main_thread = Some(Arc::clone(&thread));
            }
        }

        self.inner.scheduler.on_thread_create(&thread);
        Ok(thread)
    }

    /// Undo [`Kernel::register_thread`] for a thread that never ran
    pub(crate) fn unregister_thread(&self, team: &Arc<Team>, thread: &Arc<Thread>) {
        {
            let mut locked = team.lock();
            locked.remove_thread(thread);
            if locked
                .main_thread
                .as_ref()
                .is_some_and(|main| Arc::ptr_eq(main, thread))
            {
                locked.main_thread = None;
            }
        }
        self.inner.threads.remove(thread.id().raw());
        thread.mark_free();
        self.inner.scheduler.on_thread_destroy(thread);
    }

    /// Let a suspended thread run; no-op for any other state
    pub fn resume_thread(&self, id: ThreadId) -> KernelResult<()> {
        let thread = self.thread(id).ok_or(KernelError::BadThreadId(id))?;
        self.make_ready(&thread);
        Ok(())
    }

    pub(crate) fn make_ready(&self, thread: &Arc<Thread>) {
        if thread.is_exiting() || thread.resting_state() != ThreadState::Suspended {
            return;
        }
        thread.set_resting(ThreadState::Ready);
        self.inner.scheduler.enqueue_ready(thread);
    }

    /// Stop a single thread (SIGSTOP to the thread)
    pub fn suspend_thread(&self, id: ThreadId) -> KernelResult<()> {
        let thread = self.thread(id).ok_or(KernelError::BadThreadId(id))?;
        let info = SignalInfo::new(self.inner.root.id(), 0);
        self.send_signal_to_thread(&thread, Signal::SIGSTOP, info)
    }

    /// Make a single thread exit (SIGKILLTHR to the thread)
    pub fn kill_thread(&self, id: ThreadId) -> KernelResult<()> {
        let thread = self.thread(id).ok_or(KernelError::BadThreadId(id))?;
        if id == self.root_thread_id() {
            return Err(KernelError::not_allowed("the kernel team's main thread cannot be killed"));
        }
        let info = SignalInfo::new(self.inner.root.id(), 0);
        info!(thread = %id, "Killing thread");
        self.send_signal_to_thread(&thread, Signal::SIGKILLTHR, info)
    }

    /// Set a thread's priority, clamped to the valid range; returns the old one
    pub fn set_thread_priority(&self, id: ThreadId, priority: Priority) -> KernelResult<Priority> {
        let thread = self.thread(id).ok_or(KernelError::BadThreadId(id))?;
        let old = thread.set_priority(priority.clamp(LOWEST_ACTIVE_PRIORITY, MAX_PRIORITY));
        debug!(thread = %id, old, new = thread.priority(), "Thread priority changed");
        Ok(old)
    }

    pub fn rename_thread(&self, id: ThreadId, name: &str) -> KernelResult<()> {
        let thread = self.thread(id).ok_or(KernelError::BadThreadId(id))?;
        thread.set_name(name);
        Ok(())
    }

    /// Account CPU time consumed by a thread
    pub fn charge_cpu_time(
        &self,
        id: ThreadId,
        user: Duration,
        kernel: Duration,
    ) -> KernelResult<()> {
        let thread = self.thread(id).ok_or(KernelError::BadThreadId(id))?;
        thread.charge(CpuTimes::new(user, kernel));
        Ok(())
    }
}
