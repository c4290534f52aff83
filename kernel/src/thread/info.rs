/*!
 * Thread Introspection and Joining
 */

use super::stack::UserStack;
use super::types::{Thread, ThreadState};
use crate::core::errors::{KernelError, KernelResult};
use crate::core::sync::WaitStatus;
use crate::core::types::{Priority, TeamId, ThreadId};
use crate::kernel::Kernel;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Snapshot of a thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadInfo {
    pub thread: ThreadId,
    pub team: TeamId,
    pub name: String,
    pub state: ThreadState,
    pub priority: Priority,
    pub user_time: Duration,
    pub kernel_time: Duration,
    pub user_stack: Option<UserStack>,
    /// Name of the condition the thread is blocked on
    pub blocked_on: Option<&'static str>,
}

impl ThreadInfo {
    fn of(thread: &Thread, team: TeamId) -> Self {
        let times = thread.cpu_times();
        Self {
            thread: thread.id(),
            team,
            name: thread.name().as_str().to_owned(),
            state: thread.state(),
            priority: thread.priority(),
            user_time: times.user,
            kernel_time: times.kernel,
            user_stack: thread.user_stack(),
            blocked_on: thread.blocking_descriptor().map(|d| d.condition),
        }
    }
}

impl Kernel {
    pub fn get_thread_info(&self, id: ThreadId) -> KernelResult<ThreadInfo> {
        let thread = self.thread(id).ok_or(KernelError::BadThreadId(id))?;
        let team = thread.team_id().ok_or(KernelError::BadThreadId(id))?;
        Ok(ThreadInfo::of(&thread, team))
    }

    /// Thread of `team` with the smallest id above `cursor`
    ///
    /// Start with `ThreadId(0)` and feed back the returned id; `None` once
    /// every thread was reported.
    pub fn get_next_thread_info(
        &self,
        team: TeamId,
        cursor: ThreadId,
    ) -> KernelResult<Option<ThreadInfo>> {
        let team = self.team(team).ok_or(KernelError::BadTeamId(team))?;
        let next = team
            .lock()
            .threads
            .iter()
            .filter(|t| t.id() > cursor)
            .min_by_key(|t| t.id())
            .cloned();
        Ok(next.map(|thread| ThreadInfo::of(&thread, team.id())))
    }

    /// Block until thread `id` exited and return its exit status
    ///
    /// A thread that is already gone is looked up in the caller team's dead
    /// children (main threads of child teams) and then in its dead-thread
    /// records, which are consumed.
    pub fn wait_for_thread(&self, caller: ThreadId, id: ThreadId) -> KernelResult<i32> {
        if caller == id {
            return Err(KernelError::not_allowed("a thread cannot wait for itself"));
        }
        let entry = self.enter("wait_for_thread", caller)?;
        let thread = Arc::clone(entry.thread());
        let team = entry.team()?;

        if let Some(target) = self.inner.threads.lookup(id.raw()) {
            if let Some(exit_entry) = target.add_exit_waiter() {
                let status = self.block_on(&thread, &exit_entry, true);
                drop(exit_entry);
                target.remove_exit_waiter();
                if status == WaitStatus::Interrupted {
                    return Err(KernelError::Interrupted);
                }
            }
            if let Some(info) = target.exit_info() {
                trace!(thread = %id, status = info.status, "Joined thread");
                return Ok(info.status);
            }
        }

        let mut locked = team.lock();
        if let Some(child) = locked
            .children_state
            .dead
            .iter()
            .find(|e| ThreadId::from(e.team_id()) == id)
        {
            return Ok(child.wait_info().status);
        }
        if let Some(pos) = locked.dead_threads.iter().position(|d| d.thread == id) {
            if let Some(record) = locked.dead_threads.remove(pos) {
                return Ok(record.status);
            }
        }
        Err(KernelError::BadThreadId(id))
    }
}
