/*!
 * Job Control Entries
 *
 * Each non-root team owns one entry describing its wait state to its parent.
 * The entry sits in at most one of the parent's queues (stopped, continued,
 * dead); moving it between queues requires the parent's lock. On death the
 * entry takes a reference to the team's process group and lives on in the
 * parent's dead queue until `wait` consumes it.
 */

use super::types::{ExitInfo, ExitReason, JobControlState, WaitFlags, WaitInfo};
use crate::core::sync::ConditionVariable;
use crate::core::types::{CpuTimes, GroupId, TeamId, Uid};
use crate::group::ProcessGroup;
use crate::signals::Signal;
use crate::team::Team;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

struct EntryState {
    state: JobControlState,
    group_id: GroupId,
    /// Held only in the `Dead` state
    group: Option<Arc<ProcessGroup>>,
    status: i32,
    reason: ExitReason,
    signal: Option<Signal>,
    signaling_user: Uid,
    usage: CpuTimes,
}

/// Wait-state record of one child team
pub struct JobControlEntry {
    team_id: TeamId,
    inner: Mutex<EntryState>,
}

impl JobControlEntry {
    pub(crate) fn new(team: &Arc<Team>, group_id: GroupId) -> Arc<Self> {
        Arc::new(Self {
            team_id: team.id(),
            inner: Mutex::new(EntryState {
                state: JobControlState::None,
                group_id,
                group: None,
                status: 0,
                reason: ExitReason::Exited,
                signal: None,
                signaling_user: 0,
                usage: CpuTimes::ZERO,
            }),
        })
    }

    /// Id of the team (and its main thread) this entry describes
    pub fn team_id(&self) -> TeamId {
        self.team_id
    }

    pub fn state(&self) -> JobControlState {
        self.inner.lock().state
    }

    pub fn group_id(&self) -> GroupId {
        self.inner.lock().group_id
    }

    pub(crate) fn set_group_id(&self, group_id: GroupId) {
        self.inner.lock().group_id = group_id;
    }

    /// Fill in the final status of the dying team
    pub(crate) fn init_dead_state(
        &self,
        exit: &ExitInfo,
        group: Option<Arc<ProcessGroup>>,
        usage: CpuTimes,
    ) {
        let mut inner = self.inner.lock();
        if let Some(group) = &group {
            inner.group_id = group.id();
        }
        inner.group = group;
        inner.status = exit.status;
        inner.reason = exit.reason;
        inner.signal = exit.signal;
        inner.signaling_user = exit.signaling_user;
        inner.usage = usage;
    }

    fn transition(&self, state: JobControlState, signal: Option<(Signal, Uid)>) -> JobControlState {
        let mut inner = self.inner.lock();
        let old = inner.state;
        inner.state = state;
        if let Some((signal, user)) = signal {
            inner.signal = Some(signal);
            inner.signaling_user = user;
        }
        old
    }

    /// Snapshot reported to a waiting parent
    pub fn wait_info(&self) -> WaitInfo {
        let inner = self.inner.lock();
        let (reason, status, signal, usage) = match inner.state {
            JobControlState::Dead => {
                let status = if inner.reason == ExitReason::Exited {
                    inner.status
                } else {
                    0
                };
                (inner.reason, status, inner.signal, inner.usage.into())
            }
            JobControlState::Stopped => (ExitReason::Stopped, 0, inner.signal, Default::default()),
            JobControlState::Continued | JobControlState::None => {
                (ExitReason::Continued, 0, None, Default::default())
            }
        };

        WaitInfo {
            team: self.team_id,
            state: inner.state,
            reason,
            status,
            signal,
            signaling_user: inner.signaling_user,
            usage,
        }
    }
}

impl fmt::Debug for JobControlEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("JobControlEntry")
            .field("team", &self.team_id)
            .field("state", &inner.state)
            .field("group", &inner.group_id)
            .finish()
    }
}

/// Selector with `OwnGroup` already resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryMatch {
    Any,
    Team(TeamId),
    Group(GroupId),
}

impl EntryMatch {
    fn matches(self, entry: &JobControlEntry) -> bool {
        match self {
            EntryMatch::Any => true,
            EntryMatch::Team(id) => entry.team_id == id,
            EntryMatch::Group(id) => entry.group_id() == id,
        }
    }
}

/// A parent's child-state queues plus the CPU time of its dead children
#[derive(Default)]
pub(crate) struct JobControlQueues {
    pub stopped: VecDeque<Arc<JobControlEntry>>,
    pub continued: VecDeque<Arc<JobControlEntry>>,
    pub dead: VecDeque<Arc<JobControlEntry>>,
    pub dead_times: CpuTimes,
}

impl JobControlQueues {
    fn queue_mut(&mut self, state: JobControlState) -> Option<&mut VecDeque<Arc<JobControlEntry>>> {
        match state {
            JobControlState::None => None,
            JobControlState::Stopped => Some(&mut self.stopped),
            JobControlState::Continued => Some(&mut self.continued),
            JobControlState::Dead => Some(&mut self.dead),
        }
    }

    /// First matching entry, looking at dead, continued, then stopped children
    pub fn find(&self, selector: EntryMatch, flags: WaitFlags) -> Option<Arc<JobControlEntry>> {
        let lookups = [
            (WaitFlags::EXITED, &self.dead),
            (WaitFlags::CONTINUED, &self.continued),
            (WaitFlags::STOPPED, &self.stopped),
        ];
        lookups
            .into_iter()
            .filter(|(flag, _)| flags.contains(*flag))
            .find_map(|(_, queue)| queue.iter().find(|e| selector.matches(e)).cloned())
    }

    /// Remove a consumed dead entry
    pub fn remove_dead(&mut self, entry: &Arc<JobControlEntry>) -> bool {
        match self.dead.iter().position(|e| Arc::ptr_eq(e, entry)) {
            Some(pos) => {
                self.dead.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Drop the oldest dead entries beyond `max`; returns how many went
    pub fn evict_dead_beyond(&mut self, max: usize) -> usize {
        let excess = self.dead.len().saturating_sub(max);
        for evicted in self.dead.drain(..excess) {
            trace!(team = %evicted.team_id(), "Evicting unwaited dead child");
        }
        excess
    }

    /// Take over stopped and continued entries of reparented children
    pub fn adopt_from(&mut self, other: &mut JobControlQueues) {
        self.stopped.append(&mut other.stopped);
        self.continued.append(&mut other.continued);
    }
}

/// Move `entry` to the parent queue for `new_state`
///
/// The caller holds the parent's lock; `queues` and `condition` belong to the
/// parent. No-op if the state does not change or the entry is already dead.
pub(crate) fn set_job_control_state(
    entry: &Arc<JobControlEntry>,
    queues: &mut JobControlQueues,
    condition: &ConditionVariable,
    new_state: JobControlState,
    signal: Option<(Signal, Uid)>,
) -> bool {
    let current = entry.state();
    if current == new_state || current == JobControlState::Dead {
        return false;
    }

    if let Some(queue) = queues.queue_mut(current) {
        if let Some(pos) = queue.iter().position(|e| Arc::ptr_eq(e, entry)) {
            queue.remove(pos);
        }
    }

    entry.transition(new_state, signal);
    trace!(team = %entry.team_id(), from = ?current, to = ?new_state, "Job control state changed");

    if let Some(queue) = queues.queue_mut(new_state) {
        queue.push_back(Arc::clone(entry));
        condition.notify_all();
    }
    true
}
