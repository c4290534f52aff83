/*!
 * Team Types
 */

use super::locking::LockedTeam;
use crate::core::data_structures::InlineString;
use crate::core::errors::KernelError;
use crate::core::limits::{FIRST_USER_DEFINED_TIMER_ID, TEAM_ARGS_LENGTH, TEAM_NAME_LENGTH};
use crate::core::sync::ConditionVariable;
use crate::core::types::{CpuTimes, GroupId, SessionId, TeamId, ThreadId, Uid};
use crate::group::ProcessGroup;
use crate::interfaces::{AddressSpaceHandle, IoContextHandle};
use crate::job_control::{ExitInfo, JobControlEntry, JobControlQueues};
use crate::signals::{Signal, SignalAction, SignalActionTable};
use crate::table::TableObject;
use crate::thread::Thread;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// Team lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamState {
    /// Being created; not yet running its image
    Birth,
    Normal,
    /// Main thread is exiting; no new threads or debugger
    Shutdown,
    /// Removed from the team table
    Death,
}

/// Clock a user timer measures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerClock {
    RealTime,
    TeamTotalCpu,
    TeamUserCpu,
}

/// Timer owned by a team
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTimer {
    pub id: i32,
    pub clock: TimerClock,
    pub interval: Duration,
}

impl UserTimer {
    /// Created through `create_user_timer` (as opposed to the alarm timer)
    pub fn is_user_defined(&self) -> bool {
        self.id >= FIRST_USER_DEFINED_TIMER_ID
    }
}

/// Exit record of a non-main thread nobody waited for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadThread {
    pub thread: ThreadId,
    pub status: i32,
}

/// Callback run once when a watched team is deleted
pub type TeamWatcherFn = Box<dyn FnOnce(TeamId) + Send>;

pub(crate) struct TeamWatcher {
    pub key: u64,
    pub callback: TeamWatcherFn,
}

/// Mutable state of a team, guarded by the team lock
pub struct TeamData {
    pub(crate) state: TeamState,
    pub(crate) name: InlineString,
    pub(crate) args: InlineString,
    pub(crate) parent: Option<Weak<Team>>,
    pub(crate) children: Vec<Arc<Team>>,
    pub(crate) group: Option<Arc<ProcessGroup>>,
    pub(crate) group_id: GroupId,
    pub(crate) session_id: SessionId,
    pub(crate) threads: Vec<Arc<Thread>>,
    pub(crate) main_thread: Option<Arc<Thread>>,
    pub(crate) job_control_entry: Option<Arc<JobControlEntry>>,
    pub(crate) children_state: JobControlQueues,
    pub(crate) dead_threads: VecDeque<DeadThread>,
    pub(crate) dead_threads_times: CpuTimes,
    /// Threads the exiting main thread still waits for
    pub(crate) death_remaining: Option<usize>,
    pub(crate) exit: Option<ExitInfo>,
    pub(crate) signal_actions: SignalActionTable,
    pub(crate) user_timers: Vec<UserTimer>,
    pub(crate) next_timer_id: i32,
    pub(crate) address_space: Option<AddressSpaceHandle>,
    pub(crate) io_context: Option<IoContextHandle>,
    pub(crate) debugger_nub: Option<ThreadId>,
    pub(crate) watchers: Vec<TeamWatcher>,
    pub(crate) exec_done: bool,
    pub(crate) uid: Uid,
}

impl TeamData {
    fn new(id: TeamId, name: &str) -> Self {
        Self {
            state: TeamState::Birth,
            name: InlineString::truncated(name, TEAM_NAME_LENGTH),
            args: InlineString::new(),
            parent: None,
            children: Vec::new(),
            group: None,
            group_id: GroupId::from(id),
            session_id: SessionId::from(id),
            threads: Vec::new(),
            main_thread: None,
            job_control_entry: None,
            children_state: JobControlQueues::default(),
            dead_threads: VecDeque::new(),
            dead_threads_times: CpuTimes::ZERO,
            death_remaining: None,
            exit: None,
            signal_actions: SignalActionTable::new(),
            user_timers: Vec::new(),
            next_timer_id: FIRST_USER_DEFINED_TIMER_ID,
            address_space: None,
            io_context: None,
            debugger_nub: None,
            watchers: Vec::new(),
            exec_done: false,
            uid: 0,
        }
    }

    pub fn state(&self) -> TeamState {
        self.state
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn args(&self) -> &str {
        self.args.as_str()
    }

    pub(crate) fn set_args<S: AsRef<str>>(&mut self, args: &[S]) {
        self.args = InlineString::joined(args, TEAM_ARGS_LENGTH);
    }

    pub fn parent(&self) -> Option<Arc<Team>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn parent_id(&self) -> Option<TeamId> {
        self.parent().map(|p| p.id())
    }

    pub fn child_ids(&self) -> Vec<TeamId> {
        self.children.iter().map(|c| c.id()).collect()
    }

    pub fn group(&self) -> Option<&Arc<ProcessGroup>> {
        self.group.as_ref()
    }

    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn thread_ids(&self) -> Vec<ThreadId> {
        self.threads.iter().map(|t| t.id()).collect()
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    pub fn main_thread_id(&self) -> Option<ThreadId> {
        self.main_thread.as_ref().map(|t| t.id())
    }

    pub fn job_control_entry(&self) -> Option<&Arc<JobControlEntry>> {
        self.job_control_entry.as_ref()
    }

    pub fn stopped_children_count(&self) -> usize {
        self.children_state.stopped.len()
    }

    pub fn continued_children_count(&self) -> usize {
        self.children_state.continued.len()
    }

    pub fn dead_children_count(&self) -> usize {
        self.children_state.dead.len()
    }

    pub fn dead_children_times(&self) -> CpuTimes {
        self.children_state.dead_times
    }

    pub fn dead_threads(&self) -> impl Iterator<Item = &DeadThread> {
        self.dead_threads.iter()
    }

    pub fn exit(&self) -> Option<ExitInfo> {
        self.exit
    }

    pub fn signal_action(&self, signal: Signal) -> SignalAction {
        self.signal_actions.get(signal)
    }

    pub fn user_timers(&self) -> &[UserTimer] {
        &self.user_timers
    }

    pub fn address_space(&self) -> Option<AddressSpaceHandle> {
        self.address_space
    }

    pub fn io_context(&self) -> Option<IoContextHandle> {
        self.io_context
    }

    pub fn debugger_nub(&self) -> Option<ThreadId> {
        self.debugger_nub
    }

    pub fn exec_done(&self) -> bool {
        self.exec_done
    }

    pub fn uid(&self) -> Uid {
        self.uid
    }

    pub fn is_session_leader(&self, id: TeamId) -> bool {
        self.session_id == SessionId::from(id)
    }

    pub fn is_group_leader(&self, id: TeamId) -> bool {
        self.group_id == GroupId::from(id)
    }

    pub(crate) fn remove_thread(&mut self, thread: &Arc<Thread>) -> bool {
        match self.threads.iter().position(|t| Arc::ptr_eq(t, thread)) {
            Some(pos) => {
                self.threads.remove(pos);
                true
            }
            None => false,
        }
    }

    pub(crate) fn remove_child(&mut self, child: &Arc<Team>) -> bool {
        match self.children.iter().position(|c| Arc::ptr_eq(c, child)) {
            Some(pos) => {
                self.children.remove(pos);
                true
            }
            None => false,
        }
    }

    /// First exit reason wins
    pub(crate) fn init_exit(&mut self, info: ExitInfo) {
        if self.exit.is_none() {
            self.exit = Some(info);
        }
    }

    /// Whether `parent` is this team's parent
    pub(crate) fn has_parent(&self, parent: &Arc<Team>) -> bool {
        self.parent
            .as_ref()
            .is_some_and(|p| std::ptr::eq(p.as_ptr(), Arc::as_ptr(parent)))
    }

    /// Whether `group` is this team's group
    pub(crate) fn in_group(&self, group: &Arc<ProcessGroup>) -> bool {
        self.group.as_ref().is_some_and(|g| Arc::ptr_eq(g, group))
    }
}

/// A team (process)
///
/// The object table and the parent's child list hold strong references;
/// children point back at the parent weakly. All mutable state sits behind
/// the team lock, see [`Team::lock`].
pub struct Team {
    id: TeamId,
    root: bool,
    data: Arc<Mutex<TeamData>>,
    dead_children_condition: ConditionVariable,
    death_condition: ConditionVariable,
    start_time: Instant,
}

impl Team {
    pub(crate) fn new(id: TeamId, name: &str, root: bool) -> Arc<Self> {
        Arc::new(Self {
            id,
            root,
            data: Arc::new(Mutex::new(TeamData::new(id, name))),
            dead_children_condition: ConditionVariable::new("team children"),
            death_condition: ConditionVariable::new("team death"),
            start_time: Instant::now(),
        })
    }

    pub fn id(&self) -> TeamId {
        self.id
    }

    pub fn is_root(&self) -> bool {
        self.root
    }

    pub fn start_time(&self) -> Instant {
        self.start_time
    }

    /// Lock the team; see [`super::locking`] for the lock order
    pub fn lock(self: &Arc<Self>) -> LockedTeam {
        LockedTeam::new(self.data.lock_arc(), Arc::clone(self))
    }

    pub fn try_lock(self: &Arc<Self>) -> Option<LockedTeam> {
        let guard = self.data.try_lock_arc()?;
        Some(LockedTeam::new(guard, Arc::clone(self)))
    }

    pub fn state(&self) -> TeamState {
        self.data.lock().state
    }

    pub fn name(&self) -> InlineString {
        self.data.lock().name.clone()
    }

    pub fn parent(&self) -> Option<Arc<Team>> {
        self.data.lock().parent()
    }

    pub fn group(&self) -> Option<Arc<ProcessGroup>> {
        self.data.lock().group.clone()
    }

    pub fn group_id(&self) -> GroupId {
        self.data.lock().group_id
    }

    pub fn session_id(&self) -> SessionId {
        self.data.lock().session_id
    }

    pub fn main_thread(&self) -> Option<Arc<Thread>> {
        self.data.lock().main_thread.clone()
    }

    pub fn threads(&self) -> Vec<Arc<Thread>> {
        self.data.lock().threads.clone()
    }

    pub(crate) fn dead_children_condition(&self) -> &ConditionVariable {
        &self.dead_children_condition
    }

    pub(crate) fn death_condition(&self) -> &ConditionVariable {
        &self.death_condition
    }
}

impl TableObject for Team {
    fn object_id(&self) -> u32 {
        self.id.raw()
    }

    fn table_full(limit: usize) -> KernelError {
        KernelError::NoMoreTeams { limit }
    }
}

impl fmt::Debug for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Team")
            .field("id", &self.id)
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}
