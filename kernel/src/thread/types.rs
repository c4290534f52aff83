/*!
 * Thread Types
 */

use super::messaging::{Mailbox, UserBlock};
use super::stack::{KernelStack, UserStack};
use crate::core::data_structures::InlineString;
use crate::core::errors::KernelError;
use crate::core::limits::{DEFAULT_USER_STACK_SIZE, NORMAL_PRIORITY, THREAD_NAME_LENGTH};
use crate::core::sync::{ConditionEntry, ConditionVariable, WaitHandle, WaitStatus};
use crate::core::types::{CpuTimes, Priority, TeamId, ThreadId};
use crate::job_control::ExitInfo;
use crate::table::TableObject;
use crate::team::Team;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

/// Scheduling state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadState {
    Suspended,
    Ready,
    Running,
    Waiting,
    /// Exited; waiting for the undertaker
    FreeOnResched,
}

/// Creation parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadAttributes {
    pub name: String,
    pub priority: Priority,
    /// `None` for kernel-only threads
    pub user_stack_size: Option<usize>,
    pub entry: u64,
}

impl ThreadAttributes {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: NORMAL_PRIORITY,
            user_stack_size: Some(DEFAULT_USER_STACK_SIZE),
            entry: 0,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_user_stack_size(mut self, size: usize) -> Self {
        self.user_stack_size = Some(size);
        self
    }

    pub fn kernel_only(mut self) -> Self {
        self.user_stack_size = None;
        self
    }

    pub fn with_entry(mut self, entry: u64) -> Self {
        self.entry = entry;
        self
    }
}

/// What a waiting thread is blocked on (introspection only)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockingDescriptor {
    pub condition: &'static str,
    pub interruptible: bool,
    pub since: Instant,
}

struct SchedState {
    state: ThreadState,
    /// State to return to once no host context executes the thread
    resting: ThreadState,
    attached: u32,
}

#[derive(Default)]
struct WaitSlot {
    descriptor: Option<BlockingDescriptor>,
    handle: Option<WaitHandle>,
}

struct ExitSlot {
    info: ExitInfo,
    exiting: bool,
    done: bool,
    waiters: usize,
}

/// A kernel thread
///
/// The thread is "attached" while some host context executes kernel code on
/// its behalf (a syscall or deferred signal handling). While attached it is
/// `Running` or `Waiting`; otherwise it rests in `Suspended` or `Ready`.
pub struct Thread {
    id: ThreadId,
    team: Mutex<Weak<Team>>,
    name: Mutex<InlineString>,
    sched: Mutex<SchedState>,
    priority: AtomicI32,
    kernel_stack: Mutex<Option<KernelStack>>,
    user_stack: Mutex<Option<UserStack>>,
    wait: Mutex<WaitSlot>,
    times: Mutex<CpuTimes>,
    exit: Mutex<ExitSlot>,
    exit_condition: ConditionVariable,
    mailbox: Mailbox,
    user_block: UserBlock,
    entry: u64,
    created: Instant,
}

impl Thread {
    pub(crate) fn new(
        id: ThreadId,
        team: &Arc<Team>,
        attributes: &ThreadAttributes,
        kernel_stack: KernelStack,
        user_stack: Option<UserStack>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            team: Mutex::new(Arc::downgrade(team)),
            name: Mutex::new(InlineString::truncated(&attributes.name, THREAD_NAME_LENGTH)),
            sched: Mutex::new(SchedState {
                state: ThreadState::Suspended,
                resting: ThreadState::Suspended,
                attached: 0,
            }),
            priority: AtomicI32::new(attributes.priority),
            kernel_stack: Mutex::new(Some(kernel_stack)),
            user_stack: Mutex::new(user_stack),
            wait: Mutex::new(WaitSlot::default()),
            times: Mutex::new(CpuTimes::ZERO),
            exit: Mutex::new(ExitSlot {
                info: ExitInfo::exited(0),
                exiting: false,
                done: false,
                waiters: 0,
            }),
            exit_condition: ConditionVariable::new("thread exit"),
            mailbox: Mailbox::new(),
            user_block: UserBlock::new(),
            entry: attributes.entry,
            created: Instant::now(),
        })
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn name(&self) -> InlineString {
        self.name.lock().clone()
    }

    pub(crate) fn set_name(&self, name: &str) {
        *self.name.lock() = InlineString::truncated(name, THREAD_NAME_LENGTH);
    }

    /// Owning team; the root team once the thread exited
    pub fn team(&self) -> Option<Arc<Team>> {
        self.team.lock().upgrade()
    }

    pub fn team_id(&self) -> Option<TeamId> {
        self.team().map(|t| t.id())
    }

    pub(crate) fn set_team(&self, team: &Arc<Team>) {
        *self.team.lock() = Arc::downgrade(team);
    }

    pub fn entry(&self) -> u64 {
        self.entry
    }

    pub fn created(&self) -> Instant {
        self.created
    }

    pub fn state(&self) -> ThreadState {
        self.sched.lock().state
    }

    pub fn priority(&self) -> Priority {
        self.priority.load(Ordering::Relaxed)
    }

    pub(crate) fn set_priority(&self, priority: Priority) -> Priority {
        self.priority.swap(priority, Ordering::Relaxed)
    }

    /// Start executing on behalf of this thread; false once it is gone
    pub(crate) fn attach(&self) -> bool {
        let mut sched = self.sched.lock();
        if sched.state == ThreadState::FreeOnResched {
            return false;
        }
        sched.attached += 1;
        if sched.attached == 1 {
            sched.state = ThreadState::Running;
        }
        true
    }

    /// Attach only if no other context executes the thread
    pub(crate) fn try_attach_idle(&self) -> bool {
        let mut sched = self.sched.lock();
        if sched.attached > 0 || sched.state == ThreadState::FreeOnResched {
            return false;
        }
        sched.attached = 1;
        sched.state = ThreadState::Running;
        true
    }

    pub(crate) fn detach(&self) {
        let mut sched = self.sched.lock();
        sched.attached = sched.attached.saturating_sub(1);
        if sched.attached == 0 && sched.state == ThreadState::Running {
            sched.state = sched.resting;
        }
    }

    pub fn is_attached(&self) -> bool {
        self.sched.lock().attached > 0
    }

    pub fn resting_state(&self) -> ThreadState {
        self.sched.lock().resting
    }

    /// Change the state the thread rests in (`Suspended` or `Ready`)
    ///
    /// Returns the previous resting state.
    pub(crate) fn set_resting(&self, state: ThreadState) -> ThreadState {
        let mut sched = self.sched.lock();
        let old = sched.resting;
        sched.resting = state;
        if sched.attached == 0 && sched.state != ThreadState::FreeOnResched {
            sched.state = state;
        }
        old
    }

    pub(crate) fn mark_free(&self) {
        self.sched.lock().state = ThreadState::FreeOnResched;
    }

    /// Publish the blocking descriptor and enter `Waiting`
    pub(crate) fn begin_wait(&self, entry: &ConditionEntry<'_>, interruptible: bool) {
        {
            let mut wait = self.wait.lock();
            wait.descriptor = Some(BlockingDescriptor {
                condition: entry.variable_name(),
                interruptible,
                since: Instant::now(),
            });
            wait.handle = interruptible.then(|| entry.handle());
        }
        let mut sched = self.sched.lock();
        if sched.state != ThreadState::FreeOnResched {
            sched.state = ThreadState::Waiting;
        }
    }

    pub(crate) fn end_wait(&self) {
        *self.wait.lock() = WaitSlot::default();
        let mut sched = self.sched.lock();
        if sched.state == ThreadState::Waiting {
            sched.state = ThreadState::Running;
        }
    }

    /// Abort an interruptible wait; false if the thread is not in one
    pub(crate) fn interrupt_wait(&self) -> bool {
        let handle = self.wait.lock().handle.clone();
        handle.is_some_and(|h| h.wake(WaitStatus::Interrupted))
    }

    pub fn blocking_descriptor(&self) -> Option<BlockingDescriptor> {
        self.wait.lock().descriptor
    }

    pub fn cpu_times(&self) -> CpuTimes {
        *self.times.lock()
    }

    pub(crate) fn charge(&self, times: CpuTimes) {
        self.times.lock().add(times);
    }

    pub fn user_stack(&self) -> Option<UserStack> {
        *self.user_stack.lock()
    }

    pub(crate) fn release_user_stack(&self) {
        *self.user_stack.lock() = None;
    }

    pub fn has_kernel_stack(&self) -> bool {
        self.kernel_stack.lock().is_some()
    }

    pub(crate) fn take_kernel_stack(&self) -> Option<KernelStack> {
        self.kernel_stack.lock().take()
    }

    /// Record the exit; false if the thread is already exiting
    pub(crate) fn begin_exit(&self, info: ExitInfo) -> bool {
        let mut exit = self.exit.lock();
        if exit.exiting {
            return false;
        }
        exit.exiting = true;
        exit.info = info;
        true
    }

    pub fn is_exiting(&self) -> bool {
        self.exit.lock().exiting
    }

    pub fn exit_info(&self) -> Option<ExitInfo> {
        let exit = self.exit.lock();
        exit.exiting.then_some(exit.info)
    }

    pub(crate) fn has_exit_waiters(&self) -> bool {
        self.exit.lock().waiters > 0
    }

    /// Register as exit waiter; `None` if the exit already completed
    pub(crate) fn add_exit_waiter(&self) -> Option<ConditionEntry<'_>> {
        let mut exit = self.exit.lock();
        if exit.done {
            return None;
        }
        exit.waiters += 1;
        Some(self.exit_condition.add_entry())
    }

    pub(crate) fn remove_exit_waiter(&self) {
        let mut exit = self.exit.lock();
        exit.waiters = exit.waiters.saturating_sub(1);
    }

    /// Exit bookkeeping finished; wakes every exit waiter
    pub(crate) fn finish_exit(&self) {
        let mut exit = self.exit.lock();
        exit.done = true;
        self.exit_condition.notify_all();
    }

    pub fn is_exit_done(&self) -> bool {
        self.exit.lock().done
    }

    pub(crate) fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    pub(crate) fn user_block(&self) -> &UserBlock {
        &self.user_block
    }
}

impl TableObject for Thread {
    fn object_id(&self) -> u32 {
        self.id.raw()
    }

    fn table_full(limit: usize) -> KernelError {
        KernelError::NoMoreThreads { limit }
    }
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
