/*!
 * Kernel Entry
 *
 * A host thread calling into the kernel on behalf of a kernel thread first
 * attaches to it. Leaving the kernel runs the deferred signal work; when a
 * signal arrives for a thread no host context is executing, the sender
 * attaches and leaves on the thread's behalf.
 */

use super::types::{Thread, ThreadState};
use crate::core::errors::{KernelError, KernelResult};
use crate::core::sync::{ConditionEntry, WaitStatus};
use crate::core::types::ThreadId;
use crate::kernel::Kernel;
use crate::monitoring::{span_syscall, SyscallSpan};
use crate::team::Team;
use std::fmt;
use std::sync::Arc;

/// Proof that the current host thread executes `thread` in the kernel
///
/// Dropping the entry leaves the kernel: pending signals are handled and the
/// thread returns to its resting state.
pub struct KernelEntry {
    kernel: Kernel,
    thread: Arc<Thread>,
    _span: SyscallSpan,
}

impl KernelEntry {
    pub fn thread(&self) -> &Arc<Thread> {
        &self.thread
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread.id()
    }

    /// The calling team
    pub fn team(&self) -> KernelResult<Arc<Team>> {
        self.thread
            .team()
            .ok_or(KernelError::BadThreadId(self.thread.id()))
    }
}

impl Drop for KernelEntry {
    fn drop(&mut self) {
        self.kernel.leave_kernel(&self.thread);
    }
}

impl fmt::Debug for KernelEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelEntry")
            .field("thread", &self.thread.id())
            .finish()
    }
}

impl Kernel {
    /// Attach the calling host thread to `caller` for `syscall`
    ///
    /// Fails with `BadThreadId` for unknown or exiting threads.
    pub fn enter(&self, syscall: &'static str, caller: ThreadId) -> KernelResult<KernelEntry> {
        let thread = self
            .inner
            .threads
            .lookup(caller.raw())
            .ok_or(KernelError::BadThreadId(caller))?;

        if !thread.attach() {
            return Err(KernelError::BadThreadId(caller));
        }
        if thread.is_exiting() {
            thread.detach();
            return Err(KernelError::BadThreadId(caller));
        }

        Ok(KernelEntry {
            kernel: self.clone(),
            thread,
            _span: span_syscall(syscall, caller),
        })
    }

    /// Handle pending signals and detach; repeats while signals keep
    /// arriving and nobody else picked the thread up
    pub(crate) fn leave_kernel(&self, thread: &Arc<Thread>) {
        loop {
            self.handle_signals(thread);
            thread.detach();

            if thread.state() == ThreadState::FreeOnResched
                || !self.has_pending_signals(thread)
                || !thread.try_attach_idle()
            {
                break;
            }
        }
    }

    pub(crate) fn has_pending_signals(&self, thread: &Thread) -> bool {
        match thread.team_id() {
            Some(team) => self.inner.signals.has_pending(team, thread.id()),
            None => false,
        }
    }

    /// Block the attached `thread` on a published condition entry
    ///
    /// An interruptible wait ends early with `Interrupted` when a signal is
    /// pending or arrives, or the thread is exiting.
    pub(crate) fn block_on(
        &self,
        thread: &Arc<Thread>,
        entry: &ConditionEntry<'_>,
        interruptible: bool,
    ) -> WaitStatus {
        thread.begin_wait(entry, interruptible);
        if interruptible && (thread.is_exiting() || self.has_pending_signals(thread)) {
            entry.cancel(WaitStatus::Interrupted);
        }

        self.inner.scheduler.reschedule(thread);
        let status = entry.wait();
        thread.end_wait();
        status
    }
}
