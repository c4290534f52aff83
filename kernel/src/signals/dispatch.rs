/*!
 * Signal Dispatch
 *
 * Sending decides whether a signal matters at all and who notices it;
 * handling applies the default job-control dispositions when a thread
 * leaves the kernel. No team or group lock is held while sending, because
 * on-behalf handling may exit threads and take any lock.
 */

use super::types::{
    DefaultAction, PendingSignal, SendFlags, Signal, SignalActionFlags, SignalHandler, SignalInfo,
    SignalOutcome, SignalTarget,
};
use crate::core::errors::{KernelError, KernelResult};
use crate::core::types::{GroupId, Uid};
use crate::job_control::{set_job_control_state, ExitInfo, JobControlState};
use crate::kernel::Kernel;
use crate::team::{Team, TeamAndParentLock};
use crate::thread::{Thread, ThreadState};
use std::sync::Arc;
use tracing::{debug, trace};

const STOP_SIGNALS: [Signal; 4] = [
    Signal::SIGSTOP,
    Signal::SIGTSTP,
    Signal::SIGTTIN,
    Signal::SIGTTOU,
];

impl Kernel {
    /// Send `signal` to a team or a single thread
    pub fn send_signal(
        &self,
        target: SignalTarget,
        signal: Signal,
        info: SignalInfo,
    ) -> KernelResult<()> {
        match target {
            SignalTarget::Thread(id) => {
                let thread = self
                    .inner
                    .threads
                    .lookup(id.raw())
                    .ok_or(KernelError::BadThreadId(id))?;
                self.send_signal_to_thread(&thread, signal, info)
            }
            SignalTarget::Team(id) => {
                let team = self
                    .inner
                    .teams
                    .lookup(id.raw())
                    .ok_or(KernelError::BadTeamId(id))?;
                self.send_signal_to_team(&team, signal, info)
            }
        }
    }

    /// Send `signal` to every team of a process group
    pub fn send_signal_to_group(
        &self,
        group: GroupId,
        signal: Signal,
        info: SignalInfo,
    ) -> KernelResult<()> {
        let group = self
            .inner
            .groups
            .get(group)
            .ok_or(KernelError::BadGroupId(group))?;
        let members = group.lock().teams();

        debug!(group = %group.id(), %signal, members = members.len(), "Signaling process group");
        for team in members {
            if let Err(e) = self.send_signal_to_team(&team, signal, info) {
                trace!(team = %team.id(), error = %e, "Group member vanished");
            }
        }
        Ok(())
    }

    /// Whether `team` would observe `signal` at all
    fn accepts_signal(&self, team: &Arc<Team>, signal: Signal) -> bool {
        signal == Signal::SIGCONT
            || self.inner.signals.is_signal_blocked(team.id(), signal)
            || !team.lock().signal_actions.is_ignored(signal)
    }

    pub(crate) fn send_signal_to_thread(
        &self,
        thread: &Arc<Thread>,
        signal: Signal,
        info: SignalInfo,
    ) -> KernelResult<()> {
        let team = thread.team().ok_or(KernelError::BadThreadId(thread.id()))?;
        if !self.accepts_signal(&team, signal) {
            trace!(thread = %thread.id(), %signal, "Ignored signal discarded");
            return Ok(());
        }

        self.inner.signals.send_signal(
            SignalTarget::Thread(thread.id()),
            signal,
            info,
            SendFlags::empty(),
        )?;

        if signal == Signal::SIGCONT {
            self.make_ready(thread);
            if team.main_thread().is_some_and(|m| Arc::ptr_eq(&m, thread)) {
                self.continue_team_state(&team, info.user);
            }
        }

        if self.inner.signals.has_pending(team.id(), thread.id()) {
            thread.interrupt_wait();
        }
        if thread.try_attach_idle() {
            self.leave_kernel(thread);
        }
        Ok(())
    }

    pub(crate) fn send_signal_to_team(
        &self,
        team: &Arc<Team>,
        signal: Signal,
        info: SignalInfo,
    ) -> KernelResult<()> {
        if team.is_root() {
            trace!(%signal, "Signal to the kernel team discarded");
            return Ok(());
        }
        if !self.accepts_signal(team, signal) {
            trace!(team = %team.id(), %signal, "Ignored signal discarded");
            return Ok(());
        }

        self.inner.signals.send_signal(
            SignalTarget::Team(team.id()),
            signal,
            info,
            SendFlags::empty(),
        )?;

        let threads = team.threads();
        if signal == Signal::SIGCONT {
            for thread in &threads {
                self.make_ready(thread);
            }
            self.continue_team_state(team, info.user);
        }

        let waiting = threads.iter().find(|t| {
            t.blocking_descriptor().is_some_and(|d| d.interruptible)
                && self.inner.signals.has_pending(team.id(), t.id())
        });
        if let Some(thread) = waiting {
            if thread.interrupt_wait() {
                return Ok(());
            }
        }

        if threads.iter().any(|t| t.is_attached()) {
            // handled when that thread leaves the kernel
            return Ok(());
        }

        let handler = team.main_thread().or_else(|| threads.first().cloned());
        if let Some(thread) = handler {
            if thread.try_attach_idle() {
                self.leave_kernel(&thread);
            }
        }
        Ok(())
    }

    /// Apply pending signals for `thread` until one needs user code, the
    /// thread exits or nothing is left
    pub(crate) fn handle_signals(&self, thread: &Arc<Thread>) -> SignalOutcome {
        let mut outcome = SignalOutcome::Nothing;

        loop {
            if thread.is_exiting() {
                return outcome;
            }
            let Some(team) = thread.team() else {
                return outcome;
            };
            let Some(pending) = self.inner.signals.take_pending(team.id(), thread.id()) else {
                return outcome;
            };
            let signal = pending.signal;
            let action = team.lock().signal_actions.get(signal);

            match action.handler {
                SignalHandler::Handler(entry) => {
                    debug!(thread = %thread.id(), %signal, entry, "Signal handler invoked");
                    return SignalOutcome::Handled {
                        signal,
                        handler: entry,
                    };
                }
                SignalHandler::Ignore => {
                    if outcome == SignalOutcome::Nothing {
                        outcome = SignalOutcome::Ignored;
                    }
                }
                SignalHandler::Default => match signal.default_action() {
                    DefaultAction::Ignore => {
                        if outcome == SignalOutcome::Nothing {
                            outcome = SignalOutcome::Ignored;
                        }
                    }
                    DefaultAction::Continue => outcome = SignalOutcome::Continued,
                    DefaultAction::Stop => {
                        if self.stop(thread, &team, &pending) {
                            outcome = SignalOutcome::Stopped(signal);
                        }
                    }
                    DefaultAction::Terminate => {
                        self.terminate(thread, &team, &pending);
                        return SignalOutcome::Exited(signal);
                    }
                },
            }
        }
    }

    /// Default action of a stop signal; false if it was discarded
    fn stop(&self, thread: &Arc<Thread>, team: &Arc<Team>, pending: &PendingSignal) -> bool {
        let signal = pending.signal;
        let team_directed = matches!(pending.target, SignalTarget::Team(_));

        // terminal stop signals cannot stop an orphaned group
        if signal != Signal::SIGSTOP && self.team_group_orphaned(team) {
            debug!(team = %team.id(), %signal, "Stop signal discarded, group orphaned");
            return false;
        }

        let is_main = team.main_thread().is_some_and(|m| Arc::ptr_eq(&m, thread));
        let mut notify = None;
        if team_directed || is_main {
            let mut locks = TeamAndParentLock::acquire(team, false);
            let (locked, parent) = locks.split_mut();
            if let (Some(entry), Some(parent)) = (locked.job_control_entry.clone(), parent) {
                let parent_team = Arc::clone(parent.team());
                set_job_control_state(
                    &entry,
                    &mut parent.children_state,
                    parent_team.dead_children_condition(),
                    JobControlState::Stopped,
                    Some((signal, pending.info.user)),
                );
                let flags = parent.signal_actions.get(Signal::SIGCHLD).flags;
                if !flags.contains(SignalActionFlags::NOCLDSTOP) {
                    notify = Some(parent_team);
                }
            }
        }

        if team_directed {
            for member in team.threads() {
                member.set_resting(ThreadState::Suspended);
            }
        } else {
            thread.set_resting(ThreadState::Suspended);
        }
        debug!(team = %team.id(), thread = %thread.id(), %signal, "Stopped");

        if let Some(parent) = notify {
            self.notify_parent(&parent, team, pending.info.user);
        }
        true
    }

    /// Report a stopped team as continued to its parent
    fn continue_team_state(&self, team: &Arc<Team>, user: Uid) {
        for signal in STOP_SIGNALS {
            self.inner.signals.clear_pending(team.id(), signal);
        }

        let mut locks = TeamAndParentLock::acquire(team, false);
        let (locked, parent) = locks.split_mut();
        let (Some(entry), Some(parent)) = (locked.job_control_entry.clone(), parent) else {
            return;
        };
        if entry.state() != JobControlState::Stopped {
            return;
        }
        let parent_team = Arc::clone(parent.team());
        set_job_control_state(
            &entry,
            &mut parent.children_state,
            parent_team.dead_children_condition(),
            JobControlState::Continued,
            Some((Signal::SIGCONT, user)),
        );
        debug!(team = %team.id(), "Continued");
    }

    /// Default action of a terminating signal
    fn terminate(&self, thread: &Arc<Thread>, team: &Arc<Team>, pending: &PendingSignal) {
        let info = ExitInfo::killed(pending.signal, pending.info.user);
        if pending.signal == Signal::SIGKILLTHR {
            self.exit_thread_with(thread, info);
            return;
        }

        team.lock().init_exit(info);
        match team.main_thread() {
            Some(main) if !Arc::ptr_eq(&main, thread) => {
                // exit first: the main thread waits for every other thread
                self.exit_thread_with(thread, info);
                let killed = self.send_signal_to_thread(&main, Signal::SIGKILLTHR, pending.info);
                if let Err(e) = killed {
                    trace!(team = %team.id(), error = %e, "Main thread already gone");
                }
            }
            _ => self.exit_thread_with(thread, info),
        }
    }

    /// SIGCHLD to `parent` about `child`
    pub(crate) fn notify_parent(&self, parent: &Arc<Team>, child: &Arc<Team>, user: Uid) {
        let info = SignalInfo::new(child.id(), user);
        if let Err(e) = self.send_signal_to_team(parent, Signal::SIGCHLD, info) {
            trace!(parent = %parent.id(), error = %e, "SIGCHLD not delivered");
        }
    }
}
