/*!
 * Thread Exit
 *
 * An exiting thread hands itself over to the kernel team and leaves a death
 * record behind. The main thread takes the whole team with it: the team is
 * shut down, reported dead to its parent and deleted before the thread
 * itself becomes free. What the thread cannot release while still
 * "running" (its kernel stack, its table slot) goes to the undertaker.
 */

use super::types::Thread;
use crate::core::errors::KernelResult;
use crate::core::limits::URGENT_DISPLAY_PRIORITY;
use crate::core::types::ThreadId;
use crate::job_control::ExitInfo;
use crate::kernel::{Kernel, KernelEvent};
use crate::signals::{Signal, SignalInfo};
use crate::team::{DeadThread, Team};
use std::sync::Arc;
use tracing::{debug, trace};

impl Kernel {
    /// Exit the calling thread with `status`
    ///
    /// Exiting the main thread ends the whole team.
    pub fn exit_thread(&self, caller: ThreadId, status: i32) -> KernelResult<()> {
        let entry = self.enter("exit_thread", caller)?;
        let thread = Arc::clone(entry.thread());
        self.exit_thread_with(&thread, ExitInfo::exited(status));
        Ok(())
    }

    /// Exit the calling team with `status`
    ///
    /// The status is recorded for the parent even when a thread other than
    /// the main thread makes the call.
    pub fn exit_team(&self, caller: ThreadId, status: i32) -> KernelResult<()> {
        let entry = self.enter("exit_team", caller)?;
        let thread = Arc::clone(entry.thread());
        let team = entry.team()?;
        let info = ExitInfo::exited(status);

        team.lock().init_exit(info);
        match team.main_thread() {
            Some(main) if !Arc::ptr_eq(&main, &thread) => {
                self.exit_thread_with(&thread, info);
                let signal = SignalInfo::new(team.id(), 0);
                if let Err(e) = self.send_signal_to_thread(&main, Signal::SIGKILLTHR, signal) {
                    trace!(team = %team.id(), error = %e, "Main thread already gone");
                }
            }
            _ => self.exit_thread_with(&thread, info),
        }
        Ok(())
    }

    /// Tear `thread` down; no-op if it is already exiting
    ///
    /// Runs on a host context attached to `thread`, with no lock held.
    pub(crate) fn exit_thread_with(&self, thread: &Arc<Thread>, info: ExitInfo) {
        if !thread.begin_exit(info) {
            return;
        }
        let Some(team) = thread.team() else {
            crate::kernel_fault!("exiting thread {} has no team", thread.id());
        };
        let is_main = team
            .main_thread()
            .is_some_and(|main| Arc::ptr_eq(&main, thread));
        if is_main && team.is_root() {
            crate::kernel_fault!("kernel team main thread exiting");
        }

        thread.set_priority(URGENT_DISPLAY_PRIORITY);
        debug!(
            thread = %thread.id(),
            team = %team.id(),
            main = is_main,
            reason = ?info.reason,
            "Thread exiting"
        );

        if is_main {
            team.lock().init_exit(info);
            self.shutdown_team(&team, thread);
            let removed = self.remove_exiting_team(&team, thread, info);
            self.finish_team_removal(&team, removed);
        } else {
            self.detach_exiting_thread(&team, thread, info);
        }

        self.inner.threads.set_visible(thread.id().raw(), false);
        thread.mailbox().close();
        thread.finish_exit();
        self.publish(KernelEvent::ThreadRemoved {
            thread: thread.id(),
            team: team.id(),
        });

        thread.release_user_stack();
        thread.mark_free();
        self.inner.scheduler.reschedule(thread);
        self.inner.signals.forget_thread(thread.id());
        self.inner.undertaker.bury(Arc::clone(thread));
    }

    /// Move a non-main thread to the kernel team and record its death
    fn detach_exiting_thread(&self, team: &Arc<Team>, thread: &Arc<Thread>, info: ExitInfo) {
        let root = &self.inner.root;
        let mut root_locked = root.lock();
        let mut team_locked = if team.is_root() { None } else { Some(team.lock()) };

        {
            let locked = team_locked.as_mut().unwrap_or(&mut root_locked);
            locked.dead_threads_times.add(thread.cpu_times());
            locked.remove_thread(thread);
            if locked.debugger_nub == Some(thread.id()) {
                locked.debugger_nub = None;
            }

            if let Some(remaining) = locked.death_remaining.as_mut() {
                *remaining = remaining.saturating_sub(1);
                if *remaining == 0 {
                    team.death_condition().notify_all();
                }
            }

            if !thread.has_exit_waiters() {
                locked.dead_threads.push_back(DeadThread {
                    thread: thread.id(),
                    status: info.status,
                });
                let max = self.inner.config.max_dead_threads;
                while locked.dead_threads.len() > max {
                    locked.dead_threads.pop_front();
                }
            }
        }

        thread.set_team(root);
        root_locked.threads.push(Arc::clone(thread));
    }
}
