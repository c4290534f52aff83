/*!
 * Waiting for Children
 *
 * The consumer side of job control: a parent picks up state changes its
 * children (or, after reparenting, adopted teams) left in its queues.
 */

use super::entry::{set_job_control_state, EntryMatch};
use super::types::{ChildSelector, JobControlState, WaitFlags, WaitInfo};
use crate::core::errors::{KernelError, KernelResult};
use crate::core::sync::WaitStatus;
use crate::core::types::ThreadId;
use crate::kernel::Kernel;
use crate::signals::{Signal, SignalActionFlags, SignalHandler};
use crate::team::LockedTeam;
use std::sync::Arc;
use tracing::{debug, trace};

impl Kernel {
    /// Wait for a child matching `selector` to die, stop or continue
    ///
    /// Dead, continued and stopped children are looked at in that order.
    /// Unless `NOWAIT` is given the reported state is consumed.
    pub fn wait_for_child(
        &self,
        caller: ThreadId,
        selector: ChildSelector,
        flags: WaitFlags,
    ) -> KernelResult<WaitInfo> {
        if !flags.wants_any_state() {
            return Err(KernelError::bad_value("no child state requested"));
        }

        let entry = self.enter("wait_for_child", caller)?;
        let thread = Arc::clone(entry.thread());
        let team = entry.team()?;

        let mut ignore_found = false;
        let mut ignore_checked = false;

        let (info, matcher) = loop {
            let mut locked = team.lock();
            let matcher = match selector {
                ChildSelector::Any => EntryMatch::Any,
                ChildSelector::Team(id) => EntryMatch::Team(id),
                ChildSelector::Group(id) => EntryMatch::Group(id),
                ChildSelector::OwnGroup => EntryMatch::Group(locked.group_id),
            };

            if let Some(found) = locked.children_state.find(matcher, flags) {
                let info = found.wait_info();
                if !flags.contains(WaitFlags::NOWAIT) || ignore_found {
                    if info.state == JobControlState::Dead {
                        locked.children_state.remove_dead(&found);
                    } else {
                        set_job_control_state(
                            &found,
                            &mut locked.children_state,
                            team.dead_children_condition(),
                            JobControlState::None,
                            None,
                        );
                    }
                }
                drop(locked);

                if ignore_found {
                    trace!(team = %team.id(), child = %info.team, "Child status discarded");
                    continue;
                }
                break (info, matcher);
            }

            if !has_matching_child(&locked, matcher) {
                return Err(KernelError::NoSuchChild);
            }
            if flags.contains(WaitFlags::NOHANG) {
                return Err(KernelError::WouldBlock);
            }

            let condition = team.dead_children_condition();
            let wait_entry = condition.add_entry();
            drop(locked);

            if self.block_on(&thread, &wait_entry, true) == WaitStatus::Interrupted {
                return Err(KernelError::Interrupted);
            }

            // SIGCHLD ignored or SA_NOCLDWAIT: reap until no child is left
            if !ignore_checked {
                let action = team.lock().signal_actions.get(Signal::SIGCHLD);
                ignore_found = action.handler == SignalHandler::Ignore
                    || action.flags.contains(SignalActionFlags::NOCLDWAIT);
                ignore_checked = true;
            }
        };

        {
            let locked = team.lock();
            if self.inner.signals.is_signal_blocked(team.id(), Signal::SIGCHLD)
                && locked.children_state.find(matcher, flags).is_none()
            {
                self.inner.signals.clear_pending(team.id(), Signal::SIGCHLD);
            }
        }

        // the dead child's main thread lingers in the kernel team briefly
        if info.state == JobControlState::Dead {
            if let Some(main) = self.inner.threads.lookup_any(info.team.raw()) {
                if let Some(exit_entry) = main.add_exit_waiter() {
                    self.block_on(&thread, &exit_entry, false);
                    main.remove_exit_waiter();
                }
            }
        }

        debug!(
            team = %team.id(),
            child = %info.team,
            state = ?info.state,
            reason = ?info.reason,
            "Child status reported"
        );
        Ok(info)
    }
}

/// Whether any child could still report something for `matcher`
///
/// Runs with the parent locked; children are locked one at a time.
fn has_matching_child(parent: &LockedTeam, matcher: EntryMatch) -> bool {
    match matcher {
        EntryMatch::Any => !parent.children.is_empty(),
        EntryMatch::Group(group) => parent
            .children
            .iter()
            .any(|child| child.lock().group_id == group),
        EntryMatch::Team(id) => parent.children.iter().any(|child| child.id() == id),
    }
}
