/*!
 * Team Teardown
 *
 * The exiting main thread shuts its team down (every other thread exits
 * first), takes the team out of the hierarchy under the removal locks and
 * finally deletes it with no lock held. Signals that fall out of the
 * removal (SIGCHLD to the parent, SIGHUP to the foreground group) are sent
 * only after every lock is dropped.
 */

use super::locking::{RemovalParts, TeamRemovalLock};
use super::types::{Team, TeamState};
use crate::core::types::GroupId;
use crate::job_control::{set_job_control_state, ExitInfo, JobControlQueues, JobControlState};
use crate::kernel::{Kernel, KernelEvent};
use crate::signals::{Signal, SignalInfo};
use crate::thread::Thread;
use std::sync::Arc;
use tracing::{debug, info, trace};

/// What is left to do once a team is out of the hierarchy
pub(crate) struct RemovedTeam {
    pub parent: Arc<Team>,
    /// Foreground group of the session the team controlled
    pub hangup_group: Option<GroupId>,
}

impl Kernel {
    /// Make every thread but `main` exit and wait until they are gone
    ///
    /// Marks the team `Shutdown` first, so no thread can be added meanwhile.
    pub(crate) fn shutdown_team(&self, team: &Arc<Team>, main: &Arc<Thread>) {
        let mut locked = team.lock();
        locked.state = TeamState::Shutdown;
        locked.user_timers.clear();

        loop {
            let others: Vec<Arc<Thread>> = locked
                .threads
                .iter()
                .filter(|t| !Arc::ptr_eq(t, main))
                .cloned()
                .collect();
            if others.is_empty() {
                locked.death_remaining = None;
                break;
            }

            locked.death_remaining = Some(others.len());
            let wait_entry = team.death_condition().add_entry();
            drop(locked);

            debug!(team = %team.id(), remaining = others.len(), "Killing remaining threads");
            let info = SignalInfo::new(team.id(), 0);
            for thread in &others {
                if let Err(e) = self.send_signal_to_thread(thread, Signal::SIGKILLTHR, info) {
                    trace!(thread = %thread.id(), error = %e, "Thread already gone");
                }
            }
            self.block_on(main, &wait_entry, false);
            drop(wait_entry);

            locked = team.lock();
        }
    }

    /// Hand the exiting main thread to the kernel team, report the team dead
    /// to its parent and take it out of the hierarchy
    pub(crate) fn remove_exiting_team(
        &self,
        team: &Arc<Team>,
        main: &Arc<Thread>,
        info: ExitInfo,
    ) -> RemovedTeam {
        let mut locks = match TeamRemovalLock::acquire(&self.inner.root, team) {
            Ok(locks) => locks,
            Err(e) => crate::kernel_fault!("team {} lost its group before exiting: {e}", team.id()),
        };
        let mut parts = locks.parts();

        parts.team.dead_threads_times.add(main.cpu_times());
        parts.team.remove_thread(main);
        parts.team.main_thread = None;
        main.set_team(&self.inner.root);
        parts.root_mut().threads.push(Arc::clone(main));

        let exit = parts.team.exit.unwrap_or(info);
        if let Some(entry) = parts.team.job_control_entry.take() {
            entry.init_dead_state(&exit, parts.team.group.clone(), parts.team.dead_threads_times);
            let parent_team = Arc::clone(parts.parent.team());
            set_job_control_state(
                &entry,
                &mut parts.parent.children_state,
                parent_team.dead_children_condition(),
                JobControlState::Dead,
                None,
            );
            let evicted = parts
                .parent
                .children_state
                .evict_dead_beyond(self.inner.config.max_dead_children);
            if evicted > 0 {
                debug!(parent = %parent_team.id(), evicted, "Dead children evicted");
            }
        }

        let hangup_group = self.remove_from_hierarchy(&mut parts);
        RemovedTeam {
            parent: Arc::clone(parts.parent.team()),
            hangup_group,
        }
    }

    /// Unlink a dying team from table, group, children and parent
    ///
    /// Returns the foreground group to hang up when the team was the
    /// controlling process of its session.
    fn remove_from_hierarchy(&self, parts: &mut RemovalParts<'_>) -> Option<GroupId> {
        let team = Arc::clone(parts.team.team());

        let mut lifetime = parts.team.dead_threads_times;
        lifetime.add(parts.team.children_state.dead_times);
        parts.parent.children_state.dead_times.add(lifetime);

        self.inner.teams.remove(team.id().raw());
        parts.team.state = TeamState::Death;

        let session = parts.group.group().session().cloned();
        let controlling = parts.team.is_session_leader(team.id())
            && session.as_ref().is_some_and(|s| s.controlling_tty().is_some());
        let hangup_group = if controlling {
            session.and_then(|s| s.hang_up())
        } else {
            None
        };

        parts.group.remove_team(parts.team);

        let session_id = parts.team.session_id;
        let group_id = parts.team.group_id;
        let children = std::mem::take(&mut parts.team.children);
        let mut queues = std::mem::take(&mut parts.team.children_state);
        for child in children {
            {
                let mut child_locked = child.lock();
                child_locked.parent = Some(Arc::downgrade(&self.inner.root));
                if controlling
                    && child_locked.session_id == session_id
                    && child_locked.group_id != group_id
                {
                    if let Some(group) = &child_locked.group {
                        self.inner.groups.schedule_orphan_check(group);
                    }
                }
            }
            trace!(child = %child.id(), "Reparented to the kernel team");
            parts.root_mut().children.push(child);
        }
        parts.root_mut().children_state.adopt_from(&mut queues);
        drop_dead_entries(queues);

        parts.parent.remove_child(&team);
        hangup_group
    }

    /// Work left after the removal locks are released
    pub(crate) fn finish_team_removal(&self, team: &Arc<Team>, removed: RemovedTeam) {
        self.notify_parent(&removed.parent, team, 0);

        if let Some(group) = removed.hangup_group {
            debug!(team = %team.id(), %group, "Controlling process gone, hanging up");
            let info = SignalInfo::new(team.id(), 0);
            if let Err(e) = self.send_signal_to_group(group, Signal::SIGHUP, info) {
                trace!(%group, error = %e, "Foreground group already gone");
            }
        }

        self.delete_team(team);
    }

    /// Release what is left of a team that is out of the hierarchy
    pub(crate) fn delete_team(&self, team: &Arc<Team>) {
        self.orphaned_group_check();

        let (watchers, address_space, io_context) = {
            let mut locked = team.lock();
            (
                std::mem::take(&mut locked.watchers),
                locked.address_space.take(),
                locked.io_context.take(),
            )
        };

        for watcher in watchers {
            trace!(team = %team.id(), key = watcher.key, "Notifying team watcher");
            (watcher.callback)(team.id());
        }
        self.publish(KernelEvent::TeamRemoved { team: team.id() });

        if let Some(space) = address_space {
            self.inner.address_spaces.destroy(space);
        }
        if let Some(context) = io_context {
            self.inner.io_contexts.put_context(context);
        }
        self.inner.signals.forget_team(team.id());

        info!(team = %team.id(), "Team deleted");
    }
}

/// Dead children of a dying team are never reported to anyone
fn drop_dead_entries(queues: JobControlQueues) {
    for entry in &queues.dead {
        trace!(team = %entry.team_id(), "Dropping unwaited dead child");
    }
}
