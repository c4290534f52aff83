/*!
 * Orphaned Process Groups
 *
 * A group is orphaned when no member has a parent in a different group of
 * the same session, i.e. nobody left could continue its stopped members.
 * Checks are deferred: hierarchy changes only queue the group, and the
 * queue is drained later with no team or group lock held.
 */

use super::process_group::LockedGroup;
use crate::core::errors::{KernelError, KernelResult};
use crate::core::types::GroupId;
use crate::job_control::JobControlState;
use crate::kernel::Kernel;
use crate::signals::{Signal, SignalInfo};
use crate::team::{lock_current_group, Team, TeamAndParentLock};
use std::sync::Arc;
use tracing::{info, trace};

/// Orphan test for a locked group; locks each member and its parent in turn
pub(crate) fn is_orphaned(group: &LockedGroup) -> bool {
    let id = group.group().id();
    let session = group.group().session_id();

    !group.teams().iter().any(|team| {
        let locks = TeamAndParentLock::acquire(team, false);
        locks
            .parent()
            .is_some_and(|parent| parent.group_id != id && Some(parent.session_id) == session)
    })
}

fn has_stopped_member(members: &[Arc<Team>]) -> bool {
    members.iter().any(|team| {
        team.lock()
            .job_control_entry
            .as_ref()
            .is_some_and(|entry| entry.state() == JobControlState::Stopped)
    })
}

impl Kernel {
    /// Whether the published group `id` is orphaned right now
    pub fn is_group_orphaned(&self, id: GroupId) -> KernelResult<bool> {
        let group = self.inner.groups.get(id).ok_or(KernelError::BadGroupId(id))?;
        let locked = group.lock();
        Ok(is_orphaned(&locked))
    }

    /// Orphan state of the group `team` currently belongs to
    pub(crate) fn team_group_orphaned(&self, team: &Arc<Team>) -> bool {
        match lock_current_group(team) {
            Ok(locked) => is_orphaned(&locked),
            Err(_) => false,
        }
    }

    /// Drain the deferred orphan checks
    ///
    /// Every queued group that turned orphaned while one of its members is
    /// stopped gets `SIGHUP` followed by `SIGCONT`.
    pub(crate) fn orphaned_group_check(&self) {
        while let Some(group) = self.inner.groups.take_next_orphan_check() {
            let members = {
                let locked = group.lock();
                if !is_orphaned(&locked) {
                    trace!(group = %group.id(), "Group not orphaned");
                    continue;
                }
                let members = locked.teams();
                if !has_stopped_member(&members) {
                    trace!(group = %group.id(), "Orphaned group has no stopped member");
                    continue;
                }
                members
            };

            info!(
                group = %group.id(),
                members = members.len(),
                "Orphaned group with stopped members, sending SIGHUP and SIGCONT"
            );
            let sender = SignalInfo::new(self.inner.root.id(), 0);
            for signal in [Signal::SIGHUP, Signal::SIGCONT] {
                for team in &members {
                    if let Err(e) = self.send_signal_to_team(team, signal, sender) {
                        trace!(team = %team.id(), error = %e, "Orphan signal not delivered");
                    }
                }
            }
        }
    }
}
