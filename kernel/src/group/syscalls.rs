/*!
 * Group and Session Syscalls
 */

use super::process_group::{LockedGroup, ProcessGroup};
use super::session::ProcessSession;
use crate::core::errors::{KernelError, KernelResult};
use crate::core::types::{GroupId, SessionId, TeamId, ThreadId, TtyId};
use crate::kernel::Kernel;
use crate::team::{lock_current_group, FamilyLock, Team, TeamAndParentLock};
use std::sync::Arc;
use tracing::{debug, info};

impl Kernel {
    /// Move a team into a process group, creating it if needed
    ///
    /// `team` 0 is the caller, `group` 0 the target's own id. Only the
    /// caller itself or one of its descendants can be moved, and only
    /// within its session.
    pub fn setpgid(&self, caller: ThreadId, team: TeamId, group: GroupId) -> KernelResult<GroupId> {
        let entry = self.enter("setpgid", caller)?;
        let current = entry.team()?;
        let current_session = current.session_id();

        let team_id = if team.raw() == 0 { current.id() } else { team };
        let group_id = if group.raw() == 0 {
            GroupId::from(team_id)
        } else {
            group
        };

        // restart point when a concurrently published group wins
        loop {
            let (group, new_group) = match self.inner.groups.get(group_id) {
                Some(group) => (group, false),
                None if group_id == GroupId::from(team_id) => {
                    (ProcessGroup::new(group_id, &self.inner.groups), true)
                }
                None => {
                    return Err(KernelError::not_allowed(format!(
                        "group {group_id} does not exist"
                    )))
                }
            };

            let team = self
                .inner
                .teams
                .lookup(team_id.raw())
                .ok_or(KernelError::BadTeamId(team_id))?;
            if !is_self_or_descendant(&team, &current) {
                return Err(KernelError::BadTeamId(team_id));
            }
            if team.lock().is_session_leader(team.id()) {
                return Err(KernelError::not_allowed("session leader cannot change group"));
            }

            let Some((mut old_locked, mut new_locked)) = lock_group_pair(&team, &group, new_group)?
            else {
                return Ok(group_id);
            };

            let mut family = TeamAndParentLock::acquire(&team, false);

            if !Arc::ptr_eq(&team, &current) {
                if family.team().session_id != current_session {
                    return Err(KernelError::not_allowed("child is in another session"));
                }
                if family.team().exec_done {
                    return Err(KernelError::PermissionDenied("child already called exec".into()));
                }
            }

            if new_group {
                let Some(session) = old_locked.group().session().cloned() else {
                    crate::kernel_fault!("team {} in unpublished group", team.id());
                };
                if self.inner.groups.publish(&group, &session).is_err() {
                    debug!(group = %group_id, "Group published concurrently, retrying");
                    continue;
                }
            } else if group.session_id() != Some(family.team().session_id) {
                return Err(KernelError::not_allowed(format!(
                    "group {group_id} belongs to another session"
                )));
            }

            let (locked, parent) = family.split_mut();
            old_locked.remove_team(locked);
            new_locked.add_team(locked);
            if let Some(parent) = parent {
                // the parent's wait set may have changed
                parent.team().dead_children_condition().notify_all();
            }

            info!(team = %team_id, group = %group_id, "Process group changed");
            return Ok(group_id);
        }
    }

    /// Start a new session (and group) led by the caller's team
    pub fn setsid(&self, caller: ThreadId) -> KernelResult<SessionId> {
        let entry = self.enter("setsid", caller)?;
        let team = entry.team()?;

        let group = ProcessGroup::new(GroupId::from(team.id()), &self.inner.groups);
        let mut new_locked = group.lock();
        let session = ProcessSession::new(SessionId::from(team.id()));

        let mut family = FamilyLock::acquire(&team)?;
        if family.team().is_group_leader(team.id()) {
            return Err(KernelError::not_allowed("group leader cannot start a session"));
        }
        self.inner
            .groups
            .publish(&group, &session)
            .map_err(|_| KernelError::not_allowed(format!("group id {} in use", group.id())))?;

        let (locked, parent, old_locked) = family.split_mut();
        old_locked.remove_team(locked);
        new_locked.add_team(locked);
        if let Some(parent) = parent {
            parent.team().dead_children_condition().notify_all();
        }

        info!(team = %team.id(), "New session");
        Ok(session.id())
    }

    /// Process group of `id` (0: the caller)
    pub fn getpgid(&self, caller: ThreadId, id: TeamId) -> KernelResult<GroupId> {
        Ok(self.team_or_caller(caller, id)?.group_id())
    }

    /// Session of `id` (0: the caller)
    pub fn getsid(&self, caller: ThreadId, id: TeamId) -> KernelResult<SessionId> {
        Ok(self.team_or_caller(caller, id)?.session_id())
    }

    /// Parent of `id` (0: the caller); `None` for the kernel team
    pub fn getppid(&self, caller: ThreadId, id: TeamId) -> KernelResult<Option<TeamId>> {
        Ok(self.team_or_caller(caller, id)?.parent().map(|p| p.id()))
    }

    /// Make `tty` the controlling terminal of the caller's session
    ///
    /// The caller must lead its session; its group becomes the foreground
    /// group.
    pub fn set_controlling_tty(&self, caller: ThreadId, tty: TtyId) -> KernelResult<()> {
        let team = self.caller_team(caller)?;
        let locked = lock_current_group(&team)?;
        let session = session_of(&locked)?;

        if !team.lock().is_session_leader(team.id()) {
            return Err(KernelError::not_allowed("only the session leader may acquire a tty"));
        }
        session.set_controlling_tty(Some(tty));
        session.set_foreground_group(Some(locked.group().id()));
        debug!(session = %session.id(), tty, "Controlling terminal set");
        Ok(())
    }

    /// Hand the terminal `tty` to `group`
    pub fn set_foreground_group(
        &self,
        caller: ThreadId,
        tty: TtyId,
        group: GroupId,
    ) -> KernelResult<()> {
        let team = self.caller_team(caller)?;
        let session = session_of(&lock_current_group(&team)?)?;

        if session.controlling_tty() != Some(tty) {
            return Err(KernelError::not_allowed(format!("tty {tty} does not control the session")));
        }
        let target = self
            .inner
            .groups
            .get(group)
            .ok_or(KernelError::BadGroupId(group))?;
        if target.session_id() != Some(session.id()) {
            return Err(KernelError::not_allowed(format!("group {group} is in another session")));
        }

        session.set_foreground_group(Some(group));
        debug!(session = %session.id(), %group, "Foreground group changed");
        Ok(())
    }

    /// Foreground group of the caller's session
    pub fn foreground_group(&self, caller: ThreadId) -> KernelResult<Option<GroupId>> {
        let team = self.caller_team(caller)?;
        let session = session_of(&lock_current_group(&team)?)?;
        Ok(session.foreground_group())
    }
}

fn session_of(group: &LockedGroup) -> KernelResult<Arc<ProcessSession>> {
    group
        .group()
        .session()
        .cloned()
        .ok_or(KernelError::BadGroupId(group.group().id()))
}

fn is_self_or_descendant(team: &Arc<Team>, ancestor: &Arc<Team>) -> bool {
    let mut current = Some(Arc::clone(team));
    while let Some(team) = current {
        if Arc::ptr_eq(&team, ancestor) {
            return true;
        }
        if team.is_root() {
            return false;
        }
        current = team.parent();
    }
    false
}

/// Lock the team's current group and `target` in id order
///
/// `None` if the team already is in `target`.
fn lock_group_pair(
    team: &Arc<Team>,
    target: &Arc<ProcessGroup>,
    new_group: bool,
) -> KernelResult<Option<(LockedGroup, LockedGroup)>> {
    loop {
        let old_locked = lock_current_group(team)?;
        let old = Arc::clone(old_locked.group());
        if Arc::ptr_eq(&old, target) {
            return Ok(None);
        }

        // an unpublished group may be locked at any point
        if new_group || target.id() > old.id() {
            return Ok(Some((old_locked, target.lock())));
        }
        if let Some(new_locked) = target.try_lock() {
            return Ok(Some((old_locked, new_locked)));
        }

        drop(old_locked);
        let new_locked = target.lock();
        let old_locked = old.lock();
        if team.lock().in_group(&old) {
            return Ok(Some((old_locked, new_locked)));
        }
    }
}
