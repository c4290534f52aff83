/*!
 * Team Locking
 *
 * Lock order, outermost first:
 *
 * 1. process groups (several at once only in ascending id order; a group
 *    that is not published yet may be locked at any time)
 * 2. the root team, when the caller also needs it
 * 3. parent team before child team
 * 4. session state, job-control entries and per-thread mutexes
 * 5. object table and registry locks
 *
 * Every helper here locks the outer object, try-locks the inner one and on
 * failure drops everything, locks in order, and re-checks that the
 * relationship it read (the team's parent, the team's group) still holds,
 * since the unlocked window is an explicit reparenting opportunity. The
 * resulting guards can only be built by these helpers.
 */

use super::types::{Team, TeamData};
use crate::core::errors::{KernelError, KernelResult};
use crate::group::{LockedGroup, ProcessGroup};
use lock_api::ArcMutexGuard;
use parking_lot::RawMutex;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Owned guard over a team's data
pub struct LockedTeam {
    guard: ArcMutexGuard<RawMutex, TeamData>,
    team: Arc<Team>,
}

impl LockedTeam {
    pub(super) fn new(guard: ArcMutexGuard<RawMutex, TeamData>, team: Arc<Team>) -> Self {
        Self { guard, team }
    }

    pub fn team(&self) -> &Arc<Team> {
        &self.team
    }
}

impl Deref for LockedTeam {
    type Target = TeamData;

    fn deref(&self) -> &TeamData {
        &self.guard
    }
}

impl DerefMut for LockedTeam {
    fn deref_mut(&mut self) -> &mut TeamData {
        &mut self.guard
    }
}

/// A team and (optionally) its parent, both locked
pub struct TeamAndParentLock {
    team: LockedTeam,
    parent: Option<LockedTeam>,
}

impl TeamAndParentLock {
    /// Lock `team` and its parent
    ///
    /// With `skip_root_parent` the parent is left unlocked when it is the
    /// root team (the caller holds the root lock already or does not need it).
    pub(crate) fn acquire(team: &Arc<Team>, skip_root_parent: bool) -> Self {
        loop {
            let locked = team.lock();
            let parent = match locked.parent() {
                Some(parent) if !(skip_root_parent && parent.is_root()) => parent,
                _ => {
                    return Self {
                        team: locked,
                        parent: None,
                    }
                }
            };

            if let Some(parent_locked) = parent.try_lock() {
                return Self {
                    team: locked,
                    parent: Some(parent_locked),
                };
            }

            drop(locked);
            let parent_locked = parent.lock();
            let locked = team.lock();
            if locked.has_parent(&parent) {
                return Self {
                    team: locked,
                    parent: Some(parent_locked),
                };
            }
            // reparented while unlocked
        }
    }

    pub fn team(&self) -> &LockedTeam {
        &self.team
    }

    pub fn team_mut(&mut self) -> &mut LockedTeam {
        &mut self.team
    }

    pub fn parent(&self) -> Option<&LockedTeam> {
        self.parent.as_ref()
    }

    pub fn parent_mut(&mut self) -> Option<&mut LockedTeam> {
        self.parent.as_mut()
    }

    pub fn split_mut(&mut self) -> (&mut LockedTeam, Option<&mut LockedTeam>) {
        (&mut self.team, self.parent.as_mut())
    }
}

/// Lock the group `team` currently belongs to
///
/// Returns the group guard only; the team is unlocked again. The caller
/// re-validates membership after taking any team lock.
pub(crate) fn lock_current_group(team: &Arc<Team>) -> KernelResult<LockedGroup> {
    loop {
        let group = current_group(team)?;
        let locked = group.lock();
        if team.lock().in_group(&group) {
            return Ok(locked);
        }
    }
}

fn current_group(team: &Arc<Team>) -> KernelResult<Arc<ProcessGroup>> {
    team.group().ok_or(KernelError::BadTeamId(team.id()))
}

/// A team and its process group, both locked
pub struct TeamAndGroupLock {
    team: LockedTeam,
    group: LockedGroup,
}

impl TeamAndGroupLock {
    /// Fails with `BadTeamId` for a team that has left its group (dying)
    pub(crate) fn acquire(team: &Arc<Team>) -> KernelResult<Self> {
        loop {
            let group = current_group(team)?;
            let group_locked = group.lock();
            let locked = team.lock();
            if locked.in_group(&group) {
                return Ok(Self {
                    team: locked,
                    group: group_locked,
                });
            }
        }
    }

    pub fn team(&self) -> &LockedTeam {
        &self.team
    }

    pub fn team_mut(&mut self) -> &mut LockedTeam {
        &mut self.team
    }

    pub fn group(&self) -> &LockedGroup {
        &self.group
    }

    pub fn split_mut(&mut self) -> (&mut LockedTeam, &mut LockedGroup) {
        (&mut self.team, &mut self.group)
    }
}

/// A team's process group, its parent and the team itself, all locked
pub struct FamilyLock {
    team: LockedTeam,
    parent: Option<LockedTeam>,
    group: LockedGroup,
}

impl FamilyLock {
    pub(crate) fn acquire(team: &Arc<Team>) -> KernelResult<Self> {
        loop {
            let group = current_group(team)?;
            let group_locked = group.lock();
            let pair = TeamAndParentLock::acquire(team, false);
            if pair.team.in_group(&group) {
                return Ok(Self {
                    team: pair.team,
                    parent: pair.parent,
                    group: group_locked,
                });
            }
        }
    }

    pub fn team(&self) -> &LockedTeam {
        &self.team
    }

    pub fn team_mut(&mut self) -> &mut LockedTeam {
        &mut self.team
    }

    pub fn parent_mut(&mut self) -> Option<&mut LockedTeam> {
        self.parent.as_mut()
    }

    pub fn group(&self) -> &LockedGroup {
        &self.group
    }

    pub fn split_mut(&mut self) -> (&mut LockedTeam, Option<&mut LockedTeam>, &mut LockedGroup) {
        (&mut self.team, self.parent.as_mut(), &mut self.group)
    }
}

/// Locks held while an exiting team leaves the hierarchy
///
/// Group, root, parent, team. When the parent is the root team the root
/// guard stands in for the parent guard.
pub struct TeamRemovalLock {
    team: LockedTeam,
    parent: Option<LockedTeam>,
    root: LockedTeam,
    group: LockedGroup,
}

/// Borrowed view of a [`TeamRemovalLock`]
pub(crate) struct RemovalParts<'a> {
    pub team: &'a mut LockedTeam,
    /// The parent (the root team when the parent is root)
    pub parent: &'a mut LockedTeam,
    /// The root team when it is not the parent
    pub root: Option<&'a mut LockedTeam>,
    pub group: &'a mut LockedGroup,
}

impl RemovalParts<'_> {
    /// The root team's guard, whichever slot holds it
    pub fn root_mut(&mut self) -> &mut LockedTeam {
        match self.root.as_deref_mut() {
            Some(root) => root,
            None => &mut *self.parent,
        }
    }
}

impl TeamRemovalLock {
    pub(crate) fn acquire(root: &Arc<Team>, team: &Arc<Team>) -> KernelResult<Self> {
        if team.is_root() {
            crate::kernel_fault!("removal lock requested for the root team");
        }
        loop {
            let group = current_group(team)?;
            let group_locked = group.lock();
            let root_locked = root.lock();
            let pair = TeamAndParentLock::acquire(team, true);
            if pair.team.in_group(&group) {
                return Ok(Self {
                    team: pair.team,
                    parent: pair.parent,
                    root: root_locked,
                    group: group_locked,
                });
            }
        }
    }

    pub fn team(&self) -> &LockedTeam {
        &self.team
    }

    pub fn team_mut(&mut self) -> &mut LockedTeam {
        &mut self.team
    }

    /// The parent guard, or the root guard when the parent is root
    pub fn parent(&self) -> &LockedTeam {
        self.parent.as_ref().unwrap_or(&self.root)
    }

    pub fn root_mut(&mut self) -> &mut LockedTeam {
        &mut self.root
    }

    pub(crate) fn parts(&mut self) -> RemovalParts<'_> {
        let (parent, root) = match self.parent.as_mut() {
            Some(parent) => (parent, Some(&mut self.root)),
            None => (&mut self.root, None),
        };
        RemovalParts {
            team: &mut self.team,
            parent,
            root,
            group: &mut self.group,
        }
    }
}
