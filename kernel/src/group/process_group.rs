/*!
 * Process Group
 */

use super::registry::GroupRegistry;
use super::session::ProcessSession;
use crate::core::types::{GroupId, SessionId};
use crate::team::{LockedTeam, Team};
use lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

/// Teams of a group, guarded by the group lock
#[derive(Default)]
pub struct GroupMembers {
    teams: Vec<Weak<Team>>,
}

impl GroupMembers {
    pub(crate) fn insert(&mut self, team: &Arc<Team>) {
        self.teams.push(Arc::downgrade(team));
    }

    pub(crate) fn remove(&mut self, team: &Arc<Team>) -> bool {
        let before = self.teams.len();
        let target = Arc::as_ptr(team);
        self.teams.retain(|t| !std::ptr::eq(t.as_ptr(), target));
        self.teams.len() != before
    }

    /// Live member teams
    pub fn teams(&self) -> Vec<Arc<Team>> {
        self.teams.iter().filter_map(Weak::upgrade).collect()
    }

    pub fn len(&self) -> usize {
        self.teams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.teams.is_empty()
    }
}

/// A process group
///
/// Until published it is visible only to its creator. Once published it
/// stays in the registry until the last strong reference (member teams and
/// dead job-control entries) goes away.
pub struct ProcessGroup {
    id: GroupId,
    session: OnceLock<Arc<ProcessSession>>,
    members: Arc<Mutex<GroupMembers>>,
    in_orphan_check: AtomicBool,
    registry: Weak<GroupRegistry>,
}

impl ProcessGroup {
    pub(crate) fn new(id: GroupId, registry: &Arc<GroupRegistry>) -> Arc<Self> {
        Arc::new(Self {
            id,
            session: OnceLock::new(),
            members: Arc::new(Mutex::new(GroupMembers::default())),
            in_orphan_check: AtomicBool::new(false),
            registry: Arc::downgrade(registry),
        })
    }

    pub fn id(&self) -> GroupId {
        self.id
    }

    /// Session the group was published into
    pub fn session(&self) -> Option<&Arc<ProcessSession>> {
        self.session.get()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session().map(|s| s.id())
    }

    pub fn is_published(&self) -> bool {
        self.session.get().is_some()
    }

    pub(crate) fn set_session(&self, session: Arc<ProcessSession>) -> bool {
        self.session.set(session).is_ok()
    }

    pub fn lock(self: &Arc<Self>) -> LockedGroup {
        LockedGroup {
            guard: self.members.lock_arc(),
            group: Arc::clone(self),
        }
    }

    pub fn try_lock(self: &Arc<Self>) -> Option<LockedGroup> {
        let guard = self.members.try_lock_arc()?;
        Some(LockedGroup {
            guard,
            group: Arc::clone(self),
        })
    }

    /// Mark as queued for an orphan check; false if it already was
    pub(crate) fn enter_orphan_check(&self) -> bool {
        !self.in_orphan_check.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn leave_orphan_check(&self) {
        self.in_orphan_check.store(false, Ordering::Release);
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unregister(self.id, self as *const ProcessGroup);
        }
    }
}

impl fmt::Debug for ProcessGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessGroup")
            .field("id", &self.id)
            .field("session", &self.session_id())
            .finish()
    }
}

/// Owned guard over a group's member list
pub struct LockedGroup {
    guard: ArcMutexGuard<RawMutex, GroupMembers>,
    group: Arc<ProcessGroup>,
}

impl LockedGroup {
    pub fn group(&self) -> &Arc<ProcessGroup> {
        &self.group
    }

    /// Make `team` a member; the group must be published
    pub(crate) fn add_team(&mut self, team: &mut LockedTeam) {
        let Some(session) = self.group.session_id() else {
            crate::kernel_fault!(
                "team {} joins unpublished group {}",
                team.team().id(),
                self.group.id()
            );
        };
        self.guard.insert(team.team());
        team.group = Some(Arc::clone(&self.group));
        team.group_id = self.group.id();
        team.session_id = session;
        if let Some(entry) = &team.job_control_entry {
            entry.set_group_id(self.group.id());
        }
    }

    pub(crate) fn remove_team(&mut self, team: &mut LockedTeam) {
        self.guard.remove(team.team());
        team.group = None;
    }
}

impl Deref for LockedGroup {
    type Target = GroupMembers;

    fn deref(&self) -> &GroupMembers {
        &self.guard
    }
}

impl DerefMut for LockedGroup {
    fn deref_mut(&mut self) -> &mut GroupMembers {
        &mut self.guard
    }
}
