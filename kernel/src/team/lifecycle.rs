/*!
 * Team Lifecycle
 *
 * A new team is linked into the team table, its parent's child list and its
 * parent's process group in one locked step, then gets its I/O context,
 * address space, image and main thread. Every step pushes its undo action
 * onto a rollback guard, so a failure anywhere leaves nothing registered.
 */

use super::locking::{FamilyLock, TeamAndGroupLock};
use super::types::{Team, TeamState};
use crate::core::data_structures::InlineString;
use crate::core::errors::{KernelError, KernelResult};
use crate::core::guard::RollbackGuard;
use crate::core::limits::TEAM_NAME_LENGTH;
use crate::core::types::{TeamId, ThreadId};
use crate::job_control::JobControlEntry;
use crate::kernel::{Kernel, KernelEvent};
use crate::signals::Signal;
use crate::thread::ThreadAttributes;
use std::sync::Arc;
use tracing::{debug, info};

/// Where a new team's program comes from
#[derive(Debug, Clone, Copy)]
enum ImageSource<'a> {
    /// Load `path` into a fresh address space
    Load { path: &'a str, args: &'a [String] },
    /// Copy the parent's address space
    Fork,
}

impl Kernel {
    /// Start `path` as a new child team of the caller's team
    ///
    /// Returns the new team's id, which is also its main thread's id. The
    /// main thread is already resumed.
    pub fn create_team(
        &self,
        caller: ThreadId,
        path: &str,
        args: &[String],
    ) -> KernelResult<TeamId> {
        let entry = self.enter("create_team", caller)?;
        let parent = entry.team()?;

        let name = image_name(path);
        let attributes = ThreadAttributes::new(name)
            .with_user_stack_size(self.inner.config.default_user_stack_size);
        let team = self.build_team(&parent, name, ImageSource::Load { path, args }, &attributes)?;
        Ok(team.id())
    }

    /// Duplicate the caller's team
    ///
    /// The child copies name, arguments, uid, signal actions and blocked
    /// signals, and its main thread takes the calling thread's priority and
    /// stack geometry. Returns the child's main thread.
    pub fn fork(&self, caller: ThreadId) -> KernelResult<ThreadId> {
        let entry = self.enter("fork", caller)?;
        let thread = Arc::clone(entry.thread());
        let parent = entry.team()?;
        if parent.is_root() {
            return Err(KernelError::not_allowed("the kernel team cannot fork"));
        }

        let mut attributes = ThreadAttributes::new(thread.name().as_str())
            .with_priority(thread.priority())
            .with_entry(thread.entry());
        attributes.user_stack_size = thread.user_stack().map(|stack| stack.size);

        let name = parent.name();
        let team = self.build_team(&parent, name.as_str(), ImageSource::Fork, &attributes)?;

        for signal in Signal::all() {
            if self.inner.signals.is_signal_blocked(parent.id(), signal) {
                self.inner.signals.set_blocked(team.id(), signal, true);
            }
        }
        Ok(ThreadId::from(team.id()))
    }

    /// Replace the calling team's program
    ///
    /// Only the main thread may call this, and only when no other thread
    /// but the debugger nub is left. User-defined timers go away, handlers
    /// revert to the default action and the team is marked as having
    /// exec'd, which freezes its process group for its parent.
    pub fn exec(&self, caller: ThreadId, path: &str, args: &[String]) -> KernelResult<()> {
        let entry = self.enter("exec", caller)?;
        let thread = Arc::clone(entry.thread());
        let team = entry.team()?;
        if team.is_root() {
            return Err(KernelError::not_allowed("the kernel team cannot exec"));
        }

        {
            let locked = team.lock();
            if !locked
                .main_thread
                .as_ref()
                .is_some_and(|main| Arc::ptr_eq(main, &thread))
            {
                return Err(KernelError::not_allowed("only the main thread may exec"));
            }
            let nub = locked.debugger_nub;
            if locked
                .threads
                .iter()
                .any(|t| !Arc::ptr_eq(t, &thread) && Some(t.id()) != nub)
            {
                return Err(KernelError::not_allowed("other threads are still alive"));
            }
        }

        self.inner
            .images
            .load(team.id(), path, args)
            .map_err(|reason| image_error(path, reason))?;
        let space = self.inner.address_spaces.create(team.id())?;

        let name = image_name(path);
        let old_space = {
            let mut locked = team.lock();
            locked.user_timers.retain(|timer| !timer.is_user_defined());
            locked.signal_actions.reset_for_exec();
            locked.set_args(args);
            locked.name = InlineString::truncated(name, TEAM_NAME_LENGTH);
            locked.exec_done = true;
            locked.address_space.replace(space)
        };
        if let Some(old) = old_space {
            self.inner.address_spaces.destroy(old);
        }
        thread.set_name(name);

        self.publish(KernelEvent::TeamExec { team: team.id() });
        info!(team = %team.id(), path, "Team image replaced");
        Ok(())
    }

    /// Create, register and start a child team of `parent`
    fn build_team(
        &self,
        parent: &Arc<Team>,
        name: &str,
        image: ImageSource<'_>,
        attributes: &ThreadAttributes,
    ) -> KernelResult<Arc<Team>> {
        let id = TeamId(self.inner.ids.next());
        let team = Team::new(id, name, false);
        let mut rollback = RollbackGuard::new("create_team");

        self.link_new_team(parent, &team, image)?;
        rollback.push("unlink", || self.unlink_new_team(&team));

        let parent_io = parent.lock().io_context;
        let io = self.inner.io_contexts.new_context(parent_io)?;
        team.lock().io_context = Some(io);
        rollback.push("io context", || {
            if let Some(io) = team.lock().io_context.take() {
                self.inner.io_contexts.put_context(io);
            }
        });

        let space = match image {
            ImageSource::Load { .. } => self.inner.address_spaces.create(id)?,
            ImageSource::Fork => {
                let source = parent
                    .lock()
                    .address_space
                    .ok_or_else(|| KernelError::bad_value("parent has no address space"))?;
                self.inner.address_spaces.clone_space(source, id)?
            }
        };
        team.lock().address_space = Some(space);
        rollback.push("address space", || {
            if let Some(space) = team.lock().address_space.take() {
                self.inner.address_spaces.destroy(space);
            }
        });

        if let ImageSource::Load { path, args } = image {
            self.inner
                .images
                .load(id, path, args)
                .map_err(|reason| image_error(path, reason))?;
        }

        let main = self.register_thread(&team, ThreadId::from(id), attributes)?;
        let (undo_team, undo_main) = (Arc::clone(&team), Arc::clone(&main));
        rollback.push("main thread", move || self.unregister_thread(&undo_team, &undo_main));

        team.lock().state = TeamState::Normal;
        rollback.commit();

        self.publish(KernelEvent::TeamAdded { team: id });
        self.publish(KernelEvent::ThreadAdded {
            thread: main.id(),
            team: id,
        });
        self.make_ready(&main);

        info!(team = %id, parent = %parent.id(), name, "Team created");
        Ok(team)
    }

    /// Link a `Birth` team below `parent` and into the parent's group
    fn link_new_team(
        &self,
        parent: &Arc<Team>,
        team: &Arc<Team>,
        image: ImageSource<'_>,
    ) -> KernelResult<()> {
        let mut locks = TeamAndGroupLock::acquire(parent)?;
        let (parent_locked, group) = locks.split_mut();
        if parent_locked.state >= TeamState::Shutdown {
            return Err(KernelError::not_allowed(format!(
                "team {} is shutting down",
                parent.id()
            )));
        }

        let mut locked = team.lock();
        locked.parent = Some(Arc::downgrade(parent));
        locked.uid = parent_locked.uid;
        locked.signal_actions = parent_locked.signal_actions.clone();
        match image {
            ImageSource::Load { args, .. } => {
                locked.set_args(args);
                locked.signal_actions.reset_for_exec();
            }
            ImageSource::Fork => locked.args = parent_locked.args.clone(),
        }
        locked.job_control_entry = Some(JobControlEntry::new(team, parent_locked.group_id));

        self.inner.teams.insert(Arc::clone(team))?;
        parent_locked.children.push(Arc::clone(team));
        group.add_team(&mut locked);
        Ok(())
    }

    /// Undo [`Kernel::link_new_team`]
    fn unlink_new_team(&self, team: &Arc<Team>) {
        if let Ok(mut family) = FamilyLock::acquire(team) {
            let (locked, parent, group) = family.split_mut();
            group.remove_team(locked);
            if let Some(parent) = parent {
                parent.remove_child(team);
            }
            locked.parent = None;
            locked.job_control_entry = None;
            locked.state = TeamState::Death;
        }
        self.inner.teams.remove(team.id().raw());
        debug!(team = %team.id(), "Unfinished team unlinked");
    }
}

/// Last path component, used as team and main thread name
fn image_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn image_error(path: &str, reason: String) -> KernelError {
    KernelError::ImageLoad {
        path: path.into(),
        reason: reason.into(),
    }
}
