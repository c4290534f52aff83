/*!
 * Kernel Context
 *
 * The process-wide state every team and thread operation runs against:
 * object tables, the group registry, the root team, collaborators and the
 * undertaker. `Kernel` is a cheap handle; clone it freely.
 */

mod builder;
mod events;

pub use builder::{KernelBuilder, KERNEL_TEAM_NAME};
pub use events::KernelEvent;

pub(crate) use events::EventBus;

use crate::core::config::KernelConfig;
use crate::core::errors::{KernelError, KernelResult};
use crate::core::id::IdAllocator;
use crate::core::types::{GroupId, TeamId, ThreadId};
use crate::group::{GroupRegistry, ProcessGroup};
use crate::interfaces::{AddressSpaceFacility, ImageLoader, IoContextFacility, Scheduler};
use crate::signals::SignalFacility;
use crate::table::ObjectTable;
use crate::team::Team;
use crate::thread::{StackAllocator, Thread, Undertaker};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub(crate) struct KernelInner {
    pub(crate) config: KernelConfig,
    pub(crate) ids: IdAllocator,
    pub(crate) teams: ObjectTable<Team>,
    pub(crate) threads: Arc<ObjectTable<Thread>>,
    pub(crate) groups: Arc<GroupRegistry>,
    pub(crate) root: Arc<Team>,
    pub(crate) stacks: Arc<StackAllocator>,
    pub(crate) scheduler: Arc<dyn Scheduler>,
    pub(crate) signals: Arc<dyn SignalFacility>,
    pub(crate) address_spaces: Arc<dyn AddressSpaceFacility>,
    pub(crate) io_contexts: Arc<dyn IoContextFacility>,
    pub(crate) images: Arc<dyn ImageLoader>,
    pub(crate) events: EventBus,
    pub(crate) undertaker: Undertaker,
}

/// Handle to a booted kernel
#[derive(Clone)]
pub struct Kernel {
    pub(crate) inner: Arc<KernelInner>,
}

/// Resource usage snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelStats {
    pub teams: usize,
    pub threads: usize,
    pub groups: usize,
    pub kernel_stack_bytes: usize,
    pub undertaker_backlog: usize,
    pub pending_orphan_checks: usize,
}

impl Kernel {
    /// Boot with default collaborators and configuration
    pub fn boot() -> KernelResult<Self> {
        KernelBuilder::new().boot()
    }

    pub fn builder() -> KernelBuilder {
        KernelBuilder::new()
    }

    pub fn config(&self) -> &KernelConfig {
        &self.inner.config
    }

    /// The kernel team (id 1)
    pub fn root_team(&self) -> &Arc<Team> {
        &self.inner.root
    }

    /// The kernel team's main thread
    pub fn root_thread_id(&self) -> ThreadId {
        ThreadId::from(self.inner.root.id())
    }

    pub fn team(&self, id: TeamId) -> Option<Arc<Team>> {
        self.inner.teams.lookup(id.raw())
    }

    pub fn thread(&self, id: ThreadId) -> Option<Arc<Thread>> {
        self.inner.threads.lookup(id.raw())
    }

    pub fn group(&self, id: GroupId) -> Option<Arc<ProcessGroup>> {
        self.inner.groups.get(id)
    }

    pub fn team_count(&self) -> usize {
        self.inner.teams.len()
    }

    pub fn thread_count(&self) -> usize {
        self.inner.threads.len()
    }

    pub fn signals(&self) -> &Arc<dyn SignalFacility> {
        &self.inner.signals
    }

    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.inner.scheduler
    }

    /// Receive team and thread lifecycle events from now on
    pub fn subscribe(&self) -> flume::Receiver<KernelEvent> {
        self.inner.events.subscribe()
    }

    /// Block until every queued undertaker entry has been processed
    pub fn wait_for_undertaker(&self) {
        self.inner.undertaker.wait_idle();
    }

    pub fn stats(&self) -> KernelStats {
        KernelStats {
            teams: self.inner.teams.len(),
            threads: self.inner.threads.len(),
            groups: self.inner.groups.len(),
            kernel_stack_bytes: self.inner.stacks.outstanding_bytes(),
            undertaker_backlog: self.inner.undertaker.backlog(),
            pending_orphan_checks: self.inner.groups.pending_orphan_checks(),
        }
    }

    /// Team of the calling thread
    pub(crate) fn caller_team(&self, caller: ThreadId) -> KernelResult<Arc<Team>> {
        self.thread(caller)
            .and_then(|thread| thread.team())
            .ok_or(KernelError::BadThreadId(caller))
    }

    /// `id`, or the caller's team for id 0
    pub(crate) fn team_or_caller(&self, caller: ThreadId, id: TeamId) -> KernelResult<Arc<Team>> {
        if id.raw() == 0 {
            return self.caller_team(caller);
        }
        self.team(id).ok_or(KernelError::BadTeamId(id))
    }

    pub(crate) fn publish(&self, event: KernelEvent) {
        self.inner.events.publish(event);
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel").field("stats", &self.stats()).finish()
    }
}
