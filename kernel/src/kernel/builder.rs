/*!
 * Kernel Builder
 * Builder pattern for wiring collaborators and booting the kernel
 */

use super::{EventBus, Kernel, KernelInner};
use crate::core::config::KernelConfig;
use crate::core::errors::KernelResult;
use crate::core::id::IdAllocator;
use crate::core::types::{GroupId, SessionId, TeamId, ThreadId};
use crate::group::{GroupRegistry, ProcessGroup, ProcessSession};
use crate::interfaces::{
    AcceptAllImages, AddressSpaceFacility, AddressSpaces, ImageLoader, IoContextFacility,
    IoContexts, RunQueue, Scheduler,
};
use crate::signals::{SignalFacility, SignalQueues};
use crate::table::ObjectTable;
use crate::team::{Team, TeamState};
use crate::thread::{StackAllocator, ThreadAttributes, Undertaker};
use std::sync::Arc;
use tracing::info;

/// Name of the root team and its main thread
pub const KERNEL_TEAM_NAME: &str = "kernel_team";

/// Builder for [`Kernel`]
///
/// Collaborators that are not supplied get the in-crate defaults.
#[derive(Default)]
pub struct KernelBuilder {
    config: Option<KernelConfig>,
    scheduler: Option<Arc<dyn Scheduler>>,
    signals: Option<Arc<dyn SignalFacility>>,
    address_spaces: Option<Arc<dyn AddressSpaceFacility>>,
    io_contexts: Option<Arc<dyn IoContextFacility>>,
    images: Option<Arc<dyn ImageLoader>>,
}

impl KernelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `config` instead of the compiled-in limits
    pub fn with_config(mut self, config: KernelConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn with_signals(mut self, signals: Arc<dyn SignalFacility>) -> Self {
        self.signals = Some(signals);
        self
    }

    pub fn with_address_spaces(mut self, address_spaces: Arc<dyn AddressSpaceFacility>) -> Self {
        self.address_spaces = Some(address_spaces);
        self
    }

    pub fn with_io_contexts(mut self, io_contexts: Arc<dyn IoContextFacility>) -> Self {
        self.io_contexts = Some(io_contexts);
        self
    }

    pub fn with_image_loader(mut self, images: Arc<dyn ImageLoader>) -> Self {
        self.images = Some(images);
        self
    }

    /// Create the kernel team (session, group and team 1 with one kernel
    /// thread) and start the undertaker
    pub fn boot(self) -> KernelResult<Kernel> {
        let mut features = Vec::new();
        if self.config.is_some() {
            features.push("custom-config");
        }
        if self.scheduler.is_some() {
            features.push("scheduler");
        }
        if self.signals.is_some() {
            features.push("signals");
        }
        if self.address_spaces.is_some() {
            features.push("address-spaces");
        }
        if self.io_contexts.is_some() {
            features.push("io-contexts");
        }
        if self.images.is_some() {
            features.push("image-loader");
        }

        let config = self.config.unwrap_or_default();
        let scheduler = self
            .scheduler
            .unwrap_or_else(|| Arc::new(RunQueue::new()));
        let log_depth = config.signal_log_depth;
        let signals = self
            .signals
            .unwrap_or_else(|| Arc::new(SignalQueues::with_log_depth(log_depth)));
        let address_spaces = self
            .address_spaces
            .unwrap_or_else(|| Arc::new(AddressSpaces::new()));
        let io_contexts = self
            .io_contexts
            .unwrap_or_else(|| Arc::new(IoContexts::new()));
        let images = self.images.unwrap_or_else(|| Arc::new(AcceptAllImages));

        let ids = IdAllocator::new();
        let root_id = TeamId(ids.next());
        let root = Team::new(root_id, KERNEL_TEAM_NAME, true);

        let groups = GroupRegistry::new();
        let session = ProcessSession::new(SessionId::from(root_id));
        let group = ProcessGroup::new(GroupId::from(root_id), &groups);
        groups.publish(&group, &session)?;

        let io = io_contexts.new_context(None)?;
        let space = address_spaces.create(root_id)?;
        {
            let mut group_locked = group.lock();
            let mut locked = root.lock();
            group_locked.add_team(&mut locked);
            locked.io_context = Some(io);
            locked.address_space = Some(space);
            locked.state = TeamState::Normal;
        }

        let teams = ObjectTable::new("team", config.max_teams);
        teams.insert(Arc::clone(&root))?;
        let threads = Arc::new(ObjectTable::new("thread", config.max_threads));
        let stacks = StackAllocator::new(config.kernel_stack_size, config.kernel_stack_budget);
        let undertaker = Undertaker::spawn(
            config.undertaker_queue_depth,
            Arc::clone(&root),
            Arc::clone(&threads),
            Arc::clone(&scheduler),
        )?;
        let events = EventBus::new(config.event_queue_depth);

        let kernel = Kernel {
            inner: Arc::new(KernelInner {
                config,
                ids,
                teams,
                threads,
                groups,
                root: Arc::clone(&root),
                stacks,
                scheduler,
                signals,
                address_spaces,
                io_contexts,
                images,
                events,
                undertaker,
            }),
        };

        let attributes = ThreadAttributes::new(KERNEL_TEAM_NAME).kernel_only();
        let main = kernel.register_thread(&root, ThreadId::from(root_id), &attributes)?;
        kernel.make_ready(&main);

        if features.is_empty() {
            features.push("defaults");
        }
        info!("Kernel booted with: {}", features.join(", "));
        Ok(kernel)
    }
}
