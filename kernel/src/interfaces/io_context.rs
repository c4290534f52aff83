/*!
 * I/O Context Interface
 */

use crate::core::errors::KernelResult;
use ahash::RandomState;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque per-team I/O context (open files, cwd) reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IoContextHandle(pub u64);

/// VFS operations the team lifecycle needs
pub trait IoContextFacility: Send + Sync {
    /// New context, inheriting from `parent` when given
    fn new_context(&self, parent: Option<IoContextHandle>) -> KernelResult<IoContextHandle>;

    /// Release a reference obtained from `new_context`
    fn put_context(&self, handle: IoContextHandle);
}

/// Registry of live I/O contexts and the context each inherited from
pub struct IoContexts {
    next: AtomicU64,
    live: DashMap<IoContextHandle, Option<IoContextHandle>, RandomState>,
}

impl IoContexts {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            live: DashMap::with_hasher(RandomState::new()),
        }
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn inherited_from(&self, handle: IoContextHandle) -> Option<IoContextHandle> {
        self.live.get(&handle).and_then(|parent| *parent)
    }
}

impl Default for IoContexts {
    fn default() -> Self {
        Self::new()
    }
}

impl IoContextFacility for IoContexts {
    fn new_context(&self, parent: Option<IoContextHandle>) -> KernelResult<IoContextHandle> {
        let handle = IoContextHandle(self.next.fetch_add(1, Ordering::Relaxed));
        self.live.insert(handle, parent);
        Ok(handle)
    }

    fn put_context(&self, handle: IoContextHandle) {
        self.live.remove(&handle);
    }
}
