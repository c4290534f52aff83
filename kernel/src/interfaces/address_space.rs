/*!
 * Address Space Interface
 */

use crate::core::errors::{KernelError, KernelResult};
use crate::core::types::TeamId;
use ahash::RandomState;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque address space reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AddressSpaceHandle(pub u64);

impl fmt::Display for AddressSpaceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "as#{}", self.0)
    }
}

/// Virtual memory operations the team lifecycle needs
pub trait AddressSpaceFacility: Send + Sync {
    fn create(&self, team: TeamId) -> KernelResult<AddressSpaceHandle>;

    fn destroy(&self, handle: AddressSpaceHandle);

    /// Copy `source` for the forked `team`
    fn clone_space(&self, source: AddressSpaceHandle, team: TeamId)
        -> KernelResult<AddressSpaceHandle>;
}

/// Registry of live address spaces
pub struct AddressSpaces {
    next: AtomicU64,
    live: DashMap<AddressSpaceHandle, TeamId, RandomState>,
}

impl AddressSpaces {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            live: DashMap::with_hasher(RandomState::new()),
        }
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Team that owns `handle`, if still alive
    pub fn owner(&self, handle: AddressSpaceHandle) -> Option<TeamId> {
        self.live.get(&handle).map(|owner| *owner)
    }

    fn allocate(&self, team: TeamId) -> AddressSpaceHandle {
        let handle = AddressSpaceHandle(self.next.fetch_add(1, Ordering::Relaxed));
        self.live.insert(handle, team);
        handle
    }
}

impl Default for AddressSpaces {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressSpaceFacility for AddressSpaces {
    fn create(&self, team: TeamId) -> KernelResult<AddressSpaceHandle> {
        Ok(self.allocate(team))
    }

    fn destroy(&self, handle: AddressSpaceHandle) {
        self.live.remove(&handle);
    }

    fn clone_space(
        &self,
        source: AddressSpaceHandle,
        team: TeamId,
    ) -> KernelResult<AddressSpaceHandle> {
        if !self.live.contains_key(&source) {
            return Err(KernelError::bad_value(format!("no address space {source}")));
        }
        Ok(self.allocate(team))
    }
}
