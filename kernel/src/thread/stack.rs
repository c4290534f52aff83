/*!
 * Thread Stacks
 *
 * Kernel stacks come from a budgeted allocator and return their bytes when
 * dropped, which for an exited thread happens on the undertaker. User
 * stacks are plain address ranges owned by the thread.
 */

use crate::core::errors::{KernelError, KernelResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

const KERNEL_STACK_REGION: u64 = 0xffff_ff00_0000_0000;
const USER_STACK_REGION_TOP: u64 = 0x0000_7fff_0000_0000;
const USER_STACK_GUARD: u64 = 64 * 1024;

/// Allocator for fixed-size kernel stacks with a byte budget
pub struct StackAllocator {
    stack_size: usize,
    budget: usize,
    outstanding: AtomicUsize,
    next_base: AtomicU64,
}

impl StackAllocator {
    pub fn new(stack_size: usize, budget: usize) -> Arc<Self> {
        Arc::new(Self {
            stack_size,
            budget,
            outstanding: AtomicUsize::new(0),
            next_base: AtomicU64::new(KERNEL_STACK_REGION),
        })
    }

    pub fn stack_size(&self) -> usize {
        self.stack_size
    }

    /// Bytes currently handed out
    pub fn outstanding_bytes(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Fails with `NoMemory` when the budget is exhausted
    pub fn allocate(self: &Arc<Self>) -> KernelResult<KernelStack> {
        let size = self.stack_size;
        self.outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(size).filter(|total| *total <= self.budget)
            })
            .map_err(|used| {
                KernelError::no_memory(format!(
                    "kernel stack budget exhausted ({used} of {} bytes)",
                    self.budget
                ))
            })?;

        let base = self.next_base.fetch_add(size as u64, Ordering::Relaxed);
        Ok(KernelStack {
            base,
            size,
            allocator: Arc::clone(self),
        })
    }

    fn release(&self, size: usize) {
        self.outstanding.fetch_sub(size, Ordering::AcqRel);
    }
}

impl fmt::Debug for StackAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackAllocator")
            .field("stack_size", &self.stack_size)
            .field("budget", &self.budget)
            .field("outstanding", &self.outstanding_bytes())
            .finish()
    }
}

/// Kernel stack owned by a thread
pub struct KernelStack {
    base: u64,
    size: usize,
    allocator: Arc<StackAllocator>,
}

impl KernelStack {
    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

impl Drop for KernelStack {
    fn drop(&mut self) {
        self.allocator.release(self.size);
    }
}

impl fmt::Debug for KernelStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KernelStack({:#x}, {} bytes)", self.base, self.size)
    }
}

/// User-mode stack (and TLS) range of a thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStack {
    pub base: u64,
    pub size: usize,
}

impl UserStack {
    /// Place a stack of `size` bytes in the slot reserved for `thread`
    pub fn for_thread(thread: u32, size: usize) -> Self {
        let stride = size as u64 + USER_STACK_GUARD;
        let top = USER_STACK_REGION_TOP.saturating_sub(u64::from(thread) * stride);
        Self {
            base: top.saturating_sub(size as u64),
            size,
        }
    }
}
