/*!
 * ID Generation
 * Shared team/thread id counter
 */

use std::sync::atomic::{AtomicU32, Ordering};

/// Monotonic id source shared by teams and threads
///
/// Teams and threads draw from one counter so that a team's main thread can
/// reuse the team's id without colliding with any other thread. Ids are never
/// recycled; the first id handed out is 1 (the kernel team).
#[repr(C, align(64))]
pub struct IdAllocator {
    next: AtomicU32,
}

impl IdAllocator {
    pub const fn new() -> Self {
        Self {
            next: AtomicU32::new(1),
        }
    }

    /// Hand out the next id
    #[inline]
    pub fn next(&self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// The id the next call to `next` returns
    #[inline]
    pub fn peek(&self) -> u32 {
        self.next.load(Ordering::Relaxed)
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
