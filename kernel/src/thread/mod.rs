/*!
 * Threads
 *
 * Thread objects, their kernel entry/exit bookkeeping, per-thread mailboxes,
 * the exit path and the undertaker that frees what an exiting thread cannot
 * free itself.
 */

mod entry;
mod exit;
mod info;
mod lifecycle;
mod messaging;
mod stack;
mod types;
mod undertaker;

pub use entry::KernelEntry;
pub use info::ThreadInfo;
pub use messaging::ThreadMessage;
pub use stack::{KernelStack, StackAllocator, UserStack};
pub use types::{BlockingDescriptor, Thread, ThreadAttributes, ThreadState};

pub(crate) use undertaker::Undertaker;
