/*!
 * Process Groups and Sessions
 *
 * Sessions own the controlling terminal association; groups collect the
 * teams that are signaled together and know whether they are orphaned.
 */

mod orphan;
mod process_group;
mod registry;
mod session;
mod syscalls;

pub use process_group::{GroupMembers, LockedGroup, ProcessGroup};
pub use registry::GroupRegistry;
pub use session::{ProcessSession, SessionState};
