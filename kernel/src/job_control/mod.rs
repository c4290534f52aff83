/*!
 * Job Control
 *
 * Per-child state records a parent uses to learn that a child stopped,
 * continued or died, and the `wait` consumer built on them.
 */

mod entry;
pub mod types;
mod wait;

pub use entry::JobControlEntry;
pub(crate) use entry::{set_job_control_state, JobControlQueues};
pub use types::*;
