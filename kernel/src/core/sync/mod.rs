/*!
 * Synchronization Primitives
 *
 * Publish-then-wait condition variables for kernel blocking calls
 */

mod condition;

pub use condition::{ConditionEntry, ConditionVariable, WaitHandle, WaitStatus};
