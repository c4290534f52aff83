/*!
 * Core Module
 * Fundamental kernel types, error handling and primitives
 */

pub mod config;
pub mod data_structures;
pub mod errors;
pub mod guard;
pub mod id;
pub mod limits;
pub mod sync;
pub mod types;

// Re-export for convenience
pub use config::KernelConfig;
pub use data_structures::InlineString;
pub use errors::{KernelError, KernelResult};
pub use guard::RollbackGuard;
pub use id::IdAllocator;
pub use sync::{ConditionEntry, ConditionVariable, WaitHandle, WaitStatus};
pub use types::*;
