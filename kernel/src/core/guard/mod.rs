/*!
 * RAII Guards
 *
 * Scoped cleanup for multi-step kernel operations
 */

mod rollback;

pub use rollback::RollbackGuard;
