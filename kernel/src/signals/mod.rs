/*!
 * Signals Module
 * Signal types, the pending-signal facility and kernel-side dispatch
 */

mod dispatch;
mod queues;
pub mod traits;
pub mod types;

// Re-export public API
pub use queues::SignalQueues;
pub use traits::SignalFacility;
pub use types::{
    DefaultAction, PendingSignal, SendFlags, Signal, SignalAction, SignalActionFlags,
    SignalActionTable, SignalHandler, SignalInfo, SignalMask, SignalOutcome, SignalTarget,
    MAX_SIGNAL,
};
