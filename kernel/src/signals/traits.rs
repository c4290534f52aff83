/*!
 * Signal Traits
 * Contract of the signal facility the kernel core delivers through
 */

use super::types::{PendingSignal, SendFlags, Signal, SignalInfo, SignalTarget};
use crate::core::errors::KernelResult;
use crate::core::types::{TeamId, ThreadId};

/// Pending-signal bookkeeping owned by the signal subsystem
///
/// The kernel core decides *whether* a signal matters (actions, job control,
/// interrupting waits); the facility only queues and masks.
pub trait SignalFacility: Send + Sync {
    /// Queue `signal` for `target`
    fn send_signal(
        &self,
        target: SignalTarget,
        signal: Signal,
        info: SignalInfo,
        flags: SendFlags,
    ) -> KernelResult<()>;

    /// Whether `team` currently blocks `signal`
    fn is_signal_blocked(&self, team: TeamId, signal: Signal) -> bool;

    /// Block or unblock `signal` for `team`
    fn set_blocked(&self, team: TeamId, signal: Signal, blocked: bool);

    /// Whether an unblocked signal is pending for `thread` or its `team`
    fn has_pending(&self, team: TeamId, thread: ThreadId) -> bool;

    /// Dequeue the next unblocked signal, thread-directed ones first
    fn take_pending(&self, team: TeamId, thread: ThreadId) -> Option<PendingSignal>;

    /// Drop pending team-directed instances of `signal`; returns how many
    fn clear_pending(&self, team: TeamId, signal: Signal) -> usize;

    /// Release everything kept for an exited team
    fn forget_team(&self, team: TeamId);

    /// Release everything kept for an exited thread
    fn forget_thread(&self, thread: ThreadId);
}
