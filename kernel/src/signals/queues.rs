/*!
 * Signal Queues
 * Default in-kernel signal facility with a delivery log
 */

use super::traits::SignalFacility;
use super::types::{PendingSignal, SendFlags, Signal, SignalInfo, SignalMask, SignalTarget};
use crate::core::errors::KernelResult;
use crate::core::limits::SIGNAL_LOG_DEPTH;
use crate::core::types::{TeamId, ThreadId};
use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tracing::trace;

#[derive(Default)]
struct TeamSignals {
    pending: VecDeque<PendingSignal>,
    blocked: SignalMask,
}

/// Pending queues and block masks keyed by team and thread
///
/// A signal already pending for a target is not queued twice. Every accepted
/// send is appended to the delivery log, which tests and diagnostics read
/// through [`SignalQueues::deliveries`]. The log keeps the most recent
/// `log_depth` sends; entries for a forgotten team or thread are dropped.
pub struct SignalQueues {
    teams: DashMap<TeamId, TeamSignals, RandomState>,
    threads: DashMap<ThreadId, VecDeque<PendingSignal>, RandomState>,
    log: Mutex<VecDeque<PendingSignal>>,
    log_depth: usize,
}

impl SignalQueues {
    pub fn new() -> Self {
        Self::with_log_depth(SIGNAL_LOG_DEPTH)
    }

    /// Keep at most `depth` entries in the delivery log (0 disables it)
    pub fn with_log_depth(depth: usize) -> Self {
        Self {
            teams: DashMap::with_hasher(RandomState::new()),
            threads: DashMap::with_hasher(RandomState::new()),
            log: Mutex::new(VecDeque::with_capacity(depth.min(SIGNAL_LOG_DEPTH))),
            log_depth: depth,
        }
    }

    /// Logged sends, oldest first
    pub fn deliveries(&self) -> Vec<PendingSignal> {
        self.log.lock().iter().copied().collect()
    }

    fn record(&self, pending: PendingSignal) {
        if self.log_depth == 0 {
            return;
        }
        let mut log = self.log.lock();
        while log.len() >= self.log_depth {
            log.pop_front();
        }
        log.push_back(pending);
    }

    /// How many times `signal` was sent to `target`
    pub fn delivered_count(&self, target: SignalTarget, signal: Signal) -> usize {
        self.log
            .lock()
            .iter()
            .filter(|p| p.target == target && p.signal == signal)
            .count()
    }

    /// Signals currently queued for `team` (team-directed only)
    pub fn pending_for_team(&self, team: TeamId) -> Vec<Signal> {
        self.teams
            .get(&team)
            .map(|s| s.pending.iter().map(|p| p.signal).collect())
            .unwrap_or_default()
    }

    fn blocked_mask(&self, team: TeamId) -> SignalMask {
        self.teams.get(&team).map(|s| s.blocked).unwrap_or_default()
    }
}

impl Default for SignalQueues {
    fn default() -> Self {
        Self::new()
    }
}

fn take_unblocked(
    queue: &mut VecDeque<PendingSignal>,
    blocked: SignalMask,
) -> Option<PendingSignal> {
    let pos = queue.iter().position(|p| !blocked.blocks(p.signal))?;
    queue.remove(pos)
}

impl SignalFacility for SignalQueues {
    fn send_signal(
        &self,
        target: SignalTarget,
        signal: Signal,
        info: SignalInfo,
        _flags: SendFlags,
    ) -> KernelResult<()> {
        let pending = PendingSignal {
            signal,
            target,
            info,
        };

        let queued = match target {
            SignalTarget::Team(team) => {
                let mut state = self.teams.entry(team).or_default();
                let fresh = !state.pending.iter().any(|p| p.signal == signal);
                if fresh {
                    state.pending.push_back(pending);
                }
                fresh
            }
            SignalTarget::Thread(thread) => {
                let mut queue = self.threads.entry(thread).or_default();
                let fresh = !queue.iter().any(|p| p.signal == signal);
                if fresh {
                    queue.push_back(pending);
                }
                fresh
            }
        };

        trace!(%target, %signal, queued, "Signal sent");
        self.record(pending);
        Ok(())
    }

    fn is_signal_blocked(&self, team: TeamId, signal: Signal) -> bool {
        self.blocked_mask(team).blocks(signal)
    }

    fn set_blocked(&self, team: TeamId, signal: Signal, blocked: bool) {
        let mut state = self.teams.entry(team).or_default();
        if blocked {
            state.blocked.insert(signal);
        } else {
            state.blocked.remove(signal);
        }
    }

    fn has_pending(&self, team: TeamId, thread: ThreadId) -> bool {
        let blocked = self.blocked_mask(team);

        let thread_pending = self
            .threads
            .get(&thread)
            .map(|q| q.iter().any(|p| !blocked.blocks(p.signal)))
            .unwrap_or(false);
        if thread_pending {
            return true;
        }

        self.teams
            .get(&team)
            .map(|s| s.pending.iter().any(|p| !blocked.blocks(p.signal)))
            .unwrap_or(false)
    }

    fn take_pending(&self, team: TeamId, thread: ThreadId) -> Option<PendingSignal> {
        let blocked = self.blocked_mask(team);

        if let Some(mut queue) = self.threads.get_mut(&thread) {
            if let Some(pending) = take_unblocked(&mut queue, blocked) {
                return Some(pending);
            }
        }

        let mut state = self.teams.get_mut(&team)?;
        take_unblocked(&mut state.pending, blocked)
    }

    fn clear_pending(&self, team: TeamId, signal: Signal) -> usize {
        let Some(mut state) = self.teams.get_mut(&team) else {
            return 0;
        };
        let before = state.pending.len();
        state.pending.retain(|p| p.signal != signal);
        before - state.pending.len()
    }

    fn forget_team(&self, team: TeamId) {
        self.teams.remove(&team);
        self.log
            .lock()
            .retain(|p| p.target != SignalTarget::Team(team));
    }

    fn forget_thread(&self, thread: ThreadId) {
        self.threads.remove(&thread);
        self.log
            .lock()
            .retain(|p| p.target != SignalTarget::Thread(thread));
    }
}
