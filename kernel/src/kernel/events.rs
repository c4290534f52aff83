/*!
 * Kernel Events
 * Team and thread notifications fanned out to subscribers
 */

use crate::core::types::{TeamId, ThreadId};
use flume::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Lifecycle notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum KernelEvent {
    TeamAdded { team: TeamId },
    TeamRemoved { team: TeamId },
    TeamExec { team: TeamId },
    ThreadAdded { thread: ThreadId, team: TeamId },
    ThreadRemoved { thread: ThreadId, team: TeamId },
}

/// Bounded broadcast to every live subscriber
///
/// Publishing never blocks: a subscriber whose queue is full misses the
/// event, a dropped receiver is pruned.
pub(crate) struct EventBus {
    depth: usize,
    subscribers: Mutex<Vec<Sender<KernelEvent>>>,
}

impl EventBus {
    pub(crate) fn new(depth: usize) -> Self {
        Self {
            depth,
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn subscribe(&self) -> Receiver<KernelEvent> {
        let (tx, rx) = flume::bounded(self.depth);
        self.subscribers.lock().push(tx);
        rx
    }

    pub(crate) fn publish(&self, event: KernelEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| match tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                trace!(?event, "Subscriber queue full, event dropped");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}
