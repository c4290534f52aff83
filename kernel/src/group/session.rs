/*!
 * Process Session
 */

use crate::core::types::{GroupId, SessionId, TtyId};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

/// Terminal association of a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionState {
    pub controlling_tty: Option<TtyId>,
    pub foreground_group: Option<GroupId>,
}

/// A session; kept alive by the groups that belong to it
#[derive(Debug)]
pub struct ProcessSession {
    id: SessionId,
    state: Mutex<SessionState>,
}

impl ProcessSession {
    pub fn new(id: SessionId) -> Arc<Self> {
        Arc::new(Self {
            id,
            state: Mutex::new(SessionState::default()),
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn controlling_tty(&self) -> Option<TtyId> {
        self.state.lock().controlling_tty
    }

    pub fn set_controlling_tty(&self, tty: Option<TtyId>) {
        self.state.lock().controlling_tty = tty;
    }

    pub fn foreground_group(&self) -> Option<GroupId> {
        self.state.lock().foreground_group
    }

    pub fn set_foreground_group(&self, group: Option<GroupId>) {
        self.state.lock().foreground_group = group;
    }

    pub fn snapshot(&self) -> SessionState {
        *self.state.lock()
    }

    /// Drop the terminal; returns the foreground group that must get SIGHUP
    pub(crate) fn hang_up(&self) -> Option<GroupId> {
        let mut state = self.state.lock();
        state.controlling_tty.take()?;
        state.foreground_group
    }
}
