/*!
 * Job Control Types
 */

use crate::core::types::{CpuTimes, GroupId, TeamId, Uid};
use crate::signals::Signal;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Wait state of a child as seen by its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobControlState {
    None,
    Stopped,
    Continued,
    Dead,
}

/// Why a child reported a state change (the `CLD_*` codes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    Exited,
    Killed,
    Stopped,
    Continued,
}

bitflags! {
    /// `wait_for_child` flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct WaitFlags: u32 {
        /// Report dead children
        const EXITED = 0x01;
        /// Report stopped children
        const STOPPED = 0x02;
        /// Report continued children
        const CONTINUED = 0x04;
        /// Fail with `WouldBlock` instead of blocking
        const NOHANG = 0x08;
        /// Leave the reported entry in place
        const NOWAIT = 0x10;
        const UNTRACED = Self::STOPPED.bits();
    }
}

impl WaitFlags {
    pub(crate) fn wants_any_state(self) -> bool {
        self.intersects(WaitFlags::EXITED | WaitFlags::STOPPED | WaitFlags::CONTINUED)
    }
}

/// How a thread or team ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitInfo {
    pub status: i32,
    pub reason: ExitReason,
    pub signal: Option<Signal>,
    pub signaling_user: Uid,
}

impl ExitInfo {
    pub fn exited(status: i32) -> Self {
        Self {
            status,
            reason: ExitReason::Exited,
            signal: None,
            signaling_user: 0,
        }
    }

    pub fn killed(signal: Signal, signaling_user: Uid) -> Self {
        Self {
            status: 0,
            reason: ExitReason::Killed,
            signal: Some(signal),
            signaling_user,
        }
    }
}

/// Which children a wait call is interested in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChildSelector {
    /// Any child
    Any,
    /// The child with this id
    Team(TeamId),
    /// Any child in this process group
    Group(GroupId),
    /// Any child in the caller's process group
    OwnGroup,
}

/// CPU time a team or its reaped children consumed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamUsage {
    pub user_time: Duration,
    pub kernel_time: Duration,
}

impl From<CpuTimes> for TeamUsage {
    fn from(times: CpuTimes) -> Self {
        Self {
            user_time: times.user,
            kernel_time: times.kernel,
        }
    }
}

/// Selects whose usage `get_team_usage_info` reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UsageWho {
    /// The team's own threads, live and dead
    Team,
    /// The team's reaped children
    Children,
}

/// Result of a successful `wait_for_child`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitInfo {
    pub team: TeamId,
    pub state: JobControlState,
    pub reason: ExitReason,
    /// Exit status for `Exited`, otherwise zero
    pub status: i32,
    /// Killing or stopping signal
    pub signal: Option<Signal>,
    pub signaling_user: Uid,
    /// Only filled in for dead children
    pub usage: TeamUsage,
}
