/*!
 * Core Types
 * Identifier newtypes and small value types shared by every subsystem
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

macro_rules! kernel_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            /// Raw numeric value
            #[inline(always)]
            pub const fn raw(self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u32> for $name {
            fn from(raw: u32) -> Self {
                Self(raw)
            }
        }
    };
}

kernel_id!(
    /// Team (process) identifier
    TeamId
);
kernel_id!(
    /// Thread identifier. A team's main thread carries the team's id.
    ThreadId
);
kernel_id!(
    /// Process group identifier (the id of the team that created the group)
    GroupId
);
kernel_id!(
    /// Session identifier (the id of the session leader)
    SessionId
);

impl From<TeamId> for ThreadId {
    fn from(id: TeamId) -> Self {
        Self(id.0)
    }
}

impl From<TeamId> for GroupId {
    fn from(id: TeamId) -> Self {
        Self(id.0)
    }
}

impl From<TeamId> for SessionId {
    fn from(id: TeamId) -> Self {
        Self(id.0)
    }
}

impl From<ThreadId> for TeamId {
    fn from(id: ThreadId) -> Self {
        Self(id.0)
    }
}

/// The kernel team always takes the first id
pub const ROOT_TEAM_ID: TeamId = TeamId(1);

/// User id of a team's owner
pub type Uid = u32;

/// Scheduling priority (higher runs first)
pub type Priority = i32;

/// Controlling terminal index
pub type TtyId = u32;

/// User/kernel CPU time pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuTimes {
    pub user: Duration,
    pub kernel: Duration,
}

impl CpuTimes {
    pub const ZERO: CpuTimes = CpuTimes {
        user: Duration::ZERO,
        kernel: Duration::ZERO,
    };

    pub fn new(user: Duration, kernel: Duration) -> Self {
        Self { user, kernel }
    }

    pub fn add(&mut self, other: CpuTimes) {
        self.user += other.user;
        self.kernel += other.kernel;
    }

    pub fn total(&self) -> Duration {
        self.user + self.kernel
    }
}

impl std::ops::Add for CpuTimes {
    type Output = CpuTimes;

    fn add(mut self, rhs: CpuTimes) -> CpuTimes {
        CpuTimes::add(&mut self, rhs);
        self
    }
}
