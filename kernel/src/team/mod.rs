/*!
 * Teams
 *
 * The team object, its lock helpers, creation (spawn, fork, exec),
 * teardown and the per-team syscalls.
 */

mod hierarchy;
mod info;
mod lifecycle;
mod locking;
mod syscalls;
mod types;

pub use info::TeamInfo;
pub use locking::{FamilyLock, LockedTeam, TeamAndGroupLock, TeamAndParentLock, TeamRemovalLock};
pub use syscalls::{KillTarget, ALARM_TIMER_ID};
pub use types::{DeadThread, Team, TeamData, TeamState, TeamWatcherFn, TimerClock, UserTimer};

pub(crate) use locking::lock_current_group;
