/*!
 * Team Kernel Library
 * Team and thread lifecycle, process groups, sessions and job control
 */

pub mod core;
pub mod group;
pub mod interfaces;
pub mod job_control;
pub mod kernel;
pub mod monitoring;
pub mod signals;
pub mod table;
pub mod team;
pub mod thread;

// Re-exports
pub use core::{
    GroupId, KernelConfig, KernelError, KernelResult, Priority, SessionId, TeamId, ThreadId,
    TtyId, Uid,
};
pub use group::{ProcessGroup, ProcessSession};
pub use interfaces::{AcceptAllImages, AddressSpaces, ImageLoader, IoContexts, RunQueue, Scheduler};
pub use job_control::{
    ChildSelector, ExitReason, JobControlState, TeamUsage, UsageWho, WaitFlags, WaitInfo,
};
pub use kernel::{Kernel, KernelBuilder, KernelEvent, KernelStats, KERNEL_TEAM_NAME};
pub use monitoring::init_tracing;
pub use signals::{Signal, SignalAction, SignalActionFlags, SignalQueues, SignalTarget};
pub use team::{KillTarget, Team, TeamInfo, TeamState, TimerClock, ALARM_TIMER_ID};
pub use thread::{Thread, ThreadAttributes, ThreadInfo, ThreadMessage, ThreadState};
