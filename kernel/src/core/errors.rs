/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use crate::core::data_structures::InlineString;
use crate::core::types::{GroupId, TeamId, ThreadId};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kernel operation result
pub type KernelResult<T> = Result<T, KernelError>;

/// Errors returned by team, thread, group and job-control operations
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum KernelError {
    #[error("Team {0} not found")]
    #[diagnostic(
        code(kernel::bad_team_id),
        help("The team may have exited or is not visible to the caller.")
    )]
    BadTeamId(TeamId),

    #[error("Thread {0} not found")]
    #[diagnostic(
        code(kernel::bad_thread_id),
        help("The thread may have exited or was never created.")
    )]
    BadThreadId(ThreadId),

    #[error("Process group {0} not found")]
    #[diagnostic(
        code(kernel::bad_group_id),
        help("The group loses its registry entry when its last member leaves.")
    )]
    BadGroupId(GroupId),

    #[error("Invalid argument: {0}")]
    #[diagnostic(code(kernel::bad_value), help("Check the arguments passed to the call."))]
    BadValue(InlineString),

    #[error("Operation not allowed: {0}")]
    #[diagnostic(
        code(kernel::not_allowed),
        help("The team hierarchy or session rules forbid this operation.")
    )]
    NotAllowed(InlineString),

    #[error("Permission denied: {0}")]
    #[diagnostic(
        code(kernel::permission_denied),
        help("The target has already replaced its program image.")
    )]
    PermissionDenied(InlineString),

    #[error("Operation would block")]
    #[diagnostic(
        code(kernel::would_block),
        help("Nothing is available yet; retry later or drop the non-blocking flag.")
    )]
    WouldBlock,

    #[error("No child matches the wait selector")]
    #[diagnostic(
        code(kernel::no_such_child),
        help("The caller has no child that the selector could ever report.")
    )]
    NoSuchChild,

    #[error("Interrupted by a signal")]
    #[diagnostic(
        code(kernel::interrupted),
        help("A pending signal aborted the wait. Queues were left untouched.")
    )]
    Interrupted,

    #[error("Out of memory: {0}")]
    #[diagnostic(code(kernel::no_memory), help("Free kernel resources and retry."))]
    NoMemory(InlineString),

    #[error("Resource busy: {0}")]
    #[diagnostic(
        code(kernel::busy),
        help("Another caller won a concurrent attach or publish race.")
    )]
    Busy(InlineString),

    #[error("Team table full ({limit} teams)")]
    #[diagnostic(
        code(kernel::no_more_teams),
        help("Reap dead children or raise KERNEL_MAX_TEAMS.")
    )]
    NoMoreTeams { limit: usize },

    #[error("Thread table full ({limit} threads)")]
    #[diagnostic(
        code(kernel::no_more_threads),
        help("Let threads exit or raise KERNEL_MAX_THREADS.")
    )]
    NoMoreThreads { limit: usize },

    #[error("Failed to load image {path}: {reason}")]
    #[diagnostic(
        code(kernel::image_load),
        help("The image loader rejected the program. Check the path and arguments.")
    )]
    ImageLoad {
        path: InlineString,
        reason: InlineString,
    },
}

impl KernelError {
    pub fn bad_value(msg: impl Into<InlineString>) -> Self {
        KernelError::BadValue(msg.into())
    }

    pub fn not_allowed(msg: impl Into<InlineString>) -> Self {
        KernelError::NotAllowed(msg.into())
    }

    pub fn busy(msg: impl Into<InlineString>) -> Self {
        KernelError::Busy(msg.into())
    }

    pub fn no_memory(msg: impl Into<InlineString>) -> Self {
        KernelError::NoMemory(msg.into())
    }
}

/// Report a broken kernel invariant. Never returns.
#[macro_export]
macro_rules! kernel_fault {
    ($($arg:tt)*) => {
        panic!("kernel fault: {}", format_args!($($arg)*))
    };
}
