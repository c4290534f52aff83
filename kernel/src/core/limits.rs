/*!
 * System Limits and Constants
 *
 * Centralized location for the kernel's policy constants. Every value here
 * can be overridden at boot through `KernelConfig` unless noted otherwise.
 */

// =============================================================================
// TABLE LIMITS
// =============================================================================

/// Maximum number of live teams
/// Team creation fails with `NoMoreTeams` once the table holds this many
pub const MAX_TEAMS: usize = 2048;

/// Maximum number of live threads (including threads awaiting the undertaker)
pub const MAX_THREADS: usize = 4096;

// =============================================================================
// DEATH RECORDS
// =============================================================================

/// Soft cap on un-reaped dead children per parent
/// The oldest entry is forgotten once exceeded so that a parent that never
/// waits cannot pin exited children forever
pub const MAX_DEAD_CHILDREN: usize = 32;

/// Soft cap on stored thread death records per team
/// Same eviction policy as `MAX_DEAD_CHILDREN`
pub const MAX_DEAD_THREADS: usize = 32;

// =============================================================================
// STACKS
// =============================================================================

/// Kernel stack per thread (16KB)
pub const KERNEL_STACK_SIZE: usize = 16 * 1024;

/// Default user stack for threads of userland teams (256KB)
pub const DEFAULT_USER_STACK_SIZE: usize = 256 * 1024;

/// Upper bound on outstanding kernel stack memory (64MB)
/// Allocation fails with `NoMemory` beyond this
pub const KERNEL_STACK_BUDGET: usize = 64 * 1024 * 1024;

// =============================================================================
// TEAM RESOURCES
// =============================================================================

/// User-defined timers a single team may own
pub const MAX_USER_DEFINED_TIMERS: usize = 32;

/// First id handed out to user-defined timers
/// Lower ids are reserved for the team's built-in clocks
pub const FIRST_USER_DEFINED_TIMER_ID: i32 = 3;

/// Team names are truncated to this many bytes
pub const TEAM_NAME_LENGTH: usize = 32;

/// Flattened team argument strings are truncated to this many bytes
pub const TEAM_ARGS_LENGTH: usize = 64;

/// Thread names are truncated to this many bytes
pub const THREAD_NAME_LENGTH: usize = 32;

/// Largest payload `send_data` accepts (64KB)
pub const MAX_THREAD_MESSAGE_SIZE: usize = 64 * 1024;

// =============================================================================
// PRIORITIES
// =============================================================================

/// Lowest priority a thread may run at
pub const LOWEST_ACTIVE_PRIORITY: i32 = 1;

/// Default priority for new threads
pub const NORMAL_PRIORITY: i32 = 10;

/// Priority used while a thread tears itself down
pub const URGENT_DISPLAY_PRIORITY: i32 = 20;

/// Highest priority a thread may request
pub const MAX_PRIORITY: i32 = 120;

// =============================================================================
// QUEUES
// =============================================================================

/// Capacity of the undertaker's work queue
/// Exiting threads block on a full queue until the worker catches up
pub const UNDERTAKER_QUEUE_DEPTH: usize = 256;

/// Entries kept in the default signal facility's delivery log
/// The oldest entry is dropped once the log is full
pub const SIGNAL_LOG_DEPTH: usize = 1024;

/// Per-subscriber capacity of the kernel event channel
/// Events are dropped for subscribers that fall this far behind
pub const EVENT_QUEUE_DEPTH: usize = 1024;
