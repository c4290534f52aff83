/*!
 * Kernel Configuration
 *
 * Boot-time policy values. Defaults come from `core::limits`; any of them can
 * be overridden from the environment or a serialized config.
 */

use super::limits;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::warn;

/// Policy values fixed at boot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Maximum live teams
    pub max_teams: usize,
    /// Maximum live threads
    pub max_threads: usize,
    /// Un-reaped dead children kept per parent
    pub max_dead_children: usize,
    /// Thread death records kept per team
    pub max_dead_threads: usize,
    /// Kernel stack size per thread
    pub kernel_stack_size: usize,
    /// Total kernel stack memory
    pub kernel_stack_budget: usize,
    /// User stack size for userland threads without an explicit size
    pub default_user_stack_size: usize,
    /// User-defined timers per team
    pub max_user_defined_timers: usize,
    pub undertaker_queue_depth: usize,
    pub event_queue_depth: usize,
    /// Delivery log entries kept by the default signal facility
    pub signal_log_depth: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            max_teams: limits::MAX_TEAMS,
            max_threads: limits::MAX_THREADS,
            max_dead_children: limits::MAX_DEAD_CHILDREN,
            max_dead_threads: limits::MAX_DEAD_THREADS,
            kernel_stack_size: limits::KERNEL_STACK_SIZE,
            kernel_stack_budget: limits::KERNEL_STACK_BUDGET,
            default_user_stack_size: limits::DEFAULT_USER_STACK_SIZE,
            max_user_defined_timers: limits::MAX_USER_DEFINED_TIMERS,
            undertaker_queue_depth: limits::UNDERTAKER_QUEUE_DEPTH,
            event_queue_depth: limits::EVENT_QUEUE_DEPTH,
            signal_log_depth: limits::SIGNAL_LOG_DEPTH,
        }
    }
}

impl KernelConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by environment variables
    ///
    /// Recognized: KERNEL_MAX_TEAMS, KERNEL_MAX_THREADS,
    /// KERNEL_MAX_DEAD_CHILDREN, KERNEL_MAX_DEAD_THREADS, KERNEL_STACK_SIZE.
    /// Unparsable or zero values are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` with a custom variable source
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        override_from(&lookup, "KERNEL_MAX_TEAMS", &mut config.max_teams);
        override_from(&lookup, "KERNEL_MAX_THREADS", &mut config.max_threads);
        override_from(&lookup, "KERNEL_MAX_DEAD_CHILDREN", &mut config.max_dead_children);
        override_from(&lookup, "KERNEL_MAX_DEAD_THREADS", &mut config.max_dead_threads);
        override_from(&lookup, "KERNEL_STACK_SIZE", &mut config.kernel_stack_size);
        config
    }

    pub fn with_max_teams(mut self, max: usize) -> Self {
        self.max_teams = max;
        self
    }

    pub fn with_max_threads(mut self, max: usize) -> Self {
        self.max_threads = max;
        self
    }

    pub fn with_max_dead_children(mut self, max: usize) -> Self {
        self.max_dead_children = max;
        self
    }

    pub fn with_max_dead_threads(mut self, max: usize) -> Self {
        self.max_dead_threads = max;
        self
    }

    pub fn with_kernel_stack_budget(mut self, bytes: usize) -> Self {
        self.kernel_stack_budget = bytes;
        self
    }

    pub fn with_signal_log_depth(mut self, depth: usize) -> Self {
        self.signal_log_depth = depth;
        self
    }
}

fn override_from<F, T>(lookup: &F, key: &str, slot: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + PartialEq + Default,
{
    let Some(raw) = lookup(key) else {
        return;
    };

    match raw.trim().parse::<T>() {
        Ok(value) if value != T::default() => *slot = value,
        _ => warn!(key, value = %raw, "Ignoring invalid kernel config override"),
    }
}
