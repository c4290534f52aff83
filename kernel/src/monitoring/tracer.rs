/*!
 * Tracing
 * Subscriber setup and per-syscall spans using the tracing crate
 */

use crate::core::types::ThreadId;
use std::time::{Duration, Instant};
use tracing::{debug, info, span, warn, Level};
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Syscalls slower than this are reported at warn level
const SLOW_SYSCALL: Duration = Duration::from_millis(10);

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - KERNEL_TRACE_JSON: Enable JSON output (default: false)
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var("KERNEL_TRACE_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init()
            .is_ok()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()
            .is_ok()
    };

    if installed {
        info!(json = use_json, "Structured tracing initialized");
    }
}

/// Span covering one syscall made on behalf of a kernel thread
pub struct SyscallSpan {
    span: tracing::Span,
    start: Instant,
    syscall: &'static str,
}

impl SyscallSpan {
    pub fn new(syscall: &'static str, thread: ThreadId) -> Self {
        let span = span!(
            Level::DEBUG,
            "syscall",
            syscall,
            thread = thread.raw(),
            duration_us = tracing::field::Empty,
        );

        Self {
            span,
            start: Instant::now(),
            syscall,
        }
    }

    /// Enter the span context
    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

impl Drop for SyscallSpan {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        self.span.record("duration_us", duration.as_micros() as u64);
        let _entered = self.span.enter();

        if duration > SLOW_SYSCALL {
            warn!(
                syscall = self.syscall,
                duration_ms = duration.as_millis() as u64,
                "slow syscall detected"
            );
        } else {
            debug!(syscall = self.syscall, "syscall completed");
        }
    }
}

/// Helper to create a syscall span
#[inline]
pub fn span_syscall(syscall: &'static str, thread: ThreadId) -> SyscallSpan {
    SyscallSpan::new(syscall, thread)
}
