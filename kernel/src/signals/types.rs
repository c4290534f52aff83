/*!
 * Signal Types
 * UNIX-style signal definitions, actions and per-team action tables
 */

use crate::core::errors::{KernelError, KernelResult};
use crate::core::types::{TeamId, ThreadId, Uid};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

/// UNIX-style signal numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum Signal {
    /// Hangup detected on controlling terminal or death of controlling process
    SIGHUP = 1,
    /// Interrupt from keyboard (Ctrl+C)
    SIGINT = 2,
    /// Quit from keyboard (Ctrl+\)
    SIGQUIT = 3,
    /// Illegal instruction
    SIGILL = 4,
    /// Trace/breakpoint trap
    SIGTRAP = 5,
    /// Abort signal
    SIGABRT = 6,
    /// Bus error (bad memory access)
    SIGBUS = 7,
    /// Floating-point exception
    SIGFPE = 8,
    /// Kill signal (cannot be caught or ignored)
    SIGKILL = 9,
    /// User-defined signal 1
    SIGUSR1 = 10,
    /// Invalid memory reference
    SIGSEGV = 11,
    /// User-defined signal 2
    SIGUSR2 = 12,
    /// Broken pipe
    SIGPIPE = 13,
    /// Timer signal
    SIGALRM = 14,
    /// Termination signal
    SIGTERM = 15,
    /// Child process stopped, continued or terminated
    SIGCHLD = 17,
    /// Continue if stopped
    SIGCONT = 18,
    /// Stop process (cannot be caught or ignored)
    SIGSTOP = 19,
    /// Stop typed at terminal (Ctrl+Z)
    SIGTSTP = 20,
    /// Terminal input for background process
    SIGTTIN = 21,
    /// Terminal output for background process
    SIGTTOU = 22,
    /// Urgent condition on socket
    SIGURG = 23,
    /// CPU time limit exceeded
    SIGXCPU = 24,
    /// File size limit exceeded
    SIGXFSZ = 25,
    /// Virtual alarm clock
    SIGVTALRM = 26,
    /// Profiling timer expired
    SIGPROF = 27,
    /// Window resize signal
    SIGWINCH = 28,
    /// I/O now possible
    SIGIO = 29,
    /// Power failure
    SIGPWR = 30,
    /// Bad system call
    SIGSYS = 31,
    /// Kill a single thread (cannot be caught or ignored)
    SIGKILLTHR = 32,
}

/// Highest signal number
pub const MAX_SIGNAL: u32 = 32;

const ALL_SIGNALS: [Signal; 31] = [
    Signal::SIGHUP,
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGILL,
    Signal::SIGTRAP,
    Signal::SIGABRT,
    Signal::SIGBUS,
    Signal::SIGFPE,
    Signal::SIGKILL,
    Signal::SIGUSR1,
    Signal::SIGSEGV,
    Signal::SIGUSR2,
    Signal::SIGPIPE,
    Signal::SIGALRM,
    Signal::SIGTERM,
    Signal::SIGCHLD,
    Signal::SIGCONT,
    Signal::SIGSTOP,
    Signal::SIGTSTP,
    Signal::SIGTTIN,
    Signal::SIGTTOU,
    Signal::SIGURG,
    Signal::SIGXCPU,
    Signal::SIGXFSZ,
    Signal::SIGVTALRM,
    Signal::SIGPROF,
    Signal::SIGWINCH,
    Signal::SIGIO,
    Signal::SIGPWR,
    Signal::SIGSYS,
    Signal::SIGKILLTHR,
];

/// What a signal does when its action is `Default`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DefaultAction {
    Terminate,
    Ignore,
    Stop,
    Continue,
}

impl Signal {
    /// Convert from signal number
    pub fn from_number(n: u32) -> KernelResult<Self> {
        ALL_SIGNALS
            .iter()
            .copied()
            .find(|s| s.number() == n)
            .ok_or_else(|| KernelError::bad_value(format!("invalid signal number {n}")))
    }

    /// Every defined signal in numeric order
    pub fn all() -> impl Iterator<Item = Signal> {
        ALL_SIGNALS.iter().copied()
    }

    /// Get signal number
    pub fn number(&self) -> u32 {
        *self as u32
    }

    /// Whether a handler may be installed or the signal ignored/blocked
    pub fn can_catch(&self) -> bool {
        !matches!(self, Signal::SIGKILL | Signal::SIGSTOP | Signal::SIGKILLTHR)
    }

    pub fn default_action(&self) -> DefaultAction {
        match self {
            Signal::SIGCHLD | Signal::SIGURG | Signal::SIGWINCH => DefaultAction::Ignore,
            Signal::SIGCONT => DefaultAction::Continue,
            Signal::SIGSTOP | Signal::SIGTSTP | Signal::SIGTTIN | Signal::SIGTTOU => {
                DefaultAction::Stop
            }
            _ => DefaultAction::Terminate,
        }
    }

    /// Job-control stop signal
    pub fn is_stop(&self) -> bool {
        self.default_action() == DefaultAction::Stop
    }

    fn mask_bit(&self) -> u64 {
        1u64 << (self.number() - 1)
    }

    /// Get human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Signal::SIGHUP => "Hangup",
            Signal::SIGINT => "Interrupt",
            Signal::SIGQUIT => "Quit",
            Signal::SIGILL => "Illegal instruction",
            Signal::SIGTRAP => "Trace/breakpoint trap",
            Signal::SIGABRT => "Aborted",
            Signal::SIGBUS => "Bus error",
            Signal::SIGFPE => "Floating point exception",
            Signal::SIGKILL => "Killed",
            Signal::SIGUSR1 => "User defined signal 1",
            Signal::SIGSEGV => "Segmentation fault",
            Signal::SIGUSR2 => "User defined signal 2",
            Signal::SIGPIPE => "Broken pipe",
            Signal::SIGALRM => "Alarm clock",
            Signal::SIGTERM => "Terminated",
            Signal::SIGCHLD => "Child status changed",
            Signal::SIGCONT => "Continued",
            Signal::SIGSTOP => "Stopped (signal)",
            Signal::SIGTSTP => "Stopped",
            Signal::SIGTTIN => "Stopped (tty input)",
            Signal::SIGTTOU => "Stopped (tty output)",
            Signal::SIGURG => "Urgent I/O condition",
            Signal::SIGXCPU => "CPU time limit exceeded",
            Signal::SIGXFSZ => "File size limit exceeded",
            Signal::SIGVTALRM => "Virtual timer expired",
            Signal::SIGPROF => "Profiling timer expired",
            Signal::SIGWINCH => "Window size changed",
            Signal::SIGIO => "I/O possible",
            Signal::SIGPWR => "Power failure",
            Signal::SIGSYS => "Bad system call",
            Signal::SIGKILLTHR => "Thread killed",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.number())
    }
}

/// Signal set as a bit mask (bit n-1 for signal n)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignalMask(u64);

impl SignalMask {
    pub const EMPTY: SignalMask = SignalMask(0);

    pub fn contains(&self, signal: Signal) -> bool {
        self.0 & signal.mask_bit() != 0
    }

    pub fn insert(&mut self, signal: Signal) {
        self.0 |= signal.mask_bit();
    }

    pub fn remove(&mut self, signal: Signal) {
        self.0 &= !signal.mask_bit();
    }

    /// Whether `signal` is held back by this mask; uncatchable signals never are
    pub fn blocks(&self, signal: Signal) -> bool {
        signal.can_catch() && self.contains(signal)
    }
}

/// Handler part of a signal action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalHandler {
    Default,
    Ignore,
    /// User-space handler entry point
    Handler(u64),
}

bitflags! {
    /// sigaction flags the kernel itself interprets
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SignalActionFlags: u32 {
        /// Don't notify the parent when a child stops or continues
        const NOCLDSTOP = 0x01;
        /// Don't keep dead children around for wait
        const NOCLDWAIT = 0x02;
    }
}

bitflags! {
    /// Flags accepted by `SignalFacility::send_signal`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SendFlags: u32 {
        /// Sender holds kernel locks; the facility must not reschedule
        const DO_NOT_RESCHEDULE = 0x01;
    }
}

/// Disposition installed for one signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalAction {
    pub handler: SignalHandler,
    pub flags: SignalActionFlags,
}

impl SignalAction {
    pub const DEFAULT: SignalAction = SignalAction {
        handler: SignalHandler::Default,
        flags: SignalActionFlags::empty(),
    };

    pub const IGNORE: SignalAction = SignalAction {
        handler: SignalHandler::Ignore,
        flags: SignalActionFlags::empty(),
    };

    pub fn handler(entry: u64) -> Self {
        Self {
            handler: SignalHandler::Handler(entry),
            flags: SignalActionFlags::empty(),
        }
    }

    pub fn with_flags(mut self, flags: SignalActionFlags) -> Self {
        self.flags = flags;
        self
    }
}

impl Default for SignalAction {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Per-team signal actions
#[derive(Debug, Clone)]
pub struct SignalActionTable {
    actions: [SignalAction; MAX_SIGNAL as usize + 1],
}

impl SignalActionTable {
    pub fn new() -> Self {
        Self {
            actions: [SignalAction::DEFAULT; MAX_SIGNAL as usize + 1],
        }
    }

    pub fn get(&self, signal: Signal) -> SignalAction {
        if !signal.can_catch() {
            return SignalAction::DEFAULT;
        }
        self.actions[signal.number() as usize]
    }

    /// Install `action`, returning the previous one
    pub fn set(&mut self, signal: Signal, action: SignalAction) -> KernelResult<SignalAction> {
        if !signal.can_catch() && action.handler != SignalHandler::Default {
            return Err(KernelError::bad_value(format!("{signal} cannot be caught or ignored")));
        }
        Ok(std::mem::replace(&mut self.actions[signal.number() as usize], action))
    }

    /// Whether delivery of `signal` would be a no-op
    pub fn is_ignored(&self, signal: Signal) -> bool {
        match self.get(signal).handler {
            SignalHandler::Ignore => true,
            SignalHandler::Default => signal.default_action() == DefaultAction::Ignore,
            SignalHandler::Handler(_) => false,
        }
    }

    /// exec semantics: handlers revert to default, ignored signals stay ignored
    pub fn reset_for_exec(&mut self) {
        for action in self.actions.iter_mut() {
            if let SignalHandler::Handler(_) = action.handler {
                *action = SignalAction::DEFAULT;
            }
        }
    }
}

impl Default for SignalActionTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Who sent a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalInfo {
    pub sender: TeamId,
    pub user: Uid,
}

impl SignalInfo {
    pub fn new(sender: TeamId, user: Uid) -> Self {
        Self { sender, user }
    }
}

/// Recipient of a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalTarget {
    Team(TeamId),
    Thread(ThreadId),
}

impl fmt::Display for SignalTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalTarget::Team(id) => write!(f, "team {id}"),
            SignalTarget::Thread(id) => write!(f, "thread {id}"),
        }
    }
}

/// A signal queued for delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSignal {
    pub signal: Signal,
    pub target: SignalTarget,
    pub info: SignalInfo,
}

/// What handling pending signals did to a thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOutcome {
    /// Nothing was pending
    Nothing,
    /// Pending signals were all ignored
    Ignored,
    /// A user handler must run
    Handled { signal: Signal, handler: u64 },
    /// The team was stopped
    Stopped(Signal),
    /// The team was continued
    Continued,
    /// The thread exited
    Exited(Signal),
}
