/*!
 * Thread Messaging and User Blocking
 *
 * Every thread owns a one-slot mailbox. `send_data` blocks while the slot is
 * full and `receive_data` blocks until it is filled; both waits are
 * interruptible. The mailbox closes when its thread exits, which fails
 * pending and future senders with `BadThreadId`.
 *
 * `block_thread`/`unblock_thread` let userland park a thread until another
 * thread posts a wait status for it. A status posted before the block is
 * kept and returned by the next `block_thread` without waiting.
 */

use crate::core::errors::{KernelError, KernelResult};
use crate::core::limits::MAX_THREAD_MESSAGE_SIZE;
use crate::core::sync::{ConditionEntry, ConditionVariable, WaitStatus};
use crate::core::types::ThreadId;
use crate::kernel::Kernel;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, trace};

/// A message delivered through a thread's mailbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub sender: ThreadId,
    pub code: i32,
    pub data: Vec<u8>,
}

#[derive(Default)]
struct MailboxSlot {
    message: Option<ThreadMessage>,
    closed: bool,
}

pub(crate) enum Deposit<'a> {
    Stored,
    /// Slot taken; wait on the entry and retry with the returned message
    Full(ThreadMessage, ConditionEntry<'a>),
    Closed,
}

pub(crate) struct Mailbox {
    slot: Mutex<MailboxSlot>,
    space: ConditionVariable,
    data: ConditionVariable,
}

impl Mailbox {
    pub(crate) fn new() -> Self {
        Self {
            slot: Mutex::new(MailboxSlot::default()),
            space: ConditionVariable::new("thread send"),
            data: ConditionVariable::new("thread receive"),
        }
    }

    pub(crate) fn deposit(&self, message: ThreadMessage) -> Deposit<'_> {
        let mut slot = self.slot.lock();
        if slot.closed {
            return Deposit::Closed;
        }
        if slot.message.is_some() {
            let entry = self.space.add_entry();
            return Deposit::Full(message, entry);
        }
        slot.message = Some(message);
        drop(slot);
        self.data.notify_one();
        Deposit::Stored
    }

    /// Take the message, or publish a wait for the next one
    pub(crate) fn take(&self) -> Result<ThreadMessage, ConditionEntry<'_>> {
        let mut slot = self.slot.lock();
        match slot.message.take() {
            Some(message) => {
                drop(slot);
                self.space.notify_one();
                Ok(message)
            }
            None => Err(self.data.add_entry()),
        }
    }

    pub(crate) fn has_message(&self) -> bool {
        self.slot.lock().message.is_some()
    }

    /// Drop any pending message and fail every waiting sender
    pub(crate) fn close(&self) {
        {
            let mut slot = self.slot.lock();
            slot.closed = true;
            slot.message = None;
        }
        self.space.notify_all();
        self.data.notify_all();
    }
}

/// Wait status posted by `unblock_thread`, consumed by `block_thread`
pub(crate) struct UserBlock {
    posted: Mutex<Option<i32>>,
    wakeup: ConditionVariable,
}

impl UserBlock {
    pub(crate) fn new() -> Self {
        Self {
            posted: Mutex::new(None),
            wakeup: ConditionVariable::new("user block"),
        }
    }

    /// Consume a posted status, or publish a wait for one
    pub(crate) fn consume(&self) -> Result<i32, ConditionEntry<'_>> {
        let mut posted = self.posted.lock();
        match posted.take() {
            Some(status) => Ok(status),
            None => Err(self.wakeup.add_entry()),
        }
    }

    pub(crate) fn post(&self, status: i32) {
        *self.posted.lock() = Some(status);
        self.wakeup.notify_all();
    }
}

impl Kernel {
    /// Deposit a message in `target`'s mailbox, waiting while it is full
    pub fn send_data(
        &self,
        caller: ThreadId,
        target: ThreadId,
        code: i32,
        data: &[u8],
    ) -> KernelResult<()> {
        if data.len() > MAX_THREAD_MESSAGE_SIZE {
            return Err(KernelError::no_memory(format!(
                "message of {} bytes exceeds {MAX_THREAD_MESSAGE_SIZE}",
                data.len()
            )));
        }
        let entry = self.enter("send_data", caller)?;
        let thread = Arc::clone(entry.thread());
        let receiver = self.thread(target).ok_or(KernelError::BadThreadId(target))?;

        let mut message = ThreadMessage {
            sender: caller,
            code,
            data: data.to_vec(),
        };
        loop {
            match receiver.mailbox().deposit(message) {
                Deposit::Stored => {
                    trace!(from = %caller, to = %target, code, "Message sent");
                    return Ok(());
                }
                Deposit::Closed => return Err(KernelError::BadThreadId(target)),
                Deposit::Full(pending, wait) => {
                    if self.block_on(&thread, &wait, true) == WaitStatus::Interrupted {
                        return Err(KernelError::Interrupted);
                    }
                    message = pending;
                }
            }
        }
    }

    /// Take the caller's message, waiting until one arrives
    pub fn receive_data(&self, caller: ThreadId) -> KernelResult<ThreadMessage> {
        let entry = self.enter("receive_data", caller)?;
        let thread = Arc::clone(entry.thread());
        loop {
            match thread.mailbox().take() {
                Ok(message) => return Ok(message),
                Err(wait) => {
                    if self.block_on(&thread, &wait, true) == WaitStatus::Interrupted {
                        return Err(KernelError::Interrupted);
                    }
                }
            }
        }
    }

    pub fn has_data(&self, id: ThreadId) -> KernelResult<bool> {
        let thread = self.thread(id).ok_or(KernelError::BadThreadId(id))?;
        Ok(thread.mailbox().has_message())
    }

    /// First visible thread named `name`, in thread table order
    pub fn find_thread(&self, name: &str) -> Option<ThreadId> {
        self.inner
            .threads
            .iter()
            .find(|thread| thread.name().as_str() == name)
            .map(|thread| thread.id())
    }

    /// Park the caller until [`Kernel::unblock_thread`] posts a status
    ///
    /// Returns the posted status; `Interrupted` if a signal arrives first.
    pub fn block_thread(&self, caller: ThreadId) -> KernelResult<i32> {
        let entry = self.enter("block_thread", caller)?;
        let thread = Arc::clone(entry.thread());
        loop {
            match thread.user_block().consume() {
                Ok(status) => return Ok(status),
                Err(wait) => {
                    if self.block_on(&thread, &wait, true) == WaitStatus::Interrupted {
                        return Err(KernelError::Interrupted);
                    }
                }
            }
        }
    }

    /// Post `status` for thread `id` and wake it if it is blocked
    ///
    /// Kernel team threads have no userland side and cannot be unblocked.
    pub fn unblock_thread(&self, id: ThreadId, status: i32) -> KernelResult<()> {
        let thread = self.thread(id).ok_or(KernelError::BadThreadId(id))?;
        if thread.team().is_some_and(|team| team.is_root()) {
            return Err(KernelError::not_allowed("kernel threads cannot be unblocked"));
        }
        debug!(thread = %id, status, "Unblocking thread");
        thread.user_block().post(status);
        Ok(())
    }
}
