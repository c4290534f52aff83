/*!
 * Undertaker
 *
 * An exiting thread cannot free its own kernel stack or drop the last
 * reference to itself. It hands itself to a single worker that does both
 * once the thread is off the CPU for good.
 */

use super::types::Thread;
use crate::core::errors::{KernelError, KernelResult};
use crate::interfaces::Scheduler;
use crate::table::ObjectTable;
use crate::team::Team;
use flume::{Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info};

#[derive(Default)]
struct Backlog {
    pending: Mutex<usize>,
    drained: Condvar,
}

impl Backlog {
    fn add(&self) {
        *self.pending.lock() += 1;
    }

    fn done(&self) {
        let mut pending = self.pending.lock();
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.drained.notify_all();
        }
    }
}

/// Handle to the undertaker worker; joins it on drop
pub(crate) struct Undertaker {
    sender: Option<Sender<Arc<Thread>>>,
    backlog: Arc<Backlog>,
    worker: Option<JoinHandle<()>>,
}

impl Undertaker {
    pub(crate) fn spawn(
        depth: usize,
        root: Arc<Team>,
        threads: Arc<ObjectTable<Thread>>,
        scheduler: Arc<dyn Scheduler>,
    ) -> KernelResult<Self> {
        let (sender, receiver) = flume::bounded(depth);
        let backlog = Arc::new(Backlog::default());
        let worker_backlog = Arc::clone(&backlog);

        let worker = std::thread::Builder::new()
            .name("undertaker".into())
            .spawn(move || run(receiver, root, threads, scheduler, worker_backlog))
            .map_err(|e| KernelError::no_memory(format!("cannot start undertaker: {e}")))?;

        info!(depth, "Undertaker started");
        Ok(Self {
            sender: Some(sender),
            backlog,
            worker: Some(worker),
        })
    }

    /// Queue an exited thread; blocks while the queue is full
    pub(crate) fn bury(&self, thread: Arc<Thread>) {
        let Some(sender) = &self.sender else {
            return;
        };
        self.backlog.add();
        if let Err(e) = sender.send(thread) {
            error!("Undertaker gone, thread {} leaked", e.into_inner().id());
            self.backlog.done();
        }
    }

    /// Entries queued and not yet processed
    pub(crate) fn backlog(&self) -> usize {
        *self.backlog.pending.lock()
    }

    pub(crate) fn wait_idle(&self) {
        let mut pending = self.backlog.pending.lock();
        while *pending > 0 {
            self.backlog.drained.wait(&mut pending);
        }
    }
}

impl Drop for Undertaker {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Undertaker panicked");
            }
        }
    }
}

fn run(
    receiver: Receiver<Arc<Thread>>,
    root: Arc<Team>,
    threads: Arc<ObjectTable<Thread>>,
    scheduler: Arc<dyn Scheduler>,
    backlog: Arc<Backlog>,
) {
    for thread in receiver.iter() {
        let id = thread.id();

        root.lock().remove_thread(&thread);
        threads.remove(id.raw());
        drop(thread.take_kernel_stack());
        scheduler.on_thread_destroy(&thread);
        drop(thread);

        debug!(thread = %id, "Thread buried");
        backlog.done();
    }
    debug!("Undertaker stopped");
}
