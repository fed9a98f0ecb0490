//! "Run this closure on context C."
//!
//! Playback progress must reach the caller on a thread the caller chooses,
//! typically the one that owns its UI state. A [`DispatchContext`] is that
//! thread's inbox. [`dispatch_queue`] builds the common case: a channel whose
//! receiving half the caller pumps from its own loop.

use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

/// A unit of work posted to a dispatch context.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

pub trait DispatchContext: Send + Sync {
    /// Hand `task` to this context for execution.
    fn post(&self, task: Task);
}

impl<F> DispatchContext for F
where
    F: Fn(Task) + Send + Sync,
{
    fn post(&self, task: Task) {
        self(task)
    }
}

/// Create a connected dispatcher/queue pair.
pub fn dispatch_queue() -> (QueueDispatcher, DispatchQueue) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (QueueDispatcher { tx }, DispatchQueue { rx })
}

/// Posting half of [`dispatch_queue`]. Cheap to clone.
#[derive(Clone)]
pub struct QueueDispatcher {
    tx: Sender<Task>,
}

impl DispatchContext for QueueDispatcher {
    fn post(&self, task: Task) {
        if self.tx.send(task).is_err() {
            log::debug!("dispatch queue closed, dropping task");
        }
    }
}

/// Receiving half of [`dispatch_queue`]; owned by the thread tasks must run on.
pub struct DispatchQueue {
    rx: Receiver<Task>,
}

impl DispatchQueue {
    /// Run every task queued right now without blocking. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.rx.try_recv() {
            task();
            ran += 1;
        }
        ran
    }

    /// Wait up to `timeout` for one task and run it.
    pub fn run_one(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(task) => {
                task();
                true
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    /// Keep running tasks until `done` returns true or `deadline` passes.
    ///
    /// Tasks still queued when `done` flips are run before returning, so a
    /// terminal notification posted just before the worker exits is not lost.
    /// Returns whether `done` was satisfied.
    pub fn run_until<F: FnMut() -> bool>(&self, mut done: F, deadline: Duration) -> bool {
        let started = Instant::now();
        loop {
            if done() {
                self.run_pending();
                return true;
            }
            let Some(remaining) = deadline.checked_sub(started.elapsed()) else {
                return false;
            };
            self.run_one(remaining.min(Duration::from_millis(20)));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
