//! Background timers with cancellation.
//!
//! Completion detection runs off the caller's thread: the exposure controller
//! hands a closure to a [`Scheduler`] and keeps the returned
//! [`ScheduledTask`] so a disconnect can cancel it.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::trace;

/// Work item run by a scheduler.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Shared cancellation flag.
///
/// Cancelling wakes any thread waiting on the token.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancellationToken {
    /// Create an un-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel and wake waiters.
    pub fn cancel(&self) {
        let (flag, cond) = &*self.inner;
        *flag.lock() = true;
        cond.notify_all();
    }

    /// Whether [`CancellationToken::cancel`] was called.
    pub fn is_cancelled(&self) -> bool {
        *self.inner.0.lock()
    }

    /// Block until `deadline` or cancellation; returns `true` if cancelled.
    pub fn wait_until(&self, deadline: Instant) -> bool {
        let (flag, cond) = &*self.inner;
        let mut cancelled = flag.lock();
        while !*cancelled {
            if cond.wait_until(&mut cancelled, deadline).timed_out() {
                break;
            }
        }
        *cancelled
    }
}

/// Handle to a scheduled task.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    token: CancellationToken,
}

impl ScheduledTask {
    /// Wrap a token.
    pub const fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Prevent the task from running if it has not started yet.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the task was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Timer facility used for completion detection.
pub trait Scheduler: Send + Sync {
    /// Run `task` once after `delay` unless cancelled first.
    fn schedule(&self, delay: Duration, task: Task) -> ScheduledTask;
}

/// Runs each task on its own worker thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadScheduler;

impl Scheduler for ThreadScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> ScheduledTask {
        let token = CancellationToken::new();
        let worker = token.clone();
        let deadline = Instant::now() + delay;

        thread::spawn(move || {
            if worker.wait_until(deadline) {
                trace!("scheduled task cancelled");
                return;
            }
            task();
        });

        ScheduledTask::new(token)
    }
}
