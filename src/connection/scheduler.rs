//! Timer source for reconnect delays
//!
//! The actor never sleeps. It asks a [`Scheduler`] to run a closure after a
//! delay, and the closure posts a message back into the mailbox. Production
//! uses [`TokioScheduler`]; tests inject a virtual clock
//! ([`crate::testing::ManualScheduler`]).

use std::fmt;
use std::time::Duration;
use tokio::task::JoinHandle;

pub type TimerTask = Box<dyn FnOnce() + Send + 'static>;

/// Cancellation handle of one scheduled task
pub trait TimerHandle: Send {
    /// Prevent the task from running if it has not run yet
    fn cancel(&self);
}

/// Runs tasks after a delay
pub trait Scheduler: Send + Sync {
    fn schedule(&self, delay: Duration, task: TimerTask) -> Box<dyn TimerHandle>;
}

/// Scheduler backed by `tokio::time`
///
/// Must be used from within a tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl TokioScheduler {
    pub fn new() -> Self {
        Self
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: TimerTask) -> Box<dyn TimerHandle> {
        let join = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task();
        });
        Box::new(TokioTimer { join })
    }
}

struct TokioTimer {
    join: JoinHandle<()>,
}

impl TimerHandle for TokioTimer {
    fn cancel(&self) {
        self.join.abort();
    }
}

impl fmt::Debug for TokioTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokioTimer")
            .field("finished", &self.join.is_finished())
            .finish()
    }
}
