//! Virtual clock implementing [`Scheduler`]
//!
//! Nothing fires on its own: tasks run only inside [`ManualScheduler::advance`],
//! in due order, so even zero-delay timers are deterministic in tests.

use crate::connection::scheduler::{Scheduler, TimerHandle, TimerTask};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct ScheduledTask {
    id: u64,
    due: Duration,
    task: TimerTask,
    cancelled: Arc<AtomicBool>,
}

#[derive(Default)]
struct ClockState {
    now: Duration,
    next_id: u64,
    queue: Vec<ScheduledTask>,
    requested: Vec<Duration>,
}

#[derive(Default)]
pub struct ManualScheduler {
    state: Mutex<ClockState>,
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ManualScheduler")
            .field("now", &state.now)
            .field("queued", &state.queue.len())
            .finish()
    }
}

struct ManualTimer {
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle for ManualTimer {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time elapsed since creation
    pub fn now(&self) -> Duration {
        self.state.lock().now
    }

    /// Remaining delay of every live (not cancelled, not fired) task, soonest first
    pub fn pending_timers(&self) -> Vec<Duration> {
        let state = self.state.lock();
        let mut remaining: Vec<Duration> = state
            .queue
            .iter()
            .filter(|t| !t.cancelled.load(Ordering::SeqCst))
            .map(|t| t.due.saturating_sub(state.now))
            .collect();
        remaining.sort();
        remaining
    }

    /// Every delay ever passed to `schedule`, in call order
    pub fn requested_delays(&self) -> Vec<Duration> {
        self.state.lock().requested.clone()
    }

    /// Move the clock forward, running every task that falls due
    ///
    /// Tasks scheduled by a running task are picked up if they are due
    /// within the same window.
    pub fn advance(&self, by: Duration) {
        let target = self.state.lock().now + by;
        while let Some(task) = self.pop_due(target) {
            task();
        }
        self.state.lock().now = target;
    }

    fn pop_due(&self, target: Duration) -> Option<TimerTask> {
        let mut state = self.state.lock();
        state.queue.retain(|t| !t.cancelled.load(Ordering::SeqCst));
        let index = state
            .queue
            .iter()
            .enumerate()
            .filter(|(_, t)| t.due <= target)
            .min_by_key(|(_, t)| (t.due, t.id))
            .map(|(i, _)| i)?;
        let next = state.queue.remove(index);
        state.now = next.due;
        Some(next.task)
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: TimerTask) -> Box<dyn TimerHandle> {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = state.next_id;
        let due = state.now + delay;
        let cancelled = Arc::new(AtomicBool::new(false));
        state.requested.push(delay);
        state.queue.push(ScheduledTask {
            id,
            due,
            task,
            cancelled: Arc::clone(&cancelled),
        });
        Box::new(ManualTimer { cancelled })
    }
}
