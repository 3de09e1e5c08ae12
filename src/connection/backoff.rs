//! Pure reconnection policy
//!
//! Linear backoff: every fired reconnect timer adds `step_ms` to the delay,
//! capped at `max_delay_ms`. Only a successful authentication resets it.

use super::state::ConnectionState;
use serde::{Deserialize, Serialize};

pub const DEFAULT_STEP_MS: u64 = 1000;
pub const DEFAULT_MAX_DELAY_MS: u64 = 10_000;

/// Reconnect backoff configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Added to the delay each time a reconnect timer fires
    #[serde(default = "default_step_ms")]
    pub step_ms: u64,
    /// Ceiling for the delay
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_step_ms() -> u64 {
    DEFAULT_STEP_MS
}

fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            step_ms: DEFAULT_STEP_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

impl ReconnectPolicy {
    /// Delay to use for the attempt after one waiting `current_ms`
    pub fn next_delay(&self, current_ms: u64) -> u64 {
        current_ms.saturating_add(self.step_ms).min(self.max_delay_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_delay_ms < self.step_ms {
            return Err(format!(
                "max_delay_ms ({}) must be at least step_ms ({})",
                self.max_delay_ms, self.step_ms
            ));
        }
        Ok(())
    }
}

/// What to do when the current transport closes
#[derive(Debug, PartialEq)]
pub enum ReconnectDecision {
    /// Schedule a reconnect timer with this delay
    Schedule { delay_ms: u64 },
    /// Shut down: never reconnect
    AbortShutDown,
}

/// What to do when the pending reconnect timer fires
#[derive(Debug, PartialEq)]
pub enum TimerDecision {
    /// Start a new transport
    Start,
    /// Network is offline; wait for `network-online`
    SkipOffline,
    AbortShutDown,
}

/// Decide how to react to a close of the current transport (pure function)
pub fn on_transport_closed(state: &ConnectionState) -> ReconnectDecision {
    if state.is_shut_down {
        return ReconnectDecision::AbortShutDown;
    }
    // A zero delay is still scheduled so reconnection never recurses inside a callback
    ReconnectDecision::Schedule {
        delay_ms: state.reconnect_delay_ms,
    }
}

/// Decide how to react to the reconnect timer firing (pure function)
pub fn on_timer_fired(state: &ConnectionState) -> TimerDecision {
    if state.is_shut_down {
        TimerDecision::AbortShutDown
    } else if !state.is_network_online {
        TimerDecision::SkipOffline
    } else {
        TimerDecision::Start
    }
}
