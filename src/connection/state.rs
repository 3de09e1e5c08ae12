//! Connection status and the immutable state record of the actor
//!
//! Every transition builds a new [`ConnectionState`] value from the previous
//! one; nothing is mutated in place, so a snapshot handed out mid-transition
//! stays intact and two snapshots can be compared with `==`.

use serde::Serialize;
use std::fmt;

/// Lifecycle status of the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Pre-start default, and while a transport is being established
    Connecting,
    /// Socket open, session not yet accepted
    Opened,
    /// Handshake-ok received for the current transport
    Authenticated,
    /// No usable connection (closed, offline or shut down)
    Closed,
    /// The transport could not be created
    Errored,
}

impl ConnectionStatus {
    /// Statuses that accept a handshake-ok signal
    pub fn accepts_handshake(self) -> bool {
        matches!(self, ConnectionStatus::Opened | ConnectionStatus::Authenticated)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Opened => "opened",
            ConnectionStatus::Authenticated => "authenticated",
            ConnectionStatus::Closed => "closed",
            ConnectionStatus::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// Snapshot of the actor's state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    /// Incremented every time a transport is created
    pub generation: u64,
    /// Generation of the transport currently owned, if any
    pub transport_generation: Option<u64>,
    pub reconnect_delay_ms: u64,
    pub reconnect_pending: bool,
    pub is_shut_down: bool,
    pub is_network_online: bool,
    pub last_error: Option<String>,
}

impl ConnectionState {
    /// State at actor construction
    pub fn initial() -> Self {
        Self {
            status: ConnectionStatus::Connecting,
            generation: 0,
            transport_generation: None,
            reconnect_delay_ms: 0,
            reconnect_pending: false,
            is_shut_down: false,
            is_network_online: true,
            last_error: None,
        }
    }

    /// True when an event tagged with `generation` comes from the current transport
    pub fn is_current(&self, generation: u64) -> bool {
        self.transport_generation == Some(generation)
    }

    pub fn with_status(&self, status: ConnectionStatus, error: Option<String>) -> Self {
        Self {
            status,
            last_error: error,
            ..self.clone()
        }
    }

    /// A new transport became current
    pub fn with_transport(&self, generation: u64) -> Self {
        Self {
            status: ConnectionStatus::Connecting,
            generation,
            transport_generation: Some(generation),
            last_error: None,
            ..self.clone()
        }
    }

    /// The transport could not be created; the generation is still consumed
    pub fn with_failed_transport(&self, generation: u64, error: String) -> Self {
        Self {
            status: ConnectionStatus::Errored,
            generation,
            transport_generation: None,
            last_error: Some(error),
            ..self.clone()
        }
    }

    /// The current transport reported close
    ///
    /// A close reason only fills `last_error` when no earlier error was recorded.
    pub fn with_transport_closed(&self, reason: Option<String>) -> Self {
        Self {
            status: ConnectionStatus::Closed,
            transport_generation: None,
            last_error: self.last_error.clone().or(reason),
            ..self.clone()
        }
    }

    pub fn with_transport_error(&self, error: String) -> Self {
        Self {
            last_error: Some(error),
            ..self.clone()
        }
    }

    pub fn authenticated(&self) -> Self {
        Self {
            status: ConnectionStatus::Authenticated,
            reconnect_delay_ms: 0,
            last_error: None,
            ..self.clone()
        }
    }

    pub fn with_reconnect_pending(&self, pending: bool) -> Self {
        Self {
            reconnect_pending: pending,
            ..self.clone()
        }
    }

    pub fn with_reconnect_delay(&self, delay_ms: u64) -> Self {
        Self {
            reconnect_delay_ms: delay_ms,
            ..self.clone()
        }
    }

    pub fn with_network_online(&self, online: bool) -> Self {
        Self {
            is_network_online: online,
            ..self.clone()
        }
    }

    /// Terminal: no transport is kept, status is closed
    pub fn shut_down(&self) -> Self {
        Self {
            status: ConnectionStatus::Closed,
            transport_generation: None,
            reconnect_pending: false,
            is_shut_down: true,
            ..self.clone()
        }
    }
}
