//! Transport layer for the connection actor
//!
//! This module provides the socket abstraction the actor drives and the
//! factory that opens sockets. A concrete websocket implementation lives in
//! [`websocket`]; tests use the mocks in [`crate::testing`].

use crate::connection::actor::ConnectionCommand;
use thiserror::Error;
use tokio::sync::mpsc;

pub mod websocket;

/// Readiness of a single socket, mirroring the browser `WebSocket.readyState`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadyState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ReadyState {
    /// Decode a readiness value stored in an atomic
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => ReadyState::Connecting,
            1 => ReadyState::Open,
            2 => ReadyState::Closing,
            _ => ReadyState::Closed,
        }
    }
}

/// Transport errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransportError {
    #[error("Invalid transport URL: {0}")]
    InvalidUrl(String),
    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),
    #[error("No async runtime available to drive the transport")]
    NoRuntime,
    #[error("Transport is not open (state: {0:?})")]
    NotOpen(ReadyState),
    #[error("Transport closed")]
    Closed,
}

/// One socket connection owned by the connection actor
///
/// Implementations report lifecycle changes through the
/// [`TransportCallbacks`] handed to [`TransportFactory::create`].
pub trait Transport: Send {
    /// Current readiness of the socket
    fn ready_state(&self) -> ReadyState;

    /// Write one serialized frame
    fn send(&mut self, payload: String) -> Result<(), TransportError>;

    /// Begin closing the socket; completion is reported via `on_close`
    fn close(&mut self);
}

/// Creates transports from a URL
///
/// A factory is stateless from the actor's point of view and may be shared
/// across many actors.
pub trait TransportFactory: Send + Sync {
    fn create(
        &self,
        url: &str,
        callbacks: TransportCallbacks,
    ) -> Result<Box<dyn Transport>, TransportError>;
}

/// Lifecycle signals a transport reports back to its actor
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Open,
    Message(String),
    Error(String),
    /// The socket closed; `reason` is set when the peer closed abnormally
    Close { reason: Option<String> },
}

/// The four callback slots of a transport, bound to one generation
///
/// Each callback posts a generation-tagged message into the owning actor's
/// mailbox. Posting after the actor has stopped is a no-op.
#[derive(Debug, Clone)]
pub struct TransportCallbacks {
    generation: u64,
    mailbox: mpsc::UnboundedSender<ConnectionCommand>,
}

impl TransportCallbacks {
    pub(crate) fn new(generation: u64, mailbox: mpsc::UnboundedSender<ConnectionCommand>) -> Self {
        Self {
            generation,
            mailbox,
        }
    }

    /// Generation of the transport these callbacks belong to
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn on_open(&self) {
        self.post(TransportEvent::Open);
    }

    pub fn on_message(&self, raw: impl Into<String>) {
        self.post(TransportEvent::Message(raw.into()));
    }

    pub fn on_error(&self, error: impl Into<String>) {
        self.post(TransportEvent::Error(error.into()));
    }

    pub fn on_close(&self, reason: Option<String>) {
        self.post(TransportEvent::Close { reason });
    }

    fn post(&self, event: TransportEvent) {
        let _ = self.mailbox.send(ConnectionCommand::Transport {
            generation: self.generation,
            event,
        });
    }
}
