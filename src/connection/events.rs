//! Notifications published by the connection actor

use super::state::ConnectionStatus;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

/// Envelope for every externally visible notification
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ConnectionEvent {
    /// Emitted on every status transition
    StatusChanged {
        status: ConnectionStatus,
        generation: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// An inbound message from the current transport, forwarded verbatim
    MessageReceived {
        #[serde(rename = "transportGeneration")]
        transport_generation: u64,
        payload: Value,
    },
}

impl ConnectionEvent {
    pub fn status(&self) -> Option<ConnectionStatus> {
        match self {
            ConnectionEvent::StatusChanged { status, .. } => Some(*status),
            ConnectionEvent::MessageReceived { .. } => None,
        }
    }
}

/// A registered subscriber; dropping it unregisters
#[derive(Debug)]
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<ConnectionEvent>,
}

impl Subscription {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<ConnectionEvent>) -> Self {
        Self { rx }
    }

    /// Wait for the next event; `None` once the actor has stopped
    pub async fn recv(&mut self) -> Option<ConnectionEvent> {
        self.rx.recv().await
    }

    /// Next already-delivered event, if any
    pub fn try_recv(&mut self) -> Option<ConnectionEvent> {
        self.rx.try_recv().ok()
    }

    /// All events delivered so far
    pub fn drain(&mut self) -> Vec<ConnectionEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// Statuses among the events delivered so far
    pub fn drain_statuses(&mut self) -> Vec<ConnectionStatus> {
        self.drain().iter().filter_map(ConnectionEvent::status).collect()
    }
}

/// Fan-out of events to live subscribers, in processing order
#[derive(Debug, Default)]
pub(crate) struct Subscribers {
    senders: Vec<mpsc::UnboundedSender<ConnectionEvent>>,
}

impl Subscribers {
    pub(crate) fn add(&mut self, sender: mpsc::UnboundedSender<ConnectionEvent>) {
        self.senders.push(sender);
    }

    pub(crate) fn publish(&mut self, event: ConnectionEvent) {
        // Closed receivers are dropped subscriptions
        self.senders.retain(|sender| sender.send(event.clone()).is_ok());
    }

    pub(crate) fn len(&self) -> usize {
        self.senders.len()
    }
}
