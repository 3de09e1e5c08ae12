use super::actor::ConnectionCommand;
use super::events::Subscription;
use super::state::{ConnectionState, ConnectionStatus};
use crate::error::{ConnectionError, ConnectionResult};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use uuid::Uuid;

/// Caller side of a running connection actor
///
/// Cheap to clone. Every method posts a message and returns immediately;
/// dropping the last clone shuts the actor down.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    inner: Arc<HandleInner>,
}

#[derive(Debug)]
struct HandleInner {
    mailbox: mpsc::UnboundedSender<ConnectionCommand>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl Drop for HandleInner {
    fn drop(&mut self) {
        let _ = self.mailbox.send(ConnectionCommand::Shutdown);
    }
}

impl ConnectionHandle {
    pub(crate) fn new(
        mailbox: mpsc::UnboundedSender<ConnectionCommand>,
        state_rx: watch::Receiver<ConnectionState>,
    ) -> Self {
        Self {
            inner: Arc::new(HandleInner { mailbox, state_rx }),
        }
    }

    fn post(&self, command: ConnectionCommand) -> ConnectionResult<()> {
        self.inner
            .mailbox
            .send(command)
            .map_err(|_| ConnectionError::ActorStopped)
    }

    /// Open a transport unless one is already connecting
    pub fn start(&self) -> ConnectionResult<()> {
        self.post(ConnectionCommand::Start)
    }

    /// Send `payload` stamped with `correlation_id`; dropped unless the transport is open
    pub fn send(&self, correlation_id: impl Into<String>, payload: Value) -> ConnectionResult<()> {
        self.post(ConnectionCommand::Send {
            correlation_id: correlation_id.into(),
            payload,
        })
    }

    /// Like [`send`](Self::send) with a fresh random correlation id, which is returned
    pub fn send_with_new_id(&self, payload: Value) -> ConnectionResult<String> {
        let correlation_id = Uuid::new_v4().to_string();
        self.send(correlation_id.clone(), payload)?;
        Ok(correlation_id)
    }

    pub fn network_online(&self) -> ConnectionResult<()> {
        self.post(ConnectionCommand::NetworkOnline)
    }

    pub fn network_offline(&self) -> ConnectionResult<()> {
        self.post(ConnectionCommand::NetworkOffline)
    }

    /// Report that the transport of `generation` completed the handshake
    pub fn auth_handshake_ok(&self, generation: u64, payload: Value) -> ConnectionResult<()> {
        self.post(ConnectionCommand::AuthHandshakeOk {
            generation,
            payload,
        })
    }

    /// Stop the actor for good. Succeeds even if it has already stopped.
    pub fn shutdown(&self) -> ConnectionResult<()> {
        let _ = self.post(ConnectionCommand::Shutdown);
        Ok(())
    }

    /// Register a subscriber; events published from now on are delivered to it
    ///
    /// On a stopped actor the subscription is already closed.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = self.post(ConnectionCommand::Subscribe(tx));
        Subscription::new(rx)
    }

    /// Latest published status, without waiting for pending messages
    pub fn status(&self) -> ConnectionStatus {
        self.inner.state_rx.borrow().status
    }

    /// Latest published state, without waiting for pending messages
    pub fn state(&self) -> ConnectionState {
        self.inner.state_rx.borrow().clone()
    }

    /// State after every message posted before this call has been processed
    ///
    /// Once the actor has stopped this is the last state it published.
    pub async fn snapshot(&self) -> ConnectionState {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.post(ConnectionCommand::Snapshot(reply_tx)).is_err() {
            return self.state();
        }
        match reply_rx.await {
            Ok(state) => state,
            Err(_) => self.state(),
        }
    }

    /// True once the actor's loop has exited
    pub fn is_stopped(&self) -> bool {
        self.inner.mailbox.is_closed()
    }
}
