//! Mock transport and transport factory
//!
//! The factory records every socket it creates. Tests drive a socket's
//! lifecycle through [`MockSocket`] (`simulate_open`, `simulate_message`,
//! ...) and inspect what the actor wrote to it.

use crate::transport::{ReadyState, Transport, TransportCallbacks, TransportError, TransportFactory};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct SocketInner {
    url: String,
    callbacks: TransportCallbacks,
    ready: Mutex<ReadyState>,
    sent: Mutex<Vec<String>>,
    close_calls: AtomicUsize,
}

/// Test-side view of a socket created by [`MockTransportFactory`]
#[derive(Debug, Clone)]
pub struct MockSocket {
    inner: Arc<SocketInner>,
}

impl MockSocket {
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Generation the actor assigned to this socket
    pub fn generation(&self) -> u64 {
        self.inner.callbacks.generation()
    }

    pub fn ready_state(&self) -> ReadyState {
        *self.inner.ready.lock()
    }

    /// Change readiness without firing any callback
    pub fn set_ready_state(&self, state: ReadyState) {
        *self.inner.ready.lock() = state;
    }

    pub fn simulate_open(&self) {
        self.set_ready_state(ReadyState::Open);
        self.inner.callbacks.on_open();
    }

    pub fn simulate_message(&self, payload: &Value) {
        self.inner.callbacks.on_message(payload.to_string());
    }

    pub fn simulate_raw_message(&self, raw: &str) {
        self.inner.callbacks.on_message(raw);
    }

    pub fn simulate_error(&self, error: &str) {
        self.inner.callbacks.on_error(error);
    }

    pub fn simulate_close(&self) {
        self.set_ready_state(ReadyState::Closed);
        self.inner.callbacks.on_close(None);
    }

    /// Close as if the server sent a close frame carrying `reason`
    pub fn simulate_close_with_reason(&self, reason: &str) {
        self.set_ready_state(ReadyState::Closed);
        self.inner.callbacks.on_close(Some(reason.to_string()));
    }

    /// Frames written by the actor, as sent
    pub fn sent_raw(&self) -> Vec<String> {
        self.inner.sent.lock().clone()
    }

    /// Frames written by the actor, parsed
    pub fn sent_messages(&self) -> Vec<Value> {
        self.inner
            .sent
            .lock()
            .iter()
            .filter_map(|raw| serde_json::from_str(raw).ok())
            .collect()
    }

    /// How many times the actor called `close`
    pub fn close_calls(&self) -> usize {
        self.inner.close_calls.load(Ordering::SeqCst)
    }
}

/// The transport half handed to the actor
#[derive(Debug)]
struct MockTransport {
    inner: Arc<SocketInner>,
}

impl Transport for MockTransport {
    fn ready_state(&self) -> ReadyState {
        *self.inner.ready.lock()
    }

    fn send(&mut self, payload: String) -> Result<(), TransportError> {
        let state = self.ready_state();
        if state != ReadyState::Open {
            return Err(TransportError::NotOpen(state));
        }
        self.inner.sent.lock().push(payload);
        Ok(())
    }

    /// Closes immediately and reports `close` synchronously, like a browser socket
    /// that was never connected
    fn close(&mut self) {
        self.inner.close_calls.fetch_add(1, Ordering::SeqCst);
        let was_closed = {
            let mut ready = self.inner.ready.lock();
            let was_closed = *ready == ReadyState::Closed;
            *ready = ReadyState::Closed;
            was_closed
        };
        if !was_closed {
            self.inner.callbacks.on_close(None);
        }
    }
}

/// Factory recording every socket it creates
#[derive(Debug, Default)]
pub struct MockTransportFactory {
    sockets: Mutex<Vec<MockSocket>>,
    fail_next: Mutex<Option<String>>,
    attempts: AtomicUsize,
}

impl MockTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `create` call fail with `TransportError::InvalidUrl(reason)`
    pub fn fail_next_create(&self, reason: &str) {
        *self.fail_next.lock() = Some(reason.to_string());
    }

    /// Number of sockets successfully created
    pub fn created(&self) -> usize {
        self.sockets.lock().len()
    }

    /// Number of `create` calls, failed ones included
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn sockets(&self) -> Vec<MockSocket> {
        self.sockets.lock().clone()
    }

    /// The `index`-th created socket; panics if there is none
    pub fn socket(&self, index: usize) -> MockSocket {
        self.sockets
            .lock()
            .get(index)
            .cloned()
            .unwrap_or_else(|| panic!("no socket #{index} was created"))
    }

    /// The most recently created socket; panics if there is none
    pub fn latest(&self) -> MockSocket {
        self.sockets
            .lock()
            .last()
            .cloned()
            .unwrap_or_else(|| panic!("no socket was created"))
    }
}

impl TransportFactory for MockTransportFactory {
    fn create(
        &self,
        url: &str,
        callbacks: TransportCallbacks,
    ) -> Result<Box<dyn Transport>, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.fail_next.lock().take() {
            return Err(TransportError::InvalidUrl(reason));
        }

        let inner = Arc::new(SocketInner {
            url: url.to_string(),
            callbacks,
            ready: Mutex::new(ReadyState::Connecting),
            sent: Mutex::new(Vec::new()),
            close_calls: AtomicUsize::new(0),
        });
        self.sockets.lock().push(MockSocket {
            inner: Arc::clone(&inner),
        });
        Ok(Box::new(MockTransport { inner }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionCommand;
    use crate::transport::TransportEvent;
    use tokio::sync::mpsc;

    #[test]
    fn test_close_reports_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let factory = MockTransportFactory::new();
        let mut transport = factory
            .create("ws://test", TransportCallbacks::new(1, tx))
            .unwrap();

        transport.close();
        transport.close();

        let socket = factory.socket(0);
        assert_eq!(socket.close_calls(), 2);
        assert_eq!(socket.ready_state(), ReadyState::Closed);
        assert!(matches!(
            rx.try_recv(),
            Ok(ConnectionCommand::Transport {
                generation: 1,
                event: TransportEvent::Close { reason: None }
            })
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_send_requires_open() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let factory = MockTransportFactory::new();
        let mut transport = factory
            .create("ws://test", TransportCallbacks::new(1, tx))
            .unwrap();

        assert!(transport.send("{}".to_string()).is_err());
        factory.socket(0).set_ready_state(ReadyState::Open);
        assert!(transport.send("{\"a\":1}".to_string()).is_ok());
        assert_eq!(factory.socket(0).sent_raw(), vec!["{\"a\":1}".to_string()]);
    }

    #[test]
    fn test_fail_next_create() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let factory = MockTransportFactory::new();
        factory.fail_next_create("nope");

        let first = factory.create("ws://test", TransportCallbacks::new(1, tx.clone()));
        assert_eq!(first.err(), Some(TransportError::InvalidUrl("nope".to_string())));

        assert!(factory.create("ws://test", TransportCallbacks::new(2, tx)).is_ok());
        assert_eq!(factory.attempts(), 2);
        assert_eq!(factory.created(), 1);
        assert_eq!(factory.latest().generation(), 2);
    }
}
