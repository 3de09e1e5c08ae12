//! WebSocket transport built on tokio-tungstenite
//!
//! Each transport owns one IO task. The task connects, reports `open`,
//! forwards inbound frames, writes queued outbound frames and always ends by
//! reporting `close`, whatever the reason the socket went away.

use super::{ReadyState, Transport, TransportCallbacks, TransportError, TransportFactory};
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};
use url::Url;

/// Factory producing [`WebSocketTransport`]s
///
/// Must be used from within a tokio runtime; the connection actor always is.
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransportFactory;

impl WebSocketTransportFactory {
    pub fn new() -> Self {
        Self
    }
}

impl TransportFactory for WebSocketTransportFactory {
    fn create(
        &self,
        url: &str,
        callbacks: TransportCallbacks,
    ) -> Result<Box<dyn Transport>, TransportError> {
        let parsed =
            Url::parse(url).map_err(|e| TransportError::InvalidUrl(format!("{url}: {e}")))?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(TransportError::UnsupportedScheme(parsed.scheme().to_string()));
        }

        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| TransportError::NoRuntime)?;

        let ready = Arc::new(AtomicU8::new(ReadyState::Connecting as u8));
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = watch::channel(false);

        let task = runtime.spawn(run_socket(
            parsed.to_string(),
            Arc::clone(&ready),
            outbound_rx,
            close_rx,
            callbacks,
        ));

        Ok(Box::new(WebSocketTransport {
            ready,
            outbound_tx,
            close_tx,
            _task: task,
        }))
    }
}

/// A single websocket connection driven by a background IO task
pub struct WebSocketTransport {
    ready: Arc<AtomicU8>,
    outbound_tx: mpsc::UnboundedSender<String>,
    close_tx: watch::Sender<bool>,
    _task: JoinHandle<()>,
}

impl Transport for WebSocketTransport {
    fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.ready.load(Ordering::Acquire))
    }

    fn send(&mut self, payload: String) -> Result<(), TransportError> {
        let state = self.ready_state();
        if state != ReadyState::Open {
            return Err(TransportError::NotOpen(state));
        }
        self.outbound_tx
            .send(payload)
            .map_err(|_| TransportError::Closed)
    }

    fn close(&mut self) {
        if self.ready_state() == ReadyState::Closed {
            return;
        }
        self.ready
            .store(ReadyState::Closing as u8, Ordering::Release);
        let _ = self.close_tx.send(true);
    }
}

/// Resolves once a close is requested or the owning transport is dropped
async fn close_requested(close_rx: &mut watch::Receiver<bool>) {
    loop {
        if *close_rx.borrow() {
            return;
        }
        if close_rx.changed().await.is_err() {
            return;
        }
    }
}

async fn run_socket(
    url: String,
    ready: Arc<AtomicU8>,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
    mut close_rx: watch::Receiver<bool>,
    callbacks: TransportCallbacks,
) {
    let generation = callbacks.generation();

    let connected = tokio::select! {
        result = connect_async(url.as_str()) => result,
        _ = close_requested(&mut close_rx) => {
            debug!(generation, "websocket closed before connecting");
            finish(&ready, &callbacks, None);
            return;
        }
    };

    let stream = match connected {
        Ok((stream, _response)) => stream,
        Err(e) => {
            warn!(generation, "websocket connect failed: {}", e);
            callbacks.on_error(e.to_string());
            finish(&ready, &callbacks, None);
            return;
        }
    };

    ready.store(ReadyState::Open as u8, Ordering::Release);
    callbacks.on_open();

    let (mut sink, mut source) = stream.split();

    let reason = loop {
        tokio::select! {
            _ = close_requested(&mut close_rx) => {
                ready.store(ReadyState::Closing as u8, Ordering::Release);
                if let Err(e) = sink.send(Message::Close(None)).await {
                    debug!(generation, "websocket close frame not delivered: {}", e);
                }
                break None;
            }
            Some(payload) = outbound_rx.recv() => {
                if let Err(e) = sink.send(Message::Text(payload)).await {
                    callbacks.on_error(e.to_string());
                    break None;
                }
            }
            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => callbacks.on_message(text),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => callbacks.on_message(text),
                    Err(e) => {
                        warn!(generation, "dropping binary frame: {}", e);
                        callbacks.on_error(format!("binary frame is not valid UTF-8: {e}"));
                    }
                },
                Some(Ok(Message::Close(frame))) => break close_reason(frame),
                None => break None,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    callbacks.on_error(e.to_string());
                    break None;
                }
            }
        }
    };

    finish(&ready, &callbacks, reason);
}

/// Reason carried by a peer close frame; a normal close has none
fn close_reason(frame: Option<CloseFrame<'_>>) -> Option<String> {
    let frame = frame?;
    if frame.code == CloseCode::Normal {
        return None;
    }
    let code = u16::from(frame.code);
    if frame.reason.is_empty() {
        Some(format!("closed with code {code}"))
    } else {
        Some(format!("{code}: {}", frame.reason))
    }
}

fn finish(ready: &AtomicU8, callbacks: &TransportCallbacks, reason: Option<String>) {
    ready.store(ReadyState::Closed as u8, Ordering::Release);
    callbacks.on_close(reason);
}
