//! The connection actor
//!
//! One tokio task drains one mailbox. Control messages from callers,
//! callbacks from transports and reconnect timers all arrive as
//! [`ConnectionCommand`]s, so every transition runs on a single logical
//! thread and never blocks. The decision logic lives in [`super::backoff`]
//! and [`super::state`]; this module performs the side effects.

use super::backoff::{self, ReconnectDecision, ReconnectPolicy, TimerDecision};
use super::events::{ConnectionEvent, Subscribers};
use super::handle::ConnectionHandle;
use super::protocol::WireProtocol;
use super::scheduler::{Scheduler, TimerHandle};
use super::state::{ConnectionState, ConnectionStatus};
use crate::config::{ClientConfig, ConfigError};
use crate::connection_span;
use crate::transport::{ReadyState, Transport, TransportCallbacks, TransportEvent, TransportFactory};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn, Instrument};

/// Messages accepted by the actor's mailbox
#[derive(Debug)]
pub enum ConnectionCommand {
    Start,
    Send {
        correlation_id: String,
        payload: Value,
    },
    NetworkOnline,
    NetworkOffline,
    AuthHandshakeOk {
        generation: u64,
        payload: Value,
    },
    Shutdown,
    Subscribe(mpsc::UnboundedSender<ConnectionEvent>),
    /// Barrier: replies with the state once everything posted earlier is processed
    Snapshot(oneshot::Sender<ConnectionState>),
    /// A callback of the transport created with `generation`
    Transport {
        generation: u64,
        event: TransportEvent,
    },
    ReconnectTimerFired {
        timer_id: u64,
    },
}

/// Everything the actor needs besides its collaborators
#[derive(Debug, Clone, PartialEq)]
pub struct ActorSettings {
    /// Name used in log fields
    pub name: String,
    /// Full connection URL handed to the transport factory
    pub url: String,
    pub protocol: WireProtocol,
    pub reconnect: ReconnectPolicy,
}

impl ActorSettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            name: "connection".to_string(),
            url: url.into(),
            protocol: WireProtocol::default(),
            reconnect: ReconnectPolicy::default(),
        }
    }

    /// Validate `config` and derive settings from it
    pub fn from_config(config: &ClientConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let url = config.connection.connection_url()?;
        Ok(Self {
            name: config.connection.app_id.clone(),
            url: url.to_string(),
            protocol: config.protocol.clone(),
            reconnect: config.reconnect,
        })
    }
}

struct PendingTimer {
    id: u64,
    handle: Box<dyn TimerHandle>,
}

/// State and side effects of one connection
///
/// Only reachable through its mailbox once spawned; see [`ConnectionHandle`].
pub struct ConnectionActor {
    settings: ActorSettings,
    state: ConnectionState,
    transport: Option<Box<dyn Transport>>,
    pending_timer: Option<PendingTimer>,
    next_timer_id: u64,
    factory: Arc<dyn TransportFactory>,
    scheduler: Arc<dyn Scheduler>,
    mailbox: mpsc::UnboundedSender<ConnectionCommand>,
    subscribers: Subscribers,
    state_tx: watch::Sender<ConnectionState>,
}

impl ConnectionActor {
    /// Spawn an actor on the current tokio runtime
    pub fn spawn(
        settings: ActorSettings,
        factory: Arc<dyn TransportFactory>,
        scheduler: Arc<dyn Scheduler>,
    ) -> ConnectionHandle {
        let (actor, mailbox_rx, state_rx) = Self::new(settings, factory, scheduler);
        let handle = ConnectionHandle::new(actor.mailbox.clone(), state_rx);
        let span = connection_span!(actor.settings.name);
        tokio::spawn(actor.run(mailbox_rx).instrument(span));
        handle
    }

    /// Spawn an actor configured from a validated [`ClientConfig`]
    pub fn spawn_from_config(
        config: &ClientConfig,
        factory: Arc<dyn TransportFactory>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Result<ConnectionHandle, ConfigError> {
        let settings = ActorSettings::from_config(config)?;
        Ok(Self::spawn(settings, factory, scheduler))
    }

    pub(crate) fn new(
        settings: ActorSettings,
        factory: Arc<dyn TransportFactory>,
        scheduler: Arc<dyn Scheduler>,
    ) -> (
        Self,
        mpsc::UnboundedReceiver<ConnectionCommand>,
        watch::Receiver<ConnectionState>,
    ) {
        let (mailbox, mailbox_rx) = mpsc::unbounded_channel();
        let state = ConnectionState::initial();
        let (state_tx, state_rx) = watch::channel(state.clone());
        let actor = Self {
            settings,
            state,
            transport: None,
            pending_timer: None,
            next_timer_id: 0,
            factory,
            scheduler,
            mailbox,
            subscribers: Subscribers::default(),
            state_tx,
        };
        (actor, mailbox_rx, state_rx)
    }

    async fn run(mut self, mut mailbox_rx: mpsc::UnboundedReceiver<ConnectionCommand>) {
        info!(url = %self.settings.url, "connection actor started");
        while let Some(command) = mailbox_rx.recv().await {
            self.handle(command);
            if self.state.is_shut_down {
                break;
            }
        }
        info!(generation = self.state.generation, "connection actor stopped");
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Process one mailbox message to completion
    pub(crate) fn handle(&mut self, command: ConnectionCommand) {
        match command {
            ConnectionCommand::Start => self.start(),
            ConnectionCommand::Send {
                correlation_id,
                payload,
            } => self.send(&correlation_id, payload),
            ConnectionCommand::NetworkOnline => self.network_online(),
            ConnectionCommand::NetworkOffline => self.network_offline(),
            ConnectionCommand::AuthHandshakeOk {
                generation,
                payload,
            } => {
                debug!(
                    generation,
                    op = self.settings.protocol.op(&payload).unwrap_or("-"),
                    "handshake signal received"
                );
                self.authenticate(generation)
            }
            ConnectionCommand::Shutdown => self.shutdown(),
            ConnectionCommand::Subscribe(sender) => {
                self.subscribers.add(sender);
                debug!(subscribers = self.subscribers.len(), "subscriber registered");
            }
            ConnectionCommand::Snapshot(reply) => {
                let _ = reply.send(self.state.clone());
            }
            ConnectionCommand::Transport { generation, event } => {
                self.on_transport_event(generation, event)
            }
            ConnectionCommand::ReconnectTimerFired { timer_id } => self.on_timer_fired(timer_id),
        }
    }

    fn start(&mut self) {
        if self.state.is_shut_down {
            debug!("start ignored: actor is shut down");
            return;
        }

        if let Some(current) = self.transport.as_mut() {
            match current.ready_state() {
                ReadyState::Connecting => {
                    debug!(
                        generation = self.state.generation,
                        "start ignored: transport already connecting"
                    );
                    return;
                }
                ReadyState::Open => {
                    info!(
                        generation = self.state.generation,
                        "closing open transport before replacing it"
                    );
                    current.close();
                }
                ReadyState::Closing | ReadyState::Closed => {}
            }
        }

        if let Some(timer) = self.pending_timer.take() {
            timer.handle.cancel();
            let delay_ms = self.settings.reconnect.next_delay(self.state.reconnect_delay_ms);
            self.commit(
                self.state
                    .with_reconnect_pending(false)
                    .with_reconnect_delay(delay_ms),
            );
        }

        let generation = self.state.generation + 1;
        let callbacks = TransportCallbacks::new(generation, self.mailbox.clone());
        match self.factory.create(&self.settings.url, callbacks) {
            Ok(transport) => {
                info!(generation, "transport created");
                // Replacing drops the superseded transport
                self.transport = Some(transport);
                self.announce(self.state.with_transport(generation));
            }
            Err(e) => {
                warn!(generation, error = %e, "failed to create transport");
                self.transport = None;
                self.announce(self.state.with_failed_transport(generation, e.to_string()));
                self.schedule_reconnect(self.state.reconnect_delay_ms);
            }
        }
    }

    fn send(&mut self, correlation_id: &str, payload: Value) {
        let Some(transport) = self.transport.as_mut() else {
            debug!(correlation_id, "send dropped: no transport");
            return;
        };
        let ready = transport.ready_state();
        if ready != ReadyState::Open {
            debug!(correlation_id, ready_state = ?ready, "send dropped: transport not open");
            return;
        }

        let frame = match self.settings.protocol.encode_outbound(correlation_id, payload) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(correlation_id, error = %e, "send dropped: payload cannot be stamped");
                return;
            }
        };

        debug!(generation = self.state.generation, correlation_id, "sending");
        if let Err(e) = transport.send(frame) {
            warn!(correlation_id, error = %e, "transport rejected frame");
        }
    }

    fn network_online(&mut self) {
        info!("network online");
        self.commit(self.state.with_network_online(true));
        self.start();
    }

    fn network_offline(&mut self) {
        info!("network offline");
        self.announce(
            self.state
                .with_network_online(false)
                .with_status(ConnectionStatus::Closed, None),
        );
    }

    fn authenticate(&mut self, generation: u64) {
        if !self.state.is_current(generation) {
            debug!(generation, "handshake ignored: stale transport");
            return;
        }
        match self.state.status {
            ConnectionStatus::Authenticated => {
                debug!(generation, "handshake ignored: already authenticated");
            }
            status if status.accepts_handshake() => {
                info!(generation, "session authenticated");
                self.announce(self.state.authenticated());
            }
            status => {
                debug!(generation, %status, "handshake ignored: transport not open");
            }
        }
    }

    fn shutdown(&mut self) {
        if self.state.is_shut_down {
            return;
        }
        info!(generation = self.state.generation, "shutting down");
        if let Some(timer) = self.pending_timer.take() {
            timer.handle.cancel();
        }
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        self.announce(self.state.shut_down());
    }

    fn on_transport_event(&mut self, generation: u64, event: TransportEvent) {
        if !self.state.is_current(generation) {
            debug!(
                generation,
                current = ?self.state.transport_generation,
                ?event,
                "dropping event from stale transport"
            );
            return;
        }

        match event {
            TransportEvent::Open => {
                info!(generation, "transport open");
                self.announce(self.state.with_status(ConnectionStatus::Opened, None));
            }
            TransportEvent::Message(raw) => self.on_message(generation, &raw),
            TransportEvent::Error(error) => {
                warn!(generation, %error, "transport error");
                self.commit(self.state.with_transport_error(error));
            }
            TransportEvent::Close { reason } => self.on_close(generation, reason),
        }
    }

    fn on_message(&mut self, generation: u64, raw: &str) {
        let payload = match self.settings.protocol.decode_inbound(raw) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(generation, error = %e, "dropping undecodable frame");
                return;
            }
        };

        let handshake = self.settings.protocol.is_handshake_ok(&payload);
        debug!(
            generation,
            op = self.settings.protocol.op(&payload).unwrap_or("-"),
            "message received"
        );
        self.subscribers.publish(ConnectionEvent::MessageReceived {
            transport_generation: generation,
            payload,
        });

        if handshake {
            self.authenticate(generation);
        }
    }

    fn on_close(&mut self, generation: u64, reason: Option<String>) {
        self.transport = None;
        self.announce(self.state.with_transport_closed(reason));
        info!(generation, error = ?self.state.last_error, "transport closed");

        match backoff::on_transport_closed(&self.state) {
            ReconnectDecision::Schedule { delay_ms } => self.schedule_reconnect(delay_ms),
            ReconnectDecision::AbortShutDown => {}
        }
    }

    fn schedule_reconnect(&mut self, delay_ms: u64) {
        if let Some(previous) = self.pending_timer.take() {
            previous.handle.cancel();
        }

        self.next_timer_id += 1;
        let timer_id = self.next_timer_id;
        let mailbox = self.mailbox.clone();
        let handle = self.scheduler.schedule(
            Duration::from_millis(delay_ms),
            Box::new(move || {
                let _ = mailbox.send(ConnectionCommand::ReconnectTimerFired { timer_id });
            }),
        );

        info!(delay_ms, timer_id, "reconnect scheduled");
        self.pending_timer = Some(PendingTimer {
            id: timer_id,
            handle,
        });
        self.commit(self.state.with_reconnect_pending(true));
    }

    fn on_timer_fired(&mut self, timer_id: u64) {
        match &self.pending_timer {
            Some(timer) if timer.id == timer_id => {}
            _ => {
                debug!(timer_id, "ignoring cancelled reconnect timer");
                return;
            }
        }
        self.pending_timer = None;

        let delay_ms = self.settings.reconnect.next_delay(self.state.reconnect_delay_ms);
        self.commit(
            self.state
                .with_reconnect_pending(false)
                .with_reconnect_delay(delay_ms),
        );

        match backoff::on_timer_fired(&self.state) {
            TimerDecision::Start => self.start(),
            TimerDecision::SkipOffline => info!("reconnect deferred until network is online"),
            TimerDecision::AbortShutDown => {}
        }
    }

    /// Replace the state without publishing a status event
    fn commit(&mut self, next: ConnectionState) {
        self.state = next;
        self.state_tx.send_replace(self.state.clone());
    }

    /// Replace the state and publish its status
    fn announce(&mut self, next: ConnectionState) {
        self.commit(next);
        self.subscribers.publish(ConnectionEvent::StatusChanged {
            status: self.state.status,
            generation: self.state.generation,
            error: self.state.last_error.clone(),
        });
    }
}
