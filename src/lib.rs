//! synclink - connection actor for realtime sync clients
//!
//! Owns one persistent socket to a backend and drives it through its
//! lifecycle: establish, authenticate, degrade, reconnect. The lifecycle is
//! exposed as a stream of [`ConnectionEvent`]s.
//!
//! # Overview
//!
//! - [`connection`]: the actor, its handle, state records and backoff policy
//! - [`transport`]: the socket abstraction and a tokio-tungstenite implementation
//! - [`config`]: TOML configuration
//! - [`testing`]: mock transports and a virtual clock
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use synclink::connection::{ActorSettings, ConnectionActor, TokioScheduler};
//! use synclink::transport::websocket::WebSocketTransportFactory;
//! use serde_json::json;
//!
//! # async fn demo() -> synclink::ConnectionResult<()> {
//! let handle = ConnectionActor::spawn(
//!     ActorSettings::new("wss://api.example.com/runtime/session?app_id=my-app"),
//!     Arc::new(WebSocketTransportFactory::new()),
//!     Arc::new(TokioScheduler::new()),
//! );
//! let mut events = handle.subscribe();
//! handle.start()?;
//!
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! handle.send("event-1", json!({"op": "add-query", "q": {}}))?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod observability;
pub mod testing;
pub mod transport;

pub use config::{ClientConfig, ConfigError};
pub use connection::{
    ActorSettings, ConnectionActor, ConnectionEvent, ConnectionHandle, ConnectionState,
    ConnectionStatus, Subscription,
};
pub use error::{ConnectionError, ConnectionResult};
