//! Test helpers and utilities for integration tests

use std::sync::Arc;
use std::time::Duration;
use synclink::config::{ClientConfig, ConnectionSection};
use synclink::connection::backoff::ReconnectPolicy;
use synclink::connection::{
    ActorSettings, ConnectionActor, ConnectionHandle, ConnectionState, Subscription, WireProtocol,
};
use synclink::testing::{ManualScheduler, MockTransportFactory};

#[allow(dead_code)]
pub const TEST_URL: &str = "ws://localhost:8888/runtime/session?app_id=test-app";

/// Create a test configuration for integration tests
#[allow(dead_code)]
pub fn test_config() -> ClientConfig {
    ClientConfig {
        connection: ConnectionSection {
            websocket_uri: "ws://localhost:8888/runtime/session".to_string(),
            app_id: "test-app".to_string(),
            app_id_param: "app_id".to_string(),
        },
        protocol: WireProtocol::default(),
        reconnect: ReconnectPolicy::default(),
    }
}

/// An actor wired to a mock factory and a virtual clock, with one subscriber
/// registered before anything else happens
#[allow(dead_code)]
pub struct TestClient {
    pub handle: ConnectionHandle,
    pub factory: Arc<MockTransportFactory>,
    pub clock: Arc<ManualScheduler>,
    pub events: Subscription,
}

#[allow(dead_code)]
impl TestClient {
    pub fn spawn() -> Self {
        Self::spawn_with(ActorSettings::new(TEST_URL))
    }

    pub fn spawn_with(settings: ActorSettings) -> Self {
        let factory = Arc::new(MockTransportFactory::new());
        let clock = Arc::new(ManualScheduler::new());
        let handle = ConnectionActor::spawn(settings, factory.clone(), clock.clone());
        let events = handle.subscribe();
        Self {
            handle,
            factory,
            clock,
            events,
        }
    }

    /// Wait until everything posted so far has been processed
    pub async fn settle(&self) -> ConnectionState {
        self.handle.snapshot().await
    }

    /// Advance the virtual clock, then wait for the fired timers to be processed
    pub async fn advance(&self, ms: u64) -> ConnectionState {
        self.clock.advance(Duration::from_millis(ms));
        self.settle().await
    }

    /// Start and bring the first transport to `authenticated`
    pub async fn connect_authenticated(&self) -> ConnectionState {
        self.handle.start().unwrap();
        self.settle().await;
        let socket = self.factory.latest();
        socket.simulate_open();
        socket.simulate_message(&serde_json::json!({"op": "init-ok"}));
        self.settle().await
    }
}
