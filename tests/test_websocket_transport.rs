//! WebSocket transport tests against a local tokio-tungstenite server

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use synclink::connection::{
    ActorSettings, ConnectionActor, ConnectionEvent, ConnectionHandle, ConnectionStatus,
    Subscription, TokioScheduler,
};
use synclink::transport::websocket::WebSocketTransportFactory;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{accept_async, accept_hdr_async, tungstenite::Message};

const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug)]
enum ServerEvent {
    Connected { conn_id: usize, path: String },
    Text { conn_id: usize, text: String },
}

/// Every connection receives a handshake-ok (text) and a refresh-ok (binary),
/// then is closed by the server after the first text frame it receives.
async fn spawn_ws_server() -> (SocketAddr, mpsc::UnboundedReceiver<ServerEvent>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut conn_id = 0usize;
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            conn_id += 1;
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut path = String::new();
                let callback =
                    |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
                        path = request.uri().to_string();
                        Ok(response)
                    };
                let Ok(mut ws) = accept_hdr_async(stream, callback).await else {
                    return;
                };
                let _ = tx.send(ServerEvent::Connected { conn_id, path });

                let _ = ws
                    .send(Message::Text(json!({"op": "init-ok"}).to_string()))
                    .await;
                let _ = ws
                    .send(Message::Binary(
                        json!({"op": "refresh-ok"}).to_string().into_bytes(),
                    ))
                    .await;

                while let Some(Ok(message)) = ws.next().await {
                    if let Message::Text(text) = message {
                        let _ = tx.send(ServerEvent::Text { conn_id, text });
                        let _ = ws.close(None).await;
                        break;
                    }
                }
            });
        }
    });

    (addr, rx)
}

fn spawn_client(url: String) -> (ConnectionHandle, Subscription) {
    let handle = ConnectionActor::spawn(
        ActorSettings::new(url),
        Arc::new(WebSocketTransportFactory::new()),
        Arc::new(TokioScheduler::new()),
    );
    let events = handle.subscribe();
    (handle, events)
}

async fn next_event_matching(
    events: &mut Subscription,
    mut predicate: impl FnMut(&ConnectionEvent) -> bool,
) -> ConnectionEvent {
    timeout(WAIT, async {
        loop {
            let event = events.recv().await.expect("actor stopped");
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

async fn next_status(events: &mut Subscription, status: ConnectionStatus) -> ConnectionEvent {
    next_event_matching(events, |e| e.status() == Some(status)).await
}

async fn next_server_event(server: &mut mpsc::UnboundedReceiver<ServerEvent>) -> ServerEvent {
    timeout(WAIT, server.recv())
        .await
        .expect("timed out waiting for server")
        .expect("server stopped")
}

#[tokio::test]
async fn test_handshake_send_and_server_close() {
    let (addr, mut server) = spawn_ws_server().await;
    let (handle, mut events) = spawn_client(format!("ws://{addr}/runtime/session?app_id=test-app"));
    handle.start().unwrap();

    match next_server_event(&mut server).await {
        ServerEvent::Connected { conn_id, path } => {
            assert_eq!(conn_id, 1);
            assert_eq!(path, "/runtime/session?app_id=test-app");
        }
        other => panic!("unexpected server event: {other:?}"),
    }

    next_status(&mut events, ConnectionStatus::Authenticated).await;
    let refresh = next_event_matching(&mut events, |e| {
        matches!(e, ConnectionEvent::MessageReceived { payload, .. } if payload["op"] == "refresh-ok")
    })
    .await;
    assert_eq!(
        refresh,
        ConnectionEvent::MessageReceived {
            transport_generation: 1,
            payload: json!({"op": "refresh-ok"}),
        }
    );

    handle.send("e1", json!({"op": "add-query", "q": {}})).unwrap();
    match next_server_event(&mut server).await {
        ServerEvent::Text { conn_id, text } => {
            assert_eq!(conn_id, 1);
            let frame: Value = serde_json::from_str(&text).unwrap();
            assert_eq!(frame, json!({"client-event-id": "e1", "op": "add-query", "q": {}}));
        }
        other => panic!("unexpected server event: {other:?}"),
    }

    next_status(&mut events, ConnectionStatus::Closed).await;

    // Authenticated before the close, so the reconnect delay is zero
    match next_server_event(&mut server).await {
        ServerEvent::Connected { conn_id, .. } => assert_eq!(conn_id, 2),
        other => panic!("unexpected server event: {other:?}"),
    }
    let reopened = next_status(&mut events, ConnectionStatus::Opened).await;
    assert!(matches!(
        reopened,
        ConnectionEvent::StatusChanged { generation: 2, .. }
    ));

    handle.shutdown().unwrap();
    let state = handle.snapshot().await;
    assert!(state.is_shut_down);
}

#[tokio::test]
async fn test_refused_connection_reports_error_on_close() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (handle, mut events) = spawn_client(format!("ws://{addr}/session?app_id=test-app"));
    handle.start().unwrap();

    match next_status(&mut events, ConnectionStatus::Closed).await {
        ConnectionEvent::StatusChanged {
            generation, error, ..
        } => {
            assert_eq!(generation, 1);
            assert!(error.is_some());
        }
        other => panic!("unexpected event: {other:?}"),
    }

    handle.shutdown().unwrap();
}

#[tokio::test]
async fn test_non_websocket_url_is_errored() {
    let (handle, mut events) = spawn_client("http://127.0.0.1:1/session".to_string());
    handle.start().unwrap();

    match next_status(&mut events, ConnectionStatus::Errored).await {
        ConnectionEvent::StatusChanged { error, .. } => {
            assert_eq!(error.as_deref(), Some("Unsupported URL scheme: http"));
        }
        other => panic!("unexpected event: {other:?}"),
    }

    handle.shutdown().unwrap();
    assert!(handle.snapshot().await.is_shut_down);
}

#[tokio::test]
async fn test_shutdown_while_connecting_closes_socket() {
    // Accepts TCP but never completes the websocket handshake
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _hold = tokio::spawn(async move {
        let mut streams = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            streams.push(stream);
        }
    });

    let (handle, mut events) = spawn_client(format!("ws://{addr}/session"));
    handle.start().unwrap();
    next_status(&mut events, ConnectionStatus::Connecting).await;

    handle.shutdown().unwrap();
    next_status(&mut events, ConnectionStatus::Closed).await;
    assert!(timeout(WAIT, events.recv()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_accept_async_server_receives_plain_frames() {
    // Transport-level check without the handshake op: nothing authenticates
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await {
            if let Ok(mut ws) = accept_async(stream).await {
                let _ = ws.send(Message::Text("not json".to_string())).await;
                let _ = ws.send(Message::Text(json!({"op": "hello"}).to_string())).await;
                while ws.next().await.is_some() {}
            }
        }
    });

    let (handle, mut events) = spawn_client(format!("ws://{addr}/session"));
    handle.start().unwrap();

    let event = next_event_matching(&mut events, |e| {
        matches!(e, ConnectionEvent::MessageReceived { .. })
    })
    .await;
    assert_eq!(
        event,
        ConnectionEvent::MessageReceived {
            transport_generation: 1,
            payload: json!({"op": "hello"}),
        }
    );
    assert_eq!(handle.snapshot().await.status, ConnectionStatus::Opened);

    handle.shutdown().unwrap();
}

/// Serves one connection: sends `frames`, then closes with `close`
async fn spawn_scripted_server(frames: Vec<Message>, close: CloseFrame<'static>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await {
            if let Ok(mut ws) = accept_async(stream).await {
                for frame in frames {
                    let _ = ws.send(frame).await;
                }
                let _ = ws.close(Some(close)).await;
                while ws.next().await.is_some() {}
            }
        }
    });
    addr
}

#[tokio::test]
async fn test_server_close_reason_is_reported() {
    let addr = spawn_scripted_server(
        vec![Message::Text(json!({"op": "init-ok"}).to_string())],
        CloseFrame {
            code: CloseCode::Error,
            reason: "session rejected".into(),
        },
    )
    .await;

    let (handle, mut events) = spawn_client(format!("ws://{addr}/session"));
    handle.start().unwrap();
    next_status(&mut events, ConnectionStatus::Authenticated).await;

    match next_status(&mut events, ConnectionStatus::Closed).await {
        ConnectionEvent::StatusChanged {
            generation, error, ..
        } => {
            assert_eq!(generation, 1);
            assert_eq!(error.as_deref(), Some("1011: session rejected"));
        }
        other => panic!("unexpected event: {other:?}"),
    }

    handle.shutdown().unwrap();
}

#[tokio::test]
async fn test_invalid_utf8_binary_frame_is_dropped() {
    let addr = spawn_scripted_server(
        vec![
            Message::Binary(vec![0xff, 0xfe, 0xfd]),
            Message::Binary(json!({"op": "hello"}).to_string().into_bytes()),
        ],
        CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        },
    )
    .await;

    let (handle, mut events) = spawn_client(format!("ws://{addr}/session"));
    handle.start().unwrap();

    let event = next_event_matching(&mut events, |e| {
        matches!(e, ConnectionEvent::MessageReceived { .. })
    })
    .await;
    assert_eq!(
        event,
        ConnectionEvent::MessageReceived {
            transport_generation: 1,
            payload: json!({"op": "hello"}),
        }
    );

    match next_status(&mut events, ConnectionStatus::Closed).await {
        ConnectionEvent::StatusChanged { error, .. } => {
            let error = error.expect("decode error attached to close");
            assert!(error.contains("not valid UTF-8"), "error: {error}");
        }
        other => panic!("unexpected event: {other:?}"),
    }

    handle.shutdown().unwrap();
}
