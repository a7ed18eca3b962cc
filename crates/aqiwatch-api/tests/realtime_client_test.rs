#![allow(clippy::unwrap_used)]
// Integration tests for `RealtimeClient` against an in-process WebSocket server.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use aqiwatch_api::{RealtimeClient, RealtimeEvent, TransportConfig};

const WAIT: Duration = Duration::from_secs(5);

// ── Helpers ─────────────────────────────────────────────────────────

/// Accept one WebSocket client. Sends `greeting` frames, forwards every text
/// frame the client sends to the returned receiver, and closes the socket
/// when `close_rx` fires.
async fn spawn_server(
    greeting: Vec<String>,
) -> (Url, mpsc::UnboundedReceiver<String>, mpsc::UnboundedSender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();
    let (close_tx, mut close_rx) = mpsc::unbounded_channel::<()>();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        for frame in greeting {
            ws.send(Message::text(frame)).await.unwrap();
        }
        loop {
            tokio::select! {
                _ = close_rx.recv() => {
                    let _ = ws.close(None).await;
                    break;
                }
                msg = ws.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        let _ = seen_tx.send(text.as_str().to_owned());
                    }
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    });

    let url = Url::parse(&format!("ws://{addr}/ws")).unwrap();
    (url, seen_rx, close_tx)
}

async fn next_event(events: &mut broadcast::Receiver<RealtimeEvent>) -> RealtimeEvent {
    tokio::time::timeout(WAIT, events.recv()).await.unwrap().unwrap()
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_connect_receives_updates() {
    let update = json!({
        "type": "aqi_update",
        "subject_id": "DL-001",
        "aqi": 95.0,
        "observed_at": "2025-09-08T12:00:00Z"
    });
    let (url, _seen, _close) = spawn_server(vec![update.to_string()]).await;

    let client = RealtimeClient::new(url, &TransportConfig::default()).unwrap();
    let mut events = client.events();
    let mut updates = client.updates();

    client.connect();

    assert_eq!(next_event(&mut events).await, RealtimeEvent::Connected);
    assert!(client.is_connected());

    let received = tokio::time::timeout(WAIT, updates.recv()).await.unwrap().unwrap();
    assert_eq!(received.subject_id, "DL-001");

    client.dispose();
}

#[tokio::test]
async fn test_subscriptions_reach_server() {
    let (url, mut seen, _close) = spawn_server(Vec::new()).await;

    let client = RealtimeClient::new(url, &TransportConfig::default()).unwrap();
    let mut events = client.events();
    client.connect();
    assert_eq!(next_event(&mut events).await, RealtimeEvent::Connected);

    client.subscribe_to_station("DL-001").unwrap();
    client.subscribe_to_location(28.6, 77.3).unwrap();
    client.unsubscribe_all().unwrap();

    let first = tokio::time::timeout(WAIT, seen.recv()).await.unwrap().unwrap();
    assert_eq!(first, r#"{"type":"subscribe_station","station_id":"DL-001"}"#);

    let second: serde_json::Value =
        serde_json::from_str(&tokio::time::timeout(WAIT, seen.recv()).await.unwrap().unwrap())
            .unwrap();
    assert_eq!(second["type"], "subscribe_location");

    let third = tokio::time::timeout(WAIT, seen.recv()).await.unwrap().unwrap();
    assert_eq!(third, r#"{"type":"unsubscribe_all"}"#);

    client.dispose();
}

#[tokio::test]
async fn test_server_close_reports_disconnected() {
    let (url, _seen, close) = spawn_server(Vec::new()).await;

    let client = RealtimeClient::new(url, &TransportConfig::default()).unwrap();
    let mut events = client.events();
    client.connect();
    assert_eq!(next_event(&mut events).await, RealtimeEvent::Connected);

    close.send(()).unwrap();

    assert_eq!(next_event(&mut events).await, RealtimeEvent::Disconnected);
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_dispose_silences_session() {
    let (url, _seen, _close) = spawn_server(Vec::new()).await;

    let client = RealtimeClient::new(url, &TransportConfig::default()).unwrap();
    let mut events = client.events();
    client.connect();
    assert_eq!(next_event(&mut events).await, RealtimeEvent::Connected);

    client.dispose();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(events.try_recv().is_err(), "no event may follow dispose");
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_disconnect_is_silent_and_reconnectable() {
    let (url, _seen, _close) = spawn_server(Vec::new()).await;

    let client = RealtimeClient::new(url, &TransportConfig::default()).unwrap();
    let mut events = client.events();
    client.connect();
    assert_eq!(next_event(&mut events).await, RealtimeEvent::Connected);

    client.disconnect();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(events.try_recv().is_err(), "an abandoned session publishes nothing");
    assert!(!client.is_connected());
    assert!(client.subscribe_to_station("DL-001").is_err());

    // A handshake that never completes can be abandoned the same way.
    let pending = RealtimeClient::new(
        Url::parse("ws://10.255.255.1:9/ws").unwrap(),
        &TransportConfig::default(),
    )
    .unwrap();
    let mut pending_events = pending.events();
    pending.connect();
    pending.disconnect();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(pending_events.try_recv().is_err());
    pending.dispose();
    client.dispose();
}
