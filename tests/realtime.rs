//! Integration tests for the realtime channel.
//!
//! Each test spins up a stub cable endpoint on a random port and drives a
//! real client against it, checking the subscribe handshake, presence
//! heartbeat, inbound demux, and teardown behavior over an actual socket.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing_subscriber::EnvFilter;

use beacon::config::ReconnectPolicy;
use beacon::realtime::{ChannelEvent, RealtimeClient, RealtimeConfig};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}

async fn bind_stub() -> (TcpListener, String) {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, format!("ws://127.0.0.1:{port}"))
}

async fn accept_ws(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (stream, _) = timeout(Duration::from_secs(5), listener.accept())
        .await
        .expect("timed out waiting for connection")
        .expect("accept failed");
    tokio_tungstenite::accept_async(stream)
        .await
        .expect("websocket handshake failed")
}

async fn next_text(ws: &mut WebSocketStream<TcpStream>) -> Value {
    loop {
        let frame = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream closed")
            .expect("read error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

fn spawn_client(
    ws_url: &str,
    reconnect: ReconnectPolicy,
) -> (RealtimeClient, mpsc::UnboundedReceiver<ChannelEvent>) {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let client = RealtimeClient::spawn(
        RealtimeConfig {
            ws_url: ws_url.to_string(),
            pubsub_token: "tok-abc".to_string(),
            account_id: 3,
            reconnect,
        },
        events_tx,
    );
    (client, events_rx)
}

#[tokio::test]
async fn subscribe_then_initial_presence_on_connect() {
    let (listener, url) = bind_stub().await;
    let (_client, _events) = spawn_client(&url, ReconnectPolicy::disabled());

    let mut ws = accept_ws(&listener).await;

    let subscribe = next_text(&mut ws).await;
    assert_eq!(subscribe["command"], "subscribe");
    let identifier: Value =
        serde_json::from_str(subscribe["identifier"].as_str().unwrap()).unwrap();
    assert_eq!(identifier["channel"], "RoomChannel");
    assert_eq!(identifier["pubsub_token"], "tok-abc");
    assert_eq!(identifier["account_id"], 3);

    // The first heartbeat fires right after the subscribe, carrying the same
    // identifier.
    let presence = next_text(&mut ws).await;
    assert_eq!(presence["command"], "message");
    assert_eq!(presence["identifier"], subscribe["identifier"]);
    let data: Value = serde_json::from_str(presence["data"].as_str().unwrap()).unwrap();
    assert_eq!(data["action"], "update_presence");
}

#[tokio::test]
async fn message_created_frames_reach_the_consumer() {
    let (listener, url) = bind_stub().await;
    let (client, mut events) = spawn_client(&url, ReconnectPolicy::disabled());

    let mut ws = accept_ws(&listener).await;
    let _subscribe = next_text(&mut ws).await;

    ws.send(Message::Text(
        json!({
            "message": {
                "event": "message.created",
                "data": {
                    "id": 42,
                    "content": "hello from an agent",
                    "message_type": 1,
                    "created_at": 1_700_000_000u64,
                    "sender": { "id": 7, "name": "Ana" }
                }
            }
        })
        .to_string()
        .into(),
    ))
    .await
    .unwrap();

    let event = timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed");
    match event {
        ChannelEvent::Message(raw) => {
            assert_eq!(raw.id, Some(42));
            assert_eq!(raw.content.as_deref(), Some("hello from an agent"));
        }
        other => panic!("expected a message event, got {other:?}"),
    }
    assert!(client.is_connected());
}

#[tokio::test]
async fn presence_update_frames_reach_the_consumer() {
    let (listener, url) = bind_stub().await;
    let (_client, mut events) = spawn_client(&url, ReconnectPolicy::disabled());

    let mut ws = accept_ws(&listener).await;
    let _subscribe = next_text(&mut ws).await;

    ws.send(Message::Text(
        json!({
            "message": {
                "event": "presence.update",
                "data": { "users": { "7": "online", "9": "offline" } }
            }
        })
        .to_string()
        .into(),
    ))
    .await
    .unwrap();

    let event = timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed");
    match event {
        ChannelEvent::Presence(users) => {
            assert_eq!(users.len(), 2);
        }
        other => panic!("expected a presence event, got {other:?}"),
    }
}

#[tokio::test]
async fn protocol_noise_is_dropped_silently() {
    let (listener, url) = bind_stub().await;
    let (_client, mut events) = spawn_client(&url, ReconnectPolicy::disabled());

    let mut ws = accept_ws(&listener).await;
    let _subscribe = next_text(&mut ws).await;

    // Cable chatter the widget must ignore, then one real message.
    for noise in [
        json!({ "type": "welcome" }).to_string(),
        json!({ "type": "ping", "message": 1_700_000_123u64 }).to_string(),
        json!({ "identifier": "x", "type": "confirm_subscription" }).to_string(),
        "not json".to_string(),
    ] {
        ws.send(Message::Text(noise.into())).await.unwrap();
    }
    ws.send(Message::Text(
        json!({
            "message": {
                "event": "message.created",
                "data": { "id": 1, "created_at": 1000 }
            }
        })
        .to_string()
        .into(),
    ))
    .await
    .unwrap();

    let event = timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed");
    assert!(matches!(event, ChannelEvent::Message(raw) if raw.id == Some(1)));
}

#[tokio::test]
async fn disconnect_sends_a_normal_close() {
    let (listener, url) = bind_stub().await;
    let (client, _events) = spawn_client(&url, ReconnectPolicy::disabled());

    let mut ws = accept_ws(&listener).await;
    let _subscribe = next_text(&mut ws).await;
    let _presence = next_text(&mut ws).await;

    client.disconnect();

    let frame = timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(frame))) => return frame,
                Some(Ok(_)) => continue,
                other => panic!("expected a close frame, got {other:?}"),
            }
        }
    })
    .await
    .expect("timed out waiting for close");

    let frame = frame.expect("close frame should carry a reason");
    assert_eq!(frame.reason, "client going away");
    assert!(!client.is_connected());
}

#[tokio::test]
async fn resubscribes_after_the_peer_drops() {
    let (listener, url) = bind_stub().await;
    let policy = ReconnectPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
    };
    let (_client, _events) = spawn_client(&url, policy);

    // First session: take the subscribe, then drop the socket without a
    // goodbye.
    let mut ws = accept_ws(&listener).await;
    let subscribe = next_text(&mut ws).await;
    assert_eq!(subscribe["command"], "subscribe");
    drop(ws);

    // The client comes back on its own and subscribes again.
    let mut ws = accept_ws(&listener).await;
    let resubscribe = next_text(&mut ws).await;
    assert_eq!(resubscribe["command"], "subscribe");
    assert_eq!(resubscribe["identifier"], subscribe["identifier"]);
}

#[tokio::test]
async fn disabled_reconnect_gives_up_after_one_session() {
    let (listener, url) = bind_stub().await;
    let (_client, mut events) = spawn_client(&url, ReconnectPolicy::disabled());

    let mut ws = accept_ws(&listener).await;
    let _subscribe = next_text(&mut ws).await;
    drop(ws);

    // The event channel closes once the client task ends instead of
    // reconnecting.
    let closed = timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for the channel to close");
    assert!(closed.is_none());
}
