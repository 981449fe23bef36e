use futures::{SinkExt, StreamExt};
use scout_media_backend::relay::{relay_app, RelayState};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::connect_async;

type TestSocket =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

struct TestServer {
    addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

async fn spawn_relay() -> TestServer {
    let (shutdown, shutdown_rx) = watch::channel(false);
    let app = relay_app(RelayState::new(shutdown_rx));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("listener addr");
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve relay");
    });
    TestServer {
        addr,
        shutdown,
        handle,
    }
}

async fn connect(addr: SocketAddr) -> TestSocket {
    let (socket, _) = connect_async(format!("ws://{}/ws", addr))
        .await
        .expect("connect to relay");
    socket
}

async fn send_json(socket: &mut TestSocket, value: Value) {
    socket
        .send(WsMessage::Text(value.to_string()))
        .await
        .expect("send frame");
}

async fn recv_json(socket: &mut TestSocket) -> Value {
    loop {
        let msg = timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("frame error");
        if let WsMessage::Text(text) = msg {
            return serde_json::from_str(&text).expect("JSON frame");
        }
    }
}

async fn assert_silent(socket: &mut TestSocket) {
    let res = timeout(Duration::from_millis(200), socket.next()).await;
    assert!(res.is_err(), "expected no frame, got {:?}", res);
}

// Subscriptions are registered by the server's reader loop with no ack, so
// tests yield briefly before broadcasting.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn broadcast_reaches_subscribers_of_that_job_only() {
    let server = spawn_relay().await;

    let mut sub_x = connect(server.addr).await;
    let mut sub_y = connect(server.addr).await;
    let mut producer = connect(server.addr).await;

    send_json(&mut sub_x, json!({ "subscribe": true, "job_id": "X" })).await;
    send_json(&mut sub_y, json!({ "subscribe": true, "job_id": "Y" })).await;
    settle().await;

    let broadcast = json!({ "job_id": "X", "log": "hello" });
    send_json(&mut producer, broadcast.clone()).await;

    assert_eq!(recv_json(&mut sub_x).await, broadcast);
    assert_silent(&mut sub_y).await;

    server.handle.abort();
}

#[tokio::test]
async fn broadcast_after_disconnect_does_not_error() {
    let server = spawn_relay().await;

    let mut sub = connect(server.addr).await;
    let mut producer = connect(server.addr).await;

    send_json(&mut sub, json!({ "subscribe": true, "job_id": "X" })).await;
    settle().await;
    sub.close(None).await.expect("close subscriber");
    settle().await;

    // Delivery set is empty now; the relay must take this in stride.
    send_json(&mut producer, json!({ "job_id": "X", "log": "after close" })).await;
    settle().await;

    // The relay is still fully functional for new subscribers.
    let mut late = connect(server.addr).await;
    send_json(&mut late, json!({ "subscribe": true, "job_id": "X" })).await;
    settle().await;
    let broadcast = json!({ "job_id": "X", "log": "second round" });
    send_json(&mut producer, broadcast.clone()).await;
    assert_eq!(recv_json(&mut late).await, broadcast);

    server.handle.abort();
}

#[tokio::test]
async fn bridge_shaped_messages_are_broadcast() {
    let server = spawn_relay().await;

    let mut sub = connect(server.addr).await;
    let mut bridge = connect(server.addr).await;

    send_json(&mut sub, json!({ "subscribe": true, "job_id": "scout-7" })).await;
    settle().await;

    let event = json!({
        "job_id": "scout-7",
        "notification": { "id": 42, "user_id": "scout-7", "kind": "upload_complete" }
    });
    send_json(&mut bridge, event.clone()).await;

    assert_eq!(recv_json(&mut sub).await, event);

    server.handle.abort();
}

#[tokio::test]
async fn malformed_frames_are_ignored() {
    let server = spawn_relay().await;

    let mut sub = connect(server.addr).await;
    let mut producer = connect(server.addr).await;

    send_json(&mut sub, json!({ "subscribe": true, "job_id": "X" })).await;
    settle().await;

    // Not JSON, JSON without job_id, subscribe without job_id: all dropped.
    producer
        .send(WsMessage::Text("not json at all".to_string()))
        .await
        .expect("send garbage");
    send_json(&mut producer, json!({ "log": "no job id" })).await;
    send_json(&mut producer, json!({ "subscribe": true })).await;
    settle().await;

    let broadcast = json!({ "job_id": "X", "log": "still alive" });
    send_json(&mut producer, broadcast.clone()).await;
    assert_eq!(recv_json(&mut sub).await, broadcast);

    server.handle.abort();
}

#[tokio::test]
async fn shutdown_closes_live_connections() {
    let server = spawn_relay().await;

    let mut sub = connect(server.addr).await;
    send_json(&mut sub, json!({ "subscribe": true, "job_id": "X" })).await;
    settle().await;

    server.shutdown.send(true).expect("flip shutdown flag");

    // The subscriber sees a server-initiated close, not a timeout.
    let msg = timeout(Duration::from_secs(2), sub.next())
        .await
        .expect("timed out waiting for close");
    match msg {
        Some(Ok(WsMessage::Close(_))) | None => {}
        other => panic!("expected close frame, got {:?}", other),
    }

    server.handle.abort();
}
