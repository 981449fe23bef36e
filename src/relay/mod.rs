//! Subscription relay: fans job-scoped messages out to live WebSocket
//! subscribers. All state is a single in-memory map owned by this process;
//! nothing here is persisted and nothing here is the source of truth.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub type ConnId = u64;
type Outbound = mpsc::UnboundedSender<Message>;

/// job_id -> (connection id -> outbound channel). A connection appears in a
/// job's set only between its subscribe message and its disconnect.
#[derive(Default)]
pub struct SubscriptionMap {
    jobs: HashMap<String, HashMap<ConnId, Outbound>>,
}

impl SubscriptionMap {
    /// Idempotent: re-subscribing the same connection replaces its entry.
    pub fn subscribe(&mut self, job_id: &str, conn: ConnId, tx: Outbound) {
        self.jobs
            .entry(job_id.to_string())
            .or_default()
            .insert(conn, tx);
    }

    /// Eager prune on observed close.
    pub fn remove_connection(&mut self, conn: ConnId) {
        for subscribers in self.jobs.values_mut() {
            subscribers.remove(&conn);
        }
        self.jobs.retain(|_, subscribers| !subscribers.is_empty());
    }

    /// Forward `raw` verbatim to every live subscriber of `job_id`. Sends are
    /// channel pushes, so a slow socket never blocks the others; connections
    /// whose channel has closed are skipped. Returns the delivery count.
    pub fn broadcast(&self, job_id: &str, raw: &str) -> usize {
        let Some(subscribers) = self.jobs.get(job_id) else {
            return 0;
        };
        let mut delivered = 0;
        for tx in subscribers.values() {
            if tx.send(Message::Text(raw.to_string())).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Lazy prune: drop subscribers whose connection died without a close
    /// event, and delete job entries left empty. Bounds memory growth.
    pub fn sweep(&mut self) {
        self.jobs.retain(|_, subscribers| {
            subscribers.retain(|_, tx| !tx.is_closed());
            !subscribers.is_empty()
        });
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    pub fn subscriber_count(&self, job_id: &str) -> usize {
        self.jobs.get(job_id).map(HashMap::len).unwrap_or(0)
    }
}

#[derive(Clone)]
pub struct RelayState {
    subs: Arc<Mutex<SubscriptionMap>>,
    next_conn_id: Arc<AtomicU64>,
    shutdown: watch::Receiver<bool>,
}

impl RelayState {
    pub fn new(shutdown: watch::Receiver<bool>) -> Self {
        Self {
            subs: Arc::new(Mutex::new(SubscriptionMap::default())),
            next_conn_id: Arc::new(AtomicU64::new(1)),
            shutdown,
        }
    }

    fn subs(&self) -> MutexGuard<'_, SubscriptionMap> {
        self.subs.lock().unwrap()
    }
}

pub fn relay_app(state: RelayState) -> Router {
    Router::new().route("/ws", get(ws_handler)).with_state(state)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<RelayState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: RelayState) {
    let conn_id = state.next_conn_id.fetch_add(1, Ordering::Relaxed);
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let mut shutdown = state.shutdown.clone();

    tracing::info!("🔌 Connection {} opened", conn_id);

    // Single writer per socket: everything outbound funnels through the
    // channel, including the close frame on process shutdown.
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(msg) => {
                        if sink.send(msg).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
                res = shutdown.changed() => {
                    // A dropped sender counts as shutdown too.
                    if res.is_err() || *shutdown.borrow() {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        }
    });

    while let Some(Ok(msg)) = stream.next().await {
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            // Pings are answered by axum; binary and pong frames carry
            // nothing for us.
            _ => continue,
        };
        match serde_json::from_str::<Value>(&text) {
            Ok(value) => dispatch(&state, conn_id, &tx, &value, &text),
            Err(e) => {
                tracing::debug!("Ignoring non-JSON frame from conn {}: {}", conn_id, e);
            }
        }
    }

    state.subs().remove_connection(conn_id);
    drop(tx);
    let _ = writer.await;
    tracing::info!("🔌 Connection {} closed", conn_id);
}

/// The relay is deliberately permissive: it has many heterogeneous producers,
/// so unrecognized shapes are logged and dropped, never answered with a
/// protocol error.
fn dispatch(state: &RelayState, conn_id: ConnId, tx: &Outbound, value: &Value, raw: &str) {
    let job_id = value.get("job_id").and_then(Value::as_str);

    if value.get("subscribe").and_then(Value::as_bool) == Some(true) {
        if let Some(job_id) = job_id {
            state.subs().subscribe(job_id, conn_id, tx.clone());
            tracing::info!("📡 Conn {} subscribed to job {}", conn_id, job_id);
        } else {
            tracing::debug!("Subscribe without job_id from conn {}, ignored", conn_id);
        }
        return;
    }

    if let Some(job_id) = job_id {
        let delivered = state.subs().broadcast(job_id, raw);
        tracing::debug!(
            "Broadcast for job {} delivered to {} subscriber(s)",
            job_id,
            delivered
        );
        return;
    }

    tracing::debug!("Ignoring message without job_id from conn {}", conn_id);
}

/// Periodic dead-connection sweep. Runs until the shutdown flag flips.
pub fn spawn_sweeper(state: RelayState, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut shutdown = state.shutdown.clone();
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let mut subs = state.subs();
                    let before = subs.job_count();
                    subs.sweep();
                    let after = subs.job_count();
                    if before != after {
                        tracing::info!("🧹 Sweep pruned {} empty job entr(ies)", before - after);
                    }
                }
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (Outbound, mpsc::UnboundedReceiver<Message>) {
        mpsc::unbounded_channel()
    }

    fn recv_text(rx: &mut mpsc::UnboundedReceiver<Message>) -> Option<String> {
        match rx.try_recv() {
            Ok(Message::Text(text)) => Some(text),
            _ => None,
        }
    }

    #[test]
    fn broadcast_reaches_only_matching_job() {
        let mut map = SubscriptionMap::default();
        let (tx_a, mut rx_a) = channel();
        let (tx_b, mut rx_b) = channel();
        map.subscribe("job-x", 1, tx_a);
        map.subscribe("job-y", 2, tx_b);

        let delivered = map.broadcast("job-x", r#"{"job_id":"job-x","log":"hello"}"#);
        assert_eq!(delivered, 1);
        assert_eq!(
            recv_text(&mut rx_a).as_deref(),
            Some(r#"{"job_id":"job-x","log":"hello"}"#)
        );
        assert!(recv_text(&mut rx_b).is_none());
    }

    #[test]
    fn broadcast_to_unknown_job_is_a_noop() {
        let map = SubscriptionMap::default();
        assert_eq!(map.broadcast("nobody-home", "{}"), 0);
    }

    #[test]
    fn duplicate_subscribe_keeps_one_entry() {
        let mut map = SubscriptionMap::default();
        let (tx, mut rx) = channel();
        map.subscribe("job-x", 1, tx.clone());
        map.subscribe("job-x", 1, tx);
        assert_eq!(map.subscriber_count("job-x"), 1);

        map.broadcast("job-x", "msg");
        assert!(recv_text(&mut rx).is_some());
        assert!(recv_text(&mut rx).is_none());
    }

    #[test]
    fn remove_connection_prunes_every_job() {
        let mut map = SubscriptionMap::default();
        let (tx, _rx) = channel();
        map.subscribe("job-x", 1, tx.clone());
        map.subscribe("job-y", 1, tx);
        map.remove_connection(1);
        assert_eq!(map.job_count(), 0);
    }

    #[test]
    fn broadcast_after_disconnect_skips_closed_channels() {
        let mut map = SubscriptionMap::default();
        let (tx_a, rx_a) = channel();
        let (tx_b, mut rx_b) = channel();
        map.subscribe("job-x", 1, tx_a);
        map.subscribe("job-x", 2, tx_b);

        // rx_a dropped: conn 1 is gone without a clean close.
        drop(rx_a);

        let delivered = map.broadcast("job-x", "after-close");
        assert_eq!(delivered, 1);
        assert_eq!(recv_text(&mut rx_b).as_deref(), Some("after-close"));
    }

    #[test]
    fn sweep_deletes_empty_job_entries() {
        let mut map = SubscriptionMap::default();
        let (tx_a, rx_a) = channel();
        let (tx_b, _rx_b) = channel();
        map.subscribe("job-x", 1, tx_a);
        map.subscribe("job-y", 2, tx_b);

        drop(rx_a);
        map.sweep();

        assert_eq!(map.job_count(), 1);
        assert_eq!(map.subscriber_count("job-x"), 0);
        assert_eq!(map.subscriber_count("job-y"), 1);
    }
}
