//! Change bridge: LISTENs on a Postgres notification channel, re-fetches the
//! changed row, and forwards it to the relay as a broadcast. Best-effort by
//! design; the durable row is the source of truth, not this path.

use crate::config::BridgeConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::SinkExt;
use rand::Rng;
use serde_json::{json, Value};
use sqlx::postgres::{PgListener, PgPool, PgPoolOptions};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Durable-store seam: resolve a notification id to its full row. The channel
/// payload is never trusted beyond the id, since NOTIFY payloads are both
/// size-limited and schema-drift-prone.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn fetch_notification(&self, id: &str) -> Result<Option<Value>>;
}

pub struct PgNotificationStore {
    pool: PgPool,
}

impl PgNotificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn fetch_notification(&self, id: &str) -> Result<Option<Value>> {
        let id: i64 = id
            .parse()
            .with_context(|| format!("non-numeric notification id in payload: {:?}", id))?;
        let row: Option<Value> =
            sqlx::query_scalar("SELECT row_to_json(n) FROM notifications n WHERE n.id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row)
    }
}

/// Outbound seam towards the relay.
#[async_trait]
pub trait RelaySink: Send {
    async fn send_broadcast(&mut self, message: &Value) -> Result<()>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket client that reconnects with bounded exponential backoff plus
/// jitter, indefinitely. A message that hits a dead connection is dropped;
/// the next send re-establishes the link.
pub struct RelayClient {
    url: String,
    base_delay: Duration,
    max_delay: Duration,
    stream: Option<WsStream>,
}

impl RelayClient {
    pub fn new(url: String, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            url,
            base_delay,
            max_delay,
            stream: None,
        }
    }

    async fn ensure_connected(&mut self) {
        let mut delay = self.base_delay;
        while self.stream.is_none() {
            match connect_async(&self.url).await {
                Ok((stream, _)) => {
                    tracing::info!("🔗 Connected to relay at {}", self.url);
                    self.stream = Some(stream);
                }
                Err(e) => {
                    let jitter = rand::thread_rng().gen_range(0..=delay.as_millis() as u64 / 2);
                    let wait = delay + Duration::from_millis(jitter);
                    tracing::warn!(
                        "Relay connection to {} failed ({}), retrying in {:?}",
                        self.url,
                        e,
                        wait
                    );
                    tokio::time::sleep(wait).await;
                    delay = (delay * 2).min(self.max_delay);
                }
            }
        }
    }
}

#[async_trait]
impl RelaySink for RelayClient {
    async fn send_broadcast(&mut self, message: &Value) -> Result<()> {
        self.ensure_connected().await;
        let text = serde_json::to_string(message)?;
        if let Some(stream) = self.stream.as_mut() {
            if let Err(e) = stream.send(Message::Text(text)).await {
                // Drop the dead stream; the next send reconnects.
                self.stream = None;
                return Err(e).context("relay send failed");
            }
        }
        Ok(())
    }
}

/// Resolve one change notification and forward it. Returns true when a
/// broadcast was sent. Every failure path logs and drops the event — the
/// bridge must not crash or retry on a single bad row (at-most-once).
pub async fn handle_change<S, R>(store: &S, sink: &mut R, payload: &str) -> bool
where
    S: NotificationStore + ?Sized,
    R: RelaySink + ?Sized,
{
    let row = match store.fetch_notification(payload).await {
        Ok(Some(row)) => row,
        Ok(None) => {
            tracing::warn!("Notification {} vanished before re-fetch, dropping", payload);
            return false;
        }
        Err(e) => {
            tracing::error!("Failed to fetch notification {}: {:#}", payload, e);
            return false;
        }
    };

    // Subscribers key on the recipient, so the row's user_id becomes the
    // relay job id.
    let job_id = match row.get("user_id") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => {
            tracing::warn!("Notification {} has no user_id, dropping", payload);
            return false;
        }
    };

    let message = json!({ "job_id": job_id, "notification": row });
    match sink.send_broadcast(&message).await {
        Ok(()) => {
            tracing::info!("📨 Forwarded notification {} to job {}", payload, job_id);
            true
        }
        Err(e) => {
            tracing::warn!("Dropped notification {}: {:#}", payload, e);
            false
        }
    }
}

/// Main loop. Returns only on a fatal store-connection error; the caller
/// exits and an external supervisor restarts the process. The LISTEN leg is
/// deliberately not resumed in-process, unlike the pure-sender relay leg.
pub async fn run(config: BridgeConfig) -> Result<()> {
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;

    let mut listener = PgListener::connect_with(&pool)
        .await
        .context("failed to open LISTEN connection")?;
    listener
        .listen(&config.channel)
        .await
        .with_context(|| format!("failed to LISTEN on channel '{}'", config.channel))?;
    tracing::info!("👂 Listening on channel '{}'", config.channel);

    let store = PgNotificationStore::new(pool);
    let mut relay = RelayClient::new(
        config.relay_url.clone(),
        Duration::from_millis(config.reconnect_base_ms),
        Duration::from_millis(config.reconnect_max_ms),
    );

    loop {
        // try_recv surfaces a lost connection instead of silently resuming
        // the LISTEN, which would miss events delivered during the gap.
        match listener.try_recv().await {
            Ok(Some(notification)) => {
                let payload = notification.payload().to_string();
                tracing::debug!("Change notification: {}", payload);
                handle_change(&store, &mut relay, &payload).await;
            }
            Ok(None) => anyhow::bail!("notification connection closed"),
            Err(e) => return Err(e).context("notification channel lost"),
        }
    }
}
