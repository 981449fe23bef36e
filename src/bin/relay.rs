use dotenvy::dotenv;
use scout_media_backend::config::RelayConfig;
use scout_media_backend::relay::{relay_app, spawn_sweeper, RelayState};
use scout_media_backend::shutdown_signal;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scout_media_backend=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = RelayConfig::from_env();
    info!("🚀 Starting subscription relay...");

    // Flipping this flag makes every connection handler send a Close frame,
    // so subscribers see a clean disconnect instead of a timeout.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let state = RelayState::new(shutdown_rx);
    let _sweeper = spawn_sweeper(
        state.clone(),
        Duration::from_secs(config.sweep_interval_secs),
    );

    let app = relay_app(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("✅ Relay ready at ws://{}/ws", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        })
        .await?;

    info!("🛑 Relay shut down gracefully.");
    Ok(())
}
