use dotenvy::dotenv;
use scout_media_backend::bridge;
use scout_media_backend::config::BridgeConfig;
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

    let config = BridgeConfig::from_env();
    info!("🚀 Starting notification bridge...");

    // A lost LISTEN connection is fatal by design: run() returns an error,
    // the process exits nonzero, and the supervisor restarts it.
    bridge::run(config).await
}
