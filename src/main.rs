use dotenvy::dotenv;
use scout_media_backend::config::{StorageConfig, UploadConfig};
use scout_media_backend::infrastructure::{invoker, storage};
use scout_media_backend::services::upload_service::UploadService;
use scout_media_backend::{create_app, shutdown_signal, AppState};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Initialize tracing with EnvFilter
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scout_media_backend=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting Scout Media Backend...");

    let config = UploadConfig::from_env();
    info!(
        "🎫 Upload grants expire after {}s, merge worker '{}'",
        config.grant_expiry_secs, config.merge_function
    );

    // Setup Infrastructure
    let storage_config = StorageConfig::from_env();
    let storage_service = storage::setup_storage(&storage_config).await;
    let merge_invoker = invoker::setup_invoker(&config).await;

    let upload_service = Arc::new(UploadService::new(
        storage_service.clone(),
        merge_invoker,
        config.clone(),
    ));

    let state = AppState {
        storage: storage_service,
        upload_service,
        config: config.clone(),
    };

    let app = create_app(state).layer(
        TraceLayer::new_for_http()
            .make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                )
            })
            .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
                info!("📥 {} {}", request.method(), request.uri());
            })
            .on_response(
                |response: &axum::http::Response<_>,
                 latency: std::time::Duration,
                 _span: &tracing::Span| {
                    info!(
                        "📤 Finished in {:?} with status {}",
                        latency,
                        response.status()
                    );
                },
            ),
    );

    info!("✅ Server ready at http://{}", config.bind_addr);
    info!("📖 Swagger UI: http://{}/swagger-ui", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("🛑 Server shut down gracefully.");
    Ok(())
}
