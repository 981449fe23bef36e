pub mod api;
pub mod bridge;
pub mod config;
pub mod infrastructure;
pub mod models;
pub mod relay;
pub mod services;

use crate::config::UploadConfig;
use crate::services::storage::StorageService;
use crate::services::upload_service::UploadService;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::signal;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::uploads::grant_chunk,
        api::handlers::uploads::finalize_upload,
        api::handlers::uploads::upload_status,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            services::upload_service::GrantChunkRequest,
            services::upload_service::ChunkGrantResponse,
            services::upload_service::FinalizeRequest,
            services::upload_service::FinalizeAck,
            api::handlers::health::HealthResponse,
            models::UploadCategory,
        )
    ),
    tags(
        (name = "uploads", description = "Chunked upload pipeline endpoints"),
        (name = "system", description = "Health and diagnostics")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn StorageService>,
    pub upload_service: Arc<UploadService>,
    pub config: UploadConfig,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route("/uploads/grant", post(api::handlers::uploads::grant_chunk))
        .route(
            "/uploads/finalize",
            post(api::handlers::uploads::finalize_upload),
        )
        .route(
            "/uploads/:category/:job_id/status",
            get(api::handlers::uploads::upload_status),
        )
        .with_state(state)
}

/// Resolves on Ctrl+C or SIGTERM. Shared by all three binaries.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("⌨️  Ctrl+C received, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("💤 SIGTERM received, starting graceful shutdown...");
        },
    }
}
