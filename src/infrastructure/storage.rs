use crate::config::StorageConfig;
use crate::services::storage::S3StorageService;
use aws_sdk_s3::config::{Credentials, Region};
use std::sync::Arc;
use tracing::info;

/// Build the S3 client for the chunk bucket. MinIO-compatible: path-style
/// addressing and static credentials, all taken from `StorageConfig`.
pub async fn setup_storage(config: &StorageConfig) -> Arc<S3StorageService> {
    info!(
        "☁️  Chunk storage: {} (bucket: {})",
        config.endpoint, config.bucket
    );

    let aws_config = aws_config::from_env()
        .endpoint_url(&config.endpoint)
        .region(Region::new(config.region.clone()))
        .credentials_provider(Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "static",
        ))
        .load()
        .await;

    let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
        .force_path_style(true)
        .build();
    let client = aws_sdk_s3::Client::from_conf(s3_config);

    // Presigning itself never touches the bucket, so a missing bucket would
    // otherwise only surface when the client PUTs its first chunk. Probe it
    // at startup instead.
    match client.head_bucket().bucket(&config.bucket).send().await {
        Ok(_) => info!("✅ Bucket '{}' is ready", config.bucket),
        Err(_) => {
            info!("🪣 Bucket '{}' not found, creating...", config.bucket);
            if let Err(e) = client.create_bucket().bucket(&config.bucket).send().await {
                tracing::error!("❌ Could not create bucket '{}': {}", config.bucket, e);
            } else {
                info!("✅ Bucket '{}' created", config.bucket);
            }
        }
    }

    Arc::new(S3StorageService::new(client, config.bucket.clone()))
}
