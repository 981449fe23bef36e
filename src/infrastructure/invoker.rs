use crate::config::UploadConfig;
use crate::services::invoker::LambdaMergeInvoker;
use std::sync::Arc;
use tracing::info;

pub async fn setup_invoker(config: &UploadConfig) -> Arc<LambdaMergeInvoker> {
    // Standard AWS env chain; LAMBDA_ENDPOINT overrides for local stacks.
    let mut loader = aws_config::from_env();
    if let Ok(endpoint_url) = std::env::var("LAMBDA_ENDPOINT") {
        loader = loader.endpoint_url(endpoint_url);
    }
    let aws_config = loader.load().await;

    let lambda_client = aws_sdk_lambda::Client::new(&aws_config);

    info!("⚡ Merge invoker: Lambda function '{}'", config.merge_function);

    Arc::new(LambdaMergeInvoker::new(
        lambda_client,
        config.merge_function.clone(),
    ))
}
