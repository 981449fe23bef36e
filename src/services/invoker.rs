use crate::models::MergeJob;
use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_lambda::primitives::Blob;
use aws_sdk_lambda::types::InvocationType;

/// Compute-invocation seam. One call submits one merge job, fire-and-forget:
/// the returned `Ok` means the invocation was accepted, nothing more. Whether
/// the merge itself succeeds is only ever visible through the status record.
#[async_trait]
pub trait MergeInvoker: Send + Sync {
    async fn invoke_merge(&self, job: &MergeJob) -> Result<()>;
}

pub struct LambdaMergeInvoker {
    client: aws_sdk_lambda::Client,
    function_name: String,
}

impl LambdaMergeInvoker {
    pub fn new(client: aws_sdk_lambda::Client, function_name: String) -> Self {
        Self {
            client,
            function_name,
        }
    }
}

#[async_trait]
impl MergeInvoker for LambdaMergeInvoker {
    async fn invoke_merge(&self, job: &MergeJob) -> Result<()> {
        let payload = serde_json::to_vec(job)?;
        self.client
            .invoke()
            .function_name(&self.function_name)
            // Event = asynchronous: Lambda queues the request and returns
            // immediately without a function result.
            .invocation_type(InvocationType::Event)
            .payload(Blob::new(payload))
            .send()
            .await?;
        Ok(())
    }
}
