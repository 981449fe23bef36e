use crate::api::error::AppError;
use crate::config::UploadConfig;
use crate::models::{
    chunk_key, chunk_prefix, output_key, status_key, MergeJob, UploadCategory,
};
use crate::services::invoker::MergeInvoker;
use crate::services::storage::StorageService;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

// Request fields arrive as options so a missing field surfaces as a clean
// 400 with the field name, not a deserialization rejection.
#[derive(Serialize, Deserialize, ToSchema)]
pub struct GrantChunkRequest {
    pub category: Option<String>,
    pub job_id: Option<String>,
    pub chunk_index: Option<u32>,
    pub filename: Option<String>,
    pub mime_type: Option<String>,
    /// Accepted for parity with finalize, but a grant is valid without it;
    /// the correlating ids only become mandatory when the merge is requested.
    pub scout_id: Option<String>,
    pub pitch_id: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct ChunkGrantResponse {
    /// Presigned PUT URL the client writes the chunk to directly.
    pub authorization_url: String,
    pub storage_key: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct FinalizeRequest {
    pub category: Option<String>,
    pub job_id: Option<String>,
    pub scout_id: Option<String>,
    pub pitch_id: Option<String>,
    pub filename: Option<String>,
    pub total_chunks: Option<u32>,
    pub mime_type: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct FinalizeAck {
    pub status: String,
    pub job_id: String,
}

/// Outcome of a status poll. Absence of the record is a valid polling state,
/// distinct from any error. A found record carries the stored bytes
/// untouched, so the caller sees exactly what the merge worker wrote.
pub enum StatusLookup {
    NotFound,
    Found(Vec<u8>),
}

pub struct UploadService {
    storage: Arc<dyn StorageService>,
    invoker: Arc<dyn MergeInvoker>,
    config: UploadConfig,
}

impl UploadService {
    pub fn new(
        storage: Arc<dyn StorageService>,
        invoker: Arc<dyn MergeInvoker>,
        config: UploadConfig,
    ) -> Self {
        Self {
            storage,
            invoker,
            config,
        }
    }

    /// Issue a short-lived direct-upload grant for one (job, chunk) pair.
    /// Pure beyond the presign round trip: no write happens here, and
    /// repeated calls for the same pair reissue a grant for the same key.
    pub async fn grant_chunk(
        &self,
        req: GrantChunkRequest,
    ) -> Result<ChunkGrantResponse, AppError> {
        let category = parse_category(req.category.as_deref())?;
        let job_id = require(&req.job_id, "job_id")?;
        let chunk_index = req
            .chunk_index
            .ok_or_else(|| missing("chunk_index"))?;
        require(&req.filename, "filename")?;
        let mime_type = require(&req.mime_type, "mime_type")?;
        if category.requires_pitch_id() {
            require(&req.pitch_id, "pitch_id")?;
        }

        let storage_key = chunk_key(category, job_id, chunk_index);
        let authorization_url = self
            .storage
            .presign_put(&storage_key, mime_type, self.config.grant_expiry_secs)
            .await
            .map_err(|e| {
                tracing::error!("Failed to presign chunk upload for {}: {:#}", storage_key, e);
                AppError::Upstream("failed to issue upload grant".to_string())
            })?;

        tracing::info!(
            "🎫 Grant issued: job={} chunk={} key={}",
            job_id,
            chunk_index,
            storage_key
        );

        Ok(ChunkGrantResponse {
            authorization_url,
            storage_key,
        })
    }

    /// Submit one fire-and-forget merge invocation. The returned ack means
    /// the invocation was accepted, not that merging started or succeeded;
    /// callers poll the status record for that. Deliberately no dedup: a
    /// second finalize submits a second invocation.
    pub async fn trigger_merge(&self, req: FinalizeRequest) -> Result<FinalizeAck, AppError> {
        let category = parse_category(req.category.as_deref())?;
        let job_id = require(&req.job_id, "job_id")?.to_string();
        let scout_id = require(&req.scout_id, "scout_id")?.to_string();
        let filename = require(&req.filename, "filename")?.to_string();
        let mime_type = require(&req.mime_type, "mime_type")?.to_string();
        let total_chunks = req
            .total_chunks
            .ok_or_else(|| missing("total_chunks"))?;
        if category.requires_pitch_id() {
            require(&req.pitch_id, "pitch_id")?;
        }

        let job = MergeJob {
            category,
            job_id: job_id.clone(),
            scout_id,
            pitch_id: req.pitch_id,
            mime_type,
            total_chunks,
            chunk_prefix: chunk_prefix(category, &job_id),
            output_key: output_key(category, &job_id, &filename),
            status_key: status_key(category, &job_id),
            filename,
        };

        self.invoker.invoke_merge(&job).await.map_err(|e| {
            tracing::error!("Merge invocation failed for job {}: {:#}", job_id, e);
            AppError::Upstream("failed to submit merge invocation".to_string())
        })?;

        tracing::info!(
            "🎬 Merge requested: job={} chunks={} category={}",
            job_id,
            total_chunks,
            category.as_str()
        );

        Ok(FinalizeAck {
            status: "merging".to_string(),
            job_id,
        })
    }

    /// Read the job's status record. Category is validated before any read;
    /// an absent record is reported as `NotFound` so the caller can keep
    /// polling.
    pub async fn read_status(
        &self,
        category: &str,
        job_id: &str,
    ) -> Result<StatusLookup, AppError> {
        let category = parse_category(Some(category))?;
        let key = status_key(category, job_id);

        let body = self.storage.get_object(&key).await.map_err(|e| {
            tracing::error!("Failed to read status object {}: {:#}", key, e);
            AppError::Upstream("failed to read status record".to_string())
        })?;

        match body {
            None => Ok(StatusLookup::NotFound),
            Some(bytes) => {
                // Validity check only; the bytes themselves are passed
                // through verbatim, key order and whitespace included.
                if let Err(e) = serde_json::from_slice::<serde::de::IgnoredAny>(&bytes) {
                    tracing::error!("Status object {} is not valid JSON: {}", key, e);
                    return Err(AppError::Internal("corrupt status record".to_string()));
                }
                Ok(StatusLookup::Found(bytes))
            }
        }
    }
}

fn parse_category(value: Option<&str>) -> Result<UploadCategory, AppError> {
    let value = value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| missing("category"))?;
    UploadCategory::parse(value)
        .ok_or_else(|| AppError::BadRequest(format!("unrecognized category: {}", value)))
}

fn require<'a>(field: &'a Option<String>, name: &str) -> Result<&'a str, AppError> {
    field
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| missing(name))
}

fn missing(name: &str) -> AppError {
    AppError::BadRequest(format!("missing required field: {}", name))
}
