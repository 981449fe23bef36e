use crate::api::error::AppError;
use crate::services::upload_service::{
    ChunkGrantResponse, FinalizeAck, FinalizeRequest, GrantChunkRequest, StatusLookup,
};
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[utoipa::path(
    post,
    path = "/uploads/grant",
    request_body = GrantChunkRequest,
    responses(
        (status = 200, description = "Direct-upload grant issued", body = ChunkGrantResponse),
        (status = 400, description = "Missing field or unrecognized category"),
        (status = 502, description = "Object storage unavailable")
    ),
    tag = "uploads"
)]
pub async fn grant_chunk(
    State(state): State<crate::AppState>,
    Json(req): Json<GrantChunkRequest>,
) -> Result<Json<ChunkGrantResponse>, AppError> {
    let res = state.upload_service.grant_chunk(req).await?;
    Ok(Json(res))
}

#[utoipa::path(
    post,
    path = "/uploads/finalize",
    request_body = FinalizeRequest,
    responses(
        (status = 202, description = "Merge invocation accepted", body = FinalizeAck),
        (status = 400, description = "Missing field or unrecognized category"),
        (status = 502, description = "Invocation submission failed")
    ),
    tag = "uploads"
)]
pub async fn finalize_upload(
    State(state): State<crate::AppState>,
    Json(req): Json<FinalizeRequest>,
) -> Result<(StatusCode, Json<FinalizeAck>), AppError> {
    let ack = state.upload_service.trigger_merge(req).await?;
    Ok((StatusCode::ACCEPTED, Json(ack)))
}

#[utoipa::path(
    get,
    path = "/uploads/{category}/{job_id}/status",
    params(
        ("category" = String, Path, description = "Upload category"),
        ("job_id" = String, Path, description = "Client-chosen job identifier")
    ),
    responses(
        (status = 200, description = "Stored status record, verbatim"),
        (status = 404, description = "No status record yet; keep polling"),
        (status = 400, description = "Unrecognized category"),
        (status = 502, description = "Object storage unavailable")
    ),
    tag = "uploads"
)]
pub async fn upload_status(
    State(state): State<crate::AppState>,
    Path((category, job_id)): Path<(String, String)>,
) -> Result<Response, AppError> {
    match state.upload_service.read_status(&category, &job_id).await? {
        // The stored record goes out byte-for-byte as the merge worker
        // wrote it.
        StatusLookup::Found(bytes) => Ok((
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            bytes,
        )
            .into_response()),
        StatusLookup::NotFound => Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "status": "not_found" })),
        )
            .into_response()),
    }
}
