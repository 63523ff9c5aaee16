//! Upload API endpoints
//!
//! - POST /api/v1/upload/presign - Presigned S3 PUT URL for a direct upload
//! - POST /api/v1/upload/file - Multipart upload through the server; stored
//!   in S3 when configured, otherwise under `upload.path` (served at `/uploads`)

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    routing::post,
    Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::storage::{PresignedUpload, StoredFile};

/// Multipart framing on top of the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Debug, Deserialize)]
pub struct PresignRequest {
    #[serde(default)]
    pub filename: String,
    pub content_type: String,
}

/// Build the upload router; the body limit follows `upload.max_file_size`
pub fn router(max_file_size: u64) -> Router<AppState> {
    let body_limit = usize::try_from(max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/presign", post(presign))
        .route("/file", post(upload_file).layer(DefaultBodyLimit::max(body_limit)))
}

/// POST /api/v1/upload/presign
async fn presign(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<PresignRequest>,
) -> Result<Json<PresignedUpload>, ApiError> {
    let upload = state.storage.presign_upload(user.0.id, body.content_type.trim())?;
    tracing::debug!(user_id = user.0.id, filename = %body.filename, key = %upload.key, "Presigned upload");
    Ok(Json(upload))
}

/// POST /api/v1/upload/file
///
/// Accepts multipart/form-data with a single file field named "file".
async fn upload_file(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    mut multipart: Multipart,
) -> Result<Json<StoredFile>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation_error(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let content_type = field
            .content_type()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::validation_error(format!("Failed to read file: {}", e)))?;

        let stored = state.storage.store(user.0.id, &content_type, &data).await?;
        return Ok(Json(stored));
    }

    Err(ApiError::validation_error("No file provided"))
}
