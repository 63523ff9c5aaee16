//! Comment API endpoints
//!
//! - GET /api/v1/posts/{id}/comments - Approved comments, one level of replies
//! - POST /api/v1/posts/{id}/comments - Comment on a post (auth)
//! - GET /api/v1/admin/comments?status - Moderation queue
//! - PUT /api/v1/admin/comments/{id} - Change status
//! - DELETE /api/v1/admin/comments/{id}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{default_page, default_per_page, parse_filter};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{
    Comment, CommentStatus, CommentWithAuthor, CreateCommentInput, ListParams, PagedResult,
};

#[derive(Debug, Deserialize)]
pub struct ModerationQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: CommentStatus,
}

pub fn public_router() -> Router<AppState> {
    Router::new().route("/posts/{id}/comments", get(list_comments))
}

pub fn protected_router() -> Router<AppState> {
    Router::new().route("/posts/{id}/comments", post(create_comment))
}

/// Nested under `/admin`
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/comments", get(moderation_queue))
        .route("/comments/{id}", put(update_status).delete(delete_comment))
}

async fn list_comments(
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
) -> Result<Json<Vec<CommentWithAuthor>>, ApiError> {
    Ok(Json(state.comment_service.list_for_post(post_id).await?))
}

/// Instructors and admins are approved immediately; students wait for
/// moderation.
async fn create_comment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(post_id): Path<i64>,
    Json(body): Json<CreateCommentInput>,
) -> Result<(StatusCode, Json<Comment>), ApiError> {
    let comment = state.comment_service.create(&user.0, post_id, body).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn moderation_queue(
    State(state): State<AppState>,
    Query(query): Query<ModerationQuery>,
) -> Result<Json<PagedResult<CommentWithAuthor>>, ApiError> {
    let status = parse_filter(query.status.as_deref(), "status")?;
    let params = ListParams::new(query.page, query.per_page);
    Ok(Json(state.comment_service.list_by_status(status, &params).await?))
}

async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateStatusRequest>,
) -> Result<Json<Comment>, ApiError> {
    Ok(Json(state.comment_service.set_status(id, body.status).await?))
}

async fn delete_comment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.comment_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
