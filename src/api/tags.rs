//! Tag API endpoints
//!
//! - GET /api/v1/tags - Tags with their published post counts

use axum::{extract::State, routing::get, Json, Router};

use crate::api::middleware::{ApiError, AppState};
use crate::models::TagWithCount;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_tags))
}

async fn list_tags(State(state): State<AppState>) -> Result<Json<Vec<TagWithCount>>, ApiError> {
    Ok(Json(state.tag_service.list().await?))
}
