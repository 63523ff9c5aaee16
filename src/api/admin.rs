//! Admin API endpoints
//!
//! Handles HTTP requests for admin management:
//! - GET /api/v1/admin/dashboard - Platform-wide figures
//! - GET /api/v1/admin/users - Paginated user list
//! - PUT /api/v1/admin/users/{id} - Change role or status
//! - DELETE /api/v1/admin/users/{id} - Delete a user
//! - Category CRUD and tag deletion for the blog

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;

use crate::api::auth::UserResponse;
use crate::api::common::{default_page, default_per_page, non_empty, parse_filter};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{
    AdminUpdateUserInput, Category, CreateCategoryInput, ListParams, PagedResult, UpdateCategoryInput,
    UserFilter,
};
use crate::services::dashboard::AdminDashboard;

/// Query parameters for the user list
#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    pub role: Option<String>,
    pub search: Option<String>,
}

/// Build the admin router (requires admin middleware)
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(get_dashboard))
        .route("/users", get(list_users))
        .route("/users/{id}", put(update_user).delete(delete_user))
        .route("/categories", axum::routing::post(create_category))
        .route("/categories/{id}", put(update_category).delete(delete_category))
        .route("/tags/{id}", axum::routing::delete(delete_tag))
}

/// GET /api/v1/admin/dashboard
async fn get_dashboard(State(state): State<AppState>) -> Result<Json<AdminDashboard>, ApiError> {
    Ok(Json(state.dashboard_service.admin().await?))
}

/// GET /api/v1/admin/users
async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<PagedResult<UserResponse>>, ApiError> {
    let filter = UserFilter {
        role: parse_filter(query.role.as_deref(), "role")?,
        search: non_empty(query.search),
    };
    let params = ListParams::new(query.page, query.per_page);
    let result = state.user_service.list_users(&filter, &params).await?;

    Ok(Json(PagedResult::new(
        result.items.into_iter().map(Into::into).collect(),
        result.total,
        &params,
    )))
}

/// PUT /api/v1/admin/users/{id}
async fn update_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<AdminUpdateUserInput>,
) -> Result<Json<UserResponse>, ApiError> {
    let updated = state.user_service.admin_update_user(&user.0, id, body).await?;
    Ok(Json(updated.into()))
}

/// DELETE /api/v1/admin/users/{id}
async fn delete_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.user_service.delete_user(&user.0, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/admin/categories
async fn create_category(
    State(state): State<AppState>,
    Json(body): Json<CreateCategoryInput>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    let category = state.category_service.create(body).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

/// PUT /api/v1/admin/categories/{id}
async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateCategoryInput>,
) -> Result<Json<Category>, ApiError> {
    Ok(Json(state.category_service.update(id, body).await?))
}

/// DELETE /api/v1/admin/categories/{id}
async fn delete_category(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.category_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/v1/admin/tags/{id}
async fn delete_tag(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.tag_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
