//! Blog post API endpoints
//!
//! Public:
//! - GET /api/v1/posts - Published posts, filterable by category, tag, search
//! - GET /api/v1/posts/{slug} - One published post (counts a view)
//!
//! Authoring (instructors on their own posts, admins on any):
//! - GET/POST /api/v1/admin/posts
//! - GET/PUT/DELETE /api/v1/admin/posts/{id}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{default_page, default_page_size, default_per_page, non_empty, parse_filter};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{CreatePostInput, ListParams, PagedResult, PostFilter, PostWithMeta, UpdatePostInput};

/// Query parameters for the public post list
#[derive(Debug, Deserialize)]
pub struct ListPostsQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    pub category: Option<String>,
    pub tag: Option<String>,
    pub search: Option<String>,
}

/// Query parameters for the authoring list
#[derive(Debug, Deserialize)]
pub struct AuthorPostsQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    pub status: Option<String>,
    pub search: Option<String>,
}

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/posts", get(list_posts))
        // Looked up by slug
        .route("/posts/{id}", get(get_post))
}

/// Nested under `/admin`, behind the instructor gate
pub fn author_router() -> Router<AppState> {
    Router::new()
        .route("/posts", get(list_own_posts).post(create_post))
        .route(
            "/posts/{id}",
            get(get_post_for_edit).put(update_post).delete(delete_post),
        )
}

/// GET /api/v1/posts
async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<ListPostsQuery>,
) -> Result<Json<PagedResult<PostWithMeta>>, ApiError> {
    let filter = PostFilter {
        category: non_empty(query.category),
        tag: non_empty(query.tag),
        search: non_empty(query.search),
        ..Default::default()
    };
    let params = ListParams::new(query.page, query.page_size);
    Ok(Json(state.post_service.list_published(filter, &params).await?))
}

/// GET /api/v1/posts/{slug}
async fn get_post(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<PostWithMeta>, ApiError> {
    Ok(Json(state.post_service.view_by_slug(&slug).await?))
}

/// GET /api/v1/admin/posts
async fn list_own_posts(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<AuthorPostsQuery>,
) -> Result<Json<PagedResult<PostWithMeta>>, ApiError> {
    let filter = PostFilter {
        status: parse_filter(query.status.as_deref(), "status")?,
        search: non_empty(query.search),
        ..Default::default()
    };
    let params = ListParams::new(query.page, query.per_page);
    Ok(Json(
        state
            .post_service
            .list_for_author(&user.0, filter, &params)
            .await?,
    ))
}

/// POST /api/v1/admin/posts
async fn create_post(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreatePostInput>,
) -> Result<(StatusCode, Json<PostWithMeta>), ApiError> {
    let post = state.post_service.create(&user.0, body).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

/// GET /api/v1/admin/posts/{id}
async fn get_post_for_edit(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<PostWithMeta>, ApiError> {
    Ok(Json(state.post_service.get_for_edit(&user.0, id).await?))
}

/// PUT /api/v1/admin/posts/{id}
async fn update_post(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdatePostInput>,
) -> Result<Json<PostWithMeta>, ApiError> {
    Ok(Json(state.post_service.update(&user.0, id, body).await?))
}

/// DELETE /api/v1/admin/posts/{id}
async fn delete_post(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.post_service.delete(&user.0, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
