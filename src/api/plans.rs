//! Subscription plan API endpoints
//!
//! - GET /api/v1/plans - Plans open for purchase
//! - GET /api/v1/me/subscription - Current subscription or `null`
//! - /api/v1/admin/plans... - Plan CRUD
//!
//! Plans are bought through `/payments/orders` with `item_type = subscription`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{CreatePlanInput, SubscriptionPlan, UpdatePlanInput, UserSubscription};

pub fn public_router() -> Router<AppState> {
    Router::new().route("/plans", get(list_plans))
}

pub fn me_router() -> Router<AppState> {
    Router::new().route("/subscription", get(my_subscription))
}

/// Nested under `/admin`
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/plans", get(list_all_plans).post(create_plan))
        .route("/plans/{id}", put(update_plan).delete(delete_plan))
}

async fn list_plans(State(state): State<AppState>) -> Result<Json<Vec<SubscriptionPlan>>, ApiError> {
    Ok(Json(state.subscription_service.list_active().await?))
}

async fn my_subscription(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Option<UserSubscription>>, ApiError> {
    Ok(Json(state.subscription_service.current_for_user(user.0.id).await?))
}

async fn list_all_plans(State(state): State<AppState>) -> Result<Json<Vec<SubscriptionPlan>>, ApiError> {
    Ok(Json(state.subscription_service.list_all().await?))
}

async fn create_plan(
    State(state): State<AppState>,
    Json(body): Json<CreatePlanInput>,
) -> Result<(StatusCode, Json<SubscriptionPlan>), ApiError> {
    let plan = state.subscription_service.create_plan(body).await?;
    Ok((StatusCode::CREATED, Json(plan)))
}

async fn update_plan(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdatePlanInput>,
) -> Result<Json<SubscriptionPlan>, ApiError> {
    Ok(Json(state.subscription_service.update_plan(id, body).await?))
}

async fn delete_plan(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.subscription_service.delete_plan(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
