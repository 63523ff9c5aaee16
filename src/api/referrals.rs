//! Referral API endpoints
//!
//! - GET /api/v1/referrals/my-code - Own code, created on first request
//! - POST /api/v1/referrals/validate - Check a code before checkout
//! - GET /api/v1/referrals/stats - Uses, credit and referrals of own code
//! - GET /api/v1/admin/referrals, PUT /api/v1/admin/referrals/{id}

use axum::{
    extract::{Path, Query, State},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::AdminPaginationQuery;
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{PagedResult, ReferralCode};
use crate::services::referral::{ReferralStats, ValidatedReferral};

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub code: String,
    /// Minor units; when given the discount amount is computed
    pub amount: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub active: bool,
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/referrals/my-code", get(my_code))
        .route("/referrals/validate", post(validate))
        .route("/referrals/stats", get(stats))
}

/// Nested under `/admin`
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/referrals", get(list_codes))
        .route("/referrals/{id}", put(set_active))
}

async fn my_code(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<ReferralCode>, ApiError> {
    Ok(Json(state.referral_service.get_or_create_code(&user.0).await?))
}

/// Rejections answer 400 with the reason as the message.
async fn validate(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<ValidateRequest>,
) -> Result<Json<ValidatedReferral>, ApiError> {
    if matches!(body.amount, Some(amount) if amount < 0) {
        return Err(ApiError::validation_error("Amount cannot be negative"));
    }
    Ok(Json(
        state
            .referral_service
            .validate(&user.0, &body.code, body.amount)
            .await?,
    ))
}

async fn stats(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<ReferralStats>, ApiError> {
    Ok(Json(state.referral_service.stats(&user.0).await?))
}

async fn list_codes(
    State(state): State<AppState>,
    Query(query): Query<AdminPaginationQuery>,
) -> Result<Json<PagedResult<ReferralCode>>, ApiError> {
    Ok(Json(state.referral_service.list_codes(&query.params()).await?))
}

async fn set_active(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<SetActiveRequest>,
) -> Result<Json<ReferralCode>, ApiError> {
    Ok(Json(state.referral_service.set_active(id, body.active).await?))
}
