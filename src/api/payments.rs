//! Payment API endpoints
//!
//! - POST /api/v1/payments/orders - Price an item and open a gateway order
//! - POST /api/v1/payments/verify - Check the checkout signature and fulfil
//! - POST /api/v1/payments/webhook - Gateway events, signed over the raw body
//! - GET /api/v1/me/payments - Own payment history
//! - GET /api/v1/admin/payments?status - Every payment
//! - POST /api/v1/admin/payments/{id}/refund - Refund and revoke access

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::common::{default_page, default_per_page, parse_filter, AdminPaginationQuery};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{
    CheckoutOrder, CreateOrderInput, ListParams, PagedResult, Payment, PaymentFilter,
    PaymentWithOrder, VerifyPaymentInput,
};
use crate::services::WebhookOutcome;

/// Header carrying the webhook HMAC
pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";

#[derive(Debug, Deserialize)]
pub struct AdminPaymentsQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
    pub outcome: WebhookOutcome,
}

pub fn public_router() -> Router<AppState> {
    Router::new().route("/payments/webhook", post(webhook))
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/payments/orders", post(create_order))
        .route("/payments/verify", post(verify_payment))
}

pub fn me_router() -> Router<AppState> {
    Router::new().route("/payments", get(my_payments))
}

/// Nested under `/admin`
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/payments", get(list_payments))
        .route("/payments/{id}/refund", post(refund_payment))
}

/// POST /api/v1/payments/orders
async fn create_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateOrderInput>,
) -> Result<(StatusCode, Json<CheckoutOrder>), ApiError> {
    let order = state.payment_service.create_order(&user.0, body).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// POST /api/v1/payments/verify
///
/// A bad signature leaves the payment pending; a second verification of a
/// settled payment answers 409.
async fn verify_payment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<VerifyPaymentInput>,
) -> Result<Json<Payment>, ApiError> {
    Ok(Json(state.payment_service.verify(&user.0, body).await?))
}

/// POST /api/v1/payments/webhook
///
/// The body is taken raw: the signature covers the exact bytes sent.
async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::validation_error("Missing webhook signature"))?;

    let outcome = state.payment_service.handle_webhook(&body, signature).await?;
    Ok(Json(WebhookResponse {
        status: "ok",
        outcome,
    }))
}

/// GET /api/v1/me/payments
async fn my_payments(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<AdminPaginationQuery>,
) -> Result<Json<PagedResult<PaymentWithOrder>>, ApiError> {
    Ok(Json(
        state
            .payment_service
            .list_for_user(user.0.id, &query.params())
            .await?,
    ))
}

/// GET /api/v1/admin/payments
async fn list_payments(
    State(state): State<AppState>,
    Query(query): Query<AdminPaymentsQuery>,
) -> Result<Json<PagedResult<PaymentWithOrder>>, ApiError> {
    let filter = PaymentFilter {
        status: parse_filter(query.status.as_deref(), "status")?,
        user_id: None,
    };
    let params = ListParams::new(query.page, query.per_page);
    Ok(Json(state.payment_service.list(&filter, &params).await?))
}

/// POST /api/v1/admin/payments/{id}/refund
async fn refund_payment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Payment>, ApiError> {
    Ok(Json(state.payment_service.refund(id).await?))
}
