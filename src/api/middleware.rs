//! API middleware
//!
//! Contains:
//! - Application state shared by every handler
//! - The JSON error envelope and its mapping from service errors
//! - Authentication (session token from cookie or bearer header)
//! - Authorization (admin and instructor gates)

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::Config;
use crate::db::DynDatabasePool;
use crate::models::User;
use crate::services::{
    CategoryService, CategoryServiceError, CommentService, CommentServiceError, CourseService,
    CourseServiceError, DashboardService, DegreeService, DegreeServiceError, EnrollmentService,
    EnrollmentServiceError, LoginLimit, LoginRateLimiter, MentorshipService, MentorshipServiceError, OAuthError, OAuthService,
    PaymentService, PaymentServiceError, PostService, PostServiceError, ReferralError, ReferralService,
    SubscriptionService, SubscriptionServiceError, TagService, TagServiceError, UserService,
    UserServiceError,
};
use crate::storage::{StorageError, StorageService};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub config: Arc<Config>,
    pub user_service: Arc<UserService>,
    pub oauth_service: Arc<OAuthService>,
    pub course_service: Arc<CourseService>,
    pub enrollment_service: Arc<EnrollmentService>,
    pub degree_service: Arc<DegreeService>,
    pub mentorship_service: Arc<MentorshipService>,
    pub post_service: Arc<PostService>,
    pub category_service: Arc<CategoryService>,
    pub tag_service: Arc<TagService>,
    pub comment_service: Arc<CommentService>,
    pub payment_service: Arc<PaymentService>,
    pub referral_service: Arc<ReferralService>,
    pub subscription_service: Arc<SubscriptionService>,
    pub dashboard_service: Arc<DashboardService>,
    pub storage: Arc<StorageService>,
    pub rate_limiter: Arc<LoginRateLimiter>,
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// Caller on routes where signing in is optional
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(
            parts.extensions.get::<AuthenticatedUser>().map(|u| u.0.clone()),
        ))
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn banned() -> Self {
        Self::new("USER_BANNED", "Account is banned")
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn payment_required(message: impl Into<String>) -> Self {
        Self::new("PAYMENT_REQUIRED", message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new("BAD_GATEWAY", message)
    }

    pub fn rate_limited(limit: LoginLimit) -> Self {
        let message = match limit {
            LoginLimit::Ip => "Too many login requests, try again later",
            LoginLimit::Email => "Too many failed logins, try again in 15 minutes",
        };
        Self::with_details(
            "RATE_LIMIT",
            message,
            serde_json::json!({ "retry_after": limit.retry_after_secs() }),
        )
    }

    /// Logs the cause; the client only sees a generic message.
    pub fn internal(err: impl std::fmt::Display) -> Self {
        tracing::error!("Internal error: {:#}", err);
        Self::new("INTERNAL_ERROR", "Internal server error")
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "VALIDATION_ERROR" | "PAYMENT_REQUIRED" => StatusCode::BAD_REQUEST,
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" | "USER_BANNED" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "CONFLICT" => StatusCode::CONFLICT,
            "RATE_LIMIT" => StatusCode::TOO_MANY_REQUESTS,
            "BAD_GATEWAY" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::internal(err)
    }
}

impl From<UserServiceError> for ApiError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::AuthenticationError(msg) => ApiError::unauthorized(msg),
            UserServiceError::Banned => ApiError::banned(),
            UserServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            UserServiceError::UserExists(msg) => ApiError::conflict(msg),
            UserServiceError::NotFound(msg) => ApiError::not_found(msg),
            UserServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<OAuthError> for ApiError {
    fn from(err: OAuthError) -> Self {
        match err {
            OAuthError::UnknownProvider(name) => {
                ApiError::not_found(format!("Unknown OAuth provider: {}", name))
            }
            OAuthError::InvalidState => ApiError::validation_error(err.to_string()),
            OAuthError::Provider(msg) => ApiError::bad_gateway(msg),
            OAuthError::Banned => ApiError::banned(),
            OAuthError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<CourseServiceError> for ApiError {
    fn from(err: CourseServiceError) -> Self {
        match err {
            CourseServiceError::NotFound(what) => ApiError::not_found(format!("Not found: {}", what)),
            CourseServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            CourseServiceError::Forbidden => ApiError::forbidden(err.to_string()),
            CourseServiceError::SlugExists(_) => ApiError::conflict(err.to_string()),
            CourseServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<EnrollmentServiceError> for ApiError {
    fn from(err: EnrollmentServiceError) -> Self {
        match err {
            EnrollmentServiceError::NotFound(what) => ApiError::not_found(format!("Not found: {}", what)),
            EnrollmentServiceError::PaymentRequired => ApiError::payment_required(err.to_string()),
            EnrollmentServiceError::AlreadyEnrolled => ApiError::conflict(err.to_string()),
            EnrollmentServiceError::NotEnrolled => ApiError::forbidden(err.to_string()),
            EnrollmentServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<DegreeServiceError> for ApiError {
    fn from(err: DegreeServiceError) -> Self {
        match err {
            DegreeServiceError::NotFound(what) => ApiError::not_found(format!("Not found: {}", what)),
            DegreeServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            DegreeServiceError::SlugExists(_) | DegreeServiceError::AlreadyEnrolled => {
                ApiError::conflict(err.to_string())
            }
            DegreeServiceError::PaymentRequired => ApiError::payment_required(err.to_string()),
            DegreeServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<MentorshipServiceError> for ApiError {
    fn from(err: MentorshipServiceError) -> Self {
        match err {
            MentorshipServiceError::NotFound(what) => ApiError::not_found(format!("Not found: {}", what)),
            MentorshipServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            MentorshipServiceError::Forbidden | MentorshipServiceError::NotEnrolled => {
                ApiError::forbidden(err.to_string())
            }
            MentorshipServiceError::SlugExists(_)
            | MentorshipServiceError::AlreadyEnrolled
            | MentorshipServiceError::ProgramFull
            | MentorshipServiceError::SlotTaken => ApiError::conflict(err.to_string()),
            MentorshipServiceError::PaymentRequired => ApiError::payment_required(err.to_string()),
            MentorshipServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<PostServiceError> for ApiError {
    fn from(err: PostServiceError) -> Self {
        match err {
            PostServiceError::NotFound(what) => ApiError::not_found(format!("Post not found: {}", what)),
            PostServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            PostServiceError::Forbidden => ApiError::forbidden(err.to_string()),
            PostServiceError::SlugExists(_) => ApiError::conflict(err.to_string()),
            PostServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<CategoryServiceError> for ApiError {
    fn from(err: CategoryServiceError) -> Self {
        match err {
            CategoryServiceError::DuplicateSlug(_) => ApiError::conflict(err.to_string()),
            CategoryServiceError::NotFound(_) => ApiError::not_found(err.to_string()),
            CategoryServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            CategoryServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<TagServiceError> for ApiError {
    fn from(err: TagServiceError) -> Self {
        match err {
            TagServiceError::NotFound(_) => ApiError::not_found(err.to_string()),
            TagServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            TagServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<CommentServiceError> for ApiError {
    fn from(err: CommentServiceError) -> Self {
        match err {
            CommentServiceError::NotFound(_) => ApiError::not_found(err.to_string()),
            CommentServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            CommentServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<ReferralError> for ApiError {
    fn from(err: ReferralError) -> Self {
        match err {
            ReferralError::NotFound(_) => ApiError::not_found(err.to_string()),
            ReferralError::InternalError(e) => ApiError::internal(e),
            rejection => ApiError::validation_error(rejection.to_string()),
        }
    }
}

impl From<SubscriptionServiceError> for ApiError {
    fn from(err: SubscriptionServiceError) -> Self {
        match err {
            SubscriptionServiceError::NotFound(_) => ApiError::not_found(err.to_string()),
            SubscriptionServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            SubscriptionServiceError::SlugExists(_) => ApiError::conflict(err.to_string()),
            SubscriptionServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<PaymentServiceError> for ApiError {
    fn from(err: PaymentServiceError) -> Self {
        match err {
            PaymentServiceError::NotFound(what) => ApiError::not_found(format!("Not found: {}", what)),
            PaymentServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            PaymentServiceError::InvalidSignature => ApiError::validation_error(err.to_string()),
            PaymentServiceError::Forbidden => ApiError::forbidden(err.to_string()),
            PaymentServiceError::AlreadyOwned
            | PaymentServiceError::Unavailable(_)
            | PaymentServiceError::AlreadyProcessed
            | PaymentServiceError::NotRefundable => ApiError::conflict(err.to_string()),
            PaymentServiceError::Referral(e) => e.into(),
            PaymentServiceError::Gateway(e) => {
                tracing::warn!("Payment gateway error: {}", e);
                ApiError::bad_gateway("Payment gateway request failed")
            }
            PaymentServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotConfigured | StorageError::InvalidType(_) | StorageError::TooLarge { .. } => {
                ApiError::validation_error(err.to_string())
            }
            StorageError::Upstream(msg) => {
                tracing::warn!("Object storage upload failed: {}", msg);
                ApiError::bad_gateway("Upload to object storage failed")
            }
            StorageError::InternalError(e) => ApiError::internal(e),
        }
    }
}

// ============================================================================
// Authentication
// ============================================================================

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "session";

/// Session token from the `Authorization: Bearer` header or the session cookie
pub fn extract_session_token(headers: &axum::http::HeaderMap) -> Option<String> {
    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.trim().to_string());
            }
        }
    }

    if let Some(cookie_header) = headers.get(header::COOKIE) {
        if let Ok(cookie_str) = cookie_header.to_str() {
            for cookie in cookie_str.split(';') {
                if let Some((name, value)) = cookie.trim().split_once('=') {
                    if name == SESSION_COOKIE && !value.is_empty() {
                        return Some(value.to_string());
                    }
                }
            }
        }
    }

    None
}

/// Authentication middleware
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_session_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    let user = state
        .user_service
        .validate_session(&token)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired session"))?;

    if user.is_banned() {
        return Err(ApiError::banned());
    }

    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}

/// Attaches the caller when a valid session is present, never rejects
pub async fn optional_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = extract_session_token(request.headers()) {
        if let Ok(Some(user)) = state.user_service.validate_session(&token).await {
            if !user.is_banned() {
                request.extensions_mut().insert(AuthenticatedUser(user));
            }
        }
    }
    next.run(request).await
}

/// Admin authorization middleware
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if !user.0.is_admin() {
        return Err(ApiError::forbidden("Admin privileges required"));
    }

    Ok(next.run(request).await)
}

/// Instructor authorization middleware, admins pass too
pub async fn require_instructor(request: Request, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if !user.0.is_instructor() {
        return Err(ApiError::forbidden("Instructor privileges required"));
    }

    Ok(next.run(request).await)
}
