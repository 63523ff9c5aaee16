//! Authentication API endpoints
//!
//! Handles HTTP requests for user authentication:
//! - POST /api/v1/auth/register - Password registration
//! - POST /api/v1/auth/login - Password login
//! - POST /api/v1/auth/logout - End the current session
//! - GET /api/v1/auth/me - Current user
//! - PUT /api/v1/auth/profile - Update own profile
//! - PUT /api/v1/auth/password - Change password
//! - GET /api/v1/auth/oauth/{provider} - Start an OAuth sign-in
//! - GET /api/v1/auth/oauth/{provider}/callback - Finish an OAuth sign-in

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::api::common::{clear_session_cookie, session_cookie};
use crate::api::middleware::{extract_session_token, ApiError, AppState, AuthenticatedUser};
use crate::models::{UpdateProfileInput, User};
use crate::services::user::{LoginInput, RegisterInput, UserServiceError};

/// Request body for user registration
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Request body for user login
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body for changing the password
#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct OAuthStartQuery {
    pub redirect_to: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: String,
    pub state: String,
}

/// Response for successful authentication
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_to: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthorizationUrlResponse {
    pub url: String,
}

/// Response for user info
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: String,
    pub status: String,
    pub image: Option<String>,
    pub avatar: String,
    pub bio: Option<String>,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            avatar: user.avatar_url(),
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role.to_string(),
            status: user.status.to_string(),
            image: user.image,
            bio: user.bio,
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

/// Build protected auth routes (requires auth middleware)
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/me", get(get_current_user))
        .route("/profile", put(update_profile))
        .route("/password", put(change_password))
}

/// Build public auth routes (no auth required)
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/oauth/{provider}", get(oauth_start))
        .route("/oauth/{provider}/callback", get(oauth_callback))
}

/// POST /api/v1/auth/register - User registration
///
/// The first account ever registered becomes the admin.
async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .user_service
        .register(RegisterInput::new(body.name, body.email, body.password))
        .await?;
    let session = state.user_service.create_session(user.id).await?;
    let headers = session_cookie(&session.id, state.user_service.session_days())?;

    Ok((
        StatusCode::CREATED,
        headers,
        Json(AuthResponse {
            user: user.into(),
            token: session.id,
            redirect_to: None,
        }),
    ))
}

/// POST /api/v1/auth/login - User login
///
/// Throttled per client IP and per email; see [`crate::services::LoginRateLimiter`].
async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ip = client_ip(&headers);
    if let Err(limit) = state.rate_limiter.check(&body.email, ip).await {
        tracing::warn!(email = %body.email, ?ip, ?limit, "Login throttled");
        return Err(ApiError::rate_limited(limit));
    }

    let (user, session) = match state
        .user_service
        .login(LoginInput::new(body.email.clone(), body.password))
        .await
    {
        Ok(result) => result,
        Err(e) => {
            if matches!(e, UserServiceError::AuthenticationError(_)) {
                state.rate_limiter.record_failure(&body.email).await;
            }
            return Err(e.into());
        }
    };
    state.rate_limiter.clear(&body.email).await;
    let headers = session_cookie(&session.id, state.user_service.session_days())?;

    Ok((
        headers,
        Json(AuthResponse {
            user: user.into(),
            token: session.id,
            redirect_to: None,
        }),
    ))
}

/// POST /api/v1/auth/logout - User logout
async fn logout(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let token = extract_session_token(&headers)
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;
    state.user_service.logout(&token).await?;

    Ok((StatusCode::NO_CONTENT, clear_session_cookie()))
}

/// GET /api/v1/auth/me - Get current user
async fn get_current_user(user: AuthenticatedUser) -> Json<UserResponse> {
    Json(user.0.into())
}

/// PUT /api/v1/auth/profile - Update current user's profile
async fn update_profile(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<UpdateProfileInput>,
) -> Result<Json<UserResponse>, ApiError> {
    let updated = state.user_service.update_profile(user.0.id, body).await?;
    Ok(Json(updated.into()))
}

/// PUT /api/v1/auth/password - Change password
///
/// Every other session is revoked; the caller gets a fresh cookie.
async fn change_password(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .user_service
        .change_password(user.0.id, &body.current_password, &body.new_password)
        .await?;
    let headers = session_cookie(&session.id, state.user_service.session_days())?;

    Ok((StatusCode::NO_CONTENT, headers))
}

/// GET /api/v1/auth/oauth/{provider} - Authorization URL for a provider
async fn oauth_start(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<OAuthStartQuery>,
) -> Result<Json<AuthorizationUrlResponse>, ApiError> {
    let url = state
        .oauth_service
        .authorization_url(&provider, query.redirect_to)
        .await?;
    Ok(Json(AuthorizationUrlResponse { url }))
}

/// GET /api/v1/auth/oauth/{provider}/callback - Exchange the code, sign in
async fn oauth_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<OAuthCallbackQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (user, session, redirect_to) = state
        .oauth_service
        .handle_callback(&provider, &query.code, &query.state)
        .await?;
    let headers = session_cookie(&session.id, state.user_service.session_days())?;

    Ok((
        headers,
        Json(AuthResponse {
            user: user.into(),
            token: session.id,
            redirect_to,
        }),
    ))
}

/// First hop of `X-Forwarded-For`, else `X-Real-IP`
fn client_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next());
    let real_ip = || headers.get("x-real-ip").and_then(|v| v.to_str().ok());

    forwarded
        .or_else(real_ip)
        .and_then(|ip| ip.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_client_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(client_ip(&headers), "10.0.0.2".parse().ok());

        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        assert_eq!(client_ip(&headers), "203.0.113.7".parse().ok());
    }

    #[test]
    fn test_client_ip_ignores_garbage() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers), None);
        headers.insert("x-forwarded-for", HeaderValue::from_static("unknown"));
        assert_eq!(client_ip(&headers), None);
    }
}
