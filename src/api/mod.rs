//! API layer - HTTP handlers and routing
//!
//! Everything lives under `/api/v1`. Routes are grouped by the gate in
//! front of them:
//! - public (caller attached when a session is present)
//! - authenticated
//! - instructor (instructors and admins)
//! - admin
//!
//! Outside `/api/v1` the router serves uploaded files and, when
//! configured, the built web client.

pub mod admin;
pub mod auth;
pub mod categories;
pub mod comments;
pub mod common;
pub mod courses;
pub mod degrees;
pub mod enrollments;
pub mod health;
pub mod mentorship;
pub mod middleware;
pub mod payments;
pub mod plans;
pub mod posts;
pub mod referrals;
pub mod static_files;
pub mod tags;
pub mod upload;

use anyhow::Context;
use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

pub use middleware::{ApiError, AppState, AuthenticatedUser, MaybeUser};

/// Build the `/api/v1` router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Admin routes (need admin role)
    let admin_routes = Router::new()
        .nest(
            "/admin",
            admin::router()
                .merge(courses::admin_router())
                .merge(degrees::admin_router())
                .merge(mentorship::admin_router())
                .merge(comments::admin_router())
                .merge(payments::admin_router())
                .merge(referrals::admin_router())
                .merge(plans::admin_router()),
        )
        .route_layer(axum_middleware::from_fn(middleware::require_admin))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Authoring routes (instructors and admins)
    let instructor_routes = Router::new()
        .nest("/instructor", courses::instructor_router())
        .nest("/admin", posts::author_router())
        .route_layer(axum_middleware::from_fn(middleware::require_instructor))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Protected routes (need auth but no particular role)
    let protected_routes = Router::new()
        .nest("/auth", auth::protected_router())
        .nest(
            "/me",
            enrollments::me_router()
                .merge(degrees::me_router())
                .merge(mentorship::me_router())
                .merge(payments::me_router())
                .merge(plans::me_router()),
        )
        .nest("/upload", upload::router(state.config.upload.max_file_size))
        .merge(courses::protected_router())
        .merge(degrees::protected_router())
        .merge(mentorship::protected_router())
        .merge(comments::protected_router())
        .merge(payments::protected_router())
        .merge(referrals::protected_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Public routes
    Router::new()
        .merge(health::router())
        .nest("/auth", auth::public_router())
        .nest("/categories", categories::router())
        .nest("/tags", tags::router())
        .merge(courses::public_router())
        .merge(degrees::public_router())
        .merge(mentorship::public_router())
        .merge(posts::public_router())
        .merge(comments::public_router())
        .merge(payments::public_router())
        .merge(plans::public_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::optional_auth,
        ))
        .merge(admin_routes)
        .merge(instructor_routes)
        .merge(protected_routes)
}

/// CORS for the configured client origin, with cookies allowed.
///
/// `*` mirrors the request origin, since credentials rule out a literal
/// wildcard.
pub fn cors_layer(cors_origin: &str) -> anyhow::Result<CorsLayer> {
    let origin = if cors_origin.trim() == "*" {
        AllowOrigin::mirror_request()
    } else {
        let value = cors_origin
            .trim()
            .parse::<HeaderValue>()
            .with_context(|| format!("Invalid CORS origin: {}", cors_origin))?;
        AllowOrigin::exact(value)
    };

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .allow_credentials(true))
}

/// Build the complete router with middleware
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let config = state.config.clone();
    let cors = cors_layer(&config.server.cors_origin)?;

    let router = Router::new()
        .nest("/api/v1", build_api_router(state.clone()))
        .with_state(state);

    Ok(
        static_files::attach(router, &config.upload.path, config.server.static_dir.as_deref()).layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(CompressionLayer::new()),
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cors_origin_parsing() {
        assert!(cors_layer("http://localhost:3000").is_ok());
        assert!(cors_layer("*").is_ok());
        assert!(cors_layer("http://bad\norigin").is_err());
    }
}
