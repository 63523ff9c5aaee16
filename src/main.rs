//! Kalpla - E-learning and startup mentorship platform

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kalpla::{
    api::{self, AppState},
    app,
    config::Config,
    db,
    gateway::RazorpayGateway,
    services::EmailService,
};

/// Interval of the expiry sweeps
const CLEANUP_INTERVAL_SECS: u64 = 3600;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kalpla=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Kalpla...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    // Run migrations
    db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    if !config.payment.is_configured() {
        tracing::warn!("Razorpay keys are not set; checkout is disabled");
    }
    let gateway = Arc::new(RazorpayGateway::new(config.payment.clone())?);

    let email = Arc::new(EmailService::new(config.smtp.clone())?);
    if !email.is_enabled() {
        tracing::info!("SMTP disabled; notification emails will be skipped");
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = app::build_state(config, pool, gateway, email);

    spawn_cleanup(state.clone());

    // Build router
    let router = api::build_router(state)?;

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, router).await?;

    Ok(())
}

/// Hourly sweep of expired sessions, OAuth states, subscriptions and
/// login throttle windows
fn spawn_cleanup(state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(CLEANUP_INTERVAL_SECS));
        loop {
            interval.tick().await;

            match state.user_service.cleanup_expired_sessions().await {
                Ok(0) => {}
                Ok(n) => tracing::info!("Removed {} expired sessions", n),
                Err(e) => tracing::warn!("Session cleanup failed: {}", e),
            }
            if let Err(e) = state.oauth_service.cleanup_expired_states().await {
                tracing::warn!("OAuth state cleanup failed: {}", e);
            }
            match state.subscription_service.expire_lapsed().await {
                Ok(0) => {}
                Ok(n) => tracing::info!("Expired {} subscriptions", n),
                Err(e) => tracing::warn!("Subscription expiry failed: {}", e),
            }
            state.rate_limiter.cleanup().await;
        }
    });
}
