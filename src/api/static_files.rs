//! Static file serving
//!
//! Uploaded files are served from `upload.path` under `/uploads`. When
//! `server.static_dir` is set, the built web client is served from it with
//! `index.html` answering unknown paths so client-side routes resolve.

use std::path::Path;

use axum::{http::Uri, Router};
use tower_http::services::{ServeDir, ServeFile};

use crate::api::middleware::ApiError;

/// `/uploads` plus the optional client fallback
pub fn attach(router: Router, upload_dir: &Path, static_dir: Option<&Path>) -> Router {
    let router = router.nest_service("/uploads", ServeDir::new(upload_dir));

    match static_dir {
        Some(dir) => {
            tracing::info!("Serving web client from {}", dir.display());
            router.fallback_service(
                ServeDir::new(dir).fallback(ServeFile::new(dir.join("index.html"))),
            )
        }
        None => router.fallback(not_found),
    }
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::not_found(format!("No route for {}", uri.path()))
}
