//! Learner API endpoints, nested under `/api/v1/me`
//!
//! - GET /me/enrollments - Own course enrollments with progress
//! - POST /me/lessons/{lesson_id}/complete - Mark a lesson complete
//! - GET /me/courses/{course_id}/progress - Progress in one course
//! - GET /me/dashboard - Student dashboard

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{CourseProgress, EnrollmentWithCourse};
use crate::services::dashboard::StudentDashboard;

pub fn me_router() -> Router<AppState> {
    Router::new()
        .route("/enrollments", get(list_enrollments))
        .route("/lessons/{id}/complete", post(complete_lesson))
        .route("/courses/{id}/progress", get(get_progress))
        .route("/dashboard", get(student_dashboard))
}

async fn list_enrollments(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<EnrollmentWithCourse>>, ApiError> {
    Ok(Json(state.enrollment_service.list_for_user(user.0.id).await?))
}

/// Idempotent; recomputes the course's progress.
async fn complete_lesson(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(lesson_id): Path<i64>,
) -> Result<Json<CourseProgress>, ApiError> {
    Ok(Json(state.enrollment_service.complete_lesson(&user.0, lesson_id).await?))
}

async fn get_progress(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(course_id): Path<i64>,
) -> Result<Json<CourseProgress>, ApiError> {
    Ok(Json(state.enrollment_service.get_progress(&user.0, course_id).await?))
}

async fn student_dashboard(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<StudentDashboard>, ApiError> {
    Ok(Json(state.dashboard_service.student(user.0.id).await?))
}
