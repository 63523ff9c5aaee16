//! Degree program API endpoints
//!
//! - GET /api/v1/degrees, GET /api/v1/degrees/{id} - Published programs
//! - POST /api/v1/degrees/{id}/enroll - Enroll in a free program
//! - GET /api/v1/me/degrees - Own degree enrollments
//! - /api/v1/admin/degrees... - Program CRUD, course list, enrollments

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{AdminPaginationQuery, PaginationQuery};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{
    CreateDegreeInput, DegreeDetail, DegreeEnrollment, DegreeEnrollmentStatus,
    DegreeEnrollmentWithProgram, DegreeProgram, PagedResult, UpdateDegreeInput,
};

#[derive(Debug, Deserialize)]
pub struct SetCoursesRequest {
    pub course_ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub struct EnrollmentStatusRequest {
    pub status: DegreeEnrollmentStatus,
}

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/degrees", get(list_degrees))
        .route("/degrees/{id}", get(get_degree))
}

pub fn protected_router() -> Router<AppState> {
    Router::new().route("/degrees/{id}/enroll", post(enroll))
}

pub fn me_router() -> Router<AppState> {
    Router::new().route("/degrees", get(my_degrees))
}

/// Nested under `/admin`
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/degrees", get(list_all_degrees).post(create_degree))
        .route(
            "/degrees/{id}",
            get(get_any_degree).put(update_degree).delete(delete_degree),
        )
        .route("/degrees/{id}/courses", put(set_courses))
        .route("/degrees/{id}/enrollments", get(list_enrollments))
        .route("/degree-enrollments/{id}", put(update_enrollment))
}

async fn list_degrees(
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<PagedResult<DegreeProgram>>, ApiError> {
    Ok(Json(state.degree_service.list_published(&query.params()).await?))
}

async fn get_degree(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<DegreeDetail>, ApiError> {
    Ok(Json(state.degree_service.get_detail(id, false).await?))
}

/// Also enrolls the user in every course of the program.
async fn enroll(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<DegreeEnrollment>), ApiError> {
    let enrollment = state.degree_service.enroll_free(&user.0, id).await?;
    Ok((StatusCode::CREATED, Json(enrollment)))
}

async fn my_degrees(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<DegreeEnrollmentWithProgram>>, ApiError> {
    Ok(Json(state.degree_service.list_for_user(user.0.id).await?))
}

async fn list_all_degrees(
    State(state): State<AppState>,
    Query(query): Query<AdminPaginationQuery>,
) -> Result<Json<PagedResult<DegreeProgram>>, ApiError> {
    Ok(Json(state.degree_service.list_all(&query.params()).await?))
}

async fn get_any_degree(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<DegreeDetail>, ApiError> {
    Ok(Json(state.degree_service.get_detail(id, true).await?))
}

async fn create_degree(
    State(state): State<AppState>,
    Json(body): Json<CreateDegreeInput>,
) -> Result<(StatusCode, Json<DegreeProgram>), ApiError> {
    let program = state.degree_service.create(body).await?;
    Ok((StatusCode::CREATED, Json(program)))
}

async fn update_degree(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateDegreeInput>,
) -> Result<Json<DegreeProgram>, ApiError> {
    Ok(Json(state.degree_service.update(id, body).await?))
}

async fn delete_degree(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.degree_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Replaces the program's course list, order preserved
async fn set_courses(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<SetCoursesRequest>,
) -> Result<Json<DegreeDetail>, ApiError> {
    Ok(Json(state.degree_service.set_courses(id, body.course_ids).await?))
}

async fn list_enrollments(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<DegreeEnrollment>>, ApiError> {
    Ok(Json(state.degree_service.list_enrollments(id).await?))
}

async fn update_enrollment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<EnrollmentStatusRequest>,
) -> Result<Json<DegreeEnrollment>, ApiError> {
    Ok(Json(
        state
            .degree_service
            .update_enrollment_status(id, body.status)
            .await?,
    ))
}
