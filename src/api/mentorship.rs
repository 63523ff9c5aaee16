//! Mentorship API endpoints
//!
//! Programs:
//! - GET /api/v1/mentorship/programs, GET /mentorship/programs/{id}
//! - POST /mentorship/programs/{id}/enroll - Free programs only
//!
//! Scheduling:
//! - GET /mentorship/mentors/{mentor_id}/availability?date=YYYY-MM-DD
//! - POST /mentorship/sessions - Book an available slot
//! - PUT /mentorship/sessions/{id}/cancel | complete | meeting
//! - GET /me/mentorship/sessions?role=mentee|mentor
//!
//! Admin: program CRUD under /admin/mentorship/programs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;

use crate::api::common::{AdminPaginationQuery, PaginationQuery};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{
    BookSessionInput, CreateMentorshipProgramInput, MentorshipEnrollment, MentorshipProgram,
    MentorshipSession, PagedResult, TimeSlot, UpdateMentorshipProgramInput,
};
use crate::services::SessionRole;

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub date: String,
}

#[derive(Debug, Deserialize)]
pub struct SessionsQuery {
    #[serde(default)]
    pub role: SessionRole,
}

#[derive(Debug, Default, Deserialize)]
pub struct CompleteSessionRequest {
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MeetingUrlRequest {
    pub meeting_url: String,
}

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/mentorship/programs", get(list_programs))
        .route("/mentorship/programs/{id}", get(get_program))
        .route("/mentorship/mentors/{id}/availability", get(availability))
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/mentorship/programs/{id}/enroll", post(enroll))
        .route("/mentorship/sessions", post(book_session))
        .route("/mentorship/sessions/{id}/cancel", put(cancel_session))
        .route("/mentorship/sessions/{id}/complete", put(complete_session))
        .route("/mentorship/sessions/{id}/meeting", put(set_meeting_url))
}

pub fn me_router() -> Router<AppState> {
    Router::new().route("/mentorship/sessions", get(my_sessions))
}

/// Nested under `/admin`
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route(
            "/mentorship/programs",
            get(list_all_programs).post(create_program),
        )
        .route(
            "/mentorship/programs/{id}",
            get(get_any_program).put(update_program).delete(delete_program),
        )
}

async fn list_programs(
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<PagedResult<MentorshipProgram>>, ApiError> {
    Ok(Json(state.mentorship_service.list_published(&query.params()).await?))
}

async fn get_program(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<MentorshipProgram>, ApiError> {
    Ok(Json(state.mentorship_service.get_published_program(id).await?))
}

/// Free slots of a mentor on one local calendar day, in UTC
async fn availability(
    State(state): State<AppState>,
    Path(mentor_id): Path<i64>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<Vec<TimeSlot>>, ApiError> {
    let date = NaiveDate::parse_from_str(query.date.trim(), "%Y-%m-%d")
        .map_err(|_| ApiError::validation_error("date must be YYYY-MM-DD"))?;
    Ok(Json(state.mentorship_service.availability(mentor_id, date).await?))
}

async fn enroll(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<MentorshipEnrollment>), ApiError> {
    let enrollment = state.mentorship_service.enroll_free(&user.0, id).await?;
    Ok((StatusCode::CREATED, Json(enrollment)))
}

/// Taken slot → 409; not a slot or in the past → 400
async fn book_session(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<BookSessionInput>,
) -> Result<(StatusCode, Json<MentorshipSession>), ApiError> {
    let session = state.mentorship_service.book_session(&user.0, body).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn cancel_session(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<MentorshipSession>, ApiError> {
    Ok(Json(state.mentorship_service.cancel_session(&user.0, id).await?))
}

async fn complete_session(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    body: Option<Json<CompleteSessionRequest>>,
) -> Result<Json<MentorshipSession>, ApiError> {
    let notes = body.and_then(|Json(b)| b.notes);
    Ok(Json(
        state
            .mentorship_service
            .complete_session(&user.0, id, notes)
            .await?,
    ))
}

async fn set_meeting_url(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<MeetingUrlRequest>,
) -> Result<Json<MentorshipSession>, ApiError> {
    Ok(Json(
        state
            .mentorship_service
            .set_meeting_url(&user.0, id, &body.meeting_url)
            .await?,
    ))
}

async fn my_sessions(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<SessionsQuery>,
) -> Result<Json<Vec<MentorshipSession>>, ApiError> {
    Ok(Json(state.mentorship_service.list_sessions(&user.0, query.role).await?))
}

async fn list_all_programs(
    State(state): State<AppState>,
    Query(query): Query<AdminPaginationQuery>,
) -> Result<Json<PagedResult<MentorshipProgram>>, ApiError> {
    Ok(Json(state.mentorship_service.list_all(&query.params()).await?))
}

async fn get_any_program(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<MentorshipProgram>, ApiError> {
    Ok(Json(state.mentorship_service.get_program(id).await?))
}

async fn create_program(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateMentorshipProgramInput>,
) -> Result<(StatusCode, Json<MentorshipProgram>), ApiError> {
    let program = state.mentorship_service.create_program(&user.0, body).await?;
    Ok((StatusCode::CREATED, Json(program)))
}

async fn update_program(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateMentorshipProgramInput>,
) -> Result<Json<MentorshipProgram>, ApiError> {
    Ok(Json(state.mentorship_service.update_program(id, body).await?))
}

async fn delete_program(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.mentorship_service.delete_program(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
