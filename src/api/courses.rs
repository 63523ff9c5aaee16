//! Course API endpoints
//!
//! Public catalog:
//! - GET /api/v1/courses - Published courses, filterable
//! - GET /api/v1/courses/{slug} - Course page with curriculum
//! - POST /api/v1/courses/{id}/enroll - Enroll in a free course
//!
//! Authoring (instructors on their own courses, admins on any):
//! - /api/v1/instructor/courses, /instructor/modules, /instructor/lessons
//!
//! Admin:
//! - GET /api/v1/admin/courses - Every course regardless of status

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{default_page, default_page_size, default_per_page, non_empty, parse_filter};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, MaybeUser};
use crate::models::{
    Course, CourseDetail, CourseFilter, CourseModule, CreateCourseInput, CreateLessonInput,
    CreateModuleInput, Enrollment, Lesson, ListParams, PagedResult, UpdateCourseInput,
    UpdateLessonInput, UpdateModuleInput,
};
use crate::services::dashboard::InstructorDashboard;

/// Query parameters for the public catalog
#[derive(Debug, Deserialize)]
pub struct CatalogQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    pub category: Option<String>,
    pub level: Option<String>,
    pub search: Option<String>,
}

/// Query parameters for instructor and admin listings
#[derive(Debug, Deserialize)]
pub struct ManageQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    pub status: Option<String>,
    pub search: Option<String>,
}

impl ManageQuery {
    fn filter(&self) -> Result<CourseFilter, ApiError> {
        Ok(CourseFilter {
            status: parse_filter(self.status.as_deref(), "status")?,
            search: non_empty(self.search.clone()),
            ..Default::default()
        })
    }
}

/// Build public course routes (optional auth)
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/courses", get(list_courses))
        // `{id}` is the course slug here; the segment name is shared with
        // the enroll route below.
        .route("/courses/{id}", get(get_course))
}

/// Build protected course routes (requires auth middleware)
pub fn protected_router() -> Router<AppState> {
    Router::new().route("/courses/{id}/enroll", post(enroll))
}

/// Build authoring routes (requires instructor middleware), nested under `/instructor`
pub fn instructor_router() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(instructor_dashboard))
        .route("/courses", get(list_own_courses).post(create_course))
        .route(
            "/courses/{id}",
            get(get_curriculum).put(update_course).delete(delete_course),
        )
        .route("/courses/{id}/publish", post(publish_course))
        .route("/courses/{id}/modules", post(create_module))
        .route("/modules/{id}", put(update_module).delete(delete_module))
        .route("/modules/{id}/lessons", post(create_lesson))
        .route("/lessons/{id}", put(update_lesson).delete(delete_lesson))
}

/// Build admin course routes, nested under `/admin`
pub fn admin_router() -> Router<AppState> {
    Router::new().route("/courses", get(list_all_courses))
}

/// GET /api/v1/courses
async fn list_courses(
    State(state): State<AppState>,
    Query(query): Query<CatalogQuery>,
) -> Result<Json<PagedResult<Course>>, ApiError> {
    let filter = CourseFilter {
        category: non_empty(query.category),
        level: parse_filter(query.level.as_deref(), "level")?,
        search: non_empty(query.search),
        ..Default::default()
    };
    let params = ListParams::new(query.page, query.page_size);
    Ok(Json(state.course_service.list_published(filter, &params).await?))
}

/// GET /api/v1/courses/{slug}
///
/// Lesson bodies are hidden unless the lesson is a preview or the caller
/// is enrolled, owns the course, or is an admin.
async fn get_course(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(slug): Path<String>,
) -> Result<Json<CourseDetail>, ApiError> {
    let detail = state
        .course_service
        .get_detail_by_slug(&slug, viewer.as_ref())
        .await?;
    Ok(Json(detail))
}

/// POST /api/v1/courses/{id}/enroll
///
/// Free courses only; paid ones answer `PAYMENT_REQUIRED`.
async fn enroll(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<Enrollment>), ApiError> {
    let enrollment = state.enrollment_service.enroll_free(&user.0, id).await?;
    Ok((StatusCode::CREATED, Json(enrollment)))
}

/// GET /api/v1/instructor/dashboard
async fn instructor_dashboard(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<InstructorDashboard>, ApiError> {
    Ok(Json(state.dashboard_service.instructor(user.0.id).await?))
}

/// GET /api/v1/instructor/courses
async fn list_own_courses(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ManageQuery>,
) -> Result<Json<PagedResult<Course>>, ApiError> {
    let mut filter = query.filter()?;
    filter.instructor_id = Some(user.0.id);
    let params = ListParams::new(query.page, query.per_page);
    Ok(Json(state.course_service.list_all(&filter, &params).await?))
}

/// POST /api/v1/instructor/courses
async fn create_course(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateCourseInput>,
) -> Result<(StatusCode, Json<Course>), ApiError> {
    let course = state.course_service.create(&user.0, body).await?;
    Ok((StatusCode::CREATED, Json(course)))
}

/// GET /api/v1/instructor/courses/{id}
async fn get_curriculum(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<CourseDetail>, ApiError> {
    Ok(Json(state.course_service.get_curriculum(&user.0, id).await?))
}

/// PUT /api/v1/instructor/courses/{id}
async fn update_course(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateCourseInput>,
) -> Result<Json<Course>, ApiError> {
    Ok(Json(state.course_service.update(&user.0, id, body).await?))
}

/// DELETE /api/v1/instructor/courses/{id}
async fn delete_course(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.course_service.delete(&user.0, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/instructor/courses/{id}/publish
async fn publish_course(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Course>, ApiError> {
    Ok(Json(state.course_service.publish(&user.0, id).await?))
}

/// POST /api/v1/instructor/courses/{id}/modules
async fn create_module(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<CreateModuleInput>,
) -> Result<(StatusCode, Json<CourseModule>), ApiError> {
    let module = state.course_service.create_module(&user.0, id, body).await?;
    Ok((StatusCode::CREATED, Json(module)))
}

/// PUT /api/v1/instructor/modules/{id}
async fn update_module(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateModuleInput>,
) -> Result<Json<CourseModule>, ApiError> {
    Ok(Json(state.course_service.update_module(&user.0, id, body).await?))
}

/// DELETE /api/v1/instructor/modules/{id}
async fn delete_module(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.course_service.delete_module(&user.0, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/instructor/modules/{id}/lessons
async fn create_lesson(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<CreateLessonInput>,
) -> Result<(StatusCode, Json<Lesson>), ApiError> {
    let lesson = state.course_service.create_lesson(&user.0, id, body).await?;
    Ok((StatusCode::CREATED, Json(lesson)))
}

/// PUT /api/v1/instructor/lessons/{id}
async fn update_lesson(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateLessonInput>,
) -> Result<Json<Lesson>, ApiError> {
    Ok(Json(state.course_service.update_lesson(&user.0, id, body).await?))
}

/// DELETE /api/v1/instructor/lessons/{id}
async fn delete_lesson(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.course_service.delete_lesson(&user.0, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/admin/courses
async fn list_all_courses(
    State(state): State<AppState>,
    Query(query): Query<ManageQuery>,
) -> Result<Json<PagedResult<Course>>, ApiError> {
    let filter = query.filter()?;
    let params = ListParams::new(query.page, query.per_page);
    Ok(Json(state.course_service.list_all(&filter, &params).await?))
}
