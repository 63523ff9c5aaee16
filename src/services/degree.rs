//! Degree programs
//!
//! A program bundles an ordered list of courses. Enrolling in a program
//! enrolls the student in each of its courses.

use std::sync::Arc;

use chrono::Utc;

use crate::db::is_unique_violation;
use crate::db::repositories::{CourseRepository, DegreeRepository, EnrollmentRepository};
use crate::models::{
    normalize_currency, CreateDegreeInput, DegreeDetail, DegreeEnrollment, DegreeEnrollmentStatus,
    DegreeEnrollmentWithProgram, DegreeProgram, ListParams, PagedResult, PublishStatus,
    UpdateDegreeInput, User, DEFAULT_CURRENCY,
};
use crate::services::email::EmailService;
use crate::services::slug::resolve_slug;

#[derive(Debug, thiserror::Error)]
pub enum DegreeServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Program slug already exists: {0}")]
    SlugExists(String),

    #[error("Payment required to enroll in this program")]
    PaymentRequired,

    #[error("Already enrolled")]
    AlreadyEnrolled,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct DegreeService {
    repo: Arc<dyn DegreeRepository>,
    course_repo: Arc<dyn CourseRepository>,
    enrollment_repo: Arc<dyn EnrollmentRepository>,
    email: Arc<EmailService>,
}

impl DegreeService {
    pub fn new(
        repo: Arc<dyn DegreeRepository>,
        course_repo: Arc<dyn CourseRepository>,
        enrollment_repo: Arc<dyn EnrollmentRepository>,
        email: Arc<EmailService>,
    ) -> Self {
        Self {
            repo,
            course_repo,
            enrollment_repo,
            email,
        }
    }

    pub async fn list_published(&self, params: &ListParams) -> Result<PagedResult<DegreeProgram>, DegreeServiceError> {
        let (items, total) = self.repo.list(Some(PublishStatus::Published), params).await?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn list_all(&self, params: &ListParams) -> Result<PagedResult<DegreeProgram>, DegreeServiceError> {
        let (items, total) = self.repo.list(None, params).await?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn get_by_id(&self, id: i64) -> Result<DegreeProgram, DegreeServiceError> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| DegreeServiceError::NotFound(format!("program {}", id)))
    }

    /// Program with its courses. Drafts are only returned when
    /// `include_unpublished` is set.
    pub async fn get_detail(&self, id: i64, include_unpublished: bool) -> Result<DegreeDetail, DegreeServiceError> {
        let program = self.get_by_id(id).await?;
        if program.status != PublishStatus::Published && !include_unpublished {
            return Err(DegreeServiceError::NotFound(format!("program {}", id)));
        }

        let ids = self.repo.course_ids(id).await?;
        let mut courses = self.course_repo.get_many(&ids).await?;
        courses.sort_by_key(|c| ids.iter().position(|id| *id == c.id));
        if !include_unpublished {
            courses.retain(|c| c.is_published());
        }

        Ok(DegreeDetail { program, courses })
    }

    pub async fn create(&self, input: CreateDegreeInput) -> Result<DegreeProgram, DegreeServiceError> {
        let title = input.title.trim();
        if title.is_empty() {
            return Err(DegreeServiceError::ValidationError("Title cannot be empty".into()));
        }
        validate_amounts(input.price, input.duration_months)?;
        let slug = resolve_slug(input.slug.as_deref(), title)
            .ok_or_else(|| DegreeServiceError::ValidationError("Slug cannot be empty".into()))?;

        let now = Utc::now();
        let program = DegreeProgram {
            id: 0,
            slug: slug.clone(),
            title: title.to_string(),
            description: input.description,
            duration_months: input.duration_months,
            price: input.price,
            currency: resolve_currency(input.currency.as_deref())?,
            status: input.status,
            created_at: now,
            updated_at: now,
        };

        let created = self.repo.create(&program).await.map_err(|e| slug_conflict(e, &slug))?;
        tracing::info!(program_id = created.id, "Degree program created");
        Ok(created)
    }

    pub async fn update(&self, id: i64, input: UpdateDegreeInput) -> Result<DegreeProgram, DegreeServiceError> {
        let mut program = self.get_by_id(id).await?;

        if let Some(title) = input.title {
            let title = title.trim();
            if title.is_empty() {
                return Err(DegreeServiceError::ValidationError("Title cannot be empty".into()));
            }
            program.title = title.to_string();
        }
        if let Some(slug) = input.slug {
            program.slug = resolve_slug(Some(&slug), &program.title)
                .ok_or_else(|| DegreeServiceError::ValidationError("Slug cannot be empty".into()))?;
        }
        if let Some(description) = input.description {
            program.description = description;
        }
        if let Some(months) = input.duration_months {
            program.duration_months = months;
        }
        if let Some(price) = input.price {
            program.price = price;
        }
        if let Some(currency) = input.currency {
            program.currency = resolve_currency(Some(&currency))?;
        }
        if let Some(status) = input.status {
            program.status = status;
        }
        validate_amounts(program.price, program.duration_months)?;
        program.updated_at = Utc::now();

        let slug = program.slug.clone();
        Ok(self.repo.update(&program).await.map_err(|e| slug_conflict(e, &slug))?)
    }

    pub async fn delete(&self, id: i64) -> Result<(), DegreeServiceError> {
        self.get_by_id(id).await?;
        self.repo.delete(id).await?;
        tracing::info!(program_id = id, "Degree program deleted");
        Ok(())
    }

    /// Replace the program's courses, keeping the given order
    pub async fn set_courses(&self, id: i64, course_ids: Vec<i64>) -> Result<DegreeDetail, DegreeServiceError> {
        self.get_by_id(id).await?;

        let mut unique = Vec::with_capacity(course_ids.len());
        for course_id in course_ids {
            if !unique.contains(&course_id) {
                unique.push(course_id);
            }
        }
        let found = self.course_repo.get_many(&unique).await?;
        if let Some(missing) = unique.iter().find(|id| !found.iter().any(|c| c.id == **id)) {
            return Err(DegreeServiceError::ValidationError(format!("Unknown course: {}", missing)));
        }

        self.repo.set_courses(id, &unique).await?;
        self.get_detail(id, true).await
    }

    /// Enroll `user` in a free, published program
    pub async fn enroll_free(&self, user: &User, program_id: i64) -> Result<DegreeEnrollment, DegreeServiceError> {
        let program = self
            .repo
            .get_by_id(program_id)
            .await?
            .filter(|p| p.status == PublishStatus::Published)
            .ok_or_else(|| DegreeServiceError::NotFound(format!("program {}", program_id)))?;
        if program.price > 0 {
            return Err(DegreeServiceError::PaymentRequired);
        }

        if let Some(existing) = self.repo.get_enrollment(user.id, program_id).await? {
            if existing.status != DegreeEnrollmentStatus::Withdrawn {
                return Err(DegreeServiceError::AlreadyEnrolled);
            }
        }

        match self.repo.create_enrollment(user.id, program_id, None).await {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => self.repo.grant_enrollment(user.id, program_id, None).await?,
            Err(e) => return Err(e.into()),
        }
        self.grant_courses(user.id, program_id, None).await?;

        tracing::info!(user_id = user.id, program_id, "Enrolled in free degree program");
        if let Err(e) = self
            .email
            .send_enrollment_confirmation(&user.email, &user.name, &program.title)
            .await
        {
            tracing::warn!("Failed to send enrollment confirmation: {}", e);
        }

        self.repo
            .get_enrollment(user.id, program_id)
            .await?
            .ok_or_else(|| DegreeServiceError::NotFound(format!("program {}", program_id)))
    }

    pub async fn has_access(&self, user_id: i64, program_id: i64) -> Result<bool, DegreeServiceError> {
        Ok(self
            .repo
            .get_enrollment(user_id, program_id)
            .await?
            .is_some_and(|e| e.status != DegreeEnrollmentStatus::Withdrawn))
    }

    /// Idempotent grant used after a successful payment
    pub async fn grant_access(&self, user_id: i64, program_id: i64, order_id: i64) -> Result<(), DegreeServiceError> {
        self.repo.grant_enrollment(user_id, program_id, Some(order_id)).await?;
        self.grant_courses(user_id, program_id, Some(order_id)).await
    }

    /// Withdraw the program and cancel the course grants of a refunded order
    pub async fn revoke_by_order(&self, order_id: i64) -> Result<u64, DegreeServiceError> {
        let withdrawn = self.repo.withdraw_by_order(order_id).await?;
        self.enrollment_repo.cancel_by_order(order_id).await?;
        Ok(withdrawn)
    }

    async fn grant_courses(&self, user_id: i64, program_id: i64, order_id: Option<i64>) -> Result<(), DegreeServiceError> {
        for course_id in self.repo.course_ids(program_id).await? {
            self.enrollment_repo.grant(user_id, course_id, order_id).await?;
        }
        Ok(())
    }

    pub async fn list_for_user(&self, user_id: i64) -> Result<Vec<DegreeEnrollmentWithProgram>, DegreeServiceError> {
        Ok(self.repo.list_enrollments_for_user(user_id).await?)
    }

    pub async fn list_enrollments(&self, program_id: i64) -> Result<Vec<DegreeEnrollment>, DegreeServiceError> {
        self.get_by_id(program_id).await?;
        Ok(self.repo.list_enrollments_for_program(program_id).await?)
    }

    pub async fn update_enrollment_status(
        &self,
        enrollment_id: i64,
        status: DegreeEnrollmentStatus,
    ) -> Result<DegreeEnrollment, DegreeServiceError> {
        let enrollment = self
            .repo
            .get_enrollment_by_id(enrollment_id)
            .await?
            .ok_or_else(|| DegreeServiceError::NotFound(format!("enrollment {}", enrollment_id)))?;
        if enrollment.status == status {
            return Ok(enrollment);
        }

        self.repo.update_enrollment_status(enrollment_id, status).await?;
        tracing::info!(enrollment_id, status = %status, "Degree enrollment status changed");
        Ok(DegreeEnrollment { status, ..enrollment })
    }
}

fn validate_amounts(price: i64, duration_months: i32) -> Result<(), DegreeServiceError> {
    if price < 0 {
        return Err(DegreeServiceError::ValidationError("Price cannot be negative".into()));
    }
    if duration_months < 0 {
        return Err(DegreeServiceError::ValidationError("Duration cannot be negative".into()));
    }
    Ok(())
}

fn resolve_currency(currency: Option<&str>) -> Result<String, DegreeServiceError> {
    match currency {
        None => Ok(DEFAULT_CURRENCY.to_string()),
        Some(code) => normalize_currency(code)
            .ok_or_else(|| DegreeServiceError::ValidationError(format!("Invalid currency: {}", code))),
    }
}

fn slug_conflict(err: anyhow::Error, slug: &str) -> DegreeServiceError {
    if is_unique_violation(&err) {
        DegreeServiceError::SlugExists(slug.to_string())
    } else {
        DegreeServiceError::InternalError(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_course, insert_user, setup_pool};
    use crate::db::repositories::{SqlxCourseRepository, SqlxDegreeRepository, SqlxEnrollmentRepository};
    use crate::db::DynDatabasePool;
    use crate::models::UserRole;

    async fn setup() -> (DegreeService, DynDatabasePool) {
        let pool = setup_pool().await;
        let service = DegreeService::new(
            SqlxDegreeRepository::boxed(pool.clone()),
            SqlxCourseRepository::boxed(pool.clone()),
            SqlxEnrollmentRepository::boxed(pool.clone()),
            Arc::new(EmailService::disabled()),
        );
        (service, pool)
    }

    fn input(title: &str, price: i64, status: PublishStatus) -> CreateDegreeInput {
        CreateDegreeInput {
            slug: None,
            title: title.into(),
            description: String::new(),
            duration_months: 12,
            price,
            currency: None,
            status,
        }
    }

    #[tokio::test]
    async fn test_courses_keep_program_order() {
        let (service, pool) = setup().await;
        let instructor = insert_user(&pool, "teach@example.com").await;
        let a = insert_course(&pool, instructor, "a", 0, PublishStatus::Published).await;
        let b = insert_course(&pool, instructor, "b", 0, PublishStatus::Published).await;

        let program = service.create(input("Data Science", 0, PublishStatus::Published)).await.unwrap();
        assert_eq!(program.slug, "data-science");

        let detail = service.set_courses(program.id, vec![b, a, b]).await.unwrap();
        let ids: Vec<i64> = detail.courses.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![b, a]);

        let unknown = service.set_courses(program.id, vec![a, 999]).await;
        assert!(matches!(unknown, Err(DegreeServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_enroll_free_program_grants_courses() {
        let (service, pool) = setup().await;
        let instructor = insert_user(&pool, "teach@example.com").await;
        let course = insert_course(&pool, instructor, "c", 0, PublishStatus::Published).await;
        let program = service.create(input("Free Track", 0, PublishStatus::Published)).await.unwrap();
        service.set_courses(program.id, vec![course]).await.unwrap();

        let mut user = User::new("S".into(), "s@example.com".into(), None, UserRole::Student);
        user.id = insert_user(&pool, "s@example.com").await;

        let enrollment = service.enroll_free(&user, program.id).await.unwrap();
        assert_eq!(enrollment.status, DegreeEnrollmentStatus::Active);
        assert!(SqlxEnrollmentRepository::new(pool.clone()).get(user.id, course).await.unwrap().is_some());

        assert!(matches!(
            service.enroll_free(&user, program.id).await,
            Err(DegreeServiceError::AlreadyEnrolled)
        ));

        let mine = service.list_for_user(user.id).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].program_slug, "free-track");

        let withdrawn = service
            .update_enrollment_status(enrollment.id, DegreeEnrollmentStatus::Withdrawn)
            .await
            .unwrap();
        assert_eq!(withdrawn.status, DegreeEnrollmentStatus::Withdrawn);
        // Withdrawn students may enroll again
        service.enroll_free(&user, program.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_paid_and_draft_programs() {
        let (service, pool) = setup().await;
        let mut user = User::new("S".into(), "s@example.com".into(), None, UserRole::Student);
        user.id = insert_user(&pool, "s@example.com").await;

        let paid = service.create(input("Paid", 99_900, PublishStatus::Published)).await.unwrap();
        let draft = service.create(input("Draft", 0, PublishStatus::Draft)).await.unwrap();

        assert!(matches!(service.enroll_free(&user, paid.id).await, Err(DegreeServiceError::PaymentRequired)));
        assert!(matches!(service.enroll_free(&user, draft.id).await, Err(DegreeServiceError::NotFound(_))));
        assert!(matches!(service.get_detail(draft.id, false).await, Err(DegreeServiceError::NotFound(_))));
        assert!(service.get_detail(draft.id, true).await.is_ok());

        let public = service.list_published(&ListParams::default()).await.unwrap();
        assert_eq!(public.total, 1);
        let all = service.list_all(&ListParams::default()).await.unwrap();
        assert_eq!(all.total, 2);
    }

    #[tokio::test]
    async fn test_validation_and_slug_conflicts() {
        let (service, _pool) = setup().await;
        assert!(matches!(
            service.create(input("  ", 0, PublishStatus::Draft)).await,
            Err(DegreeServiceError::ValidationError(_))
        ));
        assert!(matches!(
            service.create(input("Neg", -5, PublishStatus::Draft)).await,
            Err(DegreeServiceError::ValidationError(_))
        ));

        service.create(input("Same", 0, PublishStatus::Draft)).await.unwrap();
        assert!(matches!(
            service.create(input("Same", 0, PublishStatus::Draft)).await,
            Err(DegreeServiceError::SlugExists(_))
        ));

        let updated = service
            .update(1, UpdateDegreeInput { price: Some(1_000), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(updated.price, 1_000);
        service.delete(1).await.unwrap();
        assert!(matches!(service.get_by_id(1).await, Err(DegreeServiceError::NotFound(_))));
    }
}
