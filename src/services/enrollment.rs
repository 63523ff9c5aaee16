//! Course enrollment and lesson progress

use std::sync::Arc;

use chrono::Utc;

use crate::db::is_unique_violation;
use crate::db::repositories::{CourseRepository, EnrollmentRepository};
use crate::models::{
    progress_percent, CourseProgress, Enrollment, EnrollmentStatus, EnrollmentWithCourse, User,
};
use crate::services::email::EmailService;

#[derive(Debug, thiserror::Error)]
pub enum EnrollmentServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// Paid items go through a payment order instead
    #[error("Payment required to enroll in this course")]
    PaymentRequired,

    #[error("Already enrolled")]
    AlreadyEnrolled,

    #[error("Not enrolled in this course")]
    NotEnrolled,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct EnrollmentService {
    repo: Arc<dyn EnrollmentRepository>,
    course_repo: Arc<dyn CourseRepository>,
    email: Arc<EmailService>,
}

impl EnrollmentService {
    pub fn new(
        repo: Arc<dyn EnrollmentRepository>,
        course_repo: Arc<dyn CourseRepository>,
        email: Arc<EmailService>,
    ) -> Self {
        Self {
            repo,
            course_repo,
            email,
        }
    }

    /// Enroll `user` in a free, published course
    pub async fn enroll_free(&self, user: &User, course_id: i64) -> Result<Enrollment, EnrollmentServiceError> {
        let course = self
            .course_repo
            .get_by_id(course_id)
            .await?
            .filter(|c| c.is_published())
            .ok_or_else(|| EnrollmentServiceError::NotFound(format!("course {}", course_id)))?;
        if !course.is_free() {
            return Err(EnrollmentServiceError::PaymentRequired);
        }

        let enrollment = match self.repo.get(user.id, course_id).await? {
            Some(existing) if existing.grants_access() => return Err(EnrollmentServiceError::AlreadyEnrolled),
            // Re-enrolling after a cancellation reactivates the row
            Some(_) => {
                self.repo.grant(user.id, course_id, None).await?;
                self.repo
                    .get(user.id, course_id)
                    .await?
                    .ok_or_else(|| EnrollmentServiceError::NotFound(format!("course {}", course_id)))?
            }
            None => self.repo.create(user.id, course_id, None).await.map_err(|e| {
                if is_unique_violation(&e) {
                    EnrollmentServiceError::AlreadyEnrolled
                } else {
                    EnrollmentServiceError::InternalError(e)
                }
            })?,
        };

        tracing::info!(user_id = user.id, course_id, "Enrolled in free course");
        if let Err(e) = self
            .email
            .send_enrollment_confirmation(&user.email, &user.name, &course.title)
            .await
        {
            tracing::warn!("Failed to send enrollment confirmation: {}", e);
        }
        Ok(enrollment)
    }

    pub async fn has_access(&self, user_id: i64, course_id: i64) -> Result<bool, EnrollmentServiceError> {
        Ok(self.repo.get(user_id, course_id).await?.is_some_and(|e| e.grants_access()))
    }

    /// Idempotent grant used after a successful payment
    pub async fn grant_access(&self, user_id: i64, course_id: i64, order_id: i64) -> Result<(), EnrollmentServiceError> {
        Ok(self.repo.grant(user_id, course_id, Some(order_id)).await?)
    }

    /// Cancel enrollments granted by a refunded order
    pub async fn revoke_by_order(&self, order_id: i64) -> Result<u64, EnrollmentServiceError> {
        Ok(self.repo.cancel_by_order(order_id).await?)
    }

    pub async fn list_for_user(&self, user_id: i64) -> Result<Vec<EnrollmentWithCourse>, EnrollmentServiceError> {
        Ok(self.repo.list_for_user(user_id).await?)
    }

    /// Record a completed lesson and recompute the course progress.
    ///
    /// Completing a lesson twice changes nothing. Reaching 100% marks the
    /// enrollment completed.
    pub async fn complete_lesson(&self, user: &User, lesson_id: i64) -> Result<CourseProgress, EnrollmentServiceError> {
        let course_id = self
            .course_repo
            .course_id_for_lesson(lesson_id)
            .await?
            .ok_or_else(|| EnrollmentServiceError::NotFound(format!("lesson {}", lesson_id)))?;
        let enrollment = self.active_enrollment(user.id, course_id).await?;

        self.repo.mark_lesson_complete(user.id, lesson_id, course_id).await?;
        let progress = self.progress_for(user.id, course_id).await?;

        let (status, completed_at) = if progress.progress_percent >= 100 {
            (
                EnrollmentStatus::Completed,
                enrollment.completed_at.or_else(|| Some(Utc::now())),
            )
        } else {
            (enrollment.status, enrollment.completed_at)
        };
        if progress.progress_percent != enrollment.progress_percent || status != enrollment.status {
            self.repo
                .update_progress(enrollment.id, progress.progress_percent, status, completed_at)
                .await?;
            if status == EnrollmentStatus::Completed && enrollment.status != EnrollmentStatus::Completed {
                tracing::info!(user_id = user.id, course_id, "Course completed");
            }
        }

        Ok(progress)
    }

    pub async fn get_progress(&self, user: &User, course_id: i64) -> Result<CourseProgress, EnrollmentServiceError> {
        self.active_enrollment(user.id, course_id).await?;
        self.progress_for(user.id, course_id).await
    }

    async fn active_enrollment(&self, user_id: i64, course_id: i64) -> Result<Enrollment, EnrollmentServiceError> {
        self.repo
            .get(user_id, course_id)
            .await?
            .filter(|e| e.grants_access())
            .ok_or(EnrollmentServiceError::NotEnrolled)
    }

    async fn progress_for(&self, user_id: i64, course_id: i64) -> Result<CourseProgress, EnrollmentServiceError> {
        let total_lessons = self.course_repo.count_lessons(course_id).await?;
        let completed_lesson_ids = self.repo.completed_lesson_ids(user_id, course_id).await?;
        let completed_lessons = completed_lesson_ids.len() as i64;

        Ok(CourseProgress {
            course_id,
            total_lessons,
            completed_lessons,
            progress_percent: progress_percent(completed_lessons, total_lessons),
            completed_lesson_ids,
        })
    }
}
