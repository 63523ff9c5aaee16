//! Mentorship programs and session booking

use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};

use crate::config::MentorshipConfig;
use crate::db::is_unique_violation;
use crate::db::repositories::{MentorshipRepository, UserRepository};
use crate::models::{
    normalize_currency, BookSessionInput, CreateMentorshipProgramInput, EnrollmentStatus, ListParams,
    MentorshipEnrollment, MentorshipProgram, MentorshipSession, PagedResult, PublishStatus,
    SessionStatus, TimeSlot, UpdateMentorshipProgramInput, User, DEFAULT_CURRENCY,
};
use crate::services::availability::{day_slots, day_window, generate_available_slots, local_date};
use crate::services::email::EmailService;
use crate::services::slug::resolve_slug;

const DEFAULT_SESSION_MINUTES: i32 = 60;

#[derive(Debug, thiserror::Error)]
pub enum MentorshipServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not allowed")]
    Forbidden,

    #[error("Program slug already exists: {0}")]
    SlugExists(String),

    #[error("Payment required to enroll in this program")]
    PaymentRequired,

    #[error("Already enrolled")]
    AlreadyEnrolled,

    #[error("Program is full")]
    ProgramFull,

    #[error("Not enrolled in this program")]
    NotEnrolled,

    #[error("Slot is already booked")]
    SlotTaken,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Which side of the sessions to list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionRole {
    #[default]
    Mentee,
    Mentor,
}

pub struct MentorshipService {
    repo: Arc<dyn MentorshipRepository>,
    user_repo: Arc<dyn UserRepository>,
    email: Arc<EmailService>,
    config: MentorshipConfig,
}

impl MentorshipService {
    pub fn new(
        repo: Arc<dyn MentorshipRepository>,
        user_repo: Arc<dyn UserRepository>,
        email: Arc<EmailService>,
        config: MentorshipConfig,
    ) -> Self {
        Self {
            repo,
            user_repo,
            email,
            config,
        }
    }

    pub async fn list_published(
        &self,
        params: &ListParams,
    ) -> Result<PagedResult<MentorshipProgram>, MentorshipServiceError> {
        let (items, total) = self.repo.list_programs(Some(PublishStatus::Published), params).await?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn list_all(&self, params: &ListParams) -> Result<PagedResult<MentorshipProgram>, MentorshipServiceError> {
        let (items, total) = self.repo.list_programs(None, params).await?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn get_program(&self, id: i64) -> Result<MentorshipProgram, MentorshipServiceError> {
        self.repo
            .get_program(id)
            .await?
            .ok_or_else(|| MentorshipServiceError::NotFound(format!("program {}", id)))
    }

    pub async fn get_published_program(&self, id: i64) -> Result<MentorshipProgram, MentorshipServiceError> {
        self.repo
            .get_program(id)
            .await?
            .filter(|p| p.status == PublishStatus::Published)
            .ok_or_else(|| MentorshipServiceError::NotFound(format!("program {}", id)))
    }

    pub async fn create_program(
        &self,
        actor: &User,
        input: CreateMentorshipProgramInput,
    ) -> Result<MentorshipProgram, MentorshipServiceError> {
        let title = input.title.trim();
        if title.is_empty() {
            return Err(MentorshipServiceError::ValidationError("Title cannot be empty".into()));
        }
        let mentor_id = input.mentor_id.unwrap_or(actor.id);
        self.ensure_mentor(mentor_id).await?;
        let session_minutes = input.session_minutes.unwrap_or(DEFAULT_SESSION_MINUTES);
        validate_numbers(input.price, session_minutes, input.max_mentees)?;
        let slug = resolve_slug(input.slug.as_deref(), title)
            .ok_or_else(|| MentorshipServiceError::ValidationError("Slug cannot be empty".into()))?;

        let now = Utc::now();
        let program = MentorshipProgram {
            id: 0,
            slug: slug.clone(),
            title: title.to_string(),
            description: input.description,
            mentor_id,
            price: input.price,
            currency: resolve_currency(input.currency.as_deref())?,
            session_minutes,
            max_mentees: input.max_mentees,
            status: input.status,
            created_at: now,
            updated_at: now,
        };

        let created = self
            .repo
            .create_program(&program)
            .await
            .map_err(|e| slug_conflict(e, &slug))?;
        tracing::info!(program_id = created.id, mentor_id, "Mentorship program created");
        Ok(created)
    }

    pub async fn update_program(
        &self,
        id: i64,
        input: UpdateMentorshipProgramInput,
    ) -> Result<MentorshipProgram, MentorshipServiceError> {
        let mut program = self.get_program(id).await?;

        if let Some(title) = input.title {
            let title = title.trim();
            if title.is_empty() {
                return Err(MentorshipServiceError::ValidationError("Title cannot be empty".into()));
            }
            program.title = title.to_string();
        }
        if let Some(slug) = input.slug {
            program.slug = resolve_slug(Some(&slug), &program.title)
                .ok_or_else(|| MentorshipServiceError::ValidationError("Slug cannot be empty".into()))?;
        }
        if let Some(description) = input.description {
            program.description = description;
        }
        if let Some(mentor_id) = input.mentor_id {
            self.ensure_mentor(mentor_id).await?;
            program.mentor_id = mentor_id;
        }
        if let Some(price) = input.price {
            program.price = price;
        }
        if let Some(currency) = input.currency {
            program.currency = resolve_currency(Some(&currency))?;
        }
        if let Some(minutes) = input.session_minutes {
            program.session_minutes = minutes;
        }
        if let Some(max) = input.max_mentees {
            program.max_mentees = max;
        }
        if let Some(status) = input.status {
            program.status = status;
        }
        validate_numbers(program.price, program.session_minutes, program.max_mentees)?;
        program.updated_at = Utc::now();

        let slug = program.slug.clone();
        Ok(self
            .repo
            .update_program(&program)
            .await
            .map_err(|e| slug_conflict(e, &slug))?)
    }

    pub async fn delete_program(&self, id: i64) -> Result<(), MentorshipServiceError> {
        self.get_program(id).await?;
        self.repo.delete_program(id).await?;
        tracing::info!(program_id = id, "Mentorship program deleted");
        Ok(())
    }

    /// Fails with `ProgramFull` when the active enrollment cap is reached
    pub async fn ensure_capacity(&self, program: &MentorshipProgram) -> Result<(), MentorshipServiceError> {
        if program.max_mentees > 0
            && self.repo.count_active_enrollments(program.id).await? >= program.max_mentees as i64
        {
            return Err(MentorshipServiceError::ProgramFull);
        }
        Ok(())
    }

    pub async fn enroll_free(&self, user: &User, program_id: i64) -> Result<MentorshipEnrollment, MentorshipServiceError> {
        let program = self.get_published_program(program_id).await?;
        if program.price > 0 {
            return Err(MentorshipServiceError::PaymentRequired);
        }
        if program.mentor_id == user.id {
            return Err(MentorshipServiceError::ValidationError(
                "Mentors cannot enroll in their own program".into(),
            ));
        }
        if let Some(existing) = self.repo.get_enrollment(user.id, program_id).await? {
            if existing.status != EnrollmentStatus::Cancelled {
                return Err(MentorshipServiceError::AlreadyEnrolled);
            }
        }
        self.ensure_capacity(&program).await?;

        match self.repo.create_enrollment(user.id, program_id, None).await {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => self.repo.grant_enrollment(user.id, program_id, None).await?,
            Err(e) => return Err(e.into()),
        }

        tracing::info!(user_id = user.id, program_id, "Enrolled in free mentorship program");
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
            .ok_or_else(|| MentorshipServiceError::NotFound(format!("program {}", program_id)))
    }

    pub async fn has_access(&self, user_id: i64, program_id: i64) -> Result<bool, MentorshipServiceError> {
        Ok(self
            .repo
            .get_enrollment(user_id, program_id)
            .await?
            .is_some_and(|e| e.status != EnrollmentStatus::Cancelled))
    }

    /// Idempotent grant used after a successful payment
    pub async fn grant_access(&self, user_id: i64, program_id: i64, order_id: i64) -> Result<(), MentorshipServiceError> {
        Ok(self.repo.grant_enrollment(user_id, program_id, Some(order_id)).await?)
    }

    pub async fn revoke_by_order(&self, order_id: i64) -> Result<u64, MentorshipServiceError> {
        Ok(self.repo.cancel_enrollment_by_order(order_id).await?)
    }

    /// Open slots of `mentor_id` on the local date `date`
    pub async fn availability(&self, mentor_id: i64, date: NaiveDate) -> Result<Vec<TimeSlot>, MentorshipServiceError> {
        self.user_repo
            .get_by_id(mentor_id)
            .await?
            .ok_or_else(|| MentorshipServiceError::NotFound(format!("mentor {}", mentor_id)))?;
        self.available_slots(mentor_id, date).await
    }

    async fn available_slots(&self, mentor_id: i64, date: NaiveDate) -> Result<Vec<TimeSlot>, MentorshipServiceError> {
        let (start, end) = day_window(date, &self.config);
        // Sessions starting before the window can still run into it
        let lookback = Duration::days(1);
        let sessions = self
            .repo
            .scheduled_for_mentor(mentor_id, start - lookback, end)
            .await?;
        Ok(generate_available_slots(date, &self.config, &sessions))
    }

    /// Book a session with the program's mentor.
    ///
    /// `starts_at` must be the start of a future slot that is still free,
    /// and the whole session must fit before anything else is booked.
    pub async fn book_session(
        &self,
        user: &User,
        input: BookSessionInput,
    ) -> Result<MentorshipSession, MentorshipServiceError> {
        let program = self.get_published_program(input.program_id).await?;
        let enrolled = self
            .repo
            .get_enrollment(user.id, program.id)
            .await?
            .map_or(false, |e| e.status == EnrollmentStatus::Active);
        if !enrolled {
            return Err(MentorshipServiceError::NotEnrolled);
        }

        let now = Utc::now();
        if input.starts_at <= now {
            return Err(MentorshipServiceError::ValidationError("Cannot book a session in the past".into()));
        }

        let date = local_date(input.starts_at, &self.config);
        if !day_slots(date, &self.config).iter().any(|s| s.starts_at == input.starts_at) {
            return Err(MentorshipServiceError::ValidationError(
                "Requested time is not a bookable slot".into(),
            ));
        }
        let (_, window_end) = day_window(date, &self.config);
        let ends_at = input.starts_at + Duration::minutes(program.session_minutes as i64);
        if ends_at > window_end {
            return Err(MentorshipServiceError::ValidationError(
                "Session would run past the end of the day".into(),
            ));
        }

        let booked = self
            .repo
            .scheduled_for_mentor(program.mentor_id, input.starts_at - Duration::days(1), ends_at)
            .await?;
        if booked.iter().any(|s| s.overlaps(input.starts_at, ends_at)) {
            return Err(MentorshipServiceError::SlotTaken);
        }

        let session = MentorshipSession {
            id: 0,
            program_id: program.id,
            mentor_id: program.mentor_id,
            mentee_id: user.id,
            starts_at: input.starts_at,
            duration_minutes: program.session_minutes,
            status: SessionStatus::Scheduled,
            topic: input.topic.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()),
            meeting_url: None,
            notes: None,
            created_at: now,
            updated_at: now,
        };
        let created = self.repo.create_session(&session).await.map_err(|e| {
            if is_unique_violation(&e) {
                MentorshipServiceError::SlotTaken
            } else {
                MentorshipServiceError::InternalError(e)
            }
        })?;

        tracing::info!(
            session_id = created.id,
            mentor_id = created.mentor_id,
            mentee_id = user.id,
            starts_at = %created.starts_at,
            "Mentorship session booked"
        );
        Ok(created)
    }

    pub async fn list_sessions(&self, user: &User, role: SessionRole) -> Result<Vec<MentorshipSession>, MentorshipServiceError> {
        Ok(match role {
            SessionRole::Mentee => self.repo.list_sessions_for_mentee(user.id).await?,
            SessionRole::Mentor => self.repo.list_sessions_for_mentor(user.id).await?,
        })
    }

    pub async fn upcoming_sessions(&self, user_id: i64, limit: i64) -> Result<Vec<MentorshipSession>, MentorshipServiceError> {
        Ok(self.repo.upcoming_for_user(user_id, Utc::now(), limit).await?)
    }

    /// Mentee, mentor or an admin may cancel a scheduled session
    pub async fn cancel_session(&self, actor: &User, id: i64) -> Result<MentorshipSession, MentorshipServiceError> {
        let mut session = self.scheduled_session(id).await?;
        if !(actor.can_manage(session.mentor_id) || actor.id == session.mentee_id) {
            return Err(MentorshipServiceError::Forbidden);
        }

        session.status = SessionStatus::Cancelled;
        session.updated_at = Utc::now();
        let session = self.repo.update_session(&session).await?;
        tracing::info!(session_id = id, actor_id = actor.id, "Mentorship session cancelled");
        Ok(session)
    }

    pub async fn complete_session(
        &self,
        actor: &User,
        id: i64,
        notes: Option<String>,
    ) -> Result<MentorshipSession, MentorshipServiceError> {
        let mut session = self.scheduled_session(id).await?;
        if !actor.can_manage(session.mentor_id) {
            return Err(MentorshipServiceError::Forbidden);
        }

        session.status = SessionStatus::Completed;
        if let Some(notes) = notes {
            session.notes = Some(notes).filter(|n| !n.trim().is_empty());
        }
        session.updated_at = Utc::now();
        Ok(self.repo.update_session(&session).await?)
    }

    pub async fn set_meeting_url(
        &self,
        actor: &User,
        id: i64,
        meeting_url: &str,
    ) -> Result<MentorshipSession, MentorshipServiceError> {
        let meeting_url = meeting_url.trim();
        if !(meeting_url.starts_with("https://") || meeting_url.starts_with("http://")) {
            return Err(MentorshipServiceError::ValidationError("Meeting URL must be http(s)".into()));
        }

        let mut session = self.scheduled_session(id).await?;
        if !actor.can_manage(session.mentor_id) {
            return Err(MentorshipServiceError::Forbidden);
        }
        session.meeting_url = Some(meeting_url.to_string());
        session.updated_at = Utc::now();
        Ok(self.repo.update_session(&session).await?)
    }

    async fn scheduled_session(&self, id: i64) -> Result<MentorshipSession, MentorshipServiceError> {
        let session = self
            .repo
            .get_session(id)
            .await?
            .ok_or_else(|| MentorshipServiceError::NotFound(format!("session {}", id)))?;
        if session.status != SessionStatus::Scheduled {
            return Err(MentorshipServiceError::ValidationError(format!(
                "Session is already {}",
                session.status
            )));
        }
        Ok(session)
    }

    async fn ensure_mentor(&self, mentor_id: i64) -> Result<(), MentorshipServiceError> {
        let mentor = self
            .user_repo
            .get_by_id(mentor_id)
            .await?
            .ok_or_else(|| MentorshipServiceError::ValidationError(format!("Unknown mentor: {}", mentor_id)))?;
        if !mentor.is_instructor() {
            return Err(MentorshipServiceError::ValidationError(
                "Mentors must be instructors or admins".into(),
            ));
        }
        Ok(())
    }
}

fn validate_numbers(price: i64, session_minutes: i32, max_mentees: i32) -> Result<(), MentorshipServiceError> {
    if price < 0 {
        return Err(MentorshipServiceError::ValidationError("Price cannot be negative".into()));
    }
    if session_minutes <= 0 {
        return Err(MentorshipServiceError::ValidationError("Session length must be positive".into()));
    }
    if max_mentees < 0 {
        return Err(MentorshipServiceError::ValidationError("max_mentees cannot be negative".into()));
    }
    Ok(())
}

fn resolve_currency(currency: Option<&str>) -> Result<String, MentorshipServiceError> {
    match currency {
        None => Ok(DEFAULT_CURRENCY.to_string()),
        Some(code) => normalize_currency(code)
            .ok_or_else(|| MentorshipServiceError::ValidationError(format!("Invalid currency: {}", code))),
    }
}

fn slug_conflict(err: anyhow::Error, slug: &str) -> MentorshipServiceError {
    if is_unique_violation(&err) {
        MentorshipServiceError::SlugExists(slug.to_string())
    } else {
        MentorshipServiceError::InternalError(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::setup_pool;
    use crate::db::repositories::{SqlxMentorshipRepository, SqlxUserRepository};
    use crate::db::DynDatabasePool;
    use crate::models::UserRole;
    use chrono::{NaiveTime, TimeZone};

    fn utc_config() -> MentorshipConfig {
        MentorshipConfig {
            slot_start_hour: 9,
            slot_end_hour: 12,
            slot_minutes: 60,
            utc_offset_minutes: 0,
        }
    }

    async fn setup() -> (MentorshipService, DynDatabasePool) {
        let pool = setup_pool().await;
        let service = MentorshipService::new(
            SqlxMentorshipRepository::boxed(pool.clone()),
            SqlxUserRepository::boxed(pool.clone()),
            Arc::new(EmailService::disabled()),
            utc_config(),
        );
        (service, pool)
    }

    async fn user(pool: &DynDatabasePool, email: &str, role: UserRole) -> User {
        let repo = SqlxUserRepository::new(pool.clone());
        crate::db::repositories::UserRepository::create(&repo, &User::new(email.into(), email.into(), None, role))
            .await
            .unwrap()
    }

    fn program_input(price: i64, max_mentees: i32) -> CreateMentorshipProgramInput {
        CreateMentorshipProgramInput {
            slug: None,
            title: "Career Mentoring".into(),
            description: String::new(),
            mentor_id: None,
            price,
            currency: None,
            session_minutes: None,
            max_mentees,
            status: PublishStatus::Published,
        }
    }

    fn future_date() -> NaiveDate {
        (Utc::now() + Duration::days(7)).date_naive()
    }

    fn slot(date: NaiveDate, hour: u32) -> chrono::DateTime<Utc> {
        Utc.from_utc_datetime(&date.and_time(NaiveTime::from_hms_opt(hour, 0, 0).unwrap()))
    }

    #[tokio::test]
    async fn test_capacity_limits_enrollment() {
        let (service, pool) = setup().await;
        let mentor = user(&pool, "mentor@example.com", UserRole::Instructor).await;
        let a = user(&pool, "a@example.com", UserRole::Student).await;
        let b = user(&pool, "b@example.com", UserRole::Student).await;

        let program = service.create_program(&mentor, program_input(0, 1)).await.unwrap();
        assert_eq!(program.mentor_id, mentor.id);
        assert_eq!(program.session_minutes, 60);

        service.enroll_free(&a, program.id).await.unwrap();
        assert!(matches!(service.enroll_free(&a, program.id).await, Err(MentorshipServiceError::AlreadyEnrolled)));
        assert!(matches!(service.enroll_free(&b, program.id).await, Err(MentorshipServiceError::ProgramFull)));
        assert!(matches!(
            service.enroll_free(&mentor, program.id).await,
            Err(MentorshipServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_students_cannot_mentor() {
        let (service, pool) = setup().await;
        let student = user(&pool, "s@example.com", UserRole::Student).await;
        assert!(matches!(
            service.create_program(&student, program_input(0, 0)).await,
            Err(MentorshipServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_booking_flow() {
        let (service, pool) = setup().await;
        let mentor = user(&pool, "mentor@example.com", UserRole::Instructor).await;
        let mentee = user(&pool, "mentee@example.com", UserRole::Student).await;
        let other = user(&pool, "other@example.com", UserRole::Student).await;
        let program = service.create_program(&mentor, program_input(0, 0)).await.unwrap();
        let date = future_date();

        let book = |hour: u32| BookSessionInput {
            program_id: program.id,
            starts_at: slot(date, hour),
            topic: Some("Resume review".into()),
        };

        assert!(matches!(service.book_session(&mentee, book(9)).await, Err(MentorshipServiceError::NotEnrolled)));
        service.enroll_free(&mentee, program.id).await.unwrap();
        service.enroll_free(&other, program.id).await.unwrap();

        assert_eq!(service.availability(mentor.id, date).await.unwrap().len(), 3);
        let session = service.book_session(&mentee, book(10)).await.unwrap();
        assert_eq!(session.status, SessionStatus::Scheduled);

        let open: Vec<_> = service
            .availability(mentor.id, date)
            .await
            .unwrap()
            .iter()
            .map(|s| s.starts_at)
            .collect();
        assert_eq!(open, vec![slot(date, 9), slot(date, 11)]);

        assert!(matches!(service.book_session(&other, book(10)).await, Err(MentorshipServiceError::SlotTaken)));
        assert!(matches!(
            service.book_session(&other, book(13)).await,
            Err(MentorshipServiceError::ValidationError(_))
        ));

        let mut off_grid = book(9);
        off_grid.starts_at += Duration::minutes(15);
        assert!(matches!(
            service.book_session(&other, off_grid).await,
            Err(MentorshipServiceError::ValidationError(_))
        ));

        // Cancelling frees the slot
        assert!(matches!(service.cancel_session(&other, session.id).await, Err(MentorshipServiceError::Forbidden)));
        service.cancel_session(&mentee, session.id).await.unwrap();
        service.book_session(&other, book(10)).await.unwrap();
    }

    #[tokio::test]
    async fn test_past_slots_rejected() {
        let (service, pool) = setup().await;
        let mentor = user(&pool, "mentor@example.com", UserRole::Instructor).await;
        let mentee = user(&pool, "mentee@example.com", UserRole::Student).await;
        let program = service.create_program(&mentor, program_input(0, 0)).await.unwrap();
        service.enroll_free(&mentee, program.id).await.unwrap();

        let past = (Utc::now() - Duration::days(2)).date_naive();
        let result = service
            .book_session(&mentee, BookSessionInput { program_id: program.id, starts_at: slot(past, 9), topic: None })
            .await;
        assert!(matches!(result, Err(MentorshipServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_mentor_completes_and_sets_meeting() {
        let (service, pool) = setup().await;
        let mentor = user(&pool, "mentor@example.com", UserRole::Instructor).await;
        let mentee = user(&pool, "mentee@example.com", UserRole::Student).await;
        let program = service.create_program(&mentor, program_input(0, 0)).await.unwrap();
        service.enroll_free(&mentee, program.id).await.unwrap();

        let session = service
            .book_session(
                &mentee,
                BookSessionInput { program_id: program.id, starts_at: slot(future_date(), 11), topic: None },
            )
            .await
            .unwrap();

        assert!(matches!(
            service.set_meeting_url(&mentee, session.id, "https://meet.example.com/x").await,
            Err(MentorshipServiceError::Forbidden)
        ));
        assert!(matches!(
            service.set_meeting_url(&mentor, session.id, "ftp://nope").await,
            Err(MentorshipServiceError::ValidationError(_))
        ));
        let with_url = service
            .set_meeting_url(&mentor, session.id, "https://meet.example.com/x")
            .await
            .unwrap();
        assert_eq!(with_url.meeting_url.as_deref(), Some("https://meet.example.com/x"));

        let done = service
            .complete_session(&mentor, session.id, Some("Went well".into()))
            .await
            .unwrap();
        assert_eq!(done.status, SessionStatus::Completed);
        assert_eq!(done.notes.as_deref(), Some("Went well"));

        assert!(matches!(
            service.cancel_session(&mentee, session.id).await,
            Err(MentorshipServiceError::ValidationError(_))
        ));

        let as_mentor = service.list_sessions(&mentor, SessionRole::Mentor).await.unwrap();
        assert_eq!(as_mentor.len(), 1);
        let as_mentee = service.list_sessions(&mentee, SessionRole::Mentee).await.unwrap();
        assert_eq!(as_mentee.len(), 1);
    }
}
