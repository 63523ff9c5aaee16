//! Mentorship repository
//!
//! Programs, mentee enrollments and booked sessions. A mentor can hold at
//! most one scheduled session per start time (unique index).

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{
    EnrollmentStatus, ListParams, MentorshipEnrollment, MentorshipProgram, MentorshipSession,
    PublishStatus,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

#[async_trait]
pub trait MentorshipRepository: Send + Sync {
    async fn create_program(&self, program: &MentorshipProgram) -> Result<MentorshipProgram>;

    async fn get_program(&self, id: i64) -> Result<Option<MentorshipProgram>>;

    async fn update_program(&self, program: &MentorshipProgram) -> Result<MentorshipProgram>;

    async fn delete_program(&self, id: i64) -> Result<()>;

    async fn list_programs(
        &self,
        status: Option<PublishStatus>,
        params: &ListParams,
    ) -> Result<(Vec<MentorshipProgram>, i64)>;

    async fn count_programs(&self, status: PublishStatus) -> Result<i64>;

    async fn create_enrollment(
        &self,
        user_id: i64,
        program_id: i64,
        order_id: Option<i64>,
    ) -> Result<MentorshipEnrollment>;

    /// Idempotent grant; reactivates a cancelled enrollment
    async fn grant_enrollment(&self, user_id: i64, program_id: i64, order_id: Option<i64>) -> Result<()>;

    async fn get_enrollment(&self, user_id: i64, program_id: i64) -> Result<Option<MentorshipEnrollment>>;

    async fn count_active_enrollments(&self, program_id: i64) -> Result<i64>;

    async fn cancel_enrollment_by_order(&self, order_id: i64) -> Result<u64>;

    /// Insert a scheduled session; a taken slot is a unique violation
    async fn create_session(&self, session: &MentorshipSession) -> Result<MentorshipSession>;

    async fn get_session(&self, id: i64) -> Result<Option<MentorshipSession>>;

    /// Persist status, meeting url and notes
    async fn update_session(&self, session: &MentorshipSession) -> Result<MentorshipSession>;

    /// Scheduled sessions of a mentor starting in `[from, to)`
    async fn scheduled_for_mentor(
        &self,
        mentor_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<MentorshipSession>>;

    async fn list_sessions_for_mentee(&self, mentee_id: i64) -> Result<Vec<MentorshipSession>>;

    async fn list_sessions_for_mentor(&self, mentor_id: i64) -> Result<Vec<MentorshipSession>>;

    /// Scheduled sessions from `now` on where the user is mentee or mentor
    async fn upcoming_for_user(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<MentorshipSession>>;
}

pub struct SqlxMentorshipRepository {
    pool: DynDatabasePool,
}

impl SqlxMentorshipRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn MentorshipRepository> {
        Arc::new(Self::new(pool))
    }
}

const PROGRAM_COLUMNS: &str = "id, slug, title, description, mentor_id, price, currency, session_minutes, max_mentees, status, created_at, updated_at";

const INSERT_PROGRAM: &str = r#"
    INSERT INTO mentorship_programs (slug, title, description, mentor_id, price, currency,
                                     session_minutes, max_mentees, status, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

const UPDATE_PROGRAM: &str = r#"
    UPDATE mentorship_programs
    SET slug = ?, title = ?, description = ?, mentor_id = ?, price = ?, currency = ?,
        session_minutes = ?, max_mentees = ?, status = ?, updated_at = ?
    WHERE id = ?
"#;

const ENROLLMENT_COLUMNS: &str = "id, user_id, program_id, status, order_id, enrolled_at";

const INSERT_ENROLLMENT: &str = r#"
    INSERT INTO mentorship_enrollments (user_id, program_id, status, order_id, enrolled_at)
    VALUES (?, ?, 'active', ?, ?)
"#;

const REACTIVATE_ENROLLMENT: &str = r#"
    UPDATE mentorship_enrollments
    SET status = 'active', order_id = ?, enrolled_at = ?
    WHERE user_id = ? AND program_id = ? AND status = 'cancelled'
"#;

const SESSION_COLUMNS: &str = "id, program_id, mentor_id, mentee_id, starts_at, duration_minutes, status, topic, meeting_url, notes, created_at, updated_at";

const INSERT_SESSION: &str = r#"
    INSERT INTO mentorship_sessions (program_id, mentor_id, mentee_id, starts_at, duration_minutes,
                                     status, topic, meeting_url, notes, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

const UPDATE_SESSION: &str = r#"
    UPDATE mentorship_sessions
    SET status = ?, meeting_url = ?, notes = ?, updated_at = ?
    WHERE id = ?
"#;

#[async_trait]
impl MentorshipRepository for SqlxMentorshipRepository {
    async fn create_program(&self, program: &MentorshipProgram) -> Result<MentorshipProgram> {
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(INSERT_PROGRAM)
                .bind(&program.slug)
                .bind(&program.title)
                .bind(&program.description)
                .bind(program.mentor_id)
                .bind(program.price)
                .bind(&program.currency)
                .bind(program.session_minutes)
                .bind(program.max_mentees)
                .bind(program.status.as_str())
                .bind(program.created_at)
                .bind(program.updated_at)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to create mentorship program")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(INSERT_PROGRAM)
                .bind(&program.slug)
                .bind(&program.title)
                .bind(&program.description)
                .bind(program.mentor_id)
                .bind(program.price)
                .bind(&program.currency)
                .bind(program.session_minutes)
                .bind(program.max_mentees)
                .bind(program.status.as_str())
                .bind(program.created_at)
                .bind(program.updated_at)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to create mentorship program")?
                .last_insert_id() as i64,
        };
        Ok(MentorshipProgram { id, ..program.clone() })
    }

    async fn get_program(&self, id: i64) -> Result<Option<MentorshipProgram>> {
        let sql = format!("SELECT {} FROM mentorship_programs WHERE id = ?", PROGRAM_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => Ok(sqlx::query(&sql)
                .bind(id)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get mentorship program")?
                .as_ref()
                .map(row_to_program_sqlite)),
            DatabaseDriver::Mysql => Ok(sqlx::query(&sql)
                .bind(id)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get mentorship program")?
                .as_ref()
                .map(row_to_program_mysql)),
        }
    }

    async fn update_program(&self, program: &MentorshipProgram) -> Result<MentorshipProgram> {
        let now = Utc::now();
        execute!(
            self,
            UPDATE_PROGRAM,
            "Failed to update mentorship program",
            &program.slug,
            &program.title,
            &program.description,
            program.mentor_id,
            program.price,
            &program.currency,
            program.session_minutes,
            program.max_mentees,
            program.status.as_str(),
            now,
            program.id
        );
        Ok(MentorshipProgram {
            updated_at: now,
            ..program.clone()
        })
    }

    async fn delete_program(&self, id: i64) -> Result<()> {
        execute!(
            self,
            "DELETE FROM mentorship_programs WHERE id = ?",
            "Failed to delete mentorship program",
            id
        );
        Ok(())
    }

    async fn list_programs(
        &self,
        status: Option<PublishStatus>,
        params: &ListParams,
    ) -> Result<(Vec<MentorshipProgram>, i64)> {
        let status = status.map(|s| s.as_str().to_string());
        let sql = format!(
            "SELECT {} FROM mentorship_programs WHERE (? IS NULL OR status = ?) ORDER BY id DESC LIMIT ? OFFSET ?",
            PROGRAM_COLUMNS
        );
        let count_sql =
            "SELECT COUNT(*) AS count FROM mentorship_programs WHERE (? IS NULL OR status = ?)";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let pool = self.pool.sqlite()?;
                let rows = sqlx::query(&sql)
                    .bind(&status)
                    .bind(&status)
                    .bind(params.limit())
                    .bind(params.offset())
                    .fetch_all(pool)
                    .await
                    .context("Failed to list mentorship programs")?;
                let total: i64 = sqlx::query(count_sql)
                    .bind(&status)
                    .bind(&status)
                    .fetch_one(pool)
                    .await
                    .context("Failed to count mentorship programs")?
                    .get("count");
                Ok((rows.iter().map(row_to_program_sqlite).collect(), total))
            }
            DatabaseDriver::Mysql => {
                let pool = self.pool.mysql()?;
                let rows = sqlx::query(&sql)
                    .bind(&status)
                    .bind(&status)
                    .bind(params.limit())
                    .bind(params.offset())
                    .fetch_all(pool)
                    .await
                    .context("Failed to list mentorship programs")?;
                let total: i64 = sqlx::query(count_sql)
                    .bind(&status)
                    .bind(&status)
                    .fetch_one(pool)
                    .await
                    .context("Failed to count mentorship programs")?
                    .get("count");
                Ok((rows.iter().map(row_to_program_mysql).collect(), total))
            }
        }
    }

    async fn count_programs(&self, status: PublishStatus) -> Result<i64> {
        let sql = "SELECT COUNT(*) AS count FROM mentorship_programs WHERE status = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => Ok(sqlx::query(sql)
                .bind(status.as_str())
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to count mentorship programs")?
                .get("count")),
            DatabaseDriver::Mysql => Ok(sqlx::query(sql)
                .bind(status.as_str())
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to count mentorship programs")?
                .get("count")),
        }
    }

    async fn create_enrollment(
        &self,
        user_id: i64,
        program_id: i64,
        order_id: Option<i64>,
    ) -> Result<MentorshipEnrollment> {
        let now = Utc::now();
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(INSERT_ENROLLMENT)
                .bind(user_id)
                .bind(program_id)
                .bind(order_id)
                .bind(now)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to create mentorship enrollment")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(INSERT_ENROLLMENT)
                .bind(user_id)
                .bind(program_id)
                .bind(order_id)
                .bind(now)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to create mentorship enrollment")?
                .last_insert_id() as i64,
        };
        Ok(MentorshipEnrollment {
            id,
            user_id,
            program_id,
            status: EnrollmentStatus::Active,
            order_id,
            enrolled_at: now,
        })
    }

    async fn grant_enrollment(&self, user_id: i64, program_id: i64, order_id: Option<i64>) -> Result<()> {
        let now = Utc::now();
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                grant_sqlite(self.pool.sqlite()?, user_id, program_id, order_id, now).await
            }
            DatabaseDriver::Mysql => {
                grant_mysql(self.pool.mysql()?, user_id, program_id, order_id, now).await
            }
        }
    }

    async fn get_enrollment(&self, user_id: i64, program_id: i64) -> Result<Option<MentorshipEnrollment>> {
        let sql = format!(
            "SELECT {} FROM mentorship_enrollments WHERE user_id = ? AND program_id = ?",
            ENROLLMENT_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => Ok(sqlx::query(&sql)
                .bind(user_id)
                .bind(program_id)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get mentorship enrollment")?
                .map(|row| {
                    let status: String = row.get("status");
                    MentorshipEnrollment {
                        id: row.get("id"),
                        user_id: row.get("user_id"),
                        program_id: row.get("program_id"),
                        status: status.parse().unwrap_or_default(),
                        order_id: row.get("order_id"),
                        enrolled_at: row.get("enrolled_at"),
                    }
                })),
            DatabaseDriver::Mysql => Ok(sqlx::query(&sql)
                .bind(user_id)
                .bind(program_id)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get mentorship enrollment")?
                .map(|row| {
                    let status: String = row.get("status");
                    MentorshipEnrollment {
                        id: row.get("id"),
                        user_id: row.get("user_id"),
                        program_id: row.get("program_id"),
                        status: status.parse().unwrap_or_default(),
                        order_id: row.get("order_id"),
                        enrolled_at: row.get("enrolled_at"),
                    }
                })),
        }
    }

    async fn count_active_enrollments(&self, program_id: i64) -> Result<i64> {
        let sql = "SELECT COUNT(*) AS count FROM mentorship_enrollments WHERE program_id = ? AND status = 'active'";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => Ok(sqlx::query(sql)
                .bind(program_id)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to count mentorship enrollments")?
                .get("count")),
            DatabaseDriver::Mysql => Ok(sqlx::query(sql)
                .bind(program_id)
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to count mentorship enrollments")?
                .get("count")),
        }
    }

    async fn cancel_enrollment_by_order(&self, order_id: i64) -> Result<u64> {
        Ok(execute!(
            self,
            "UPDATE mentorship_enrollments SET status = 'cancelled' WHERE order_id = ?",
            "Failed to cancel mentorship enrollment",
            order_id
        ))
    }

    async fn create_session(&self, session: &MentorshipSession) -> Result<MentorshipSession> {
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => insert_session_sqlite(self.pool.sqlite()?, session).await?,
            DatabaseDriver::Mysql => insert_session_mysql(self.pool.mysql()?, session).await?,
        };
        Ok(MentorshipSession { id, ..session.clone() })
    }

    async fn get_session(&self, id: i64) -> Result<Option<MentorshipSession>> {
        let sql = format!("SELECT {} FROM mentorship_sessions WHERE id = ?", SESSION_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => Ok(sqlx::query(&sql)
                .bind(id)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get mentorship session")?
                .as_ref()
                .map(row_to_session_sqlite)),
            DatabaseDriver::Mysql => Ok(sqlx::query(&sql)
                .bind(id)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get mentorship session")?
                .as_ref()
                .map(row_to_session_mysql)),
        }
    }

    async fn update_session(&self, session: &MentorshipSession) -> Result<MentorshipSession> {
        let now = Utc::now();
        execute!(
            self,
            UPDATE_SESSION,
            "Failed to update mentorship session",
            session.status.as_str(),
            &session.meeting_url,
            &session.notes,
            now,
            session.id
        );
        Ok(MentorshipSession {
            updated_at: now,
            ..session.clone()
        })
    }

    async fn scheduled_for_mentor(
        &self,
        mentor_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<MentorshipSession>> {
        let sql = format!(
            r#"
            SELECT {} FROM mentorship_sessions
            WHERE mentor_id = ? AND status = 'scheduled' AND starts_at >= ? AND starts_at < ?
            ORDER BY starts_at
            "#,
            SESSION_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => Ok(sqlx::query(&sql)
                .bind(mentor_id)
                .bind(from)
                .bind(to)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to load mentor schedule")?
                .iter()
                .map(row_to_session_sqlite)
                .collect()),
            DatabaseDriver::Mysql => Ok(sqlx::query(&sql)
                .bind(mentor_id)
                .bind(from)
                .bind(to)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to load mentor schedule")?
                .iter()
                .map(row_to_session_mysql)
                .collect()),
        }
    }

    async fn list_sessions_for_mentee(&self, mentee_id: i64) -> Result<Vec<MentorshipSession>> {
        let sql = format!(
            "SELECT {} FROM mentorship_sessions WHERE mentee_id = ? ORDER BY starts_at DESC",
            SESSION_COLUMNS
        );
        self.list_sessions_by(&sql, mentee_id).await
    }

    async fn list_sessions_for_mentor(&self, mentor_id: i64) -> Result<Vec<MentorshipSession>> {
        let sql = format!(
            "SELECT {} FROM mentorship_sessions WHERE mentor_id = ? ORDER BY starts_at DESC",
            SESSION_COLUMNS
        );
        self.list_sessions_by(&sql, mentor_id).await
    }

    async fn upcoming_for_user(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<MentorshipSession>> {
        let sql = format!(
            r#"
            SELECT {} FROM mentorship_sessions
            WHERE (mentee_id = ? OR mentor_id = ?) AND status = 'scheduled' AND starts_at >= ?
            ORDER BY starts_at
            LIMIT ?
            "#,
            SESSION_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => Ok(sqlx::query(&sql)
                .bind(user_id)
                .bind(user_id)
                .bind(now)
                .bind(limit)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to load upcoming sessions")?
                .iter()
                .map(row_to_session_sqlite)
                .collect()),
            DatabaseDriver::Mysql => Ok(sqlx::query(&sql)
                .bind(user_id)
                .bind(user_id)
                .bind(now)
                .bind(limit)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to load upcoming sessions")?
                .iter()
                .map(row_to_session_mysql)
                .collect()),
        }
    }
}

impl SqlxMentorshipRepository {
    async fn list_sessions_by(&self, sql: &str, user_id: i64) -> Result<Vec<MentorshipSession>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => Ok(sqlx::query(sql)
                .bind(user_id)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to list mentorship sessions")?
                .iter()
                .map(row_to_session_sqlite)
                .collect()),
            DatabaseDriver::Mysql => Ok(sqlx::query(sql)
                .bind(user_id)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to list mentorship sessions")?
                .iter()
                .map(row_to_session_mysql)
                .collect()),
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn grant_sqlite(
    pool: &SqlitePool,
    user_id: i64,
    program_id: i64,
    order_id: Option<i64>,
    now: DateTime<Utc>,
) -> Result<()> {
    let inserted = sqlx::query(
        "INSERT OR IGNORE INTO mentorship_enrollments (user_id, program_id, status, order_id, enrolled_at) VALUES (?, ?, 'active', ?, ?)",
    )
    .bind(user_id)
    .bind(program_id)
    .bind(order_id)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to grant mentorship enrollment")?
    .rows_affected();

    if inserted == 0 {
        sqlx::query(REACTIVATE_ENROLLMENT)
            .bind(order_id)
            .bind(now)
            .bind(user_id)
            .bind(program_id)
            .execute(pool)
            .await
            .context("Failed to reactivate mentorship enrollment")?;
    }
    Ok(())
}

async fn insert_session_sqlite(pool: &SqlitePool, session: &MentorshipSession) -> Result<i64> {
    let result = sqlx::query(INSERT_SESSION)
        .bind(session.program_id)
        .bind(session.mentor_id)
        .bind(session.mentee_id)
        .bind(session.starts_at)
        .bind(session.duration_minutes)
        .bind(session.status.as_str())
        .bind(&session.topic)
        .bind(&session.meeting_url)
        .bind(&session.notes)
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(pool)
        .await
        .context("Failed to book mentorship session")?;
    Ok(result.last_insert_rowid())
}

fn row_to_program_sqlite(row: &sqlx::sqlite::SqliteRow) -> MentorshipProgram {
    let status: String = row.get("status");
    MentorshipProgram {
        id: row.get("id"),
        slug: row.get("slug"),
        title: row.get("title"),
        description: row.get("description"),
        mentor_id: row.get("mentor_id"),
        price: row.get("price"),
        currency: row.get("currency"),
        session_minutes: row.get("session_minutes"),
        max_mentees: row.get("max_mentees"),
        status: status.parse().unwrap_or_default(),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_session_sqlite(row: &sqlx::sqlite::SqliteRow) -> MentorshipSession {
    let status: String = row.get("status");
    MentorshipSession {
        id: row.get("id"),
        program_id: row.get("program_id"),
        mentor_id: row.get("mentor_id"),
        mentee_id: row.get("mentee_id"),
        starts_at: row.get("starts_at"),
        duration_minutes: row.get("duration_minutes"),
        status: status.parse().unwrap_or_default(),
        topic: row.get("topic"),
        meeting_url: row.get("meeting_url"),
        notes: row.get("notes"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn grant_mysql(
    pool: &MySqlPool,
    user_id: i64,
    program_id: i64,
    order_id: Option<i64>,
    now: DateTime<Utc>,
) -> Result<()> {
    let inserted = sqlx::query(
        "INSERT IGNORE INTO mentorship_enrollments (user_id, program_id, status, order_id, enrolled_at) VALUES (?, ?, 'active', ?, ?)",
    )
    .bind(user_id)
    .bind(program_id)
    .bind(order_id)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to grant mentorship enrollment")?
    .rows_affected();

    if inserted == 0 {
        sqlx::query(REACTIVATE_ENROLLMENT)
            .bind(order_id)
            .bind(now)
            .bind(user_id)
            .bind(program_id)
            .execute(pool)
            .await
            .context("Failed to reactivate mentorship enrollment")?;
    }
    Ok(())
}

async fn insert_session_mysql(pool: &MySqlPool, session: &MentorshipSession) -> Result<i64> {
    let result = sqlx::query(INSERT_SESSION)
        .bind(session.program_id)
        .bind(session.mentor_id)
        .bind(session.mentee_id)
        .bind(session.starts_at)
        .bind(session.duration_minutes)
        .bind(session.status.as_str())
        .bind(&session.topic)
        .bind(&session.meeting_url)
        .bind(&session.notes)
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(pool)
        .await
        .context("Failed to book mentorship session")?;
    Ok(result.last_insert_id() as i64)
}

fn row_to_program_mysql(row: &sqlx::mysql::MySqlRow) -> MentorshipProgram {
    let status: String = row.get("status");
    MentorshipProgram {
        id: row.get("id"),
        slug: row.get("slug"),
        title: row.get("title"),
        description: row.get("description"),
        mentor_id: row.get("mentor_id"),
        price: row.get("price"),
        currency: row.get("currency"),
        session_minutes: row.get("session_minutes"),
        max_mentees: row.get("max_mentees"),
        status: status.parse().unwrap_or_default(),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_session_mysql(row: &sqlx::mysql::MySqlRow) -> MentorshipSession {
    let status: String = row.get("status");
    MentorshipSession {
        id: row.get("id"),
        program_id: row.get("program_id"),
        mentor_id: row.get("mentor_id"),
        mentee_id: row.get("mentee_id"),
        starts_at: row.get("starts_at"),
        duration_minutes: row.get("duration_minutes"),
        status: status.parse().unwrap_or_default(),
        topic: row.get("topic"),
        meeting_url: row.get("meeting_url"),
        notes: row.get("notes"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_user, setup_pool};
    use crate::models::SessionStatus;
    use chrono::{Duration, TimeZone};

    fn program(mentor_id: i64) -> MentorshipProgram {
        let now = Utc::now();
        MentorshipProgram {
            id: 0,
            slug: "founders".to_string(),
            title: "Founders circle".to_string(),
            description: String::new(),
            mentor_id,
            price: 0,
            currency: "INR".to_string(),
            session_minutes: 60,
            max_mentees: 2,
            status: PublishStatus::Published,
            created_at: now,
            updated_at: now,
        }
    }

    fn session(program: &MentorshipProgram, mentee_id: i64, starts_at: DateTime<Utc>) -> MentorshipSession {
        let now = Utc::now();
        MentorshipSession {
            id: 0,
            program_id: program.id,
            mentor_id: program.mentor_id,
            mentee_id,
            starts_at,
            duration_minutes: program.session_minutes,
            status: SessionStatus::Scheduled,
            topic: Some("Pitch deck".to_string()),
            meeting_url: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_program_and_enrollments() {
        let pool = setup_pool().await;
        let mentor = insert_user(&pool, "m@example.com").await;
        let mentee = insert_user(&pool, "e@example.com").await;
        let repo = SqlxMentorshipRepository::new(pool);

        let p = repo.create_program(&program(mentor)).await.unwrap();
        assert_eq!(repo.count_programs(PublishStatus::Published).await.unwrap(), 1);

        repo.create_enrollment(mentee, p.id, None).await.unwrap();
        assert_eq!(repo.count_active_enrollments(p.id).await.unwrap(), 1);
        let err = repo.create_enrollment(mentee, p.id, None).await.unwrap_err();
        assert!(crate::db::is_unique_violation(&err));

        let e = repo.get_enrollment(mentee, p.id).await.unwrap().unwrap();
        assert_eq!(e.status, EnrollmentStatus::Active);
    }

    #[tokio::test]
    async fn test_double_booking_rejected_until_cancelled() {
        let pool = setup_pool().await;
        let mentor = insert_user(&pool, "m@example.com").await;
        let a = insert_user(&pool, "a@example.com").await;
        let b = insert_user(&pool, "b@example.com").await;
        let repo = SqlxMentorshipRepository::new(pool);
        let p = repo.create_program(&program(mentor)).await.unwrap();
        let slot = Utc.with_ymd_and_hms(2030, 1, 1, 4, 30, 0).unwrap();

        let mut booked = repo.create_session(&session(&p, a, slot)).await.unwrap();
        let err = repo.create_session(&session(&p, b, slot)).await.unwrap_err();
        assert!(crate::db::is_unique_violation(&err));

        booked.status = SessionStatus::Cancelled;
        repo.update_session(&booked).await.unwrap();
        repo.create_session(&session(&p, b, slot)).await.unwrap();

        let day = repo
            .scheduled_for_mentor(mentor, slot - Duration::hours(5), slot + Duration::hours(19))
            .await
            .unwrap();
        assert_eq!(day.len(), 1);
        assert_eq!(day[0].mentee_id, b);
    }

    #[tokio::test]
    async fn test_session_listing() {
        let pool = setup_pool().await;
        let mentor = insert_user(&pool, "m@example.com").await;
        let mentee = insert_user(&pool, "e@example.com").await;
        let repo = SqlxMentorshipRepository::new(pool);
        let p = repo.create_program(&program(mentor)).await.unwrap();

        let now = Utc::now();
        repo.create_session(&session(&p, mentee, now - Duration::days(1))).await.unwrap();
        let future = repo
            .create_session(&session(&p, mentee, now + Duration::days(1)))
            .await
            .unwrap();

        assert_eq!(repo.list_sessions_for_mentee(mentee).await.unwrap().len(), 2);
        assert_eq!(repo.list_sessions_for_mentor(mentor).await.unwrap().len(), 2);

        let upcoming = repo.upcoming_for_user(mentor, now, 5).await.unwrap();
        assert_eq!(upcoming.len(), 1);
        assert_eq!(upcoming[0].id, future.id);
    }
}
