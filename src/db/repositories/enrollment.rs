//! Enrollment repository
//!
//! Course enrollments and per-lesson completion records.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Enrollment, EnrollmentStatus, EnrollmentWithCourse, PublishStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Per-course figures for an instructor's dashboard
#[derive(Debug, Clone, Serialize)]
pub struct InstructorCourseStats {
    pub course_id: i64,
    pub title: String,
    pub slug: String,
    pub status: PublishStatus,
    pub enrollments: i64,
    /// Mean progress over non-cancelled enrollments, rounded down
    pub average_progress: i64,
    /// Successful payments for the course, minor units
    pub revenue: i64,
}

#[async_trait]
pub trait EnrollmentRepository: Send + Sync {
    /// Plain insert; a duplicate pair is a unique violation
    async fn create(&self, user_id: i64, course_id: i64, order_id: Option<i64>) -> Result<Enrollment>;

    /// Idempotent grant used by payment fulfilment: inserts when missing,
    /// reactivates a cancelled enrollment, otherwise leaves the row alone.
    async fn grant(&self, user_id: i64, course_id: i64, order_id: Option<i64>) -> Result<()>;

    async fn get(&self, user_id: i64, course_id: i64) -> Result<Option<Enrollment>>;

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<EnrollmentWithCourse>>;

    async fn update_progress(
        &self,
        id: i64,
        progress_percent: i32,
        status: EnrollmentStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<()>;

    /// Cancel the enrollment paid by `order_id`
    async fn cancel_by_order(&self, order_id: i64) -> Result<u64>;

    /// Record a lesson as completed; repeated calls are no-ops
    async fn mark_lesson_complete(&self, user_id: i64, lesson_id: i64, course_id: i64) -> Result<()>;

    async fn completed_lesson_ids(&self, user_id: i64, course_id: i64) -> Result<Vec<i64>>;

    /// Enrollments that have not been cancelled
    async fn count_active(&self) -> Result<i64>;

    async fn instructor_stats(&self, instructor_id: i64) -> Result<Vec<InstructorCourseStats>>;
}

pub struct SqlxEnrollmentRepository {
    pool: DynDatabasePool,
}

impl SqlxEnrollmentRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn EnrollmentRepository> {
        Arc::new(Self::new(pool))
    }
}

const ENROLLMENT_COLUMNS: &str =
    "e.id, e.user_id, e.course_id, e.status, e.progress_percent, e.order_id, e.enrolled_at, e.completed_at";

const INSERT_ENROLLMENT: &str = r#"
    INSERT INTO enrollments (user_id, course_id, status, progress_percent, order_id, enrolled_at)
    VALUES (?, ?, 'active', 0, ?, ?)
"#;

const REACTIVATE_ENROLLMENT: &str = r#"
    UPDATE enrollments
    SET status = 'active', order_id = ?, enrolled_at = ?
    WHERE user_id = ? AND course_id = ? AND status = 'cancelled'
"#;

const INSTRUCTOR_STATS_SQLITE: &str = r#"
    SELECT c.id, c.title, c.slug, c.status,
           (SELECT COUNT(*) FROM enrollments e
             WHERE e.course_id = c.id AND e.status <> 'cancelled') AS enrollments,
           (SELECT COALESCE(SUM(e.progress_percent), 0) FROM enrollments e
             WHERE e.course_id = c.id AND e.status <> 'cancelled') AS progress_sum,
           (SELECT COALESCE(SUM(p.amount), 0) FROM payments p
             INNER JOIN orders o ON o.id = p.order_id
             WHERE o.item_type = 'course' AND o.item_id = c.id AND p.status = 'success') AS revenue
    FROM courses c
    WHERE c.instructor_id = ?
    ORDER BY c.created_at DESC, c.id DESC
"#;

const INSTRUCTOR_STATS_MYSQL: &str = r#"
    SELECT c.id, c.title, c.slug, c.status,
           (SELECT COUNT(*) FROM enrollments e
             WHERE e.course_id = c.id AND e.status <> 'cancelled') AS enrollments,
           (SELECT CAST(COALESCE(SUM(e.progress_percent), 0) AS SIGNED) FROM enrollments e
             WHERE e.course_id = c.id AND e.status <> 'cancelled') AS progress_sum,
           (SELECT CAST(COALESCE(SUM(p.amount), 0) AS SIGNED) FROM payments p
             INNER JOIN orders o ON o.id = p.order_id
             WHERE o.item_type = 'course' AND o.item_id = c.id AND p.status = 'success') AS revenue
    FROM courses c
    WHERE c.instructor_id = ?
    ORDER BY c.created_at DESC, c.id DESC
"#;

#[async_trait]
impl EnrollmentRepository for SqlxEnrollmentRepository {
    async fn create(&self, user_id: i64, course_id: i64, order_id: Option<i64>) -> Result<Enrollment> {
        let now = Utc::now();
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(INSERT_ENROLLMENT)
                .bind(user_id)
                .bind(course_id)
                .bind(order_id)
                .bind(now)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to create enrollment")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(INSERT_ENROLLMENT)
                .bind(user_id)
                .bind(course_id)
                .bind(order_id)
                .bind(now)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to create enrollment")?
                .last_insert_id() as i64,
        };

        Ok(Enrollment {
            id,
            user_id,
            course_id,
            status: EnrollmentStatus::Active,
            progress_percent: 0,
            order_id,
            enrolled_at: now,
            completed_at: None,
        })
    }

    async fn grant(&self, user_id: i64, course_id: i64, order_id: Option<i64>) -> Result<()> {
        let now = Utc::now();
        match self.pool.driver() {
            DatabaseDriver::Sqlite => grant_sqlite(self.pool.sqlite()?, user_id, course_id, order_id, now).await,
            DatabaseDriver::Mysql => grant_mysql(self.pool.mysql()?, user_id, course_id, order_id, now).await,
        }
    }

    async fn get(&self, user_id: i64, course_id: i64) -> Result<Option<Enrollment>> {
        let sql = format!(
            "SELECT {} FROM enrollments e WHERE e.user_id = ? AND e.course_id = ?",
            ENROLLMENT_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => Ok(sqlx::query(&sql)
                .bind(user_id)
                .bind(course_id)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get enrollment")?
                .as_ref()
                .map(row_to_enrollment_sqlite)),
            DatabaseDriver::Mysql => Ok(sqlx::query(&sql)
                .bind(user_id)
                .bind(course_id)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get enrollment")?
                .as_ref()
                .map(row_to_enrollment_mysql)),
        }
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<EnrollmentWithCourse>> {
        let sql = format!(
            r#"
            SELECT {}, c.title AS course_title, c.slug AS course_slug, c.thumbnail AS course_thumbnail
            FROM enrollments e
            INNER JOIN courses c ON c.id = e.course_id
            WHERE e.user_id = ?
            ORDER BY e.enrolled_at DESC, e.id DESC
            "#,
            ENROLLMENT_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => Ok(sqlx::query(&sql)
                .bind(user_id)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to list enrollments")?
                .iter()
                .map(|row| EnrollmentWithCourse {
                    enrollment: row_to_enrollment_sqlite(row),
                    course_title: row.get("course_title"),
                    course_slug: row.get("course_slug"),
                    course_thumbnail: row.get("course_thumbnail"),
                })
                .collect()),
            DatabaseDriver::Mysql => Ok(sqlx::query(&sql)
                .bind(user_id)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to list enrollments")?
                .iter()
                .map(|row| EnrollmentWithCourse {
                    enrollment: row_to_enrollment_mysql(row),
                    course_title: row.get("course_title"),
                    course_slug: row.get("course_slug"),
                    course_thumbnail: row.get("course_thumbnail"),
                })
                .collect()),
        }
    }

    async fn update_progress(
        &self,
        id: i64,
        progress_percent: i32,
        status: EnrollmentStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        execute!(
            self,
            "UPDATE enrollments SET progress_percent = ?, status = ?, completed_at = ? WHERE id = ?",
            "Failed to update enrollment progress",
            progress_percent,
            status.as_str(),
            completed_at,
            id
        );
        Ok(())
    }

    async fn cancel_by_order(&self, order_id: i64) -> Result<u64> {
        Ok(execute!(
            self,
            "UPDATE enrollments SET status = 'cancelled' WHERE order_id = ?",
            "Failed to cancel enrollment",
            order_id
        ))
    }

    async fn mark_lesson_complete(&self, user_id: i64, lesson_id: i64, course_id: i64) -> Result<()> {
        let now = Utc::now();
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(
                    "INSERT OR IGNORE INTO lesson_progress (user_id, lesson_id, course_id, completed_at) VALUES (?, ?, ?, ?)",
                )
                .bind(user_id)
                .bind(lesson_id)
                .bind(course_id)
                .bind(now)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to record lesson progress")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(
                    "INSERT IGNORE INTO lesson_progress (user_id, lesson_id, course_id, completed_at) VALUES (?, ?, ?, ?)",
                )
                .bind(user_id)
                .bind(lesson_id)
                .bind(course_id)
                .bind(now)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to record lesson progress")?;
            }
        }
        Ok(())
    }

    async fn completed_lesson_ids(&self, user_id: i64, course_id: i64) -> Result<Vec<i64>> {
        let sql = "SELECT lesson_id FROM lesson_progress WHERE user_id = ? AND course_id = ? ORDER BY lesson_id";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => Ok(sqlx::query(sql)
                .bind(user_id)
                .bind(course_id)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to load lesson progress")?
                .iter()
                .map(|row| row.get("lesson_id"))
                .collect()),
            DatabaseDriver::Mysql => Ok(sqlx::query(sql)
                .bind(user_id)
                .bind(course_id)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to load lesson progress")?
                .iter()
                .map(|row| row.get("lesson_id"))
                .collect()),
        }
    }

    async fn count_active(&self) -> Result<i64> {
        let sql = "SELECT COUNT(*) AS count FROM enrollments WHERE status <> 'cancelled'";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => Ok(sqlx::query(sql)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to count enrollments")?
                .get("count")),
            DatabaseDriver::Mysql => Ok(sqlx::query(sql)
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to count enrollments")?
                .get("count")),
        }
    }

    async fn instructor_stats(&self, instructor_id: i64) -> Result<Vec<InstructorCourseStats>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => Ok(sqlx::query(INSTRUCTOR_STATS_SQLITE)
                .bind(instructor_id)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to load instructor stats")?
                .iter()
                .map(|row| {
                    instructor_stats_from(
                        row.get("id"),
                        row.get("title"),
                        row.get("slug"),
                        row.get("status"),
                        row.get("enrollments"),
                        row.get("progress_sum"),
                        row.get("revenue"),
                    )
                })
                .collect()),
            DatabaseDriver::Mysql => Ok(sqlx::query(INSTRUCTOR_STATS_MYSQL)
                .bind(instructor_id)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to load instructor stats")?
                .iter()
                .map(|row| {
                    instructor_stats_from(
                        row.get("id"),
                        row.get("title"),
                        row.get("slug"),
                        row.get("status"),
                        row.get("enrollments"),
                        row.get("progress_sum"),
                        row.get("revenue"),
                    )
                })
                .collect()),
        }
    }
}

fn instructor_stats_from(
    course_id: i64,
    title: String,
    slug: String,
    status: String,
    enrollments: i64,
    progress_sum: i64,
    revenue: i64,
) -> InstructorCourseStats {
    InstructorCourseStats {
        course_id,
        title,
        slug,
        status: status.parse().unwrap_or_default(),
        enrollments,
        average_progress: if enrollments > 0 { progress_sum / enrollments } else { 0 },
        revenue,
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn grant_sqlite(
    pool: &SqlitePool,
    user_id: i64,
    course_id: i64,
    order_id: Option<i64>,
    now: DateTime<Utc>,
) -> Result<()> {
    let inserted = sqlx::query(
        r#"
        INSERT OR IGNORE INTO enrollments (user_id, course_id, status, progress_percent, order_id, enrolled_at)
        VALUES (?, ?, 'active', 0, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(course_id)
    .bind(order_id)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to grant enrollment")?
    .rows_affected();

    if inserted == 0 {
        sqlx::query(REACTIVATE_ENROLLMENT)
            .bind(order_id)
            .bind(now)
            .bind(user_id)
            .bind(course_id)
            .execute(pool)
            .await
            .context("Failed to reactivate enrollment")?;
    }
    Ok(())
}

fn row_to_enrollment_sqlite(row: &sqlx::sqlite::SqliteRow) -> Enrollment {
    let status: String = row.get("status");
    Enrollment {
        id: row.get("id"),
        user_id: row.get("user_id"),
        course_id: row.get("course_id"),
        status: status.parse().unwrap_or_default(),
        progress_percent: row.get("progress_percent"),
        order_id: row.get("order_id"),
        enrolled_at: row.get("enrolled_at"),
        completed_at: row.get("completed_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn grant_mysql(
    pool: &MySqlPool,
    user_id: i64,
    course_id: i64,
    order_id: Option<i64>,
    now: DateTime<Utc>,
) -> Result<()> {
    let inserted = sqlx::query(
        r#"
        INSERT IGNORE INTO enrollments (user_id, course_id, status, progress_percent, order_id, enrolled_at)
        VALUES (?, ?, 'active', 0, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(course_id)
    .bind(order_id)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to grant enrollment")?
    .rows_affected();

    if inserted == 0 {
        sqlx::query(REACTIVATE_ENROLLMENT)
            .bind(order_id)
            .bind(now)
            .bind(user_id)
            .bind(course_id)
            .execute(pool)
            .await
            .context("Failed to reactivate enrollment")?;
    }
    Ok(())
}

fn row_to_enrollment_mysql(row: &sqlx::mysql::MySqlRow) -> Enrollment {
    let status: String = row.get("status");
    Enrollment {
        id: row.get("id"),
        user_id: row.get("user_id"),
        course_id: row.get("course_id"),
        status: status.parse().unwrap_or_default(),
        progress_percent: row.get("progress_percent"),
        order_id: row.get("order_id"),
        enrolled_at: row.get("enrolled_at"),
        completed_at: row.get("completed_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_course, insert_lessons, insert_user, setup_pool};

    #[tokio::test]
    async fn test_create_and_duplicate_enrollment() {
        let pool = setup_pool().await;
        let user = insert_user(&pool, "u@example.com").await;
        let course = insert_course(&pool, user, "c1", 0, PublishStatus::Published).await;
        let repo = SqlxEnrollmentRepository::new(pool);

        let enrollment = repo.create(user, course, None).await.unwrap();
        assert_eq!(enrollment.status, EnrollmentStatus::Active);
        assert!(repo.get(user, course).await.unwrap().is_some());

        let err = repo.create(user, course, None).await.unwrap_err();
        assert!(crate::db::is_unique_violation(&err));
    }

    #[tokio::test]
    async fn test_grant_is_idempotent_and_reactivates() {
        let pool = setup_pool().await;
        let user = insert_user(&pool, "u@example.com").await;
        let course = insert_course(&pool, user, "paid", 10_000, PublishStatus::Published).await;
        let repo = SqlxEnrollmentRepository::new(pool);

        repo.grant(user, course, Some(7)).await.unwrap();
        repo.grant(user, course, Some(7)).await.unwrap();
        assert_eq!(repo.list_for_user(user).await.unwrap().len(), 1);

        assert_eq!(repo.cancel_by_order(7).await.unwrap(), 1);
        let cancelled = repo.get(user, course).await.unwrap().unwrap();
        assert_eq!(cancelled.status, EnrollmentStatus::Cancelled);
        assert!(!cancelled.grants_access());

        repo.grant(user, course, Some(8)).await.unwrap();
        let active = repo.get(user, course).await.unwrap().unwrap();
        assert_eq!(active.status, EnrollmentStatus::Active);
        assert_eq!(active.order_id, Some(8));
    }

    #[tokio::test]
    async fn test_lesson_progress_is_idempotent() {
        let pool = setup_pool().await;
        let user = insert_user(&pool, "u@example.com").await;
        let course = insert_course(&pool, user, "c1", 0, PublishStatus::Published).await;
        let lessons = insert_lessons(&pool, course, 3).await;
        let repo = SqlxEnrollmentRepository::new(pool);

        repo.mark_lesson_complete(user, lessons[1], course).await.unwrap();
        repo.mark_lesson_complete(user, lessons[1], course).await.unwrap();
        repo.mark_lesson_complete(user, lessons[0], course).await.unwrap();

        let done = repo.completed_lesson_ids(user, course).await.unwrap();
        assert_eq!(done, vec![lessons[0], lessons[1]]);
    }

    #[tokio::test]
    async fn test_update_progress_and_stats() {
        let pool = setup_pool().await;
        let instructor = insert_user(&pool, "i@example.com").await;
        let a = insert_user(&pool, "a@example.com").await;
        let b = insert_user(&pool, "b@example.com").await;
        let course = insert_course(&pool, instructor, "c1", 0, PublishStatus::Published).await;
        let repo = SqlxEnrollmentRepository::new(pool);

        let ea = repo.create(a, course, None).await.unwrap();
        repo.create(b, course, None).await.unwrap();
        repo.update_progress(ea.id, 100, EnrollmentStatus::Completed, Some(Utc::now()))
            .await
            .unwrap();

        let stored = repo.get(a, course).await.unwrap().unwrap();
        assert_eq!(stored.progress_percent, 100);
        assert!(stored.completed_at.is_some());

        let stats = repo.instructor_stats(instructor).await.unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].enrollments, 2);
        assert_eq!(stats[0].average_progress, 50);
        assert_eq!(stats[0].revenue, 0);
        assert_eq!(repo.count_active().await.unwrap(), 2);
    }
}
