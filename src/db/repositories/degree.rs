//! Degree program repository

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{
    DegreeEnrollment, DegreeEnrollmentStatus, DegreeEnrollmentWithProgram, DegreeProgram,
    ListParams, PublishStatus,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

#[async_trait]
pub trait DegreeRepository: Send + Sync {
    async fn create(&self, program: &DegreeProgram) -> Result<DegreeProgram>;

    async fn get_by_id(&self, id: i64) -> Result<Option<DegreeProgram>>;

    async fn update(&self, program: &DegreeProgram) -> Result<DegreeProgram>;

    async fn delete(&self, id: i64) -> Result<()>;

    async fn list(
        &self,
        status: Option<PublishStatus>,
        params: &ListParams,
    ) -> Result<(Vec<DegreeProgram>, i64)>;

    /// Replace the program's course list; order of `course_ids` is kept
    async fn set_courses(&self, program_id: i64, course_ids: &[i64]) -> Result<()>;

    async fn course_ids(&self, program_id: i64) -> Result<Vec<i64>>;

    async fn create_enrollment(
        &self,
        user_id: i64,
        program_id: i64,
        order_id: Option<i64>,
    ) -> Result<DegreeEnrollment>;

    /// Idempotent grant; reactivates a withdrawn enrollment
    async fn grant_enrollment(&self, user_id: i64, program_id: i64, order_id: Option<i64>) -> Result<()>;

    async fn get_enrollment(&self, user_id: i64, program_id: i64) -> Result<Option<DegreeEnrollment>>;

    async fn get_enrollment_by_id(&self, id: i64) -> Result<Option<DegreeEnrollment>>;

    async fn list_enrollments_for_user(&self, user_id: i64) -> Result<Vec<DegreeEnrollmentWithProgram>>;

    async fn list_enrollments_for_program(&self, program_id: i64) -> Result<Vec<DegreeEnrollment>>;

    async fn update_enrollment_status(&self, id: i64, status: DegreeEnrollmentStatus) -> Result<()>;

    /// Withdraw the enrollment paid by `order_id`
    async fn withdraw_by_order(&self, order_id: i64) -> Result<u64>;
}

pub struct SqlxDegreeRepository {
    pool: DynDatabasePool,
}

impl SqlxDegreeRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn DegreeRepository> {
        Arc::new(Self::new(pool))
    }
}

const PROGRAM_COLUMNS: &str =
    "id, slug, title, description, duration_months, price, currency, status, created_at, updated_at";

const INSERT_PROGRAM: &str = r#"
    INSERT INTO degree_programs (slug, title, description, duration_months, price, currency,
                                 status, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

const UPDATE_PROGRAM: &str = r#"
    UPDATE degree_programs
    SET slug = ?, title = ?, description = ?, duration_months = ?, price = ?, currency = ?,
        status = ?, updated_at = ?
    WHERE id = ?
"#;

const ENROLLMENT_COLUMNS: &str = "de.id, de.user_id, de.program_id, de.status, de.order_id, de.enrolled_at";

const INSERT_ENROLLMENT: &str = r#"
    INSERT INTO degree_enrollments (user_id, program_id, status, order_id, enrolled_at)
    VALUES (?, ?, 'active', ?, ?)
"#;

const REACTIVATE_ENROLLMENT: &str = r#"
    UPDATE degree_enrollments
    SET status = 'active', order_id = ?, enrolled_at = ?
    WHERE user_id = ? AND program_id = ? AND status = 'withdrawn'
"#;

#[async_trait]
impl DegreeRepository for SqlxDegreeRepository {
    async fn create(&self, program: &DegreeProgram) -> Result<DegreeProgram> {
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(INSERT_PROGRAM)
                .bind(&program.slug)
                .bind(&program.title)
                .bind(&program.description)
                .bind(program.duration_months)
                .bind(program.price)
                .bind(&program.currency)
                .bind(program.status.as_str())
                .bind(program.created_at)
                .bind(program.updated_at)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to create degree program")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(INSERT_PROGRAM)
                .bind(&program.slug)
                .bind(&program.title)
                .bind(&program.description)
                .bind(program.duration_months)
                .bind(program.price)
                .bind(&program.currency)
                .bind(program.status.as_str())
                .bind(program.created_at)
                .bind(program.updated_at)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to create degree program")?
                .last_insert_id() as i64,
        };
        Ok(DegreeProgram { id, ..program.clone() })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<DegreeProgram>> {
        let sql = format!("SELECT {} FROM degree_programs WHERE id = ?", PROGRAM_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => Ok(sqlx::query(&sql)
                .bind(id)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get degree program")?
                .as_ref()
                .map(row_to_program_sqlite)),
            DatabaseDriver::Mysql => Ok(sqlx::query(&sql)
                .bind(id)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get degree program")?
                .as_ref()
                .map(row_to_program_mysql)),
        }
    }

    async fn update(&self, program: &DegreeProgram) -> Result<DegreeProgram> {
        let now = Utc::now();
        execute!(
            self,
            UPDATE_PROGRAM,
            "Failed to update degree program",
            &program.slug,
            &program.title,
            &program.description,
            program.duration_months,
            program.price,
            &program.currency,
            program.status.as_str(),
            now,
            program.id
        );
        Ok(DegreeProgram {
            updated_at: now,
            ..program.clone()
        })
    }

    async fn delete(&self, id: i64) -> Result<()> {
        execute!(
            self,
            "DELETE FROM degree_programs WHERE id = ?",
            "Failed to delete degree program",
            id
        );
        Ok(())
    }

    async fn list(
        &self,
        status: Option<PublishStatus>,
        params: &ListParams,
    ) -> Result<(Vec<DegreeProgram>, i64)> {
        let status = status.map(|s| s.as_str().to_string());
        let sql = format!(
            "SELECT {} FROM degree_programs WHERE (? IS NULL OR status = ?) ORDER BY id DESC LIMIT ? OFFSET ?",
            PROGRAM_COLUMNS
        );
        let count_sql = "SELECT COUNT(*) AS count FROM degree_programs WHERE (? IS NULL OR status = ?)";
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
                    .context("Failed to list degree programs")?;
                let total: i64 = sqlx::query(count_sql)
                    .bind(&status)
                    .bind(&status)
                    .fetch_one(pool)
                    .await
                    .context("Failed to count degree programs")?
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
                    .context("Failed to list degree programs")?;
                let total: i64 = sqlx::query(count_sql)
                    .bind(&status)
                    .bind(&status)
                    .fetch_one(pool)
                    .await
                    .context("Failed to count degree programs")?
                    .get("count");
                Ok((rows.iter().map(row_to_program_mysql).collect(), total))
            }
        }
    }

    async fn set_courses(&self, program_id: i64, course_ids: &[i64]) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => set_courses_sqlite(self.pool.sqlite()?, program_id, course_ids).await,
            DatabaseDriver::Mysql => set_courses_mysql(self.pool.mysql()?, program_id, course_ids).await,
        }
    }

    async fn course_ids(&self, program_id: i64) -> Result<Vec<i64>> {
        let sql = "SELECT course_id FROM degree_program_courses WHERE program_id = ? ORDER BY position, course_id";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => Ok(sqlx::query(sql)
                .bind(program_id)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to load program courses")?
                .iter()
                .map(|row| row.get("course_id"))
                .collect()),
            DatabaseDriver::Mysql => Ok(sqlx::query(sql)
                .bind(program_id)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to load program courses")?
                .iter()
                .map(|row| row.get("course_id"))
                .collect()),
        }
    }

    async fn create_enrollment(
        &self,
        user_id: i64,
        program_id: i64,
        order_id: Option<i64>,
    ) -> Result<DegreeEnrollment> {
        let now = Utc::now();
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(INSERT_ENROLLMENT)
                .bind(user_id)
                .bind(program_id)
                .bind(order_id)
                .bind(now)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to create degree enrollment")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(INSERT_ENROLLMENT)
                .bind(user_id)
                .bind(program_id)
                .bind(order_id)
                .bind(now)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to create degree enrollment")?
                .last_insert_id() as i64,
        };
        Ok(DegreeEnrollment {
            id,
            user_id,
            program_id,
            status: DegreeEnrollmentStatus::Active,
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

    async fn get_enrollment(&self, user_id: i64, program_id: i64) -> Result<Option<DegreeEnrollment>> {
        let sql = format!(
            "SELECT {} FROM degree_enrollments de WHERE de.user_id = ? AND de.program_id = ?",
            ENROLLMENT_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => Ok(sqlx::query(&sql)
                .bind(user_id)
                .bind(program_id)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get degree enrollment")?
                .as_ref()
                .map(row_to_enrollment_sqlite)),
            DatabaseDriver::Mysql => Ok(sqlx::query(&sql)
                .bind(user_id)
                .bind(program_id)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get degree enrollment")?
                .as_ref()
                .map(row_to_enrollment_mysql)),
        }
    }

    async fn get_enrollment_by_id(&self, id: i64) -> Result<Option<DegreeEnrollment>> {
        let sql = format!("SELECT {} FROM degree_enrollments de WHERE de.id = ?", ENROLLMENT_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => Ok(sqlx::query(&sql)
                .bind(id)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get degree enrollment")?
                .as_ref()
                .map(row_to_enrollment_sqlite)),
            DatabaseDriver::Mysql => Ok(sqlx::query(&sql)
                .bind(id)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get degree enrollment")?
                .as_ref()
                .map(row_to_enrollment_mysql)),
        }
    }

    async fn list_enrollments_for_user(&self, user_id: i64) -> Result<Vec<DegreeEnrollmentWithProgram>> {
        let sql = format!(
            r#"
            SELECT {}, dp.title AS program_title, dp.slug AS program_slug
            FROM degree_enrollments de
            INNER JOIN degree_programs dp ON dp.id = de.program_id
            WHERE de.user_id = ?
            ORDER BY de.enrolled_at DESC, de.id DESC
            "#,
            ENROLLMENT_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => Ok(sqlx::query(&sql)
                .bind(user_id)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to list degree enrollments")?
                .iter()
                .map(|row| DegreeEnrollmentWithProgram {
                    enrollment: row_to_enrollment_sqlite(row),
                    program_title: row.get("program_title"),
                    program_slug: row.get("program_slug"),
                })
                .collect()),
            DatabaseDriver::Mysql => Ok(sqlx::query(&sql)
                .bind(user_id)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to list degree enrollments")?
                .iter()
                .map(|row| DegreeEnrollmentWithProgram {
                    enrollment: row_to_enrollment_mysql(row),
                    program_title: row.get("program_title"),
                    program_slug: row.get("program_slug"),
                })
                .collect()),
        }
    }

    async fn list_enrollments_for_program(&self, program_id: i64) -> Result<Vec<DegreeEnrollment>> {
        let sql = format!(
            "SELECT {} FROM degree_enrollments de WHERE de.program_id = ? ORDER BY de.enrolled_at DESC, de.id DESC",
            ENROLLMENT_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => Ok(sqlx::query(&sql)
                .bind(program_id)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to list program enrollments")?
                .iter()
                .map(row_to_enrollment_sqlite)
                .collect()),
            DatabaseDriver::Mysql => Ok(sqlx::query(&sql)
                .bind(program_id)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to list program enrollments")?
                .iter()
                .map(row_to_enrollment_mysql)
                .collect()),
        }
    }

    async fn update_enrollment_status(&self, id: i64, status: DegreeEnrollmentStatus) -> Result<()> {
        execute!(
            self,
            "UPDATE degree_enrollments SET status = ? WHERE id = ?",
            "Failed to update degree enrollment",
            status.as_str(),
            id
        );
        Ok(())
    }

    async fn withdraw_by_order(&self, order_id: i64) -> Result<u64> {
        Ok(execute!(
            self,
            "UPDATE degree_enrollments SET status = 'withdrawn' WHERE order_id = ?",
            "Failed to withdraw degree enrollment",
            order_id
        ))
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn set_courses_sqlite(pool: &SqlitePool, program_id: i64, course_ids: &[i64]) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query("DELETE FROM degree_program_courses WHERE program_id = ?")
        .bind(program_id)
        .execute(&mut *tx)
        .await
        .context("Failed to clear program courses")?;

    for (position, course_id) in course_ids.iter().enumerate() {
        sqlx::query(
            "INSERT INTO degree_program_courses (program_id, course_id, position) VALUES (?, ?, ?)",
        )
        .bind(program_id)
        .bind(course_id)
        .bind(position as i32)
        .execute(&mut *tx)
        .await
        .context("Failed to add program course")?;
    }

    tx.commit().await.context("Failed to commit program courses")?;
    Ok(())
}

async fn grant_sqlite(
    pool: &SqlitePool,
    user_id: i64,
    program_id: i64,
    order_id: Option<i64>,
    now: DateTime<Utc>,
) -> Result<()> {
    let inserted = sqlx::query(
        "INSERT OR IGNORE INTO degree_enrollments (user_id, program_id, status, order_id, enrolled_at) VALUES (?, ?, 'active', ?, ?)",
    )
    .bind(user_id)
    .bind(program_id)
    .bind(order_id)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to grant degree enrollment")?
    .rows_affected();

    if inserted == 0 {
        sqlx::query(REACTIVATE_ENROLLMENT)
            .bind(order_id)
            .bind(now)
            .bind(user_id)
            .bind(program_id)
            .execute(pool)
            .await
            .context("Failed to reactivate degree enrollment")?;
    }
    Ok(())
}

fn row_to_program_sqlite(row: &sqlx::sqlite::SqliteRow) -> DegreeProgram {
    let status: String = row.get("status");
    DegreeProgram {
        id: row.get("id"),
        slug: row.get("slug"),
        title: row.get("title"),
        description: row.get("description"),
        duration_months: row.get("duration_months"),
        price: row.get("price"),
        currency: row.get("currency"),
        status: status.parse().unwrap_or_default(),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_enrollment_sqlite(row: &sqlx::sqlite::SqliteRow) -> DegreeEnrollment {
    let status: String = row.get("status");
    DegreeEnrollment {
        id: row.get("id"),
        user_id: row.get("user_id"),
        program_id: row.get("program_id"),
        status: status.parse().unwrap_or_default(),
        order_id: row.get("order_id"),
        enrolled_at: row.get("enrolled_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn set_courses_mysql(pool: &MySqlPool, program_id: i64, course_ids: &[i64]) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query("DELETE FROM degree_program_courses WHERE program_id = ?")
        .bind(program_id)
        .execute(&mut *tx)
        .await
        .context("Failed to clear program courses")?;

    for (position, course_id) in course_ids.iter().enumerate() {
        sqlx::query(
            "INSERT INTO degree_program_courses (program_id, course_id, position) VALUES (?, ?, ?)",
        )
        .bind(program_id)
        .bind(course_id)
        .bind(position as i32)
        .execute(&mut *tx)
        .await
        .context("Failed to add program course")?;
    }

    tx.commit().await.context("Failed to commit program courses")?;
    Ok(())
}

async fn grant_mysql(
    pool: &MySqlPool,
    user_id: i64,
    program_id: i64,
    order_id: Option<i64>,
    now: DateTime<Utc>,
) -> Result<()> {
    let inserted = sqlx::query(
        "INSERT IGNORE INTO degree_enrollments (user_id, program_id, status, order_id, enrolled_at) VALUES (?, ?, 'active', ?, ?)",
    )
    .bind(user_id)
    .bind(program_id)
    .bind(order_id)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to grant degree enrollment")?
    .rows_affected();

    if inserted == 0 {
        sqlx::query(REACTIVATE_ENROLLMENT)
            .bind(order_id)
            .bind(now)
            .bind(user_id)
            .bind(program_id)
            .execute(pool)
            .await
            .context("Failed to reactivate degree enrollment")?;
    }
    Ok(())
}

fn row_to_program_mysql(row: &sqlx::mysql::MySqlRow) -> DegreeProgram {
    let status: String = row.get("status");
    DegreeProgram {
        id: row.get("id"),
        slug: row.get("slug"),
        title: row.get("title"),
        description: row.get("description"),
        duration_months: row.get("duration_months"),
        price: row.get("price"),
        currency: row.get("currency"),
        status: status.parse().unwrap_or_default(),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_enrollment_mysql(row: &sqlx::mysql::MySqlRow) -> DegreeEnrollment {
    let status: String = row.get("status");
    DegreeEnrollment {
        id: row.get("id"),
        user_id: row.get("user_id"),
        program_id: row.get("program_id"),
        status: status.parse().unwrap_or_default(),
        order_id: row.get("order_id"),
        enrolled_at: row.get("enrolled_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_course, insert_user, setup_pool};

    fn program(slug: &str, status: PublishStatus) -> DegreeProgram {
        let now = Utc::now();
        DegreeProgram {
            id: 0,
            slug: slug.to_string(),
            title: format!("Program {}", slug),
            description: String::new(),
            duration_months: 12,
            price: 0,
            currency: "INR".to_string(),
            status,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_program_courses_keep_order() {
        let pool = setup_pool().await;
        let instructor = insert_user(&pool, "i@example.com").await;
        let c1 = insert_course(&pool, instructor, "c1", 0, PublishStatus::Published).await;
        let c2 = insert_course(&pool, instructor, "c2", 0, PublishStatus::Published).await;
        let repo = SqlxDegreeRepository::new(pool);

        let p = repo.create(&program("bsc", PublishStatus::Published)).await.unwrap();
        repo.set_courses(p.id, &[c2, c1]).await.unwrap();
        assert_eq!(repo.course_ids(p.id).await.unwrap(), vec![c2, c1]);

        repo.set_courses(p.id, &[c1]).await.unwrap();
        assert_eq!(repo.course_ids(p.id).await.unwrap(), vec![c1]);
    }

    #[tokio::test]
    async fn test_list_by_status() {
        let repo = SqlxDegreeRepository::new(setup_pool().await);
        repo.create(&program("a", PublishStatus::Published)).await.unwrap();
        repo.create(&program("b", PublishStatus::Draft)).await.unwrap();

        let (items, total) = repo
            .list(Some(PublishStatus::Published), &ListParams::default())
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(items[0].slug, "a");

        let (_, total) = repo.list(None, &ListParams::default()).await.unwrap();
        assert_eq!(total, 2);
    }

    #[tokio::test]
    async fn test_enrollment_lifecycle() {
        let pool = setup_pool().await;
        let user = insert_user(&pool, "u@example.com").await;
        let repo = SqlxDegreeRepository::new(pool);
        let p = repo.create(&program("mba", PublishStatus::Published)).await.unwrap();

        repo.grant_enrollment(user, p.id, Some(3)).await.unwrap();
        repo.grant_enrollment(user, p.id, Some(3)).await.unwrap();
        let mine = repo.list_enrollments_for_user(user).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].program_slug, "mba");

        assert_eq!(repo.withdraw_by_order(3).await.unwrap(), 1);
        let e = repo.get_enrollment(user, p.id).await.unwrap().unwrap();
        assert_eq!(e.status, DegreeEnrollmentStatus::Withdrawn);

        repo.update_enrollment_status(e.id, DegreeEnrollmentStatus::Completed)
            .await
            .unwrap();
        let e = repo.get_enrollment_by_id(e.id).await.unwrap().unwrap();
        assert_eq!(e.status, DegreeEnrollmentStatus::Completed);
        assert_eq!(repo.list_enrollments_for_program(p.id).await.unwrap().len(), 1);
    }
}
