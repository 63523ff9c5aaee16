//! User repository
//!
//! - `UserRepository` trait defining user data access
//! - `SqlxUserRepository` implementing it for SQLite and MySQL

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{ListParams, User, UserFilter, UserRole};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a user; `user.id` is ignored
    async fn create(&self, user: &User) -> Result<User>;

    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Lookup by (already lowercased) email
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Persist every mutable column of `user`
    async fn update(&self, user: &User) -> Result<User>;

    async fn delete(&self, id: i64) -> Result<()>;

    async fn count(&self) -> Result<i64>;

    /// User counts grouped by role
    async fn count_by_role(&self) -> Result<Vec<(UserRole, i64)>>;

    /// Filtered page plus the total matching count
    async fn list(&self, filter: &UserFilter, params: &ListParams) -> Result<(Vec<User>, i64)>;
}

/// SQLx-based user repository
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_user_sqlite(self.pool.sqlite()?, user).await,
            DatabaseDriver::Mysql => create_user_mysql(self.pool.mysql()?, user).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_user_by_id_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Mysql => get_user_by_id_mysql(self.pool.mysql()?, id).await,
        }
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_user_by_email_sqlite(self.pool.sqlite()?, email).await,
            DatabaseDriver::Mysql => get_user_by_email_mysql(self.pool.mysql()?, email).await,
        }
    }

    async fn update(&self, user: &User) -> Result<User> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => update_user_sqlite(self.pool.sqlite()?, user).await,
            DatabaseDriver::Mysql => update_user_mysql(self.pool.mysql()?, user).await,
        }
    }

    async fn delete(&self, id: i64) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(DELETE_USER)
                    .bind(id)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to delete user")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(DELETE_USER)
                    .bind(id)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to delete user")?;
            }
        }
        Ok(())
    }

    async fn count(&self) -> Result<i64> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => count_users_sqlite(self.pool.sqlite()?).await,
            DatabaseDriver::Mysql => count_users_mysql(self.pool.mysql()?).await,
        }
    }

    async fn count_by_role(&self) -> Result<Vec<(UserRole, i64)>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => count_by_role_sqlite(self.pool.sqlite()?).await,
            DatabaseDriver::Mysql => count_by_role_mysql(self.pool.mysql()?).await,
        }
    }

    async fn list(&self, filter: &UserFilter, params: &ListParams) -> Result<(Vec<User>, i64)> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_users_sqlite(self.pool.sqlite()?, filter, params).await,
            DatabaseDriver::Mysql => list_users_mysql(self.pool.mysql()?, filter, params).await,
        }
    }
}

const USER_COLUMNS_BY_ID: &str = r#"
    SELECT id, name, email, password_hash, role, status, image, bio, created_at, updated_at
    FROM users
    WHERE id = ?
"#;

const USER_COLUMNS_BY_EMAIL: &str = r#"
    SELECT id, name, email, password_hash, role, status, image, bio, created_at, updated_at
    FROM users
    WHERE email = ?
"#;

const INSERT_USER: &str = r#"
    INSERT INTO users (name, email, password_hash, role, status, image, bio, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

const UPDATE_USER: &str = r#"
    UPDATE users
    SET name = ?, email = ?, password_hash = ?, role = ?, status = ?, image = ?, bio = ?, updated_at = ?
    WHERE id = ?
"#;

const DELETE_USER: &str = "DELETE FROM users WHERE id = ?";

const LIST_USERS: &str = r#"
    SELECT id, name, email, password_hash, role, status, image, bio, created_at, updated_at
    FROM users
    WHERE (? IS NULL OR role = ?)
      AND (? IS NULL OR name LIKE ? OR email LIKE ?)
    ORDER BY id DESC
    LIMIT ? OFFSET ?
"#;

const COUNT_FILTERED_USERS: &str = r#"
    SELECT COUNT(*) AS count
    FROM users
    WHERE (? IS NULL OR role = ?)
      AND (? IS NULL OR name LIKE ? OR email LIKE ?)
"#;

const COUNT_BY_ROLE: &str = "SELECT role, COUNT(*) AS count FROM users GROUP BY role";

fn filter_binds(filter: &UserFilter) -> (Option<String>, Option<String>) {
    let role = filter.role.map(|r| r.as_str().to_string());
    let pattern = filter
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", s));
    (role, pattern)
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_user_sqlite(pool: &SqlitePool, user: &User) -> Result<User> {
    let now = Utc::now();

    let result = sqlx::query(INSERT_USER)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.status.as_str())
        .bind(&user.image)
        .bind(&user.bio)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_rowid(),
        created_at: now,
        updated_at: now,
        ..user.clone()
    })
}

async fn get_user_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<User>> {
    let row = sqlx::query(USER_COLUMNS_BY_ID)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by ID")?;

    Ok(row.as_ref().map(row_to_user_sqlite))
}

async fn get_user_by_email_sqlite(pool: &SqlitePool, email: &str) -> Result<Option<User>> {
    let row = sqlx::query(USER_COLUMNS_BY_EMAIL)
        .bind(email)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by email")?;

    Ok(row.as_ref().map(row_to_user_sqlite))
}

async fn update_user_sqlite(pool: &SqlitePool, user: &User) -> Result<User> {
    sqlx::query(UPDATE_USER)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.status.as_str())
        .bind(&user.image)
        .bind(&user.bio)
        .bind(Utc::now())
        .bind(user.id)
        .execute(pool)
        .await
        .context("Failed to update user")?;

    get_user_by_id_sqlite(pool, user.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("User not found after update"))
}

async fn count_users_sqlite(pool: &SqlitePool) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS count FROM users")
        .fetch_one(pool)
        .await
        .context("Failed to count users")?;

    Ok(row.get("count"))
}

async fn count_by_role_sqlite(pool: &SqlitePool) -> Result<Vec<(UserRole, i64)>> {
    let rows = sqlx::query(COUNT_BY_ROLE)
        .fetch_all(pool)
        .await
        .context("Failed to count users by role")?;

    Ok(rows
        .iter()
        .map(|row| {
            let role: String = row.get("role");
            (role.parse().unwrap_or_default(), row.get("count"))
        })
        .collect())
}

async fn list_users_sqlite(
    pool: &SqlitePool,
    filter: &UserFilter,
    params: &ListParams,
) -> Result<(Vec<User>, i64)> {
    let (role, pattern) = filter_binds(filter);

    let rows = sqlx::query(LIST_USERS)
        .bind(&role)
        .bind(&role)
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list users")?;

    let total: i64 = sqlx::query(COUNT_FILTERED_USERS)
        .bind(&role)
        .bind(&role)
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .fetch_one(pool)
        .await
        .context("Failed to count users")?
        .get("count");

    Ok((rows.iter().map(row_to_user_sqlite).collect(), total))
}

fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> User {
    let role: String = row.get("role");
    let status: String = row.get("status");

    User {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role: role.parse().unwrap_or_default(),
        status: status.parse().unwrap_or_default(),
        image: row.get("image"),
        bio: row.get("bio"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_user_mysql(pool: &MySqlPool, user: &User) -> Result<User> {
    let now = Utc::now();

    let result = sqlx::query(INSERT_USER)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.status.as_str())
        .bind(&user.image)
        .bind(&user.bio)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_id() as i64,
        created_at: now,
        updated_at: now,
        ..user.clone()
    })
}

async fn get_user_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<User>> {
    let row = sqlx::query(USER_COLUMNS_BY_ID)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by ID")?;

    Ok(row.as_ref().map(row_to_user_mysql))
}

async fn get_user_by_email_mysql(pool: &MySqlPool, email: &str) -> Result<Option<User>> {
    let row = sqlx::query(USER_COLUMNS_BY_EMAIL)
        .bind(email)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by email")?;

    Ok(row.as_ref().map(row_to_user_mysql))
}

async fn update_user_mysql(pool: &MySqlPool, user: &User) -> Result<User> {
    sqlx::query(UPDATE_USER)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.status.as_str())
        .bind(&user.image)
        .bind(&user.bio)
        .bind(Utc::now())
        .bind(user.id)
        .execute(pool)
        .await
        .context("Failed to update user")?;

    get_user_by_id_mysql(pool, user.id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("User not found after update"))
}

async fn count_users_mysql(pool: &MySqlPool) -> Result<i64> {
    let row = sqlx::query("SELECT COUNT(*) AS count FROM users")
        .fetch_one(pool)
        .await
        .context("Failed to count users")?;

    Ok(row.get("count"))
}

async fn count_by_role_mysql(pool: &MySqlPool) -> Result<Vec<(UserRole, i64)>> {
    let rows = sqlx::query(COUNT_BY_ROLE)
        .fetch_all(pool)
        .await
        .context("Failed to count users by role")?;

    Ok(rows
        .iter()
        .map(|row| {
            let role: String = row.get("role");
            (role.parse().unwrap_or_default(), row.get("count"))
        })
        .collect())
}

async fn list_users_mysql(
    pool: &MySqlPool,
    filter: &UserFilter,
    params: &ListParams,
) -> Result<(Vec<User>, i64)> {
    let (role, pattern) = filter_binds(filter);

    let rows = sqlx::query(LIST_USERS)
        .bind(&role)
        .bind(&role)
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list users")?;

    let total: i64 = sqlx::query(COUNT_FILTERED_USERS)
        .bind(&role)
        .bind(&role)
        .bind(&pattern)
        .bind(&pattern)
        .bind(&pattern)
        .fetch_one(pool)
        .await
        .context("Failed to count users")?
        .get("count");

    Ok((rows.iter().map(row_to_user_mysql).collect(), total))
}

fn row_to_user_mysql(row: &sqlx::mysql::MySqlRow) -> User {
    let role: String = row.get("role");
    let status: String = row.get("status");

    User {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role: role.parse().unwrap_or_default(),
        status: status.parse().unwrap_or_default(),
        image: row.get("image"),
        bio: row.get("bio"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use crate::models::UserStatus;

    async fn setup_test_repo() -> SqlxUserRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxUserRepository::new(pool)
    }

    fn test_user(name: &str, email: &str, role: UserRole) -> User {
        User::new(name.to_string(), email.to_string(), Some("hash".to_string()), role)
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let repo = setup_test_repo().await;
        let created = repo
            .create(&test_user("Asha", "asha@example.com", UserRole::Student))
            .await
            .expect("Failed to create user");

        assert!(created.id > 0);

        let by_id = repo.get_by_id(created.id).await.unwrap().expect("User not found");
        assert_eq!(by_id.name, "Asha");
        assert_eq!(by_id.role, UserRole::Student);

        let by_email = repo.get_by_email("asha@example.com").await.unwrap();
        assert_eq!(by_email.map(|u| u.id), Some(created.id));

        assert!(repo.get_by_id(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_is_unique_violation() {
        let repo = setup_test_repo().await;
        repo.create(&test_user("A", "dup@example.com", UserRole::Student))
            .await
            .unwrap();

        let err = repo
            .create(&test_user("B", "dup@example.com", UserRole::Student))
            .await
            .expect_err("duplicate email must fail");
        assert!(crate::db::is_unique_violation(&err));
    }

    #[tokio::test]
    async fn test_update_user() {
        let repo = setup_test_repo().await;
        let mut user = repo
            .create(&test_user("Ravi", "ravi@example.com", UserRole::Student))
            .await
            .unwrap();

        user.role = UserRole::Instructor;
        user.status = UserStatus::Banned;
        user.bio = Some("Teaches Rust".to_string());
        let updated = repo.update(&user).await.unwrap();

        assert_eq!(updated.role, UserRole::Instructor);
        assert_eq!(updated.status, UserStatus::Banned);
        assert_eq!(updated.bio.as_deref(), Some("Teaches Rust"));
    }

    #[tokio::test]
    async fn test_list_with_filters() {
        let repo = setup_test_repo().await;
        repo.create(&test_user("Admin", "admin@example.com", UserRole::Admin))
            .await
            .unwrap();
        for i in 0..3 {
            repo.create(&test_user(
                &format!("Student {}", i),
                &format!("s{}@example.com", i),
                UserRole::Student,
            ))
            .await
            .unwrap();
        }

        let (all, total) = repo
            .list(&UserFilter::default(), &ListParams::new(1, 2))
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(total, 4);

        let students = UserFilter {
            role: Some(UserRole::Student),
            search: None,
        };
        let (_, total) = repo.list(&students, &ListParams::default()).await.unwrap();
        assert_eq!(total, 3);

        let search = UserFilter {
            role: None,
            search: Some("admin@".to_string()),
        };
        let (found, total) = repo.list(&search, &ListParams::default()).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(found[0].role, UserRole::Admin);

        let by_role = repo.count_by_role().await.unwrap();
        assert!(by_role.contains(&(UserRole::Student, 3)));
        assert!(by_role.contains(&(UserRole::Admin, 1)));
    }

    #[tokio::test]
    async fn test_delete_user() {
        let repo = setup_test_repo().await;
        let user = repo
            .create(&test_user("Gone", "gone@example.com", UserRole::Student))
            .await
            .unwrap();

        repo.delete(user.id).await.unwrap();
        assert!(repo.get_by_id(user.id).await.unwrap().is_none());
        assert_eq!(repo.count().await.unwrap(), 0);
    }
}
