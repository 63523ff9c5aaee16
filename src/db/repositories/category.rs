//! Category repository
//!
//! Flat blog categories. Posts reference them through `post_categories`,
//! which is maintained by the post repository.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::Category;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

#[async_trait]
pub trait CategoryRepository: Send + Sync {
    async fn create(&self, category: &Category) -> Result<Category>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>>;

    /// All categories, by name
    async fn list(&self) -> Result<Vec<Category>>;

    async fn update(&self, category: &Category) -> Result<Category>;

    async fn delete(&self, id: i64) -> Result<()>;

    /// Look up by slug, inserting when missing. Safe under concurrent
    /// callers creating the same category.
    async fn get_or_create(&self, slug: &str, name: &str) -> Result<Category>;
}

pub struct SqlxCategoryRepository {
    pool: DynDatabasePool,
}

impl SqlxCategoryRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CategoryRepository> {
        Arc::new(Self::new(pool))
    }

    async fn fetch_one_where(&self, clause: &str, value: &str) -> Result<Option<Category>> {
        let sql = format!(
            "SELECT id, slug, name, description, created_at FROM categories WHERE {} = ?",
            clause
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => Ok(sqlx::query(&sql)
                .bind(value)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get category")?
                .as_ref()
                .map(row_to_category_sqlite)),
            DatabaseDriver::Mysql => Ok(sqlx::query(&sql)
                .bind(value)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get category")?
                .as_ref()
                .map(row_to_category_mysql)),
        }
    }
}

const INSERT_CATEGORY: &str =
    "INSERT INTO categories (slug, name, description, created_at) VALUES (?, ?, ?, ?)";

#[async_trait]
impl CategoryRepository for SqlxCategoryRepository {
    async fn create(&self, category: &Category) -> Result<Category> {
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(INSERT_CATEGORY)
                .bind(&category.slug)
                .bind(&category.name)
                .bind(&category.description)
                .bind(category.created_at)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to create category")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(INSERT_CATEGORY)
                .bind(&category.slug)
                .bind(&category.name)
                .bind(&category.description)
                .bind(category.created_at)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to create category")?
                .last_insert_id() as i64,
        };
        Ok(Category { id, ..category.clone() })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>> {
        let sql = "SELECT id, slug, name, description, created_at FROM categories WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => Ok(sqlx::query(sql)
                .bind(id)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get category by ID")?
                .as_ref()
                .map(row_to_category_sqlite)),
            DatabaseDriver::Mysql => Ok(sqlx::query(sql)
                .bind(id)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get category by ID")?
                .as_ref()
                .map(row_to_category_mysql)),
        }
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>> {
        self.fetch_one_where("slug", slug).await
    }

    async fn list(&self) -> Result<Vec<Category>> {
        let sql = "SELECT id, slug, name, description, created_at FROM categories ORDER BY name";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => Ok(sqlx::query(sql)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to list categories")?
                .iter()
                .map(row_to_category_sqlite)
                .collect()),
            DatabaseDriver::Mysql => Ok(sqlx::query(sql)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to list categories")?
                .iter()
                .map(row_to_category_mysql)
                .collect()),
        }
    }

    async fn update(&self, category: &Category) -> Result<Category> {
        execute!(
            self,
            "UPDATE categories SET slug = ?, name = ?, description = ? WHERE id = ?",
            "Failed to update category",
            &category.slug,
            &category.name,
            &category.description,
            category.id
        );
        Ok(category.clone())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        execute!(self, "DELETE FROM categories WHERE id = ?", "Failed to delete category", id);
        Ok(())
    }

    async fn get_or_create(&self, slug: &str, name: &str) -> Result<Category> {
        if let Some(existing) = self.get_by_slug(slug).await? {
            return Ok(existing);
        }
        let insert = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                "INSERT OR IGNORE INTO categories (slug, name, created_at) VALUES (?, ?, ?)"
            }
            DatabaseDriver::Mysql => {
                "INSERT IGNORE INTO categories (slug, name, created_at) VALUES (?, ?, ?)"
            }
        };
        execute!(self, insert, "Failed to create category", slug, name, Utc::now());
        self.get_by_slug(slug)
            .await?
            .with_context(|| format!("Category {} vanished after insert", slug))
    }
}

// ============================================================================
// Row mapping
// ============================================================================

pub(super) fn row_to_category_sqlite(row: &sqlx::sqlite::SqliteRow) -> Category {
    Category {
        id: row.get("id"),
        slug: row.get("slug"),
        name: row.get("name"),
        description: row.get("description"),
        created_at: row.get("created_at"),
    }
}

pub(super) fn row_to_category_mysql(row: &sqlx::mysql::MySqlRow) -> Category {
    Category {
        id: row.get("id"),
        slug: row.get("slug"),
        name: row.get("name"),
        description: row.get("description"),
        created_at: row.get("created_at"),
    }
}
