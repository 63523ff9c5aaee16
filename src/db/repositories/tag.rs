//! Tag repository

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Tag, TagWithCount};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

#[async_trait]
pub trait TagRepository: Send + Sync {
    async fn get_by_slug(&self, slug: &str) -> Result<Option<Tag>>;

    /// Tags with the number of published posts carrying them, most used first
    async fn list_with_counts(&self, limit: i64) -> Result<Vec<TagWithCount>>;

    /// Look up by slug, inserting when missing
    async fn get_or_create(&self, slug: &str, name: &str) -> Result<Tag>;

    async fn delete(&self, id: i64) -> Result<bool>;
}

pub struct SqlxTagRepository {
    pool: DynDatabasePool,
}

impl SqlxTagRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn TagRepository> {
        Arc::new(Self::new(pool))
    }
}

const TAGS_WITH_COUNTS: &str = r#"
    SELECT t.id, t.slug, t.name, t.created_at, COUNT(p.id) AS post_count
    FROM tags t
    LEFT JOIN post_tags pt ON pt.tag_id = t.id
    LEFT JOIN posts p ON p.id = pt.post_id AND p.status = 'published'
    GROUP BY t.id, t.slug, t.name, t.created_at
    ORDER BY post_count DESC, t.name ASC
    LIMIT ?
"#;

#[async_trait]
impl TagRepository for SqlxTagRepository {
    async fn get_by_slug(&self, slug: &str) -> Result<Option<Tag>> {
        let sql = "SELECT id, slug, name, created_at FROM tags WHERE slug = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => Ok(sqlx::query(sql)
                .bind(slug)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get tag by slug")?
                .as_ref()
                .map(row_to_tag_sqlite)),
            DatabaseDriver::Mysql => Ok(sqlx::query(sql)
                .bind(slug)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get tag by slug")?
                .as_ref()
                .map(row_to_tag_mysql)),
        }
    }

    async fn list_with_counts(&self, limit: i64) -> Result<Vec<TagWithCount>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => Ok(sqlx::query(TAGS_WITH_COUNTS)
                .bind(limit)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to get tags with counts")?
                .iter()
                .map(|row| TagWithCount {
                    tag: row_to_tag_sqlite(row),
                    post_count: row.get("post_count"),
                })
                .collect()),
            DatabaseDriver::Mysql => Ok(sqlx::query(TAGS_WITH_COUNTS)
                .bind(limit)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to get tags with counts")?
                .iter()
                .map(|row| TagWithCount {
                    tag: row_to_tag_mysql(row),
                    post_count: row.get("post_count"),
                })
                .collect()),
        }
    }

    async fn get_or_create(&self, slug: &str, name: &str) -> Result<Tag> {
        if let Some(existing) = self.get_by_slug(slug).await? {
            return Ok(existing);
        }
        let insert = match self.pool.driver() {
            DatabaseDriver::Sqlite => "INSERT OR IGNORE INTO tags (slug, name, created_at) VALUES (?, ?, ?)",
            DatabaseDriver::Mysql => "INSERT IGNORE INTO tags (slug, name, created_at) VALUES (?, ?, ?)",
        };
        execute!(self, insert, "Failed to create tag", slug, name, Utc::now());
        self.get_by_slug(slug)
            .await?
            .with_context(|| format!("Tag {} could not be created", slug))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = execute!(self, "DELETE FROM tags WHERE id = ?", "Failed to delete tag", id);
        Ok(affected > 0)
    }
}

pub(super) fn row_to_tag_sqlite(row: &sqlx::sqlite::SqliteRow) -> Tag {
    Tag {
        id: row.get("id"),
        slug: row.get("slug"),
        name: row.get("name"),
        created_at: row.get("created_at"),
    }
}

pub(super) fn row_to_tag_mysql(row: &sqlx::mysql::MySqlRow) -> Tag {
    Tag {
        id: row.get("id"),
        slug: row.get("slug"),
        name: row.get("name"),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_user, setup_pool};

    async fn insert_post(pool: &DynDatabasePool, author: i64, slug: &str, status: &str) -> i64 {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO posts (slug, title, content, content_html, author_id, status, created_at, updated_at) VALUES (?, ?, '', '', ?, ?, ?, ?)",
        )
        .bind(slug)
        .bind(slug)
        .bind(author)
        .bind(status)
        .bind(now)
        .bind(now)
        .execute(pool.sqlite().unwrap())
        .await
        .unwrap()
        .last_insert_rowid()
    }

    async fn tag_post(pool: &DynDatabasePool, post_id: i64, tag_id: i64) {
        sqlx::query("INSERT INTO post_tags (post_id, tag_id) VALUES (?, ?)")
            .bind(post_id)
            .bind(tag_id)
            .execute(pool.sqlite().unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let repo = SqlxTagRepository::new(setup_pool().await);
        let a = repo.get_or_create("rust", "Rust").await.unwrap();
        let b = repo.get_or_create("rust", "Rust").await.unwrap();
        assert_eq!(a.id, b.id);
        assert!(repo.delete(a.id).await.unwrap());
        assert!(!repo.delete(a.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_counts_only_published_posts() {
        let pool = setup_pool().await;
        let author = insert_user(&pool, "author@example.com").await;
        let repo = SqlxTagRepository::new(pool.clone());

        let rust = repo.get_or_create("rust", "Rust").await.unwrap();
        let go = repo.get_or_create("go", "Go").await.unwrap();

        let live = insert_post(&pool, author, "live", "published").await;
        let draft = insert_post(&pool, author, "draft", "draft").await;
        tag_post(&pool, live, rust.id).await;
        tag_post(&pool, draft, rust.id).await;
        tag_post(&pool, draft, go.id).await;

        let counts = repo.list_with_counts(10).await.unwrap();
        assert_eq!(counts[0].tag.slug, "rust");
        assert_eq!(counts[0].post_count, 1);
        assert_eq!(counts[1].post_count, 0);
    }
}
