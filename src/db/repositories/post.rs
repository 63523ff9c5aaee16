//! Post repository
//!
//! Blog posts plus their category and tag links.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Category, ListParams, Post, PostFilter, PublishStatus, Tag};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

use super::category::{row_to_category_mysql, row_to_category_sqlite};
use super::tag::{row_to_tag_mysql, row_to_tag_sqlite};

#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn create(&self, post: &Post) -> Result<Post>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Post>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Post>>;

    async fn update(&self, post: &Post) -> Result<Post>;

    async fn delete(&self, id: i64) -> Result<()>;

    /// Newest first; category and tag filters match by slug
    async fn list(&self, filter: &PostFilter, params: &ListParams) -> Result<(Vec<Post>, i64)>;

    /// Replace the post's categories
    async fn set_categories(&self, post_id: i64, category_ids: &[i64]) -> Result<()>;

    /// Replace the post's tags
    async fn set_tags(&self, post_id: i64, tag_ids: &[i64]) -> Result<()>;

    async fn categories_for_post(&self, post_id: i64) -> Result<Vec<Category>>;

    async fn tags_for_post(&self, post_id: i64) -> Result<Vec<Tag>>;

    /// Count a view and return the new total
    async fn increment_views(&self, id: i64) -> Result<i64>;

    async fn count_by_status(&self) -> Result<Vec<(PublishStatus, i64)>>;
}

pub struct SqlxPostRepository {
    pool: DynDatabasePool,
}

impl SqlxPostRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PostRepository> {
        Arc::new(Self::new(pool))
    }
}

const POST_COLUMNS: &str = "p.id, p.slug, p.title, p.excerpt, p.content, p.content_html, p.author_id, p.cover_image, p.status, p.published_at, p.view_count, p.created_at, p.updated_at";

const INSERT_POST: &str = r#"
    INSERT INTO posts (slug, title, excerpt, content, content_html, author_id, cover_image,
                       status, published_at, view_count, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
"#;

const UPDATE_POST: &str = r#"
    UPDATE posts
    SET slug = ?, title = ?, excerpt = ?, content = ?, content_html = ?, cover_image = ?,
        status = ?, published_at = ?, updated_at = ?
    WHERE id = ?
"#;

const LIST_FILTER: &str = r#"
    WHERE (? IS NULL OR p.status = ?)
      AND (? IS NULL OR p.author_id = ?)
      AND (? IS NULL OR EXISTS (
            SELECT 1 FROM post_categories pc JOIN categories c ON c.id = pc.category_id
            WHERE pc.post_id = p.id AND c.slug = ?))
      AND (? IS NULL OR EXISTS (
            SELECT 1 FROM post_tags pt JOIN tags t ON t.id = pt.tag_id
            WHERE pt.post_id = p.id AND t.slug = ?))
      AND (? IS NULL OR p.title LIKE ? OR p.content LIKE ?)
"#;

const CATEGORIES_FOR_POST: &str = r#"
    SELECT c.id, c.slug, c.name, c.description, c.created_at
    FROM categories c JOIN post_categories pc ON pc.category_id = c.id
    WHERE pc.post_id = ?
    ORDER BY c.name
"#;

const TAGS_FOR_POST: &str = r#"
    SELECT t.id, t.slug, t.name, t.created_at
    FROM tags t JOIN post_tags pt ON pt.tag_id = t.id
    WHERE pt.post_id = ?
    ORDER BY t.name
"#;

struct ListBinds {
    status: Option<String>,
    author_id: Option<i64>,
    category: Option<String>,
    tag: Option<String>,
    pattern: Option<String>,
}

impl ListBinds {
    fn from(filter: &PostFilter) -> Self {
        let non_empty = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Self {
            status: filter.status.map(|s| s.as_str().to_string()),
            author_id: filter.author_id,
            category: non_empty(&filter.category),
            tag: non_empty(&filter.tag),
            pattern: non_empty(&filter.search).map(|s| format!("%{}%", s)),
        }
    }
}

#[async_trait]
impl PostRepository for SqlxPostRepository {
    async fn create(&self, post: &Post) -> Result<Post> {
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => insert_post_sqlite(self.pool.sqlite()?, post).await?,
            DatabaseDriver::Mysql => insert_post_mysql(self.pool.mysql()?, post).await?,
        };
        Ok(Post {
            id,
            view_count: 0,
            ..post.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Post>> {
        let sql = format!("SELECT {} FROM posts p WHERE p.id = ?", POST_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => Ok(sqlx::query(&sql)
                .bind(id)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get post by ID")?
                .as_ref()
                .map(row_to_post_sqlite)),
            DatabaseDriver::Mysql => Ok(sqlx::query(&sql)
                .bind(id)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get post by ID")?
                .as_ref()
                .map(row_to_post_mysql)),
        }
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Post>> {
        let sql = format!("SELECT {} FROM posts p WHERE p.slug = ?", POST_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => Ok(sqlx::query(&sql)
                .bind(slug)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get post by slug")?
                .as_ref()
                .map(row_to_post_sqlite)),
            DatabaseDriver::Mysql => Ok(sqlx::query(&sql)
                .bind(slug)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get post by slug")?
                .as_ref()
                .map(row_to_post_mysql)),
        }
    }

    async fn update(&self, post: &Post) -> Result<Post> {
        let now = Utc::now();
        execute!(
            self,
            UPDATE_POST,
            "Failed to update post",
            &post.slug,
            &post.title,
            &post.excerpt,
            &post.content,
            &post.content_html,
            &post.cover_image,
            post.status.as_str(),
            post.published_at,
            now,
            post.id
        );
        Ok(Post {
            updated_at: now,
            ..post.clone()
        })
    }

    async fn delete(&self, id: i64) -> Result<()> {
        execute!(self, "DELETE FROM posts WHERE id = ?", "Failed to delete post", id);
        Ok(())
    }

    async fn list(&self, filter: &PostFilter, params: &ListParams) -> Result<(Vec<Post>, i64)> {
        let binds = ListBinds::from(filter);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_posts_sqlite(self.pool.sqlite()?, &binds, params).await,
            DatabaseDriver::Mysql => list_posts_mysql(self.pool.mysql()?, &binds, params).await,
        }
    }

    async fn set_categories(&self, post_id: i64, category_ids: &[i64]) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut tx = self.pool.sqlite()?.begin().await?;
                sqlx::query("DELETE FROM post_categories WHERE post_id = ?")
                    .bind(post_id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to clear post categories")?;
                for id in category_ids {
                    sqlx::query("INSERT OR IGNORE INTO post_categories (post_id, category_id) VALUES (?, ?)")
                        .bind(post_id)
                        .bind(id)
                        .execute(&mut *tx)
                        .await
                        .context("Failed to link post category")?;
                }
                tx.commit().await?;
            }
            DatabaseDriver::Mysql => {
                let mut tx = self.pool.mysql()?.begin().await?;
                sqlx::query("DELETE FROM post_categories WHERE post_id = ?")
                    .bind(post_id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to clear post categories")?;
                for id in category_ids {
                    sqlx::query("INSERT IGNORE INTO post_categories (post_id, category_id) VALUES (?, ?)")
                        .bind(post_id)
                        .bind(id)
                        .execute(&mut *tx)
                        .await
                        .context("Failed to link post category")?;
                }
                tx.commit().await?;
            }
        }
        Ok(())
    }

    async fn set_tags(&self, post_id: i64, tag_ids: &[i64]) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut tx = self.pool.sqlite()?.begin().await?;
                sqlx::query("DELETE FROM post_tags WHERE post_id = ?")
                    .bind(post_id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to clear post tags")?;
                for id in tag_ids {
                    sqlx::query("INSERT OR IGNORE INTO post_tags (post_id, tag_id) VALUES (?, ?)")
                        .bind(post_id)
                        .bind(id)
                        .execute(&mut *tx)
                        .await
                        .context("Failed to link post tag")?;
                }
                tx.commit().await?;
            }
            DatabaseDriver::Mysql => {
                let mut tx = self.pool.mysql()?.begin().await?;
                sqlx::query("DELETE FROM post_tags WHERE post_id = ?")
                    .bind(post_id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to clear post tags")?;
                for id in tag_ids {
                    sqlx::query("INSERT IGNORE INTO post_tags (post_id, tag_id) VALUES (?, ?)")
                        .bind(post_id)
                        .bind(id)
                        .execute(&mut *tx)
                        .await
                        .context("Failed to link post tag")?;
                }
                tx.commit().await?;
            }
        }
        Ok(())
    }

    async fn categories_for_post(&self, post_id: i64) -> Result<Vec<Category>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => Ok(sqlx::query(CATEGORIES_FOR_POST)
                .bind(post_id)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to load post categories")?
                .iter()
                .map(row_to_category_sqlite)
                .collect()),
            DatabaseDriver::Mysql => Ok(sqlx::query(CATEGORIES_FOR_POST)
                .bind(post_id)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to load post categories")?
                .iter()
                .map(row_to_category_mysql)
                .collect()),
        }
    }

    async fn tags_for_post(&self, post_id: i64) -> Result<Vec<Tag>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => Ok(sqlx::query(TAGS_FOR_POST)
                .bind(post_id)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to load post tags")?
                .iter()
                .map(row_to_tag_sqlite)
                .collect()),
            DatabaseDriver::Mysql => Ok(sqlx::query(TAGS_FOR_POST)
                .bind(post_id)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to load post tags")?
                .iter()
                .map(row_to_tag_mysql)
                .collect()),
        }
    }

    async fn increment_views(&self, id: i64) -> Result<i64> {
        execute!(
            self,
            "UPDATE posts SET view_count = view_count + 1 WHERE id = ?",
            "Failed to increment post views",
            id
        );
        let sql = "SELECT view_count FROM posts WHERE id = ?";
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(id)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to read post views")?
                .get("view_count"),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(id)
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to read post views")?
                .get("view_count"),
        };
        Ok(count)
    }

    async fn count_by_status(&self) -> Result<Vec<(PublishStatus, i64)>> {
        let sql = "SELECT status, COUNT(*) AS count FROM posts GROUP BY status";
        let pairs: Vec<(String, i64)> = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to count posts")?
                .iter()
                .map(|row| (row.get("status"), row.get("count")))
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to count posts")?
                .iter()
                .map(|row| (row.get("status"), row.get("count")))
                .collect(),
        };
        Ok(pairs
            .into_iter()
            .filter_map(|(status, count)| status.parse().ok().map(|s| (s, count)))
            .collect())
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn insert_post_sqlite(pool: &SqlitePool, post: &Post) -> Result<i64> {
    let result = sqlx::query(INSERT_POST)
        .bind(&post.slug)
        .bind(&post.title)
        .bind(&post.excerpt)
        .bind(&post.content)
        .bind(&post.content_html)
        .bind(post.author_id)
        .bind(&post.cover_image)
        .bind(post.status.as_str())
        .bind(post.published_at)
        .bind(post.created_at)
        .bind(post.updated_at)
        .execute(pool)
        .await
        .context("Failed to create post")?;
    Ok(result.last_insert_rowid())
}

async fn list_posts_sqlite(
    pool: &SqlitePool,
    binds: &ListBinds,
    params: &ListParams,
) -> Result<(Vec<Post>, i64)> {
    let sql = format!(
        "SELECT {} FROM posts p {} ORDER BY COALESCE(p.published_at, p.created_at) DESC, p.id DESC LIMIT ? OFFSET ?",
        POST_COLUMNS, LIST_FILTER
    );
    let rows = sqlx::query(&sql)
        .bind(&binds.status)
        .bind(&binds.status)
        .bind(binds.author_id)
        .bind(binds.author_id)
        .bind(&binds.category)
        .bind(&binds.category)
        .bind(&binds.tag)
        .bind(&binds.tag)
        .bind(&binds.pattern)
        .bind(&binds.pattern)
        .bind(&binds.pattern)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list posts")?;

    let count_sql = format!("SELECT COUNT(*) AS count FROM posts p {}", LIST_FILTER);
    let total: i64 = sqlx::query(&count_sql)
        .bind(&binds.status)
        .bind(&binds.status)
        .bind(binds.author_id)
        .bind(binds.author_id)
        .bind(&binds.category)
        .bind(&binds.category)
        .bind(&binds.tag)
        .bind(&binds.tag)
        .bind(&binds.pattern)
        .bind(&binds.pattern)
        .bind(&binds.pattern)
        .fetch_one(pool)
        .await
        .context("Failed to count posts")?
        .get("count");

    Ok((rows.iter().map(row_to_post_sqlite).collect(), total))
}

fn row_to_post_sqlite(row: &sqlx::sqlite::SqliteRow) -> Post {
    let status: String = row.get("status");
    Post {
        id: row.get("id"),
        slug: row.get("slug"),
        title: row.get("title"),
        excerpt: row.get("excerpt"),
        content: row.get("content"),
        content_html: row.get("content_html"),
        author_id: row.get("author_id"),
        cover_image: row.get("cover_image"),
        status: status.parse().unwrap_or_default(),
        published_at: row.get("published_at"),
        view_count: row.get("view_count"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn insert_post_mysql(pool: &MySqlPool, post: &Post) -> Result<i64> {
    let result = sqlx::query(INSERT_POST)
        .bind(&post.slug)
        .bind(&post.title)
        .bind(&post.excerpt)
        .bind(&post.content)
        .bind(&post.content_html)
        .bind(post.author_id)
        .bind(&post.cover_image)
        .bind(post.status.as_str())
        .bind(post.published_at)
        .bind(post.created_at)
        .bind(post.updated_at)
        .execute(pool)
        .await
        .context("Failed to create post")?;
    Ok(result.last_insert_id() as i64)
}

async fn list_posts_mysql(
    pool: &MySqlPool,
    binds: &ListBinds,
    params: &ListParams,
) -> Result<(Vec<Post>, i64)> {
    let sql = format!(
        "SELECT {} FROM posts p {} ORDER BY COALESCE(p.published_at, p.created_at) DESC, p.id DESC LIMIT ? OFFSET ?",
        POST_COLUMNS, LIST_FILTER
    );
    let rows = sqlx::query(&sql)
        .bind(&binds.status)
        .bind(&binds.status)
        .bind(binds.author_id)
        .bind(binds.author_id)
        .bind(&binds.category)
        .bind(&binds.category)
        .bind(&binds.tag)
        .bind(&binds.tag)
        .bind(&binds.pattern)
        .bind(&binds.pattern)
        .bind(&binds.pattern)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list posts")?;

    let count_sql = format!("SELECT COUNT(*) AS count FROM posts p {}", LIST_FILTER);
    let total: i64 = sqlx::query(&count_sql)
        .bind(&binds.status)
        .bind(&binds.status)
        .bind(binds.author_id)
        .bind(binds.author_id)
        .bind(&binds.category)
        .bind(&binds.category)
        .bind(&binds.tag)
        .bind(&binds.tag)
        .bind(&binds.pattern)
        .bind(&binds.pattern)
        .bind(&binds.pattern)
        .fetch_one(pool)
        .await
        .context("Failed to count posts")?
        .get("count");

    Ok((rows.iter().map(row_to_post_mysql).collect(), total))
}

fn row_to_post_mysql(row: &sqlx::mysql::MySqlRow) -> Post {
    let status: String = row.get("status");
    Post {
        id: row.get("id"),
        slug: row.get("slug"),
        title: row.get("title"),
        excerpt: row.get("excerpt"),
        content: row.get("content"),
        content_html: row.get("content_html"),
        author_id: row.get("author_id"),
        cover_image: row.get("cover_image"),
        status: status.parse().unwrap_or_default(),
        published_at: row.get("published_at"),
        view_count: row.get("view_count"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
