//! Comment repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::Row;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{gravatar_url, Comment, CommentStatus, CommentWithAuthor, ListParams};

#[async_trait]
pub trait CommentRepository: Send + Sync {
    async fn create(&self, comment: &Comment) -> Result<Comment>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>>;

    /// Approved comments of a post as a reply tree, oldest first
    async fn list_approved_for_post(&self, post_id: i64) -> Result<Vec<CommentWithAuthor>>;

    /// Moderation queue, newest first
    async fn list_by_status(
        &self,
        status: Option<CommentStatus>,
        params: &ListParams,
    ) -> Result<(Vec<CommentWithAuthor>, i64)>;

    async fn update_status(&self, id: i64, status: CommentStatus) -> Result<bool>;

    async fn delete(&self, id: i64) -> Result<bool>;

    async fn count_by_status(&self, status: CommentStatus) -> Result<i64>;
}

pub struct SqlxCommentRepository {
    pool: DynDatabasePool,
}

impl SqlxCommentRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CommentRepository> {
        Arc::new(Self::new(pool))
    }
}

const INSERT_COMMENT: &str = r#"
    INSERT INTO comments (post_id, user_id, parent_id, content, status, created_at)
    VALUES (?, ?, ?, ?, ?, ?)
"#;

const WITH_AUTHOR: &str = r#"
    SELECT c.id, c.post_id, c.user_id, c.parent_id, c.content, c.status, c.created_at,
           u.name AS author_name, u.email AS author_email, u.image AS author_image
    FROM comments c
    JOIN users u ON u.id = c.user_id
"#;

#[async_trait]
impl CommentRepository for SqlxCommentRepository {
    async fn create(&self, comment: &Comment) -> Result<Comment> {
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(INSERT_COMMENT)
                .bind(comment.post_id)
                .bind(comment.user_id)
                .bind(comment.parent_id)
                .bind(&comment.content)
                .bind(comment.status.as_str())
                .bind(comment.created_at)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to create comment")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(INSERT_COMMENT)
                .bind(comment.post_id)
                .bind(comment.user_id)
                .bind(comment.parent_id)
                .bind(&comment.content)
                .bind(comment.status.as_str())
                .bind(comment.created_at)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to create comment")?
                .last_insert_id() as i64,
        };
        Ok(Comment { id, ..comment.clone() })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>> {
        let sql = "SELECT id, post_id, user_id, parent_id, content, status, created_at FROM comments WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => Ok(sqlx::query(sql)
                .bind(id)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get comment")?
                .as_ref()
                .map(row_to_comment_sqlite)),
            DatabaseDriver::Mysql => Ok(sqlx::query(sql)
                .bind(id)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get comment")?
                .as_ref()
                .map(row_to_comment_mysql)),
        }
    }

    async fn list_approved_for_post(&self, post_id: i64) -> Result<Vec<CommentWithAuthor>> {
        let sql = format!(
            "{} WHERE c.post_id = ? AND c.status = 'approved' ORDER BY c.created_at ASC, c.id ASC",
            WITH_AUTHOR
        );
        let flat: Vec<CommentWithAuthor> = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(post_id)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to list comments")?
                .iter()
                .map(row_to_comment_with_author_sqlite)
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(post_id)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to list comments")?
                .iter()
                .map(row_to_comment_with_author_mysql)
                .collect(),
        };
        Ok(build_reply_tree(flat))
    }

    async fn list_by_status(
        &self,
        status: Option<CommentStatus>,
        params: &ListParams,
    ) -> Result<(Vec<CommentWithAuthor>, i64)> {
        let status = status.map(|s| s.as_str().to_string());
        let sql = format!(
            "{} WHERE (? IS NULL OR c.status = ?) ORDER BY c.created_at DESC, c.id DESC LIMIT ? OFFSET ?",
            WITH_AUTHOR
        );
        let count_sql = "SELECT COUNT(*) AS count FROM comments WHERE (? IS NULL OR status = ?)";
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
                    .context("Failed to list comments")?;
                let total: i64 = sqlx::query(count_sql)
                    .bind(&status)
                    .bind(&status)
                    .fetch_one(pool)
                    .await
                    .context("Failed to count comments")?
                    .get("count");
                Ok((rows.iter().map(row_to_comment_with_author_sqlite).collect(), total))
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
                    .context("Failed to list comments")?;
                let total: i64 = sqlx::query(count_sql)
                    .bind(&status)
                    .bind(&status)
                    .fetch_one(pool)
                    .await
                    .context("Failed to count comments")?
                    .get("count");
                Ok((rows.iter().map(row_to_comment_with_author_mysql).collect(), total))
            }
        }
    }

    async fn update_status(&self, id: i64, status: CommentStatus) -> Result<bool> {
        let affected = execute!(
            self,
            "UPDATE comments SET status = ? WHERE id = ?",
            "Failed to update comment status",
            status.as_str(),
            id
        );
        Ok(affected > 0)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = execute!(self, "DELETE FROM comments WHERE id = ?", "Failed to delete comment", id);
        Ok(affected > 0)
    }

    async fn count_by_status(&self, status: CommentStatus) -> Result<i64> {
        let sql = "SELECT COUNT(*) AS count FROM comments WHERE status = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => Ok(sqlx::query(sql)
                .bind(status.as_str())
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to count comments")?
                .get("count")),
            DatabaseDriver::Mysql => Ok(sqlx::query(sql)
                .bind(status.as_str())
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to count comments")?
                .get("count")),
        }
    }
}

/// Nest replies under their parents. Replies whose parent is not in the
/// list (not approved, or deleted) are dropped.
fn build_reply_tree(flat: Vec<CommentWithAuthor>) -> Vec<CommentWithAuthor> {
    let mut roots = Vec::new();
    let mut children: HashMap<i64, Vec<CommentWithAuthor>> = HashMap::new();
    for comment in flat {
        match comment.comment.parent_id {
            Some(parent) => children.entry(parent).or_default().push(comment),
            None => roots.push(comment),
        }
    }

    fn attach(node: &mut CommentWithAuthor, children: &mut HashMap<i64, Vec<CommentWithAuthor>>) {
        if let Some(mut replies) = children.remove(&node.comment.id) {
            for reply in &mut replies {
                attach(reply, children);
            }
            node.replies = replies;
        }
    }

    for root in &mut roots {
        attach(root, &mut children);
    }
    roots
}

fn avatar(image: Option<String>, email: &str) -> String {
    match image {
        Some(image) if !image.is_empty() => image,
        _ => gravatar_url(email),
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn row_to_comment_sqlite(row: &sqlx::sqlite::SqliteRow) -> Comment {
    let status: String = row.get("status");
    Comment {
        id: row.get("id"),
        post_id: row.get("post_id"),
        user_id: row.get("user_id"),
        parent_id: row.get("parent_id"),
        content: row.get("content"),
        status: status.parse().unwrap_or_default(),
        created_at: row.get("created_at"),
    }
}

fn row_to_comment_with_author_sqlite(row: &sqlx::sqlite::SqliteRow) -> CommentWithAuthor {
    let email: String = row.get("author_email");
    CommentWithAuthor {
        comment: row_to_comment_sqlite(row),
        author_name: row.get("author_name"),
        author_avatar: avatar(row.get("author_image"), &email),
        replies: Vec::new(),
    }
}

fn row_to_comment_mysql(row: &sqlx::mysql::MySqlRow) -> Comment {
    let status: String = row.get("status");
    Comment {
        id: row.get("id"),
        post_id: row.get("post_id"),
        user_id: row.get("user_id"),
        parent_id: row.get("parent_id"),
        content: row.get("content"),
        status: status.parse().unwrap_or_default(),
        created_at: row.get("created_at"),
    }
}

fn row_to_comment_with_author_mysql(row: &sqlx::mysql::MySqlRow) -> CommentWithAuthor {
    let email: String = row.get("author_email");
    CommentWithAuthor {
        comment: row_to_comment_mysql(row),
        author_name: row.get("author_name"),
        author_avatar: avatar(row.get("author_image"), &email),
        replies: Vec::new(),
    }
}
