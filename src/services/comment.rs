//! Comment service
//!
//! Signed-in users comment on published posts. Student comments wait for
//! moderation; instructors and admins are approved immediately. Replies
//! nest one level deep.

use std::sync::Arc;

use chrono::Utc;

use crate::db::repositories::{CommentRepository, PostRepository};
use crate::models::{
    Comment, CommentStatus, CommentWithAuthor, CreateCommentInput, ListParams, PagedResult, User,
};

const MAX_COMMENT_CHARS: usize = 5000;

#[derive(Debug, thiserror::Error)]
pub enum CommentServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct CommentService {
    repo: Arc<dyn CommentRepository>,
    post_repo: Arc<dyn PostRepository>,
}

impl CommentService {
    pub fn new(repo: Arc<dyn CommentRepository>, post_repo: Arc<dyn PostRepository>) -> Self {
        Self { repo, post_repo }
    }

    pub async fn create(
        &self,
        author: &User,
        post_id: i64,
        input: CreateCommentInput,
    ) -> Result<Comment, CommentServiceError> {
        let content = input.content.trim();
        if content.is_empty() {
            return Err(CommentServiceError::ValidationError("Comment cannot be empty".into()));
        }
        if content.chars().count() > MAX_COMMENT_CHARS {
            return Err(CommentServiceError::ValidationError(format!(
                "Comment exceeds {} characters",
                MAX_COMMENT_CHARS
            )));
        }

        self.post_repo
            .get_by_id(post_id)
            .await?
            .filter(|p| p.status == crate::models::PublishStatus::Published)
            .ok_or_else(|| CommentServiceError::NotFound(format!("post {}", post_id)))?;

        // Replies to replies attach to the top-level comment
        let parent_id = match input.parent_id {
            Some(parent_id) => {
                let parent = self
                    .repo
                    .get_by_id(parent_id)
                    .await?
                    .filter(|c| c.post_id == post_id)
                    .ok_or_else(|| CommentServiceError::ValidationError("Parent comment not found".into()))?;
                Some(parent.parent_id.unwrap_or(parent.id))
            }
            None => None,
        };

        let status = if author.is_instructor() {
            CommentStatus::Approved
        } else {
            CommentStatus::Pending
        };
        let comment = self
            .repo
            .create(&Comment {
                id: 0,
                post_id,
                user_id: author.id,
                parent_id,
                content: content.to_string(),
                status,
                created_at: Utc::now(),
            })
            .await?;

        tracing::debug!(comment_id = comment.id, post_id, status = %status, "Comment created");
        Ok(comment)
    }

    /// Approved comments of a post, threaded
    pub async fn list_for_post(&self, post_id: i64) -> Result<Vec<CommentWithAuthor>, CommentServiceError> {
        Ok(self.repo.list_approved_for_post(post_id).await?)
    }

    /// Moderation queue
    pub async fn list_by_status(
        &self,
        status: Option<CommentStatus>,
        params: &ListParams,
    ) -> Result<PagedResult<CommentWithAuthor>, CommentServiceError> {
        let (items, total) = self.repo.list_by_status(status, params).await?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn set_status(&self, id: i64, status: CommentStatus) -> Result<Comment, CommentServiceError> {
        if !self.repo.update_status(id, status).await? {
            return Err(CommentServiceError::NotFound(format!("comment {}", id)));
        }
        self.repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| CommentServiceError::NotFound(format!("comment {}", id)))
    }

    pub async fn delete(&self, id: i64) -> Result<(), CommentServiceError> {
        if !self.repo.delete(id).await? {
            return Err(CommentServiceError::NotFound(format!("comment {}", id)));
        }
        Ok(())
    }

    pub async fn count_pending(&self) -> Result<i64, CommentServiceError> {
        Ok(self.repo.count_by_status(CommentStatus::Pending).await?)
    }
}
