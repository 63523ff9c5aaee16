//! Blog comment model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

string_enum! {
    /// Only approved comments are shown publicly.
    pub enum CommentStatus {
        Pending => "pending",
        Approved => "approved",
        Spam => "spam",
    }
    default = Pending;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub user_id: i64,
    pub parent_id: Option<i64>,
    pub content: String,
    pub status: CommentStatus,
    pub created_at: DateTime<Utc>,
}

/// Comment with author info and its direct replies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentWithAuthor {
    #[serde(flatten)]
    pub comment: Comment,
    pub author_name: String,
    pub author_avatar: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replies: Vec<CommentWithAuthor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCommentInput {
    pub content: String,
    pub parent_id: Option<i64>,
}
