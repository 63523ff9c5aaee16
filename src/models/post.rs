//! Blog post model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::category::Category;
use super::course::PublishStatus;
use super::tag::Tag;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub excerpt: Option<String>,
    /// Markdown source
    pub content: String,
    pub content_html: String,
    pub author_id: i64,
    pub cover_image: Option<String>,
    pub status: PublishStatus,
    pub published_at: Option<DateTime<Utc>>,
    pub view_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Post with author name and taxonomy, as returned by the API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostWithMeta {
    #[serde(flatten)]
    pub post: Post,
    pub author_name: String,
    pub categories: Vec<Category>,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePostInput {
    pub slug: Option<String>,
    pub title: String,
    pub excerpt: Option<String>,
    pub content: String,
    pub cover_image: Option<String>,
    #[serde(default)]
    pub status: PublishStatus,
    /// Category names, created when missing
    #[serde(default)]
    pub categories: Vec<String>,
    /// Tag names, created when missing
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePostInput {
    pub slug: Option<String>,
    pub title: Option<String>,
    pub excerpt: Option<String>,
    pub content: Option<String>,
    pub cover_image: Option<String>,
    pub status: Option<PublishStatus>,
    /// Replaces the category set when present
    pub categories: Option<Vec<String>>,
    /// Replaces the tag set when present
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub status: Option<PublishStatus>,
    pub author_id: Option<i64>,
    /// Category slug
    pub category: Option<String>,
    /// Tag slug
    pub tag: Option<String>,
    pub search: Option<String>,
}
