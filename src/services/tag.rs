//! Tag service
//!
//! Tags are created on demand from post input and reused by slug.

use crate::db::repositories::TagRepository;
use crate::models::{Tag, TagWithCount};
use crate::services::slug::generate_slug;
use anyhow::Context;
use std::sync::Arc;

/// Upper bound for the public tag list
const TAG_LIST_LIMIT: i64 = 200;

/// Error types for tag service operations
#[derive(Debug, thiserror::Error)]
pub enum TagServiceError {
    #[error("Tag not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct TagService {
    repo: Arc<dyn TagRepository>,
}

impl TagService {
    pub fn new(repo: Arc<dyn TagRepository>) -> Self {
        Self { repo }
    }

    /// Return the tag named `name`, creating it when missing
    ///
    /// # Errors
    /// - `ValidationError` if the name has no sluggable characters
    pub async fn create_or_get(&self, name: &str) -> Result<Tag, TagServiceError> {
        let name = name.trim();
        let slug = generate_slug(name);
        if slug.is_empty() {
            return Err(TagServiceError::ValidationError(format!("Invalid tag name: {:?}", name)));
        }

        self.repo
            .get_or_create(&slug, name)
            .await
            .context("Failed to create tag")
            .map_err(Into::into)
    }

    /// Resolve a list of names into tags, skipping duplicates
    pub async fn resolve_names(&self, names: &[String]) -> Result<Vec<Tag>, TagServiceError> {
        let mut tags: Vec<Tag> = Vec::with_capacity(names.len());
        for name in names {
            let tag = self.create_or_get(name).await?;
            if !tags.iter().any(|t| t.id == tag.id) {
                tags.push(tag);
            }
        }
        Ok(tags)
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<Tag>, TagServiceError> {
        self.repo
            .get_by_slug(slug)
            .await
            .context("Failed to get tag by slug")
            .map_err(Into::into)
    }

    /// Tags with their published post counts, most used first
    pub async fn list(&self) -> Result<Vec<TagWithCount>, TagServiceError> {
        self.repo
            .list_with_counts(TAG_LIST_LIMIT)
            .await
            .context("Failed to list tags")
            .map_err(Into::into)
    }

    /// Delete a tag; post associations go with it
    pub async fn delete(&self, id: i64) -> Result<(), TagServiceError> {
        if !self.repo.delete(id).await.context("Failed to delete tag")? {
            return Err(TagServiceError::NotFound(id.to_string()));
        }
        Ok(())
    }
}
