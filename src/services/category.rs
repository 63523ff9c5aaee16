//! Category service
//!
//! Flat blog categories with unique slugs. Post input names categories,
//! which are created on first use.

use crate::db::is_unique_violation;
use crate::db::repositories::CategoryRepository;
use crate::models::{Category, CreateCategoryInput, UpdateCategoryInput};
use crate::services::slug::{generate_slug, resolve_slug};
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;

/// Error types for category service operations
#[derive(Debug, thiserror::Error)]
pub enum CategoryServiceError {
    #[error("Category slug already exists: {0}")]
    DuplicateSlug(String),

    #[error("Category not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct CategoryService {
    repo: Arc<dyn CategoryRepository>,
}

impl CategoryService {
    pub fn new(repo: Arc<dyn CategoryRepository>) -> Self {
        Self { repo }
    }

    /// Create a category
    ///
    /// # Errors
    /// - `ValidationError` if the name is empty
    /// - `DuplicateSlug` if the (given or generated) slug is taken
    pub async fn create(&self, input: CreateCategoryInput) -> Result<Category, CategoryServiceError> {
        let name = validate_name(&input.name)?;
        let slug = resolve_slug(input.slug.as_deref(), name)
            .ok_or_else(|| CategoryServiceError::ValidationError("Slug cannot be empty".into()))?;

        let category = Category {
            id: 0,
            slug: slug.clone(),
            name: name.to_string(),
            description: input.description.filter(|d| !d.trim().is_empty()),
            created_at: Utc::now(),
        };
        self.repo
            .create(&category)
            .await
            .map_err(|e| duplicate_slug(e, &slug))
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>, CategoryServiceError> {
        self.repo
            .get_by_slug(slug)
            .await
            .context("Failed to get category by slug")
            .map_err(Into::into)
    }

    pub async fn list(&self) -> Result<Vec<Category>, CategoryServiceError> {
        self.repo
            .list()
            .await
            .context("Failed to list categories")
            .map_err(Into::into)
    }

    pub async fn update(&self, id: i64, input: UpdateCategoryInput) -> Result<Category, CategoryServiceError> {
        let mut category = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to get category")?
            .ok_or_else(|| CategoryServiceError::NotFound(id.to_string()))?;

        if let Some(name) = input.name {
            category.name = validate_name(&name)?.to_string();
        }
        if let Some(slug) = input.slug {
            category.slug = resolve_slug(Some(&slug), &category.name)
                .ok_or_else(|| CategoryServiceError::ValidationError("Slug cannot be empty".into()))?;
        }
        if let Some(description) = input.description {
            category.description = Some(description).filter(|d| !d.trim().is_empty());
        }

        let slug = category.slug.clone();
        self.repo
            .update(&category)
            .await
            .map_err(|e| duplicate_slug(e, &slug))
    }

    /// Delete a category; posts lose the association only
    pub async fn delete(&self, id: i64) -> Result<(), CategoryServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get category")?
            .ok_or_else(|| CategoryServiceError::NotFound(id.to_string()))?;
        self.repo.delete(id).await.context("Failed to delete category")?;
        Ok(())
    }

    /// Resolve post input names into categories, creating missing ones
    pub async fn resolve_names(&self, names: &[String]) -> Result<Vec<Category>, CategoryServiceError> {
        let mut categories: Vec<Category> = Vec::with_capacity(names.len());
        for name in names {
            let name = validate_name(name)?;
            let slug = generate_slug(name);
            if slug.is_empty() {
                return Err(CategoryServiceError::ValidationError(format!(
                    "Invalid category name: {:?}",
                    name
                )));
            }
            let category = self
                .repo
                .get_or_create(&slug, name)
                .await
                .context("Failed to resolve category")?;
            if !categories.iter().any(|c| c.id == category.id) {
                categories.push(category);
            }
        }
        Ok(categories)
    }
}

fn validate_name(name: &str) -> Result<&str, CategoryServiceError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CategoryServiceError::ValidationError("Category name cannot be empty".into()));
    }
    if name.chars().count() > 100 {
        return Err(CategoryServiceError::ValidationError("Category name is too long".into()));
    }
    Ok(name)
}

fn duplicate_slug(err: anyhow::Error, slug: &str) -> CategoryServiceError {
    if is_unique_violation(&err) {
        CategoryServiceError::DuplicateSlug(slug.to_string())
    } else {
        CategoryServiceError::InternalError(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::setup_pool;
    use crate::db::repositories::SqlxCategoryRepository;

    async fn setup_service() -> CategoryService {
        CategoryService::new(SqlxCategoryRepository::boxed(setup_pool().await))
    }

    fn input(name: &str) -> CreateCategoryInput {
        CreateCategoryInput {
            name: name.into(),
            slug: None,
            description: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_duplicate_slug() {
        let service = setup_service().await;

        let created = service.create(input("Career Advice")).await.unwrap();
        assert_eq!(created.slug, "career-advice");

        let dup = service.create(input("Career advice")).await;
        assert!(matches!(dup, Err(CategoryServiceError::DuplicateSlug(_))));

        let empty = service.create(input("   ")).await;
        assert!(matches!(empty, Err(CategoryServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let service = setup_service().await;
        let created = service.create(input("News")).await.unwrap();

        let updated = service
            .update(
                created.id,
                UpdateCategoryInput {
                    name: Some("Announcements".into()),
                    slug: Some("announcements".into()),
                    description: Some("Platform news".into()),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.slug, "announcements");
        assert_eq!(updated.description.as_deref(), Some("Platform news"));

        service.delete(created.id).await.unwrap();
        assert!(service.list().await.unwrap().is_empty());
        assert!(matches!(service.delete(created.id).await, Err(CategoryServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_resolve_names_reuses_existing() {
        let service = setup_service().await;
        let existing = service.create(input("Rust")).await.unwrap();

        let resolved = service
            .resolve_names(&["rust".into(), "Web Dev".into(), "RUST".into()])
            .await
            .unwrap();
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].id, existing.id);
        assert_eq!(resolved[1].slug, "web-dev");
    }
}
