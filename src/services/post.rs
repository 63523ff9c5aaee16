//! Blog post service
//!
//! Markdown posts written by instructors and admins. Content is rendered
//! to HTML on save; published posts are cached by slug and every write
//! drops the `posts:*` keys.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::cache::{keys, CacheLayer, SharedCache};
use crate::db::is_unique_violation;
use crate::db::repositories::{PostRepository, UserRepository};
use crate::models::{
    CreatePostInput, ListParams, PagedResult, Post, PostFilter, PostWithMeta, PublishStatus,
    UpdatePostInput, User,
};
use crate::services::category::{CategoryService, CategoryServiceError};
use crate::services::markdown::MarkdownRenderer;
use crate::services::slug::resolve_slug;
use crate::services::tag::{TagService, TagServiceError};

/// Generated excerpt length
const EXCERPT_CHARS: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum PostServiceError {
    #[error("Post not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not allowed to manage this post")]
    Forbidden,

    #[error("Post slug already exists: {0}")]
    SlugExists(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<CategoryServiceError> for PostServiceError {
    fn from(err: CategoryServiceError) -> Self {
        match err {
            CategoryServiceError::InternalError(e) => PostServiceError::InternalError(e),
            other => PostServiceError::ValidationError(other.to_string()),
        }
    }
}

impl From<TagServiceError> for PostServiceError {
    fn from(err: TagServiceError) -> Self {
        match err {
            TagServiceError::InternalError(e) => PostServiceError::InternalError(e),
            other => PostServiceError::ValidationError(other.to_string()),
        }
    }
}

pub struct PostService {
    repo: Arc<dyn PostRepository>,
    user_repo: Arc<dyn UserRepository>,
    categories: Arc<CategoryService>,
    tags: Arc<TagService>,
    cache: SharedCache,
    markdown: MarkdownRenderer,
    cache_ttl: Duration,
}

impl PostService {
    pub fn new(
        repo: Arc<dyn PostRepository>,
        user_repo: Arc<dyn UserRepository>,
        categories: Arc<CategoryService>,
        tags: Arc<TagService>,
        cache: SharedCache,
    ) -> Self {
        let cache_ttl = cache.default_ttl();
        Self {
            repo,
            user_repo,
            categories,
            tags,
            cache,
            markdown: MarkdownRenderer::new(),
            cache_ttl,
        }
    }

    /// Published posts, newest first
    pub async fn list_published(
        &self,
        mut filter: PostFilter,
        params: &ListParams,
    ) -> Result<PagedResult<PostWithMeta>, PostServiceError> {
        filter.status = Some(PublishStatus::Published);
        self.list(&filter, params).await
    }

    /// Authoring list: admins see every post, instructors their own
    pub async fn list_for_author(
        &self,
        actor: &User,
        mut filter: PostFilter,
        params: &ListParams,
    ) -> Result<PagedResult<PostWithMeta>, PostServiceError> {
        if !actor.is_admin() {
            filter.author_id = Some(actor.id);
        }
        self.list(&filter, params).await
    }

    async fn list(&self, filter: &PostFilter, params: &ListParams) -> Result<PagedResult<PostWithMeta>, PostServiceError> {
        let (posts, total) = self.repo.list(filter, params).await?;
        let mut items = Vec::with_capacity(posts.len());
        for post in posts {
            items.push(self.with_meta(post).await?);
        }
        Ok(PagedResult::new(items, total, params))
    }

    /// Published post by slug; counts a view
    pub async fn view_by_slug(&self, slug: &str) -> Result<PostWithMeta, PostServiceError> {
        let cache_key = keys::post_slug(slug);
        let mut post = match self.cache.get::<PostWithMeta>(&cache_key).await.ok().flatten() {
            Some(cached) => cached,
            None => {
                let post = self
                    .repo
                    .get_by_slug(slug)
                    .await?
                    .filter(|p| p.status == PublishStatus::Published)
                    .ok_or_else(|| PostServiceError::NotFound(slug.to_string()))?;
                let post = self.with_meta(post).await?;
                let _ = self.cache.set(&cache_key, &post, self.cache_ttl).await;
                post
            }
        };

        // The cached copy carries a stale count; report the stored one
        match self.repo.increment_views(post.post.id).await {
            Ok(count) => post.post.view_count = count,
            Err(e) => tracing::warn!(post_id = post.post.id, "Failed to count post view: {}", e),
        }
        Ok(post)
    }

    pub async fn get_for_edit(&self, actor: &User, id: i64) -> Result<PostWithMeta, PostServiceError> {
        let post = self.owned_post(actor, id).await?;
        self.with_meta(post).await
    }

    pub async fn create(&self, actor: &User, input: CreatePostInput) -> Result<PostWithMeta, PostServiceError> {
        let title = input.title.trim();
        if title.is_empty() {
            return Err(PostServiceError::ValidationError("Title cannot be empty".into()));
        }
        if input.content.trim().is_empty() {
            return Err(PostServiceError::ValidationError("Content cannot be empty".into()));
        }
        let slug = resolve_slug(input.slug.as_deref(), title)
            .ok_or_else(|| PostServiceError::ValidationError("Slug cannot be empty".into()))?;

        let categories = self.categories.resolve_names(&input.categories).await?;
        let tags = self.tags.resolve_names(&input.tags).await?;

        let now = Utc::now();
        let post = Post {
            id: 0,
            slug: slug.clone(),
            title: title.to_string(),
            excerpt: self.excerpt_for(input.excerpt, &input.content),
            content_html: self.markdown.render(&input.content),
            content: input.content,
            author_id: actor.id,
            cover_image: input.cover_image.filter(|c| !c.is_empty()),
            status: input.status,
            published_at: (input.status == PublishStatus::Published).then_some(now),
            view_count: 0,
            created_at: now,
            updated_at: now,
        };

        let created = self.repo.create(&post).await.map_err(|e| slug_conflict(e, &slug))?;
        self.repo
            .set_categories(created.id, &categories.iter().map(|c| c.id).collect::<Vec<_>>())
            .await?;
        self.repo
            .set_tags(created.id, &tags.iter().map(|t| t.id).collect::<Vec<_>>())
            .await?;

        self.invalidate().await;
        tracing::info!(post_id = created.id, author_id = actor.id, "Post created");
        Ok(PostWithMeta {
            post: created,
            author_name: actor.name.clone(),
            categories,
            tags,
        })
    }

    pub async fn update(&self, actor: &User, id: i64, input: UpdatePostInput) -> Result<PostWithMeta, PostServiceError> {
        let mut post = self.owned_post(actor, id).await?;

        if let Some(title) = input.title {
            let title = title.trim();
            if title.is_empty() {
                return Err(PostServiceError::ValidationError("Title cannot be empty".into()));
            }
            post.title = title.to_string();
        }
        if let Some(slug) = input.slug {
            post.slug = resolve_slug(Some(&slug), &post.title)
                .ok_or_else(|| PostServiceError::ValidationError("Slug cannot be empty".into()))?;
        }
        if let Some(content) = input.content {
            if content.trim().is_empty() {
                return Err(PostServiceError::ValidationError("Content cannot be empty".into()));
            }
            post.content_html = self.markdown.render(&content);
            post.content = content;
            if input.excerpt.is_none() {
                post.excerpt = self.excerpt_for(None, &post.content);
            }
        }
        if let Some(excerpt) = input.excerpt {
            post.excerpt = self.excerpt_for(Some(excerpt), &post.content);
        }
        if let Some(cover) = input.cover_image {
            post.cover_image = Some(cover).filter(|c| !c.is_empty());
        }
        if let Some(status) = input.status {
            if status == PublishStatus::Published && post.published_at.is_none() {
                post.published_at = Some(Utc::now());
            }
            post.status = status;
        }
        post.updated_at = Utc::now();

        let slug = post.slug.clone();
        let updated = self.repo.update(&post).await.map_err(|e| slug_conflict(e, &slug))?;

        if let Some(names) = input.categories {
            let categories = self.categories.resolve_names(&names).await?;
            self.repo
                .set_categories(id, &categories.iter().map(|c| c.id).collect::<Vec<_>>())
                .await?;
        }
        if let Some(names) = input.tags {
            let tags = self.tags.resolve_names(&names).await?;
            self.repo
                .set_tags(id, &tags.iter().map(|t| t.id).collect::<Vec<_>>())
                .await?;
        }

        self.invalidate().await;
        self.with_meta(updated).await
    }

    pub async fn delete(&self, actor: &User, id: i64) -> Result<(), PostServiceError> {
        self.owned_post(actor, id).await?;
        self.repo.delete(id).await?;
        self.invalidate().await;
        tracing::info!(post_id = id, actor_id = actor.id, "Post deleted");
        Ok(())
    }

    pub async fn count_by_status(&self) -> Result<Vec<(PublishStatus, i64)>, PostServiceError> {
        Ok(self.repo.count_by_status().await?)
    }

    async fn owned_post(&self, actor: &User, id: i64) -> Result<Post, PostServiceError> {
        let post = self
            .repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| PostServiceError::NotFound(id.to_string()))?;
        if !actor.can_manage(post.author_id) {
            return Err(PostServiceError::Forbidden);
        }
        Ok(post)
    }

    async fn with_meta(&self, post: Post) -> Result<PostWithMeta, PostServiceError> {
        let author_name = self
            .user_repo
            .get_by_id(post.author_id)
            .await?
            .map(|u| u.name)
            .unwrap_or_default();
        let categories = self.repo.categories_for_post(post.id).await?;
        let tags = self.repo.tags_for_post(post.id).await?;
        Ok(PostWithMeta {
            post,
            author_name,
            categories,
            tags,
        })
    }

    /// Explicit excerpt when non-blank, otherwise derived from the content
    fn excerpt_for(&self, explicit: Option<String>, content: &str) -> Option<String> {
        match explicit.map(|e| e.trim().to_string()) {
            Some(e) if !e.is_empty() => Some(e),
            _ => Some(self.markdown.excerpt(content, EXCERPT_CHARS)).filter(|e| !e.is_empty()),
        }
    }

    async fn invalidate(&self) {
        let _ = self.cache.delete_pattern(keys::POSTS_PATTERN).await;
    }
}

fn slug_conflict(err: anyhow::Error, slug: &str) -> PostServiceError {
    if is_unique_violation(&err) {
        PostServiceError::SlugExists(slug.to_string())
    } else {
        PostServiceError::InternalError(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::db::repositories::test_support::setup_pool;
    use crate::db::repositories::{
        SqlxCategoryRepository, SqlxPostRepository, SqlxTagRepository, SqlxUserRepository, UserRepository,
    };
    use crate::db::DynDatabasePool;
    use crate::models::UserRole;

    async fn setup() -> (PostService, DynDatabasePool) {
        let pool = setup_pool().await;
        let service = PostService::new(
            SqlxPostRepository::boxed(pool.clone()),
            SqlxUserRepository::boxed(pool.clone()),
            Arc::new(CategoryService::new(SqlxCategoryRepository::boxed(pool.clone()))),
            Arc::new(TagService::new(SqlxTagRepository::boxed(pool.clone()))),
            Arc::new(MemoryCache::new()),
        );
        (service, pool)
    }

    async fn user(pool: &DynDatabasePool, email: &str, role: UserRole) -> User {
        SqlxUserRepository::new(pool.clone())
            .create(&User::new("Writer".into(), email.into(), None, role))
            .await
            .unwrap()
    }

    fn input(title: &str, status: PublishStatus) -> CreatePostInput {
        CreatePostInput {
            slug: None,
            title: title.into(),
            excerpt: None,
            content: "# Heading\n\nFirst paragraph with **bold** text.".into(),
            cover_image: None,
            status,
            categories: vec!["Careers".into()],
            tags: vec!["Interview".into(), "Tips".into()],
        }
    }

    #[tokio::test]
    async fn test_create_renders_markdown_and_taxonomy() {
        let (service, pool) = setup().await;
        let author = user(&pool, "w@example.com", UserRole::Instructor).await;

        let post = service.create(&author, input("Interview Tips", PublishStatus::Published)).await.unwrap();
        assert_eq!(post.post.slug, "interview-tips");
        assert!(post.post.content_html.contains("<strong>bold</strong>"));
        assert!(post.post.excerpt.as_deref().unwrap_or_default().starts_with("Heading"));
        assert!(post.post.published_at.is_some());
        assert_eq!(post.categories[0].slug, "careers");
        assert_eq!(post.tags.len(), 2);

        let dup = service.create(&author, input("Interview Tips", PublishStatus::Draft)).await;
        assert!(matches!(dup, Err(PostServiceError::SlugExists(_))));
    }

    #[tokio::test]
    async fn test_view_counts_and_hides_drafts() {
        let (service, pool) = setup().await;
        let author = user(&pool, "w@example.com", UserRole::Instructor).await;
        let draft = service.create(&author, input("Draft Post", PublishStatus::Draft)).await.unwrap();
        let live = service.create(&author, input("Live Post", PublishStatus::Published)).await.unwrap();

        assert!(matches!(
            service.view_by_slug(&draft.post.slug).await,
            Err(PostServiceError::NotFound(_))
        ));

        let first = service.view_by_slug(&live.post.slug).await.unwrap();
        assert_eq!(first.post.view_count, 1);
        // Served from cache, still counting
        let second = service.view_by_slug(&live.post.slug).await.unwrap();
        assert_eq!(second.post.view_count, 2);
        let third = service.view_by_slug(&live.post.slug).await.unwrap();
        assert_eq!(third.post.view_count, 3);
        assert_eq!(second.author_name, "Writer");

        let listed = service.list_published(PostFilter::default(), &ListParams::default()).await.unwrap();
        assert_eq!(listed.total, 1);
    }

    #[tokio::test]
    async fn test_authors_edit_only_their_posts() {
        let (service, pool) = setup().await;
        let owner = user(&pool, "owner@example.com", UserRole::Instructor).await;
        let other = user(&pool, "other@example.com", UserRole::Instructor).await;
        let admin = user(&pool, "admin@example.com", UserRole::Admin).await;
        let post = service.create(&owner, input("Owned", PublishStatus::Draft)).await.unwrap();

        let denied = service
            .update(&other, post.post.id, UpdatePostInput { title: Some("Mine".into()), ..Default::default() })
            .await;
        assert!(matches!(denied, Err(PostServiceError::Forbidden)));

        let published = service
            .update(
                &admin,
                post.post.id,
                UpdatePostInput {
                    status: Some(PublishStatus::Published),
                    tags: Some(vec!["Rust".into()]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(published.post.published_at.is_some());
        assert_eq!(published.tags.len(), 1);

        let own = service
            .list_for_author(&other, PostFilter::default(), &ListParams::default())
            .await
            .unwrap();
        assert_eq!(own.total, 0);

        assert!(matches!(service.delete(&other, post.post.id).await, Err(PostServiceError::Forbidden)));
        service.delete(&owner, post.post.id).await.unwrap();
    }
}
