//! Course catalog service
//!
//! Authoring (courses, modules, lessons) for instructors and admins, and the
//! public catalog. Published listings and course pages are cached; every
//! write drops the `courses:*` keys.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::cache::{keys, CacheLayer, SharedCache};
use crate::db::is_unique_violation;
use crate::db::repositories::{CourseRepository, EnrollmentRepository, UserRepository};
use crate::models::{
    normalize_currency, Course, CourseDetail, CourseFilter, CourseModule, CreateCourseInput,
    CreateLessonInput, CreateModuleInput, Lesson, ListParams, ModuleWithLessons, PagedResult,
    PublishStatus, UpdateCourseInput, UpdateLessonInput, UpdateModuleInput, User, DEFAULT_CURRENCY,
};
use crate::services::slug::resolve_slug;

#[derive(Debug, thiserror::Error)]
pub enum CourseServiceError {
    #[error("Course not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not allowed to manage this course")]
    Forbidden,

    #[error("Course slug already exists: {0}")]
    SlugExists(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct CourseService {
    repo: Arc<dyn CourseRepository>,
    user_repo: Arc<dyn UserRepository>,
    enrollment_repo: Arc<dyn EnrollmentRepository>,
    cache: SharedCache,
    cache_ttl: Duration,
}

impl CourseService {
    pub fn new(
        repo: Arc<dyn CourseRepository>,
        user_repo: Arc<dyn UserRepository>,
        enrollment_repo: Arc<dyn EnrollmentRepository>,
        cache: SharedCache,
    ) -> Self {
        let cache_ttl = cache.default_ttl();
        Self {
            repo,
            user_repo,
            enrollment_repo,
            cache,
            cache_ttl,
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Published catalog page. Searches bypass the cache.
    pub async fn list_published(
        &self,
        mut filter: CourseFilter,
        params: &ListParams,
    ) -> Result<PagedResult<Course>, CourseServiceError> {
        filter.status = Some(PublishStatus::Published);

        let cache_key = filter.search.is_none().then(|| {
            keys::course_list(
                params.page,
                params.per_page,
                &format!(
                    "{}|{}|{}",
                    filter.category.as_deref().unwrap_or(""),
                    filter.level.map(|l| l.as_str()).unwrap_or(""),
                    filter.instructor_id.map(|id| id.to_string()).unwrap_or_default(),
                ),
            )
        });

        if let Some(key) = &cache_key {
            if let Some(cached) = self.cache.get::<PagedResult<Course>>(key).await.ok().flatten() {
                return Ok(cached);
            }
        }

        let (items, total) = self.repo.list(&filter, params).await?;
        let result = PagedResult::new(items, total, params);

        if let Some(key) = &cache_key {
            let _ = self.cache.set(key, &result, self.cache_ttl).await;
        }
        Ok(result)
    }

    /// Every course regardless of status (admin listing)
    pub async fn list_all(
        &self,
        filter: &CourseFilter,
        params: &ListParams,
    ) -> Result<PagedResult<Course>, CourseServiceError> {
        let (items, total) = self.repo.list(filter, params).await?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Course, CourseServiceError> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| CourseServiceError::NotFound(id.to_string()))
    }

    /// Course page with its curriculum as `viewer` may see it.
    ///
    /// Unpublished courses are only visible to their instructor and admins.
    /// Lesson bodies are stripped unless the lesson is a preview or the
    /// viewer has access to the whole course.
    pub async fn get_detail_by_slug(
        &self,
        slug: &str,
        viewer: Option<&User>,
    ) -> Result<CourseDetail, CourseServiceError> {
        let detail = self.full_detail(slug).await?;

        let manages = viewer.map_or(false, |u| u.can_manage(detail.course.instructor_id));
        if !detail.course.is_published() && !manages {
            return Err(CourseServiceError::NotFound(slug.to_string()));
        }

        let has_access = match viewer {
            Some(_) if manages => true,
            Some(user) => self
                .enrollment_repo
                .get(user.id, detail.course.id)
                .await?
                .map_or(false, |e| e.grants_access()),
            None => false,
        };

        Ok(redact_detail(detail, has_access))
    }

    /// Unredacted detail, cached by slug
    async fn full_detail(&self, slug: &str) -> Result<CourseDetail, CourseServiceError> {
        let cache_key = keys::course_slug(slug);
        if let Some(cached) = self.cache.get::<CourseDetail>(&cache_key).await.ok().flatten() {
            return Ok(cached);
        }

        let course = self
            .repo
            .get_by_slug(slug)
            .await?
            .ok_or_else(|| CourseServiceError::NotFound(slug.to_string()))?;
        let detail = self.assemble_detail(course).await?;

        let _ = self.cache.set(&cache_key, &detail, self.cache_ttl).await;
        Ok(detail)
    }

    async fn assemble_detail(&self, course: Course) -> Result<CourseDetail, CourseServiceError> {
        let instructor = self
            .user_repo
            .get_by_id(course.instructor_id)
            .await?
            .map(|u| u.summary());
        let modules = self.repo.list_modules(course.id).await?;
        let lessons = self.repo.list_lessons(course.id).await?;
        let modules = group_lessons(modules, lessons);

        let total_lessons = modules.iter().map(|m| m.lessons.len()).sum();
        let total_minutes = modules
            .iter()
            .flat_map(|m| &m.lessons)
            .map(|l| l.duration_minutes as i64)
            .sum();

        Ok(CourseDetail {
            course,
            instructor,
            modules,
            total_lessons,
            total_minutes,
            has_access: true,
        })
    }

    /// Curriculum of a course for its author, never redacted
    pub async fn get_curriculum(&self, actor: &User, course_id: i64) -> Result<CourseDetail, CourseServiceError> {
        let course = self.owned_course(actor, course_id).await?;
        self.assemble_detail(course).await
    }

    pub async fn create(&self, actor: &User, input: CreateCourseInput) -> Result<Course, CourseServiceError> {
        let title = input.title.trim();
        if title.is_empty() {
            return Err(CourseServiceError::ValidationError("Title cannot be empty".into()));
        }
        validate_price(input.price)?;
        let currency = resolve_currency(input.currency.as_deref())?;
        let slug = resolve_slug(input.slug.as_deref(), title)
            .ok_or_else(|| CourseServiceError::ValidationError("Slug cannot be empty".into()))?;

        let now = Utc::now();
        let course = Course {
            id: 0,
            slug: slug.clone(),
            title: title.to_string(),
            summary: input.summary,
            description: input.description,
            instructor_id: actor.id,
            category: input.category.filter(|c| !c.trim().is_empty()),
            level: input.level,
            price: input.price,
            currency,
            thumbnail: input.thumbnail,
            status: PublishStatus::Draft,
            published_at: None,
            created_at: now,
            updated_at: now,
        };

        let created = self.repo.create(&course).await.map_err(|e| slug_conflict(e, &slug))?;
        self.invalidate().await;
        tracing::info!(course_id = created.id, instructor_id = actor.id, "Course created");
        Ok(created)
    }

    pub async fn update(
        &self,
        actor: &User,
        id: i64,
        input: UpdateCourseInput,
    ) -> Result<Course, CourseServiceError> {
        let mut course = self.owned_course(actor, id).await?;

        if let Some(title) = input.title {
            let title = title.trim();
            if title.is_empty() {
                return Err(CourseServiceError::ValidationError("Title cannot be empty".into()));
            }
            course.title = title.to_string();
        }
        if let Some(slug) = input.slug {
            course.slug = resolve_slug(Some(&slug), &course.title)
                .ok_or_else(|| CourseServiceError::ValidationError("Slug cannot be empty".into()))?;
        }
        if let Some(summary) = input.summary {
            course.summary = summary;
        }
        if let Some(description) = input.description {
            course.description = description;
        }
        if let Some(category) = input.category {
            course.category = Some(category).filter(|c| !c.trim().is_empty());
        }
        if let Some(level) = input.level {
            course.level = level;
        }
        if let Some(price) = input.price {
            validate_price(price)?;
            course.price = price;
        }
        if let Some(currency) = input.currency {
            course.currency = resolve_currency(Some(&currency))?;
        }
        if let Some(thumbnail) = input.thumbnail {
            course.thumbnail = Some(thumbnail).filter(|t| !t.is_empty());
        }
        if let Some(status) = input.status {
            if status == PublishStatus::Published && !course.is_published() {
                self.ensure_publishable(course.id).await?;
                course.published_at = Some(Utc::now());
            }
            course.status = status;
        }
        course.updated_at = Utc::now();

        let slug = course.slug.clone();
        let updated = self.repo.update(&course).await.map_err(|e| slug_conflict(e, &slug))?;
        self.invalidate().await;
        Ok(updated)
    }

    pub async fn publish(&self, actor: &User, id: i64) -> Result<Course, CourseServiceError> {
        let mut course = self.owned_course(actor, id).await?;
        if course.is_published() {
            return Ok(course);
        }
        self.ensure_publishable(course.id).await?;

        let now = Utc::now();
        course.status = PublishStatus::Published;
        course.published_at = Some(now);
        course.updated_at = now;
        let updated = self.repo.update(&course).await?;

        self.invalidate().await;
        tracing::info!(course_id = id, "Course published");
        Ok(updated)
    }

    pub async fn delete(&self, actor: &User, id: i64) -> Result<(), CourseServiceError> {
        self.owned_course(actor, id).await?;
        self.repo.delete(id).await?;
        self.invalidate().await;
        tracing::info!(course_id = id, actor_id = actor.id, "Course deleted");
        Ok(())
    }

    pub async fn create_module(
        &self,
        actor: &User,
        course_id: i64,
        input: CreateModuleInput,
    ) -> Result<CourseModule, CourseServiceError> {
        self.owned_course(actor, course_id).await?;
        let title = non_empty_title(&input.title)?;

        let position = match input.position {
            Some(position) => position.max(0),
            None => self.repo.next_module_position(course_id).await?,
        };
        let module = self
            .repo
            .create_module(&CourseModule {
                id: 0,
                course_id,
                title,
                position,
                created_at: Utc::now(),
            })
            .await?;

        self.invalidate().await;
        Ok(module)
    }

    pub async fn update_module(
        &self,
        actor: &User,
        module_id: i64,
        input: UpdateModuleInput,
    ) -> Result<CourseModule, CourseServiceError> {
        let mut module = self.owned_module(actor, module_id).await?;
        if let Some(title) = input.title {
            module.title = non_empty_title(&title)?;
        }
        if let Some(position) = input.position {
            module.position = position.max(0);
        }

        let module = self.repo.update_module(&module).await?;
        self.invalidate().await;
        Ok(module)
    }

    pub async fn delete_module(&self, actor: &User, module_id: i64) -> Result<(), CourseServiceError> {
        self.owned_module(actor, module_id).await?;
        self.repo.delete_module(module_id).await?;
        self.invalidate().await;
        Ok(())
    }

    pub async fn create_lesson(
        &self,
        actor: &User,
        module_id: i64,
        input: CreateLessonInput,
    ) -> Result<Lesson, CourseServiceError> {
        self.owned_module(actor, module_id).await?;
        let title = non_empty_title(&input.title)?;
        if input.duration_minutes < 0 {
            return Err(CourseServiceError::ValidationError("Duration cannot be negative".into()));
        }

        let position = match input.position {
            Some(position) => position.max(0),
            None => self.repo.next_lesson_position(module_id).await?,
        };
        let now = Utc::now();
        let lesson = self
            .repo
            .create_lesson(&Lesson {
                id: 0,
                module_id,
                title,
                content_type: input.content_type,
                content: input.content,
                video_url: input.video_url.filter(|u| !u.is_empty()),
                duration_minutes: input.duration_minutes,
                position,
                is_preview: input.is_preview,
                created_at: now,
                updated_at: now,
            })
            .await?;

        self.invalidate().await;
        Ok(lesson)
    }

    pub async fn update_lesson(
        &self,
        actor: &User,
        lesson_id: i64,
        input: UpdateLessonInput,
    ) -> Result<Lesson, CourseServiceError> {
        let mut lesson = self.owned_lesson(actor, lesson_id).await?;

        if let Some(title) = input.title {
            lesson.title = non_empty_title(&title)?;
        }
        if let Some(content_type) = input.content_type {
            lesson.content_type = content_type;
        }
        if let Some(content) = input.content {
            lesson.content = content;
        }
        if let Some(video_url) = input.video_url {
            lesson.video_url = Some(video_url).filter(|u| !u.is_empty());
        }
        if let Some(duration) = input.duration_minutes {
            if duration < 0 {
                return Err(CourseServiceError::ValidationError("Duration cannot be negative".into()));
            }
            lesson.duration_minutes = duration;
        }
        if let Some(position) = input.position {
            lesson.position = position.max(0);
        }
        if let Some(is_preview) = input.is_preview {
            lesson.is_preview = is_preview;
        }
        lesson.updated_at = Utc::now();

        let lesson = self.repo.update_lesson(&lesson).await?;
        self.invalidate().await;
        Ok(lesson)
    }

    pub async fn delete_lesson(&self, actor: &User, lesson_id: i64) -> Result<(), CourseServiceError> {
        self.owned_lesson(actor, lesson_id).await?;
        self.repo.delete_lesson(lesson_id).await?;
        self.invalidate().await;
        Ok(())
    }

    async fn ensure_publishable(&self, course_id: i64) -> Result<(), CourseServiceError> {
        if self.repo.count_lessons(course_id).await? == 0 {
            return Err(CourseServiceError::ValidationError(
                "A course needs at least one lesson before it can be published".into(),
            ));
        }
        Ok(())
    }

    async fn owned_course(&self, actor: &User, course_id: i64) -> Result<Course, CourseServiceError> {
        let course = self.get_by_id(course_id).await?;
        if !actor.can_manage(course.instructor_id) {
            return Err(CourseServiceError::Forbidden);
        }
        Ok(course)
    }

    async fn owned_module(&self, actor: &User, module_id: i64) -> Result<CourseModule, CourseServiceError> {
        let module = self
            .repo
            .get_module(module_id)
            .await?
            .ok_or_else(|| CourseServiceError::NotFound(format!("module {}", module_id)))?;
        self.owned_course(actor, module.course_id).await?;
        Ok(module)
    }

    async fn owned_lesson(&self, actor: &User, lesson_id: i64) -> Result<Lesson, CourseServiceError> {
        let lesson = self
            .repo
            .get_lesson(lesson_id)
            .await?
            .ok_or_else(|| CourseServiceError::NotFound(format!("lesson {}", lesson_id)))?;
        self.owned_module(actor, lesson.module_id).await?;
        Ok(lesson)
    }

    async fn invalidate(&self) {
        let _ = self.cache.delete_pattern(keys::COURSES_PATTERN).await;
    }
}

/// Attach lessons to their modules. Both inputs arrive in position order.
fn group_lessons(modules: Vec<CourseModule>, lessons: Vec<Lesson>) -> Vec<ModuleWithLessons> {
    let mut grouped: Vec<ModuleWithLessons> = modules
        .into_iter()
        .map(|module| ModuleWithLessons {
            module,
            lessons: Vec::new(),
        })
        .collect();

    for lesson in lessons {
        if let Some(entry) = grouped.iter_mut().find(|m| m.module.id == lesson.module_id) {
            entry.lessons.push(lesson);
        }
    }
    grouped
}

fn redact_detail(mut detail: CourseDetail, has_access: bool) -> CourseDetail {
    detail.has_access = has_access;
    if !has_access {
        for module in &mut detail.modules {
            module.lessons = std::mem::take(&mut module.lessons)
                .into_iter()
                .map(|l| if l.is_preview { l } else { l.redacted() })
                .collect();
        }
    }
    detail
}

fn non_empty_title(title: &str) -> Result<String, CourseServiceError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(CourseServiceError::ValidationError("Title cannot be empty".into()));
    }
    Ok(title.to_string())
}

fn validate_price(price: i64) -> Result<(), CourseServiceError> {
    if price < 0 {
        return Err(CourseServiceError::ValidationError("Price cannot be negative".into()));
    }
    Ok(())
}

fn resolve_currency(currency: Option<&str>) -> Result<String, CourseServiceError> {
    match currency {
        None => Ok(DEFAULT_CURRENCY.to_string()),
        Some(code) => normalize_currency(code)
            .ok_or_else(|| CourseServiceError::ValidationError(format!("Invalid currency: {}", code))),
    }
}

fn slug_conflict(err: anyhow::Error, slug: &str) -> CourseServiceError {
    if is_unique_violation(&err) {
        CourseServiceError::SlugExists(slug.to_string())
    } else {
        CourseServiceError::InternalError(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::db::repositories::test_support::{insert_user, setup_pool};
    use crate::db::repositories::{SqlxCourseRepository, SqlxEnrollmentRepository, SqlxUserRepository};
    use crate::db::DynDatabasePool;
    use crate::models::{CourseLevel, LessonContentType, UserRole};

    async fn setup() -> (CourseService, DynDatabasePool) {
        let pool = setup_pool().await;
        let service = CourseService::new(
            SqlxCourseRepository::boxed(pool.clone()),
            SqlxUserRepository::boxed(pool.clone()),
            SqlxEnrollmentRepository::boxed(pool.clone()),
            Arc::new(MemoryCache::new()),
        );
        (service, pool)
    }

    async fn user(pool: &DynDatabasePool, email: &str, role: UserRole) -> User {
        let id = insert_user(pool, email).await;
        let mut user = User::new(email.into(), email.into(), None, role);
        user.id = id;
        user
    }

    fn course_input(title: &str, price: i64) -> CreateCourseInput {
        CreateCourseInput {
            slug: None,
            title: title.into(),
            summary: "Summary".into(),
            description: String::new(),
            category: Some("programming".into()),
            level: CourseLevel::Beginner,
            price,
            currency: None,
            thumbnail: None,
        }
    }

    fn lesson_input(title: &str, is_preview: bool) -> CreateLessonInput {
        CreateLessonInput {
            title: title.into(),
            content_type: LessonContentType::Text,
            content: format!("{} body", title),
            video_url: None,
            duration_minutes: 15,
            position: None,
            is_preview,
        }
    }

    #[tokio::test]
    async fn test_create_generates_slug_and_rejects_duplicates() {
        let (service, pool) = setup().await;
        let instructor = user(&pool, "teach@example.com", UserRole::Instructor).await;

        let course = service.create(&instructor, course_input("Rust for Beginners", 0)).await.unwrap();
        assert_eq!(course.slug, "rust-for-beginners");
        assert_eq!(course.currency, "INR");
        assert_eq!(course.status, PublishStatus::Draft);

        let dup = service.create(&instructor, course_input("Rust for Beginners", 0)).await;
        assert!(matches!(dup, Err(CourseServiceError::SlugExists(_))));

        let negative = service.create(&instructor, course_input("Pricey", -1)).await;
        assert!(matches!(negative, Err(CourseServiceError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_publish_requires_a_lesson() {
        let (service, pool) = setup().await;
        let instructor = user(&pool, "teach@example.com", UserRole::Instructor).await;
        let course = service.create(&instructor, course_input("Empty", 0)).await.unwrap();

        let result = service.publish(&instructor, course.id).await;
        assert!(matches!(result, Err(CourseServiceError::ValidationError(_))));

        let module = service
            .create_module(&instructor, course.id, CreateModuleInput { title: "Intro".into(), position: None })
            .await
            .unwrap();
        service.create_lesson(&instructor, module.id, lesson_input("Hello", true)).await.unwrap();

        let published = service.publish(&instructor, course.id).await.unwrap();
        assert!(published.is_published());
        assert!(published.published_at.is_some());
    }

    #[tokio::test]
    async fn test_instructors_only_manage_their_own_courses() {
        let (service, pool) = setup().await;
        let owner = user(&pool, "owner@example.com", UserRole::Instructor).await;
        let other = user(&pool, "other@example.com", UserRole::Instructor).await;
        let admin = user(&pool, "admin@example.com", UserRole::Admin).await;
        let course = service.create(&owner, course_input("Owned", 0)).await.unwrap();

        let denied = service
            .update(&other, course.id, UpdateCourseInput { title: Some("Mine".into()), ..Default::default() })
            .await;
        assert!(matches!(denied, Err(CourseServiceError::Forbidden)));

        let updated = service
            .update(&admin, course.id, UpdateCourseInput { price: Some(49_900), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(updated.price, 49_900);

        assert!(matches!(service.delete(&other, course.id).await, Err(CourseServiceError::Forbidden)));
        service.delete(&owner, course.id).await.unwrap();
        assert!(matches!(service.get_by_id(course.id).await, Err(CourseServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_detail_redacts_lessons_without_access() {
        let (service, pool) = setup().await;
        let instructor = user(&pool, "teach@example.com", UserRole::Instructor).await;
        let student = user(&pool, "student@example.com", UserRole::Student).await;

        let course = service.create(&instructor, course_input("Async Rust", 0)).await.unwrap();
        let module = service
            .create_module(&instructor, course.id, CreateModuleInput { title: "Basics".into(), position: None })
            .await
            .unwrap();
        service.create_lesson(&instructor, module.id, lesson_input("Preview", true)).await.unwrap();
        service.create_lesson(&instructor, module.id, lesson_input("Locked", false)).await.unwrap();

        // Drafts are hidden from the public
        let hidden = service.get_detail_by_slug(&course.slug, None).await;
        assert!(matches!(hidden, Err(CourseServiceError::NotFound(_))));
        service.publish(&instructor, course.id).await.unwrap();

        let public = service.get_detail_by_slug(&course.slug, Some(&student)).await.unwrap();
        assert!(!public.has_access);
        assert_eq!(public.total_lessons, 2);
        assert_eq!(public.total_minutes, 30);
        assert_eq!(public.instructor.as_ref().map(|i| i.id), Some(instructor.id));
        let lessons = &public.modules[0].lessons;
        assert_eq!(lessons[0].content, "Preview body");
        assert!(lessons[1].content.is_empty());

        let owner_view = service.get_detail_by_slug(&course.slug, Some(&instructor)).await.unwrap();
        assert!(owner_view.has_access);
        assert_eq!(owner_view.modules[0].lessons[1].content, "Locked body");

        SqlxEnrollmentRepository::new(pool.clone()).grant(student.id, course.id, None).await.unwrap();
        let enrolled = service.get_detail_by_slug(&course.slug, Some(&student)).await.unwrap();
        assert!(enrolled.has_access);
    }

    #[tokio::test]
    async fn test_catalog_only_lists_published_and_refreshes_after_writes() {
        let (service, pool) = setup().await;
        let instructor = user(&pool, "teach@example.com", UserRole::Instructor).await;
        let params = ListParams::default();

        let course = service.create(&instructor, course_input("Catalog", 0)).await.unwrap();
        let empty = service.list_published(CourseFilter::default(), &params).await.unwrap();
        assert_eq!(empty.total, 0);

        let module = service
            .create_module(&instructor, course.id, CreateModuleInput { title: "M".into(), position: None })
            .await
            .unwrap();
        service.create_lesson(&instructor, module.id, lesson_input("L", false)).await.unwrap();
        service.publish(&instructor, course.id).await.unwrap();

        let listed = service.list_published(CourseFilter::default(), &params).await.unwrap();
        assert_eq!(listed.total, 1);
        assert_eq!(listed.items[0].id, course.id);

        let all = service.list_all(&CourseFilter::default(), &params).await.unwrap();
        assert_eq!(all.total, 1);
    }

    #[tokio::test]
    async fn test_lesson_positions_append() {
        let (service, pool) = setup().await;
        let instructor = user(&pool, "teach@example.com", UserRole::Instructor).await;
        let course = service.create(&instructor, course_input("Ordered", 0)).await.unwrap();
        let module = service
            .create_module(&instructor, course.id, CreateModuleInput { title: "M".into(), position: None })
            .await
            .unwrap();

        let first = service.create_lesson(&instructor, module.id, lesson_input("One", false)).await.unwrap();
        let second = service.create_lesson(&instructor, module.id, lesson_input("Two", false)).await.unwrap();
        assert!(second.position > first.position);

        let moved = service
            .update_lesson(&instructor, second.id, UpdateLessonInput { position: Some(0), title: Some("Zero".into()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(moved.title, "Zero");

        service.delete_lesson(&instructor, first.id).await.unwrap();
        let curriculum = service.get_curriculum(&instructor, course.id).await.unwrap();
        assert_eq!(curriculum.total_lessons, 1);
    }
}
