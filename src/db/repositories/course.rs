//! Course repository
//!
//! Courses, their modules and lessons. Modules and lessons are always read
//! in `position` order.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Course, CourseFilter, CourseModule, Lesson, ListParams, PublishStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

#[async_trait]
pub trait CourseRepository: Send + Sync {
    async fn create(&self, course: &Course) -> Result<Course>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Course>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Course>>;

    async fn update(&self, course: &Course) -> Result<Course>;

    /// Cascades to modules, lessons and enrollments
    async fn delete(&self, id: i64) -> Result<()>;

    async fn list(&self, filter: &CourseFilter, params: &ListParams) -> Result<(Vec<Course>, i64)>;

    /// Courses by id, skipping ids that do not exist
    async fn get_many(&self, ids: &[i64]) -> Result<Vec<Course>>;

    async fn count_by_status(&self) -> Result<Vec<(PublishStatus, i64)>>;

    async fn create_module(&self, module: &CourseModule) -> Result<CourseModule>;

    async fn get_module(&self, id: i64) -> Result<Option<CourseModule>>;

    async fn update_module(&self, module: &CourseModule) -> Result<CourseModule>;

    async fn delete_module(&self, id: i64) -> Result<()>;

    async fn list_modules(&self, course_id: i64) -> Result<Vec<CourseModule>>;

    /// One past the highest module position in the course
    async fn next_module_position(&self, course_id: i64) -> Result<i32>;

    async fn create_lesson(&self, lesson: &Lesson) -> Result<Lesson>;

    async fn get_lesson(&self, id: i64) -> Result<Option<Lesson>>;

    async fn update_lesson(&self, lesson: &Lesson) -> Result<Lesson>;

    async fn delete_lesson(&self, id: i64) -> Result<()>;

    /// All lessons of a course, ordered by module then lesson position
    async fn list_lessons(&self, course_id: i64) -> Result<Vec<Lesson>>;

    async fn next_lesson_position(&self, module_id: i64) -> Result<i32>;

    async fn count_lessons(&self, course_id: i64) -> Result<i64>;

    /// Course owning the lesson, via its module
    async fn course_id_for_lesson(&self, lesson_id: i64) -> Result<Option<i64>>;
}

pub struct SqlxCourseRepository {
    pool: DynDatabasePool,
}

impl SqlxCourseRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CourseRepository> {
        Arc::new(Self::new(pool))
    }
}

const COURSE_COLUMNS: &str = "id, slug, title, summary, description, instructor_id, category, level, price, currency, thumbnail, status, published_at, created_at, updated_at";

const INSERT_COURSE: &str = r#"
    INSERT INTO courses (slug, title, summary, description, instructor_id, category, level,
                         price, currency, thumbnail, status, published_at, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

const UPDATE_COURSE: &str = r#"
    UPDATE courses
    SET slug = ?, title = ?, summary = ?, description = ?, category = ?, level = ?, price = ?,
        currency = ?, thumbnail = ?, status = ?, published_at = ?, updated_at = ?
    WHERE id = ?
"#;

const LIST_FILTER: &str = r#"
    WHERE (? IS NULL OR status = ?)
      AND (? IS NULL OR instructor_id = ?)
      AND (? IS NULL OR category = ?)
      AND (? IS NULL OR level = ?)
      AND (? IS NULL OR title LIKE ? OR summary LIKE ?)
"#;

const MODULE_COLUMNS: &str = "id, course_id, title, position, created_at";

const LESSON_COLUMNS: &str = "l.id, l.module_id, l.title, l.content_type, l.content, l.video_url, l.duration_minutes, l.position, l.is_preview, l.created_at, l.updated_at";

const INSERT_LESSON: &str = r#"
    INSERT INTO lessons (module_id, title, content_type, content, video_url, duration_minutes,
                         position, is_preview, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

const UPDATE_LESSON: &str = r#"
    UPDATE lessons
    SET title = ?, content_type = ?, content = ?, video_url = ?, duration_minutes = ?,
        position = ?, is_preview = ?, updated_at = ?
    WHERE id = ?
"#;

struct ListBinds {
    status: Option<String>,
    instructor_id: Option<i64>,
    category: Option<String>,
    level: Option<String>,
    pattern: Option<String>,
}

impl ListBinds {
    fn from(filter: &CourseFilter) -> Self {
        Self {
            status: filter.status.map(|s| s.as_str().to_string()),
            instructor_id: filter.instructor_id,
            category: filter.category.clone().filter(|c| !c.is_empty()),
            level: filter.level.map(|l| l.as_str().to_string()),
            pattern: filter
                .search
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| format!("%{}%", s)),
        }
    }
}

#[async_trait]
impl CourseRepository for SqlxCourseRepository {
    async fn create(&self, course: &Course) -> Result<Course> {
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => insert_course_sqlite(self.pool.sqlite()?, course).await?,
            DatabaseDriver::Mysql => insert_course_mysql(self.pool.mysql()?, course).await?,
        };
        Ok(Course { id, ..course.clone() })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Course>> {
        let sql = format!("SELECT {} FROM courses WHERE id = ?", COURSE_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => Ok(sqlx::query(&sql)
                .bind(id)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get course by ID")?
                .as_ref()
                .map(row_to_course_sqlite)),
            DatabaseDriver::Mysql => Ok(sqlx::query(&sql)
                .bind(id)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get course by ID")?
                .as_ref()
                .map(row_to_course_mysql)),
        }
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Course>> {
        let sql = format!("SELECT {} FROM courses WHERE slug = ?", COURSE_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => Ok(sqlx::query(&sql)
                .bind(slug)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get course by slug")?
                .as_ref()
                .map(row_to_course_sqlite)),
            DatabaseDriver::Mysql => Ok(sqlx::query(&sql)
                .bind(slug)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get course by slug")?
                .as_ref()
                .map(row_to_course_mysql)),
        }
    }

    async fn update(&self, course: &Course) -> Result<Course> {
        let now = Utc::now();
        execute!(
            self,
            UPDATE_COURSE,
            "Failed to update course",
            &course.slug,
            &course.title,
            &course.summary,
            &course.description,
            &course.category,
            course.level.as_str(),
            course.price,
            &course.currency,
            &course.thumbnail,
            course.status.as_str(),
            course.published_at,
            now,
            course.id
        );
        self.get_by_id(course.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Course not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        execute!(self, "DELETE FROM courses WHERE id = ?", "Failed to delete course", id);
        Ok(())
    }

    async fn list(&self, filter: &CourseFilter, params: &ListParams) -> Result<(Vec<Course>, i64)> {
        let binds = ListBinds::from(filter);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_courses_sqlite(self.pool.sqlite()?, &binds, params).await,
            DatabaseDriver::Mysql => list_courses_mysql(self.pool.mysql()?, &binds, params).await,
        }
    }

    async fn get_many(&self, ids: &[i64]) -> Result<Vec<Course>> {
        let mut courses = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(course) = self.get_by_id(*id).await? {
                courses.push(course);
            }
        }
        Ok(courses)
    }

    async fn count_by_status(&self) -> Result<Vec<(PublishStatus, i64)>> {
        let sql = "SELECT status, COUNT(*) AS count FROM courses GROUP BY status";
        let pairs = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to count courses")?
                .iter()
                .map(|row| (row.get::<String, _>("status"), row.get::<i64, _>("count")))
                .collect::<Vec<_>>(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to count courses")?
                .iter()
                .map(|row| (row.get::<String, _>("status"), row.get::<i64, _>("count")))
                .collect::<Vec<_>>(),
        };
        Ok(pairs
            .into_iter()
            .map(|(status, count)| (status.parse().unwrap_or_default(), count))
            .collect())
    }

    async fn create_module(&self, module: &CourseModule) -> Result<CourseModule> {
        let sql = "INSERT INTO course_modules (course_id, title, position, created_at) VALUES (?, ?, ?, ?)";
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(module.course_id)
                .bind(&module.title)
                .bind(module.position)
                .bind(module.created_at)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to create module")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(module.course_id)
                .bind(&module.title)
                .bind(module.position)
                .bind(module.created_at)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to create module")?
                .last_insert_id() as i64,
        };
        Ok(CourseModule { id, ..module.clone() })
    }

    async fn get_module(&self, id: i64) -> Result<Option<CourseModule>> {
        let sql = format!("SELECT {} FROM course_modules WHERE id = ?", MODULE_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => Ok(sqlx::query(&sql)
                .bind(id)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get module")?
                .map(|row| CourseModule {
                    id: row.get("id"),
                    course_id: row.get("course_id"),
                    title: row.get("title"),
                    position: row.get("position"),
                    created_at: row.get("created_at"),
                })),
            DatabaseDriver::Mysql => Ok(sqlx::query(&sql)
                .bind(id)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get module")?
                .map(|row| CourseModule {
                    id: row.get("id"),
                    course_id: row.get("course_id"),
                    title: row.get("title"),
                    position: row.get("position"),
                    created_at: row.get("created_at"),
                })),
        }
    }

    async fn update_module(&self, module: &CourseModule) -> Result<CourseModule> {
        execute!(
            self,
            "UPDATE course_modules SET title = ?, position = ? WHERE id = ?",
            "Failed to update module",
            &module.title,
            module.position,
            module.id
        );
        Ok(module.clone())
    }

    async fn delete_module(&self, id: i64) -> Result<()> {
        execute!(self, "DELETE FROM course_modules WHERE id = ?", "Failed to delete module", id);
        Ok(())
    }

    async fn list_modules(&self, course_id: i64) -> Result<Vec<CourseModule>> {
        let sql = format!(
            "SELECT {} FROM course_modules WHERE course_id = ? ORDER BY position, id",
            MODULE_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => Ok(sqlx::query(&sql)
                .bind(course_id)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to list modules")?
                .into_iter()
                .map(|row| CourseModule {
                    id: row.get("id"),
                    course_id: row.get("course_id"),
                    title: row.get("title"),
                    position: row.get("position"),
                    created_at: row.get("created_at"),
                })
                .collect()),
            DatabaseDriver::Mysql => Ok(sqlx::query(&sql)
                .bind(course_id)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to list modules")?
                .into_iter()
                .map(|row| CourseModule {
                    id: row.get("id"),
                    course_id: row.get("course_id"),
                    title: row.get("title"),
                    position: row.get("position"),
                    created_at: row.get("created_at"),
                })
                .collect()),
        }
    }

    async fn next_module_position(&self, course_id: i64) -> Result<i32> {
        let sql = "SELECT CAST(COALESCE(MAX(position) + 1, 0) AS SIGNED) AS next FROM course_modules WHERE course_id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(
                    "SELECT COALESCE(MAX(position) + 1, 0) AS next FROM course_modules WHERE course_id = ?",
                )
                .bind(course_id)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to compute module position")?;
                Ok(row.get::<i64, _>("next") as i32)
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(sql)
                    .bind(course_id)
                    .fetch_one(self.pool.mysql()?)
                    .await
                    .context("Failed to compute module position")?;
                Ok(row.get::<i64, _>("next") as i32)
            }
        }
    }

    async fn create_lesson(&self, lesson: &Lesson) -> Result<Lesson> {
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(INSERT_LESSON)
                .bind(lesson.module_id)
                .bind(&lesson.title)
                .bind(lesson.content_type.as_str())
                .bind(&lesson.content)
                .bind(&lesson.video_url)
                .bind(lesson.duration_minutes)
                .bind(lesson.position)
                .bind(lesson.is_preview)
                .bind(lesson.created_at)
                .bind(lesson.updated_at)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to create lesson")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(INSERT_LESSON)
                .bind(lesson.module_id)
                .bind(&lesson.title)
                .bind(lesson.content_type.as_str())
                .bind(&lesson.content)
                .bind(&lesson.video_url)
                .bind(lesson.duration_minutes)
                .bind(lesson.position)
                .bind(lesson.is_preview)
                .bind(lesson.created_at)
                .bind(lesson.updated_at)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to create lesson")?
                .last_insert_id() as i64,
        };
        Ok(Lesson { id, ..lesson.clone() })
    }

    async fn get_lesson(&self, id: i64) -> Result<Option<Lesson>> {
        let sql = format!("SELECT {} FROM lessons l WHERE l.id = ?", LESSON_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => Ok(sqlx::query(&sql)
                .bind(id)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get lesson")?
                .as_ref()
                .map(row_to_lesson_sqlite)),
            DatabaseDriver::Mysql => Ok(sqlx::query(&sql)
                .bind(id)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get lesson")?
                .as_ref()
                .map(row_to_lesson_mysql)),
        }
    }

    async fn update_lesson(&self, lesson: &Lesson) -> Result<Lesson> {
        let now = Utc::now();
        execute!(
            self,
            UPDATE_LESSON,
            "Failed to update lesson",
            &lesson.title,
            lesson.content_type.as_str(),
            &lesson.content,
            &lesson.video_url,
            lesson.duration_minutes,
            lesson.position,
            lesson.is_preview,
            now,
            lesson.id
        );
        Ok(Lesson {
            updated_at: now,
            ..lesson.clone()
        })
    }

    async fn delete_lesson(&self, id: i64) -> Result<()> {
        execute!(self, "DELETE FROM lessons WHERE id = ?", "Failed to delete lesson", id);
        Ok(())
    }

    async fn list_lessons(&self, course_id: i64) -> Result<Vec<Lesson>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM lessons l
            INNER JOIN course_modules m ON m.id = l.module_id
            WHERE m.course_id = ?
            ORDER BY m.position, m.id, l.position, l.id
            "#,
            LESSON_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => Ok(sqlx::query(&sql)
                .bind(course_id)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to list lessons")?
                .iter()
                .map(row_to_lesson_sqlite)
                .collect()),
            DatabaseDriver::Mysql => Ok(sqlx::query(&sql)
                .bind(course_id)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to list lessons")?
                .iter()
                .map(row_to_lesson_mysql)
                .collect()),
        }
    }

    async fn next_lesson_position(&self, module_id: i64) -> Result<i32> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(
                    "SELECT COALESCE(MAX(position) + 1, 0) AS next FROM lessons WHERE module_id = ?",
                )
                .bind(module_id)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to compute lesson position")?;
                Ok(row.get::<i64, _>("next") as i32)
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(
                    "SELECT CAST(COALESCE(MAX(position) + 1, 0) AS SIGNED) AS next FROM lessons WHERE module_id = ?",
                )
                .bind(module_id)
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to compute lesson position")?;
                Ok(row.get::<i64, _>("next") as i32)
            }
        }
    }

    async fn count_lessons(&self, course_id: i64) -> Result<i64> {
        let sql = r#"
            SELECT COUNT(*) AS count
            FROM lessons l
            INNER JOIN course_modules m ON m.id = l.module_id
            WHERE m.course_id = ?
        "#;
        let row_count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(course_id)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to count lessons")?
                .get("count"),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(course_id)
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to count lessons")?
                .get("count"),
        };
        Ok(row_count)
    }

    async fn course_id_for_lesson(&self, lesson_id: i64) -> Result<Option<i64>> {
        let sql = r#"
            SELECT m.course_id AS course_id
            FROM lessons l
            INNER JOIN course_modules m ON m.id = l.module_id
            WHERE l.id = ?
        "#;
        match self.pool.driver() {
            DatabaseDriver::Sqlite => Ok(sqlx::query(sql)
                .bind(lesson_id)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to resolve lesson course")?
                .map(|row| row.get("course_id"))),
            DatabaseDriver::Mysql => Ok(sqlx::query(sql)
                .bind(lesson_id)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to resolve lesson course")?
                .map(|row| row.get("course_id"))),
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn insert_course_sqlite(pool: &SqlitePool, course: &Course) -> Result<i64> {
    let result = sqlx::query(INSERT_COURSE)
        .bind(&course.slug)
        .bind(&course.title)
        .bind(&course.summary)
        .bind(&course.description)
        .bind(course.instructor_id)
        .bind(&course.category)
        .bind(course.level.as_str())
        .bind(course.price)
        .bind(&course.currency)
        .bind(&course.thumbnail)
        .bind(course.status.as_str())
        .bind(course.published_at)
        .bind(course.created_at)
        .bind(course.updated_at)
        .execute(pool)
        .await
        .context("Failed to create course")?;
    Ok(result.last_insert_rowid())
}

async fn list_courses_sqlite(
    pool: &SqlitePool,
    binds: &ListBinds,
    params: &ListParams,
) -> Result<(Vec<Course>, i64)> {
    let sql = format!(
        "SELECT {} FROM courses {} ORDER BY COALESCE(published_at, created_at) DESC, id DESC LIMIT ? OFFSET ?",
        COURSE_COLUMNS, LIST_FILTER
    );
    let rows = sqlx::query(&sql)
        .bind(&binds.status)
        .bind(&binds.status)
        .bind(binds.instructor_id)
        .bind(binds.instructor_id)
        .bind(&binds.category)
        .bind(&binds.category)
        .bind(&binds.level)
        .bind(&binds.level)
        .bind(&binds.pattern)
        .bind(&binds.pattern)
        .bind(&binds.pattern)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list courses")?;

    let count_sql = format!("SELECT COUNT(*) AS count FROM courses {}", LIST_FILTER);
    let total: i64 = sqlx::query(&count_sql)
        .bind(&binds.status)
        .bind(&binds.status)
        .bind(binds.instructor_id)
        .bind(binds.instructor_id)
        .bind(&binds.category)
        .bind(&binds.category)
        .bind(&binds.level)
        .bind(&binds.level)
        .bind(&binds.pattern)
        .bind(&binds.pattern)
        .bind(&binds.pattern)
        .fetch_one(pool)
        .await
        .context("Failed to count courses")?
        .get("count");

    Ok((rows.iter().map(row_to_course_sqlite).collect(), total))
}

fn row_to_course_sqlite(row: &sqlx::sqlite::SqliteRow) -> Course {
    let level: String = row.get("level");
    let status: String = row.get("status");

    Course {
        id: row.get("id"),
        slug: row.get("slug"),
        title: row.get("title"),
        summary: row.get("summary"),
        description: row.get("description"),
        instructor_id: row.get("instructor_id"),
        category: row.get("category"),
        level: level.parse().unwrap_or_default(),
        price: row.get("price"),
        currency: row.get("currency"),
        thumbnail: row.get("thumbnail"),
        status: status.parse().unwrap_or_default(),
        published_at: row.get("published_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_lesson_sqlite(row: &sqlx::sqlite::SqliteRow) -> Lesson {
    let content_type: String = row.get("content_type");

    Lesson {
        id: row.get("id"),
        module_id: row.get("module_id"),
        title: row.get("title"),
        content_type: content_type.parse().unwrap_or_default(),
        content: row.get("content"),
        video_url: row.get("video_url"),
        duration_minutes: row.get("duration_minutes"),
        position: row.get("position"),
        is_preview: row.get("is_preview"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn insert_course_mysql(pool: &MySqlPool, course: &Course) -> Result<i64> {
    let result = sqlx::query(INSERT_COURSE)
        .bind(&course.slug)
        .bind(&course.title)
        .bind(&course.summary)
        .bind(&course.description)
        .bind(course.instructor_id)
        .bind(&course.category)
        .bind(course.level.as_str())
        .bind(course.price)
        .bind(&course.currency)
        .bind(&course.thumbnail)
        .bind(course.status.as_str())
        .bind(course.published_at)
        .bind(course.created_at)
        .bind(course.updated_at)
        .execute(pool)
        .await
        .context("Failed to create course")?;
    Ok(result.last_insert_id() as i64)
}

async fn list_courses_mysql(
    pool: &MySqlPool,
    binds: &ListBinds,
    params: &ListParams,
) -> Result<(Vec<Course>, i64)> {
    let sql = format!(
        "SELECT {} FROM courses {} ORDER BY COALESCE(published_at, created_at) DESC, id DESC LIMIT ? OFFSET ?",
        COURSE_COLUMNS, LIST_FILTER
    );
    let rows = sqlx::query(&sql)
        .bind(&binds.status)
        .bind(&binds.status)
        .bind(binds.instructor_id)
        .bind(binds.instructor_id)
        .bind(&binds.category)
        .bind(&binds.category)
        .bind(&binds.level)
        .bind(&binds.level)
        .bind(&binds.pattern)
        .bind(&binds.pattern)
        .bind(&binds.pattern)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list courses")?;

    let count_sql = format!("SELECT COUNT(*) AS count FROM courses {}", LIST_FILTER);
    let total: i64 = sqlx::query(&count_sql)
        .bind(&binds.status)
        .bind(&binds.status)
        .bind(binds.instructor_id)
        .bind(binds.instructor_id)
        .bind(&binds.category)
        .bind(&binds.category)
        .bind(&binds.level)
        .bind(&binds.level)
        .bind(&binds.pattern)
        .bind(&binds.pattern)
        .bind(&binds.pattern)
        .fetch_one(pool)
        .await
        .context("Failed to count courses")?
        .get("count");

    Ok((rows.iter().map(row_to_course_mysql).collect(), total))
}

fn row_to_course_mysql(row: &sqlx::mysql::MySqlRow) -> Course {
    let level: String = row.get("level");
    let status: String = row.get("status");

    Course {
        id: row.get("id"),
        slug: row.get("slug"),
        title: row.get("title"),
        summary: row.get("summary"),
        description: row.get("description"),
        instructor_id: row.get("instructor_id"),
        category: row.get("category"),
        level: level.parse().unwrap_or_default(),
        price: row.get("price"),
        currency: row.get("currency"),
        thumbnail: row.get("thumbnail"),
        status: status.parse().unwrap_or_default(),
        published_at: row.get("published_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_lesson_mysql(row: &sqlx::mysql::MySqlRow) -> Lesson {
    let content_type: String = row.get("content_type");

    Lesson {
        id: row.get("id"),
        module_id: row.get("module_id"),
        title: row.get("title"),
        content_type: content_type.parse().unwrap_or_default(),
        content: row.get("content"),
        video_url: row.get("video_url"),
        duration_minutes: row.get("duration_minutes"),
        position: row.get("position"),
        is_preview: row.get("is_preview"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
