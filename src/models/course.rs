//! Course catalog models
//!
//! A course is split into ordered modules, each holding ordered lessons.
//! Prices are integer minor units (paise for INR).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::user::UserSummary;

string_enum! {
    /// Publication state shared by courses, programs and posts.
    pub enum PublishStatus {
        Draft => "draft",
        Published => "published",
        Archived => "archived",
    }
    default = Draft;
}

string_enum! {
    pub enum CourseLevel {
        Beginner => "beginner",
        Intermediate => "intermediate",
        Advanced => "advanced",
    }
    default = Beginner;
}

string_enum! {
    pub enum LessonContentType {
        Video => "video",
        Text => "text",
        Quiz => "quiz",
        File => "file",
    }
    default = Text;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub summary: String,
    pub description: String,
    pub instructor_id: i64,
    pub category: Option<String>,
    pub level: CourseLevel,
    /// Minor units
    pub price: i64,
    pub currency: String,
    pub thumbnail: Option<String>,
    pub status: PublishStatus,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Course {
    pub fn is_free(&self) -> bool {
        self.price == 0
    }

    pub fn is_published(&self) -> bool {
        self.status == PublishStatus::Published
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseModule {
    pub id: i64,
    pub course_id: i64,
    pub title: String,
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lesson {
    pub id: i64,
    pub module_id: i64,
    pub title: String,
    pub content_type: LessonContentType,
    pub content: String,
    pub video_url: Option<String>,
    pub duration_minutes: i32,
    pub position: i32,
    /// Visible to visitors who are not enrolled
    pub is_preview: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lesson {
    /// Strip the body for callers without access
    pub fn redacted(mut self) -> Self {
        self.content = String::new();
        self.video_url = None;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleWithLessons {
    #[serde(flatten)]
    pub module: CourseModule,
    pub lessons: Vec<Lesson>,
}

/// Course with its instructor and full curriculum
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseDetail {
    #[serde(flatten)]
    pub course: Course,
    pub instructor: Option<UserSummary>,
    pub modules: Vec<ModuleWithLessons>,
    pub total_lessons: usize,
    pub total_minutes: i64,
    /// Whether the caller can see every lesson body
    pub has_access: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCourseInput {
    /// Generated from the title when absent
    pub slug: Option<String>,
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: String,
    pub category: Option<String>,
    #[serde(default)]
    pub level: CourseLevel,
    #[serde(default)]
    pub price: i64,
    pub currency: Option<String>,
    pub thumbnail: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCourseInput {
    pub slug: Option<String>,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub level: Option<CourseLevel>,
    pub price: Option<i64>,
    pub currency: Option<String>,
    pub thumbnail: Option<String>,
    pub status: Option<PublishStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateModuleInput {
    pub title: String,
    /// Appended after the last module when absent
    pub position: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateModuleInput {
    pub title: Option<String>,
    pub position: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateLessonInput {
    pub title: String,
    #[serde(default)]
    pub content_type: LessonContentType,
    #[serde(default)]
    pub content: String,
    pub video_url: Option<String>,
    #[serde(default)]
    pub duration_minutes: i32,
    pub position: Option<i32>,
    #[serde(default)]
    pub is_preview: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateLessonInput {
    pub title: Option<String>,
    pub content_type: Option<LessonContentType>,
    pub content: Option<String>,
    pub video_url: Option<String>,
    pub duration_minutes: Option<i32>,
    pub position: Option<i32>,
    pub is_preview: Option<bool>,
}

/// Catalog filters
#[derive(Debug, Clone, Default)]
pub struct CourseFilter {
    pub status: Option<PublishStatus>,
    pub instructor_id: Option<i64>,
    pub category: Option<String>,
    pub level: Option<CourseLevel>,
    /// Matches title or summary
    pub search: Option<String>,
}
