//! Course enrollment and progress models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

string_enum! {
    /// Also used for mentorship enrollments.
    pub enum EnrollmentStatus {
        Active => "active",
        Completed => "completed",
        Cancelled => "cancelled",
    }
    default = Active;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: i64,
    pub user_id: i64,
    pub course_id: i64,
    pub status: EnrollmentStatus,
    /// 0..=100
    pub progress_percent: i32,
    /// Order that paid for this enrollment, if any
    pub order_id: Option<i64>,
    pub enrolled_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Enrollment {
    /// Cancelled enrollments no longer grant access
    pub fn grants_access(&self) -> bool {
        self.status != EnrollmentStatus::Cancelled
    }
}

/// Enrollment joined with the course it belongs to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentWithCourse {
    #[serde(flatten)]
    pub enrollment: Enrollment,
    pub course_title: String,
    pub course_slug: String,
    pub course_thumbnail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseProgress {
    pub course_id: i64,
    pub total_lessons: i64,
    pub completed_lessons: i64,
    pub progress_percent: i32,
    pub completed_lesson_ids: Vec<i64>,
}

/// Whole-percent completion, rounded down; an empty course is 0%.
pub fn progress_percent(completed: i64, total: i64) -> i32 {
    if total <= 0 {
        return 0;
    }
    (completed.clamp(0, total) * 100 / total) as i32
}
