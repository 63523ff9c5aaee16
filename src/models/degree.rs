//! Degree program models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::course::{Course, PublishStatus};

string_enum! {
    pub enum DegreeEnrollmentStatus {
        Active => "active",
        Completed => "completed",
        Withdrawn => "withdrawn",
    }
    default = Active;
}

/// A curated sequence of courses sold as one program
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DegreeProgram {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub duration_months: i32,
    pub price: i64,
    pub currency: String,
    pub status: PublishStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DegreeDetail {
    #[serde(flatten)]
    pub program: DegreeProgram,
    /// In program order
    pub courses: Vec<Course>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DegreeEnrollment {
    pub id: i64,
    pub user_id: i64,
    pub program_id: i64,
    pub status: DegreeEnrollmentStatus,
    pub order_id: Option<i64>,
    pub enrolled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DegreeEnrollmentWithProgram {
    #[serde(flatten)]
    pub enrollment: DegreeEnrollment,
    pub program_title: String,
    pub program_slug: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateDegreeInput {
    pub slug: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub duration_months: i32,
    #[serde(default)]
    pub price: i64,
    pub currency: Option<String>,
    #[serde(default)]
    pub status: PublishStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateDegreeInput {
    pub slug: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub duration_months: Option<i32>,
    pub price: Option<i64>,
    pub currency: Option<String>,
    pub status: Option<PublishStatus>,
}
