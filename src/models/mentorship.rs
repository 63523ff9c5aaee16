//! Mentorship program and session models

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::course::PublishStatus;
use super::enrollment::EnrollmentStatus;

string_enum! {
    pub enum SessionStatus {
        Scheduled => "scheduled",
        Completed => "completed",
        Cancelled => "cancelled",
    }
    default = Scheduled;
}

/// A mentor's program that mentees enroll in before booking sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MentorshipProgram {
    pub id: i64,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub mentor_id: i64,
    pub price: i64,
    pub currency: String,
    /// Length of a bookable session
    pub session_minutes: i32,
    /// Active enrollment cap, 0 = unlimited
    pub max_mentees: i32,
    pub status: PublishStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MentorshipEnrollment {
    pub id: i64,
    pub user_id: i64,
    pub program_id: i64,
    pub status: EnrollmentStatus,
    pub order_id: Option<i64>,
    pub enrolled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MentorshipSession {
    pub id: i64,
    pub program_id: i64,
    pub mentor_id: i64,
    pub mentee_id: i64,
    pub starts_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub status: SessionStatus,
    pub topic: Option<String>,
    pub meeting_url: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MentorshipSession {
    pub fn ends_at(&self) -> DateTime<Utc> {
        self.starts_at + Duration::minutes(self.duration_minutes as i64)
    }

    /// Half-open interval overlap with `[start, end)`
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.starts_at < end && start < self.ends_at()
    }
}

/// A bookable interval, `[starts_at, ends_at)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateMentorshipProgramInput {
    pub slug: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Defaults to the creating admin when absent
    pub mentor_id: Option<i64>,
    #[serde(default)]
    pub price: i64,
    pub currency: Option<String>,
    pub session_minutes: Option<i32>,
    #[serde(default)]
    pub max_mentees: i32,
    #[serde(default)]
    pub status: PublishStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateMentorshipProgramInput {
    pub slug: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub mentor_id: Option<i64>,
    pub price: Option<i64>,
    pub currency: Option<String>,
    pub session_minutes: Option<i32>,
    pub max_mentees: Option<i32>,
    pub status: Option<PublishStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookSessionInput {
    pub program_id: i64,
    pub starts_at: DateTime<Utc>,
    pub topic: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn session_at(hour: u32, minutes: i32) -> MentorshipSession {
        let start = Utc.with_ymd_and_hms(2030, 1, 1, hour, 0, 0).unwrap();
        MentorshipSession {
            id: 1,
            program_id: 1,
            mentor_id: 1,
            mentee_id: 2,
            starts_at: start,
            duration_minutes: minutes,
            status: SessionStatus::Scheduled,
            topic: None,
            meeting_url: None,
            notes: None,
            created_at: start,
            updated_at: start,
        }
    }

    #[test]
    fn test_overlap_is_half_open() {
        let session = session_at(9, 60);
        let at = |h: u32, m: u32| Utc.with_ymd_and_hms(2030, 1, 1, h, m, 0).unwrap();

        assert!(session.overlaps(at(9, 0), at(10, 0)));
        assert!(session.overlaps(at(9, 30), at(10, 30)));
        assert!(!session.overlaps(at(10, 0), at(11, 0)));
        assert!(!session.overlaps(at(8, 0), at(9, 0)));
    }
}
