//! User model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

string_enum! {
    /// Role deciding which dashboards and write operations a user reaches.
    pub enum UserRole {
        Student => "student",
        Instructor => "instructor",
        Admin => "admin",
    }
    default = Student;
}

string_enum! {
    /// Banned users cannot sign in or use existing sessions.
    pub enum UserStatus {
        Active => "active",
        Banned => "banned",
    }
    default = Active;
}

/// Registered user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    /// Lowercased, unique
    pub email: String,
    /// argon2 hash; `None` for accounts created through OAuth only
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub role: UserRole,
    pub status: UserStatus,
    pub image: Option<String>,
    pub bio: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// New, unsaved user; `id` is assigned by the database.
    pub fn new(name: String, email: String, password_hash: Option<String>, role: UserRole) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            name,
            email,
            password_hash,
            role,
            status: UserStatus::Active,
            image: None,
            bio: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Instructors and admins can author courses and posts
    pub fn is_instructor(&self) -> bool {
        matches!(self.role, UserRole::Instructor | UserRole::Admin)
    }

    pub fn is_banned(&self) -> bool {
        self.status == UserStatus::Banned
    }

    /// Admins manage everything; everyone else only what they own.
    pub fn can_manage(&self, owner_id: i64) -> bool {
        self.is_admin() || self.id == owner_id
    }

    /// Profile image, falling back to Gravatar
    pub fn avatar_url(&self) -> String {
        match &self.image {
            Some(image) if !image.is_empty() => image.clone(),
            _ => gravatar_url(&self.email),
        }
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            name: self.name.clone(),
            avatar: self.avatar_url(),
        }
    }
}

pub(crate) fn gravatar_url(email: &str) -> String {
    let digest = md5::compute(email.trim().to_lowercase().as_bytes());
    format!("https://www.gravatar.com/avatar/{:x}?d=identicon", digest)
}

/// Public view of a user (instructors, mentors, comment authors)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i64,
    pub name: String,
    pub avatar: String,
}

/// Self-service profile update
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProfileInput {
    pub name: Option<String>,
    pub image: Option<String>,
    pub bio: Option<String>,
}

/// Admin-side user update
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminUpdateUserInput {
    pub role: Option<UserRole>,
    pub status: Option<UserStatus>,
}

/// Filters for the admin user list
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub role: Option<UserRole>,
    /// Matches name or email
    pub search: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing_and_display() {
        assert_eq!("Instructor".parse::<UserRole>().unwrap(), UserRole::Instructor);
        assert_eq!(UserRole::Admin.to_string(), "admin");
        assert!("editor".parse::<UserRole>().is_err());
        assert_eq!(UserRole::default(), UserRole::Student);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&UserRole::Instructor).unwrap(), "\"instructor\"");
        let status: UserStatus = serde_json::from_str("\"banned\"").unwrap();
        assert_eq!(status, UserStatus::Banned);
    }

    #[test]
    fn test_permissions() {
        let mut user = User::new("A".into(), "a@example.com".into(), None, UserRole::Student);
        user.id = 5;
        assert!(!user.is_instructor());
        assert!(user.can_manage(5));
        assert!(!user.can_manage(6));

        user.role = UserRole::Admin;
        assert!(user.is_instructor());
        assert!(user.can_manage(6));
    }

    #[test]
    fn test_password_hash_never_serialized() {
        let user = User::new("A".into(), "a@example.com".into(), Some("secret-hash".into()), UserRole::Student);
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret-hash"));
        assert!(!json.contains("password_hash"));
    }

    #[test]
    fn test_avatar_falls_back_to_gravatar() {
        let mut user = User::new("A".into(), " A@Example.com ".into(), None, UserRole::Student);
        assert!(user.avatar_url().starts_with("https://www.gravatar.com/avatar/"));
        assert_eq!(user.avatar_url(), gravatar_url("a@example.com"));

        user.image = Some("https://cdn/a.png".into());
        assert_eq!(user.avatar_url(), "https://cdn/a.png");
    }
}
