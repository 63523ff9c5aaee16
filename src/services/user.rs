//! User service
//!
//! Registration (the first account becomes admin), password login, session
//! lifecycle, profile edits and the admin user list.

use crate::db::is_unique_violation;
use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{
    AdminUpdateUserInput, ListParams, PagedResult, Session, UpdateProfileInput, User, UserFilter,
    UserRole, UserStatus,
};
use crate::services::password::{hash_password, verify_password, MIN_PASSWORD_LENGTH};
use anyhow::Context;
use chrono::{Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

const DEFAULT_SESSION_DAYS: i64 = 7;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern compiles"));

#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Account is banned")]
    Banned,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("User already exists: {0}")]
    UserExists(String),

    #[error("User not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterInput {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl RegisterInput {
    pub fn new(name: impl Into<String>, email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            password: password.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

impl LoginInput {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    session_days: i64,
}

impl UserService {
    pub fn new(user_repo: Arc<dyn UserRepository>, session_repo: Arc<dyn SessionRepository>) -> Self {
        Self::with_session_days(user_repo, session_repo, DEFAULT_SESSION_DAYS)
    }

    pub fn with_session_days(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        session_days: i64,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            session_days,
        }
    }

    /// Register a password account.
    ///
    /// The very first user gets the admin role; everyone after is a student.
    pub async fn register(&self, input: RegisterInput) -> Result<User, UserServiceError> {
        let name = input.name.trim().to_string();
        let email = normalize_email(&input.email);

        if name.is_empty() {
            return Err(UserServiceError::ValidationError("Name cannot be empty".into()));
        }
        if !is_valid_email(&email) {
            return Err(UserServiceError::ValidationError("Invalid email format".into()));
        }
        validate_password(&input.password)?;

        if self
            .user_repo
            .get_by_email(&email)
            .await
            .context("Failed to check email")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(format!(
                "Email '{}' is already registered",
                email
            )));
        }

        let role = if self.is_first_user().await? {
            UserRole::Admin
        } else {
            UserRole::Student
        };

        let password_hash = hash_password(&input.password)?;
        let user = User::new(name, email.clone(), Some(password_hash), role);

        let created = self.user_repo.create(&user).await.map_err(|e| {
            if is_unique_violation(&e) {
                UserServiceError::UserExists(format!("Email '{}' is already registered", email))
            } else {
                UserServiceError::InternalError(e)
            }
        })?;

        tracing::info!(user_id = created.id, role = %created.role, "User registered");
        Ok(created)
    }

    /// Check credentials and open a session
    pub async fn login(&self, input: LoginInput) -> Result<(User, Session), UserServiceError> {
        let invalid = || UserServiceError::AuthenticationError("Invalid email or password".into());

        let user = self
            .user_repo
            .get_by_email(&normalize_email(&input.email))
            .await
            .context("Failed to get user by email")?
            .ok_or_else(invalid)?;

        // OAuth-only accounts have no password to check
        let hash = user.password_hash.as_deref().ok_or_else(invalid)?;
        if !verify_password(&input.password, hash)? {
            return Err(invalid());
        }

        if user.is_banned() {
            return Err(UserServiceError::Banned);
        }

        let session = self.create_session(user.id).await?;
        Ok((user, session))
    }

    pub async fn logout(&self, token: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(token)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// User behind a session token; `None` for unknown or expired tokens.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let session = match self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
        {
            Some(s) => s,
            None => return Ok(None),
        };

        if session.is_expired() {
            if let Err(e) = self.session_repo.delete(token).await {
                tracing::warn!("Failed to delete expired session: {:#}", e);
            }
            return Ok(None);
        }

        let user = self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get user")?;
        Ok(user)
    }

    pub async fn create_session(&self, user_id: i64) -> Result<Session, UserServiceError> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            user_id,
            expires_at: now + Duration::days(self.session_days),
            created_at: now,
        };

        let created = self
            .session_repo
            .create(&session)
            .await
            .context("Failed to create session")?;
        Ok(created)
    }

    pub fn session_days(&self) -> i64 {
        self.session_days
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        Ok(self
            .user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user by ID")?)
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>, UserServiceError> {
        Ok(self
            .user_repo
            .get_by_email(&normalize_email(email))
            .await
            .context("Failed to get user by email")?)
    }

    /// Create an account with no password, used by OAuth sign-in
    pub async fn create_oauth_user(
        &self,
        name: &str,
        email: &str,
        image: Option<String>,
    ) -> Result<User, UserServiceError> {
        let email = normalize_email(email);
        let role = if self.is_first_user().await? {
            UserRole::Admin
        } else {
            UserRole::Student
        };
        let display_name = match name.trim() {
            "" => email.split('@').next().unwrap_or("learner").to_string(),
            n => n.to_string(),
        };

        let mut user = User::new(display_name, email, None, role);
        user.image = image;
        let created = self.user_repo.create(&user).await?;
        tracing::info!(user_id = created.id, "User created via OAuth");
        Ok(created)
    }

    pub async fn update_profile(&self, user_id: i64, input: UpdateProfileInput) -> Result<User, UserServiceError> {
        let mut user = self.require_user(user_id).await?;

        if let Some(name) = input.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(UserServiceError::ValidationError("Name cannot be empty".into()));
            }
            user.name = name;
        }
        if let Some(image) = input.image {
            user.image = (!image.trim().is_empty()).then_some(image);
        }
        if let Some(bio) = input.bio {
            user.bio = (!bio.trim().is_empty()).then_some(bio);
        }
        user.updated_at = Utc::now();

        Ok(self.user_repo.update(&user).await.context("Failed to update user")?)
    }

    /// Change the password and revoke every session, returning a fresh one.
    ///
    /// Accounts without a password (OAuth only) may set one without
    /// supplying the current password.
    pub async fn change_password(
        &self,
        user_id: i64,
        current_password: &str,
        new_password: &str,
    ) -> Result<Session, UserServiceError> {
        let mut user = self.require_user(user_id).await?;

        if let Some(hash) = user.password_hash.as_deref() {
            if !verify_password(current_password, hash)? {
                return Err(UserServiceError::AuthenticationError(
                    "Current password is incorrect".into(),
                ));
            }
        }
        validate_password(new_password)?;

        user.password_hash = Some(hash_password(new_password)?);
        user.updated_at = Utc::now();
        self.user_repo.update(&user).await.context("Failed to update password")?;

        self.session_repo
            .delete_by_user(user_id)
            .await
            .context("Failed to revoke sessions")?;
        self.create_session(user_id).await
    }

    pub async fn list_users(
        &self,
        filter: &UserFilter,
        params: &ListParams,
    ) -> Result<PagedResult<User>, UserServiceError> {
        let (users, total) = self
            .user_repo
            .list(filter, params)
            .await
            .context("Failed to list users")?;
        Ok(PagedResult::new(users, total, params))
    }

    /// Change role or status. Admins cannot demote or ban themselves.
    pub async fn admin_update_user(
        &self,
        actor: &User,
        user_id: i64,
        input: AdminUpdateUserInput,
    ) -> Result<User, UserServiceError> {
        let mut user = self.require_user(user_id).await?;

        if actor.id == user_id {
            if matches!(input.role, Some(role) if role != UserRole::Admin) {
                return Err(UserServiceError::ValidationError("You cannot change your own role".into()));
            }
            if input.status == Some(UserStatus::Banned) {
                return Err(UserServiceError::ValidationError("You cannot ban yourself".into()));
            }
        }

        if let Some(role) = input.role {
            user.role = role;
        }
        let banned_now = input.status == Some(UserStatus::Banned) && !user.is_banned();
        if let Some(status) = input.status {
            user.status = status;
        }
        user.updated_at = Utc::now();

        let updated = self.user_repo.update(&user).await.context("Failed to update user")?;

        if banned_now {
            self.session_repo
                .delete_by_user(user_id)
                .await
                .context("Failed to revoke sessions")?;
            tracing::info!(user_id, by = actor.id, "User banned");
        }
        Ok(updated)
    }

    pub async fn delete_user(&self, actor: &User, user_id: i64) -> Result<(), UserServiceError> {
        if actor.id == user_id {
            return Err(UserServiceError::ValidationError("You cannot delete yourself".into()));
        }
        self.require_user(user_id).await?;
        self.user_repo.delete(user_id).await.context("Failed to delete user")?;
        tracing::info!(user_id, by = actor.id, "User deleted");
        Ok(())
    }

    pub async fn is_first_user(&self) -> Result<bool, UserServiceError> {
        let count = self.user_repo.count().await.context("Failed to count users")?;
        Ok(count == 0)
    }

    pub async fn cleanup_expired_sessions(&self) -> Result<i64, UserServiceError> {
        Ok(self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?)
    }

    async fn require_user(&self, user_id: i64) -> Result<User, UserServiceError> {
        self.user_repo
            .get_by_id(user_id)
            .await
            .context("Failed to get user")?
            .ok_or_else(|| UserServiceError::NotFound(user_id.to_string()))
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

fn validate_password(password: &str) -> Result<(), UserServiceError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(UserServiceError::ValidationError(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxSessionRepository, SqlxUserRepository};
    use crate::db::repositories::test_support::setup_pool;

    async fn setup_service() -> UserService {
        let pool = setup_pool().await;
        UserService::new(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxSessionRepository::boxed(pool),
        )
    }

    #[tokio::test]
    async fn test_first_user_is_admin_then_students() {
        let service = setup_service().await;

        let first = service
            .register(RegisterInput::new("Asha", "Asha@Example.com", "password123"))
            .await
            .unwrap();
        assert_eq!(first.role, UserRole::Admin);
        assert_eq!(first.email, "asha@example.com");

        let second = service
            .register(RegisterInput::new("Ravi", "ravi@example.com", "password123"))
            .await
            .unwrap();
        assert_eq!(second.role, UserRole::Student);
    }

    #[tokio::test]
    async fn test_register_validation() {
        let service = setup_service().await;

        let cases = [
            RegisterInput::new("  ", "a@example.com", "password123"),
            RegisterInput::new("A", "not-an-email", "password123"),
            RegisterInput::new("A", "a@example", "password123"),
            RegisterInput::new("A", "a@example.com", "short"),
        ];
        for input in cases {
            assert!(matches!(
                service.register(input).await,
                Err(UserServiceError::ValidationError(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_duplicate_email_is_conflict_case_insensitively() {
        let service = setup_service().await;
        service
            .register(RegisterInput::new("A", "same@example.com", "password123"))
            .await
            .unwrap();

        let result = service
            .register(RegisterInput::new("B", "SAME@example.com", "password456"))
            .await;
        assert!(matches!(result, Err(UserServiceError::UserExists(_))));
    }

    #[tokio::test]
    async fn test_login_and_session_roundtrip() {
        let service = setup_service().await;
        let user = service
            .register(RegisterInput::new("A", "a@example.com", "password123"))
            .await
            .unwrap();

        let (logged_in, session) = service
            .login(LoginInput::new("A@EXAMPLE.COM", "password123"))
            .await
            .unwrap();
        assert_eq!(logged_in.id, user.id);

        let validated = service.validate_session(&session.id).await.unwrap().unwrap();
        assert_eq!(validated.id, user.id);

        service.logout(&session.id).await.unwrap();
        assert!(service.validate_session(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_user() {
        let service = setup_service().await;
        service
            .register(RegisterInput::new("A", "a@example.com", "password123"))
            .await
            .unwrap();

        assert!(matches!(
            service.login(LoginInput::new("a@example.com", "wrong-password")).await,
            Err(UserServiceError::AuthenticationError(_))
        ));
        assert!(matches!(
            service.login(LoginInput::new("nobody@example.com", "password123")).await,
            Err(UserServiceError::AuthenticationError(_))
        ));
    }

    #[tokio::test]
    async fn test_banned_user_cannot_login_and_loses_sessions() {
        let service = setup_service().await;
        let admin = service
            .register(RegisterInput::new("Admin", "admin@example.com", "password123"))
            .await
            .unwrap();
        let student = service
            .register(RegisterInput::new("S", "s@example.com", "password123"))
            .await
            .unwrap();
        let (_, session) = service
            .login(LoginInput::new("s@example.com", "password123"))
            .await
            .unwrap();

        service
            .admin_update_user(
                &admin,
                student.id,
                AdminUpdateUserInput {
                    role: None,
                    status: Some(UserStatus::Banned),
                },
            )
            .await
            .unwrap();

        assert!(service.validate_session(&session.id).await.unwrap().is_none());
        assert!(matches!(
            service.login(LoginInput::new("s@example.com", "password123")).await,
            Err(UserServiceError::Banned)
        ));
    }

    #[tokio::test]
    async fn test_admin_cannot_demote_ban_or_delete_self() {
        let service = setup_service().await;
        let admin = service
            .register(RegisterInput::new("Admin", "admin@example.com", "password123"))
            .await
            .unwrap();

        let demote = AdminUpdateUserInput {
            role: Some(UserRole::Student),
            status: None,
        };
        assert!(matches!(
            service.admin_update_user(&admin, admin.id, demote).await,
            Err(UserServiceError::ValidationError(_))
        ));

        let ban = AdminUpdateUserInput {
            role: None,
            status: Some(UserStatus::Banned),
        };
        assert!(matches!(
            service.admin_update_user(&admin, admin.id, ban).await,
            Err(UserServiceError::ValidationError(_))
        ));

        assert!(matches!(
            service.delete_user(&admin, admin.id).await,
            Err(UserServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_change_password_revokes_old_sessions() {
        let service = setup_service().await;
        let user = service
            .register(RegisterInput::new("A", "a@example.com", "password123"))
            .await
            .unwrap();
        let (_, old) = service
            .login(LoginInput::new("a@example.com", "password123"))
            .await
            .unwrap();

        assert!(matches!(
            service.change_password(user.id, "wrong-password", "newpassword1").await,
            Err(UserServiceError::AuthenticationError(_))
        ));

        let fresh = service
            .change_password(user.id, "password123", "newpassword1")
            .await
            .unwrap();
        assert!(service.validate_session(&old.id).await.unwrap().is_none());
        assert!(service.validate_session(&fresh.id).await.unwrap().is_some());
        assert!(service.login(LoginInput::new("a@example.com", "newpassword1")).await.is_ok());
    }

    #[tokio::test]
    async fn test_update_profile() {
        let service = setup_service().await;
        let user = service
            .register(RegisterInput::new("A", "a@example.com", "password123"))
            .await
            .unwrap();

        let updated = service
            .update_profile(
                user.id,
                UpdateProfileInput {
                    name: Some("Asha K".into()),
                    image: None,
                    bio: Some("Founder".into()),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Asha K");
        assert_eq!(updated.bio.as_deref(), Some("Founder"));
    }

    #[tokio::test]
    async fn test_oauth_user_has_no_password() {
        let service = setup_service().await;
        let user = service
            .create_oauth_user("", "Dev@Example.com", Some("https://img".into()))
            .await
            .unwrap();
        assert_eq!(user.name, "dev");
        assert!(user.password_hash.is_none());
        assert!(matches!(
            service.login(LoginInput::new("dev@example.com", "anything1")).await,
            Err(UserServiceError::AuthenticationError(_))
        ));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(20))]

            #[test]
            fn normalized_email_is_trimmed_lowercase(local in "[A-Za-z0-9._]{1,12}", domain in "[A-Za-z]{2,10}") {
                let raw = format!("  {}@{}.COM ", local, domain);
                let normalized = normalize_email(&raw);
                prop_assert_eq!(normalized.clone(), normalized.to_lowercase());
                prop_assert!(!normalized.starts_with(' ') && !normalized.ends_with(' '));
                prop_assert!(is_valid_email(&normalized));
            }
        }
    }
}
