//! OAuth sign-in (Google, GitHub)
//!
//! Authorization-code flow with PKCE (S256). The `state` parameter keys a
//! single-use row holding the code verifier for ten minutes. On callback
//! the provider account is matched first, then the email; otherwise a new
//! password-less user is created.

use crate::config::AuthConfig;
use crate::db::is_unique_violation;
use crate::db::repositories::OAuthRepository;
use crate::models::{OAuthState, Session, User};
use crate::services::user::{UserService, UserServiceError};
use anyhow::Context;
use chrono::{Duration, Utc};
use data_encoding::BASE64URL_NOPAD;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

const STATE_TTL_MINUTES: i64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("Unknown OAuth provider: {0}")]
    UnknownProvider(String),

    #[error("Invalid or expired OAuth state")]
    InvalidState,

    #[error("OAuth provider error: {0}")]
    Provider(String),

    #[error("Account is banned")]
    Banned,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<UserServiceError> for OAuthError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::Banned => OAuthError::Banned,
            UserServiceError::InternalError(e) => OAuthError::InternalError(e),
            other => OAuthError::InternalError(anyhow::anyhow!(other.to_string())),
        }
    }
}

/// Identity returned by a provider's user-info endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct OAuthUserInfo {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OAuthProvider {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    pub user_info_url: String,
    /// Extra endpoint listing emails when user info omits one (GitHub)
    pub emails_url: Option<String>,
    pub scopes: Vec<String>,
    pub map_user_info: fn(&Value) -> Option<OAuthUserInfo>,
}

impl OAuthProvider {
    pub fn google(client_id: &str, client_secret: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            user_info_url: "https://www.googleapis.com/oauth2/v3/userinfo".to_string(),
            emails_url: None,
            scopes: vec!["openid".into(), "email".into(), "profile".into()],
            map_user_info: |v| {
                Some(OAuthUserInfo {
                    id: v["sub"].as_str()?.to_string(),
                    email: v["email"].as_str().map(String::from),
                    name: v["name"].as_str().map(String::from),
                    image: v["picture"].as_str().map(String::from),
                })
            },
        }
    }

    pub fn github(client_id: &str, client_secret: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            auth_url: "https://github.com/login/oauth/authorize".to_string(),
            token_url: "https://github.com/login/oauth/access_token".to_string(),
            user_info_url: "https://api.github.com/user".to_string(),
            emails_url: Some("https://api.github.com/user/emails".to_string()),
            scopes: vec!["read:user".into(), "user:email".into()],
            map_user_info: |v| {
                let id = v["id"]
                    .as_i64()
                    .map(|i| i.to_string())
                    .or_else(|| v["id"].as_str().map(String::from))?;
                Some(OAuthUserInfo {
                    id,
                    email: v["email"].as_str().map(String::from),
                    name: v["name"]
                        .as_str()
                        .or_else(|| v["login"].as_str())
                        .map(String::from),
                    image: v["avatar_url"].as_str().map(String::from),
                })
            },
        }
    }
}

/// Fresh PKCE verifier and its S256 challenge
pub fn generate_pkce() -> (String, String) {
    let verifier = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
    (verifier.clone(), pkce_challenge(&verifier))
}

pub fn pkce_challenge(verifier: &str) -> String {
    BASE64URL_NOPAD.encode(&Sha256::digest(verifier.as_bytes()))
}

pub struct OAuthService {
    providers: HashMap<String, OAuthProvider>,
    oauth_repo: Arc<dyn OAuthRepository>,
    users: Arc<UserService>,
    http: reqwest::Client,
    base_url: String,
}

impl OAuthService {
    /// Providers come from the `auth` config; missing credentials leave a
    /// provider unregistered.
    pub fn new(
        config: &AuthConfig,
        base_url: &str,
        oauth_repo: Arc<dyn OAuthRepository>,
        users: Arc<UserService>,
    ) -> Self {
        let mut providers = HashMap::new();
        if let Some(google) = &config.google {
            providers.insert(
                "google".to_string(),
                OAuthProvider::google(&google.client_id, &google.client_secret),
            );
        }
        if let Some(github) = &config.github {
            providers.insert(
                "github".to_string(),
                OAuthProvider::github(&github.client_id, &github.client_secret),
            );
        }

        Self {
            providers,
            oauth_repo,
            users,
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn with_provider(mut self, name: &str, provider: OAuthProvider) -> Self {
        self.providers.insert(name.to_string(), provider);
        self
    }

    pub fn provider_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn provider(&self, name: &str) -> Result<&OAuthProvider, OAuthError> {
        self.providers
            .get(name)
            .ok_or_else(|| OAuthError::UnknownProvider(name.to_string()))
    }

    fn callback_url(&self, provider: &str) -> String {
        format!("{}/api/v1/auth/oauth/{}/callback", self.base_url, provider)
    }

    /// Start a sign-in: persist state + verifier, return the provider URL
    pub async fn authorization_url(
        &self,
        provider_name: &str,
        redirect_to: Option<String>,
    ) -> Result<String, OAuthError> {
        let provider = self.provider(provider_name)?;
        let (code_verifier, code_challenge) = generate_pkce();
        let state = Uuid::new_v4().simple().to_string();

        self.oauth_repo
            .save_state(&OAuthState {
                state: state.clone(),
                provider: provider_name.to_string(),
                code_verifier,
                redirect_to,
                expires_at: Utc::now() + Duration::minutes(STATE_TTL_MINUTES),
            })
            .await
            .context("Failed to save OAuth state")?;

        Ok(format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}&code_challenge={}&code_challenge_method=S256",
            provider.auth_url,
            urlencoding::encode(&provider.client_id),
            urlencoding::encode(&self.callback_url(provider_name)),
            urlencoding::encode(&provider.scopes.join(" ")),
            urlencoding::encode(&state),
            urlencoding::encode(&code_challenge),
        ))
    }

    /// Finish a sign-in. Returns the user, a new session and the
    /// `redirect_to` captured when the flow started.
    pub async fn handle_callback(
        &self,
        provider_name: &str,
        code: &str,
        state: &str,
    ) -> Result<(User, Session, Option<String>), OAuthError> {
        let provider = self.provider(provider_name)?;

        let saved = self
            .oauth_repo
            .take_state(state)
            .await
            .context("Failed to load OAuth state")?
            .ok_or(OAuthError::InvalidState)?;
        if saved.is_expired() || saved.provider != provider_name {
            return Err(OAuthError::InvalidState);
        }

        let access_token = self
            .exchange_code(provider, provider_name, code, &saved.code_verifier)
            .await?;
        let info = self.fetch_user_info(provider, &access_token).await?;

        let user = self.resolve_user(provider_name, &info).await?;
        if user.is_banned() {
            return Err(OAuthError::Banned);
        }

        let session = self.users.create_session(user.id).await?;
        tracing::info!(user_id = user.id, provider = provider_name, "OAuth sign-in");
        Ok((user, session, saved.redirect_to))
    }

    pub async fn cleanup_expired_states(&self) -> Result<i64, OAuthError> {
        Ok(self
            .oauth_repo
            .delete_expired_states()
            .await
            .context("Failed to delete expired OAuth states")?)
    }

    async fn exchange_code(
        &self,
        provider: &OAuthProvider,
        provider_name: &str,
        code: &str,
        code_verifier: &str,
    ) -> Result<String, OAuthError> {
        let callback_url = self.callback_url(provider_name);
        let response = self
            .http
            .post(&provider.token_url)
            .header("Accept", "application/json")
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", callback_url.as_str()),
                ("client_id", provider.client_id.as_str()),
                ("client_secret", provider.client_secret.as_str()),
                ("code_verifier", code_verifier),
            ])
            .send()
            .await
            .map_err(|e| OAuthError::Provider(format!("Token exchange failed: {}", e)))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OAuthError::Provider(format!("Token exchange returned error: {}", body)));
        }

        let token: Value = response
            .json()
            .await
            .map_err(|e| OAuthError::Provider(format!("Failed to parse token response: {}", e)))?;
        token["access_token"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| OAuthError::Provider("Missing access_token in token response".into()))
    }

    async fn fetch_user_info(&self, provider: &OAuthProvider, access_token: &str) -> Result<OAuthUserInfo, OAuthError> {
        let json = self.get_json(&provider.user_info_url, access_token).await?;
        let mut info = (provider.map_user_info)(&json)
            .ok_or_else(|| OAuthError::Provider("Unexpected user info response".into()))?;

        if info.email.is_none() {
            if let Some(emails_url) = &provider.emails_url {
                let emails = self.get_json(emails_url, access_token).await?;
                info.email = primary_verified_email(&emails);
            }
        }
        Ok(info)
    }

    async fn get_json(&self, url: &str, access_token: &str) -> Result<Value, OAuthError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .header("Accept", "application/json")
            .header("User-Agent", "kalpla")
            .send()
            .await
            .map_err(|e| OAuthError::Provider(format!("Failed to fetch user info: {}", e)))?;

        if !response.status().is_success() {
            return Err(OAuthError::Provider(format!(
                "User info request failed with status {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| OAuthError::Provider(format!("Failed to parse user info: {}", e)))
    }

    /// Linked account, else account with the same email, else a new user
    pub async fn resolve_user(&self, provider_name: &str, info: &OAuthUserInfo) -> Result<User, OAuthError> {
        if let Some(user) = self.linked_user(provider_name, &info.id).await? {
            return Ok(user);
        }

        let email = info
            .email
            .as_deref()
            .ok_or_else(|| OAuthError::Provider("Provider did not return an email address".into()))?;

        let user = match self.users.get_by_email(email).await? {
            Some(existing) => existing,
            None => {
                self.users
                    .create_oauth_user(info.name.as_deref().unwrap_or(""), email, info.image.clone())
                    .await?
            }
        };

        match self.oauth_repo.link_account(user.id, provider_name, &info.id).await {
            Ok(_) => Ok(user),
            // A concurrent callback linked it first
            Err(e) if is_unique_violation(&e) => self
                .linked_user(provider_name, &info.id)
                .await?
                .ok_or_else(|| OAuthError::InternalError(e)),
            Err(e) => Err(OAuthError::InternalError(e)),
        }
    }

    async fn linked_user(&self, provider_name: &str, account_id: &str) -> Result<Option<User>, OAuthError> {
        let account = self
            .oauth_repo
            .find_account(provider_name, account_id)
            .await
            .context("Failed to look up OAuth account")?;
        match account {
            Some(account) => Ok(self.users.get_by_id(account.user_id).await?),
            None => Ok(None),
        }
    }
}

fn primary_verified_email(emails: &Value) -> Option<String> {
    let list = emails.as_array()?;
    list.iter()
        .find(|e| e["primary"].as_bool() == Some(true) && e["verified"].as_bool() == Some(true))
        .or_else(|| list.iter().find(|e| e["verified"].as_bool() == Some(true)))
        .and_then(|e| e["email"].as_str())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OAuthClientConfig;
    use crate::db::repositories::test_support::setup_pool;
    use crate::db::repositories::{SqlxOAuthRepository, SqlxSessionRepository, SqlxUserRepository};
    use serde_json::json;

    async fn setup_service() -> OAuthService {
        let pool = setup_pool().await;
        let users = Arc::new(UserService::new(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxSessionRepository::boxed(pool.clone()),
        ));
        let config = AuthConfig {
            github: Some(OAuthClientConfig {
                client_id: "gh-client".into(),
                client_secret: "gh-secret".into(),
            }),
            ..AuthConfig::default()
        };
        OAuthService::new(&config, "http://localhost:8080/", SqlxOAuthRepository::boxed(pool), users)
    }

    #[test]
    fn test_pkce_challenge_rfc7636_vector() {
        assert_eq!(
            pkce_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_generated_verifier_shape() {
        let (verifier, challenge) = generate_pkce();
        assert_eq!(verifier.len(), 64);
        assert_eq!(challenge, pkce_challenge(&verifier));
        assert!(!challenge.contains('='));
    }

    #[test]
    fn test_map_provider_user_info() {
        let google = OAuthProvider::google("id", "secret");
        let info = (google.map_user_info)(&json!({
            "sub": "1098",
            "email": "a@example.com",
            "name": "Asha",
            "picture": "https://img"
        }))
        .unwrap();
        assert_eq!(info.id, "1098");
        assert_eq!(info.email.as_deref(), Some("a@example.com"));

        let github = OAuthProvider::github("id", "secret");
        let info = (github.map_user_info)(&json!({"id": 42, "login": "asha", "email": null})).unwrap();
        assert_eq!(info.id, "42");
        assert_eq!(info.name.as_deref(), Some("asha"));
        assert!(info.email.is_none());

        assert!((github.map_user_info)(&json!({"login": "no-id"})).is_none());
    }

    #[test]
    fn test_primary_verified_email() {
        let emails = json!([
            {"email": "old@example.com", "primary": false, "verified": true},
            {"email": "main@example.com", "primary": true, "verified": true}
        ]);
        assert_eq!(primary_verified_email(&emails).as_deref(), Some("main@example.com"));
        assert_eq!(primary_verified_email(&json!([{"email": "x", "verified": false}])), None);
    }

    #[tokio::test]
    async fn test_authorization_url_and_unknown_provider() {
        let service = setup_service().await;
        assert_eq!(service.provider_names(), vec!["github"]);

        let url = service.authorization_url("github", None).await.unwrap();
        assert!(url.starts_with("https://github.com/login/oauth/authorize?client_id=gh-client"));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains(&*urlencoding::encode(
            "http://localhost:8080/api/v1/auth/oauth/github/callback"
        )));

        assert!(matches!(
            service.authorization_url("google", None).await,
            Err(OAuthError::UnknownProvider(_))
        ));
    }

    #[tokio::test]
    async fn test_callback_rejects_unknown_state() {
        let service = setup_service().await;
        let result = service.handle_callback("github", "code", "never-issued").await;
        assert!(matches!(result, Err(OAuthError::InvalidState)));
    }

    #[tokio::test]
    async fn test_resolve_user_links_by_email_then_by_account() {
        let service = setup_service().await;
        let existing = service
            .users
            .create_oauth_user("Asha", "asha@example.com", None)
            .await
            .unwrap();

        let info = OAuthUserInfo {
            id: "gh-42".into(),
            email: Some("Asha@Example.com".into()),
            name: Some("Asha".into()),
            image: None,
        };
        let first = service.resolve_user("github", &info).await.unwrap();
        assert_eq!(first.id, existing.id);

        // Email changed at the provider; the link still finds the user
        let moved = OAuthUserInfo {
            email: Some("new@example.com".into()),
            ..info
        };
        let second = service.resolve_user("github", &moved).await.unwrap();
        assert_eq!(second.id, existing.id);
    }

    #[tokio::test]
    async fn test_resolve_user_creates_account() {
        let service = setup_service().await;
        let info = OAuthUserInfo {
            id: "g-1".into(),
            email: Some("new@example.com".into()),
            name: None,
            image: Some("https://img".into()),
        };
        let user = service.resolve_user("google", &info).await.unwrap();
        assert_eq!(user.email, "new@example.com");
        assert_eq!(user.image.as_deref(), Some("https://img"));
    }
}
