//! OAuth repository
//!
//! Linked provider accounts and pending authorization states.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{OAuthAccount, OAuthState};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

#[async_trait]
pub trait OAuthRepository: Send + Sync {
    async fn find_account(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> Result<Option<OAuthAccount>>;

    async fn link_account(
        &self,
        user_id: i64,
        provider: &str,
        provider_account_id: &str,
    ) -> Result<OAuthAccount>;

    async fn save_state(&self, state: &OAuthState) -> Result<()>;

    /// Fetch and delete a state in one go; a state is single-use
    async fn take_state(&self, state: &str) -> Result<Option<OAuthState>>;

    async fn delete_expired_states(&self) -> Result<i64>;
}

pub struct SqlxOAuthRepository {
    pool: DynDatabasePool,
}

impl SqlxOAuthRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn OAuthRepository> {
        Arc::new(Self::new(pool))
    }
}

const SELECT_ACCOUNT: &str = r#"
    SELECT id, user_id, provider, provider_account_id, created_at
    FROM oauth_accounts
    WHERE provider = ? AND provider_account_id = ?
"#;

const INSERT_ACCOUNT: &str = r#"
    INSERT INTO oauth_accounts (user_id, provider, provider_account_id, created_at)
    VALUES (?, ?, ?, ?)
"#;

const INSERT_STATE: &str = r#"
    INSERT INTO oauth_states (state, provider, code_verifier, redirect_to, expires_at)
    VALUES (?, ?, ?, ?, ?)
"#;

const SELECT_STATE: &str = r#"
    SELECT state, provider, code_verifier, redirect_to, expires_at
    FROM oauth_states
    WHERE state = ?
"#;

#[async_trait]
impl OAuthRepository for SqlxOAuthRepository {
    async fn find_account(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> Result<Option<OAuthAccount>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(SELECT_ACCOUNT)
                    .bind(provider)
                    .bind(provider_account_id)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to find OAuth account")?;
                Ok(row.map(|row| OAuthAccount {
                    id: row.get("id"),
                    user_id: row.get("user_id"),
                    provider: row.get("provider"),
                    provider_account_id: row.get("provider_account_id"),
                    created_at: row.get("created_at"),
                }))
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(SELECT_ACCOUNT)
                    .bind(provider)
                    .bind(provider_account_id)
                    .fetch_optional(self.pool.mysql()?)
                    .await
                    .context("Failed to find OAuth account")?;
                Ok(row.map(|row| OAuthAccount {
                    id: row.get("id"),
                    user_id: row.get("user_id"),
                    provider: row.get("provider"),
                    provider_account_id: row.get("provider_account_id"),
                    created_at: row.get("created_at"),
                }))
            }
        }
    }

    async fn link_account(
        &self,
        user_id: i64,
        provider: &str,
        provider_account_id: &str,
    ) -> Result<OAuthAccount> {
        let now = Utc::now();
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => link_account_sqlite(
                self.pool.sqlite()?,
                user_id,
                provider,
                provider_account_id,
            )
            .await?,
            DatabaseDriver::Mysql => {
                link_account_mysql(self.pool.mysql()?, user_id, provider, provider_account_id)
                    .await?
            }
        };

        Ok(OAuthAccount {
            id,
            user_id,
            provider: provider.to_string(),
            provider_account_id: provider_account_id.to_string(),
            created_at: now,
        })
    }

    async fn save_state(&self, state: &OAuthState) -> Result<()> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(INSERT_STATE)
                    .bind(&state.state)
                    .bind(&state.provider)
                    .bind(&state.code_verifier)
                    .bind(&state.redirect_to)
                    .bind(state.expires_at)
                    .execute(self.pool.sqlite()?)
                    .await
                    .context("Failed to save OAuth state")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(INSERT_STATE)
                    .bind(&state.state)
                    .bind(&state.provider)
                    .bind(&state.code_verifier)
                    .bind(&state.redirect_to)
                    .bind(state.expires_at)
                    .execute(self.pool.mysql()?)
                    .await
                    .context("Failed to save OAuth state")?;
            }
        }
        Ok(())
    }

    async fn take_state(&self, state: &str) -> Result<Option<OAuthState>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => take_state_sqlite(self.pool.sqlite()?, state).await,
            DatabaseDriver::Mysql => take_state_mysql(self.pool.mysql()?, state).await,
        }
    }

    async fn delete_expired_states(&self) -> Result<i64> {
        let now = Utc::now();
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query("DELETE FROM oauth_states WHERE expires_at < ?")
                .bind(now)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to delete expired OAuth states")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query("DELETE FROM oauth_states WHERE expires_at < ?")
                .bind(now)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to delete expired OAuth states")?
                .rows_affected(),
        };
        Ok(affected as i64)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn link_account_sqlite(
    pool: &SqlitePool,
    user_id: i64,
    provider: &str,
    provider_account_id: &str,
) -> Result<i64> {
    let result = sqlx::query(INSERT_ACCOUNT)
        .bind(user_id)
        .bind(provider)
        .bind(provider_account_id)
        .bind(Utc::now())
        .execute(pool)
        .await
        .context("Failed to link OAuth account")?;
    Ok(result.last_insert_rowid())
}

async fn take_state_sqlite(pool: &SqlitePool, state: &str) -> Result<Option<OAuthState>> {
    let row = sqlx::query(SELECT_STATE)
        .bind(state)
        .fetch_optional(pool)
        .await
        .context("Failed to load OAuth state")?;

    let Some(row) = row else {
        return Ok(None);
    };

    let deleted = sqlx::query("DELETE FROM oauth_states WHERE state = ?")
        .bind(state)
        .execute(pool)
        .await
        .context("Failed to consume OAuth state")?;

    // Lost a race with a concurrent callback for the same state
    if deleted.rows_affected() == 0 {
        return Ok(None);
    }

    Ok(Some(OAuthState {
        state: row.get("state"),
        provider: row.get("provider"),
        code_verifier: row.get("code_verifier"),
        redirect_to: row.get("redirect_to"),
        expires_at: row.get("expires_at"),
    }))
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn link_account_mysql(
    pool: &MySqlPool,
    user_id: i64,
    provider: &str,
    provider_account_id: &str,
) -> Result<i64> {
    let result = sqlx::query(INSERT_ACCOUNT)
        .bind(user_id)
        .bind(provider)
        .bind(provider_account_id)
        .bind(Utc::now())
        .execute(pool)
        .await
        .context("Failed to link OAuth account")?;
    Ok(result.last_insert_id() as i64)
}

async fn take_state_mysql(pool: &MySqlPool, state: &str) -> Result<Option<OAuthState>> {
    let row = sqlx::query(SELECT_STATE)
        .bind(state)
        .fetch_optional(pool)
        .await
        .context("Failed to load OAuth state")?;

    let Some(row) = row else {
        return Ok(None);
    };

    let deleted = sqlx::query("DELETE FROM oauth_states WHERE state = ?")
        .bind(state)
        .execute(pool)
        .await
        .context("Failed to consume OAuth state")?;

    if deleted.rows_affected() == 0 {
        return Ok(None);
    }

    Ok(Some(OAuthState {
        state: row.get("state"),
        provider: row.get("provider"),
        code_verifier: row.get("code_verifier"),
        redirect_to: row.get("redirect_to"),
        expires_at: row.get("expires_at"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_user, setup_pool};
    use chrono::Duration;

    #[tokio::test]
    async fn test_link_and_find_account() {
        let pool = setup_pool().await;
        let user_id = insert_user(&pool, "o@example.com").await;
        let repo = SqlxOAuthRepository::new(pool);

        assert!(repo.find_account("github", "42").await.unwrap().is_none());
        repo.link_account(user_id, "github", "42").await.unwrap();

        let found = repo.find_account("github", "42").await.unwrap().expect("account");
        assert_eq!(found.user_id, user_id);
        assert!(repo.find_account("google", "42").await.unwrap().is_none());

        let err = repo.link_account(user_id, "github", "42").await.unwrap_err();
        assert!(crate::db::is_unique_violation(&err));
    }

    #[tokio::test]
    async fn test_state_is_single_use() {
        let repo = SqlxOAuthRepository::new(setup_pool().await);
        let state = OAuthState {
            state: "abc".to_string(),
            provider: "google".to_string(),
            code_verifier: "verifier".to_string(),
            redirect_to: Some("/dashboard".to_string()),
            expires_at: Utc::now() + Duration::minutes(10),
        };
        repo.save_state(&state).await.unwrap();

        let taken = repo.take_state("abc").await.unwrap().expect("state");
        assert_eq!(taken.code_verifier, "verifier");
        assert_eq!(taken.redirect_to.as_deref(), Some("/dashboard"));
        assert!(repo.take_state("abc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_expired_states() {
        let repo = SqlxOAuthRepository::new(setup_pool().await);
        for (name, offset) in [("old", -Duration::minutes(1)), ("new", Duration::minutes(5))] {
            repo.save_state(&OAuthState {
                state: name.to_string(),
                provider: "github".to_string(),
                code_verifier: "v".to_string(),
                redirect_to: None,
                expires_at: Utc::now() + offset,
            })
            .await
            .unwrap();
        }

        assert_eq!(repo.delete_expired_states().await.unwrap(), 1);
        assert!(repo.take_state("new").await.unwrap().is_some());
    }
}
