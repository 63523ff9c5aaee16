//! Referral repository
//!
//! Codes (one per user) and the referrals recorded against them.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{ListParams, Referral, ReferralCode};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

#[async_trait]
pub trait ReferralRepository: Send + Sync {
    async fn create_code(&self, code: &ReferralCode) -> Result<ReferralCode>;

    async fn get_code(&self, code: &str) -> Result<Option<ReferralCode>>;

    async fn get_code_by_id(&self, id: i64) -> Result<Option<ReferralCode>>;

    async fn get_code_by_user(&self, user_id: i64) -> Result<Option<ReferralCode>>;

    async fn list_codes(&self, params: &ListParams) -> Result<(Vec<ReferralCode>, i64)>;

    async fn set_active(&self, id: i64, active: bool) -> Result<bool>;

    async fn has_been_referred(&self, referee_id: i64) -> Result<bool>;

    /// Record a redemption atomically: bump `uses` while under `max_uses`,
    /// insert the referral and credit the referrer. Returns false, changing
    /// nothing, when the code is exhausted or the referee/order already
    /// has a referral.
    async fn redeem(&self, referral: &Referral) -> Result<bool>;

    async fn list_referrals_by_referrer(&self, referrer_id: i64) -> Result<Vec<Referral>>;
}

pub struct SqlxReferralRepository {
    pool: DynDatabasePool,
}

impl SqlxReferralRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ReferralRepository> {
        Arc::new(Self::new(pool))
    }

    async fn fetch_code(&self, sql: &str, bind: CodeKey<'_>) -> Result<Option<ReferralCode>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let query = sqlx::query(sql);
                let query = match bind {
                    CodeKey::Id(id) => query.bind(id),
                    CodeKey::Text(text) => query.bind(text),
                };
                Ok(query
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to get referral code")?
                    .as_ref()
                    .map(row_to_code_sqlite))
            }
            DatabaseDriver::Mysql => {
                let query = sqlx::query(sql);
                let query = match bind {
                    CodeKey::Id(id) => query.bind(id),
                    CodeKey::Text(text) => query.bind(text),
                };
                Ok(query
                    .fetch_optional(self.pool.mysql()?)
                    .await
                    .context("Failed to get referral code")?
                    .as_ref()
                    .map(row_to_code_mysql))
            }
        }
    }
}

enum CodeKey<'a> {
    Id(i64),
    Text(&'a str),
}

const CODE_COLUMNS: &str = "id, user_id, code, discount_type, discount_value, max_uses, uses, earned_credit, expires_at, active, created_at";

const INSERT_CODE: &str = r#"
    INSERT INTO referral_codes (user_id, code, discount_type, discount_value, max_uses, uses,
                                earned_credit, expires_at, active, created_at)
    VALUES (?, ?, ?, ?, ?, 0, 0, ?, ?, ?)
"#;

const CLAIM_USE: &str =
    "UPDATE referral_codes SET uses = uses + 1 WHERE id = ? AND active = 1 AND uses < max_uses";

const ADD_CREDIT: &str = "UPDATE referral_codes SET earned_credit = earned_credit + ? WHERE id = ?";

const REFERRAL_COLUMNS: &str = "id, code_id, referrer_id, referee_id, order_id, discount_amount, reward_amount, created_at";

#[async_trait]
impl ReferralRepository for SqlxReferralRepository {
    async fn create_code(&self, code: &ReferralCode) -> Result<ReferralCode> {
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(INSERT_CODE)
                .bind(code.user_id)
                .bind(&code.code)
                .bind(code.discount_type.as_str())
                .bind(code.discount_value)
                .bind(code.max_uses)
                .bind(code.expires_at)
                .bind(code.active)
                .bind(code.created_at)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to create referral code")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(INSERT_CODE)
                .bind(code.user_id)
                .bind(&code.code)
                .bind(code.discount_type.as_str())
                .bind(code.discount_value)
                .bind(code.max_uses)
                .bind(code.expires_at)
                .bind(code.active)
                .bind(code.created_at)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to create referral code")?
                .last_insert_id() as i64,
        };
        Ok(ReferralCode {
            id,
            uses: 0,
            earned_credit: 0,
            ..code.clone()
        })
    }

    async fn get_code(&self, code: &str) -> Result<Option<ReferralCode>> {
        let sql = format!("SELECT {} FROM referral_codes WHERE code = ?", CODE_COLUMNS);
        self.fetch_code(&sql, CodeKey::Text(code)).await
    }

    async fn get_code_by_id(&self, id: i64) -> Result<Option<ReferralCode>> {
        let sql = format!("SELECT {} FROM referral_codes WHERE id = ?", CODE_COLUMNS);
        self.fetch_code(&sql, CodeKey::Id(id)).await
    }

    async fn get_code_by_user(&self, user_id: i64) -> Result<Option<ReferralCode>> {
        let sql = format!("SELECT {} FROM referral_codes WHERE user_id = ?", CODE_COLUMNS);
        self.fetch_code(&sql, CodeKey::Id(user_id)).await
    }

    async fn list_codes(&self, params: &ListParams) -> Result<(Vec<ReferralCode>, i64)> {
        let sql = format!(
            "SELECT {} FROM referral_codes ORDER BY uses DESC, id DESC LIMIT ? OFFSET ?",
            CODE_COLUMNS
        );
        let count_sql = "SELECT COUNT(*) AS count FROM referral_codes";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let pool = self.pool.sqlite()?;
                let rows = sqlx::query(&sql)
                    .bind(params.limit())
                    .bind(params.offset())
                    .fetch_all(pool)
                    .await
                    .context("Failed to list referral codes")?;
                let total: i64 = sqlx::query(count_sql)
                    .fetch_one(pool)
                    .await
                    .context("Failed to count referral codes")?
                    .get("count");
                Ok((rows.iter().map(row_to_code_sqlite).collect(), total))
            }
            DatabaseDriver::Mysql => {
                let pool = self.pool.mysql()?;
                let rows = sqlx::query(&sql)
                    .bind(params.limit())
                    .bind(params.offset())
                    .fetch_all(pool)
                    .await
                    .context("Failed to list referral codes")?;
                let total: i64 = sqlx::query(count_sql)
                    .fetch_one(pool)
                    .await
                    .context("Failed to count referral codes")?
                    .get("count");
                Ok((rows.iter().map(row_to_code_mysql).collect(), total))
            }
        }
    }

    async fn set_active(&self, id: i64, active: bool) -> Result<bool> {
        let affected = execute!(
            self,
            "UPDATE referral_codes SET active = ? WHERE id = ?",
            "Failed to update referral code",
            active,
            id
        );
        Ok(affected > 0)
    }

    async fn has_been_referred(&self, referee_id: i64) -> Result<bool> {
        let sql = "SELECT COUNT(*) AS count FROM referrals WHERE referee_id = ?";
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(referee_id)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to check referral")?
                .get("count"),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(referee_id)
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to check referral")?
                .get("count"),
        };
        Ok(count > 0)
    }

    async fn redeem(&self, referral: &Referral) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => redeem_sqlite(self.pool.sqlite()?, referral).await,
            DatabaseDriver::Mysql => redeem_mysql(self.pool.mysql()?, referral).await,
        }
    }

    async fn list_referrals_by_referrer(&self, referrer_id: i64) -> Result<Vec<Referral>> {
        let sql = format!(
            "SELECT {} FROM referrals WHERE referrer_id = ? ORDER BY created_at DESC, id DESC",
            REFERRAL_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => Ok(sqlx::query(&sql)
                .bind(referrer_id)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to list referrals")?
                .iter()
                .map(|row| Referral {
                    id: row.get("id"),
                    code_id: row.get("code_id"),
                    referrer_id: row.get("referrer_id"),
                    referee_id: row.get("referee_id"),
                    order_id: row.get("order_id"),
                    discount_amount: row.get("discount_amount"),
                    reward_amount: row.get("reward_amount"),
                    created_at: row.get("created_at"),
                })
                .collect()),
            DatabaseDriver::Mysql => Ok(sqlx::query(&sql)
                .bind(referrer_id)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to list referrals")?
                .iter()
                .map(|row| Referral {
                    id: row.get("id"),
                    code_id: row.get("code_id"),
                    referrer_id: row.get("referrer_id"),
                    referee_id: row.get("referee_id"),
                    order_id: row.get("order_id"),
                    discount_amount: row.get("discount_amount"),
                    reward_amount: row.get("reward_amount"),
                    created_at: row.get("created_at"),
                })
                .collect()),
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn redeem_sqlite(pool: &SqlitePool, referral: &Referral) -> Result<bool> {
    let mut tx = pool.begin().await?;

    let claimed = sqlx::query(CLAIM_USE)
        .bind(referral.code_id)
        .execute(&mut *tx)
        .await
        .context("Failed to claim referral use")?
        .rows_affected();
    if claimed == 0 {
        tx.rollback().await?;
        return Ok(false);
    }

    let inserted = sqlx::query(
        r#"
        INSERT OR IGNORE INTO referrals (code_id, referrer_id, referee_id, order_id,
                                         discount_amount, reward_amount, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(referral.code_id)
    .bind(referral.referrer_id)
    .bind(referral.referee_id)
    .bind(referral.order_id)
    .bind(referral.discount_amount)
    .bind(referral.reward_amount)
    .bind(referral.created_at)
    .execute(&mut *tx)
    .await
    .context("Failed to record referral")?
    .rows_affected();
    if inserted == 0 {
        tx.rollback().await?;
        return Ok(false);
    }

    sqlx::query(ADD_CREDIT)
        .bind(referral.reward_amount)
        .bind(referral.code_id)
        .execute(&mut *tx)
        .await
        .context("Failed to credit referrer")?;

    tx.commit().await?;
    Ok(true)
}

fn row_to_code_sqlite(row: &sqlx::sqlite::SqliteRow) -> ReferralCode {
    let discount_type: String = row.get("discount_type");
    ReferralCode {
        id: row.get("id"),
        user_id: row.get("user_id"),
        code: row.get("code"),
        discount_type: discount_type.parse().unwrap_or_default(),
        discount_value: row.get("discount_value"),
        max_uses: row.get("max_uses"),
        uses: row.get("uses"),
        earned_credit: row.get("earned_credit"),
        expires_at: row.get("expires_at"),
        active: row.get("active"),
        created_at: row.get("created_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn redeem_mysql(pool: &MySqlPool, referral: &Referral) -> Result<bool> {
    let mut tx = pool.begin().await?;

    let claimed = sqlx::query(CLAIM_USE)
        .bind(referral.code_id)
        .execute(&mut *tx)
        .await
        .context("Failed to claim referral use")?
        .rows_affected();
    if claimed == 0 {
        tx.rollback().await?;
        return Ok(false);
    }

    let inserted = sqlx::query(
        r#"
        INSERT IGNORE INTO referrals (code_id, referrer_id, referee_id, order_id,
                                      discount_amount, reward_amount, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(referral.code_id)
    .bind(referral.referrer_id)
    .bind(referral.referee_id)
    .bind(referral.order_id)
    .bind(referral.discount_amount)
    .bind(referral.reward_amount)
    .bind(referral.created_at)
    .execute(&mut *tx)
    .await
    .context("Failed to record referral")?
    .rows_affected();
    if inserted == 0 {
        tx.rollback().await?;
        return Ok(false);
    }

    sqlx::query(ADD_CREDIT)
        .bind(referral.reward_amount)
        .bind(referral.code_id)
        .execute(&mut *tx)
        .await
        .context("Failed to credit referrer")?;

    tx.commit().await?;
    Ok(true)
}

fn row_to_code_mysql(row: &sqlx::mysql::MySqlRow) -> ReferralCode {
    let discount_type: String = row.get("discount_type");
    ReferralCode {
        id: row.get("id"),
        user_id: row.get("user_id"),
        code: row.get("code"),
        discount_type: discount_type.parse().unwrap_or_default(),
        discount_value: row.get("discount_value"),
        max_uses: row.get("max_uses"),
        uses: row.get("uses"),
        earned_credit: row.get("earned_credit"),
        expires_at: row.get("expires_at"),
        active: row.get("active"),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_user, setup_pool};
    use crate::models::DiscountType;
    use chrono::Utc;

    fn code(user_id: i64, text: &str, max_uses: i32) -> ReferralCode {
        ReferralCode {
            id: 0,
            user_id,
            code: text.to_string(),
            discount_type: DiscountType::Percent,
            discount_value: 10,
            max_uses,
            uses: 0,
            earned_credit: 0,
            expires_at: None,
            active: true,
            created_at: Utc::now(),
        }
    }

    fn referral(code: &ReferralCode, referee_id: i64, order_id: i64) -> Referral {
        Referral {
            id: 0,
            code_id: code.id,
            referrer_id: code.user_id,
            referee_id,
            order_id,
            discount_amount: 100,
            reward_amount: 90,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_code_lookup() {
        let pool = setup_pool().await;
        let owner = insert_user(&pool, "owner@example.com").await;
        let repo = SqlxReferralRepository::new(pool);

        let created = repo.create_code(&code(owner, "ABCD2345", 5)).await.unwrap();
        assert_eq!(repo.get_code("ABCD2345").await.unwrap().unwrap().id, created.id);
        assert_eq!(repo.get_code_by_user(owner).await.unwrap().unwrap().code, "ABCD2345");
        assert!(repo.get_code("NOPE").await.unwrap().is_none());

        let err = repo.create_code(&code(owner, "ZZZZ9999", 5)).await.unwrap_err();
        assert!(crate::db::is_unique_violation(&err));

        assert!(repo.set_active(created.id, false).await.unwrap());
        assert!(!repo.get_code_by_id(created.id).await.unwrap().unwrap().active);
    }

    #[tokio::test]
    async fn test_redeem_credits_once_per_referee() {
        let pool = setup_pool().await;
        let owner = insert_user(&pool, "owner@example.com").await;
        let friend = insert_user(&pool, "friend@example.com").await;
        let repo = SqlxReferralRepository::new(pool);
        let c = repo.create_code(&code(owner, "FRIENDLY", 5)).await.unwrap();

        assert!(!repo.has_been_referred(friend).await.unwrap());
        assert!(repo.redeem(&referral(&c, friend, 1)).await.unwrap());
        assert!(!repo.redeem(&referral(&c, friend, 2)).await.unwrap());
        assert!(repo.has_been_referred(friend).await.unwrap());

        let after = repo.get_code_by_id(c.id).await.unwrap().unwrap();
        assert_eq!(after.uses, 1);
        assert_eq!(after.earned_credit, 90);
        assert_eq!(repo.list_referrals_by_referrer(owner).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_redeem_respects_max_uses() {
        let pool = setup_pool().await;
        let owner = insert_user(&pool, "owner@example.com").await;
        let a = insert_user(&pool, "a@example.com").await;
        let b = insert_user(&pool, "b@example.com").await;
        let repo = SqlxReferralRepository::new(pool);
        let c = repo.create_code(&code(owner, "ONESHOT1", 1)).await.unwrap();

        assert!(repo.redeem(&referral(&c, a, 1)).await.unwrap());
        assert!(!repo.redeem(&referral(&c, b, 2)).await.unwrap());

        let after = repo.get_code_by_id(c.id).await.unwrap().unwrap();
        assert_eq!(after.uses, 1);
        assert!(after.is_exhausted());
        assert!(!repo.has_been_referred(b).await.unwrap());
    }
}
