//! Subscription repository
//!
//! Plans store their feature list as a JSON array in a text column.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{SubscriptionPlan, SubscriptionStatus, UserSubscription};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::sync::Arc;

#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    async fn create_plan(&self, plan: &SubscriptionPlan) -> Result<SubscriptionPlan>;

    async fn get_plan(&self, id: i64) -> Result<Option<SubscriptionPlan>>;

    async fn update_plan(&self, plan: &SubscriptionPlan) -> Result<SubscriptionPlan>;

    async fn delete_plan(&self, id: i64) -> Result<()>;

    /// Plans by price; `active_only` hides retired plans
    async fn list_plans(&self, active_only: bool) -> Result<Vec<SubscriptionPlan>>;

    async fn create_subscription(&self, subscription: &UserSubscription) -> Result<UserSubscription>;

    /// The active subscription with the latest expiry still after `now`
    async fn current_for_user(&self, user_id: i64, now: DateTime<Utc>) -> Result<Option<UserSubscription>>;

    async fn cancel_by_order(&self, order_id: i64) -> Result<u64>;

    /// Flip lapsed active subscriptions to `expired`
    async fn expire_lapsed(&self, now: DateTime<Utc>) -> Result<u64>;
}

pub struct SqlxSubscriptionRepository {
    pool: DynDatabasePool,
}

impl SqlxSubscriptionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SubscriptionRepository> {
        Arc::new(Self::new(pool))
    }
}

const PLAN_COLUMNS: &str =
    "id, slug, name, description, price, currency, interval_days, features, active, created_at, updated_at";

const INSERT_PLAN: &str = r#"
    INSERT INTO subscription_plans (slug, name, description, price, currency, interval_days,
                                    features, active, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

const UPDATE_PLAN: &str = r#"
    UPDATE subscription_plans
    SET slug = ?, name = ?, description = ?, price = ?, currency = ?, interval_days = ?,
        features = ?, active = ?, updated_at = ?
    WHERE id = ?
"#;

const SUBSCRIPTION_COLUMNS: &str =
    "id, user_id, plan_id, order_id, starts_at, expires_at, status, created_at";

const INSERT_SUBSCRIPTION: &str = r#"
    INSERT INTO user_subscriptions (user_id, plan_id, order_id, starts_at, expires_at, status, created_at)
    VALUES (?, ?, ?, ?, ?, ?, ?)
"#;

fn encode_features(features: &[String]) -> Result<String> {
    serde_json::to_string(features).context("Failed to encode plan features")
}

fn decode_features(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

#[async_trait]
impl SubscriptionRepository for SqlxSubscriptionRepository {
    async fn create_plan(&self, plan: &SubscriptionPlan) -> Result<SubscriptionPlan> {
        let features = encode_features(&plan.features)?;
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(INSERT_PLAN)
                .bind(&plan.slug)
                .bind(&plan.name)
                .bind(&plan.description)
                .bind(plan.price)
                .bind(&plan.currency)
                .bind(plan.interval_days)
                .bind(&features)
                .bind(plan.active)
                .bind(plan.created_at)
                .bind(plan.updated_at)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to create plan")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(INSERT_PLAN)
                .bind(&plan.slug)
                .bind(&plan.name)
                .bind(&plan.description)
                .bind(plan.price)
                .bind(&plan.currency)
                .bind(plan.interval_days)
                .bind(&features)
                .bind(plan.active)
                .bind(plan.created_at)
                .bind(plan.updated_at)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to create plan")?
                .last_insert_id() as i64,
        };
        Ok(SubscriptionPlan { id, ..plan.clone() })
    }

    async fn get_plan(&self, id: i64) -> Result<Option<SubscriptionPlan>> {
        let sql = format!("SELECT {} FROM subscription_plans WHERE id = ?", PLAN_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => Ok(sqlx::query(&sql)
                .bind(id)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get plan")?
                .as_ref()
                .map(row_to_plan_sqlite)),
            DatabaseDriver::Mysql => Ok(sqlx::query(&sql)
                .bind(id)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get plan")?
                .as_ref()
                .map(row_to_plan_mysql)),
        }
    }

    async fn update_plan(&self, plan: &SubscriptionPlan) -> Result<SubscriptionPlan> {
        let features = encode_features(&plan.features)?;
        let now = Utc::now();
        execute!(
            self,
            UPDATE_PLAN,
            "Failed to update plan",
            &plan.slug,
            &plan.name,
            &plan.description,
            plan.price,
            &plan.currency,
            plan.interval_days,
            &features,
            plan.active,
            now,
            plan.id
        );
        Ok(SubscriptionPlan {
            updated_at: now,
            ..plan.clone()
        })
    }

    async fn delete_plan(&self, id: i64) -> Result<()> {
        execute!(self, "DELETE FROM subscription_plans WHERE id = ?", "Failed to delete plan", id);
        Ok(())
    }

    async fn list_plans(&self, active_only: bool) -> Result<Vec<SubscriptionPlan>> {
        let sql = format!(
            "SELECT {} FROM subscription_plans WHERE (? = 0 OR active = 1) ORDER BY price, id",
            PLAN_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => Ok(sqlx::query(&sql)
                .bind(active_only)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to list plans")?
                .iter()
                .map(row_to_plan_sqlite)
                .collect()),
            DatabaseDriver::Mysql => Ok(sqlx::query(&sql)
                .bind(active_only)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to list plans")?
                .iter()
                .map(row_to_plan_mysql)
                .collect()),
        }
    }

    async fn create_subscription(&self, subscription: &UserSubscription) -> Result<UserSubscription> {
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(INSERT_SUBSCRIPTION)
                .bind(subscription.user_id)
                .bind(subscription.plan_id)
                .bind(subscription.order_id)
                .bind(subscription.starts_at)
                .bind(subscription.expires_at)
                .bind(subscription.status.as_str())
                .bind(subscription.created_at)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to create subscription")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(INSERT_SUBSCRIPTION)
                .bind(subscription.user_id)
                .bind(subscription.plan_id)
                .bind(subscription.order_id)
                .bind(subscription.starts_at)
                .bind(subscription.expires_at)
                .bind(subscription.status.as_str())
                .bind(subscription.created_at)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to create subscription")?
                .last_insert_id() as i64,
        };
        Ok(UserSubscription { id, ..subscription.clone() })
    }

    async fn current_for_user(&self, user_id: i64, now: DateTime<Utc>) -> Result<Option<UserSubscription>> {
        let sql = format!(
            r#"
            SELECT {} FROM user_subscriptions
            WHERE user_id = ? AND status = 'active' AND expires_at > ?
            ORDER BY expires_at DESC
            LIMIT 1
            "#,
            SUBSCRIPTION_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => Ok(sqlx::query(&sql)
                .bind(user_id)
                .bind(now)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get current subscription")?
                .map(|row| {
                    let status: String = row.get("status");
                    UserSubscription {
                        id: row.get("id"),
                        user_id: row.get("user_id"),
                        plan_id: row.get("plan_id"),
                        order_id: row.get("order_id"),
                        starts_at: row.get("starts_at"),
                        expires_at: row.get("expires_at"),
                        status: status.parse().unwrap_or_default(),
                        created_at: row.get("created_at"),
                    }
                })),
            DatabaseDriver::Mysql => Ok(sqlx::query(&sql)
                .bind(user_id)
                .bind(now)
                .fetch_optional(self.pool.mysql()?)
                .await
                .context("Failed to get current subscription")?
                .map(|row| {
                    let status: String = row.get("status");
                    UserSubscription {
                        id: row.get("id"),
                        user_id: row.get("user_id"),
                        plan_id: row.get("plan_id"),
                        order_id: row.get("order_id"),
                        starts_at: row.get("starts_at"),
                        expires_at: row.get("expires_at"),
                        status: status.parse().unwrap_or_default(),
                        created_at: row.get("created_at"),
                    }
                })),
        }
    }

    async fn cancel_by_order(&self, order_id: i64) -> Result<u64> {
        Ok(execute!(
            self,
            "UPDATE user_subscriptions SET status = ? WHERE order_id = ? AND status = 'active'",
            "Failed to cancel subscription",
            SubscriptionStatus::Cancelled.as_str(),
            order_id
        ))
    }

    async fn expire_lapsed(&self, now: DateTime<Utc>) -> Result<u64> {
        Ok(execute!(
            self,
            "UPDATE user_subscriptions SET status = ? WHERE status = 'active' AND expires_at <= ?",
            "Failed to expire subscriptions",
            SubscriptionStatus::Expired.as_str(),
            now
        ))
    }
}

fn row_to_plan_sqlite(row: &sqlx::sqlite::SqliteRow) -> SubscriptionPlan {
    let features: String = row.get("features");
    SubscriptionPlan {
        id: row.get("id"),
        slug: row.get("slug"),
        name: row.get("name"),
        description: row.get("description"),
        price: row.get("price"),
        currency: row.get("currency"),
        interval_days: row.get("interval_days"),
        features: decode_features(&features),
        active: row.get("active"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_plan_mysql(row: &sqlx::mysql::MySqlRow) -> SubscriptionPlan {
    let features: String = row.get("features");
    SubscriptionPlan {
        id: row.get("id"),
        slug: row.get("slug"),
        name: row.get("name"),
        description: row.get("description"),
        price: row.get("price"),
        currency: row.get("currency"),
        interval_days: row.get("interval_days"),
        features: decode_features(&features),
        active: row.get("active"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_user, setup_pool};
    use chrono::Duration;

    fn plan(slug: &str, price: i64, active: bool) -> SubscriptionPlan {
        let now = Utc::now();
        SubscriptionPlan {
            id: 0,
            slug: slug.to_string(),
            name: slug.to_uppercase(),
            description: String::new(),
            price,
            currency: "INR".to_string(),
            interval_days: 30,
            features: vec!["All courses".to_string(), "Monthly AMA".to_string()],
            active,
            created_at: now,
            updated_at: now,
        }
    }

    fn subscription(user_id: i64, plan_id: i64, order_id: i64, expires_at: DateTime<Utc>) -> UserSubscription {
        UserSubscription {
            id: 0,
            user_id,
            plan_id,
            order_id: Some(order_id),
            starts_at: Utc::now(),
            expires_at,
            status: SubscriptionStatus::Active,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_plans_roundtrip_features_and_filter_active() {
        let repo = SqlxSubscriptionRepository::new(setup_pool().await);
        let pro = repo.create_plan(&plan("pro", 99900, true)).await.unwrap();
        repo.create_plan(&plan("legacy", 49900, false)).await.unwrap();

        let loaded = repo.get_plan(pro.id).await.unwrap().unwrap();
        assert_eq!(loaded.features, vec!["All courses", "Monthly AMA"]);

        assert_eq!(repo.list_plans(true).await.unwrap().len(), 1);
        let all = repo.list_plans(false).await.unwrap();
        assert_eq!(all[0].slug, "legacy");
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_current_subscription_and_cancel() {
        let pool = setup_pool().await;
        let user = insert_user(&pool, "sub@example.com").await;
        let repo = SqlxSubscriptionRepository::new(pool);
        let p = repo.create_plan(&plan("pro", 99900, true)).await.unwrap();
        let now = Utc::now();

        repo.create_subscription(&subscription(user, p.id, 1, now + Duration::days(30)))
            .await
            .unwrap();
        let later = repo
            .create_subscription(&subscription(user, p.id, 2, now + Duration::days(60)))
            .await
            .unwrap();

        let current = repo.current_for_user(user, now).await.unwrap().unwrap();
        assert_eq!(current.id, later.id);

        assert_eq!(repo.cancel_by_order(2).await.unwrap(), 1);
        let current = repo.current_for_user(user, now).await.unwrap().unwrap();
        assert_eq!(current.order_id, Some(1));
    }

    #[tokio::test]
    async fn test_expire_lapsed() {
        let pool = setup_pool().await;
        let user = insert_user(&pool, "sub@example.com").await;
        let repo = SqlxSubscriptionRepository::new(pool);
        let p = repo.create_plan(&plan("pro", 99900, true)).await.unwrap();
        let now = Utc::now();

        repo.create_subscription(&subscription(user, p.id, 1, now - Duration::days(1)))
            .await
            .unwrap();
        assert_eq!(repo.expire_lapsed(now).await.unwrap(), 1);
        assert!(repo.current_for_user(user, now).await.unwrap().is_none());
    }
}
