//! Subscription plans
//!
//! Plans are bought through the payment flow. A purchase starts a new
//! period, or extends the current one from its expiry.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::cache::{keys, CacheLayer, SharedCache};
use crate::db::is_unique_violation;
use crate::db::repositories::SubscriptionRepository;
use crate::models::{
    normalize_currency, CreatePlanInput, SubscriptionPlan, SubscriptionStatus, UpdatePlanInput,
    UserSubscription, DEFAULT_CURRENCY,
};
use crate::services::slug::resolve_slug;

#[derive(Debug, thiserror::Error)]
pub enum SubscriptionServiceError {
    #[error("Plan not found: {0}")]
    NotFound(i64),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Plan slug already exists: {0}")]
    SlugExists(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct SubscriptionService {
    repo: Arc<dyn SubscriptionRepository>,
    cache: SharedCache,
    cache_ttl: Duration,
}

impl SubscriptionService {
    pub fn new(repo: Arc<dyn SubscriptionRepository>, cache: SharedCache) -> Self {
        let cache_ttl = cache.default_ttl();
        Self { repo, cache, cache_ttl }
    }

    /// Plans open for purchase
    pub async fn list_active(&self) -> Result<Vec<SubscriptionPlan>, SubscriptionServiceError> {
        if let Some(cached) = self
            .cache
            .get::<Vec<SubscriptionPlan>>(keys::PLANS_ACTIVE)
            .await
            .ok()
            .flatten()
        {
            return Ok(cached);
        }

        let plans = self.repo.list_plans(true).await?;
        let _ = self.cache.set(keys::PLANS_ACTIVE, &plans, self.cache_ttl).await;
        Ok(plans)
    }

    pub async fn list_all(&self) -> Result<Vec<SubscriptionPlan>, SubscriptionServiceError> {
        Ok(self.repo.list_plans(false).await?)
    }

    pub async fn get_plan(&self, id: i64) -> Result<SubscriptionPlan, SubscriptionServiceError> {
        self.repo
            .get_plan(id)
            .await?
            .ok_or(SubscriptionServiceError::NotFound(id))
    }

    pub async fn create_plan(&self, input: CreatePlanInput) -> Result<SubscriptionPlan, SubscriptionServiceError> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(SubscriptionServiceError::ValidationError("Plan name cannot be empty".into()));
        }
        let slug = resolve_slug(input.slug.as_deref(), name)
            .ok_or_else(|| SubscriptionServiceError::ValidationError("Slug cannot be empty".into()))?;
        validate_price(input.price)?;
        validate_interval(input.interval_days)?;

        let now = Utc::now();
        let plan = SubscriptionPlan {
            id: 0,
            slug: slug.clone(),
            name: name.to_string(),
            description: input.description.trim().to_string(),
            price: input.price,
            currency: resolve_currency(input.currency.as_deref())?,
            interval_days: input.interval_days,
            features: clean_features(input.features),
            active: input.active,
            created_at: now,
            updated_at: now,
        };

        let created = self.repo.create_plan(&plan).await.map_err(|e| {
            if is_unique_violation(&e) {
                SubscriptionServiceError::SlugExists(slug)
            } else {
                SubscriptionServiceError::InternalError(e)
            }
        })?;
        self.invalidate().await;
        tracing::info!(plan_id = created.id, slug = %created.slug, "Subscription plan created");
        Ok(created)
    }

    pub async fn update_plan(&self, id: i64, input: UpdatePlanInput) -> Result<SubscriptionPlan, SubscriptionServiceError> {
        let mut plan = self.get_plan(id).await?;

        if let Some(name) = input.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(SubscriptionServiceError::ValidationError("Plan name cannot be empty".into()));
            }
            plan.name = name.to_string();
        }
        if let Some(description) = input.description {
            plan.description = description.trim().to_string();
        }
        if let Some(price) = input.price {
            validate_price(price)?;
            plan.price = price;
        }
        if let Some(currency) = input.currency {
            plan.currency = resolve_currency(Some(&currency))?;
        }
        if let Some(interval) = input.interval_days {
            validate_interval(interval)?;
            plan.interval_days = interval;
        }
        if let Some(features) = input.features {
            plan.features = clean_features(features);
        }
        if let Some(active) = input.active {
            plan.active = active;
        }
        plan.updated_at = Utc::now();

        let updated = self.repo.update_plan(&plan).await?;
        self.invalidate().await;
        Ok(updated)
    }

    pub async fn delete_plan(&self, id: i64) -> Result<(), SubscriptionServiceError> {
        self.get_plan(id).await?;
        self.repo.delete_plan(id).await?;
        self.invalidate().await;
        tracing::info!(plan_id = id, "Subscription plan deleted");
        Ok(())
    }

    /// Active, unexpired subscription of a user
    pub async fn current_for_user(&self, user_id: i64) -> Result<Option<UserSubscription>, SubscriptionServiceError> {
        Ok(self.repo.current_for_user(user_id, Utc::now()).await?)
    }

    /// Start or extend a subscription after `order_id` was paid
    pub async fn fulfil(
        &self,
        user_id: i64,
        plan_id: i64,
        order_id: i64,
    ) -> Result<UserSubscription, SubscriptionServiceError> {
        let plan = self.get_plan(plan_id).await?;
        let now = Utc::now();
        let current = self.repo.current_for_user(user_id, now).await?;
        let starts_at = period_start(current.as_ref(), now);

        let subscription = self
            .repo
            .create_subscription(&UserSubscription {
                id: 0,
                user_id,
                plan_id,
                order_id: Some(order_id),
                starts_at,
                expires_at: starts_at + chrono::Duration::days(i64::from(plan.interval_days)),
                status: SubscriptionStatus::Active,
                created_at: now,
            })
            .await?;

        tracing::info!(
            user_id,
            plan_id,
            order_id,
            expires_at = %subscription.expires_at,
            "Subscription started"
        );
        Ok(subscription)
    }

    /// Cancel whatever a refunded order granted
    pub async fn cancel_by_order(&self, order_id: i64) -> Result<u64, SubscriptionServiceError> {
        Ok(self.repo.cancel_by_order(order_id).await?)
    }

    /// Flip lapsed subscriptions to `expired`
    pub async fn expire_lapsed(&self) -> Result<u64, SubscriptionServiceError> {
        Ok(self.repo.expire_lapsed(Utc::now()).await?)
    }

    async fn invalidate(&self) {
        let _ = self.cache.delete(keys::PLANS_ACTIVE).await;
    }
}

/// New periods queue behind the current one
pub fn period_start(current: Option<&UserSubscription>, now: DateTime<Utc>) -> DateTime<Utc> {
    match current {
        Some(sub) if sub.is_current_at(now) => sub.expires_at,
        _ => now,
    }
}

fn validate_price(price: i64) -> Result<(), SubscriptionServiceError> {
    if price < 0 {
        return Err(SubscriptionServiceError::ValidationError("Price cannot be negative".into()));
    }
    Ok(())
}

fn validate_interval(days: i32) -> Result<(), SubscriptionServiceError> {
    if days <= 0 {
        return Err(SubscriptionServiceError::ValidationError(
            "Interval must be at least one day".into(),
        ));
    }
    Ok(())
}

fn resolve_currency(code: Option<&str>) -> Result<String, SubscriptionServiceError> {
    match code {
        None => Ok(DEFAULT_CURRENCY.to_string()),
        Some(code) => normalize_currency(code)
            .ok_or_else(|| SubscriptionServiceError::ValidationError(format!("Invalid currency: {}", code))),
    }
}

fn clean_features(features: Vec<String>) -> Vec<String> {
    features
        .into_iter()
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::db::repositories::test_support::{insert_user, setup_pool};
    use crate::db::repositories::SqlxSubscriptionRepository;
    use crate::db::DynDatabasePool;

    async fn setup() -> (SubscriptionService, DynDatabasePool) {
        let pool = setup_pool().await;
        let service = SubscriptionService::new(
            SqlxSubscriptionRepository::boxed(pool.clone()),
            Arc::new(MemoryCache::new()),
        );
        (service, pool)
    }

    fn plan_input(name: &str, active: bool) -> CreatePlanInput {
        CreatePlanInput {
            slug: None,
            name: name.into(),
            description: "All courses".into(),
            price: 49_900,
            currency: None,
            interval_days: 30,
            features: vec!["Every course".into(), "  ".into()],
            active,
        }
    }

    #[tokio::test]
    async fn test_plan_crud_and_active_cache() {
        let (service, _pool) = setup().await;

        let monthly = service.create_plan(plan_input("Monthly", true)).await.unwrap();
        assert_eq!(monthly.slug, "monthly");
        assert_eq!(monthly.currency, "INR");
        assert_eq!(monthly.features, vec!["Every course".to_string()]);
        service.create_plan(plan_input("Legacy", false)).await.unwrap();

        assert!(matches!(
            service.create_plan(plan_input("Monthly", true)).await,
            Err(SubscriptionServiceError::SlugExists(_))
        ));

        assert_eq!(service.list_active().await.unwrap().len(), 1);
        assert_eq!(service.list_all().await.unwrap().len(), 2);

        // Writes drop the cached list
        service
            .update_plan(monthly.id, UpdatePlanInput { active: Some(false), ..Default::default() })
            .await
            .unwrap();
        assert!(service.list_active().await.unwrap().is_empty());

        service.delete_plan(monthly.id).await.unwrap();
        assert!(matches!(
            service.get_plan(monthly.id).await,
            Err(SubscriptionServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_invalid_plans() {
        let (service, _pool) = setup().await;
        let mut input = plan_input("Bad", true);
        input.interval_days = 0;
        assert!(matches!(
            service.create_plan(input).await,
            Err(SubscriptionServiceError::ValidationError(_))
        ));

        let mut input = plan_input("Bad", true);
        input.currency = Some("rupees".into());
        assert!(matches!(
            service.create_plan(input).await,
            Err(SubscriptionServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_fulfil_extends_current_period() {
        let (service, pool) = setup().await;
        let user_id = insert_user(&pool, "sub@example.com").await;
        let plan = service.create_plan(plan_input("Monthly", true)).await.unwrap();

        let first = service.fulfil(user_id, plan.id, 1).await.unwrap();
        let second = service.fulfil(user_id, plan.id, 2).await.unwrap();
        assert_eq!(second.starts_at, first.expires_at);
        assert_eq!(second.expires_at - first.expires_at, chrono::Duration::days(30));

        let current = service.current_for_user(user_id).await.unwrap().unwrap();
        assert!(current.is_current_at(Utc::now()));

        assert_eq!(service.cancel_by_order(1).await.unwrap(), 1);
        assert_eq!(service.expire_lapsed().await.unwrap(), 0);
    }

    #[test]
    fn test_period_start_ignores_lapsed() {
        let now = Utc::now();
        let lapsed = UserSubscription {
            id: 1,
            user_id: 1,
            plan_id: 1,
            order_id: None,
            starts_at: now - chrono::Duration::days(40),
            expires_at: now - chrono::Duration::days(10),
            status: SubscriptionStatus::Active,
            created_at: now,
        };
        assert_eq!(period_start(Some(&lapsed), now), now);
        assert_eq!(period_start(None, now), now);

        let live = UserSubscription {
            expires_at: now + chrono::Duration::days(5),
            ..lapsed
        };
        assert_eq!(period_start(Some(&live), now), live.expires_at);
    }
}
