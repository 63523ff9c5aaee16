//! Referral codes
//!
//! Every user gets one shareable code on request. A referee applying the
//! code gets a discount on their order; once the order is paid the
//! referral is recorded and the referrer earns a share of the amount paid.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::config::ReferralConfig;
use crate::db::is_unique_violation;
use crate::db::repositories::ReferralRepository;
use crate::models::{DiscountType, ListParams, PagedResult, Referral, ReferralCode, User};

/// No 0/O or 1/I, so codes survive being read aloud
const CODE_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const MAX_CODE_ATTEMPTS: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum ReferralError {
    #[error("Invalid referral code")]
    InvalidCode,

    #[error("Referral code is no longer active")]
    Inactive,

    #[error("You cannot use your own referral code")]
    SelfReferral,

    #[error("Referral code has expired")]
    Expired,

    #[error("Referral code has reached its usage limit")]
    Exhausted,

    #[error("You have already been referred")]
    AlreadyReferred,

    #[error("Referral code not found: {0}")]
    NotFound(i64),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl ReferralError {
    /// Rejections a client can act on, as opposed to failures
    pub fn is_rejection(&self) -> bool {
        !matches!(self, ReferralError::InternalError(_) | ReferralError::NotFound(_))
    }
}

/// A code that passed validation for a specific referee
#[derive(Debug, Clone, Serialize)]
pub struct ValidatedReferral {
    pub valid: bool,
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    /// Present when an amount was given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_amount: Option<i64>,
    #[serde(skip)]
    pub referral_code: ReferralCode,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReferralStats {
    pub code: String,
    pub uses: i32,
    pub max_uses: i32,
    pub earned_credit: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub referrals: Vec<Referral>,
}

pub struct ReferralService {
    repo: Arc<dyn ReferralRepository>,
    config: ReferralConfig,
}

impl ReferralService {
    pub fn new(repo: Arc<dyn ReferralRepository>, config: ReferralConfig) -> Self {
        Self { repo, config }
    }

    /// The user's code, created on first request
    pub async fn get_or_create_code(&self, user: &User) -> Result<ReferralCode, ReferralError> {
        if let Some(existing) = self.repo.get_code_by_user(user.id).await? {
            return Ok(existing);
        }

        let now = Utc::now();
        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let code = ReferralCode {
                id: 0,
                user_id: user.id,
                code: generate_code(self.config.code_length),
                discount_type: DiscountType::Percent,
                discount_value: self.config.discount_percent,
                max_uses: self.config.max_uses.clamp(0, i32::MAX as i64) as i32,
                uses: 0,
                earned_credit: 0,
                expires_at: Some(now + Duration::days(self.config.validity_days)),
                active: true,
                created_at: now,
            };

            match self.repo.create_code(&code).await {
                Ok(created) => {
                    tracing::info!(user_id = user.id, code = %created.code, "Referral code created");
                    return Ok(created);
                }
                Err(e) if is_unique_violation(&e) => {
                    // Either a concurrent request created this user's code or the code collided
                    if let Some(existing) = self.repo.get_code_by_user(user.id).await? {
                        return Ok(existing);
                    }
                    tracing::debug!(attempt, "Referral code collision, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ReferralError::InternalError(anyhow::anyhow!(
            "Failed to generate a unique referral code after {} attempts",
            MAX_CODE_ATTEMPTS
        )))
    }

    /// Check `code` for `referee`, optionally pricing it against `amount`
    pub async fn validate(
        &self,
        referee: &User,
        code: &str,
        amount: Option<i64>,
    ) -> Result<ValidatedReferral, ReferralError> {
        self.validate_at(referee, code, amount, Utc::now()).await
    }

    pub async fn validate_at(
        &self,
        referee: &User,
        code: &str,
        amount: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<ValidatedReferral, ReferralError> {
        let normalized = code.trim().to_ascii_uppercase();
        if normalized.is_empty() {
            return Err(ReferralError::InvalidCode);
        }
        let referral_code = self
            .repo
            .get_code(&normalized)
            .await?
            .ok_or(ReferralError::InvalidCode)?;

        check_code(&referral_code, referee.id, now)?;
        if self.repo.has_been_referred(referee.id).await? {
            return Err(ReferralError::AlreadyReferred);
        }

        Ok(ValidatedReferral {
            valid: true,
            code: referral_code.code.clone(),
            discount_type: referral_code.discount_type,
            discount_value: referral_code.discount_value,
            discount_amount: amount.map(|a| referral_code.discount_for(a)),
            referral_code,
        })
    }

    /// Record the redemption for a paid order and credit the referrer.
    ///
    /// Returns false when the code filled up or the referee was referred
    /// in the meantime; the payment stands either way.
    pub async fn record_redemption(
        &self,
        code: &ReferralCode,
        referee_id: i64,
        order_id: i64,
        discount_amount: i64,
        amount_paid: i64,
    ) -> Result<bool, ReferralError> {
        let referral = Referral {
            id: 0,
            code_id: code.id,
            referrer_id: code.user_id,
            referee_id,
            order_id,
            discount_amount,
            reward_amount: reward_for(amount_paid, self.config.reward_percent),
            created_at: Utc::now(),
        };

        let recorded = self.repo.redeem(&referral).await?;
        if recorded {
            tracing::info!(
                code = %code.code,
                referrer_id = code.user_id,
                referee_id,
                reward = referral.reward_amount,
                "Referral redeemed"
            );
        } else {
            tracing::warn!(
                code = %code.code,
                order_id,
                "Referral not recorded: code exhausted or referee already referred"
            );
        }
        Ok(recorded)
    }

    pub async fn get_code(&self, code: &str) -> Result<Option<ReferralCode>, ReferralError> {
        Ok(self.repo.get_code(&code.trim().to_ascii_uppercase()).await?)
    }

    pub async fn stats(&self, user: &User) -> Result<ReferralStats, ReferralError> {
        let code = self.get_or_create_code(user).await?;
        let referrals = self.repo.list_referrals_by_referrer(user.id).await?;
        Ok(ReferralStats {
            code: code.code,
            uses: code.uses,
            max_uses: code.max_uses,
            earned_credit: code.earned_credit,
            expires_at: code.expires_at,
            referrals,
        })
    }

    /// Credit earned so far, zero without a code
    pub async fn earned_credit(&self, user_id: i64) -> Result<i64, ReferralError> {
        Ok(self
            .repo
            .get_code_by_user(user_id)
            .await?
            .map_or(0, |c| c.earned_credit))
    }

    pub async fn list_codes(&self, params: &ListParams) -> Result<PagedResult<ReferralCode>, ReferralError> {
        let (items, total) = self.repo.list_codes(params).await?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn set_active(&self, id: i64, active: bool) -> Result<ReferralCode, ReferralError> {
        if !self.repo.set_active(id, active).await? {
            return Err(ReferralError::NotFound(id));
        }
        tracing::info!(code_id = id, active, "Referral code status changed");
        self.repo.get_code_by_id(id).await?.ok_or(ReferralError::NotFound(id))
    }
}

/// Checks that need only the code itself, in rejection order.
/// Self-referral wins over every other reason.
pub fn check_code(code: &ReferralCode, referee_id: i64, now: DateTime<Utc>) -> Result<(), ReferralError> {
    if code.user_id == referee_id {
        return Err(ReferralError::SelfReferral);
    }
    if !code.active {
        return Err(ReferralError::Inactive);
    }
    if code.is_expired_at(now) {
        return Err(ReferralError::Expired);
    }
    if code.is_exhausted() {
        return Err(ReferralError::Exhausted);
    }
    Ok(())
}

/// Referrer's share of the amount paid, rounded down
pub fn reward_for(amount_paid: i64, reward_percent: i64) -> i64 {
    if amount_paid <= 0 || reward_percent <= 0 {
        return 0;
    }
    amount_paid * reward_percent.min(100) / 100
}

/// Random code of `length` characters from the unambiguous alphabet
pub fn generate_code(length: usize) -> String {
    let mut code = String::with_capacity(length);
    while code.len() < length {
        // Bytes 6 and 8 carry the version and variant bits
        let uuid = Uuid::new_v4();
        let random = uuid
            .as_bytes()
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != 6 && *i != 8)
            .map(|(_, b)| *b);
        for byte in random {
            if code.len() == length {
                break;
            }
            // 256 is a multiple of 32, so this stays uniform
            code.push(CODE_ALPHABET[(byte as usize) % CODE_ALPHABET.len()] as char);
        }
    }
    code
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::setup_pool;
    use crate::db::repositories::{
        OrderRepository, SqlxOrderRepository, SqlxReferralRepository, SqlxUserRepository, UserRepository,
    };
    use crate::db::DynDatabasePool;
    use crate::models::{ItemType, NewOrder, UserRole};

    async fn setup(config: ReferralConfig) -> (ReferralService, DynDatabasePool) {
        let pool = setup_pool().await;
        (ReferralService::new(SqlxReferralRepository::boxed(pool.clone()), config), pool)
    }

    async fn user(pool: &DynDatabasePool, email: &str) -> User {
        SqlxUserRepository::new(pool.clone())
            .create(&User::new(email.into(), email.into(), None, UserRole::Student))
            .await
            .unwrap()
    }

    /// Orders referenced by referrals must exist
    async fn insert_order(pool: &DynDatabasePool, user_id: i64) -> i64 {
        let (order, _) = SqlxOrderRepository::new(pool.clone())
            .create(&NewOrder {
                user_id,
                item_type: ItemType::Course,
                item_id: 1,
                amount: 9_000,
                original_amount: 10_000,
                discount_amount: 1_000,
                currency: "INR".into(),
                referral_code: None,
            })
            .await
            .unwrap();
        order.id
    }

    #[test]
    fn test_generate_code_alphabet() {
        let code = generate_code(8);
        assert_eq!(code.len(), 8);
        assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
        assert_eq!(generate_code(40).len(), 40);
        assert_ne!(generate_code(12), generate_code(12));
    }

    #[test]
    fn test_reward_rounds_down() {
        assert_eq!(reward_for(8_999, 10), 899);
        assert_eq!(reward_for(0, 10), 0);
        assert_eq!(reward_for(1_000, 0), 0);
    }

    #[tokio::test]
    async fn test_code_created_once_per_user() {
        let (service, pool) = setup(ReferralConfig::default()).await;
        let owner = user(&pool, "owner@example.com").await;

        let code = service.get_or_create_code(&owner).await.unwrap();
        assert_eq!(code.code.len(), 8);
        assert_eq!(code.discount_value, 10);
        assert_eq!(code.max_uses, 50);
        assert!(code.expires_at.unwrap() > Utc::now() + Duration::days(364));

        let again = service.get_or_create_code(&owner).await.unwrap();
        assert_eq!(again.id, code.id);
    }

    #[tokio::test]
    async fn test_validation_order() {
        let (service, pool) = setup(ReferralConfig::default()).await;
        let owner = user(&pool, "owner@example.com").await;
        let friend = user(&pool, "friend@example.com").await;
        let code = service.get_or_create_code(&owner).await.unwrap();

        assert!(matches!(
            service.validate(&friend, "NOPE2345", None).await,
            Err(ReferralError::InvalidCode)
        ));
        assert!(matches!(
            service.validate(&owner, &code.code, None).await,
            Err(ReferralError::SelfReferral)
        ));

        let ok = service
            .validate(&friend, &code.code.to_lowercase(), Some(99_900))
            .await
            .unwrap();
        assert!(ok.valid);
        assert_eq!(ok.discount_amount, Some(9_990));

        let later = code.expires_at.unwrap() + Duration::seconds(1);
        assert!(matches!(
            service.validate_at(&friend, &code.code, None, later).await,
            Err(ReferralError::Expired)
        ));

        service.set_active(code.id, false).await.unwrap();
        assert!(matches!(
            service.validate(&friend, &code.code, None).await,
            Err(ReferralError::Inactive)
        ));
    }

    #[tokio::test]
    async fn test_redemption_credits_and_blocks_second_referral() {
        let config = ReferralConfig {
            max_uses: 1,
            ..ReferralConfig::default()
        };
        let (service, pool) = setup(config).await;
        let owner = user(&pool, "owner@example.com").await;
        let friend = user(&pool, "friend@example.com").await;
        let other = user(&pool, "other@example.com").await;
        let code = service.get_or_create_code(&owner).await.unwrap();

        let order = insert_order(&pool, friend.id).await;
        assert!(service.record_redemption(&code, friend.id, order, 1_000, 9_000).await.unwrap());

        let stats = service.stats(&owner).await.unwrap();
        assert_eq!(stats.uses, 1);
        assert_eq!(stats.earned_credit, 900);
        assert_eq!(stats.referrals.len(), 1);
        assert_eq!(service.earned_credit(owner.id).await.unwrap(), 900);

        assert!(matches!(
            service.validate(&friend, &code.code, None).await,
            Err(ReferralError::Exhausted)
        ));

        // Losing the race at the cap records nothing
        let order = insert_order(&pool, other.id).await;
        assert!(!service.record_redemption(&code, other.id, order, 1_000, 9_000).await.unwrap());
        assert_eq!(service.earned_credit(owner.id).await.unwrap(), 900);
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn code(owner: i64, uses: i32, max_uses: i32, expires_in_secs: i64, active: bool) -> ReferralCode {
        let now = Utc::now();
        ReferralCode {
            id: 1,
            user_id: owner,
            code: "ABCDEFGH".into(),
            discount_type: DiscountType::Percent,
            discount_value: 10,
            max_uses,
            uses,
            earned_credit: 0,
            expires_at: Some(now + Duration::seconds(expires_in_secs)),
            active,
            created_at: now,
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        #[test]
        fn self_referral_always_rejected(
            owner in 1i64..1000,
            uses in 0i32..100,
            max_uses in 0i32..100,
            expires_in in -100_000i64..100_000,
            active in any::<bool>(),
        ) {
            let code = code(owner, uses, max_uses, expires_in, active);
            let result = check_code(&code, owner, Utc::now());
            prop_assert!(matches!(result, Err(ReferralError::SelfReferral)));
        }

        #[test]
        fn expired_rejected_even_unused(max_uses in 1i32..100, past in 1i64..1_000_000) {
            let code = code(1, 0, max_uses, -past, true);
            let result = check_code(&code, 2, Utc::now());
            prop_assert!(matches!(result, Err(ReferralError::Expired)));
        }

        #[test]
        fn discount_never_exceeds_amount(
            value in 0i64..100_000,
            amount in 0i64..10_000_000,
            flat in any::<bool>(),
        ) {
            let kind = if flat { DiscountType::Flat } else { DiscountType::Percent };
            let discount = kind.discount_for(value, amount);
            prop_assert!(discount >= 0);
            prop_assert!(discount <= amount);
        }

        #[test]
        fn codes_use_the_alphabet(length in 1usize..40) {
            let code = generate_code(length);
            prop_assert_eq!(code.len(), length);
            prop_assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
        }
    }
}
