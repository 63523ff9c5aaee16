//! Referral code models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

string_enum! {
    pub enum DiscountType {
        Percent => "percent",
        Flat => "flat",
    }
    default = Percent;
}

impl DiscountType {
    /// Discount on `amount`, never more than the amount itself.
    ///
    /// Percent discounts round down; flat discounts are capped at `amount`.
    pub fn discount_for(&self, value: i64, amount: i64) -> i64 {
        if amount <= 0 || value <= 0 {
            return 0;
        }
        match self {
            DiscountType::Percent => amount * value.min(100) / 100,
            DiscountType::Flat => value.min(amount),
        }
    }
}

/// One code per user; shared with friends to give them a discount
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralCode {
    pub id: i64,
    pub user_id: i64,
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub max_uses: i32,
    pub uses: i32,
    /// Credit accumulated by the owner, minor units
    pub earned_credit: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl ReferralCode {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expiry) if now > expiry)
    }

    pub fn is_exhausted(&self) -> bool {
        self.uses >= self.max_uses
    }

    pub fn discount_for(&self, amount: i64) -> i64 {
        self.discount_type.discount_for(self.discount_value, amount)
    }
}

/// A redeemed referral, one per paid order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Referral {
    pub id: i64,
    pub code_id: i64,
    pub referrer_id: i64,
    pub referee_id: i64,
    pub order_id: i64,
    pub discount_amount: i64,
    pub reward_amount: i64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_percent_discount_rounds_down() {
        assert_eq!(DiscountType::Percent.discount_for(10, 99_900), 9_990);
        assert_eq!(DiscountType::Percent.discount_for(15, 999), 149);
        assert_eq!(DiscountType::Percent.discount_for(150, 1_000), 1_000);
    }

    #[test]
    fn test_flat_discount_capped_at_amount() {
        assert_eq!(DiscountType::Flat.discount_for(500, 10_000), 500);
        assert_eq!(DiscountType::Flat.discount_for(50_000, 10_000), 10_000);
        assert_eq!(DiscountType::Flat.discount_for(500, 0), 0);
    }

    #[test]
    fn test_expiry_is_strictly_after() {
        let now = Utc::now();
        let code = ReferralCode {
            id: 1,
            user_id: 1,
            code: "ABCD2345".into(),
            discount_type: DiscountType::Percent,
            discount_value: 10,
            max_uses: 1,
            uses: 0,
            earned_credit: 0,
            expires_at: Some(now),
            active: true,
            created_at: now - Duration::days(1),
        };
        assert!(!code.is_expired_at(now));
        assert!(code.is_expired_at(now + Duration::seconds(1)));
        assert!(!code.is_exhausted());
    }
}
