//! Subscription plan models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

string_enum! {
    pub enum SubscriptionStatus {
        Active => "active",
        Expired => "expired",
        Cancelled => "cancelled",
    }
    default = Active;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionPlan {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub description: String,
    pub price: i64,
    pub currency: String,
    /// Length of one billing period
    pub interval_days: i32,
    pub features: Vec<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSubscription {
    pub id: i64,
    pub user_id: i64,
    pub plan_id: i64,
    pub order_id: Option<i64>,
    pub starts_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: SubscriptionStatus,
    pub created_at: DateTime<Utc>,
}

impl UserSubscription {
    pub fn is_current_at(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active && self.expires_at > now
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePlanInput {
    pub slug: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: i64,
    pub currency: Option<String>,
    pub interval_days: i32,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePlanInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<i64>,
    pub currency: Option<String>,
    pub interval_days: Option<i32>,
    pub features: Option<Vec<String>>,
    pub active: Option<bool>,
}
