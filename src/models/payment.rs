//! Order and payment models
//!
//! An order records what is being bought and for how much; the payment
//! row tracks the gateway side of the same purchase. Amounts are minor
//! units.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Currency used when an item does not name one
pub const DEFAULT_CURRENCY: &str = "INR";

/// Normalized ISO 4217 code, or `None` when `code` is not three letters
pub fn normalize_currency(code: &str) -> Option<String> {
    let code = code.trim();
    (code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic())).then(|| code.to_ascii_uppercase())
}

string_enum! {
    /// What an order grants once paid.
    pub enum ItemType {
        Course => "course",
        Degree => "degree",
        Mentorship => "mentorship",
        Subscription => "subscription",
    }
    default = Course;
}

string_enum! {
    pub enum OrderStatus {
        Created => "created",
        Paid => "paid",
        Failed => "failed",
    }
    default = Created;
}

string_enum! {
    pub enum PaymentStatus {
        Pending => "pending",
        Success => "success",
        Failed => "failed",
        /// Refund claimed and in flight at the gateway
        Refunding => "refunding",
        Refunded => "refunded",
    }
    default = Pending;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub item_type: ItemType,
    pub item_id: i64,
    /// Amount charged after discount
    pub amount: i64,
    pub original_amount: i64,
    pub discount_amount: i64,
    pub currency: String,
    pub referral_code: Option<String>,
    pub gateway_order_id: Option<String>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Values for a new order row
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: i64,
    pub item_type: ItemType,
    pub item_id: i64,
    pub amount: i64,
    pub original_amount: i64,
    pub discount_amount: i64,
    pub currency: String,
    pub referral_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub order_id: i64,
    pub user_id: i64,
    pub gateway_payment_id: Option<String>,
    #[serde(skip_serializing)]
    pub signature: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub failure_reason: Option<String>,
    pub refund_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payment joined with the order it settles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentWithOrder {
    #[serde(flatten)]
    pub payment: Payment,
    pub item_type: ItemType,
    pub item_id: i64,
    pub gateway_order_id: Option<String>,
    pub discount_amount: i64,
}

#[derive(Debug, Clone, Default)]
pub struct PaymentFilter {
    pub status: Option<PaymentStatus>,
    pub user_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderInput {
    pub item_type: ItemType,
    pub item_id: i64,
    pub referral_code: Option<String>,
}

/// Values the checkout widget hands back after a payment
#[derive(Debug, Clone, Deserialize)]
pub struct VerifyPaymentInput {
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub signature: String,
}

/// What the client needs to open the checkout widget
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutOrder {
    pub order_id: i64,
    pub gateway_order_id: String,
    pub amount: i64,
    pub original_amount: i64,
    pub discount_amount: i64,
    pub currency: String,
    pub key_id: String,
    pub item_type: ItemType,
    pub item_id: i64,
    pub title: String,
}
