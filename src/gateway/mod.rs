//! Payment gateway adapter
//!
//! [`PaymentGateway`] is the seam between the payment service and the
//! provider. [`RazorpayGateway`] talks to the Razorpay REST API; tests plug
//! in their own implementation.

pub mod razorpay;
pub mod signature;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use razorpay::{RazorpayGateway, WebhookEvent};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Payment gateway is not configured")]
    NotConfigured,

    #[error("Gateway request failed: {0}")]
    Request(String),

    #[error("Gateway rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
}

/// Remote order to create before checkout
#[derive(Debug, Clone, Serialize)]
pub struct CreateOrderRequest {
    /// Minor units
    pub amount: i64,
    pub currency: String,
    /// Local order id
    pub receipt: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayRefund {
    pub id: String,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub status: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Public key handed to the checkout widget
    fn key_id(&self) -> &str;

    async fn create_order(&self, request: &CreateOrderRequest) -> Result<GatewayOrder, GatewayError>;

    /// Refund `amount` minor units of a captured payment
    async fn refund(&self, gateway_payment_id: &str, amount: i64) -> Result<GatewayRefund, GatewayError>;

    fn verify_payment_signature(&self, gateway_order_id: &str, gateway_payment_id: &str, signature: &str) -> bool;

    fn verify_webhook_signature(&self, body: &[u8], signature: &str) -> bool;
}
