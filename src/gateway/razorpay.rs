//! Razorpay REST client
//!
//! Orders: `POST /orders`; refunds: `POST /payments/{id}/refund`. Requests
//! authenticate with HTTP basic auth using the key id and secret.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{signature, CreateOrderRequest, GatewayError, GatewayOrder, GatewayRefund, PaymentGateway};
use crate::config::PaymentConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

pub struct RazorpayGateway {
    client: Client,
    config: PaymentConfig,
}

impl RazorpayGateway {
    pub fn new(config: PaymentConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::Request(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base.trim_end_matches('/'), path)
    }

    async fn post<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, GatewayError> {
        if !self.config.is_configured() {
            return Err(GatewayError::NotConfigured);
        }

        let response = self
            .client
            .post(self.url(path))
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorEnvelope>()
                .await
                .map(|e| e.error.description)
                .unwrap_or_else(|_| status.canonical_reason().unwrap_or("unknown error").to_string());
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| GatewayError::Request(format!("Invalid gateway response: {}", e)))
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    fn key_id(&self) -> &str {
        &self.config.key_id
    }

    async fn create_order(&self, request: &CreateOrderRequest) -> Result<GatewayOrder, GatewayError> {
        let order: GatewayOrder = self
            .post(
                "orders",
                json!({
                    "amount": request.amount,
                    "currency": request.currency,
                    "receipt": request.receipt,
                }),
            )
            .await?;
        tracing::debug!(gateway_order_id = %order.id, receipt = %request.receipt, "Gateway order created");
        Ok(order)
    }

    async fn refund(&self, gateway_payment_id: &str, amount: i64) -> Result<GatewayRefund, GatewayError> {
        let path = format!("payments/{}/refund", urlencoding::encode(gateway_payment_id));
        self.post(&path, json!({ "amount": amount })).await
    }

    fn verify_payment_signature(&self, gateway_order_id: &str, gateway_payment_id: &str, signature: &str) -> bool {
        signature::verify_payment_signature(
            &self.config.key_secret,
            gateway_order_id,
            gateway_payment_id,
            signature,
        )
    }

    fn verify_webhook_signature(&self, body: &[u8], signature: &str) -> bool {
        signature::verify_webhook_signature(&self.config.webhook_secret, body, signature)
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    description: String,
}

/// Webhook delivery, reduced to the fields payment handling reads
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    #[serde(default)]
    pub payload: WebhookPayload,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    pub payment: Option<WebhookEntity<WebhookPayment>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEntity<T> {
    pub entity: T,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayment {
    pub id: String,
    pub order_id: Option<String>,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub status: String,
    pub error_description: Option<String>,
}

impl WebhookEvent {
    pub fn payment(&self) -> Option<&WebhookPayment> {
        self.payload.payment.as_ref().map(|p| &p.entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_captured_webhook() {
        let body = r#"{
            "entity": "event",
            "event": "payment.captured",
            "payload": {
                "payment": {
                    "entity": {
                        "id": "pay_29QQoUBi66xm2f",
                        "order_id": "order_9A33XWu170gUtm",
                        "amount": 49900,
                        "currency": "INR",
                        "status": "captured",
                        "error_description": null
                    }
                }
            }
        }"#;

        let event: WebhookEvent = serde_json::from_str(body).unwrap();
        assert_eq!(event.event, "payment.captured");
        let payment = event.payment().unwrap();
        assert_eq!(payment.id, "pay_29QQoUBi66xm2f");
        assert_eq!(payment.order_id.as_deref(), Some("order_9A33XWu170gUtm"));
        assert_eq!(payment.amount, 49_900);
    }

    #[test]
    fn test_parse_event_without_payment() {
        let event: WebhookEvent = serde_json::from_str(r#"{"event":"refund.created"}"#).unwrap();
        assert!(event.payment().is_none());
    }

    #[tokio::test]
    async fn test_unconfigured_gateway_refuses_requests() {
        let gateway = RazorpayGateway::new(PaymentConfig::default()).unwrap();
        let result = gateway
            .create_order(&CreateOrderRequest {
                amount: 100,
                currency: "INR".into(),
                receipt: "1".into(),
            })
            .await;
        assert!(matches!(result, Err(GatewayError::NotConfigured)));
    }

    #[test]
    fn test_signature_uses_configured_secrets() {
        let gateway = RazorpayGateway::new(PaymentConfig {
            key_id: "rzp_test_1".into(),
            key_secret: "key_secret".into(),
            webhook_secret: "whsec".into(),
            ..PaymentConfig::default()
        })
        .unwrap();

        let sig = signature::payment_signature("key_secret", "order_1", "pay_1");
        assert!(gateway.verify_payment_signature("order_1", "pay_1", &sig));
        assert!(!gateway.verify_webhook_signature(b"order_1|pay_1", &sig));
        assert_eq!(gateway.key_id(), "rzp_test_1");
    }
}
