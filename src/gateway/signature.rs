//! Razorpay signature helpers
//!
//! Checkout responses are signed with the key secret over
//! `order_id|payment_id`; webhook deliveries are signed with the webhook
//! secret over the raw request body. Both are lowercase hex HMAC-SHA256.

use data_encoding::{HEXLOWER, HEXLOWER_PERMISSIVE};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Lowercase hex HMAC-SHA256 of `message`
pub fn sign(secret: &str, message: &[u8]) -> String {
    let mut mac = mac_for(secret);
    mac.update(message);
    HEXLOWER.encode(&mac.finalize().into_bytes())
}

/// Signature the checkout returns for a successful payment
pub fn payment_signature(secret: &str, gateway_order_id: &str, gateway_payment_id: &str) -> String {
    sign(secret, payment_message(gateway_order_id, gateway_payment_id).as_bytes())
}

/// Constant-time check of a checkout signature
pub fn verify_payment_signature(
    secret: &str,
    gateway_order_id: &str,
    gateway_payment_id: &str,
    signature: &str,
) -> bool {
    verify(secret, payment_message(gateway_order_id, gateway_payment_id).as_bytes(), signature)
}

/// Constant-time check of an `X-Razorpay-Signature` header against the raw body
pub fn verify_webhook_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    verify(secret, body, signature)
}

fn payment_message(gateway_order_id: &str, gateway_payment_id: &str) -> String {
    format!("{}|{}", gateway_order_id, gateway_payment_id)
}

fn verify(secret: &str, message: &[u8], signature: &str) -> bool {
    if secret.is_empty() {
        return false;
    }
    let Ok(expected) = HEXLOWER_PERMISSIVE.decode(signature.trim().as_bytes()) else {
        return false;
    };
    let mut mac = mac_for(secret);
    mac.update(message);
    mac.verify_slice(&expected).is_ok()
}

fn mac_for(secret: &str) -> HmacSha256 {
    // HMAC accepts keys of any length, so this cannot fail
    match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC-SHA256 takes keys of any size"),
    }
}
