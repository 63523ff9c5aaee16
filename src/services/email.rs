//! Transactional email
//!
//! Enrollment confirmations and payment receipts over SMTP. Sending is
//! best-effort: callers log failures and carry on.

use anyhow::{anyhow, Result};
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::config::SmtpConfig;

pub struct EmailService {
    config: SmtpConfig,
    mailer: Option<AsyncSmtpTransport<Tokio1Executor>>,
}

impl EmailService {
    /// Build the service. A disabled or incomplete SMTP config yields a
    /// service that logs messages instead of sending them.
    pub fn new(config: SmtpConfig) -> Result<Self> {
        let mailer = if config.enabled && !config.host.is_empty() {
            let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| anyhow!("Failed to create SMTP transport: {}", e))?
                .port(config.port);
            if !config.username.is_empty() {
                builder = builder.credentials(Credentials::new(
                    config.username.clone(),
                    config.password.clone(),
                ));
            }
            Some(builder.build())
        } else {
            None
        };

        Ok(Self { config, mailer })
    }

    pub fn disabled() -> Self {
        Self {
            config: SmtpConfig::default(),
            mailer: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.mailer.is_some()
    }

    pub async fn send_enrollment_confirmation(&self, to: &str, name: &str, item_title: &str) -> Result<()> {
        let subject = format!("You're enrolled in {}", item_title);
        let body = format!(
            "Hi {},\n\nYou are now enrolled in \"{}\". Head to your dashboard to get started.\n\nHappy learning,\n{}",
            name, item_title, self.config.from_name
        );
        self.send(to, &subject, body).await
    }

    pub async fn send_payment_receipt(
        &self,
        to: &str,
        name: &str,
        item_title: &str,
        amount: i64,
        currency: &str,
        gateway_payment_id: &str,
    ) -> Result<()> {
        let subject = format!("Payment receipt for {}", item_title);
        let body = format!(
            "Hi {},\n\nWe received your payment of {} {} for \"{}\".\nPayment reference: {}\n\nThanks,\n{}",
            name,
            format_amount(amount),
            currency,
            item_title,
            gateway_payment_id,
            self.config.from_name
        );
        self.send(to, &subject, body).await
    }

    async fn send(&self, to: &str, subject: &str, body: String) -> Result<()> {
        let Some(mailer) = &self.mailer else {
            tracing::info!(to, subject, "SMTP disabled, skipping email");
            return Ok(());
        };

        let from = format!("{} <{}>", self.config.from_name, self.config.from);
        let message = Message::builder()
            .from(from.parse().map_err(|e| anyhow!("Invalid from address: {}", e))?)
            .to(to.parse().map_err(|e| anyhow!("Invalid to address: {}", e))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| anyhow!("Failed to build email: {}", e))?;

        mailer
            .send(message)
            .await
            .map_err(|e| anyhow!("Failed to send email: {}", e))?;

        tracing::debug!(to, subject, "Email sent");
        Ok(())
    }
}

/// Minor units rendered with two decimals
fn format_amount(minor: i64) -> String {
    let sign = if minor < 0 { "-" } else { "" };
    let minor = minor.abs();
    format!("{}{}.{:02}", sign, minor / 100, minor % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(99_900), "999.00");
        assert_eq!(format_amount(5), "0.05");
        assert_eq!(format_amount(-150), "-1.50");
    }

    #[test]
    fn test_disabled_without_host() {
        let service = EmailService::new(SmtpConfig {
            enabled: true,
            ..SmtpConfig::default()
        })
        .unwrap();
        assert!(!service.is_enabled());
    }

    #[tokio::test]
    async fn test_disabled_service_skips_sending() {
        let service = EmailService::disabled();
        service
            .send_payment_receipt("a@example.com", "A", "Rust 101", 49_900, "INR", "pay_1")
            .await
            .unwrap();
    }
}
