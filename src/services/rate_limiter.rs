//! Login throttling
//!
//! Two sliding windows, both in memory:
//! - failed logins per email: 5 per 15 minutes
//! - login requests per client IP: 10 per minute

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::net::IpAddr;
use tokio::sync::RwLock;

const MAX_FAILED_PER_EMAIL: usize = 5;
const EMAIL_WINDOW_MINUTES: i64 = 15;
const MAX_REQUESTS_PER_IP: usize = 10;
const IP_WINDOW_MINUTES: i64 = 1;

/// Why a login was refused before credentials were checked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginLimit {
    Ip,
    Email,
}

impl LoginLimit {
    /// Seconds until the window frees up at the latest
    pub fn retry_after_secs(self) -> i64 {
        match self {
            LoginLimit::Ip => IP_WINDOW_MINUTES * 60,
            LoginLimit::Email => EMAIL_WINDOW_MINUTES * 60,
        }
    }
}

#[derive(Default)]
pub struct LoginRateLimiter {
    failed_by_email: RwLock<HashMap<String, Vec<DateTime<Utc>>>>,
    requests_by_ip: RwLock<HashMap<IpAddr, Vec<DateTime<Utc>>>>,
}

impl LoginRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count this request against `ip` and refuse it if either window is full.
    pub async fn check(&self, email: &str, ip: Option<IpAddr>) -> Result<(), LoginLimit> {
        let now = Utc::now();

        if let Some(ip) = ip {
            let mut requests = self.requests_by_ip.write().await;
            let times = requests.entry(ip).or_default();
            times.retain(|t| *t > now - Duration::minutes(IP_WINDOW_MINUTES));
            if times.len() >= MAX_REQUESTS_PER_IP {
                return Err(LoginLimit::Ip);
            }
            times.push(now);
        }

        let mut failed = self.failed_by_email.write().await;
        if let Some(times) = failed.get_mut(&normalize(email)) {
            times.retain(|t| *t > now - Duration::minutes(EMAIL_WINDOW_MINUTES));
            if times.len() >= MAX_FAILED_PER_EMAIL {
                return Err(LoginLimit::Email);
            }
        }
        Ok(())
    }

    pub async fn record_failure(&self, email: &str) {
        self.failed_by_email
            .write()
            .await
            .entry(normalize(email))
            .or_default()
            .push(Utc::now());
    }

    /// Forget failures after a successful login
    pub async fn clear(&self, email: &str) {
        self.failed_by_email.write().await.remove(&normalize(email));
    }

    /// Drop entries whose windows have passed
    pub async fn cleanup(&self) {
        let now = Utc::now();
        self.failed_by_email.write().await.retain(|_, times| {
            times.retain(|t| *t > now - Duration::minutes(EMAIL_WINDOW_MINUTES));
            !times.is_empty()
        });
        self.requests_by_ip.write().await.retain(|_, times| {
            times.retain(|t| *t > now - Duration::minutes(IP_WINDOW_MINUTES));
            !times.is_empty()
        });
    }
}

fn normalize(email: &str) -> String {
    email.trim().to_lowercase()
}
