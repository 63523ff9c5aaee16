//! Configuration management
//!
//! Configuration is read from `config.yml` and then overridden by `KALPLA_*`
//! environment variables. Missing values fall back to defaults so the server
//! can start with no config file at all (SQLite, no payments, no S3, no SMTP).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub payment: PaymentConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub smtp: SmtpConfig,
    #[serde(default)]
    pub referral: ReferralConfig,
    #[serde(default)]
    pub mentorship: MentorshipConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin (cookie-based auth needs an explicit origin)
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
    /// Public base URL of this server, used for OAuth redirect URIs
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Directory holding a prebuilt client bundle, served as fallback
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
            base_url: default_base_url(),
            static_dir: None,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/kalpla.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    #[default]
    Sqlite,
    Mysql,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Default TTL in seconds
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
    /// Maximum number of cached entries
    #[serde(default = "default_max_capacity")]
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl(),
            max_capacity: default_max_capacity(),
        }
    }
}

fn default_ttl() -> u64 {
    600
}

fn default_max_capacity() -> u64 {
    10_000
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Session lifetime in days
    #[serde(default = "default_session_days")]
    pub session_days: i64,
    #[serde(default)]
    pub google: Option<OAuthClientConfig>,
    #[serde(default)]
    pub github: Option<OAuthClientConfig>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_days: default_session_days(),
            google: None,
            github: None,
        }
    }
}

fn default_session_days() -> i64 {
    7
}

/// OAuth client credentials for one provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
}

/// Razorpay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfig {
    #[serde(default)]
    pub key_id: String,
    #[serde(default)]
    pub key_secret: String,
    /// Secret used to sign webhook deliveries
    #[serde(default)]
    pub webhook_secret: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_payment_api_base")]
    pub api_base: String,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            key_id: String::new(),
            key_secret: String::new(),
            webhook_secret: String::new(),
            currency: default_currency(),
            api_base: default_payment_api_base(),
        }
    }
}

impl PaymentConfig {
    /// Razorpay keys present
    pub fn is_configured(&self) -> bool {
        !self.key_id.is_empty() && !self.key_secret.is_empty()
    }
}

fn default_currency() -> String {
    "INR".to_string()
}

fn default_payment_api_base() -> String {
    "https://api.razorpay.com/v1".to_string()
}

/// S3-compatible object storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Endpoint such as `https://s3.ap-south-1.amazonaws.com`
    #[serde(default)]
    pub endpoint: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
    /// Lifetime of pre-signed URLs in seconds
    #[serde(default = "default_presign_expiry")]
    pub presign_expiry_secs: u64,
    /// Public URL prefix for stored objects (CDN); defaults to endpoint/bucket
    #[serde(default)]
    pub public_base_url: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            region: default_region(),
            bucket: String::new(),
            access_key: String::new(),
            secret_key: String::new(),
            presign_expiry_secs: default_presign_expiry(),
            public_base_url: None,
        }
    }
}

impl StorageConfig {
    pub fn is_configured(&self) -> bool {
        !self.endpoint.is_empty()
            && !self.bucket.is_empty()
            && !self.access_key.is_empty()
            && !self.secret_key.is_empty()
    }
}

fn default_region() -> String {
    "ap-south-1".to_string()
}

fn default_presign_expiry() -> u64 {
    900
}

/// Upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Local directory for uploads when object storage is not configured
    #[serde(default = "default_upload_path")]
    pub path: PathBuf,
    /// Maximum file size in bytes (default: 10MB)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Allowed MIME types
    #[serde(default = "default_allowed_types")]
    pub allowed_types: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            path: default_upload_path(),
            max_file_size: default_max_file_size(),
            allowed_types: default_allowed_types(),
        }
    }
}

fn default_upload_path() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024
}

fn default_allowed_types() -> Vec<String> {
    [
        "image/jpeg",
        "image/png",
        "image/gif",
        "image/webp",
        "application/pdf",
        "video/mp4",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl UploadConfig {
    /// Check if a MIME type is allowed
    pub fn is_type_allowed(&self, mime_type: &str) -> bool {
        self.allowed_types.iter().any(|t| t == mime_type)
    }

    /// File extension for a MIME type
    pub fn get_extension(&self, mime_type: &str) -> &'static str {
        match mime_type {
            "image/jpeg" => "jpg",
            "image/png" => "png",
            "image/gif" => "gif",
            "image/webp" => "webp",
            "application/pdf" => "pdf",
            "video/mp4" => "mp4",
            _ => "bin",
        }
    }
}

/// SMTP configuration for transactional email
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub from: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: String::new(),
            port: default_smtp_port(),
            username: String::new(),
            password: String::new(),
            from: String::new(),
            from_name: default_from_name(),
        }
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_name() -> String {
    "Kalpla".to_string()
}

/// Referral program configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralConfig {
    /// Discount granted to the referee, in percent
    #[serde(default = "default_discount_percent")]
    pub discount_percent: i64,
    /// Credit awarded to the referrer, in percent of the amount paid
    #[serde(default = "default_reward_percent")]
    pub reward_percent: i64,
    #[serde(default = "default_max_uses")]
    pub max_uses: i64,
    #[serde(default = "default_validity_days")]
    pub validity_days: i64,
    #[serde(default = "default_code_length")]
    pub code_length: usize,
}

impl Default for ReferralConfig {
    fn default() -> Self {
        Self {
            discount_percent: default_discount_percent(),
            reward_percent: default_reward_percent(),
            max_uses: default_max_uses(),
            validity_days: default_validity_days(),
            code_length: default_code_length(),
        }
    }
}

fn default_discount_percent() -> i64 {
    10
}

fn default_reward_percent() -> i64 {
    10
}

fn default_max_uses() -> i64 {
    50
}

fn default_validity_days() -> i64 {
    365
}

fn default_code_length() -> usize {
    8
}

/// Mentorship slot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MentorshipConfig {
    /// First slot start, local hour
    #[serde(default = "default_slot_start_hour")]
    pub slot_start_hour: u32,
    /// Working day end, local hour (exclusive)
    #[serde(default = "default_slot_end_hour")]
    pub slot_end_hour: u32,
    #[serde(default = "default_slot_minutes")]
    pub slot_minutes: u32,
    /// Offset of the local timezone from UTC (IST = 330)
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,
}

impl Default for MentorshipConfig {
    fn default() -> Self {
        Self {
            slot_start_hour: default_slot_start_hour(),
            slot_end_hour: default_slot_end_hour(),
            slot_minutes: default_slot_minutes(),
            utc_offset_minutes: default_utc_offset_minutes(),
        }
    }
}

fn default_slot_start_hour() -> u32 {
    9
}

fn default_slot_end_hour() -> u32 {
    18
}

fn default_slot_minutes() -> u32 {
    60
}

fn default_utc_offset_minutes() -> i32 {
    330
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file.
    ///
    /// A missing or empty file yields the defaults; invalid YAML is an error
    /// carrying line and column.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file, then apply `KALPLA_*` overrides.
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let m = &self.mentorship;
        if m.slot_minutes == 0 {
            return Err(ConfigError::ValidationError(
                "mentorship.slot_minutes must be positive".to_string(),
            ));
        }
        if m.slot_start_hour >= m.slot_end_hour || m.slot_end_hour > 24 {
            return Err(ConfigError::ValidationError(
                "mentorship slot hours must satisfy start < end <= 24".to_string(),
            ));
        }
        if !(0..=100).contains(&self.referral.discount_percent)
            || !(0..=100).contains(&self.referral.reward_percent)
        {
            return Err(ConfigError::ValidationError(
                "referral percentages must be between 0 and 100".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply environment variable overrides. Unparseable values are ignored.
    fn apply_env_overrides(&mut self) {
        // Server
        if let Ok(host) = std::env::var("KALPLA_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("KALPLA_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(cors_origin) = std::env::var("KALPLA_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = cors_origin;
        }
        if let Ok(base_url) = std::env::var("KALPLA_SERVER_BASE_URL") {
            self.server.base_url = base_url;
        }

        // Database
        if let Ok(driver) = std::env::var("KALPLA_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {}
            }
        }
        if let Ok(url) = std::env::var("KALPLA_DATABASE_URL") {
            self.database.url = url;
        }

        // Cache
        if let Ok(ttl) = std::env::var("KALPLA_CACHE_TTL_SECONDS") {
            if let Ok(ttl) = ttl.parse::<u64>() {
                self.cache.ttl_seconds = ttl;
            }
        }

        // Auth
        if let Ok(days) = std::env::var("KALPLA_AUTH_SESSION_DAYS") {
            if let Ok(days) = days.parse::<i64>() {
                self.auth.session_days = days;
            }
        }
        apply_oauth_env(&mut self.auth.google, "GOOGLE");
        apply_oauth_env(&mut self.auth.github, "GITHUB");

        // Payments
        if let Ok(key_id) = std::env::var("KALPLA_RAZORPAY_KEY_ID") {
            self.payment.key_id = key_id;
        }
        if let Ok(secret) = std::env::var("KALPLA_RAZORPAY_KEY_SECRET") {
            self.payment.key_secret = secret;
        }
        if let Ok(secret) = std::env::var("KALPLA_RAZORPAY_WEBHOOK_SECRET") {
            self.payment.webhook_secret = secret;
        }

        // Object storage
        if let Ok(endpoint) = std::env::var("KALPLA_S3_ENDPOINT") {
            self.storage.endpoint = endpoint;
        }
        if let Ok(region) = std::env::var("KALPLA_S3_REGION") {
            self.storage.region = region;
        }
        if let Ok(bucket) = std::env::var("KALPLA_S3_BUCKET") {
            self.storage.bucket = bucket;
        }
        if let Ok(key) = std::env::var("KALPLA_S3_ACCESS_KEY") {
            self.storage.access_key = key;
        }
        if let Ok(secret) = std::env::var("KALPLA_S3_SECRET_KEY") {
            self.storage.secret_key = secret;
        }

        // SMTP
        if let Ok(host) = std::env::var("KALPLA_SMTP_HOST") {
            self.smtp.host = host;
            self.smtp.enabled = true;
        }
        if let Ok(port) = std::env::var("KALPLA_SMTP_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.smtp.port = port;
            }
        }
        if let Ok(username) = std::env::var("KALPLA_SMTP_USERNAME") {
            self.smtp.username = username;
        }
        if let Ok(password) = std::env::var("KALPLA_SMTP_PASSWORD") {
            self.smtp.password = password;
        }
        if let Ok(from) = std::env::var("KALPLA_SMTP_FROM") {
            self.smtp.from = from;
        }
    }
}

fn apply_oauth_env(slot: &mut Option<OAuthClientConfig>, provider: &str) {
    let id = std::env::var(format!("KALPLA_{}_CLIENT_ID", provider)).ok();
    let secret = std::env::var(format!("KALPLA_{}_CLIENT_SECRET", provider)).ok();
    if id.is_none() && secret.is_none() {
        return;
    }
    let entry = slot.get_or_insert_with(|| OAuthClientConfig {
        client_id: String::new(),
        client_secret: String::new(),
    });
    if let Some(id) = id {
        entry.client_id = id;
    }
    if let Some(secret) = secret {
        entry.client_secret = secret;
    }
}

/// Format YAML parsing error with location
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared by `tests` and `property_tests`; env vars are process-global.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
const ENV_KEYS: &[&str] = &[
    "KALPLA_SERVER_HOST",
    "KALPLA_SERVER_PORT",
    "KALPLA_SERVER_CORS_ORIGIN",
    "KALPLA_SERVER_BASE_URL",
    "KALPLA_DATABASE_DRIVER",
    "KALPLA_DATABASE_URL",
    "KALPLA_CACHE_TTL_SECONDS",
    "KALPLA_AUTH_SESSION_DAYS",
    "KALPLA_GOOGLE_CLIENT_ID",
    "KALPLA_GOOGLE_CLIENT_SECRET",
    "KALPLA_GITHUB_CLIENT_ID",
    "KALPLA_GITHUB_CLIENT_SECRET",
    "KALPLA_RAZORPAY_KEY_ID",
    "KALPLA_RAZORPAY_KEY_SECRET",
    "KALPLA_RAZORPAY_WEBHOOK_SECRET",
    "KALPLA_S3_ENDPOINT",
    "KALPLA_S3_REGION",
    "KALPLA_S3_BUCKET",
    "KALPLA_S3_ACCESS_KEY",
    "KALPLA_S3_SECRET_KEY",
    "KALPLA_SMTP_HOST",
    "KALPLA_SMTP_PORT",
    "KALPLA_SMTP_USERNAME",
    "KALPLA_SMTP_PASSWORD",
    "KALPLA_SMTP_FROM",
];

#[cfg(test)]
fn clear_env() {
    for key in ENV_KEYS {
        std::env::remove_var(key);
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        super::CONFIG_ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn malformed_yaml_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("server:\n  port: not_a_number".to_string()),
            Just("server:\n  port: [1, 2, 3]".to_string()),
            Just("server:\n  port: 99999999999".to_string()),
            Just("cache:\n  ttl_seconds: -100".to_string()),
            Just("database:\n  driver: postgres".to_string()),
            Just("referral: true".to_string()),
            Just("mentorship:\n  slot_minutes: 0".to_string()),
            Just("referral:\n  discount_percent: 150".to_string()),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        /// Any config the server produces can be written out and read back.
        #[test]
        fn config_survives_yaml_rewrite(
            port in 1u16..=65535,
            ttl in 1u64..=86400,
            discount in 0i64..=100,
            start in 0u32..12,
            span in 1u32..12,
        ) {
            let mut config = Config::default();
            config.server.port = port;
            config.cache.ttl_seconds = ttl;
            config.referral.discount_percent = discount;
            config.mentorship.slot_start_hour = start;
            config.mentorship.slot_end_hour = start + span;

            let yaml = serde_yaml::to_string(&config).expect("serialize");
            let mut file = NamedTempFile::new().expect("temp file");
            write!(file, "{}", yaml).expect("write");

            let parsed = Config::load(file.path()).expect("parse");
            prop_assert_eq!(parsed.server.port, port);
            prop_assert_eq!(parsed.cache.ttl_seconds, ttl);
            prop_assert_eq!(parsed.referral.discount_percent, discount);
            prop_assert_eq!(parsed.mentorship.slot_end_hour, start + span);
        }

        #[test]
        fn malformed_config_is_rejected(yaml in malformed_yaml_strategy()) {
            let mut file = NamedTempFile::new().expect("temp file");
            write!(file, "{}", yaml).expect("write");

            let result = Config::load(file.path());
            prop_assert!(result.is_err());
        }

        #[test]
        fn env_port_takes_precedence(file_port in 1000u16..2000, env_port in 3000u16..4000) {
            let _guard = lock_env();
            super::clear_env();

            let mut file = NamedTempFile::new().expect("temp file");
            write!(file, "server:\n  port: {}\n", file_port).expect("write");
            std::env::set_var("KALPLA_SERVER_PORT", env_port.to_string());

            let config = Config::load_with_env(file.path()).expect("load");
            prop_assert_eq!(config.server.port, env_port);

            super::clear_env();
        }
    }
}
