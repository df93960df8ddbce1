//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `STOREFRONT_BASE_URL` - Public URL of the storefront (the Mini App URL registered with the bot)
//! - `STOREFRONT_SESSION_SECRET` - Session signing secret (min 32 chars, high entropy)
//! - `TELEGRAM_BOT_TOKEN` - Bot token from `@BotFather`; also the initData signing key
//!
//! ## Optional
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `SHOP_NAME` - Display name (default: کفش)
//! - `SESSION_TTL_SECS` - Session lifetime (default: 7 days)
//! - `SHIPPING_FEE_TOMAN` - Flat shipping fee (default: 60000)
//! - `FREE_SHIPPING_THRESHOLD_TOMAN` - Subtotal for free shipping, `0` disables (default: 2000000)
//! - `MAX_LINE_QUANTITY` - Max quantity per order line (default: 10)
//! - `TELEGRAM_BOT_USERNAME` - Bot username, used for "open in Telegram" links
//! - `TELEGRAM_ADMIN_IDS` - Comma-separated Telegram user ids with admin access
//! - `TELEGRAM_ADMIN_CHAT_ID` - Chat that receives new-order notifications
//! - `TELEGRAM_NOTIFICATIONS` - Send order notifications (default: true)
//! - `TELEGRAM_INIT_DATA_MAX_AGE_SECS` - initData freshness window (default: 86400)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Error sample rate (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Performance sample rate (default: 0.0)

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use kafsh_core::{Price, TelegramChatId, TelegramUserId};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

const MIN_SESSION_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const MIN_BOT_TOKEN_SECRET_LENGTH: usize = 35;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL, without trailing slash
    pub base_url: String,
    /// Session signing secret
    pub session_secret: SecretString,
    /// Session lifetime in seconds
    pub session_ttl_secs: i64,
    /// Shop display and pricing rules
    pub shop: ShopConfig,
    /// Telegram bot configuration
    pub telegram: TelegramConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
    /// Fraction of errors sent to Sentry
    pub sentry_sample_rate: f32,
    /// Fraction of transactions traced
    pub sentry_traces_sample_rate: f32,
}

/// Shop-level settings used by checkout and templates.
#[derive(Debug, Clone)]
pub struct ShopConfig {
    /// Display name shown in the header and notifications
    pub name: String,
    /// Flat shipping fee
    pub shipping_fee: Price,
    /// Subtotal at or above which shipping is free; `None` disables free shipping
    pub free_shipping_threshold: Option<Price>,
    /// Maximum quantity of a single size in one order line
    pub max_line_quantity: u32,
}

impl Default for ShopConfig {
    fn default() -> Self {
        Self {
            name: "کفش".to_string(),
            shipping_fee: Price::from_toman(60_000).unwrap_or(Price::ZERO),
            free_shipping_threshold: Price::from_toman(2_000_000).ok(),
            max_line_quantity: 10,
        }
    }
}

/// Telegram bot configuration.
///
/// Implements `Debug` manually to redact the bot token.
#[derive(Clone)]
pub struct TelegramConfig {
    /// Bot token (`<bot id>:<secret>`)
    pub bot_token: SecretString,
    /// Bot username without `@`
    pub bot_username: Option<String>,
    /// Users granted admin access regardless of the database flag
    pub admin_ids: Vec<TelegramUserId>,
    /// Chat that receives new-order notifications
    pub admin_chat_id: Option<TelegramChatId>,
    /// Whether outbound notifications are sent at all
    pub notifications_enabled: bool,
    /// Maximum accepted age of initData in seconds
    pub init_data_max_age_secs: i64,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"[REDACTED]")
            .field("bot_username", &self.bot_username)
            .field("admin_ids", &self.admin_ids)
            .field("admin_chat_id", &self.admin_chat_id)
            .field("notifications_enabled", &self.notifications_enabled)
            .field("init_data_max_age_secs", &self.init_data_max_age_secs)
            .finish()
    }
}

impl TelegramConfig {
    /// Whether a Telegram user is an admin by configuration.
    #[must_use]
    pub fn is_configured_admin(&self, id: TelegramUserId) -> bool {
        self.admin_ids.contains(&id)
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("STOREFRONT_DATABASE_URL")?;
        let host = get_parsed_env("STOREFRONT_HOST", "127.0.0.1")?;
        let port = get_parsed_env("STOREFRONT_PORT", "3000")?;
        let base_url = normalize_base_url(&get_required_env("STOREFRONT_BASE_URL")?)
            .map_err(|e| ConfigError::InvalidEnvVar("STOREFRONT_BASE_URL".to_string(), e))?;
        let session_secret = get_validated_secret("STOREFRONT_SESSION_SECRET")?;
        validate_session_secret(&session_secret, "STOREFRONT_SESSION_SECRET")?;
        let session_ttl_secs = get_parsed_env::<i64>("SESSION_TTL_SECS", "604800")?;
        if session_ttl_secs <= 0 {
            return Err(ConfigError::InvalidEnvVar(
                "SESSION_TTL_SECS".to_string(),
                "must be positive".to_string(),
            ));
        }

        let shop = ShopConfig::from_env()?;
        let telegram = TelegramConfig::from_env()?;

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            session_secret,
            session_ttl_secs,
            shop,
            telegram,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: get_parsed_env("SENTRY_SAMPLE_RATE", "1.0")?,
            sentry_traces_sample_rate: get_parsed_env("SENTRY_TRACES_SAMPLE_RATE", "0.0")?,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether the public URL is served over HTTPS.
    #[must_use]
    pub fn is_https(&self) -> bool {
        self.base_url.starts_with("https://")
    }

    /// Origin (`scheme://host[:port]`) of the public URL, used for CSRF checks.
    #[must_use]
    pub fn base_origin(&self) -> String {
        Url::parse(&self.base_url)
            .map(|url| url.origin().ascii_serialization())
            .unwrap_or_else(|_| self.base_url.clone())
    }
}

impl ShopConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let shipping_fee = get_price_env("SHIPPING_FEE_TOMAN", "60000")?;
        let threshold = get_price_env("FREE_SHIPPING_THRESHOLD_TOMAN", "2000000")?;
        let max_line_quantity = get_parsed_env::<u32>("MAX_LINE_QUANTITY", "10")?;
        if max_line_quantity == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "MAX_LINE_QUANTITY".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            name: get_optional_env("SHOP_NAME").unwrap_or(defaults.name),
            shipping_fee,
            free_shipping_threshold: (!threshold.is_zero()).then_some(threshold),
            max_line_quantity,
        })
    }
}

impl TelegramConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let bot_token = get_required_env("TELEGRAM_BOT_TOKEN")?;
        validate_bot_token(&bot_token)
            .map_err(|e| ConfigError::InvalidEnvVar("TELEGRAM_BOT_TOKEN".to_string(), e))?;

        let admin_ids = get_optional_env("TELEGRAM_ADMIN_IDS")
            .map(|raw| parse_admin_ids(&raw))
            .transpose()
            .map_err(|e| ConfigError::InvalidEnvVar("TELEGRAM_ADMIN_IDS".to_string(), e))?
            .unwrap_or_default();

        let admin_chat_id = get_optional_env("TELEGRAM_ADMIN_CHAT_ID")
            .map(|raw| raw.parse::<TelegramChatId>())
            .transpose()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("TELEGRAM_ADMIN_CHAT_ID".to_string(), e.to_string())
            })?;

        let init_data_max_age_secs =
            get_parsed_env::<i64>("TELEGRAM_INIT_DATA_MAX_AGE_SECS", "86400")?;
        if init_data_max_age_secs <= 0 {
            return Err(ConfigError::InvalidEnvVar(
                "TELEGRAM_INIT_DATA_MAX_AGE_SECS".to_string(),
                "must be positive".to_string(),
            ));
        }

        Ok(Self {
            bot_token: SecretString::from(bot_token),
            bot_username: get_optional_env("TELEGRAM_BOT_USERNAME")
                .map(|name| name.trim_start_matches('@').to_string()),
            admin_ids,
            admin_chat_id,
            notifications_enabled: get_parsed_env("TELEGRAM_NOTIFICATIONS", "true")?,
            init_data_max_age_secs,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable. Empty values count as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Parse an environment variable (or its default) into `T`.
fn get_parsed_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Parse a Toman amount from an environment variable.
fn get_price_env(key: &str, default: &str) -> Result<Price, ConfigError> {
    Price::parse(&get_env_or_default(key, default))
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Validate the base URL and strip any trailing slash.
fn normalize_base_url(raw: &str) -> Result<String, String> {
    let url = Url::parse(raw.trim()).map_err(|e| e.to_string())?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("unsupported scheme '{}'", url.scheme()));
    }
    if url.host_str().is_none() {
        return Err("missing host".to_string());
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}

/// Check the `<bot id>:<secret>` shape of a bot token.
fn validate_bot_token(token: &str) -> Result<(), String> {
    let (id, secret) = token
        .split_once(':')
        .ok_or_else(|| "expected '<bot id>:<secret>'".to_string())?;
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return Err("bot id must be numeric".to_string());
    }
    if secret.len() < MIN_BOT_TOKEN_SECRET_LENGTH
        || !secret
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return Err(format!(
            "secret part must be at least {MIN_BOT_TOKEN_SECRET_LENGTH} characters of [A-Za-z0-9_-]"
        ));
    }
    Ok(())
}

/// Parse a comma-separated list of Telegram user ids.
fn parse_admin_ids(raw: &str) -> Result<Vec<TelegramUserId>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<TelegramUserId>()
                .map_err(|e| format!("'{part}': {e}"))
        })
        .collect()
}

/// Validate that a session secret meets minimum length requirements.
fn validate_session_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_SESSION_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_SESSION_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)]
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
