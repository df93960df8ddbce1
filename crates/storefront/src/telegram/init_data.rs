//! Telegram Mini App `initData` verification.
//!
//! Telegram hands a Mini App a URL-encoded query string signed with a key
//! derived from the bot token:
//!
//! ```text
//! secret    = HMAC_SHA256(key = "WebAppData", msg = bot_token)
//! data      = sorted "key=value" pairs except `hash`, joined with '\n'
//! hash      = hex(HMAC_SHA256(key = secret, msg = data))
//! ```
//!
//! The payload is accepted only if the hash matches and `auth_date` is within
//! the freshness window. Every failure is reported to HTTP callers the same way;
//! the specific [`InitDataError`] variant is only logged.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use kafsh_core::TelegramUserId;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use url::form_urlencoded;

type HmacSha256 = Hmac<Sha256>;

/// Key used to derive the signing secret from the bot token.
const WEB_APP_DATA_KEY: &[u8] = b"WebAppData";

/// Reasons an `initData` payload is rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InitDataError {
    #[error("initData is empty")]
    Empty,
    #[error("initData has no hash")]
    MissingHash,
    #[error("initData hash is not valid hex")]
    MalformedHash,
    #[error("initData key '{0}' appears more than once")]
    DuplicateKey(String),
    #[error("initData signature does not match")]
    SignatureMismatch,
    #[error("initData auth_date is missing or invalid")]
    InvalidAuthDate,
    #[error("initData expired ({age_secs}s old)")]
    Expired { age_secs: i64 },
    #[error("initData user is missing or malformed: {0}")]
    InvalidUser(String),
}

/// The Telegram user embedded in `initData`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebAppUser {
    pub id: TelegramUserId,
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub language_code: Option<String>,
    #[serde(default)]
    pub is_premium: Option<bool>,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub allows_write_to_pm: Option<bool>,
}

/// A verified `initData` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebAppInitData {
    pub user: WebAppUser,
    pub auth_date: DateTime<Utc>,
    pub query_id: Option<String>,
    pub start_param: Option<String>,
    pub chat_type: Option<String>,
    pub chat_instance: Option<String>,
}

/// Verifies `initData` against a bot token with a fixed freshness window.
#[derive(Clone)]
pub struct InitDataVerifier {
    bot_token: SecretString,
    max_age_secs: i64,
}

impl InitDataVerifier {
    #[must_use]
    pub const fn new(bot_token: SecretString, max_age_secs: i64) -> Self {
        Self {
            bot_token,
            max_age_secs,
        }
    }

    /// Verify a payload against the current time.
    ///
    /// # Errors
    ///
    /// Returns the rejection reason; see [`verify_init_data`].
    pub fn verify(&self, raw: &str) -> Result<WebAppInitData, InitDataError> {
        verify_init_data(
            raw,
            self.bot_token.expose_secret(),
            self.max_age_secs,
            Utc::now(),
        )
    }
}

/// Verify a raw `initData` query string.
///
/// `now` is injected so the freshness check is deterministic in tests.
/// An `auth_date` in the future is accepted; only the age is bounded.
///
/// # Errors
///
/// Returns an [`InitDataError`] describing the first check that failed.
pub fn verify_init_data(
    raw: &str,
    bot_token: &str,
    max_age_secs: i64,
    now: DateTime<Utc>,
) -> Result<WebAppInitData, InitDataError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(InitDataError::Empty);
    }

    let mut fields = BTreeMap::new();
    for (key, value) in form_urlencoded::parse(raw.as_bytes()) {
        let key = key.into_owned();
        if fields.contains_key(&key) {
            return Err(InitDataError::DuplicateKey(key));
        }
        fields.insert(key, value.into_owned());
    }

    let hash = fields.remove("hash").ok_or(InitDataError::MissingHash)?;
    let expected = hex::decode(hash.trim()).map_err(|_| InitDataError::MalformedHash)?;

    let mac = data_check_mac(bot_token, &data_check_string(&fields))?;
    mac.verify_slice(&expected)
        .map_err(|_| InitDataError::SignatureMismatch)?;

    let auth_secs = fields
        .get("auth_date")
        .and_then(|v| v.parse::<i64>().ok())
        .ok_or(InitDataError::InvalidAuthDate)?;
    let auth_date = DateTime::from_timestamp(auth_secs, 0).ok_or(InitDataError::InvalidAuthDate)?;
    let age_secs = now.timestamp() - auth_secs;
    if age_secs > max_age_secs {
        return Err(InitDataError::Expired { age_secs });
    }

    let user_json = fields
        .get("user")
        .ok_or_else(|| InitDataError::InvalidUser("missing".to_string()))?;
    let user: WebAppUser =
        serde_json::from_str(user_json).map_err(|e| InitDataError::InvalidUser(e.to_string()))?;

    Ok(WebAppInitData {
        user,
        auth_date,
        query_id: fields.remove("query_id"),
        start_param: fields.remove("start_param"),
        chat_type: fields.remove("chat_type"),
        chat_instance: fields.remove("chat_instance"),
    })
}

/// Produce a signed `initData` string from key/value pairs.
///
/// Used by tests and the CLI to mint payloads outside Telegram. Any `hash`
/// pair in the input is ignored.
#[must_use]
pub fn sign_init_data(pairs: &[(&str, &str)], bot_token: &str) -> String {
    let fields: BTreeMap<String, String> = pairs
        .iter()
        .filter(|(key, _)| *key != "hash")
        .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
        .collect();

    let hash = data_check_mac(bot_token, &data_check_string(&fields))
        .map(|mac| hex::encode(mac.finalize().into_bytes()))
        .unwrap_or_default();

    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in &fields {
        serializer.append_pair(key, value);
    }
    serializer.append_pair("hash", &hash);
    serializer.finish()
}

/// Sorted `key=value` lines joined with `\n`.
fn data_check_string(fields: &BTreeMap<String, String>) -> String {
    fields
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// HMAC over the data-check string, keyed by the bot-derived secret.
fn data_check_mac(bot_token: &str, data_check: &str) -> Result<HmacSha256, InitDataError> {
    let mut secret_mac = HmacSha256::new_from_slice(WEB_APP_DATA_KEY)
        .map_err(|_| InitDataError::SignatureMismatch)?;
    secret_mac.update(bot_token.as_bytes());
    let secret = secret_mac.finalize().into_bytes();

    let mut mac =
        HmacSha256::new_from_slice(&secret).map_err(|_| InitDataError::SignatureMismatch)?;
    mac.update(data_check.as_bytes());
    Ok(mac)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const BOT_TOKEN: &str = "123456789:AAHdqTcvCH1vGWJxfSeofSAs0K5PALDsaw_";
    const AUTH_DATE: i64 = 1_760_000_000;
    const USER: &str = r#"{"id":279058397,"first_name":"سارا","last_name":"احمدی","username":"sara_a","language_code":"fa","allows_write_to_pm":true}"#;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn signed() -> String {
        sign_init_data(
            &[
                ("query_id", "AAHdF6IQAAAAAN0XohDhrOrc"),
                ("user", USER),
                ("auth_date", "1760000000"),
            ],
            BOT_TOKEN,
        )
    }

    #[test]
    fn test_accepts_signed_payload() {
        let data = verify_init_data(&signed(), BOT_TOKEN, 86_400, at(AUTH_DATE + 60)).unwrap();
        assert_eq!(data.user.id, TelegramUserId::new(279_058_397));
        assert_eq!(data.user.first_name, "سارا");
        assert_eq!(data.user.username.as_deref(), Some("sara_a"));
        assert_eq!(data.auth_date, at(AUTH_DATE));
        assert_eq!(data.query_id.as_deref(), Some("AAHdF6IQAAAAAN0XohDhrOrc"));
    }

    #[test]
    fn test_rejects_wrong_bot_token() {
        let other = "987654321:BBHdqTcvCH1vGWJxfSeofSAs0K5PALDsaw_";
        assert_eq!(
            verify_init_data(&signed(), other, 86_400, at(AUTH_DATE)),
            Err(InitDataError::SignatureMismatch)
        );
    }

    #[test]
    fn test_rejects_tampered_field() {
        let tampered = signed().replace("279058397", "279058398");
        assert_eq!(
            verify_init_data(&tampered, BOT_TOKEN, 86_400, at(AUTH_DATE)),
            Err(InitDataError::SignatureMismatch)
        );
    }

    #[test]
    fn test_rejects_missing_or_malformed_hash() {
        let raw = signed();
        let without_hash = raw.split("&hash=").next().unwrap();
        assert_eq!(
            verify_init_data(without_hash, BOT_TOKEN, 86_400, at(AUTH_DATE)),
            Err(InitDataError::MissingHash)
        );
        let bad_hex = format!("{without_hash}&hash=zz");
        assert_eq!(
            verify_init_data(&bad_hex, BOT_TOKEN, 86_400, at(AUTH_DATE)),
            Err(InitDataError::MalformedHash)
        );
    }

    #[test]
    fn test_freshness_window() {
        let raw = signed();
        assert!(verify_init_data(&raw, BOT_TOKEN, 86_400, at(AUTH_DATE + 86_400)).is_ok());
        assert_eq!(
            verify_init_data(&raw, BOT_TOKEN, 86_400, at(AUTH_DATE + 86_401)),
            Err(InitDataError::Expired { age_secs: 86_401 })
        );
        // Clock skew: a payload from slightly in the future is accepted.
        assert!(verify_init_data(&raw, BOT_TOKEN, 86_400, at(AUTH_DATE - 30)).is_ok());
    }

    #[test]
    fn test_rejects_duplicate_keys() {
        let raw = format!("auth_date=1&{}", signed());
        assert_eq!(
            verify_init_data(&raw, BOT_TOKEN, 86_400, at(AUTH_DATE)),
            Err(InitDataError::DuplicateKey("auth_date".to_string()))
        );
    }

    #[test]
    fn test_rejects_signed_payload_without_user() {
        let raw = sign_init_data(&[("auth_date", "1760000000")], BOT_TOKEN);
        assert!(matches!(
            verify_init_data(&raw, BOT_TOKEN, 86_400, at(AUTH_DATE)),
            Err(InitDataError::InvalidUser(_))
        ));
    }

    #[test]
    fn test_rejects_signed_payload_without_auth_date() {
        let raw = sign_init_data(&[("user", USER)], BOT_TOKEN);
        assert_eq!(
            verify_init_data(&raw, BOT_TOKEN, 86_400, at(AUTH_DATE)),
            Err(InitDataError::InvalidAuthDate)
        );
    }

    #[test]
    fn test_rejects_empty() {
        assert_eq!(
            verify_init_data("  ", BOT_TOKEN, 86_400, at(AUTH_DATE)),
            Err(InitDataError::Empty)
        );
    }

    #[test]
    fn test_data_check_string_is_sorted() {
        let fields: BTreeMap<String, String> =
            [("user", "u"), ("auth_date", "1"), ("query_id", "q")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
        assert_eq!(data_check_string(&fields), "auth_date=1\nquery_id=q\nuser=u");
    }
}
