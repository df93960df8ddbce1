//! Signed session tokens carried in an HTTP-only cookie.
//!
//! ```text
//! token = base64url(json(claims)) "." hex(HMAC_SHA256(session_secret, payload))
//! ```
//!
//! Tokens are stateless: nothing is stored server-side, and the admin claim is
//! trusted until the token expires.

use axum::http::HeaderMap;
use axum::http::header::COOKIE;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use cookie::{Cookie, SameSite};
use hmac::{Hmac, Mac};
use kafsh_core::{TelegramUserId, UserId};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use crate::models::CurrentUser;

type HmacSha256 = Hmac<Sha256>;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "kafsh_session";

/// Reasons a session token is rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("malformed session token")]
    Malformed,
    #[error("session signature does not match")]
    BadSignature,
    #[error("session expired")]
    Expired,
}

/// Claims carried by a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Local user id.
    pub sub: UserId,
    /// Telegram user id.
    pub tg: TelegramUserId,
    /// Admin flag at sign-in time.
    pub adm: bool,
    /// Issued at (unix seconds).
    pub iat: i64,
    /// Expires at (unix seconds).
    pub exp: i64,
}

impl SessionClaims {
    /// The identity these claims describe.
    #[must_use]
    pub const fn current_user(&self) -> CurrentUser {
        CurrentUser {
            id: self.sub,
            telegram_id: self.tg,
            is_admin: self.adm,
        }
    }
}

/// Issues and verifies session tokens and builds the matching cookies.
#[derive(Clone)]
pub struct SessionSigner {
    secret: SecretString,
    ttl_secs: i64,
    secure: bool,
}

impl SessionSigner {
    /// `secure` selects `Secure; SameSite=None` cookies for HTTPS deployments.
    #[must_use]
    pub const fn new(secret: SecretString, ttl_secs: i64, secure: bool) -> Self {
        Self {
            secret,
            ttl_secs,
            secure,
        }
    }

    /// Session lifetime in seconds.
    #[must_use]
    pub const fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }

    /// Issue a token for a user.
    #[must_use]
    pub fn issue(&self, user: CurrentUser, now: DateTime<Utc>) -> (String, SessionClaims) {
        let iat = now.timestamp();
        let claims = SessionClaims {
            sub: user.id,
            tg: user.telegram_id,
            adm: user.is_admin,
            iat,
            exp: iat.saturating_add(self.ttl_secs),
        };
        (self.encode(&claims), claims)
    }

    /// Verify a token and return its claims.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] for malformed, forged or expired tokens.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims, SessionError> {
        let (payload, signature) = token.split_once('.').ok_or(SessionError::Malformed)?;
        let signature = hex::decode(signature).map_err(|_| SessionError::Malformed)?;

        self.mac(payload)?
            .verify_slice(&signature)
            .map_err(|_| SessionError::BadSignature)?;

        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| SessionError::Malformed)?;
        let claims: SessionClaims =
            serde_json::from_slice(&json).map_err(|_| SessionError::Malformed)?;

        if now.timestamp() >= claims.exp {
            return Err(SessionError::Expired);
        }
        Ok(claims)
    }

    /// Cookie carrying a freshly issued token.
    #[must_use]
    pub fn cookie(&self, token: String) -> Cookie<'static> {
        let mut cookie = self.base_cookie(token);
        cookie.set_max_age(cookie::time::Duration::seconds(self.ttl_secs));
        cookie
    }

    /// Expired cookie that removes the session in the browser.
    #[must_use]
    pub fn removal_cookie(&self) -> Cookie<'static> {
        let mut cookie = self.base_cookie(String::new());
        cookie.set_max_age(cookie::time::Duration::ZERO);
        cookie
    }

    fn base_cookie(&self, value: String) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, value))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(if self.secure {
                SameSite::None
            } else {
                SameSite::Lax
            })
            .build()
    }

    fn encode(&self, claims: &SessionClaims) -> String {
        let json = serde_json::to_vec(claims).unwrap_or_default();
        let payload = URL_SAFE_NO_PAD.encode(json);
        let signature = self
            .mac(&payload)
            .map(|mac| hex::encode(mac.finalize().into_bytes()))
            .unwrap_or_default();
        format!("{payload}.{signature}")
    }

    fn mac(&self, payload: &str) -> Result<HmacSha256, SessionError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|_| SessionError::BadSignature)?;
        mac.update(payload.as_bytes());
        Ok(mac)
    }
}

/// Read the session token from the request's `Cookie` headers.
#[must_use]
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == SESSION_COOKIE && !cookie.value().is_empty())
        .map(|cookie| cookie.value().to_string())
}
