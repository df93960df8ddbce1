//! Telegram sign-in.
//!
//! Verifies `initData`, upserts the user and issues a session token. The
//! admin flag is granted when the Telegram id is in `TELEGRAM_ADMIN_IDS` or
//! the stored user row carries it.

use chrono::Utc;
use sqlx::PgPool;
use thiserror::Error;
use tracing::instrument;

use crate::config::TelegramConfig;
use crate::db::{RepositoryError, UserRepository};
use crate::models::{CurrentUser, User};
use crate::services::session::{SessionClaims, SessionSigner};
use crate::telegram::{InitDataError, InitDataVerifier};

/// Sign-in failures.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Callers only see a generic rejection; the reason is logged.
    #[error("invalid or expired init data")]
    InvalidInitData(#[from] InitDataError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// A successful sign-in.
#[derive(Debug)]
pub struct SignIn {
    pub user: User,
    pub current: CurrentUser,
    pub token: String,
    pub claims: SessionClaims,
}

/// Telegram sign-in service.
pub struct AuthService<'a> {
    users: UserRepository<'a>,
    verifier: &'a InitDataVerifier,
    sessions: &'a SessionSigner,
    telegram: &'a TelegramConfig,
}

impl<'a> AuthService<'a> {
    #[must_use]
    pub const fn new(
        pool: &'a PgPool,
        verifier: &'a InitDataVerifier,
        sessions: &'a SessionSigner,
        telegram: &'a TelegramConfig,
    ) -> Self {
        Self {
            users: UserRepository::new(pool),
            verifier,
            sessions,
            telegram,
        }
    }

    /// Exchange a raw `initData` string for a session.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidInitData` for any verification failure,
    /// `AuthError::Repository` if the user cannot be stored.
    #[instrument(skip_all)]
    pub async fn sign_in(&self, init_data: &str) -> Result<SignIn, AuthError> {
        let data = self.verifier.verify(init_data).inspect_err(|e| {
            tracing::debug!(reason = %e, "initData rejected");
        })?;

        let user = self.users.upsert_from_telegram(&data.user).await?;
        let current = CurrentUser {
            id: user.id,
            telegram_id: user.telegram_id,
            is_admin: user.is_admin || self.telegram.is_configured_admin(user.telegram_id),
        };
        let (token, claims) = self.sessions.issue(current, Utc::now());

        tracing::info!(
            user_id = %user.id,
            telegram_id = %user.telegram_id,
            is_admin = current.is_admin,
            "User signed in"
        );

        Ok(SignIn {
            user,
            current,
            token,
            claims,
        })
    }
}
