//! Admin flag management.
//!
//! # Usage
//!
//! ```bash
//! kafsh-cli admin grant --telegram-id 123456789
//! kafsh-cli admin revoke --telegram-id 123456789
//! kafsh-cli admin list
//! ```
//!
//! The user must have opened the Mini App at least once so a `shop.user` row
//! exists. Ids in `ADMIN_TELEGRAM_IDS` are admins regardless of this flag.
//! A changed flag takes effect at the user's next sign-in.
//!
//! # Environment Variables
//!
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string (or `DATABASE_URL`)

use kafsh_core::TelegramUserId;
use kafsh_storefront::db::{self, RepositoryError, UserRepository};
use thiserror::Error;

use super::{EnvError, database_url};

/// Errors that can occur during admin operations.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error(transparent)]
    Env(#[from] EnvError),

    /// Database connection error.
    #[error("Database connection error: {0}")]
    Connect(#[from] sqlx::Error),

    /// Query error.
    #[error("Database error: {0}")]
    Repository(RepositoryError),

    /// No user row for the id.
    #[error("No user with Telegram id {0}; they must open the Mini App once first")]
    UnknownUser(i64),
}

/// Set or clear the stored admin flag.
///
/// # Errors
///
/// Returns `AdminError::UnknownUser` if the user never signed in.
pub async fn set_admin(telegram_id: i64, is_admin: bool) -> Result<(), AdminError> {
    let database_url = database_url()?;

    tracing::info!("Connecting to storefront database...");
    let pool = db::create_pool(&database_url).await?;

    UserRepository::new(&pool)
        .set_admin(TelegramUserId::new(telegram_id), is_admin)
        .await
        .map_err(|e| match e {
            RepositoryError::NotFound => AdminError::UnknownUser(telegram_id),
            other => AdminError::Repository(other),
        })?;

    if is_admin {
        tracing::info!(telegram_id, "Admin flag granted");
    } else {
        tracing::info!(telegram_id, "Admin flag revoked");
    }
    Ok(())
}

/// Log every user holding the stored admin flag.
///
/// # Errors
///
/// Returns an error if the database cannot be queried.
pub async fn list() -> Result<(), AdminError> {
    let database_url = database_url()?;
    let pool = db::create_pool(&database_url).await?;

    let admins = UserRepository::new(&pool)
        .list_admins()
        .await
        .map_err(AdminError::Repository)?;

    if admins.is_empty() {
        tracing::info!("No users hold the admin flag");
        return Ok(());
    }

    tracing::info!("{} admin(s):", admins.len());
    for user in &admins {
        tracing::info!(
            "  {} {} (@{})",
            user.telegram_id,
            user.display_name(),
            user.username.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}
