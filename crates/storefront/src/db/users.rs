//! User repository.
//!
//! Users are keyed by Telegram id and created on first sign-in.

use sqlx::PgPool;

use kafsh_core::{TelegramUserId, UserId};

use super::RepositoryError;
use crate::models::User;
use crate::telegram::WebAppUser;

const USER_COLUMNS: &str = "id, telegram_id, first_name, last_name, username, language_code, \
     photo_url, phone, is_admin, created_at, updated_at, last_login_at";

/// Repository for user database operations.
pub struct UserRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert or refresh a user from a verified Telegram profile and record the login.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn upsert_from_telegram(
        &self,
        profile: &WebAppUser,
    ) -> Result<User, RepositoryError> {
        let sql = format!(
            r"
            INSERT INTO shop.user (telegram_id, first_name, last_name, username, language_code, photo_url, last_login_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            ON CONFLICT (telegram_id) DO UPDATE SET
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                username = EXCLUDED.username,
                language_code = EXCLUDED.language_code,
                photo_url = EXCLUDED.photo_url,
                last_login_at = NOW(),
                updated_at = NOW()
            RETURNING {USER_COLUMNS}
            "
        );

        let user = sqlx::query_as::<_, User>(&sql)
            .bind(profile.id)
            .bind(&profile.first_name)
            .bind(&profile.last_name)
            .bind(&profile.username)
            .bind(&profile.language_code)
            .bind(&profile.photo_url)
            .fetch_one(self.pool)
            .await?;

        Ok(user)
    }

    /// Get a user by local id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM shop.user WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        Ok(user)
    }

    /// Get a user by Telegram id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_telegram_id(
        &self,
        telegram_id: TelegramUserId,
    ) -> Result<Option<User>, RepositoryError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM shop.user WHERE telegram_id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(telegram_id)
            .fetch_optional(self.pool)
            .await?;
        Ok(user)
    }

    /// Grant or revoke the stored admin flag.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the user never signed in.
    pub async fn set_admin(
        &self,
        telegram_id: TelegramUserId,
        is_admin: bool,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE shop.user SET is_admin = $2, updated_at = NOW() WHERE telegram_id = $1",
        )
        .bind(telegram_id)
        .bind(is_admin)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Users with the stored admin flag.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_admins(&self) -> Result<Vec<User>, RepositoryError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM shop.user WHERE is_admin ORDER BY id");
        let users = sqlx::query_as::<_, User>(&sql).fetch_all(self.pool).await?;
        Ok(users)
    }

    /// Remember the phone number used at checkout to prefill the next order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn update_phone(&self, id: UserId, phone: &str) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE shop.user SET phone = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(phone)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Total number of users.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count(&self) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM shop.user")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }
}
