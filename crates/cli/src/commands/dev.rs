//! Local development helpers.
//!
//! `init-data` prints a payload signed like the one Telegram hands the Mini
//! App, so the storefront can be exercised from a normal browser or `curl`:
//!
//! ```bash
//! INIT_DATA=$(kafsh-cli dev init-data --user-id 42 --first-name Sara)
//! curl -c jar -H 'content-type: application/json' \
//!      -d "{\"init_data\":\"$INIT_DATA\"}" localhost:3000/api/auth/telegram
//! ```
//!
//! # Environment Variables
//!
//! - `TELEGRAM_BOT_TOKEN` - The token the server verifies against

use chrono::Utc;
use kafsh_storefront::telegram::sign_init_data;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;

use super::EnvError;

/// Build the signed `initData` string for a user at `auth_date`.
///
/// # Errors
///
/// Returns `serde_json::Error` if the user object cannot be encoded.
pub fn build_init_data(
    user_id: i64,
    first_name: &str,
    username: Option<&str>,
    auth_date: i64,
    bot_token: &str,
) -> Result<String, serde_json::Error> {
    let mut user = json!({
        "id": user_id,
        "first_name": first_name,
        "language_code": "fa",
    });
    if let Some(username) = username {
        user["username"] = json!(username.trim_start_matches('@'));
    }
    let user = serde_json::to_string(&user)?;
    let auth_date = auth_date.to_string();

    Ok(sign_init_data(
        &[
            ("auth_date", &auth_date),
            ("query_id", "dev"),
            ("user", &user),
        ],
        bot_token,
    ))
}

/// Print a freshly signed `initData` string on stdout.
///
/// # Errors
///
/// Returns an error if `TELEGRAM_BOT_TOKEN` is not set.
pub fn init_data(
    user_id: i64,
    first_name: &str,
    username: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let bot_token = std::env::var("TELEGRAM_BOT_TOKEN")
        .map(SecretString::from)
        .map_err(|_| EnvError::MissingEnvVar("TELEGRAM_BOT_TOKEN"))?;

    let raw = build_init_data(
        user_id,
        first_name,
        username,
        Utc::now().timestamp(),
        bot_token.expose_secret(),
    )?;

    tracing::warn!("initData is for local development only");
    #[allow(clippy::print_stdout)]
    {
        println!("{raw}");
    }
    Ok(())
}
