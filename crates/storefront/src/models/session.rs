//! Request identity.

use serde::{Deserialize, Serialize};

use kafsh_core::{TelegramUserId, UserId};

/// The signed-in user for the current request.
///
/// Built from a verified session token by the route guard and handed to
/// handlers through the `RequireUser`/`OptionalUser`/`RequireAdmin` extractors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    /// Local user id.
    pub id: UserId,
    /// Telegram user id.
    pub telegram_id: TelegramUserId,
    /// Whether the user may use the admin panel.
    pub is_admin: bool,
}
