//! Authentication route handlers.
//!
//! Sign-in happens inside Telegram: the `/auth` page reads `initData` from
//! the WebApp bridge and posts it to `/api/auth/telegram`, which answers with
//! an HTTP-only session cookie.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Json,
    extract::{Query, State},
    http::header::SET_COOKIE,
    response::{AppendHeaders, IntoResponse},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::instrument;

use kafsh_core::{TelegramUserId, UserId};

use crate::db::UserRepository;
use crate::error::{AppError, clear_sentry_user, set_sentry_user};
use crate::filters;
use crate::middleware::{OptionalUser, RequireUser};
use crate::models::User;
use crate::services::AuthService;
use crate::state::AppState;
use crate::views::PageContext;

/// Where to go after sign-in when no usable `next` is given.
const DEFAULT_NEXT: &str = "/";

/// Accept only same-site relative paths as a post sign-in target.
///
/// Rejects absolute URLs, protocol-relative `//host` and backslash tricks.
#[must_use]
pub fn safe_next(next: Option<&str>) -> String {
    next.map(str::trim)
        .filter(|n| {
            n.starts_with('/')
                && !n.starts_with("//")
                && !n.contains('\\')
                && !n.chars().any(char::is_control)
        })
        .map_or_else(|| DEFAULT_NEXT.to_string(), str::to_string)
}

// =============================================================================
// Types
// =============================================================================

/// Body of `POST /api/auth/telegram`.
#[derive(Deserialize)]
pub struct SignInRequest {
    pub init_data: String,
}

/// The signed-in user as returned to the client.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: UserId,
    pub telegram_id: TelegramUserId,
    pub first_name: String,
    pub display_name: String,
    pub username: Option<String>,
    pub photo_url: Option<String>,
    pub phone: Option<String>,
    pub is_admin: bool,
}

impl UserResponse {
    fn new(user: &User, is_admin: bool) -> Self {
        Self {
            id: user.id,
            telegram_id: user.telegram_id,
            first_name: user.first_name.clone(),
            display_name: user.display_name(),
            username: user.username.clone(),
            photo_url: user.photo_url.clone(),
            phone: user.phone.clone(),
            is_admin,
        }
    }
}

/// `{"user": ...}`
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: UserResponse,
}

/// Sign-in page query parameters.
#[derive(Debug, Deserialize)]
pub struct AuthQuery {
    pub next: Option<String>,
}

/// Sign-in bootstrap page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth.html")]
pub struct AuthTemplate {
    pub page: PageContext,
    pub next: String,
}

// =============================================================================
// Handlers
// =============================================================================

/// Display the sign-in bootstrap page.
#[instrument(skip(state))]
pub async fn page(
    State(state): State<AppState>,
    OptionalUser(user): OptionalUser,
    Query(query): Query<AuthQuery>,
) -> impl IntoResponse {
    AuthTemplate {
        page: PageContext::new(&state, user),
        next: safe_next(query.next.as_deref()),
    }
}

/// Exchange Telegram `initData` for a session cookie.
///
/// Any verification failure is a generic 401; the reason is only logged.
#[instrument(skip_all)]
pub async fn telegram(
    State(state): State<AppState>,
    Json(request): Json<SignInRequest>,
) -> Result<impl IntoResponse, AppError> {
    let signed_in = AuthService::new(
        state.pool(),
        state.verifier(),
        state.sessions(),
        &state.config().telegram,
    )
    .sign_in(&request.init_data)
    .await?;

    set_sentry_user(&signed_in.user.id, signed_in.user.username.as_deref());
    tracing::info!(
        user_id = %signed_in.user.id,
        is_admin = signed_in.current.is_admin,
        "Signed in with Telegram"
    );

    let cookie = state.sessions().cookie(signed_in.token);
    Ok((
        AppendHeaders([(SET_COOKIE, cookie.to_string())]),
        Json(MeResponse {
            user: UserResponse::new(&signed_in.user, signed_in.current.is_admin),
        }),
    ))
}

/// Clear the session cookie.
#[instrument(skip_all)]
pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    clear_sentry_user();
    let cookie = state.sessions().removal_cookie();
    (
        AppendHeaders([(SET_COOKIE, cookie.to_string())]),
        Json(json!({ "ok": true })),
    )
}

/// Return the current identity.
#[instrument(skip(state), fields(user_id = %user.id))]
pub async fn me(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<MeResponse>, AppError> {
    let profile = UserRepository::new(state.pool())
        .get_by_id(user.id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("user no longer exists".to_string()))?;

    Ok(Json(MeResponse {
        user: UserResponse::new(&profile, user.is_admin),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_next_accepts_relative_paths() {
        assert_eq!(safe_next(Some("/orders?page=2")), "/orders?page=2");
        assert_eq!(safe_next(Some("/admin")), "/admin");
    }

    #[test]
    fn test_safe_next_rejects_offsite_targets() {
        assert_eq!(safe_next(None), "/");
        assert_eq!(safe_next(Some("")), "/");
        assert_eq!(safe_next(Some("https://evil.example/")), "/");
        assert_eq!(safe_next(Some("//evil.example")), "/");
        assert_eq!(safe_next(Some("/\\evil.example")), "/");
        assert_eq!(safe_next(Some("orders")), "/");
    }
}
