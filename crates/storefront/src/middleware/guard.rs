//! Route guard.
//!
//! Runs on every request:
//!
//! 1. Strips inbound `x-kafsh-*` identity headers so clients cannot forge them.
//! 2. Verifies the session cookie and, when valid, forwards the identity as
//!    those headers for the extractors in [`super::auth`].
//! 3. On protected prefixes, requires a session (401 JSON for `/api/…`,
//!    303 to `/auth?next=…` for pages), the admin claim for admin prefixes,
//!    and a same-origin `Origin`/`Referer` for state-changing methods.

use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use serde_json::json;
use url::Url;

use crate::models::CurrentUser;
use crate::services::session::session_token;
use crate::state::AppState;

/// Local user id of the signed-in user.
pub const USER_ID_HEADER: &str = "x-kafsh-user-id";
/// Telegram user id of the signed-in user.
pub const TELEGRAM_ID_HEADER: &str = "x-kafsh-telegram-id";
/// `1` when the session carries the admin claim.
pub const ADMIN_HEADER: &str = "x-kafsh-admin";

/// Prefixes that require a session.
pub const PROTECTED_PREFIXES: &[&str] = &[
    "/checkout",
    "/orders",
    "/admin",
    "/api/cart",
    "/api/orders",
    "/api/admin",
    "/api/auth/me",
];

/// Prefixes that additionally require the admin claim.
pub const ADMIN_PREFIXES: &[&str] = &["/admin", "/api/admin"];

/// Outcome of the guard for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Pass through, with the identity to forward if there is one.
    Allow(Option<CurrentUser>),
    /// API request without a session.
    Unauthorized,
    /// Page request without a session; redirect to this sign-in URL.
    SignIn(String),
    /// Session present but not allowed, or cross-site write.
    Forbidden(&'static str),
}

/// Whether `path` is `prefix` itself or below it.
fn under(path: &str, prefix: &str) -> bool {
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

#[must_use]
pub fn is_protected(path: &str) -> bool {
    PROTECTED_PREFIXES.iter().any(|p| under(path, p))
}

#[must_use]
pub fn is_admin_path(path: &str) -> bool {
    ADMIN_PREFIXES.iter().any(|p| under(path, p))
}

fn is_api(path: &str) -> bool {
    under(path, "/api")
}

const fn is_state_changing(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

/// Whether `Origin`, or `Referer` when `Origin` is absent, names `base_origin`.
#[must_use]
pub fn is_same_origin(headers: &HeaderMap, base_origin: &str) -> bool {
    if let Some(origin) = headers.get(header::ORIGIN) {
        return origin.to_str().is_ok_and(|o| o == base_origin);
    }
    headers
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .and_then(|r| Url::parse(r).ok())
        .is_some_and(|url| url.origin().ascii_serialization() == base_origin)
}

/// The sign-in URL that returns to `path_and_query` afterwards.
#[must_use]
pub fn sign_in_url(path_and_query: &str) -> String {
    format!("/auth?next={}", urlencoding::encode(path_and_query))
}

/// Decide what to do with a request. Pure, so the rules are unit-tested.
#[must_use]
pub fn decide(
    method: &Method,
    path_and_query: &str,
    headers: &HeaderMap,
    user: Option<CurrentUser>,
    base_origin: &str,
) -> GuardDecision {
    let path = path_and_query
        .split_once('?')
        .map_or(path_and_query, |(path, _)| path);

    if !is_protected(path) {
        return GuardDecision::Allow(user);
    }

    if is_state_changing(method) && !is_same_origin(headers, base_origin) {
        return GuardDecision::Forbidden("cross-site request");
    }

    let Some(user) = user else {
        return if is_api(path) {
            GuardDecision::Unauthorized
        } else {
            GuardDecision::SignIn(sign_in_url(path_and_query))
        };
    };

    if is_admin_path(path) && !user.is_admin {
        return GuardDecision::Forbidden("admin only");
    }

    GuardDecision::Allow(Some(user))
}

fn forward_identity(headers: &mut HeaderMap, user: CurrentUser) {
    headers.insert(USER_ID_HEADER, HeaderValue::from(user.id.get()));
    headers.insert(TELEGRAM_ID_HEADER, HeaderValue::from(user.telegram_id.get()));
    if user.is_admin {
        headers.insert(ADMIN_HEADER, HeaderValue::from_static("1"));
    }
}

/// Axum middleware applying [`decide`] with the session from the cookie.
pub async fn guard_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let headers = request.headers_mut();
    headers.remove(USER_ID_HEADER);
    headers.remove(TELEGRAM_ID_HEADER);
    headers.remove(ADMIN_HEADER);

    let user = session_token(request.headers())
        .and_then(|token| {
            state
                .sessions()
                .verify(&token, Utc::now())
                .inspect_err(|e| tracing::debug!(reason = %e, "Session cookie rejected"))
                .ok()
        })
        .map(|claims| claims.current_user());

    let path_and_query = request
        .uri()
        .path_and_query()
        .map_or_else(|| request.uri().path().to_string(), |pq| pq.as_str().to_string());

    let decision = decide(
        request.method(),
        &path_and_query,
        request.headers(),
        user,
        &state.config().base_origin(),
    );

    match decision {
        GuardDecision::Allow(user) => {
            if let Some(user) = user {
                forward_identity(request.headers_mut(), user);
                tracing::Span::current().record("user_id", user.id.get());
            }
            next.run(request).await
        }
        GuardDecision::Unauthorized => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "ابتدا وارد شوید" })),
        )
            .into_response(),
        GuardDecision::SignIn(to) => Redirect::to(&to).into_response(),
        GuardDecision::Forbidden(reason) => {
            tracing::info!(path = %request.uri().path(), reason, "Request forbidden by guard");
            (
                StatusCode::FORBIDDEN,
                Json(json!({ "error": "دسترسی مجاز نیست" })),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use kafsh_core::{TelegramUserId, UserId};

    use super::*;

    const ORIGIN: &str = "https://shop.example.com";

    fn user(is_admin: bool) -> CurrentUser {
        CurrentUser {
            id: UserId::new(7),
            telegram_id: TelegramUserId::new(123_456),
            is_admin,
        }
    }

    fn with_origin(origin: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::ORIGIN, HeaderValue::from_str(origin).unwrap());
        headers
    }

    #[test]
    fn test_prefix_matching_is_segment_aware() {
        assert!(is_protected("/orders"));
        assert!(is_protected("/orders/KF-7Q2M9XHD"));
        assert!(is_protected("/api/auth/me"));
        assert!(!is_protected("/ordersomething"));
        assert!(!is_protected("/api/auth/telegram"));
        assert!(!is_protected("/products/nike-air"));
        assert!(is_admin_path("/api/admin/products"));
        assert!(!is_admin_path("/administrator"));
    }

    #[test]
    fn test_public_paths_pass_with_or_without_session() {
        let headers = HeaderMap::new();
        assert_eq!(
            decide(&Method::GET, "/products", &headers, None, ORIGIN),
            GuardDecision::Allow(None)
        );
        assert_eq!(
            decide(&Method::GET, "/", &headers, Some(user(false)), ORIGIN),
            GuardDecision::Allow(Some(user(false)))
        );
    }

    #[test]
    fn test_missing_session_api_vs_page() {
        let headers = HeaderMap::new();
        assert_eq!(
            decide(&Method::GET, "/api/cart", &headers, None, ORIGIN),
            GuardDecision::Unauthorized
        );
        assert_eq!(
            decide(&Method::GET, "/orders?page=2", &headers, None, ORIGIN),
            GuardDecision::SignIn("/auth?next=%2Forders%3Fpage%3D2".to_string())
        );
    }

    #[test]
    fn test_admin_requires_claim() {
        let headers = HeaderMap::new();
        assert_eq!(
            decide(&Method::GET, "/admin", &headers, Some(user(false)), ORIGIN),
            GuardDecision::Forbidden("admin only")
        );
        assert_eq!(
            decide(&Method::GET, "/admin/orders", &headers, Some(user(true)), ORIGIN),
            GuardDecision::Allow(Some(user(true)))
        );
    }

    #[test]
    fn test_state_changing_requires_same_origin() {
        let same = with_origin(ORIGIN);
        let cross = with_origin("https://evil.example");

        assert_eq!(
            decide(&Method::POST, "/api/orders", &same, Some(user(false)), ORIGIN),
            GuardDecision::Allow(Some(user(false)))
        );
        assert_eq!(
            decide(&Method::POST, "/api/orders", &cross, Some(user(false)), ORIGIN),
            GuardDecision::Forbidden("cross-site request")
        );
        assert_eq!(
            decide(&Method::DELETE, "/api/cart", &HeaderMap::new(), Some(user(false)), ORIGIN),
            GuardDecision::Forbidden("cross-site request")
        );
        // Unprotected writes such as sign-in are left alone.
        assert_eq!(
            decide(&Method::POST, "/api/auth/telegram", &cross, None, ORIGIN),
            GuardDecision::Allow(None)
        );
    }

    #[test]
    fn test_referer_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::REFERER,
            HeaderValue::from_static("https://shop.example.com/checkout"),
        );
        assert!(is_same_origin(&headers, ORIGIN));

        headers.insert(
            header::REFERER,
            HeaderValue::from_static("https://shop.example.com.evil.example/checkout"),
        );
        assert!(!is_same_origin(&headers, ORIGIN));
    }

    #[test]
    fn test_forward_identity() {
        let mut headers = HeaderMap::new();
        forward_identity(&mut headers, user(true));
        assert_eq!(headers.get(USER_ID_HEADER).unwrap(), "7");
        assert_eq!(headers.get(TELEGRAM_ID_HEADER).unwrap(), "123456");
        assert_eq!(headers.get(ADMIN_HEADER).unwrap(), "1");
    }
}
