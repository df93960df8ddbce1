//! Identity extractors.
//!
//! The route guard verifies the session cookie and forwards the identity as
//! `x-kafsh-*` request headers (after stripping any the client sent). These
//! extractors read those headers.

use axum::{
    Json,
    extract::FromRequestParts,
    http::{HeaderMap, StatusCode, request::Parts},
    response::{IntoResponse, Redirect, Response},
};
use serde_json::json;

use super::guard::{ADMIN_HEADER, TELEGRAM_ID_HEADER, USER_ID_HEADER, sign_in_url};
use crate::models::CurrentUser;

/// Read the identity forwarded by the guard.
#[must_use]
pub fn current_user(headers: &HeaderMap) -> Option<CurrentUser> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    Some(CurrentUser {
        id: header(USER_ID_HEADER)?.parse().ok()?,
        telegram_id: header(TELEGRAM_ID_HEADER)?.parse().ok()?,
        is_admin: header(ADMIN_HEADER) == Some("1"),
    })
}

/// Extractor that requires a signed-in user.
///
/// # Example
///
/// ```rust,ignore
/// async fn orders(RequireUser(user): RequireUser) -> impl IntoResponse {
///     format!("orders of {}", user.id)
/// }
/// ```
pub struct RequireUser(pub CurrentUser);

/// Error returned when an extractor's requirement is not met.
#[derive(Debug)]
pub enum AuthRejection {
    /// Redirect to the sign-in page (for HTML requests).
    SignIn(String),
    /// Unauthorized response (for API requests).
    Unauthorized,
    /// Signed in without the admin claim.
    Forbidden,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::SignIn(to) => Redirect::to(&to).into_response(),
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "ابتدا وارد شوید" })),
            )
                .into_response(),
            Self::Forbidden => (
                StatusCode::FORBIDDEN,
                Json(json!({ "error": "دسترسی مجاز نیست" })),
            )
                .into_response(),
        }
    }
}

fn missing_user(parts: &Parts) -> AuthRejection {
    if parts.uri.path().starts_with("/api/") {
        AuthRejection::Unauthorized
    } else {
        let target = parts
            .uri
            .path_and_query()
            .map_or_else(|| parts.uri.path(), |pq| pq.as_str());
        AuthRejection::SignIn(sign_in_url(target))
    }
}

impl<S> FromRequestParts<S> for RequireUser
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        current_user(&parts.headers)
            .map(Self)
            .ok_or_else(|| missing_user(parts))
    }
}

/// Extractor that optionally gets the current user.
///
/// Unlike `RequireUser`, this does not reject the request if nobody is signed in.
pub struct OptionalUser(pub Option<CurrentUser>);

impl<S> FromRequestParts<S> for OptionalUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(current_user(&parts.headers)))
    }
}

/// Extractor that requires a signed-in admin.
pub struct RequireAdmin(pub CurrentUser);

impl<S> FromRequestParts<S> for RequireAdmin
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = current_user(&parts.headers).ok_or_else(|| missing_user(parts))?;
        if !user.is_admin {
            return Err(AuthRejection::Forbidden);
        }
        Ok(Self(user))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::{HeaderValue, Request};

    use kafsh_core::{TelegramUserId, UserId};

    use super::*;

    fn parts(uri: &str, headers: &[(&'static str, &'static str)]) -> Parts {
        let mut builder = Request::builder().uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, HeaderValue::from_static(value));
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_current_user_parses_headers() {
        let p = parts("/", &[(USER_ID_HEADER, "5"), (TELEGRAM_ID_HEADER, "99")]);
        assert_eq!(
            current_user(&p.headers),
            Some(CurrentUser {
                id: UserId::new(5),
                telegram_id: TelegramUserId::new(99),
                is_admin: false,
            })
        );

        let p = parts("/", &[(USER_ID_HEADER, "abc"), (TELEGRAM_ID_HEADER, "99")]);
        assert_eq!(current_user(&p.headers), None);
    }

    #[tokio::test]
    async fn test_require_user_rejections() {
        let mut p = parts("/api/cart", &[]);
        let rejection = RequireUser::from_request_parts(&mut p, &()).await.err().unwrap();
        assert!(matches!(rejection, AuthRejection::Unauthorized));

        let mut p = parts("/checkout", &[]);
        let rejection = RequireUser::from_request_parts(&mut p, &()).await.err().unwrap();
        assert!(matches!(rejection, AuthRejection::SignIn(to) if to == "/auth?next=%2Fcheckout"));
    }

    #[tokio::test]
    async fn test_require_admin() {
        let mut p = parts("/admin", &[(USER_ID_HEADER, "1"), (TELEGRAM_ID_HEADER, "2")]);
        assert!(matches!(
            RequireAdmin::from_request_parts(&mut p, &()).await,
            Err(AuthRejection::Forbidden)
        ));

        let mut p = parts(
            "/admin",
            &[(USER_ID_HEADER, "1"), (TELEGRAM_ID_HEADER, "2"), (ADMIN_HEADER, "1")],
        );
        let RequireAdmin(user) = RequireAdmin::from_request_parts(&mut p, &()).await.unwrap();
        assert!(user.is_admin);
    }
}
