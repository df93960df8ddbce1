//! Full middleware stack tests, in process.
//!
//! Every request here is answered before a handler touches the database,
//! so no `PostgreSQL` is needed. Requests to `/api` carry `X-Forwarded-For`
//! for the rate limiter key.

#![allow(clippy::unwrap_used)]

use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use axum::response::Response;
use chrono::{Duration, Utc};
use serde_json::Value;
use tower::ServiceExt;

use kafsh_integration_tests::{
    BASE_URL, BOT_TOKEN, same_origin, session_cookie, test_app, test_state, user,
};
use kafsh_storefront::telegram::sign_init_data;

const CLIENT_IP: &str = "203.0.113.7";

async fn send(request: Request<Body>) -> Response {
    let state = test_state();
    test_app(&state).oneshot(request).await.unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

/// Value of the `data-next` attribute on the sign-in page.
fn data_next(html: &str) -> String {
    let start = html.find(r#"data-next=""#).unwrap() + r#"data-next=""#.len();
    let end = start + html[start..].find('"').unwrap();
    html[start..end].replace("&#x2f;", "/")
}

fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
}

// ============================================================================
// Health & Headers
// ============================================================================

#[tokio::test]
async fn test_health_with_security_headers() {
    let response = send(Request::get("/health").body(Body::empty()).unwrap()).await;

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert!(headers.contains_key(header::CONTENT_SECURITY_POLICY));
    assert_eq!(headers.get(header::X_CONTENT_TYPE_OPTIONS).unwrap(), "nosniff");
    assert!(headers.contains_key("x-request-id"));
    assert_eq!(body_text(response).await, "ok");
}

#[tokio::test]
async fn test_upstream_request_id_echoed() {
    let response = send(
        Request::get("/health")
            .header("x-request-id", "edge-42")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.headers().get("x-request-id").unwrap(), "edge-42");
}

#[tokio::test]
async fn test_readiness_reports_unreachable_database() {
    let response = send(Request::get("/health/ready").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

// ============================================================================
// Guard: signed out
// ============================================================================

#[tokio::test]
async fn test_pages_redirect_to_sign_in() {
    let response = send(Request::get("/checkout").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/auth?next=%2Fcheckout");

    let response = send(Request::get("/orders?page=2").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/auth?next=%2Forders%3Fpage%3D2");
}

#[tokio::test]
async fn test_api_requires_session() {
    let response = send(
        Request::get("/api/cart")
            .header("x-forwarded-for", CLIENT_IP)
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_forged_identity_headers_ignored() {
    let response = send(
        Request::get("/api/auth/me")
            .header("x-forwarded-for", CLIENT_IP)
            .header("x-kafsh-user-id", "1")
            .header("x-kafsh-telegram-id", "42")
            .header("x-kafsh-admin", "1")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_tampered_and_expired_sessions_are_signed_out() {
    let state = test_state();
    let app = test_app(&state);

    let cookie = session_cookie(&state, user(1, true));
    let tampered = format!("{}0", cookie.to_str().unwrap());
    let response = app
        .clone()
        .oneshot(
            Request::get("/admin")
                .header(header::COOKIE, tampered)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let (token, _) = state
        .sessions()
        .issue(user(1, true), Utc::now() - Duration::hours(2));
    let response = app
        .oneshot(
            Request::get("/admin")
                .header(header::COOKIE, format!("kafsh_session={token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/auth?next=%2Fadmin");
}

// ============================================================================
// Guard: signed in
// ============================================================================

#[tokio::test]
async fn test_admin_paths_forbidden_for_customers() {
    let state = test_state();
    let app = test_app(&state);
    let cookie = session_cookie(&state, user(7, false));

    let response = app
        .clone()
        .oneshot(
            Request::get("/admin/orders")
                .header(header::COOKIE, cookie.clone())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .oneshot(
            Request::get("/api/admin/stats")
                .header(header::COOKIE, cookie)
                .header("x-forwarded-for", CLIENT_IP)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_cross_site_writes_forbidden() {
    let state = test_state();
    let app = test_app(&state);
    let cookie = session_cookie(&state, user(7, false));

    for origin in [None, Some("https://evil.example")] {
        let mut request = Request::builder()
            .method(Method::POST)
            .uri("/api/cart")
            .header(header::COOKIE, cookie.clone())
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-forwarded-for", CLIENT_IP);
        if let Some(origin) = origin {
            request = request.header(header::ORIGIN, origin);
        }
        let response = app
            .clone()
            .oneshot(request.body(Body::from(r#"{"size_id":1}"#)).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "origin {origin:?}");
    }
}

#[tokio::test]
async fn test_cross_site_write_forbidden_before_sign_in_check() {
    let response = send(
        Request::post("/api/orders")
            .header(header::ORIGIN, "https://evil.example")
            .header("x-forwarded-for", CLIENT_IP)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_same_origin_write_reaches_handler() {
    let state = test_state();
    let app = test_app(&state);
    let cookie = session_cookie(&state, user(7, false));
    let (name, value) = same_origin();

    let response = app
        .clone()
        .oneshot(
            Request::post("/api/cart")
                .header(header::COOKIE, cookie.clone())
                .header(name, value)
                .header(header::CONTENT_TYPE, "application/json")
                .header("x-forwarded-for", CLIENT_IP)
                .body(Body::from(r#"{"size_id":1,"quantity":0}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(response).await["error"].is_string());

    // Referer stands in when Origin is absent.
    let response = app
        .oneshot(
            Request::post("/api/cart")
                .header(header::COOKIE, cookie)
                .header(header::REFERER, format!("{BASE_URL}/products/runner-x"))
                .header(header::CONTENT_TYPE, "application/json")
                .header("x-forwarded-for", CLIENT_IP)
                .body(Body::from(r#"{"size_id":1,"quantity":0}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_unknown_status_is_bad_request_page() {
    let state = test_state();
    let cookie = session_cookie(&state, user(1, true));
    let (name, value) = same_origin();

    let response = test_app(&state)
        .oneshot(
            Request::post("/admin/orders/KF-7Q2M9XHD/status")
                .header(header::COOKIE, cookie)
                .header(name, value)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("status=lost"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.headers().get(header::LOCATION).is_none());
    assert!(body_text(response).await.contains("<h1>400</h1>"));
}

// ============================================================================
// Sign-in
// ============================================================================

#[tokio::test]
async fn test_auth_page_keeps_only_local_next() {
    let response = send(Request::get("/auth?next=%2Forders").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("data-auth"));
    assert_eq!(data_next(&html), "/orders");

    let response = send(
        Request::get("/auth?next=https%3A%2F%2Fevil.example")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    let html = body_text(response).await;
    assert!(!html.contains("evil.example"));
    assert_eq!(data_next(&html), "/");
}

#[tokio::test]
async fn test_bad_init_data_rejected() {
    let response = send(
        Request::post("/api/auth/telegram")
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-forwarded-for", CLIENT_IP)
            .body(Body::from(
                r#"{"init_data":"auth_date=1700000000&user=%7B%22id%22%3A1%7D&hash=00"}"#,
            ))
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
}

fn sign_in_request(init_data: &str, client_ip: &str) -> Request<Body> {
    let body = serde_json::json!({ "init_data": init_data }).to_string();
    Request::post("/api/auth/telegram")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", client_ip)
        .body(Body::from(body))
        .unwrap()
}

fn signed_payload(auth_date: i64) -> String {
    let user = r#"{"id":42,"first_name":"Sara"}"#;
    sign_init_data(&[("auth_date", &auth_date.to_string()), ("user", user)], BOT_TOKEN)
}

#[tokio::test]
async fn test_sign_in_failures_look_alike() {
    let state = test_state();
    let app = test_app(&state);
    let now = Utc::now().timestamp();

    let expired = signed_payload(now - 2 * 86_400);
    let fresh = signed_payload(now);
    let (unsigned, _) = fresh.rsplit_once("&hash=").unwrap();
    let tampered = fresh.replacen(
        &format!("auth_date={now}"),
        &format!("auth_date={}", now - 1),
        1,
    );
    assert_ne!(tampered, fresh);

    let mut answers = Vec::new();
    for init_data in [expired.as_str(), unsigned, tampered.as_str()] {
        let response = app
            .clone()
            .oneshot(sign_in_request(init_data, CLIENT_IP))
            .await
            .unwrap();
        let status = response.status();
        let has_cookie = response.headers().contains_key(header::SET_COOKIE);
        answers.push((status, has_cookie, body_text(response).await));
    }

    assert_eq!(answers[0].0, StatusCode::UNAUTHORIZED);
    assert!(!answers[0].1);
    assert_eq!(answers[0], answers[1]);
    assert_eq!(answers[1], answers[2]);
}

#[tokio::test]
async fn test_sign_in_limit_ignores_spoofed_forwarded_for() {
    let state = test_state();
    let app = test_app(&state);

    let mut statuses = Vec::new();
    for i in 0..8 {
        let client_ip = format!("10.9.9.{i}, 198.51.100.2");
        let response = app
            .clone()
            .oneshot(sign_in_request("hash=00", &client_ip))
            .await
            .unwrap();
        statuses.push(response.status());
    }

    assert_eq!(statuses[0], StatusCode::UNAUTHORIZED);
    assert!(statuses.contains(&StatusCode::TOO_MANY_REQUESTS), "{statuses:?}");
}

// ============================================================================
// Public pages
// ============================================================================

#[tokio::test]
async fn test_track_rejects_malformed_code_without_lookup() {
    let response = send(Request::get("/track?code=nope").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("KF-7Q2M9XHD"));
}
