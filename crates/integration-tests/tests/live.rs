//! Tests against a running storefront.
//!
//! These tests require:
//! - A migrated and seeded `PostgreSQL` database (`kafsh-cli migrate`,
//!   `kafsh-cli seed catalog --file crates/cli/seed/catalog.yaml`)
//! - The storefront running (`cargo run -p kafsh-storefront`)
//! - `STOREFRONT_URL` equal to the server's `STOREFRONT_BASE_URL`
//! - `TELEGRAM_BOT_TOKEN` equal to the server's token
//!
//! Run with: cargo test -p kafsh-integration-tests -- --ignored

#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::Utc;
use reqwest::{Client, StatusCode, header};
use serde_json::{Value, json};

use kafsh_storefront::telegram::sign_init_data;

/// Base URL for the storefront (configurable via environment).
fn base_url() -> String {
    std::env::var("STOREFRONT_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
}

/// Client that keeps cookies and sends a same-origin `Origin` on every request.
fn client() -> Client {
    let mut headers = header::HeaderMap::new();
    headers.insert(header::ORIGIN, base_url().parse().unwrap());
    Client::builder()
        .cookie_store(true)
        .redirect(reqwest::redirect::Policy::none())
        .default_headers(headers)
        .build()
        .expect("Failed to create HTTP client")
}

/// Sign in as a test Telegram user and return the client holding the session.
async fn signed_in_client(telegram_id: i64) -> Client {
    let token = std::env::var("TELEGRAM_BOT_TOKEN").expect("TELEGRAM_BOT_TOKEN not set");
    let user =
        json!({ "id": telegram_id, "first_name": "Test", "language_code": "fa" }).to_string();
    let auth_date = Utc::now().timestamp().to_string();
    let init_data = sign_init_data(&[("auth_date", &auth_date), ("user", &user)], &token);

    let client = client();
    let resp = client
        .post(format!("{}/api/auth/telegram", base_url()))
        .json(&json!({ "init_data": init_data }))
        .send()
        .await
        .expect("Failed to sign in");
    assert_eq!(resp.status(), StatusCode::OK);
    client
}

/// One size from the seeded catalog, as the product API reports it.
#[derive(Debug, Clone)]
struct LiveSize {
    id: i64,
    stock: i64,
    slug: String,
    product_name: String,
    unit_price: i64,
}

/// Toman amount from a serialized `Price` (string or number).
fn toman(value: &Value) -> i64 {
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
        .unwrap()
}

async fn product_detail(client: &Client, slug: &str) -> Value {
    client
        .get(format!("{}/api/products/{slug}", base_url()))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

/// Every size of every active product in the seeded catalog.
async fn catalog_sizes(client: &Client) -> Vec<LiveSize> {
    let listing: Value = client
        .get(format!("{}/api/products", base_url()))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let mut sizes = Vec::new();
    for item in listing["items"].as_array().unwrap() {
        let slug = item["slug"].as_str().unwrap();
        let detail = product_detail(client, slug).await;
        let product = &detail["product"];
        let price = toman(&product["price"]);
        let unit_price = if product["sale_price"].is_null() {
            price
        } else {
            toman(&product["sale_price"]).min(price)
        };

        for variant in detail["variants"].as_array().unwrap() {
            for size in variant["sizes"].as_array().unwrap() {
                sizes.push(LiveSize {
                    id: size["id"].as_i64().unwrap(),
                    stock: size["stock"].as_i64().unwrap(),
                    slug: slug.to_string(),
                    product_name: product["name"].as_str().unwrap().to_string(),
                    unit_price,
                });
            }
        }
    }
    sizes
}

/// The in-stock size that sorts first by `key`.
///
/// Tests that read stock pick sizes by different keys so they never share one.
async fn stocked_size_by<K: Ord>(client: &Client, key: impl Fn(&LiveSize) -> K) -> LiveSize {
    catalog_sizes(client)
        .await
        .into_iter()
        .filter(|size| size.stock > 0)
        .min_by_key(|size| key(size))
        .expect("seeded catalog has no size in stock")
}

/// Current stock of a size, read through the product API.
async fn stock_of(client: &Client, size: &LiveSize) -> i64 {
    let detail = product_detail(client, &size.slug).await;
    detail["variants"]
        .as_array()
        .unwrap()
        .iter()
        .flat_map(|v| v["sizes"].as_array().unwrap().iter())
        .find(|s| s["id"].as_i64() == Some(size.id))
        .and_then(|s| s["stock"].as_i64())
        .unwrap()
}

fn shipping() -> Value {
    json!({
        "recipient_name": "سارا تست",
        "phone": "۰۹۱۲۱۲۳۴۵۶۷",
        "province": "تهران",
        "city": "تهران",
        "address": "خیابان آزادی، پلاک ۱۲",
        "postal_code": "1234567890"
    })
}

async fn get_json(client: &Client, path: &str) -> Value {
    client
        .get(format!("{}{path}", base_url()))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

// ============================================================================
// Health & Catalog
// ============================================================================

#[tokio::test]
#[ignore = "Requires running storefront and database"]
async fn test_ready() {
    let resp = client()
        .get(format!("{}/health/ready", base_url()))
        .send()
        .await
        .expect("Failed to reach server");
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
#[ignore = "Requires running storefront and database"]
async fn test_product_pages_render() {
    let client = client();
    let base_url = base_url();

    let resp = client.get(format!("{base_url}/products")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = resp.text().await.unwrap();
    assert!(body.contains("dir=\"rtl\""));

    let resp = client
        .get(format!("{base_url}/products/no-such-shoe"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// ============================================================================
// Sign-in & Cart
// ============================================================================

#[tokio::test]
#[ignore = "Requires running storefront, database and TELEGRAM_BOT_TOKEN"]
async fn test_sign_in_me_logout() {
    let client = signed_in_client(990_000_001).await;
    let base_url = base_url();

    let me: Value = client
        .get(format!("{base_url}/api/auth/me"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(me["user"]["telegram_id"], 990_000_001);

    let resp = client
        .post(format!("{base_url}/api/auth/logout"))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());

    let resp = client
        .get(format!("{base_url}/api/auth/me"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore = "Requires running storefront, seeded database and TELEGRAM_BOT_TOKEN"]
async fn test_cart_add_and_clear() {
    let client = signed_in_client(990_000_002).await;
    let base_url = base_url();
    let size_id = stocked_size_by(&client, |size| size.id).await.id;

    client
        .delete(format!("{base_url}/api/cart"))
        .send()
        .await
        .unwrap();

    let cart: Value = client
        .post(format!("{base_url}/api/cart"))
        .json(&json!({ "size_id": size_id, "quantity": 1 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(cart["item_count"], 1);
    assert_eq!(cart["lines"][0]["size_id"], size_id);

    let resp = client
        .delete(format!("{base_url}/api/cart"))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());

    let cart: Value = client
        .get(format!("{base_url}/api/cart"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(cart["item_count"], 0);
}

#[tokio::test]
#[ignore = "Requires running storefront, seeded database and TELEGRAM_BOT_TOKEN"]
async fn test_cart_sync_keeps_larger_quantity() {
    let client = signed_in_client(990_000_003).await;
    let base_url = base_url();
    let sizes = catalog_sizes(&client).await;
    let kept = sizes.iter().find(|s| s.stock >= 3).unwrap();
    let sold_out = sizes.iter().find(|s| s.stock == 0).unwrap();

    client
        .delete(format!("{base_url}/api/cart"))
        .send()
        .await
        .unwrap();
    client
        .post(format!("{base_url}/api/cart"))
        .json(&json!({ "size_id": kept.id, "quantity": 2 }))
        .send()
        .await
        .unwrap();

    let cart: Value = client
        .post(format!("{base_url}/api/cart/sync"))
        .json(&json!({ "items": [
            { "size_id": kept.id, "quantity": 1 },
            { "size_id": sold_out.id, "quantity": 1 },
            { "size_id": 2_000_000_000, "quantity": 1 }
        ] }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let lines = cart["lines"].as_array().unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["size_id"], kept.id);
    assert_eq!(lines[0]["quantity"], 2);

    let cart: Value = client
        .post(format!("{base_url}/api/cart/sync"))
        .json(&json!({ "items": [{ "size_id": kept.id, "quantity": 3 }] }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(cart["lines"][0]["quantity"], 3);

    client
        .delete(format!("{base_url}/api/cart"))
        .send()
        .await
        .unwrap();
}

// ============================================================================
// Orders
// ============================================================================

#[tokio::test]
#[ignore = "Requires running storefront, seeded database and TELEGRAM_BOT_TOKEN"]
async fn test_order_takes_stock_and_cancel_restores_it() {
    let client = signed_in_client(990_000_004).await;
    let base_url = base_url();
    // Most stock: never sold out by this test.
    let size = stocked_size_by(&client, |size| std::cmp::Reverse(size.stock)).await;
    let stock_before = stock_of(&client, &size).await;

    client
        .post(format!("{base_url}/api/cart"))
        .json(&json!({ "size_id": size.id, "quantity": 1 }))
        .send()
        .await
        .unwrap();

    let resp = client
        .post(format!("{base_url}/api/orders"))
        .json(&json!({
            "shipping": shipping(),
            "items": [{ "size_id": size.id, "quantity": 1, "price": 1, "unit_price": 1 }]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let placed: Value = resp.json().await.unwrap();
    let code = placed["tracking_code"].as_str().unwrap().to_string();
    assert!(code.starts_with("KF-"));

    let order = get_json(&client, &format!("/api/orders/{code}")).await;
    assert_eq!(order["status"], "pending");
    assert_eq!(toman(&order["items"][0]["unit_price"]), size.unit_price);
    assert!(toman(&order["total"]) >= size.unit_price);
    assert_eq!(stock_of(&client, &size).await, stock_before - 1);
    assert_eq!(get_json(&client, "/api/cart").await["item_count"], 0);

    let resp = client
        .post(format!("{base_url}/api/orders/{code}/cancel"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let order: Value = resp.json().await.unwrap();
    assert_eq!(order["status"], "cancelled");
    assert_eq!(stock_of(&client, &size).await, stock_before);

    let resp = client
        .post(format!("{base_url}/api/orders/{code}/cancel"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(stock_of(&client, &size).await, stock_before);
}

#[tokio::test]
#[ignore = "Requires running storefront, seeded database and TELEGRAM_BOT_TOKEN"]
async fn test_order_beyond_stock_names_product() {
    let client = signed_in_client(990_000_005).await;
    let size = stocked_size_by(&client, |size| size.stock).await;
    assert!(size.stock < 10, "seeded stock must stay under the line maximum");

    let resp = client
        .post(format!("{}/api/orders", base_url()))
        .json(&json!({
            "shipping": shipping(),
            "items": [{ "size_id": size.id, "quantity": size.stock + 1 }]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains(&size.product_name));
    assert_eq!(stock_of(&client, &size).await, size.stock);
}

#[tokio::test]
#[ignore = "Requires running storefront and database"]
async fn test_unknown_tracking_code() {
    let resp = client()
        .get(format!("{}/track?code=KF-ZZZZZZZZ", base_url()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.text().await.unwrap().contains("پیدا نشد"));
}
