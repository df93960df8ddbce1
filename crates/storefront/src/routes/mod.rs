//! HTTP route handlers for the storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                              - Home page
//! GET  /products                      - Product listing with filters
//! GET  /products/{slug}               - Product detail
//! GET  /cart                          - Cart page (filled by the client cart store)
//! GET  /checkout                      - Checkout form (session)
//! GET  /orders                        - Own orders (session)
//! GET  /orders/{code}                 - Order detail (owner or admin)
//! GET  /track?code=                   - Public order tracking
//! GET  /auth?next=                    - Telegram sign-in bootstrap
//!
//! # JSON API
//! GET    /api/products                - Product listing
//! GET    /api/products/{slug}         - Product detail
//! GET    /api/cart                    - Server cart
//! POST   /api/cart                    - Add a size
//! DELETE /api/cart                    - Clear
//! PATCH  /api/cart/{item_id}          - Set quantity (0 removes)
//! DELETE /api/cart/{item_id}          - Remove a line
//! POST   /api/cart/sync               - Merge the browser cart
//! GET    /api/orders                  - Own orders
//! POST   /api/orders                  - Place an order
//! GET    /api/orders/{code}           - Own order
//! POST   /api/orders/{code}/cancel    - Cancel a pending order
//! POST   /api/auth/telegram           - Exchange initData for a session (rate limited)
//! POST   /api/auth/logout             - Clear the session
//! GET    /api/auth/me                 - Current identity
//!
//! # Admin (admin claim)
//! See [`admin`].
//! ```

pub mod admin;
pub mod auth;
pub mod cart;
pub mod checkout;
pub mod home;
pub mod orders;
pub mod products;

use axum::{
    Router,
    routing::{get, patch, post},
};

use crate::middleware::{api_rate_limiter, auth_rate_limiter};
use crate::state::AppState;

/// Create the product page routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index))
        .route("/{slug}", get(products::show))
}

/// Create the order page routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::index))
        .route("/{code}", get(orders::show))
}

/// Create the cart API routes router.
pub fn cart_api_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::get).post(cart::add).delete(cart::clear))
        .route("/sync", post(cart::sync))
        .route("/{item_id}", patch(cart::update).delete(cart::remove))
}

/// Create the order API routes router.
pub fn order_api_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::api_index).post(checkout::place_order))
        .route("/{code}", get(orders::api_show))
        .route("/{code}/cancel", post(orders::cancel))
}

/// Create the auth API routes router.
///
/// Sits outside the API limiter; sign-in has its own stricter one.
pub fn auth_api_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/telegram",
            post(auth::telegram).layer(auth_rate_limiter()),
        )
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
}

/// Create the JSON API router.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(products::api_index))
        .route("/products/{slug}", get(products::api_show))
        .nest("/cart", cart_api_routes())
        .nest("/orders", order_api_routes())
        .nest("/admin", admin::api_routes())
        .layer(api_rate_limiter())
        .nest("/auth", auth_api_routes())
}

/// Create all page and API routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(home::home))
        .nest("/products", product_routes())
        .route("/cart", get(cart::show))
        .route("/checkout", get(checkout::show))
        .nest("/orders", order_routes())
        .route("/track", get(orders::track))
        .route("/auth", get(auth::page))
        .nest("/admin", admin::routes())
        .nest("/api", api_routes())
}
