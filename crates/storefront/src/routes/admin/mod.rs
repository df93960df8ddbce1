//! Admin panel routes.
//!
//! Everything here sits behind the admin claim, checked by the route guard
//! and again by the [`RequireAdmin`](crate::middleware::RequireAdmin) extractor.
//! Forms post back and redirect (303) with a `msg` query parameter.
//!
//! ```text
//! GET  /admin                                            - Dashboard
//! GET  /admin/products                                   - Product list (search, inactive)
//! POST /admin/products                                   - Create product
//! GET  /admin/products/new                               - New product form
//! GET  /admin/products/{id}                              - Edit product
//! POST /admin/products/{id}                              - Update fields
//! POST /admin/products/{id}/toggle                       - Toggle active
//! POST /admin/products/{id}/variants                     - Add variant
//! POST /admin/products/{id}/variants/{variant_id}/toggle - Toggle variant
//! POST /admin/products/{id}/sizes                        - Add size
//! POST /admin/products/{id}/sizes/{size_id}/stock        - Set stock
//! POST /admin/products/{id}/images                       - Add image
//! POST /admin/products/{id}/images/{image_id}/delete     - Delete image
//! GET  /admin/orders                                     - Orders (status filter, paged)
//! GET  /admin/orders/{code}                              - Order detail
//! POST /admin/orders/{code}/status                       - Change status
//!
//! GET  /api/admin/stats                                  - Dashboard figures
//! GET  /api/admin/orders                                 - Orders as JSON
//! POST /api/admin/orders/{code}/status                   - Change status (JSON)
//! ```

pub mod dashboard;
pub mod orders;
pub mod products;

use axum::{
    Router,
    response::Redirect,
    routing::{get, post},
};

use crate::state::AppState;

/// Redirect to `path` with a notice shown at the top of the page.
#[must_use]
pub fn redirect_with_message(path: &str, message: &str) -> Redirect {
    let sep = if path.contains('?') { '&' } else { '?' };
    Redirect::to(&format!("{path}{sep}msg={}", urlencoding::encode(message)))
}

/// Create the admin page routes router.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(dashboard::dashboard))
        .route("/products", get(products::index).post(products::create))
        .route("/products/new", get(products::new_form))
        .route("/products/{id}", get(products::edit).post(products::update))
        .route("/products/{id}/toggle", post(products::toggle))
        .route("/products/{id}/variants", post(products::add_variant))
        .route(
            "/products/{id}/variants/{variant_id}/toggle",
            post(products::toggle_variant),
        )
        .route("/products/{id}/sizes", post(products::add_size))
        .route(
            "/products/{id}/sizes/{size_id}/stock",
            post(products::set_stock),
        )
        .route("/products/{id}/images", post(products::add_image))
        .route(
            "/products/{id}/images/{image_id}/delete",
            post(products::delete_image),
        )
        .route("/orders", get(orders::index))
        .route("/orders/{code}", get(orders::show))
        .route("/orders/{code}/status", post(orders::update_status))
}

/// Create the admin JSON API router.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/stats", get(dashboard::api_stats))
        .route("/orders", get(orders::api_index))
        .route("/orders/{code}/status", post(orders::api_update_status))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::header::LOCATION;
    use axum::response::IntoResponse;

    use super::*;

    #[test]
    fn test_redirect_with_message() {
        let response = redirect_with_message("/admin/products/3", "ذخیره شد").into_response();
        let location = response.headers().get(LOCATION).unwrap().to_str().unwrap();
        assert_eq!(
            location,
            format!("/admin/products/3?msg={}", urlencoding::encode("ذخیره شد"))
        );

        let response = redirect_with_message("/admin/orders?status=pending", "ok").into_response();
        let location = response.headers().get(LOCATION).unwrap().to_str().unwrap();
        assert_eq!(location, "/admin/orders?status=pending&msg=ok");
    }
}
