//! Checkout route handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;
use tracing::instrument;

use kafsh_core::Price;

use crate::db::UserRepository;
use crate::error::{AppError, PageError};
use crate::filters;
use crate::middleware::RequireUser;
use crate::services::CheckoutService;
use crate::services::checkout::{CheckoutRequest, MAX_ORDER_LINES};
use crate::state::AppState;
use crate::views::PageContext;

/// Checkout page template.
#[derive(Template, WebTemplate)]
#[template(path = "checkout.html")]
pub struct CheckoutTemplate {
    pub page: PageContext,
    pub recipient_name: String,
    pub phone: String,
    pub shipping_fee: String,
    pub free_shipping_threshold: Option<String>,
    pub max_quantity: u32,
    pub max_lines: usize,
}

/// Response to a placed order.
#[derive(Debug, Serialize)]
pub struct OrderPlaced {
    pub tracking_code: String,
    pub total: Price,
    pub total_fa: String,
    /// Order page to navigate to.
    pub url: String,
}

/// Display the checkout form, prefilled from the user's profile.
#[instrument(skip(state), fields(user_id = %user.id))]
pub async fn show(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<impl IntoResponse, PageError> {
    let profile = UserRepository::new(state.pool()).get_by_id(user.id).await?;
    let shop = &state.config().shop;

    Ok(CheckoutTemplate {
        page: PageContext::new(&state, Some(user)),
        recipient_name: profile.as_ref().map(|u| u.display_name()).unwrap_or_default(),
        phone: profile.and_then(|u| u.phone).unwrap_or_default(),
        shipping_fee: shop.shipping_fee.display_fa(),
        free_shipping_threshold: shop.free_shipping_threshold.map(|p| p.display_fa()),
        max_quantity: shop.max_line_quantity,
        max_lines: MAX_ORDER_LINES,
    })
}

/// Place an order from the submitted lines and shipping details.
///
/// Prices come from the catalog; any price the client sends is ignored.
/// After commit the catalog cache is dropped (stock changed) and the
/// customer and admin chat are notified in the background.
#[instrument(skip(state, request), fields(user_id = %user.id))]
pub async fn place_order(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Json(request): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, AppError> {
    let order = CheckoutService::new(state.pool(), &state.config().shop)
        .place_order(user, &request)
        .await?;

    state.catalog().invalidate();
    state.notifier().order_placed(&order);

    Ok((
        StatusCode::CREATED,
        Json(OrderPlaced {
            url: format!("/orders/{}", order.tracking_code),
            tracking_code: order.tracking_code.to_string(),
            total: order.total,
            total_fa: order.total.display_fa(),
        }),
    ))
}
