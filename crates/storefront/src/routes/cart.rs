//! Cart route handlers.
//!
//! The cart page is rendered for everyone and filled in the browser from the
//! local cart store. Signed-in clients keep a server cart through the JSON
//! endpoints; every endpoint only touches the caller's own rows and always
//! answers with the full reconciled cart.

use std::collections::HashMap;

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use kafsh_core::{CartItemId, Price, SizeId};

use crate::config::ShopConfig;
use crate::db::CartRepository;
use crate::error::AppError;
use crate::filters;
use crate::middleware::{OptionalUser, RequireUser};
use crate::models::{Cart, CartLine};
use crate::services::checkout::{ItemInput, shipping_cost};
use crate::state::AppState;
use crate::views::PageContext;

/// Most browser cart lines accepted by one sync.
pub const MAX_SYNC_ITEMS: usize = 50;

// =============================================================================
// Requests and responses
// =============================================================================

/// Body of `POST /api/cart`.
#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub size_id: SizeId,
    #[serde(default = "one")]
    pub quantity: u32,
}

const fn one() -> u32 {
    1
}

/// Body of `PATCH /api/cart/{item_id}`.
#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    pub quantity: u32,
}

/// Body of `POST /api/cart/sync`.
#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    #[serde(default)]
    pub items: Vec<ItemInput>,
}

/// One cart line as returned to the client.
#[derive(Debug, Serialize)]
pub struct CartLineResponse {
    #[serde(flatten)]
    pub line: CartLine,
    pub line_total: Price,
    pub unit_price_fa: String,
    pub line_total_fa: String,
}

/// The caller's cart with authoritative prices.
#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub lines: Vec<CartLineResponse>,
    pub item_count: u32,
    pub subtotal: Price,
    pub shipping_cost: Price,
    pub total: Price,
    pub subtotal_fa: String,
    pub shipping_cost_fa: String,
    pub total_fa: String,
    /// Whether any line can no longer be bought.
    pub has_unavailable: bool,
}

impl CartResponse {
    #[must_use]
    pub fn new(cart: Cart, shop: &ShopConfig) -> Self {
        let subtotal = cart.subtotal();
        let shipping = if cart.is_empty() {
            Price::ZERO
        } else {
            shipping_cost(subtotal, shop)
        };
        let total = subtotal.checked_add(shipping).unwrap_or(subtotal);
        let item_count = cart.item_count();
        let has_unavailable = cart.lines.iter().any(|line| !line.available);

        Self {
            lines: cart
                .lines
                .into_iter()
                .map(|line| {
                    let line_total = line.line_total();
                    CartLineResponse {
                        unit_price_fa: line.unit_price.display_fa(),
                        line_total_fa: line_total.display_fa(),
                        line_total,
                        line,
                    }
                })
                .collect(),
            item_count,
            subtotal,
            shipping_cost: shipping,
            total,
            subtotal_fa: subtotal.display_fa(),
            shipping_cost_fa: shipping.display_fa(),
            total_fa: total.display_fa(),
            has_unavailable,
        }
    }
}

/// Sum duplicate sizes, clamp each to `max_quantity` and drop zero lines.
/// Keeps first-seen order and at most [`MAX_SYNC_ITEMS`] sizes.
#[must_use]
pub fn normalize_sync_items(items: &[ItemInput], max_quantity: u32) -> Vec<(SizeId, u32)> {
    let mut order: Vec<SizeId> = Vec::new();
    let mut totals: HashMap<SizeId, u32> = HashMap::new();

    for item in items.iter().filter(|item| item.quantity > 0) {
        let total = totals.entry(item.size_id).or_insert_with(|| {
            order.push(item.size_id);
            0
        });
        *total = total.saturating_add(item.quantity);
    }

    order
        .into_iter()
        .take(MAX_SYNC_ITEMS)
        .filter_map(|size_id| {
            totals
                .get(&size_id)
                .map(|quantity| (size_id, (*quantity).min(max_quantity)))
        })
        .collect()
}

// =============================================================================
// Page
// =============================================================================

/// Cart page template.
#[derive(Template, WebTemplate)]
#[template(path = "cart/show.html")]
pub struct CartTemplate {
    pub page: PageContext,
    pub max_quantity: u32,
    pub shipping_fee: String,
    pub free_shipping_threshold: Option<String>,
}

/// Display the cart page.
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    OptionalUser(user): OptionalUser,
) -> impl IntoResponse {
    let shop = &state.config().shop;
    CartTemplate {
        page: PageContext::new(&state, user),
        max_quantity: shop.max_line_quantity,
        shipping_fee: shop.shipping_fee.display_fa(),
        free_shipping_threshold: shop.free_shipping_threshold.map(|p| p.display_fa()),
    }
}

// =============================================================================
// JSON API
// =============================================================================

async fn cart_response(
    state: &AppState,
    user_id: kafsh_core::UserId,
) -> Result<Json<CartResponse>, AppError> {
    let cart = CartRepository::new(state.pool()).get(user_id).await?;
    Ok(Json(CartResponse::new(cart, &state.config().shop)))
}

/// Return the caller's server cart.
#[instrument(skip(state), fields(user_id = %user.id))]
pub async fn get(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<CartResponse>, AppError> {
    cart_response(&state, user.id).await
}

/// Add a size or increment its quantity.
#[instrument(skip(state), fields(user_id = %user.id))]
pub async fn add(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Json(request): Json<AddItemRequest>,
) -> Result<Json<CartResponse>, AppError> {
    if request.quantity == 0 {
        return Err(AppError::BadRequest("تعداد باید حداقل ۱ باشد".to_string()));
    }

    let repo = CartRepository::new(state.pool());
    let availability = repo
        .size_availability(request.size_id)
        .await?
        .ok_or_else(|| AppError::NotFound("سایز".to_string()))?;
    if !availability.purchasable() {
        return Err(AppError::BadRequest("این سایز در حال حاضر موجود نیست".to_string()));
    }

    let max = state.config().shop.max_line_quantity;
    repo.add(user.id, request.size_id, request.quantity, max).await?;
    tracing::debug!(size_id = %request.size_id, "Added to cart");

    cart_response(&state, user.id).await
}

/// Set a line's quantity; zero removes it.
#[instrument(skip(state), fields(user_id = %user.id))]
pub async fn update(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(item_id): Path<CartItemId>,
    Json(request): Json<UpdateItemRequest>,
) -> Result<Json<CartResponse>, AppError> {
    let repo = CartRepository::new(state.pool());
    if request.quantity == 0 {
        repo.remove(user.id, item_id).await?;
    } else {
        let quantity = request.quantity.min(state.config().shop.max_line_quantity);
        repo.set_quantity(user.id, item_id, quantity).await?;
    }

    cart_response(&state, user.id).await
}

/// Remove one line.
#[instrument(skip(state), fields(user_id = %user.id))]
pub async fn remove(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(item_id): Path<CartItemId>,
) -> Result<Json<CartResponse>, AppError> {
    CartRepository::new(state.pool())
        .remove(user.id, item_id)
        .await?;
    cart_response(&state, user.id).await
}

/// Empty the cart.
#[instrument(skip(state), fields(user_id = %user.id))]
pub async fn clear(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<CartResponse>, AppError> {
    CartRepository::new(state.pool()).clear(user.id).await?;
    cart_response(&state, user.id).await
}

/// Merge the browser cart into the server cart and return the result.
///
/// Unknown and unavailable sizes are dropped; each size keeps the larger of
/// the two quantities.
#[instrument(skip(state, request), fields(user_id = %user.id, items = request.items.len()))]
pub async fn sync(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Json(request): Json<SyncRequest>,
) -> Result<Json<CartResponse>, AppError> {
    let max = state.config().shop.max_line_quantity;
    let repo = CartRepository::new(state.pool());

    let mut accepted = Vec::new();
    for (size_id, quantity) in normalize_sync_items(&request.items, max) {
        match repo.size_availability(size_id).await? {
            Some(availability) if availability.purchasable() => accepted.push((size_id, quantity)),
            _ => tracing::debug!(size_id = %size_id, "Dropping unavailable size from sync"),
        }
    }

    repo.merge(user.id, &accepted, max).await?;
    cart_response(&state, user.id).await
}
