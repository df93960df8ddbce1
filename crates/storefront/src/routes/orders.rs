//! Order route handlers: the customer's orders, cancellation and public tracking.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::instrument;

use kafsh_core::locale::to_persian_digits;
use kafsh_core::{OrderStatus, TrackingCode};

use crate::db::OrderRepository;
use crate::error::{AppError, PageError};
use crate::filters;
use crate::middleware::{OptionalUser, RequireUser};
use crate::models::{CurrentUser, Order, OrderItem, OrderSummary, OrderTracking, StatusChange};
use crate::state::AppState;
use crate::views::{PageContext, jalali_date, jalali_datetime};

/// Statuses an order passes through on the happy path, in order.
const PROGRESS: [OrderStatus; 4] = [
    OrderStatus::Pending,
    OrderStatus::Confirmed,
    OrderStatus::Shipped,
    OrderStatus::Delivered,
];

// =============================================================================
// Views
// =============================================================================

/// Order line display data.
#[derive(Clone)]
pub struct OrderItemView {
    pub product_name: String,
    pub color_name: String,
    pub size_label: String,
    pub quantity: String,
    pub unit_price: String,
    pub line_total: String,
}

impl From<&OrderItem> for OrderItemView {
    fn from(item: &OrderItem) -> Self {
        Self {
            product_name: item.product_name.clone(),
            color_name: item.color_name.clone(),
            size_label: to_persian_digits(&item.size_label),
            quantity: to_persian_digits(&item.quantity.to_string()),
            unit_price: item.unit_price.display_fa(),
            line_total: item.line_total.display_fa(),
        }
    }
}

/// Full order display data, shared with the admin order page.
#[derive(Clone)]
pub struct OrderView {
    pub tracking_code: String,
    pub status: OrderStatus,
    pub status_label: &'static str,
    pub created_at: String,
    pub updated_at: String,
    pub recipient_name: String,
    pub phone: String,
    pub province: String,
    pub city: String,
    pub address: String,
    pub postal_code: String,
    pub note: Option<String>,
    pub items: Vec<OrderItemView>,
    pub item_count: String,
    pub subtotal: String,
    pub shipping_cost: String,
    pub free_shipping: bool,
    pub total: String,
    pub can_cancel: bool,
}

impl From<&Order> for OrderView {
    fn from(order: &Order) -> Self {
        Self {
            tracking_code: order.tracking_code.to_string(),
            status: order.status,
            status_label: order.status.label_fa(),
            created_at: jalali_datetime(order.created_at),
            updated_at: jalali_datetime(order.updated_at),
            recipient_name: order.shipping.recipient_name.clone(),
            phone: order.shipping.phone.display_fa(),
            province: order.shipping.province.clone(),
            city: order.shipping.city.clone(),
            address: order.shipping.address.clone(),
            postal_code: to_persian_digits(order.shipping.postal_code.as_str()),
            note: order.shipping.note.clone(),
            items: order.items.iter().map(OrderItemView::from).collect(),
            item_count: to_persian_digits(&order.item_count().to_string()),
            subtotal: order.subtotal.display_fa(),
            shipping_cost: order.shipping_cost.display_fa(),
            free_shipping: order.shipping_cost.is_zero(),
            total: order.total.display_fa(),
            can_cancel: order.customer_can_cancel(),
        }
    }
}

/// Order listing row, shared with the admin listing.
#[derive(Clone)]
pub struct OrderRowView {
    pub tracking_code: String,
    pub status: OrderStatus,
    pub status_label: &'static str,
    pub recipient_name: String,
    pub created_at: String,
    pub item_count: String,
    pub total: String,
}

impl From<&OrderSummary> for OrderRowView {
    fn from(order: &OrderSummary) -> Self {
        Self {
            tracking_code: order.tracking_code.to_string(),
            status: order.status,
            status_label: order.status.label_fa(),
            recipient_name: order.recipient_name.clone(),
            created_at: jalali_date(order.created_at),
            item_count: to_persian_digits(&order.item_count.to_string()),
            total: order.total.display_fa(),
        }
    }
}

/// One step of the tracking progress bar.
#[derive(Clone)]
pub struct ProgressStep {
    pub label: &'static str,
    pub done: bool,
    pub current: bool,
}

/// Progress steps for `status`; empty for cancelled orders.
#[must_use]
pub fn progress_steps(status: OrderStatus) -> Vec<ProgressStep> {
    let Some(reached) = PROGRESS.iter().position(|s| *s == status) else {
        return Vec::new();
    };
    PROGRESS
        .iter()
        .enumerate()
        .map(|(i, step)| ProgressStep {
            label: step.label_fa(),
            done: i <= reached,
            current: i == reached,
        })
        .collect()
}

/// Public tracking result.
#[derive(Clone)]
pub struct TrackingView {
    pub tracking_code: String,
    pub status: OrderStatus,
    pub status_label: &'static str,
    pub created_at: String,
    pub updated_at: String,
    pub steps: Vec<ProgressStep>,
}

impl From<&OrderTracking> for TrackingView {
    fn from(tracking: &OrderTracking) -> Self {
        Self {
            tracking_code: tracking.tracking_code.to_string(),
            status: tracking.status,
            status_label: tracking.status.label_fa(),
            created_at: jalali_date(tracking.created_at),
            updated_at: jalali_datetime(tracking.updated_at),
            steps: progress_steps(tracking.status),
        }
    }
}

// =============================================================================
// Templates
// =============================================================================

/// Own orders page template.
#[derive(Template, WebTemplate)]
#[template(path = "orders/index.html")]
pub struct OrdersIndexTemplate {
    pub page: PageContext,
    pub orders: Vec<OrderRowView>,
}

/// Order detail page template.
#[derive(Template, WebTemplate)]
#[template(path = "orders/show.html")]
pub struct OrderShowTemplate {
    pub page: PageContext,
    pub order: OrderView,
    pub steps: Vec<ProgressStep>,
    pub just_placed: bool,
}

/// Public tracking page template.
#[derive(Template, WebTemplate)]
#[template(path = "orders/track.html")]
pub struct TrackTemplate {
    pub page: PageContext,
    pub code: String,
    pub result: Option<TrackingView>,
    pub error: Option<String>,
}

// =============================================================================
// Helpers
// =============================================================================

/// Parse a code from the URL; malformed codes are simply not found.
pub(crate) fn parse_code(raw: &str) -> Result<TrackingCode, AppError> {
    TrackingCode::parse(raw).map_err(|_| AppError::NotFound("سفارش".to_string()))
}

/// Load an order the user may see: their own, or any order for admins.
/// Other people's orders are reported as missing.
async fn visible_order(state: &AppState, user: CurrentUser, code: &str) -> Result<Order, AppError> {
    let code = parse_code(code)?;
    OrderRepository::new(state.pool())
        .get_by_code(&code)
        .await?
        .filter(|order| order.user_id == user.id || user.is_admin)
        .ok_or_else(|| AppError::NotFound("سفارش".to_string()))
}

// =============================================================================
// Pages
// =============================================================================

/// Display the user's orders, newest first.
#[instrument(skip(state), fields(user_id = %user.id))]
pub async fn index(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<impl IntoResponse, PageError> {
    let orders = OrderRepository::new(state.pool())
        .list_for_user(user.id)
        .await?;

    Ok(OrdersIndexTemplate {
        page: PageContext::new(&state, Some(user)),
        orders: orders.iter().map(OrderRowView::from).collect(),
    })
}

/// Order page query parameters.
#[derive(Debug, Deserialize)]
pub struct ShowQuery {
    /// Set by the checkout script right after placing the order.
    #[serde(default)]
    pub placed: Option<String>,
}

/// Display one order.
#[instrument(skip(state), fields(user_id = %user.id))]
pub async fn show(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(code): Path<String>,
    Query(query): Query<ShowQuery>,
) -> Result<impl IntoResponse, PageError> {
    let order = visible_order(&state, user, &code).await?;

    Ok(OrderShowTemplate {
        page: PageContext::new(&state, Some(user)),
        steps: progress_steps(order.status),
        order: OrderView::from(&order),
        just_placed: query.placed.is_some(),
    })
}

/// Tracking query parameters.
#[derive(Debug, Deserialize)]
pub struct TrackQuery {
    #[serde(default)]
    pub code: Option<String>,
}

/// Public tracking page. Shows only status and dates.
#[instrument(skip(state))]
pub async fn track(
    State(state): State<AppState>,
    OptionalUser(user): OptionalUser,
    Query(query): Query<TrackQuery>,
) -> Result<impl IntoResponse, PageError> {
    let code = query.code.unwrap_or_default().trim().to_string();
    let mut result = None;
    let mut error = None;

    if !code.is_empty() {
        match TrackingCode::parse(&code) {
            Ok(parsed) => {
                match OrderRepository::new(state.pool()).tracking(&parsed).await? {
                    Some(tracking) => result = Some(TrackingView::from(&tracking)),
                    None => error = Some("سفارشی با این کد پیدا نشد.".to_string()),
                }
            }
            Err(_) => error = Some("کد پیگیری معتبر نیست. نمونه: KF-7Q2M9XHD".to_string()),
        }
    }

    Ok(TrackTemplate {
        page: PageContext::new(&state, user),
        code,
        result,
        error,
    })
}

// =============================================================================
// JSON API
// =============================================================================

/// The user's orders as JSON.
#[instrument(skip(state), fields(user_id = %user.id))]
pub async fn api_index(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<Vec<OrderSummary>>, AppError> {
    let orders = OrderRepository::new(state.pool())
        .list_for_user(user.id)
        .await?;
    Ok(Json(orders))
}

/// One of the user's orders as JSON.
#[instrument(skip(state), fields(user_id = %user.id))]
pub async fn api_show(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(code): Path<String>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(visible_order(&state, user, &code).await?))
}

/// Cancel the user's own pending order. Stock is restored with the cancel.
#[instrument(skip(state), fields(user_id = %user.id))]
pub async fn cancel(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(code): Path<String>,
) -> Result<Json<Order>, AppError> {
    let code = parse_code(&code)?;
    let repo = OrderRepository::new(state.pool());

    match repo.cancel_by_owner(&code, user.id).await? {
        StatusChange::Updated { previous, .. } => {
            tracing::info!(
                tracking_code = %code,
                from = previous.as_str(),
                "Order cancelled by customer"
            );
        }
        StatusChange::Rejected { current } => {
            return Err(AppError::BadRequest(format!(
                "سفارش در وضعیت «{}» قابل لغو نیست",
                current.label_fa()
            )));
        }
    }

    state.catalog().invalidate();

    let order = repo
        .get_by_code(&code)
        .await?
        .ok_or_else(|| AppError::NotFound("سفارش".to_string()))?;
    Ok(Json(order))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_steps() {
        let steps = progress_steps(OrderStatus::Shipped);
        assert_eq!(steps.len(), 4);
        assert!(steps.iter().take(3).all(|s| s.done));
        assert!(!steps.iter().nth(3).is_some_and(|s| s.done));
        assert_eq!(steps.iter().filter(|s| s.current).count(), 1);
        assert!(steps.iter().nth(2).is_some_and(|s| s.current));
    }

    #[test]
    fn test_cancelled_orders_have_no_progress() {
        assert!(progress_steps(OrderStatus::Cancelled).is_empty());
    }

    #[test]
    fn test_malformed_code_is_not_found() {
        assert!(matches!(parse_code("not-a-code"), Err(AppError::NotFound(_))));
        assert!(parse_code("kf-7q2m9xhd").is_ok());
    }
}
