//! Admin order management.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form, Json,
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect},
};
use serde::Deserialize;
use tracing::instrument;

use kafsh_core::locale::to_persian_digits;
use kafsh_core::{OrderStatus, TrackingCode};

use super::redirect_with_message;
use crate::db::OrderRepository;
use crate::error::{AppError, PageError};
use crate::filters;
use crate::middleware::RequireAdmin;
use crate::models::{CurrentUser, Order, OrderSummary, Page, StatusChange};
use crate::routes::orders::{OrderRowView, OrderView, parse_code};
use crate::state::AppState;
use crate::views::{PageContext, Pagination, parse_amount};

/// A status filter tab.
#[derive(Clone)]
pub struct StatusTab {
    pub value: &'static str,
    pub label: &'static str,
    pub selected: bool,
}

/// A status the order may move to next.
#[derive(Clone)]
pub struct NextStatus {
    pub value: &'static str,
    pub label: &'static str,
    pub is_cancel: bool,
}

/// Order list template.
#[derive(Template, WebTemplate)]
#[template(path = "admin/orders/index.html")]
pub struct OrdersIndexTemplate {
    pub page: PageContext,
    pub tabs: Vec<StatusTab>,
    pub orders: Vec<OrderRowView>,
    pub total: String,
    pub pagination: Pagination,
    pub msg: Option<String>,
}

/// Order detail template.
#[derive(Template, WebTemplate)]
#[template(path = "admin/orders/show.html")]
pub struct OrderShowTemplate {
    pub page: PageContext,
    pub order: OrderView,
    pub telegram_id: String,
    pub next_statuses: Vec<NextStatus>,
    pub msg: Option<String>,
}

/// Order list query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct IndexQuery {
    pub status: Option<String>,
    pub page: Option<String>,
    pub msg: Option<String>,
}

impl IndexQuery {
    /// Status filter; unknown values show all orders.
    fn status(&self) -> Option<OrderStatus> {
        self.status.as_deref().and_then(|s| s.parse().ok())
    }

    fn page(&self) -> u32 {
        self.page
            .as_deref()
            .and_then(parse_amount)
            .and_then(|p| u32::try_from(p).ok())
            .unwrap_or(1)
    }
}

fn status_tabs(selected: Option<OrderStatus>) -> Vec<StatusTab> {
    let all = StatusTab {
        value: "",
        label: "همه",
        selected: selected.is_none(),
    };
    std::iter::once(all)
        .chain(OrderStatus::ALL.iter().map(|status| StatusTab {
            value: status.as_str(),
            label: status.label_fa(),
            selected: selected == Some(*status),
        }))
        .collect()
}

/// Apply a status change and tell the customer.
///
/// Returns the current status back when the transition is not allowed.
async fn change_status(
    state: &AppState,
    admin: CurrentUser,
    code: &TrackingCode,
    next: OrderStatus,
) -> Result<Result<Order, OrderStatus>, AppError> {
    let repo = OrderRepository::new(state.pool());

    let previous = match repo.update_status(code, next).await? {
        StatusChange::Updated { previous, .. } => previous,
        StatusChange::Rejected { current } => return Ok(Err(current)),
    };

    if next == OrderStatus::Cancelled {
        state.catalog().invalidate();
    }
    tracing::info!(
        admin_id = %admin.id,
        tracking_code = %code,
        from = previous.as_str(),
        to = next.as_str(),
        "Order status changed"
    );

    let order = repo
        .get_by_code(code)
        .await?
        .ok_or_else(|| AppError::NotFound("سفارش".to_string()))?;
    state.notifier().status_changed(&order);
    Ok(Ok(order))
}

fn rejected_message(current: OrderStatus, next: OrderStatus) -> String {
    format!(
        "تغییر وضعیت از «{}» به «{}» مجاز نیست",
        current.label_fa(),
        next.label_fa()
    )
}

fn transition_rejected(current: OrderStatus, next: OrderStatus) -> AppError {
    AppError::BadRequest(rejected_message(current, next))
}

// =============================================================================
// Pages
// =============================================================================

/// List orders, optionally filtered by status.
#[instrument(skip(state), fields(admin_id = %admin.id))]
pub async fn index(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Query(query): Query<IndexQuery>,
) -> Result<impl IntoResponse, PageError> {
    let status = query.status();
    let results = OrderRepository::new(state.pool())
        .list(status, query.page())
        .await?;

    let base = status.map_or_else(
        || "/admin/orders".to_string(),
        |s| format!("/admin/orders?status={}", s.as_str()),
    );

    Ok(OrdersIndexTemplate {
        page: PageContext::new(&state, Some(admin)),
        tabs: status_tabs(status),
        orders: results.items.iter().map(OrderRowView::from).collect(),
        total: to_persian_digits(&results.total.to_string()),
        pagination: Pagination::new(&base, results.page, results.total_pages()),
        msg: query.msg,
    })
}

/// Order page query parameters.
#[derive(Debug, Deserialize)]
pub struct ShowQuery {
    pub msg: Option<String>,
}

/// Display one order with its status actions.
#[instrument(skip(state), fields(admin_id = %admin.id))]
pub async fn show(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(code): Path<String>,
    Query(query): Query<ShowQuery>,
) -> Result<impl IntoResponse, PageError> {
    let code = parse_code(&code)?;
    let order = OrderRepository::new(state.pool())
        .get_by_code(&code)
        .await?
        .ok_or_else(|| AppError::NotFound("سفارش".to_string()))?;

    Ok(OrderShowTemplate {
        page: PageContext::new(&state, Some(admin)),
        telegram_id: order.telegram_id.to_string(),
        next_statuses: order
            .status
            .next_statuses()
            .into_iter()
            .map(|status| NextStatus {
                value: status.as_str(),
                label: status.label_fa(),
                is_cancel: status == OrderStatus::Cancelled,
            })
            .collect(),
        order: OrderView::from(&order),
        msg: query.msg,
    })
}

/// Status change form.
#[derive(Debug, Deserialize)]
pub struct StatusForm {
    pub status: String,
}

/// Change the status from the order page.
///
/// An unknown status or a disallowed transition renders a 400 error page.
#[instrument(skip(state), fields(admin_id = %admin.id))]
pub async fn update_status(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(code): Path<String>,
    Form(form): Form<StatusForm>,
) -> Result<Redirect, PageError> {
    let code = parse_code(&code)?;
    let next = form
        .status
        .parse::<OrderStatus>()
        .map_err(|_| AppError::BadRequest("وضعیت نامعتبر است".to_string()))?;

    match change_status(&state, admin, &code, next).await? {
        Ok(order) => Ok(redirect_with_message(
            &format!("/admin/orders/{code}"),
            &format!("وضعیت به «{}» تغییر کرد", order.status.label_fa()),
        )),
        Err(current) => Err(transition_rejected(current, next).into()),
    }
}

// =============================================================================
// JSON API
// =============================================================================

/// Orders as JSON, with the same filters as the page.
#[instrument(skip(state), fields(admin_id = %admin.id))]
pub async fn api_index(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Query(query): Query<IndexQuery>,
) -> Result<Json<Page<OrderSummary>>, AppError> {
    let orders = OrderRepository::new(state.pool())
        .list(query.status(), query.page())
        .await?;
    Ok(Json(orders))
}

/// Body of `POST /api/admin/orders/{code}/status`.
#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: OrderStatus,
}

/// Change the status; a disallowed transition is a 400.
#[instrument(skip(state), fields(admin_id = %admin.id))]
pub async fn api_update_status(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(code): Path<String>,
    Json(request): Json<StatusRequest>,
) -> Result<Json<Order>, AppError> {
    let code = parse_code(&code)?;
    match change_status(&state, admin, &code, request.status).await? {
        Ok(order) => Ok(Json(order)),
        Err(current) => Err(transition_rejected(current, request.status)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_query_ignores_unknown_status() {
        let query = IndexQuery {
            status: Some("lost".to_string()),
            page: Some("۳".to_string()),
            msg: None,
        };
        assert_eq!(query.status(), None);
        assert_eq!(query.page(), 3);

        let query = IndexQuery {
            status: Some("shipped".to_string()),
            ..IndexQuery::default()
        };
        assert_eq!(query.status(), Some(OrderStatus::Shipped));
        assert_eq!(query.page(), 1);
    }

    #[test]
    fn test_status_tabs_mark_selection() {
        let tabs = status_tabs(None);
        assert_eq!(tabs.len(), 6);
        assert!(tabs[0].selected);

        let tabs = status_tabs(Some(OrderStatus::Pending));
        assert!(!tabs[0].selected);
        assert!(tabs.iter().any(|t| t.value == "pending" && t.selected));
    }

    #[test]
    fn test_rejected_transition_is_bad_request() {
        let err = transition_rejected(OrderStatus::Delivered, OrderStatus::Pending);
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
        assert!(err.public_message().contains(OrderStatus::Delivered.label_fa()));
    }

    #[test]
    fn test_rejected_message_names_both_statuses() {
        let msg = rejected_message(OrderStatus::Delivered, OrderStatus::Cancelled);
        assert!(msg.contains(OrderStatus::Delivered.label_fa()));
        assert!(msg.contains(OrderStatus::Cancelled.label_fa()));
    }
}
