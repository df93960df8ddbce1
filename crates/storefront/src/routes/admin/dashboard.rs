//! Admin dashboard.

use askama::Template;
use askama_web::WebTemplate;
use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;
use tracing::instrument;

use kafsh_core::OrderStatus;
use kafsh_core::locale::format_number_fa;

use crate::db::{OrderRepository, ProductRepository, RepositoryError, UserRepository};
use crate::error::{AppError, PageError};
use crate::filters;
use crate::middleware::RequireAdmin;
use crate::models::OrderStats;
use crate::routes::orders::OrderRowView;
use crate::state::AppState;
use crate::views::PageContext;

/// Latest orders shown on the dashboard.
const RECENT_ORDERS: i64 = 10;

/// Everything the dashboard shows.
#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub orders: OrderStats,
    pub products_total: i64,
    pub products_active: i64,
    pub users: i64,
}

async fn load_stats(state: &AppState) -> Result<DashboardStats, RepositoryError> {
    let orders = OrderRepository::new(state.pool()).stats().await?;
    let (products_total, products_active) = ProductRepository::new(state.pool()).counts().await?;
    let users = UserRepository::new(state.pool()).count().await?;

    Ok(DashboardStats {
        orders,
        products_total,
        products_active,
        users,
    })
}

/// A status tile.
#[derive(Clone)]
pub struct StatusCount {
    pub status: OrderStatus,
    pub label: &'static str,
    pub count: String,
}

/// Dashboard page template.
#[derive(Template, WebTemplate)]
#[template(path = "admin/dashboard.html")]
pub struct DashboardTemplate {
    pub page: PageContext,
    pub status_counts: Vec<StatusCount>,
    pub total_orders: String,
    pub revenue: String,
    pub products_total: String,
    pub products_active: String,
    pub users: String,
    /// Latest orders.
    pub orders: Vec<OrderRowView>,
}

/// Display the dashboard.
#[instrument(skip(state), fields(admin_id = %admin.id))]
pub async fn dashboard(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
) -> Result<impl IntoResponse, PageError> {
    let stats = load_stats(&state).await?;
    let recent = OrderRepository::new(state.pool())
        .recent(RECENT_ORDERS)
        .await?;

    Ok(DashboardTemplate {
        page: PageContext::new(&state, Some(admin)),
        status_counts: OrderStatus::ALL
            .iter()
            .map(|status| StatusCount {
                status: *status,
                label: status.label_fa(),
                count: format_number_fa(stats.orders.count(*status)),
            })
            .collect(),
        total_orders: format_number_fa(stats.orders.total_orders()),
        revenue: stats.orders.revenue.display_fa(),
        products_total: format_number_fa(stats.products_total),
        products_active: format_number_fa(stats.products_active),
        users: format_number_fa(stats.users),
        orders: recent.iter().map(OrderRowView::from).collect(),
    })
}

/// Dashboard figures as JSON.
#[instrument(skip(state), fields(admin_id = %admin.id))]
pub async fn api_stats(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
) -> Result<Json<DashboardStats>, AppError> {
    Ok(Json(load_stats(&state).await?))
}
