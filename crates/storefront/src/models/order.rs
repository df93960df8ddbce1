//! Orders and their immutable line snapshots.

use chrono::{DateTime, Utc};
use serde::Serialize;

use kafsh_core::{
    OrderId, OrderItemId, OrderStatus, PhoneNumber, PostalCode, Price, ProductId, SizeId,
    TelegramUserId, TrackingCode, UserId, VariantId,
};

/// Orders per page in the admin listing.
pub const ORDERS_PAGE_SIZE: u32 = 30;

/// Validated delivery details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShippingInfo {
    pub recipient_name: String,
    pub phone: PhoneNumber,
    pub province: String,
    pub city: String,
    pub address: String,
    pub postal_code: PostalCode,
    pub note: Option<String>,
}

/// An order with its items.
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub tracking_code: TrackingCode,
    pub user_id: UserId,
    /// Telegram id of the customer, for notifications.
    pub telegram_id: TelegramUserId,
    pub status: OrderStatus,
    #[serde(flatten)]
    pub shipping: ShippingInfo,
    pub subtotal: Price,
    pub shipping_cost: Price,
    pub total: Price,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<OrderItem>,
}

impl Order {
    /// Number of pairs ordered.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.items
            .iter()
            .map(|item| u32::try_from(item.quantity).unwrap_or(0))
            .sum()
    }

    /// Whether the owner may still cancel.
    #[must_use]
    pub fn customer_can_cancel(&self) -> bool {
        self.status == OrderStatus::Pending
    }
}

/// Snapshot of a purchased size at order time.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub product_id: ProductId,
    pub variant_id: VariantId,
    pub size_id: SizeId,
    pub product_name: String,
    pub color_name: String,
    pub size_label: String,
    pub unit_price: Price,
    pub quantity: i32,
    pub line_total: Price,
}

/// An order row for listings.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrderSummary {
    pub id: OrderId,
    pub tracking_code: TrackingCode,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub recipient_name: String,
    pub total: Price,
    pub item_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Public tracking view: no personal data.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrderTracking {
    pub tracking_code: TrackingCode,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A requested line after duplicate sizes were merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LineRequest {
    pub size_id: SizeId,
    pub quantity: u32,
}

/// A line priced from the locked catalog rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PricedLine {
    pub size_id: SizeId,
    pub variant_id: VariantId,
    pub product_id: ProductId,
    pub product_name: String,
    pub color_name: String,
    pub size_label: String,
    pub unit_price: Price,
    pub quantity: u32,
    pub line_total: Price,
}

/// Server-computed totals of an order about to be placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderQuote {
    pub lines: Vec<PricedLine>,
    pub subtotal: Price,
    pub shipping_cost: Price,
    pub total: Price,
}

/// Result of a status change attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    Updated {
        previous: OrderStatus,
        current: OrderStatus,
    },
    /// The transition is not allowed from the current status.
    Rejected { current: OrderStatus },
}

/// Admin dashboard figures.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OrderStats {
    pub by_status: Vec<(OrderStatus, i64)>,
    /// Sum of totals, cancelled orders excluded.
    pub revenue: Price,
}

impl OrderStats {
    #[must_use]
    pub fn count(&self, status: OrderStatus) -> i64 {
        self.by_status
            .iter()
            .find(|(s, _)| *s == status)
            .map_or(0, |(_, n)| *n)
    }

    #[must_use]
    pub fn total_orders(&self) -> i64 {
        self.by_status.iter().map(|(_, n)| n).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_count_missing_status_is_zero() {
        let stats = OrderStats {
            by_status: vec![(OrderStatus::Pending, 3), (OrderStatus::Delivered, 2)],
            revenue: Price::ZERO,
        };
        assert_eq!(stats.count(OrderStatus::Pending), 3);
        assert_eq!(stats.count(OrderStatus::Shipped), 0);
        assert_eq!(stats.total_orders(), 5);
    }
}
