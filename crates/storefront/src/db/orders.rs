//! Order repository.
//!
//! Placing an order spans several statements that must share one
//! transaction, so those are associated functions over a `PgConnection`
//! and the checkout service owns the transaction. Reads and status changes
//! go through the pool.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};

use kafsh_core::{
    OrderId, OrderStatus, PhoneNumber, PostalCode, Price, ProductId, SizeId, TelegramUserId,
    TrackingCode, UserId, VariantId,
};

use super::RepositoryError;
use crate::models::{
    ORDERS_PAGE_SIZE, Order, OrderItem, OrderQuote, OrderStats, OrderSummary, OrderTracking, Page,
    PricedLine, ShippingInfo, StatusChange,
};

const ORDER_SELECT: &str = r"
    SELECT o.id, o.tracking_code, o.user_id, u.telegram_id, o.status,
           o.recipient_name, o.phone, o.province, o.city, o.address, o.postal_code, o.note,
           o.subtotal, o.shipping_cost, o.total, o.created_at, o.updated_at
    FROM shop.order o
    JOIN shop.user u ON u.id = o.user_id
";

const SUMMARY_SELECT: &str = r"
    SELECT o.id, o.tracking_code, o.user_id, o.status, o.recipient_name, o.total,
           COALESCE((SELECT SUM(i.quantity) FROM shop.order_item i WHERE i.order_id = o.id), 0)::BIGINT
               AS item_count,
           o.created_at
    FROM shop.order o
";

/// A size row locked for the duration of an order transaction.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct LockedSize {
    pub size_id: SizeId,
    pub variant_id: VariantId,
    pub product_id: ProductId,
    pub product_name: String,
    pub color_name: String,
    pub size_label: String,
    pub stock: i32,
    pub price: Price,
    pub sale_price: Option<Price>,
    /// Product and variant are both active.
    pub active: bool,
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: OrderId,
    tracking_code: TrackingCode,
    user_id: UserId,
    telegram_id: TelegramUserId,
    status: OrderStatus,
    recipient_name: String,
    phone: PhoneNumber,
    province: String,
    city: String,
    address: String,
    postal_code: PostalCode,
    note: Option<String>,
    subtotal: Price,
    shipping_cost: Price,
    total: Price,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Order {
        Order {
            id: self.id,
            tracking_code: self.tracking_code,
            user_id: self.user_id,
            telegram_id: self.telegram_id,
            status: self.status,
            shipping: ShippingInfo {
                recipient_name: self.recipient_name,
                phone: self.phone,
                province: self.province,
                city: self.city,
                address: self.address,
                postal_code: self.postal_code,
                note: self.note,
            },
            subtotal: self.subtotal,
            shipping_cost: self.shipping_cost,
            total: self.total,
            created_at: self.created_at,
            updated_at: self.updated_at,
            items,
        }
    }
}

/// Repository for order database operations.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Placement (transaction-scoped)
    // =========================================================================

    /// Lock the given sizes with `FOR UPDATE` and return their catalog data.
    ///
    /// Sizes that do not exist are simply absent from the result.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn lock_sizes(
        conn: &mut PgConnection,
        size_ids: &[SizeId],
    ) -> Result<Vec<LockedSize>, RepositoryError> {
        let rows = sqlx::query_as::<_, LockedSize>(
            r"
            SELECT s.id AS size_id, v.id AS variant_id, p.id AS product_id,
                   p.name AS product_name, v.color_name, s.label AS size_label, s.stock,
                   p.price, p.sale_price, (p.is_active AND v.is_active) AS active
            FROM shop.product_size s
            JOIN shop.product_variant v ON v.id = s.variant_id
            JOIN shop.product p ON p.id = v.product_id
            WHERE s.id = ANY($1)
            ORDER BY s.id
            FOR UPDATE OF s
            ",
        )
        .bind(size_ids)
        .fetch_all(conn)
        .await?;
        Ok(rows)
    }

    /// Insert the order header.
    ///
    /// Returns `None` when the tracking code is already taken so the caller
    /// can retry with a fresh code.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn insert_order(
        conn: &mut PgConnection,
        user_id: UserId,
        code: &TrackingCode,
        shipping: &ShippingInfo,
        quote: &OrderQuote,
    ) -> Result<Option<OrderId>, RepositoryError> {
        let id = sqlx::query_scalar::<_, OrderId>(
            r"
            INSERT INTO shop.order
                (tracking_code, user_id, recipient_name, phone, province, city, address,
                 postal_code, note, subtotal, shipping_cost, total)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (tracking_code) DO NOTHING
            RETURNING id
            ",
        )
        .bind(code)
        .bind(user_id)
        .bind(&shipping.recipient_name)
        .bind(&shipping.phone)
        .bind(&shipping.province)
        .bind(&shipping.city)
        .bind(&shipping.address)
        .bind(&shipping.postal_code)
        .bind(&shipping.note)
        .bind(quote.subtotal)
        .bind(quote.shipping_cost)
        .bind(quote.total)
        .fetch_optional(conn)
        .await?;
        Ok(id)
    }

    /// Insert an item snapshot and take its quantity out of stock.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if stock ran out underneath the lock,
    /// `RepositoryError::Database` if a query fails.
    pub async fn insert_item(
        conn: &mut PgConnection,
        order_id: OrderId,
        line: &PricedLine,
    ) -> Result<(), RepositoryError> {
        let quantity = i32::try_from(line.quantity)
            .map_err(|_| RepositoryError::DataCorruption("quantity out of range".to_string()))?;

        sqlx::query(
            r"
            INSERT INTO shop.order_item
                (order_id, product_id, variant_id, size_id, product_name, color_name,
                 size_label, unit_price, quantity, line_total)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ",
        )
        .bind(order_id)
        .bind(line.product_id)
        .bind(line.variant_id)
        .bind(line.size_id)
        .bind(&line.product_name)
        .bind(&line.color_name)
        .bind(&line.size_label)
        .bind(line.unit_price)
        .bind(quantity)
        .bind(line.line_total)
        .execute(&mut *conn)
        .await?;

        let result = sqlx::query(
            "UPDATE shop.product_size SET stock = stock - $2 WHERE id = $1 AND stock >= $2",
        )
        .bind(line.size_id)
        .bind(quantity)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!(
                "insufficient stock for size {}",
                line.size_id
            )));
        }
        Ok(())
    }

    /// Remove every cart line of the user inside the order transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn clear_cart(
        conn: &mut PgConnection,
        user_id: UserId,
    ) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM shop.cart_item WHERE user_id = $1")
            .bind(user_id)
            .execute(conn)
            .await?;
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get an order with its items by tracking code.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn get_by_code(&self, code: &TrackingCode) -> Result<Option<Order>, RepositoryError> {
        let sql = format!("{ORDER_SELECT} WHERE o.tracking_code = $1");
        let Some(row) = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(code)
            .fetch_optional(self.pool)
            .await?
        else {
            return Ok(None);
        };

        let items = self.items(row.id).await?;
        Ok(Some(row.into_order(items)))
    }

    async fn items(&self, order_id: OrderId) -> Result<Vec<OrderItem>, RepositoryError> {
        let items = sqlx::query_as::<_, OrderItem>(
            r"
            SELECT id, product_id, variant_id, size_id, product_name, color_name, size_label,
                   unit_price, quantity, line_total
            FROM shop.order_item
            WHERE order_id = $1
            ORDER BY id
            ",
        )
        .bind(order_id)
        .fetch_all(self.pool)
        .await?;
        Ok(items)
    }

    /// Status and dates of an order, for the public tracking page.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn tracking(
        &self,
        code: &TrackingCode,
    ) -> Result<Option<OrderTracking>, RepositoryError> {
        let tracking = sqlx::query_as::<_, OrderTracking>(
            "SELECT tracking_code, status, created_at, updated_at FROM shop.order \
             WHERE tracking_code = $1",
        )
        .bind(code)
        .fetch_optional(self.pool)
        .await?;
        Ok(tracking)
    }

    /// The user's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<OrderSummary>, RepositoryError> {
        let sql = format!(
            "{SUMMARY_SELECT} WHERE o.user_id = $1 ORDER BY o.created_at DESC, o.id DESC"
        );
        let orders = sqlx::query_as::<_, OrderSummary>(&sql)
            .bind(user_id)
            .fetch_all(self.pool)
            .await?;
        Ok(orders)
    }

    /// All orders for the admin panel, optionally filtered by status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn list(
        &self,
        status: Option<OrderStatus>,
        page: u32,
    ) -> Result<Page<OrderSummary>, RepositoryError> {
        let page = page.max(1);

        let mut count_qb: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM shop.order o");
        if let Some(status) = status {
            count_qb.push(" WHERE o.status = ").push_bind(status);
        }
        let total = count_qb
            .build_query_scalar::<i64>()
            .fetch_one(self.pool)
            .await?;

        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(SUMMARY_SELECT);
        if let Some(status) = status {
            qb.push(" WHERE o.status = ").push_bind(status);
        }
        qb.push(" ORDER BY o.created_at DESC, o.id DESC LIMIT ")
            .push_bind(i64::from(ORDERS_PAGE_SIZE))
            .push(" OFFSET ")
            .push_bind(i64::from(page - 1) * i64::from(ORDERS_PAGE_SIZE));

        let items = qb
            .build_query_as::<OrderSummary>()
            .fetch_all(self.pool)
            .await?;

        Ok(Page {
            items,
            page,
            per_page: ORDERS_PAGE_SIZE,
            total,
        })
    }

    /// The latest orders, for the dashboard.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn recent(&self, limit: i64) -> Result<Vec<OrderSummary>, RepositoryError> {
        let sql = format!("{SUMMARY_SELECT} ORDER BY o.created_at DESC, o.id DESC LIMIT $1");
        let orders = sqlx::query_as::<_, OrderSummary>(&sql)
            .bind(limit)
            .fetch_all(self.pool)
            .await?;
        Ok(orders)
    }

    /// Order counts by status and revenue.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn stats(&self) -> Result<OrderStats, RepositoryError> {
        let by_status: Vec<(OrderStatus, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM shop.order GROUP BY status ORDER BY status",
        )
        .fetch_all(self.pool)
        .await?;

        let revenue: Price = sqlx::query_scalar(
            "SELECT COALESCE(SUM(total), 0) FROM shop.order WHERE status <> 'cancelled'",
        )
        .fetch_one(self.pool)
        .await?;

        Ok(OrderStats { by_status, revenue })
    }

    // =========================================================================
    // Status changes
    // =========================================================================

    /// Move an order to `next` if the status machine allows it.
    ///
    /// Cancelling puts the ordered quantities back in stock in the same
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order does not exist.
    pub async fn update_status(
        &self,
        code: &TrackingCode,
        next: OrderStatus,
    ) -> Result<StatusChange, RepositoryError> {
        self.transition(code, None, next).await
    }

    /// Cancel an order on behalf of its owner. Only pending orders qualify.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the order does not exist or is
    /// not the user's.
    pub async fn cancel_by_owner(
        &self,
        code: &TrackingCode,
        user_id: UserId,
    ) -> Result<StatusChange, RepositoryError> {
        self.transition(code, Some(user_id), OrderStatus::Cancelled)
            .await
    }

    async fn transition(
        &self,
        code: &TrackingCode,
        owner: Option<UserId>,
        next: OrderStatus,
    ) -> Result<StatusChange, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(OrderId, UserId, OrderStatus)> = sqlx::query_as(
            "SELECT id, user_id, status FROM shop.order WHERE tracking_code = $1 FOR UPDATE",
        )
        .bind(code)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((order_id, user_id, current)) = row else {
            return Err(RepositoryError::NotFound);
        };
        if owner.is_some_and(|owner| owner != user_id) {
            return Err(RepositoryError::NotFound);
        }

        let allowed = match owner {
            Some(_) => current == OrderStatus::Pending && next == OrderStatus::Cancelled,
            None => current.can_transition_to(next),
        };
        if !allowed {
            return Ok(StatusChange::Rejected { current });
        }

        sqlx::query("UPDATE shop.order SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(order_id)
            .bind(next)
            .execute(&mut *tx)
            .await?;

        if next == OrderStatus::Cancelled {
            sqlx::query(
                r"
                UPDATE shop.product_size s
                SET stock = s.stock + i.quantity
                FROM shop.order_item i
                WHERE i.order_id = $1 AND s.id = i.size_id
                ",
            )
            .bind(order_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(StatusChange::Updated {
            previous: current,
            current: next,
        })
    }
}
