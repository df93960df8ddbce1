//! Server-side cart repository.
//!
//! Every query is scoped by `user_id`, so a caller can only touch their own rows.

use sqlx::PgPool;

use kafsh_core::{CartItemId, Price, ProductId, SizeId, UserId};

use super::RepositoryError;
use crate::models::{Cart, CartLine};

#[derive(sqlx::FromRow)]
struct CartLineRow {
    id: CartItemId,
    size_id: SizeId,
    quantity: i32,
    product_id: ProductId,
    slug: String,
    product_name: String,
    brand: String,
    color_name: String,
    size_label: String,
    unit_price: Price,
    stock: i32,
    available: bool,
    image_url: Option<String>,
}

impl From<CartLineRow> for CartLine {
    fn from(row: CartLineRow) -> Self {
        Self {
            id: row.id,
            size_id: row.size_id,
            quantity: u32::try_from(row.quantity).unwrap_or(0),
            product_id: row.product_id,
            slug: row.slug,
            product_name: row.product_name,
            brand: row.brand,
            color_name: row.color_name,
            size_label: row.size_label,
            unit_price: row.unit_price,
            stock: row.stock,
            available: row.available,
            image_url: row.image_url,
        }
    }
}

/// Whether a size can be put in a cart, and how many are left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct SizeAvailability {
    pub stock: i32,
    /// Product and variant are both active.
    pub active: bool,
}

impl SizeAvailability {
    #[must_use]
    pub const fn purchasable(&self) -> bool {
        self.active && self.stock > 0
    }
}

/// Repository for cart database operations.
pub struct CartRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CartRepository<'a> {
    /// Create a new cart repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// The user's cart with current prices and stock.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, user_id: UserId) -> Result<Cart, RepositoryError> {
        let rows = sqlx::query_as::<_, CartLineRow>(
            r"
            SELECT c.id, c.size_id, c.quantity,
                   p.id AS product_id, p.slug, p.name AS product_name, p.brand,
                   v.color_name, s.label AS size_label,
                   (CASE WHEN p.sale_price IS NOT NULL AND p.sale_price < p.price
                         THEN p.sale_price ELSE p.price END) AS unit_price,
                   s.stock,
                   (p.is_active AND v.is_active AND s.stock > 0) AS available,
                   (SELECT i.url FROM shop.product_image i
                     WHERE i.product_id = p.id AND (i.variant_id = v.id OR i.variant_id IS NULL)
                     ORDER BY i.variant_id NULLS LAST, i.position, i.id
                     LIMIT 1) AS image_url
            FROM shop.cart_item c
            JOIN shop.product_size s ON s.id = c.size_id
            JOIN shop.product_variant v ON v.id = s.variant_id
            JOIN shop.product p ON p.id = v.product_id
            WHERE c.user_id = $1
            ORDER BY c.created_at, c.id
            ",
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        Ok(Cart {
            lines: rows.into_iter().map(CartLine::from).collect(),
        })
    }

    /// Stock and active state of a size, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn size_availability(
        &self,
        size_id: SizeId,
    ) -> Result<Option<SizeAvailability>, RepositoryError> {
        let availability = sqlx::query_as::<_, SizeAvailability>(
            r"
            SELECT s.stock, (p.is_active AND v.is_active) AS active
            FROM shop.product_size s
            JOIN shop.product_variant v ON v.id = s.variant_id
            JOIN shop.product p ON p.id = v.product_id
            WHERE s.id = $1
            ",
        )
        .bind(size_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(availability)
    }

    /// Add a size or increase its quantity, capped at `max_quantity`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn add(
        &self,
        user_id: UserId,
        size_id: SizeId,
        quantity: u32,
        max_quantity: u32,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO shop.cart_item AS c (user_id, size_id, quantity)
            VALUES ($1, $2, LEAST($3, $4))
            ON CONFLICT (user_id, size_id) DO UPDATE SET
                quantity = LEAST(c.quantity + EXCLUDED.quantity, $4),
                updated_at = NOW()
            ",
        )
        .bind(user_id)
        .bind(size_id)
        .bind(clamp_i32(quantity))
        .bind(clamp_i32(max_quantity))
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Set the quantity of one of the user's lines.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the line is not the user's.
    pub async fn set_quantity(
        &self,
        user_id: UserId,
        item_id: CartItemId,
        quantity: u32,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE shop.cart_item SET quantity = $3, updated_at = NOW() \
             WHERE id = $1 AND user_id = $2",
        )
        .bind(item_id)
        .bind(user_id)
        .bind(clamp_i32(quantity))
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Remove one of the user's lines.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the line is not the user's.
    pub async fn remove(
        &self,
        user_id: UserId,
        item_id: CartItemId,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM shop.cart_item WHERE id = $1 AND user_id = $2")
            .bind(item_id)
            .bind(user_id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Remove every line of the user's cart.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn clear(&self, user_id: UserId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM shop.cart_item WHERE user_id = $1")
            .bind(user_id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Merge a browser cart into the server cart.
    ///
    /// Each size keeps the larger of both quantities, capped at
    /// `max_quantity`. Unknown, inactive or sold-out sizes are skipped.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails; nothing is merged then.
    pub async fn merge(
        &self,
        user_id: UserId,
        items: &[(SizeId, u32)],
        max_quantity: u32,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        for (size_id, quantity) in items {
            sqlx::query(
                r"
                INSERT INTO shop.cart_item AS c (user_id, size_id, quantity)
                SELECT $1, s.id, LEAST($3, $4)
                FROM shop.product_size s
                JOIN shop.product_variant v ON v.id = s.variant_id
                JOIN shop.product p ON p.id = v.product_id
                WHERE s.id = $2 AND p.is_active AND v.is_active AND s.stock > 0
                ON CONFLICT (user_id, size_id) DO UPDATE SET
                    quantity = LEAST(GREATEST(c.quantity, EXCLUDED.quantity), $4),
                    updated_at = NOW()
                ",
            )
            .bind(user_id)
            .bind(*size_id)
            .bind(clamp_i32(*quantity))
            .bind(clamp_i32(max_quantity))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

fn clamp_i32(n: u32) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}
