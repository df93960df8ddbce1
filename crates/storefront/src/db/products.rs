//! Product catalog repository.
//!
//! Reads for the shop (listings, detail) and writes for the admin panel.
//! Listing queries are built with `QueryBuilder` because every filter is optional.

use std::cmp::Ordering;
use std::collections::HashMap;

use sqlx::{PgPool, Postgres, QueryBuilder};

use kafsh_core::{ImageId, ProductId, SizeId, VariantId};

use super::{RepositoryError, conflict_on_unique};
use crate::models::product::PAGE_SIZE;
use crate::models::{
    Image, Page, Product, ProductDetail, ProductFilter, ProductInput, ProductSort, ProductSummary,
    Size, Variant,
};

/// SQL for the price a customer pays.
const EFFECTIVE_PRICE: &str =
    "(CASE WHEN p.sale_price IS NOT NULL AND p.sale_price < p.price THEN p.sale_price ELSE p.price END)";

const PRODUCT_COLUMNS: &str = "p.id, p.slug, p.name, p.brand, p.category, p.description, \
     p.price, p.sale_price, p.is_active, p.is_featured, p.created_at, p.updated_at";

const SUMMARY_SELECT: &str = r"
    SELECT p.id, p.slug, p.name, p.brand, p.category, p.price, p.sale_price,
           p.is_active, p.is_featured,
           (SELECT i.url FROM shop.product_image i
             WHERE i.product_id = p.id
             ORDER BY i.variant_id NULLS FIRST, i.position, i.id
             LIMIT 1) AS image_url,
           EXISTS (SELECT 1 FROM shop.product_variant v
                     JOIN shop.product_size s ON s.variant_id = v.id
                    WHERE v.product_id = p.id AND v.is_active AND s.stock > 0) AS in_stock
    FROM shop.product p
    WHERE TRUE";

#[derive(sqlx::FromRow)]
struct VariantRow {
    id: VariantId,
    product_id: ProductId,
    color_name: String,
    color_hex: Option<String>,
    is_active: bool,
    position: i32,
}

/// Escape `%`, `_` and `\` for use inside an `ILIKE` pattern.
fn like_pattern(q: &str) -> String {
    let mut escaped = String::with_capacity(q.len() + 2);
    escaped.push('%');
    for c in q.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &ProductFilter) {
    if !filter.include_inactive {
        qb.push(" AND p.is_active");
    }
    if let Some(q) = filter.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        let pattern = like_pattern(q);
        qb.push(" AND (p.name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR p.brand ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(category) = &filter.category {
        qb.push(" AND p.category = ").push_bind(category.clone());
    }
    if let Some(brand) = &filter.brand {
        qb.push(" AND lower(p.brand) = lower(")
            .push_bind(brand.clone())
            .push(")");
    }
    if let Some(size) = &filter.size {
        qb.push(
            " AND EXISTS (SELECT 1 FROM shop.product_variant v \
               JOIN shop.product_size s ON s.variant_id = v.id \
              WHERE v.product_id = p.id AND v.is_active AND s.stock > 0 AND s.label = ",
        )
        .push_bind(size.clone())
        .push(")");
    }
    if let Some(min) = filter.min_price {
        qb.push(" AND ")
            .push(EFFECTIVE_PRICE)
            .push(" >= ")
            .push_bind(min);
    }
    if let Some(max) = filter.max_price {
        qb.push(" AND ")
            .push(EFFECTIVE_PRICE)
            .push(" <= ")
            .push_bind(max);
    }
}

fn push_order(qb: &mut QueryBuilder<'_, Postgres>, sort: ProductSort) {
    match sort {
        ProductSort::Newest => qb.push(" ORDER BY p.created_at DESC, p.id DESC"),
        ProductSort::PriceAsc => qb.push(" ORDER BY ").push(EFFECTIVE_PRICE).push(" ASC, p.id"),
        ProductSort::PriceDesc => qb
            .push(" ORDER BY ")
            .push(EFFECTIVE_PRICE)
            .push(" DESC, p.id"),
    };
}

/// Repository for catalog database operations.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Shop reads
    // =========================================================================

    /// One page of products matching a filter.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn list(
        &self,
        filter: &ProductFilter,
    ) -> Result<Page<ProductSummary>, RepositoryError> {
        let mut count_qb =
            QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM shop.product p WHERE TRUE");
        push_filters(&mut count_qb, filter);
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(self.pool)
            .await?;

        let mut qb = QueryBuilder::<Postgres>::new(SUMMARY_SELECT);
        push_filters(&mut qb, filter);
        push_order(&mut qb, filter.sort);
        qb.push(" LIMIT ")
            .push_bind(i64::from(PAGE_SIZE))
            .push(" OFFSET ")
            .push_bind(filter.offset());
        let items = qb
            .build_query_as::<ProductSummary>()
            .fetch_all(self.pool)
            .await?;

        Ok(Page {
            items,
            page: filter.page(),
            per_page: PAGE_SIZE,
            total,
        })
    }

    /// Featured active products, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn featured(&self, limit: i64) -> Result<Vec<ProductSummary>, RepositoryError> {
        let mut qb = QueryBuilder::<Postgres>::new(SUMMARY_SELECT);
        qb.push(" AND p.is_active AND p.is_featured");
        push_order(&mut qb, ProductSort::Newest);
        qb.push(" LIMIT ").push_bind(limit);
        Ok(qb
            .build_query_as::<ProductSummary>()
            .fetch_all(self.pool)
            .await?)
    }

    /// Distinct categories of active products.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn categories(&self) -> Result<Vec<String>, RepositoryError> {
        let rows = sqlx::query_scalar(
            "SELECT DISTINCT category FROM shop.product \
             WHERE is_active AND category <> '' ORDER BY category",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Distinct brands of active products.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn brands(&self) -> Result<Vec<String>, RepositoryError> {
        let rows = sqlx::query_scalar(
            "SELECT DISTINCT brand FROM shop.product \
             WHERE is_active AND brand <> '' ORDER BY brand",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Size labels currently in stock, numeric labels in numeric order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn size_labels(&self) -> Result<Vec<String>, RepositoryError> {
        let mut labels: Vec<String> = sqlx::query_scalar(
            r"
            SELECT DISTINCT s.label
            FROM shop.product_size s
            JOIN shop.product_variant v ON v.id = s.variant_id
            JOIN shop.product p ON p.id = v.product_id
            WHERE p.is_active AND v.is_active AND s.stock > 0
            ",
        )
        .fetch_all(self.pool)
        .await?;
        labels.sort_by(|a, b| compare_size_labels(a, b));
        Ok(labels)
    }

    /// Product detail by slug. Inactive products and variants are hidden
    /// unless `include_inactive` is set.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn get_detail_by_slug(
        &self,
        slug: &str,
        include_inactive: bool,
    ) -> Result<Option<ProductDetail>, RepositoryError> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM shop.product p WHERE p.slug = $1");
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(slug)
            .fetch_optional(self.pool)
            .await?;

        match product {
            Some(product) if product.is_active || include_inactive => {
                Ok(Some(self.load_detail(product, include_inactive).await?))
            }
            _ => Ok(None),
        }
    }

    /// Product detail by id, including inactive variants (admin).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn get_detail_by_id(
        &self,
        id: ProductId,
    ) -> Result<Option<ProductDetail>, RepositoryError> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM shop.product p WHERE p.id = $1");
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        match product {
            Some(product) => Ok(Some(self.load_detail(product, true).await?)),
            None => Ok(None),
        }
    }

    async fn load_detail(
        &self,
        product: Product,
        include_inactive: bool,
    ) -> Result<ProductDetail, RepositoryError> {
        let variant_rows = sqlx::query_as::<_, VariantRow>(
            r"
            SELECT id, product_id, color_name, color_hex, is_active, position
            FROM shop.product_variant
            WHERE product_id = $1 AND (is_active OR $2)
            ORDER BY position, id
            ",
        )
        .bind(product.id)
        .bind(include_inactive)
        .fetch_all(self.pool)
        .await?;

        let variant_ids: Vec<VariantId> = variant_rows.iter().map(|v| v.id).collect();

        let sizes = sqlx::query_as::<_, Size>(
            r"
            SELECT id, variant_id, label, stock
            FROM shop.product_size
            WHERE variant_id = ANY($1)
            ORDER BY variant_id, label
            ",
        )
        .bind(&variant_ids)
        .fetch_all(self.pool)
        .await?;

        let images = sqlx::query_as::<_, Image>(
            r"
            SELECT id, product_id, variant_id, url, alt, position
            FROM shop.product_image
            WHERE product_id = $1
            ORDER BY position, id
            ",
        )
        .bind(product.id)
        .fetch_all(self.pool)
        .await?;

        let mut sizes_by_variant: HashMap<VariantId, Vec<Size>> = HashMap::new();
        for size in sizes {
            sizes_by_variant.entry(size.variant_id).or_default().push(size);
        }

        let mut shared_images = Vec::new();
        let mut images_by_variant: HashMap<VariantId, Vec<Image>> = HashMap::new();
        for image in images {
            match image.variant_id {
                Some(variant_id) => images_by_variant.entry(variant_id).or_default().push(image),
                None => shared_images.push(image),
            }
        }

        let variants = variant_rows
            .into_iter()
            .map(|row| {
                let mut sizes = sizes_by_variant.remove(&row.id).unwrap_or_default();
                sizes.sort_by(|a, b| compare_size_labels(&a.label, &b.label));
                Variant {
                    id: row.id,
                    product_id: row.product_id,
                    color_name: row.color_name,
                    color_hex: row.color_hex,
                    is_active: row.is_active,
                    position: row.position,
                    sizes,
                    images: images_by_variant.remove(&row.id).unwrap_or_default(),
                }
            })
            .collect();

        Ok(ProductDetail {
            product,
            variants,
            images: shared_images,
        })
    }

    // =========================================================================
    // Admin writes
    // =========================================================================

    /// Create a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the slug is taken.
    pub async fn create(&self, input: &ProductInput) -> Result<Product, RepositoryError> {
        let sql = format!(
            r"
            INSERT INTO shop.product AS p (slug, name, brand, category, description, price, sale_price, is_featured)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {PRODUCT_COLUMNS}
            "
        );
        sqlx::query_as::<_, Product>(&sql)
            .bind(&input.slug)
            .bind(&input.name)
            .bind(&input.brand)
            .bind(&input.category)
            .bind(&input.description)
            .bind(input.price)
            .bind(input.sale_price)
            .bind(input.is_featured)
            .fetch_one(self.pool)
            .await
            .map_err(|e| conflict_on_unique(e, "slug already exists"))
    }

    /// Update a product's fields.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` for an unknown id and
    /// `RepositoryError::Conflict` if the new slug is taken.
    pub async fn update(
        &self,
        id: ProductId,
        input: &ProductInput,
    ) -> Result<Product, RepositoryError> {
        let sql = format!(
            r"
            UPDATE shop.product AS p SET
                slug = $2, name = $3, brand = $4, category = $5, description = $6,
                price = $7, sale_price = $8, is_featured = $9, updated_at = NOW()
            WHERE p.id = $1
            RETURNING {PRODUCT_COLUMNS}
            "
        );
        sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .bind(&input.slug)
            .bind(&input.name)
            .bind(&input.brand)
            .bind(&input.category)
            .bind(&input.description)
            .bind(input.price)
            .bind(input.sale_price)
            .bind(input.is_featured)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| conflict_on_unique(e, "slug already exists"))?
            .ok_or(RepositoryError::NotFound)
    }

    /// Flip a product's active flag and return the new value.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` for an unknown id.
    pub async fn toggle_active(&self, id: ProductId) -> Result<bool, RepositoryError> {
        sqlx::query_scalar(
            "UPDATE shop.product SET is_active = NOT is_active, updated_at = NOW() \
             WHERE id = $1 RETURNING is_active",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Add a color variant at the end of the product's list.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the color already exists.
    pub async fn add_variant(
        &self,
        product_id: ProductId,
        color_name: &str,
        color_hex: Option<&str>,
    ) -> Result<VariantId, RepositoryError> {
        sqlx::query_scalar(
            r"
            INSERT INTO shop.product_variant (product_id, color_name, color_hex, position)
            VALUES ($1, $2, $3,
                    (SELECT COALESCE(MAX(position) + 1, 0) FROM shop.product_variant WHERE product_id = $1))
            RETURNING id
            ",
        )
        .bind(product_id)
        .bind(color_name)
        .bind(color_hex)
        .fetch_one(self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "color already exists for this product"))
    }

    /// Flip a variant's active flag and return the new value.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the variant does not belong to the product.
    pub async fn toggle_variant(
        &self,
        product_id: ProductId,
        variant_id: VariantId,
    ) -> Result<bool, RepositoryError> {
        sqlx::query_scalar(
            "UPDATE shop.product_variant SET is_active = NOT is_active \
             WHERE id = $1 AND product_id = $2 RETURNING is_active",
        )
        .bind(variant_id)
        .bind(product_id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Add a size to a variant of the product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the variant does not belong to
    /// the product and `RepositoryError::Conflict` if the label exists.
    pub async fn add_size(
        &self,
        product_id: ProductId,
        variant_id: VariantId,
        label: &str,
        stock: i32,
    ) -> Result<SizeId, RepositoryError> {
        sqlx::query_scalar(
            r"
            INSERT INTO shop.product_size (variant_id, label, stock)
            SELECT v.id, $3, $4 FROM shop.product_variant v
            WHERE v.id = $1 AND v.product_id = $2
            RETURNING id
            ",
        )
        .bind(variant_id)
        .bind(product_id)
        .bind(label)
        .bind(stock)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "size already exists for this color"))?
        .ok_or(RepositoryError::NotFound)
    }

    /// Set the stock of a size of the product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the size does not belong to the product.
    pub async fn set_stock(
        &self,
        product_id: ProductId,
        size_id: SizeId,
        stock: i32,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE shop.product_size s SET stock = $3
            FROM shop.product_variant v
            WHERE s.id = $1 AND v.id = s.variant_id AND v.product_id = $2
            ",
        )
        .bind(size_id)
        .bind(product_id)
        .bind(stock)
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Append an image to the product, optionally tied to a variant.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the variant does not belong to the product.
    pub async fn add_image(
        &self,
        product_id: ProductId,
        variant_id: Option<VariantId>,
        url: &str,
        alt: &str,
    ) -> Result<ImageId, RepositoryError> {
        sqlx::query_scalar(
            r"
            INSERT INTO shop.product_image (product_id, variant_id, url, alt, position)
            SELECT p.id, $2, $3, $4,
                   (SELECT COALESCE(MAX(position) + 1, 0) FROM shop.product_image WHERE product_id = $1)
            FROM shop.product p
            WHERE p.id = $1
              AND ($2::INTEGER IS NULL OR EXISTS (
                    SELECT 1 FROM shop.product_variant v WHERE v.id = $2 AND v.product_id = $1))
            RETURNING id
            ",
        )
        .bind(product_id)
        .bind(variant_id)
        .bind(url)
        .bind(alt)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    /// Delete an image of the product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the image does not belong to the product.
    pub async fn delete_image(
        &self,
        product_id: ProductId,
        image_id: ImageId,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM shop.product_image WHERE id = $1 AND product_id = $2")
            .bind(image_id)
            .bind(product_id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Number of products, and of those the active ones.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn counts(&self) -> Result<(i64, i64), RepositoryError> {
        let counts = sqlx::query_as::<_, (i64, i64)>(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE is_active) FROM shop.product",
        )
        .fetch_one(self.pool)
        .await?;
        Ok(counts)
    }
}

/// Numeric labels ("38", "42.5") in numeric order, others after them alphabetically.
pub fn compare_size_labels(a: &str, b: &str) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.total_cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}
