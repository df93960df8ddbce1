//! Catalog models: products, color variants, sizes and images.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use kafsh_core::{ImageId, Price, ProductId, SizeId, VariantId};

/// Number of products per listing page.
pub const PAGE_SIZE: u32 = 24;

/// The price a customer pays: the sale price when it is set and lower than
/// the list price, otherwise the list price.
#[must_use]
pub fn effective_price(price: Price, sale_price: Option<Price>) -> Price {
    match sale_price {
        Some(sale) if sale < price => sale,
        _ => price,
    }
}

/// A product (one shoe model).
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Product {
    pub id: ProductId,
    pub slug: String,
    pub name: String,
    pub brand: String,
    pub category: String,
    pub description: String,
    pub price: Price,
    pub sale_price: Option<Price>,
    pub is_active: bool,
    pub is_featured: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Price charged at checkout.
    #[must_use]
    pub fn effective_price(&self) -> Price {
        effective_price(self.price, self.sale_price)
    }

    /// Whole-percent discount when a sale price applies.
    #[must_use]
    pub fn discount_percent(&self) -> Option<u32> {
        discount_percent(self.price, self.sale_price)
    }
}

/// Whole-percent discount of `sale_price` against `price`, if it applies.
#[must_use]
pub fn discount_percent(price: Price, sale_price: Option<Price>) -> Option<u32> {
    let effective = effective_price(price, sale_price);
    if effective >= price || price.is_zero() {
        return None;
    }
    let off = (price.toman() - effective.toman()).saturating_mul(100) / price.toman();
    u32::try_from(off).ok().filter(|p| *p > 0)
}

/// A product as shown in listings.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProductSummary {
    pub id: ProductId,
    pub slug: String,
    pub name: String,
    pub brand: String,
    pub category: String,
    pub price: Price,
    pub sale_price: Option<Price>,
    pub is_active: bool,
    pub is_featured: bool,
    pub image_url: Option<String>,
    pub in_stock: bool,
}

impl ProductSummary {
    #[must_use]
    pub fn effective_price(&self) -> Price {
        effective_price(self.price, self.sale_price)
    }
}

/// A color variant with its sizes and images.
#[derive(Debug, Clone, Serialize)]
pub struct Variant {
    pub id: VariantId,
    pub product_id: ProductId,
    pub color_name: String,
    pub color_hex: Option<String>,
    pub is_active: bool,
    pub position: i32,
    pub sizes: Vec<Size>,
    pub images: Vec<Image>,
}

impl Variant {
    /// Whether any size of this variant can be bought.
    #[must_use]
    pub fn in_stock(&self) -> bool {
        self.sizes.iter().any(Size::in_stock)
    }
}

/// A size of a variant with its stock level.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Size {
    pub id: SizeId,
    pub variant_id: VariantId,
    pub label: String,
    pub stock: i32,
}

impl Size {
    #[must_use]
    pub const fn in_stock(&self) -> bool {
        self.stock > 0
    }
}

/// A product image, optionally tied to one variant.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Image {
    pub id: ImageId,
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub url: String,
    pub alt: String,
    pub position: i32,
}

/// A product with everything the detail page needs.
#[derive(Debug, Clone, Serialize)]
pub struct ProductDetail {
    pub product: Product,
    pub variants: Vec<Variant>,
    /// Images not tied to a variant.
    pub images: Vec<Image>,
}

impl ProductDetail {
    /// First image to show: a shared image, else the first variant's.
    #[must_use]
    pub fn cover_image(&self) -> Option<&Image> {
        self.images
            .first()
            .or_else(|| self.variants.iter().find_map(|v| v.images.first()))
    }
}

/// Editable product fields, as submitted by the admin form or a seed file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProductInput {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    pub price: Price,
    #[serde(default)]
    pub sale_price: Option<Price>,
    #[serde(default)]
    pub is_featured: bool,
}

/// Longest accepted slug.
pub const MAX_SLUG_LENGTH: usize = 80;

/// Longest accepted product name.
pub const MAX_NAME_LENGTH: usize = 200;

/// Whether `slug` is lowercase ASCII letters, digits and single inner hyphens.
#[must_use]
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug.len() <= MAX_SLUG_LENGTH
        && slug
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        && !slug.starts_with('-')
        && !slug.ends_with('-')
        && !slug.contains("--")
}

/// Why a product form or seed entry was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProductInputError {
    #[error("نامک فقط می‌تواند شامل حروف کوچک انگلیسی، عدد و خط تیره باشد")]
    InvalidSlug,
    #[error("نام محصول الزامی است")]
    MissingName,
    #[error("نام محصول حداکثر {max} کاراکتر است")]
    NameTooLong { max: usize },
    #[error("قیمت باید بیشتر از صفر باشد")]
    ZeroPrice,
}

impl ProductInput {
    /// Trim text fields and check them.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validated(self) -> Result<Self, ProductInputError> {
        let input = Self {
            slug: self.slug.trim().to_string(),
            name: self.name.trim().to_string(),
            brand: self.brand.trim().to_string(),
            category: self.category.trim().to_string(),
            description: self.description.trim().to_string(),
            ..self
        };

        if !is_valid_slug(&input.slug) {
            return Err(ProductInputError::InvalidSlug);
        }
        if input.name.is_empty() {
            return Err(ProductInputError::MissingName);
        }
        if input.name.chars().count() > MAX_NAME_LENGTH {
            return Err(ProductInputError::NameTooLong {
                max: MAX_NAME_LENGTH,
            });
        }
        if input.price.is_zero() {
            return Err(ProductInputError::ZeroPrice);
        }
        Ok(input)
    }
}

/// Listing sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductSort {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
}

impl ProductSort {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Newest => "newest",
            Self::PriceAsc => "price_asc",
            Self::PriceDesc => "price_desc",
        }
    }

    #[must_use]
    pub const fn label_fa(&self) -> &'static str {
        match self {
            Self::Newest => "جدیدترین",
            Self::PriceAsc => "ارزان‌ترین",
            Self::PriceDesc => "گران‌ترین",
        }
    }
}

/// Listing filters, all optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ProductFilter {
    /// Case-insensitive substring of name or brand.
    pub q: Option<String>,
    pub category: Option<String>,
    pub brand: Option<String>,
    /// Only products with this size in stock.
    pub size: Option<String>,
    pub min_price: Option<Price>,
    pub max_price: Option<Price>,
    pub sort: ProductSort,
    /// 1-based page number.
    pub page: u32,
    /// Include inactive products (admin listing).
    pub include_inactive: bool,
}

impl ProductFilter {
    /// Whether only the sort and page differ from an unfiltered listing.
    #[must_use]
    pub const fn is_unfiltered(&self) -> bool {
        self.q.is_none()
            && self.category.is_none()
            && self.brand.is_none()
            && self.size.is_none()
            && self.min_price.is_none()
            && self.max_price.is_none()
            && !self.include_inactive
    }

    /// Page number clamped to at least 1.
    #[must_use]
    pub fn page(&self) -> u32 {
        self.page.max(1)
    }

    /// Row offset for the current page.
    #[must_use]
    pub fn offset(&self) -> i64 {
        i64::from(self.page() - 1) * i64::from(PAGE_SIZE)
    }
}

/// One page of results.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

impl<T> Page<T> {
    /// Total number of pages (at least 1).
    #[must_use]
    pub fn total_pages(&self) -> u32 {
        let per_page = i64::from(self.per_page.max(1));
        let pages = (self.total + per_page - 1) / per_page;
        u32::try_from(pages).unwrap_or(u32::MAX).max(1)
    }

    #[must_use]
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }

    #[must_use]
    pub const fn has_prev(&self) -> bool {
        self.page > 1
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn toman(n: i64) -> Price {
        Price::from_toman(n).unwrap()
    }

    #[test]
    fn test_effective_price() {
        assert_eq!(effective_price(toman(1_000_000), None), toman(1_000_000));
        assert_eq!(
            effective_price(toman(1_000_000), Some(toman(800_000))),
            toman(800_000)
        );
        // A sale price that is not lower is ignored.
        assert_eq!(
            effective_price(toman(1_000_000), Some(toman(1_000_000))),
            toman(1_000_000)
        );
        assert_eq!(
            effective_price(toman(1_000_000), Some(toman(1_200_000))),
            toman(1_000_000)
        );
    }

    #[test]
    fn test_discount_percent() {
        assert_eq!(discount_percent(toman(1_000_000), Some(toman(750_000))), Some(25));
        assert_eq!(discount_percent(toman(1_000_000), None), None);
        assert_eq!(discount_percent(toman(1_000_000), Some(toman(999_999))), None);
    }

    #[test]
    fn test_slug_rules() {
        assert!(is_valid_slug("nike-air-max-90"));
        assert!(!is_valid_slug("Nike-Air"));
        assert!(!is_valid_slug("کفش"));
        assert!(!is_valid_slug("-lead"));
        assert!(!is_valid_slug("double--hyphen"));
        assert!(!is_valid_slug(""));
    }

    #[test]
    fn test_product_input_validated_trims() {
        let input = ProductInput {
            slug: " runner ".to_string(),
            name: "  کتانی رانر ".to_string(),
            brand: String::new(),
            category: String::new(),
            description: String::new(),
            price: toman(1_000_000),
            sale_price: None,
            is_featured: false,
        };
        let valid = input.clone().validated().unwrap();
        assert_eq!(valid.slug, "runner");
        assert_eq!(valid.name, "کتانی رانر");

        let nameless = ProductInput {
            name: " ".to_string(),
            ..input.clone()
        };
        assert_eq!(nameless.validated(), Err(ProductInputError::MissingName));

        let free = ProductInput {
            price: Price::ZERO,
            ..input
        };
        assert_eq!(free.validated(), Err(ProductInputError::ZeroPrice));
    }

    #[test]
    fn test_filter_paging() {
        let filter = ProductFilter {
            page: 0,
            ..ProductFilter::default()
        };
        assert_eq!(filter.page(), 1);
        assert_eq!(filter.offset(), 0);
        assert!(filter.is_unfiltered());

        let third = ProductFilter {
            page: 3,
            brand: Some("Nike".to_string()),
            ..ProductFilter::default()
        };
        assert_eq!(third.offset(), 48);
        assert!(!third.is_unfiltered());
    }

    #[test]
    fn test_page_math() {
        let page = Page::<()> {
            items: vec![],
            page: 2,
            per_page: 24,
            total: 49,
        };
        assert_eq!(page.total_pages(), 3);
        assert!(page.has_next());
        assert!(page.has_prev());

        let empty = Page::<()> {
            items: vec![],
            page: 1,
            per_page: 24,
            total: 0,
        };
        assert_eq!(empty.total_pages(), 1);
        assert!(!empty.has_next());
    }
}
