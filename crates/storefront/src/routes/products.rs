//! Product route handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::instrument;

use kafsh_core::locale::{normalize_digits, to_persian_digits};
use kafsh_core::{Price, SizeId, VariantId};

use crate::error::{AppError, PageError};
use crate::filters;
use crate::middleware::OptionalUser;
use crate::models::product::discount_percent;
use crate::models::{
    Image, Page, ProductDetail, ProductFilter, ProductSort, ProductSummary, Variant,
};
use crate::services::catalog::Facets;
use crate::state::AppState;
use crate::views::{PageContext, Pagination, ProductCard, parse_amount};

/// Sizes with this many pairs or fewer are flagged as running out.
const LOW_STOCK: i32 = 2;

// =============================================================================
// Query
// =============================================================================

/// Listing query parameters.
///
/// Everything is taken as text so that empty form fields and Persian digits
/// are tolerated rather than rejected.
#[derive(Debug, Default, Deserialize)]
pub struct ProductQuery {
    pub q: Option<String>,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub size: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
    pub sort: Option<String>,
    pub page: Option<String>,
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_price(value: Option<&String>) -> Option<Price> {
    parse_amount(value?).and_then(|n| Price::from_toman(n).ok())
}

fn parse_sort(value: Option<&str>) -> ProductSort {
    match value {
        Some("price_asc") => ProductSort::PriceAsc,
        Some("price_desc") => ProductSort::PriceDesc,
        _ => ProductSort::Newest,
    }
}

impl ProductQuery {
    /// Listing filter for shop pages (active products only).
    #[must_use]
    pub fn to_filter(&self) -> ProductFilter {
        ProductFilter {
            q: non_empty(self.q.as_ref()),
            category: non_empty(self.category.as_ref()),
            brand: non_empty(self.brand.as_ref()),
            size: non_empty(self.size.as_ref()).map(|s| normalize_digits(&s)),
            min_price: parse_price(self.min_price.as_ref()),
            max_price: parse_price(self.max_price.as_ref()),
            sort: parse_sort(self.sort.as_deref()),
            page: self
                .page
                .as_deref()
                .and_then(parse_amount)
                .and_then(|p| u32::try_from(p).ok())
                .unwrap_or(1),
            include_inactive: false,
        }
    }

    /// Current value of a filter field, for refilling the form.
    #[must_use]
    pub fn value(&self, field: &str) -> &str {
        let value = match field {
            "q" => self.q.as_ref(),
            "category" => self.category.as_ref(),
            "brand" => self.brand.as_ref(),
            "size" => self.size.as_ref(),
            "min_price" => self.min_price.as_ref(),
            "max_price" => self.max_price.as_ref(),
            _ => None,
        };
        value.map_or("", |v| v.trim())
    }

    /// Whether `option` is the chosen value of a select field.
    #[must_use]
    pub fn is_selected(&self, field: &str, option: &str) -> bool {
        let value = self.value(field);
        !value.is_empty() && normalize_digits(value) == option
    }
}

/// Query string reproducing `filter` without the page number.
#[must_use]
pub fn filter_query(filter: &ProductFilter) -> String {
    let mut pairs: Vec<(&str, String)> = Vec::new();
    if let Some(q) = &filter.q {
        pairs.push(("q", q.clone()));
    }
    if let Some(category) = &filter.category {
        pairs.push(("category", category.clone()));
    }
    if let Some(brand) = &filter.brand {
        pairs.push(("brand", brand.clone()));
    }
    if let Some(size) = &filter.size {
        pairs.push(("size", size.clone()));
    }
    if let Some(min) = filter.min_price {
        pairs.push(("min_price", min.toman().to_string()));
    }
    if let Some(max) = filter.max_price {
        pairs.push(("max_price", max.toman().to_string()));
    }
    if filter.sort != ProductSort::Newest {
        pairs.push(("sort", filter.sort.as_str().to_string()));
    }

    pairs
        .iter()
        .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

// =============================================================================
// Views
// =============================================================================

/// Image display data for templates.
#[derive(Clone)]
pub struct ImageView {
    pub url: String,
    pub alt: String,
}

impl From<&Image> for ImageView {
    fn from(image: &Image) -> Self {
        Self {
            url: image.url.clone(),
            alt: image.alt.clone(),
        }
    }
}

/// Size button data.
#[derive(Clone)]
pub struct SizeView {
    pub id: SizeId,
    pub label: String,
    pub label_fa: String,
    pub in_stock: bool,
    /// e.g. `فقط ۲ جفت باقی مانده`
    pub stock_note: Option<String>,
}

/// Color variant data.
#[derive(Clone)]
pub struct VariantView {
    pub id: VariantId,
    pub color_name: String,
    pub color_hex: Option<String>,
    pub sizes: Vec<SizeView>,
    pub images: Vec<ImageView>,
    pub in_stock: bool,
}

impl From<&Variant> for VariantView {
    fn from(variant: &Variant) -> Self {
        Self {
            id: variant.id,
            color_name: variant.color_name.clone(),
            color_hex: variant.color_hex.clone(),
            sizes: variant
                .sizes
                .iter()
                .map(|size| SizeView {
                    id: size.id,
                    label: size.label.clone(),
                    label_fa: to_persian_digits(&size.label),
                    in_stock: size.in_stock(),
                    stock_note: (size.in_stock() && size.stock <= LOW_STOCK).then(|| {
                        to_persian_digits(&format!("فقط {} جفت باقی مانده", size.stock))
                    }),
                })
                .collect(),
            images: variant.images.iter().map(ImageView::from).collect(),
            in_stock: variant.in_stock(),
        }
    }
}

/// Product detail data for templates.
#[derive(Clone)]
pub struct ProductView {
    pub slug: String,
    pub name: String,
    pub brand: String,
    pub category: String,
    pub description: String,
    pub price: String,
    pub price_toman: i64,
    pub original_price: Option<String>,
    pub discount: Option<String>,
    pub cover_url: Option<String>,
    pub images: Vec<ImageView>,
    pub variants: Vec<VariantView>,
    pub in_stock: bool,
}

impl From<&ProductDetail> for ProductView {
    fn from(detail: &ProductDetail) -> Self {
        let product = &detail.product;
        let discount = discount_percent(product.price, product.sale_price);
        let variants: Vec<VariantView> = detail.variants.iter().map(VariantView::from).collect();
        Self {
            slug: product.slug.clone(),
            name: product.name.clone(),
            brand: product.brand.clone(),
            category: product.category.clone(),
            description: product.description.clone(),
            price: product.effective_price().display_fa(),
            price_toman: product.effective_price().toman(),
            original_price: discount.map(|_| product.price.display_fa()),
            discount: discount.map(|d| to_persian_digits(&format!("{d}٪"))),
            cover_url: detail.cover_image().map(|image| image.url.clone()),
            images: detail.images.iter().map(ImageView::from).collect(),
            in_stock: variants.iter().any(|v| v.in_stock),
            variants,
        }
    }
}

/// A sort option in the listing toolbar.
#[derive(Clone)]
pub struct SortOption {
    pub value: &'static str,
    pub label: &'static str,
    pub selected: bool,
}

// =============================================================================
// Templates
// =============================================================================

/// Product listing page template.
#[derive(Template, WebTemplate)]
#[template(path = "products/index.html")]
pub struct ProductsIndexTemplate {
    pub page: PageContext,
    pub products: Vec<ProductCard>,
    pub total: String,
    pub query: ProductQuery,
    pub facets: Facets,
    pub sort_options: Vec<SortOption>,
    pub pagination: Pagination,
}

/// Product detail page template.
#[derive(Template, WebTemplate)]
#[template(path = "products/show.html")]
pub struct ProductShowTemplate {
    pub page: PageContext,
    pub product: ProductView,
    pub max_quantity: u32,
}

// =============================================================================
// Handlers
// =============================================================================

/// Display the product listing page.
#[instrument(skip(state))]
pub async fn index(
    State(state): State<AppState>,
    OptionalUser(user): OptionalUser,
    Query(query): Query<ProductQuery>,
) -> Result<impl IntoResponse, PageError> {
    let filter = query.to_filter();
    let results = state.catalog().list(&filter).await?;
    let facets = state.catalog().facets().await?;

    let base = match filter_query(&filter) {
        qs if qs.is_empty() => "/products".to_string(),
        qs => format!("/products?{qs}"),
    };

    Ok(ProductsIndexTemplate {
        page: PageContext::new(&state, user),
        products: results.items.iter().map(ProductCard::from).collect(),
        total: to_persian_digits(&results.total.to_string()),
        sort_options: [ProductSort::Newest, ProductSort::PriceAsc, ProductSort::PriceDesc]
            .into_iter()
            .map(|sort| SortOption {
                value: sort.as_str(),
                label: sort.label_fa(),
                selected: sort == filter.sort,
            })
            .collect(),
        pagination: Pagination::new(&base, results.page, results.total_pages()),
        facets: (*facets).clone(),
        query,
    })
}

/// Display the product detail page.
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    OptionalUser(user): OptionalUser,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, PageError> {
    let detail = state.catalog().product(&slug).await?;

    Ok(ProductShowTemplate {
        page: PageContext::new(&state, user),
        product: ProductView::from(detail.as_ref()),
        max_quantity: state.config().shop.max_line_quantity,
    })
}

/// Product listing as JSON.
#[instrument(skip(state))]
pub async fn api_index(
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
) -> Result<Json<Page<ProductSummary>>, AppError> {
    let page = state.catalog().list(&query.to_filter()).await?;
    Ok(Json((*page).clone()))
}

/// Product detail as JSON.
#[instrument(skip(state))]
pub async fn api_show(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<ProductDetail>, AppError> {
    let detail = state.catalog().product(&slug).await?;
    Ok(Json((*detail).clone()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_query_to_filter_tolerates_blank_and_persian_input() {
        let query = ProductQuery {
            q: Some("  ".to_string()),
            brand: Some("Nike".to_string()),
            size: Some("۴۲".to_string()),
            min_price: Some("۵۰۰٬۰۰۰".to_string()),
            max_price: Some("abc".to_string()),
            sort: Some("price_desc".to_string()),
            page: Some("2".to_string()),
            ..ProductQuery::default()
        };
        let filter = query.to_filter();
        assert_eq!(filter.q, None);
        assert_eq!(filter.brand.as_deref(), Some("Nike"));
        assert_eq!(filter.size.as_deref(), Some("42"));
        assert_eq!(filter.min_price, Some(Price::from_toman(500_000).unwrap()));
        assert_eq!(filter.max_price, None);
        assert_eq!(filter.sort, ProductSort::PriceDesc);
        assert_eq!(filter.page, 2);
        assert!(!filter.include_inactive);
    }

    #[test]
    fn test_query_refills_form_values() {
        let query = ProductQuery {
            brand: Some(" Nike ".to_string()),
            size: Some("۴۲".to_string()),
            ..ProductQuery::default()
        };
        assert_eq!(query.value("brand"), "Nike");
        assert_eq!(query.value("q"), "");
        assert!(query.is_selected("brand", "Nike"));
        assert!(query.is_selected("size", "42"));
        assert!(!query.is_selected("category", ""));
    }

    #[test]
    fn test_unknown_sort_falls_back_to_newest() {
        assert_eq!(parse_sort(Some("popular")), ProductSort::Newest);
        assert_eq!(parse_sort(None), ProductSort::Newest);
    }

    #[test]
    fn test_filter_query_round_trips_without_page() {
        let filter = ProductFilter {
            q: Some("ایر مکس".to_string()),
            brand: Some("Nike".to_string()),
            sort: ProductSort::PriceAsc,
            page: 4,
            ..ProductFilter::default()
        };
        let qs = filter_query(&filter);
        assert_eq!(
            qs,
            format!("q={}&brand=Nike&sort=price_asc", urlencoding::encode("ایر مکس"))
        );
        assert_eq!(filter_query(&ProductFilter::default()), "");
    }
}
