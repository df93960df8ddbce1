//! Admin product management.
//!
//! Every write drops the catalog cache and is logged with the admin id.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tracing::instrument;
use url::Url;

use kafsh_core::locale::{normalize_digits, to_persian_digits};
use kafsh_core::{ImageId, Price, ProductId, SizeId, VariantId};

use super::redirect_with_message;
use crate::db::{ProductRepository, RepositoryError};
use crate::error::PageError;
use crate::filters;
use crate::middleware::RequireAdmin;
use crate::models::{Product, ProductDetail, ProductFilter, ProductInput, ProductSummary};
use crate::state::AppState;
use crate::views::{PageContext, Pagination, parse_amount};

/// Longest accepted size label.
const MAX_SIZE_LABEL_LENGTH: usize = 10;
/// Longest accepted color name.
const MAX_COLOR_NAME_LENGTH: usize = 50;
/// Longest accepted image alt text.
const MAX_ALT_LENGTH: usize = 200;

fn product_path(id: ProductId) -> String {
    format!("/admin/products/{id}")
}

// =============================================================================
// Forms
// =============================================================================

/// Product fields as posted by the form. Prices are typed text.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductForm {
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub sale_price: String,
    /// Checkbox: present when ticked.
    pub is_featured: Option<String>,
}

fn parse_price_field(raw: &str, label: &str) -> Result<Price, String> {
    parse_amount(raw)
        .and_then(|n| Price::from_toman(n).ok())
        .ok_or_else(|| format!("{label} باید عددی مثبت به تومان باشد"))
}

impl ProductForm {
    /// Parse and validate into a product input.
    ///
    /// # Errors
    ///
    /// Returns a Persian message describing the first invalid field.
    pub fn to_input(&self) -> Result<ProductInput, String> {
        let price = parse_price_field(&self.price, "قیمت")?;
        let sale_price = if self.sale_price.trim().is_empty() {
            None
        } else {
            Some(parse_price_field(&self.sale_price, "قیمت حراج")?)
        };

        ProductInput {
            slug: self.slug.clone(),
            name: self.name.clone(),
            brand: self.brand.clone(),
            category: self.category.clone(),
            description: self.description.clone(),
            price,
            sale_price,
            is_featured: self.is_featured.is_some(),
        }
        .validated()
        .map_err(|e| e.to_string())
    }
}

impl From<&Product> for ProductForm {
    fn from(product: &Product) -> Self {
        Self {
            slug: product.slug.clone(),
            name: product.name.clone(),
            brand: product.brand.clone(),
            category: product.category.clone(),
            description: product.description.clone(),
            price: product.price.toman().to_string(),
            sale_price: product
                .sale_price
                .map(|p| p.toman().to_string())
                .unwrap_or_default(),
            is_featured: product.is_featured.then(|| "on".to_string()),
        }
    }
}

/// New variant form.
#[derive(Debug, Deserialize)]
pub struct VariantForm {
    pub color_name: String,
    #[serde(default)]
    pub color_hex: String,
}

/// Validate a color variant: name required, hex optional `#RRGGBB`.
///
/// # Errors
///
/// Returns a Persian message for the invalid field.
pub fn validate_variant(form: &VariantForm) -> Result<(String, Option<String>), String> {
    let name = form.color_name.trim();
    if name.is_empty() || name.chars().count() > MAX_COLOR_NAME_LENGTH {
        return Err(format!("نام رنگ الزامی و حداکثر {MAX_COLOR_NAME_LENGTH} کاراکتر است"));
    }

    let hex = form.color_hex.trim();
    if hex.is_empty() {
        return Ok((name.to_string(), None));
    }
    let valid_hex = hex.len() == 7
        && hex.starts_with('#')
        && hex.chars().skip(1).all(|c| c.is_ascii_hexdigit());
    if !valid_hex {
        return Err("کد رنگ باید به شکل ‎#1A2B3C باشد".to_string());
    }
    Ok((name.to_string(), Some(hex.to_ascii_lowercase())))
}

/// New size form.
#[derive(Debug, Deserialize)]
pub struct SizeForm {
    pub variant_id: VariantId,
    pub label: String,
    #[serde(default)]
    pub stock: String,
}

/// Validate a size label; Persian digits are stored as ASCII.
///
/// # Errors
///
/// Returns a Persian message if the label is empty or too long.
pub fn validate_size_label(raw: &str) -> Result<String, String> {
    let label = normalize_digits(raw.trim());
    if label.is_empty() || label.chars().count() > MAX_SIZE_LABEL_LENGTH {
        return Err(format!("سایز الزامی و حداکثر {MAX_SIZE_LABEL_LENGTH} کاراکتر است"));
    }
    Ok(label)
}

/// Parse a stock level; blank means zero.
///
/// # Errors
///
/// Returns a Persian message for negative or non-numeric input.
pub fn parse_stock(raw: &str) -> Result<i32, String> {
    if raw.trim().is_empty() {
        return Ok(0);
    }
    parse_amount(raw)
        .and_then(|n| i32::try_from(n).ok())
        .filter(|n| *n >= 0)
        .ok_or_else(|| "موجودی باید عددی صفر یا بیشتر باشد".to_string())
}

/// Stock form.
#[derive(Debug, Deserialize)]
pub struct StockForm {
    pub stock: String,
}

/// New image form.
#[derive(Debug, Deserialize)]
pub struct ImageForm {
    pub url: String,
    #[serde(default)]
    pub alt: String,
    /// Empty for an image shared by all variants.
    #[serde(default)]
    pub variant_id: String,
}

/// Validated image fields.
#[derive(Debug, PartialEq, Eq)]
pub struct ImageInput {
    pub url: String,
    pub alt: String,
    pub variant_id: Option<VariantId>,
}

/// Validate an image: `http(s)` URL or a path under `/static/`.
///
/// # Errors
///
/// Returns a Persian message for the invalid field.
pub fn validate_image(form: &ImageForm) -> Result<ImageInput, String> {
    let url = form.url.trim();
    let valid_url = url.starts_with("/static/") && !url.contains("..")
        || Url::parse(url).is_ok_and(|u| matches!(u.scheme(), "http" | "https"));
    if !valid_url {
        return Err("آدرس تصویر باید با https:// یا /static/ شروع شود".to_string());
    }

    let alt = form.alt.trim();
    if alt.chars().count() > MAX_ALT_LENGTH {
        return Err(format!("متن جایگزین حداکثر {MAX_ALT_LENGTH} کاراکتر است"));
    }

    let variant_id = match form.variant_id.trim() {
        "" => None,
        raw => Some(
            raw.parse::<VariantId>()
                .map_err(|_| "رنگ انتخاب‌شده معتبر نیست".to_string())?,
        ),
    };

    Ok(ImageInput {
        url: url.to_string(),
        alt: alt.to_string(),
        variant_id,
    })
}

// =============================================================================
// Views
// =============================================================================

/// Product list row.
#[derive(Clone)]
pub struct ProductRowView {
    pub id: ProductId,
    pub slug: String,
    pub name: String,
    pub brand: String,
    pub price: String,
    pub is_active: bool,
    pub is_featured: bool,
    pub in_stock: bool,
    pub image_url: Option<String>,
}

impl From<&ProductSummary> for ProductRowView {
    fn from(p: &ProductSummary) -> Self {
        Self {
            id: p.id,
            slug: p.slug.clone(),
            name: p.name.clone(),
            brand: p.brand.clone(),
            price: p.effective_price().display_fa(),
            is_active: p.is_active,
            is_featured: p.is_featured,
            in_stock: p.in_stock,
            image_url: p.image_url.clone(),
        }
    }
}

/// Size row on the edit page.
#[derive(Clone)]
pub struct SizeRowView {
    pub id: SizeId,
    pub label: String,
    pub stock: i32,
}

/// Variant block on the edit page.
#[derive(Clone)]
pub struct VariantRowView {
    pub id: VariantId,
    pub color_name: String,
    pub color_hex: Option<String>,
    pub is_active: bool,
    pub sizes: Vec<SizeRowView>,
}

/// Image tile on the edit page.
#[derive(Clone)]
pub struct ImageRowView {
    pub id: ImageId,
    pub url: String,
    pub alt: String,
    /// Color the image belongs to, if any.
    pub color_name: Option<String>,
}

fn image_rows(detail: &ProductDetail) -> Vec<ImageRowView> {
    let shared = detail.images.iter().map(|image| (image, None));
    let per_variant = detail.variants.iter().flat_map(|variant| {
        variant
            .images
            .iter()
            .map(move |image| (image, Some(variant.color_name.clone())))
    });

    shared
        .chain(per_variant)
        .map(|(image, color_name)| ImageRowView {
            id: image.id,
            url: image.url.clone(),
            alt: image.alt.clone(),
            color_name,
        })
        .collect()
}

// =============================================================================
// Templates
// =============================================================================

/// Product list template.
#[derive(Template, WebTemplate)]
#[template(path = "admin/products/index.html")]
pub struct ProductsIndexTemplate {
    pub page: PageContext,
    pub products: Vec<ProductRowView>,
    pub total: String,
    pub q: String,
    pub pagination: Pagination,
    pub msg: Option<String>,
}

/// New product template.
#[derive(Template, WebTemplate)]
#[template(path = "admin/products/new.html")]
pub struct NewProductTemplate {
    pub page: PageContext,
    pub form: ProductForm,
    pub error: Option<String>,
}

/// Edit product template.
#[derive(Template, WebTemplate)]
#[template(path = "admin/products/edit.html")]
pub struct EditProductTemplate {
    pub page: PageContext,
    pub id: ProductId,
    pub slug: String,
    pub is_active: bool,
    pub form: ProductForm,
    pub variants: Vec<VariantRowView>,
    pub images: Vec<ImageRowView>,
    pub msg: Option<String>,
}

// =============================================================================
// Handlers
// =============================================================================

/// Product list query parameters.
#[derive(Debug, Deserialize)]
pub struct IndexQuery {
    #[serde(default)]
    pub q: String,
    pub page: Option<String>,
    pub msg: Option<String>,
}

/// List all products, inactive ones included.
#[instrument(skip(state), fields(admin_id = %admin.id))]
pub async fn index(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Query(query): Query<IndexQuery>,
) -> Result<impl IntoResponse, PageError> {
    let q = query.q.trim().to_string();
    let filter = ProductFilter {
        q: (!q.is_empty()).then(|| q.clone()),
        page: query
            .page
            .as_deref()
            .and_then(parse_amount)
            .and_then(|p| u32::try_from(p).ok())
            .unwrap_or(1),
        include_inactive: true,
        ..ProductFilter::default()
    };
    let results = ProductRepository::new(state.pool()).list(&filter).await?;

    let base = if q.is_empty() {
        "/admin/products".to_string()
    } else {
        format!("/admin/products?q={}", urlencoding::encode(&q))
    };

    Ok(ProductsIndexTemplate {
        page: PageContext::new(&state, Some(admin)),
        products: results.items.iter().map(ProductRowView::from).collect(),
        total: to_persian_digits(&results.total.to_string()),
        pagination: Pagination::new(&base, results.page, results.total_pages()),
        q,
        msg: query.msg,
    })
}

/// Display the new product form.
#[instrument(skip(state), fields(admin_id = %admin.id))]
pub async fn new_form(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
) -> impl IntoResponse {
    NewProductTemplate {
        page: PageContext::new(&state, Some(admin)),
        form: ProductForm::default(),
        error: None,
    }
}

/// Create a product and open its edit page.
#[instrument(skip(state, form), fields(admin_id = %admin.id))]
pub async fn create(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Form(form): Form<ProductForm>,
) -> Result<Response, PageError> {
    let rejected = |form: ProductForm, error: String| {
        (
            StatusCode::BAD_REQUEST,
            NewProductTemplate {
                page: PageContext::new(&state, Some(admin)),
                form,
                error: Some(error),
            },
        )
            .into_response()
    };

    let input = match form.to_input() {
        Ok(input) => input,
        Err(error) => return Ok(rejected(form, error)),
    };

    match ProductRepository::new(state.pool()).create(&input).await {
        Ok(product) => {
            state.catalog().invalidate();
            tracing::info!(product_id = %product.id, slug = %product.slug, "Product created");
            Ok(redirect_with_message(&product_path(product.id), "محصول ساخته شد").into_response())
        }
        Err(RepositoryError::Conflict(_)) => {
            Ok(rejected(form, "این نامک قبلا استفاده شده است".to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Edit page query parameters.
#[derive(Debug, Deserialize)]
pub struct EditQuery {
    pub msg: Option<String>,
}

/// Display the edit page with variants, sizes and images.
#[instrument(skip(state), fields(admin_id = %admin.id))]
pub async fn edit(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<ProductId>,
    Query(query): Query<EditQuery>,
) -> Result<impl IntoResponse, PageError> {
    let detail = ProductRepository::new(state.pool())
        .get_detail_by_id(id)
        .await?
        .ok_or(RepositoryError::NotFound)?;

    Ok(EditProductTemplate {
        page: PageContext::new(&state, Some(admin)),
        id,
        slug: detail.product.slug.clone(),
        is_active: detail.product.is_active,
        form: ProductForm::from(&detail.product),
        variants: detail
            .variants
            .iter()
            .map(|v| VariantRowView {
                id: v.id,
                color_name: v.color_name.clone(),
                color_hex: v.color_hex.clone(),
                is_active: v.is_active,
                sizes: v
                    .sizes
                    .iter()
                    .map(|s| SizeRowView {
                        id: s.id,
                        label: s.label.clone(),
                        stock: s.stock,
                    })
                    .collect(),
            })
            .collect(),
        images: image_rows(&detail),
        msg: query.msg,
    })
}

/// Update product fields.
#[instrument(skip(state, form), fields(admin_id = %admin.id))]
pub async fn update(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<ProductId>,
    Form(form): Form<ProductForm>,
) -> Result<Redirect, PageError> {
    let back = product_path(id);
    let input = match form.to_input() {
        Ok(input) => input,
        Err(error) => return Ok(redirect_with_message(&back, &error)),
    };

    match ProductRepository::new(state.pool()).update(id, &input).await {
        Ok(_) => {
            state.catalog().invalidate();
            tracing::info!(product_id = %id, "Product updated");
            Ok(redirect_with_message(&back, "تغییرات ذخیره شد"))
        }
        Err(RepositoryError::Conflict(_)) => {
            Ok(redirect_with_message(&back, "این نامک قبلا استفاده شده است"))
        }
        Err(e) => Err(e.into()),
    }
}

/// Toggle whether the product is listed.
#[instrument(skip(state), fields(admin_id = %admin.id))]
pub async fn toggle(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<ProductId>,
) -> Result<Redirect, PageError> {
    let active = ProductRepository::new(state.pool()).toggle_active(id).await?;
    state.catalog().invalidate();
    tracing::info!(product_id = %id, active, "Product visibility changed");

    let msg = if active { "محصول فعال شد" } else { "محصول غیرفعال شد" };
    Ok(redirect_with_message(&product_path(id), msg))
}

/// Add a color variant.
#[instrument(skip(state), fields(admin_id = %admin.id))]
pub async fn add_variant(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<ProductId>,
    Form(form): Form<VariantForm>,
) -> Result<Redirect, PageError> {
    let back = product_path(id);
    let (color_name, color_hex) = match validate_variant(&form) {
        Ok(valid) => valid,
        Err(error) => return Ok(redirect_with_message(&back, &error)),
    };

    match ProductRepository::new(state.pool())
        .add_variant(id, &color_name, color_hex.as_deref())
        .await
    {
        Ok(variant_id) => {
            state.catalog().invalidate();
            tracing::info!(product_id = %id, variant_id = %variant_id, "Variant added");
            Ok(redirect_with_message(&back, "رنگ اضافه شد"))
        }
        Err(RepositoryError::Conflict(_)) => {
            Ok(redirect_with_message(&back, "این رنگ قبلا ثبت شده است"))
        }
        Err(e) => Err(e.into()),
    }
}

/// Toggle a variant.
#[instrument(skip(state), fields(admin_id = %admin.id))]
pub async fn toggle_variant(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path((id, variant_id)): Path<(ProductId, VariantId)>,
) -> Result<Redirect, PageError> {
    let active = ProductRepository::new(state.pool())
        .toggle_variant(id, variant_id)
        .await?;
    state.catalog().invalidate();
    tracing::info!(
        product_id = %id,
        variant_id = %variant_id,
        active,
        "Variant visibility changed"
    );

    let msg = if active { "رنگ فعال شد" } else { "رنگ غیرفعال شد" };
    Ok(redirect_with_message(&product_path(id), msg))
}

/// Add a size to a variant.
#[instrument(skip(state), fields(admin_id = %admin.id))]
pub async fn add_size(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<ProductId>,
    Form(form): Form<SizeForm>,
) -> Result<Redirect, PageError> {
    let back = product_path(id);
    let validated = validate_size_label(&form.label)
        .and_then(|label| parse_stock(&form.stock).map(|stock| (label, stock)));
    let (label, stock) = match validated {
        Ok(valid) => valid,
        Err(error) => return Ok(redirect_with_message(&back, &error)),
    };

    match ProductRepository::new(state.pool())
        .add_size(id, form.variant_id, &label, stock)
        .await
    {
        Ok(size_id) => {
            state.catalog().invalidate();
            tracing::info!(product_id = %id, size_id = %size_id, stock, "Size added");
            Ok(redirect_with_message(&back, "سایز اضافه شد"))
        }
        Err(RepositoryError::Conflict(_)) => {
            Ok(redirect_with_message(&back, "این سایز برای این رنگ قبلا ثبت شده است"))
        }
        Err(e) => Err(e.into()),
    }
}

/// Set the stock level of a size.
#[instrument(skip(state), fields(admin_id = %admin.id))]
pub async fn set_stock(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path((id, size_id)): Path<(ProductId, SizeId)>,
    Form(form): Form<StockForm>,
) -> Result<Redirect, PageError> {
    let back = product_path(id);
    let stock = match parse_stock(&form.stock) {
        Ok(stock) => stock,
        Err(error) => return Ok(redirect_with_message(&back, &error)),
    };

    ProductRepository::new(state.pool())
        .set_stock(id, size_id, stock)
        .await?;
    state.catalog().invalidate();
    tracing::info!(product_id = %id, size_id = %size_id, stock, "Stock set");

    Ok(redirect_with_message(&back, "موجودی ذخیره شد"))
}

/// Attach an image to the product or one of its variants.
#[instrument(skip(state), fields(admin_id = %admin.id))]
pub async fn add_image(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<ProductId>,
    Form(form): Form<ImageForm>,
) -> Result<Redirect, PageError> {
    let back = product_path(id);
    let image = match validate_image(&form) {
        Ok(image) => image,
        Err(error) => return Ok(redirect_with_message(&back, &error)),
    };

    let image_id = ProductRepository::new(state.pool())
        .add_image(id, image.variant_id, &image.url, &image.alt)
        .await?;
    state.catalog().invalidate();
    tracing::info!(product_id = %id, image_id = %image_id, "Image added");

    Ok(redirect_with_message(&back, "تصویر اضافه شد"))
}

/// Remove an image.
#[instrument(skip(state), fields(admin_id = %admin.id))]
pub async fn delete_image(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path((id, image_id)): Path<(ProductId, ImageId)>,
) -> Result<Redirect, PageError> {
    ProductRepository::new(state.pool())
        .delete_image(id, image_id)
        .await?;
    state.catalog().invalidate();
    tracing::info!(product_id = %id, image_id = %image_id, "Image deleted");

    Ok(redirect_with_message(&product_path(id), "تصویر حذف شد"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn form() -> ProductForm {
        ProductForm {
            slug: "air-runner".to_string(),
            name: "کتانی ایر رانر".to_string(),
            brand: "Nike".to_string(),
            price: "۲٬۵۰۰٬۰۰۰".to_string(),
            sale_price: " ".to_string(),
            is_featured: Some("on".to_string()),
            ..ProductForm::default()
        }
    }

    #[test]
    fn test_product_form_to_input() {
        let input = form().to_input().unwrap();
        assert_eq!(input.price, Price::from_toman(2_500_000).unwrap());
        assert_eq!(input.sale_price, None);
        assert!(input.is_featured);
    }

    #[test]
    fn test_product_form_rejects_bad_fields() {
        let bad_price = ProductForm {
            price: "ارزان".to_string(),
            ..form()
        };
        assert!(bad_price.to_input().unwrap_err().contains("قیمت"));

        let bad_slug = ProductForm {
            slug: "Air Runner".to_string(),
            ..form()
        };
        assert!(bad_slug.to_input().is_err());
    }

    #[test]
    fn test_validate_variant() {
        let ok = VariantForm {
            color_name: " سفید ".to_string(),
            color_hex: "#FFFFFF".to_string(),
        };
        assert_eq!(
            validate_variant(&ok).unwrap(),
            ("سفید".to_string(), Some("#ffffff".to_string()))
        );

        let bad_hex = VariantForm {
            color_name: "سفید".to_string(),
            color_hex: "white".to_string(),
        };
        assert!(validate_variant(&bad_hex).is_err());
    }

    #[test]
    fn test_size_and_stock() {
        assert_eq!(validate_size_label(" ۴۲ ").unwrap(), "42");
        assert!(validate_size_label("").is_err());
        assert_eq!(parse_stock("").unwrap(), 0);
        assert_eq!(parse_stock("۱۲").unwrap(), 12);
        assert!(parse_stock("-1").is_err());
    }

    #[test]
    fn test_validate_image() {
        let image = validate_image(&ImageForm {
            url: "https://cdn.example.com/a.jpg".to_string(),
            alt: "نمای کنار".to_string(),
            variant_id: "3".to_string(),
        })
        .unwrap();
        assert_eq!(image.variant_id, Some(VariantId::new(3)));

        assert!(
            validate_image(&ImageForm {
                url: "/static/img/a.jpg".to_string(),
                alt: String::new(),
                variant_id: String::new(),
            })
            .is_ok()
        );
        assert!(
            validate_image(&ImageForm {
                url: "javascript:alert(1)".to_string(),
                alt: String::new(),
                variant_id: String::new(),
            })
            .is_err()
        );
    }
}
