//! Seed the catalog from a YAML file.
//!
//! The whole file is validated before connecting, then applied in one
//! transaction. Products are matched by slug, variants by color name and
//! sizes by label. Missing rows are inserted; existing rows are left alone
//! unless `--replace` is given, which overwrites product fields, color
//! codes, stock and images. Nothing is ever deleted except images under
//! `--replace`, so products with orders stay intact.
//!
//! ```yaml
//! products:
//!   - slug: runner-x
//!     name: کفش رانر ایکس
//!     brand: Kafsh
//!     category: running
//!     price: 2450000
//!     sale_price: 1990000
//!     is_featured: true
//!     images:
//!       - url: /static/img/runner-x.jpg
//!     variants:
//!       - color_name: مشکی
//!         color_hex: "#111111"
//!         sizes:
//!           - { label: 41, stock: 4 }
//!           - { label: 42.5, stock: 2 }
//! ```

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use serde::Deserialize;
use sqlx::{PgConnection, PgPool};
use tracing::{error, info};

use kafsh_core::{Price, ProductId, VariantId};
use kafsh_storefront::db;
use kafsh_storefront::models::ProductInput;
use kafsh_storefront::routes::admin::products::{
    ImageForm, VariantForm, validate_image, validate_size_label, validate_variant,
};

use super::database_url;

/// Top-level YAML document.
#[derive(Debug, Deserialize)]
pub struct CatalogFile {
    pub products: Vec<SeedProduct>,
}

#[derive(Debug, Deserialize)]
pub struct SeedProduct {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    /// Whole toman.
    pub price: i64,
    #[serde(default)]
    pub sale_price: Option<i64>,
    #[serde(default)]
    pub is_featured: bool,
    /// Images shown for every color.
    #[serde(default)]
    pub images: Vec<SeedImage>,
    #[serde(default)]
    pub variants: Vec<SeedVariant>,
}

#[derive(Debug, Deserialize)]
pub struct SeedVariant {
    pub color_name: String,
    #[serde(default)]
    pub color_hex: Option<String>,
    #[serde(default)]
    pub sizes: Vec<SeedSize>,
    #[serde(default)]
    pub images: Vec<SeedImage>,
}

#[derive(Debug, Deserialize)]
pub struct SeedSize {
    pub label: SizeLabel,
    #[serde(default)]
    pub stock: i32,
}

/// Size labels may be written bare (`42.5`) or quoted (`"XL"`).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SizeLabel {
    Text(String),
    Number(f64),
}

impl fmt::Display for SizeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SeedImage {
    pub url: String,
    #[serde(default)]
    pub alt: String,
}

/// A product ready to write.
#[derive(Debug)]
pub struct PlannedProduct {
    pub input: ProductInput,
    pub images: Vec<PlannedImage>,
    pub variants: Vec<PlannedVariant>,
}

#[derive(Debug)]
pub struct PlannedVariant {
    pub color_name: String,
    pub color_hex: Option<String>,
    pub sizes: Vec<(String, i32)>,
    pub images: Vec<PlannedImage>,
}

#[derive(Debug, PartialEq, Eq)]
pub struct PlannedImage {
    pub url: String,
    pub alt: String,
}

fn plan_images(images: &[SeedImage], at: &str, errors: &mut Vec<String>) -> Vec<PlannedImage> {
    images
        .iter()
        .filter_map(|image| {
            let form = ImageForm {
                url: image.url.clone(),
                alt: image.alt.clone(),
                variant_id: String::new(),
            };
            match validate_image(&form) {
                Ok(valid) => Some(PlannedImage {
                    url: valid.url,
                    alt: valid.alt,
                }),
                Err(e) => {
                    errors.push(format!("{at}: image '{}': {e}", image.url));
                    None
                }
            }
        })
        .collect()
}

fn plan_variant(variant: &SeedVariant, at: &str, errors: &mut Vec<String>) -> PlannedVariant {
    let form = VariantForm {
        color_name: variant.color_name.clone(),
        color_hex: variant.color_hex.clone().unwrap_or_default(),
    };
    let (color_name, color_hex) = validate_variant(&form).unwrap_or_else(|e| {
        errors.push(format!("{at}: {e}"));
        (variant.color_name.trim().to_string(), None)
    });

    let mut labels = HashSet::new();
    let mut sizes = Vec::new();
    for size in &variant.sizes {
        let raw = size.label.to_string();
        match validate_size_label(&raw) {
            Ok(label) if !labels.insert(label.clone()) => {
                errors.push(format!("{at}: duplicate size '{label}'"));
            }
            Ok(_) if size.stock < 0 => {
                errors.push(format!("{at}: size '{raw}' has negative stock"));
            }
            Ok(label) => sizes.push((label, size.stock)),
            Err(e) => errors.push(format!("{at}: size '{raw}': {e}")),
        }
    }

    PlannedVariant {
        color_name,
        color_hex,
        images: plan_images(&variant.images, at, errors),
        sizes,
    }
}

fn plan_product(product: &SeedProduct, errors: &mut Vec<String>) -> Option<PlannedProduct> {
    let at = format!("product '{}'", product.slug);

    let price = Price::from_toman(product.price);
    let sale_price = product.sale_price.map(Price::from_toman).transpose();
    let (price, sale_price) = match (price, sale_price) {
        (Ok(price), Ok(sale_price)) => (price, sale_price),
        (Err(e), _) | (_, Err(e)) => {
            errors.push(format!("{at}: {e}"));
            return None;
        }
    };

    let input = ProductInput {
        slug: product.slug.clone(),
        name: product.name.clone(),
        brand: product.brand.clone(),
        category: product.category.clone(),
        description: product.description.clone(),
        price,
        sale_price,
        is_featured: product.is_featured,
    }
    .validated();
    let input = match input {
        Ok(input) => input,
        Err(e) => {
            errors.push(format!("{at}: {e}"));
            return None;
        }
    };

    let mut colors = HashSet::new();
    let variants = product
        .variants
        .iter()
        .map(|variant| {
            let planned = plan_variant(variant, &at, errors);
            if !colors.insert(planned.color_name.clone()) {
                errors.push(format!("{at}: duplicate color '{}'", planned.color_name));
            }
            planned
        })
        .collect();

    Some(PlannedProduct {
        images: plan_images(&product.images, &at, errors),
        input,
        variants,
    })
}

/// Validate a parsed file, collecting every problem.
///
/// # Errors
///
/// Returns one message per invalid entry.
pub fn plan(file: &CatalogFile) -> Result<Vec<PlannedProduct>, Vec<String>> {
    let mut errors = Vec::new();
    let mut slugs = HashSet::new();
    let mut planned = Vec::with_capacity(file.products.len());

    for product in &file.products {
        if let Some(product) = plan_product(product, &mut errors) {
            if !slugs.insert(product.input.slug.clone()) {
                errors.push(format!("duplicate slug '{}'", product.input.slug));
            }
            planned.push(product);
        }
    }

    if errors.is_empty() {
        Ok(planned)
    } else {
        Err(errors)
    }
}

/// Row counts written by a seed run.
#[derive(Debug, Default)]
pub struct SeedSummary {
    pub products_created: usize,
    pub products_updated: usize,
    pub products_unchanged: usize,
    pub variants_created: usize,
    pub sizes_created: usize,
    pub sizes_updated: usize,
    pub images_written: usize,
}

async fn insert_images(
    conn: &mut PgConnection,
    product_id: ProductId,
    variant_id: Option<VariantId>,
    images: &[PlannedImage],
    position: &mut i32,
) -> Result<usize, sqlx::Error> {
    for image in images {
        sqlx::query(
            "INSERT INTO shop.product_image (product_id, variant_id, url, alt, position) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(product_id)
        .bind(variant_id)
        .bind(&image.url)
        .bind(&image.alt)
        .bind(*position)
        .execute(&mut *conn)
        .await?;
        *position += 1;
    }
    Ok(images.len())
}

async fn apply_product(
    conn: &mut PgConnection,
    product: &PlannedProduct,
    replace: bool,
    summary: &mut SeedSummary,
) -> Result<(), sqlx::Error> {
    let input = &product.input;
    let existing: Option<ProductId> =
        sqlx::query_scalar("SELECT id FROM shop.product WHERE slug = $1")
            .bind(&input.slug)
            .fetch_optional(&mut *conn)
            .await?;

    let (product_id, write_images) = match existing {
        Some(id) if replace => {
            sqlx::query(
                "UPDATE shop.product SET name = $2, brand = $3, category = $4, description = $5, \
                 price = $6, sale_price = $7, is_featured = $8, updated_at = NOW() WHERE id = $1",
            )
            .bind(id)
            .bind(&input.name)
            .bind(&input.brand)
            .bind(&input.category)
            .bind(&input.description)
            .bind(input.price)
            .bind(input.sale_price)
            .bind(input.is_featured)
            .execute(&mut *conn)
            .await?;
            sqlx::query("DELETE FROM shop.product_image WHERE product_id = $1")
                .bind(id)
                .execute(&mut *conn)
                .await?;
            summary.products_updated += 1;
            (id, true)
        }
        Some(id) => {
            summary.products_unchanged += 1;
            (id, false)
        }
        None => {
            let id = sqlx::query_scalar(
                "INSERT INTO shop.product (slug, name, brand, category, description, price, sale_price, is_featured) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING id",
            )
            .bind(&input.slug)
            .bind(&input.name)
            .bind(&input.brand)
            .bind(&input.category)
            .bind(&input.description)
            .bind(input.price)
            .bind(input.sale_price)
            .bind(input.is_featured)
            .fetch_one(&mut *conn)
            .await?;
            summary.products_created += 1;
            (id, true)
        }
    };

    let mut image_position = 0;
    if write_images {
        summary.images_written +=
            insert_images(conn, product_id, None, &product.images, &mut image_position).await?;
    }

    for (position, variant) in product.variants.iter().enumerate() {
        let existing: Option<VariantId> = sqlx::query_scalar(
            "SELECT id FROM shop.product_variant WHERE product_id = $1 AND color_name = $2",
        )
        .bind(product_id)
        .bind(&variant.color_name)
        .fetch_optional(&mut *conn)
        .await?;

        let variant_id = match existing {
            Some(id) => {
                if replace {
                    sqlx::query("UPDATE shop.product_variant SET color_hex = $2 WHERE id = $1")
                        .bind(id)
                        .bind(variant.color_hex.as_deref())
                        .execute(&mut *conn)
                        .await?;
                }
                id
            }
            None => {
                summary.variants_created += 1;
                sqlx::query_scalar(
                    "INSERT INTO shop.product_variant (product_id, color_name, color_hex, position) \
                     VALUES ($1, $2, $3, $4) RETURNING id",
                )
                .bind(product_id)
                .bind(&variant.color_name)
                .bind(variant.color_hex.as_deref())
                .bind(i32::try_from(position).unwrap_or(i32::MAX))
                .fetch_one(&mut *conn)
                .await?
            }
        };

        for (label, stock) in &variant.sizes {
            let result = sqlx::query(
                "INSERT INTO shop.product_size (variant_id, label, stock) VALUES ($1, $2, $3) \
                 ON CONFLICT (variant_id, label) DO NOTHING",
            )
            .bind(variant_id)
            .bind(label)
            .bind(*stock)
            .execute(&mut *conn)
            .await?;

            if result.rows_affected() > 0 {
                summary.sizes_created += 1;
            } else if replace {
                sqlx::query(
                    "UPDATE shop.product_size SET stock = $3 WHERE variant_id = $1 AND label = $2",
                )
                .bind(variant_id)
                .bind(label)
                .bind(*stock)
                .execute(&mut *conn)
                .await?;
                summary.sizes_updated += 1;
            }
        }

        if write_images {
            summary.images_written += insert_images(
                conn,
                product_id,
                Some(variant_id),
                &variant.images,
                &mut image_position,
            )
            .await?;
        }
    }

    Ok(())
}

/// Write planned products in one transaction.
///
/// # Errors
///
/// Returns the first database error; nothing is committed in that case.
pub async fn apply(
    pool: &PgPool,
    products: &[PlannedProduct],
    replace: bool,
) -> Result<SeedSummary, sqlx::Error> {
    let mut summary = SeedSummary::default();
    let mut tx = pool.begin().await?;
    for product in products {
        apply_product(&mut tx, product, replace, &mut summary).await?;
    }
    tx.commit().await?;
    Ok(summary)
}

/// Seed the catalog from a YAML file.
///
/// # Arguments
///
/// * `file_path` - Path to the YAML catalog
/// * `replace` - Overwrite existing products instead of only adding missing rows
///
/// # Errors
///
/// Returns an error if the file is missing or invalid, or a write fails.
pub async fn catalog(file_path: &str, replace: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(format!("File not found: {file_path}").into());
    }

    info!(path = %file_path, "Loading catalog from file");
    let content = tokio::fs::read_to_string(path).await?;
    let file: CatalogFile = serde_yaml::from_str(&content)?;
    info!(products = file.products.len(), "Parsed catalog");

    let products = match plan(&file) {
        Ok(products) => products,
        Err(errors) => {
            error!("Catalog validation failed:");
            for err in &errors {
                error!("  - {err}");
            }
            return Err(format!("{} validation errors found", errors.len()).into());
        }
    };

    let database_url = database_url()?;
    let pool = db::create_pool(&database_url).await?;
    info!("Connected to database");

    info!(replace, "Starting seeding process");
    let summary = apply(&pool, &products, replace).await?;

    info!(
        products_created = summary.products_created,
        products_updated = summary.products_updated,
        products_unchanged = summary.products_unchanged,
        variants_created = summary.variants_created,
        sizes_created = summary.sizes_created,
        sizes_updated = summary.sizes_updated,
        images_written = summary.images_written,
        "Seeding complete"
    );
    info!("A running server picks up the changes when its catalog cache expires");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"
products:
  - slug: runner-x
    name: "  کفش رانر ایکس "
    brand: Kafsh
    price: 2450000
    sale_price: 1990000
    images:
      - url: /static/img/runner-x.jpg
        alt: رانر
    variants:
      - color_name: مشکی
        color_hex: "#1A1A1A"
        sizes:
          - { label: 41, stock: 4 }
          - { label: 42.5, stock: 2 }
          - { label: "۴۳", stock: 0 }
        images:
          - url: https://cdn.example.com/runner-x-black.jpg
      - color_name: سفید
"##;

    #[test]
    fn test_plan_parses_and_normalizes() {
        let file: CatalogFile = serde_yaml::from_str(SAMPLE).unwrap();
        let products = plan(&file).unwrap();
        assert_eq!(products.len(), 1);

        let product = &products[0];
        assert_eq!(product.input.name, "کفش رانر ایکس");
        assert_eq!(product.input.price, Price::from_toman(2_450_000).unwrap());
        assert_eq!(product.images.len(), 1);
        assert_eq!(product.variants.len(), 2);

        let black = &product.variants[0];
        assert_eq!(black.color_hex.as_deref(), Some("#1a1a1a"));
        assert_eq!(
            black.sizes,
            vec![
                ("41".to_string(), 4),
                ("42.5".to_string(), 2),
                ("43".to_string(), 0)
            ]
        );
        assert_eq!(black.images.len(), 1);
        assert!(product.variants[1].sizes.is_empty());
    }

    #[test]
    fn test_plan_collects_every_error() {
        let yaml = r##"
products:
  - slug: Bad Slug
    name: x
    price: 100
  - slug: ok
    name: ok
    price: 100
    variants:
      - color_name: قرمز
        color_hex: red
        sizes:
          - { label: 40, stock: -1 }
      - color_name: قرمز
    images:
      - url: ftp://example.com/a.jpg
  - slug: ok
    name: again
    price: 100
"##;
        let file: CatalogFile = serde_yaml::from_str(yaml).unwrap();
        let errors = plan(&file).unwrap_err();

        assert!(errors.iter().any(|e| e.contains("Bad Slug")));
        assert!(errors.iter().any(|e| e.contains("negative stock")));
        assert!(errors.iter().any(|e| e.contains("duplicate color")));
        assert!(errors.iter().any(|e| e.contains("ftp://")));
        assert!(errors.iter().any(|e| e.contains("duplicate slug 'ok'")));
        assert!(errors.len() >= 6);
    }

    #[test]
    fn test_plan_rejects_zero_and_negative_prices() {
        let yaml = r"
products:
  - slug: free
    name: free
    price: 0
  - slug: negative
    name: negative
    price: 100
    sale_price: -5
";
        let file: CatalogFile = serde_yaml::from_str(yaml).unwrap();
        let errors = plan(&file).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_duplicate_size_labels_after_normalizing() {
        let yaml = r#"
products:
  - slug: dup
    name: dup
    price: 100
    variants:
      - color_name: آبی
        sizes:
          - { label: "40", stock: 1 }
          - { label: "۴۰", stock: 2 }
"#;
        let file: CatalogFile = serde_yaml::from_str(yaml).unwrap();
        let errors = plan(&file).unwrap_err();
        assert_eq!(errors, vec!["product 'dup': duplicate size '40'".to_string()]);
    }

    #[test]
    fn test_size_label_display() {
        assert_eq!(SizeLabel::Number(42.0).to_string(), "42");
        assert_eq!(SizeLabel::Number(42.5).to_string(), "42.5");
        assert_eq!(SizeLabel::Text("XL".to_string()).to_string(), "XL");
    }
}
