//! Order placement.
//!
//! Input validation, line merging and pricing are pure functions so they can
//! be tested without a database. [`CheckoutService::place_order`] runs them
//! against size rows locked inside one transaction; prices sent by the client
//! are never read.

use std::collections::HashMap;

use rand::Rng;
use serde::Deserialize;
use sqlx::PgPool;
use thiserror::Error;
use tracing::instrument;

use kafsh_core::{
    PhoneError, PhoneNumber, PostalCode, Price, PriceError, SizeId, TrackingCode,
    TrackingCodeError,
};

use crate::config::ShopConfig;
use crate::db::orders::LockedSize;
use crate::db::{OrderRepository, RepositoryError, UserRepository};
use crate::models::{
    CurrentUser, LineRequest, Order, OrderQuote, PricedLine, ShippingInfo, effective_price,
};

/// Most distinct sizes in one order.
pub const MAX_ORDER_LINES: usize = 20;

/// Attempts at finding an unused tracking code.
const MAX_TRACKING_CODE_ATTEMPTS: usize = 5;

/// Reasons an order is refused. Display strings are shown to the customer.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("{field}: {message}")]
    InvalidField {
        field: &'static str,
        message: &'static str,
    },

    #[error("سبد خرید خالی است")]
    EmptyOrder,

    #[error("حداکثر {max} قلم کالا در هر سفارش مجاز است")]
    TooManyLines { max: usize },

    #[error("تعداد هر قلم باید بین ۱ و {max} باشد")]
    InvalidQuantity { size_id: SizeId, max: u32 },

    #[error("یکی از کالاهای سبد دیگر موجود نیست")]
    UnknownSize(SizeId),

    #[error("«{product}» در حال حاضر فروخته نمی‌شود")]
    Unavailable { product: String },

    #[error("موجودی «{product}» سایز {size} کافی نیست (موجود: {available})")]
    InsufficientStock {
        product: String,
        size: String,
        available: i32,
    },

    #[error("مبلغ سفارش نامعتبر است")]
    Pricing(#[from] PriceError),

    #[error("tracking code generation failed: {0}")]
    TrackingCode(#[from] TrackingCodeError),

    #[error("no unused tracking code after {0} attempts")]
    TrackingCodesExhausted(usize),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl CheckoutError {
    /// Whether the customer can fix the request (`400`) rather than a server fault.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        !matches!(
            self,
            Self::TrackingCode(_) | Self::TrackingCodesExhausted(_) | Self::Repository(_)
        )
    }
}

impl From<sqlx::Error> for CheckoutError {
    fn from(e: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::Database(e))
    }
}

/// Delivery details as submitted by the checkout form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShippingForm {
    pub recipient_name: String,
    pub phone: String,
    pub province: String,
    pub city: String,
    pub address: String,
    pub postal_code: String,
    #[serde(default)]
    pub note: Option<String>,
}

/// One requested line. Any price field the client adds is ignored.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ItemInput {
    pub size_id: SizeId,
    pub quantity: u32,
}

/// Body of `POST /api/orders`.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    pub shipping: ShippingForm,
    pub items: Vec<ItemInput>,
}

// =============================================================================
// Validation
// =============================================================================

fn text_field(
    value: &str,
    field: &'static str,
    min: usize,
    max: usize,
    message: &'static str,
) -> Result<String, CheckoutError> {
    let value = value.trim();
    let len = value.chars().count();
    if len < min || len > max {
        return Err(CheckoutError::InvalidField { field, message });
    }
    Ok(value.to_string())
}

/// Validate and normalize the delivery details.
///
/// # Errors
///
/// Returns `CheckoutError::InvalidField` naming the first bad field.
pub fn validate_shipping(form: &ShippingForm) -> Result<ShippingInfo, CheckoutError> {
    let recipient_name = text_field(
        &form.recipient_name,
        "recipient_name",
        1,
        100,
        "نام گیرنده را وارد کنید (حداکثر ۱۰۰ حرف)",
    )?;
    let phone = PhoneNumber::parse(&form.phone).map_err(|e| CheckoutError::InvalidField {
        field: "phone",
        message: match e {
            PhoneError::Empty => "شماره موبایل را وارد کنید",
            _ => "شماره موبایل معتبر نیست (مثال: ۰۹۱۲۳۴۵۶۷۸۹)",
        },
    })?;
    let province = text_field(&form.province, "province", 1, 50, "استان را وارد کنید")?;
    let city = text_field(&form.city, "city", 1, 50, "شهر را وارد کنید")?;
    let address = text_field(
        &form.address,
        "address",
        5,
        500,
        "نشانی باید بین ۵ تا ۵۰۰ حرف باشد",
    )?;
    let postal_code =
        PostalCode::parse(&form.postal_code).map_err(|_| CheckoutError::InvalidField {
            field: "postal_code",
            message: "کد پستی باید ۱۰ رقم باشد",
        })?;
    let note = match form.note.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(note) => Some(text_field(
            note,
            "note",
            1,
            500,
            "توضیحات حداکثر ۵۰۰ حرف است",
        )?),
    };

    Ok(ShippingInfo {
        recipient_name,
        phone,
        province,
        city,
        address,
        postal_code,
        note,
    })
}

/// Merge duplicate sizes and check line count and quantities.
///
/// Lines keep the order in which each size first appeared.
///
/// # Errors
///
/// Returns `EmptyOrder`, `TooManyLines` or `InvalidQuantity`.
pub fn merge_lines(
    items: &[ItemInput],
    max_quantity: u32,
) -> Result<Vec<LineRequest>, CheckoutError> {
    if items.is_empty() {
        return Err(CheckoutError::EmptyOrder);
    }

    let mut merged: Vec<LineRequest> = Vec::new();
    let mut index: HashMap<SizeId, usize> = HashMap::new();
    for item in items {
        if item.quantity == 0 {
            return Err(CheckoutError::InvalidQuantity {
                size_id: item.size_id,
                max: max_quantity,
            });
        }
        if let Some(line) = index.get(&item.size_id).and_then(|i| merged.get_mut(*i)) {
            line.quantity = line.quantity.saturating_add(item.quantity);
        } else {
            index.insert(item.size_id, merged.len());
            merged.push(LineRequest {
                size_id: item.size_id,
                quantity: item.quantity,
            });
        }
    }

    if merged.len() > MAX_ORDER_LINES {
        return Err(CheckoutError::TooManyLines {
            max: MAX_ORDER_LINES,
        });
    }
    if let Some(line) = merged.iter().find(|l| l.quantity > max_quantity) {
        return Err(CheckoutError::InvalidQuantity {
            size_id: line.size_id,
            max: max_quantity,
        });
    }
    Ok(merged)
}

// =============================================================================
// Pricing
// =============================================================================

/// Shipping for a subtotal: free at or above the threshold, else the flat fee.
#[must_use]
pub fn shipping_cost(subtotal: Price, shop: &ShopConfig) -> Price {
    match shop.free_shipping_threshold {
        Some(threshold) if subtotal >= threshold => Price::ZERO,
        _ => shop.shipping_fee,
    }
}

/// Price merged lines from locked catalog rows.
///
/// # Errors
///
/// Returns `UnknownSize`, `Unavailable` or `InsufficientStock` for the first
/// line that cannot be sold, `Pricing` on overflow.
pub fn price_lines(
    lines: &[LineRequest],
    locked: &[LockedSize],
    shop: &ShopConfig,
) -> Result<OrderQuote, CheckoutError> {
    let mut priced = Vec::with_capacity(lines.len());
    let mut subtotal = Price::ZERO;

    for line in lines {
        let size = locked
            .iter()
            .find(|s| s.size_id == line.size_id)
            .ok_or(CheckoutError::UnknownSize(line.size_id))?;
        if !size.active {
            return Err(CheckoutError::Unavailable {
                product: size.product_name.clone(),
            });
        }
        if i64::from(size.stock) < i64::from(line.quantity) {
            return Err(CheckoutError::InsufficientStock {
                product: size.product_name.clone(),
                size: size.size_label.clone(),
                available: size.stock.max(0),
            });
        }

        let unit_price = effective_price(size.price, size.sale_price);
        let line_total = unit_price.checked_mul(line.quantity)?;
        subtotal = subtotal.checked_add(line_total)?;

        priced.push(PricedLine {
            size_id: size.size_id,
            variant_id: size.variant_id,
            product_id: size.product_id,
            product_name: size.product_name.clone(),
            color_name: size.color_name.clone(),
            size_label: size.size_label.clone(),
            unit_price,
            quantity: line.quantity,
            line_total,
        });
    }

    let shipping = shipping_cost(subtotal, shop);
    Ok(OrderQuote {
        lines: priced,
        subtotal,
        shipping_cost: shipping,
        total: subtotal.checked_add(shipping)?,
    })
}

/// A random tracking code.
///
/// # Errors
///
/// Never in practice; the body is drawn from the code alphabet.
pub fn generate_tracking_code<R: Rng + ?Sized>(
    rng: &mut R,
) -> Result<TrackingCode, TrackingCodeError> {
    let alphabet = TrackingCode::ALPHABET;
    let body: String = (0..TrackingCode::BODY_LENGTH)
        .filter_map(|_| alphabet.get(rng.random_range(0..alphabet.len())))
        .map(|b| char::from(*b))
        .collect();
    TrackingCode::from_body(&body)
}

// =============================================================================
// Service
// =============================================================================

/// Places orders.
pub struct CheckoutService<'a> {
    pool: &'a PgPool,
    shop: &'a ShopConfig,
}

impl<'a> CheckoutService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, shop: &'a ShopConfig) -> Self {
        Self { pool, shop }
    }

    /// Validate, price and persist an order, then clear the user's cart.
    ///
    /// # Errors
    ///
    /// Returns a client-facing `CheckoutError` for invalid input or stock,
    /// `Repository` for database failures. Nothing is written on error.
    #[instrument(skip(self, request), fields(user_id = %user.id, lines = request.items.len()))]
    pub async fn place_order(
        &self,
        user: CurrentUser,
        request: &CheckoutRequest,
    ) -> Result<Order, CheckoutError> {
        let shipping = validate_shipping(&request.shipping)?;
        let lines = merge_lines(&request.items, self.shop.max_line_quantity)?;
        let size_ids: Vec<SizeId> = lines.iter().map(|l| l.size_id).collect();

        let mut tx = self.pool.begin().await?;

        let locked = OrderRepository::lock_sizes(&mut tx, &size_ids).await?;
        let quote = price_lines(&lines, &locked, self.shop)?;

        let mut placed = None;
        for attempt in 1..=MAX_TRACKING_CODE_ATTEMPTS {
            let code = generate_tracking_code(&mut rand::rng())?;
            if let Some(id) =
                OrderRepository::insert_order(&mut tx, user.id, &code, &shipping, &quote).await?
            {
                placed = Some((id, code));
                break;
            }
            tracing::warn!(attempt, "Tracking code collision, retrying");
        }
        let (order_id, code) =
            placed.ok_or(CheckoutError::TrackingCodesExhausted(MAX_TRACKING_CODE_ATTEMPTS))?;

        for line in &quote.lines {
            OrderRepository::insert_item(&mut tx, order_id, line).await?;
        }
        OrderRepository::clear_cart(&mut tx, user.id).await?;

        tx.commit().await?;

        tracing::info!(
            order_id = %order_id,
            tracking_code = %code,
            total = %quote.total,
            "Order placed"
        );

        if let Err(e) = UserRepository::new(self.pool)
            .update_phone(user.id, shipping.phone.as_str())
            .await
        {
            tracing::warn!(error = %e, "Failed to remember checkout phone");
        }

        OrderRepository::new(self.pool)
            .get_by_code(&code)
            .await?
            .ok_or(CheckoutError::Repository(RepositoryError::NotFound))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use kafsh_core::{ProductId, VariantId};

    use super::*;

    fn toman(n: i64) -> Price {
        Price::from_toman(n).unwrap()
    }

    fn form() -> ShippingForm {
        ShippingForm {
            recipient_name: "  سارا محمدی ".to_string(),
            phone: "+98 912 345 6789".to_string(),
            province: "تهران".to_string(),
            city: "تهران".to_string(),
            address: "خیابان ولیعصر، پلاک ۱۲".to_string(),
            postal_code: "۱۲۳۴۵-۶۷۸۹۰".to_string(),
            note: Some("   ".to_string()),
        }
    }

    fn locked(id: i32, stock: i32, price: i64, sale: Option<i64>) -> LockedSize {
        LockedSize {
            size_id: SizeId::new(id),
            variant_id: VariantId::new(1),
            product_id: ProductId::new(1),
            product_name: "کتانی رانینگ".to_string(),
            color_name: "مشکی".to_string(),
            size_label: "42".to_string(),
            stock,
            price: toman(price),
            sale_price: sale.map(toman),
            active: true,
        }
    }

    fn line(id: i32, quantity: u32) -> LineRequest {
        LineRequest {
            size_id: SizeId::new(id),
            quantity,
        }
    }

    fn item(id: i32, quantity: u32) -> ItemInput {
        ItemInput {
            size_id: SizeId::new(id),
            quantity,
        }
    }

    #[test]
    fn test_validate_shipping_normalizes() {
        let info = validate_shipping(&form()).unwrap();
        assert_eq!(info.recipient_name, "سارا محمدی");
        assert_eq!(info.phone.as_str(), "09123456789");
        assert_eq!(info.postal_code.as_str(), "1234567890");
        assert_eq!(info.note, None);
    }

    #[test]
    fn test_validate_shipping_rejects_fields() {
        let cases: [(fn(&mut ShippingForm), &str); 5] = [
            (|f| f.recipient_name = " ".to_string(), "recipient_name"),
            (|f| f.phone = "02112345678".to_string(), "phone"),
            (|f| f.city = "ش".repeat(51), "city"),
            (|f| f.address = "کوچه".to_string(), "address"),
            (|f| f.postal_code = "12345".to_string(), "postal_code"),
        ];
        for (mutate, expected) in cases {
            let mut f = form();
            mutate(&mut f);
            match validate_shipping(&f) {
                Err(CheckoutError::InvalidField { field, .. }) => assert_eq!(field, expected),
                other => panic!("expected {expected} error, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_validate_shipping_note_limit() {
        let mut f = form();
        f.note = Some("ا".repeat(500));
        assert!(validate_shipping(&f).is_ok());
        f.note = Some("ا".repeat(501));
        assert!(validate_shipping(&f).is_err());
    }

    #[test]
    fn test_merge_lines_sums_duplicates() {
        let merged = merge_lines(&[item(3, 1), item(5, 2), item(3, 2)], 10).unwrap();
        assert_eq!(merged, vec![line(3, 3), line(5, 2)]);
    }

    #[test]
    fn test_merge_lines_limits() {
        assert!(matches!(merge_lines(&[], 10), Err(CheckoutError::EmptyOrder)));
        assert!(matches!(
            merge_lines(&[item(1, 0)], 10),
            Err(CheckoutError::InvalidQuantity { .. })
        ));
        assert!(matches!(
            merge_lines(&[item(1, 6), item(1, 5)], 10),
            Err(CheckoutError::InvalidQuantity { .. })
        ));

        let many: Vec<ItemInput> = (1..=21).map(|i| item(i, 1)).collect();
        assert!(matches!(
            merge_lines(&many, 10),
            Err(CheckoutError::TooManyLines { max: 20 })
        ));
        assert_eq!(merge_lines(&many[..20], 10).unwrap().len(), 20);
    }

    #[test]
    fn test_price_lines_uses_server_prices() {
        let shop = ShopConfig::default();
        let quote = price_lines(
            &[line(1, 2), line(2, 1)],
            &[
                locked(1, 5, 1_500_000, Some(1_200_000)),
                locked(2, 5, 900_000, Some(950_000)),
            ],
            &shop,
        )
        .unwrap();

        assert_eq!(quote.lines[0].unit_price, toman(1_200_000));
        assert_eq!(quote.lines[0].line_total, toman(2_400_000));
        assert_eq!(quote.lines[1].unit_price, toman(900_000));
        assert_eq!(quote.subtotal, toman(3_300_000));
        assert_eq!(quote.shipping_cost, Price::ZERO);
        assert_eq!(quote.total, toman(3_300_000));
    }

    #[test]
    fn test_price_lines_charges_shipping_below_threshold() {
        let shop = ShopConfig::default();
        let quote = price_lines(&[line(1, 1)], &[locked(1, 5, 500_000, None)], &shop).unwrap();
        assert_eq!(quote.shipping_cost, toman(60_000));
        assert_eq!(quote.total, toman(560_000));
    }

    #[test]
    fn test_price_lines_rejects_unsellable() {
        let shop = ShopConfig::default();

        assert!(matches!(
            price_lines(&[line(9, 1)], &[locked(1, 5, 1, None)], &shop),
            Err(CheckoutError::UnknownSize(id)) if id == SizeId::new(9)
        ));

        let mut inactive = locked(1, 5, 1, None);
        inactive.active = false;
        assert!(matches!(
            price_lines(&[line(1, 1)], &[inactive], &shop),
            Err(CheckoutError::Unavailable { .. })
        ));

        let err = price_lines(&[line(1, 3)], &[locked(1, 2, 1, None)], &shop).unwrap_err();
        assert!(matches!(err, CheckoutError::InsufficientStock { available: 2, .. }));
        assert!(err.to_string().contains("کتانی رانینگ"));
    }

    #[test]
    fn test_shipping_cost_threshold() {
        let mut shop = ShopConfig::default();
        assert_eq!(shipping_cost(toman(1_999_999), &shop), toman(60_000));
        assert_eq!(shipping_cost(toman(2_000_000), &shop), Price::ZERO);

        shop.free_shipping_threshold = None;
        assert_eq!(shipping_cost(toman(9_000_000), &shop), toman(60_000));
    }

    #[test]
    fn test_generate_tracking_code() {
        let mut rng = StdRng::seed_from_u64(7);
        let a = generate_tracking_code(&mut rng).unwrap();
        let b = generate_tracking_code(&mut rng).unwrap();
        assert!(a.as_str().starts_with("KF-"));
        assert_eq!(a.as_str().len(), 11);
        assert_ne!(a, b);
        assert_eq!(TrackingCode::parse(a.as_str()).unwrap(), a);
    }

    #[test]
    fn test_client_errors() {
        assert!(CheckoutError::EmptyOrder.is_client_error());
        assert!(!CheckoutError::TrackingCodesExhausted(5).is_client_error());
        assert!(!CheckoutError::Repository(RepositoryError::NotFound).is_client_error());
    }
}
