//! Display helpers shared by page templates.
//!
//! Templates receive pre-formatted strings: prices in Toman with Persian
//! digits and dates in the Jalali calendar at Iran time.

use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::Serialize;

use kafsh_core::locale::{JalaliDate, normalize_digits, to_persian_digits};

use crate::models::{CurrentUser, ProductSummary, product::discount_percent};
use crate::state::AppState;

/// Iran Standard Time, UTC+03:30.
const IRAN_OFFSET_SECS: i32 = 3 * 3600 + 30 * 60;

fn iran_offset() -> FixedOffset {
    FixedOffset::east_opt(IRAN_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// A UTC timestamp in Iran time.
#[must_use]
pub fn iran_time(at: DateTime<Utc>) -> DateTime<FixedOffset> {
    at.with_timezone(&iran_offset())
}

/// The current time in Iran.
#[must_use]
pub fn iran_now() -> DateTime<FixedOffset> {
    iran_time(Utc::now())
}

/// Long Jalali date, e.g. `۲۵ مهر ۱۴۰۵`.
#[must_use]
pub fn jalali_date(at: DateTime<Utc>) -> String {
    JalaliDate::from_gregorian(iran_time(at).date_naive()).format_long_fa()
}

/// Jalali date with the time of day, e.g. `۲۵ مهر ۱۴۰۵، ۱۴:۳۰`.
#[must_use]
pub fn jalali_datetime(at: DateTime<Utc>) -> String {
    let local = iran_time(at);
    format!(
        "{}، {}",
        JalaliDate::from_gregorian(local.date_naive()).format_long_fa(),
        to_persian_digits(&local.format("%H:%M").to_string()),
    )
}

/// Parse a typed whole number. Accepts Persian digits and thousands separators.
#[must_use]
pub fn parse_amount(raw: &str) -> Option<i64> {
    normalize_digits(raw.trim())
        .replace([',', '\u{066C}', '\u{060C}'], "")
        .parse()
        .ok()
}

/// Data every page layout needs.
#[derive(Debug, Clone)]
pub struct PageContext {
    pub shop_name: String,
    pub user: Option<CurrentUser>,
    pub bot_username: Option<String>,
}

impl PageContext {
    #[must_use]
    pub fn new(state: &AppState, user: Option<CurrentUser>) -> Self {
        Self {
            shop_name: state.config().shop.name.clone(),
            user,
            bot_username: state.config().telegram.bot_username.clone(),
        }
    }

    #[must_use]
    pub const fn is_signed_in(&self) -> bool {
        self.user.is_some()
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.user.is_some_and(|u| u.is_admin)
    }
}

/// A product tile in listings.
#[derive(Debug, Clone, Serialize)]
pub struct ProductCard {
    pub slug: String,
    pub name: String,
    pub brand: String,
    pub price: String,
    /// List price, struck through when on sale.
    pub original_price: Option<String>,
    /// e.g. `۲۵٪`
    pub discount: Option<String>,
    pub image_url: Option<String>,
    pub in_stock: bool,
}

impl From<&ProductSummary> for ProductCard {
    fn from(p: &ProductSummary) -> Self {
        let discount = discount_percent(p.price, p.sale_price);
        Self {
            slug: p.slug.clone(),
            name: p.name.clone(),
            brand: p.brand.clone(),
            price: p.effective_price().display_fa(),
            original_price: discount.map(|_| p.price.display_fa()),
            discount: discount.map(|d| to_persian_digits(&format!("{d}٪"))),
            image_url: p.image_url.clone(),
            in_stock: p.in_stock,
        }
    }
}

/// Previous/next links for a paged listing.
#[derive(Debug, Clone, Default)]
pub struct Pagination {
    /// e.g. `صفحه ۲ از ۵`
    pub label: String,
    pub prev_url: Option<String>,
    pub next_url: Option<String>,
}

impl Pagination {
    /// Build links by appending `page=N` to `base`, a path with an optional
    /// query string.
    #[must_use]
    pub fn new(base: &str, page: u32, total_pages: u32) -> Self {
        let sep = if base.contains('?') { '&' } else { '?' };
        let link = |n: u32| format!("{base}{sep}page={n}");
        Self {
            label: to_persian_digits(&format!("صفحه {page} از {total_pages}")),
            prev_url: (page > 1).then(|| link(page - 1)),
            next_url: (page < total_pages).then(|| link(page + 1)),
        }
    }

    #[must_use]
    pub const fn is_needed(&self) -> bool {
        self.prev_url.is_some() || self.next_url.is_some()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use kafsh_core::{Price, ProductId};

    use super::*;

    #[test]
    fn test_iran_time_crosses_midnight() {
        // 21:00 UTC on 16 Oct is 00:30 on 17 Oct in Tehran (25 Mehr 1405).
        let at = Utc.with_ymd_and_hms(2026, 10, 16, 21, 0, 0).unwrap();
        assert_eq!(iran_time(at).format("%Y-%m-%d %H:%M").to_string(), "2026-10-17 00:30");
        assert_eq!(jalali_date(at), "۲۵ مهر ۱۴۰۵");
        assert_eq!(jalali_datetime(at), "۲۵ مهر ۱۴۰۵، ۰۰:۳۰");
    }

    #[test]
    fn test_product_card_sale() {
        let summary = ProductSummary {
            id: ProductId::new(1),
            slug: "runner".to_string(),
            name: "کتانی رانر".to_string(),
            brand: "Nike".to_string(),
            category: "ورزشی".to_string(),
            price: Price::from_toman(1_000_000).unwrap(),
            sale_price: Some(Price::from_toman(750_000).unwrap()),
            is_active: true,
            is_featured: false,
            image_url: None,
            in_stock: true,
        };
        let card = ProductCard::from(&summary);
        assert_eq!(card.price, Price::from_toman(750_000).unwrap().display_fa());
        assert_eq!(card.original_price, Some(Price::from_toman(1_000_000).unwrap().display_fa()));
        assert_eq!(card.discount.as_deref(), Some("۲۵٪"));
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount(" ۱٬۲۵۰٬۰۰۰ "), Some(1_250_000));
        assert_eq!(parse_amount("2,000"), Some(2000));
        assert_eq!(parse_amount("-5"), Some(-5));
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("12a"), None);
    }

    #[test]
    fn test_pagination_links() {
        let p = Pagination::new("/products?brand=Nike", 2, 3);
        assert_eq!(p.prev_url.as_deref(), Some("/products?brand=Nike&page=1"));
        assert_eq!(p.next_url.as_deref(), Some("/products?brand=Nike&page=3"));
        assert_eq!(p.label, "صفحه ۲ از ۳");

        let single = Pagination::new("/admin/orders", 1, 1);
        assert!(!single.is_needed());
    }
}
