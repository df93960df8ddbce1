//! Custom Askama template filters.

#![allow(clippy::unnecessary_wraps)]

use std::fmt::Display;

use kafsh_core::locale::{JalaliDate, format_number_fa, to_persian_digits};

use crate::views::iran_now;

/// Returns the current Jalali year in Persian digits.
///
/// Usage in templates: `{{ ""|current_year }}`
#[askama::filter_fn]
pub fn current_year(_value: impl Display, _env: &dyn askama::Values) -> askama::Result<String> {
    let today = JalaliDate::from_gregorian(iran_now().date_naive());
    Ok(to_persian_digits(&today.year.to_string()))
}

/// Returns the content hash for main.css.
///
/// The hash is computed at build time from the CSS file content.
///
/// Usage in templates: `{{ ""|css_hash }}`
#[askama::filter_fn]
pub fn css_hash(_value: impl Display, _env: &dyn askama::Values) -> askama::Result<&'static str> {
    Ok(env!("CSS_HASH"))
}

/// Returns the content hash for the cart and app scripts.
///
/// Usage in templates: `{{ ""|js_hash }}`
#[askama::filter_fn]
pub fn js_hash(_value: impl Display, _env: &dyn askama::Values) -> askama::Result<&'static str> {
    Ok(env!("JS_HASH"))
}

/// Replaces ASCII digits with Persian digits.
///
/// Usage in templates: `{{ item.quantity|fa_digits }}`
#[askama::filter_fn]
pub fn fa_digits(value: impl Display, _env: &dyn askama::Values) -> askama::Result<String> {
    Ok(to_persian_digits(&value.to_string()))
}

/// Formats an integer with Persian digits and thousands separators.
/// Non-numeric input is only digit-converted.
///
/// Usage in templates: `{{ stats.total_orders()|fa_number }}`
#[askama::filter_fn]
pub fn fa_number(value: impl Display, _env: &dyn askama::Values) -> askama::Result<String> {
    let raw = value.to_string();
    Ok(raw
        .parse::<i64>()
        .map_or_else(|_| to_persian_digits(&raw), format_number_fa))
}
