//! Type-safe price representation using decimal arithmetic.
//!
//! All prices in Kafsh are whole Toman amounts. Storage uses `NUMERIC(14, 0)`
//! so the database and Rust agree on exact values; fractional amounts are
//! rejected at construction.

use core::fmt;
use core::iter::Sum;
use core::ops::Add;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::locale::format_number_fa;

/// Errors that can occur when constructing a [`Price`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    /// Negative amount.
    #[error("price cannot be negative")]
    Negative,
    /// Amount has a fractional part.
    #[error("price must be a whole number of toman")]
    Fractional,
    /// Input is not a number.
    #[error("invalid price: {0}")]
    Invalid(String),
    /// Arithmetic overflow.
    #[error("price overflow")]
    Overflow,
}

/// A non-negative amount in Toman.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Price(Decimal);

impl Price {
    /// Zero toman.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a price from a whole toman amount.
    ///
    /// # Errors
    ///
    /// Returns `PriceError::Negative` for negative amounts.
    pub fn from_toman(amount: i64) -> Result<Self, PriceError> {
        if amount < 0 {
            return Err(PriceError::Negative);
        }
        Ok(Self(Decimal::from(amount)))
    }

    /// Create a price from a decimal, validating sign and scale.
    ///
    /// # Errors
    ///
    /// Returns `PriceError::Negative` or `PriceError::Fractional`.
    pub fn from_decimal(amount: Decimal) -> Result<Self, PriceError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(PriceError::Negative);
        }
        if amount.fract() != Decimal::ZERO {
            return Err(PriceError::Fractional);
        }
        Ok(Self(amount.normalize()))
    }

    /// Parse user input such as `1,250,000` or `۱٬۲۵۰٬۰۰۰`.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty, not numeric, negative or fractional.
    pub fn parse(input: &str) -> Result<Self, PriceError> {
        let cleaned: String = crate::locale::normalize_digits(input)
            .chars()
            .filter(|&c| !matches!(c, ',' | '_' | ' ' | crate::locale::THOUSANDS_SEPARATOR))
            .collect();
        if cleaned.is_empty() {
            return Err(PriceError::Invalid(input.to_owned()));
        }
        let amount = cleaned
            .parse::<Decimal>()
            .map_err(|_| PriceError::Invalid(input.to_owned()))?;
        Self::from_decimal(amount)
    }

    /// The underlying decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Whole toman as `i64` (saturating).
    #[must_use]
    pub fn toman(&self) -> i64 {
        self.0.to_i64().unwrap_or(i64::MAX)
    }

    /// Whether the price is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Multiply by a quantity.
    ///
    /// # Errors
    ///
    /// Returns `PriceError::Overflow` on overflow.
    pub fn checked_mul(self, quantity: u32) -> Result<Self, PriceError> {
        self.0
            .checked_mul(Decimal::from(quantity))
            .map(Self)
            .ok_or(PriceError::Overflow)
    }

    /// Add two prices.
    ///
    /// # Errors
    ///
    /// Returns `PriceError::Overflow` on overflow.
    pub fn checked_add(self, other: Self) -> Result<Self, PriceError> {
        self.0
            .checked_add(other.0)
            .map(Self)
            .ok_or(PriceError::Overflow)
    }

    /// Persian display form, e.g. `۱٬۲۵۰٬۰۰۰ تومان`.
    #[must_use]
    pub fn display_fa(&self) -> String {
        format!("{} تومان", format_number_fa(self.toman()))
    }
}

impl Add for Price {
    type Output = Self;

    /// Saturating add for display-only aggregates. Use `checked_add` for money
    /// that is persisted.
    fn add(self, rhs: Self) -> Self {
        self.checked_add(rhs).unwrap_or(Self(Decimal::MAX))
    }
}

impl Sum for Price {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.toman())
    }
}

impl TryFrom<Decimal> for Price {
    type Error = PriceError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::from_decimal(value)
    }
}

impl From<Price> for Decimal {
    fn from(price: Price) -> Self {
        price.0
    }
}

#[cfg(feature = "postgres")]
impl ::sqlx::Type<::sqlx::Postgres> for Price {
    fn type_info() -> ::sqlx::postgres::PgTypeInfo {
        <Decimal as ::sqlx::Type<::sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &::sqlx::postgres::PgTypeInfo) -> bool {
        <Decimal as ::sqlx::Type<::sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> ::sqlx::Decode<'r, ::sqlx::Postgres> for Price {
    fn decode(
        value: ::sqlx::postgres::PgValueRef<'r>,
    ) -> Result<Self, ::sqlx::error::BoxDynError> {
        let amount = <Decimal as ::sqlx::Decode<::sqlx::Postgres>>::decode(value)?;
        Ok(Self::from_decimal(amount)?)
    }
}

#[cfg(feature = "postgres")]
impl ::sqlx::Encode<'_, ::sqlx::Postgres> for Price {
    fn encode_by_ref(
        &self,
        buf: &mut ::sqlx::postgres::PgArgumentBuffer,
    ) -> Result<::sqlx::encode::IsNull, ::sqlx::error::BoxDynError> {
        <Decimal as ::sqlx::Encode<::sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}
