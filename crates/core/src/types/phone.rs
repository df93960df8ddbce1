//! Validated Iranian contact types used for shipping.
//!
//! Both types normalize Persian and Arabic-Indic digits before validating,
//! since customers type them from Persian keyboards.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`PhoneNumber`] or [`PostalCode`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PhoneError {
    /// Input is empty.
    #[error("value cannot be empty")]
    Empty,
    /// Not an Iranian mobile number.
    #[error("mobile number must look like 09xxxxxxxxx")]
    InvalidMobile,
    /// Postal code is not exactly ten digits.
    #[error("postal code must be exactly {expected} digits")]
    InvalidPostalCode {
        /// Required number of digits.
        expected: usize,
    },
}

/// An Iranian mobile number in canonical `09xxxxxxxxx` form.
///
/// Accepts `+98`, `0098` and `98` prefixes, spaces and dashes, and Persian
/// digits.
///
/// ```
/// use kafsh_core::PhoneNumber;
/// let phone = PhoneNumber::parse("+98 912 345 6789").unwrap();
/// assert_eq!(phone.as_str(), "09123456789");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Parse and normalize a mobile number.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty or not a mobile number.
    pub fn parse(input: &str) -> Result<Self, PhoneError> {
        let digits: String = crate::locale::normalize_digits(input.trim())
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
            .collect();
        if digits.is_empty() {
            return Err(PhoneError::Empty);
        }

        let national = if let Some(rest) = digits.strip_prefix("+98") {
            rest
        } else if let Some(rest) = digits.strip_prefix("0098") {
            rest
        } else if let Some(rest) = digits.strip_prefix("98").filter(|r| r.len() == 10) {
            rest
        } else if let Some(rest) = digits.strip_prefix('0') {
            rest
        } else {
            digits.as_str()
        };

        if national.len() != 10
            || !national.starts_with('9')
            || !national.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(PhoneError::InvalidMobile);
        }

        Ok(Self(format!("0{national}")))
    }

    /// The canonical number as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Persian-digit form for display.
    #[must_use]
    pub fn display_fa(&self) -> String {
        crate::locale::to_persian_digits(&self.0)
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for PhoneNumber {
    type Err = PhoneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PhoneNumber {
    type Error = PhoneError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PhoneNumber> for String {
    fn from(phone: PhoneNumber) -> Self {
        phone.0
    }
}

impl AsRef<str> for PhoneNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A ten-digit Iranian postal code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PostalCode(String);

impl PostalCode {
    /// Required number of digits.
    pub const LENGTH: usize = 10;

    /// Parse a postal code, ignoring spaces and dashes.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty or not exactly ten digits.
    pub fn parse(input: &str) -> Result<Self, PhoneError> {
        let digits: String = crate::locale::normalize_digits(input.trim())
            .chars()
            .filter(|c| !matches!(c, ' ' | '-'))
            .collect();
        if digits.is_empty() {
            return Err(PhoneError::Empty);
        }
        if digits.len() != Self::LENGTH || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PhoneError::InvalidPostalCode {
                expected: Self::LENGTH,
            });
        }
        Ok(Self(digits))
    }

    /// The code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PostalCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PostalCode {
    type Error = PhoneError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PostalCode> for String {
    fn from(code: PostalCode) -> Self {
        code.0
    }
}

// Database values were validated on the way in, so decoding skips re-parsing.
#[cfg(feature = "postgres")]
macro_rules! text_column {
    ($ty:ty) => {
        impl ::sqlx::Type<::sqlx::Postgres> for $ty {
            fn type_info() -> ::sqlx::postgres::PgTypeInfo {
                <String as ::sqlx::Type<::sqlx::Postgres>>::type_info()
            }

            fn compatible(ty: &::sqlx::postgres::PgTypeInfo) -> bool {
                <String as ::sqlx::Type<::sqlx::Postgres>>::compatible(ty)
            }
        }

        impl<'r> ::sqlx::Decode<'r, ::sqlx::Postgres> for $ty {
            fn decode(
                value: ::sqlx::postgres::PgValueRef<'r>,
            ) -> Result<Self, ::sqlx::error::BoxDynError> {
                let s = <String as ::sqlx::Decode<::sqlx::Postgres>>::decode(value)?;
                Ok(Self(s))
            }
        }

        impl ::sqlx::Encode<'_, ::sqlx::Postgres> for $ty {
            fn encode_by_ref(
                &self,
                buf: &mut ::sqlx::postgres::PgArgumentBuffer,
            ) -> Result<::sqlx::encode::IsNull, ::sqlx::error::BoxDynError> {
                <String as ::sqlx::Encode<::sqlx::Postgres>>::encode_by_ref(&self.0, buf)
            }
        }
    };
}

#[cfg(feature = "postgres")]
text_column!(PhoneNumber);
#[cfg(feature = "postgres")]
text_column!(PostalCode);

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_canonical_forms() {
        for input in [
            "09123456789",
            "+989123456789",
            "00989123456789",
            "989123456789",
            "9123456789",
            "0912-345-6789",
            " 0912 345 6789 ",
        ] {
            assert_eq!(
                PhoneNumber::parse(input).unwrap().as_str(),
                "09123456789",
                "input: {input}"
            );
        }
    }

    #[test]
    fn test_parse_persian_digits() {
        let phone = PhoneNumber::parse("۰۹۱۲۳۴۵۶۷۸۹").unwrap();
        assert_eq!(phone.as_str(), "09123456789");
        assert_eq!(phone.display_fa(), "۰۹۱۲۳۴۵۶۷۸۹");
    }

    #[test]
    fn test_parse_rejects_landlines_and_garbage() {
        assert_eq!(PhoneNumber::parse(""), Err(PhoneError::Empty));
        assert_eq!(
            PhoneNumber::parse("02188776655"),
            Err(PhoneError::InvalidMobile)
        );
        assert_eq!(
            PhoneNumber::parse("0912345678"),
            Err(PhoneError::InvalidMobile)
        );
        assert_eq!(
            PhoneNumber::parse("0912abc6789"),
            Err(PhoneError::InvalidMobile)
        );
    }

    #[test]
    fn test_postal_code() {
        assert_eq!(
            PostalCode::parse("۱۴۳۵۶-۷۸۹۱۲").unwrap().as_str(),
            "1435678912"
        );
        assert_eq!(PostalCode::parse("  "), Err(PhoneError::Empty));
        assert_eq!(
            PostalCode::parse("12345"),
            Err(PhoneError::InvalidPostalCode { expected: 10 })
        );
    }
}
