//! Order tracking codes.
//!
//! A tracking code is the customer-facing order reference: `KF-` followed by
//! eight characters from an alphabet without look-alike characters
//! (`0/O`, `1/I`), so it can be read over the phone.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`TrackingCode`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackingCodeError {
    /// Missing `KF-` prefix.
    #[error("tracking code must start with {prefix}")]
    MissingPrefix {
        /// Expected prefix.
        prefix: &'static str,
    },
    /// Wrong body length.
    #[error("tracking code must have {expected} characters after the prefix")]
    WrongLength {
        /// Expected body length.
        expected: usize,
    },
    /// Character outside the alphabet.
    #[error("tracking code contains invalid character {0:?}")]
    InvalidCharacter(char),
}

/// A validated order tracking code, e.g. `KF-7Q2M9XHD`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TrackingCode(String);

impl TrackingCode {
    /// Prefix of every code.
    pub const PREFIX: &'static str = "KF-";
    /// Number of random characters after the prefix.
    pub const BODY_LENGTH: usize = 8;
    /// Characters allowed in the body.
    pub const ALPHABET: &'static [u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";

    /// Parse a code. Input is trimmed and upper-cased; Persian digits are accepted.
    ///
    /// # Errors
    ///
    /// Returns an error if the prefix, length or characters are wrong.
    pub fn parse(input: &str) -> Result<Self, TrackingCodeError> {
        let normalized = crate::locale::normalize_digits(input.trim()).to_ascii_uppercase();
        let body = normalized
            .strip_prefix(Self::PREFIX)
            .ok_or(TrackingCodeError::MissingPrefix {
                prefix: Self::PREFIX,
            })?;
        Self::from_body(body)
    }

    /// Build a code from its body (the part after the prefix).
    ///
    /// # Errors
    ///
    /// Returns an error if the body has the wrong length or characters.
    pub fn from_body(body: &str) -> Result<Self, TrackingCodeError> {
        if body.chars().count() != Self::BODY_LENGTH {
            return Err(TrackingCodeError::WrongLength {
                expected: Self::BODY_LENGTH,
            });
        }
        if let Some(bad) = body
            .chars()
            .find(|c| !c.is_ascii() || !Self::ALPHABET.contains(&(*c as u8)))
        {
            return Err(TrackingCodeError::InvalidCharacter(bad));
        }
        Ok(Self(format!("{}{body}", Self::PREFIX)))
    }

    /// The full code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TrackingCode {
    type Error = TrackingCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TrackingCode> for String {
    fn from(code: TrackingCode) -> Self {
        code.0
    }
}

#[cfg(feature = "postgres")]
impl ::sqlx::Type<::sqlx::Postgres> for TrackingCode {
    fn type_info() -> ::sqlx::postgres::PgTypeInfo {
        <String as ::sqlx::Type<::sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &::sqlx::postgres::PgTypeInfo) -> bool {
        <String as ::sqlx::Type<::sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> ::sqlx::Decode<'r, ::sqlx::Postgres> for TrackingCode {
    fn decode(
        value: ::sqlx::postgres::PgValueRef<'r>,
    ) -> Result<Self, ::sqlx::error::BoxDynError> {
        let raw = <&str as ::sqlx::Decode<::sqlx::Postgres>>::decode(value)?;
        Ok(Self::parse(raw)?)
    }
}

#[cfg(feature = "postgres")]
impl ::sqlx::Encode<'_, ::sqlx::Postgres> for TrackingCode {
    fn encode_by_ref(
        &self,
        buf: &mut ::sqlx::postgres::PgArgumentBuffer,
    ) -> Result<::sqlx::encode::IsNull, ::sqlx::error::BoxDynError> {
        <&str as ::sqlx::Encode<::sqlx::Postgres>>::encode_by_ref(&self.0.as_str(), buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalizes_case_and_whitespace() {
        let code = TrackingCode::parse("  kf-7q2m9xhd ").unwrap();
        assert_eq!(code.as_str(), "KF-7Q2M9XHD");
    }

    #[test]
    fn test_parse_accepts_persian_digits() {
        let code = TrackingCode::parse("KF-۷Q۲M۹XHD").unwrap();
        assert_eq!(code.as_str(), "KF-7Q2M9XHD");
    }

    #[test]
    fn test_rejects_ambiguous_characters() {
        assert_eq!(
            TrackingCode::parse("KF-0Q2M9XHD"),
            Err(TrackingCodeError::InvalidCharacter('0'))
        );
        assert_eq!(
            TrackingCode::parse("KF-IQ2M9XHD"),
            Err(TrackingCodeError::InvalidCharacter('I'))
        );
    }

    #[test]
    fn test_rejects_wrong_shape() {
        assert!(matches!(
            TrackingCode::parse("7Q2M9XHD"),
            Err(TrackingCodeError::MissingPrefix { .. })
        ));
        assert!(matches!(
            TrackingCode::parse("KF-7Q2"),
            Err(TrackingCodeError::WrongLength { expected: 8 })
        ));
    }
}
