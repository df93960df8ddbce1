//! Persian locale helpers.
//!
//! The storefront renders every number with Persian digits and every date in
//! the Jalali (Solar Hijri) calendar. Input coming from Persian keyboards may
//! contain Persian (`۰-۹`) or Arabic-Indic (`٠-٩`) digits, so parsers in this
//! crate normalize digits with [`normalize_digits`] first.

use core::fmt;

use chrono::{Datelike, NaiveDate};

/// Persian thousands separator (U+066C).
pub const THOUSANDS_SEPARATOR: char = '\u{066C}';

const PERSIAN_ZERO: u32 = 0x06F0;
const ARABIC_INDIC_ZERO: u32 = 0x0660;

/// Replace ASCII digits with Persian digits. Other characters pass through.
#[must_use]
pub fn to_persian_digits(s: &str) -> String {
    s.chars()
        .map(|c| match c.to_digit(10) {
            Some(d) if c.is_ascii_digit() => char::from_u32(PERSIAN_ZERO + d).unwrap_or(c),
            _ => c,
        })
        .collect()
}

/// Replace Persian and Arabic-Indic digits with ASCII digits.
#[must_use]
pub fn normalize_digits(s: &str) -> String {
    s.chars()
        .map(|c| {
            let code = c as u32;
            let ascii = if (PERSIAN_ZERO..PERSIAN_ZERO + 10).contains(&code) {
                char::from_u32(u32::from(b'0') + code - PERSIAN_ZERO)
            } else if (ARABIC_INDIC_ZERO..ARABIC_INDIC_ZERO + 10).contains(&code) {
                char::from_u32(u32::from(b'0') + code - ARABIC_INDIC_ZERO)
            } else {
                None
            };
            ascii.unwrap_or(c)
        })
        .collect()
}

/// Group an integer in thousands using ASCII digits and a comma.
///
/// ```
/// use kafsh_core::locale::group_thousands;
/// assert_eq!(group_thousands(1_250_000), "1,250,000");
/// assert_eq!(group_thousands(-950), "-950");
/// ```
#[must_use]
pub fn group_thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    let offset = digits.len() % 3;
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (i + 3 - offset) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Format an integer for Persian display: grouped thousands with Persian
/// digits and the Persian separator.
///
/// ```
/// use kafsh_core::locale::format_number_fa;
/// assert_eq!(format_number_fa(1_250_000), "۱٬۲۵۰٬۰۰۰");
/// ```
#[must_use]
pub fn format_number_fa(n: i64) -> String {
    to_persian_digits(&group_thousands(n)).replace(',', &THOUSANDS_SEPARATOR.to_string())
}

/// Jalali month names, Farvardin first.
const JALALI_MONTHS: [&str; 12] = [
    "فروردین",
    "اردیبهشت",
    "خرداد",
    "تیر",
    "مرداد",
    "شهریور",
    "مهر",
    "آبان",
    "آذر",
    "دی",
    "بهمن",
    "اسفند",
];

/// Cumulative days before each Gregorian month in a non-leap year.
const GREGORIAN_DAYS_BEFORE_MONTH: [i64; 12] =
    [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334];

/// A date in the Jalali calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct JalaliDate {
    /// Jalali year (e.g. 1403).
    pub year: i32,
    /// Month, 1-12.
    pub month: u32,
    /// Day of month, 1-31.
    pub day: u32,
}

impl JalaliDate {
    /// Convert a Gregorian date.
    ///
    /// Uses the 33-year arithmetic cycle, exact for Gregorian years 1600-3000.
    #[must_use]
    pub fn from_gregorian(date: NaiveDate) -> Self {
        let gy = i64::from(date.year());
        let gm = i64::from(date.month());
        let gd = i64::from(date.day());

        let gy2 = if gm > 2 { gy + 1 } else { gy };
        let month_offset = usize::try_from(gm - 1)
            .ok()
            .and_then(|i| GREGORIAN_DAYS_BEFORE_MONTH.get(i).copied())
            .unwrap_or(0);

        let mut days = 355_666 + 365 * gy + (gy2 + 3) / 4 - (gy2 + 99) / 100
            + (gy2 + 399) / 400
            + gd
            + month_offset;

        let mut jy = -1595 + 33 * (days / 12_053);
        days %= 12_053;
        jy += 4 * (days / 1461);
        days %= 1461;
        if days > 365 {
            jy += (days - 1) / 365;
            days = (days - 1) % 365;
        }

        let (jm, jd) = if days < 186 {
            (1 + days / 31, 1 + days % 31)
        } else {
            (7 + (days - 186) / 30, 1 + (days - 186) % 30)
        };

        Self {
            year: i32::try_from(jy).unwrap_or(i32::MAX),
            month: u32::try_from(jm).unwrap_or(1),
            day: u32::try_from(jd).unwrap_or(1),
        }
    }

    /// Persian month name.
    #[must_use]
    pub fn month_name(&self) -> &'static str {
        usize::try_from(self.month.saturating_sub(1))
            .ok()
            .and_then(|i| JALALI_MONTHS.get(i).copied())
            .unwrap_or("")
    }

    /// Long Persian form, e.g. `۲۵ مهر ۱۴۰۵`.
    #[must_use]
    pub fn format_long_fa(&self) -> String {
        to_persian_digits(&format!(
            "{} {} {}",
            self.day,
            self.month_name(),
            self.year
        ))
    }
}

impl fmt::Display for JalaliDate {
    /// Numeric form with ASCII digits, e.g. `1405/07/25`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{:02}/{:02}", self.year, self.month, self.day)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn jalali(y: i32, m: u32, d: u32) -> JalaliDate {
        JalaliDate::from_gregorian(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    #[test]
    fn test_persian_digits() {
        assert_eq!(to_persian_digits("KF-2024"), "KF-۲۰۲۴");
        assert_eq!(normalize_digits("۰۹۱۲٣٤٥"), "0912345");
        assert_eq!(normalize_digits("abc"), "abc");
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(60_000), "60,000");
        assert_eq!(group_thousands(12_345_678), "12,345,678");
        assert_eq!(group_thousands(-1_000_000), "-1,000,000");
    }

    #[test]
    fn test_nowruz_boundaries() {
        assert_eq!(jalali(2024, 3, 20), JalaliDate { year: 1403, month: 1, day: 1 });
        assert_eq!(jalali(2024, 3, 19), JalaliDate { year: 1402, month: 12, day: 29 });
        // 1403 is a leap year: Esfand has 30 days
        assert_eq!(jalali(2025, 3, 20), JalaliDate { year: 1403, month: 12, day: 30 });
        assert_eq!(jalali(2025, 3, 21), JalaliDate { year: 1404, month: 1, day: 1 });
    }

    #[test]
    fn test_second_half_of_year() {
        let date = jalali(2026, 10, 17);
        assert_eq!(date, JalaliDate { year: 1405, month: 7, day: 25 });
        assert_eq!(date.month_name(), "مهر");
        assert_eq!(date.to_string(), "1405/07/25");
        assert_eq!(date.format_long_fa(), "۲۵ مهر ۱۴۰۵");
    }
}
