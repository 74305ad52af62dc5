//! Money as a signed count of cents.
//!
//! Amounts enter the system in major units (`"1,234.56"`, `99.995`) and are
//! rounded half away from zero to whole cents at the boundary. Everything past
//! that point is integer arithmetic, so totals never drift.

use core::fmt;
use core::iter::Sum;
use core::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use core::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Monetary amount in cents.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(i64);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoneyParseError {
    #[error("no digits in amount '{0}'")]
    NoDigits(String),

    #[error("amount '{0}' is out of range")]
    Overflow(String),

    #[error("amount is not a finite number")]
    NotFinite,
}

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub const fn cents(self) -> i64 {
        self.0
    }

    /// Converts a floating-point major-unit amount using its shortest decimal
    /// representation, so `99.995` rounds to `100.00` rather than `99.99`.
    pub fn from_major(value: f64) -> Result<Self, MoneyParseError> {
        if !value.is_finite() {
            return Err(MoneyParseError::NotFinite);
        }
        Self::parse(&value.to_string())
    }

    /// Lenient parse of a major-unit amount.
    ///
    /// Everything except digits, `.` and `-` is ignored (currency symbols,
    /// thousands separators, spaces). Digits after the first fractional run are
    /// ignored. Rounds half away from zero to cents.
    pub fn parse(text: &str) -> Result<Self, MoneyParseError> {
        let cleaned: String = text
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
            .collect();

        let negative = cleaned.starts_with('-');
        let body = cleaned.trim_start_matches('-');
        let (int_part, frac_part) = match body.split_once('.') {
            Some((i, f)) => (i, f),
            None => (body, ""),
        };
        let int_digits: String = int_part.chars().take_while(|c| c.is_ascii_digit()).collect();
        let frac_digits: Vec<u32> = frac_part
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .filter_map(|c| c.to_digit(10))
            .collect();

        if int_digits.is_empty() && frac_digits.is_empty() {
            return Err(MoneyParseError::NoDigits(text.to_string()));
        }

        let overflow = || MoneyParseError::Overflow(text.to_string());
        let whole: i64 = if int_digits.is_empty() {
            0
        } else {
            int_digits.parse().map_err(|_| overflow())?
        };

        let tenths = frac_digits.first().copied().unwrap_or(0) as i64;
        let hundredths = frac_digits.get(1).copied().unwrap_or(0) as i64;
        let round_up = frac_digits.get(2).copied().unwrap_or(0) >= 5;

        let mut cents = whole
            .checked_mul(100)
            .and_then(|c| c.checked_add(tenths * 10 + hundredths))
            .ok_or_else(overflow)?;
        if round_up {
            cents = cents.checked_add(1).ok_or_else(overflow)?;
        }

        Ok(Self(if negative { -cents } else { cents }))
    }

    /// Amount in major units (display/serialization only).
    pub fn to_major(self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn abs(self) -> Self {
        Self(self.0.abs())
    }

    /// `max(0, self)`.
    pub fn clamp_non_negative(self) -> Self {
        Self(self.0.max(0))
    }

    /// Divide into `parts` shares, rounding half away from zero to the cent.
    pub fn div_round(self, parts: u32) -> Self {
        if parts == 0 {
            return Self::ZERO;
        }
        Self(div_round_half_away(self.0 as i128, parts as i128) as i64)
    }

    /// `self * quantity`, saturating at the numeric bounds.
    pub fn times(self, quantity: i64) -> Self {
        Self(self.0.saturating_mul(quantity))
    }

    /// Plain decimal text (`1234.56`, `-0.50`) for storage cells.
    pub fn to_decimal_string(self) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        format!("{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

fn div_round_half_away(numerator: i128, denominator: i128) -> i128 {
    let quotient = numerator / denominator;
    let remainder = numerator % denominator;
    if remainder.abs() * 2 >= denominator.abs() {
        quotient + numerator.signum() * denominator.signum()
    } else {
        quotient
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        self.0 -= rhs.0;
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Money {
        iter.copied().sum()
    }
}

/// `$1,234.56`; negatives render as `-$1,234.56`.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let abs = self.0.unsigned_abs();
        let whole = (abs / 100).to_string();
        let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
        for (idx, ch) in whole.chars().enumerate() {
            if idx > 0 && (whole.len() - idx) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(ch);
        }
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{sign}${grouped}.{:02}", abs % 100)
    }
}

impl FromStr for Money {
    type Err = MoneyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Money::parse(s)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_major())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MoneyVisitor;

        impl Visitor<'_> for MoneyVisitor {
            type Value = Money;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an amount in major units (number or string)")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Money, E> {
                v.checked_mul(100)
                    .map(Money)
                    .ok_or_else(|| E::custom(MoneyParseError::Overflow(v.to_string())))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Money, E> {
                i64::try_from(v)
                    .ok()
                    .and_then(|v| v.checked_mul(100))
                    .map(Money)
                    .ok_or_else(|| E::custom(MoneyParseError::Overflow(v.to_string())))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Money, E> {
                Money::from_major(v).map_err(E::custom)
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Money, E> {
                Money::parse(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(MoneyVisitor)
    }
}
