use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A monetary amount stored as whole cents.
///
/// Arithmetic saturates at the bounds of `i64` instead of overflowing.
///
/// Serializes as a decimal number of currency units (`45000.0`) because that
/// is what both external APIs speak. Deserialization accepts numbers and
/// numeric strings and rounds to the nearest cent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Convert a decimal amount to cents, rounding half away from zero.
    /// Non-finite input becomes zero.
    pub fn from_major(amount: f64) -> Self {
        if !amount.is_finite() {
            return Money::ZERO;
        }
        Money((amount * 100.0).round() as i64)
    }

    pub const fn cents(self) -> i64 {
        self.0
    }

    pub fn as_major(self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// `self × numerator / denominator`, rounded half away from zero.
    pub fn scale(self, numerator: i64, denominator: i64) -> Money {
        if denominator == 0 {
            return Money::ZERO;
        }
        let n = self.0 as i128 * numerator as i128;
        let scaled = div_round(n, denominator as i128);
        Money(scaled.clamp(i64::MIN as i128, i64::MAX as i128) as i64)
    }

    /// Percentage share of this amount, rounded to the cent.
    pub fn percent(self, pct: i64) -> Money {
        self.scale(pct, 100)
    }

    /// Multiply by a (possibly fractional) quantity, rounded to the cent.
    pub fn times(self, quantity: f64) -> Money {
        if !quantity.is_finite() {
            return Money::ZERO;
        }
        Money((self.0 as f64 * quantity).round() as i64)
    }

    /// Clamp negative amounts to zero.
    pub fn non_negative(self) -> Money {
        Money(self.0.max(0))
    }
}

fn div_round(n: i128, d: i128) -> i128 {
    let q = n / d;
    let r = n % d;
    if 2 * r.abs() >= d.abs() {
        q + n.signum() * d.signum()
    } else {
        q
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        *self = *self + rhs;
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money(self.0.saturating_sub(rhs.0))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_major())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAmount {
    Number(f64),
    Text(String),
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RawAmount::deserialize(deserializer)? {
            RawAmount::Number(n) => Ok(Money::from_major(n)),
            RawAmount::Text(s) => parse_amount(&s)
                .map(Money::from_major)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid amount: {s:?}"))),
        }
    }
}

/// Parse "1234.50", "1234,50" or "" (zero).
fn parse_amount(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Some(0.0);
    }
    let normalized = if trimmed.contains('.') {
        trimmed.replace(',', "")
    } else {
        trimmed.replace(',', ".")
    };
    normalized.parse().ok()
}
