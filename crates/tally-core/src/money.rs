//! # Money
//!
//! Amounts are integer minor units (cents). Refund arithmetic must
//! reconcile with the payment processor to the cent, so nothing here ever
//! goes through a float.
//!
//! ```text
//! OrderItem.unit_price × quantity ──► RefundItem.amount ──► Refund.amount
//!                                                              │ Σ succeeded
//! Order.total ───────────────────► remaining_refundable ◄──────┘
//! ```
//!
//! ```rust
//! use tally_core::money::Money;
//!
//! let tee = Money::from_cents(2000);
//! assert_eq!(tee.multiply_quantity(2), Money::parse_decimal("40").unwrap());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub};
use ts_rs::TS;

use crate::error::ValidationError;

/// An amount in minor units. Signed, because `total - refunded_total` is
/// computed before anything checks it.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Line amount for `quantity` units at this unit price.
    #[inline]
    pub const fn multiply_quantity(&self, quantity: i64) -> Self {
        Money(self.0 * quantity)
    }

    /// Zero when the value is negative.
    #[inline]
    pub const fn clamp_non_negative(&self) -> Money {
        if self.0 < 0 {
            Money(0)
        } else {
            *self
        }
    }

    /// Parses a decimal amount such as `"12"`, `"12.5"` or `"12.50"`.
    ///
    /// ## Rules
    /// - Surrounding whitespace is ignored
    /// - An optional leading `-` is accepted (callers decide whether
    ///   negative values are allowed)
    /// - Digits beyond the second fractional place are rounded half-up
    ///   on the third digit
    /// - Exponents, thousands separators and currency symbols are rejected
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::money::Money;
    ///
    /// assert_eq!(Money::parse_decimal("40").unwrap().cents(), 4000);
    /// assert_eq!(Money::parse_decimal("0.5").unwrap().cents(), 50);
    /// assert_eq!(Money::parse_decimal("1.005").unwrap().cents(), 101);
    /// assert!(Money::parse_decimal("abc").is_err());
    /// ```
    pub fn parse_decimal(input: &str) -> Result<Money, ValidationError> {
        let invalid = |reason: &str| ValidationError::InvalidFormat {
            field: "amount".to_string(),
            reason: reason.to_string(),
        };

        let trimmed = input.trim();
        let (negative, unsigned) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };

        let (whole, fraction) = match unsigned.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (unsigned, ""),
        };

        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid("must be a number"));
        }
        if !whole.chars().all(|c| c.is_ascii_digit())
            || !fraction.chars().all(|c| c.is_ascii_digit())
        {
            return Err(invalid("must be a number"));
        }

        let whole_value: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid("is too large"))?
        };

        let digits: Vec<i64> = fraction
            .bytes()
            .map(|b| i64::from(b - b'0'))
            .collect();
        let tenths = digits.first().copied().unwrap_or(0);
        let hundredths = digits.get(1).copied().unwrap_or(0);
        let round_up = digits.get(2).map_or(false, |d| *d >= 5);

        let cents = whole_value
            .checked_mul(100)
            .and_then(|c| c.checked_add(tenths * 10 + hundredths + i64::from(round_up)))
            .ok_or_else(|| invalid("is too large"))?;

        Ok(Money(if negative { -cents } else { cents }))
    }
}

/// For logs and error messages; the console formats currency itself.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}${}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    fn mul(self, quantity: i64) -> Self {
        self.multiply_quantity(quantity)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::default(), |acc, m| acc + m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Money::from_cents(1099).to_string(), "$10.99");
        assert_eq!(Money::from_cents(-50).to_string(), "-$0.50");
        assert_eq!(Money::default().to_string(), "$0.00");
    }

    #[test]
    fn test_remaining_balance_arithmetic() {
        let total = Money::from_cents(10000);
        let refunds: Money = [6000, 2550].into_iter().map(Money::from_cents).sum();
        assert_eq!((total - refunds).cents(), 1450);
        assert_eq!((refunds - total).clamp_non_negative(), Money::default());
        assert_eq!((Money::from_cents(2000) * 3).cents(), 6000);
    }

    #[test]
    fn test_parse_decimal_accepts_common_forms() {
        assert_eq!(Money::parse_decimal("50").unwrap().cents(), 5000);
        assert_eq!(Money::parse_decimal(" 50.00 ").unwrap().cents(), 5000);
        assert_eq!(Money::parse_decimal("12.5").unwrap().cents(), 1250);
        assert_eq!(Money::parse_decimal(".75").unwrap().cents(), 75);
        assert_eq!(Money::parse_decimal("7.").unwrap().cents(), 700);
        assert_eq!(Money::parse_decimal("0").unwrap().cents(), 0);
        assert_eq!(Money::parse_decimal("-3.20").unwrap().cents(), -320);
    }

    #[test]
    fn test_parse_decimal_rounds_third_digit_half_up() {
        assert_eq!(Money::parse_decimal("1.004").unwrap().cents(), 100);
        assert_eq!(Money::parse_decimal("1.005").unwrap().cents(), 101);
        assert_eq!(Money::parse_decimal("1.0049999").unwrap().cents(), 100);
    }

    #[test]
    fn test_parse_decimal_rejects_garbage() {
        for input in ["", "  ", ".", "-", "abc", "1,000", "$5", "1e3", "1.2.3", "--1"] {
            assert!(Money::parse_decimal(input).is_err(), "accepted {:?}", input);
        }
        assert!(Money::parse_decimal("999999999999999999999").is_err());
    }
}
