//! Fixed-point monetary amounts
//!
//! Money is held as an integer count of minor units (cents) so that every
//! add and subtract is exact. Conversion to and from decimal notation only
//! happens at the boundary, through `rust_decimal::Decimal`.

use super::error::LedgerError;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of decimal places carried by one minor unit
pub const MINOR_UNIT_SCALE: u32 = 2;

const MINOR_UNITS_PER_MAJOR: i64 = 100;

/// Monetary value in minor units
///
/// `Amount` itself may be negative so that callers can express (and the
/// ledger can reject) an attempted negative balance; transaction amounts
/// and stored balances are validated to be positive / non-negative.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    /// Build an amount from a raw count of minor units
    pub const fn from_minor(minor: i64) -> Self {
        Amount(minor)
    }

    /// Convert a decimal into minor units
    ///
    /// Values with more than [`MINOR_UNIT_SCALE`] significant decimal places
    /// are rejected instead of being rounded, as are values outside the
    /// representable range.
    pub fn from_decimal(value: Decimal) -> Result<Self, LedgerError> {
        if value.normalize().scale() > MINOR_UNIT_SCALE {
            return Err(LedgerError::invalid_amount(
                value.to_string(),
                "more than two decimal places",
            ));
        }

        value
            .checked_mul(Decimal::from(MINOR_UNITS_PER_MAJOR))
            .and_then(|minor| minor.to_i64())
            .map(Amount)
            .ok_or_else(|| LedgerError::invalid_amount(value.to_string(), "out of range"))
    }

    pub const fn minor_units(self) -> i64 {
        self.0
    }

    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, MINOR_UNIT_SCALE)
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

impl FromStr for Amount {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let value = Decimal::from_str(trimmed)
            .map_err(|_| LedgerError::invalid_amount(trimmed, "not a decimal number"))?;
        Amount::from_decimal(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::whole("100", 10_000)]
    #[case::one_decimal("12.5", 1_250)]
    #[case::two_decimals("0.01", 1)]
    #[case::trailing_zeros("3.1000", 310)]
    #[case::negative("-4.20", -420)]
    #[case::whitespace("  7.00 ", 700)]
    fn test_parse_amount(#[case] input: &str, #[case] expected_minor: i64) {
        let amount: Amount = input.parse().unwrap();
        assert_eq!(amount.minor_units(), expected_minor);
    }

    #[rstest]
    #[case::too_precise("0.001")]
    #[case::garbage("ten")]
    #[case::empty("")]
    #[case::overflow("100000000000000000000")]
    fn test_parse_amount_rejects(#[case] input: &str) {
        let result = input.parse::<Amount>();
        assert!(matches!(result, Err(LedgerError::InvalidAmount { .. })));
    }

    #[rstest]
    #[case(Amount::from_minor(0), "0.00")]
    #[case(Amount::from_minor(5), "0.05")]
    #[case(Amount::from_minor(123_456), "1234.56")]
    #[case(Amount::from_minor(-250), "-2.50")]
    fn test_display_uses_two_decimals(#[case] amount: Amount, #[case] expected: &str) {
        assert_eq!(amount.to_string(), expected);
    }

    #[test]
    fn test_checked_arithmetic() {
        let a = Amount::from_minor(i64::MAX);
        assert_eq!(a.checked_add(Amount::from_minor(1)), None);
        assert_eq!(
            Amount::from_minor(500).checked_sub(Amount::from_minor(200)),
            Some(Amount::from_minor(300))
        );
    }

    #[test]
    fn test_serde_is_transparent() {
        let json = serde_json::to_string(&Amount::from_minor(1999)).unwrap();
        assert_eq!(json, "1999");
        let back: Amount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Amount::from_minor(1999));
    }
}
