//! Exact decimal arithmetic over textual numeric values.
//!
//! Venues report balances, prices and quantities as decimal strings. All
//! bookkeeping goes through these helpers so that quantities like
//! `"0.1" + "0.2"` stay exact instead of picking up binary float artifacts.

use std::str::FromStr;

use rust_decimal::Decimal;
use thiserror::Error;

/// A value that could not be parsed as a decimal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid decimal value '{value}'")]
pub struct NumericError {
    pub value: String,
}

/// Parse a decimal string.
pub fn parse(s: &str) -> Result<Decimal, NumericError> {
    Decimal::from_str(s.trim()).map_err(|_| NumericError {
        value: s.to_string(),
    })
}

/// Parse a decimal string into a float (for indicator math).
pub fn to_f64(s: &str) -> Result<f64, NumericError> {
    use rust_decimal::prelude::ToPrimitive;

    parse(s)?.to_f64().ok_or_else(|| NumericError {
        value: s.to_string(),
    })
}

/// Exact sum of two decimal strings.
pub fn add(a: &str, b: &str) -> Result<String, NumericError> {
    Ok((parse(a)? + parse(b)?).to_string())
}

/// Exact difference of two decimal strings.
pub fn sub(a: &str, b: &str) -> Result<String, NumericError> {
    Ok((parse(a)? - parse(b)?).to_string())
}

/// Exact product of two decimal strings.
pub fn mul(a: &str, b: &str) -> Result<String, NumericError> {
    Ok((parse(a)? * parse(b)?).to_string())
}

/// `a < b` over decimal strings.
pub fn less(a: &str, b: &str) -> Result<bool, NumericError> {
    Ok(parse(a)? < parse(b)?)
}

/// `a <= b` over decimal strings.
pub fn less_or_eq(a: &str, b: &str) -> Result<bool, NumericError> {
    Ok(parse(a)? <= parse(b)?)
}

/// Truncate (not round) a value to `decimals` decimal places.
///
/// Venues reject over-precise order fields, so every quantity and price is
/// truncated before submission.
pub fn truncate(value: Decimal, decimals: u32) -> Decimal {
    value.trunc_with_scale(decimals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn addition_is_exact() {
        assert_eq!(add("0.1", "0.2").unwrap(), "0.3");
    }

    #[test]
    fn subtraction_keeps_scale() {
        assert_eq!(sub("1.000", "0.999").unwrap(), "0.001");
    }

    #[test]
    fn multiplication_is_exact() {
        assert_eq!(mul("0.1", "3").unwrap(), "0.3");
    }

    #[test]
    fn comparison_on_equal_values() {
        assert!(less_or_eq("0.001", "0.001").unwrap());
        assert!(!less("0.001", "0.001").unwrap());
        assert!(less("0.0009", "0.001").unwrap());
    }

    #[test]
    fn truncation_drops_excess_digits() {
        assert_eq!(truncate(dec!(0.123456789), 5), dec!(0.12345));
        assert_eq!(truncate(dec!(97.129), 2), dec!(97.12));
        assert_eq!(truncate(dec!(5), 5), dec!(5));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse("not-a-number").is_err());
        assert_eq!(parse(" 1.5 ").unwrap(), dec!(1.5));
    }
}
