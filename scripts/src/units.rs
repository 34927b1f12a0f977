//! Conversion between human-readable decimal thresholds and the fixed-point
//! integers the contracts expect.
//!
//! Conversion is exact: an amount with more fractional digits than the token
//! has decimals is rejected rather than truncated.

use alloy_primitives::{utils::parse_units, U256};

use crate::{constants::THRESHOLD_DECIMALS, errors::DeployError};

/// Convert a decimal string such as `"0.1"` or `"100"` into its representation
/// in the smallest denomination of an 18-decimal token
pub fn parse_threshold(amount: &str) -> Result<U256, DeployError> {
    let amount = amount.trim();
    if amount.starts_with('-') {
        return Err(DeployError::config(format!(
            "threshold `{amount}` must not be negative"
        )));
    }

    let (whole, fraction) = match amount.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (amount, None),
    };
    let is_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !is_digits(whole) || !fraction.map_or(true, is_digits) {
        return Err(DeployError::config(format!(
            "threshold `{amount}` is not a decimal number"
        )));
    }

    let decimals = fraction.map_or(0, str::len);
    if decimals > THRESHOLD_DECIMALS as usize {
        return Err(DeployError::config(format!(
            "threshold `{amount}` has more than {THRESHOLD_DECIMALS} decimal places"
        )));
    }

    let units = parse_units(amount, THRESHOLD_DECIMALS)
        .map_err(|e| DeployError::config(format!("threshold `{amount}`: {e}")))?;
    Ok(units.get_absolute())
}

/// Convert a fixed-point threshold back into its shortest decimal string
pub fn format_threshold(value: U256) -> String {
    let unit = U256::from(10u64).pow(U256::from(THRESHOLD_DECIMALS));
    let (whole, fraction) = value.div_rem(unit);
    if fraction.is_zero() {
        return whole.to_string();
    }

    let fraction = format!(
        "{:0>width$}",
        fraction.to_string(),
        width = THRESHOLD_DECIMALS as usize
    );
    format!("{}.{}", whole, fraction.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use alloy_primitives::U256;

    use super::{format_threshold, parse_threshold};

    /// One whole token in its smallest denomination
    fn ether() -> U256 {
        U256::from(10u64).pow(U256::from(18u64))
    }

    #[test]
    fn test_round_trip() {
        for amount in ["0.1", "10", "100"] {
            let value = parse_threshold(amount).unwrap();
            assert_eq!(format_threshold(value), amount);
        }
    }

    #[test]
    fn test_scaling() {
        assert_eq!(parse_threshold("10").unwrap(), U256::from(10u64) * ether());
        assert_eq!(
            parse_threshold("0.1").unwrap(),
            U256::from(100_000_000_000_000_000u64)
        );
        assert_eq!(parse_threshold("0").unwrap(), U256::ZERO);
    }

    #[test]
    fn test_large_values_are_exact() {
        let value = parse_threshold("1000000000.000000000000000001").unwrap();
        let expected = U256::from(1_000_000_000u64) * ether() + U256::from(1u64);
        assert_eq!(value, expected);
        assert_eq!(format_threshold(value), "1000000000.000000000000000001");
    }

    #[test]
    fn test_smallest_unit() {
        let value = parse_threshold("0.000000000000000001").unwrap();
        assert_eq!(value, U256::from(1u64));
    }

    #[test]
    fn test_rejects_negative() {
        let err = parse_threshold("-1").unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_rejects_excess_precision() {
        // Would silently truncate to 0.1 if passed through as-is
        assert!(parse_threshold("0.1000000000000000001").is_err());
    }

    #[test]
    fn test_rejects_malformed() {
        for amount in ["", ".", "1.", ".5", "1e18", "1,000", "0x10", "1.2.3", "ten"] {
            assert!(parse_threshold(amount).is_err(), "accepted `{amount}`");
        }
    }
}
