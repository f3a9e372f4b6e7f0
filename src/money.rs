//! Currency arithmetic.
//!
//! Amounts travel and are stored as `f64`, but every sum, split and
//! comparison is done on `Decimal` so that shares add up to the cent.

use rust_decimal::prelude::*;

use crate::error::LedgerError;

const DECIMAL_PLACES: u32 = 2;

/// Balances whose magnitude stays below this are considered settled.
pub const EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Largest single amount accepted on an expense or settlement.
const MAX_AMOUNT: Decimal = Decimal::from_parts(100_000_000, 0, 0, false, 2);

pub fn round_to_2_decimals(n: Decimal) -> Decimal {
    let mut rounded = n.round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(DECIMAL_PLACES);
    rounded
}

/// Rounds to cents and snaps anything below [`EPSILON`] to exactly zero.
pub fn normalize(n: Decimal) -> Decimal {
    let rounded = round_to_2_decimals(n);
    if rounded.abs() < EPSILON {
        Decimal::ZERO
    } else {
        rounded
    }
}

pub fn is_within_epsilon(n: Decimal) -> bool {
    n.abs() <= EPSILON
}

pub fn to_decimal(value: f64, field: &str) -> Result<Decimal, LedgerError> {
    if !value.is_finite() {
        return Err(LedgerError::validation(format!(
            "{field} must be a finite number, got {value}"
        )));
    }
    Decimal::from_f64(value)
        .ok_or_else(|| LedgerError::validation(format!("{field} is out of range: {value}")))
}

pub fn to_f64(value: Decimal) -> f64 {
    round_to_2_decimals(value).to_f64().unwrap_or_default()
}

/// Converts a user supplied amount, requiring it to be positive and expressed in cents.
pub fn validate_amount(value: f64, field: &str) -> Result<Decimal, LedgerError> {
    let amount = to_decimal(value, field)?;
    if amount <= Decimal::ZERO {
        return Err(LedgerError::validation(format!(
            "{field} must be greater than zero, got {value}"
        )));
    }
    if amount > MAX_AMOUNT {
        return Err(LedgerError::validation(format!(
            "{field} exceeds the maximum of {MAX_AMOUNT}"
        )));
    }
    let rounded = round_to_2_decimals(amount);
    // f64 inputs like 0.1 + 0.2 carry binary noise well below a cent
    if (amount - rounded).abs() > Decimal::new(1, 6) {
        return Err(LedgerError::validation(format!(
            "{field} must not have more than {DECIMAL_PLACES} decimal places, got {value}"
        )));
    }
    Ok(rounded)
}

/// Like [`validate_amount`] but accepts zero, for a participant who owes nothing.
pub fn validate_share_amount(value: f64, field: &str) -> Result<Decimal, LedgerError> {
    let amount = to_decimal(value, field)?;
    if amount.is_zero() {
        return Ok(round_to_2_decimals(amount));
    }
    if amount < Decimal::ZERO {
        return Err(LedgerError::validation(format!(
            "{field} must not be negative, got {value}"
        )));
    }
    validate_amount(value, field)
}

/// Splits `total` into `count` cent-exact parts. The leftover cents go to the
/// first parts, so the result always sums to the rounded total.
pub fn split_evenly(total: Decimal, count: usize) -> Vec<Decimal> {
    if count == 0 {
        return Vec::new();
    }
    let cents = (round_to_2_decimals(total) * Decimal::ONE_HUNDRED)
        .to_i64()
        .unwrap_or_default();
    let count_i64 = count as i64;
    let base = cents / count_i64;
    let remainder = (cents % count_i64).unsigned_abs() as usize;
    let sign = cents.signum();

    (0..count)
        .map(|idx| {
            let mut share = base;
            if idx < remainder {
                share += sign;
            }
            Decimal::new(share, DECIMAL_PLACES)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn normalize_snaps_dust_to_zero() {
        assert_eq!(normalize(Decimal::new(4, 3)), Decimal::ZERO);
        assert_eq!(normalize(Decimal::new(-9, 3)), Decimal::ZERO);
        assert_eq!(normalize(Decimal::new(1005, 3)), Decimal::new(101, 2));
        assert_eq!(normalize(Decimal::new(-1005, 3)), Decimal::new(-101, 2));
    }

    #[test]
    fn to_decimal_rejects_non_finite() {
        assert!(to_decimal(f64::NAN, "amount").is_err());
        assert!(to_decimal(f64::INFINITY, "amount").is_err());
        assert_eq!(to_decimal(12.5, "amount").unwrap(), Decimal::new(125, 1));
    }

    #[rstest]
    #[case::zero(0.0)]
    #[case::negative(-3.0)]
    #[case::sub_cent(0.001)]
    #[case::nan(f64::NAN)]
    #[case::huge(5_000_000.0)]
    fn validate_amount_rejects(#[case] value: f64) {
        assert!(validate_amount(value, "amount").is_err());
    }

    #[test]
    fn validate_amount_tolerates_float_noise() {
        assert_eq!(
            validate_amount(0.1 + 0.2, "amount").unwrap(),
            Decimal::new(30, 2)
        );
    }

    #[rstest]
    #[case::negative(-0.5)]
    #[case::sub_cent(3.333)]
    #[case::overflowing(7e28)]
    fn validate_share_amount_rejects(#[case] value: f64) {
        assert!(validate_share_amount(value, "share").is_err());
    }

    #[test]
    fn validate_share_amount_allows_zero() {
        assert_eq!(validate_share_amount(0.0, "share").unwrap(), Decimal::ZERO);
        assert_eq!(validate_share_amount(3.33, "share").unwrap(), Decimal::new(333, 2));
    }

    #[rstest]
    #[case(Decimal::new(3000, 2), 3, vec![1000, 1000, 1000])]
    #[case(Decimal::new(1000, 2), 3, vec![334, 333, 333])]
    #[case(Decimal::new(2, 2), 3, vec![1, 1, 0])]
    #[case(Decimal::new(-1000, 2), 3, vec![-334, -333, -333])]
    fn split_evenly_sums_to_total(
        #[case] total: Decimal,
        #[case] count: usize,
        #[case] expected_cents: Vec<i64>,
    ) {
        let parts = split_evenly(total, count);
        let expected: Vec<Decimal> = expected_cents
            .into_iter()
            .map(|c| Decimal::new(c, 2))
            .collect();
        assert_eq!(parts, expected);
        assert_eq!(parts.iter().copied().sum::<Decimal>(), total);
    }

    #[test]
    fn split_evenly_with_no_participants_is_empty() {
        assert!(split_evenly(Decimal::ONE_HUNDRED, 0).is_empty());
    }
}
