//! Exact money handling.
//!
//! Amounts live in the database as decimal text and are parsed into
//! [`Decimal`] for arithmetic, so no floating-point drift ever enters the
//! allocation.

use crate::errors::{Error, Result};
use rust_decimal::Decimal;
use std::str::FromStr;

/// Parses a stored decimal amount.
///
/// # Errors
/// Returns `Error::InvalidAmount` if the text is not a decimal number.
pub fn parse_amount(value: &str) -> Result<Decimal> {
    Decimal::from_str(value.trim()).map_err(|_| Error::InvalidAmount {
        amount: value.to_string(),
    })
}

/// Parses a stored amount and requires it to be strictly positive.
///
/// # Errors
/// Returns `Error::InvalidAmount` for unparsable, zero or negative amounts.
pub fn parse_positive_amount(value: &str) -> Result<Decimal> {
    let amount = parse_amount(value)?;
    ensure_positive(amount)?;
    Ok(amount)
}

/// Rejects zero and negative amounts.
///
/// # Errors
/// Returns `Error::InvalidAmount` when `amount <= 0`.
pub fn ensure_positive(amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(Error::invalid_amount(amount));
    }
    Ok(())
}

/// Renders an amount for storage. Trailing zeros are kept as given.
#[must_use]
pub fn to_storage(amount: Decimal) -> String {
    amount.to_string()
}

/// Formats an amount with two decimal places for display, e.g. `"100.00"`.
#[must_use]
pub fn format_amount(amount: Decimal) -> String {
    format!("{:.2}", amount.round_dp(2))
}
