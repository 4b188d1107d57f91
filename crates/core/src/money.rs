//! Integer money arithmetic.
//!
//! Amounts are `i64` minor units (cents). Intermediate products are computed in
//! `i128` and every narrowing step is checked.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Basis points in one whole (100%).
pub const BPS_SCALE: i128 = 10_000;

/// ISO-4217 style currency code (three uppercase ASCII letters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    pub fn parse(code: &str) -> DomainResult<Self> {
        let code = code.trim();
        if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(DomainError::validation(format!(
                "currency must be three uppercase letters, got '{code}'"
            )));
        }
        Ok(Self(code.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Currency {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Divide rounding half away from zero. `denominator` must be positive.
pub fn div_round_half_up(numerator: i128, denominator: i128) -> DomainResult<i64> {
    if denominator <= 0 {
        return Err(DomainError::validation("division by a non-positive amount"));
    }
    let half = denominator / 2;
    let rounded = if numerator >= 0 {
        (numerator + half) / denominator
    } else {
        (numerator - half) / denominator
    };
    narrow(rounded)
}

/// `amount × bps / 10000`, rounded half away from zero.
pub fn apply_rate_bps(amount: i64, bps: u32) -> DomainResult<i64> {
    div_round_half_up(amount as i128 * bps as i128, BPS_SCALE)
}

/// `quantity × unit_price` with overflow detection.
pub fn checked_line_total(quantity: i64, unit_price: i64) -> DomainResult<i64> {
    quantity
        .checked_mul(unit_price)
        .ok_or_else(|| DomainError::validation("line total overflow"))
}

/// Sum of amounts with overflow detection.
pub fn checked_sum<I>(amounts: I) -> DomainResult<i64>
where
    I: IntoIterator<Item = i64>,
{
    amounts.into_iter().try_fold(0i64, |acc, a| {
        acc.checked_add(a)
            .ok_or_else(|| DomainError::validation("amount overflow"))
    })
}

/// Narrow an `i128` intermediate back to `i64` minor units.
pub fn narrow(value: i128) -> DomainResult<i64> {
    i64::try_from(value).map_err(|_| DomainError::validation("amount overflow"))
}

/// Reject zero and negative amounts for the named field.
pub fn ensure_positive(field: &str, value: i64) -> DomainResult<()> {
    if value <= 0 {
        return Err(DomainError::validation(format!("{field} must be positive")));
    }
    Ok(())
}

pub fn ensure_non_negative(field: &str, value: i64) -> DomainResult<()> {
    if value < 0 {
        return Err(DomainError::validation(format!("{field} cannot be negative")));
    }
    Ok(())
}
