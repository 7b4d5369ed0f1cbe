//! Exact conversions between human token amounts and on-chain base units.
//!
//! Human amounts travel as [`Decimal`] and are only ever scaled with integer arithmetic,
//! so `0.1` with 18 decimals is exactly `100000000000000000` and never `99999999999999999`.

use alloy_primitives::U256;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::ValidatorError;

/// Wei per BNB.
pub const NATIVE_DECIMALS: u8 = 18;

/// Basis points in one whole.
const BPS_DENOMINATOR: u64 = 10_000;

/// `10^exp`, `None` past 256 bits.
pub fn pow10(exp: u32) -> Option<U256> {
    U256::from(10u8).checked_pow(U256::from(exp))
}

/// Parses a decimal or scientific literal, e.g. `"0.015"` or `"1e-7"`.
pub fn parse_decimal(value: &str) -> Result<Decimal, ValidatorError> {
    let trimmed = value.trim();
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|e| ValidatorError::InvalidAmount(format!("{value:?}: {e}")))
}

/// `amount * 10^decimals`, truncated toward zero.
pub fn to_base_units(amount: Decimal, decimals: u8) -> Result<U256, ValidatorError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(ValidatorError::InvalidAmount(format!(
            "negative amount {amount}"
        )));
    }
    let mantissa = U256::from(amount.mantissa().unsigned_abs());
    let scale = amount.scale();
    let decimals = u32::from(decimals);
    let overflow = || ValidatorError::InvalidAmount(format!("{amount} * 10^{decimals} overflows"));

    if decimals >= scale {
        let factor = pow10(decimals - scale).ok_or_else(overflow)?;
        mantissa.checked_mul(factor).ok_or_else(overflow)
    } else {
        // More fractional digits than the token carries: drop the excess.
        Ok(pow10(scale - decimals).map_or(U256::ZERO, |divisor| mantissa / divisor))
    }
}

/// `base * percentage / 100`, truncated toward zero.
pub fn percent_of(base: U256, percentage: Decimal) -> U256 {
    let numerator = U256::from(percentage.mantissa().unsigned_abs());
    let Some(denominator) = pow10(percentage.scale()).map(|p| p * U256::from(100u8)) else {
        return U256::ZERO;
    };
    match base.checked_mul(numerator) {
        Some(product) => product / denominator,
        // Only reachable near 2^256; trade the last digits for headroom.
        None => base / denominator * numerator,
    }
}

/// `|a - b|`.
pub fn abs_diff(a: U256, b: U256) -> U256 {
    if a > b {
        a - b
    } else {
        b - a
    }
}

/// Renders base units as a human decimal without trailing zeros, e.g. `1.5`.
pub fn format_units(value: U256, decimals: u8) -> String {
    let Some(unit) = pow10(u32::from(decimals)) else {
        return value.to_string();
    };
    let whole = value / unit;
    let fraction = value % unit;
    if fraction.is_zero() {
        return whole.to_string();
    }
    let digits = fraction.to_string();
    let padded = format!("{digits:0>width$}", width = decimals as usize);
    format!("{whole}.{}", padded.trim_end_matches('0'))
}

/// Accepted distance between an observed and an expected quantity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tolerance {
    /// Values must be equal.
    Exact,
    /// Fixed slack in base units.
    Absolute(U256),
    /// Slack proportional to the expected value, in basis points.
    Relative(u32),
    /// The larger of a relative and an absolute slack.
    RelativeOrAbsolute(u32, U256),
}

impl Tolerance {
    /// 0.1%.
    pub const TENTH_PERCENT: Self = Self::Relative(10);
    /// 1%.
    pub const ONE_PERCENT: Self = Self::Relative(100);
    /// 2%.
    pub const TWO_PERCENT: Self = Self::Relative(200);
    /// 5%.
    pub const FIVE_PERCENT: Self = Self::Relative(500);

    /// Absolute slack of `wei` base units.
    pub fn wei(wei: u64) -> Self {
        Self::Absolute(U256::from(wei))
    }

    /// Largest accepted deviation from `expected`.
    pub fn bound(&self, expected: U256) -> U256 {
        match *self {
            Self::Exact => U256::ZERO,
            Self::Absolute(slack) => slack,
            Self::Relative(bps) => relative(expected, bps),
            Self::RelativeOrAbsolute(bps, floor) => relative(expected, bps).max(floor),
        }
    }

    /// Whether `actual` is close enough to `expected`.
    pub fn accepts(&self, actual: U256, expected: U256) -> bool {
        abs_diff(actual, expected) <= self.bound(expected)
    }
}

fn relative(expected: U256, bps: u32) -> U256 {
    expected.saturating_mul(U256::from(bps)) / U256::from(BPS_DENOMINATOR)
}
