//! Money helpers.
//!
//! Amounts are `Decimal` with two fractional digits in the domain and are
//! persisted as integer minor units (paise for INR).

use rust_decimal::prelude::*;

/// Number of fractional digits kept for every monetary amount.
pub const MONEY_SCALE: u32 = 2;

pub const DEFAULT_CURRENCY: &str = "INR";

/// Rounds to two places, half away from zero.
pub fn round_money(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(MONEY_SCALE);
    rounded
}

/// Converts an amount into minor units. Returns `None` when it does not fit in an `i64`.
pub fn to_minor_units(value: Decimal) -> Option<i64> {
    round_money(value)
        .checked_mul(Decimal::ONE_HUNDRED)?
        .trunc()
        .to_i64()
}

pub fn from_minor_units(minor: i64) -> Decimal {
    Decimal::new(minor, MONEY_SCALE)
}
