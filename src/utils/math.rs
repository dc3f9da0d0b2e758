//! Mathematical utility functions

use rust_decimal::prelude::*;
use rust_decimal_macros::dec;

/// Multiplier that shaves `bps` basis points off an amount,
/// e.g. 50 bps -> 0.995.
pub fn bps_discount(bps: u32) -> Decimal {
    dec!(1) - Decimal::from(bps) / dec!(10000)
}

/// Basis points expressed as a percentage, e.g. 50 bps -> 0.5.
pub fn bps_to_pct(bps: u32) -> Decimal {
    Decimal::from(bps) / dec!(100)
}

/// Percentage loss going from `before` to `after`; zero when `before` is
/// zero or the value grew.
pub fn loss_pct(before: Decimal, after: Decimal) -> Decimal {
    if before <= dec!(0) || after >= before {
        return dec!(0);
    }
    (before - after) / before * dec!(100)
}
