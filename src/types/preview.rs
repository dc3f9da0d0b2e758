//! Trade preview types

use rust_decimal::Decimal;
use serde::Serialize;

/// Ephemeral pre-flight snapshot. Recomputed on every call and never
/// persisted; a `valid == false` preview carries the reasons in
/// `validation_errors` instead of raising, so batch pre-flight loops never
/// abort.
#[derive(Debug, Clone, Serialize, Default)]
pub struct TradePreview {
    pub expected_output: Decimal,
    pub minimum_output: Decimal,
    pub price: Decimal,
    pub price_impact_pct: Decimal,
    pub gas_estimate: u64,
    pub gas_price_gwei: Decimal,
    /// Estimated gas spend in the chain's native unit.
    pub total_cost_native: Decimal,
    pub valid: bool,
    pub validation_errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl TradePreview {
    pub fn invalid(errors: Vec<String>) -> Self {
        Self {
            valid: false,
            validation_errors: errors,
            ..Default::default()
        }
    }
}
