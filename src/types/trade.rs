//! Trade request types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use super::Chain;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeType {
    Manual,
    Autotrade,
    Canary,
    RevertTest,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GasOverride {
    pub gas_limit: u64,
    pub gas_price_gwei: Decimal,
}

/// Immutable trade intent. Built once by the caller and never mutated by the
/// execution core; everything derived from it lives in [`super::TradePreview`]
/// and [`super::TradeResult`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRequest {
    pub chain: Chain,
    pub dex: String,
    pub token_in: String,
    pub token_out: String,
    pub amount_in: Decimal,
    /// Explicit floor on output. When absent the executor derives it from
    /// the quoted expected output and `slippage_bps`.
    pub min_amount_out: Option<Decimal>,
    pub route: Vec<String>,
    pub slippage_bps: u32,
    pub deadline: DateTime<Utc>,
    pub wallet: String,
    pub trade_type: TradeType,
    pub gas_override: Option<GasOverride>,
}
