//! Configuration settings and environment variable handling

use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use std::env;
use std::str::FromStr;
use crate::types::ExecutionMode;

// Configuration constants
pub const MIN_SLIPPAGE_BPS: u32 = 1;
pub const MAX_SLIPPAGE_BPS: u32 = 2000; // 20%
pub const DEFAULT_SLIPPAGE_BPS: u32 = 50; // 0.5%
pub const PRICE_IMPACT_WARNING_PCT: Decimal = dec!(1.0);
pub const PRICE_IMPACT_MAX_PCT: Decimal = dec!(15.0);

// Gas constants
pub const DEFAULT_GAS_LIMIT: u64 = 300_000;
pub const MAX_GAS_PRICE_GWEI: u32 = 500;

#[derive(Debug, Clone)]
pub struct Config {
    pub execution_mode: ExecutionMode,
    pub default_slippage_bps: u32,
    pub max_slippage_bps: u32,
    pub price_impact_warning_pct: Decimal,
    /// Hard ceiling; previews above this are invalid, not just warned.
    pub price_impact_max_pct: Decimal,
    pub default_gas_limit: u64,
    pub max_gas_price_gwei: u32,
    /// Run an instant canary probe before live autotrades.
    pub canary_on_autotrade: bool,
    pub canary_probe_amount: Decimal,
    pub ledger_dir: String,
}

impl Config {
    /// Load from environment variables with clamped defaults. The value is
    /// owned by the composition root and passed explicitly; there is no
    /// process-global config.
    pub fn load() -> Self {
        Self {
            execution_mode: match env::var("EXECUTION_MODE").as_deref() {
                Ok("live") => ExecutionMode::Live,
                _ => ExecutionMode::Paper,
            },
            default_slippage_bps: env::var("DEFAULT_SLIPPAGE_BPS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_SLIPPAGE_BPS)
                .clamp(MIN_SLIPPAGE_BPS, MAX_SLIPPAGE_BPS),
            max_slippage_bps: env::var("MAX_SLIPPAGE_BPS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(MAX_SLIPPAGE_BPS)
                .min(MAX_SLIPPAGE_BPS),
            price_impact_warning_pct: env::var("PRICE_IMPACT_WARNING_PCT")
                .ok()
                .and_then(|s| Decimal::from_str(&s).ok())
                .unwrap_or(PRICE_IMPACT_WARNING_PCT),
            price_impact_max_pct: env::var("PRICE_IMPACT_MAX_PCT")
                .ok()
                .and_then(|s| Decimal::from_str(&s).ok())
                .unwrap_or(PRICE_IMPACT_MAX_PCT),
            default_gas_limit: env::var("DEFAULT_GAS_LIMIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_GAS_LIMIT),
            max_gas_price_gwei: env::var("MAX_GAS_PRICE_GWEI")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(MAX_GAS_PRICE_GWEI)
                .min(MAX_GAS_PRICE_GWEI),
            canary_on_autotrade: env::var("CANARY_ON_AUTOTRADE")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            canary_probe_amount: env::var("CANARY_PROBE_AMOUNT")
                .ok()
                .and_then(|s| Decimal::from_str(&s).ok())
                .unwrap_or(dec!(0.01)),
            ledger_dir: env::var("LEDGER_DIR")
                .unwrap_or_else(|_| "output/executions".to_string()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            execution_mode: ExecutionMode::Paper,
            default_slippage_bps: DEFAULT_SLIPPAGE_BPS,
            max_slippage_bps: MAX_SLIPPAGE_BPS,
            price_impact_warning_pct: PRICE_IMPACT_WARNING_PCT,
            price_impact_max_pct: PRICE_IMPACT_MAX_PCT,
            default_gas_limit: DEFAULT_GAS_LIMIT,
            max_gas_price_gwei: MAX_GAS_PRICE_GWEI,
            canary_on_autotrade: true,
            canary_probe_amount: dec!(0.01),
            ledger_dir: "output/executions".to_string(),
        }
    }
}
