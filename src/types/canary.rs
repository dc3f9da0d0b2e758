//! Canary probe types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use super::Chain;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanaryStrategy {
    /// One buy, immediate sell, small fixed size.
    Instant,
    /// Buy, wait a configured interval, then sell. Surfaces time-gated
    /// restrictions.
    Delayed,
    /// Increasing sizes (1x/2x/5x base, capped); stops at the first failing
    /// stage.
    Graduated,
    /// Micro + standard + delayed probe combined, for inconclusive single
    /// signals.
    Comprehensive,
}

/// Immutable per-test configuration.
#[derive(Debug, Clone)]
pub struct CanaryConfig {
    pub strategy: CanaryStrategy,
    pub base_probe_amount: Decimal,
    pub max_probe_amount: Decimal,
    pub max_slippage_bps: u32,
    /// Round-trip tax ceiling; anything above is classified `HighTax`.
    pub max_tax_pct: Decimal,
    /// Loss attributable to slippage before the excess counts as tax.
    pub tax_tolerance_pct: Decimal,
    pub sell_delay: Duration,
    /// Overall wall-clock budget for the whole probe run.
    pub timeout: Duration,
    /// Buy-leg retries before a stage is declared failed.
    pub max_retries: u32,
}

impl Default for CanaryConfig {
    fn default() -> Self {
        Self {
            strategy: CanaryStrategy::Instant,
            base_probe_amount: dec!(0.01),
            max_probe_amount: dec!(0.1),
            max_slippage_bps: 500,
            max_tax_pct: dec!(10),
            tax_tolerance_pct: dec!(2),
            sell_delay: Duration::from_secs(30),
            timeout: Duration::from_secs(120),
            max_retries: 1,
        }
    }
}

/// One buy+sell round trip.
#[derive(Debug, Clone, Serialize)]
pub struct CanaryStage {
    pub stage: u32,
    pub probe_amount: Decimal,
    pub buy_tx_hash: Option<String>,
    pub sell_tx_hash: Option<String>,
    pub tokens_received: Option<Decimal>,
    pub amount_recovered: Option<Decimal>,
    pub buy_gas_used: u64,
    pub sell_gas_used: u64,
    pub buy_slippage_pct: Decimal,
    pub sell_slippage_pct: Decimal,
    pub detected_tax_pct: Decimal,
    pub profit_loss_pct: Decimal,
    pub success: bool,
    /// True when the sell leg was rejected or reverted after a successful
    /// buy. A sell that never got as far as the network (quote fault,
    /// connectivity) leaves this false: that is inconclusive, not evidence.
    pub sell_rejected: bool,
    pub failure_reason: Option<String>,
}

impl CanaryStage {
    pub fn new(stage: u32, probe_amount: Decimal) -> Self {
        Self {
            stage,
            probe_amount,
            buy_tx_hash: None,
            sell_tx_hash: None,
            tokens_received: None,
            amount_recovered: None,
            buy_gas_used: 0,
            sell_gas_used: 0,
            buy_slippage_pct: Decimal::ZERO,
            sell_slippage_pct: Decimal::ZERO,
            detected_tax_pct: Decimal::ZERO,
            profit_loss_pct: Decimal::ZERO,
            success: false,
            sell_rejected: false,
            failure_reason: None,
        }
    }

    /// The canonical honeypot signature: funds went in, funds refuse to come
    /// back out.
    pub fn is_honeypot_signature(&self) -> bool {
        self.buy_tx_hash.is_some() && self.sell_rejected
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanaryOutcome {
    Success,
    Honeypot,
    HighTax,
    InsufficientLiquidity,
    TradingDisabled,
    ExcessiveSlippage,
    ExecutionFailed,
    Timeout,
    NetworkError,
}

impl CanaryOutcome {
    pub fn is_tradeable(&self) -> bool {
        matches!(self, CanaryOutcome::Success)
    }
}

/// Full probe verdict, immutable once returned. Always produced, even when
/// every external call failed.
#[derive(Debug, Clone, Serialize)]
pub struct CanaryResult {
    pub token: String,
    pub chain: Chain,
    pub dex: String,
    pub strategy: CanaryStrategy,
    pub outcome: CanaryOutcome,
    pub stages: Vec<CanaryStage>,
    pub total_spent: Decimal,
    pub total_recovered: Decimal,
    pub net_loss_pct: Decimal,
    pub max_detected_tax_pct: Decimal,
    pub total_gas_used: u64,
    pub duration_ms: u64,
    pub recommendations: Vec<String>,
    pub timestamp: DateTime<Utc>,
}
