//! Custom error types for the execution core

use rust_decimal::Decimal;
use thiserror::Error;
use crate::types::{Chain, TradeStatus};

/// Internal plumbing errors. None of these cross a public boundary raw: the
/// executor converts them into a FAILED trade result, the canary validator
/// into a stage failure reason.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Network error: {message}")]
    Network {
        message: String,
        cause: Option<anyhow::Error>,
        retry_count: u32,
    },

    #[error("Quote failed on {chain}/{dex}: {message}")]
    Quote {
        chain: Chain,
        dex: String,
        message: String,
    },

    #[error("Transaction build failed: {message}")]
    Build { message: String },

    #[error("Submission rejected: {message}")]
    Submission {
        message: String,
        cause: Option<anyhow::Error>,
    },

    #[error("Transaction reverted on-chain: {tx_hash} (gas used: {gas_used})")]
    Reverted { tx_hash: String, gas_used: u64 },

    #[error("Insufficient balance: have {available}, need {required}")]
    InsufficientBalance {
        available: Decimal,
        required: Decimal,
    },

    #[error("Invalid status transition for {trace_id}: {from} -> {to}")]
    InvalidTransition {
        trace_id: String,
        from: TradeStatus,
        to: TradeStatus,
    },

    #[error("Trade cancelled before submission")]
    Cancelled,
}

pub type EngineResult<T> = Result<T, EngineError>;
