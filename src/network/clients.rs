//! External collaborator seams: quote engine, chain RPC, protected submission
//!
//! The core never speaks a wire protocol itself; everything network-facing
//! is injected behind these traits by the composition root. One
//! implementation per exchange/chain, selected by configuration.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use crate::types::Chain;

#[derive(Debug, Clone)]
pub struct QuoteRequest {
    pub chain: Chain,
    pub dex: String,
    pub token_in: String,
    pub token_out: String,
    pub amount_in: Decimal,
    pub slippage_bps: u32,
}

#[derive(Debug, Clone)]
pub struct Quote {
    pub expected_output: Decimal,
    pub price: Decimal,
    pub price_impact_pct: Decimal,
    pub gas_estimate: u64,
    pub gas_price_gwei: Decimal,
    pub route: Vec<String>,
}

/// Fully-specified transaction handed to a submission path. The core fills
/// in the nonce for executor trades; canary probes leave it to the client.
#[derive(Debug, Clone, Serialize)]
pub struct BuiltTransaction {
    pub chain: Chain,
    pub dex: String,
    pub wallet: String,
    pub token_in: String,
    pub token_out: String,
    pub amount_in: Decimal,
    pub min_amount_out: Decimal,
    pub route: Vec<String>,
    pub gas_limit: u64,
    pub gas_price_gwei: Decimal,
    pub nonce: Option<u64>,
    pub deadline: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct TxConfirmation {
    /// False means the transaction reverted on-chain: gas and a nonce were
    /// still consumed.
    pub success: bool,
    pub block_number: u64,
    pub gas_used: u64,
    pub actual_output: Option<Decimal>,
}

#[async_trait]
pub trait QuoteClient: Send + Sync {
    async fn quote(&self, request: &QuoteRequest) -> anyhow::Result<Quote>;
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn balance_of(&self, chain: Chain, wallet: &str, token: &str) -> anyhow::Result<Decimal>;

    async fn allowance(
        &self,
        chain: Chain,
        wallet: &str,
        token: &str,
        spender: &str,
    ) -> anyhow::Result<Decimal>;

    /// Submit an approval and wait for it to land. Returns the approval
    /// transaction hash.
    async fn approve(
        &self,
        chain: Chain,
        wallet: &str,
        token: &str,
        spender: &str,
        amount: Decimal,
    ) -> anyhow::Result<String>;

    /// Authoritative pending-inclusive transaction count for the wallet.
    async fn pending_nonce(&self, chain: Chain, wallet: &str) -> anyhow::Result<u64>;

    /// Sign and broadcast. Returns the transaction hash.
    async fn submit(&self, tx: &BuiltTransaction) -> anyhow::Result<String>;

    /// Suspend until the transaction is mined (or rejected by the network).
    async fn await_confirmation(&self, chain: Chain, tx_hash: &str)
        -> anyhow::Result<TxConfirmation>;
}

/// Optional MEV-protected submission path. When configured, it replaces the
/// public broadcast step; the executor only cares about the returned hash.
#[async_trait]
pub trait ProtectedSubmitter: Send + Sync {
    async fn submit_protected(&self, tx: &BuiltTransaction) -> anyhow::Result<String>;
}
