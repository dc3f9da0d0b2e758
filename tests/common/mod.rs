//! Shared fixtures: scripted quote/chain doubles and an in-memory ledger.

#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use omnidex_executor::canary::CanaryValidator;
use omnidex_executor::config::Config;
use omnidex_executor::execution::{PaperSimulator, TradeExecutor};
use omnidex_executor::network::{
    BuiltTransaction, ChainClient, ProtectedSubmitter, Quote, QuoteClient, QuoteRequest,
    TxConfirmation,
};
use omnidex_executor::nonce::NonceManager;
use omnidex_executor::storage::{InMemoryTradeRepository, TradeLedger};
use omnidex_executor::types::{Chain, ExecutionMode, TradeRequest, TradeResult, TradeType};

pub const WALLET: &str = "0x1111111111111111111111111111111111111111";
pub const WETH: &str = "0x2222222222222222222222222222222222222222";
pub const TOKEN: &str = "0x3333333333333333333333333333333333333333";
pub const DEX: &str = "uniswap-v3";

/// Flat 1:1 book: expected output equals input. Makes slippage and tax
/// arithmetic in assertions exact.
pub struct MockQuoteClient {
    pub price_impact_pct: Decimal,
    pub gas_price_gwei: Decimal,
    pub fail_with: Mutex<Option<String>>,
}

impl Default for MockQuoteClient {
    fn default() -> Self {
        Self {
            price_impact_pct: dec!(0.1),
            gas_price_gwei: dec!(30),
            fail_with: Mutex::new(None),
        }
    }
}

impl MockQuoteClient {
    pub fn failing_with(msg: &str) -> Self {
        Self {
            fail_with: Mutex::new(Some(msg.to_string())),
            ..Self::default()
        }
    }
}

#[async_trait]
impl QuoteClient for MockQuoteClient {
    async fn quote(&self, request: &QuoteRequest) -> Result<Quote> {
        if let Some(msg) = self.fail_with.lock().unwrap().clone() {
            bail!(msg);
        }
        Ok(Quote {
            expected_output: request.amount_in,
            price: dec!(1),
            price_impact_pct: self.price_impact_pct,
            gas_estimate: 150_000,
            gas_price_gwei: self.gas_price_gwei,
            route: vec![request.token_in.clone(), request.token_out.clone()],
        })
    }
}

/// Scripted chain double with real balance and nonce bookkeeping. Each
/// confirmed swap reports `amount_in * (1 - slippage)` as its output and
/// credits the wallet with `reported * (1 - tax)`, so probes can see hidden
/// transfer taxes the same way they would on-chain. Approvals consume a
/// wallet nonce like any other transaction, and submissions carrying an
/// explicit nonce are rejected unless it is exactly the next one.
pub struct MockChainClient {
    balances: Mutex<HashMap<String, Decimal>>,
    allowance: Mutex<Decimal>,
    leg_slippage_pct: Decimal,
    transfer_tax_pct: Decimal,
    chain_nonce: AtomicU64,
    nonce_fetch_fails: AtomicBool,
    nonce_fetch_calls: AtomicUsize,
    reject_token_in: Option<String>,
    submit_error: Option<String>,
    confirm_as_revert: bool,
    confirm_error: Option<String>,
    txs: Mutex<HashMap<String, BuiltTransaction>>,
    submit_count: AtomicUsize,
    approve_count: AtomicUsize,
    hash_seq: AtomicU64,
}

impl Default for MockChainClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChainClient {
    pub fn new() -> Self {
        let mut balances = HashMap::new();
        balances.insert(WETH.to_string(), dec!(1000000));
        Self {
            balances: Mutex::new(balances),
            allowance: Mutex::new(dec!(1000000)),
            leg_slippage_pct: Decimal::ZERO,
            transfer_tax_pct: Decimal::ZERO,
            chain_nonce: AtomicU64::new(0),
            nonce_fetch_fails: AtomicBool::new(false),
            nonce_fetch_calls: AtomicUsize::new(0),
            reject_token_in: None,
            submit_error: None,
            confirm_as_revert: false,
            confirm_error: None,
            txs: Mutex::new(HashMap::new()),
            submit_count: AtomicUsize::new(0),
            approve_count: AtomicUsize::new(0),
            hash_seq: AtomicU64::new(0),
        }
    }

    pub fn with_chain_nonce(self, nonce: u64) -> Self {
        self.chain_nonce.store(nonce, Ordering::SeqCst);
        self
    }

    pub fn with_leg_slippage_pct(mut self, pct: Decimal) -> Self {
        self.leg_slippage_pct = pct;
        self
    }

    pub fn with_transfer_tax_pct(mut self, pct: Decimal) -> Self {
        self.transfer_tax_pct = pct;
        self
    }

    pub fn with_allowance(self, allowance: Decimal) -> Self {
        *self.allowance.lock().unwrap() = allowance;
        self
    }

    pub fn set_allowance(&self, allowance: Decimal) {
        *self.allowance.lock().unwrap() = allowance;
    }

    pub fn with_balance(self, token: &str, amount: Decimal) -> Self {
        self.balances
            .lock()
            .unwrap()
            .insert(token.to_string(), amount);
        self
    }

    /// Honeypot behavior: any transaction selling `token` is refused at
    /// submission.
    pub fn rejecting_sells_of(mut self, token: &str) -> Self {
        self.reject_token_in = Some(token.to_string());
        self
    }

    pub fn failing_submits_with(mut self, msg: &str) -> Self {
        self.submit_error = Some(msg.to_string());
        self
    }

    pub fn failing_nonce_fetch(self) -> Self {
        self.nonce_fetch_fails.store(true, Ordering::SeqCst);
        self
    }

    pub fn reverting_confirmations(mut self) -> Self {
        self.confirm_as_revert = true;
        self
    }

    pub fn failing_confirmations_with(mut self, msg: &str) -> Self {
        self.confirm_error = Some(msg.to_string());
        self
    }

    pub fn set_chain_nonce(&self, nonce: u64) {
        self.chain_nonce.store(nonce, Ordering::SeqCst);
    }

    pub fn set_nonce_fetch_fails(&self, fails: bool) {
        self.nonce_fetch_fails.store(fails, Ordering::SeqCst);
    }

    pub fn nonce_fetch_calls(&self) -> usize {
        self.nonce_fetch_calls.load(Ordering::SeqCst)
    }

    pub fn submit_count(&self) -> usize {
        self.submit_count.load(Ordering::SeqCst)
    }

    pub fn approve_count(&self) -> usize {
        self.approve_count.load(Ordering::SeqCst)
    }

    pub fn balance(&self, token: &str) -> Decimal {
        self.balances
            .lock()
            .unwrap()
            .get(token)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Nonces carried by every accepted submission, in order of arrival.
    pub fn submitted_nonces(&self) -> Vec<Option<u64>> {
        self.txs.lock().unwrap().values().map(|tx| tx.nonce).collect()
    }

    /// Accept a transaction onto the mock chain. An explicit nonce must be
    /// exactly the wallet's next one, and consumes it; client-assigned
    /// nonces (`None`) are always accepted.
    fn accept_tx(&self, tx: &BuiltTransaction, protected: bool) -> Result<String> {
        if let Some(nonce) = tx.nonce {
            let expected = self.chain_nonce.load(Ordering::SeqCst);
            if nonce != expected {
                bail!("invalid nonce {}: next expected {}", nonce, expected);
            }
            self.chain_nonce.store(expected + 1, Ordering::SeqCst);
        }
        let seq = self.hash_seq.fetch_add(1, Ordering::SeqCst);
        let hash = if protected {
            format!("0xff{:062x}", seq + 1)
        } else {
            format!("0x{:064x}", seq + 1)
        };
        self.txs.lock().unwrap().insert(hash.clone(), tx.clone());
        Ok(hash)
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn balance_of(&self, _chain: Chain, _wallet: &str, token: &str) -> Result<Decimal> {
        Ok(self.balance(token))
    }

    async fn allowance(
        &self,
        _chain: Chain,
        _wallet: &str,
        _token: &str,
        _spender: &str,
    ) -> Result<Decimal> {
        Ok(*self.allowance.lock().unwrap())
    }

    async fn approve(
        &self,
        _chain: Chain,
        _wallet: &str,
        _token: &str,
        _spender: &str,
        amount: Decimal,
    ) -> Result<String> {
        self.approve_count.fetch_add(1, Ordering::SeqCst);
        // An approval is an on-chain transaction: it consumes the wallet's
        // next nonce before the trade gets to use it.
        self.chain_nonce.fetch_add(1, Ordering::SeqCst);
        *self.allowance.lock().unwrap() = amount;
        Ok("0xapproval".to_string())
    }

    async fn pending_nonce(&self, _chain: Chain, _wallet: &str) -> Result<u64> {
        self.nonce_fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.nonce_fetch_fails.load(Ordering::SeqCst) {
            bail!("nonce fetch: connection refused");
        }
        Ok(self.chain_nonce.load(Ordering::SeqCst))
    }

    async fn submit(&self, tx: &BuiltTransaction) -> Result<String> {
        self.submit_count.fetch_add(1, Ordering::SeqCst);
        if let Some(msg) = &self.submit_error {
            bail!(msg.clone());
        }
        if self.reject_token_in.as_deref() == Some(tx.token_in.as_str()) {
            bail!("execution reverted: transfer blocked");
        }
        self.accept_tx(tx, false)
    }

    async fn await_confirmation(&self, _chain: Chain, tx_hash: &str) -> Result<TxConfirmation> {
        if let Some(msg) = &self.confirm_error {
            bail!(msg.clone());
        }
        let tx = self
            .txs
            .lock()
            .unwrap()
            .get(tx_hash)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown transaction {}", tx_hash))?;

        if self.confirm_as_revert {
            return Ok(TxConfirmation {
                success: false,
                block_number: 12_345,
                gas_used: 90_000,
                actual_output: None,
            });
        }

        let reported = tx.amount_in * (dec!(1) - self.leg_slippage_pct / dec!(100));
        let received = reported * (dec!(1) - self.transfer_tax_pct / dec!(100));
        {
            let mut balances = self.balances.lock().unwrap();
            let spent = balances.entry(tx.token_in.clone()).or_insert(Decimal::ZERO);
            *spent -= tx.amount_in;
            let gained = balances.entry(tx.token_out.clone()).or_insert(Decimal::ZERO);
            *gained += received;
        }

        Ok(TxConfirmation {
            success: true,
            block_number: 12_345,
            gas_used: 90_000,
            actual_output: Some(reported),
        })
    }
}

/// MEV-protected path double: bypasses the public mempool (and its submit
/// counter) but still lands the transaction on the same mock chain so
/// confirmation lookups find it.
pub struct MockProtectedSubmitter {
    chain: Arc<MockChainClient>,
    submit_count: AtomicUsize,
}

impl MockProtectedSubmitter {
    pub fn new(chain: Arc<MockChainClient>) -> Self {
        Self {
            chain,
            submit_count: AtomicUsize::new(0),
        }
    }

    pub fn submit_count(&self) -> usize {
        self.submit_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProtectedSubmitter for MockProtectedSubmitter {
    async fn submit_protected(&self, tx: &BuiltTransaction) -> Result<String> {
        self.submit_count.fetch_add(1, Ordering::SeqCst);
        self.chain.accept_tx(tx, true)
    }
}

#[derive(Default)]
pub struct MemoryLedger {
    records: Mutex<Vec<TradeResult>>,
}

impl MemoryLedger {
    pub fn count(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<TradeResult> {
        self.records.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl TradeLedger for MemoryLedger {
    async fn record(&self, result: &TradeResult) -> Result<()> {
        self.records.lock().unwrap().push(result.clone());
        Ok(())
    }
}

pub fn trade_request(amount: Decimal) -> TradeRequest {
    TradeRequest {
        chain: Chain::Base,
        dex: DEX.to_string(),
        token_in: WETH.to_string(),
        token_out: TOKEN.to_string(),
        amount_in: amount,
        min_amount_out: None,
        route: Vec::new(),
        slippage_bps: 50,
        deadline: Utc::now() + ChronoDuration::minutes(5),
        wallet: WALLET.to_string(),
        trade_type: TradeType::Manual,
        gas_override: None,
    }
}

pub struct Harness {
    pub executor: Arc<TradeExecutor>,
    pub chain: Arc<MockChainClient>,
    pub nonce_manager: Arc<NonceManager>,
    pub ledger: Arc<MemoryLedger>,
    pub repository: Arc<InMemoryTradeRepository>,
}

fn base_config(mode: ExecutionMode) -> Config {
    Config {
        execution_mode: mode,
        canary_on_autotrade: false,
        ..Config::default()
    }
}

pub fn harness(mode: ExecutionMode, chain: MockChainClient) -> Harness {
    harness_full(
        base_config(mode),
        Arc::new(chain),
        MockQuoteClient::default(),
        None,
        None,
    )
}

pub fn harness_with_simulator(chain: MockChainClient, simulator: PaperSimulator) -> Harness {
    harness_full(
        base_config(ExecutionMode::Paper),
        Arc::new(chain),
        MockQuoteClient::default(),
        Some(simulator),
        None,
    )
}

pub fn harness_with_config(
    config: Config,
    chain: MockChainClient,
    simulator: Option<PaperSimulator>,
) -> Harness {
    harness_full(
        config,
        Arc::new(chain),
        MockQuoteClient::default(),
        simulator,
        None,
    )
}

pub fn harness_with_quote(
    mode: ExecutionMode,
    chain: MockChainClient,
    quote: MockQuoteClient,
) -> Harness {
    harness_full(base_config(mode), Arc::new(chain), quote, None, None)
}

pub fn harness_protected(chain: MockChainClient) -> (Harness, Arc<MockProtectedSubmitter>) {
    let chain = Arc::new(chain);
    let protected = Arc::new(MockProtectedSubmitter::new(chain.clone()));
    let harness = harness_full(
        base_config(ExecutionMode::Live),
        chain,
        MockQuoteClient::default(),
        None,
        Some(protected.clone()),
    );
    (harness, protected)
}

fn harness_full(
    config: Config,
    chain: Arc<MockChainClient>,
    quote: MockQuoteClient,
    simulator: Option<PaperSimulator>,
    protected: Option<Arc<MockProtectedSubmitter>>,
) -> Harness {
    let quote = Arc::new(quote);
    let nonce_manager = Arc::new(NonceManager::new(chain.clone()));
    let canary = Arc::new(CanaryValidator::new(quote.clone(), chain.clone()));
    let ledger = Arc::new(MemoryLedger::default());
    let repository = Arc::new(InMemoryTradeRepository::new());

    let mut executor = TradeExecutor::new(
        config,
        quote,
        chain.clone(),
        nonce_manager.clone(),
        canary,
        ledger.clone(),
        repository.clone(),
    );
    if let Some(simulator) = simulator {
        executor = executor.with_simulator(simulator);
    }
    if let Some(protected) = protected {
        executor = executor.with_protected_submitter(protected);
    }

    Harness {
        executor: Arc::new(executor),
        chain,
        nonce_manager,
        ledger,
        repository,
    }
}
