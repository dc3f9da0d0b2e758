//! Trade execution engine
//!
//! Drives a [`TradeRequest`] from validation to settlement in live or paper
//! mode. Both modes traverse the same status sequence; only the layer that
//! produces fills differs. Every fault inside the pipeline is caught at the
//! execution boundary and converted into a FAILED result; no raw error
//! crosses to callers.

use dashmap::DashMap;
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tracing::{error, info, warn};
use crate::{
    canary::{CanaryProbe, CanaryValidator},
    config::Config,
    errors::{EngineError, EngineResult},
    execution::simulation::{PaperSimulator, SimOutcome, SimulationParams},
    network::{BuiltTransaction, ChainClient, ProtectedSubmitter, Quote, QuoteClient, QuoteRequest},
    nonce::NonceManager,
    storage::{TradeLedger, TradeRepository},
    types::{
        CanaryConfig, CanaryStrategy, ExecutionMode, TradePreview, TradeRequest, TradeResult,
        TradeStatus, TradeType,
    },
    utils::bps_discount,
};

/// In-flight trade slot. The owning execution flow is the only writer; the
/// cancel flag and status snapshots are the only things other tasks touch.
struct ActiveTrade {
    result: RwLock<TradeResult>,
    cancel_requested: AtomicBool,
}

impl ActiveTrade {
    fn new(result: TradeResult) -> Self {
        Self {
            result: RwLock::new(result),
            cancel_requested: AtomicBool::new(false),
        }
    }

    fn snapshot(&self) -> TradeResult {
        self.result.read().expect("trade lock poisoned").clone()
    }

    fn transition(&self, next: TradeStatus) -> EngineResult<()> {
        self.result
            .write()
            .expect("trade lock poisoned")
            .transition(next)
    }

    fn update<F: FnOnce(&mut TradeResult)>(&self, f: F) {
        f(&mut self.result.write().expect("trade lock poisoned"));
    }

    fn check_cancel(&self) -> EngineResult<()> {
        if self.cancel_requested.load(Ordering::Acquire) {
            return Err(EngineError::Cancelled);
        }
        Ok(())
    }
}

pub struct TradeExecutor {
    config: Config,
    mode: ExecutionMode,
    quote_client: Arc<dyn QuoteClient>,
    chain_client: Arc<dyn ChainClient>,
    protected_submitter: Option<Arc<dyn ProtectedSubmitter>>,
    nonce_manager: Arc<NonceManager>,
    canary: Arc<CanaryValidator>,
    ledger: Arc<dyn TradeLedger>,
    repository: Arc<dyn TradeRepository>,
    simulator: PaperSimulator,
    active: DashMap<String, Arc<ActiveTrade>>,
}

impl TradeExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        quote_client: Arc<dyn QuoteClient>,
        chain_client: Arc<dyn ChainClient>,
        nonce_manager: Arc<NonceManager>,
        canary: Arc<CanaryValidator>,
        ledger: Arc<dyn TradeLedger>,
        repository: Arc<dyn TradeRepository>,
    ) -> Self {
        let mode = config.execution_mode;
        Self {
            config,
            mode,
            quote_client,
            chain_client,
            protected_submitter: None,
            nonce_manager,
            canary,
            ledger,
            repository,
            simulator: PaperSimulator::new(SimulationParams::default()),
            active: DashMap::new(),
        }
    }

    /// Route live submissions through an MEV-protected path instead of
    /// public broadcast.
    pub fn with_protected_submitter(mut self, submitter: Arc<dyn ProtectedSubmitter>) -> Self {
        self.protected_submitter = Some(submitter);
        self
    }

    /// Replace the paper-mode simulator (e.g. seeded, or custom policy).
    pub fn with_simulator(mut self, simulator: PaperSimulator) -> Self {
        self.simulator = simulator;
        self
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn reconfigure_simulation(&self, params: SimulationParams) {
        self.simulator.reconfigure(params);
    }

    // ── Preview ─────────────────────────────────────────────────────────

    /// Pure pre-flight validation. Never raises: collaborator faults and
    /// bad inputs land in `validation_errors` so batch pre-flight loops can
    /// keep going.
    pub async fn preview(&self, request: &TradeRequest) -> TradePreview {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        self.validate_shape(request, &mut errors);
        if !errors.is_empty() {
            return TradePreview::invalid(errors);
        }

        let quote = match self
            .quote_client
            .quote(&QuoteRequest {
                chain: request.chain,
                dex: request.dex.clone(),
                token_in: request.token_in.clone(),
                token_out: request.token_out.clone(),
                amount_in: request.amount_in,
                slippage_bps: request.slippage_bps,
            })
            .await
        {
            Ok(quote) => quote,
            Err(e) => {
                errors.push(
                    EngineError::Quote {
                        chain: request.chain,
                        dex: request.dex.clone(),
                        message: format!("{:#}", e),
                    }
                    .to_string(),
                );
                return TradePreview::invalid(errors);
            }
        };

        match self
            .chain_client
            .balance_of(request.chain, &request.wallet, &request.token_in)
            .await
        {
            Ok(balance) if balance < request.amount_in => {
                errors.push(
                    EngineError::InsufficientBalance {
                        available: balance,
                        required: request.amount_in,
                    }
                    .to_string(),
                );
            }
            Ok(_) => {}
            Err(e) => errors.push(format!("Balance check failed: {:#}", e)),
        }

        match self
            .chain_client
            .allowance(request.chain, &request.wallet, &request.token_in, &request.dex)
            .await
        {
            Ok(allowance) if allowance < request.amount_in => {
                errors.push(format!(
                    "Insufficient approval: allowance {} below trade amount {}",
                    allowance, request.amount_in
                ));
            }
            Ok(_) => {}
            Err(e) => errors.push(format!("Approval check failed: {:#}", e)),
        }

        if quote.price_impact_pct > self.config.price_impact_max_pct {
            errors.push(format!(
                "Price impact {:.2}% exceeds maximum {:.2}%",
                quote.price_impact_pct, self.config.price_impact_max_pct
            ));
        } else if quote.price_impact_pct > self.config.price_impact_warning_pct {
            warnings.push(format!(
                "High price impact: {:.2}%",
                quote.price_impact_pct
            ));
        }

        let minimum_output = request
            .min_amount_out
            .unwrap_or_else(|| quote.expected_output * bps_discount(request.slippage_bps));

        let gas_price_gwei = self.effective_gas_price(request, &quote, &mut warnings);
        let gas_estimate = request
            .gas_override
            .map(|g| g.gas_limit)
            .unwrap_or(quote.gas_estimate);
        let total_cost_native =
            Decimal::from(gas_estimate) * gas_price_gwei / dec!(1_000_000_000);

        TradePreview {
            expected_output: quote.expected_output,
            minimum_output,
            price: quote.price,
            price_impact_pct: quote.price_impact_pct,
            gas_estimate,
            gas_price_gwei,
            total_cost_native,
            valid: errors.is_empty(),
            validation_errors: errors,
            warnings,
        }
    }

    fn validate_shape(&self, request: &TradeRequest, errors: &mut Vec<String>) {
        if request.amount_in <= Decimal::ZERO {
            errors.push(format!("Trade amount must be positive, got {}", request.amount_in));
        }
        if request.slippage_bps > self.config.max_slippage_bps {
            errors.push(format!(
                "Slippage tolerance {} bps exceeds maximum {} bps",
                request.slippage_bps, self.config.max_slippage_bps
            ));
        }
        if request.deadline <= chrono::Utc::now() {
            errors.push("Trade deadline already passed".to_string());
        }
        if request.chain.is_evm() {
            for (label, addr) in [
                ("wallet", &request.wallet),
                ("token_in", &request.token_in),
                ("token_out", &request.token_out),
            ] {
                if alloy::primitives::Address::from_str(addr).is_err() {
                    errors.push(format!("Malformed {} address: {}", label, addr));
                }
            }
        }
    }

    fn effective_gas_price(
        &self,
        request: &TradeRequest,
        quote: &Quote,
        warnings: &mut Vec<String>,
    ) -> Decimal {
        let requested = request
            .gas_override
            .map(|g| g.gas_price_gwei)
            .unwrap_or(quote.gas_price_gwei);
        let cap = Decimal::from(self.config.max_gas_price_gwei);
        if requested > cap {
            warnings.push(format!(
                "Gas price {} gwei capped at {} gwei",
                requested, cap
            ));
            cap
        } else {
            requested
        }
    }

    // ── Execute ─────────────────────────────────────────────────────────

    /// Run a trade to a terminal status. Generates a preview when the
    /// caller did not supply one and aborts FAILED if it is invalid. The
    /// confirmation wait suspends this flow only; other in-flight trades
    /// keep making progress.
    pub async fn execute(
        &self,
        request: &TradeRequest,
        preview: Option<TradePreview>,
    ) -> TradeResult {
        let started = Instant::now();
        let entry = Arc::new(ActiveTrade::new(TradeResult::new(request, self.mode)));
        let trace_id = entry.snapshot().trace_id;
        self.active.insert(trace_id.clone(), entry.clone());

        info!(
            trace_id = %trace_id,
            mode = ?self.mode,
            chain = %request.chain,
            dex = %request.dex,
            amount_in = %request.amount_in,
            "Executing trade"
        );

        let preview = match preview {
            Some(preview) => preview,
            None => self.preview(request).await,
        };

        if !preview.valid {
            let message = format!(
                "Preview invalid: {}",
                preview.validation_errors.join("; ")
            );
            entry.update(|r| {
                r.error_message = Some(message.clone());
                let _ = r.transition(TradeStatus::Failed);
            });
            return self.finish(&trace_id, &entry, started).await;
        }

        let outcome = match self.mode {
            ExecutionMode::Paper => self.drive_paper(request, &preview, &entry).await,
            ExecutionMode::Live => self.drive_live(request, &preview, &entry).await,
        };

        match outcome {
            Ok(()) => {}
            Err(EngineError::Cancelled) => {
                entry.update(|r| {
                    r.error_message = Some("Cancelled before submission".to_string());
                    let _ = r.transition(TradeStatus::Cancelled);
                });
            }
            Err(e) => {
                warn!(trace_id = %trace_id, error = %e, "Trade failed");
                entry.update(|r| {
                    r.error_message = Some(e.to_string());
                    let _ = r.transition(TradeStatus::Failed);
                });
            }
        }

        self.finish(&trace_id, &entry, started).await
    }

    /// Cooperative, advisory cancellation. Honored only at stage boundaries
    /// strictly before submission; a broadcast transaction cannot be
    /// recalled, so such requests are rejected rather than pretended at.
    pub fn cancel(&self, trace_id: &str) -> bool {
        let Some(entry) = self.active.get(trace_id) else {
            return false;
        };
        let status = entry.snapshot().status;
        if !status.is_pre_submission() {
            return false;
        }
        entry.cancel_requested.store(true, Ordering::Release);
        info!(trace_id, %status, "Cancellation requested");
        true
    }

    /// Snapshot of every in-flight trade, for status surfaces that need to
    /// learn trace ids.
    pub fn active_trades(&self) -> Vec<TradeResult> {
        self.active.iter().map(|entry| entry.snapshot()).collect()
    }

    /// Current view of a trade: the in-flight set first, then persisted
    /// history.
    pub async fn status(&self, trace_id: &str) -> Option<TradeResult> {
        if let Some(entry) = self.active.get(trace_id) {
            return Some(entry.snapshot());
        }
        match self.repository.find(trace_id).await {
            Ok(found) => found,
            Err(e) => {
                warn!(trace_id, error = %e, "Repository lookup failed");
                None
            }
        }
    }

    // ── Paper pipeline ──────────────────────────────────────────────────

    async fn drive_paper(
        &self,
        request: &TradeRequest,
        preview: &TradePreview,
        entry: &ActiveTrade,
    ) -> EngineResult<()> {
        for stage in [
            TradeStatus::Building,
            TradeStatus::Approving,
            TradeStatus::Executing,
        ] {
            entry.check_cancel()?;
            entry.transition(stage)?;
            tokio::time::sleep(self.simulator.latency()).await;
        }

        entry.check_cancel()?;
        entry.transition(TradeStatus::Submitting)?;

        let fill = if request.trade_type == TradeType::RevertTest {
            self.simulator.revert_fill(preview.gas_estimate)
        } else {
            self.simulator
                .fill(preview.expected_output, preview.minimum_output, preview.gas_estimate)
        };

        if fill.outcome == SimOutcome::Failed {
            return Err(EngineError::Submission {
                message: fill.error.unwrap_or_else(|| "Simulated failure".to_string()),
                cause: None,
            });
        }

        let tx_hash = self.simulator.tx_hash();
        entry.update(|r| r.tx_hash = Some(tx_hash.clone()));
        entry.transition(TradeStatus::Submitted)?;

        // Simulated confirmation wait.
        tokio::time::sleep(self.simulator.latency()).await;

        match fill.outcome {
            SimOutcome::Confirmed => {
                let amount_in = request.amount_in;
                entry.update(|r| {
                    r.gas_used = Some(fill.gas_used);
                    r.actual_output = Some(fill.actual_output);
                    r.actual_price = if amount_in > Decimal::ZERO {
                        Some(fill.actual_output / amount_in)
                    } else {
                        None
                    };
                });
                entry.transition(TradeStatus::Confirmed)?;
            }
            SimOutcome::Reverted => {
                entry.update(|r| {
                    r.gas_used = Some(fill.gas_used);
                    r.error_message = fill.error.clone();
                });
                entry.transition(TradeStatus::Reverted)?;
            }
            SimOutcome::Failed => unreachable!("handled above"),
        }
        Ok(())
    }

    // ── Live pipeline ───────────────────────────────────────────────────

    async fn drive_live(
        &self,
        request: &TradeRequest,
        preview: &TradePreview,
        entry: &ActiveTrade,
    ) -> EngineResult<()> {
        entry.check_cancel()?;
        entry.transition(TradeStatus::Building)?;

        if request.trade_type == TradeType::Autotrade && self.config.canary_on_autotrade {
            self.canary_gate(request).await?;
        }

        entry.check_cancel()?;
        entry.transition(TradeStatus::Approving)?;

        // Approval first: a broadcast approval consumes the wallet's next
        // on-chain nonce, so the trade's own nonce can only be allocated
        // after the approval has landed and the pair has resynced.
        if self.ensure_approval(request).await? {
            self.nonce_manager.reset(request.chain, &request.wallet).await;
        }

        entry.check_cancel()?;
        entry.transition(TradeStatus::Executing)?;

        let nonce = self
            .nonce_manager
            .allocate(request.chain, &request.wallet)
            .await;
        let tx = self.build_transaction(request, preview, nonce);

        if let Err(e) = entry.check_cancel() {
            self.nonce_manager.fail(request.chain, &request.wallet, nonce).await;
            return Err(e);
        }
        entry.transition(TradeStatus::Submitting)?;

        let submission = match &self.protected_submitter {
            Some(submitter) => submitter.submit_protected(&tx).await,
            None => self.chain_client.submit(&tx).await,
        };

        let tx_hash = match submission {
            Ok(hash) => hash,
            Err(e) => {
                // Rejected before inclusion: the nonce was never consumed.
                self.nonce_manager.fail(request.chain, &request.wallet, nonce).await;
                return Err(EngineError::Submission {
                    message: format!("{:#}", e),
                    cause: Some(e),
                });
            }
        };

        entry.update(|r| r.tx_hash = Some(tx_hash.clone()));
        entry.transition(TradeStatus::Submitted)?;
        info!(tx_hash = %tx_hash, nonce, "Transaction submitted, awaiting confirmation");

        let confirmation = match self
            .chain_client
            .await_confirmation(request.chain, &tx_hash)
            .await
        {
            Ok(confirmation) => confirmation,
            Err(e) => {
                // Inclusion state unknown; resync rather than guess.
                self.nonce_manager.reset(request.chain, &request.wallet).await;
                return Err(EngineError::Network {
                    message: format!("Confirmation wait failed for {}", tx_hash),
                    cause: Some(e),
                    retry_count: 0,
                });
            }
        };

        // Mined either way: the nonce is consumed even on revert.
        self.nonce_manager
            .confirm(request.chain, &request.wallet, nonce)
            .await;

        if confirmation.success {
            let amount_in = request.amount_in;
            entry.update(|r| {
                r.block_number = Some(confirmation.block_number);
                r.gas_used = Some(confirmation.gas_used);
                r.actual_output = confirmation.actual_output;
                r.actual_price = confirmation.actual_output.and_then(|out| {
                    (amount_in > Decimal::ZERO).then(|| out / amount_in)
                });
            });
            entry.transition(TradeStatus::Confirmed)?;
        } else {
            entry.update(|r| {
                r.block_number = Some(confirmation.block_number);
                r.gas_used = Some(confirmation.gas_used);
                r.error_message = Some(
                    EngineError::Reverted {
                        tx_hash: tx_hash.clone(),
                        gas_used: confirmation.gas_used,
                    }
                    .to_string(),
                );
            });
            entry.transition(TradeStatus::Reverted)?;
        }
        Ok(())
    }

    async fn canary_gate(&self, request: &TradeRequest) -> EngineResult<()> {
        let config = CanaryConfig {
            strategy: CanaryStrategy::Instant,
            base_probe_amount: self.config.canary_probe_amount,
            ..CanaryConfig::default()
        };
        let probe = CanaryProbe {
            chain: request.chain,
            dex: request.dex.clone(),
            wallet: request.wallet.clone(),
            base_token: request.token_in.clone(),
            token: request.token_out.clone(),
        };
        let verdict = self.canary.run(&probe, &config).await;
        if verdict.outcome.is_tradeable() {
            return Ok(());
        }
        Err(EngineError::Build {
            message: format!(
                "Canary blocked autotrade ({:?}): {}",
                verdict.outcome,
                verdict
                    .recommendations
                    .first()
                    .cloned()
                    .unwrap_or_else(|| "no recommendation".to_string())
            ),
        })
    }

    fn build_transaction(
        &self,
        request: &TradeRequest,
        preview: &TradePreview,
        nonce: u64,
    ) -> BuiltTransaction {
        BuiltTransaction {
            chain: request.chain,
            dex: request.dex.clone(),
            wallet: request.wallet.clone(),
            token_in: request.token_in.clone(),
            token_out: request.token_out.clone(),
            amount_in: request.amount_in,
            min_amount_out: preview.minimum_output,
            route: if request.route.is_empty() {
                vec![request.token_in.clone(), request.token_out.clone()]
            } else {
                request.route.clone()
            },
            gas_limit: request
                .gas_override
                .map(|g| g.gas_limit)
                .unwrap_or(self.config.default_gas_limit),
            gas_price_gwei: preview.gas_price_gwei,
            nonce: Some(nonce),
            deadline: request.deadline,
        }
    }

    /// Re-check allowance at execution time; a valid preview can go stale
    /// between preview and execute. Returns true when an approval was
    /// broadcast, because that transaction consumed one of the wallet's
    /// nonces and the caller must resync the pair.
    async fn ensure_approval(&self, request: &TradeRequest) -> EngineResult<bool> {
        let allowance = self
            .chain_client
            .allowance(request.chain, &request.wallet, &request.token_in, &request.dex)
            .await
            .map_err(|e| EngineError::Build {
                message: format!("Allowance check failed: {:#}", e),
            })?;

        if allowance >= request.amount_in {
            return Ok(false);
        }

        info!(
            token = %request.token_in,
            dex = %request.dex,
            "Allowance below trade amount, submitting approval"
        );
        let approval_hash = self
            .chain_client
            .approve(
                request.chain,
                &request.wallet,
                &request.token_in,
                &request.dex,
                request.amount_in,
            )
            .await
            .map_err(|e| EngineError::Build {
                message: format!("Approval failed: {:#}", e),
            })?;
        info!(approval_hash = %approval_hash, "Approval confirmed");
        Ok(true)
    }

    // ── Settlement ──────────────────────────────────────────────────────

    /// Record the terminal result exactly once (ledger + repository), drop
    /// it from the active set, and return the final snapshot.
    async fn finish(&self, trace_id: &str, entry: &ActiveTrade, started: Instant) -> TradeResult {
        entry.update(|r| r.duration_ms = started.elapsed().as_millis() as u64);
        let result = entry.snapshot();

        if let Err(e) = self.ledger.record(&result).await {
            error!(trace_id, error = %e, "Failed to write trade to ledger");
        }
        if let Err(e) = self.repository.save(&result).await {
            error!(trace_id, error = %e, "Failed to persist trade result");
        }
        self.active.remove(trace_id);

        info!(
            trace_id,
            status = %result.status,
            tx_hash = ?result.tx_hash,
            duration_ms = result.duration_ms,
            "Trade finished"
        );
        result
    }
}
