//! Adversarial token prober
//!
//! Probes an unfamiliar token with small, disposable buy+sell round trips
//! before a caller commits full size. Every external call is wrapped so a
//! stage records a failure reason instead of raising; the validator never
//! leaves a caller without a structured verdict.

use chrono::Utc;
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use crate::{
    config::DEFAULT_GAS_LIMIT,
    network::{BuiltTransaction, ChainClient, QuoteClient, QuoteRequest},
    types::{
        CanaryConfig, CanaryOutcome, CanaryResult, CanaryStage, CanaryStrategy, Chain,
    },
    utils::{bps_discount, bps_to_pct, loss_pct},
};

/// What to probe: buy `token` with `base_token` on the given venue, then
/// sell it back.
#[derive(Debug, Clone)]
pub struct CanaryProbe {
    pub chain: Chain,
    pub dex: String,
    pub wallet: String,
    /// The funding asset (e.g. WETH, USDC) both legs settle against.
    pub base_token: String,
    /// The unfamiliar token under test.
    pub token: String,
}

struct StagePlan {
    probe_amount: Decimal,
    sell_delay: Option<Duration>,
}

struct LegFill {
    tx_hash: String,
    /// Wallet balance delta. A transfer tax skims between the pool and the
    /// wallet, so this can be below the venue-reported swap output.
    received: Decimal,
    gas_used: u64,
    /// Venue-reported output versus the quote; excludes any transfer tax.
    slippage_pct: Decimal,
}

enum LegFailure {
    /// Quote or connectivity fault before anything reached the network.
    Inconclusive(String),
    /// The network took the transaction and refused it, or it reverted.
    Rejected(String),
}

impl LegFailure {
    fn reason(&self) -> &str {
        match self {
            LegFailure::Inconclusive(r) | LegFailure::Rejected(r) => r,
        }
    }
}

pub struct CanaryValidator {
    quote_client: Arc<dyn QuoteClient>,
    chain_client: Arc<dyn ChainClient>,
}

impl CanaryValidator {
    pub fn new(quote_client: Arc<dyn QuoteClient>, chain_client: Arc<dyn ChainClient>) -> Self {
        Self {
            quote_client,
            chain_client,
        }
    }

    /// Run the configured probe strategy to completion (or budget
    /// exhaustion) and return a verdict. Infallible at the API: faults
    /// become stage failure reasons and a conservative outcome.
    pub async fn run(&self, probe: &CanaryProbe, config: &CanaryConfig) -> CanaryResult {
        let started = Instant::now();
        let deadline = started + config.timeout;

        info!(
            token = %probe.token,
            chain = %probe.chain,
            dex = %probe.dex,
            strategy = ?config.strategy,
            "Starting canary probe"
        );

        let mut stages: Vec<CanaryStage> = Vec::new();
        let mut budget_exhausted = false;

        for (index, plan) in Self::stage_plan(config).into_iter().enumerate() {
            let stage_no = index as u32 + 1;
            let now = Instant::now();
            if now >= deadline {
                budget_exhausted = true;
                break;
            }

            let stage = match timeout(
                deadline - now,
                self.run_stage(probe, config, stage_no, &plan),
            )
            .await
            {
                Ok(stage) => stage,
                Err(_) => {
                    let mut stage = CanaryStage::new(stage_no, plan.probe_amount);
                    stage.failure_reason = Some("probe exceeded time budget".to_string());
                    budget_exhausted = true;
                    stages.push(stage);
                    break;
                }
            };

            let stop = stage.is_honeypot_signature()
                || (!stage.success && config.strategy == CanaryStrategy::Graduated);
            stages.push(stage);
            if stop {
                break;
            }
        }

        let outcome = Self::classify(&stages, budget_exhausted, config);
        let result = Self::assemble(probe, config, outcome, stages, started);

        info!(
            token = %probe.token,
            outcome = ?result.outcome,
            stages = result.stages.len(),
            net_loss_pct = %result.net_loss_pct,
            duration_ms = result.duration_ms,
            "Canary probe finished"
        );
        result
    }

    fn stage_plan(config: &CanaryConfig) -> Vec<StagePlan> {
        let base = config.base_probe_amount;
        let cap = |amount: Decimal| amount.min(config.max_probe_amount);
        match config.strategy {
            CanaryStrategy::Instant => vec![StagePlan {
                probe_amount: cap(base),
                sell_delay: None,
            }],
            CanaryStrategy::Delayed => vec![StagePlan {
                probe_amount: cap(base),
                sell_delay: Some(config.sell_delay),
            }],
            CanaryStrategy::Graduated => vec![
                StagePlan { probe_amount: cap(base), sell_delay: None },
                StagePlan { probe_amount: cap(base * dec!(2)), sell_delay: None },
                StagePlan { probe_amount: cap(base * dec!(5)), sell_delay: None },
            ],
            CanaryStrategy::Comprehensive => vec![
                // Micro probe first: cheapest possible signal.
                StagePlan { probe_amount: cap(base / dec!(10)), sell_delay: None },
                StagePlan { probe_amount: cap(base), sell_delay: None },
                StagePlan { probe_amount: cap(base), sell_delay: Some(config.sell_delay) },
            ],
        }
    }

    async fn run_stage(
        &self,
        probe: &CanaryProbe,
        config: &CanaryConfig,
        stage_no: u32,
        plan: &StagePlan,
    ) -> CanaryStage {
        let mut stage = CanaryStage::new(stage_no, plan.probe_amount);
        debug!(stage = stage_no, amount = %plan.probe_amount, "Running canary stage");

        // Buy leg, with retries: a transient buy fault must not burn the
        // whole stage.
        let mut attempts = 0;
        let buy = loop {
            attempts += 1;
            match self
                .execute_leg(probe, &probe.base_token, &probe.token, plan.probe_amount, config)
                .await
            {
                Ok(fill) => break Ok(fill),
                Err(failure) if attempts <= config.max_retries => {
                    warn!(
                        stage = stage_no,
                        attempt = attempts,
                        reason = failure.reason(),
                        "Canary buy leg failed, retrying"
                    );
                }
                Err(failure) => break Err(failure),
            }
        };

        let buy = match buy {
            Ok(fill) => fill,
            Err(failure) => {
                // A failing buy is inconclusive, never honeypot evidence.
                stage.failure_reason = Some(format!("buy failed: {}", failure.reason()));
                return stage;
            }
        };

        stage.buy_tx_hash = Some(buy.tx_hash);
        stage.tokens_received = Some(buy.received);
        stage.buy_gas_used = buy.gas_used;
        stage.buy_slippage_pct = buy.slippage_pct;

        if let Some(delay) = plan.sell_delay {
            debug!(stage = stage_no, delay_secs = delay.as_secs(), "Holding before sell leg");
            tokio::time::sleep(delay).await;
        }

        // Sell back the exact tokens the wallet actually received.
        match self
            .execute_leg(probe, &probe.token, &probe.base_token, buy.received, config)
            .await
        {
            Ok(sell) => {
                stage.sell_tx_hash = Some(sell.tx_hash);
                stage.amount_recovered = Some(sell.received);
                stage.sell_gas_used = sell.gas_used;
                stage.sell_slippage_pct = sell.slippage_pct;
                stage.success = true;

                stage.profit_loss_pct = if sell.received >= plan.probe_amount {
                    (sell.received - plan.probe_amount) / plan.probe_amount * dec!(100)
                } else {
                    -loss_pct(plan.probe_amount, sell.received)
                };

                // Loss beyond observed round-trip slippage (plus tolerance)
                // is attributed to hidden transfer tax.
                let realized_loss = loss_pct(plan.probe_amount, sell.received);
                let friction = stage.buy_slippage_pct + stage.sell_slippage_pct;
                if realized_loss > friction + config.tax_tolerance_pct {
                    stage.detected_tax_pct = realized_loss - friction;
                }
            }
            Err(LegFailure::Rejected(reason)) => {
                stage.sell_rejected = true;
                stage.failure_reason = Some(format!("sell rejected: {}", reason));
            }
            Err(LegFailure::Inconclusive(reason)) => {
                stage.failure_reason = Some(format!("sell failed: {}", reason));
            }
        }
        stage
    }

    /// One swap leg: quote, build, submit, confirm. Distinguishes faults
    /// that never reached the network from transactions the network took
    /// and refused.
    async fn execute_leg(
        &self,
        probe: &CanaryProbe,
        token_in: &str,
        token_out: &str,
        amount_in: Decimal,
        config: &CanaryConfig,
    ) -> Result<LegFill, LegFailure> {
        let quote = self
            .quote_client
            .quote(&QuoteRequest {
                chain: probe.chain,
                dex: probe.dex.clone(),
                token_in: token_in.to_string(),
                token_out: token_out.to_string(),
                amount_in,
                slippage_bps: config.max_slippage_bps,
            })
            .await
            .map_err(|e| LegFailure::Inconclusive(format!("quote: {:#}", e)))?;

        // Best effort; if the read fails we fall back to the reported
        // output, which hides transfer taxes but keeps the leg usable.
        let balance_before = self
            .chain_client
            .balance_of(probe.chain, &probe.wallet, token_out)
            .await
            .ok();

        let tx = BuiltTransaction {
            chain: probe.chain,
            dex: probe.dex.clone(),
            wallet: probe.wallet.clone(),
            token_in: token_in.to_string(),
            token_out: token_out.to_string(),
            amount_in,
            min_amount_out: quote.expected_output * bps_discount(config.max_slippage_bps),
            route: quote.route.clone(),
            gas_limit: DEFAULT_GAS_LIMIT,
            gas_price_gwei: quote.gas_price_gwei,
            // Probes do not touch the nonce ledger; the client assigns.
            nonce: None,
            deadline: Utc::now() + chrono::Duration::from_std(config.timeout).unwrap_or_default(),
        };

        let tx_hash = self
            .chain_client
            .submit(&tx)
            .await
            .map_err(|e| LegFailure::Rejected(format!("submit: {:#}", e)))?;

        let confirmation = self
            .chain_client
            .await_confirmation(probe.chain, &tx_hash)
            .await
            .map_err(|e| LegFailure::Inconclusive(format!("confirmation: {:#}", e)))?;

        if !confirmation.success {
            return Err(LegFailure::Rejected(format!("reverted in tx {}", tx_hash)));
        }

        let reported_output = confirmation.actual_output.unwrap_or(quote.expected_output);
        let slippage_pct = if quote.expected_output > Decimal::ZERO {
            loss_pct(quote.expected_output, reported_output)
        } else {
            Decimal::ZERO
        };

        // The wallet delta is ground truth for what actually arrived.
        let received = match balance_before {
            Some(before) => match self
                .chain_client
                .balance_of(probe.chain, &probe.wallet, token_out)
                .await
            {
                Ok(after) if after > before => after - before,
                _ => reported_output,
            },
            None => reported_output,
        };

        Ok(LegFill {
            tx_hash,
            received,
            gas_used: confirmation.gas_used,
            slippage_pct,
        })
    }

    /// First match wins: honeypot > high tax > excessive slippage >
    /// execution failure > timeout > success. Uniform stage failures may
    /// refine the execution-failure bucket into a more specific outcome.
    fn classify(
        stages: &[CanaryStage],
        budget_exhausted: bool,
        config: &CanaryConfig,
    ) -> CanaryOutcome {
        if stages.iter().any(|s| s.is_honeypot_signature()) {
            return CanaryOutcome::Honeypot;
        }

        let max_tax = stages
            .iter()
            .map(|s| s.detected_tax_pct)
            .max()
            .unwrap_or(Decimal::ZERO);
        if max_tax > config.max_tax_pct {
            return CanaryOutcome::HighTax;
        }

        let slippage_ceiling = bps_to_pct(config.max_slippage_bps);
        let worst_slippage = stages
            .iter()
            .flat_map(|s| [s.buy_slippage_pct, s.sell_slippage_pct])
            .max()
            .unwrap_or(Decimal::ZERO);
        if worst_slippage > slippage_ceiling {
            return CanaryOutcome::ExcessiveSlippage;
        }

        let failures: Vec<&str> = stages
            .iter()
            .filter(|s| !s.success)
            .filter_map(|s| s.failure_reason.as_deref())
            .filter(|r| !r.contains("time budget"))
            .collect();
        if !failures.is_empty() {
            let refined: Vec<CanaryOutcome> = failures
                .iter()
                .filter_map(|r| Self::refine_failure(r))
                .collect();
            if !refined.is_empty() && refined.iter().all(|o| *o == refined[0]) {
                return refined[0];
            }
            return CanaryOutcome::ExecutionFailed;
        }

        if budget_exhausted {
            return CanaryOutcome::Timeout;
        }

        CanaryOutcome::Success
    }

    fn refine_failure(reason: &str) -> Option<CanaryOutcome> {
        let reason = reason.to_ascii_lowercase();
        if reason.contains("liquidity") {
            Some(CanaryOutcome::InsufficientLiquidity)
        } else if reason.contains("disabled") || reason.contains("paused") {
            Some(CanaryOutcome::TradingDisabled)
        } else if reason.contains("connect") || reason.contains("network") || reason.contains("unreachable") {
            Some(CanaryOutcome::NetworkError)
        } else {
            None
        }
    }

    fn assemble(
        probe: &CanaryProbe,
        config: &CanaryConfig,
        outcome: CanaryOutcome,
        stages: Vec<CanaryStage>,
        started: Instant,
    ) -> CanaryResult {
        let total_spent: Decimal = stages
            .iter()
            .filter(|s| s.buy_tx_hash.is_some())
            .map(|s| s.probe_amount)
            .sum();
        let total_recovered: Decimal = stages
            .iter()
            .filter_map(|s| s.amount_recovered)
            .sum();
        let net_loss_pct = loss_pct(total_spent, total_recovered);
        let max_detected_tax_pct = stages
            .iter()
            .map(|s| s.detected_tax_pct)
            .max()
            .unwrap_or(Decimal::ZERO);
        let total_gas_used = stages
            .iter()
            .map(|s| s.buy_gas_used + s.sell_gas_used)
            .sum();

        let recommendations =
            Self::recommendations(outcome, net_loss_pct, max_detected_tax_pct, config);

        CanaryResult {
            token: probe.token.clone(),
            chain: probe.chain,
            dex: probe.dex.clone(),
            strategy: config.strategy,
            outcome,
            stages,
            total_spent,
            total_recovered,
            net_loss_pct,
            max_detected_tax_pct,
            total_gas_used,
            duration_ms: started.elapsed().as_millis() as u64,
            recommendations,
            timestamp: Utc::now(),
        }
    }

    fn recommendations(
        outcome: CanaryOutcome,
        net_loss_pct: Decimal,
        max_tax_pct: Decimal,
        config: &CanaryConfig,
    ) -> Vec<String> {
        match outcome {
            CanaryOutcome::Success => vec![
                format!(
                    "Round trip completed with {:.2}% net loss; token behaves normally at probe size.",
                    net_loss_pct
                ),
                "Start with small positions; a probe cannot rule out size-dependent restrictions."
                    .to_string(),
            ],
            CanaryOutcome::Honeypot => vec![
                "DO NOT TRADE: buys succeed but sells are rejected (honeypot signature).".to_string(),
                "Funds spent on probes are unrecoverable; do not commit additional capital.".to_string(),
            ],
            CanaryOutcome::HighTax => vec![
                format!(
                    "Detected ~{:.1}% hidden transfer tax, above the configured {:.1}% ceiling.",
                    max_tax_pct, config.max_tax_pct
                ),
                "Avoid this token, or verify the tax rate in the contract and size accordingly.".to_string(),
            ],
            CanaryOutcome::ExcessiveSlippage => vec![
                format!(
                    "Observed slippage exceeds the {:.1}% ceiling; liquidity is too thin for this size.",
                    bps_to_pct(config.max_slippage_bps)
                ),
                "Reduce trade size before retrying.".to_string(),
            ],
            CanaryOutcome::InsufficientLiquidity => vec![
                "Pool liquidity is insufficient even for probe-sized trades.".to_string(),
                "Wait for deeper liquidity before trading this token.".to_string(),
            ],
            CanaryOutcome::TradingDisabled => vec![
                "Trading appears disabled or paused for this token.".to_string(),
                "Re-probe later; a token that launches with trading disabled deserves suspicion.".to_string(),
            ],
            CanaryOutcome::ExecutionFailed => vec![
                "Probe execution failed before producing a verdict; treat the token as unverified.".to_string(),
                "Retry the canary before committing capital.".to_string(),
            ],
            CanaryOutcome::Timeout => vec![
                "Canary exceeded its time budget; result is inconclusive.".to_string(),
                "Retry with a larger timeout or during lower network congestion.".to_string(),
            ],
            CanaryOutcome::NetworkError => vec![
                "Network errors prevented the probe from completing.".to_string(),
                "Check RPC connectivity and retry.".to_string(),
            ],
        }
    }
}
