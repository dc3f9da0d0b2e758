//! Paper-mode execution simulation
//!
//! Injects bounded random latency, slippage, gas variance, and small
//! probabilities of outright failure, revert, and MEV-sandwich impact, so
//! aggregate paper statistics approximate live conditions. All randomness
//! flows through one owned, seedable generator so tests can pin outcomes.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::*;
use std::sync::{Mutex, RwLock};
use std::time::Duration;
use tracing::debug;
use crate::utils::bps_discount;

/// Reconfigurable simulation policy, not hardcoded constants.
#[derive(Debug, Clone)]
pub struct SimulationParams {
    pub base_latency_ms: u64,
    pub latency_variance_ms: u64,
    pub base_slippage_bps: u32,
    pub slippage_variance_bps: u32,
    pub failure_probability: f64,
    pub revert_probability: f64,
    pub sandwich_probability: f64,
    pub sandwich_impact_bps: u32,
    /// Relative gas spread around `base_gas_used`, e.g. 0.15 = +/-15%.
    pub gas_variance_pct: f64,
    pub base_gas_used: u64,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            base_latency_ms: 120,
            latency_variance_ms: 180,
            base_slippage_bps: 20,
            slippage_variance_bps: 20,
            failure_probability: 0.01,
            revert_probability: 0.005,
            sandwich_probability: 0.01,
            sandwich_impact_bps: 120,
            gas_variance_pct: 0.15,
            base_gas_used: 165_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimOutcome {
    Confirmed,
    Failed,
    Reverted,
}

#[derive(Debug, Clone)]
pub struct SimulatedFill {
    pub outcome: SimOutcome,
    pub slippage_bps: u32,
    pub actual_output: Decimal,
    pub gas_used: u64,
    pub sandwiched: bool,
    pub error: Option<String>,
}

pub struct PaperSimulator {
    params: RwLock<SimulationParams>,
    rng: Mutex<StdRng>,
}

impl PaperSimulator {
    pub fn new(params: SimulationParams) -> Self {
        Self {
            params: RwLock::new(params),
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Deterministic simulator for tests and reproducible paper runs.
    pub fn with_seed(params: SimulationParams, seed: u64) -> Self {
        Self {
            params: RwLock::new(params),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn params(&self) -> SimulationParams {
        self.params.read().expect("params lock poisoned").clone()
    }

    /// Swap the policy at runtime; in-flight fills keep the values they
    /// already sampled.
    pub fn reconfigure(&self, params: SimulationParams) {
        *self.params.write().expect("params lock poisoned") = params;
    }

    /// Simulated network/confirmation latency for one stage.
    pub fn latency(&self) -> Duration {
        let params = self.params();
        let jitter = if params.latency_variance_ms == 0 {
            0
        } else {
            self.rng
                .lock()
                .expect("rng lock poisoned")
                .random_range(0..=params.latency_variance_ms)
        };
        Duration::from_millis(params.base_latency_ms + jitter)
    }

    /// Simulated transaction hash, shaped like a real one.
    pub fn tx_hash(&self) -> String {
        format!("0x{}", uuid::Uuid::new_v4().simple())
    }

    /// Sample one fill. A sandwich adds its impact to the sampled slippage;
    /// if that pushes the output below the caller's minimum, the fill
    /// reverts, mirroring on-chain min-out protection.
    pub fn fill(
        &self,
        expected_output: Decimal,
        minimum_output: Decimal,
        gas_estimate: u64,
    ) -> SimulatedFill {
        let params = self.params();
        let mut rng = self.rng.lock().expect("rng lock poisoned");

        let gas_spread = params.gas_variance_pct * (rng.random::<f64>() * 2.0 - 1.0);
        let base_gas = if gas_estimate > 0 {
            gas_estimate
        } else {
            params.base_gas_used
        };
        let gas_used = ((base_gas as f64) * (1.0 + gas_spread)).max(21_000.0) as u64;

        if rng.random::<f64>() < params.failure_probability {
            return SimulatedFill {
                outcome: SimOutcome::Failed,
                slippage_bps: 0,
                actual_output: Decimal::ZERO,
                gas_used: 0,
                sandwiched: false,
                error: Some("Simulated submission failure: network rejected transaction".to_string()),
            };
        }

        if rng.random::<f64>() < params.revert_probability {
            return SimulatedFill {
                outcome: SimOutcome::Reverted,
                slippage_bps: 0,
                actual_output: Decimal::ZERO,
                gas_used,
                sandwiched: false,
                error: Some("Simulated on-chain revert".to_string()),
            };
        }

        let variance = params.slippage_variance_bps as i64;
        let jitter = if variance == 0 {
            0
        } else {
            rng.random_range(-variance..=variance)
        };
        let mut slippage_bps = (params.base_slippage_bps as i64 + jitter).max(0) as u32;

        let sandwiched = rng.random::<f64>() < params.sandwich_probability;
        if sandwiched {
            slippage_bps += params.sandwich_impact_bps;
        }

        let actual_output = expected_output * bps_discount(slippage_bps);

        if actual_output < minimum_output {
            debug!(slippage_bps, sandwiched, "Simulated fill below minimum output, reverting");
            return SimulatedFill {
                outcome: SimOutcome::Reverted,
                slippage_bps,
                actual_output: Decimal::ZERO,
                gas_used,
                sandwiched,
                error: Some(if sandwiched {
                    "Simulated revert: sandwich pushed fill below minimum output".to_string()
                } else {
                    "Simulated revert: fill below minimum output".to_string()
                }),
            };
        }

        SimulatedFill {
            outcome: SimOutcome::Confirmed,
            slippage_bps,
            actual_output,
            gas_used,
            sandwiched,
            error: None,
        }
    }

    /// Forced revert fill, used for revert-test trades.
    pub fn revert_fill(&self, gas_estimate: u64) -> SimulatedFill {
        let params = self.params();
        SimulatedFill {
            outcome: SimOutcome::Reverted,
            slippage_bps: 0,
            actual_output: Decimal::ZERO,
            gas_used: if gas_estimate > 0 { gas_estimate } else { params.base_gas_used },
            sandwiched: false,
            error: Some("Forced revert (revert-test trade)".to_string()),
        }
    }
}
