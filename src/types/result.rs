//! Trade result and execution state machine

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use super::{Chain, TradeRequest, TradeType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Live,
    Paper,
}

/// Execution state machine. Status only ever advances forward through this
/// graph; `Cancelled` is reachable strictly before submission:
///
/// ```text
/// Pending -> Building -> Approving -> Executing -> Submitting -> Submitted
///    |           |           |            |            |            |
///    +-----------+-----------+------------+---- Failed/Cancelled    +-> Confirmed
///                                                      |            +-> Reverted
///                                                   (no Cancelled)  +-> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeStatus {
    Pending,
    Building,
    Approving,
    Executing,
    Submitting,
    Submitted,
    Confirmed,
    Failed,
    Reverted,
    Cancelled,
}

impl TradeStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TradeStatus::Confirmed
                | TradeStatus::Failed
                | TradeStatus::Reverted
                | TradeStatus::Cancelled
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TradeStatus::Confirmed)
    }

    /// True while the trade has not been handed to the network, i.e. while
    /// cancellation is still honored.
    pub fn is_pre_submission(&self) -> bool {
        matches!(
            self,
            TradeStatus::Pending
                | TradeStatus::Building
                | TradeStatus::Approving
                | TradeStatus::Executing
        )
    }

    pub fn can_transition_to(&self, next: TradeStatus) -> bool {
        use TradeStatus::*;
        match self {
            Pending => matches!(next, Building | Failed | Cancelled),
            Building => matches!(next, Approving | Failed | Cancelled),
            Approving => matches!(next, Executing | Failed | Cancelled),
            Executing => matches!(next, Submitting | Failed | Cancelled),
            Submitting => matches!(next, Submitted | Failed),
            Submitted => matches!(next, Confirmed | Reverted | Failed),
            Confirmed | Failed | Reverted | Cancelled => false,
        }
    }
}

impl std::fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TradeStatus::Pending => "PENDING",
            TradeStatus::Building => "BUILDING",
            TradeStatus::Approving => "APPROVING",
            TradeStatus::Executing => "EXECUTING",
            TradeStatus::Submitting => "SUBMITTING",
            TradeStatus::Submitted => "SUBMITTED",
            TradeStatus::Confirmed => "CONFIRMED",
            TradeStatus::Failed => "FAILED",
            TradeStatus::Reverted => "REVERTED",
            TradeStatus::Cancelled => "CANCELLED",
        };
        write!(f, "{}", s)
    }
}

/// Mutable execution record, owned exclusively by the executing flow until
/// it reaches a terminal status, then handed to the ledger and repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeResult {
    pub trace_id: String,
    pub mode: ExecutionMode,
    pub chain: Chain,
    pub dex: String,
    pub token_in: String,
    pub token_out: String,
    pub amount_in: Decimal,
    pub route: Vec<String>,
    pub trade_type: TradeType,
    pub status: TradeStatus,
    /// Every status this trade passed through, in order. The last entry is
    /// always `status`.
    pub status_history: Vec<TradeStatus>,
    pub tx_hash: Option<String>,
    pub block_number: Option<u64>,
    pub gas_used: Option<u64>,
    pub actual_output: Option<Decimal>,
    pub actual_price: Option<Decimal>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl TradeResult {
    pub fn new(request: &TradeRequest, mode: ExecutionMode) -> Self {
        Self {
            trace_id: uuid::Uuid::new_v4().to_string(),
            mode,
            chain: request.chain,
            dex: request.dex.clone(),
            token_in: request.token_in.clone(),
            token_out: request.token_out.clone(),
            amount_in: request.amount_in,
            route: request.route.clone(),
            trade_type: request.trade_type,
            status: TradeStatus::Pending,
            status_history: vec![TradeStatus::Pending],
            tx_hash: None,
            block_number: None,
            gas_used: None,
            actual_output: None,
            actual_price: None,
            error_message: None,
            started_at: Utc::now(),
            duration_ms: 0,
        }
    }

    /// Advance the state machine. Illegal edges are rejected so a terminal
    /// result can never regress.
    pub fn transition(&mut self, next: TradeStatus) -> Result<(), crate::errors::EngineError> {
        if !self.status.can_transition_to(next) {
            return Err(crate::errors::EngineError::InvalidTransition {
                trace_id: self.trace_id.clone(),
                from: self.status,
                to: next,
            });
        }
        tracing::debug!(trace_id = %self.trace_id, from = %self.status, to = %next, "Trade status transition");
        self.status = next;
        self.status_history.push(next);
        Ok(())
    }
}
