//! Trade execution ledger

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use tracing::info;
use crate::types::TradeResult;

/// Sink for completed executions. The executor writes every terminal
/// result exactly once, success or failure, tagged with its mode.
#[async_trait]
pub trait TradeLedger: Send + Sync {
    async fn record(&self, result: &TradeResult) -> Result<()>;
}

/// Day-partitioned JSONL files, one line per completed trade.
pub struct JsonlLedger {
    dir: PathBuf,
}

impl JsonlLedger {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }
}

#[async_trait]
impl TradeLedger for JsonlLedger {
    async fn record(&self, result: &TradeResult) -> Result<()> {
        let filename = self
            .dir
            .join(format!("trades_{}.jsonl", Utc::now().format("%Y-%m-%d")));

        let line = serde_json::to_string(result)?;
        let path = filename.clone();
        // File append is quick but still blocking; keep it off the runtime.
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
            writeln!(file, "{}", line)?;
            Ok(())
        })
        .await??;

        info!(
            trace_id = %result.trace_id,
            status = %result.status,
            mode = ?result.mode,
            "Recorded trade execution"
        );
        Ok(())
    }
}
