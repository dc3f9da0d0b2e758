//! Historical trade results behind `status()` lookups

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use crate::types::TradeResult;

#[async_trait]
pub trait TradeRepository: Send + Sync {
    async fn save(&self, result: &TradeResult) -> Result<()>;
    async fn find(&self, trace_id: &str) -> Result<Option<TradeResult>>;
}

/// Process-local history. Swap for a database-backed implementation at the
/// composition root when durability is required.
#[derive(Default)]
pub struct InMemoryTradeRepository {
    inner: RwLock<HashMap<String, TradeResult>>,
}

impl InMemoryTradeRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TradeRepository for InMemoryTradeRepository {
    async fn save(&self, result: &TradeResult) -> Result<()> {
        self.inner
            .write()
            .await
            .insert(result.trace_id.clone(), result.clone());
        Ok(())
    }

    async fn find(&self, trace_id: &str) -> Result<Option<TradeResult>> {
        Ok(self.inner.read().await.get(trace_id).cloned())
    }
}
