//! Per-(chain, wallet) nonce allocation
//!
//! Guarantees a gap-free, collision-free nonce sequence per (chain, wallet)
//! pair under concurrent trade attempts, and recovers when local bookkeeping
//! disagrees with chain state. Locking is scoped strictly to the pair:
//! unrelated wallets proceed fully in parallel, and the outer map lock is
//! held only long enough to fetch or insert the pair's entry.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use crate::network::{retry_with_backoff, ChainClient, RetryConfig};
use crate::types::{Chain, NonceRecord};

type PairKey = (Chain, String);

pub struct NonceManager {
    chain_client: Arc<dyn ChainClient>,
    records: RwLock<HashMap<PairKey, Arc<Mutex<NonceRecord>>>>,
    retry: RetryConfig,
}

impl NonceManager {
    pub fn new(chain_client: Arc<dyn ChainClient>) -> Self {
        Self {
            chain_client,
            records: RwLock::new(HashMap::new()),
            retry: RetryConfig::default(),
        }
    }

    async fn entry(&self, chain: Chain, wallet: &str) -> Arc<Mutex<NonceRecord>> {
        let key = (chain, wallet.to_string());
        {
            let records = self.records.read().await;
            if let Some(entry) = records.get(&key) {
                return entry.clone();
            }
        }
        let mut records = self.records.write().await;
        records.entry(key).or_default().clone()
    }

    /// Authoritative pending nonce from the network. A failed read defaults
    /// to 0 with a warning rather than blocking allocation indefinitely; the
    /// chain will reject a wrong value and the caller retries.
    async fn fetch_pending(&self, chain: Chain, wallet: &str) -> Option<u64> {
        let client = self.chain_client.clone();
        let wallet_owned = wallet.to_string();
        let result = retry_with_backoff(
            || {
                let client = client.clone();
                let wallet = wallet_owned.clone();
                async move { client.pending_nonce(chain, &wallet).await }
            },
            &self.retry,
            "pending nonce fetch",
        )
        .await;

        match result {
            Ok(nonce) => Some(nonce),
            Err(e) => {
                warn!(%chain, wallet, error = %e, "Failed to fetch authoritative nonce");
                None
            }
        }
    }

    /// Hand out the next nonce for the pair and mark it pending. First use
    /// of a pair suspends while the authoritative pending nonce is fetched.
    pub async fn allocate(&self, chain: Chain, wallet: &str) -> u64 {
        let entry = self.entry(chain, wallet).await;
        let mut record = entry.lock().await;

        if !record.initialized {
            match self.fetch_pending(chain, wallet).await {
                Some(nonce) => {
                    record.current_nonce = nonce;
                    info!(%chain, wallet, nonce, "Initialized nonce from chain");
                }
                None => {
                    record.current_nonce = 0;
                    warn!(%chain, wallet, "Defaulting nonce to 0 after failed fetch");
                }
            }
            record.pending_count = 0;
            record.initialized = true;
        }

        let nonce = record.current_nonce + record.pending_count;
        record.pending_count += 1;
        debug!(%chain, wallet, nonce, pending = record.pending_count, "Allocated nonce");
        nonce
    }

    /// Mark an allocated nonce as confirmed on-chain. An out-of-order
    /// confirmation (or external wallet use) triggers recovery: re-read
    /// authoritative state and drop all pending bookkeeping, favoring a
    /// moment of unavailability over any collision risk.
    pub async fn confirm(&self, chain: Chain, wallet: &str, nonce: u64) {
        let entry = self.entry(chain, wallet).await;
        let mut record = entry.lock().await;

        if record.initialized && nonce == record.current_nonce {
            record.current_nonce += 1;
            record.pending_count = record.pending_count.saturating_sub(1);
            debug!(%chain, wallet, nonce, "Confirmed nonce");
            return;
        }

        warn!(
            %chain, wallet, nonce,
            expected = record.current_nonce,
            "Out-of-order nonce confirmation, resyncing from chain"
        );
        self.resync(chain, wallet, &mut record).await;
    }

    /// Release a nonce whose transaction was rejected before inclusion. The
    /// value was never consumed on-chain and is reusable.
    pub async fn fail(&self, chain: Chain, wallet: &str, nonce: u64) {
        let entry = self.entry(chain, wallet).await;
        let mut record = entry.lock().await;
        record.pending_count = record.pending_count.saturating_sub(1);
        debug!(%chain, wallet, nonce, pending = record.pending_count, "Released failed nonce");
    }

    /// Force a fresh authoritative read for the pair.
    pub async fn reset(&self, chain: Chain, wallet: &str) {
        let entry = self.entry(chain, wallet).await;
        let mut record = entry.lock().await;
        self.resync(chain, wallet, &mut record).await;
    }

    async fn resync(&self, chain: Chain, wallet: &str, record: &mut NonceRecord) {
        match self.fetch_pending(chain, wallet).await {
            Some(nonce) => {
                record.current_nonce = nonce;
                record.pending_count = 0;
                record.initialized = true;
                info!(%chain, wallet, nonce, "Nonce resynced from chain");
            }
            None => {
                // Leave the pair uninitialized so the next allocation
                // refetches instead of trusting stale local state.
                record.pending_count = 0;
                record.initialized = false;
                warn!(%chain, wallet, "Nonce resync failed, will refetch on next allocation");
            }
        }
    }

    /// Snapshot of a pair's bookkeeping, for diagnostics.
    pub async fn record(&self, chain: Chain, wallet: &str) -> NonceRecord {
        let entry = self.entry(chain, wallet).await;
        let record = entry.lock().await;
        record.clone()
    }
}
