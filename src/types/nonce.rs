//! Nonce bookkeeping types

use serde::Serialize;

/// Per-(chain, wallet) sequence state. Mutated only under the lock scoped to
/// its own pair; the next allocated nonce is always
/// `current_nonce + pending_count`.
#[derive(Debug, Clone, Serialize, Default)]
pub struct NonceRecord {
    /// Next network-confirmed-safe value, lazily fetched on first use.
    pub current_nonce: u64,
    /// Allocated but not yet confirmed or failed.
    pub pending_count: u64,
    /// False until the authoritative pending nonce has been read (or the
    /// read failed and we defaulted), and again after a failed recovery.
    pub initialized: bool,
}
