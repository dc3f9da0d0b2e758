//! Nonce allocation under concurrency and desync recovery.

mod common;

use std::sync::Arc;

use omnidex_executor::nonce::NonceManager;
use omnidex_executor::types::Chain;

use common::{MockChainClient, WALLET};

#[tokio::test]
async fn concurrent_allocations_are_unique_and_contiguous() {
    let chain = Arc::new(MockChainClient::new().with_chain_nonce(7));
    let manager = Arc::new(NonceManager::new(chain.clone()));

    let mut handles = Vec::new();
    for _ in 0..20 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            manager.allocate(Chain::Base, WALLET).await
        }));
    }

    let mut nonces = Vec::new();
    for handle in handles {
        nonces.push(handle.await.unwrap());
    }
    nonces.sort_unstable();
    assert_eq!(nonces, (7..27).collect::<Vec<u64>>());

    // One authoritative fetch for the pair, no matter how many allocations.
    assert_eq!(chain.nonce_fetch_calls(), 1);

    let record = manager.record(Chain::Base, WALLET).await;
    assert_eq!(record.current_nonce, 7);
    assert_eq!(record.pending_count, 20);

    for nonce in 7..27 {
        manager.confirm(Chain::Base, WALLET, nonce).await;
    }
    let record = manager.record(Chain::Base, WALLET).await;
    assert_eq!(record.current_nonce, 27);
    assert_eq!(record.pending_count, 0);
    // In-order confirmations never trigger a resync.
    assert_eq!(chain.nonce_fetch_calls(), 1);
}

#[tokio::test]
async fn wallets_are_tracked_independently() {
    let other = "0x9999999999999999999999999999999999999999";
    let chain = Arc::new(MockChainClient::new().with_chain_nonce(3));
    let manager = NonceManager::new(chain);

    assert_eq!(manager.allocate(Chain::Base, WALLET).await, 3);
    assert_eq!(manager.allocate(Chain::Base, other).await, 3);
    assert_eq!(manager.allocate(Chain::Ethereum, WALLET).await, 3);
    assert_eq!(manager.allocate(Chain::Base, WALLET).await, 4);
}

#[tokio::test(start_paused = true)]
async fn failed_fetch_defaults_to_zero_and_keeps_allocating() {
    let chain = Arc::new(MockChainClient::new().failing_nonce_fetch());
    let manager = NonceManager::new(chain.clone());

    assert_eq!(manager.allocate(Chain::Base, WALLET).await, 0);
    assert_eq!(manager.allocate(Chain::Base, WALLET).await, 1);
    // The fetch was retried before giving up, then never repeated.
    assert_eq!(chain.nonce_fetch_calls(), 3);
}

#[tokio::test]
async fn out_of_order_confirmation_resyncs_from_chain() {
    let chain = Arc::new(MockChainClient::new().with_chain_nonce(5));
    let manager = NonceManager::new(chain.clone());

    assert_eq!(manager.allocate(Chain::Base, WALLET).await, 5);
    assert_eq!(manager.allocate(Chain::Base, WALLET).await, 6);

    // The wallet was used externally; chain state moved past our books.
    chain.set_chain_nonce(9);
    manager.confirm(Chain::Base, WALLET, 6).await;

    let record = manager.record(Chain::Base, WALLET).await;
    assert_eq!(record.current_nonce, 9);
    assert_eq!(record.pending_count, 0);
    assert_eq!(manager.allocate(Chain::Base, WALLET).await, 9);
}

#[tokio::test]
async fn failed_submission_releases_the_nonce() {
    let chain = Arc::new(MockChainClient::new().with_chain_nonce(5));
    let manager = NonceManager::new(chain);

    let nonce = manager.allocate(Chain::Base, WALLET).await;
    assert_eq!(nonce, 5);
    manager.fail(Chain::Base, WALLET, nonce).await;

    // The value was never consumed on-chain and must be handed out again.
    assert_eq!(manager.allocate(Chain::Base, WALLET).await, 5);
}

#[tokio::test]
async fn reset_forces_a_fresh_authoritative_read() {
    let chain = Arc::new(MockChainClient::new().with_chain_nonce(5));
    let manager = NonceManager::new(chain.clone());

    assert_eq!(manager.allocate(Chain::Base, WALLET).await, 5);
    chain.set_chain_nonce(42);
    manager.reset(Chain::Base, WALLET).await;

    let record = manager.record(Chain::Base, WALLET).await;
    assert_eq!(record.current_nonce, 42);
    assert_eq!(record.pending_count, 0);
    assert_eq!(manager.allocate(Chain::Base, WALLET).await, 42);
}

#[tokio::test(start_paused = true)]
async fn failed_resync_refetches_on_next_allocation() {
    let chain = Arc::new(MockChainClient::new().with_chain_nonce(5));
    let manager = NonceManager::new(chain.clone());

    assert_eq!(manager.allocate(Chain::Base, WALLET).await, 5);

    chain.set_nonce_fetch_fails(true);
    // Bogus confirmation forces a resync, which cannot reach the chain.
    manager.confirm(Chain::Base, WALLET, 99).await;
    let record = manager.record(Chain::Base, WALLET).await;
    assert!(!record.initialized);

    chain.set_nonce_fetch_fails(false);
    chain.set_chain_nonce(11);
    assert_eq!(manager.allocate(Chain::Base, WALLET).await, 11);
}
