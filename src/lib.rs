//! Omnidex Executor - Multi-chain trade execution core
//!
//! Turns a validated trade intent into a safely-ordered on-chain transaction,
//! in either live or paper mode: gap-free nonce allocation per (chain, wallet),
//! a multi-stage execution state machine with identical live/paper status
//! sequences, and canary probing of unfamiliar tokens for honeypots and
//! hidden taxes.

pub mod config;
pub mod types;
pub mod errors;
pub mod network;
pub mod nonce;
pub mod canary;
pub mod execution;
pub mod storage;
pub mod utils;

// Re-export commonly used items
pub use config::Config;
pub use errors::{EngineError, EngineResult};
pub use types::*;
