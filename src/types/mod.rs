//! Core data types and structures

pub mod chain;
pub mod trade;
pub mod preview;
pub mod result;
pub mod nonce;
pub mod canary;

pub use chain::*;
pub use trade::*;
pub use preview::*;
pub use result::*;
pub use nonce::*;
pub use canary::*;
