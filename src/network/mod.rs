//! Network seams and retry policy

pub mod clients;
pub mod retry;

pub use clients::*;
pub use retry::*;
