//! Result persistence seams

pub mod ledger;
pub mod repository;

pub use ledger::*;
pub use repository::*;
