//! Trade execution: engine and paper simulation

pub mod engine;
pub mod simulation;

pub use engine::*;
pub use simulation::*;
