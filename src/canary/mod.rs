//! Canary token validation

pub mod validator;

pub use validator::*;
