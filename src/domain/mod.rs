//! Core domain types and logic.

pub mod account;
pub mod backtest;
pub mod config_validation;
pub mod error;
pub mod execution;
pub mod metrics;
pub mod order;
pub mod risk;
pub mod session;
