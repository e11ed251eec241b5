//! Port traits for external collaborators.

pub mod broker_port;
pub mod config_port;
pub mod journal_port;
