//! Concrete adapter implementations for ports.

pub mod csv_journal_adapter;
pub mod file_config_adapter;
pub mod memory_journal_adapter;
pub mod mock_broker_adapter;
