//! Broker port for live execution.
//!
//! A broker produces its own trades; the session settles them into the
//! ledger with the same debit/credit and lot rules as sandbox fills, so
//! risk evaluation downstream cannot tell the adapters apart.

use chrono::NaiveDateTime;

use crate::domain::error::TrademillError;
use crate::domain::order::{Order, Trade};

/// Broker connection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerConfig {
    pub provider: String,
    pub account: String,
    pub base_url: String,
    pub api_key: String,
}

impl BrokerConfig {
    pub fn new(provider: impl Into<String>, account: impl Into<String>) -> Self {
        BrokerConfig {
            provider: provider.into(),
            account: account.into(),
            base_url: String::new(),
            api_key: String::new(),
        }
    }
}

pub trait BrokerPort {
    /// Submit orders and return the broker's fills.
    fn submit_orders(
        &mut self,
        orders: &[Order],
        dt: NaiveDateTime,
    ) -> Result<Vec<Trade>, TrademillError>;

    /// Reconcile broker-side positions, if the provider needs it.
    fn sync_positions(&mut self) -> Result<(), TrademillError>;
}
