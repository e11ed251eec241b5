//! Simulated broker for live-mode wiring without a provider account.
//!
//! Fills every order instantly at the quoted price with zero fee and tax.
//! Orders without a usable quote are left untouched, mirroring how a real
//! provider would report no execution.

use chrono::NaiveDateTime;

use crate::domain::error::TrademillError;
use crate::domain::execution::PriceSource;
use crate::domain::order::{Order, OrderStatus, Trade};
use crate::ports::broker_port::{BrokerConfig, BrokerPort};

pub struct MockBroker {
    config: BrokerConfig,
    quotes: Box<dyn PriceSource>,
}

impl MockBroker {
    pub fn new(config: BrokerConfig, quotes: impl PriceSource + 'static) -> Self {
        MockBroker {
            config,
            quotes: Box::new(quotes),
        }
    }
}

impl BrokerPort for MockBroker {
    fn submit_orders(
        &mut self,
        orders: &[Order],
        dt: NaiveDateTime,
    ) -> Result<Vec<Trade>, TrademillError> {
        let mut fills = Vec::new();
        for order in orders {
            if order.status != OrderStatus::Created {
                continue;
            }
            let price = self.quotes.price(&order.symbol, order.side);
            if price <= 0.0 {
                log::debug!("no quote for {}, order {} skipped", order.symbol, order.order_id);
                continue;
            }
            fills.push(Trade {
                trade_id: format!("live-{}", order.order_id),
                order_id: order.order_id.clone(),
                symbol: order.symbol.clone(),
                side: order.side,
                volume: order.volume,
                price,
                fee: 0.0,
                tax: 0.0,
                timestamp: dt,
            });
        }
        log::debug!(
            "mock broker {} filled {}/{} orders",
            self.config.account,
            fills.len(),
            orders.len()
        );
        Ok(fills)
    }

    fn sync_positions(&mut self) -> Result<(), TrademillError> {
        // Nothing to reconcile; fills are already final.
        Ok(())
    }
}
