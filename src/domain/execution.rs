//! Order matching against the account ledger.
//!
//! Fees follow the A-share convention: symmetric commission (with a floor)
//! and transfer fee, sell-only stamp duty, and T+1 settlement unless
//! same-day selling is explicitly enabled.

use chrono::NaiveDateTime;

use super::account::Account;
use super::error::TrademillError;
use super::order::{Order, OrderSide, OrderStatus, Trade};

/// Fee and settlement parameters, fixed per engine instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionConfig {
    pub commission_rate: f64,
    pub min_commission: f64,
    pub stamp_duty_rate: f64,
    pub transfer_fee_rate: f64,
    pub allow_same_day_sell: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            commission_rate: 0.0003,
            min_commission: 5.0,
            stamp_duty_rate: 0.001,
            transfer_fee_rate: 0.00002,
            allow_same_day_sell: false,
        }
    }
}

/// Quote source for fills. A price ≤ 0 means "no quote": the order is
/// skipped without any status change.
pub trait PriceSource {
    fn price(&self, symbol: &str, side: OrderSide) -> f64;
}

impl<F> PriceSource for F
where
    F: Fn(&str, OrderSide) -> f64,
{
    fn price(&self, symbol: &str, side: OrderSide) -> f64 {
        self(symbol, side)
    }
}

/// Matches order batches against an account at a point in time.
#[derive(Debug, Clone, Default)]
pub struct ExecutionEngine {
    pub config: ExecutionConfig,
}

impl ExecutionEngine {
    pub fn new(config: ExecutionConfig) -> Self {
        ExecutionEngine { config }
    }

    /// Execute `orders` in caller-supplied sequence. No re-prioritization by
    /// price or side happens here; within one timestamp the caller's order
    /// is the matching order.
    ///
    /// Rejections are signalled through `Order.status` and never stop the
    /// batch. `Err` is reserved for ledger invariant violations.
    pub fn execute(
        &self,
        account: &mut Account,
        orders: &mut [Order],
        prices: &dyn PriceSource,
        trading_dt: NaiveDateTime,
    ) -> Result<Vec<Trade>, TrademillError> {
        let mut trades = Vec::new();
        for order in orders.iter_mut() {
            let price = prices.price(&order.symbol, order.side);
            if price <= 0.0 {
                // No quote means no fill and no rejection; the order may
                // still fill on a later cycle.
                continue;
            }
            let trade = match order.side {
                OrderSide::Buy => self.execute_buy(account, order, price, trading_dt),
                OrderSide::Sell => self.execute_sell(account, order, price, trading_dt)?,
            };
            if let Some(trade) = trade {
                trades.push(trade);
            }
        }
        Ok(trades)
    }

    fn commission(&self, notional: f64) -> f64 {
        (notional * self.config.commission_rate).max(self.config.min_commission)
    }

    fn execute_buy(
        &self,
        account: &mut Account,
        order: &mut Order,
        price: f64,
        trading_dt: NaiveDateTime,
    ) -> Option<Trade> {
        let notional = price * order.volume as f64;
        let commission = self.commission(notional);
        let transfer_fee = notional * self.config.transfer_fee_rate;
        let total_cost = notional + commission + transfer_fee;

        if account.cash < total_cost {
            order.status = OrderStatus::Rejected;
            return None;
        }

        account.cash -= total_cost;
        account
            .position_mut(&order.symbol)
            .add_lot(order.volume, price, trading_dt);

        let trade = Trade {
            trade_id: format!("trade-{}", order.order_id),
            order_id: order.order_id.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            volume: order.volume,
            price,
            fee: commission + transfer_fee,
            tax: 0.0,
            timestamp: trading_dt,
        };
        account.trades.push(trade.clone());

        order.status = OrderStatus::Filled;
        order.filled_volume = order.volume;
        order.filled_amount = notional;
        log::debug!(
            "filled buy {} {}x{} @ {}",
            order.order_id,
            order.symbol,
            order.volume,
            price
        );
        Some(trade)
    }

    fn execute_sell(
        &self,
        account: &mut Account,
        order: &mut Order,
        price: f64,
        trading_dt: NaiveDateTime,
    ) -> Result<Option<Trade>, TrademillError> {
        let cutoff = if self.config.allow_same_day_sell {
            None
        } else {
            Some(trading_dt)
        };

        let available = match account.positions.get(&order.symbol) {
            None => {
                order.status = OrderStatus::Rejected;
                return Ok(None);
            }
            Some(position) => position.available_volume(cutoff),
        };
        if available < order.volume {
            order.status = OrderStatus::Rejected;
            return Ok(None);
        }

        let notional = price * order.volume as f64;
        let commission = self.commission(notional);
        let transfer_fee = notional * self.config.transfer_fee_rate;
        let stamp_duty = notional * self.config.stamp_duty_rate;

        let position = account
            .positions
            .get_mut(&order.symbol)
            .ok_or_else(|| TrademillError::LedgerInvariant {
                reason: format!("position {} vanished during sell", order.symbol),
            })?;
        position.remove_volume(order.volume, cutoff)?;
        let drained = position.is_empty();

        account.cash += notional - commission - transfer_fee - stamp_duty;
        if drained {
            account.positions.remove(&order.symbol);
        }

        let trade = Trade {
            trade_id: format!("trade-{}", order.order_id),
            order_id: order.order_id.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            volume: order.volume,
            price,
            fee: commission + transfer_fee,
            tax: stamp_duty,
            timestamp: trading_dt,
        };
        account.trades.push(trade.clone());

        order.status = OrderStatus::Filled;
        order.filled_volume = order.volume;
        order.filled_amount = notional;
        log::debug!(
            "filled sell {} {}x{} @ {}",
            order.order_id,
            order.symbol,
            order.volume,
            price
        );
        Ok(Some(trade))
    }
}
