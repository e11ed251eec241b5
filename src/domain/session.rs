//! Incremental trading session: one ExecutionEngine call per cycle, with
//! order/trade/equity records forwarded to an injected journal.
//!
//! The execution mode decides where fills originate — the local matching
//! engine (sandbox) or an external broker (live) — but never changes the
//! ledger bookkeeping: live fills are settled through the same debit/credit
//! and lot rules, so the resulting account invariants are identical.

use chrono::NaiveDateTime;

use super::account::{Account, PositionSnapshot};
use super::error::TrademillError;
use super::execution::{ExecutionConfig, ExecutionEngine, PriceSource};
use super::order::{Order, OrderSide, OrderStatus, Trade};
use super::risk::{records_from_curve, RiskDecision, RiskPolicy};
use crate::ports::broker_port::BrokerPort;
use crate::ports::journal_port::{EquitySnapshot, JournalPort, OrderRecord, TradeRecord};

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub session_id: String,
    pub strategy_id: String,
    pub initial_cash: f64,
}

impl SessionConfig {
    pub fn new(session_id: impl Into<String>, strategy_id: impl Into<String>) -> Self {
        SessionConfig {
            session_id: session_id.into(),
            strategy_id: strategy_id.into(),
            initial_cash: 1_000_000.0,
        }
    }

    pub fn with_initial_cash(mut self, initial_cash: f64) -> Self {
        self.initial_cash = initial_cash;
        self
    }
}

/// Where fills come from. Sandbox reuses the local matching engine; live
/// delegates submission to a broker.
pub enum ExecutionMode {
    Sandbox,
    Live(Box<dyn BrokerPort>),
}

pub struct TradingSession<'a> {
    pub config: SessionConfig,
    pub account: Account,
    engine: ExecutionEngine,
    mode: ExecutionMode,
    journal: &'a dyn JournalPort,
}

impl<'a> TradingSession<'a> {
    pub fn new(
        config: SessionConfig,
        execution_config: ExecutionConfig,
        journal: &'a dyn JournalPort,
    ) -> Self {
        Self::with_mode(config, execution_config, journal, ExecutionMode::Sandbox)
    }

    pub fn with_mode(
        config: SessionConfig,
        execution_config: ExecutionConfig,
        journal: &'a dyn JournalPort,
        mode: ExecutionMode,
    ) -> Self {
        let account = Account::new(config.initial_cash);
        TradingSession {
            config,
            account,
            engine: ExecutionEngine::new(execution_config),
            mode,
            journal,
        }
    }

    /// Execute one order batch, journal the outcome, and extend the equity
    /// curve. Exactly one engine (or broker) call per invocation.
    pub fn execute(
        &mut self,
        dt: NaiveDateTime,
        orders: &mut [Order],
        prices: &dyn PriceSource,
    ) -> Result<Vec<Trade>, TrademillError> {
        let trades = match &mut self.mode {
            ExecutionMode::Sandbox => {
                self.engine
                    .execute(&mut self.account, orders, prices, dt)?
            }
            ExecutionMode::Live(broker) => {
                let fills = broker.submit_orders(orders, dt)?;
                for trade in &fills {
                    settle_live_trade(&mut self.account, &self.engine.config, trade, orders)?;
                }
                broker.sync_positions()?;
                log::info!(
                    "live execution settled {} fills for session {}",
                    fills.len(),
                    self.config.session_id
                );
                fills
            }
        };
        self.record(dt, orders, &trades, prices)?;
        Ok(trades)
    }

    pub fn snapshot_positions(&self) -> Vec<PositionSnapshot> {
        self.account.snapshot_positions()
    }

    /// Judge the session's current state against a risk policy.
    pub fn evaluate_risk(&self, policy: &RiskPolicy) -> RiskDecision {
        policy.evaluate(
            &records_from_curve(&self.account.equity_curve),
            &self.account.snapshot_positions(),
        )
    }

    fn record(
        &mut self,
        dt: NaiveDateTime,
        orders: &[Order],
        trades: &[Trade],
        prices: &dyn PriceSource,
    ) -> Result<(), TrademillError> {
        let order_records: Vec<OrderRecord> = orders.iter().map(OrderRecord::from).collect();
        self.journal.write_orders(
            &self.config.session_id,
            &self.config.strategy_id,
            dt,
            &order_records,
        )?;

        let trade_records: Vec<TradeRecord> = trades.iter().map(TradeRecord::from).collect();
        self.journal.write_trades(
            &self.config.session_id,
            &self.config.strategy_id,
            dt,
            &trade_records,
        )?;

        let equity = self.compute_equity(prices);
        let positions =
            serde_json::to_string(&self.account.snapshot_positions()).map_err(|e| {
                TrademillError::Journal {
                    reason: format!("position snapshot serialization failed: {e}"),
                }
            })?;
        self.account.record_equity(dt, equity);
        self.journal.write_equity(
            &self.config.session_id,
            &self.config.strategy_id,
            &EquitySnapshot {
                timestamp: dt,
                cash: self.account.cash,
                equity,
                positions,
            },
        )
    }

    /// Cash plus positions marked at the sell-side quote; a position without
    /// a usable quote is valued at its weighted cost price.
    fn compute_equity(&self, prices: &dyn PriceSource) -> f64 {
        let mut equity = self.account.cash;
        for position in self.account.positions.values() {
            let volume = position.volume();
            if volume == 0 {
                continue;
            }
            let quote = prices.price(&position.symbol, OrderSide::Sell);
            let price = if quote > 0.0 {
                quote
            } else {
                position.cost_price()
            };
            equity += volume as f64 * price;
        }
        equity
    }
}

/// Apply a broker fill to the ledger with sandbox bookkeeping rules. A fill
/// the ledger cannot absorb is a fatal invariant violation — the broker
/// already executed it, so rejecting is not an option.
fn settle_live_trade(
    account: &mut Account,
    config: &ExecutionConfig,
    trade: &Trade,
    orders: &mut [Order],
) -> Result<(), TrademillError> {
    let notional = trade.price * trade.volume as f64;
    match trade.side {
        OrderSide::Buy => {
            let total_cost = notional + trade.fee + trade.tax;
            if account.cash < total_cost {
                return Err(TrademillError::LedgerInvariant {
                    reason: format!(
                        "live buy of {} needs {:.2} but cash is {:.2}",
                        trade.symbol, total_cost, account.cash
                    ),
                });
            }
            account.cash -= total_cost;
            account
                .position_mut(&trade.symbol)
                .add_lot(trade.volume, trade.price, trade.timestamp);
        }
        OrderSide::Sell => {
            let cutoff = if config.allow_same_day_sell {
                None
            } else {
                Some(trade.timestamp)
            };
            let position = account.positions.get_mut(&trade.symbol).ok_or_else(|| {
                TrademillError::LedgerInvariant {
                    reason: format!("live sell of {} without a position", trade.symbol),
                }
            })?;
            position.remove_volume(trade.volume, cutoff)?;
            let drained = position.is_empty();
            account.cash += notional - trade.fee - trade.tax;
            if drained {
                account.positions.remove(&trade.symbol);
            }
        }
    }
    account.trades.push(trade.clone());

    if let Some(order) = orders
        .iter_mut()
        .find(|order| order.order_id == trade.order_id)
    {
        order.status = OrderStatus::Filled;
        order.filled_volume = trade.volume;
        order.filled_amount = notional;
    }
    Ok(())
}
