//! Persistence port for execution records.
//!
//! The core fixes only the record shapes; adapters decide the storage
//! format. All record fields mirror what the execution step produced —
//! the journal never recomputes anything.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::domain::account::EquityPoint;
use crate::domain::error::TrademillError;
use crate::domain::order::{Order, OrderSide, OrderStatus, Trade};

/// Order state after one execution step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRecord {
    pub order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub volume: i64,
    pub price: f64,
    pub status: OrderStatus,
    pub filled_volume: i64,
    pub filled_amount: f64,
    pub created_at: NaiveDateTime,
}

impl From<&Order> for OrderRecord {
    fn from(order: &Order) -> Self {
        OrderRecord {
            order_id: order.order_id.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            volume: order.volume,
            price: order.price,
            status: order.status,
            filled_volume: order.filled_volume,
            filled_amount: order.filled_amount,
            created_at: order.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeRecord {
    pub trade_id: String,
    pub order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub volume: i64,
    pub price: f64,
    pub fee: f64,
    pub tax: f64,
    pub timestamp: NaiveDateTime,
}

impl From<&Trade> for TradeRecord {
    fn from(trade: &Trade) -> Self {
        TradeRecord {
            trade_id: trade.trade_id.clone(),
            order_id: trade.order_id.clone(),
            symbol: trade.symbol.clone(),
            side: trade.side,
            volume: trade.volume,
            price: trade.price,
            fee: trade.fee,
            tax: trade.tax,
            timestamp: trade.timestamp,
        }
    }
}

/// Account state after one execution step. `positions` is the
/// JSON-serialized position snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EquitySnapshot {
    pub timestamp: NaiveDateTime,
    pub cash: f64,
    pub equity: f64,
    pub positions: String,
}

pub trait JournalPort {
    fn write_orders(
        &self,
        session_id: &str,
        strategy_id: &str,
        dt: NaiveDateTime,
        orders: &[OrderRecord],
    ) -> Result<(), TrademillError>;

    fn write_trades(
        &self,
        session_id: &str,
        strategy_id: &str,
        dt: NaiveDateTime,
        trades: &[TradeRecord],
    ) -> Result<(), TrademillError>;

    fn write_equity(
        &self,
        session_id: &str,
        strategy_id: &str,
        snapshot: &EquitySnapshot,
    ) -> Result<(), TrademillError>;

    /// Persist a completed backtest run; returns the artifact locations
    /// keyed by artifact kind (e.g. "equity", "trades").
    fn write_backtest(
        &self,
        strategy_id: &str,
        run_id: &str,
        run_date: NaiveDateTime,
        equity_curve: &[EquityPoint],
        trades: &[TradeRecord],
    ) -> Result<HashMap<String, PathBuf>, TrademillError>;
}
