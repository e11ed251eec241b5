//! Orders and the trades produced by filling them.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

/// Lifecycle of an order. Created by the caller, transitioned exactly once
/// per execution attempt by the engine; a rejected order may be re-submitted
/// by the caller on a later cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Created,
    Filled,
    Rejected,
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Created => write!(f, "created"),
            OrderStatus::Filled => write!(f, "filled"),
            OrderStatus::Rejected => write!(f, "rejected"),
        }
    }
}

/// A caller-supplied instruction to trade. `price` is the limit reference
/// only; the fill price always comes from the price source at execution time.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub volume: i64,
    pub price: f64,
    pub created_at: NaiveDateTime,
    pub status: OrderStatus,
    pub filled_volume: i64,
    pub filled_amount: f64,
}

impl Order {
    pub fn new(
        order_id: impl Into<String>,
        symbol: impl Into<String>,
        side: OrderSide,
        volume: i64,
        price: f64,
        created_at: NaiveDateTime,
    ) -> Self {
        Order {
            order_id: order_id.into(),
            symbol: symbol.into(),
            side,
            volume,
            price,
            created_at,
            status: OrderStatus::Created,
            filled_volume: 0,
            filled_amount: 0.0,
        }
    }
}

/// One successful fill. Immutable once recorded; owned by the account's
/// append-only trade log and also handed back to the execution caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
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
