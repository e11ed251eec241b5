//! In-memory journal for tests and dry runs. Nothing touches disk; the
//! backtest artifact map points at synthetic paths.

use chrono::NaiveDateTime;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::domain::account::EquityPoint;
use crate::domain::error::TrademillError;
use crate::ports::journal_port::{EquitySnapshot, JournalPort, OrderRecord, TradeRecord};

#[derive(Debug, Clone)]
pub struct BacktestRun {
    pub strategy_id: String,
    pub run_id: String,
    pub run_date: NaiveDateTime,
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<TradeRecord>,
}

#[derive(Default)]
pub struct MemoryJournal {
    orders: RefCell<Vec<OrderRecord>>,
    trades: RefCell<Vec<TradeRecord>>,
    equity: RefCell<Vec<EquitySnapshot>>,
    backtests: RefCell<Vec<BacktestRun>>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn orders(&self) -> Vec<OrderRecord> {
        self.orders.borrow().clone()
    }

    pub fn trades(&self) -> Vec<TradeRecord> {
        self.trades.borrow().clone()
    }

    pub fn equity(&self) -> Vec<EquitySnapshot> {
        self.equity.borrow().clone()
    }

    pub fn backtests(&self) -> Vec<BacktestRun> {
        self.backtests.borrow().clone()
    }
}

impl JournalPort for MemoryJournal {
    fn write_orders(
        &self,
        _session_id: &str,
        _strategy_id: &str,
        _dt: NaiveDateTime,
        orders: &[OrderRecord],
    ) -> Result<(), TrademillError> {
        self.orders.borrow_mut().extend_from_slice(orders);
        Ok(())
    }

    fn write_trades(
        &self,
        _session_id: &str,
        _strategy_id: &str,
        _dt: NaiveDateTime,
        trades: &[TradeRecord],
    ) -> Result<(), TrademillError> {
        self.trades.borrow_mut().extend_from_slice(trades);
        Ok(())
    }

    fn write_equity(
        &self,
        _session_id: &str,
        _strategy_id: &str,
        snapshot: &EquitySnapshot,
    ) -> Result<(), TrademillError> {
        self.equity.borrow_mut().push(snapshot.clone());
        Ok(())
    }

    fn write_backtest(
        &self,
        strategy_id: &str,
        run_id: &str,
        run_date: NaiveDateTime,
        equity_curve: &[EquityPoint],
        trades: &[TradeRecord],
    ) -> Result<HashMap<String, PathBuf>, TrademillError> {
        self.backtests.borrow_mut().push(BacktestRun {
            strategy_id: strategy_id.to_string(),
            run_id: run_id.to_string(),
            run_date,
            equity_curve: equity_curve.to_vec(),
            trades: trades.to_vec(),
        });
        let mut artifacts = HashMap::new();
        artifacts.insert(
            "equity".to_string(),
            PathBuf::from(format!("memory/{}/{}/equity", strategy_id, run_id)),
        );
        artifacts.insert(
            "trades".to_string(),
            PathBuf::from(format!("memory/{}/{}/trades", strategy_id, run_id)),
        );
        Ok(artifacts)
    }
}
