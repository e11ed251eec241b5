//! CSV file journal adapter.
//!
//! Layout under the base directory:
//!
//! ```text
//! sessions/<session_id>/orders.csv     appended per execution step
//! sessions/<session_id>/trades.csv
//! sessions/<session_id>/equity.csv
//! backtests/<strategy_id>/<run_id>/equity.csv   written once per run
//! backtests/<strategy_id>/<run_id>/trades.csv
//! ```
//!
//! Session files are append-only; the header is written when the file is
//! first created.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use crate::domain::account::EquityPoint;
use crate::domain::error::TrademillError;
use crate::domain::order::{OrderSide, OrderStatus};
use crate::ports::journal_port::{EquitySnapshot, JournalPort, OrderRecord, TradeRecord};

pub struct CsvJournalAdapter {
    base_path: PathBuf,
}

#[derive(Serialize)]
struct OrderRow<'a> {
    session_id: &'a str,
    strategy_id: &'a str,
    logged_at: NaiveDateTime,
    order_id: &'a str,
    symbol: &'a str,
    side: OrderSide,
    volume: i64,
    price: f64,
    status: OrderStatus,
    filled_volume: i64,
    filled_amount: f64,
    created_at: NaiveDateTime,
}

#[derive(Serialize)]
struct TradeRow<'a> {
    session_id: &'a str,
    strategy_id: &'a str,
    logged_at: NaiveDateTime,
    trade_id: &'a str,
    order_id: &'a str,
    symbol: &'a str,
    side: OrderSide,
    volume: i64,
    price: f64,
    fee: f64,
    tax: f64,
    timestamp: NaiveDateTime,
}

#[derive(Serialize)]
struct EquityRow<'a> {
    session_id: &'a str,
    strategy_id: &'a str,
    timestamp: NaiveDateTime,
    cash: f64,
    equity: f64,
    positions: &'a str,
}

impl CsvJournalAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn session_file(&self, session_id: &str, name: &str) -> PathBuf {
        self.base_path.join("sessions").join(session_id).join(name)
    }

    fn run_dir(&self, strategy_id: &str, run_id: &str) -> PathBuf {
        self.base_path
            .join("backtests")
            .join(strategy_id)
            .join(run_id)
    }

    fn append_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), TrademillError> {
        if rows.is_empty() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let write_header = !path.exists();
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(write_header)
            .from_writer(file);
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), TrademillError> {
        let mut writer = csv::Writer::from_path(path)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl JournalPort for CsvJournalAdapter {
    fn write_orders(
        &self,
        session_id: &str,
        strategy_id: &str,
        dt: NaiveDateTime,
        orders: &[OrderRecord],
    ) -> Result<(), TrademillError> {
        let rows: Vec<OrderRow> = orders
            .iter()
            .map(|o| OrderRow {
                session_id,
                strategy_id,
                logged_at: dt,
                order_id: &o.order_id,
                symbol: &o.symbol,
                side: o.side,
                volume: o.volume,
                price: o.price,
                status: o.status,
                filled_volume: o.filled_volume,
                filled_amount: o.filled_amount,
                created_at: o.created_at,
            })
            .collect();
        Self::append_rows(&self.session_file(session_id, "orders.csv"), &rows)
    }

    fn write_trades(
        &self,
        session_id: &str,
        strategy_id: &str,
        dt: NaiveDateTime,
        trades: &[TradeRecord],
    ) -> Result<(), TrademillError> {
        let rows: Vec<TradeRow> = trades
            .iter()
            .map(|t| TradeRow {
                session_id,
                strategy_id,
                logged_at: dt,
                trade_id: &t.trade_id,
                order_id: &t.order_id,
                symbol: &t.symbol,
                side: t.side,
                volume: t.volume,
                price: t.price,
                fee: t.fee,
                tax: t.tax,
                timestamp: t.timestamp,
            })
            .collect();
        Self::append_rows(&self.session_file(session_id, "trades.csv"), &rows)
    }

    fn write_equity(
        &self,
        session_id: &str,
        strategy_id: &str,
        snapshot: &EquitySnapshot,
    ) -> Result<(), TrademillError> {
        let row = EquityRow {
            session_id,
            strategy_id,
            timestamp: snapshot.timestamp,
            cash: snapshot.cash,
            equity: snapshot.equity,
            positions: &snapshot.positions,
        };
        Self::append_rows(&self.session_file(session_id, "equity.csv"), &[row])
    }

    fn write_backtest(
        &self,
        strategy_id: &str,
        run_id: &str,
        run_date: NaiveDateTime,
        equity_curve: &[EquityPoint],
        trades: &[TradeRecord],
    ) -> Result<HashMap<String, PathBuf>, TrademillError> {
        let dir = self.run_dir(strategy_id, run_id);
        fs::create_dir_all(&dir)?;

        let equity_path = dir.join("equity.csv");
        Self::write_rows(&equity_path, equity_curve)?;

        let trades_path = dir.join("trades.csv");
        Self::write_rows(&trades_path, trades)?;

        log::info!(
            "backtest {} run {} ({}) persisted to {}",
            strategy_id,
            run_id,
            run_date.date(),
            dir.display()
        );

        let mut artifacts = HashMap::new();
        artifacts.insert("equity".to_string(), equity_path);
        artifacts.insert("trades".to_string(), trades_path);
        Ok(artifacts)
    }
}
