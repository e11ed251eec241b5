//! Historical replay over grouped market bars.
//!
//! Bars arrive in arbitrary order, are grouped by trading timestamp, and
//! replayed strictly ascending. Orders dated for a bar fill at that bar's
//! open — no same-bar foresight — while end-of-day valuation uses the close.

use chrono::{NaiveDateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use super::account::Account;
use super::error::TrademillError;
use super::execution::{ExecutionConfig, ExecutionEngine, PriceSource};
use super::metrics::Metrics;
use super::order::{Order, OrderSide, Trade};
use crate::ports::journal_port::{JournalPort, TradeRecord};

/// One market bar for one symbol at one trading timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub symbol: String,
    pub dt: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

/// Produces the orders to execute at one timestamp. Invoked once per
/// ascending timestamp with that timestamp's bars and the current account.
pub trait SignalSource {
    fn orders(
        &mut self,
        dt: NaiveDateTime,
        bars: &HashMap<String, Bar>,
        account: &Account,
    ) -> Vec<Order>;
}

impl<F> SignalSource for F
where
    F: FnMut(NaiveDateTime, &HashMap<String, Bar>, &Account) -> Vec<Order>,
{
    fn orders(
        &mut self,
        dt: NaiveDateTime,
        bars: &HashMap<String, Bar>,
        account: &Account,
    ) -> Vec<Order> {
        self(dt, bars, account)
    }
}

#[derive(Debug)]
pub struct BacktestResult {
    pub account: Account,
    pub trades: Vec<Trade>,
    pub metrics: Option<Metrics>,
    pub artifacts: HashMap<String, PathBuf>,
}

/// Full historical replay sharing engine and ledger semantics with the
/// incremental trading session.
pub struct BacktestRunner {
    initial_cash: f64,
    engine: ExecutionEngine,
}

impl BacktestRunner {
    pub fn new(initial_cash: f64, execution_config: ExecutionConfig) -> Self {
        BacktestRunner {
            initial_cash,
            engine: ExecutionEngine::new(execution_config),
        }
    }

    /// Replay `bars` against `signals`, journaling artifacts when a journal
    /// is supplied.
    pub fn run(
        &self,
        bars: &[Bar],
        signals: &mut dyn SignalSource,
        strategy_id: &str,
        run_id: Option<&str>,
        journal: Option<&dyn JournalPort>,
    ) -> Result<BacktestResult, TrademillError> {
        let mut grouped: BTreeMap<NaiveDateTime, HashMap<String, Bar>> = BTreeMap::new();
        for bar in bars {
            grouped
                .entry(bar.dt)
                .or_default()
                .insert(bar.symbol.clone(), bar.clone());
        }

        let mut account = Account::new(self.initial_cash);
        let mut all_trades: Vec<Trade> = Vec::new();

        for (&dt, day_bars) in &grouped {
            let mut orders = signals.orders(dt, day_bars, &account);
            let prices = BarPrices { bars: day_bars };
            let trades = self
                .engine
                .execute(&mut account, &mut orders, &prices, dt)?;
            all_trades.extend(trades);

            account.prune_empty_positions();
            let mut equity = account.cash;
            for position in account.positions.values() {
                let value_price = day_bars
                    .get(&position.symbol)
                    .map(|bar| bar.close)
                    .unwrap_or_else(|| position.cost_price());
                equity += position.volume() as f64 * value_price;
            }
            account.record_equity(dt, equity);
        }

        let metrics = Metrics::compute(&account.equity_curve);
        let mut artifacts = HashMap::new();
        if let Some(journal) = journal {
            let run_identifier = run_id
                .map(str::to_string)
                .unwrap_or_else(generate_run_id);
            let run_date = grouped
                .keys()
                .next_back()
                .copied()
                .unwrap_or_else(|| Utc::now().naive_utc());
            let trade_records: Vec<TradeRecord> =
                all_trades.iter().map(TradeRecord::from).collect();
            artifacts = journal.write_backtest(
                strategy_id,
                &run_identifier,
                run_date,
                &account.equity_curve,
                &trade_records,
            )?;
        }

        Ok(BacktestResult {
            account,
            trades: all_trades,
            metrics,
            artifacts,
        })
    }
}

/// Fill at the bar's open; symbols without a bar get no quote. A held
/// position whose bar is missing is valued at its cost basis.
struct BarPrices<'a> {
    bars: &'a HashMap<String, Bar>,
}

impl PriceSource for BarPrices<'_> {
    fn price(&self, symbol: &str, _side: OrderSide) -> f64 {
        self.bars.get(symbol).map(|bar| bar.open).unwrap_or(0.0)
    }
}

fn generate_run_id() -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64 + d.as_secs().wrapping_mul(1_000_000_000))
        .unwrap_or(0);
    format!("run-{:08x}", (nanos & 0xffff_ffff) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(day: u32) -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2024, 7, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn bar(symbol: &str, day: u32, open: f64, close: f64) -> Bar {
        Bar {
            symbol: symbol.to_string(),
            dt: dt(day),
            open,
            high: open.max(close) + 0.1,
            low: open.min(close) - 0.1,
            close,
            volume: 1_000_000,
        }
    }

    fn buy_then_sell(buy_day: u32, sell_day: u32) -> impl SignalSource {
        move |at: NaiveDateTime, bars: &HashMap<String, Bar>, account: &Account| {
            let mut orders = Vec::new();
            if at == dt(buy_day) && !account.positions.contains_key("600000.SH") {
                let open = bars["600000.SH"].open;
                orders.push(Order::new("buy", "600000.SH", OrderSide::Buy, 1000, open, at));
            }
            if at == dt(sell_day) {
                let open = bars["600000.SH"].open;
                orders.push(Order::new("sell", "600000.SH", OrderSide::Sell, 1000, open, at));
            }
            orders
        }
    }

    #[test]
    fn replay_generates_ascending_equity_curve() {
        // Bars deliberately out of order; grouping must sort them.
        let bars = vec![
            bar("600000.SH", 3, 10.9, 10.7),
            bar("600000.SH", 1, 10.0, 10.5),
            bar("600000.SH", 2, 10.6, 10.8),
        ];
        let runner = BacktestRunner::new(100_000.0, ExecutionConfig::default());
        let mut signals = buy_then_sell(1, 3);
        let result = runner
            .run(&bars, &mut signals, "demo", Some("unit-test"), None)
            .unwrap();

        assert_eq!(result.account.equity_curve.len(), 3);
        assert_eq!(result.account.equity_curve[0].timestamp, dt(1));
        assert_eq!(result.account.equity_curve[2].timestamp, dt(3));
        assert!(!result.account.positions.contains_key("600000.SH"));
        assert_eq!(result.trades.len(), 2);
        assert_eq!(result.trades[1].side, OrderSide::Sell);
        assert!(result.metrics.is_some());
        assert!(result.artifacts.is_empty());
    }

    #[test]
    fn fills_at_open_values_at_close() {
        let bars = vec![bar("600000.SH", 1, 10.0, 10.5)];
        let runner = BacktestRunner::new(100_000.0, ExecutionConfig::default());
        let mut signals = |at: NaiveDateTime, day_bars: &HashMap<String, Bar>, _: &Account| {
            let open = day_bars["600000.SH"].open;
            vec![Order::new("b1", "600000.SH", OrderSide::Buy, 1000, open, at)]
        };
        let result = runner
            .run(&bars, &mut signals, "demo", None, None)
            .unwrap();

        // Bought 1000 @ 10.0 open (cost 10005.2), valued at 10.5 close:
        // equity = 89994.8 + 10500 = 100494.8
        assert!((result.trades[0].price - 10.0).abs() < f64::EPSILON);
        let equity = result.account.equity_curve[0].equity;
        assert!((equity - 100_494.8).abs() < 1e-9, "equity {}", equity);
    }

    #[test]
    fn rejected_signal_orders_do_not_halt_replay() {
        let bars = vec![
            bar("600000.SH", 1, 10.0, 10.5),
            bar("600000.SH", 2, 10.6, 10.8),
        ];
        let runner = BacktestRunner::new(100.0, ExecutionConfig::default());
        let mut attempted = Vec::new();
        let mut signals = |at: NaiveDateTime, day_bars: &HashMap<String, Bar>, _: &Account| {
            let open = day_bars["600000.SH"].open;
            let order = Order::new(
                format!("b{}", at.and_utc().timestamp()),
                "600000.SH",
                OrderSide::Buy,
                1000,
                open,
                at,
            );
            attempted.push(order.order_id.clone());
            vec![order]
        };
        let result = runner
            .run(&bars, &mut signals, "demo", None, None)
            .unwrap();

        assert_eq!(result.trades.len(), 0);
        assert_eq!(result.account.equity_curve.len(), 2);
        assert!((result.account.cash - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_bar_values_position_at_cost_basis() {
        // Day 2 has no bar for the held symbol; valuation falls back to the
        // position's weighted cost.
        let bars = vec![
            bar("600000.SH", 1, 10.0, 10.5),
            bar("000001.SZ", 2, 8.0, 8.2),
        ];
        let runner = BacktestRunner::new(100_000.0, ExecutionConfig::default());
        let mut signals = |at: NaiveDateTime, day_bars: &HashMap<String, Bar>, _: &Account| {
            if day_bars.contains_key("600000.SH") {
                vec![Order::new("b1", "600000.SH", OrderSide::Buy, 1000, 10.0, at)]
            } else {
                Vec::new()
            }
        };
        let result = runner
            .run(&bars, &mut signals, "demo", None, None)
            .unwrap();

        let day2 = &result.account.equity_curve[1];
        // cash 89994.8 + 1000 × cost 10.0 = 99994.8
        assert!((day2.equity - 99_994.8).abs() < 1e-9, "equity {}", day2.equity);
    }

    #[test]
    fn signal_source_sees_updated_account() {
        let bars = vec![
            bar("600000.SH", 1, 10.0, 10.5),
            bar("600000.SH", 2, 10.6, 10.8),
        ];
        let runner = BacktestRunner::new(100_000.0, ExecutionConfig::default());
        let mut held_on_day2 = false;
        {
            let mut signals = |at: NaiveDateTime, _: &HashMap<String, Bar>, account: &Account| {
                if at == dt(1) {
                    vec![Order::new("b1", "600000.SH", OrderSide::Buy, 100, 10.0, at)]
                } else {
                    held_on_day2 = account.positions.contains_key("600000.SH");
                    Vec::new()
                }
            };
            runner.run(&bars, &mut signals, "demo", None, None).unwrap();
        }
        assert!(held_on_day2);
    }

    #[test]
    fn account_trade_log_matches_returned_trades() {
        let bars = vec![bar("600000.SH", 1, 10.0, 10.5)];
        let runner = BacktestRunner::new(100_000.0, ExecutionConfig::default());
        let mut signals = |at: NaiveDateTime, _: &HashMap<String, Bar>, _: &Account| {
            vec![Order::new("b1", "600000.SH", OrderSide::Buy, 100, 10.0, at)]
        };
        let result = runner.run(&bars, &mut signals, "demo", None, None).unwrap();
        assert_eq!(result.account.trades.len(), 1);
        assert_eq!(result.trades[0].order_id, "b1");
        assert_eq!(result.account.trades[0], result.trades[0]);
    }

    #[test]
    fn generated_run_ids_have_run_prefix() {
        let id = generate_run_id();
        assert!(id.starts_with("run-"));
        assert_eq!(id.len(), "run-".len() + 8);
    }
}
