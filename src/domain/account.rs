//! Cash/position ledger: lots, positions, and the account that owns them.
//!
//! A position is a bag of acquisition lots; each lot keeps its own cost price
//! and acquisition time so FIFO draining and T+1 eligibility stay exact under
//! partial consumption.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::HashMap;

use super::error::TrademillError;
use super::order::Trade;

/// One acquisition tranche. Never shared between positions; dropped from its
/// position once fully consumed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Lot {
    pub volume: i64,
    pub cost_price: f64,
    pub acquired_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub lots: Vec<Lot>,
}

impl Position {
    pub fn new(symbol: impl Into<String>) -> Self {
        Position {
            symbol: symbol.into(),
            lots: Vec::new(),
        }
    }

    pub fn volume(&self) -> i64 {
        self.lots.iter().map(|lot| lot.volume).sum()
    }

    /// Volume-weighted average cost across all lots. 0 for an empty position.
    pub fn cost_price(&self) -> f64 {
        let total_volume = self.volume();
        if total_volume == 0 {
            return 0.0;
        }
        let total_cost: f64 = self
            .lots
            .iter()
            .map(|lot| lot.cost_price * lot.volume as f64)
            .sum();
        total_cost / total_volume as f64
    }

    pub fn add_lot(&mut self, volume: i64, price: f64, acquired_at: NaiveDateTime) {
        self.lots.push(Lot {
            volume,
            cost_price: price,
            acquired_at,
        });
    }

    /// Volume sellable before `cutoff`. `None` means no restriction
    /// (same-day selling allowed).
    pub fn available_volume(&self, cutoff: Option<NaiveDateTime>) -> i64 {
        match cutoff {
            None => self.volume(),
            Some(before) => self
                .lots
                .iter()
                .filter(|lot| lot.acquired_at < before)
                .map(|lot| lot.volume)
                .sum(),
        }
    }

    /// Drain `volume` shares FIFO from lots acquired before `cutoff`,
    /// returning the cost basis of the shares removed.
    ///
    /// Lots are addressed through a sorted index list and decremented in
    /// place; exhausted lots are dropped afterwards. Ineligible lots are
    /// never touched. Running out of eligible volume here is a fatal
    /// invariant violation — callers must pre-check `available_volume` —
    /// and leaves the position unmodified.
    pub fn remove_volume(
        &mut self,
        volume: i64,
        cutoff: Option<NaiveDateTime>,
    ) -> Result<f64, TrademillError> {
        let mut eligible: Vec<usize> = (0..self.lots.len())
            .filter(|&i| cutoff.is_none_or(|before| self.lots[i].acquired_at < before))
            .collect();
        eligible.sort_by_key(|&i| self.lots[i].acquired_at);

        let available: i64 = eligible.iter().map(|&i| self.lots[i].volume).sum();
        if available < volume {
            return Err(TrademillError::InsufficientLots {
                symbol: self.symbol.clone(),
                requested: volume,
                available,
            });
        }

        let mut remaining = volume;
        let mut cost = 0.0;
        for i in eligible {
            if remaining <= 0 {
                break;
            }
            let lot = &mut self.lots[i];
            let take = lot.volume.min(remaining);
            lot.volume -= take;
            remaining -= take;
            cost += lot.cost_price * take as f64;
        }
        self.lots.retain(|lot| lot.volume > 0);
        Ok(cost)
    }

    pub fn is_empty(&self) -> bool {
        self.lots.is_empty()
    }
}

/// Structured view of one position for risk evaluation and journaling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionSnapshot {
    pub symbol: String,
    pub volume: i64,
    pub cost_price: f64,
    pub lots: Vec<Lot>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EquityPoint {
    pub timestamp: NaiveDateTime,
    pub equity: f64,
}

/// The full trading ledger: cash, open positions, append-only trade log,
/// and the equity curve in execution order.
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub cash: f64,
    pub positions: HashMap<String, Position>,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
}

impl Account {
    pub fn new(cash: f64) -> Self {
        Account {
            cash,
            positions: HashMap::new(),
            trades: Vec::new(),
            equity_curve: Vec::new(),
        }
    }

    pub fn position_mut(&mut self, symbol: &str) -> &mut Position {
        self.positions
            .entry(symbol.to_string())
            .or_insert_with(|| Position::new(symbol))
    }

    pub fn record_equity(&mut self, timestamp: NaiveDateTime, equity: f64) {
        self.equity_curve.push(EquityPoint { timestamp, equity });
    }

    /// Latest recorded equity, or cash when no equity point exists yet.
    pub fn total_equity(&self) -> f64 {
        self.equity_curve
            .last()
            .map(|point| point.equity)
            .unwrap_or(self.cash)
    }

    /// Drop positions whose volume reached zero. The engine prunes after each
    /// sell; this catches lots drained through any other path.
    pub fn prune_empty_positions(&mut self) {
        self.positions.retain(|_, position| !position.is_empty());
    }

    /// Snapshot of non-empty positions, sorted by symbol for deterministic
    /// journaling and risk evaluation.
    pub fn snapshot_positions(&self) -> Vec<PositionSnapshot> {
        let mut snapshots: Vec<PositionSnapshot> = self
            .positions
            .values()
            .filter(|position| position.volume() > 0)
            .map(|position| PositionSnapshot {
                symbol: position.symbol.clone(),
                volume: position.volume(),
                cost_price: position.cost_price(),
                lots: position.lots.clone(),
            })
            .collect();
        snapshots.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dt(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 7, day)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
    }

    #[test]
    fn volume_sums_lots() {
        let mut position = Position::new("600000.SH");
        position.add_lot(1000, 10.0, dt(1));
        position.add_lot(500, 11.0, dt(2));
        assert_eq!(position.volume(), 1500);
    }

    #[test]
    fn cost_price_is_volume_weighted() {
        let mut position = Position::new("600000.SH");
        position.add_lot(1000, 10.0, dt(1));
        position.add_lot(1000, 12.0, dt(2));
        assert!((position.cost_price() - 11.0).abs() < f64::EPSILON);
    }

    #[test]
    fn cost_price_empty_position() {
        let position = Position::new("600000.SH");
        assert!((position.cost_price() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn available_volume_respects_cutoff() {
        let mut position = Position::new("600000.SH");
        position.add_lot(1000, 10.0, dt(1));
        position.add_lot(500, 11.0, dt(2));

        assert_eq!(position.available_volume(None), 1500);
        assert_eq!(position.available_volume(Some(dt(2))), 1000);
        assert_eq!(position.available_volume(Some(dt(1))), 0);
    }

    #[test]
    fn remove_volume_fifo_order() {
        let mut position = Position::new("600000.SH");
        // Insert out of order; draining must follow acquired_at, not
        // insertion order.
        position.add_lot(500, 12.0, dt(3));
        position.add_lot(1000, 10.0, dt(1));

        let cost = position.remove_volume(1200, None).unwrap();
        // 1000 @ 10.0 from the older lot, then 200 @ 12.0.
        assert!((cost - (1000.0 * 10.0 + 200.0 * 12.0)).abs() < 1e-9);
        assert_eq!(position.volume(), 300);
        assert_eq!(position.lots.len(), 1);
        assert!((position.lots[0].cost_price - 12.0).abs() < f64::EPSILON);
        assert_eq!(position.lots[0].acquired_at, dt(3));
    }

    #[test]
    fn remove_volume_splits_last_lot() {
        let mut position = Position::new("600000.SH");
        position.add_lot(1000, 10.0, dt(1));

        let cost = position.remove_volume(400, None).unwrap();
        assert!((cost - 4000.0).abs() < 1e-9);
        assert_eq!(position.volume(), 600);
        // Residual keeps the original cost price and acquisition time.
        assert!((position.lots[0].cost_price - 10.0).abs() < f64::EPSILON);
        assert_eq!(position.lots[0].acquired_at, dt(1));
    }

    #[test]
    fn remove_volume_skips_ineligible_lots() {
        let mut position = Position::new("600000.SH");
        position.add_lot(1000, 10.0, dt(1));
        position.add_lot(500, 11.0, dt(2));

        position.remove_volume(1000, Some(dt(2))).unwrap();
        // The day-2 lot must be untouched.
        assert_eq!(position.volume(), 500);
        assert_eq!(position.lots[0].acquired_at, dt(2));
        assert_eq!(position.lots[0].volume, 500);
    }

    #[test]
    fn remove_volume_insufficient_is_fatal_and_leaves_state() {
        let mut position = Position::new("600000.SH");
        position.add_lot(1000, 10.0, dt(1));
        position.add_lot(500, 11.0, dt(2));

        let err = position.remove_volume(1200, Some(dt(2))).unwrap_err();
        assert!(matches!(
            err,
            TrademillError::InsufficientLots {
                requested: 1200,
                available: 1000,
                ..
            }
        ));
        // Failed drain must not mutate anything.
        assert_eq!(position.volume(), 1500);
        assert_eq!(position.lots.len(), 2);
    }

    #[test]
    fn remove_all_volume_empties_position() {
        let mut position = Position::new("600000.SH");
        position.add_lot(1000, 10.0, dt(1));
        position.remove_volume(1000, None).unwrap();
        assert!(position.is_empty());
        assert_eq!(position.volume(), 0);
    }

    #[test]
    fn new_account() {
        let account = Account::new(100_000.0);
        assert!((account.cash - 100_000.0).abs() < f64::EPSILON);
        assert!(account.positions.is_empty());
        assert!(account.trades.is_empty());
        assert!(account.equity_curve.is_empty());
    }

    #[test]
    fn position_mut_creates_on_demand() {
        let mut account = Account::new(100_000.0);
        account.position_mut("600000.SH").add_lot(100, 10.0, dt(1));
        assert_eq!(account.positions["600000.SH"].volume(), 100);
        // Second lookup reuses the same position.
        account.position_mut("600000.SH").add_lot(50, 11.0, dt(2));
        assert_eq!(account.positions["600000.SH"].volume(), 150);
        assert_eq!(account.positions.len(), 1);
    }

    #[test]
    fn total_equity_falls_back_to_cash() {
        let mut account = Account::new(100_000.0);
        assert!((account.total_equity() - 100_000.0).abs() < f64::EPSILON);
        account.record_equity(dt(1), 104_000.0);
        assert!((account.total_equity() - 104_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn prune_empty_positions() {
        let mut account = Account::new(100_000.0);
        account.position_mut("600000.SH").add_lot(100, 10.0, dt(1));
        account.position_mut("000001.SZ");
        account.prune_empty_positions();
        assert!(account.positions.contains_key("600000.SH"));
        assert!(!account.positions.contains_key("000001.SZ"));
    }

    mod lot_properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn drain_conserves_volume(
                lots in proptest::collection::vec(
                    (1i64..=1000, 1u32..=28, 1.0f64..100.0),
                    1..8,
                ),
                take_fraction in 0.0f64..1.0,
            ) {
                let mut position = Position::new("600000.SH");
                for (volume, day, price) in &lots {
                    position.add_lot(*volume, *price, dt(*day));
                }
                let total = position.volume();
                let take = (total as f64 * take_fraction) as i64;

                let cost = position.remove_volume(take, None).unwrap();
                prop_assert_eq!(position.volume(), total - take);
                prop_assert!(cost >= 0.0);
                prop_assert!(position.lots.iter().all(|lot| lot.volume > 0));
            }

            #[test]
            fn overdrain_leaves_position_untouched(
                lots in proptest::collection::vec(
                    (1i64..=1000, 1u32..=28, 1.0f64..100.0),
                    1..8,
                ),
            ) {
                let mut position = Position::new("600000.SH");
                for (volume, day, price) in &lots {
                    position.add_lot(*volume, *price, dt(*day));
                }
                let before = position.clone();

                let result = position.remove_volume(position.volume() + 1, None);
                prop_assert!(result.is_err());
                prop_assert_eq!(position, before);
            }

            #[test]
            fn cutoff_availability_never_exceeds_total(
                lots in proptest::collection::vec(
                    (1i64..=1000, 1u32..=28, 1.0f64..100.0),
                    0..8,
                ),
                cutoff_day in 1u32..=28,
            ) {
                let mut position = Position::new("600000.SH");
                for (volume, day, price) in &lots {
                    position.add_lot(*volume, *price, dt(*day));
                }
                let available = position.available_volume(Some(dt(cutoff_day)));
                prop_assert!(available <= position.volume());
                prop_assert!(available >= 0);
            }
        }
    }

    #[test]
    fn snapshot_positions_sorted_and_non_empty() {
        let mut account = Account::new(100_000.0);
        account.position_mut("600519.SH").add_lot(100, 1500.0, dt(1));
        account.position_mut("000001.SZ").add_lot(200, 12.0, dt(1));
        account.position_mut("999999.SH");

        let snapshots = account.snapshot_positions();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].symbol, "000001.SZ");
        assert_eq!(snapshots[1].symbol, "600519.SH");
        assert_eq!(snapshots[0].volume, 200);
        assert!((snapshots[1].cost_price - 1500.0).abs() < f64::EPSILON);
        assert_eq!(snapshots[1].lots.len(), 1);
    }
}
