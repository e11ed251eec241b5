//! Multi-threshold risk policy.
//!
//! A pure function of the equity curve and a position snapshot: every enabled
//! check runs independently and all triggered alerts are unioned — the policy
//! never stops at the first failure. A threshold ≤ 0 disables its check.

use chrono::{Duration, NaiveDate, NaiveDateTime, Utc};
use std::collections::BTreeMap;

use super::account::{EquityPoint, PositionSnapshot};

#[derive(Debug, Clone, PartialEq)]
pub struct RiskThresholds {
    pub max_equity_drawdown: f64,
    pub max_position_ratio: f64,
    pub max_equity_volatility: f64,
    pub max_sector_exposure: f64,
    pub max_holding_days: i64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        RiskThresholds {
            max_equity_drawdown: 0.1,
            max_position_ratio: 0.3,
            max_equity_volatility: 0.0,
            max_sector_exposure: 0.0,
            max_holding_days: 0,
        }
    }
}

/// Proceed/block verdict with one human-readable alert per triggered rule.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskDecision {
    pub proceed: bool,
    pub alerts: Vec<String>,
}

/// Timestamp of an equity record as it may arrive from persisted curves:
/// a native datetime or raw ISO-8601 text.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordTime {
    At(NaiveDateTime),
    Text(String),
}

/// One equity-curve entry as the policy accepts it. Timestamps may be
/// absent entirely, in which case the positional index stands in.
#[derive(Debug, Clone, PartialEq)]
pub struct EquityRecord {
    pub timestamp: Option<RecordTime>,
    pub equity: f64,
}

impl From<&EquityPoint> for EquityRecord {
    fn from(point: &EquityPoint) -> Self {
        EquityRecord {
            timestamp: Some(RecordTime::At(point.timestamp)),
            equity: point.equity,
        }
    }
}

/// Convert an account equity curve into policy input.
pub fn records_from_curve(curve: &[EquityPoint]) -> Vec<EquityRecord> {
    curve.iter().map(EquityRecord::from).collect()
}

/// Maps a symbol to its sector; `None` groups the symbol under "UNKNOWN".
pub trait SectorLookup {
    fn sector(&self, symbol: &str) -> Option<String>;
}

impl<F> SectorLookup for F
where
    F: Fn(&str) -> Option<String>,
{
    fn sector(&self, symbol: &str) -> Option<String> {
        self(symbol)
    }
}

/// Sector lookup with no data: everything lands in "UNKNOWN".
pub struct NoSectorData;

impl SectorLookup for NoSectorData {
    fn sector(&self, _symbol: &str) -> Option<String> {
        None
    }
}

/// Side-effect sink invoked once per triggered alert. Purely observational;
/// it never influences the decision.
pub trait AlertSink {
    fn alert(&self, message: &str, alerts: &[String]);
}

impl<F> AlertSink for F
where
    F: Fn(&str, &[String]),
{
    fn alert(&self, message: &str, alerts: &[String]) {
        self(message, alerts)
    }
}

/// Default sink: routes alerts to the log facade at warn level.
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn alert(&self, message: &str, alerts: &[String]) {
        log::warn!("risk alert: {} ({} total)", message, alerts.len());
    }
}

pub struct RiskPolicy {
    thresholds: RiskThresholds,
    sectors: Box<dyn SectorLookup>,
    sink: Box<dyn AlertSink>,
}

impl RiskPolicy {
    pub fn new(thresholds: RiskThresholds) -> Self {
        RiskPolicy {
            thresholds,
            sectors: Box::new(NoSectorData),
            sink: Box::new(LogAlertSink),
        }
    }

    pub fn with_sector_lookup(mut self, sectors: Box<dyn SectorLookup>) -> Self {
        self.sectors = sectors;
        self
    }

    pub fn with_alert_sink(mut self, sink: Box<dyn AlertSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Evaluate every enabled check and union the alerts.
    pub fn evaluate(
        &self,
        equity_curve: &[EquityRecord],
        positions: &[PositionSnapshot],
    ) -> RiskDecision {
        let series: Vec<f64> = equity_curve
            .iter()
            .map(|record| record.equity)
            .filter(|equity| equity.is_finite())
            .collect();
        let latest_equity = series.last().copied();

        let mut alerts = Vec::new();
        if let Some(message) = self.check_drawdown(&series) {
            alerts.push(message);
        }
        if let Some(message) = self.check_volatility(&series) {
            alerts.push(message);
        }
        alerts.extend(self.check_position_ratio(latest_equity, positions));
        alerts.extend(self.check_sector_exposure(latest_equity, positions));
        alerts.extend(self.check_holding_period(equity_curve, positions));

        for message in &alerts {
            self.sink.alert(message, &alerts);
        }
        RiskDecision {
            proceed: alerts.is_empty(),
            alerts,
        }
    }

    fn check_drawdown(&self, series: &[f64]) -> Option<String> {
        let limit = self.thresholds.max_equity_drawdown;
        if limit <= 0.0 || series.is_empty() {
            return None;
        }
        let max_equity = series.iter().copied().fold(f64::MIN, f64::max);
        if max_equity <= 0.0 {
            return None;
        }
        let latest = *series.last().expect("series is non-empty");
        let drawdown = (max_equity - latest) / max_equity;
        if drawdown >= limit {
            Some(format!(
                "max drawdown {:.2}% exceeds limit {:.2}%",
                drawdown * 100.0,
                limit * 100.0
            ))
        } else {
            None
        }
    }

    fn check_volatility(&self, series: &[f64]) -> Option<String> {
        let limit = self.thresholds.max_equity_volatility;
        if limit <= 0.0 || series.len() < 3 {
            return None;
        }
        let returns: Vec<f64> = series
            .windows(2)
            .filter(|w| w[0] != 0.0)
            .map(|w| (w[1] - w[0]) / w[0])
            .collect();
        if returns.len() < 2 {
            return None;
        }
        let n = returns.len() as f64;
        let mean = returns.iter().sum::<f64>() / n;
        let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
        let volatility = variance.sqrt();
        if volatility >= limit {
            Some(format!(
                "equity volatility {:.2}% exceeds limit {:.2}%",
                volatility * 100.0,
                limit * 100.0
            ))
        } else {
            None
        }
    }

    fn check_position_ratio(
        &self,
        latest_equity: Option<f64>,
        positions: &[PositionSnapshot],
    ) -> Vec<String> {
        let limit = self.thresholds.max_position_ratio;
        let Some(equity) = latest_equity else {
            return Vec::new();
        };
        if limit <= 0.0 || equity <= 0.0 {
            return Vec::new();
        }
        positions
            .iter()
            .filter_map(|position| {
                let notional = position.volume as f64 * position.cost_price;
                let ratio = notional / equity;
                if ratio >= limit {
                    Some(format!(
                        "position {} holds {:.2}% of equity, limit {:.2}%",
                        position.symbol,
                        ratio * 100.0,
                        limit * 100.0
                    ))
                } else {
                    None
                }
            })
            .collect()
    }

    fn check_sector_exposure(
        &self,
        latest_equity: Option<f64>,
        positions: &[PositionSnapshot],
    ) -> Vec<String> {
        let limit = self.thresholds.max_sector_exposure;
        let Some(equity) = latest_equity else {
            return Vec::new();
        };
        if limit <= 0.0 || equity <= 0.0 {
            return Vec::new();
        }
        let mut notionals: BTreeMap<String, f64> = BTreeMap::new();
        for position in positions {
            let sector = self
                .sectors
                .sector(&position.symbol)
                .unwrap_or_else(|| "UNKNOWN".to_string());
            *notionals.entry(sector).or_insert(0.0) +=
                position.volume as f64 * position.cost_price;
        }
        notionals
            .into_iter()
            .filter_map(|(sector, notional)| {
                let ratio = notional / equity;
                if ratio >= limit {
                    Some(format!(
                        "sector {} exposure {:.2}% exceeds limit {:.2}%",
                        sector,
                        ratio * 100.0,
                        limit * 100.0
                    ))
                } else {
                    None
                }
            })
            .collect()
    }

    fn check_holding_period(
        &self,
        equity_curve: &[EquityRecord],
        positions: &[PositionSnapshot],
    ) -> Vec<String> {
        let limit = self.thresholds.max_holding_days;
        if limit <= 0 {
            return Vec::new();
        }
        let reference = reference_time(equity_curve);
        let mut alerts = Vec::new();
        for position in positions {
            // One alert per symbol, on the first lot held too long.
            let overheld = position
                .lots
                .iter()
                .find(|lot| reference - lot.acquired_at > Duration::days(limit));
            if let Some(lot) = overheld {
                let days = (reference - lot.acquired_at).num_days();
                alerts.push(format!(
                    "position {} held {} days, limit {} days",
                    position.symbol, days, limit
                ));
            }
        }
        alerts
    }
}

/// Last parseable timestamp in the curve, scanning from the end; falls back
/// to the current time when none parses.
fn reference_time(equity_curve: &[EquityRecord]) -> NaiveDateTime {
    for record in equity_curve.iter().rev() {
        match &record.timestamp {
            Some(RecordTime::At(at)) => return *at,
            Some(RecordTime::Text(text)) => {
                if let Some(at) = parse_text_time(text) {
                    return at;
                }
            }
            None => {}
        }
    }
    Utc::now().naive_utc()
}

fn parse_text_time(text: &str) -> Option<NaiveDateTime> {
    let trimmed = text.trim().trim_end_matches('Z');
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}
