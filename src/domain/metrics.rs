//! Equity-curve performance statistics.
//!
//! The formulas here are a fixed contract: total return from first to last
//! point, annualization over 252 trading days, most-negative drawdown against
//! a running peak, and Sharpe from population stdev of period returns.

use serde::Serialize;

use super::account::EquityPoint;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metrics {
    pub total_return: f64,
    pub annual_return: f64,
    pub max_drawdown: f64,
    pub sharpe_ratio: f64,
}

impl Metrics {
    /// Pure function of the equity curve. `None` for an empty curve.
    pub fn compute(equity_curve: &[EquityPoint]) -> Option<Metrics> {
        if equity_curve.is_empty() {
            return None;
        }

        let values: Vec<f64> = equity_curve.iter().map(|point| point.equity).collect();
        let start = values[0];
        let end = values[values.len() - 1];
        let total_return = if start != 0.0 { (end - start) / start } else { 0.0 };

        let periods = values.len();
        let annual_return = if periods > 1 {
            (1.0 + total_return).powf(TRADING_DAYS_PER_YEAR / periods as f64) - 1.0
        } else {
            total_return
        };

        let mut peak = values[0];
        let mut max_drawdown = 0.0_f64;
        for &value in &values {
            peak = peak.max(value);
            let drawdown = if peak != 0.0 { (value - peak) / peak } else { 0.0 };
            max_drawdown = max_drawdown.min(drawdown);
        }

        let returns: Vec<f64> = values
            .windows(2)
            .filter(|w| w[0] != 0.0)
            .map(|w| (w[1] - w[0]) / w[0])
            .collect();
        let sharpe_ratio = if returns.len() >= 2 {
            let n = returns.len() as f64;
            let mean = returns.iter().sum::<f64>() / n;
            let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
            let stdev = variance.sqrt();
            if stdev > 0.0 {
                (mean / stdev) * TRADING_DAYS_PER_YEAR.sqrt()
            } else {
                0.0
            }
        } else {
            0.0
        };

        Some(Metrics {
            total_return,
            annual_return,
            max_drawdown,
            sharpe_ratio,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn curve(values: &[f64]) -> Vec<EquityPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, &equity)| EquityPoint {
                timestamp: NaiveDate::from_ymd_opt(2024, 7, 1)
                    .unwrap()
                    .and_hms_opt(15, 0, 0)
                    .unwrap()
                    + chrono::Duration::days(i as i64),
                equity,
            })
            .collect()
    }

    #[test]
    fn empty_curve_yields_none() {
        assert_eq!(Metrics::compute(&[]), None);
    }

    #[test]
    fn single_point_total_equals_annual() {
        let metrics = Metrics::compute(&curve(&[100_000.0])).unwrap();
        assert_relative_eq!(metrics.total_return, 0.0);
        assert_relative_eq!(metrics.annual_return, 0.0);
        assert_relative_eq!(metrics.max_drawdown, 0.0);
        assert_relative_eq!(metrics.sharpe_ratio, 0.0);
    }

    #[test]
    fn total_return_start_to_end() {
        let metrics = Metrics::compute(&curve(&[100_000.0, 90_000.0, 110_000.0])).unwrap();
        assert_relative_eq!(metrics.total_return, 0.1, max_relative = 1e-12);
    }

    #[test]
    fn total_return_zero_start() {
        let metrics = Metrics::compute(&curve(&[0.0, 110_000.0])).unwrap();
        assert_relative_eq!(metrics.total_return, 0.0);
    }

    #[test]
    fn annual_return_compounds_over_periods() {
        let points = curve(&[100_000.0, 101_000.0, 102_000.0, 103_000.0]);
        let metrics = Metrics::compute(&points).unwrap();
        let expected = (1.0_f64 + 0.03).powf(252.0 / 4.0) - 1.0;
        assert_relative_eq!(metrics.annual_return, expected, max_relative = 1e-12);
    }

    #[test]
    fn max_drawdown_is_most_negative_against_peak() {
        let metrics =
            Metrics::compute(&curve(&[100_000.0, 120_000.0, 90_000.0, 110_000.0])).unwrap();
        // Peak 120000, trough 90000 → (90000 - 120000) / 120000 = -0.25
        assert_relative_eq!(metrics.max_drawdown, -0.25, max_relative = 1e-12);
    }

    #[test]
    fn monotone_rising_curve_has_zero_drawdown() {
        let metrics = Metrics::compute(&curve(&[100.0, 110.0, 120.0, 130.0])).unwrap();
        assert_relative_eq!(metrics.max_drawdown, 0.0);
        assert!(metrics.sharpe_ratio > 0.0);
    }

    #[test]
    fn sharpe_zero_for_constant_curve() {
        let metrics = Metrics::compute(&curve(&[100.0, 100.0, 100.0])).unwrap();
        assert_relative_eq!(metrics.sharpe_ratio, 0.0);
    }

    #[test]
    fn sharpe_zero_for_single_return() {
        let metrics = Metrics::compute(&curve(&[100.0, 110.0])).unwrap();
        assert_relative_eq!(metrics.sharpe_ratio, 0.0);
    }

    #[test]
    fn sharpe_matches_hand_computation() {
        let values = [100.0, 102.0, 101.0, 104.0];
        let metrics = Metrics::compute(&curve(&values)).unwrap();

        let returns: Vec<f64> = values.windows(2).map(|w| (w[1] - w[0]) / w[0]).collect();
        let n = returns.len() as f64;
        let mean = returns.iter().sum::<f64>() / n;
        let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
        let expected = (mean / variance.sqrt()) * 252.0_f64.sqrt();
        assert_relative_eq!(metrics.sharpe_ratio, expected, max_relative = 1e-12);
    }

    #[test]
    fn deterministic_over_same_input() {
        let points = curve(&[100_000.0, 98_000.0, 103_000.0, 101_000.0]);
        let a = Metrics::compute(&points).unwrap();
        let b = Metrics::compute(&points).unwrap();
        assert_eq!(a, b);
    }
}
