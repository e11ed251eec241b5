//! Typed construction of runtime settings from sectioned configuration.
//!
//! Each builder validates its section before constructing the value, so a
//! bad file is rejected up front instead of surfacing mid-run.

use crate::domain::error::TrademillError;
use crate::domain::execution::ExecutionConfig;
use crate::domain::risk::RiskThresholds;
use crate::domain::session::SessionConfig;
use crate::ports::config_port::ConfigPort;

/// Backtest run settings from the `[backtest]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestSettings {
    pub strategy_id: String,
    pub initial_cash: f64,
}

pub fn build_execution_config(config: &dyn ConfigPort) -> Result<ExecutionConfig, TrademillError> {
    let defaults = ExecutionConfig::default();
    let built = ExecutionConfig {
        commission_rate: config.get_double("execution", "commission_rate", defaults.commission_rate),
        min_commission: config.get_double("execution", "min_commission", defaults.min_commission),
        stamp_duty_rate: config.get_double("execution", "stamp_duty_rate", defaults.stamp_duty_rate),
        transfer_fee_rate: config.get_double(
            "execution",
            "transfer_fee_rate",
            defaults.transfer_fee_rate,
        ),
        allow_same_day_sell: config.get_bool(
            "execution",
            "allow_same_day_sell",
            defaults.allow_same_day_sell,
        ),
    };
    validate_rate(built.commission_rate, "commission_rate")?;
    validate_rate(built.min_commission, "min_commission")?;
    validate_rate(built.stamp_duty_rate, "stamp_duty_rate")?;
    validate_rate(built.transfer_fee_rate, "transfer_fee_rate")?;
    Ok(built)
}

pub fn build_risk_thresholds(config: &dyn ConfigPort) -> Result<RiskThresholds, TrademillError> {
    let defaults = RiskThresholds::default();
    let built = RiskThresholds {
        max_equity_drawdown: config.get_double(
            "risk",
            "max_equity_drawdown",
            defaults.max_equity_drawdown,
        ),
        max_equity_volatility: config.get_double(
            "risk",
            "max_equity_volatility",
            defaults.max_equity_volatility,
        ),
        max_position_ratio: config.get_double(
            "risk",
            "max_position_ratio",
            defaults.max_position_ratio,
        ),
        max_sector_exposure: config.get_double(
            "risk",
            "max_sector_exposure",
            defaults.max_sector_exposure,
        ),
        max_holding_days: config.get_int("risk", "max_holding_days", defaults.max_holding_days),
    };
    if built.max_holding_days < 0 {
        return Err(TrademillError::ConfigInvalid {
            section: "risk".to_string(),
            key: "max_holding_days".to_string(),
            reason: "max_holding_days must be non-negative".to_string(),
        });
    }
    Ok(built)
}

pub fn build_session_config(config: &dyn ConfigPort) -> Result<SessionConfig, TrademillError> {
    let session_id = require_string(config, "session", "session_id")?;
    let strategy_id = require_string(config, "session", "strategy_id")?;
    let initial_cash = config.get_double("session", "initial_cash", 1_000_000.0);
    validate_initial_cash(initial_cash, "session")?;
    Ok(SessionConfig::new(session_id, strategy_id).with_initial_cash(initial_cash))
}

pub fn build_backtest_settings(config: &dyn ConfigPort) -> Result<BacktestSettings, TrademillError> {
    let strategy_id = require_string(config, "backtest", "strategy_id")?;
    let initial_cash = config.get_double("backtest", "initial_cash", 1_000_000.0);
    validate_initial_cash(initial_cash, "backtest")?;
    Ok(BacktestSettings {
        strategy_id,
        initial_cash,
    })
}

/// Validate every section a config file may carry.
pub fn validate_config(config: &dyn ConfigPort) -> Result<(), TrademillError> {
    build_execution_config(config)?;
    build_risk_thresholds(config)?;
    if config.get_string("session", "session_id").is_some()
        || config.get_string("session", "strategy_id").is_some()
    {
        build_session_config(config)?;
    }
    if config.get_string("backtest", "strategy_id").is_some() {
        build_backtest_settings(config)?;
    }
    Ok(())
}

fn validate_rate(value: f64, key: &str) -> Result<(), TrademillError> {
    if value < 0.0 {
        return Err(TrademillError::ConfigInvalid {
            section: "execution".to_string(),
            key: key.to_string(),
            reason: format!("{} must be non-negative", key),
        });
    }
    Ok(())
}

fn validate_initial_cash(value: f64, section: &str) -> Result<(), TrademillError> {
    if value <= 0.0 {
        return Err(TrademillError::ConfigInvalid {
            section: section.to_string(),
            key: "initial_cash".to_string(),
            reason: "initial_cash must be positive".to_string(),
        });
    }
    Ok(())
}

fn require_string(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<String, TrademillError> {
    match config.get_string(section, key) {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(TrademillError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    #[test]
    fn execution_defaults_apply_when_section_absent() {
        let config = make_config("[risk]\n");
        let built = build_execution_config(&config).unwrap();
        assert_eq!(built, ExecutionConfig::default());
    }

    #[test]
    fn execution_overrides_are_read() {
        let config = make_config(
            "[execution]\ncommission_rate = 0.001\nmin_commission = 1.0\nallow_same_day_sell = true\n",
        );
        let built = build_execution_config(&config).unwrap();
        assert_eq!(built.commission_rate, 0.001);
        assert_eq!(built.min_commission, 1.0);
        assert!(built.allow_same_day_sell);
        // untouched keys keep their defaults
        assert_eq!(built.stamp_duty_rate, 0.001);
    }

    #[test]
    fn negative_commission_rate_fails() {
        let config = make_config("[execution]\ncommission_rate = -0.0003\n");
        let err = build_execution_config(&config).unwrap_err();
        assert!(
            matches!(err, TrademillError::ConfigInvalid { key, .. } if key == "commission_rate")
        );
    }

    #[test]
    fn negative_stamp_duty_fails() {
        let config = make_config("[execution]\nstamp_duty_rate = -0.001\n");
        let err = build_execution_config(&config).unwrap_err();
        assert!(
            matches!(err, TrademillError::ConfigInvalid { key, .. } if key == "stamp_duty_rate")
        );
    }

    #[test]
    fn risk_defaults_apply_when_section_absent() {
        let config = make_config("[execution]\n");
        let built = build_risk_thresholds(&config).unwrap();
        assert_eq!(built, RiskThresholds::default());
    }

    #[test]
    fn risk_overrides_are_read() {
        let config = make_config(
            "[risk]\nmax_equity_drawdown = 0.2\nmax_position_ratio = 0.5\nmax_holding_days = 30\n",
        );
        let built = build_risk_thresholds(&config).unwrap();
        assert_eq!(built.max_equity_drawdown, 0.2);
        assert_eq!(built.max_position_ratio, 0.5);
        assert_eq!(built.max_holding_days, 30);
    }

    #[test]
    fn negative_holding_days_fails() {
        let config = make_config("[risk]\nmax_holding_days = -1\n");
        let err = build_risk_thresholds(&config).unwrap_err();
        assert!(
            matches!(err, TrademillError::ConfigInvalid { key, .. } if key == "max_holding_days")
        );
    }

    #[test]
    fn session_requires_ids() {
        let config = make_config("[session]\nsession_id = s-1\n");
        let err = build_session_config(&config).unwrap_err();
        assert!(matches!(err, TrademillError::ConfigMissing { key, .. } if key == "strategy_id"));
    }

    #[test]
    fn session_config_builds_with_defaults() {
        let config = make_config("[session]\nsession_id = s-1\nstrategy_id = momentum\n");
        let built = build_session_config(&config).unwrap();
        assert_eq!(built.session_id, "s-1");
        assert_eq!(built.strategy_id, "momentum");
        assert_eq!(built.initial_cash, 1_000_000.0);
    }

    #[test]
    fn session_initial_cash_must_be_positive() {
        let config = make_config(
            "[session]\nsession_id = s-1\nstrategy_id = momentum\ninitial_cash = 0\n",
        );
        let err = build_session_config(&config).unwrap_err();
        assert!(matches!(err, TrademillError::ConfigInvalid { key, .. } if key == "initial_cash"));
    }

    #[test]
    fn backtest_settings_build() {
        let config = make_config("[backtest]\nstrategy_id = momentum\ninitial_cash = 100000\n");
        let built = build_backtest_settings(&config).unwrap();
        assert_eq!(built.strategy_id, "momentum");
        assert_eq!(built.initial_cash, 100_000.0);
    }

    #[test]
    fn backtest_missing_strategy_fails() {
        let config = make_config("[backtest]\ninitial_cash = 100000\n");
        let err = build_backtest_settings(&config).unwrap_err();
        assert!(matches!(err, TrademillError::ConfigMissing { key, .. } if key == "strategy_id"));
    }

    #[test]
    fn validate_config_checks_present_sections() {
        let config = make_config(
            r#"
[execution]
commission_rate = 0.0003

[risk]
max_equity_drawdown = 0.1

[session]
session_id = s-1
strategy_id = momentum

[backtest]
strategy_id = momentum
"#,
        );
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn validate_config_skips_absent_session_section() {
        let config = make_config("[execution]\ncommission_rate = 0.0003\n");
        assert!(validate_config(&config).is_ok());
    }
}
