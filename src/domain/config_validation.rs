//! Configuration validation.
//!
//! Runs on the built config structs so that file values and CLI overrides
//! are checked the same way before any bar is touched.

use super::config::{BacktestConfig, SignalConfig};
use super::error::GranvilleError;

pub fn validate_signal_config(config: &SignalConfig) -> Result<(), GranvilleError> {
    positive_window("signal", "ma_period", config.ma_period)?;
    positive_window("signal", "volume_period", config.volume_period)?;
    positive_value(
        "signal",
        "divergence_threshold",
        config.divergence_threshold,
    )?;
    if config.filter_window_minutes < 0 {
        return Err(invalid(
            "signal",
            "filter_window_minutes",
            "filter_window_minutes must be non-negative",
        ));
    }

    let d = &config.detectors;
    positive_window("detectors", "trend_window", d.trend_window)?;
    positive_window("detectors", "extreme_window", d.extreme_window)?;
    positive_value(
        "detectors",
        "volume_contraction_ratio",
        d.volume_contraction_ratio,
    )?;
    positive_value("detectors", "support_tolerance", d.support_tolerance)?;
    Ok(())
}

pub fn validate_backtest_config(
    config: &BacktestConfig,
    signal: &SignalConfig,
) -> Result<(), GranvilleError> {
    positive_value("backtest", "initial_capital", config.initial_capital)?;
    if !config.take_profit_pct.is_finite() || config.take_profit_pct < 0.0 {
        return Err(invalid(
            "backtest",
            "take_profit_pct",
            "take_profit_pct must be non-negative",
        ));
    }
    positive_window("backtest", "fast_ma_period", config.fast_ma_period)?;
    if config.fast_ma_period >= signal.ma_period {
        return Err(invalid(
            "backtest",
            "fast_ma_period",
            "fast_ma_period must be shorter than ma_period",
        ));
    }
    Ok(())
}

fn positive_window(section: &str, key: &str, value: usize) -> Result<(), GranvilleError> {
    if value == 0 {
        return Err(invalid(section, key, &format!("{} must be at least 1", key)));
    }
    Ok(())
}

fn positive_value(section: &str, key: &str, value: f64) -> Result<(), GranvilleError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(invalid(section, key, &format!("{} must be positive", key)));
    }
    Ok(())
}

fn invalid(section: &str, key: &str, reason: &str) -> GranvilleError {
    GranvilleError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}
