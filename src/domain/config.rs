//! Analysis and backtest parameters.
//!
//! Both structs are built once by the caller and passed by reference into
//! every stage; nothing downstream mutates them.

use serde::Serialize;

use crate::ports::config_port::ConfigPort;

/// Tunables of the individual rule detectors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectorParams {
    /// Lookback (bars) for the MA trend direction.
    pub trend_window: usize,
    /// Rolling window for new-high / new-low detection.
    pub extreme_window: usize,
    /// `volume / vol_avg` below this counts as contraction.
    pub volume_contraction_ratio: f64,
    /// Percent band around the MA treated as a support/resistance test.
    pub support_tolerance: f64,
}

impl Default for DetectorParams {
    fn default() -> Self {
        DetectorParams {
            trend_window: 5,
            extreme_window: 10,
            volume_contraction_ratio: 0.8,
            support_tolerance: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalConfig {
    pub ma_period: usize,
    pub volume_period: usize,
    /// Percent distance from the MA that counts as "far".
    pub divergence_threshold: f64,
    pub enable_signal_filter: bool,
    pub filter_window_minutes: i64,
    pub detectors: DetectorParams,
}

impl Default for SignalConfig {
    fn default() -> Self {
        SignalConfig {
            ma_period: 20,
            volume_period: 5,
            divergence_threshold: 3.0,
            enable_signal_filter: true,
            filter_window_minutes: 5,
            detectors: DetectorParams::default(),
        }
    }
}

impl SignalConfig {
    /// Read `[signal]` and `[detectors]`, falling back to defaults per key.
    pub fn from_config(config: &dyn ConfigPort) -> Self {
        let d = SignalConfig::default();
        let dd = &d.detectors;
        SignalConfig {
            ma_period: get_usize(config, "signal", "ma_period", d.ma_period),
            volume_period: get_usize(config, "signal", "volume_period", d.volume_period),
            divergence_threshold: config.get_double(
                "signal",
                "divergence_threshold",
                d.divergence_threshold,
            ),
            enable_signal_filter: config.get_bool(
                "signal",
                "enable_signal_filter",
                d.enable_signal_filter,
            ),
            filter_window_minutes: config.get_int(
                "signal",
                "filter_window_minutes",
                d.filter_window_minutes,
            ),
            detectors: DetectorParams {
                trend_window: get_usize(config, "detectors", "trend_window", dd.trend_window),
                extreme_window: get_usize(
                    config,
                    "detectors",
                    "extreme_window",
                    dd.extreme_window,
                ),
                volume_contraction_ratio: config.get_double(
                    "detectors",
                    "volume_contraction_ratio",
                    dd.volume_contraction_ratio,
                ),
                support_tolerance: config.get_double(
                    "detectors",
                    "support_tolerance",
                    dd.support_tolerance,
                ),
            },
        }
    }

    /// Bars needed before `compute_indicators` accepts a series.
    pub fn minimum_bars(&self) -> usize {
        self.ma_period.max(self.volume_period)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    pub take_profit_pct: f64,
    /// Fast MA for golden/death crosses; the slow MA is `SignalConfig::ma_period`.
    pub fast_ma_period: usize,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            initial_capital: 1_000_000.0,
            take_profit_pct: 0.1,
            fast_ma_period: 5,
        }
    }
}

impl BacktestConfig {
    pub fn from_config(config: &dyn ConfigPort) -> Self {
        let d = BacktestConfig::default();
        BacktestConfig {
            initial_capital: config.get_double("backtest", "initial_capital", d.initial_capital),
            take_profit_pct: config.get_double("backtest", "take_profit_pct", d.take_profit_pct),
            fast_ma_period: get_usize(config, "backtest", "fast_ma_period", d.fast_ma_period),
        }
    }
}

/// Negative integers map to 0 so validation reports them as invalid windows.
fn get_usize(config: &dyn ConfigPort, section: &str, key: &str, default: usize) -> usize {
    let value = config.get_int(section, key, default as i64);
    usize::try_from(value).unwrap_or(0)
}
