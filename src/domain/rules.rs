//! Granville's eight rules and per-bar classification.
//!
//! Rules are checked in numeric order for every bar and the first that holds
//! claims the bar, so a bar carries at most one rule. Rules 1-4 buy, 5-8 sell.

use serde::{Serialize, Serializer};
use tracing::{debug, warn};

use super::config::SignalConfig;
use super::detectors::{self, Directional, Trend};
use super::error::GranvilleError;
use super::indicator::IndicatorSet;
use super::indicator::rolling::dense;
use super::ohlcv::{OhlcvBar, ensure_well_formed};
use super::signal::{Signal, SignalType, filter_signals};

/// How many earlier bars rules 3 and 7 look back for a divergence.
const DIVERGENCE_LOOKBACK: usize = 3;

const BASE_CONFIDENCE: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GranvilleRule {
    /// 1: price crosses above a flat or rising MA.
    CrossAbove,
    /// 2: price above a rising MA makes a new high.
    NewHigh,
    /// 3: after stretching above a rising MA, price pulls back to it.
    SupportBounce,
    /// 4: price far below the MA on thin volume stops making new lows.
    OversoldRebound,
    /// 5: price crosses below a flat or falling MA.
    CrossBelow,
    /// 6: price below a falling MA makes a new low.
    NewLow,
    /// 7: after stretching below a falling MA, price rallies into it.
    ResistanceReject,
    /// 8: price far above the MA on thin volume stops making new highs.
    OverboughtFade,
}

impl GranvilleRule {
    pub const ALL: [GranvilleRule; 8] = [
        GranvilleRule::CrossAbove,
        GranvilleRule::NewHigh,
        GranvilleRule::SupportBounce,
        GranvilleRule::OversoldRebound,
        GranvilleRule::CrossBelow,
        GranvilleRule::NewLow,
        GranvilleRule::ResistanceReject,
        GranvilleRule::OverboughtFade,
    ];

    pub fn number(self) -> u8 {
        match self {
            GranvilleRule::CrossAbove => 1,
            GranvilleRule::NewHigh => 2,
            GranvilleRule::SupportBounce => 3,
            GranvilleRule::OversoldRebound => 4,
            GranvilleRule::CrossBelow => 5,
            GranvilleRule::NewLow => 6,
            GranvilleRule::ResistanceReject => 7,
            GranvilleRule::OverboughtFade => 8,
        }
    }

    pub fn from_number(n: u8) -> Option<Self> {
        n.checked_sub(1)
            .and_then(|i| GranvilleRule::ALL.get(usize::from(i)))
            .copied()
    }

    pub fn signal_type(self) -> SignalType {
        if self.is_buy() {
            SignalType::Buy
        } else {
            SignalType::Sell
        }
    }

    pub fn is_buy(self) -> bool {
        self.number() <= 4
    }

    pub fn is_sell(self) -> bool {
        !self.is_buy()
    }

    pub fn description(self) -> &'static str {
        match self {
            GranvilleRule::CrossAbove => {
                "price recovers above the MA for the first time while the MA flattens or turns up"
            }
            GranvilleRule::NewHigh => {
                "price dips toward a rising MA without breaking it, then makes a new high"
            }
            GranvilleRule::SupportBounce => {
                "price stretched above a rising MA pulls back and finds support at it"
            }
            GranvilleRule::OversoldRebound => {
                "price far below the MA stops falling on contracting volume as the MA flattens"
            }
            GranvilleRule::CrossBelow => {
                "price breaks below the MA for the first time while the MA flattens or turns down"
            }
            GranvilleRule::NewLow => {
                "price rallies toward a falling MA without breaking it, then makes a new low"
            }
            GranvilleRule::ResistanceReject => {
                "price stretched below a falling MA rallies into it and meets resistance"
            }
            GranvilleRule::OverboughtFade => {
                "price far above the MA tops out on contracting volume as the MA flattens"
            }
        }
    }
}

impl std::fmt::Display for GranvilleRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rule {}", self.number())
    }
}

impl Serialize for GranvilleRule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.number())
    }
}

/// Detector outputs for one series, aligned to the bar index.
#[derive(Debug, Clone)]
pub struct DetectorSeries {
    pub trend: Vec<Trend>,
    pub diverged: Directional,
    pub extremes: Directional,
    pub volume_contraction: Vec<bool>,
    pub crossover: Directional,
    pub tests: Directional,
    close: Vec<f64>,
    ma: Vec<Option<f64>>,
}

impl DetectorSeries {
    /// `indicators` must hold one entry per bar.
    pub fn compute(bars: &[OhlcvBar], indicators: &[IndicatorSet], config: &SignalConfig) -> Self {
        let params = &config.detectors;
        let close: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let volume: Vec<f64> = bars.iter().map(|b| b.volume).collect();
        let ma: Vec<Option<f64>> = indicators.iter().map(|s| s.ma).collect();
        let vol_avg: Vec<Option<f64>> = indicators.iter().map(|s| s.vol_avg).collect();

        DetectorSeries {
            trend: detectors::ma_trend(&ma, params.trend_window),
            diverged: detectors::diverged(&close, &ma, config.divergence_threshold),
            extremes: detectors::new_highs_lows(&close, params.extreme_window),
            volume_contraction: detectors::volume_contraction(
                &volume,
                &vol_avg,
                params.volume_contraction_ratio,
            ),
            crossover: detectors::crossover(&dense(&close), &ma),
            tests: detectors::support_resistance(&close, &ma, params.support_tolerance),
            close,
            ma,
        }
    }

    fn above_ma(&self, t: usize) -> bool {
        self.ma[t].is_some_and(|m| self.close[t] > m)
    }

    fn below_ma(&self, t: usize) -> bool {
        self.ma[t].is_some_and(|m| self.close[t] < m)
    }

    fn recently(series: &[bool], t: usize) -> bool {
        (1..=DIVERGENCE_LOOKBACK).any(|k| t.checked_sub(k).is_some_and(|i| series[i]))
    }

    fn holds(&self, rule: GranvilleRule, t: usize) -> bool {
        let trend = self.trend[t];
        match rule {
            GranvilleRule::CrossAbove => self.crossover.up[t] && trend != Trend::Down,
            GranvilleRule::NewHigh => self.above_ma(t) && self.extremes.up[t] && trend == Trend::Up,
            GranvilleRule::SupportBounce => {
                Self::recently(&self.diverged.up, t) && self.tests.up[t] && trend == Trend::Up
            }
            GranvilleRule::OversoldRebound => {
                self.diverged.down[t]
                    && self.volume_contraction[t]
                    && !self.extremes.down[t]
                    && trend != Trend::Down
            }
            GranvilleRule::CrossBelow => self.crossover.down[t] && trend != Trend::Up,
            GranvilleRule::NewLow => {
                self.below_ma(t) && self.extremes.down[t] && trend == Trend::Down
            }
            GranvilleRule::ResistanceReject => {
                Self::recently(&self.diverged.down, t) && self.tests.down[t] && trend == Trend::Down
            }
            GranvilleRule::OverboughtFade => {
                self.diverged.up[t]
                    && self.volume_contraction[t]
                    && !self.extremes.up[t]
                    && trend != Trend::Up
            }
        }
    }

    /// First rule in numeric order that holds at bar `t`.
    pub fn classify_bar(&self, t: usize) -> Option<GranvilleRule> {
        GranvilleRule::ALL
            .into_iter()
            .find(|rule| self.holds(*rule, t))
    }
}

/// One entry per bar: the rule that claimed it, or `None`.
pub fn classify_rules(
    bars: &[OhlcvBar],
    indicators: &[IndicatorSet],
    config: &SignalConfig,
) -> Result<Vec<Option<GranvilleRule>>, GranvilleError> {
    if bars.len() != indicators.len() {
        return Err(GranvilleError::SignalProcessing {
            reason: format!(
                "{} bars but {} indicator sets",
                bars.len(),
                indicators.len()
            ),
        });
    }
    ensure_well_formed(bars)?;
    let series = DetectorSeries::compute(bars, indicators, config);
    Ok((0..bars.len()).map(|t| series.classify_bar(t)).collect())
}

/// Base 0.6 plus volume, trend-strength and momentum bonuses, clamped to
/// `[0, 1]`. Unavailable indicators contribute nothing.
pub fn confidence(indicators: &IndicatorSet) -> f64 {
    let volume = match indicators.volume_ratio {
        Some(r) if r > 1.5 => 0.2,
        Some(r) if r > 1.2 => 0.1,
        _ => 0.0,
    };
    let trend = indicators
        .ma_slope
        .filter(|s| s.is_finite())
        .map_or(0.0, |s| (s.abs() * 10.0).min(0.2));
    let momentum = indicators
        .price_change_3d
        .filter(|c| c.is_finite())
        .map_or(0.0, |c| (c.abs() * 5.0).min(0.1));

    (BASE_CONFIDENCE + volume + trend + momentum).clamp(0.0, 1.0)
}

/// Signals for every classified bar, deduplicated when
/// `config.enable_signal_filter` is set. A classification failure is logged
/// and yields no signals.
pub fn classify_signals(
    instrument_id: &str,
    bars: &[OhlcvBar],
    indicators: &[IndicatorSet],
    config: &SignalConfig,
) -> Vec<Signal> {
    match try_classify_signals(instrument_id, bars, indicators, config) {
        Ok(signals) => signals,
        Err(e) => {
            warn!(instrument = instrument_id, error = %e, "signal classification failed, returning no signals");
            Vec::new()
        }
    }
}

fn try_classify_signals(
    instrument_id: &str,
    bars: &[OhlcvBar],
    indicators: &[IndicatorSet],
    config: &SignalConfig,
) -> Result<Vec<Signal>, GranvilleError> {
    let rules = classify_rules(bars, indicators, config)?;

    let signals: Vec<Signal> = rules
        .iter()
        .enumerate()
        .filter_map(|(t, rule)| {
            let rule = (*rule)?;
            let bar = &bars[t];
            Some(Signal {
                instrument_id: instrument_id.to_string(),
                rule,
                signal_type: rule.signal_type(),
                timestamp: bar.timestamp(),
                price: bar.close,
                confidence: confidence(&indicators[t]),
            })
        })
        .collect();

    if !config.enable_signal_filter {
        return Ok(signals);
    }
    let before = signals.len();
    let filtered = filter_signals(signals, config.filter_window_minutes);
    debug!(
        instrument = instrument_id,
        before,
        after = filtered.len(),
        "signal filtering"
    );
    Ok(filtered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::compute_indicators;
    use chrono::NaiveDate;

    fn make_bars(closes: &[f64]) -> Vec<OhlcvBar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| OhlcvBar {
                date: start + chrono::Duration::days(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1_000.0,
            })
            .collect()
    }

    fn small_config() -> SignalConfig {
        SignalConfig {
            ma_period: 5,
            volume_period: 3,
            ..SignalConfig::default()
        }
    }

    #[test]
    fn numbering_round_trips() {
        for (i, rule) in GranvilleRule::ALL.iter().enumerate() {
            assert_eq!(usize::from(rule.number()), i + 1);
            assert_eq!(GranvilleRule::from_number(rule.number()), Some(*rule));
        }
        assert_eq!(GranvilleRule::from_number(0), None);
        assert_eq!(GranvilleRule::from_number(9), None);
    }

    #[test]
    fn buy_and_sell_split() {
        for rule in GranvilleRule::ALL {
            assert_eq!(rule.is_buy(), rule.number() <= 4);
            assert_eq!(rule.is_sell(), rule.signal_type() == SignalType::Sell);
            assert!(!rule.description().is_empty());
        }
    }

    #[test]
    fn flat_series_has_no_rules() {
        let bars = make_bars(&[100.0; 30]);
        let config = SignalConfig::default();
        let ind = compute_indicators(&bars, 20, 5).unwrap();
        let rules = classify_rules(&bars, &ind, &config).unwrap();
        assert!(rules.iter().all(Option::is_none));
    }

    #[test]
    fn cross_above_flat_ma_is_rule_one() {
        let mut closes = vec![100.0; 10];
        closes.push(102.0);
        let bars = make_bars(&closes);
        let config = small_config();
        let ind = compute_indicators(&bars, 5, 3).unwrap();
        let rules = classify_rules(&bars, &ind, &config).unwrap();
        assert_eq!(rules[10], Some(GranvilleRule::CrossAbove));
    }

    #[test]
    fn cross_below_flat_ma_is_rule_five() {
        let mut closes = vec![100.0; 10];
        closes.push(98.0);
        let bars = make_bars(&closes);
        let config = small_config();
        let ind = compute_indicators(&bars, 5, 3).unwrap();
        let rules = classify_rules(&bars, &ind, &config).unwrap();
        assert_eq!(rules[10], Some(GranvilleRule::CrossBelow));
    }

    #[test]
    fn rising_series_makes_new_highs() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let bars = make_bars(&closes);
        let config = small_config();
        let ind = compute_indicators(&bars, 5, 3).unwrap();
        let rules = classify_rules(&bars, &ind, &config).unwrap();
        assert_eq!(rules[20], Some(GranvilleRule::NewHigh));
        assert!(
            rules
                .iter()
                .flatten()
                .all(|r| *r == GranvilleRule::NewHigh)
        );
    }

    #[test]
    fn falling_series_makes_new_lows() {
        let closes: Vec<f64> = (0..30).map(|i| 200.0 - i as f64).collect();
        let bars = make_bars(&closes);
        let config = small_config();
        let ind = compute_indicators(&bars, 5, 3).unwrap();
        let rules = classify_rules(&bars, &ind, &config).unwrap();
        assert_eq!(rules[20], Some(GranvilleRule::NewLow));
    }

    #[test]
    fn lower_rule_wins_ties() {
        // Down-crossing bar that is also a new low in a falling MA: 5 beats 6.
        let mut closes: Vec<f64> = (0..15).map(|i| 120.0 - i as f64 * 0.5).collect();
        closes.extend([120.0, 90.0]);
        let bars = make_bars(&closes);
        let config = small_config();
        let ind = compute_indicators(&bars, 5, 3).unwrap();
        let series = DetectorSeries::compute(&bars, &ind, &config);
        let t = bars.len() - 1;
        assert!(series.holds(GranvilleRule::CrossBelow, t));
        assert!(series.holds(GranvilleRule::NewLow, t));
        assert_eq!(series.classify_bar(t), Some(GranvilleRule::CrossBelow));
    }

    #[test]
    fn misaligned_indicators_rejected() {
        let bars = make_bars(&[100.0; 10]);
        let ind = compute_indicators(&bars[..8], 5, 3).unwrap();
        let err = classify_rules(&bars, &ind, &small_config()).unwrap_err();
        assert!(matches!(err, GranvilleError::SignalProcessing { .. }));
        assert!(classify_signals("2330", &bars, &ind, &small_config()).is_empty());
    }

    #[test]
    fn out_of_order_bars_rejected() {
        let mut bars = make_bars(&[100.0; 10]);
        let ind = compute_indicators(&bars, 5, 3).unwrap();
        bars.swap(3, 4);
        let err = classify_rules(&bars, &ind, &small_config()).unwrap_err();
        assert!(matches!(err, GranvilleError::DataValidation { .. }));
        assert!(classify_signals("2330", &bars, &ind, &small_config()).is_empty());

        let mut bars = make_bars(&[100.0; 10]);
        bars[6].volume = -1.0;
        let err = classify_rules(&bars, &ind, &small_config()).unwrap_err();
        assert!(matches!(err, GranvilleError::DataValidation { .. }));
    }

    /// Every detector off, close sitting on the MA.
    fn quiet_series(len: usize, trend: Trend) -> DetectorSeries {
        let off = || Directional {
            up: vec![false; len],
            down: vec![false; len],
        };
        DetectorSeries {
            trend: vec![trend; len],
            diverged: off(),
            extremes: off(),
            volume_contraction: vec![false; len],
            crossover: off(),
            tests: off(),
            close: vec![100.0; len],
            ma: vec![Some(100.0); len],
        }
    }

    #[test]
    fn support_bounce_looks_back_three_bars() {
        let mut series = quiet_series(12, Trend::Up);
        series.tests.up[10] = true;
        series.diverged.up[7] = true;
        assert!(series.holds(GranvilleRule::SupportBounce, 10));
        assert_eq!(series.classify_bar(10), Some(GranvilleRule::SupportBounce));

        series.diverged.up[7] = false;
        series.diverged.up[6] = true;
        assert!(!series.holds(GranvilleRule::SupportBounce, 10));
        assert_eq!(series.classify_bar(10), None);
    }

    #[test]
    fn support_bounce_needs_rising_ma() {
        let mut series = quiet_series(12, Trend::Flat);
        series.tests.up[10] = true;
        series.diverged.up[9] = true;
        assert!(!series.holds(GranvilleRule::SupportBounce, 10));

        series.trend[10] = Trend::Up;
        assert!(series.holds(GranvilleRule::SupportBounce, 10));
    }

    #[test]
    fn support_bounce_ignores_divergence_on_the_same_bar() {
        let mut series = quiet_series(12, Trend::Up);
        series.tests.up[10] = true;
        series.diverged.up[10] = true;
        assert!(!series.holds(GranvilleRule::SupportBounce, 10));
    }

    #[test]
    fn resistance_reject_looks_back_three_bars() {
        let mut series = quiet_series(12, Trend::Down);
        series.tests.down[10] = true;
        series.diverged.down[7] = true;
        assert!(series.holds(GranvilleRule::ResistanceReject, 10));
        assert_eq!(series.classify_bar(10), Some(GranvilleRule::ResistanceReject));

        series.diverged.down[7] = false;
        series.diverged.down[6] = true;
        assert!(!series.holds(GranvilleRule::ResistanceReject, 10));
        assert_eq!(series.classify_bar(10), None);
    }

    #[test]
    fn resistance_reject_needs_falling_ma() {
        let mut series = quiet_series(12, Trend::Flat);
        series.tests.down[10] = true;
        series.diverged.down[8] = true;
        assert!(!series.holds(GranvilleRule::ResistanceReject, 10));

        series.trend[10] = Trend::Down;
        assert!(series.holds(GranvilleRule::ResistanceReject, 10));
    }

    #[test]
    fn oversold_rebound_on_contracting_volume() {
        let mut series = quiet_series(12, Trend::Flat);
        series.diverged.down[10] = true;
        series.volume_contraction[10] = true;
        assert!(series.holds(GranvilleRule::OversoldRebound, 10));
        assert_eq!(series.classify_bar(10), Some(GranvilleRule::OversoldRebound));

        series.trend[10] = Trend::Up;
        assert!(series.holds(GranvilleRule::OversoldRebound, 10));

        series.trend[10] = Trend::Down;
        assert!(!series.holds(GranvilleRule::OversoldRebound, 10));
    }

    #[test]
    fn oversold_rebound_blocked_by_new_low() {
        let mut series = quiet_series(12, Trend::Flat);
        series.diverged.down[10] = true;
        series.volume_contraction[10] = true;
        series.extremes.down[10] = true;
        assert!(!series.holds(GranvilleRule::OversoldRebound, 10));

        series.extremes.down[10] = false;
        series.volume_contraction[10] = false;
        assert!(!series.holds(GranvilleRule::OversoldRebound, 10));
    }

    #[test]
    fn overbought_fade_on_contracting_volume() {
        let mut series = quiet_series(12, Trend::Flat);
        series.diverged.up[10] = true;
        series.volume_contraction[10] = true;
        assert!(series.holds(GranvilleRule::OverboughtFade, 10));
        assert_eq!(series.classify_bar(10), Some(GranvilleRule::OverboughtFade));

        series.trend[10] = Trend::Down;
        assert!(series.holds(GranvilleRule::OverboughtFade, 10));

        series.trend[10] = Trend::Up;
        assert!(!series.holds(GranvilleRule::OverboughtFade, 10));
    }

    #[test]
    fn overbought_fade_blocked_by_new_high() {
        let mut series = quiet_series(12, Trend::Flat);
        series.diverged.up[10] = true;
        series.volume_contraction[10] = true;
        series.extremes.up[10] = true;
        assert!(!series.holds(GranvilleRule::OverboughtFade, 10));
        assert_eq!(series.classify_bar(10), None);
    }

    #[test]
    fn confidence_base_only() {
        let set = IndicatorSet::default();
        assert!((confidence(&set) - 0.6).abs() < f64::EPSILON);
    }

    #[test]
    fn confidence_volume_tiers() {
        let high = IndicatorSet {
            volume_ratio: Some(1.6),
            ..IndicatorSet::default()
        };
        let moderate = IndicatorSet {
            volume_ratio: Some(1.3),
            ..IndicatorSet::default()
        };
        assert!((confidence(&high) - 0.8).abs() < 1e-12);
        assert!((confidence(&moderate) - 0.7).abs() < 1e-12);
    }

    #[test]
    fn confidence_is_capped() {
        let set = IndicatorSet {
            volume_ratio: Some(3.0),
            ma_slope: Some(-5.0),
            price_change_3d: Some(0.5),
            ..IndicatorSet::default()
        };
        assert!((confidence(&set) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn confidence_scaled_factors() {
        let set = IndicatorSet {
            ma_slope: Some(0.01),
            price_change_3d: Some(-0.01),
            ..IndicatorSet::default()
        };
        assert!((confidence(&set) - (0.6 + 0.1 + 0.05)).abs() < 1e-12);
    }

    #[test]
    fn signals_carry_bar_price_and_date() {
        let mut closes = vec![100.0; 10];
        closes.push(102.0);
        let bars = make_bars(&closes);
        let ind = compute_indicators(&bars, 5, 3).unwrap();
        let signals = classify_signals("2330", &bars, &ind, &small_config());
        assert_eq!(signals.len(), 1);
        let s = &signals[0];
        assert_eq!(s.instrument_id, "2330");
        assert_eq!(s.rule, GranvilleRule::CrossAbove);
        assert_eq!(s.signal_type, SignalType::Buy);
        assert_eq!(s.timestamp, bars[10].timestamp());
        assert!((s.price - 102.0).abs() < f64::EPSILON);
        assert!((0.0..=1.0).contains(&s.confidence));
    }
}
