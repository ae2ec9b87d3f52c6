//! One-shot analysis of an instrument: validation, optional live quote,
//! indicators, signals and the figures a report needs.

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::config::SignalConfig;
use super::error::GranvilleError;
use super::indicator::{IndicatorFrame, IndicatorSet};
use super::ohlcv::{OhlcvBar, validate_bars};
use super::rules::classify_signals;
use super::signal::{Signal, SignalType};

/// A live price observation for the current session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub price: f64,
    pub volume: f64,
    pub timestamp: NaiveDateTime,
}

/// Fold `quote` into the series.
///
/// Updates the last bar when it shares the quote's date, otherwise appends a
/// new single-price bar. Non-positive prices and quotes older than the last
/// bar leave the series unchanged.
pub fn merge_quote(bars: &[OhlcvBar], quote: &Quote) -> Result<Vec<OhlcvBar>, GranvilleError> {
    let Some(last) = bars.last() else {
        return Err(GranvilleError::validation(
            "cannot merge a quote into an empty series",
        ));
    };
    let mut merged = bars.to_vec();
    if !quote.price.is_finite() || quote.price <= 0.0 {
        warn!(price = quote.price, "invalid quote price, skipping merge");
        return Ok(merged);
    }

    let date = quote.timestamp.date();
    if date < last.date {
        warn!(%date, last = %last.date, "quote predates the last bar, skipping merge");
        return Ok(merged);
    }
    if date == last.date {
        if let Some(bar) = merged.last_mut() {
            bar.high = bar.high.max(quote.price);
            bar.low = bar.low.min(quote.price);
            bar.close = quote.price;
            bar.volume += quote.volume.max(0.0);
        }
    } else {
        merged.push(OhlcvBar {
            date,
            open: quote.price,
            high: quote.price,
            low: quote.price,
            close: quote.price,
            volume: quote.volume.max(0.0),
        });
    }
    Ok(merged)
}

/// Last bar's prices with the indicators available on it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatestIndicators {
    pub close: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub volume: f64,
    pub ma: Option<f64>,
    pub vol_avg: Option<f64>,
    pub price_ma_ratio: Option<f64>,
    pub volume_ratio: Option<f64>,
    pub ma_slope: Option<f64>,
}

impl LatestIndicators {
    fn new(bar: &OhlcvBar, set: Option<&IndicatorSet>) -> Self {
        LatestIndicators {
            close: bar.close,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            volume: bar.volume,
            ma: set.and_then(|s| s.ma),
            vol_avg: set.and_then(|s| s.vol_avg),
            price_ma_ratio: set.and_then(|s| s.price_ma_ratio),
            volume_ratio: set.and_then(|s| s.volume_ratio),
            ma_slope: set.and_then(|s| s.ma_slope),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataSummary {
    pub rows: usize,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    pub min_low: f64,
    pub max_high: f64,
    pub latest_close: f64,
    pub avg_volume: f64,
    pub max_volume: f64,
    pub latest_volume: f64,
}

impl DataSummary {
    pub fn from_bars(bars: &[OhlcvBar]) -> Result<Self, GranvilleError> {
        let (Some(first), Some(last)) = (bars.first(), bars.last()) else {
            return Err(GranvilleError::validation("no bars to summarize"));
        };
        let min_low = bars.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
        let max_high = bars.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
        let max_volume = bars.iter().map(|b| b.volume).fold(0.0, f64::max);
        let avg_volume = bars.iter().map(|b| b.volume).sum::<f64>() / bars.len() as f64;
        Ok(DataSummary {
            rows: bars.len(),
            first_date: first.date,
            last_date: last.date,
            min_low,
            max_high,
            latest_close: last.close,
            avg_volume,
            max_volume,
            latest_volume: last.volume,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub instrument_id: String,
    pub signals: Vec<Signal>,
    pub latest_indicators: LatestIndicators,
    pub data_summary: DataSummary,
    pub config_used: SignalConfig,
    pub processing_time_ms: f64,
}

impl AnalysisResult {
    pub fn latest_signal(&self) -> Option<&Signal> {
        super::signal::latest_signal(&self.signals)
    }
}

/// Validate, merge the optional quote, classify.
///
/// Invalid bars are an error. Too few bars for the indicator windows, or a
/// classification failure, only leave the signal list empty.
pub fn analyze(
    instrument_id: &str,
    bars: &[OhlcvBar],
    quote: Option<&Quote>,
    config: &SignalConfig,
) -> Result<AnalysisResult, GranvilleError> {
    let started = Instant::now();
    validate_bars(bars)?;

    let merged;
    let bars = match quote {
        Some(q) => {
            merged = merge_quote(bars, q)?;
            merged.as_slice()
        }
        None => bars,
    };

    let frame = IndicatorFrame::new(bars, config.ma_period, config.volume_period);
    let (signals, latest_set) = match frame.indicators() {
        Ok(sets) => (
            classify_signals(instrument_id, frame.bars(), sets, config),
            sets.last(),
        ),
        Err(e) => {
            warn!(instrument = instrument_id, error = %e, "indicator computation failed, returning no signals");
            (Vec::new(), None)
        }
    };

    let data_summary = DataSummary::from_bars(bars)?;
    let last = bars
        .last()
        .ok_or_else(|| GranvilleError::validation("no bars supplied"))?;
    let latest_indicators = LatestIndicators::new(last, latest_set);

    let processing_time_ms = started.elapsed().as_secs_f64() * 1_000.0;
    info!(
        instrument = instrument_id,
        bars = bars.len(),
        signals = signals.len(),
        processing_time_ms,
        "analysis complete"
    );

    Ok(AnalysisResult {
        instrument_id: instrument_id.to_string(),
        signals,
        latest_indicators,
        data_summary,
        config_used: config.clone(),
        processing_time_ms,
    })
}

/// Condensed view of an `AnalysisResult` for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryReport {
    pub instrument_id: String,
    pub total_signals: usize,
    pub buy_signals: usize,
    pub sell_signals: usize,
    pub avg_confidence: f64,
    pub max_confidence: f64,
    /// Rule number to the number of signals it produced.
    pub rule_distribution: BTreeMap<u8, usize>,
    pub latest_price: f64,
    pub latest_ma: Option<f64>,
    pub price_ma_ratio: Option<f64>,
}

impl SummaryReport {
    pub fn from_analysis(result: &AnalysisResult) -> Result<Self, GranvilleError> {
        if let Some(bad) = result
            .signals
            .iter()
            .find(|s| !s.confidence.is_finite())
        {
            return Err(GranvilleError::output(
                &result.instrument_id,
                "summary",
                format!("non-finite confidence on {}", bad.timestamp),
            ));
        }

        let signals = &result.signals;
        let count = |t: SignalType| signals.iter().filter(|s| s.signal_type == t).count();
        let mut rule_distribution = BTreeMap::new();
        for s in signals {
            *rule_distribution.entry(s.rule_number()).or_insert(0) += 1;
        }
        let (avg_confidence, max_confidence) = if signals.is_empty() {
            (0.0, 0.0)
        } else {
            let sum: f64 = signals.iter().map(|s| s.confidence).sum();
            let max = signals.iter().map(|s| s.confidence).fold(0.0, f64::max);
            (sum / signals.len() as f64, max)
        };

        Ok(SummaryReport {
            instrument_id: result.instrument_id.clone(),
            total_signals: signals.len(),
            buy_signals: count(SignalType::Buy),
            sell_signals: count(SignalType::Sell),
            avg_confidence: round3(avg_confidence),
            max_confidence: round3(max_confidence),
            rule_distribution,
            latest_price: result.latest_indicators.close,
            latest_ma: result.latest_indicators.ma,
            price_ma_ratio: result.latest_indicators.price_ma_ratio,
        })
    }
}

fn round3(value: f64) -> f64 {
    (value * 1_000.0).round() / 1_000.0
}
