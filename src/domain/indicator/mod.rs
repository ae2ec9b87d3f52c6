//! Per-bar indicator derivation.
//!
//! - `IndicatorSet`: the derived values for one bar, `None` where the
//!   trailing window is not yet available
//! - `compute_indicators`: one `IndicatorSet` per bar
//! - `IndicatorFrame`: bars plus lazily computed, cached indicators for a run

pub mod rolling;

use std::cell::OnceCell;

use serde::Serialize;

use crate::domain::error::GranvilleError;
use crate::domain::ohlcv::{OhlcvBar, ensure_well_formed};

/// Bars used for the backward MA slope.
pub const SLOPE_PERIODS: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndicatorSet {
    pub ma: Option<f64>,
    pub vol_avg: Option<f64>,
    pub ma_slope: Option<f64>,
    pub price_ma_ratio: Option<f64>,
    pub volume_ratio: Option<f64>,
    pub price_change: Option<f64>,
    pub price_change_3d: Option<f64>,
    /// `(close - ma) / ma * 100`
    pub deviation_pct: Option<f64>,
}

pub fn compute_indicators(
    bars: &[OhlcvBar],
    ma_period: usize,
    volume_period: usize,
) -> Result<Vec<IndicatorSet>, GranvilleError> {
    if ma_period == 0 || volume_period == 0 {
        return Err(GranvilleError::validation(
            "indicator windows must be at least 1",
        ));
    }
    let minimum = ma_period.max(volume_period);
    if bars.len() < minimum {
        return Err(GranvilleError::InsufficientData {
            bars: bars.len(),
            minimum,
        });
    }
    ensure_well_formed(bars)?;

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();

    let ma = rolling::sma(&closes, ma_period);
    let vol_avg = rolling::sma(&volumes, volume_period);
    let ma_slope = rolling::diff(&ma, SLOPE_PERIODS, SLOPE_PERIODS as f64);
    let price_change = rolling::pct_change(&closes, 1);
    let price_change_3d = rolling::pct_change(&closes, 3);

    let sets = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            let ma_i = ma[i].filter(|m| *m != 0.0);
            let vol_avg_i = vol_avg[i];
            IndicatorSet {
                ma: ma[i],
                vol_avg: vol_avg_i,
                ma_slope: ma_slope[i],
                price_ma_ratio: ma_i.map(|m| bar.close / m),
                volume_ratio: vol_avg_i
                    .filter(|v| *v != 0.0)
                    .map(|v| bar.volume / v),
                price_change: price_change[i],
                price_change_3d: price_change_3d[i],
                deviation_pct: ma_i.map(|m| (bar.close - m) / m * 100.0),
            }
        })
        .collect();

    Ok(sets)
}

/// Bars of one analysis run with their indicators computed on first use.
pub struct IndicatorFrame<'a> {
    bars: &'a [OhlcvBar],
    ma_period: usize,
    volume_period: usize,
    cache: OnceCell<Vec<IndicatorSet>>,
}

impl<'a> IndicatorFrame<'a> {
    pub fn new(bars: &'a [OhlcvBar], ma_period: usize, volume_period: usize) -> Self {
        IndicatorFrame {
            bars,
            ma_period,
            volume_period,
            cache: OnceCell::new(),
        }
    }

    pub fn bars(&self) -> &'a [OhlcvBar] {
        self.bars
    }

    /// Computes on the first call; later calls return the cached sets.
    /// A failed computation is not cached.
    pub fn indicators(&self) -> Result<&[IndicatorSet], GranvilleError> {
        if let Some(sets) = self.cache.get() {
            return Ok(sets.as_slice());
        }
        let sets = compute_indicators(self.bars, self.ma_period, self.volume_period)?;
        Ok(self.cache.get_or_init(|| sets).as_slice())
    }

    pub fn is_computed(&self) -> bool {
        self.cache.get().is_some()
    }
}
