//! Daily OHLCV bar representation and ingestion checks.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::error::GranvilleError;

/// Single-day move above which a bar is reported as suspicious.
const EXTREME_MOVE: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OhlcvBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl OhlcvBar {
    /// Midnight of the bar's date; daily bars carry no intraday time.
    pub fn timestamp(&self) -> NaiveDateTime {
        self.date.and_time(NaiveTime::MIN)
    }

    fn ohlc_consistent(&self) -> bool {
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
    }
}

/// Fail on empty input, non-positive or non-finite prices, negative volume
/// and dates that are not strictly increasing.
/// Run by every domain entry point that consumes bars.
pub fn ensure_well_formed(bars: &[OhlcvBar]) -> Result<(), GranvilleError> {
    if bars.is_empty() {
        return Err(GranvilleError::validation("no bars supplied"));
    }

    for (i, bar) in bars.iter().enumerate() {
        for (name, value) in [
            ("open", bar.open),
            ("high", bar.high),
            ("low", bar.low),
            ("close", bar.close),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(GranvilleError::validation(format!(
                    "non-positive {} {} on {}",
                    name, value, bar.date
                )));
            }
        }
        if !bar.volume.is_finite() || bar.volume < 0.0 {
            return Err(GranvilleError::validation(format!(
                "negative volume {} on {}",
                bar.volume, bar.date
            )));
        }
        if i > 0 && bar.date <= bars[i - 1].date {
            return Err(GranvilleError::validation(format!(
                "dates not strictly increasing: {} follows {}",
                bar.date,
                bars[i - 1].date
            )));
        }
    }
    Ok(())
}

/// Reject malformed input before any indicator sees it.
///
/// Applies `ensure_well_formed`, then logs inconsistent OHLC ranges and
/// extreme close-to-close moves without failing.
pub fn validate_bars(bars: &[OhlcvBar]) -> Result<(), GranvilleError> {
    ensure_well_formed(bars)?;

    let inconsistent = bars.iter().filter(|b| !b.ohlc_consistent()).count();
    let extreme_moves = bars
        .windows(2)
        .filter(|w| (w[1].close / w[0].close - 1.0).abs() > EXTREME_MOVE)
        .count();

    if inconsistent > 0 {
        warn!(rows = inconsistent, "bars with inconsistent OHLC ranges");
    }
    if extreme_moves > 0 {
        warn!(rows = extreme_moves, "extreme close-to-close moves (>50%)");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(day: u32, close: f64) -> OhlcvBar {
        OhlcvBar {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1_000.0,
        }
    }

    #[test]
    fn timestamp_is_midnight() {
        let b = bar(15, 100.0);
        assert_eq!(
            b.timestamp(),
            NaiveDate::from_ymd_opt(2024, 1, 15)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        );
    }

    #[test]
    fn valid_series_passes() {
        let bars = vec![bar(1, 100.0), bar(2, 101.0), bar(3, 99.0)];
        assert!(validate_bars(&bars).is_ok());
    }

    #[test]
    fn empty_series_rejected() {
        let err = validate_bars(&[]).unwrap_err();
        assert!(matches!(err, GranvilleError::DataValidation { .. }));
    }

    #[test]
    fn non_positive_price_rejected() {
        let mut bars = vec![bar(1, 100.0), bar(2, 101.0)];
        bars[1].low = 0.0;
        let err = validate_bars(&bars).unwrap_err();
        assert!(err.to_string().contains("non-positive low"));
    }

    #[test]
    fn nan_price_rejected() {
        let mut bars = vec![bar(1, 100.0)];
        bars[0].close = f64::NAN;
        assert!(validate_bars(&bars).is_err());
    }

    #[test]
    fn negative_volume_rejected() {
        let mut bars = vec![bar(1, 100.0)];
        bars[0].volume = -5.0;
        let err = validate_bars(&bars).unwrap_err();
        assert!(err.to_string().contains("negative volume"));
    }

    #[test]
    fn duplicate_date_rejected() {
        let bars = vec![bar(1, 100.0), bar(1, 101.0)];
        let err = validate_bars(&bars).unwrap_err();
        assert!(err.to_string().contains("strictly increasing"));
    }

    #[test]
    fn out_of_order_rejected() {
        let bars = vec![bar(2, 100.0), bar(1, 101.0)];
        assert!(validate_bars(&bars).is_err());
    }

    #[test]
    fn inconsistent_ohlc_only_warns() {
        let mut bars = vec![bar(1, 100.0), bar(2, 101.0)];
        bars[1].high = 90.0;
        assert!(validate_bars(&bars).is_ok());
    }

    #[test]
    fn extreme_move_only_warns() {
        let bars = vec![bar(1, 100.0), bar(2, 200.0)];
        assert!(validate_bars(&bars).is_ok());
    }

    #[test]
    fn well_formed_check_skips_quality_warnings() {
        let mut bars = vec![bar(1, 100.0), bar(2, 200.0)];
        bars[1].high = 90.0;
        assert!(ensure_well_formed(&bars).is_ok());

        bars[0].low = -1.0;
        let err = ensure_well_formed(&bars).unwrap_err();
        assert!(err.to_string().contains("non-positive low"));
    }

    #[test]
    fn zero_volume_allowed() {
        let mut bars = vec![bar(1, 100.0)];
        bars[0].volume = 0.0;
        assert!(validate_bars(&bars).is_ok());
    }
}
