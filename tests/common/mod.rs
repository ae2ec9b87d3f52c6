#![allow(dead_code)]

use chrono::NaiveDate;
use granville::domain::error::GranvilleError;
pub use granville::domain::ohlcv::OhlcvBar;
use granville::ports::data_port::DataPort;
use std::collections::HashMap;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<OhlcvBar>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, code: &str, bars: Vec<OhlcvBar>) -> Self {
        self.data.insert(code.to_string(), bars);
        self
    }

    pub fn with_error(mut self, code: &str, reason: &str) -> Self {
        self.errors.insert(code.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_ohlcv(
        &self,
        code: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<OhlcvBar>, GranvilleError> {
        if let Some(reason) = self.errors.get(code) {
            return Err(GranvilleError::validation(reason.clone()));
        }
        Ok(self
            .data
            .get(code)
            .map(|bars| {
                bars.iter()
                    .filter(|b| start.is_none_or(|s| b.date >= s))
                    .filter(|b| end.is_none_or(|e| b.date <= e))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn list_symbols(&self) -> Result<Vec<String>, GranvilleError> {
        let mut symbols: Vec<String> = self.data.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// A bar whose high/low sit one point either side of the close.
pub fn make_bar(day: NaiveDate, close: f64, volume: f64) -> OhlcvBar {
    OhlcvBar {
        date: day,
        open: close,
        high: close + 1.0,
        low: close - 1.0,
        close,
        volume,
    }
}

/// Daily bars from 2024-01-01, one per close.
pub fn bars_from_closes(closes: &[f64]) -> Vec<OhlcvBar> {
    let start = date(2024, 1, 1);
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| make_bar(start + chrono::Duration::days(i as i64), c, 1_000.0))
        .collect()
}

pub fn flat_bars(count: usize, price: f64) -> Vec<OhlcvBar> {
    bars_from_closes(&vec![price; count])
}

/// Evenly spaced closes from `from` to `to` inclusive.
pub fn ramp_bars(count: usize, from: f64, to: f64) -> Vec<OhlcvBar> {
    let step = (to - from) / (count - 1) as f64;
    let closes: Vec<f64> = (0..count).map(|i| from + step * i as f64).collect();
    bars_from_closes(&closes)
}

/// 25 bars at 100, a jump to 104 that crosses the 20-bar MA, a plateau,
/// and a final bar at 110.
pub fn breakout_bars() -> Vec<OhlcvBar> {
    let mut closes = vec![100.0; 25];
    closes.extend(std::iter::repeat_n(104.0, 9));
    closes.push(110.0);
    bars_from_closes(&closes)
}
