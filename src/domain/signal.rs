//! Directional signals and their deduplication.
//!
//! - `Signal`: one fired rule on one bar
//! - `filter_signals`: pure, per-run collapse of near-duplicates
//! - `SignalCache`: caller-owned memory across runs, driven by a `Clock`

use std::collections::HashMap;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::rules::GranvilleRule;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalType {
    Buy,
    Sell,
}

impl std::fmt::Display for SignalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalType::Buy => f.pad("BUY"),
            SignalType::Sell => f.pad("SELL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    pub instrument_id: String,
    #[serde(rename = "rule_number")]
    pub rule: GranvilleRule,
    pub signal_type: SignalType,
    pub timestamp: NaiveDateTime,
    pub price: f64,
    /// In `[0.0, 1.0]`.
    pub confidence: f64,
}

impl Signal {
    pub fn rule_number(&self) -> u8 {
        self.rule.number()
    }

    fn key(&self) -> (&str, GranvilleRule) {
        (self.instrument_id.as_str(), self.rule)
    }
}

/// Sort by timestamp and drop any signal that follows an accepted signal for
/// the same instrument and rule by less than `window_minutes`.
pub fn filter_signals(mut signals: Vec<Signal>, window_minutes: i64) -> Vec<Signal> {
    signals.sort_by_key(|s| s.timestamp);
    let window = Duration::minutes(window_minutes);

    let mut last_accepted: HashMap<(String, GranvilleRule), NaiveDateTime> = HashMap::new();
    let mut kept = Vec::with_capacity(signals.len());
    for signal in signals {
        let key = (signal.instrument_id.clone(), signal.rule);
        let duplicate = last_accepted
            .get(&key)
            .is_some_and(|prev| (signal.timestamp - *prev).abs() < window);
        if duplicate {
            continue;
        }
        last_accepted.insert(key, signal.timestamp);
        kept.push(signal);
    }
    kept
}

/// The most recent signal, if any.
pub fn latest_signal(signals: &[Signal]) -> Option<&Signal> {
    signals.iter().max_by_key(|s| s.timestamp)
}

pub trait Clock {
    fn now(&self) -> NaiveDateTime;
}

/// Local wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

/// Always reports the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// Remembers which signals were already passed on, keyed by instrument and
/// rule, so a polling caller notifies each signal once.
pub struct SignalCache<C: Clock> {
    clock: C,
    window: Duration,
    seen: HashMap<(String, GranvilleRule), NaiveDateTime>,
}

impl<C: Clock> SignalCache<C> {
    pub fn new(clock: C, window_minutes: i64) -> Self {
        SignalCache {
            clock,
            window: Duration::minutes(window_minutes),
            seen: HashMap::new(),
        }
    }

    /// True when `signal` is dated today and nothing with the same key was
    /// admitted within the window. Admitted signals are remembered.
    pub fn admit(&mut self, signal: &Signal) -> bool {
        if signal.timestamp.date() != self.clock.now().date() {
            return false;
        }
        let (instrument, rule) = signal.key();
        if let Some(prev) = self.seen.get(&(instrument.to_string(), rule)) {
            if (signal.timestamp - *prev).abs() < self.window {
                return false;
            }
        }
        self.seen
            .insert((instrument.to_string(), rule), signal.timestamp);
        true
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }
}
