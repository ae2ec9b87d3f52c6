//! Boolean rule detectors.
//!
//! Each detector is a pure function over price/MA/volume series and returns
//! series aligned to the bar index. Missing inputs (`None`) never satisfy a
//! condition.

use super::indicator::rolling::{rolling_max, rolling_min};

/// Absolute MA change over the trend window that still counts as flat.
const FLAT_EPSILON: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Down,
    Flat,
    Up,
}

impl Trend {
    pub fn as_i8(self) -> i8 {
        match self {
            Trend::Down => -1,
            Trend::Flat => 0,
            Trend::Up => 1,
        }
    }
}

/// A pair of aligned boolean series for the upward and downward variant of a
/// condition.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Directional {
    pub up: Vec<bool>,
    pub down: Vec<bool>,
}

impl Directional {
    fn with_len(len: usize) -> Self {
        Directional {
            up: vec![false; len],
            down: vec![false; len],
        }
    }
}

/// MA direction from `ma[t] - ma[t - window]`. Bars without both ends are flat.
pub fn ma_trend(ma: &[Option<f64>], window: usize) -> Vec<Trend> {
    (0..ma.len())
        .map(|t| {
            let change = t
                .checked_sub(window)
                .and_then(|prev| Some(ma[t]? - ma[prev]?));
            match change {
                Some(c) if c > FLAT_EPSILON => Trend::Up,
                Some(c) if c < -FLAT_EPSILON => Trend::Down,
                _ => Trend::Flat,
            }
        })
        .collect()
}

/// `up`: price more than `threshold` percent above the MA; `down`: below.
pub fn diverged(price: &[f64], ma: &[Option<f64>], threshold: f64) -> Directional {
    let mut out = Directional::with_len(price.len());
    for (t, &p) in price.iter().enumerate() {
        if let Some(dev) = deviation_pct(p, ma[t]) {
            out.up[t] = dev > threshold;
            out.down[t] = dev < -threshold;
        }
    }
    out
}

/// `up`: new high, `down`: new low.
///
/// A bar is a new high when it equals the rolling max over `window` bars and
/// is at least as high as the bar before it. Bars inside the first window
/// are never extremes.
pub fn new_highs_lows(price: &[f64], window: usize) -> Directional {
    let mut out = Directional::with_len(price.len());
    let highs = rolling_max(price, window);
    let lows = rolling_min(price, window);
    for t in 1..price.len() {
        let (p, prev) = (price[t], price[t - 1]);
        out.up[t] = highs[t].is_some_and(|m| p == m && p >= prev);
        out.down[t] = lows[t].is_some_and(|m| p == m && p <= prev);
    }
    out
}

/// Volume below `ratio` times its average.
pub fn volume_contraction(volume: &[f64], vol_avg: &[Option<f64>], ratio: f64) -> Vec<bool> {
    volume
        .iter()
        .zip(vol_avg)
        .map(|(&v, avg)| match avg {
            Some(a) if *a > 0.0 => v / a < ratio,
            _ => false,
        })
        .collect()
}

/// `up`: `fast` closes above `slow` after being at or below it the bar
/// before; `down` is the mirror. Works for price/MA and MA/MA pairs.
pub fn crossover(fast: &[Option<f64>], slow: &[Option<f64>]) -> Directional {
    let mut out = Directional::with_len(fast.len());
    for t in 1..fast.len() {
        let (Some(f), Some(s), Some(pf), Some(ps)) = (fast[t], slow[t], fast[t - 1], slow[t - 1])
        else {
            continue;
        };
        out.up[t] = f > s && pf <= ps;
        out.down[t] = f < s && pf >= ps;
    }
    out
}

/// `up`: support test (price within `tolerance` percent of the MA, at or
/// below it); `down`: resistance test (within tolerance, at or above it).
pub fn support_resistance(price: &[f64], ma: &[Option<f64>], tolerance: f64) -> Directional {
    let mut out = Directional::with_len(price.len());
    for (t, &p) in price.iter().enumerate() {
        let (Some(dev), Some(m)) = (deviation_pct(p, ma[t]), ma[t]) else {
            continue;
        };
        if dev.abs() <= tolerance {
            out.up[t] = p <= m;
            out.down[t] = p >= m;
        }
    }
    out
}

fn deviation_pct(price: f64, ma: Option<f64>) -> Option<f64> {
    let m = ma.filter(|m| *m != 0.0)?;
    Some((price - m) / m * 100.0)
}
