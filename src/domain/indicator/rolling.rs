//! Trailing-window aggregations over ordered series.
//!
//! Output is aligned with the input: index `i` holds the aggregate of the
//! window ending at `i`, or `None` while the window is still filling.

/// Simple moving average. Each window is summed directly, so rounding error
/// does not carry from one window to the next.
pub fn sma(values: &[f64], window: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if window == 0 || values.len() < window {
        return out;
    }
    for (i, w) in values.windows(window).enumerate() {
        out[i + window - 1] = Some(w.iter().sum::<f64>() / window as f64);
    }
    out
}

pub fn rolling_max(values: &[f64], window: usize) -> Vec<Option<f64>> {
    rolling_fold(values, window, f64::max)
}

pub fn rolling_min(values: &[f64], window: usize) -> Vec<Option<f64>> {
    rolling_fold(values, window, f64::min)
}

fn rolling_fold(values: &[f64], window: usize, f: fn(f64, f64) -> f64) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if window == 0 || values.len() < window {
        return out;
    }
    for (i, w) in values.windows(window).enumerate() {
        out[i + window - 1] = w.iter().copied().reduce(f);
    }
    out
}

/// `(values[i] - values[i - periods]) / divisor`, `None` if either end is missing.
pub fn diff(values: &[Option<f64>], periods: usize, divisor: f64) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            let prev = i.checked_sub(periods)?;
            Some((values[i]? - values[prev]?) / divisor)
        })
        .collect()
}

/// Fractional change over `periods` bars.
pub fn pct_change(values: &[f64], periods: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            let prev = values[i.checked_sub(periods)?];
            if prev == 0.0 {
                None
            } else {
                Some(values[i] / prev - 1.0)
            }
        })
        .collect()
}

/// Lift a dense series into the optional form the detectors consume.
pub fn dense(values: &[f64]) -> Vec<Option<f64>> {
    values.iter().copied().map(Some).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn sma_warmup_and_values() {
        let out = sma(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        assert_eq!(out[0], None);
        assert_eq!(out[1], None);
        assert_relative_eq!(out[2].unwrap(), 2.0);
        assert_relative_eq!(out[3].unwrap(), 3.0);
        assert_relative_eq!(out[4].unwrap(), 4.0);
    }

    #[test]
    fn sma_window_longer_than_series() {
        assert!(sma(&[1.0, 2.0], 3).iter().all(Option::is_none));
    }

    #[test]
    fn sma_zero_window() {
        assert!(sma(&[1.0, 2.0], 0).iter().all(Option::is_none));
    }

    #[test]
    fn sma_constant_is_exact() {
        let out = sma(&[100.0; 10], 4);
        for v in out.iter().skip(3) {
            assert_eq!(*v, Some(100.0));
        }
    }

    #[test]
    fn rolling_extremes() {
        let values = [3.0, 1.0, 4.0, 1.0, 5.0];
        let max = rolling_max(&values, 2);
        let min = rolling_min(&values, 2);
        assert_eq!(max, vec![None, Some(3.0), Some(4.0), Some(4.0), Some(5.0)]);
        assert_eq!(min, vec![None, Some(1.0), Some(1.0), Some(1.0), Some(1.0)]);
    }

    #[test]
    fn diff_skips_missing() {
        let values = vec![None, Some(2.0), Some(4.0), Some(10.0)];
        let out = diff(&values, 2, 2.0);
        assert_eq!(out[0], None);
        assert_eq!(out[1], None);
        assert_eq!(out[2], None);
        assert_relative_eq!(out[3].unwrap(), 4.0);
    }

    #[test]
    fn pct_change_periods() {
        let out = pct_change(&[100.0, 110.0, 121.0, 100.0], 1);
        assert_eq!(out[0], None);
        assert_relative_eq!(out[1].unwrap(), 0.1, epsilon = 1e-12);
        assert_relative_eq!(out[2].unwrap(), 0.1, epsilon = 1e-12);

        let three = pct_change(&[100.0, 110.0, 121.0, 150.0], 3);
        assert_relative_eq!(three[3].unwrap(), 0.5, epsilon = 1e-12);
    }
}
