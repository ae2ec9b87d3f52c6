//! Performance statistics derived from a trade ledger.

use serde::Serialize;

use super::backtest::{TradeAction, TradeRecord};
use super::error::GranvilleError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSummary {
    /// `(final_cash - initial_capital) / initial_capital`, as a fraction.
    pub total_return: f64,
    /// Share of SELL records with positive realized profit.
    pub win_rate: f64,
    /// Number of SELL records.
    pub total_trades: usize,
    /// Mean over sample standard deviation of per-trade return ratios,
    /// scaled by the square root of the trade count. Not annualized.
    pub sharpe_ratio: f64,
}

impl PerformanceSummary {
    /// Recompute everything from `trades`; nothing is carried between calls.
    pub fn compute(
        instrument_id: &str,
        trades: &[TradeRecord],
        initial_capital: f64,
        final_cash: f64,
    ) -> Result<Self, GranvilleError> {
        if !initial_capital.is_finite() || initial_capital <= 0.0 {
            return Err(GranvilleError::backtest(
                instrument_id,
                "performance",
                format!("initial capital must be positive, got {initial_capital}"),
            ));
        }
        if !final_cash.is_finite() {
            return Err(GranvilleError::backtest(
                instrument_id,
                "performance",
                "final cash is not a finite number",
            ));
        }

        let sells: Vec<&TradeRecord> = trades
            .iter()
            .filter(|t| t.action == TradeAction::Sell)
            .collect();
        let total_trades = sells.len();
        let wins = sells.iter().filter(|t| t.realized_profit > 0.0).count();
        let win_rate = if total_trades > 0 {
            wins as f64 / total_trades as f64
        } else {
            0.0
        };

        let ratios: Vec<f64> = sells
            .iter()
            .map(|t| t.realized_profit / (t.trade_value - t.realized_profit))
            .filter(|r| r.is_finite())
            .collect();

        Ok(PerformanceSummary {
            total_return: (final_cash - initial_capital) / initial_capital,
            win_rate,
            total_trades,
            sharpe_ratio: trade_sharpe(&ratios),
        })
    }
}

fn trade_sharpe(ratios: &[f64]) -> f64 {
    let n = ratios.len();
    if n < 2 {
        return 0.0;
    }
    let mean = ratios.iter().sum::<f64>() / n as f64;
    let variance = ratios.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    let std_dev = variance.sqrt();
    if std_dev == 0.0 {
        return 0.0;
    }
    mean / std_dev * (n as f64).sqrt()
}
