//! Single-position backtest simulator.
//!
//! The run is an ordered fold over the bars: each bar first checks the exits
//! of an open position, then (if flat) the entry. A position still open after
//! the last bar is closed at the final close.

use chrono::NaiveDate;
use serde::{Serialize, Serializer};
use tracing::{debug, info};

use super::config::{BacktestConfig, SignalConfig};
use super::detectors::{self, Directional};
use super::error::GranvilleError;
use super::indicator::compute_indicators;
use super::indicator::rolling::{dense, sma};
use super::metrics::PerformanceSummary;
use super::ohlcv::{OhlcvBar, ensure_well_formed, validate_bars};
use super::position::{Fill, Position};
use super::rules::{GranvilleRule, classify_rules};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Crossing {
    Up,
    Down,
    #[default]
    None,
}

impl Crossing {
    fn at(series: &Directional, t: usize) -> Self {
        if series.up[t] {
            Crossing::Up
        } else if series.down[t] {
            Crossing::Down
        } else {
            Crossing::None
        }
    }
}

/// Everything the simulator needs to know about one bar besides its prices.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct BarSignals {
    pub granville: Option<GranvilleRule>,
    /// Fast MA against the slow MA: golden (up) or death (down) cross.
    pub cross: Crossing,
    /// Close against the slow MA.
    pub breakout: Crossing,
}

/// Validate the bars, classify every bar and derive the cross and breakout
/// series.
pub fn prepare_signals(
    bars: &[OhlcvBar],
    signal_config: &SignalConfig,
    backtest_config: &BacktestConfig,
) -> Result<Vec<BarSignals>, GranvilleError> {
    validate_bars(bars)?;
    let indicators = compute_indicators(bars, signal_config.ma_period, signal_config.volume_period)?;
    let granville = classify_rules(bars, &indicators, signal_config)?;

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let slow: Vec<Option<f64>> = indicators.iter().map(|s| s.ma).collect();
    let fast = sma(&closes, backtest_config.fast_ma_period);
    let cross = detectors::crossover(&fast, &slow);
    let breakout = detectors::crossover(&dense(&closes), &slow);

    Ok((0..bars.len())
        .map(|t| BarSignals {
            granville: granville[t],
            cross: Crossing::at(&cross, t),
            breakout: Crossing::at(&breakout, t),
        })
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    Buy,
    Sell,
}

impl std::fmt::Display for TradeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeAction::Buy => f.pad("BUY"),
            TradeAction::Sell => f.pad("SELL"),
        }
    }
}

/// Why a trade happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeLabel {
    Rule(GranvilleRule),
    TakeProfit,
    DeathCross,
    BreakoutDown,
    /// End-of-series liquidation.
    ForcedClose,
}

impl std::fmt::Display for TradeLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeLabel::Rule(rule) => write!(f, "{}: {}", rule, rule.description()),
            TradeLabel::TakeProfit => write!(f, "take profit"),
            TradeLabel::DeathCross => write!(f, "death cross"),
            TradeLabel::BreakoutDown => write!(f, "breakout down"),
            TradeLabel::ForcedClose => write!(f, "forced close"),
        }
    }
}

impl Serialize for TradeLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One executed trade. Field order is part of the report format.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeRecord {
    pub date: NaiveDate,
    pub action: TradeAction,
    pub price: f64,
    pub shares: u64,
    pub trade_value: f64,
    pub cash_after: f64,
    pub realized_profit: f64,
    pub total_capital_after: f64,
    pub rule_label: TradeLabel,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalPosition {
    pub instrument_id: String,
    pub shares_held: u64,
    pub last_close: f64,
    pub market_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestResult {
    pub instrument_id: String,
    pub initial_capital: f64,
    pub final_cash: f64,
    pub trades: Vec<TradeRecord>,
    pub performance: PerformanceSummary,
    pub final_position: FinalPosition,
    pub equity_curve: Vec<EquityPoint>,
}

/// Prepare signals and simulate in one call.
pub fn backtest(
    instrument_id: &str,
    bars: &[OhlcvBar],
    signal_config: &SignalConfig,
    backtest_config: &BacktestConfig,
) -> Result<BacktestResult, GranvilleError> {
    let signals = prepare_signals(bars, signal_config, backtest_config)?;
    run_backtest(bars, &signals, instrument_id, backtest_config)
}

/// Replay `bars` with their aligned `signals` through a single long position.
pub fn run_backtest(
    bars: &[OhlcvBar],
    signals: &[BarSignals],
    instrument_id: &str,
    config: &BacktestConfig,
) -> Result<BacktestResult, GranvilleError> {
    let Some(last) = bars.last() else {
        return Err(GranvilleError::backtest(instrument_id, "input", "no bars"));
    };
    if bars.len() != signals.len() {
        return Err(GranvilleError::backtest(
            instrument_id,
            "input",
            format!("{} bars but {} signal rows", bars.len(), signals.len()),
        ));
    }
    ensure_well_formed(bars)?;

    let mut position = Position::flat(config.initial_capital);
    let mut trades = Vec::new();
    let mut equity_curve = Vec::with_capacity(bars.len());

    for (bar, sig) in bars.iter().zip(signals) {
        if position.is_long() {
            if let Some((price, label)) = exit_trigger(&position, bar, sig, config) {
                if let Some(fill) = position.sell(price) {
                    trades.push(record(bar.date, TradeAction::Sell, &fill, &position, bar, label));
                    debug!(instrument = instrument_id, date = %bar.date, %label, price, "sell");
                }
            }
        }

        if !position.is_long() {
            if let Some(rule) = entry_trigger(sig) {
                if let Some(fill) = position.buy(bar.close) {
                    let label = TradeLabel::Rule(rule);
                    trades.push(record(bar.date, TradeAction::Buy, &fill, &position, bar, label));
                    debug!(instrument = instrument_id, date = %bar.date, %label, price = bar.close, shares = fill.shares, "buy");
                }
            }
        }

        let equity = position.equity(bar.close);
        if !equity.is_finite() || equity < 0.0 {
            return Err(GranvilleError::backtest(
                instrument_id,
                "simulation",
                format!("equity {equity} on {} violates cash conservation", bar.date),
            ));
        }
        equity_curve.push(EquityPoint {
            date: bar.date,
            equity,
        });
    }

    if position.is_long() {
        let label = TradeLabel::ForcedClose;
        if let Some(fill) = position.sell(last.close) {
            trades.push(record(last.date, TradeAction::Sell, &fill, &position, last, label));
            debug!(instrument = instrument_id, date = %last.date, %label, "end-of-series liquidation");
        }
    }

    let performance = PerformanceSummary::compute(
        instrument_id,
        &trades,
        config.initial_capital,
        position.cash,
    )?;
    info!(
        instrument = instrument_id,
        trades = performance.total_trades,
        total_return = performance.total_return,
        "backtest complete"
    );

    Ok(BacktestResult {
        instrument_id: instrument_id.to_string(),
        initial_capital: config.initial_capital,
        final_cash: position.cash,
        final_position: FinalPosition {
            instrument_id: instrument_id.to_string(),
            shares_held: position.shares_held,
            last_close: last.close,
            market_value: position.market_value(last.close),
        },
        trades,
        performance,
        equity_curve,
    })
}

/// First matching exit: take-profit on the high, then a Granville sell rule,
/// a death cross, a breakout down.
fn exit_trigger(
    position: &Position,
    bar: &OhlcvBar,
    sig: &BarSignals,
    config: &BacktestConfig,
) -> Option<(f64, TradeLabel)> {
    let target = position.take_profit_price(config.take_profit_pct);
    if bar.high >= target {
        return Some((target, TradeLabel::TakeProfit));
    }
    if let Some(rule) = sig.granville.filter(|r| r.is_sell()) {
        return Some((bar.close, TradeLabel::Rule(rule)));
    }
    if sig.cross == Crossing::Down {
        return Some((bar.close, TradeLabel::DeathCross));
    }
    if sig.breakout == Crossing::Down {
        return Some((bar.close, TradeLabel::BreakoutDown));
    }
    None
}

/// A Granville buy rule confirmed by a golden cross or an upward breakout.
fn entry_trigger(sig: &BarSignals) -> Option<GranvilleRule> {
    let rule = sig.granville.filter(|r| r.is_buy())?;
    let confirmed = sig.cross == Crossing::Up || sig.breakout == Crossing::Up;
    confirmed.then_some(rule)
}

fn record(
    date: NaiveDate,
    action: TradeAction,
    fill: &Fill,
    position: &Position,
    bar: &OhlcvBar,
    rule_label: TradeLabel,
) -> TradeRecord {
    TradeRecord {
        date,
        action,
        price: fill.price,
        shares: fill.shares,
        trade_value: fill.value,
        cash_after: position.cash,
        realized_profit: fill.profit,
        total_capital_after: position.equity(bar.close),
        rule_label,
    }
}
