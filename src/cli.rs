//! CLI definition and dispatch.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_report_adapter::JsonReportAdapter;
use crate::domain::analysis::{AnalysisResult, DataSummary, SummaryReport, analyze};
use crate::domain::backtest::{BacktestResult, backtest};
use crate::domain::config::{BacktestConfig, SignalConfig};
use crate::domain::config_validation::{validate_backtest_config, validate_signal_config};
use crate::domain::error::GranvilleError;
use crate::domain::ohlcv::{OhlcvBar, validate_bars};
use crate::domain::rules::GranvilleRule;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(
    name = "granville",
    about = "Granville eight-rule signal analysis and backtesting"
)]
pub struct Cli {
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Where bars and settings come from.
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// INI file with [data], [signal], [detectors] and [backtest] sections
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Directory holding <CODE>.csv files (overrides [data] directory)
    #[arg(short, long)]
    pub data_dir: Option<PathBuf>,
}

/// Instrument and date range to load.
#[derive(Args, Debug, Clone)]
pub struct RangeArgs {
    #[arg(long)]
    pub code: String,
    /// First date to include (YYYY-MM-DD)
    #[arg(long)]
    pub start: Option<NaiveDate>,
    /// Last date to include (YYYY-MM-DD)
    #[arg(long)]
    pub end: Option<NaiveDate>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Classify bars against the eight rules
    Analyze {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        range: RangeArgs,
        /// Write a JSON report here
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Keep near-duplicate signals
        #[arg(long)]
        no_filter: bool,
    },
    /// Replay the signals through the single-position simulator
    Backtest {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        range: RangeArgs,
        /// Write a JSON report here
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Take-profit as a fraction of the entry price (overrides config)
        #[arg(long)]
        take_profit: Option<f64>,
        /// Starting cash (overrides config)
        #[arg(long)]
        capital: Option<f64>,
    },
    /// Check configuration and bar data without analyzing
    Validate {
        #[command(flatten)]
        source: SourceArgs,
        /// Also load and check this instrument's bars
        #[arg(long)]
        code: Option<String>,
    },
    /// Print the eight rules
    Rules,
    /// List instruments available in the data directory
    Symbols {
        #[command(flatten)]
        source: SourceArgs,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let outcome = match cli.command {
        Command::Analyze {
            source,
            range,
            output,
            no_filter,
        } => run_analyze(&source, &range, output.as_deref(), no_filter),
        Command::Backtest {
            source,
            range,
            output,
            take_profit,
            capital,
        } => run_backtest(&source, &range, output.as_deref(), take_profit, capital),
        Command::Validate { source, code } => run_validate(&source, code.as_deref()),
        Command::Rules => {
            print_rules();
            Ok(())
        }
        Command::Symbols { source } => run_symbols(&source),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

/// Load the INI file if one was given; otherwise every setting is a default.
pub fn load_config(path: Option<&Path>) -> Result<FileConfigAdapter, GranvilleError> {
    match path {
        Some(p) => {
            info!(path = %p.display(), "loading config");
            FileConfigAdapter::from_file(p)
        }
        None => Ok(FileConfigAdapter::empty()),
    }
}

pub fn resolve_data_dir(
    flag: Option<&Path>,
    config: &dyn ConfigPort,
) -> Result<PathBuf, GranvilleError> {
    if let Some(dir) = flag {
        return Ok(dir.to_path_buf());
    }
    config
        .get_string("data", "directory")
        .map(PathBuf::from)
        .ok_or_else(|| GranvilleError::ConfigMissing {
            section: "data".into(),
            key: "directory".into(),
        })
}

pub fn build_signal_config(
    config: &dyn ConfigPort,
    no_filter: bool,
) -> Result<SignalConfig, GranvilleError> {
    let mut signal = SignalConfig::from_config(config);
    if no_filter {
        signal.enable_signal_filter = false;
    }
    validate_signal_config(&signal)?;
    Ok(signal)
}

pub fn build_backtest_config(
    config: &dyn ConfigPort,
    signal: &SignalConfig,
    take_profit: Option<f64>,
    capital: Option<f64>,
) -> Result<BacktestConfig, GranvilleError> {
    let mut bt = BacktestConfig::from_config(config);
    if let Some(tp) = take_profit {
        bt.take_profit_pct = tp;
    }
    if let Some(c) = capital {
        bt.initial_capital = c;
    }
    validate_backtest_config(&bt, signal)?;
    Ok(bt)
}

fn load_bars(data_port: &dyn DataPort, range: &RangeArgs) -> Result<Vec<OhlcvBar>, GranvilleError> {
    let bars = data_port.fetch_ohlcv(&range.code, range.start, range.end)?;
    if bars.is_empty() {
        return Err(GranvilleError::validation(format!(
            "no bars for {} in the requested range",
            range.code
        )));
    }
    info!(code = %range.code, bars = bars.len(), "loaded bars");
    Ok(bars)
}

/// Load, analyze and optionally write the report.
pub fn run_analyze_pipeline(
    data_port: &dyn DataPort,
    report: Option<(&dyn ReportPort, &Path)>,
    range: &RangeArgs,
    config: &SignalConfig,
) -> Result<AnalysisResult, GranvilleError> {
    let bars = load_bars(data_port, range)?;
    let result = analyze(&range.code, &bars, None, config)?;
    if let Some((port, path)) = report {
        port.write_analysis(&result, path)?;
        info!(path = %path.display(), "report written");
    }
    Ok(result)
}

/// Load, simulate and optionally write the report.
pub fn run_backtest_pipeline(
    data_port: &dyn DataPort,
    report: Option<(&dyn ReportPort, &Path)>,
    range: &RangeArgs,
    signal: &SignalConfig,
    bt: &BacktestConfig,
) -> Result<BacktestResult, GranvilleError> {
    let bars = load_bars(data_port, range)?;
    let result = backtest(&range.code, &bars, signal, bt)?;
    if let Some((port, path)) = report {
        port.write_backtest(&result, path)?;
        info!(path = %path.display(), "report written");
    }
    Ok(result)
}

fn run_analyze(
    source: &SourceArgs,
    range: &RangeArgs,
    output: Option<&Path>,
    no_filter: bool,
) -> Result<(), GranvilleError> {
    let config = load_config(source.config.as_deref())?;
    let signal = build_signal_config(&config, no_filter)?;
    let data_port = CsvAdapter::new(resolve_data_dir(source.data_dir.as_deref(), &config)?);
    let reporter = JsonReportAdapter::new();
    let report = output.map(|p| (&reporter as &dyn ReportPort, p));

    let result = run_analyze_pipeline(&data_port, report, range, &signal)?;
    print_analysis(&result, &SummaryReport::from_analysis(&result)?);
    Ok(())
}

fn run_backtest(
    source: &SourceArgs,
    range: &RangeArgs,
    output: Option<&Path>,
    take_profit: Option<f64>,
    capital: Option<f64>,
) -> Result<(), GranvilleError> {
    let config = load_config(source.config.as_deref())?;
    let signal = build_signal_config(&config, false)?;
    let bt = build_backtest_config(&config, &signal, take_profit, capital)?;
    let data_port = CsvAdapter::new(resolve_data_dir(source.data_dir.as_deref(), &config)?);
    let reporter = JsonReportAdapter::new();
    let report = output.map(|p| (&reporter as &dyn ReportPort, p));

    let result = run_backtest_pipeline(&data_port, report, range, &signal, &bt)?;
    print_backtest(&result);
    Ok(())
}

fn run_validate(source: &SourceArgs, code: Option<&str>) -> Result<(), GranvilleError> {
    let config = load_config(source.config.as_deref())?;
    let signal = build_signal_config(&config, false)?;
    build_backtest_config(&config, &signal, None, None)?;
    info!("config validated");

    if let Some(code) = code {
        let data_port = CsvAdapter::new(resolve_data_dir(source.data_dir.as_deref(), &config)?);
        let range = RangeArgs {
            code: code.to_string(),
            start: None,
            end: None,
        };
        let bars = load_bars(&data_port, &range)?;
        validate_bars(&bars)?;
        let summary = DataSummary::from_bars(&bars)?;
        println!(
            "{}: {} bars, {} to {}",
            code, summary.rows, summary.first_date, summary.last_date
        );
        if bars.len() < signal.minimum_bars() {
            warn!(
                code,
                bars = bars.len(),
                minimum = signal.minimum_bars(),
                "fewer bars than the indicators need"
            );
        }
        info!(code, "data validated");
    }
    Ok(())
}

fn run_symbols(source: &SourceArgs) -> Result<(), GranvilleError> {
    let config = load_config(source.config.as_deref())?;
    let data_port = CsvAdapter::new(resolve_data_dir(source.data_dir.as_deref(), &config)?);
    let symbols = data_port.list_symbols()?;
    if symbols.is_empty() {
        info!("no symbols found");
    } else {
        for symbol in &symbols {
            println!("{}", symbol);
        }
        info!(count = symbols.len(), "symbols found");
    }
    Ok(())
}

fn print_rules() {
    for rule in GranvilleRule::ALL {
        println!("{}  {:<4}  {}", rule.number(), rule.signal_type(), rule.description());
    }
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.2}"))
}

fn print_analysis(result: &AnalysisResult, summary: &SummaryReport) {
    println!("=== {} ===", result.instrument_id);
    println!(
        "Bars:             {} ({} to {})",
        result.data_summary.rows, result.data_summary.first_date, result.data_summary.last_date
    );
    println!("Latest close:     {:.2}", summary.latest_price);
    println!("Latest MA:        {}", fmt_opt(summary.latest_ma));
    println!("Price/MA:         {}", fmt_opt(summary.price_ma_ratio));
    println!(
        "Signals:          {} ({} buy, {} sell)",
        summary.total_signals, summary.buy_signals, summary.sell_signals
    );
    if summary.total_signals > 0 {
        println!("Avg confidence:   {:.2}", summary.avg_confidence);
        println!("Max confidence:   {:.2}", summary.max_confidence);
    }
    for s in &result.signals {
        println!(
            "  {}  rule {}  {:<4}  {:>10.2}  conf {:.2}",
            s.timestamp.date(),
            s.rule_number(),
            s.signal_type,
            s.price,
            s.confidence
        );
    }
}

fn print_backtest(result: &BacktestResult) {
    let p = &result.performance;
    println!("=== {} backtest ===", result.instrument_id);
    for t in &result.trades {
        println!(
            "  {}  {:<4}  {:>8} @ {:>10.2}  value {:>14.2}  cash {:>14.2}  profit {:>12.2}  [{}]",
            t.date,
            t.action,
            t.shares,
            t.price,
            t.trade_value,
            t.cash_after,
            t.realized_profit,
            t.rule_label
        );
    }
    println!("Initial capital:  {:.2}", result.initial_capital);
    println!("Final cash:       {:.2}", result.final_cash);
    println!("Total Return:     {:.2}%", p.total_return * 100.0);
    println!("Total Trades:     {}", p.total_trades);
    println!("Win Rate:         {:.2}%", p.win_rate * 100.0);
    println!("Sharpe (trades):  {:.2}", p.sharpe_ratio);
    println!(
        "Final position:   {} shares, last close {:.2}, value {:.2}",
        result.final_position.shares_held,
        result.final_position.last_close,
        result.final_position.market_value
    );
}
