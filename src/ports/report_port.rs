//! Report output port trait.

use std::path::Path;

use crate::domain::analysis::AnalysisResult;
use crate::domain::backtest::BacktestResult;
use crate::domain::error::GranvilleError;

/// Port for persisting analysis and backtest results.
pub trait ReportPort {
    fn write_analysis(&self, result: &AnalysisResult, path: &Path) -> Result<(), GranvilleError>;

    fn write_backtest(&self, result: &BacktestResult, path: &Path) -> Result<(), GranvilleError>;
}
