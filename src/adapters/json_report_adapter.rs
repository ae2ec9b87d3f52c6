//! JSON report adapter implementing ReportPort.

use std::fs;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::domain::analysis::{AnalysisResult, SummaryReport};
use crate::domain::backtest::BacktestResult;
use crate::domain::error::GranvilleError;
use crate::ports::report_port::ReportPort;

/// Writes pretty-printed JSON documents.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonReportAdapter;

#[derive(Serialize)]
struct AnalysisDocument<'a> {
    summary: SummaryReport,
    #[serde(flatten)]
    result: &'a AnalysisResult,
}

impl JsonReportAdapter {
    pub fn new() -> Self {
        JsonReportAdapter
    }

    fn write_json<T: Serialize>(
        value: &T,
        instrument: &str,
        path: &Path,
    ) -> Result<(), GranvilleError> {
        let body = serde_json::to_string_pretty(value)
            .map_err(|e| GranvilleError::output(instrument, "serialize", e.to_string()))?;
        fs::write(path, body).map_err(|e| {
            GranvilleError::output(
                instrument,
                "write",
                format!("{}: {}", path.display(), e),
            )
        })?;
        info!(instrument, path = %path.display(), "report written");
        Ok(())
    }
}

impl ReportPort for JsonReportAdapter {
    fn write_analysis(&self, result: &AnalysisResult, path: &Path) -> Result<(), GranvilleError> {
        let doc = AnalysisDocument {
            summary: SummaryReport::from_analysis(result)?,
            result,
        };
        Self::write_json(&doc, &result.instrument_id, path)
    }

    fn write_backtest(&self, result: &BacktestResult, path: &Path) -> Result<(), GranvilleError> {
        Self::write_json(result, &result.instrument_id, path)
    }
}
