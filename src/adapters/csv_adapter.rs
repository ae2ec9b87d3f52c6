//! CSV file data adapter.
//!
//! One file per instrument, `<base>/<CODE>.csv`, with the header
//! `date,open,high,low,close,volume` and ISO dates.

use std::fs;
use std::path::PathBuf;

use chrono::NaiveDate;
use tracing::debug;

use crate::domain::error::GranvilleError;
use crate::domain::ohlcv::OhlcvBar;
use crate::ports::data_port::DataPort;

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn csv_path(&self, code: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", code))
    }
}

impl DataPort for CsvAdapter {
    fn fetch_ohlcv(
        &self,
        code: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<OhlcvBar>, GranvilleError> {
        let path = self.csv_path(code);
        let content = fs::read_to_string(&path).map_err(|e| {
            std::io::Error::new(e.kind(), format!("failed to read {}: {}", path.display(), e))
        })?;

        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());
        let mut bars = Vec::new();
        for (line, row) in rdr.deserialize::<OhlcvBar>().enumerate() {
            let bar = row.map_err(|e| {
                GranvilleError::validation(format!(
                    "{} row {}: {}",
                    path.display(),
                    line + 1,
                    e
                ))
            })?;
            let after_start = start.is_none_or(|s| bar.date >= s);
            let before_end = end.is_none_or(|e| bar.date <= e);
            if after_start && before_end {
                bars.push(bar);
            }
        }

        bars.sort_by_key(|b| b.date);
        debug!(code, bars = bars.len(), path = %path.display(), "loaded bars");
        Ok(bars)
    }

    fn list_symbols(&self) -> Result<Vec<String>, GranvilleError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| {
            std::io::Error::new(
                e.kind(),
                format!("failed to read directory {}: {}", self.base_path.display(), e),
            )
        })?;

        let mut symbols = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "csv") {
                if let Some(stem) = path.file_stem() {
                    symbols.push(stem.to_string_lossy().into_owned());
                }
            }
        }

        symbols.sort();
        Ok(symbols)
    }
}
