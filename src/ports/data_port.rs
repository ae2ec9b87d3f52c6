//! Data access port trait.

use chrono::NaiveDate;

use crate::domain::error::GranvilleError;
use crate::domain::ohlcv::OhlcvBar;

pub trait DataPort {
    /// Bars for `code` in date order, limited to `[start, end]` where given.
    fn fetch_ohlcv(
        &self,
        code: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<OhlcvBar>, GranvilleError>;

    fn list_symbols(&self) -> Result<Vec<String>, GranvilleError>;
}
