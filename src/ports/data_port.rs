//! Market data port.

use crate::domain::error::QuantsimError;
use crate::domain::ohlcv::Bar;
use chrono::NaiveDate;

pub trait DataPort {
    /// Bars for `code` with dates in `start_date ..= end_date`, sorted by timestamp.
    fn fetch_bars(
        &self,
        code: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<Bar>, QuantsimError>;

    /// Every code this source can serve, sorted.
    fn list_symbols(&self) -> Result<Vec<String>, QuantsimError>;
}
