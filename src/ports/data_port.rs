//! Historical price data port trait.

use crate::domain::error::AlgotronError;
use crate::domain::ohlcv::PriceBar;
use chrono::NaiveDate;

pub trait DataPort {
    /// Bars for `code` dated within `[start_date, end_date]`, oldest first.
    fn fetch_bars(
        &self,
        code: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PriceBar>, AlgotronError>;

    fn list_symbols(&self) -> Result<Vec<String>, AlgotronError>;

    /// First date, last date and bar count, or `None` when `code` has no bars.
    fn get_data_range(
        &self,
        code: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, AlgotronError>;
}
