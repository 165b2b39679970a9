//! Report output port.

use std::path::Path;

use crate::domain::backtest::BacktestResult;
use crate::domain::error::AlgotronError;

pub trait ReportPort {
    /// Write the daily snapshot table of `result` to `output_path`.
    fn write(&self, result: &BacktestResult, output_path: &Path) -> Result<(), AlgotronError>;
}
