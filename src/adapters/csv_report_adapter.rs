//! CSV report writer.
//!
//! One row per snapshot: the recorder table followed by the derived
//! `daily_return`, `cumulative_return`, `drawdown` and `rolling_volatility`
//! columns. Undefined values are left empty. The trade log goes to a
//! sibling `<stem>_trades.csv`.

use std::path::{Path, PathBuf};
use tracing::info;

use crate::domain::backtest::BacktestResult;
use crate::domain::error::AlgotronError;
use crate::domain::metrics::MetricsSeries;
use crate::domain::recorder::{table_header, table_rows};
use crate::ports::report_port::ReportPort;

#[derive(Debug, Clone, Default)]
pub struct CsvReportAdapter {
    write_trades: bool,
}

impl CsvReportAdapter {
    pub fn new() -> Self {
        Self { write_trades: true }
    }

    /// Snapshot table only.
    pub fn without_trades() -> Self {
        Self {
            write_trades: false,
        }
    }

    pub fn trades_path(output_path: &Path) -> PathBuf {
        let stem = output_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "report".to_string());
        output_path.with_file_name(format!("{stem}_trades.csv"))
    }

    fn write_trades(&self, result: &BacktestResult, path: &Path) -> Result<(), AlgotronError> {
        let mut wtr = csv::Writer::from_path(path).map_err(csv_error)?;
        for trade in &result.trades {
            wtr.serialize(trade).map_err(csv_error)?;
        }
        if result.trades.is_empty() {
            wtr.write_record(["date", "instrument", "side", "size", "price", "commission"])
                .map_err(csv_error)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

fn csv_error(e: csv::Error) -> AlgotronError {
    match e.into_kind() {
        csv::ErrorKind::Io(io) => AlgotronError::Io(io),
        other => AlgotronError::DataSource {
            reason: format!("report serialization failed: {other:?}"),
        },
    }
}

fn optional(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

impl ReportPort for CsvReportAdapter {
    fn write(&self, result: &BacktestResult, output_path: &Path) -> Result<(), AlgotronError> {
        let series = MetricsSeries::compute(&result.snapshots);

        let mut header = table_header(&result.instruments);
        header.extend(
            ["daily_return", "cumulative_return", "drawdown", "rolling_volatility"]
                .map(String::from),
        );

        let mut wtr = csv::Writer::from_path(output_path).map_err(csv_error)?;
        wtr.write_record(&header).map_err(csv_error)?;
        for (i, mut row) in table_rows(&result.snapshots).into_iter().enumerate() {
            row.push(optional(series.returns[i]));
            row.push(series.cumulative_return[i].to_string());
            row.push(series.drawdown[i].to_string());
            row.push(optional(series.rolling_volatility[i]));
            wtr.write_record(&row).map_err(csv_error)?;
        }
        wtr.flush()?;
        info!(path = %output_path.display(), rows = result.snapshots.len(), "report written");

        if self.write_trades {
            let trades = Self::trades_path(output_path);
            self.write_trades(result, &trades)?;
            info!(path = %trades.display(), trades = result.trades.len(), "trade log written");
        }
        Ok(())
    }
}
