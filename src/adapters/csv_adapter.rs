//! CSV price file adapter.
//!
//! One file per instrument, `<CODE>.csv`, with header
//! `date,open,high,low,close,volume` plus optional `adjclose` and
//! `dividends` columns. When `dividends` is absent but `adjclose` is
//! present, dividends are recovered from the two close series.

use crate::domain::error::AlgotronError;
use crate::domain::ohlcv::{derive_dividends, PriceBar};
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(alias = "Date")]
    date: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    #[serde(default)]
    adjclose: Option<f64>,
    #[serde(default)]
    dividends: Option<f64>,
}

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, code: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", code))
    }

    /// Every bar in the file, sorted by date, with dividends filled in.
    fn read_all(&self, code: &str) -> Result<Vec<PriceBar>, AlgotronError> {
        let path = self.csv_path(code);
        let content = fs::read_to_string(&path).map_err(|e| AlgotronError::DataSource {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut rows: Vec<CsvRow> = Vec::new();
        for (line, result) in rdr.deserialize().enumerate() {
            let row: CsvRow = result.map_err(|e| AlgotronError::DataSource {
                reason: format!("{} row {}: {}", path.display(), line + 1, e),
            })?;
            rows.push(row);
        }
        rows.sort_by_key(|r| r.date);

        let has_dividends = rows.iter().all(|r| r.dividends.is_some());
        let has_adjclose = rows.iter().all(|r| r.adjclose.is_some());
        let dividends: Vec<f64> = if has_dividends {
            rows.iter().map(|r| r.dividends.unwrap_or(0.0)).collect()
        } else if has_adjclose {
            debug!(code, "deriving dividends from adjclose");
            let closes: Vec<f64> = rows.iter().map(|r| r.close).collect();
            let adj: Vec<f64> = rows.iter().map(|r| r.adjclose.unwrap_or(r.close)).collect();
            derive_dividends(&closes, &adj)
        } else {
            vec![0.0; rows.len()]
        };

        Ok(rows
            .into_iter()
            .zip(dividends)
            .map(|(r, dividends)| PriceBar {
                date: r.date,
                open: r.open,
                high: r.high,
                low: r.low,
                close: r.close,
                volume: r.volume,
                dividends,
            })
            .collect())
    }
}

impl DataPort for CsvAdapter {
    fn fetch_bars(
        &self,
        code: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PriceBar>, AlgotronError> {
        // dividends are derived over the whole file so the first bar in range
        // still sees its prior close
        let bars = self.read_all(code)?;
        Ok(bars
            .into_iter()
            .filter(|b| b.date >= start_date && b.date <= end_date)
            .collect())
    }

    fn list_symbols(&self) -> Result<Vec<String>, AlgotronError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| AlgotronError::DataSource {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut symbols = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let name_str = name.to_string_lossy();
            if let Some(code) = name_str.strip_suffix(".csv") {
                symbols.push(code.to_string());
            }
        }

        symbols.sort();
        Ok(symbols)
    }

    fn get_data_range(
        &self,
        code: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, AlgotronError> {
        let bars = self.read_all(code)?;
        Ok(match (bars.first(), bars.last()) {
            (Some(first), Some(last)) => Some((first.date, last.date, bars.len())),
            _ => None,
        })
    }
}
