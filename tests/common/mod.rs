#![allow(dead_code)]

use algotron::domain::error::AlgotronError;
pub use algotron::domain::ohlcv::PriceBar;
use algotron::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<PriceBar>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, code: &str, bars: Vec<PriceBar>) -> Self {
        self.data.insert(code.to_string(), bars);
        self
    }

    pub fn with_error(mut self, code: &str, reason: &str) -> Self {
        self.errors.insert(code.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_bars(
        &self,
        code: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PriceBar>, AlgotronError> {
        if let Some(reason) = self.errors.get(code) {
            return Err(AlgotronError::DataSource {
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(code)
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.date >= start_date && b.date <= end_date)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn list_symbols(&self) -> Result<Vec<String>, AlgotronError> {
        let mut symbols: Vec<String> = self.data.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }

    fn get_data_range(
        &self,
        code: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, AlgotronError> {
        if let Some(reason) = self.errors.get(code) {
            return Err(AlgotronError::DataSource {
                reason: reason.clone(),
            });
        }
        match self.data.get(code) {
            Some(bars) if !bars.is_empty() => {
                let min = bars.iter().map(|b| b.date).min().unwrap();
                let max = bars.iter().map(|b| b.date).max().unwrap();
                Ok(Some((min, max, bars.len())))
            }
            _ => Ok(None),
        }
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn make_bar(date: NaiveDate, close: f64) -> PriceBar {
    PriceBar {
        date,
        open: close,
        high: close + 1.0,
        low: close - 1.0,
        close,
        volume: 1000.0,
        dividends: 0.0,
    }
}

/// One bar per calendar day from `start`, one per close.
pub fn bars_from_closes(start: NaiveDate, closes: &[f64]) -> Vec<PriceBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| make_bar(start + chrono::Duration::days(i as i64), c))
        .collect()
}

/// Linear ramp of `count` closes starting at `start_price`.
pub fn ramp(start_price: f64, step: f64, count: usize) -> Vec<f64> {
    (0..count).map(|i| start_price + step * i as f64).collect()
}

/// Write `<dir>/<code>.csv` with a `date,open,high,low,close,volume` header.
pub fn write_csv(dir: &Path, code: &str, start: NaiveDate, closes: &[f64]) {
    let mut file = std::fs::File::create(dir.join(format!("{code}.csv"))).unwrap();
    writeln!(file, "date,open,high,low,close,volume").unwrap();
    for bar in bars_from_closes(start, closes) {
        writeln!(
            file,
            "{},{},{},{},{},{}",
            bar.date, bar.open, bar.high, bar.low, bar.close, bar.volume
        )
        .unwrap();
    }
}
