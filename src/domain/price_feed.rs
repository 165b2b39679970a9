//! Per-instrument bar series aligned onto one trading calendar.

use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

use super::error::AlgotronError;
use super::ohlcv::PriceBar;
use super::recorder::DailyQuote;
use crate::ports::data_port::DataPort;

/// What to do when an instrument has no bar on a calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GapPolicy {
    /// Abort with [`AlgotronError::DataGap`].
    #[default]
    Fail,
    /// Reuse the last known close with no dividend. A gap before the first
    /// bar still fails.
    CarryForward,
}

impl FromStr for GapPolicy {
    type Err = AlgotronError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fail" => Ok(GapPolicy::Fail),
            "carry_forward" => Ok(GapPolicy::CarryForward),
            other => Err(AlgotronError::invalid(
                "backtest",
                "gap_policy",
                format!("unknown policy {other:?}, expected fail or carry_forward"),
            )),
        }
    }
}

impl fmt::Display for GapPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GapPolicy::Fail => write!(f, "fail"),
            GapPolicy::CarryForward => write!(f, "carry_forward"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InstrumentSeries {
    pub code: String,
    pub bars: Vec<PriceBar>,
    pub date_index: HashMap<NaiveDate, usize>,
}

impl InstrumentSeries {
    pub fn new(code: String, bars: Vec<PriceBar>) -> Self {
        let date_index = bars
            .iter()
            .enumerate()
            .map(|(i, bar)| (bar.date, i))
            .collect();
        Self {
            code,
            bars,
            date_index,
        }
    }

    pub fn bar_count(&self) -> usize {
        self.bars.len()
    }

    pub fn get_bar(&self, date: NaiveDate) -> Option<&PriceBar> {
        self.date_index.get(&date).map(|&i| &self.bars[i])
    }
}

/// Sorted union of every date on which any series has a bar.
pub fn build_unified_timeline(series: &[InstrumentSeries]) -> Vec<NaiveDate> {
    let unique_dates: BTreeSet<NaiveDate> = series
        .iter()
        .flat_map(|s| s.bars.iter().map(|bar| bar.date))
        .collect();
    unique_dates.into_iter().collect()
}

/// Closes and dividends for every instrument on every timeline date.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceFeed {
    instruments: Vec<String>,
    dates: Vec<NaiveDate>,
    closes: Vec<Vec<f64>>,
    dividends: Vec<Vec<f64>>,
}

impl PriceFeed {
    /// Align `series` onto their unified timeline under `policy`.
    pub fn align(series: &[InstrumentSeries], policy: GapPolicy) -> Result<Self, AlgotronError> {
        let dates = build_unified_timeline(series);
        let mut closes = Vec::with_capacity(series.len());
        let mut dividends = Vec::with_capacity(series.len());

        for s in series {
            if s.bars.is_empty() {
                return Err(AlgotronError::NoData {
                    code: s.code.clone(),
                });
            }
            let mut close_col = Vec::with_capacity(dates.len());
            let mut div_col = Vec::with_capacity(dates.len());
            let mut filled = 0usize;
            for &date in &dates {
                let prev = close_col.last().copied();
                match (s.get_bar(date), prev, policy) {
                    (Some(bar), _, _) => {
                        close_col.push(bar.close);
                        div_col.push(bar.dividends);
                    }
                    (None, Some(prev), GapPolicy::CarryForward) => {
                        close_col.push(prev);
                        div_col.push(0.0);
                        filled += 1;
                    }
                    (None, _, _) => {
                        return Err(AlgotronError::DataGap {
                            code: s.code.clone(),
                            date,
                        });
                    }
                }
            }
            if filled > 0 {
                warn!(code = %s.code, filled, "carried forward missing closes");
            }
            closes.push(close_col);
            dividends.push(div_col);
        }

        Ok(Self {
            instruments: series.iter().map(|s| s.code.clone()).collect(),
            dates,
            closes,
            dividends,
        })
    }

    /// Fetch `codes` from `data` within `[start, end]` and align them.
    pub fn load(
        data: &dyn DataPort,
        codes: &[String],
        start: NaiveDate,
        end: NaiveDate,
        policy: GapPolicy,
    ) -> Result<Self, AlgotronError> {
        let mut series = Vec::with_capacity(codes.len());
        for code in codes {
            let bars = data.fetch_bars(code, start, end)?;
            if bars.is_empty() {
                return Err(AlgotronError::NoData { code: code.clone() });
            }
            debug!(code = %code, bars = bars.len(), "loaded price series");
            series.push(InstrumentSeries::new(code.clone(), bars));
        }
        Self::align(&series, policy)
    }

    pub fn instruments(&self) -> &[String] {
        &self.instruments
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// One close series per instrument, indexed like [`Self::dates`].
    pub fn closes(&self) -> &[Vec<f64>] {
        &self.closes
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Close and dividend of every instrument on timeline bar `bar`.
    pub fn quotes(&self, bar: usize) -> Vec<DailyQuote> {
        self.closes
            .iter()
            .zip(&self.dividends)
            .map(|(c, d)| DailyQuote {
                close: c[bar],
                dividend: d[bar],
            })
            .collect()
    }

    /// Last close of every instrument, in instrument order.
    pub fn last_closes(&self) -> Vec<(String, f64)> {
        self.instruments
            .iter()
            .zip(&self.closes)
            .filter_map(|(code, c)| c.last().map(|&p| (code.clone(), p)))
            .collect()
    }
}
