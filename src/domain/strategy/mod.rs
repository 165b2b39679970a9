//! Trading strategies.
//!
//! A [`Strategy`] turns the price history and current ledger into target
//! portfolio weights. The backtest engine owns the rebalance counter and the
//! conversion of weights to whole-share orders; strategies are stateless
//! between decisions.

pub mod adaptive_trend;
pub mod buy_hold;
pub mod ma_crossover;
pub mod params;
pub mod registry;
pub mod static_allocation;
pub mod trend;

use chrono::NaiveDate;

use super::error::AlgotronError;
use super::ledger::PositionLedger;

pub use registry::{build_strategy, STRATEGY_KINDS};

pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    /// Days between decisions; 1 acts every day.
    fn rebalance_period(&self) -> usize {
        1
    }

    /// Bars of history every indicator needs before the first decision.
    fn warmup_bars(&self) -> usize;

    fn decide(&self, ctx: &DecisionContext<'_>) -> Result<TargetWeights, AlgotronError>;
}

/// Everything a strategy may look at on one simulated day.
#[derive(Debug, Clone, Copy)]
pub struct DecisionContext<'a> {
    /// Days since the first simulated day.
    pub day: usize,
    pub date: NaiveDate,
    pub portfolio_value: f64,
    pub ledger: &'a PositionLedger,
    closes: &'a [Vec<f64>],
    bar: usize,
}

impl<'a> DecisionContext<'a> {
    /// `closes` holds one full series per ledger instrument, in ledger
    /// order; `bar` is today's index into each series.
    pub fn new(
        day: usize,
        date: NaiveDate,
        portfolio_value: f64,
        ledger: &'a PositionLedger,
        closes: &'a [Vec<f64>],
        bar: usize,
    ) -> Self {
        Self {
            day,
            date,
            portfolio_value,
            ledger,
            closes,
            bar,
        }
    }

    pub fn instruments(&self) -> &'a [String] {
        self.ledger.instruments()
    }

    /// Close history of `instrument` up to and including today.
    pub fn closes(&self, instrument: &str) -> Result<&'a [f64], AlgotronError> {
        let index = self
            .instruments()
            .iter()
            .position(|code| code == instrument)
            .ok_or_else(|| AlgotronError::unknown_instrument(instrument))?;
        let series = self.closes.get(index).ok_or_else(|| AlgotronError::NoData {
            code: instrument.to_string(),
        })?;
        series
            .get(..=self.bar)
            .ok_or_else(|| AlgotronError::NoData {
                code: instrument.to_string(),
            })
    }

    /// Today's close of `instrument`.
    pub fn close(&self, instrument: &str) -> Result<f64, AlgotronError> {
        self.closes(instrument)
            .map(|series| series[series.len() - 1])
    }
}

/// Desired fraction of portfolio value per instrument.
///
/// Instruments not listed are left alone; a listed weight of 0 liquidates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetWeights {
    weights: Vec<(String, f64)>,
}

impl TargetWeights {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the weight for `instrument`, replacing any earlier value.
    pub fn set(&mut self, instrument: &str, weight: f64) {
        match self.weights.iter_mut().find(|(code, _)| code == instrument) {
            Some(entry) => entry.1 = weight,
            None => self.weights.push((instrument.to_string(), weight)),
        }
    }

    pub fn get(&self, instrument: &str) -> Option<f64> {
        self.weights
            .iter()
            .find(|(code, _)| code == instrument)
            .map(|(_, w)| *w)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.weights.iter().map(|(code, w)| (code.as_str(), *w))
    }

    pub fn total(&self) -> f64 {
        self.weights.iter().map(|(_, w)| w).sum()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

impl FromIterator<(String, f64)> for TargetWeights {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        let mut weights = TargetWeights::new();
        for (code, weight) in iter {
            weights.set(&code, weight);
        }
        weights
    }
}

/// Agreement between a fast and a slow trend signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regime {
    /// Both signals non-negative.
    Uptrend,
    /// Fast turned up while slow is still negative.
    Rebound,
    /// Fast turned down while slow is still non-negative.
    Correction,
    /// Both signals negative.
    Downtrend,
}

impl Regime {
    pub fn classify(fast: f64, slow: f64) -> Self {
        match (fast >= 0.0, slow >= 0.0) {
            (true, true) => Regime::Uptrend,
            (true, false) => Regime::Rebound,
            (false, true) => Regime::Correction,
            (false, false) => Regime::Downtrend,
        }
    }
}

/// Long/flat exposure for a fast/slow signal pair.
///
/// Full exposure when both agree up, none when both agree down. A rebound
/// holds `rebound_fast_weight`; a correction holds
/// `1 - correction_fast_weight`.
pub fn blend_exposure(
    fast: f64,
    slow: f64,
    rebound_fast_weight: f64,
    correction_fast_weight: f64,
) -> f64 {
    match Regime::classify(fast, slow) {
        Regime::Uptrend => 1.0,
        Regime::Rebound => rebound_fast_weight,
        Regime::Correction => 1.0 - correction_fast_weight,
        Regime::Downtrend => 0.0,
    }
}

/// Target share count for `weight` of `portfolio_value` at `price`,
/// truncated toward zero. A non-positive price yields 0.
pub fn target_shares(weight: f64, portfolio_value: f64, price: f64) -> i64 {
    if price <= 0.0 || !price.is_finite() {
        return 0;
    }
    (weight * portfolio_value / price).trunc() as i64
}
