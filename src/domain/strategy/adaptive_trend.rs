//! Multi-asset trend allocator.
//!
//! Each instrument's direction comes from a long-term SMA trend filter and a
//! fast/slow momentum regime. Capital is then tilted toward instruments that
//! have contributed positive P&L so far, renormalized every rebalance.

use std::collections::HashMap;

use super::params;
use super::{DecisionContext, Regime, Strategy, TargetWeights};
use crate::domain::error::AlgotronError;
use crate::domain::indicator::{percent_change, percent_change_warmup, sma, sma_warmup};
use crate::domain::ledger::PositionLedger;
use crate::ports::config_port::ConfigPort;

#[derive(Debug, Clone, PartialEq)]
pub struct AdaptiveTrendParams {
    pub fast_lookback: HashMap<String, usize>,
    pub slow_lookback: HashMap<String, usize>,
    pub rebound_fast_weight: HashMap<String, f64>,
    pub correction_fast_weight: HashMap<String, f64>,
    pub trend_short: usize,
    pub trend_long: usize,
    pub rebalance_period: usize,
}

impl AdaptiveTrendParams {
    pub const DEFAULT_FAST_LOOKBACK: usize = 21;
    pub const DEFAULT_SLOW_LOOKBACK: usize = 252;
    pub const DEFAULT_BLEND_WEIGHT: f64 = 0.5;

    /// Defaults for every instrument in `universe`.
    pub fn for_universe(universe: &[String]) -> Self {
        Self {
            fast_lookback: uniform(universe, Self::DEFAULT_FAST_LOOKBACK),
            slow_lookback: uniform(universe, Self::DEFAULT_SLOW_LOOKBACK),
            rebound_fast_weight: uniform(universe, Self::DEFAULT_BLEND_WEIGHT),
            correction_fast_weight: uniform(universe, Self::DEFAULT_BLEND_WEIGHT),
            trend_short: 21,
            trend_long: 252,
            rebalance_period: 21,
        }
    }

    pub fn from_config(
        config: &dyn ConfigPort,
        universe: &[String],
    ) -> Result<Self, AlgotronError> {
        let defaults = Self::for_universe(universe);
        let trend_short = params::period(config, "sma_trend_short", defaults.trend_short)?;
        let trend_long = params::period(config, "sma_trend_long", defaults.trend_long)?;
        if trend_short > trend_long {
            return Err(AlgotronError::invalid(
                params::SECTION,
                "sma_trend_short",
                format!("{trend_short} exceeds sma_trend_long {trend_long}"),
            ));
        }
        Ok(Self {
            fast_lookback: params::per_instrument_period(
                config,
                "fast_lookback",
                universe,
                Self::DEFAULT_FAST_LOOKBACK,
            )?,
            slow_lookback: params::per_instrument_period(
                config,
                "slow_lookback",
                universe,
                Self::DEFAULT_SLOW_LOOKBACK,
            )?,
            rebound_fast_weight: params::per_instrument_fraction(
                config,
                "rebound_fast_weight",
                universe,
                Self::DEFAULT_BLEND_WEIGHT,
            )?,
            correction_fast_weight: params::per_instrument_fraction(
                config,
                "correction_fast_weight",
                universe,
                Self::DEFAULT_BLEND_WEIGHT,
            )?,
            trend_short,
            trend_long,
            rebalance_period: params::period(
                config,
                "rebalance_period",
                defaults.rebalance_period,
            )?,
        })
    }

    /// Fast and slow momentum lookbacks for `code`.
    pub fn lookbacks(&self, code: &str) -> (usize, usize) {
        (
            self.fast_lookback
                .get(code)
                .copied()
                .unwrap_or(Self::DEFAULT_FAST_LOOKBACK),
            self.slow_lookback
                .get(code)
                .copied()
                .unwrap_or(Self::DEFAULT_SLOW_LOOKBACK),
        )
    }

    /// Rebound and correction blend weights for `code`.
    pub fn blend_weights(&self, code: &str) -> (f64, f64) {
        (
            self.rebound_fast_weight
                .get(code)
                .copied()
                .unwrap_or(Self::DEFAULT_BLEND_WEIGHT),
            self.correction_fast_weight
                .get(code)
                .copied()
                .unwrap_or(Self::DEFAULT_BLEND_WEIGHT),
        )
    }
}

fn uniform<T: Copy>(universe: &[String], value: T) -> HashMap<String, T> {
    universe.iter().map(|code| (code.clone(), value)).collect()
}

#[derive(Debug, Clone)]
pub struct AdaptiveTrend {
    instruments: Vec<String>,
    params: AdaptiveTrendParams,
}

impl AdaptiveTrend {
    pub fn new(instruments: Vec<String>, params: AdaptiveTrendParams) -> Self {
        Self {
            instruments,
            params,
        }
    }

    pub fn from_config(
        config: &dyn ConfigPort,
        universe: &[String],
    ) -> Result<Self, AlgotronError> {
        Ok(Self::new(
            universe.to_vec(),
            AdaptiveTrendParams::from_config(config, universe)?,
        ))
    }

    /// Signed exposure for one instrument before capital weighting.
    fn direction(&self, code: &str, closes: &[f64]) -> Option<f64> {
        let p = &self.params;
        let (fast_lookback, slow_lookback) = p.lookbacks(code);
        let fast = percent_change(closes, fast_lookback)?;
        let slow = percent_change(closes, slow_lookback)?;
        let trend = sma(closes, p.trend_short)? - sma(closes, p.trend_long)?;

        let (long_target, short_target) = if trend >= 0.0 {
            (1.0, 0.0)
        } else {
            (0.0, -1.0)
        };
        let (rebound, correction) = p.blend_weights(code);

        Some(match Regime::classify(fast, slow) {
            Regime::Uptrend => long_target,
            Regime::Rebound => rebound * long_target + (1.0 - rebound) * short_target,
            Regime::Correction => correction * short_target + (1.0 - correction) * long_target,
            Regime::Downtrend => short_target,
        })
    }
}

/// Capital weight per ledger instrument from accumulated P&L.
///
/// `raw_i = max(0, pnl_i) / (max(0, total_pnl) + 1) + 1`, normalized to sum
/// to 1. Every instrument keeps a floor so losers are never starved to zero.
pub fn capital_weights(ledger: &PositionLedger) -> Vec<(String, f64)> {
    let total_pnl = ledger.portfolio_pnl().max(0.0) + 1.0;
    let raw: Vec<(String, f64)> = ledger
        .iter()
        .map(|(code, state)| {
            let raw = state.total_pnl().max(0.0) / total_pnl + 1.0;
            (code.to_string(), raw)
        })
        .collect();
    let sum: f64 = raw.iter().map(|(_, w)| w).sum();
    if sum <= 0.0 {
        return raw.into_iter().map(|(code, _)| (code, 0.0)).collect();
    }
    raw.into_iter().map(|(code, w)| (code, w / sum)).collect()
}

impl Strategy for AdaptiveTrend {
    fn name(&self) -> &str {
        "adaptive_trend"
    }

    fn rebalance_period(&self) -> usize {
        self.params.rebalance_period
    }

    fn warmup_bars(&self) -> usize {
        let p = &self.params;
        let momentum = self
            .instruments
            .iter()
            .map(|code| {
                let (fast, slow) = p.lookbacks(code);
                percent_change_warmup(fast.max(slow))
            })
            .max()
            .unwrap_or(0);
        momentum.max(sma_warmup(p.trend_long.max(p.trend_short)))
    }

    fn decide(&self, ctx: &DecisionContext<'_>) -> Result<TargetWeights, AlgotronError> {
        let capital: HashMap<String, f64> = capital_weights(ctx.ledger).into_iter().collect();
        let mut weights = TargetWeights::new();
        for code in &self.instruments {
            let closes = ctx.closes(code)?;
            let Some(direction) = self.direction(code, closes) else {
                continue;
            };
            let capital_weight = capital.get(code).copied().unwrap_or(0.0);
            weights.set(code, direction * capital_weight);
        }
        Ok(weights)
    }
}
