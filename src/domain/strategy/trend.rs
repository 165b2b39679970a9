//! Single-instrument trend followers: long or flat on the sign of one or
//! two lookback signals.

use super::params;
use super::{blend_exposure, DecisionContext, Strategy, TargetWeights};
use crate::domain::error::AlgotronError;
use crate::domain::indicator::{percent_change, percent_change_warmup, sma, sma_warmup};
use crate::ports::config_port::ConfigPort;

fn single_instrument(
    config: &dyn ConfigPort,
    universe: &[String],
) -> Result<String, AlgotronError> {
    match params::instrument(config, "instrument", universe)? {
        Some(code) => Ok(code),
        None => universe
            .first()
            .cloned()
            .ok_or_else(|| AlgotronError::missing("backtest", "codes")),
    }
}

fn single_weight(instrument: &str, weight: f64) -> TargetWeights {
    let mut weights = TargetWeights::new();
    weights.set(instrument, weight);
    weights
}

/// Long while the percent change over `lookback` bars is positive.
#[derive(Debug, Clone)]
pub struct TrendFollowing {
    instrument: String,
    lookback: usize,
}

impl TrendFollowing {
    pub const DEFAULT_LOOKBACK: usize = 21;

    pub fn new(instrument: impl Into<String>, lookback: usize) -> Self {
        Self {
            instrument: instrument.into(),
            lookback,
        }
    }

    pub fn from_config(
        config: &dyn ConfigPort,
        universe: &[String],
    ) -> Result<Self, AlgotronError> {
        Ok(Self::new(
            single_instrument(config, universe)?,
            params::period(config, "lookback", Self::DEFAULT_LOOKBACK)?,
        ))
    }
}

impl Strategy for TrendFollowing {
    fn name(&self) -> &str {
        "trend_following"
    }

    fn warmup_bars(&self) -> usize {
        percent_change_warmup(self.lookback)
    }

    fn decide(&self, ctx: &DecisionContext<'_>) -> Result<TargetWeights, AlgotronError> {
        let closes = ctx.closes(&self.instrument)?;
        let Some(change) = percent_change(closes, self.lookback) else {
            return Ok(TargetWeights::new());
        };
        let weight = if change > 0.0 { 1.0 } else { 0.0 };
        Ok(single_weight(&self.instrument, weight))
    }
}

/// Parameters shared by the two dual-signal followers.
#[derive(Debug, Clone, PartialEq)]
pub struct DualParams {
    pub fast_lookback: usize,
    pub slow_lookback: usize,
    pub rebound_fast_weight: f64,
    pub correction_fast_weight: f64,
}

impl Default for DualParams {
    fn default() -> Self {
        Self {
            fast_lookback: 21,
            slow_lookback: 50,
            rebound_fast_weight: 0.5,
            correction_fast_weight: 0.5,
        }
    }
}

impl DualParams {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, AlgotronError> {
        let defaults = Self::default();
        Ok(Self {
            fast_lookback: params::period(config, "fast_lookback", defaults.fast_lookback)?,
            slow_lookback: params::period(config, "slow_lookback", defaults.slow_lookback)?,
            rebound_fast_weight: params::fraction(
                config,
                "rebound_fast_weight",
                defaults.rebound_fast_weight,
            )?,
            correction_fast_weight: params::fraction(
                config,
                "correction_fast_weight",
                defaults.correction_fast_weight,
            )?,
        })
    }

    fn exposure(&self, fast: f64, slow: f64) -> f64 {
        blend_exposure(
            fast,
            slow,
            self.rebound_fast_weight,
            self.correction_fast_weight,
        )
    }
}

/// Fast and slow percent-change momentum, blended when they disagree.
#[derive(Debug, Clone)]
pub struct DualMomentum {
    instrument: String,
    params: DualParams,
}

impl DualMomentum {
    pub fn new(instrument: impl Into<String>, params: DualParams) -> Self {
        Self {
            instrument: instrument.into(),
            params,
        }
    }

    pub fn from_config(
        config: &dyn ConfigPort,
        universe: &[String],
    ) -> Result<Self, AlgotronError> {
        Ok(Self::new(
            single_instrument(config, universe)?,
            DualParams::from_config(config)?,
        ))
    }
}

impl Strategy for DualMomentum {
    fn name(&self) -> &str {
        "dual_momentum"
    }

    fn warmup_bars(&self) -> usize {
        percent_change_warmup(self.params.fast_lookback.max(self.params.slow_lookback))
    }

    fn decide(&self, ctx: &DecisionContext<'_>) -> Result<TargetWeights, AlgotronError> {
        let closes = ctx.closes(&self.instrument)?;
        let (Some(fast), Some(slow)) = (
            percent_change(closes, self.params.fast_lookback),
            percent_change(closes, self.params.slow_lookback),
        ) else {
            return Ok(TargetWeights::new());
        };
        Ok(single_weight(&self.instrument, self.params.exposure(fast, slow)))
    }
}

/// Moving-average variant of [`DualMomentum`].
///
/// The fast signal is `SMA(fast) - SMA(slow)`; the slow signal is
/// `SMA(slow) - close`.
#[derive(Debug, Clone)]
pub struct DualSma {
    instrument: String,
    params: DualParams,
}

impl DualSma {
    pub fn new(instrument: impl Into<String>, params: DualParams) -> Self {
        Self {
            instrument: instrument.into(),
            params,
        }
    }

    pub fn from_config(
        config: &dyn ConfigPort,
        universe: &[String],
    ) -> Result<Self, AlgotronError> {
        Ok(Self::new(
            single_instrument(config, universe)?,
            DualParams::from_config(config)?,
        ))
    }
}

impl Strategy for DualSma {
    fn name(&self) -> &str {
        "dual_sma"
    }

    fn warmup_bars(&self) -> usize {
        sma_warmup(self.params.fast_lookback.max(self.params.slow_lookback))
    }

    fn decide(&self, ctx: &DecisionContext<'_>) -> Result<TargetWeights, AlgotronError> {
        let closes = ctx.closes(&self.instrument)?;
        let (Some(fast_avg), Some(slow_avg)) = (
            sma(closes, self.params.fast_lookback),
            sma(closes, self.params.slow_lookback),
        ) else {
            return Ok(TargetWeights::new());
        };
        let close = closes[closes.len() - 1];
        let exposure = self.params.exposure(fast_avg - slow_avg, slow_avg - close);
        Ok(single_weight(&self.instrument, exposure))
    }
}
