//! Short/long SMA crossover: fully invested while the short average is at
//! or above the long one, flat otherwise.

use super::params;
use super::{DecisionContext, Strategy, TargetWeights};
use crate::domain::error::AlgotronError;
use crate::domain::indicator::{sma, sma_warmup};
use crate::ports::config_port::ConfigPort;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossoverParams {
    pub short_window: usize,
    pub long_window: usize,
    pub rebalance_period: usize,
}

impl Default for CrossoverParams {
    fn default() -> Self {
        Self {
            short_window: 10,
            long_window: 50,
            rebalance_period: 21,
        }
    }
}

impl CrossoverParams {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, AlgotronError> {
        let defaults = Self::default();
        let short_window = params::period(config, "short_window", defaults.short_window)?;
        let long_window = params::period(config, "long_window", defaults.long_window)?;
        if short_window > long_window {
            return Err(AlgotronError::invalid(
                params::SECTION,
                "short_window",
                format!("{short_window} exceeds long_window {long_window}"),
            ));
        }
        Ok(Self {
            short_window,
            long_window,
            rebalance_period: params::period(
                config,
                "rebalance_period",
                defaults.rebalance_period,
            )?,
        })
    }

    /// 1 when the short SMA is at or above the long SMA, 0 below,
    /// `None` during warmup.
    fn signal(&self, closes: &[f64]) -> Option<f64> {
        let diff = sma(closes, self.short_window)? - sma(closes, self.long_window)?;
        Some(if diff >= 0.0 { 1.0 } else { 0.0 })
    }

    fn warmup_bars(&self) -> usize {
        sma_warmup(self.short_window.max(self.long_window))
    }
}

#[derive(Debug, Clone)]
pub struct MaCrossover {
    instrument: String,
    params: CrossoverParams,
}

impl MaCrossover {
    pub fn new(instrument: impl Into<String>, params: CrossoverParams) -> Self {
        Self {
            instrument: instrument.into(),
            params,
        }
    }

    pub fn from_config(
        config: &dyn ConfigPort,
        universe: &[String],
    ) -> Result<Self, AlgotronError> {
        let instrument = match params::instrument(config, "instrument", universe)? {
            Some(code) => code,
            None => universe
                .first()
                .cloned()
                .ok_or_else(|| AlgotronError::missing("backtest", "codes"))?,
        };
        Ok(Self::new(instrument, CrossoverParams::from_config(config)?))
    }
}

impl Strategy for MaCrossover {
    fn name(&self) -> &str {
        "ma_crossover"
    }

    fn rebalance_period(&self) -> usize {
        self.params.rebalance_period
    }

    fn warmup_bars(&self) -> usize {
        self.params.warmup_bars()
    }

    fn decide(&self, ctx: &DecisionContext<'_>) -> Result<TargetWeights, AlgotronError> {
        let mut weights = TargetWeights::new();
        if let Some(signal) = self.params.signal(ctx.closes(&self.instrument)?) {
            weights.set(&self.instrument, signal);
        }
        Ok(weights)
    }
}

/// Scale `weights` to sum to 1.
///
/// Negative weights and a zero total are configuration errors.
pub fn normalize_weights(weights: &[(String, f64)]) -> Result<Vec<(String, f64)>, AlgotronError> {
    if let Some((code, w)) = weights.iter().find(|(_, w)| !w.is_finite() || *w < 0.0) {
        return Err(AlgotronError::invalid(
            params::SECTION,
            "weights",
            format!("{code}: weight {w} must be non-negative"),
        ));
    }
    let total: f64 = weights.iter().map(|(_, w)| w).sum();
    if total <= 0.0 {
        return Err(AlgotronError::invalid(
            params::SECTION,
            "weights",
            "weights sum to zero",
        ));
    }
    Ok(weights
        .iter()
        .map(|(code, w)| (code.clone(), w / total))
        .collect())
}

/// Crossover across several instruments, each capped at its normalized
/// weight.
///
/// With a residual instrument configured, that instrument takes whatever
/// weight the signals leave unallocated, so total exposure is always 1.
#[derive(Debug, Clone)]
pub struct MultiMaCrossover {
    /// Normalized weights of the signal-driven instruments.
    weights: Vec<(String, f64)>,
    residual: Option<String>,
    params: CrossoverParams,
}

impl MultiMaCrossover {
    pub fn new(
        weights: &[(String, f64)],
        residual: Option<String>,
        params: CrossoverParams,
    ) -> Result<Self, AlgotronError> {
        let weights = normalize_weights(weights)?
            .into_iter()
            .filter(|(code, _)| residual.as_deref() != Some(code.as_str()))
            .collect();
        Ok(Self {
            weights,
            residual,
            params,
        })
    }

    /// `weights` defaults to an equal split across the universe.
    pub fn from_config(
        config: &dyn ConfigPort,
        universe: &[String],
    ) -> Result<Self, AlgotronError> {
        let weights: Vec<(String, f64)> =
            match params::instrument_map(config, "weights", universe)? {
                Some(map) => universe
                    .iter()
                    .filter_map(|code| map.get(code).map(|w| (code.clone(), *w)))
                    .collect(),
                None => universe.iter().map(|code| (code.clone(), 1.0)).collect(),
            };
        let residual = params::instrument(config, "residual", universe)?;
        Self::new(&weights, residual, CrossoverParams::from_config(config)?)
    }

    pub fn weights(&self) -> &[(String, f64)] {
        &self.weights
    }

    pub fn residual(&self) -> Option<&str> {
        self.residual.as_deref()
    }
}

impl Strategy for MultiMaCrossover {
    fn name(&self) -> &str {
        "multi_ma_crossover"
    }

    fn rebalance_period(&self) -> usize {
        self.params.rebalance_period
    }

    fn warmup_bars(&self) -> usize {
        self.params.warmup_bars()
    }

    fn decide(&self, ctx: &DecisionContext<'_>) -> Result<TargetWeights, AlgotronError> {
        let mut targets = TargetWeights::new();
        for (code, weight) in &self.weights {
            if let Some(signal) = self.params.signal(ctx.closes(code)?) {
                targets.set(code, signal * weight);
            }
        }
        if let Some(residual) = &self.residual {
            let allocated = targets.total();
            targets.set(residual, (1.0 - allocated).max(0.0));
        }
        Ok(targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;
    use crate::domain::ledger::PositionLedger;
    use chrono::NaiveDate;

    fn small() -> CrossoverParams {
        CrossoverParams {
            short_window: 2,
            long_window: 3,
            rebalance_period: 1,
        }
    }

    fn weights(pairs: &[(&str, f64)]) -> Vec<(String, f64)> {
        pairs.iter().map(|(c, w)| (c.to_string(), *w)).collect()
    }

    #[test]
    fn single_crossover_signal() {
        let s = MaCrossover::new("SPY", small());
        let ledger = PositionLedger::with_instruments(["SPY"]).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();

        let rising = vec![vec![10.0, 11.0, 12.0]];
        let ctx = DecisionContext::new(0, date, 1000.0, &ledger, &rising, 2);
        assert_eq!(s.decide(&ctx).unwrap().get("SPY"), Some(1.0));

        let falling = vec![vec![12.0, 11.0, 10.0]];
        let ctx = DecisionContext::new(0, date, 1000.0, &ledger, &falling, 2);
        assert_eq!(s.decide(&ctx).unwrap().get("SPY"), Some(0.0));
    }

    #[test]
    fn crossover_defaults() {
        let cfg = FileConfigAdapter::from_string("[strategy]\n").unwrap();
        let p = CrossoverParams::from_config(&cfg).unwrap();
        assert_eq!(p, CrossoverParams::default());
        assert_eq!(p.warmup_bars(), 50);
    }

    #[test]
    fn normalize_rejects_zero_total() {
        let err = normalize_weights(&weights(&[("SPY", 0.0), ("TLT", 0.0)])).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn residual_absorbs_unallocated_weight() {
        let s = MultiMaCrossover::new(
            &weights(&[("SPY", 2.0), ("TLT", 1.0), ("SHV", 1.0)]),
            Some("SHV".into()),
            small(),
        )
        .unwrap();
        assert_eq!(s.weights().len(), 2);

        let ledger = PositionLedger::with_instruments(["SPY", "TLT", "SHV"]).unwrap();
        let closes = vec![
            vec![10.0, 11.0, 12.0],
            vec![12.0, 11.0, 10.0],
            vec![50.0, 50.0, 50.0],
        ];
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let ctx = DecisionContext::new(0, date, 1000.0, &ledger, &closes, 2);
        let targets = s.decide(&ctx).unwrap();

        assert!((targets.get("SPY").unwrap() - 0.5).abs() < 1e-12);
        assert_eq!(targets.get("TLT"), Some(0.0));
        assert!((targets.get("SHV").unwrap() - 0.5).abs() < 1e-12);
        assert!((targets.total() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn from_config_defaults_to_equal_weights() {
        let cfg = FileConfigAdapter::from_string("[strategy]\nshort_window = 5\n").unwrap();
        let universe = vec!["SPY".to_string(), "EFA".to_string()];
        let s = MultiMaCrossover::from_config(&cfg, &universe).unwrap();
        assert_eq!(s.weights(), &weights(&[("SPY", 0.5), ("EFA", 0.5)])[..]);
        assert_eq!(s.residual(), None);
    }

    #[test]
    fn short_window_must_not_exceed_long() {
        let cfg =
            FileConfigAdapter::from_string("[strategy]\nshort_window = 60\nlong_window = 50\n")
                .unwrap();
        assert!(CrossoverParams::from_config(&cfg).is_err());
    }
}
