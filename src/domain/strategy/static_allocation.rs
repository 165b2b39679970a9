//! Fixed weights, rebalanced on a schedule.

use std::collections::BTreeMap;

use super::params;
use super::{DecisionContext, Strategy, TargetWeights};
use crate::domain::error::AlgotronError;
use crate::ports::config_port::ConfigPort;

pub const DEFAULT_REBALANCE_PERIOD: usize = 21;

#[derive(Debug, Clone)]
pub struct StaticAllocation {
    weights: Vec<(String, f64)>,
    rebalance_period: usize,
}

impl StaticAllocation {
    /// Zero weights are dropped: those instruments are never traded.
    pub fn new(weights: Vec<(String, f64)>, rebalance_period: usize) -> Self {
        let weights = weights.into_iter().filter(|(_, w)| *w != 0.0).collect();
        Self {
            weights,
            rebalance_period,
        }
    }

    /// Equal split across `universe`.
    pub fn equal(universe: &[String], rebalance_period: usize) -> Self {
        let weight = 1.0 / universe.len().max(1) as f64;
        Self::new(
            universe.iter().map(|code| (code.clone(), weight)).collect(),
            rebalance_period,
        )
    }

    pub fn from_config(
        config: &dyn ConfigPort,
        universe: &[String],
    ) -> Result<Self, AlgotronError> {
        let rebalance_period =
            params::period(config, "rebalance_period", DEFAULT_REBALANCE_PERIOD)?;
        match params::instrument_map(config, "weights", universe)? {
            Some(map) if !map.is_empty() => {
                check_weights(&map)?;
                // keep universe order
                let weights = universe
                    .iter()
                    .filter_map(|code| map.get(code).map(|w| (code.clone(), *w)))
                    .collect();
                Ok(Self::new(weights, rebalance_period))
            }
            _ => Ok(Self::equal(universe, rebalance_period)),
        }
    }

    pub fn weights(&self) -> &[(String, f64)] {
        &self.weights
    }
}

fn check_weights(map: &BTreeMap<String, f64>) -> Result<(), AlgotronError> {
    if let Some((code, w)) = map.iter().find(|(_, w)| !w.is_finite() || **w < 0.0) {
        return Err(AlgotronError::invalid(
            params::SECTION,
            "weights",
            format!("{code}: weight {w} must be non-negative"),
        ));
    }
    Ok(())
}

impl Strategy for StaticAllocation {
    fn name(&self) -> &str {
        "static_allocation"
    }

    fn rebalance_period(&self) -> usize {
        self.rebalance_period
    }

    fn warmup_bars(&self) -> usize {
        1
    }

    fn decide(&self, _ctx: &DecisionContext<'_>) -> Result<TargetWeights, AlgotronError> {
        Ok(self.weights.iter().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    fn universe() -> Vec<String> {
        vec!["SPY".into(), "TLT".into(), "GLD".into()]
    }

    #[test]
    fn equal_split_by_default() {
        let cfg = FileConfigAdapter::from_string("[strategy]\n").unwrap();
        let s = StaticAllocation::from_config(&cfg, &universe()).unwrap();
        assert_eq!(s.rebalance_period(), 21);
        assert_eq!(s.weights().len(), 3);
        for (_, w) in s.weights() {
            assert!((w - 1.0 / 3.0).abs() < 1e-12);
        }
    }

    #[test]
    fn zero_weights_are_skipped() {
        let cfg = FileConfigAdapter::from_string(
            "[strategy]\nweights = TLT:0.4,SPY:0.6,GLD:0\nrebalance_period = 5\n",
        )
        .unwrap();
        let s = StaticAllocation::from_config(&cfg, &universe()).unwrap();
        assert_eq!(s.rebalance_period(), 5);
        assert_eq!(
            s.weights(),
            &[("SPY".to_string(), 0.6), ("TLT".to_string(), 0.4)]
        );
    }

    #[test]
    fn negative_weight_rejected() {
        let cfg = FileConfigAdapter::from_string("[strategy]\nweights = SPY:-0.5\n").unwrap();
        assert!(StaticAllocation::from_config(&cfg, &universe()).is_err());
    }
}
