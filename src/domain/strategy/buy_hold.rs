//! Fully invested in a single instrument, topped up every day.

use super::params;
use super::{DecisionContext, Strategy, TargetWeights};
use crate::domain::error::AlgotronError;
use crate::ports::config_port::ConfigPort;

#[derive(Debug, Clone)]
pub struct BuyHold {
    instrument: String,
}

impl BuyHold {
    pub fn new(instrument: impl Into<String>) -> Self {
        Self {
            instrument: instrument.into(),
        }
    }

    /// `instrument` defaults to the first instrument of the universe.
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
        Ok(Self::new(instrument))
    }
}

impl Strategy for BuyHold {
    fn name(&self) -> &str {
        "buy_hold"
    }

    fn warmup_bars(&self) -> usize {
        1
    }

    fn decide(&self, _ctx: &DecisionContext<'_>) -> Result<TargetWeights, AlgotronError> {
        let mut weights = TargetWeights::new();
        weights.set(&self.instrument, 1.0);
        Ok(weights)
    }
}
