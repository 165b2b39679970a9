//! Strategy construction from the `[strategy]` section.

use super::adaptive_trend::AdaptiveTrend;
use super::buy_hold::BuyHold;
use super::ma_crossover::{MaCrossover, MultiMaCrossover};
use super::params::SECTION;
use super::static_allocation::StaticAllocation;
use super::trend::{DualMomentum, DualSma, TrendFollowing};
use super::Strategy;
use crate::domain::error::AlgotronError;
use crate::ports::config_port::ConfigPort;

/// Every accepted `kind` value.
pub const STRATEGY_KINDS: &[&str] = &[
    "buy_hold",
    "static_allocation",
    "trend_following",
    "dual_momentum",
    "dual_sma",
    "adaptive_trend",
    "ma_crossover",
    "multi_ma_crossover",
];

/// Build the strategy named by `[strategy] kind` over `universe`.
pub fn build_strategy(
    config: &dyn ConfigPort,
    universe: &[String],
) -> Result<Box<dyn Strategy>, AlgotronError> {
    if universe.is_empty() {
        return Err(AlgotronError::missing("backtest", "codes"));
    }
    let kind = config
        .get_string(SECTION, "kind")
        .ok_or_else(|| AlgotronError::missing(SECTION, "kind"))?;

    let strategy: Box<dyn Strategy> = match kind.trim() {
        "buy_hold" => Box::new(BuyHold::from_config(config, universe)?),
        "static_allocation" => Box::new(StaticAllocation::from_config(config, universe)?),
        "trend_following" => Box::new(TrendFollowing::from_config(config, universe)?),
        "dual_momentum" => Box::new(DualMomentum::from_config(config, universe)?),
        "dual_sma" => Box::new(DualSma::from_config(config, universe)?),
        "adaptive_trend" => Box::new(AdaptiveTrend::from_config(config, universe)?),
        "ma_crossover" => Box::new(MaCrossover::from_config(config, universe)?),
        "multi_ma_crossover" => Box::new(MultiMaCrossover::from_config(config, universe)?),
        other => {
            return Err(AlgotronError::UnknownStrategy {
                kind: other.to_string(),
            });
        }
    };
    Ok(strategy)
}
