//! Parameter sweeps: run one strategy over a grid of `[strategy]` overrides.
//!
//! The grid comes from the `[sweep]` section, where every key except
//! `max_combinations` names a strategy key and holds `|`-separated candidate
//! values. Combinations run in parallel and each finished one is appended
//! to a checkpoint immediately, so a rerun only does the missing work.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use tracing::{info, warn};

use super::backtest::run_backtest;
use super::error::AlgotronError;
use super::metrics::Metrics;
use super::price_feed::PriceFeed;
use super::strategy::build_strategy;
use crate::ports::broker_port::BrokerPort;
use crate::ports::checkpoint_port::CheckpointPort;
use crate::ports::config_port::ConfigPort;

pub const SWEEP_SECTION: &str = "sweep";
pub const DEFAULT_MAX_COMBINATIONS: usize = 100;

/// One parameter assignment, keyed by strategy key.
pub type ParamSet = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq)]
pub struct ParamGrid {
    keys: Vec<String>,
    candidates: Vec<Vec<String>>,
    max_combinations: usize,
}

impl ParamGrid {
    /// `axes` are `(key, candidates)` pairs; the product is enumerated with
    /// the last axis varying fastest.
    pub fn new(
        axes: Vec<(String, Vec<String>)>,
        max_combinations: usize,
    ) -> Result<Self, AlgotronError> {
        if let Some((key, _)) = axes.iter().find(|(_, values)| values.is_empty()) {
            return Err(AlgotronError::invalid(
                SWEEP_SECTION,
                key,
                "no candidate values",
            ));
        }
        let (keys, candidates) = axes.into_iter().unzip();
        Ok(Self {
            keys,
            candidates,
            max_combinations,
        })
    }

    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, AlgotronError> {
        let max_combinations = match config.get_string(SWEEP_SECTION, "max_combinations") {
            Some(raw) => raw.trim().parse::<usize>().map_err(|_| {
                AlgotronError::invalid(
                    SWEEP_SECTION,
                    "max_combinations",
                    format!("expected a positive integer, got {raw:?}"),
                )
            })?,
            None => DEFAULT_MAX_COMBINATIONS,
        };
        if max_combinations == 0 {
            return Err(AlgotronError::invalid(
                SWEEP_SECTION,
                "max_combinations",
                "must be at least 1",
            ));
        }

        let axes: Vec<(String, Vec<String>)> = config
            .keys(SWEEP_SECTION)
            .into_iter()
            .filter(|key| key != "max_combinations")
            .map(|key| {
                let raw = config.get_string(SWEEP_SECTION, &key).unwrap_or_default();
                let values = raw
                    .split('|')
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(str::to_string)
                    .collect();
                (key, values)
            })
            .collect();
        if axes.is_empty() {
            return Err(AlgotronError::missing(SWEEP_SECTION, "<parameter>"));
        }
        Self::new(axes, max_combinations)
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Size of the full product before truncation.
    pub fn full_size(&self) -> usize {
        self.candidates.iter().map(Vec::len).product()
    }

    /// Parameter sets in enumeration order, at most `max_combinations`.
    pub fn combinations(&self) -> Vec<ParamSet> {
        let total = self.full_size().min(self.max_combinations);
        let mut out = Vec::with_capacity(total);
        let mut odometer = vec![0usize; self.keys.len()];

        while out.len() < total {
            out.push(
                self.keys
                    .iter()
                    .zip(&self.candidates)
                    .zip(&odometer)
                    .map(|((key, values), &i)| (key.clone(), values[i].clone()))
                    .collect(),
            );
            for axis in (0..odometer.len()).rev() {
                odometer[axis] += 1;
                if odometer[axis] < self.candidates[axis].len() {
                    break;
                }
                odometer[axis] = 0;
            }
        }
        out
    }
}

/// A config view with `[strategy]` keys replaced by a parameter set.
pub struct OverrideConfig<'a> {
    base: &'a dyn ConfigPort,
    overrides: &'a ParamSet,
}

impl<'a> OverrideConfig<'a> {
    pub const SECTION: &'static str = "strategy";

    pub fn new(base: &'a dyn ConfigPort, overrides: &'a ParamSet) -> Self {
        Self { base, overrides }
    }

    fn lookup(&self, section: &str, key: &str) -> Option<&'a String> {
        if section == Self::SECTION {
            self.overrides.get(key)
        } else {
            None
        }
    }
}

impl ConfigPort for OverrideConfig<'_> {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        match self.lookup(section, key) {
            Some(value) => Some(value.clone()),
            None => self.base.get_string(section, key),
        }
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        match self.lookup(section, key) {
            Some(value) => value.trim().parse().unwrap_or(default),
            None => self.base.get_int(section, key, default),
        }
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        match self.lookup(section, key) {
            Some(value) => value.trim().parse().unwrap_or(default),
            None => self.base.get_double(section, key, default),
        }
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        match self.lookup(section, key).map(|v| v.trim().to_lowercase()) {
            Some(v) if matches!(v.as_str(), "true" | "yes" | "1") => true,
            Some(v) if matches!(v.as_str(), "false" | "no" | "0") => false,
            Some(_) => default,
            None => self.base.get_bool(section, key, default),
        }
    }

    fn keys(&self, section: &str) -> Vec<String> {
        let mut keys = self.base.keys(section);
        if section == Self::SECTION {
            keys.extend(self.overrides.keys().cloned());
            keys.sort();
            keys.dedup();
        }
        keys
    }
}

/// One finished combination as stored in the checkpoint.
///
/// Serializes as a single flat object of parameter and metric keys. Metrics
/// come first so deserialization claims their keys before the parameter map
/// collects the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepRecord {
    #[serde(flatten)]
    pub metrics: Metrics,
    #[serde(flatten)]
    pub params: ParamSet,
}

#[derive(Debug, Clone)]
pub struct SweepOutcome {
    /// Checkpointed records followed by this run's, in grid order.
    pub records: Vec<SweepRecord>,
    pub resumed: usize,
    pub ran: usize,
    pub failed: usize,
}

impl SweepOutcome {
    /// Records ordered by Sharpe ratio, best first.
    pub fn ranked(&self) -> Vec<&SweepRecord> {
        let mut ranked: Vec<&SweepRecord> = self.records.iter().collect();
        ranked.sort_by(|a, b| b.metrics.sharpe.total_cmp(&a.metrics.sharpe));
        ranked
    }
}

/// Run every grid combination not already in `checkpoint`.
///
/// Each combination gets a fresh strategy and a fresh broker from
/// `new_broker`. A combination that fails to build or run is logged and
/// skipped; a checkpoint write failure aborts the sweep.
pub fn run_sweep(
    feed: &PriceFeed,
    config: &(dyn ConfigPort + Sync),
    grid: &ParamGrid,
    new_broker: &(dyn Fn() -> Box<dyn BrokerPort> + Sync),
    checkpoint: &mut (dyn CheckpointPort + Send),
) -> Result<SweepOutcome, AlgotronError> {
    let previous = checkpoint.load()?;
    let done: HashSet<&ParamSet> = previous.iter().map(|r| &r.params).collect();
    let pending: Vec<ParamSet> = grid
        .combinations()
        .into_iter()
        .filter(|params| !done.contains(params))
        .collect();

    info!(
        combinations = pending.len() + done.len(),
        resumed = done.len(),
        pending = pending.len(),
        "sweep starting"
    );

    let total = pending.len();
    let sink = Mutex::new(checkpoint);
    let results: Vec<Option<SweepRecord>> = pending
        .par_iter()
        .enumerate()
        .map(|(idx, params)| -> Result<Option<SweepRecord>, AlgotronError> {
            let overlay = OverrideConfig::new(config, params);
            let run = build_strategy(&overlay, feed.instruments()).and_then(|strategy| {
                let mut broker = new_broker();
                run_backtest(feed, strategy.as_ref(), broker.as_mut())
            });
            let result = match run {
                Ok(result) => result,
                Err(e) => {
                    warn!(?params, error = %e, "sweep combination failed");
                    return Ok(None);
                }
            };

            let record = SweepRecord {
                params: params.clone(),
                metrics: Metrics::compute(&result),
            };
            sink.lock()
                .map_err(|_| AlgotronError::Checkpoint {
                    reason: "checkpoint lock poisoned".into(),
                })?
                .append(&record)?;
            info!(
                done = idx + 1,
                total,
                sharpe = record.metrics.sharpe,
                ?params,
                "sweep combination finished"
            );
            Ok(Some(record))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let failed = results.iter().filter(|r| r.is_none()).count();
    let fresh: Vec<SweepRecord> = results.into_iter().flatten().collect();
    let ran = fresh.len();
    let resumed = previous.len();

    let mut records = previous;
    records.extend(fresh);
    Ok(SweepOutcome {
        records,
        resumed,
        ran,
        failed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    fn grid(body: &str) -> ParamGrid {
        let cfg = FileConfigAdapter::from_string(&format!("[sweep]\n{body}")).unwrap();
        ParamGrid::from_config(&cfg).unwrap()
    }

    #[test]
    fn product_in_sorted_key_order() {
        let g = grid("slow_lookback = 50|100\nfast_lookback = 10|21|42\n");
        assert_eq!(g.keys(), &["fast_lookback", "slow_lookback"]);
        assert_eq!(g.full_size(), 6);

        let combos = g.combinations();
        assert_eq!(combos.len(), 6);
        assert_eq!(combos[0]["fast_lookback"], "10");
        assert_eq!(combos[0]["slow_lookback"], "50");
        assert_eq!(combos[1]["fast_lookback"], "10");
        assert_eq!(combos[1]["slow_lookback"], "100");
        assert_eq!(combos[5]["fast_lookback"], "42");
        assert_eq!(combos[5]["slow_lookback"], "100");
    }

    #[test]
    fn truncated_to_max_combinations() {
        let g = grid("max_combinations = 4\na = 1|2|3\nb = x|y\n");
        let combos = g.combinations();
        assert_eq!(combos.len(), 4);
        assert_eq!(g.full_size(), 6);
        assert_eq!(combos[3]["a"], "2");
        assert_eq!(combos[3]["b"], "y");
    }

    #[test]
    fn empty_candidates_rejected() {
        let cfg = FileConfigAdapter::from_string("[sweep]\nlookback = |\n").unwrap();
        assert!(ParamGrid::from_config(&cfg).is_err());
        let cfg = FileConfigAdapter::from_string("[sweep]\nmax_combinations = 3\n").unwrap();
        assert!(ParamGrid::from_config(&cfg).is_err());
    }

    #[test]
    fn override_shadows_strategy_keys_only() {
        let base = FileConfigAdapter::from_string(
            "[backtest]\nlookback = 5\n[strategy]\nkind = trend_following\nlookback = 21\n",
        )
        .unwrap();
        let mut params = ParamSet::new();
        params.insert("lookback".into(), "63".into());
        params.insert("rebound_fast_weight".into(), "0.3".into());
        let overlay = OverrideConfig::new(&base, &params);

        assert_eq!(overlay.get_int("strategy", "lookback", 0), 63);
        assert_eq!(overlay.get_int("backtest", "lookback", 0), 5);
        assert_eq!(
            overlay.get_string("strategy", "kind").as_deref(),
            Some("trend_following")
        );
        assert_eq!(overlay.get_double("strategy", "rebound_fast_weight", 0.5), 0.3);
        assert_eq!(
            overlay.keys("strategy"),
            vec!["kind", "lookback", "rebound_fast_weight"]
        );
    }
}
