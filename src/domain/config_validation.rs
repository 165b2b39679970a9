//! Configuration validation, run before any data is loaded.

use chrono::NaiveDate;

use crate::domain::error::AlgotronError;
use crate::domain::price_feed::GapPolicy;
use crate::domain::strategy::{build_strategy, STRATEGY_KINDS};
use crate::domain::sweep::{OverrideConfig, ParamGrid, SWEEP_SECTION};
use crate::domain::universe::parse_codes;
use crate::ports::config_port::ConfigPort;

const BACKTEST: &str = "backtest";

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), AlgotronError> {
    validate_initial_capital(config)?;
    validate_commission(config)?;
    validate_dates(config)?;
    validate_codes(config)?;
    validate_gap_policy(config)?;
    Ok(())
}

/// Check `[strategy]` by building it over the configured universe.
pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), AlgotronError> {
    let kind = config
        .get_string("strategy", "kind")
        .ok_or_else(|| AlgotronError::missing("strategy", "kind"))?;
    if !STRATEGY_KINDS.contains(&kind.trim()) {
        return Err(AlgotronError::UnknownStrategy { kind });
    }
    build_strategy(config, &configured_codes(config)?)?;
    Ok(())
}

/// Check `[sweep]`: the grid parses and every combination builds a strategy.
pub fn validate_sweep_config(config: &dyn ConfigPort) -> Result<usize, AlgotronError> {
    let grid = ParamGrid::from_config(config)?;
    let universe = configured_codes(config)?;
    let combinations = grid.combinations();
    for params in &combinations {
        let overlay = OverrideConfig::new(config, params);
        build_strategy(&overlay, &universe).map_err(|e| {
            AlgotronError::invalid(SWEEP_SECTION, &format!("{params:?}"), e.to_string())
        })?;
    }
    Ok(combinations.len())
}

/// The `[backtest] codes` list, parsed.
pub fn configured_codes(config: &dyn ConfigPort) -> Result<Vec<String>, AlgotronError> {
    match config.get_string(BACKTEST, "codes") {
        Some(raw) if !raw.trim().is_empty() => parse_codes(&raw),
        _ => Err(AlgotronError::missing(BACKTEST, "codes")),
    }
}

fn validate_initial_capital(config: &dyn ConfigPort) -> Result<(), AlgotronError> {
    let value = config.get_double(BACKTEST, "initial_capital", 100_000.0);
    if value <= 0.0 {
        return Err(AlgotronError::invalid(
            BACKTEST,
            "initial_capital",
            "initial_capital must be positive",
        ));
    }
    Ok(())
}

fn validate_commission(config: &dyn ConfigPort) -> Result<(), AlgotronError> {
    for key in ["commission_per_trade", "commission_pct"] {
        if config.get_double(BACKTEST, key, 0.0) < 0.0 {
            return Err(AlgotronError::invalid(
                BACKTEST,
                key,
                format!("{key} must be non-negative"),
            ));
        }
    }
    Ok(())
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), AlgotronError> {
    let start_date = parse_date(config, "start_date")?;
    let end_date = parse_date(config, "end_date")?;

    if start_date >= end_date {
        return Err(AlgotronError::invalid(
            BACKTEST,
            "start_date",
            "start_date must be before end_date",
        ));
    }
    Ok(())
}

/// Parse a required `YYYY-MM-DD` date from `[backtest]`.
pub fn parse_date(config: &dyn ConfigPort, field: &str) -> Result<NaiveDate, AlgotronError> {
    let raw = config
        .get_string(BACKTEST, field)
        .ok_or_else(|| AlgotronError::missing(BACKTEST, field))?;
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
        AlgotronError::invalid(
            BACKTEST,
            field,
            format!("invalid {field} format, expected YYYY-MM-DD"),
        )
    })
}

fn validate_codes(config: &dyn ConfigPort) -> Result<(), AlgotronError> {
    configured_codes(config).map(|_| ())
}

fn validate_gap_policy(config: &dyn ConfigPort) -> Result<(), AlgotronError> {
    if let Some(raw) = config.get_string(BACKTEST, "gap_policy") {
        raw.parse::<GapPolicy>()?;
    }
    Ok(())
}
