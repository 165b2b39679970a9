//! Typed reads of `[strategy]` keys.
//!
//! Unlike the raw [`ConfigPort`] getters these reject malformed values
//! instead of silently falling back to the default.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use crate::domain::error::AlgotronError;
use crate::ports::config_port::ConfigPort;

pub const SECTION: &str = "strategy";

fn parse_value<T: FromStr>(key: &str, raw: &str, expected: &str) -> Result<T, AlgotronError> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| AlgotronError::invalid(SECTION, key, format!("expected {expected}, got {raw:?}")))
}

/// A bar count that must be at least 1.
pub fn period(config: &dyn ConfigPort, key: &str, default: usize) -> Result<usize, AlgotronError> {
    let value = match config.get_string(SECTION, key) {
        Some(raw) => parse_value::<usize>(key, &raw, "a positive integer")?,
        None => default,
    };
    if value == 0 {
        return Err(AlgotronError::invalid(SECTION, key, "must be at least 1"));
    }
    Ok(value)
}

/// A blend weight in `[0, 1]`.
pub fn fraction(config: &dyn ConfigPort, key: &str, default: f64) -> Result<f64, AlgotronError> {
    let value = match config.get_string(SECTION, key) {
        Some(raw) => parse_value::<f64>(key, &raw, "a number")?,
        None => default,
    };
    check_fraction(key, value)
}

fn check_fraction(key: &str, value: f64) -> Result<f64, AlgotronError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(AlgotronError::invalid(
            SECTION,
            key,
            format!("{value} is outside [0, 1]"),
        ));
    }
    Ok(value)
}

/// An instrument name that must belong to `universe`.
pub fn instrument(
    config: &dyn ConfigPort,
    key: &str,
    universe: &[String],
) -> Result<Option<String>, AlgotronError> {
    match config.get_string(SECTION, key) {
        None => Ok(None),
        Some(raw) => {
            let code = raw.trim().to_string();
            if !universe.contains(&code) {
                return Err(AlgotronError::unknown_instrument(&code));
            }
            Ok(Some(code))
        }
    }
}

/// Parse `SPY:0.6,TLT:0.4` into a map keyed by instrument.
///
/// Every instrument must be in `universe` and appear at most once.
pub fn parse_instrument_map(
    key: &str,
    raw: &str,
    universe: &[String],
) -> Result<BTreeMap<String, f64>, AlgotronError> {
    let mut map = BTreeMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let Some((code, value)) = entry.split_once(':') else {
            return Err(AlgotronError::invalid(
                SECTION,
                key,
                format!("expected INSTRUMENT:VALUE, got {entry:?}"),
            ));
        };
        let code = code.trim();
        if !universe.iter().any(|u| u == code) {
            return Err(AlgotronError::unknown_instrument(code));
        }
        let value = parse_value::<f64>(key, value, "a number")?;
        if map.insert(code.to_string(), value).is_some() {
            return Err(AlgotronError::invalid(
                SECTION,
                key,
                format!("{code} listed twice"),
            ));
        }
    }
    Ok(map)
}

/// An explicit instrument map, `None` when the key is absent.
pub fn instrument_map(
    config: &dyn ConfigPort,
    key: &str,
    universe: &[String],
) -> Result<Option<BTreeMap<String, f64>>, AlgotronError> {
    config
        .get_string(SECTION, key)
        .map(|raw| parse_instrument_map(key, &raw, universe))
        .transpose()
}

/// A value per instrument in `universe`.
///
/// The key may hold a single number applied to every instrument or a map
/// that overrides `default` for the listed instruments.
pub fn per_instrument(
    config: &dyn ConfigPort,
    key: &str,
    universe: &[String],
    default: f64,
) -> Result<HashMap<String, f64>, AlgotronError> {
    let mut values: HashMap<String, f64> =
        universe.iter().map(|code| (code.clone(), default)).collect();
    let Some(raw) = config.get_string(SECTION, key) else {
        return Ok(values);
    };
    if raw.contains(':') {
        values.extend(parse_instrument_map(key, &raw, universe)?);
    } else {
        let value = parse_value::<f64>(key, &raw, "a number or INSTRUMENT:VALUE list")?;
        values.values_mut().for_each(|v| *v = value);
    }
    Ok(values)
}

/// [`per_instrument`] for lookback periods.
pub fn per_instrument_period(
    config: &dyn ConfigPort,
    key: &str,
    universe: &[String],
    default: usize,
) -> Result<HashMap<String, usize>, AlgotronError> {
    per_instrument(config, key, universe, default as f64)?
        .into_iter()
        .map(|(code, value)| {
            if value < 1.0 || value.fract() != 0.0 {
                return Err(AlgotronError::invalid(
                    SECTION,
                    key,
                    format!("{code}: {value} is not a positive integer"),
                ));
            }
            Ok((code, value as usize))
        })
        .collect()
}

/// [`per_instrument`] for blend weights in `[0, 1]`.
pub fn per_instrument_fraction(
    config: &dyn ConfigPort,
    key: &str,
    universe: &[String],
    default: f64,
) -> Result<HashMap<String, f64>, AlgotronError> {
    per_instrument(config, key, universe, default)?
        .into_iter()
        .map(|(code, value)| check_fraction(key, value).map(|v| (code, v)))
        .collect()
}
