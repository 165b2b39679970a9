//! Instrument universe: the `[backtest] codes` list and data coverage checks.

use chrono::NaiveDate;
use std::collections::HashSet;
use tracing::{info, warn};

use crate::domain::error::AlgotronError;
use crate::ports::data_port::DataPort;

/// Parse a comma-separated code list into upper-case tickers, keeping order.
pub fn parse_codes(input: &str) -> Result<Vec<String>, AlgotronError> {
    let mut codes = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(AlgotronError::invalid(
                "backtest",
                "codes",
                "empty token in code list",
            ));
        }
        let code = trimmed.to_uppercase();
        if !seen.insert(code.clone()) {
            return Err(AlgotronError::invalid(
                "backtest",
                "codes",
                format!("duplicate code {code}"),
            ));
        }
        codes.push(code);
    }

    Ok(codes)
}

/// Data coverage of one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolCoverage {
    pub code: String,
    pub first: NaiveDate,
    pub last: NaiveDate,
    pub bars: usize,
}

impl SymbolCoverage {
    /// True when the data spans `[start, end]`.
    pub fn covers(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.first <= start && self.last >= end
    }
}

/// Coverage for each code. Symbols with no data or unreadable files are
/// logged and left out.
pub fn survey(data: &dyn DataPort, codes: &[String]) -> Vec<SymbolCoverage> {
    let mut found = Vec::with_capacity(codes.len());
    for code in codes {
        match data.get_data_range(code) {
            Ok(Some((first, last, bars))) => found.push(SymbolCoverage {
                code: code.clone(),
                first,
                last,
                bars,
            }),
            Ok(None) => warn!(code = %code, "no data, skipping"),
            Err(e) => warn!(code = %code, error = %e, "unreadable data, skipping"),
        }
    }
    info!(requested = codes.len(), available = found.len(), "universe surveyed");
    found
}

/// Check that every code has data reaching `[start, end]`.
///
/// Partial coverage is only a warning: the price feed decides how to treat
/// the resulting gaps. A code with no data at all is an error.
pub fn check_coverage(
    data: &dyn DataPort,
    codes: &[String],
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<SymbolCoverage>, AlgotronError> {
    let found = survey(data, codes);
    for code in codes {
        match found.iter().find(|c| &c.code == code) {
            None => return Err(AlgotronError::NoData { code: code.clone() }),
            Some(c) if !c.covers(start, end) => warn!(
                code = %code,
                first = %c.first,
                last = %c.last,
                "data does not span the backtest range"
            ),
            Some(_) => {}
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_codes_trims_and_uppercases() {
        let result = parse_codes("  spy , tlt ,Gld").unwrap();
        assert_eq!(result, vec!["SPY", "TLT", "GLD"]);
    }

    #[test]
    fn parse_codes_single() {
        assert_eq!(parse_codes("SPY").unwrap(), vec!["SPY"]);
    }

    #[test]
    fn parse_codes_empty_token() {
        let err = parse_codes("SPY,,TLT").unwrap_err();
        assert!(matches!(err, AlgotronError::ConfigInvalid { key, .. } if key == "codes"));
    }

    #[test]
    fn parse_codes_duplicate() {
        let err = parse_codes("SPY,TLT,spy").unwrap_err();
        assert!(err.to_string().contains("duplicate code SPY"));
    }

    #[test]
    fn coverage_span() {
        let d = |m, day| NaiveDate::from_ymd_opt(2024, m, day).unwrap();
        let cov = SymbolCoverage {
            code: "SPY".into(),
            first: d(1, 2),
            last: d(6, 28),
            bars: 120,
        };
        assert!(cov.covers(d(1, 2), d(6, 28)));
        assert!(cov.covers(d(2, 1), d(3, 1)));
        assert!(!cov.covers(d(1, 1), d(3, 1)));
        assert!(!cov.covers(d(2, 1), d(7, 1)));
    }
}
