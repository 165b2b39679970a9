//! Daily price bar representation.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Cash dividend per share paid on this date.
    pub dividends: f64,
}

/// Recover per-share dividends from the gap between close and adjusted close
/// returns.
///
/// `div[i] = close[i-1] * (adj_ret[i] - close_ret[i])`, clamped at zero.
/// The first observation has no prior close and gets zero.
pub fn derive_dividends(closes: &[f64], adj_closes: &[f64]) -> Vec<f64> {
    let n = closes.len().min(adj_closes.len());
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        if i == 0 {
            out.push(0.0);
            continue;
        }
        let prev_close = closes[i - 1];
        let prev_adj = adj_closes[i - 1];
        if prev_close == 0.0 || prev_adj == 0.0 {
            out.push(0.0);
            continue;
        }
        let close_ret = closes[i] / prev_close - 1.0;
        let adj_ret = adj_closes[i] / prev_adj - 1.0;
        out.push((prev_close * (adj_ret - close_ret)).max(0.0));
    }
    out
}
