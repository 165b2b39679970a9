//! Performance metrics over the daily snapshot series.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::backtest::BacktestResult;
use super::recorder::PortfolioSnapshot;
use super::strategy::target_shares;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;
pub const ROLLING_VOLATILITY_WINDOW: usize = 21;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub cagr: f64,
    /// Annualized sample standard deviation of daily returns.
    pub volatility: f64,
    /// CAGR over volatility; 0 when volatility is 0.
    pub sharpe: f64,
    pub max_drawdown: f64,
    /// Longest run of consecutive bars below the running peak.
    pub max_drawdown_duration: usize,
    pub cumulative_return: f64,
    pub trading_days: usize,
    pub total_trades: usize,
    pub total_commission: f64,
    pub total_dividends: f64,
}

impl Metrics {
    pub fn compute(result: &BacktestResult) -> Self {
        let values: Vec<f64> = result.snapshots.iter().map(|s| s.portfolio_value).collect();
        Metrics {
            total_trades: result.trades.len(),
            total_commission: result.total_commission(),
            total_dividends: result.snapshots.iter().map(|s| s.dividends).sum(),
            ..Self::from_values(&values)
        }
    }

    /// Metrics of a bare portfolio value series.
    pub fn from_values(values: &[f64]) -> Self {
        let n = values.len();
        let (first, last) = match (values.first(), values.last()) {
            (Some(&f), Some(&l)) if f > 0.0 => (f, l),
            _ => return Self::empty(n),
        };

        let cumulative_return = last / first - 1.0;
        let cagr = (last / first).powf(TRADING_DAYS_PER_YEAR / n as f64) - 1.0;

        let returns: Vec<f64> = daily_returns(values).into_iter().flatten().collect();
        let volatility = sample_std(&returns)
            .map(|sd| sd * TRADING_DAYS_PER_YEAR.sqrt())
            .unwrap_or(0.0);
        let sharpe = if volatility != 0.0 {
            cagr / volatility
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_duration) = compute_drawdown(values);

        Metrics {
            cagr,
            volatility,
            sharpe,
            max_drawdown,
            max_drawdown_duration,
            cumulative_return,
            trading_days: n,
            total_trades: 0,
            total_commission: 0.0,
            total_dividends: 0.0,
        }
    }

    fn empty(trading_days: usize) -> Self {
        Metrics {
            cagr: 0.0,
            volatility: 0.0,
            sharpe: 0.0,
            max_drawdown: 0.0,
            max_drawdown_duration: 0,
            cumulative_return: 0.0,
            trading_days,
            total_trades: 0,
            total_commission: 0.0,
            total_dividends: 0.0,
        }
    }
}

/// Percent change from the previous value; `None` for the first bar or
/// after a zero value.
pub fn daily_returns(values: &[f64]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(values.len());
    if values.is_empty() {
        return out;
    }
    out.push(None);
    out.extend(values.windows(2).map(|w| {
        if w[0] != 0.0 {
            Some(w[1] / w[0] - 1.0)
        } else {
            None
        }
    }));
    out
}

/// Standard deviation with one degree of freedom; `None` below two samples.
fn sample_std(samples: &[f64]) -> Option<f64> {
    if samples.len() < 2 {
        return None;
    }
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let variance = samples.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(variance.sqrt())
}

/// Worst peak-to-trough fraction and longest underwater stretch in bars.
fn compute_drawdown(values: &[f64]) -> (f64, usize) {
    let Some(&first) = values.first() else {
        return (0.0, 0);
    };

    let mut peak = first;
    let mut max_dd = 0.0_f64;
    let mut max_dd_duration = 0usize;
    let mut current_dd_duration = 0usize;

    for &value in values {
        if value >= peak {
            peak = value;
            current_dd_duration = 0;
        } else if peak > 0.0 {
            max_dd = max_dd.max((peak - value) / peak);
            current_dd_duration += 1;
            max_dd_duration = max_dd_duration.max(current_dd_duration);
        }
    }

    (max_dd, max_dd_duration)
}

/// Per-bar derived series, aligned with the snapshots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSeries {
    pub dates: Vec<NaiveDate>,
    pub returns: Vec<Option<f64>>,
    pub cumulative_return: Vec<f64>,
    pub drawdown: Vec<f64>,
    /// Annualized volatility over the trailing 21 returns.
    pub rolling_volatility: Vec<Option<f64>>,
}

impl MetricsSeries {
    pub fn compute(snapshots: &[PortfolioSnapshot]) -> Self {
        let values: Vec<f64> = snapshots.iter().map(|s| s.portfolio_value).collect();
        let first = values.first().copied().unwrap_or(0.0);

        let cumulative_return = values
            .iter()
            .map(|v| if first != 0.0 { v / first - 1.0 } else { 0.0 })
            .collect();

        let mut peak = f64::NEG_INFINITY;
        let drawdown = values
            .iter()
            .map(|&v| {
                peak = peak.max(v);
                if peak > 0.0 { (peak - v) / peak } else { 0.0 }
            })
            .collect();

        let returns = daily_returns(&values);
        let rolling_volatility = rolling_volatility(&returns, ROLLING_VOLATILITY_WINDOW);

        MetricsSeries {
            dates: snapshots.iter().map(|s| s.date).collect(),
            returns,
            cumulative_return,
            drawdown,
            rolling_volatility,
        }
    }
}

/// Annualized sample std over each trailing `window` of returns. A window
/// containing a missing return yields `None`.
pub fn rolling_volatility(returns: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    (0..returns.len())
        .map(|t| {
            if window == 0 || t + 1 < window {
                return None;
            }
            let samples: Option<Vec<f64>> = returns[t + 1 - window..=t].iter().copied().collect();
            sample_std(&samples?).map(|sd| sd * TRADING_DAYS_PER_YEAR.sqrt())
        })
        .collect()
}

/// Where the final portfolio would put `capital`, per instrument.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionTarget {
    pub instrument: String,
    /// Share of final portfolio value held in the instrument.
    pub weight: f64,
    pub price: f64,
    pub expected_size: i64,
    pub expected_value: f64,
}

/// Scale the final snapshot's weights onto `capital * leverage`.
///
/// `prices` are the last closes; instruments without a price are skipped.
pub fn final_positions(
    snapshot: &PortfolioSnapshot,
    prices: &[(String, f64)],
    capital: f64,
    leverage: f64,
) -> Vec<PositionTarget> {
    let deployable = capital * leverage;
    snapshot
        .positions
        .iter()
        .filter_map(|(code, state)| {
            let price = prices.iter().find(|(c, _)| c == code).map(|(_, p)| *p)?;
            let weight = if snapshot.portfolio_value != 0.0 {
                state.position_value / snapshot.portfolio_value
            } else {
                0.0
            };
            let expected_size = target_shares(weight, deployable, price);
            Some(PositionTarget {
                instrument: code.clone(),
                weight,
                price,
                expected_size,
                expected_value: expected_size as f64 * price,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ledger::PositionState;
    use approx::assert_relative_eq;

    fn snapshots(values: &[f64]) -> Vec<PortfolioSnapshot> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| PortfolioSnapshot {
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
                    + chrono::Duration::days(i as i64),
                portfolio_value: v,
                dividends: 0.0,
                positions: vec![],
            })
            .collect()
    }

    #[test]
    fn flat_series_has_zero_sharpe() {
        let m = Metrics::from_values(&[100.0; 10]);
        assert_eq!(m.volatility, 0.0);
        assert_eq!(m.sharpe, 0.0);
        assert_eq!(m.cagr, 0.0);
        assert_eq!(m.max_drawdown, 0.0);
    }

    #[test]
    fn cagr_uses_observation_count() {
        let values: Vec<f64> = (0..252).map(|i| 100.0 + i as f64 * (10.0 / 251.0)).collect();
        let m = Metrics::from_values(&values);
        assert_relative_eq!(m.cagr, 0.10, epsilon = 1e-9);
        assert_relative_eq!(m.cumulative_return, 0.10, epsilon = 1e-9);
        assert_eq!(m.trading_days, 252);
    }

    #[test]
    fn volatility_is_sample_std() {
        // returns: +10%, -10%
        let m = Metrics::from_values(&[100.0, 110.0, 99.0]);
        let sd = (0.02_f64).sqrt(); // mean 0, ((0.1)^2 + (0.1)^2) / 1
        assert_relative_eq!(m.volatility, sd * 252f64.sqrt(), epsilon = 1e-12);
        assert_relative_eq!(m.sharpe, m.cagr / m.volatility, epsilon = 1e-12);
    }

    #[test]
    fn drawdown_depth_and_duration() {
        let m = Metrics::from_values(&[100.0, 120.0, 90.0, 96.0, 130.0, 117.0]);
        assert_relative_eq!(m.max_drawdown, 0.25);
        assert_eq!(m.max_drawdown_duration, 2);
    }

    #[test]
    fn empty_and_single_value() {
        let m = Metrics::from_values(&[]);
        assert_eq!(m.trading_days, 0);
        assert_eq!(m.sharpe, 0.0);
        let m = Metrics::from_values(&[100.0]);
        assert_eq!(m.volatility, 0.0);
        assert_eq!(m.cumulative_return, 0.0);
    }

    #[test]
    fn series_follow_definitions() {
        let s = MetricsSeries::compute(&snapshots(&[100.0, 110.0, 99.0, 121.0]));
        assert_eq!(s.returns[0], None);
        assert_relative_eq!(s.returns[1].unwrap(), 0.1, epsilon = 1e-12);
        assert_relative_eq!(s.cumulative_return[3], 0.21, epsilon = 1e-12);
        assert_relative_eq!(s.drawdown[2], 0.1, epsilon = 1e-12);
        assert_eq!(s.drawdown[3], 0.0);
        assert!(s.rolling_volatility.iter().all(Option::is_none));
    }

    #[test]
    fn rolling_volatility_window() {
        let returns = vec![None, Some(0.1), Some(-0.1), Some(0.1)];
        let vol = rolling_volatility(&returns, 2);
        assert_eq!(vol[0], None);
        assert_eq!(vol[1], None);
        let expected = (0.02_f64).sqrt() * 252f64.sqrt();
        assert_relative_eq!(vol[2].unwrap(), expected, epsilon = 1e-12);
        assert_relative_eq!(vol[3].unwrap(), expected, epsilon = 1e-12);
    }

    #[test]
    fn final_positions_scale_to_capital() {
        let snapshot = PortfolioSnapshot {
            date: NaiveDate::from_ymd_opt(2024, 6, 28).unwrap(),
            portfolio_value: 10_000.0,
            dividends: 0.0,
            positions: vec![
                (
                    "SPY".into(),
                    PositionState {
                        position_size: 12,
                        position_value: 6_000.0,
                        ..Default::default()
                    },
                ),
                ("TLT".into(), PositionState::default()),
            ],
        };
        let prices = vec![("SPY".to_string(), 500.0), ("TLT".to_string(), 90.0)];
        let targets = final_positions(&snapshot, &prices, 50_000.0, 2.0);
        assert_eq!(targets.len(), 2);
        assert_relative_eq!(targets[0].weight, 0.6);
        assert_eq!(targets[0].expected_size, 120);
        assert_relative_eq!(targets[0].expected_value, 60_000.0);
        assert_eq!(targets[1].expected_size, 0);
    }
}
