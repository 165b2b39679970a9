//! Backtest engine: the per-day simulation loop.
//!
//! Each simulated day pushes closes to the broker, takes the portfolio
//! snapshot (dividends credited, ledger marked to market) and, on rebalance
//! days, converts the strategy's target weights into whole-share orders.

use chrono::NaiveDate;
use tracing::{debug, info};

use super::error::AlgotronError;
use super::ledger::PositionLedger;
use super::order::{submit, TradeRecord};
use super::price_feed::{GapPolicy, PriceFeed};
use super::recorder::{PortfolioRecorder, PortfolioSnapshot};
use super::strategy::{target_shares, DecisionContext, Strategy};
use crate::ports::broker_port::BrokerPort;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub codes: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: f64,
    pub commission_per_trade: f64,
    /// Percent of notional, e.g. 0.1 for 0.1%.
    pub commission_pct: f64,
    pub gap_policy: GapPolicy,
}

#[derive(Debug, Clone)]
pub struct BacktestResult {
    pub strategy: String,
    pub instruments: Vec<String>,
    pub snapshots: Vec<PortfolioSnapshot>,
    pub trades: Vec<TradeRecord>,
    pub ledger: PositionLedger,
}

impl BacktestResult {
    pub fn final_value(&self) -> Option<f64> {
        self.snapshots.last().map(|s| s.portfolio_value)
    }

    pub fn total_commission(&self) -> f64 {
        self.trades.iter().map(|t| t.commission).sum()
    }
}

/// Index of the first bar at which `warmup_bars` bars of history exist.
pub fn first_simulated_bar(warmup_bars: usize) -> usize {
    warmup_bars.max(1) - 1
}

/// Replay `feed` through `strategy`, routing orders to `broker`.
///
/// Simulation starts at the first bar where every indicator is valid; the
/// warmup bars produce no snapshots. The broker should be freshly funded
/// with the initial capital.
pub fn run_backtest(
    feed: &PriceFeed,
    strategy: &dyn Strategy,
    broker: &mut dyn BrokerPort,
) -> Result<BacktestResult, AlgotronError> {
    let instruments = feed.instruments().to_vec();
    let start = first_simulated_bar(strategy.warmup_bars());
    if start >= feed.len() {
        return Err(AlgotronError::DataSource {
            reason: format!(
                "{} bars available, {} needs {} for warmup",
                feed.len(),
                strategy.name(),
                strategy.warmup_bars()
            ),
        });
    }
    let period = strategy.rebalance_period().max(1);

    info!(
        strategy = strategy.name(),
        instruments = instruments.len(),
        bars = feed.len() - start,
        first_date = %feed.dates()[start],
        rebalance_period = period,
        "backtest starting"
    );

    let mut ledger = PositionLedger::with_instruments(&instruments)?;
    let mut recorder = PortfolioRecorder::new();
    let mut trades = Vec::new();

    for (day, bar) in (start..feed.len()).enumerate() {
        let date = feed.dates()[bar];
        let quotes = feed.quotes(bar);
        for (code, quote) in instruments.iter().zip(&quotes) {
            broker.update_price(code, quote.close);
        }

        recorder.snapshot(date, &quotes, broker, &mut ledger)?;

        if day % period != 0 {
            continue;
        }

        let portfolio_value = broker.portfolio_value();
        let ctx = DecisionContext::new(day, date, portfolio_value, &ledger, feed.closes(), bar);
        let targets = strategy.decide(&ctx)?;

        let mut deltas = Vec::with_capacity(targets.len());
        for (code, weight) in targets.iter() {
            let index = instruments
                .iter()
                .position(|c| c == code)
                .ok_or_else(|| AlgotronError::unknown_instrument(code))?;
            let price = quotes[index].close;
            let target = target_shares(weight, portfolio_value, price);
            deltas.push((code.to_string(), target - broker.position(code), price));
        }

        let orders = deltas.iter().filter(|(_, delta, _)| *delta != 0).count();
        debug!(%date, day, portfolio_value, orders, "rebalance");

        for (code, delta, price) in deltas {
            if let Some((order, fill)) = submit(broker, &mut ledger, &code, delta, price)? {
                trades.push(TradeRecord {
                    date,
                    instrument: order.instrument,
                    side: order.side,
                    size: order.size,
                    price: fill.price,
                    commission: fill.commission,
                });
            }
        }
    }

    let snapshots = recorder.into_snapshots();
    info!(
        strategy = strategy.name(),
        days = snapshots.len(),
        trades = trades.len(),
        final_value = snapshots.last().map(|s| s.portfolio_value).unwrap_or_default(),
        "backtest finished"
    );

    Ok(BacktestResult {
        strategy: strategy.name().to_string(),
        instruments,
        snapshots,
        trades,
        ledger,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::paper_broker::PaperBroker;
    use crate::domain::ohlcv::PriceBar;
    use crate::domain::price_feed::InstrumentSeries;
    use crate::domain::strategy::buy_hold::BuyHold;
    use crate::domain::strategy::static_allocation::StaticAllocation;
    use crate::domain::strategy::trend::TrendFollowing;
    use approx::assert_relative_eq;
    use chrono::Duration;

    fn series(code: &str, closes: &[f64]) -> InstrumentSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| PriceBar {
                date: start + Duration::days(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1_000.0,
                dividends: 0.0,
            })
            .collect();
        InstrumentSeries::new(code.into(), bars)
    }

    fn feed(series: &[InstrumentSeries]) -> PriceFeed {
        PriceFeed::align(series, GapPolicy::Fail).unwrap()
    }

    #[test]
    fn buy_hold_invests_on_first_day() {
        let feed = feed(&[series("SPY", &[100.0, 110.0, 120.0])]);
        let mut broker = PaperBroker::new(10_050.0);
        let result = run_backtest(&feed, &BuyHold::new("SPY"), &mut broker).unwrap();

        assert_eq!(result.snapshots.len(), 3);
        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].size, 100);
        // first snapshot precedes the first order
        assert_relative_eq!(result.snapshots[0].portfolio_value, 10_050.0);
        assert_relative_eq!(result.snapshots[2].portfolio_value, 50.0 + 100.0 * 120.0);
        let spy = result.snapshots[2].position("SPY").unwrap();
        assert_eq!(spy.position_size, 100);
        assert_relative_eq!(spy.unrealized_pnl, 2_000.0);
        assert_relative_eq!(spy.realized_pnl, 0.0);
    }

    #[test]
    fn warmup_bars_are_not_snapshotted() {
        let feed = feed(&[series("SPY", &[100.0, 101.0, 102.0, 103.0, 104.0])]);
        let strategy = TrendFollowing::new("SPY", 2);
        let mut broker = PaperBroker::new(1_000.0);
        let result = run_backtest(&feed, &strategy, &mut broker).unwrap();
        assert_eq!(result.snapshots.len(), 3);
        assert_eq!(result.snapshots[0].date, feed.dates()[2]);
    }

    #[test]
    fn too_little_history_is_an_error() {
        let feed = feed(&[series("SPY", &[100.0, 101.0])]);
        let strategy = TrendFollowing::new("SPY", 21);
        let mut broker = PaperBroker::new(1_000.0);
        assert!(run_backtest(&feed, &strategy, &mut broker).is_err());
    }

    #[test]
    fn rebalances_only_on_period_days() {
        let closes: Vec<f64> = (0..7).map(|i| 100.0 + i as f64).collect();
        let feed = feed(&[series("SPY", &closes), series("TLT", &closes)]);
        let strategy = StaticAllocation::new(
            vec![("SPY".into(), 0.5), ("TLT".into(), 0.5)],
            3,
        );
        let mut broker = PaperBroker::new(10_000.0);
        let result = run_backtest(&feed, &strategy, &mut broker).unwrap();
        let trade_days: Vec<NaiveDate> = result.trades.iter().map(|t| t.date).collect();
        for date in &trade_days {
            let day = feed.dates().iter().position(|d| d == date).unwrap();
            assert_eq!(day % 3, 0);
        }
        assert!(trade_days.contains(&feed.dates()[0]));
    }

    #[test]
    fn first_simulated_bar_clamps() {
        assert_eq!(first_simulated_bar(0), 0);
        assert_eq!(first_simulated_bar(1), 0);
        assert_eq!(first_simulated_bar(22), 21);
    }
}
