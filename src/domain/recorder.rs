//! Daily portfolio snapshots: the raw output of a backtest.

use chrono::NaiveDate;
use serde::Serialize;

use super::error::AlgotronError;
use super::ledger::{PositionLedger, PositionState};
use crate::ports::broker_port::BrokerPort;

/// Close and dividend-per-share for one instrument on the snapshot date.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailyQuote {
    pub close: f64,
    pub dividend: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioSnapshot {
    pub date: NaiveDate,
    pub portfolio_value: f64,
    pub dividends: f64,
    /// Per-instrument state in universe order.
    pub positions: Vec<(String, PositionState)>,
}

impl PortfolioSnapshot {
    pub fn position(&self, instrument: &str) -> Option<&PositionState> {
        self.positions
            .iter()
            .find(|(code, _)| code == instrument)
            .map(|(_, state)| state)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PortfolioRecorder {
    snapshots: Vec<PortfolioSnapshot>,
}

impl PortfolioRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the snapshot for `date`.
    ///
    /// Credits dividends on current holdings to the broker, marks every
    /// ledger instrument to `quotes`, then records the broker's portfolio
    /// value. `quotes` is indexed like `ledger.instruments()`. Dates must be
    /// strictly increasing.
    pub fn snapshot(
        &mut self,
        date: NaiveDate,
        quotes: &[DailyQuote],
        broker: &mut dyn BrokerPort,
        ledger: &mut PositionLedger,
    ) -> Result<&PortfolioSnapshot, AlgotronError> {
        if let Some(last) = self.snapshots.last() {
            if date <= last.date {
                return Err(AlgotronError::SnapshotOrder {
                    previous: last.date,
                    date,
                });
            }
        }

        let instruments = ledger.instruments().to_vec();
        if quotes.len() != instruments.len() {
            return Err(AlgotronError::DataSource {
                reason: format!(
                    "{} quotes for {} instruments on {}",
                    quotes.len(),
                    instruments.len(),
                    date
                ),
            });
        }

        let mut dividends = 0.0;
        for (code, quote) in instruments.iter().zip(quotes) {
            let size = broker.position(code);
            let cash = quote.dividend * size as f64;
            dividends += cash;
            broker.add_cash(cash);
            ledger.mark_to_market(code, quote.close, size)?;
        }

        let positions = ledger
            .iter()
            .map(|(code, state)| (code.to_string(), state.clone()))
            .collect();

        let index = self.snapshots.len();
        self.snapshots.push(PortfolioSnapshot {
            date,
            portfolio_value: broker.portfolio_value(),
            dividends,
            positions,
        });
        Ok(&self.snapshots[index])
    }

    pub fn snapshots(&self) -> &[PortfolioSnapshot] {
        &self.snapshots
    }

    pub fn into_snapshots(self) -> Vec<PortfolioSnapshot> {
        self.snapshots
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

/// Column names of the snapshot table for the given universe.
pub fn table_header(instruments: &[String]) -> Vec<String> {
    let mut header = vec![
        "date".to_string(),
        "portfolio_value".to_string(),
        "dividends".to_string(),
    ];
    for prefix in [
        "cost_basis",
        "unrealized_pnl",
        "realized_pnl",
        "position_size",
        "position_value",
    ] {
        header.extend(instruments.iter().map(|code| format!("{prefix}_{code}")));
    }
    header
}

/// One table row per snapshot, matching [`table_header`].
pub fn table_rows(snapshots: &[PortfolioSnapshot]) -> Vec<Vec<String>> {
    snapshots
        .iter()
        .map(|snap| {
            let mut row = vec![
                snap.date.format("%Y-%m-%d").to_string(),
                snap.portfolio_value.to_string(),
                snap.dividends.to_string(),
            ];
            let fields: [fn(&PositionState) -> String; 5] = [
                |s| s.cost_basis.to_string(),
                |s| s.unrealized_pnl.to_string(),
                |s| s.realized_pnl.to_string(),
                |s| s.position_size.to_string(),
                |s| s.position_value.to_string(),
            ];
            for field in fields {
                row.extend(snap.positions.iter().map(|(_, state)| field(state)));
            }
            row
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::paper_broker::PaperBroker;
    use crate::domain::order::submit;
    use approx::assert_relative_eq;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn quote(close: f64, dividend: f64) -> DailyQuote {
        DailyQuote { close, dividend }
    }

    #[test]
    fn snapshot_marks_and_credits_dividends() {
        let mut broker = PaperBroker::new(10_000.0);
        let mut ledger = PositionLedger::with_instruments(["SPY", "TLT"]).unwrap();
        let mut recorder = PortfolioRecorder::new();

        broker.update_price("SPY", 100.0);
        submit(&mut broker, &mut ledger, "SPY", 50, 100.0).unwrap();

        broker.update_price("SPY", 102.0);
        broker.update_price("TLT", 90.0);
        let snap = recorder
            .snapshot(
                date(2),
                &[quote(102.0, 0.5), quote(90.0, 1.0)],
                &mut broker,
                &mut ledger,
            )
            .unwrap();

        assert_relative_eq!(snap.dividends, 25.0);
        assert_relative_eq!(snap.portfolio_value, 5_000.0 + 25.0 + 50.0 * 102.0);
        let spy = snap.position("SPY").unwrap();
        assert_relative_eq!(spy.unrealized_pnl, 100.0);
        assert_relative_eq!(spy.position_value, 5_100.0);
        assert_eq!(snap.position("TLT").unwrap().position_size, 0);
        assert_relative_eq!(broker.cash(), 5_025.0);
    }

    #[test]
    fn snapshot_rejects_non_increasing_dates() {
        let mut broker = PaperBroker::new(1_000.0);
        let mut ledger = PositionLedger::with_instruments(["SPY"]).unwrap();
        let mut recorder = PortfolioRecorder::new();

        recorder
            .snapshot(date(3), &[quote(10.0, 0.0)], &mut broker, &mut ledger)
            .unwrap();
        let dup = recorder.snapshot(date(3), &[quote(10.0, 0.0)], &mut broker, &mut ledger);
        assert!(matches!(dup, Err(AlgotronError::SnapshotOrder { .. })));
        let back = recorder.snapshot(date(2), &[quote(10.0, 0.0)], &mut broker, &mut ledger);
        assert!(back.is_err());
        assert_eq!(recorder.len(), 1);
    }

    #[test]
    fn snapshot_requires_quote_per_instrument() {
        let mut broker = PaperBroker::new(1_000.0);
        let mut ledger = PositionLedger::with_instruments(["SPY", "TLT"]).unwrap();
        let mut recorder = PortfolioRecorder::new();
        let result = recorder.snapshot(date(1), &[quote(10.0, 0.0)], &mut broker, &mut ledger);
        assert!(result.is_err());
        assert!(recorder.is_empty());
    }

    #[test]
    fn table_layout_groups_columns_by_field() {
        let instruments = vec!["SPY".to_string(), "TLT".to_string()];
        let header = table_header(&instruments);
        assert_eq!(header.len(), 3 + 5 * 2);
        assert_eq!(header[3], "cost_basis_SPY");
        assert_eq!(header[4], "cost_basis_TLT");
        assert_eq!(header[12], "position_value_TLT");

        let snap = PortfolioSnapshot {
            date: date(5),
            portfolio_value: 1000.0,
            dividends: 0.0,
            positions: vec![
                ("SPY".into(), PositionState {
                    position_size: 3,
                    ..Default::default()
                }),
                ("TLT".into(), PositionState::default()),
            ],
        };
        let rows = table_rows(&[snap]);
        assert_eq!(rows[0].len(), header.len());
        assert_eq!(rows[0][0], "2024-01-05");
        assert_eq!(rows[0][9], "3");
        assert_eq!(rows[0][10], "0");
    }
}
