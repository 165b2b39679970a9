//! Order routing: signed target deltas become broker orders whose fills are
//! booked into the ledger.

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;

use super::error::AlgotronError;
use super::ledger::PositionLedger;
use crate::ports::broker_port::BrokerPort;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    pub instrument: String,
    pub side: Side,
    /// Always positive; direction is carried by `side`.
    pub size: u64,
    pub reference_price: f64,
}

impl Order {
    /// Order for a signed quantity. Returns `None` for zero.
    pub fn from_delta(instrument: &str, delta: i64, reference_price: f64) -> Option<Self> {
        let side = match delta {
            0 => return None,
            d if d > 0 => Side::Buy,
            _ => Side::Sell,
        };
        Some(Order {
            instrument: instrument.to_string(),
            side,
            size: delta.unsigned_abs(),
            reference_price,
        })
    }

    pub fn signed_quantity(&self) -> i64 {
        match self.side {
            Side::Buy => self.size as i64,
            Side::Sell => -(self.size as i64),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fill {
    pub instrument: String,
    pub quantity: i64,
    pub price: f64,
    pub commission: f64,
}

/// An order as it appears in the backtest trade log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeRecord {
    pub date: NaiveDate,
    pub instrument: String,
    pub side: Side,
    pub size: u64,
    pub price: f64,
    pub commission: f64,
}

/// Route `delta` shares of `instrument` to the broker and book the fill.
///
/// A zero delta places nothing and returns `Ok(None)`. The ledger is updated
/// with the delta at the reference price: fills are assumed complete and at
/// the reference price.
pub fn submit(
    broker: &mut dyn BrokerPort,
    ledger: &mut PositionLedger,
    instrument: &str,
    delta: i64,
    reference_price: f64,
) -> Result<Option<(Order, Fill)>, AlgotronError> {
    if !ledger.is_registered(instrument) {
        return Err(AlgotronError::unknown_instrument(instrument));
    }
    let Some(order) = Order::from_delta(instrument, delta, reference_price) else {
        return Ok(None);
    };

    let fill = broker.submit_order(&order)?;
    ledger.apply_fill(instrument, delta, reference_price)?;
    Ok(Some((order, fill)))
}
