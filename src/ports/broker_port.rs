//! Broker/exchange simulation port.

use crate::domain::error::AlgotronError;
use crate::domain::order::{Fill, Order};

/// The execution venue the engine routes orders to.
///
/// Fills are synchronous and complete; the engine never sees partial fills
/// or rejections.
pub trait BrokerPort {
    fn submit_order(&mut self, order: &Order) -> Result<Fill, AlgotronError>;

    /// Cash plus the marked value of every open position.
    fn portfolio_value(&self) -> f64;

    fn cash(&self) -> f64;

    /// Signed share count held in `instrument` (0 when never traded).
    fn position(&self, instrument: &str) -> i64;

    fn add_cash(&mut self, amount: f64);

    /// Latest close used to value positions.
    fn update_price(&mut self, instrument: &str, price: f64);
}
