//! Per-instrument position state: cost basis and P&L.
//!
//! The ledger is the single source of truth for cost basis and realized
//! P&L. Fills come in through [`PositionLedger::apply_fill`]; the daily
//! snapshot step calls [`PositionLedger::mark_to_market`].

use serde::Serialize;
use std::collections::HashMap;

use super::cost_basis::compute_cost_basis;
use super::error::AlgotronError;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PositionState {
    /// Weighted-average entry price, meaningful only while `position_size != 0`.
    pub cost_basis: f64,
    pub position_size: i64,
    pub position_value: f64,
    pub unrealized_pnl: f64,
    pub realized_pnl: f64,
}

impl PositionState {
    pub fn is_long(&self) -> bool {
        self.position_size > 0
    }

    pub fn is_short(&self) -> bool {
        self.position_size < 0
    }

    pub fn is_flat(&self) -> bool {
        self.position_size == 0
    }

    pub fn total_pnl(&self) -> f64 {
        self.unrealized_pnl + self.realized_pnl
    }
}

#[derive(Debug, Clone, Default)]
pub struct PositionLedger {
    instruments: Vec<String>,
    states: HashMap<String, PositionState>,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger with a zero state for each instrument, in the given order.
    pub fn with_instruments<I, S>(instruments: I) -> Result<Self, AlgotronError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ledger = Self::new();
        for instrument in instruments {
            ledger.register(instrument.as_ref())?;
        }
        Ok(ledger)
    }

    pub fn register(&mut self, instrument: &str) -> Result<(), AlgotronError> {
        if self.states.contains_key(instrument) {
            return Err(AlgotronError::invalid(
                "backtest",
                "codes",
                format!("instrument {instrument} registered twice"),
            ));
        }
        self.instruments.push(instrument.to_string());
        self.states
            .insert(instrument.to_string(), PositionState::default());
        Ok(())
    }

    pub fn instruments(&self) -> &[String] {
        &self.instruments
    }

    pub fn is_registered(&self, instrument: &str) -> bool {
        self.states.contains_key(instrument)
    }

    pub fn state(&self, instrument: &str) -> Result<&PositionState, AlgotronError> {
        self.states
            .get(instrument)
            .ok_or_else(|| AlgotronError::unknown_instrument(instrument))
    }

    fn state_mut(&mut self, instrument: &str) -> Result<&mut PositionState, AlgotronError> {
        self.states
            .get_mut(instrument)
            .ok_or_else(|| AlgotronError::unknown_instrument(instrument))
    }

    /// States in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PositionState)> {
        self.instruments
            .iter()
            .filter_map(|code| self.states.get(code).map(|s| (code.as_str(), s)))
    }

    /// Book a fill of `filled_quantity` (signed) at `fill_price`.
    ///
    /// Realized P&L accrues only on the portion of the fill that closes an
    /// existing position; the remainder (if any) opens at `fill_price`.
    pub fn apply_fill(
        &mut self,
        instrument: &str,
        filled_quantity: i64,
        fill_price: f64,
    ) -> Result<(), AlgotronError> {
        let state = self.state_mut(instrument)?;
        if filled_quantity == 0 {
            return Ok(());
        }

        let pre_quantity = state.position_size;
        let pre_cost_basis = state.cost_basis;
        let closed = filled_quantity.unsigned_abs().min(pre_quantity.unsigned_abs()) as f64;

        if pre_quantity > 0 && filled_quantity < 0 {
            state.realized_pnl += (fill_price - pre_cost_basis) * closed;
        } else if pre_quantity < 0 && filled_quantity > 0 {
            state.realized_pnl += (pre_cost_basis - fill_price) * closed;
        }

        state.cost_basis =
            compute_cost_basis(pre_cost_basis, pre_quantity, filled_quantity, fill_price);
        state.position_size = pre_quantity + filled_quantity;
        Ok(())
    }

    /// Revalue a position at `current_price`, syncing the size reported by
    /// the broker.
    pub fn mark_to_market(
        &mut self,
        instrument: &str,
        current_price: f64,
        current_size: i64,
    ) -> Result<(), AlgotronError> {
        let state = self.state_mut(instrument)?;
        state.position_size = current_size;
        state.position_value = current_size as f64 * current_price;
        state.unrealized_pnl = (current_price - state.cost_basis) * current_size as f64;
        Ok(())
    }

    /// Sum of unrealized and realized P&L across all instruments, added in
    /// registration order so the total is reproducible bit for bit.
    pub fn portfolio_pnl(&self) -> f64 {
        self.iter().map(|(_, state)| state.total_pnl()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn busy_ledger() -> PositionLedger {
        let codes = ["SPY", "TLT", "GLD", "QQQ", "IWM", "EFA", "VNQ", "DBC"];
        let mut ledger = PositionLedger::with_instruments(codes).unwrap();
        for (i, code) in codes.iter().enumerate() {
            let price = 10.0 + i as f64 * 3.7;
            ledger.apply_fill(code, 7 + i as i64, price).unwrap();
            ledger.apply_fill(code, -(11 + i as i64), price * 1.013).unwrap();
            ledger.mark_to_market(code, price * 0.991, -4).unwrap();
        }
        ledger
    }

    #[test]
    fn portfolio_pnl_is_bit_identical_across_instances() {
        let expected = busy_ledger().portfolio_pnl().to_bits();
        for _ in 0..50 {
            assert_eq!(busy_ledger().portfolio_pnl().to_bits(), expected);
        }
    }

    fn ledger() -> PositionLedger {
        PositionLedger::with_instruments(["SPY", "TLT"]).unwrap()
    }

    #[test]
    fn registered_instruments_start_flat() {
        let ledger = ledger();
        let spy = ledger.state("SPY").unwrap();
        assert!(spy.is_flat());
        assert_eq!(spy, &PositionState::default());
        assert_eq!(ledger.instruments(), &["SPY".to_string(), "TLT".to_string()]);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut ledger = ledger();
        assert!(ledger.register("SPY").is_err());
    }

    #[test]
    fn unknown_instrument_is_configuration_error() {
        let mut ledger = ledger();
        let err = ledger.mark_to_market("XYZ", 10.0, 0).unwrap_err();
        assert!(matches!(err, AlgotronError::UnknownInstrument { ref instrument } if instrument == "XYZ"));
        assert!(err.is_configuration());
        assert!(ledger.apply_fill("XYZ", 1, 10.0).is_err());
    }

    #[test]
    fn open_add_close_sequence() {
        let mut ledger = ledger();
        ledger.apply_fill("SPY", 10, 100.0).unwrap();
        assert_relative_eq!(ledger.state("SPY").unwrap().realized_pnl, 0.0);

        ledger.apply_fill("SPY", 5, 110.0).unwrap();
        let spy = ledger.state("SPY").unwrap();
        assert_relative_eq!(spy.realized_pnl, 0.0);
        assert_relative_eq!(spy.cost_basis, 1550.0 / 15.0, epsilon = 1e-12);
        assert_eq!(spy.position_size, 15);

        ledger.apply_fill("SPY", -15, 120.0).unwrap();
        let spy = ledger.state("SPY").unwrap();
        assert_relative_eq!(spy.realized_pnl, (120.0 - 1550.0 / 15.0) * 15.0, epsilon = 1e-9);
        assert_relative_eq!(spy.realized_pnl, 250.0, epsilon = 1e-9);
        assert_eq!(spy.position_size, 0);
    }

    #[test]
    fn partial_close_of_short() {
        let mut ledger = ledger();
        ledger.apply_fill("TLT", -20, 50.0).unwrap();
        ledger.apply_fill("TLT", 5, 40.0).unwrap();
        let tlt = ledger.state("TLT").unwrap();
        assert_relative_eq!(tlt.realized_pnl, 50.0);
        assert_relative_eq!(tlt.cost_basis, 50.0);
        assert_eq!(tlt.position_size, -15);
    }

    #[test]
    fn reversal_realizes_only_closed_portion() {
        let mut ledger = ledger();
        ledger.apply_fill("SPY", 10, 100.0).unwrap();
        ledger.apply_fill("SPY", -25, 90.0).unwrap();
        let spy = ledger.state("SPY").unwrap();
        assert_relative_eq!(spy.realized_pnl, -100.0);
        assert_relative_eq!(spy.cost_basis, 90.0);
        assert_eq!(spy.position_size, -15);
    }

    #[test]
    fn realized_pnl_accumulates_across_round_trips() {
        let mut ledger = ledger();
        ledger.apply_fill("SPY", 10, 100.0).unwrap();
        ledger.apply_fill("SPY", -10, 110.0).unwrap();
        ledger.apply_fill("SPY", 10, 120.0).unwrap();
        ledger.apply_fill("SPY", -10, 115.0).unwrap();
        assert_relative_eq!(ledger.state("SPY").unwrap().realized_pnl, 100.0 - 50.0);
    }

    #[test]
    fn mark_to_market_sets_value_and_unrealized() {
        let mut ledger = ledger();
        ledger.apply_fill("SPY", 10, 100.0).unwrap();
        ledger.mark_to_market("SPY", 105.0, 10).unwrap();
        let spy = ledger.state("SPY").unwrap();
        assert_relative_eq!(spy.position_value, 1050.0);
        assert_relative_eq!(spy.unrealized_pnl, 50.0);

        ledger.apply_fill("TLT", -10, 100.0).unwrap();
        ledger.mark_to_market("TLT", 105.0, -10).unwrap();
        let tlt = ledger.state("TLT").unwrap();
        assert_relative_eq!(tlt.position_value, -1050.0);
        assert_relative_eq!(tlt.unrealized_pnl, -50.0);
    }

    #[test]
    fn zero_fill_is_noop() {
        let mut ledger = ledger();
        ledger.apply_fill("SPY", 0, 100.0).unwrap();
        assert_eq!(ledger.state("SPY").unwrap(), &PositionState::default());
    }

    #[test]
    fn portfolio_pnl_sums_instruments() {
        let mut ledger = ledger();
        ledger.apply_fill("SPY", 10, 100.0).unwrap();
        ledger.apply_fill("SPY", -5, 110.0).unwrap();
        ledger.mark_to_market("SPY", 120.0, 5).unwrap();
        ledger.apply_fill("TLT", 10, 50.0).unwrap();
        ledger.mark_to_market("TLT", 45.0, 10).unwrap();
        assert_relative_eq!(ledger.portfolio_pnl(), 50.0 + 100.0 - 50.0);
    }
}
