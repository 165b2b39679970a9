//! In-process broker simulation.
//!
//! Fills every order immediately and completely at its reference price and
//! charges `flat_fee + notional * pct / 100` commission. Orders are never
//! rejected; cash may go negative, which stands in for margin.

use std::collections::BTreeMap;
use tracing::debug;

use crate::domain::error::AlgotronError;
use crate::domain::order::{Fill, Order};
use crate::ports::broker_port::BrokerPort;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommissionConfig {
    pub commission_per_trade: f64,
    pub commission_pct: f64,
}

/// Commission: flat_fee + (trade_value * pct / 100).
pub fn calculate_commission(trade_value: f64, config: &CommissionConfig) -> f64 {
    config.commission_per_trade + (trade_value * config.commission_pct / 100.0)
}

#[derive(Debug, Clone)]
pub struct PaperBroker {
    cash: f64,
    commission: CommissionConfig,
    positions: BTreeMap<String, i64>,
    prices: BTreeMap<String, f64>,
    orders_received: usize,
    commission_paid: f64,
}

impl PaperBroker {
    pub fn new(initial_cash: f64) -> Self {
        Self::with_commission(initial_cash, CommissionConfig::default())
    }

    pub fn with_commission(initial_cash: f64, commission: CommissionConfig) -> Self {
        PaperBroker {
            cash: initial_cash,
            commission,
            positions: BTreeMap::new(),
            prices: BTreeMap::new(),
            orders_received: 0,
            commission_paid: 0.0,
        }
    }

    pub fn orders_received(&self) -> usize {
        self.orders_received
    }

    pub fn commission_paid(&self) -> f64 {
        self.commission_paid
    }
}

impl BrokerPort for PaperBroker {
    fn submit_order(&mut self, order: &Order) -> Result<Fill, AlgotronError> {
        if order.size == 0 {
            return Err(AlgotronError::invalid(
                "broker",
                "order",
                format!("zero-size order for {}", order.instrument),
            ));
        }

        let quantity = order.signed_quantity();
        let price = order.reference_price;
        let notional = order.size as f64 * price;
        let commission = calculate_commission(notional, &self.commission);

        self.cash -= quantity as f64 * price + commission;
        *self.positions.entry(order.instrument.clone()).or_insert(0) += quantity;
        self.prices.insert(order.instrument.clone(), price);
        self.orders_received += 1;
        self.commission_paid += commission;

        debug!(
            instrument = %order.instrument,
            side = %order.side,
            size = order.size,
            price,
            commission,
            "order filled"
        );

        Ok(Fill {
            instrument: order.instrument.clone(),
            quantity,
            price,
            commission,
        })
    }

    fn portfolio_value(&self) -> f64 {
        let position_value: f64 = self
            .positions
            .iter()
            .map(|(code, &qty)| qty as f64 * self.prices.get(code).copied().unwrap_or(0.0))
            .sum();
        self.cash + position_value
    }

    fn cash(&self) -> f64 {
        self.cash
    }

    fn position(&self, instrument: &str) -> i64 {
        self.positions.get(instrument).copied().unwrap_or(0)
    }

    fn add_cash(&mut self, amount: f64) {
        self.cash += amount;
    }

    fn update_price(&mut self, instrument: &str, price: f64) {
        self.prices.insert(instrument.to_string(), price);
    }
}
