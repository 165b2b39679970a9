//! Core domain types and simulation logic.

pub mod backtest;
pub mod config_validation;
pub mod cost_basis;
pub mod error;
pub mod indicator;
pub mod ledger;
pub mod metrics;
pub mod ohlcv;
pub mod order;
pub mod price_feed;
pub mod recorder;
pub mod strategy;
pub mod sweep;
pub mod universe;
