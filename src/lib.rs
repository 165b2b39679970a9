//! algotron: daily-bar portfolio backtester for allocation and trend strategies.
//!
//! Hexagonal layout: simulation logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`], and the command line in [`cli`].

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod ports;
