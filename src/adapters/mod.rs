//! Concrete adapter implementations for ports.

pub mod csv_adapter;
pub mod csv_report_adapter;
pub mod file_config_adapter;
pub mod jsonl_checkpoint_adapter;
pub mod paper_broker;
