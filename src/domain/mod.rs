//! Core domain types and logic.

pub mod analysis;
pub mod backtest;
pub mod config;
pub mod config_validation;
pub mod detectors;
pub mod error;
pub mod indicator;
pub mod metrics;
pub mod ohlcv;
pub mod position;
pub mod rules;
pub mod signal;
