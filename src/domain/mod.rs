//! Core domain types and simulation logic.

pub mod ohlcv;
pub mod position;
pub mod portfolio;
pub mod indicator;
pub mod strategy;
pub mod backtest;
pub mod metrics;
pub mod universe;
pub mod config_validation;
pub mod error;
