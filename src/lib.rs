//! quantsim: multi-instrument strategy backtester.
//!
//! Hexagonal architecture: simulation and statistics in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`].

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod cli;
