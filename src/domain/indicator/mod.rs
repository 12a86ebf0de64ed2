//! Technical indicators evaluated over closing-price slices.
//!
//! Each indicator returns `None` until it has enough input to produce a value.

pub mod ema;
pub mod rsi;

pub use ema::{calculate_ema, latest_ema};
pub use rsi::calculate_rsi;
