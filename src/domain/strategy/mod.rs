//! Strategy contract and the built-in variants.
//!
//! The engine only talks to a strategy through [`Strategy::signal`] and
//! [`Strategy::position_size`]; new variants plug in without engine changes.

pub mod moving_average;
pub mod rsi;

pub use moving_average::{MovingAverageParams, MovingAverageStrategy};
pub use rsi::{RsiParams, RsiStrategy};

use crate::domain::ohlcv::Bar;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

pub trait Strategy {
    fn name(&self) -> &str;

    /// Decide on the bars strictly before the current step.
    ///
    /// Must return [`Signal::Hold`] when `history` is shorter than the lookback.
    fn signal(&self, history: &[Bar]) -> Signal;

    /// Whole-share quantity to buy with `available_capital` at `price`. Never negative.
    fn position_size(&self, available_capital: f64, price: f64) -> u64;
}

/// Fixed-fractional sizing: risk `risk_fraction` of capital against a stop placed
/// `stop_loss_fraction` below `price`, floored to whole shares.
///
/// Degenerate inputs (non-positive price, capital or stop distance) size to 0.
pub fn fixed_risk_size(
    available_capital: f64,
    price: f64,
    risk_fraction: f64,
    stop_loss_fraction: f64,
) -> u64 {
    let risk_amount = available_capital * risk_fraction;
    let stop_distance = price * stop_loss_fraction;
    if !(risk_amount > 0.0) || !(stop_distance > 0.0) {
        return 0;
    }
    let shares = (risk_amount / stop_distance).floor();
    if shares.is_finite() { shares as u64 } else { 0 }
}

/// Built-in strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    MovingAverage,
    Rsi,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::MovingAverage => write!(f, "moving_average"),
            StrategyKind::Rsi => write!(f, "rsi"),
        }
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "moving_average" | "ma" | "ema_crossover" => Ok(StrategyKind::MovingAverage),
            "rsi" => Ok(StrategyKind::Rsi),
            other => Err(format!(
                "unknown strategy type '{other}' (expected moving_average or rsi)"
            )),
        }
    }
}
