//! Dual-EMA crossover with a noise buffer and volume confirmation.
//!
//! Signals fade the crossover: a short EMA stretched above the buffered long EMA on
//! rising volume is a SELL, a short EMA below it on falling volume is a BUY. Bars whose
//! volume is under `min_volume` never signal.

use super::{fixed_risk_size, Signal, Strategy};
use crate::domain::indicator::latest_ema;
use crate::domain::ohlcv::{closes, Bar};

#[derive(Debug, Clone, PartialEq)]
pub struct MovingAverageParams {
    pub short_period: usize,
    pub long_period: usize,
    /// Fraction of the long EMA a crossover must clear, e.g. 0.005 for 0.5%.
    pub buffer_pct: f64,
    pub min_volume: f64,
    pub risk_per_trade: f64,
    pub stop_loss_pct: f64,
}

impl Default for MovingAverageParams {
    fn default() -> Self {
        MovingAverageParams {
            short_period: 50,
            long_period: 200,
            buffer_pct: 0.005,
            min_volume: 1_000_000.0,
            risk_per_trade: 0.015,
            stop_loss_pct: 0.04,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MovingAverageStrategy {
    params: MovingAverageParams,
}

impl MovingAverageStrategy {
    pub fn new(params: MovingAverageParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &MovingAverageParams {
        &self.params
    }

    fn lookback(&self) -> usize {
        self.params
            .long_period
            .max(self.params.short_period)
            .max(2)
    }
}

impl Default for MovingAverageStrategy {
    fn default() -> Self {
        Self::new(MovingAverageParams::default())
    }
}

impl Strategy for MovingAverageStrategy {
    fn name(&self) -> &str {
        "moving_average"
    }

    fn signal(&self, history: &[Bar]) -> Signal {
        if history.len() < self.lookback() {
            return Signal::Hold;
        }

        let prices = closes(history);
        let (Some(short_ema), Some(long_ema)) = (
            latest_ema(&prices, self.params.short_period),
            latest_ema(&prices, self.params.long_period),
        ) else {
            return Signal::Hold;
        };

        let current_volume = history[history.len() - 1].volume;
        let previous_volume = history[history.len() - 2].volume;
        if (current_volume as f64) < self.params.min_volume {
            return Signal::Hold;
        }

        let buffer = long_ema * self.params.buffer_pct;
        if short_ema > long_ema + buffer && current_volume > previous_volume {
            Signal::Sell
        } else if short_ema < long_ema - buffer && current_volume < previous_volume {
            Signal::Buy
        } else {
            Signal::Hold
        }
    }

    fn position_size(&self, available_capital: f64, price: f64) -> u64 {
        fixed_risk_size(
            available_capital,
            price,
            self.params.risk_per_trade,
            self.params.stop_loss_pct,
        )
    }
}
