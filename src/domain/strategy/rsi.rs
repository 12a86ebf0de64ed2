//! RSI threshold strategy: SELL when overbought, BUY when oversold.

use super::{fixed_risk_size, Signal, Strategy};
use crate::domain::indicator::calculate_rsi;
use crate::domain::ohlcv::{closes, Bar};

#[derive(Debug, Clone, PartialEq)]
pub struct RsiParams {
    pub period: usize,
    pub overbought: f64,
    pub oversold: f64,
    pub risk_per_trade: f64,
    pub stop_loss_pct: f64,
}

impl Default for RsiParams {
    fn default() -> Self {
        RsiParams {
            period: 14,
            overbought: 70.0,
            oversold: 30.0,
            risk_per_trade: 0.01,
            stop_loss_pct: 0.03,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RsiStrategy {
    params: RsiParams,
}

impl RsiStrategy {
    pub fn new(params: RsiParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &RsiParams {
        &self.params
    }

    /// RSI of the most recent closes in `history`, once the lookback is met.
    pub fn rsi(&self, history: &[Bar]) -> Option<f64> {
        if history.len() < self.params.period.max(2) {
            return None;
        }
        let start = history.len().saturating_sub(self.params.period + 1);
        calculate_rsi(&closes(&history[start..]), self.params.period)
    }
}

impl Default for RsiStrategy {
    fn default() -> Self {
        Self::new(RsiParams::default())
    }
}

impl Strategy for RsiStrategy {
    fn name(&self) -> &str {
        "rsi"
    }

    fn signal(&self, history: &[Bar]) -> Signal {
        match self.rsi(history) {
            Some(rsi) if rsi > self.params.overbought => Signal::Sell,
            Some(rsi) if rsi < self.params.oversold => Signal::Buy,
            _ => Signal::Hold,
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
