//! OHLCV bar representation.

use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;

/// Per-instrument bar sequences keyed by instrument code.
///
/// Ordered so that every pass over the universe visits instruments in the same order.
pub type MarketData = BTreeMap<String, Vec<Bar>>;

#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub code: String,
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl Bar {
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }
}

/// Closing prices of a bar slice, in order.
pub fn closes(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).collect()
}

/// Simple one-step return. `None` when the previous price is not positive.
pub fn simple_return(previous: f64, current: f64) -> Option<f64> {
    if previous > 0.0 {
        Some((current - previous) / previous)
    } else {
        None
    }
}
