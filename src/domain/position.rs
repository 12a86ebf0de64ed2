//! Position tracking, trade records and realized round trips.

use chrono::NaiveDateTime;
use std::fmt;

/// A long holding in one instrument with a quantity-weighted average cost.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub code: String,
    pub quantity: u64,
    pub average_cost: f64,
}

impl Position {
    pub fn new(code: &str) -> Self {
        Position {
            code: code.to_string(),
            quantity: 0,
            average_cost: 0.0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.quantity > 0
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity as f64 * price
    }

    pub fn cost_basis(&self) -> f64 {
        self.quantity as f64 * self.average_cost
    }

    /// Add shares at `price`, re-averaging the cost basis.
    pub fn increase(&mut self, quantity: u64, price: f64) {
        if quantity == 0 {
            return;
        }
        self.average_cost = if self.quantity == 0 {
            price
        } else {
            let total_cost = self.cost_basis() + quantity as f64 * price;
            total_cost / (self.quantity + quantity) as f64
        };
        self.quantity += quantity;
    }

    /// Remove up to `quantity` shares. Returns how many were actually removed.
    ///
    /// Average cost is unchanged by a partial reduction and reset to 0 once flat.
    pub fn reduce(&mut self, quantity: u64) -> u64 {
        let removed = quantity.min(self.quantity);
        self.quantity -= removed;
        if self.quantity == 0 {
            self.average_cost = 0.0;
        }
        removed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// One executed fill in the trade log.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub code: String,
    pub side: Side,
    pub quantity: u64,
    pub price: f64,
    pub timestamp: NaiveDateTime,
}

impl Trade {
    pub fn buy(code: &str, quantity: u64, price: f64, timestamp: NaiveDateTime) -> Self {
        Trade {
            code: code.to_string(),
            side: Side::Buy,
            quantity,
            price,
            timestamp,
        }
    }

    pub fn sell(code: &str, quantity: u64, price: f64, timestamp: NaiveDateTime) -> Self {
        Trade {
            code: code.to_string(),
            side: Side::Sell,
            quantity,
            price,
            timestamp,
        }
    }

    pub fn notional(&self) -> f64 {
        self.quantity as f64 * self.price
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Signal,
    Liquidation,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Signal => write!(f, "signal"),
            ExitReason::Liquidation => write!(f, "liquidation"),
        }
    }
}

/// A realized position exit, measured against the average cost at the time of sale.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundTrip {
    pub code: String,
    pub quantity: u64,
    pub average_cost: f64,
    pub exit_price: f64,
    pub exit_timestamp: NaiveDateTime,
    pub pnl: f64,
    pub reason: ExitReason,
}

impl RoundTrip {
    /// Profit as a fraction of the cost basis; 0 for a zero-cost entry.
    pub fn return_fraction(&self) -> f64 {
        if self.average_cost > 0.0 {
            (self.exit_price - self.average_cost) / self.average_cost
        } else {
            0.0
        }
    }
}
