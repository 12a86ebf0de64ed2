//! Portfolio state: cash plus per-instrument long positions.

use std::collections::HashMap;

use super::position::Position;

/// Outcome of selling shares out of an existing position.
#[derive(Debug, Clone, PartialEq)]
pub struct Reduction {
    pub quantity: u64,
    pub price: f64,
    pub average_cost: f64,
    /// True when the sale left the position flat and it was removed.
    pub closed: bool,
}

impl Reduction {
    pub fn proceeds(&self) -> f64 {
        self.quantity as f64 * self.price
    }

    /// Sale proceeds minus the cost basis of the shares sold.
    pub fn realized_pnl(&self) -> f64 {
        self.quantity as f64 * (self.price - self.average_cost)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Portfolio {
    pub cash: f64,
    positions: HashMap<String, Position>,
}

impl Portfolio {
    pub fn new(initial_capital: f64) -> Self {
        Portfolio {
            cash: initial_capital,
            positions: HashMap::new(),
        }
    }

    /// Buy `quantity` shares of `code` at `price`, opening or adding to the position.
    ///
    /// Cash is debited without a margin check; it may go negative.
    pub fn open_position(&mut self, code: &str, quantity: u64, price: f64) {
        if quantity == 0 {
            return;
        }
        self.positions
            .entry(code.to_string())
            .or_insert_with(|| Position::new(code))
            .increase(quantity, price);
        self.cash -= quantity as f64 * price;
    }

    /// Sell up to `quantity` shares of `code` at `price`.
    ///
    /// Returns `None` when there is no open position. Selling more than is held
    /// clamps to the held quantity.
    pub fn reduce_position(&mut self, code: &str, quantity: u64, price: f64) -> Option<Reduction> {
        let position = self.positions.get_mut(code)?;
        let average_cost = position.average_cost;
        let removed = position.reduce(quantity);
        let closed = !position.is_open();
        if closed {
            self.positions.remove(code);
        }
        self.cash += removed as f64 * price;

        Some(Reduction {
            quantity: removed,
            price,
            average_cost,
            closed,
        })
    }

    /// Sell the whole position in `code` at `price`.
    pub fn close_position(&mut self, code: &str, price: f64) -> Option<Reduction> {
        let quantity = self.positions.get(code).map(|p| p.quantity)?;
        self.reduce_position(code, quantity, price)
    }

    pub fn get_position(&self, code: &str) -> Option<&Position> {
        self.positions.get(code)
    }

    pub fn has_position(&self, code: &str) -> bool {
        self.positions.contains_key(code)
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    /// Codes of every open position, sorted.
    pub fn open_codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = self.positions.keys().cloned().collect();
        codes.sort();
        codes
    }

    /// Cash plus positions marked at `price_map`.
    ///
    /// A position without a mark is carried at its average cost.
    pub fn total_value(&self, price_map: &HashMap<String, f64>) -> f64 {
        let position_value: f64 = self
            .positions
            .values()
            .map(|pos| match price_map.get(&pos.code) {
                Some(&price) => pos.market_value(price),
                None => pos.cost_basis(),
            })
            .sum();
        self.cash + position_value
    }
}
