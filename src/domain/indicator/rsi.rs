//! RSI (Relative Strength Index) over the most recent closes.
//!
//! Uses a flat window rather than Wilder's smoothing: the last `period + 1` closes
//! (fewer if the slice is shorter) give up to `period` price changes. Gains and losses
//! are totalled and each is divided by `period`.
//!
//! Formula: RSI = 100 - (100 / (1 + avg_gain / avg_loss))
//! If avg_loss == 0: RSI = 100
//!
//! An unchanged close counts as a zero gain.

pub fn calculate_rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < 2 {
        return None;
    }

    let start = closes.len().saturating_sub(period + 1);
    let window = &closes[start..];

    let mut total_gain = 0.0;
    let mut total_loss = 0.0;
    for pair in window.windows(2) {
        let change = pair[1] - pair[0];
        if change >= 0.0 {
            total_gain += change;
        } else {
            total_loss += -change;
        }
    }

    let avg_gain = total_gain / period as f64;
    let avg_loss = total_loss / period as f64;

    if avg_loss == 0.0 {
        return Some(100.0);
    }

    let rs = avg_gain / avg_loss;
    Some(100.0 - (100.0 / (1.0 + rs)))
}
