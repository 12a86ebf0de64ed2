//! Exponential Moving Average.
//!
//! k = 2/(n+1), seed with the SMA of the first n closes, then EMA[i] = C[i]*k + EMA[i-1]*(1-k).
//! Warmup: the first (n-1) closes produce no value.

pub fn calculate_ema(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; closes.len()];
    }

    let mut values = Vec::with_capacity(closes.len());
    let k = 2.0 / (period as f64 + 1.0);
    let mut ema = 0.0;
    let mut sum = 0.0;

    for (i, &close) in closes.iter().enumerate() {
        if i < period - 1 {
            sum += close;
            values.push(None);
        } else if i == period - 1 {
            sum += close;
            ema = sum / period as f64;
            values.push(Some(ema));
        } else {
            ema = close * k + ema * (1.0 - k);
            values.push(Some(ema));
        }
    }

    values
}

/// EMA value at the last close, if the warmup is complete.
pub fn latest_ema(closes: &[f64], period: usize) -> Option<f64> {
    calculate_ema(closes, period).last().copied().flatten()
}
