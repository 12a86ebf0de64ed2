//! Performance metrics and statistics over a completed backtest.
//!
//! Everything here is a pure function of the recorded series. Degenerate inputs
//! (empty series, zero variance) yield 0 rather than a division fault.

use super::backtest::BacktestResult;
use super::position::{RoundTrip, Side};
use std::collections::BTreeMap;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Standard deviations below this are treated as zero. Identical samples can leave
/// a rounding residue in the variance that would otherwise explode the ratios.
const DEGENERATE_STDDEV: f64 = 1e-12;

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance.
pub fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

pub fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

/// √252 · (mean − rf) / σ. Returns 0 for an empty or constant series.
pub fn sharpe_ratio(returns: &[f64], risk_free_rate: f64) -> f64 {
    let sigma = std_dev(returns);
    if returns.is_empty() || sigma < DEGENERATE_STDDEV {
        return 0.0;
    }
    TRADING_DAYS_PER_YEAR.sqrt() * (mean(returns) - risk_free_rate) / sigma
}

/// Root-mean-square of the negative returns only; 0 when there are none.
pub fn downside_deviation(returns: &[f64]) -> f64 {
    let (sum_sq, count) = returns
        .iter()
        .filter(|&&r| r < 0.0)
        .fold((0.0, 0usize), |(sum, n), &r| (sum + r * r, n + 1));
    if count == 0 {
        return 0.0;
    }
    (sum_sq / count as f64).sqrt()
}

/// (mean − rf) / downside deviation. Returns 0 when there is no downside.
pub fn sortino_ratio(returns: &[f64], risk_free_rate: f64) -> f64 {
    let downside = downside_deviation(returns);
    if downside < DEGENERATE_STDDEV {
        return 0.0;
    }
    (mean(returns) - risk_free_rate) / downside
}

/// Largest peak-to-trough decline as a percentage. The peak starts at `initial_capital`.
pub fn max_drawdown_pct(initial_capital: f64, equity: &[f64]) -> f64 {
    compute_drawdown(initial_capital, equity).0
}

/// Returns (max drawdown %, longest run of consecutive steps below the peak).
fn compute_drawdown(initial_capital: f64, equity: &[f64]) -> (f64, usize) {
    let mut peak = initial_capital;
    let mut max_dd = 0.0_f64;
    let mut current_duration = 0usize;
    let mut max_duration = 0usize;

    for &value in equity {
        if value >= peak {
            peak = value;
            current_duration = 0;
            continue;
        }
        if peak > 0.0 {
            max_dd = max_dd.max((peak - value) / peak);
        }
        current_duration += 1;
        max_duration = max_duration.max(current_duration);
    }

    (max_dd * 100.0, max_duration)
}

/// Compound annual growth rate as a percentage, assuming one step per trading day.
pub fn annualized_return_pct(total_return_pct: f64, steps: usize) -> f64 {
    if steps == 0 {
        return 0.0;
    }
    let growth = 1.0 + total_return_pct / 100.0;
    if growth <= 0.0 {
        return -100.0;
    }
    let years = steps as f64 / TRADING_DAYS_PER_YEAR;
    let annualized = (growth.powf(1.0 / years) - 1.0) * 100.0;
    if annualized.is_finite() { annualized } else { 0.0 }
}

/// Ordinary least squares fit of `y` on `x`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Regression {
    /// Slope.
    pub beta: f64,
    /// Intercept.
    pub alpha: f64,
    pub r_squared: f64,
    pub observations: usize,
}

/// Fits `y = alpha + beta·x` over the common prefix of both slices.
///
/// With fewer than two points or no spread in `x`, beta and R² are 0 and alpha is the
/// mean of `y`. R² is 0 when `y` has no spread.
pub fn linear_regression(x: &[f64], y: &[f64]) -> Regression {
    let n = x.len().min(y.len());
    let (x, y) = (&x[..n], &y[..n]);
    if n < 2 {
        return Regression {
            alpha: mean(y),
            observations: n,
            ..Regression::default()
        };
    }

    let mean_x = mean(x);
    let mean_y = mean(y);
    let mut sxx = 0.0;
    let mut sxy = 0.0;
    let mut syy = 0.0;
    for (&xi, &yi) in x.iter().zip(y) {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }

    if sxx == 0.0 {
        return Regression {
            alpha: mean_y,
            observations: n,
            ..Regression::default()
        };
    }

    let beta = sxy / sxx;
    let r_squared = if syy == 0.0 { 0.0 } else { (sxy * sxy) / (sxx * syy) };

    Regression {
        beta,
        alpha: mean_y - beta * mean_x,
        r_squared,
        observations: n,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub total_return_pct: f64,
    pub annualized_return_pct: f64,
    pub mean_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub downside_deviation: f64,
    pub max_drawdown_pct: f64,
    pub max_drawdown_duration: usize,
    pub beta: f64,
    pub alpha: f64,
    pub r_squared: f64,
    pub total_trades: usize,
    pub buys: usize,
    pub sells: usize,
    pub missed_buys: usize,
    pub missed_sells: usize,
    pub losing_trades: usize,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub trades_breakeven: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
}

impl Metrics {
    pub fn compute(result: &BacktestResult) -> Self {
        let returns = &result.strategy_returns;
        let (max_drawdown_pct, max_drawdown_duration) =
            compute_drawdown(result.starting_capital, &result.equity_curve);

        let buys = result
            .trades
            .iter()
            .filter(|t| t.side == Side::Buy)
            .count();
        let sells = result.trades.len() - buys;

        let mut trades_won = 0usize;
        let mut trades_lost = 0usize;
        let mut trades_breakeven = 0usize;
        let mut total_wins = 0.0_f64;
        let mut total_losses = 0.0_f64;
        let mut largest_win = 0.0_f64;
        let mut largest_loss = 0.0_f64;

        for trip in &result.round_trips {
            let pnl = trip.pnl;
            if pnl > 0.0 {
                trades_won += 1;
                total_wins += pnl;
                largest_win = largest_win.max(pnl);
            } else if pnl < 0.0 {
                trades_lost += 1;
                total_losses += pnl.abs();
                largest_loss = largest_loss.max(pnl.abs());
            } else {
                trades_breakeven += 1;
            }
        }

        let completed = trades_won + trades_lost + trades_breakeven;
        let win_rate = if completed > 0 {
            trades_won as f64 / completed as f64
        } else {
            0.0
        };

        let profit_factor = if total_losses > 0.0 {
            total_wins / total_losses
        } else if total_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let avg_win = if trades_won > 0 {
            total_wins / trades_won as f64
        } else {
            0.0
        };
        let avg_loss = if trades_lost > 0 {
            total_losses / trades_lost as f64
        } else {
            0.0
        };

        Metrics {
            total_return_pct: result.total_return_pct,
            annualized_return_pct: annualized_return_pct(result.total_return_pct, returns.len()),
            mean_return: mean(returns),
            volatility: std_dev(returns),
            sharpe_ratio: sharpe_ratio(returns, result.risk_free_rate),
            sortino_ratio: sortino_ratio(returns, result.risk_free_rate),
            downside_deviation: downside_deviation(returns),
            max_drawdown_pct,
            max_drawdown_duration,
            beta: result.regression.beta,
            alpha: result.regression.alpha,
            r_squared: result.regression.r_squared,
            total_trades: result.trades.len(),
            buys,
            sells,
            missed_buys: result.diagnostics.missed_buys.len(),
            missed_sells: result.diagnostics.missed_sells.len(),
            losing_trades: result.diagnostics.losing_trades.len(),
            trades_won,
            trades_lost,
            trades_breakeven,
            win_rate,
            profit_factor,
            avg_win,
            avg_loss,
            largest_win,
            largest_loss,
        }
    }
}

/// Round-trip breakdown for one instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeResult {
    pub code: String,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub total_pnl: f64,
}

impl CodeResult {
    /// One entry per instrument that realized at least one round trip, sorted by code.
    pub fn compute_per_code(round_trips: &[RoundTrip]) -> Vec<CodeResult> {
        let mut grouped: BTreeMap<&str, Vec<&RoundTrip>> = BTreeMap::new();
        for trip in round_trips {
            grouped.entry(trip.code.as_str()).or_default().push(trip);
        }

        grouped
            .into_iter()
            .map(|(code, trips)| {
                let winning_trades = trips.iter().filter(|t| t.pnl > 0.0).count();
                let losing_trades = trips.iter().filter(|t| t.pnl < 0.0).count();
                CodeResult {
                    code: code.to_string(),
                    total_trades: trips.len(),
                    winning_trades,
                    losing_trades,
                    win_rate: winning_trades as f64 / trips.len() as f64,
                    total_pnl: trips.iter().map(|t| t.pnl).sum(),
                }
            })
            .collect()
    }
}
