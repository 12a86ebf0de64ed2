//! Time-stepped simulation engine.
//!
//! One run walks every instrument in lockstep from step 1 to the longest series,
//! asking the strategy for a signal on the bars strictly before each step. Every
//! run owns its portfolio and logs and hands back a fresh [`BacktestResult`].

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use tracing::{debug, info};

use super::error::QuantsimError;
use super::metrics::{self, Metrics, Regression};
use super::ohlcv::{simple_return, Bar, MarketData};
use super::portfolio::Portfolio;
use super::position::{ExitReason, RoundTrip, Trade};
use super::strategy::{Signal, Strategy};

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    /// Per-step rate subtracted from mean returns in Sharpe and Sortino.
    pub risk_free_rate: f64,
    /// Date whose bar prices the end-of-run liquidation. `None` uses each series' last bar.
    pub terminal_date: Option<NaiveDate>,
    /// Liquidation price for an instrument with no bars at all.
    pub placeholder_price: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            initial_capital: 100_000.0,
            risk_free_rate: 0.0,
            terminal_date: None,
            placeholder_price: 100.0,
        }
    }
}

/// Which slice of the data a run simulates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    #[default]
    Full,
    InSample,
    /// In-sample first, then the second half seeded with its ending capital.
    OutOfSample,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Full => write!(f, "full"),
            RunMode::InSample => write!(f, "in-sample"),
            RunMode::OutOfSample => write!(f, "out-of-sample"),
        }
    }
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "full" => Ok(RunMode::Full),
            "in-sample" | "insample" => Ok(RunMode::InSample),
            "out-of-sample" | "outofsample" => Ok(RunMode::OutOfSample),
            other => Err(format!(
                "unknown run mode '{other}' (expected full, in-sample or out-of-sample)"
            )),
        }
    }
}

/// A signal that fired but could not be acted on.
#[derive(Debug, Clone, PartialEq)]
pub struct MissedSignal {
    pub code: String,
    pub timestamp: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LosingTrade {
    pub code: String,
    pub timestamp: NaiveDateTime,
    pub pnl: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    /// BUY signals where the sizing rule produced zero shares.
    pub missed_buys: Vec<MissedSignal>,
    /// SELL signals with no open position.
    pub missed_sells: Vec<MissedSignal>,
    /// Signal-driven exits that realized a loss.
    pub losing_trades: Vec<LosingTrade>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    pub starting_capital: f64,
    pub ending_capital: f64,
    pub total_return_pct: f64,
    pub trades: Vec<Trade>,
    pub round_trips: Vec<RoundTrip>,
    /// One sample per simulated step.
    pub strategy_returns: Vec<f64>,
    /// Equal-weight market return per step, aligned with `strategy_returns`.
    pub market_returns: Vec<f64>,
    /// Total portfolio value at the end of each step.
    pub equity_curve: Vec<f64>,
    pub risk_free_rate: f64,
    pub diagnostics: Diagnostics,
    /// Strategy returns regressed on market returns.
    pub regression: Regression,
}

impl BacktestResult {
    pub fn sharpe_ratio(&self) -> f64 {
        metrics::sharpe_ratio(&self.strategy_returns, self.risk_free_rate)
    }

    pub fn sortino_ratio(&self) -> f64 {
        metrics::sortino_ratio(&self.strategy_returns, self.risk_free_rate)
    }

    pub fn downside_deviation(&self) -> f64 {
        metrics::downside_deviation(&self.strategy_returns)
    }

    pub fn max_drawdown_pct(&self) -> f64 {
        metrics::max_drawdown_pct(self.starting_capital, &self.equity_curve)
    }

    pub fn metrics(&self) -> Metrics {
        Metrics::compute(self)
    }
}

/// In-sample and out-of-sample runs over the same universe.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitResult {
    pub in_sample: BacktestResult,
    pub out_of_sample: BacktestResult,
}

fn validate_inputs(market_data: &MarketData, config: &BacktestConfig) -> Result<(), QuantsimError> {
    let capital = config.initial_capital;
    if !capital.is_finite() || capital <= 0.0 {
        return Err(QuantsimError::InvalidCapital { capital });
    }
    if !config.risk_free_rate.is_finite() {
        return Err(QuantsimError::InvalidRiskFreeRate {
            rate: config.risk_free_rate,
        });
    }
    if market_data.is_empty() {
        return Err(QuantsimError::EmptyUniverse);
    }
    if market_data.values().all(|bars| bars.is_empty()) {
        return Err(QuantsimError::NoBars);
    }
    if let Some(bar) = market_data
        .values()
        .flatten()
        .find(|bar| !bar.close.is_finite())
    {
        return Err(QuantsimError::NonFinitePrice {
            code: bar.code.clone(),
            timestamp: bar.timestamp,
        });
    }
    Ok(())
}

/// The bar that prices an end-of-run liquidation.
///
/// With a terminal date, the bar nearest to it by calendar days (an exact match is
/// distance 0; the earlier bar wins ties). Without one, the last bar. `None` only for an
/// empty series.
pub fn final_bar(bars: &[Bar], terminal_date: Option<NaiveDate>) -> Option<&Bar> {
    match terminal_date {
        Some(target) => bars
            .iter()
            .min_by_key(|bar| (bar.date() - target).num_days().abs()),
        None => bars.last(),
    }
}

/// Runs one simulation over `market_data`.
///
/// Fails only on the entry checks: non-positive or non-finite capital, a non-finite
/// risk-free rate, no instruments, no bars at all, or a bar with a non-finite close.
pub fn run_backtest(
    market_data: &MarketData,
    strategy: &dyn Strategy,
    config: &BacktestConfig,
) -> Result<BacktestResult, QuantsimError> {
    validate_inputs(market_data, config)?;

    let horizon = market_data.values().map(Vec::len).max().unwrap_or(0);
    info!(
        strategy = strategy.name(),
        instruments = market_data.len(),
        horizon,
        capital = config.initial_capital,
        "starting backtest"
    );

    let mut portfolio = Portfolio::new(config.initial_capital);
    let mut trades = Vec::new();
    let mut round_trips = Vec::new();
    let mut diagnostics = Diagnostics::default();
    let steps = horizon.saturating_sub(1);
    let mut strategy_returns = Vec::with_capacity(steps);
    let mut market_returns = Vec::with_capacity(steps);
    let mut equity_curve = Vec::with_capacity(steps);

    let mut marks: HashMap<String, f64> = market_data
        .iter()
        .filter_map(|(code, bars)| bars.first().map(|bar| (code.clone(), bar.close)))
        .collect();

    for t in 1..horizon {
        for (code, bars) in market_data {
            if let Some(bar) = bars.get(t) {
                marks.insert(code.clone(), bar.close);
            }
        }

        let mut step_market = Vec::new();
        let mut step_exits = Vec::new();

        for (code, bars) in market_data {
            let Some(bar) = bars.get(t) else {
                continue;
            };
            if let Some(r) = simple_return(bars[t - 1].close, bar.close) {
                step_market.push(r);
            }

            match strategy.signal(&bars[..t]) {
                Signal::Buy => {
                    let capital = portfolio.total_value(&marks);
                    let quantity = strategy.position_size(capital, bar.close);
                    if quantity > 0 {
                        portfolio.open_position(code, quantity, bar.close);
                        debug!(code = %code, quantity, price = bar.close, step = t, "buy");
                        trades.push(Trade::buy(code, quantity, bar.close, bar.timestamp));
                    } else {
                        diagnostics.missed_buys.push(MissedSignal {
                            code: code.clone(),
                            timestamp: bar.timestamp,
                        });
                    }
                }
                Signal::Sell => match portfolio.close_position(code, bar.close) {
                    Some(reduction) if reduction.quantity > 0 => {
                        let pnl = reduction.realized_pnl();
                        debug!(
                            code = %code,
                            quantity = reduction.quantity,
                            price = bar.close,
                            pnl,
                            step = t,
                            "sell"
                        );
                        trades.push(Trade::sell(code, reduction.quantity, bar.close, bar.timestamp));
                        let trip = RoundTrip {
                            code: code.clone(),
                            quantity: reduction.quantity,
                            average_cost: reduction.average_cost,
                            exit_price: bar.close,
                            exit_timestamp: bar.timestamp,
                            pnl,
                            reason: ExitReason::Signal,
                        };
                        step_exits.push(trip.return_fraction());
                        if pnl < 0.0 {
                            diagnostics.losing_trades.push(LosingTrade {
                                code: code.clone(),
                                timestamp: bar.timestamp,
                                pnl,
                            });
                        }
                        round_trips.push(trip);
                    }
                    _ => diagnostics.missed_sells.push(MissedSignal {
                        code: code.clone(),
                        timestamp: bar.timestamp,
                    }),
                },
                Signal::Hold => {}
            }
        }

        market_returns.push(metrics::mean(&step_market));
        strategy_returns.push(metrics::mean(&step_exits));
        equity_curve.push(portfolio.total_value(&marks));
    }

    let regression = metrics::linear_regression(&market_returns, &strategy_returns);
    debug!(
        beta = regression.beta,
        alpha = regression.alpha,
        r_squared = regression.r_squared,
        "regression"
    );

    liquidate(
        &mut portfolio,
        market_data,
        config,
        &mut trades,
        &mut round_trips,
    );

    let ending_capital = portfolio.cash;
    let total_return_pct =
        (ending_capital - config.initial_capital) / config.initial_capital * 100.0;

    info!(
        ending_capital,
        total_return_pct,
        trades = trades.len(),
        "backtest complete"
    );

    Ok(BacktestResult {
        starting_capital: config.initial_capital,
        ending_capital,
        total_return_pct,
        trades,
        round_trips,
        strategy_returns,
        market_returns,
        equity_curve,
        risk_free_rate: config.risk_free_rate,
        diagnostics,
        regression,
    })
}

/// Closes every open position at its final price and logs the closing SELLs.
fn liquidate(
    portfolio: &mut Portfolio,
    market_data: &MarketData,
    config: &BacktestConfig,
    trades: &mut Vec<Trade>,
    round_trips: &mut Vec<RoundTrip>,
) {
    let latest_timestamp = market_data
        .values()
        .filter_map(|bars| bars.last())
        .map(|bar| bar.timestamp)
        .max()
        .unwrap_or_default();

    for code in portfolio.open_codes() {
        let bar = market_data
            .get(&code)
            .and_then(|bars| final_bar(bars, config.terminal_date));
        let (price, timestamp) = match bar {
            Some(bar) => (bar.close, bar.timestamp),
            None => (config.placeholder_price, latest_timestamp),
        };

        let Some(reduction) = portfolio.close_position(&code, price) else {
            continue;
        };
        debug!(code = %code, quantity = reduction.quantity, price, "liquidate");
        trades.push(Trade::sell(&code, reduction.quantity, price, timestamp));
        round_trips.push(RoundTrip {
            code: code.clone(),
            quantity: reduction.quantity,
            average_cost: reduction.average_cost,
            exit_price: price,
            exit_timestamp: timestamp,
            pnl: reduction.realized_pnl(),
            reason: ExitReason::Liquidation,
        });
    }
}

/// First half of every series: `bars[..len / 2]`.
pub fn split_in_sample(market_data: &MarketData) -> MarketData {
    market_data
        .iter()
        .map(|(code, bars)| (code.clone(), bars[..bars.len() / 2].to_vec()))
        .collect()
}

/// Second half of every series: `bars[len / 2..]`.
pub fn split_out_of_sample(market_data: &MarketData) -> MarketData {
    market_data
        .iter()
        .map(|(code, bars)| (code.clone(), bars[bars.len() / 2..].to_vec()))
        .collect()
}

pub fn run_in_sample(
    market_data: &MarketData,
    strategy: &dyn Strategy,
    config: &BacktestConfig,
) -> Result<BacktestResult, QuantsimError> {
    run_backtest(&split_in_sample(market_data), strategy, config)
}

/// Runs the in-sample half, then the out-of-sample half starting from the in-sample
/// ending capital.
pub fn run_out_of_sample(
    market_data: &MarketData,
    strategy: &dyn Strategy,
    config: &BacktestConfig,
) -> Result<SplitResult, QuantsimError> {
    let in_sample = run_in_sample(market_data, strategy, config)?;
    let seeded = BacktestConfig {
        initial_capital: in_sample.ending_capital,
        ..config.clone()
    };
    info!(capital = seeded.initial_capital, "seeding out-of-sample run");
    let out_of_sample = run_backtest(&split_out_of_sample(market_data), strategy, &seeded)?;

    Ok(SplitResult {
        in_sample,
        out_of_sample,
    })
}
