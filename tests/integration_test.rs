//! Integration tests for the simulation engine, universe loading and reporting.
//!
//! Tests cover:
//! - Universe loading through a mock data port feeding the engine
//! - Built-in strategies driven end to end
//! - Multi-instrument runs over series of different lengths
//! - In-sample / out-of-sample runs
//! - Metrics computed from a finished run
//! - The CLI pipeline writing reports through a mock report port

mod common;

use approx::assert_relative_eq;
use common::*;
use quantsim::cli::{run_backtest_pipeline, RunPlan};
use quantsim::domain::backtest::{
    run_backtest, run_in_sample, run_out_of_sample, BacktestConfig, RunMode,
};
use quantsim::domain::error::QuantsimError;
use quantsim::domain::metrics::CodeResult;
use quantsim::domain::position::{ExitReason, Side};
use quantsim::domain::strategy::{
    MovingAverageParams, MovingAverageStrategy, RsiStrategy, Strategy,
};
use quantsim::domain::universe::{load_universe, parse_codes, SkipReason, UniverseError};
use std::path::PathBuf;

fn codes(list: &str) -> Vec<String> {
    parse_codes(list).unwrap()
}

fn config(capital: f64) -> BacktestConfig {
    BacktestConfig {
        initial_capital: capital,
        ..BacktestConfig::default()
    }
}

mod full_backtest_pipeline {
    use super::*;

    #[test]
    fn scripted_round_trip_through_data_port() {
        let port = MockDataPort::new().with_bars(
            "AAPL",
            bars_from_closes("AAPL", "2024-01-01", &[10.0, 11.0, 9.0, 12.0, 13.0]),
        );
        let universe =
            load_universe(&port, &codes("AAPL"), date(2024, 1, 1), date(2024, 12, 31)).unwrap();
        let strategy = ScriptedStrategy {
            buy_at: 1,
            sell_at: 4,
            size: 10,
        };

        let result = run_backtest(&universe.market_data, &strategy, &config(1000.0)).unwrap();

        assert_eq!(result.trades.len(), 2);
        assert_eq!(result.trades[0].side, Side::Buy);
        assert_eq!(result.trades[0].timestamp, timestamp("2024-01-02"));
        assert_relative_eq!(result.trades[0].price, 11.0);
        assert_eq!(result.trades[1].side, Side::Sell);
        assert_eq!(result.trades[1].timestamp, timestamp("2024-01-05"));
        assert_relative_eq!(result.trades[1].price, 13.0);
        assert_relative_eq!(result.ending_capital, 1020.0);
        assert_relative_eq!(result.total_return_pct, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn rsi_on_rising_prices_only_misses_sells() {
        let data = market_data(vec![("AAPL", generate_bars("AAPL", "2024-01-01", 20, 100.0))]);
        let result = run_backtest(&data, &RsiStrategy::default(), &sample_config()).unwrap();

        assert!(result.trades.is_empty());
        // Steps 14..=19 see at least 14 bars of pure gains.
        assert_eq!(result.diagnostics.missed_sells.len(), 6);
        assert!(result.diagnostics.missed_buys.is_empty());
        assert_relative_eq!(result.ending_capital, 100_000.0);
    }

    #[test]
    fn rsi_on_falling_prices_accumulates_then_liquidates() {
        let closes: Vec<f64> = (0..30).map(|i| 200.0 - i as f64).collect();
        let data = market_data(vec![("AAPL", bars_from_closes("AAPL", "2024-01-01", &closes))]);
        let result = run_backtest(&data, &RsiStrategy::default(), &sample_config()).unwrap();

        let buys: Vec<_> = result.trades.iter().filter(|t| t.side == Side::Buy).collect();
        let sells: Vec<_> = result.trades.iter().filter(|t| t.side == Side::Sell).collect();
        assert_eq!(buys.len(), 16);
        assert_eq!(sells.len(), 1);

        let bought: u64 = buys.iter().map(|t| t.quantity).sum();
        assert_eq!(sells[0].quantity, bought);
        assert_relative_eq!(sells[0].price, 171.0);

        assert_eq!(result.round_trips.len(), 1);
        assert_eq!(result.round_trips[0].reason, ExitReason::Liquidation);
        assert!(result.round_trips[0].pnl < 0.0);
        // Liquidation losses are not signal-driven losing trades.
        assert!(result.diagnostics.losing_trades.is_empty());
        assert!(result.ending_capital < 100_000.0);
    }

    #[test]
    fn moving_average_strategy_runs_on_generated_data() {
        let strategy = MovingAverageStrategy::new(MovingAverageParams {
            short_period: 3,
            long_period: 8,
            min_volume: 0.0,
            ..MovingAverageParams::default()
        });
        let data = market_data(vec![
            ("AAPL", generate_bars("AAPL", "2024-01-01", 40, 50.0)),
            ("MSFT", generate_bars("MSFT", "2024-01-01", 40, 300.0)),
        ]);

        let result = run_backtest(&data, &strategy, &sample_config()).unwrap();

        // Constant volume never confirms a crossover in either direction.
        assert!(result.trades.is_empty());
        assert_eq!(result.strategy_returns.len(), 39);
        assert_eq!(result.equity_curve.len(), 39);
        assert!(result.equity_curve.iter().all(|&v| (v - 100_000.0).abs() < 1e-9));
    }

    #[test]
    fn runs_with_a_trait_object() {
        let strategies: Vec<Box<dyn Strategy>> = vec![
            Box::new(RsiStrategy::default()),
            Box::new(MovingAverageStrategy::default()),
        ];
        let data = market_data(vec![("AAPL", generate_bars("AAPL", "2024-01-01", 10, 100.0))]);

        for strategy in &strategies {
            let result = run_backtest(&data, strategy.as_ref(), &sample_config()).unwrap();
            assert_eq!(result.strategy_returns.len(), 9);
        }
    }
}

mod multi_instrument {
    use super::*;

    #[test]
    fn per_code_pnl_from_known_trades() {
        let data = market_data(vec![
            (
                "AAPL",
                bars_from_closes("AAPL", "2024-01-01", &[10.0, 10.0, 12.0, 15.0]),
            ),
            (
                "MSFT",
                bars_from_closes("MSFT", "2024-01-01", &[20.0, 20.0, 18.0, 16.0]),
            ),
        ]);
        let strategy = ScriptedStrategy {
            buy_at: 1,
            sell_at: 3,
            size: 10,
        };
        let result = run_backtest(&data, &strategy, &config(1000.0)).unwrap();

        assert_eq!(result.trades.len(), 4);
        assert_eq!(result.diagnostics.losing_trades.len(), 1);
        assert_eq!(result.diagnostics.losing_trades[0].code, "MSFT");

        let per_code = CodeResult::compute_per_code(&result.round_trips);
        assert_eq!(per_code.len(), 2);
        assert_eq!(per_code[0].code, "AAPL");
        assert_relative_eq!(per_code[0].total_pnl, 50.0);
        assert_eq!(per_code[1].code, "MSFT");
        assert_relative_eq!(per_code[1].total_pnl, -40.0);

        // Both exits land on step 3: mean of +50% and -20%.
        assert_relative_eq!(result.strategy_returns[2], 0.15, epsilon = 1e-12);
        assert_relative_eq!(result.ending_capital, 1010.0);
    }

    #[test]
    fn trade_log_is_ordered_by_step_then_code() {
        let data = market_data(vec![
            ("MSFT", generate_bars("MSFT", "2024-01-01", 4, 20.0)),
            ("AAPL", generate_bars("AAPL", "2024-01-01", 4, 10.0)),
        ]);
        let strategy = ScriptedStrategy {
            buy_at: 1,
            sell_at: 2,
            size: 1,
        };
        let result = run_backtest(&data, &strategy, &config(1000.0)).unwrap();

        let log: Vec<(&str, Side)> = result
            .trades
            .iter()
            .map(|t| (t.code.as_str(), t.side))
            .collect();
        assert_eq!(
            log,
            vec![
                ("AAPL", Side::Buy),
                ("MSFT", Side::Buy),
                ("AAPL", Side::Sell),
                ("MSFT", Side::Sell),
            ]
        );
    }

    #[test]
    fn shorter_series_stops_contributing() {
        let data = market_data(vec![
            ("AAPL", bars_from_closes("AAPL", "2024-01-01", &[10.0, 11.0, 12.1])),
            ("SHORT", bars_from_closes("SHORT", "2024-01-01", &[50.0])),
        ]);
        let strategy = ScriptedStrategy {
            buy_at: 99,
            sell_at: 99,
            size: 0,
        };
        let result = run_backtest(&data, &strategy, &config(1000.0)).unwrap();

        assert_eq!(result.market_returns.len(), 2);
        assert_relative_eq!(result.market_returns[0], 0.1, epsilon = 1e-12);
        assert_relative_eq!(result.market_returns[1], 0.1, epsilon = 1e-12);
    }

    #[test]
    fn liquidation_marks_each_code_at_its_own_final_bar() {
        let data = market_data(vec![
            ("AAPL", bars_from_closes("AAPL", "2024-01-01", &[10.0, 11.0, 12.0, 13.0])),
            ("MSFT", bars_from_closes("MSFT", "2024-01-01", &[20.0, 21.0, 22.0])),
        ]);
        let strategy = ScriptedStrategy {
            buy_at: 1,
            sell_at: 99,
            size: 10,
        };
        let result = run_backtest(&data, &strategy, &config(1000.0)).unwrap();

        let closes: Vec<(&str, f64)> = result
            .trades
            .iter()
            .filter(|t| t.side == Side::Sell)
            .map(|t| (t.code.as_str(), t.price))
            .collect();
        assert_eq!(closes, vec![("AAPL", 13.0), ("MSFT", 22.0)]);
        // 1000 - 110 - 210 + 130 + 220
        assert_relative_eq!(result.ending_capital, 1030.0);
    }
}

mod universe_loading {
    use super::*;

    #[test]
    fn partial_universe_skips_failed_codes() {
        let port = MockDataPort::new()
            .with_bars("AAPL", generate_bars("AAPL", "2024-01-01", 5, 100.0))
            .with_bars("EMPTY", Vec::new())
            .with_error("BROKEN", "connection refused");

        let universe = load_universe(
            &port,
            &codes("AAPL,EMPTY,BROKEN,MISSING"),
            date(2024, 1, 1),
            date(2024, 12, 31),
        )
        .unwrap();

        assert_eq!(universe.count(), 1);
        assert!(universe.market_data.contains_key("AAPL"));
        assert_eq!(universe.skipped.len(), 3);
        assert_eq!(universe.skipped[0].code, "EMPTY");
        assert_eq!(universe.skipped[0].reason, SkipReason::NoData);
        assert_eq!(
            universe.skipped[1].reason,
            SkipReason::FetchFailed("data error: connection refused".to_string())
        );
        assert_eq!(universe.skipped[2].reason, SkipReason::NoData);
    }

    #[test]
    fn all_codes_failing_is_an_error() {
        let port = MockDataPort::new().with_error("AAPL", "timeout");
        let err = load_universe(&port, &codes("AAPL,MSFT"), date(2024, 1, 1), date(2024, 1, 31))
            .unwrap_err();
        assert!(matches!(
            err,
            QuantsimError::Universe(UniverseError::AllCodesFailed)
        ));
    }

    #[test]
    fn date_range_filters_bars() {
        let port =
            MockDataPort::new().with_bars("AAPL", generate_bars("AAPL", "2024-01-01", 31, 100.0));
        let universe =
            load_universe(&port, &codes("AAPL"), date(2024, 1, 10), date(2024, 1, 19)).unwrap();
        assert_eq!(universe.market_data["AAPL"].len(), 10);
    }

    #[test]
    fn single_code_and_list_give_identical_results() {
        let bars = bars_from_closes("AAPL", "2024-01-01", &[10.0, 11.0, 9.0, 12.0, 13.0]);
        let port = MockDataPort::new().with_bars("AAPL", bars);
        let strategy = ScriptedStrategy {
            buy_at: 1,
            sell_at: 4,
            size: 10,
        };

        let single = load_universe(&port, &codes("aapl"), date(2024, 1, 1), date(2024, 1, 31))
            .unwrap();
        let list = load_universe(&port, &codes("AAPL,MSFT"), date(2024, 1, 1), date(2024, 1, 31))
            .unwrap();

        let a = run_backtest(&single.market_data, &strategy, &config(1000.0)).unwrap();
        let b = run_backtest(&list.market_data, &strategy, &config(1000.0)).unwrap();
        assert_eq!(a, b);
    }
}

mod split_runs {
    use super::*;

    fn ramp() -> MarketData {
        market_data(vec![(
            "AAPL",
            bars_from_closes(
                "AAPL",
                "2024-01-01",
                &[10.0, 11.0, 12.0, 13.0, 14.0, 12.0, 15.0, 16.0, 17.0],
            ),
        )])
    }

    #[test]
    fn in_sample_uses_first_half_only() {
        let strategy = ScriptedStrategy {
            buy_at: 1,
            sell_at: 99,
            size: 10,
        };
        let result = run_in_sample(&ramp(), &strategy, &config(1000.0)).unwrap();

        // 9 bars → 4 in-sample bars, 3 steps; liquidated at the 4th close.
        assert_eq!(result.strategy_returns.len(), 3);
        assert_relative_eq!(result.trades.last().unwrap().price, 13.0);
    }

    #[test]
    fn out_of_sample_starts_from_in_sample_ending_capital() {
        let strategy = ScriptedStrategy {
            buy_at: 1,
            sell_at: 3,
            size: 10,
        };
        let split = run_out_of_sample(&ramp(), &strategy, &config(1000.0)).unwrap();

        assert_relative_eq!(split.in_sample.starting_capital, 1000.0);
        assert_relative_eq!(split.in_sample.ending_capital, 1020.0);
        assert_eq!(
            split.out_of_sample.starting_capital,
            split.in_sample.ending_capital
        );
        // Second half [14, 12, 15, 16, 17]: buy @ 12, sell @ 16.
        assert_relative_eq!(split.out_of_sample.ending_capital, 1060.0);
        assert_relative_eq!(
            split.out_of_sample.total_return_pct,
            40.0 / 1020.0 * 100.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn split_of_single_bar_series_has_no_in_sample_bars() {
        let data = market_data(vec![("AAPL", bars_from_closes("AAPL", "2024-01-01", &[10.0]))]);
        let strategy = ScriptedStrategy {
            buy_at: 1,
            sell_at: 2,
            size: 1,
        };
        assert!(matches!(
            run_in_sample(&data, &strategy, &config(1000.0)),
            Err(QuantsimError::NoBars)
        ));
    }
}

mod metrics_from_run {
    use super::*;

    #[test]
    fn metrics_reflect_the_run() {
        let data = market_data(vec![(
            "AAPL",
            bars_from_closes("AAPL", "2024-01-01", &[10.0, 11.0, 9.0, 12.0, 13.0]),
        )]);
        let strategy = ScriptedStrategy {
            buy_at: 1,
            sell_at: 4,
            size: 10,
        };
        let result = run_backtest(&data, &strategy, &config(1000.0)).unwrap();
        let m = result.metrics();

        assert_eq!(m.total_trades, 2);
        assert_eq!(m.buys, 1);
        assert_eq!(m.sells, 1);
        assert_eq!(m.trades_won, 1);
        assert_relative_eq!(m.win_rate, 1.0);
        assert!(m.profit_factor.is_infinite());
        assert_relative_eq!(m.largest_win, 20.0);
        assert_relative_eq!(m.max_drawdown_pct, 2.0, epsilon = 1e-9);
        assert_eq!(m.max_drawdown_duration, 1);
        assert_relative_eq!(m.sortino_ratio, 0.0);
        assert!(m.sharpe_ratio > 0.0);
        assert_eq!(result.regression.observations, 4);
    }
}

mod report_generation {
    use super::*;

    fn plan(mode: RunMode, output_dir: Option<PathBuf>) -> RunPlan {
        RunPlan {
            codes: codes("AAPL"),
            start_date: date(2024, 1, 1),
            end_date: date(2024, 12, 31),
            mode,
            output_dir,
        }
    }

    fn port() -> MockDataPort {
        MockDataPort::new().with_bars(
            "AAPL",
            bars_from_closes(
                "AAPL",
                "2024-01-01",
                &[10.0, 11.0, 12.0, 13.0, 14.0, 12.0, 15.0, 16.0],
            ),
        )
    }

    fn strategy() -> ScriptedStrategy {
        ScriptedStrategy {
            buy_at: 1,
            sell_at: 3,
            size: 10,
        }
    }

    #[test]
    fn full_run_writes_one_report() {
        let reports = MockReportPort::new();
        let out = PathBuf::from("/tmp/quantsim-report");
        let result = run_backtest_pipeline(
            &port(),
            &reports,
            &strategy(),
            &config(1000.0),
            &plan(RunMode::Full, Some(out.clone())),
        )
        .unwrap();

        let calls = reports.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, "scripted");
        assert_eq!(calls[0].2, out);
        assert_eq!(calls[0].0, result);
    }

    #[test]
    fn no_output_dir_writes_nothing() {
        let reports = MockReportPort::new();
        run_backtest_pipeline(
            &port(),
            &reports,
            &strategy(),
            &config(1000.0),
            &plan(RunMode::InSample, None),
        )
        .unwrap();
        assert!(reports.calls.borrow().is_empty());
    }

    #[test]
    fn out_of_sample_writes_both_halves() {
        let reports = MockReportPort::new();
        let out = PathBuf::from("/tmp/quantsim-split");
        let result = run_backtest_pipeline(
            &port(),
            &reports,
            &strategy(),
            &config(1000.0),
            &plan(RunMode::OutOfSample, Some(out.clone())),
        )
        .unwrap();

        let calls = reports.calls.borrow();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].2, out.join("in-sample"));
        assert_eq!(calls[1].2, out.join("out-of-sample"));
        assert_eq!(calls[1].0, result);
        assert_eq!(result.starting_capital, calls[0].0.ending_capital);
    }

    #[test]
    fn unknown_codes_fail_the_pipeline() {
        let reports = MockReportPort::new();
        let mut missing = plan(RunMode::Full, None);
        missing.codes = codes("NOPE");
        let err = run_backtest_pipeline(
            &port(),
            &reports,
            &strategy(),
            &config(1000.0),
            &missing,
        )
        .unwrap_err();
        assert!(matches!(err, QuantsimError::Universe(_)));
    }
}
