//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{self as engine, BacktestConfig, BacktestResult, RunMode};
use crate::domain::config_validation::{
    read_date, read_double, read_parsed, validate_backtest_config, validate_strategy_config,
    validate_strategy_params,
};
use crate::domain::error::QuantsimError;
use crate::domain::metrics::CodeResult;
use crate::domain::strategy::{
    MovingAverageParams, MovingAverageStrategy, RsiParams, RsiStrategy, Strategy, StrategyKind,
};
use crate::domain::universe::{load_universe, parse_codes};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "quantsim", about = "Multi-instrument strategy backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Strategy type, overriding [strategy] type (moving_average | rsi)
        #[arg(short, long)]
        strategy: Option<StrategyKind>,
        /// Directory for the CSV report, overriding [report] output_dir
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Comma-separated codes, overriding [backtest] codes
        #[arg(long)]
        code: Option<String>,
        /// full | in-sample | out-of-sample
        #[arg(long)]
        mode: Option<RunMode>,
        #[arg(long)]
        dry_run: bool,
    },
    /// List the codes available in the data directory
    ListSymbols {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

/// Command-line overrides for a backtest run.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub strategy: Option<StrategyKind>,
    pub output: Option<PathBuf>,
    pub code: Option<String>,
    pub mode: Option<RunMode>,
}

pub fn run(cli: Cli) -> ExitCode {
    let outcome = match cli.command {
        Command::Backtest {
            config,
            strategy,
            output,
            code,
            mode,
            dry_run,
        } => {
            let overrides = Overrides {
                strategy,
                output,
                code,
                mode,
            };
            if dry_run {
                run_dry_run(&config, &overrides)
            } else {
                run_backtest(&config, &overrides).map(|_| ())
            }
        }
        Command::ListSymbols { config } => run_list_symbols(&config),
        Command::Validate { config } => run_validate(&config),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, QuantsimError> {
    info!(path = %path.display(), "loading config");
    FileConfigAdapter::from_file(path)
}

pub fn build_backtest_config(config: &dyn ConfigPort) -> Result<BacktestConfig, QuantsimError> {
    let defaults = BacktestConfig::default();
    Ok(BacktestConfig {
        initial_capital: read_double(config, "backtest", "initial_capital")?
            .unwrap_or(defaults.initial_capital),
        risk_free_rate: read_double(config, "backtest", "risk_free_rate")?
            .unwrap_or(defaults.risk_free_rate),
        terminal_date: read_date(config, "backtest", "terminal_date")?,
        placeholder_price: read_double(config, "backtest", "placeholder_price")?
            .unwrap_or(defaults.placeholder_price),
    })
}

/// Inclusive data window; an open end reaches the earliest or latest representable date.
pub fn resolve_date_range(
    config: &dyn ConfigPort,
) -> Result<(NaiveDate, NaiveDate), QuantsimError> {
    let start = read_date(config, "backtest", "start_date")?.unwrap_or(NaiveDate::MIN);
    let end = read_date(config, "backtest", "end_date")?.unwrap_or(NaiveDate::MAX);
    Ok((start, end))
}

pub fn resolve_strategy_kind(
    kind_override: Option<StrategyKind>,
    config: &dyn ConfigPort,
) -> Result<StrategyKind, QuantsimError> {
    match kind_override {
        Some(kind) => Ok(kind),
        None => Ok(read_parsed::<StrategyKind>(config, "strategy", "type")?
            .unwrap_or(StrategyKind::MovingAverage)),
    }
}

pub fn resolve_mode(
    mode_override: Option<RunMode>,
    config: &dyn ConfigPort,
) -> Result<RunMode, QuantsimError> {
    match mode_override {
        Some(mode) => Ok(mode),
        None => Ok(read_parsed::<RunMode>(config, "backtest", "mode")?.unwrap_or_default()),
    }
}

/// Builds the selected strategy from the `[strategy]` section, falling back to
/// each variant's defaults for absent keys.
pub fn build_strategy(
    kind: StrategyKind,
    config: &dyn ConfigPort,
) -> Result<Box<dyn Strategy>, QuantsimError> {
    validate_strategy_params(config, kind)?;

    let strategy: Box<dyn Strategy> = match kind {
        StrategyKind::MovingAverage => {
            let d = MovingAverageParams::default();
            Box::new(MovingAverageStrategy::new(MovingAverageParams {
                short_period: read_parsed::<usize>(config, "strategy", "short_period")?
                    .unwrap_or(d.short_period),
                long_period: read_parsed::<usize>(config, "strategy", "long_period")?
                    .unwrap_or(d.long_period),
                buffer_pct: read_double(config, "strategy", "buffer_pct")?.unwrap_or(d.buffer_pct),
                min_volume: read_double(config, "strategy", "min_volume")?.unwrap_or(d.min_volume),
                risk_per_trade: read_double(config, "strategy", "risk_per_trade")?
                    .unwrap_or(d.risk_per_trade),
                stop_loss_pct: read_double(config, "strategy", "stop_loss_pct")?
                    .unwrap_or(d.stop_loss_pct),
            }))
        }
        StrategyKind::Rsi => {
            let d = RsiParams::default();
            Box::new(RsiStrategy::new(RsiParams {
                period: read_parsed::<usize>(config, "strategy", "period")?.unwrap_or(d.period),
                overbought: read_double(config, "strategy", "overbought")?.unwrap_or(d.overbought),
                oversold: read_double(config, "strategy", "oversold")?.unwrap_or(d.oversold),
                risk_per_trade: read_double(config, "strategy", "risk_per_trade")?
                    .unwrap_or(d.risk_per_trade),
                stop_loss_pct: read_double(config, "strategy", "stop_loss_pct")?
                    .unwrap_or(d.stop_loss_pct),
            }))
        }
    };
    Ok(strategy)
}

/// `--code` wins over `[backtest] codes`, which wins over `[backtest] code`.
pub fn resolve_codes(
    code_override: Option<&str>,
    config: &dyn ConfigPort,
) -> Result<Vec<String>, QuantsimError> {
    let raw = code_override
        .map(str::to_string)
        .or_else(|| config.get_string("backtest", "codes"))
        .or_else(|| config.get_string("backtest", "code"))
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| QuantsimError::ConfigMissing {
            section: "backtest".into(),
            key: "codes".into(),
        })?;
    Ok(parse_codes(&raw)?)
}

/// Relative paths in the config resolve against the config file's directory.
fn resolve_path(config_path: &Path, raw: &str) -> PathBuf {
    let path = PathBuf::from(raw.trim());
    match config_path.parent() {
        Some(dir) if path.is_relative() => dir.join(path),
        _ => path,
    }
}

pub fn data_dir(config_path: &Path, config: &dyn ConfigPort) -> PathBuf {
    let raw = config
        .get_string("data", "csv_dir")
        .unwrap_or_else(|| "data".to_string());
    resolve_path(config_path, &raw)
}

fn output_dir(
    config_path: &Path,
    output_override: Option<&Path>,
    config: &dyn ConfigPort,
) -> Option<PathBuf> {
    match output_override {
        Some(path) => Some(path.to_path_buf()),
        None => config
            .get_string("report", "output_dir")
            .filter(|s| !s.trim().is_empty())
            .map(|raw| resolve_path(config_path, &raw)),
    }
}

/// Everything a pipeline run needs beyond the ports and the strategy.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub codes: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub mode: RunMode,
    pub output_dir: Option<PathBuf>,
}

/// Loads the universe, runs the simulation in the planned mode, prints the summary and
/// writes the report. Returns the last run's result (the out-of-sample run in that mode).
pub fn run_backtest_pipeline(
    data_port: &dyn DataPort,
    report_port: &dyn ReportPort,
    strategy: &dyn Strategy,
    bt_config: &BacktestConfig,
    plan: &RunPlan,
) -> Result<BacktestResult, QuantsimError> {
    let universe = load_universe(data_port, &plan.codes, plan.start_date, plan.end_date)?;
    info!(
        codes = universe.count(),
        skipped = universe.skipped.len(),
        mode = %plan.mode,
        strategy = strategy.name(),
        "running backtest"
    );
    if !universe.skipped.is_empty() {
        let skipped: Vec<&str> = universe.skipped.iter().map(|s| s.code.as_str()).collect();
        println!("Skipped codes: {}", skipped.join(", "));
    }
    let market_data = universe.market_data;

    let result = match plan.mode {
        RunMode::Full => {
            let result = engine::run_backtest(&market_data, strategy, bt_config)?;
            print_summary("Full Period", &result);
            write_report(report_port, &result, strategy, plan.output_dir.as_deref())?;
            result
        }
        RunMode::InSample => {
            let result = engine::run_in_sample(&market_data, strategy, bt_config)?;
            print_summary("In-Sample", &result);
            write_report(report_port, &result, strategy, plan.output_dir.as_deref())?;
            result
        }
        RunMode::OutOfSample => {
            let split = engine::run_out_of_sample(&market_data, strategy, bt_config)?;
            print_summary("In-Sample", &split.in_sample);
            print_summary("Out-of-Sample", &split.out_of_sample);
            if let Some(dir) = plan.output_dir.as_deref() {
                let in_sample_dir = dir.join("in-sample");
                let out_of_sample_dir = dir.join("out-of-sample");
                write_report(
                    report_port,
                    &split.in_sample,
                    strategy,
                    Some(in_sample_dir.as_path()),
                )?;
                write_report(
                    report_port,
                    &split.out_of_sample,
                    strategy,
                    Some(out_of_sample_dir.as_path()),
                )?;
            }
            split.out_of_sample
        }
    };

    Ok(result)
}

fn write_report(
    report_port: &dyn ReportPort,
    result: &BacktestResult,
    strategy: &dyn Strategy,
    output_dir: Option<&Path>,
) -> Result<(), QuantsimError> {
    match output_dir {
        Some(dir) => {
            report_port.write(result, strategy.name(), dir)?;
            println!("\nReport written to: {}", dir.display());
            Ok(())
        }
        None => Ok(()),
    }
}

pub fn print_summary(label: &str, result: &BacktestResult) {
    let metrics = result.metrics();

    println!("\n=== {label} Results ===");
    println!("Starting Capital: {:.2}", result.starting_capital);
    println!("Ending Capital:   {:.2}", result.ending_capital);
    println!("Total Return:     {:.2}%", metrics.total_return_pct);
    println!("Annualized:       {:.2}%", metrics.annualized_return_pct);
    println!("Sharpe Ratio:     {:.2}", metrics.sharpe_ratio);
    println!("Sortino Ratio:    {:.2}", metrics.sortino_ratio);
    println!("Max Drawdown:     -{:.1}%", metrics.max_drawdown_pct);
    println!(
        "Beta / Alpha:     {:.3} / {:.5} (R² {:.3})",
        metrics.beta, metrics.alpha, metrics.r_squared
    );
    println!(
        "Total Trades:     {} ({} buys, {} sells)",
        metrics.total_trades, metrics.buys, metrics.sells
    );
    println!("Win Rate:         {:.1}%", metrics.win_rate * 100.0);
    println!("Profit Factor:    {:.2}", metrics.profit_factor);
    println!(
        "Diagnostics:      {} missed buys, {} missed sells, {} losing trades",
        metrics.missed_buys, metrics.missed_sells, metrics.losing_trades
    );

    let code_results = CodeResult::compute_per_code(&result.round_trips);
    if !code_results.is_empty() {
        println!("\n--- Per-Code Summary ---");
        for cr in &code_results {
            let pnl_sign = if cr.total_pnl >= 0.0 { "+" } else { "" };
            println!(
                "  {}:  {} trades, {:.1}% win rate, {}${:.0}",
                cr.code,
                cr.total_trades,
                cr.win_rate * 100.0,
                pnl_sign,
                cr.total_pnl,
            );
        }
    }
}

pub fn run_backtest(
    config_path: &Path,
    overrides: &Overrides,
) -> Result<BacktestResult, QuantsimError> {
    let config = load_config(config_path)?;
    validate_backtest_config(&config)?;

    let kind = resolve_strategy_kind(overrides.strategy, &config)?;
    let strategy = build_strategy(kind, &config)?;
    let bt_config = build_backtest_config(&config)?;
    let (start_date, end_date) = resolve_date_range(&config)?;

    let plan = RunPlan {
        codes: resolve_codes(overrides.code.as_deref(), &config)?,
        start_date,
        end_date,
        mode: resolve_mode(overrides.mode, &config)?,
        output_dir: output_dir(config_path, overrides.output.as_deref(), &config),
    };

    let data_port = CsvAdapter::new(data_dir(config_path, &config));
    run_backtest_pipeline(&data_port, &CsvReportAdapter, strategy.as_ref(), &bt_config, &plan)
}

pub fn run_dry_run(config_path: &Path, overrides: &Overrides) -> Result<(), QuantsimError> {
    let config = load_config(config_path)?;
    validate_backtest_config(&config)?;

    let kind = resolve_strategy_kind(overrides.strategy, &config)?;
    let strategy = build_strategy(kind, &config)?;
    let bt_config = build_backtest_config(&config)?;
    let codes = resolve_codes(overrides.code.as_deref(), &config)?;
    let mode = resolve_mode(overrides.mode, &config)?;

    println!("Config validated successfully");
    println!("\nStrategy: {}", strategy.name());
    println!("Mode:     {mode}");
    println!("Capital:  {:.2}", bt_config.initial_capital);
    println!("Codes:    {}", codes.join(", "));
    println!("Data:     {}", data_dir(config_path, &config).display());
    match output_dir(config_path, overrides.output.as_deref(), &config) {
        Some(dir) => println!("Report:   {}", dir.display()),
        None => println!("Report:   (none)"),
    }
    println!("\nDry run complete: configuration is valid");
    Ok(())
}

pub fn run_validate(config_path: &Path) -> Result<(), QuantsimError> {
    let config = load_config(config_path)?;
    validate_backtest_config(&config)?;
    validate_strategy_config(&config)?;
    println!("Configuration is valid: {}", config_path.display());
    Ok(())
}

pub fn run_list_symbols(config_path: &Path) -> Result<(), QuantsimError> {
    let config = load_config(config_path)?;
    let adapter = CsvAdapter::new(data_dir(config_path, &config));
    let symbols = adapter.list_symbols()?;

    if symbols.is_empty() {
        println!("No symbols found");
    } else {
        for symbol in &symbols {
            println!("{symbol}");
        }
    }
    Ok(())
}
