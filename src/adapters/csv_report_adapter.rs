//! CSV report adapter.
//!
//! Writes four files into the output directory: `summary.csv`, `trades.csv`,
//! `series.csv` and `diagnostics.csv`.

use std::fs;
use std::path::Path;

use csv::Writer;
use tracing::info;

use crate::domain::backtest::BacktestResult;
use crate::domain::error::QuantsimError;
use crate::ports::report_port::ReportPort;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct CsvReportAdapter;

fn report_error(err: csv::Error) -> QuantsimError {
    QuantsimError::Report {
        reason: err.to_string(),
    }
}

fn create_writer(output_dir: &Path, name: &str) -> Result<Writer<fs::File>, QuantsimError> {
    Writer::from_path(output_dir.join(name)).map_err(report_error)
}

fn write_summary(
    output_dir: &Path,
    result: &BacktestResult,
    strategy_name: &str,
) -> Result<(), QuantsimError> {
    let m = result.metrics();
    let rows: Vec<(&str, String)> = vec![
        ("strategy", strategy_name.to_string()),
        ("starting_capital", format!("{:.2}", result.starting_capital)),
        ("ending_capital", format!("{:.2}", result.ending_capital)),
        ("total_return_pct", format!("{:.4}", m.total_return_pct)),
        ("annualized_return_pct", format!("{:.4}", m.annualized_return_pct)),
        ("volatility", format!("{:.6}", m.volatility)),
        ("sharpe_ratio", format!("{:.4}", m.sharpe_ratio)),
        ("sortino_ratio", format!("{:.4}", m.sortino_ratio)),
        ("max_drawdown_pct", format!("{:.4}", m.max_drawdown_pct)),
        ("max_drawdown_duration", m.max_drawdown_duration.to_string()),
        ("beta", format!("{:.6}", m.beta)),
        ("alpha", format!("{:.6}", m.alpha)),
        ("r_squared", format!("{:.6}", m.r_squared)),
        ("total_trades", m.total_trades.to_string()),
        ("win_rate", format!("{:.4}", m.win_rate)),
        ("profit_factor", format!("{:.4}", m.profit_factor)),
        ("missed_buys", m.missed_buys.to_string()),
        ("missed_sells", m.missed_sells.to_string()),
        ("losing_trades", m.losing_trades.to_string()),
    ];

    let mut wtr = create_writer(output_dir, "summary.csv")?;
    wtr.write_record(["metric", "value"]).map_err(report_error)?;
    for (metric, value) in rows {
        wtr.write_record([metric, value.as_str()])
            .map_err(report_error)?;
    }
    wtr.flush()?;
    Ok(())
}

fn write_trades(output_dir: &Path, result: &BacktestResult) -> Result<(), QuantsimError> {
    let mut wtr = create_writer(output_dir, "trades.csv")?;
    wtr.write_record(["timestamp", "code", "side", "quantity", "price", "notional"])
        .map_err(report_error)?;
    for trade in &result.trades {
        wtr.write_record([
            trade.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            trade.code.clone(),
            trade.side.to_string(),
            trade.quantity.to_string(),
            format!("{:.4}", trade.price),
            format!("{:.2}", trade.notional()),
        ])
        .map_err(report_error)?;
    }
    wtr.flush()?;
    Ok(())
}

fn write_series(output_dir: &Path, result: &BacktestResult) -> Result<(), QuantsimError> {
    let mut wtr = create_writer(output_dir, "series.csv")?;
    wtr.write_record(["step", "strategy_return", "market_return", "equity"])
        .map_err(report_error)?;
    let rows = result
        .strategy_returns
        .iter()
        .zip(&result.market_returns)
        .zip(&result.equity_curve);
    for (i, ((strategy, market), equity)) in rows.enumerate() {
        wtr.write_record([
            (i + 1).to_string(),
            format!("{strategy:.8}"),
            format!("{market:.8}"),
            format!("{equity:.2}"),
        ])
        .map_err(report_error)?;
    }
    wtr.flush()?;
    Ok(())
}

fn write_diagnostics(output_dir: &Path, result: &BacktestResult) -> Result<(), QuantsimError> {
    let diagnostics = &result.diagnostics;
    let mut wtr = create_writer(output_dir, "diagnostics.csv")?;
    wtr.write_record(["kind", "code", "timestamp", "pnl"])
        .map_err(report_error)?;

    let missed = diagnostics
        .missed_buys
        .iter()
        .map(|m| ("missed_buy", m))
        .chain(diagnostics.missed_sells.iter().map(|m| ("missed_sell", m)));
    for (kind, missed) in missed {
        let timestamp = missed.timestamp.format(TIMESTAMP_FORMAT).to_string();
        wtr.write_record([kind, missed.code.as_str(), timestamp.as_str(), ""])
            .map_err(report_error)?;
    }
    for losing in &diagnostics.losing_trades {
        let timestamp = losing.timestamp.format(TIMESTAMP_FORMAT).to_string();
        let pnl = format!("{:.2}", losing.pnl);
        wtr.write_record([
            "losing_trade",
            losing.code.as_str(),
            timestamp.as_str(),
            pnl.as_str(),
        ])
        .map_err(report_error)?;
    }
    wtr.flush()?;
    Ok(())
}

impl ReportPort for CsvReportAdapter {
    fn write(
        &self,
        result: &BacktestResult,
        strategy_name: &str,
        output_dir: &Path,
    ) -> Result<(), QuantsimError> {
        fs::create_dir_all(output_dir)?;
        write_summary(output_dir, result, strategy_name)?;
        write_trades(output_dir, result)?;
        write_series(output_dir, result)?;
        write_diagnostics(output_dir, result)?;
        info!(dir = %output_dir.display(), "report written");
        Ok(())
    }
}
