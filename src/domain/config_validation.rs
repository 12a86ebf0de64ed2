//! Configuration validation.
//!
//! Checks every `[backtest]` and `[strategy]` field before a run, and provides the
//! typed readers the CLI uses to build its configuration.

use crate::domain::backtest::RunMode;
use crate::domain::error::QuantsimError;
use crate::domain::strategy::{MovingAverageParams, RsiParams, StrategyKind};
use crate::domain::universe::parse_codes;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;
use std::str::FromStr;

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> QuantsimError {
    QuantsimError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

/// Raw value of a key, treating blank values as absent.
fn read_raw(config: &dyn ConfigPort, section: &str, key: &str) -> Option<String> {
    config
        .get_string(section, key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Parses an optional value with `FromStr`, reporting a malformed one as invalid.
pub fn read_parsed<T>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<T>, QuantsimError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match read_raw(config, section, key) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| invalid(section, key, format!("'{raw}': {e}"))),
    }
}

pub fn read_double(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<f64>, QuantsimError> {
    let value = read_parsed::<f64>(config, section, key)?;
    match value {
        Some(v) if !v.is_finite() => Err(invalid(section, key, "must be a finite number")),
        other => Ok(other),
    }
}

pub fn read_date(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<NaiveDate>, QuantsimError> {
    match read_raw(config, section, key) {
        None => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| invalid(section, key, format!("invalid {key} format, expected YYYY-MM-DD"))),
    }
}

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), QuantsimError> {
    validate_initial_capital(config)?;
    validate_risk_free_rate(config)?;
    validate_dates(config)?;
    validate_placeholder_price(config)?;
    validate_codes(config)?;
    read_parsed::<RunMode>(config, "backtest", "mode")?;
    Ok(())
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), QuantsimError> {
    let kind = read_parsed::<StrategyKind>(config, "strategy", "type")?
        .unwrap_or(StrategyKind::MovingAverage);
    validate_strategy_params(config, kind)
}

/// Checks the parameters `kind` reads. Parameters of the other variant are ignored.
pub fn validate_strategy_params(
    config: &dyn ConfigPort,
    kind: StrategyKind,
) -> Result<(), QuantsimError> {
    validate_fraction(config, "risk_per_trade")?;
    validate_fraction(config, "stop_loss_pct")?;
    match kind {
        StrategyKind::MovingAverage => validate_moving_average(config),
        StrategyKind::Rsi => validate_rsi(config),
    }
}

fn validate_initial_capital(config: &dyn ConfigPort) -> Result<(), QuantsimError> {
    match read_double(config, "backtest", "initial_capital")? {
        None => Err(QuantsimError::ConfigMissing {
            section: "backtest".to_string(),
            key: "initial_capital".to_string(),
        }),
        Some(v) if v <= 0.0 => Err(invalid(
            "backtest",
            "initial_capital",
            "initial_capital must be positive",
        )),
        Some(_) => Ok(()),
    }
}

fn validate_risk_free_rate(config: &dyn ConfigPort) -> Result<(), QuantsimError> {
    match read_double(config, "backtest", "risk_free_rate")? {
        Some(v) if !(-1.0..1.0).contains(&v) => Err(invalid(
            "backtest",
            "risk_free_rate",
            "risk_free_rate must be greater than -1 and less than 1",
        )),
        _ => Ok(()),
    }
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), QuantsimError> {
    let start_date = read_date(config, "backtest", "start_date")?;
    let end_date = read_date(config, "backtest", "end_date")?;
    read_date(config, "backtest", "terminal_date")?;

    if let (Some(start), Some(end)) = (start_date, end_date)
        && start > end
    {
        return Err(invalid(
            "backtest",
            "start_date",
            "start_date must not be after end_date",
        ));
    }
    Ok(())
}

fn validate_placeholder_price(config: &dyn ConfigPort) -> Result<(), QuantsimError> {
    match read_double(config, "backtest", "placeholder_price")? {
        Some(v) if v <= 0.0 => Err(invalid(
            "backtest",
            "placeholder_price",
            "placeholder_price must be positive",
        )),
        _ => Ok(()),
    }
}

/// A code list is optional here since `--code` can supply it, but a present one must parse.
fn validate_codes(config: &dyn ConfigPort) -> Result<(), QuantsimError> {
    for key in ["codes", "code"] {
        if let Some(raw) = read_raw(config, "backtest", key) {
            parse_codes(&raw).map_err(|e| invalid("backtest", key, e.to_string()))?;
        }
    }
    Ok(())
}

fn validate_fraction(config: &dyn ConfigPort, key: &str) -> Result<(), QuantsimError> {
    match read_double(config, "strategy", key)? {
        Some(v) if v <= 0.0 || v > 1.0 => Err(invalid(
            "strategy",
            key,
            format!("{key} must be greater than 0 and at most 1"),
        )),
        _ => Ok(()),
    }
}

fn validate_period(config: &dyn ConfigPort, key: &str) -> Result<Option<usize>, QuantsimError> {
    match read_parsed::<usize>(config, "strategy", key)? {
        Some(0) => Err(invalid("strategy", key, format!("{key} must be at least 1"))),
        other => Ok(other),
    }
}

fn validate_moving_average(config: &dyn ConfigPort) -> Result<(), QuantsimError> {
    let defaults = MovingAverageParams::default();
    let short = validate_period(config, "short_period")?.unwrap_or(defaults.short_period);
    let long = validate_period(config, "long_period")?.unwrap_or(defaults.long_period);
    if short >= long {
        return Err(invalid(
            "strategy",
            "short_period",
            "short_period must be less than long_period",
        ));
    }

    if let Some(v) = read_double(config, "strategy", "buffer_pct")?
        && v < 0.0
    {
        return Err(invalid(
            "strategy",
            "buffer_pct",
            "buffer_pct must be non-negative",
        ));
    }
    if let Some(v) = read_double(config, "strategy", "min_volume")?
        && v < 0.0
    {
        return Err(invalid(
            "strategy",
            "min_volume",
            "min_volume must be non-negative",
        ));
    }
    Ok(())
}

fn validate_rsi(config: &dyn ConfigPort) -> Result<(), QuantsimError> {
    validate_period(config, "period")?;

    let overbought = read_double(config, "strategy", "overbought")?;
    let oversold = read_double(config, "strategy", "oversold")?;
    for (key, value) in [("overbought", overbought), ("oversold", oversold)] {
        if let Some(v) = value
            && !(0.0..=100.0).contains(&v)
        {
            return Err(invalid("strategy", key, format!("{key} must be between 0 and 100")));
        }
    }
    let defaults = RsiParams::default();
    if oversold.unwrap_or(defaults.oversold) >= overbought.unwrap_or(defaults.overbought) {
        return Err(invalid(
            "strategy",
            "oversold",
            "oversold must be below overbought",
        ));
    }
    Ok(())
}
