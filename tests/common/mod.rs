#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use quantsim::domain::backtest::{BacktestConfig, BacktestResult};
use quantsim::domain::error::QuantsimError;
pub use quantsim::domain::ohlcv::{Bar, MarketData};
use quantsim::domain::strategy::{Signal, Strategy};
use quantsim::ports::data_port::DataPort;
use quantsim::ports::report_port::ReportPort;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub struct MockDataPort {
    pub data: HashMap<String, Vec<Bar>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, code: &str, bars: Vec<Bar>) -> Self {
        self.data.insert(code.to_string(), bars);
        self
    }

    pub fn with_error(mut self, code: &str, reason: &str) -> Self {
        self.errors.insert(code.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_bars(
        &self,
        code: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<Bar>, QuantsimError> {
        if let Some(reason) = self.errors.get(code) {
            return Err(QuantsimError::Data {
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(code)
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.date() >= start_date && b.date() <= end_date)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn list_symbols(&self) -> Result<Vec<String>, QuantsimError> {
        let mut symbols: Vec<String> = self.data.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }
}

/// Records every report it is asked to write.
pub struct MockReportPort {
    pub calls: RefCell<Vec<(BacktestResult, String, PathBuf)>>,
}

impl MockReportPort {
    pub fn new() -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
        }
    }
}

impl ReportPort for MockReportPort {
    fn write(
        &self,
        result: &BacktestResult,
        strategy_name: &str,
        output_dir: &Path,
    ) -> Result<(), QuantsimError> {
        self.calls.borrow_mut().push((
            result.clone(),
            strategy_name.to_string(),
            output_dir.to_path_buf(),
        ));
        Ok(())
    }
}

/// Buys when the history reaches `buy_at` bars and sells when it reaches `sell_at`.
pub struct ScriptedStrategy {
    pub buy_at: usize,
    pub sell_at: usize,
    pub size: u64,
}

impl Strategy for ScriptedStrategy {
    fn name(&self) -> &str {
        "scripted"
    }

    fn signal(&self, history: &[Bar]) -> Signal {
        if history.len() == self.buy_at {
            Signal::Buy
        } else if history.len() == self.sell_at {
            Signal::Sell
        } else {
            Signal::Hold
        }
    }

    fn position_size(&self, _available_capital: f64, _price: f64) -> u64 {
        self.size
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn timestamp(date_str: &str) -> NaiveDateTime {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

pub fn make_bar(code: &str, date_str: &str, close: f64) -> Bar {
    Bar {
        code: code.to_string(),
        timestamp: timestamp(date_str),
        open: close - 1.0,
        high: close + 1.0,
        low: close - 2.0,
        close,
        volume: 1000,
    }
}

/// Daily bars from `start_date` with the given closes.
pub fn bars_from_closes(code: &str, start_date: &str, closes: &[f64]) -> Vec<Bar> {
    let start = timestamp(start_date);
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Bar {
            code: code.to_string(),
            timestamp: start + chrono::Duration::days(i as i64),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1000,
        })
        .collect()
}

/// A linear price ramp starting at `start_price`, one bar per day.
pub fn generate_bars(code: &str, start_date: &str, count: usize, start_price: f64) -> Vec<Bar> {
    let closes: Vec<f64> = (0..count).map(|i| start_price + i as f64).collect();
    bars_from_closes(code, start_date, &closes)
}

pub fn market_data(entries: Vec<(&str, Vec<Bar>)>) -> MarketData {
    entries
        .into_iter()
        .map(|(code, bars)| (code.to_string(), bars))
        .collect()
}

pub fn sample_config() -> BacktestConfig {
    BacktestConfig {
        initial_capital: 100_000.0,
        ..BacktestConfig::default()
    }
}
