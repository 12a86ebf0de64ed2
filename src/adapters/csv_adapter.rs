//! CSV file data adapter.
//!
//! Reads one `<CODE>.csv` per instrument with the columns
//! `timestamp,open,high,low,close,volume`.

use crate::domain::error::QuantsimError;
use crate::domain::ohlcv::Bar;
use crate::ports::data_port::DataPort;
use chrono::{NaiveDate, NaiveDateTime};
use csv::StringRecord;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, code: &str) -> PathBuf {
        self.base_path.join(format!("{code}.csv"))
    }
}

fn data_error(reason: String) -> QuantsimError {
    QuantsimError::Data { reason }
}

/// Accepts a bare date (midnight) or a date-time with a space or `T` separator.
fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

fn field<T>(record: &StringRecord, index: usize, name: &str, line: u64) -> Result<T, QuantsimError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = record
        .get(index)
        .ok_or_else(|| data_error(format!("line {line}: missing {name} column")))?;
    raw.trim()
        .parse()
        .map_err(|e| data_error(format!("line {line}: invalid {name} value '{raw}': {e}")))
}

/// A price column; `NaN` and infinities parse as `f64` but are rejected here.
fn price_field(
    record: &StringRecord,
    index: usize,
    name: &str,
    line: u64,
) -> Result<f64, QuantsimError> {
    let value: f64 = field(record, index, name, line)?;
    if !value.is_finite() {
        return Err(data_error(format!(
            "line {line}: {name} must be a finite number, got {value}"
        )));
    }
    Ok(value)
}

/// Volume is usually an integer but some exports write it as `1234.0`.
fn volume_field(record: &StringRecord, line: u64) -> Result<i64, QuantsimError> {
    field::<i64>(record, 5, "volume", line)
        .or_else(|_| field::<f64>(record, 5, "volume", line).map(|v| v as i64))
}

impl DataPort for CsvAdapter {
    fn fetch_bars(
        &self,
        code: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<Bar>, QuantsimError> {
        let path = self.csv_path(code);
        let content = fs::read_to_string(&path)
            .map_err(|e| data_error(format!("failed to read {}: {}", path.display(), e)))?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();

        for result in rdr.records() {
            let record = result.map_err(|e| data_error(format!("CSV parse error: {e}")))?;
            let line = record.position().map_or(0, |p| p.line());

            let raw_timestamp = record
                .get(0)
                .ok_or_else(|| data_error(format!("line {line}: missing timestamp column")))?;
            let timestamp = parse_timestamp(raw_timestamp).ok_or_else(|| {
                data_error(format!("line {line}: invalid timestamp '{raw_timestamp}'"))
            })?;

            let date = timestamp.date();
            if date < start_date || date > end_date {
                continue;
            }

            bars.push(Bar {
                code: code.to_string(),
                timestamp,
                open: price_field(&record, 1, "open", line)?,
                high: price_field(&record, 2, "high", line)?,
                low: price_field(&record, 3, "low", line)?,
                close: price_field(&record, 4, "close", line)?,
                volume: volume_field(&record, line)?,
            });
        }

        bars.sort_by_key(|b| b.timestamp);
        Ok(bars)
    }

    fn list_symbols(&self) -> Result<Vec<String>, QuantsimError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| {
            data_error(format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ))
        })?;

        let mut symbols = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| data_error(format!("directory entry error: {e}")))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(code) = name.strip_suffix(".csv")
                && !code.is_empty()
            {
                symbols.push(code.to_string());
            }
        }

        symbols.sort();
        Ok(symbols)
    }
}
