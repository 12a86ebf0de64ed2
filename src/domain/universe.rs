//! Instrument universe: code list parsing and loading bars for each code.
//!
//! Codes that fail to load are skipped with a warning; the load only fails when
//! nothing is left to simulate.

use crate::domain::error::QuantsimError;
use crate::domain::ohlcv::MarketData;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::collections::HashSet;
use tracing::{info, warn};

#[derive(Debug, Clone, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in code list")]
    EmptyToken,

    #[error("duplicate code: {0}")]
    DuplicateCode(String),

    #[error("all codes failed to load")]
    AllCodesFailed,
}

/// Splits a comma-separated code list, trimming and uppercasing each entry.
pub fn parse_codes(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut codes = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let code = trimmed.to_uppercase();
        if !seen.insert(code.clone()) {
            return Err(UniverseError::DuplicateCode(code));
        }
        codes.push(code);
    }

    Ok(codes)
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    NoData,
    FetchFailed(String),
}

#[derive(Debug, Clone)]
pub struct SkippedCode {
    pub code: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone)]
pub struct UniverseLoad {
    pub market_data: MarketData,
    pub skipped: Vec<SkippedCode>,
}

impl UniverseLoad {
    pub fn count(&self) -> usize {
        self.market_data.len()
    }
}

pub fn load_universe(
    data_port: &dyn DataPort,
    codes: &[String],
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<UniverseLoad, QuantsimError> {
    let mut market_data = MarketData::new();
    let mut skipped = Vec::new();

    for code in codes {
        let bars = match data_port.fetch_bars(code, start_date, end_date) {
            Ok(bars) => bars,
            Err(e) => {
                warn!(code = %code, error = %e, "skipping code");
                skipped.push(SkippedCode {
                    code: code.clone(),
                    reason: SkipReason::FetchFailed(e.to_string()),
                });
                continue;
            }
        };

        if bars.is_empty() {
            warn!(code = %code, "skipping code, no data in range");
            skipped.push(SkippedCode {
                code: code.clone(),
                reason: SkipReason::NoData,
            });
            continue;
        }

        info!(code = %code, bars = bars.len(), "loaded");
        market_data.insert(code.clone(), bars);
    }

    if market_data.is_empty() {
        return Err(UniverseError::AllCodesFailed.into());
    }

    if !skipped.is_empty() {
        info!(
            loaded = market_data.len(),
            requested = codes.len(),
            "backtesting a partial universe"
        );
    }

    Ok(UniverseLoad {
        market_data,
        skipped,
    })
}
