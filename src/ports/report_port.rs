//! Report output port.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::QuantsimError;
use std::path::Path;

pub trait ReportPort {
    /// Writes the report for one run into `output_dir`, creating it if needed.
    fn write(
        &self,
        result: &BacktestResult,
        strategy_name: &str,
        output_dir: &Path,
    ) -> Result<(), QuantsimError>;
}
