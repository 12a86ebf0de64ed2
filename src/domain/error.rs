//! Domain error types.

use crate::domain::universe::UniverseError;

/// Top-level error type for quantsim.
#[derive(Debug, thiserror::Error)]
pub enum QuantsimError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error(transparent)]
    Universe(#[from] UniverseError),

    #[error("starting capital must be a positive finite amount, got {capital}")]
    InvalidCapital { capital: f64 },

    #[error("risk-free rate must be finite, got {rate}")]
    InvalidRiskFreeRate { rate: f64 },

    #[error("backtest needs at least one instrument")]
    EmptyUniverse,

    #[error("no instrument has any bars to simulate")]
    NoBars,

    #[error("{code} has a non-finite close at {timestamp}")]
    NonFinitePrice {
        code: String,
        timestamp: chrono::NaiveDateTime,
    },

    #[error("report error: {reason}")]
    Report { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&QuantsimError> for std::process::ExitCode {
    fn from(err: &QuantsimError) -> Self {
        let code: u8 = match err {
            QuantsimError::Io(_) | QuantsimError::Report { .. } => 1,
            QuantsimError::ConfigParse { .. }
            | QuantsimError::ConfigMissing { .. }
            | QuantsimError::ConfigInvalid { .. } => 2,
            QuantsimError::Data { .. } => 3,
            QuantsimError::Universe(_) => 4,
            QuantsimError::InvalidCapital { .. }
            | QuantsimError::InvalidRiskFreeRate { .. }
            | QuantsimError::EmptyUniverse
            | QuantsimError::NoBars
            | QuantsimError::NonFinitePrice { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
