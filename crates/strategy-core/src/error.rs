use thiserror::Error;

/// Typed failure taxonomy for the backtesting engine.
///
/// Errors local to one backtest run surface as a `Result` to the optimizer,
/// which records the configuration as failed and keeps going. Errors in the
/// top-level single-run entry points surface directly to the caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid date range: start {start} must be before end {end}")]
    InvalidDateRange {
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },

    #[error("Invalid portfolio size: {0} symbols (expected 2 to 10)")]
    InvalidPortfolioSize(usize),

    #[error("Covariance matrix is singular")]
    SingularCovariance,

    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}
