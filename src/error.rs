//! Error types for the backtesting engine.

use chrono::NaiveDate;
use thiserror::Error;

/// Errors raised by historical data sources.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DataError {
    /// The source has no coverage for the requested date
    #[error("No historical data for {0}")]
    Unavailable(NaiveDate),
    /// Retryable failure (timeouts, dropped connections)
    #[error("Transient data source error: {0}")]
    Transient(String),
    /// Permanent failure
    #[error("Data source error: {0}")]
    Backend(String),
}

impl DataError {
    pub fn is_transient(&self) -> bool {
        matches!(self, DataError::Transient(_))
    }
}

impl From<sqlx::Error> for DataError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DataError::Transient(err.to_string())
            }
            other => DataError::Backend(other.to_string()),
        }
    }
}

/// Backtest errors.
#[derive(Debug, Error)]
pub enum BacktestError {
    /// Invalid configuration; the run never leaves PENDING
    #[error("Invalid configuration: {0}")]
    Configuration(String),
    /// A simulated day had no data coverage
    #[error("Data unavailable for {0}")]
    DataUnavailable(NaiveDate),
    /// Cancelled by the caller
    #[error("Backtest cancelled")]
    Cancelled,
    /// Internal invariant violated; the run is FAILED
    #[error("Simulation fault: {0}")]
    SimulationFault(String),
    #[error(transparent)]
    Data(#[from] DataError),
}

impl BacktestError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        BacktestError::Configuration(msg.into())
    }

    pub(crate) fn fault(msg: impl Into<String>) -> Self {
        BacktestError::SimulationFault(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlx_error_classification() {
        assert!(DataError::from(sqlx::Error::PoolTimedOut).is_transient());
        assert!(!DataError::from(sqlx::Error::RowNotFound).is_transient());
    }

    #[test]
    fn test_unavailable_converts_to_backtest_error() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let err: BacktestError = DataError::Unavailable(date).into();
        assert!(matches!(err, BacktestError::Data(DataError::Unavailable(d)) if d == date));
    }
}
