//! Metrics calculation: point-in-time trader stats, Sharpe ratio, drawdown.

mod calculator;

pub use calculator::MetricsCalculator;
