//! Point-in-time backtesting of copy-trading strategies.

mod config;
mod ledger;
mod report;
mod runner;

pub use config::{end_of_day, start_of_day, BacktestConfig};
pub use ledger::{OpenPosition, PortfolioLedger};
pub use report::BacktestReport;
pub use runner::BacktestRunner;
