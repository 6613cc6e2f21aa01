//! Point-in-time backtesting engine for Polymarket copy-trading strategies.

pub mod backtest;
pub mod data;
pub mod db;
pub mod error;
pub mod metrics;
pub mod models;
pub mod trading;
