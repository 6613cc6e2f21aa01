//! Data models for historical trades, traders, markets, and backtest runs.

mod market;
mod run;
mod trade;
mod trader;

pub use market::{MarketRecord, Resolution};
pub use run::{
    BacktestRun, EquityPoint, ExecutedTrade, RunStatus, RunWarning, SkipReason, TradeOutcome,
    WarningKind,
};
pub use trade::{CandidateTrade, HistoryEntry, TradeRecord, TradeSide};
pub use trader::{ConfidenceTier, TraderSnapshot};
