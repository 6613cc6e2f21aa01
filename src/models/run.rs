//! Backtest run records: status, equity curve, trade log, warnings.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::BacktestError;

use super::trade::CandidateTrade;
use super::trader::ConfidenceTier;

/// Lifecycle of a backtest run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    fn can_transition_to(&self, next: RunStatus) -> bool {
        match (self, next) {
            (Self::Pending, Self::Running) => true,
            (Self::Running, n) => n.is_terminal(),
            _ => false,
        }
    }
}

/// One point per simulated calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub capital: Decimal,
    pub daily_pnl: Decimal,
}

/// Final state of a copied trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeOutcome {
    Won,
    Lost,
    /// Still unresolved at end_date
    Pending,
    /// Never entered; see `skip_reason`
    Skipped,
}

impl TradeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Won => "WON",
            Self::Lost => "LOST",
            Self::Pending => "PENDING",
            Self::Skipped => "SKIPPED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "WON" => Some(Self::Won),
            "LOST" => Some(Self::Lost),
            "PENDING" => Some(Self::Pending),
            "SKIPPED" => Some(Self::Skipped),
            _ => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Won | Self::Lost)
    }
}

/// Why a selected trade was not entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The fill draw failed
    NotFilled,
    /// Remaining daily budget or capital below the minimum position
    InsufficientBudget,
    /// Sizing gave the trade no weight (no positive edge or model score)
    ZeroStake,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFilled => "not_filled",
            Self::InsufficientBudget => "insufficient_budget",
            Self::ZeroStake => "zero_stake",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_filled" => Some(Self::NotFilled),
            "insufficient_budget" => Some(Self::InsufficientBudget),
            "zero_stake" => Some(Self::ZeroStake),
            _ => None,
        }
    }
}

/// A selected trade and what became of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutedTrade {
    pub trade_id: String,
    pub wallet: String,
    pub condition_id: String,
    pub outcome_label: String,
    pub entered_at: DateTime<Utc>,
    pub entry_price: Decimal,
    pub trader_win_rate: Decimal,
    pub trader_resolved_trades: u32,
    pub edge: Decimal,
    pub trade_size_usd: Decimal,
    pub confidence: ConfidenceTier,
    pub conviction_z: Option<f64>,
    pub model_score: Option<f64>,
    pub market_category: Option<String>,
    pub bet_structure: Option<String>,

    /// Slippage-adjusted price; `None` when never filled
    pub effective_price: Option<Decimal>,

    /// Stake in USDC (the sized stake for unfilled trades, zero when unfunded)
    pub position_size_usd: Decimal,

    pub outcome: TradeOutcome,
    pub skip_reason: Option<SkipReason>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub pnl: Decimal,

    /// Realized capital right after this entry was logged
    pub capital_after: Decimal,
}

impl ExecutedTrade {
    /// Log entry for a candidate, before its fate is attached.
    pub fn from_candidate(candidate: &CandidateTrade, stake: Decimal, capital: Decimal) -> Self {
        Self {
            trade_id: candidate.trade_id.clone(),
            wallet: candidate.wallet.clone(),
            condition_id: candidate.condition_id.clone(),
            outcome_label: candidate.outcome.clone(),
            entered_at: candidate.timestamp,
            entry_price: candidate.entry_price,
            trader_win_rate: candidate.trader_win_rate,
            trader_resolved_trades: candidate.trader_resolved_trades,
            edge: candidate.edge,
            trade_size_usd: candidate.trade_size_usd,
            confidence: candidate.confidence,
            conviction_z: candidate.conviction_z,
            model_score: candidate.model_score,
            market_category: candidate.market_category.clone(),
            bet_structure: candidate.bet_structure.clone(),
            effective_price: None,
            position_size_usd: stake,
            outcome: TradeOutcome::Pending,
            skip_reason: None,
            resolved_at: None,
            pnl: Decimal::ZERO,
            capital_after: capital,
        }
    }

    pub fn skipped(
        candidate: &CandidateTrade,
        stake: Decimal,
        reason: SkipReason,
        capital: Decimal,
    ) -> Self {
        Self {
            outcome: TradeOutcome::Skipped,
            skip_reason: Some(reason),
            ..Self::from_candidate(candidate, stake, capital)
        }
    }
}

/// Category of a non-fatal anomaly attached to a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    DataUnavailable,
    SizingFallback,
}

impl WarningKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DataUnavailable => "data_unavailable",
            Self::SizingFallback => "sizing_fallback",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "data_unavailable" => Some(Self::DataUnavailable),
            "sizing_fallback" => Some(Self::SizingFallback),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunWarning {
    pub date: NaiveDate,
    pub kind: WarningKind,
    pub trade_id: Option<String>,
    pub message: String,
}

/// Summary record of one backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestRun {
    /// Run ID (bt_YYYYMMDD_HHMMSS_xxxxxx)
    pub id: String,
    pub strategy_type: String,
    pub description: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: Decimal,
    pub status: RunStatus,

    /// Resolved (WON + LOST) trades
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub skipped_trades: usize,
    pub pending_trades: usize,

    pub win_rate: f64,
    pub avg_win: Decimal,
    pub avg_loss: Decimal,
    pub profit_factor: f64,

    /// Percent, e.g. 12.5 for +12.5%
    pub total_return_pct: Decimal,

    /// Mean / stddev of daily returns, unannualized
    pub sharpe_ratio: f64,

    /// Percent, largest peak-to-trough decline
    pub max_drawdown_pct: f64,
    pub final_capital: Decimal,

    pub days_simulated: usize,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,

    /// Fault or failure message for failed runs
    pub error: Option<String>,
    pub warnings: Vec<RunWarning>,

    /// Candidates rejected by the filter pipeline, per reason
    pub filter_rejections: BTreeMap<String, u64>,
}

impl BacktestRun {
    /// Create a pending run.
    pub fn new(
        id: String,
        strategy_type: String,
        description: String,
        start_date: NaiveDate,
        end_date: NaiveDate,
        initial_capital: Decimal,
    ) -> Self {
        Self {
            id,
            strategy_type,
            description,
            start_date,
            end_date,
            initial_capital,
            status: RunStatus::Pending,
            total_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            skipped_trades: 0,
            pending_trades: 0,
            win_rate: 0.0,
            avg_win: Decimal::ZERO,
            avg_loss: Decimal::ZERO,
            profit_factor: 0.0,
            total_return_pct: Decimal::ZERO,
            sharpe_ratio: 0.0,
            max_drawdown_pct: 0.0,
            final_capital: initial_capital,
            days_simulated: 0,
            started_at: Utc::now(),
            completed_at: None,
            error: None,
            warnings: Vec::new(),
            filter_rejections: BTreeMap::new(),
        }
    }

    /// Generate a run ID like `bt_20250101_120000_a1b2c3`.
    pub fn generate_id(now: DateTime<Utc>) -> String {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!("bt_{}_{}", now.format("%Y%m%d_%H%M%S"), &suffix[..6])
    }

    /// Move to `next`, refusing to leave a terminal status.
    pub fn transition(&mut self, next: RunStatus) -> Result<(), BacktestError> {
        if !self.status.can_transition_to(next) {
            return Err(BacktestError::SimulationFault(format!(
                "Illegal run transition: {} -> {}",
                self.status.as_str(),
                next.as_str()
            )));
        }

        self.status = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }
}
