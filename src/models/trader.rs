//! Point-in-time trader statistics.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Statistical confidence in a trader's win rate, by resolved-trade count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfidenceTier {
    Insufficient,
    Low,
    Medium,
    High,
}

impl ConfidenceTier {
    pub const LOW_MIN_TRADES: u32 = 10;
    pub const MEDIUM_MIN_TRADES: u32 = 30;
    pub const HIGH_MIN_TRADES: u32 = 100;

    pub fn from_resolved_count(resolved: u32) -> Self {
        if resolved >= Self::HIGH_MIN_TRADES {
            Self::High
        } else if resolved >= Self::MEDIUM_MIN_TRADES {
            Self::Medium
        } else if resolved >= Self::LOW_MIN_TRADES {
            Self::Low
        } else {
            Self::Insufficient
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insufficient => "INSUFFICIENT",
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "INSUFFICIENT" => Some(Self::Insufficient),
            "LOW" => Some(Self::Low),
            "MEDIUM" => Some(Self::Medium),
            "HIGH" => Some(Self::High),
            _ => None,
        }
    }
}

/// A trader's statistics as they were known at `as_of`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraderSnapshot {
    /// Wallet address (0x-prefixed)
    pub wallet: String,

    /// Instant the statistics were computed for
    pub as_of: DateTime<Utc>,

    /// Won / resolved, zero when nothing has resolved yet
    pub win_rate: Decimal,

    /// Trades whose market had resolved by `as_of`
    pub resolved_trades: u32,

    pub winning_trades: u32,

    /// Realized P&L over resolved trades in USDC
    pub total_profit: Decimal,

    /// USDC volume over all trades created by `as_of`
    pub total_volume: Decimal,
}

impl TraderSnapshot {
    /// Snapshot for a wallet with no visible history.
    pub fn empty(wallet: impl Into<String>, as_of: DateTime<Utc>) -> Self {
        Self {
            wallet: wallet.into(),
            as_of,
            win_rate: Decimal::ZERO,
            resolved_trades: 0,
            winning_trades: 0,
            total_profit: Decimal::ZERO,
            total_volume: Decimal::ZERO,
        }
    }
}
