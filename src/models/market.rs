//! Market metadata and point-in-time resolution lookup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prediction market metadata row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketRecord {
    /// Unique market condition ID (0x-prefixed)
    pub condition_id: String,

    /// Human-readable title
    #[serde(default)]
    pub title: String,

    /// Category (e.g., "politics", "sports", "crypto")
    #[serde(default)]
    pub category: Option<String>,

    /// Bet structure (e.g., "Yes/No", "Spread", "Over/Under")
    #[serde(default)]
    pub bet_structure: Option<String>,

    /// Winning outcome once resolved
    #[serde(default)]
    pub winning_outcome: Option<String>,

    /// When the market resolved
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

/// A market resolution as visible at some instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub resolved_at: DateTime<Utc>,
    pub winning_outcome: String,
}

impl MarketRecord {
    pub fn new(condition_id: impl Into<String>) -> Self {
        Self {
            condition_id: condition_id.into(),
            title: String::new(),
            category: None,
            bet_structure: None,
            winning_outcome: None,
            resolved_at: None,
        }
    }

    /// Resolution, only if it had happened by `as_of`.
    pub fn resolution_as_of(&self, as_of: DateTime<Utc>) -> Option<Resolution> {
        match (&self.winning_outcome, self.resolved_at) {
            (Some(winner), Some(at)) if at <= as_of => Some(Resolution {
                resolved_at: at,
                winning_outcome: winner.clone(),
            }),
            _ => None,
        }
    }
}
