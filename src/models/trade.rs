//! Historical trade records and the candidate trades derived from them.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::market::Resolution;
use super::trader::ConfidenceTier;

/// Direction of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "BUY" => Some(Self::Buy),
            "SELL" => Some(Self::Sell),
            _ => None,
        }
    }
}

/// Raw trade row as stored in the historical trades table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Unique trade identifier (typically tx_hash + log_index)
    pub id: String,

    /// Trader's wallet address
    pub wallet: String,

    /// Market condition ID (0x-prefixed)
    pub condition_id: String,

    /// Outcome token bought or sold (e.g., "Yes", "No")
    pub outcome: String,

    /// Trade direction
    pub side: TradeSide,

    /// Price per token in USDC (0.0 to 1.0)
    pub price: Decimal,

    /// Total USDC value of the trade
    pub size_usd: Decimal,

    /// Win probability assigned by the external scoring model, if scored
    #[serde(default)]
    pub model_score: Option<f64>,

    /// When the trade occurred
    pub created_at: DateTime<Utc>,
}

impl TradeRecord {
    pub fn trade_date(&self) -> NaiveDate {
        self.created_at.date_naive()
    }

    /// Whether this position won, given the market's winning outcome.
    pub fn is_winner(&self, winning_outcome: &str) -> bool {
        self.outcome.eq_ignore_ascii_case(winning_outcome)
    }
}

/// A historical trade paired with its market resolution, if visible.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub trade: TradeRecord,
    pub resolution: Option<Resolution>,
}

/// A trade from a basket trader, enriched with point-in-time context.
///
/// Every derived field uses only data timestamped at or before `timestamp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateTrade {
    pub trade_id: String,
    pub wallet: String,
    pub condition_id: String,
    pub outcome: String,
    pub timestamp: DateTime<Utc>,
    pub entry_price: Decimal,

    /// Trader's win rate as of `timestamp`
    pub trader_win_rate: Decimal,

    /// Trader's resolved-trade count as of `timestamp`
    pub trader_resolved_trades: u32,

    /// win rate - entry price
    pub edge: Decimal,

    /// Original trade size in USDC
    pub trade_size_usd: Decimal,

    pub confidence: ConfidenceTier,
    pub conviction_z: Option<f64>,
    pub model_score: Option<f64>,
    pub market_category: Option<String>,
    pub bet_structure: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_side_parsing() {
        assert_eq!(TradeSide::parse("buy"), Some(TradeSide::Buy));
        assert_eq!(TradeSide::parse("SELL"), Some(TradeSide::Sell));
        assert_eq!(TradeSide::parse("hold"), None);
        assert_eq!(TradeSide::Buy.as_str(), "BUY");
    }

    #[test]
    fn test_winner_match_ignores_case() {
        let record = TradeRecord {
            id: "t1".to_string(),
            wallet: "0xabc".to_string(),
            condition_id: "0xc1".to_string(),
            outcome: "Yes".to_string(),
            side: TradeSide::Buy,
            price: dec!(0.40),
            size_usd: dec!(25),
            model_score: None,
            created_at: Utc::now(),
        };

        assert!(record.is_winner("YES"));
        assert!(!record.is_winner("No"));
    }
}
