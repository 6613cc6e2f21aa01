//! Entry filters applied to each day's candidate trades.
//!
//! Every predicate is independent and optional. A candidate passes only if
//! every active predicate passes; the first failing predicate is reported.

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use tracing::trace;

use crate::backtest::BacktestConfig;
use crate::models::{CandidateTrade, ConfidenceTier};

/// Which predicate rejected a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RejectReason {
    Edge,
    WinRate,
    ResolvedTrades,
    PriceBand,
    Confidence,
    TradeSize,
    Conviction,
    ModelScore,
    MarketCategory,
    BetStructure,
}

impl RejectReason {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Edge => "edge",
            Self::WinRate => "win_rate",
            Self::ResolvedTrades => "resolved_trades",
            Self::PriceBand => "price_band",
            Self::Confidence => "confidence",
            Self::TradeSize => "trade_size",
            Self::Conviction => "conviction",
            Self::ModelScore => "model_score",
            Self::MarketCategory => "market_category",
            Self::BetStructure => "bet_structure",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Result of running a candidate through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterDecision {
    pub accepted: bool,
    pub rejection: Option<RejectReason>,
    pub detail: String,
}

impl FilterDecision {
    pub fn accept() -> Self {
        Self {
            accepted: true,
            rejection: None,
            detail: "All filters passed".to_string(),
        }
    }

    pub fn reject(reason: RejectReason, detail: impl Into<String>) -> Self {
        Self {
            accepted: false,
            rejection: Some(reason),
            detail: detail.into(),
        }
    }
}

/// Rejection counts per predicate, accumulated over a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub evaluated: u64,
    pub accepted: u64,
    pub rejected: BTreeMap<RejectReason, u64>,
}

impl FilterStats {
    pub fn record(&mut self, decision: &FilterDecision) {
        self.evaluated += 1;
        match decision.rejection {
            Some(reason) => *self.rejected.entry(reason).or_insert(0) += 1,
            None => self.accepted += 1,
        }
    }

    /// Rejection counts keyed by reason name, as stored on a run.
    pub fn by_key(&self) -> BTreeMap<String, u64> {
        self.rejected
            .iter()
            .map(|(reason, count)| (reason.key().to_string(), *count))
            .collect()
    }
}

/// Conjunction of the configured entry predicates.
#[derive(Debug, Clone)]
pub struct TradeFilterPipeline {
    min_edge: Option<Decimal>,
    min_win_rate: Option<Decimal>,
    min_resolved_trades: Option<u32>,
    price_min: Decimal,
    price_max: Decimal,
    confidence_tiers: Vec<ConfidenceTier>,
    trade_size_min: Decimal,
    trade_size_max: Decimal,
    min_conviction_z: Option<f64>,
    min_model_score: Option<f64>,
    market_categories: Vec<String>,
    bet_structures: Vec<String>,
}

impl TradeFilterPipeline {
    pub fn from_config(config: &BacktestConfig) -> Self {
        Self {
            min_edge: config.min_edge,
            min_win_rate: config.min_win_rate,
            min_resolved_trades: config.min_resolved_trades,
            price_min: config.price_min,
            price_max: config.price_max,
            confidence_tiers: config.confidence_tiers.clone(),
            trade_size_min: config.trade_size_min,
            trade_size_max: config.trade_size_max,
            min_conviction_z: config.use_conviction.then_some(config.min_conviction_z),
            min_model_score: config.use_model_score.then_some(config.min_model_score),
            market_categories: config.market_categories.clone(),
            bet_structures: config.bet_structures.clone(),
        }
    }

    /// Evaluate one candidate. Pure: depends only on the candidate's own
    /// point-in-time fields.
    pub fn evaluate(&self, c: &CandidateTrade) -> FilterDecision {
        if let Some(min) = self.min_edge {
            if c.edge < min {
                return FilterDecision::reject(
                    RejectReason::Edge,
                    format!("Edge too low: {} < {}", c.edge, min),
                );
            }
        }

        if let Some(min) = self.min_win_rate {
            if c.trader_win_rate < min {
                return FilterDecision::reject(
                    RejectReason::WinRate,
                    format!("Win rate too low: {} < {}", c.trader_win_rate, min),
                );
            }
        }

        if let Some(min) = self.min_resolved_trades {
            if c.trader_resolved_trades < min {
                return FilterDecision::reject(
                    RejectReason::ResolvedTrades,
                    format!("Too few resolved trades: {} < {}", c.trader_resolved_trades, min),
                );
            }
        }

        // [min, max), and never a free contract
        if c.entry_price <= Decimal::ZERO
            || c.entry_price < self.price_min
            || c.entry_price >= self.price_max
        {
            return FilterDecision::reject(
                RejectReason::PriceBand,
                format!(
                    "Price {} outside [{}, {})",
                    c.entry_price, self.price_min, self.price_max
                ),
            );
        }

        if !self.confidence_tiers.is_empty() && !self.confidence_tiers.contains(&c.confidence) {
            return FilterDecision::reject(
                RejectReason::Confidence,
                format!("Confidence {} not accepted", c.confidence.as_str()),
            );
        }

        let above_max = self.trade_size_max > Decimal::ZERO && c.trade_size_usd > self.trade_size_max;
        if c.trade_size_usd < self.trade_size_min || above_max {
            return FilterDecision::reject(
                RejectReason::TradeSize,
                format!("Trade size {} outside band", c.trade_size_usd),
            );
        }

        if let Some(floor) = self.min_conviction_z {
            match c.conviction_z {
                Some(z) if z >= floor => {}
                Some(z) => {
                    return FilterDecision::reject(
                        RejectReason::Conviction,
                        format!("Conviction too low: {:.2} < {:.2}", z, floor),
                    )
                }
                None => return FilterDecision::reject(RejectReason::Conviction, "No conviction score"),
            }
        }

        if let Some(floor) = self.min_model_score {
            match c.model_score {
                Some(score) if score >= floor => {}
                Some(score) => {
                    return FilterDecision::reject(
                        RejectReason::ModelScore,
                        format!("Model score too low: {:.3} < {:.3}", score, floor),
                    )
                }
                None => return FilterDecision::reject(RejectReason::ModelScore, "No model score"),
            }
        }

        if !allowed(&self.market_categories, c.market_category.as_deref()) {
            return FilterDecision::reject(
                RejectReason::MarketCategory,
                format!("Category {:?} not allowed", c.market_category),
            );
        }

        if !allowed(&self.bet_structures, c.bet_structure.as_deref()) {
            return FilterDecision::reject(
                RejectReason::BetStructure,
                format!("Bet structure {:?} not allowed", c.bet_structure),
            );
        }

        FilterDecision::accept()
    }

    /// Keep the candidates that pass, recording every decision in `stats`.
    pub fn apply(&self, candidates: Vec<CandidateTrade>, stats: &mut FilterStats) -> Vec<CandidateTrade> {
        candidates
            .into_iter()
            .filter(|c| {
                let decision = self.evaluate(c);
                stats.record(&decision);
                if !decision.accepted {
                    trace!(trade = %c.trade_id, reason = %decision.detail, "Candidate rejected");
                }
                decision.accepted
            })
            .collect()
    }
}

/// Empty allow-list accepts everything.
fn allowed(allow_list: &[String], value: Option<&str>) -> bool {
    if allow_list.is_empty() {
        return true;
    }
    value.is_some_and(|v| allow_list.iter().any(|a| a.eq_ignore_ascii_case(v)))
}
