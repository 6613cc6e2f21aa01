//! Position sizing algorithms: fixed, fractional Kelly, edge-proportional,
//! conviction-weighted, model-weighted.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use statrs::statistics::Statistics;

use crate::backtest::BacktestConfig;
use crate::models::CandidateTrade;

/// Position sizing method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizingMethod {
    /// Constant dollar stake per trade
    Fixed,
    /// Fractional Kelly on the trader's edge
    Kelly,
    /// Daily budget split by edge
    Proportional,
    /// Daily budget split by conviction z-score
    Conviction,
    /// Daily budget split by model score above 0.5
    Model,
}

impl SizingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Kelly => "kelly",
            Self::Proportional => "proportional",
            Self::Conviction => "conviction",
            Self::Model => "model",
        }
    }
}

impl std::str::FromStr for SizingMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "kelly" => Ok(Self::Kelly),
            "proportional" | "edge" => Ok(Self::Proportional),
            "conviction" => Ok(Self::Conviction),
            "model" | "ml" => Ok(Self::Model),
            other => Err(format!("Unknown sizing method: {}", other)),
        }
    }
}

/// Whether the configured method sized a trade, or FIXED stood in for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SizingOutcome {
    Applied,
    FellBackTo { method: SizingMethod, reason: String },
}

/// Unclamped stake for one selected trade.
#[derive(Debug, Clone, PartialEq)]
pub struct StakeProposal {
    pub stake: Decimal,
    pub outcome: SizingOutcome,
}

impl StakeProposal {
    fn applied(stake: Decimal) -> Self {
        Self {
            stake,
            outcome: SizingOutcome::Applied,
        }
    }
}

/// Calculator for per-trade stakes against a daily budget.
#[derive(Debug, Clone)]
pub struct PositionSizer {
    method: SizingMethod,
    max_trades_per_day: usize,
    fixed_position_usd: Option<Decimal>,
    kelly_fraction: Decimal,
    min_position_usd: Decimal,
    max_position_usd: Option<Decimal>,
    use_conviction: bool,
    use_model_score: bool,
}

impl PositionSizer {
    pub fn from_config(config: &BacktestConfig) -> Self {
        Self {
            method: config.sizing_method,
            max_trades_per_day: config.max_trades_per_day,
            fixed_position_usd: config.fixed_position_usd,
            kelly_fraction: config.kelly_fraction,
            min_position_usd: config.min_position_usd,
            max_position_usd: config.max_position_usd,
            use_conviction: config.use_conviction,
            use_model_score: config.use_model_score,
        }
    }

    pub fn method(&self) -> SizingMethod {
        self.method
    }

    /// FIXED stake: the configured amount, or the budget split evenly over
    /// the daily trade cap.
    pub fn fixed_stake(&self, day_budget: Decimal) -> Decimal {
        self.fixed_position_usd
            .unwrap_or_else(|| day_budget / Decimal::from(self.max_trades_per_day.max(1) as u64))
    }

    /// Propose a stake for each of the day's selected trades, in order.
    ///
    /// `capital` is realized capital at the start of the day and `day_budget`
    /// the day's spendable amount. Proposals are not yet clamped.
    pub fn propose(
        &self,
        selected: &[CandidateTrade],
        capital: Decimal,
        day_budget: Decimal,
    ) -> Vec<StakeProposal> {
        match self.method {
            SizingMethod::Fixed => selected
                .iter()
                .map(|_| StakeProposal::applied(self.fixed_stake(day_budget)))
                .collect(),
            SizingMethod::Kelly => selected
                .iter()
                .map(|c| StakeProposal::applied(capital * self.kelly_fraction_of(c)))
                .collect(),
            SizingMethod::Proportional => {
                let weights: Vec<Option<Decimal>> = selected
                    .iter()
                    .map(|c| Some(c.edge.max(Decimal::ZERO)))
                    .collect();
                self.weighted(&weights, day_budget, "no trade has positive edge")
            }
            SizingMethod::Conviction => {
                if !self.use_conviction {
                    return self.fall_back(selected.len(), day_budget, "conviction scoring disabled");
                }
                let weights = conviction_weights(selected);
                self.weighted(&weights, day_budget, "no conviction score")
            }
            SizingMethod::Model => {
                if !self.use_model_score {
                    return self.fall_back(selected.len(), day_budget, "model scoring disabled");
                }
                let weights: Vec<Option<Decimal>> = selected
                    .iter()
                    .map(|c| {
                        c.model_score
                            .and_then(|s| Decimal::try_from(s).ok())
                            .map(|s| (s - dec!(0.5)).clamp(Decimal::ZERO, dec!(0.5)))
                    })
                    .collect();
                self.weighted(&weights, day_budget, "no model score")
            }
        }
    }

    /// Fraction of capital full Kelly would bet, scaled by `kelly_fraction`.
    ///
    /// For a binary contract at price p with win probability q, full Kelly is
    /// (q - p) / (1 - p) = edge / (1 - p).
    pub fn kelly_fraction_of(&self, c: &CandidateTrade) -> Decimal {
        let odds_denominator = Decimal::ONE - c.entry_price;
        if c.edge <= Decimal::ZERO || odds_denominator <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        self.kelly_fraction * c.edge / odds_denominator
    }

    /// Clamp a proposal to the remaining budget, available capital and the
    /// per-trade cap. Returns zero when the result cannot fund the minimum
    /// position.
    pub fn clamp(&self, stake: Decimal, remaining_budget: Decimal, available_capital: Decimal) -> Decimal {
        let mut final_stake = stake.max(Decimal::ZERO);

        final_stake = final_stake.min(remaining_budget.max(Decimal::ZERO));
        final_stake = final_stake.min(available_capital.max(Decimal::ZERO));
        if let Some(max) = self.max_position_usd {
            final_stake = final_stake.min(max);
        }

        // Whole cents, never rounding up past a bound
        final_stake = final_stake.round_dp_with_strategy(2, RoundingStrategy::ToZero);

        if final_stake <= Decimal::ZERO || final_stake < self.min_position_usd {
            return Decimal::ZERO;
        }

        final_stake
    }

    /// Split `day_budget` by weight. Trades without a weight fall back to
    /// FIXED individually; if no trade has one, every trade does.
    fn weighted(
        &self,
        weights: &[Option<Decimal>],
        day_budget: Decimal,
        missing: &str,
    ) -> Vec<StakeProposal> {
        let total: Decimal = weights.iter().flatten().sum();
        if weights.iter().all(Option::is_none) {
            return self.fall_back(weights.len(), day_budget, missing);
        }
        if total <= Decimal::ZERO {
            return self.fall_back(weights.len(), day_budget, "all weights are zero");
        }

        weights
            .iter()
            .map(|w| match w {
                Some(w) => StakeProposal::applied(day_budget * *w / total),
                None => StakeProposal {
                    stake: self.fixed_stake(day_budget),
                    outcome: SizingOutcome::FellBackTo {
                        method: SizingMethod::Fixed,
                        reason: missing.to_string(),
                    },
                },
            })
            .collect()
    }

    fn fall_back(&self, count: usize, day_budget: Decimal, reason: &str) -> Vec<StakeProposal> {
        (0..count)
            .map(|_| StakeProposal {
                stake: self.fixed_stake(day_budget),
                outcome: SizingOutcome::FellBackTo {
                    method: SizingMethod::Fixed,
                    reason: reason.to_string(),
                },
            })
            .collect()
    }
}

/// Weight each trade by the standard normal CDF of its conviction z-score,
/// re-standardized against the day's selected trades.
fn conviction_weights(selected: &[CandidateTrade]) -> Vec<Option<Decimal>> {
    let scores: Vec<f64> = selected.iter().filter_map(|c| c.conviction_z).collect();
    let (mean, std_dev) = if scores.len() >= 2 {
        (scores.clone().mean(), scores.std_dev())
    } else {
        (0.0, 0.0)
    };

    let normal = Normal::new(0.0, 1.0).ok();

    selected
        .iter()
        .map(|c| {
            c.conviction_z.map(|z| {
                let day_z = if std_dev > 0.0 { (z - mean) / std_dev } else { 0.0 };
                let weight = normal.as_ref().map_or(0.5, |n| n.cdf(day_z));
                Decimal::try_from(weight).unwrap_or(Decimal::ZERO)
            })
        })
        .collect()
}
