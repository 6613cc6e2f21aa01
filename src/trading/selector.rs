//! Choosing which of a day's filtered candidates get copied.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::models::CandidateTrade;

/// Trade selection method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMethod {
    /// Earliest trades first
    Chronological,
    /// Uniform sample, a null-hypothesis baseline
    Random,
    /// Highest edge first
    Threshold,
}

impl SelectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chronological => "chronological",
            Self::Random => "random",
            Self::Threshold => "threshold",
        }
    }
}

impl std::str::FromStr for SelectionMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chronological" => Ok(Self::Chronological),
            "random" => Ok(Self::Random),
            "threshold" => Ok(Self::Threshold),
            other => Err(format!("Unknown selection method: {}", other)),
        }
    }
}

/// Picks up to `max_per_day` candidates, in the order they will be sized.
#[derive(Debug, Clone)]
pub struct TradeSelector {
    method: SelectionMethod,
    max_per_day: usize,
}

impl TradeSelector {
    pub fn new(method: SelectionMethod, max_per_day: usize) -> Self {
        Self { method, max_per_day }
    }

    /// Select from `candidates`. Only RANDOM draws from `rng`.
    pub fn select<R: Rng>(
        &self,
        mut candidates: Vec<CandidateTrade>,
        rng: &mut R,
    ) -> Vec<CandidateTrade> {
        sort_chronologically(&mut candidates);

        match self.method {
            SelectionMethod::Chronological => {
                candidates.truncate(self.max_per_day);
                candidates
            }
            SelectionMethod::Random => {
                if candidates.is_empty() {
                    return candidates;
                }
                let amount = self.max_per_day.min(candidates.len());
                let mut picked = rand::seq::index::sample(rng, candidates.len(), amount).into_vec();
                picked.sort_unstable();

                let mut slots: Vec<Option<CandidateTrade>> = candidates.into_iter().map(Some).collect();
                picked
                    .into_iter()
                    .filter_map(|i| slots.get_mut(i).and_then(Option::take))
                    .collect()
            }
            SelectionMethod::Threshold => {
                candidates.sort_by(|a, b| b.edge.cmp(&a.edge).then_with(|| a.timestamp.cmp(&b.timestamp)));
                candidates.truncate(self.max_per_day);
                candidates
            }
        }
    }
}

fn sort_chronologically(candidates: &mut [CandidateTrade]) {
    candidates.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.trade_id.cmp(&b.trade_id))
    });
}
