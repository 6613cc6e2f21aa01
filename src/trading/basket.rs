//! Trader basket selection, frozen at the start of a run.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::backtest::BacktestConfig;
use crate::data::HistoricalDataStore;
use crate::error::DataError;
use crate::models::TraderSnapshot;

/// How the followed traders are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BasketPolicy {
    /// Every qualifying trader
    All,
    /// Top N qualifying traders by win rate
    #[serde(alias = "top_by_winrate")]
    TopByWinRate,
    /// Top N qualifying traders by realized profit
    TopByProfit,
    /// Top N qualifying traders by traded volume
    TopByVolume,
    /// A literal wallet list, not filtered by qualification
    SpecificWallets,
}

impl BasketPolicy {
    pub fn is_count_based(&self) -> bool {
        matches!(self, Self::TopByWinRate | Self::TopByProfit | Self::TopByVolume)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::TopByWinRate => "top_by_win_rate",
            Self::TopByProfit => "top_by_profit",
            Self::TopByVolume => "top_by_volume",
            Self::SpecificWallets => "specific_wallets",
        }
    }
}

impl std::str::FromStr for BasketPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "all" => Ok(Self::All),
            "top_by_win_rate" | "top_by_winrate" | "winrate" => Ok(Self::TopByWinRate),
            "top_by_profit" | "profit" => Ok(Self::TopByProfit),
            "top_by_volume" | "volume" => Ok(Self::TopByVolume),
            "specific_wallets" | "wallets" => Ok(Self::SpecificWallets),
            other => Err(format!("Unknown basket policy: {}", other)),
        }
    }
}

/// Resolves a basket policy into the wallets a run follows.
#[derive(Debug, Clone)]
pub struct TraderBasketSelector {
    policy: BasketPolicy,
    trader_count: usize,
    min_trade_history: u32,
    wallets: Vec<String>,
}

impl TraderBasketSelector {
    pub fn from_config(config: &BacktestConfig) -> Self {
        Self {
            policy: config.basket_policy,
            trader_count: config.trader_count,
            min_trade_history: config.min_trade_history,
            wallets: config.wallets.clone(),
        }
    }

    /// Select the basket as of `as_of`.
    pub async fn select(
        &self,
        store: &dyn HistoricalDataStore,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<String>, DataError> {
        let basket = if self.policy == BasketPolicy::SpecificWallets {
            self.literal_wallets()
        } else {
            let universe = store.trader_universe(as_of).await?;
            self.rank(universe)
        };

        info!(
            policy = self.policy.as_str(),
            traders = basket.len(),
            as_of = %as_of,
            "Selected trader basket"
        );

        Ok(basket)
    }

    /// Qualify and rank `universe` under a non-literal policy.
    pub fn rank(&self, universe: Vec<TraderSnapshot>) -> Vec<String> {
        let mut qualified: Vec<TraderSnapshot> = universe
            .into_iter()
            .filter(|t| t.resolved_trades >= self.min_trade_history)
            .collect();

        match self.policy {
            BasketPolicy::All | BasketPolicy::SpecificWallets => {
                qualified.sort_by(|a, b| a.wallet.cmp(&b.wallet));
                qualified.into_iter().map(|t| t.wallet).collect()
            }
            BasketPolicy::TopByWinRate => self.top_by(qualified, |a, b| b.win_rate.cmp(&a.win_rate)),
            BasketPolicy::TopByProfit => {
                self.top_by(qualified, |a, b| b.total_profit.cmp(&a.total_profit))
            }
            BasketPolicy::TopByVolume => {
                self.top_by(qualified, |a, b| b.total_volume.cmp(&a.total_volume))
            }
        }
    }

    fn top_by<F>(&self, mut traders: Vec<TraderSnapshot>, metric: F) -> Vec<String>
    where
        F: Fn(&TraderSnapshot, &TraderSnapshot) -> Ordering,
    {
        traders.sort_by(|a, b| {
            metric(a, b)
                .then_with(|| b.resolved_trades.cmp(&a.resolved_trades))
                .then_with(|| a.wallet.cmp(&b.wallet))
        });

        traders
            .into_iter()
            .take(self.trader_count)
            .map(|t| t.wallet)
            .collect()
    }

    fn literal_wallets(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.wallets
            .iter()
            .map(|w| w.trim().to_string())
            .filter(|w| !w.is_empty() && seen.insert(w.clone()))
            .collect()
    }
}
