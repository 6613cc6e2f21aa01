//! In-memory historical store, used for tests and small imported datasets.

use std::collections::{BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use super::point_in_time::build_candidates;
use super::HistoricalDataStore;
use crate::backtest::end_of_day;
use crate::error::DataError;
use crate::metrics::MetricsCalculator;
use crate::models::{
    CandidateTrade, HistoryEntry, MarketRecord, Resolution, TradeRecord, TraderSnapshot,
};

/// Historical store backed by vectors held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    trades: Vec<TradeRecord>,
    markets: HashMap<String, MarketRecord>,
    /// Inclusive date range with data; `None` covers every date
    coverage: Option<(NaiveDate, NaiveDate)>,
    gaps: HashSet<NaiveDate>,
}

impl InMemoryStore {
    pub fn new(mut trades: Vec<TradeRecord>, markets: Vec<MarketRecord>) -> Self {
        trades.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Self {
            trades,
            markets: markets
                .into_iter()
                .map(|m| (m.condition_id.clone(), m))
                .collect(),
            coverage: None,
            gaps: HashSet::new(),
        }
    }

    /// Restrict coverage to an inclusive date range.
    pub fn with_coverage(mut self, first: NaiveDate, last: NaiveDate) -> Self {
        self.coverage = Some((first, last));
        self
    }

    /// Mark a single date as having no data.
    pub fn mark_unavailable(mut self, date: NaiveDate) -> Self {
        self.gaps.insert(date);
        self
    }

    fn check_coverage(&self, date: NaiveDate) -> Result<(), DataError> {
        if self.gaps.contains(&date) {
            return Err(DataError::Unavailable(date));
        }
        match self.coverage {
            Some((first, last)) if date < first || date > last => Err(DataError::Unavailable(date)),
            _ => Ok(()),
        }
    }

    fn history_as_of(&self, wallet: &str, as_of: DateTime<Utc>) -> Vec<HistoryEntry> {
        self.trades
            .iter()
            .filter(|t| t.wallet == wallet && t.created_at <= as_of)
            .map(|t| HistoryEntry {
                trade: t.clone(),
                resolution: self
                    .markets
                    .get(&t.condition_id)
                    .and_then(|m| m.resolution_as_of(as_of)),
            })
            .collect()
    }
}

#[async_trait]
impl HistoricalDataStore for InMemoryStore {
    async fn trades_on_date(
        &self,
        date: NaiveDate,
        basket: &[String],
    ) -> Result<Vec<CandidateTrade>, DataError> {
        self.check_coverage(date)?;

        let basket: HashSet<&str> = basket.iter().map(String::as_str).collect();
        let day_trades: Vec<TradeRecord> = self
            .trades
            .iter()
            .filter(|t| t.trade_date() == date && basket.contains(t.wallet.as_str()))
            .cloned()
            .collect();

        let cutoff = end_of_day(date);
        let histories: HashMap<String, Vec<HistoryEntry>> = day_trades
            .iter()
            .map(|t| t.wallet.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(|wallet| {
                let history = self.history_as_of(&wallet, cutoff);
                (wallet, history)
            })
            .collect();

        Ok(build_candidates(&day_trades, &histories, &self.markets))
    }

    async fn trader_snapshot(
        &self,
        wallet: &str,
        as_of: DateTime<Utc>,
    ) -> Result<TraderSnapshot, DataError> {
        let history = self.history_as_of(wallet, as_of);
        Ok(MetricsCalculator::trader_snapshot(wallet, as_of, &history))
    }

    async fn trader_universe(&self, as_of: DateTime<Utc>) -> Result<Vec<TraderSnapshot>, DataError> {
        let wallets: BTreeSet<&str> = self
            .trades
            .iter()
            .filter(|t| t.created_at <= as_of)
            .map(|t| t.wallet.as_str())
            .collect();

        Ok(wallets
            .into_iter()
            .map(|wallet| {
                let history = self.history_as_of(wallet, as_of);
                MetricsCalculator::trader_snapshot(wallet, as_of, &history)
            })
            .collect())
    }

    async fn resolution(
        &self,
        condition_id: &str,
        as_of: DateTime<Utc>,
    ) -> Result<Option<Resolution>, DataError> {
        Ok(self
            .markets
            .get(condition_id)
            .and_then(|m| m.resolution_as_of(as_of)))
    }
}
