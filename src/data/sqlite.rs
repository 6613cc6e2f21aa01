//! SQLite-backed historical store over the `trades` and `markets` tables.
//!
//! Timestamps are stored as unix seconds. Every query that can see a market
//! resolution masks it with `resolved_at <= as_of`, so a resolution never
//! leaks into a point-in-time read before it happened.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tokio::sync::OnceCell;
use tracing::debug;

use super::point_in_time::build_candidates;
use super::HistoricalDataStore;
use crate::backtest::{end_of_day, start_of_day};
use crate::error::DataError;
use crate::metrics::MetricsCalculator;
use crate::models::{
    CandidateTrade, HistoryEntry, MarketRecord, Resolution, TradeRecord, TradeSide,
    TraderSnapshot,
};

/// Bound parameters per `IN (...)` list, under SQLite's variable limit.
const IN_CHUNK: usize = 500;

const TRADE_COLUMNS: &str =
    "t.id, t.wallet_address, t.condition_id, t.outcome, t.side, t.price, t.size_usd, t.model_score, t.created_at";

#[derive(Debug, sqlx::FromRow)]
struct TradeRow {
    id: String,
    wallet_address: String,
    condition_id: String,
    outcome: String,
    side: String,
    price: f64,
    size_usd: f64,
    model_score: Option<f64>,
    created_at: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct HistoryRow {
    #[sqlx(flatten)]
    trade: TradeRow,
    winning_outcome: Option<String>,
    resolved_at: Option<i64>,
}

#[derive(Debug, sqlx::FromRow)]
struct MarketRow {
    condition_id: String,
    title: String,
    category: Option<String>,
    bet_structure: Option<String>,
    winning_outcome: Option<String>,
    resolved_at: Option<i64>,
}

pub(crate) fn timestamp(secs: i64) -> Result<DateTime<Utc>, DataError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| DataError::Backend(format!("Invalid timestamp {}", secs)))
}

pub(crate) fn decimal(value: f64, column: &str) -> Result<Decimal, DataError> {
    Decimal::try_from(value)
        .map_err(|e| DataError::Backend(format!("Invalid {} value {}: {}", column, value, e)))
}

impl TryFrom<TradeRow> for TradeRecord {
    type Error = DataError;

    fn try_from(row: TradeRow) -> Result<Self, Self::Error> {
        let side = TradeSide::parse(&row.side)
            .ok_or_else(|| DataError::Backend(format!("Unknown trade side {}", row.side)))?;

        Ok(TradeRecord {
            price: decimal(row.price, "price")?,
            size_usd: decimal(row.size_usd, "size_usd")?,
            created_at: timestamp(row.created_at)?,
            id: row.id,
            wallet: row.wallet_address,
            condition_id: row.condition_id,
            outcome: row.outcome,
            side,
            model_score: row.model_score,
        })
    }
}

impl TryFrom<HistoryRow> for HistoryEntry {
    type Error = DataError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        let resolution = match (row.winning_outcome, row.resolved_at) {
            (Some(winning_outcome), Some(at)) => Some(Resolution {
                resolved_at: timestamp(at)?,
                winning_outcome,
            }),
            _ => None,
        };

        Ok(HistoryEntry {
            trade: row.trade.try_into()?,
            resolution,
        })
    }
}

impl TryFrom<MarketRow> for MarketRecord {
    type Error = DataError;

    fn try_from(row: MarketRow) -> Result<Self, Self::Error> {
        Ok(MarketRecord {
            condition_id: row.condition_id,
            title: row.title,
            category: row.category,
            bet_structure: row.bet_structure,
            winning_outcome: row.winning_outcome,
            resolved_at: row.resolved_at.map(timestamp).transpose()?,
        })
    }
}

/// Historical store reading the imported trade and market tables.
pub struct SqliteStore {
    pool: SqlitePool,
    coverage: OnceCell<Option<(NaiveDate, NaiveDate)>>,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            coverage: OnceCell::new(),
        }
    }

    /// Inclusive date span of the imported trades.
    async fn coverage(&self) -> Result<Option<(NaiveDate, NaiveDate)>, DataError> {
        let span = self.coverage.get_or_try_init(|| self.load_coverage()).await?;
        Ok(*span)
    }

    async fn load_coverage(&self) -> Result<Option<(NaiveDate, NaiveDate)>, DataError> {
        let (first, last): (Option<i64>, Option<i64>) =
            sqlx::query_as("SELECT MIN(created_at), MAX(created_at) FROM trades")
                .fetch_one(&self.pool)
                .await?;

        match (first, last) {
            (Some(first), Some(last)) => Ok(Some((
                timestamp(first)?.date_naive(),
                timestamp(last)?.date_naive(),
            ))),
            _ => Ok(None),
        }
    }

    async fn history_as_of(
        &self,
        wallet: &str,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<HistoryEntry>, DataError> {
        let cutoff = as_of.timestamp();
        let sql = format!(
            r#"
            SELECT {},
                   CASE WHEN m.resolved_at <= ? THEN m.winning_outcome END AS winning_outcome,
                   CASE WHEN m.resolved_at <= ? THEN m.resolved_at END AS resolved_at
            FROM trades t
            LEFT JOIN markets m ON m.condition_id = t.condition_id
            WHERE t.wallet_address = ? AND t.created_at <= ?
            ORDER BY t.created_at, t.id
            "#,
            TRADE_COLUMNS
        );

        let rows: Vec<HistoryRow> = sqlx::query_as(&sql)
            .bind(cutoff)
            .bind(cutoff)
            .bind(wallet)
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(HistoryEntry::try_from).collect()
    }

    async fn markets_for(
        &self,
        condition_ids: &BTreeSet<String>,
    ) -> Result<HashMap<String, MarketRecord>, DataError> {
        if condition_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let ids: Vec<&str> = condition_ids.iter().map(String::as_str).collect();
        let mut markets = HashMap::with_capacity(ids.len());
        for chunk in ids.chunks(IN_CHUNK) {
            let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(
                "SELECT condition_id, title, category, bet_structure, winning_outcome, resolved_at FROM markets WHERE condition_id IN (",
            );
            let mut separated = query.separated(", ");
            for id in chunk {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");

            let rows: Vec<MarketRow> = query.build_query_as().fetch_all(&self.pool).await?;
            for row in rows {
                let market = MarketRecord::try_from(row)?;
                markets.insert(market.condition_id.clone(), market);
            }
        }

        Ok(markets)
    }
}

#[async_trait]
impl HistoricalDataStore for SqliteStore {
    async fn trades_on_date(
        &self,
        date: NaiveDate,
        basket: &[String],
    ) -> Result<Vec<CandidateTrade>, DataError> {
        match self.coverage().await? {
            Some((first, last)) if date >= first && date <= last => {}
            _ => return Err(DataError::Unavailable(date)),
        }

        if basket.is_empty() {
            return Ok(Vec::new());
        }

        let mut day_trades = Vec::new();
        for chunk in basket.chunks(IN_CHUNK) {
            let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
                "SELECT {} FROM trades t WHERE t.side = 'BUY' AND t.created_at >= ",
                TRADE_COLUMNS
            ));
            query.push_bind(start_of_day(date).timestamp());
            query.push(" AND t.created_at <= ");
            query.push_bind(end_of_day(date).timestamp());
            query.push(" AND t.wallet_address IN (");
            let mut wallets = query.separated(", ");
            for wallet in chunk {
                wallets.push_bind(wallet.as_str());
            }
            wallets.push_unseparated(") ORDER BY t.created_at, t.id");

            let rows: Vec<TradeRow> = query.build_query_as().fetch_all(&self.pool).await?;
            for row in rows {
                day_trades.push(TradeRecord::try_from(row)?);
            }
        }

        let cutoff = end_of_day(date);
        let mut histories = HashMap::new();
        for wallet in day_trades.iter().map(|t| &t.wallet).collect::<BTreeSet<_>>() {
            histories.insert(wallet.clone(), self.history_as_of(wallet, cutoff).await?);
        }

        let condition_ids: BTreeSet<String> =
            day_trades.iter().map(|t| t.condition_id.clone()).collect();
        let markets = self.markets_for(&condition_ids).await?;

        debug!(
            date = %date,
            trades = day_trades.len(),
            wallets = histories.len(),
            "Loaded basket trades"
        );

        Ok(build_candidates(&day_trades, &histories, &markets))
    }

    async fn trader_snapshot(
        &self,
        wallet: &str,
        as_of: DateTime<Utc>,
    ) -> Result<TraderSnapshot, DataError> {
        let history = self.history_as_of(wallet, as_of).await?;
        Ok(MetricsCalculator::trader_snapshot(wallet, as_of, &history))
    }

    async fn trader_universe(&self, as_of: DateTime<Utc>) -> Result<Vec<TraderSnapshot>, DataError> {
        let wallets: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT wallet_address FROM trades WHERE created_at <= ? ORDER BY wallet_address",
        )
        .bind(as_of.timestamp())
        .fetch_all(&self.pool)
        .await?;

        let mut snapshots = Vec::with_capacity(wallets.len());
        for (wallet,) in wallets {
            snapshots.push(self.trader_snapshot(&wallet, as_of).await?);
        }

        Ok(snapshots)
    }

    async fn resolution(
        &self,
        condition_id: &str,
        as_of: DateTime<Utc>,
    ) -> Result<Option<Resolution>, DataError> {
        let row: Option<(String, i64)> = sqlx::query_as(
            r#"
            SELECT winning_outcome, resolved_at FROM markets
            WHERE condition_id = ? AND winning_outcome IS NOT NULL AND resolved_at <= ?
            "#,
        )
        .bind(condition_id)
        .bind(as_of.timestamp())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(winning_outcome, at)| {
            Ok(Resolution {
                resolved_at: timestamp(at)?,
                winning_outcome,
            })
        })
        .transpose()
    }
}
