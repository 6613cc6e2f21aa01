//! Read-only, point-in-time access to historical trades, trader statistics, and
//! market metadata.
//!
//! Every store guarantees that values returned for an instant `t` are computed
//! only from records timestamped at or before `t`.

mod memory;
mod point_in_time;
mod retry;
mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::DataError;
use crate::models::{CandidateTrade, Resolution, TraderSnapshot};

pub use memory::InMemoryStore;
pub use point_in_time::build_candidates;
pub use retry::{with_retry, RetryPolicy};
pub use sqlite::SqliteStore;

/// Point-in-time historical data source.
#[async_trait]
pub trait HistoricalDataStore: Send + Sync {
    /// BUY trades placed on `date` by basket wallets, in timestamp order.
    ///
    /// Fails with `DataError::Unavailable` when the source has no coverage
    /// for `date`.
    async fn trades_on_date(
        &self,
        date: NaiveDate,
        basket: &[String],
    ) -> Result<Vec<CandidateTrade>, DataError>;

    /// A trader's statistics as known at `as_of`.
    async fn trader_snapshot(
        &self,
        wallet: &str,
        as_of: DateTime<Utc>,
    ) -> Result<TraderSnapshot, DataError>;

    /// Snapshots of every trader with activity at or before `as_of`.
    async fn trader_universe(&self, as_of: DateTime<Utc>) -> Result<Vec<TraderSnapshot>, DataError>;

    /// The market's resolution, if it had resolved by `as_of`.
    async fn resolution(
        &self,
        condition_id: &str,
        as_of: DateTime<Utc>,
    ) -> Result<Option<Resolution>, DataError>;
}
