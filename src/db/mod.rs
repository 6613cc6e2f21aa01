//! SQLite persistence.
//!
//! Holds two groups of tables:
//! - Imported history (`trades`, `markets`) read by `SqliteStore`
//! - Backtest results (runs, trade logs, equity curves, warnings)
//!
//! Imported history stores timestamps as unix seconds and prices as REAL.
//! Result tables store decimals as TEXT so a loaded report is exactly the
//! report that was saved.

use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::backtest::{BacktestConfig, BacktestReport};
use crate::models::{
    BacktestRun, ConfidenceTier, EquityPoint, ExecutedTrade, MarketRecord, RunStatus, RunWarning,
    SkipReason, TradeOutcome, TradeRecord, WarningKind,
};

/// Database connection pool.
pub struct Database {
    pool: SqlitePool,
}

/// Stored run header, as listed by `list_runs`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredRunSummary {
    pub id: String,
    pub status: String,
    pub strategy_type: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: String,
    pub final_capital: String,
    pub total_return_pct: String,
    pub total_trades: i64,
    pub win_rate: f64,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct StoredRun {
    id: String,
    strategy_type: String,
    description: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    initial_capital: String,
    status: String,
    total_trades: i64,
    winning_trades: i64,
    losing_trades: i64,
    skipped_trades: i64,
    pending_trades: i64,
    win_rate: f64,
    avg_win: String,
    avg_loss: String,
    profit_factor: String,
    total_return_pct: String,
    sharpe_ratio: f64,
    max_drawdown_pct: f64,
    final_capital: String,
    days_simulated: i64,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    error: Option<String>,
    filter_rejections: String,
    config: String,
}

#[derive(Debug, sqlx::FromRow)]
struct StoredTrade {
    trade_id: String,
    wallet: String,
    condition_id: String,
    outcome_label: String,
    entered_at: DateTime<Utc>,
    entry_price: String,
    trader_win_rate: String,
    trader_resolved_trades: i64,
    edge: String,
    trade_size_usd: String,
    confidence: String,
    conviction_z: Option<f64>,
    model_score: Option<f64>,
    market_category: Option<String>,
    bet_structure: Option<String>,
    effective_price: Option<String>,
    position_size_usd: String,
    outcome: String,
    skip_reason: Option<String>,
    resolved_at: Option<DateTime<Utc>>,
    pnl: String,
    capital_after: String,
}

#[derive(Debug, sqlx::FromRow)]
struct StoredEquityPoint {
    date: NaiveDate,
    capital: String,
    daily_pnl: String,
}

#[derive(Debug, sqlx::FromRow)]
struct StoredWarning {
    date: NaiveDate,
    kind: String,
    trade_id: Option<String>,
    message: String,
}

fn dec(value: &str, column: &str) -> Result<Decimal> {
    Decimal::from_str(value).with_context(|| format!("Invalid decimal in {}: {}", column, value))
}

fn real(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

impl StoredRun {
    fn into_run(self, warnings: Vec<RunWarning>) -> Result<BacktestRun> {
        let status = RunStatus::parse(&self.status)
            .ok_or_else(|| anyhow!("Unknown run status {}", self.status))?;
        let profit_factor = f64::from_str(&self.profit_factor)
            .with_context(|| format!("Invalid profit factor {}", self.profit_factor))?;

        Ok(BacktestRun {
            initial_capital: dec(&self.initial_capital, "initial_capital")?,
            avg_win: dec(&self.avg_win, "avg_win")?,
            avg_loss: dec(&self.avg_loss, "avg_loss")?,
            total_return_pct: dec(&self.total_return_pct, "total_return_pct")?,
            final_capital: dec(&self.final_capital, "final_capital")?,
            filter_rejections: serde_json::from_str(&self.filter_rejections)
                .context("Invalid filter rejection counts")?,
            id: self.id,
            strategy_type: self.strategy_type,
            description: self.description,
            start_date: self.start_date,
            end_date: self.end_date,
            status,
            total_trades: self.total_trades as usize,
            winning_trades: self.winning_trades as usize,
            losing_trades: self.losing_trades as usize,
            skipped_trades: self.skipped_trades as usize,
            pending_trades: self.pending_trades as usize,
            win_rate: self.win_rate,
            profit_factor,
            sharpe_ratio: self.sharpe_ratio,
            max_drawdown_pct: self.max_drawdown_pct,
            days_simulated: self.days_simulated as usize,
            started_at: self.started_at,
            completed_at: self.completed_at,
            error: self.error,
            warnings,
        })
    }
}

impl TryFrom<StoredTrade> for ExecutedTrade {
    type Error = anyhow::Error;

    fn try_from(row: StoredTrade) -> Result<Self> {
        let confidence = ConfidenceTier::parse(&row.confidence)
            .ok_or_else(|| anyhow!("Unknown confidence tier {}", row.confidence))?;
        let outcome = TradeOutcome::parse(&row.outcome)
            .ok_or_else(|| anyhow!("Unknown trade outcome {}", row.outcome))?;
        let skip_reason = row
            .skip_reason
            .as_deref()
            .map(|s| SkipReason::parse(s).ok_or_else(|| anyhow!("Unknown skip reason {}", s)))
            .transpose()?;

        Ok(ExecutedTrade {
            entry_price: dec(&row.entry_price, "entry_price")?,
            trader_win_rate: dec(&row.trader_win_rate, "trader_win_rate")?,
            edge: dec(&row.edge, "edge")?,
            trade_size_usd: dec(&row.trade_size_usd, "trade_size_usd")?,
            effective_price: row
                .effective_price
                .as_deref()
                .map(|p| dec(p, "effective_price"))
                .transpose()?,
            position_size_usd: dec(&row.position_size_usd, "position_size_usd")?,
            pnl: dec(&row.pnl, "pnl")?,
            capital_after: dec(&row.capital_after, "capital_after")?,
            trade_id: row.trade_id,
            wallet: row.wallet,
            condition_id: row.condition_id,
            outcome_label: row.outcome_label,
            entered_at: row.entered_at,
            trader_resolved_trades: row.trader_resolved_trades as u32,
            confidence,
            conviction_z: row.conviction_z,
            model_score: row.model_score,
            market_category: row.market_category,
            bet_structure: row.bet_structure,
            outcome,
            skip_reason,
            resolved_at: row.resolved_at,
        })
    }
}

impl Database {
    /// Open (creating if needed) the database and run migrations.
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database URL {}", database_url))?
            .create_if_missing(true);

        // Every connection to :memory: is a separate database
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run all database migrations.
    async fn run_migrations(&self) -> Result<()> {
        // Imported trade history
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trades (
                id TEXT PRIMARY KEY,
                wallet_address TEXT NOT NULL,
                condition_id TEXT NOT NULL,
                outcome TEXT NOT NULL,
                side TEXT NOT NULL CHECK (side IN ('BUY', 'SELL')),
                price REAL NOT NULL,
                size_usd REAL NOT NULL,
                model_score REAL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Market metadata and resolutions
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS markets (
                condition_id TEXT PRIMARY KEY,
                title TEXT NOT NULL DEFAULT '',
                category TEXT,
                bet_structure TEXT,
                winning_outcome TEXT,
                resolved_at INTEGER
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Backtest runs
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS backtest_runs (
                id TEXT PRIMARY KEY,
                strategy_type TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                start_date TEXT NOT NULL,
                end_date TEXT NOT NULL,
                initial_capital TEXT NOT NULL,
                status TEXT NOT NULL,
                total_trades INTEGER NOT NULL DEFAULT 0,
                winning_trades INTEGER NOT NULL DEFAULT 0,
                losing_trades INTEGER NOT NULL DEFAULT 0,
                skipped_trades INTEGER NOT NULL DEFAULT 0,
                pending_trades INTEGER NOT NULL DEFAULT 0,
                win_rate REAL NOT NULL DEFAULT 0,
                avg_win TEXT NOT NULL,
                avg_loss TEXT NOT NULL,
                profit_factor TEXT NOT NULL,
                total_return_pct TEXT NOT NULL,
                sharpe_ratio REAL NOT NULL DEFAULT 0,
                max_drawdown_pct REAL NOT NULL DEFAULT 0,
                final_capital TEXT NOT NULL,
                days_simulated INTEGER NOT NULL DEFAULT 0,
                started_at TEXT NOT NULL,
                completed_at TEXT,
                error TEXT,
                filter_rejections TEXT NOT NULL DEFAULT '{}',
                config TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Per-run trade log
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS backtest_trades (
                run_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                trade_id TEXT NOT NULL,
                wallet TEXT NOT NULL,
                condition_id TEXT NOT NULL,
                outcome_label TEXT NOT NULL,
                entered_at TEXT NOT NULL,
                entry_price TEXT NOT NULL,
                trader_win_rate TEXT NOT NULL,
                trader_resolved_trades INTEGER NOT NULL,
                edge TEXT NOT NULL,
                trade_size_usd TEXT NOT NULL,
                confidence TEXT NOT NULL,
                conviction_z REAL,
                model_score REAL,
                market_category TEXT,
                bet_structure TEXT,
                effective_price TEXT,
                position_size_usd TEXT NOT NULL,
                outcome TEXT NOT NULL,
                skip_reason TEXT,
                resolved_at TEXT,
                pnl TEXT NOT NULL,
                capital_after TEXT NOT NULL,
                PRIMARY KEY (run_id, seq),
                FOREIGN KEY (run_id) REFERENCES backtest_runs(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Per-run equity curve
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS backtest_equity (
                run_id TEXT NOT NULL,
                date TEXT NOT NULL,
                capital TEXT NOT NULL,
                daily_pnl TEXT NOT NULL,
                PRIMARY KEY (run_id, date),
                FOREIGN KEY (run_id) REFERENCES backtest_runs(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Per-run warnings
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS backtest_warnings (
                run_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                date TEXT NOT NULL,
                kind TEXT NOT NULL,
                trade_id TEXT,
                message TEXT NOT NULL,
                PRIMARY KEY (run_id, seq),
                FOREIGN KEY (run_id) REFERENCES backtest_runs(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Indexes
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_trades_wallet_time ON trades(wallet_address, created_at)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_trades_time ON trades(created_at)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_backtest_runs_started ON backtest_runs(started_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ==================== Historical Data ====================

    /// Insert or replace historical trades. Returns the number written.
    pub async fn import_trades(&self, trades: &[TradeRecord]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0;

        for t in trades {
            let result = sqlx::query(
                r#"
                INSERT OR REPLACE INTO trades (
                    id, wallet_address, condition_id, outcome, side,
                    price, size_usd, model_score, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&t.id)
            .bind(&t.wallet)
            .bind(&t.condition_id)
            .bind(&t.outcome)
            .bind(t.side.as_str())
            .bind(real(t.price))
            .bind(real(t.size_usd))
            .bind(t.model_score)
            .bind(t.created_at.timestamp())
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to import trade {}", t.id))?;
            written += result.rows_affected();
        }

        tx.commit().await?;
        info!(trades = written, "Imported trades");
        Ok(written)
    }

    /// Insert or replace market metadata. Returns the number written.
    pub async fn import_markets(&self, markets: &[MarketRecord]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0;

        for m in markets {
            let result = sqlx::query(
                r#"
                INSERT OR REPLACE INTO markets (
                    condition_id, title, category, bet_structure, winning_outcome, resolved_at
                ) VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&m.condition_id)
            .bind(&m.title)
            .bind(&m.category)
            .bind(&m.bet_structure)
            .bind(&m.winning_outcome)
            .bind(m.resolved_at.map(|at| at.timestamp()))
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to import market {}", m.condition_id))?;
            written += result.rows_affected();
        }

        tx.commit().await?;
        info!(markets = written, "Imported markets");
        Ok(written)
    }

    /// Number of imported trades.
    pub async fn trade_count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM trades")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    // ==================== Backtest Results ====================

    /// Persist a finished report, replacing any earlier copy of the run.
    pub async fn save_report(&self, report: &BacktestReport) -> Result<()> {
        let run = &report.run;
        let config = serde_json::to_string(&report.config).context("Failed to encode config")?;
        let rejections =
            serde_json::to_string(&run.filter_rejections).context("Failed to encode rejections")?;

        let mut tx = self.pool.begin().await?;

        for table in ["backtest_trades", "backtest_equity", "backtest_warnings"] {
            sqlx::query(&format!("DELETE FROM {} WHERE run_id = ?", table))
                .bind(&run.id)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO backtest_runs (
                id, strategy_type, description, start_date, end_date, initial_capital, status,
                total_trades, winning_trades, losing_trades, skipped_trades, pending_trades,
                win_rate, avg_win, avg_loss, profit_factor, total_return_pct, sharpe_ratio,
                max_drawdown_pct, final_capital, days_simulated, started_at, completed_at,
                error, filter_rejections, config
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.id)
        .bind(&run.strategy_type)
        .bind(&run.description)
        .bind(run.start_date)
        .bind(run.end_date)
        .bind(run.initial_capital.to_string())
        .bind(run.status.as_str())
        .bind(run.total_trades as i64)
        .bind(run.winning_trades as i64)
        .bind(run.losing_trades as i64)
        .bind(run.skipped_trades as i64)
        .bind(run.pending_trades as i64)
        .bind(run.win_rate)
        .bind(run.avg_win.to_string())
        .bind(run.avg_loss.to_string())
        // TEXT keeps infinity (no losing trades) intact
        .bind(run.profit_factor.to_string())
        .bind(run.total_return_pct.to_string())
        .bind(run.sharpe_ratio)
        .bind(run.max_drawdown_pct)
        .bind(run.final_capital.to_string())
        .bind(run.days_simulated as i64)
        .bind(run.started_at)
        .bind(run.completed_at)
        .bind(&run.error)
        .bind(rejections)
        .bind(config)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to save run {}", run.id))?;

        for (seq, t) in report.trades.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO backtest_trades (
                    run_id, seq, trade_id, wallet, condition_id, outcome_label, entered_at,
                    entry_price, trader_win_rate, trader_resolved_trades, edge, trade_size_usd,
                    confidence, conviction_z, model_score, market_category, bet_structure,
                    effective_price, position_size_usd, outcome, skip_reason, resolved_at,
                    pnl, capital_after
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&run.id)
            .bind(seq as i64)
            .bind(&t.trade_id)
            .bind(&t.wallet)
            .bind(&t.condition_id)
            .bind(&t.outcome_label)
            .bind(t.entered_at)
            .bind(t.entry_price.to_string())
            .bind(t.trader_win_rate.to_string())
            .bind(t.trader_resolved_trades as i64)
            .bind(t.edge.to_string())
            .bind(t.trade_size_usd.to_string())
            .bind(t.confidence.as_str())
            .bind(t.conviction_z)
            .bind(t.model_score)
            .bind(&t.market_category)
            .bind(&t.bet_structure)
            .bind(t.effective_price.map(|p| p.to_string()))
            .bind(t.position_size_usd.to_string())
            .bind(t.outcome.as_str())
            .bind(t.skip_reason.map(|r| r.as_str()))
            .bind(t.resolved_at)
            .bind(t.pnl.to_string())
            .bind(t.capital_after.to_string())
            .execute(&mut *tx)
            .await?;
        }

        for point in &report.equity_curve {
            sqlx::query(
                "INSERT INTO backtest_equity (run_id, date, capital, daily_pnl) VALUES (?, ?, ?, ?)",
            )
            .bind(&run.id)
            .bind(point.date)
            .bind(point.capital.to_string())
            .bind(point.daily_pnl.to_string())
            .execute(&mut *tx)
            .await?;
        }

        for (seq, w) in run.warnings.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO backtest_warnings (run_id, seq, date, kind, trade_id, message)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&run.id)
            .bind(seq as i64)
            .bind(w.date)
            .bind(w.kind.as_str())
            .bind(&w.trade_id)
            .bind(&w.message)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(run_id = %run.id, trades = report.trades.len(), "Saved backtest report");
        Ok(())
    }

    /// Load a stored report by run id.
    pub async fn load_report(&self, run_id: &str) -> Result<Option<BacktestReport>> {
        let Some(stored) = sqlx::query_as::<_, StoredRun>("SELECT * FROM backtest_runs WHERE id = ?")
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch run")?
        else {
            return Ok(None);
        };

        let config: BacktestConfig =
            serde_json::from_str(&stored.config).context("Invalid stored config")?;

        let trades = sqlx::query_as::<_, StoredTrade>(
            "SELECT * FROM backtest_trades WHERE run_id = ? ORDER BY seq",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch trade log")?
        .into_iter()
        .map(ExecutedTrade::try_from)
        .collect::<Result<Vec<_>>>()?;

        let equity_curve = sqlx::query_as::<_, StoredEquityPoint>(
            "SELECT date, capital, daily_pnl FROM backtest_equity WHERE run_id = ? ORDER BY date",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch equity curve")?
        .into_iter()
        .map(|p| {
            Ok(EquityPoint {
                date: p.date,
                capital: dec(&p.capital, "capital")?,
                daily_pnl: dec(&p.daily_pnl, "daily_pnl")?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

        let warnings = sqlx::query_as::<_, StoredWarning>(
            "SELECT date, kind, trade_id, message FROM backtest_warnings WHERE run_id = ? ORDER BY seq",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch warnings")?
        .into_iter()
        .map(|w| {
            Ok(RunWarning {
                kind: WarningKind::parse(&w.kind)
                    .ok_or_else(|| anyhow!("Unknown warning kind {}", w.kind))?,
                date: w.date,
                trade_id: w.trade_id,
                message: w.message,
            })
        })
        .collect::<Result<Vec<_>>>()?;

        Ok(Some(BacktestReport {
            run: stored.into_run(warnings)?,
            config,
            equity_curve,
            trades,
        }))
    }

    /// Most recent runs first.
    pub async fn list_runs(&self, limit: i64) -> Result<Vec<StoredRunSummary>> {
        sqlx::query_as::<_, StoredRunSummary>(
            r#"
            SELECT id, status, strategy_type, start_date, end_date, initial_capital,
                   final_capital, total_return_pct, total_trades, win_rate, started_at
            FROM backtest_runs
            ORDER BY started_at DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list runs")
    }

    /// Get the connection pool (for advanced queries).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::BacktestRunner;
    use crate::data::{InMemoryStore, RetryPolicy};
    use crate::models::TradeSide;
    use crate::trading::BasketPolicy;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    async fn sample_report() -> BacktestReport {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let mut trades = Vec::new();
        let mut markets = Vec::new();
        for i in 0..12i64 {
            let id = format!("m{}", i);
            let created = start + Duration::hours(10 * i);
            trades.push(TradeRecord {
                id: format!("t{}", i),
                wallet: "0xabc".to_string(),
                condition_id: id.clone(),
                outcome: "Yes".to_string(),
                side: TradeSide::Buy,
                price: dec!(0.30),
                size_usd: dec!(25),
                model_score: None,
                created_at: created,
            });
            let winner = if i % 3 == 0 { "No" } else { "Yes" };
            markets.push(MarketRecord {
                winning_outcome: Some(winner.to_string()),
                resolved_at: Some(created + Duration::hours(8)),
                ..MarketRecord::new(id)
            });
        }

        let config = BacktestConfig {
            start_date: NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 3, 6).unwrap(),
            min_resolved_trades: None,
            min_win_rate: None,
            basket_policy: BasketPolicy::SpecificWallets,
            wallets: vec!["0xabc".to_string()],
            description: "round trip".to_string(),
            ..Default::default()
        };

        BacktestRunner::new(config, Arc::new(InMemoryStore::new(trades, markets)))
            .with_retry_policy(RetryPolicy::immediate())
            .run()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_report_round_trip() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let report = sample_report().await;
        assert!(!report.trades.is_empty());

        db.save_report(&report).await.unwrap();
        let loaded = db.load_report(&report.run.id).await.unwrap().unwrap();
        assert_eq!(loaded, report);

        // Saving again replaces rather than duplicates
        db.save_report(&report).await.unwrap();
        let loaded = db.load_report(&report.run.id).await.unwrap().unwrap();
        assert_eq!(loaded.trades.len(), report.trades.len());
    }

    #[tokio::test]
    async fn test_unknown_run_is_none() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        assert!(db.load_report("bt_missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_runs_newest_first() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let mut first = sample_report().await;
        first.run.started_at = Utc::now() - Duration::hours(1);
        let second = sample_report().await;

        db.save_report(&first).await.unwrap();
        db.save_report(&second).await.unwrap();

        let runs = db.list_runs(10).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].id, second.run.id);
        assert_eq!(runs[0].status, "completed");
    }

    #[tokio::test]
    async fn test_import_replaces_by_id() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let trade = TradeRecord {
            id: "t1".to_string(),
            wallet: "0xabc".to_string(),
            condition_id: "m1".to_string(),
            outcome: "No".to_string(),
            side: TradeSide::Sell,
            price: dec!(0.7),
            size_usd: dec!(10),
            model_score: Some(0.4),
            created_at: Utc::now(),
        };

        db.import_trades(&[trade.clone()]).await.unwrap();
        db.import_trades(&[trade]).await.unwrap();
        assert_eq!(db.trade_count().await.unwrap(), 1);
    }
}
