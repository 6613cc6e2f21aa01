//! Polymarket copy-trading backtester
//!
//! Replays imported trade history day by day, copying a fixed basket of
//! traders under configurable filters, selection and sizing rules.

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use polycopy_backtest::backtest::{BacktestConfig, BacktestReport, BacktestRunner};
use polycopy_backtest::data::SqliteStore;
use polycopy_backtest::db::Database;
use polycopy_backtest::models::{MarketRecord, TradeRecord};
use polycopy_backtest::trading::{BasketPolicy, SelectionMethod, SizingMethod};

const IMPORT_BATCH: usize = 1000;

/// Polymarket copy-trading backtester CLI.
#[derive(Parser)]
#[command(name = "polycopy-bt")]
#[command(about = "Backtest copy-trading strategies on historical Polymarket trades", long_about = None)]
struct Cli {
    /// Database URL
    #[arg(
        short,
        long,
        env = "POLYCOPY_DATABASE",
        default_value = "sqlite:./polycopy_backtest.db"
    )]
    database: String,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a backtest against the imported history
    Run(RunArgs),

    /// List stored backtest runs
    Runs {
        /// Maximum number of runs to show
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// Show a stored run
    Show {
        run_id: String,

        /// Also print the trade log
        #[arg(long)]
        trades: bool,
    },

    /// Compare stored runs side by side
    Compare {
        #[arg(required = true, num_args = 2..)]
        run_ids: Vec<String>,
    },

    /// Import historical trades from a JSON-lines file
    ImportTrades { file: PathBuf },

    /// Import market metadata and resolutions from a JSON-lines file
    ImportMarkets { file: PathBuf },

    /// Print the default configuration as JSON
    Config,
}

#[derive(clap::Args)]
struct RunArgs {
    /// JSON config file; flags below override its fields
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// First simulated day (YYYY-MM-DD)
    #[arg(long)]
    start: Option<NaiveDate>,

    /// Last simulated day, inclusive (YYYY-MM-DD)
    #[arg(long)]
    end: Option<NaiveDate>,

    /// Initial capital in USDC
    #[arg(long)]
    capital: Option<Decimal>,

    /// Position sizing (fixed, kelly, proportional, conviction, model)
    #[arg(long)]
    sizing: Option<SizingMethod>,

    /// Trade selection (chronological, random, threshold)
    #[arg(long)]
    selection: Option<SelectionMethod>,

    /// Trader basket (all, top_by_win_rate, top_by_profit, top_by_volume, specific_wallets)
    #[arg(long)]
    basket: Option<BasketPolicy>,

    /// Wallets for the specific_wallets basket
    #[arg(long, value_delimiter = ',')]
    wallets: Vec<String>,

    /// Traders to take for ranked baskets
    #[arg(long)]
    trader_count: Option<usize>,

    /// Maximum trades entered per day
    #[arg(long)]
    max_trades: Option<usize>,

    /// Fraction of capital spendable per day
    #[arg(long)]
    budget_pct: Option<Decimal>,

    /// Seed for random selection and fills
    #[arg(long)]
    seed: Option<u64>,

    /// Strategy label stored with the run
    #[arg(long)]
    strategy: Option<String>,

    /// Description stored with the run
    #[arg(long)]
    description: Option<String>,

    /// Print the trade log after the report
    #[arg(long)]
    trades: bool,

    /// Do not persist the report
    #[arg(long)]
    no_save: bool,
}

impl RunArgs {
    async fn load_config(&self) -> Result<BacktestConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let raw = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("Invalid config {}", path.display()))?
            }
            None => BacktestConfig::default(),
        };

        if let Some(start) = self.start {
            config.start_date = start;
        }
        if let Some(end) = self.end {
            config.end_date = end;
        }
        if let Some(capital) = self.capital {
            config.initial_capital = capital;
        }
        if let Some(sizing) = self.sizing {
            config.sizing_method = sizing;
        }
        if let Some(selection) = self.selection {
            config.selection_method = selection;
        }
        if let Some(basket) = self.basket {
            config.basket_policy = basket;
        }
        if !self.wallets.is_empty() {
            config.wallets = self.wallets.clone();
        }
        if let Some(count) = self.trader_count {
            config.trader_count = count;
        }
        if let Some(max) = self.max_trades {
            config.max_trades_per_day = max;
        }
        if let Some(pct) = self.budget_pct {
            config.daily_budget_pct = pct;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(strategy) = &self.strategy {
            config.strategy_type = strategy.clone();
        }
        if let Some(description) = &self.description {
            config.description = description.clone();
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Initialize database
    let db = Database::new(&cli.database).await?;

    match cli.command {
        Commands::Run(args) => {
            let config = args.load_config().await?;
            let store = Arc::new(SqliteStore::new(db.pool().clone()));
            let runner = BacktestRunner::new(config, store);

            let cancel = runner.cancel_handle();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Ctrl+C received, stopping after the current day");
                    cancel.store(true, Ordering::SeqCst);
                }
            });

            let report = runner.run().await?;
            println!("{}", report);

            if args.trades {
                let mut log = String::new();
                report.write_trade_log(&mut log)?;
                println!("{}", log);
            }

            if !args.no_save {
                db.save_report(&report).await?;
                info!(run_id = %report.run.id, "Saved backtest report");
            }
        }

        Commands::Runs { limit } => {
            let runs = db.list_runs(limit).await?;
            if runs.is_empty() {
                println!("No stored runs. Use 'polycopy-bt run' to create one.");
                return Ok(());
            }

            println!(
                "\n{:<26} {:<10} {:<16} {:<23} {:>12} {:>9} {:>7}",
                "RUN", "STATUS", "STRATEGY", "PERIOD", "FINAL", "RETURN", "TRADES"
            );
            println!("{}", "-".repeat(108));

            for run in runs {
                println!(
                    "{:<26} {:<10} {:<16} {:<23} {:>12} {:>8}% {:>7}",
                    run.id,
                    run.status,
                    truncate(&run.strategy_type, 16),
                    format!("{} to {}", run.start_date, run.end_date),
                    run.final_capital,
                    run.total_return_pct,
                    run.total_trades
                );
            }
        }

        Commands::Show { run_id, trades } => {
            let report = db
                .load_report(&run_id)
                .await?
                .with_context(|| format!("No run with id {}", run_id))?;
            println!("{}", report);

            if trades {
                let mut log = String::new();
                report.write_trade_log(&mut log)?;
                println!("{}", log);
            }
        }

        Commands::Compare { run_ids } => {
            let mut reports = Vec::with_capacity(run_ids.len());
            for id in &run_ids {
                let report = db
                    .load_report(id)
                    .await?
                    .with_context(|| format!("No run with id {}", id))?;
                reports.push(report);
            }
            print_comparison(&reports);
        }

        Commands::ImportTrades { file } => {
            let trades: Vec<TradeRecord> = read_json_lines(&file).await?;
            let mut written = 0;
            for batch in trades.chunks(IMPORT_BATCH) {
                written += db.import_trades(batch).await?;
            }
            println!(
                "Imported {} trades from {} ({} stored)",
                written,
                file.display(),
                db.trade_count().await?
            );
        }

        Commands::ImportMarkets { file } => {
            let markets: Vec<MarketRecord> = read_json_lines(&file).await?;
            let mut written = 0;
            for batch in markets.chunks(IMPORT_BATCH) {
                written += db.import_markets(batch).await?;
            }
            println!("Imported {} markets from {}", written, file.display());
        }

        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&BacktestConfig::default())?);
        }
    }

    Ok(())
}

/// Parse one JSON record per non-empty line.
async fn read_json_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let mut records = Vec::new();
    for (n, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record = serde_json::from_str(line)
            .with_context(|| format!("{}:{}: invalid record", path.display(), n + 1))?;
        records.push(record);
    }

    if records.is_empty() {
        bail!("No records in {}", path.display());
    }
    Ok(records)
}

fn print_comparison(reports: &[BacktestReport]) {
    println!(
        "\n{:<26} {:<10} {:<13} {:<12} {:>9} {:>7} {:>7} {:>8} {:>8} {:>7}",
        "RUN", "STATUS", "SIZING", "SELECTION", "RETURN", "TRADES", "WIN%", "SHARPE", "MAX DD", "PF"
    );
    println!("{}", "-".repeat(115));

    for r in reports {
        let run = &r.run;
        println!(
            "{:<26} {:<10} {:<13} {:<12} {:>8.2}% {:>7} {:>6.1}% {:>8.3} {:>7.2}% {:>7.2}",
            run.id,
            run.status.as_str(),
            r.config.sizing_method.as_str(),
            r.config.selection_method.as_str(),
            run.total_return_pct,
            run.total_trades,
            run.win_rate * 100.0,
            run.sharpe_ratio,
            run.max_drawdown_pct,
            run.profit_factor
        );
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
