//! Day-by-day backtest runner.
//!
//! Days are simulated strictly in order. Historical fetches for upcoming days
//! may run ahead of the simulation, but their results are buffered and applied
//! in date order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use super::config::end_of_day;
use super::{BacktestConfig, BacktestReport, PortfolioLedger};
use crate::data::{with_retry, HistoricalDataStore, RetryPolicy};
use crate::error::{BacktestError, DataError};
use crate::models::{BacktestRun, CandidateTrade, RunStatus, RunWarning, SkipReason, WarningKind};
use crate::trading::{
    FillSimulator, FilterStats, PositionSizer, SizingOutcome, TradeFilterPipeline, TradeSelector,
    TraderBasketSelector,
};

/// Mutable state of a run in progress. Survives a failed or cancelled
/// simulation so partial results can be reported.
struct RunState {
    run: BacktestRun,
    ledger: PortfolioLedger,
    stats: FilterStats,
    rng: ChaCha8Rng,
}

/// Executes one backtest against a historical data store.
pub struct BacktestRunner {
    config: BacktestConfig,
    store: Arc<dyn HistoricalDataStore>,
    retry: RetryPolicy,
    cancel: Arc<AtomicBool>,
    pipeline: TradeFilterPipeline,
    selector: TradeSelector,
    sizer: PositionSizer,
    fills: FillSimulator,
}

impl BacktestRunner {
    pub fn new(config: BacktestConfig, store: Arc<dyn HistoricalDataStore>) -> Self {
        Self {
            pipeline: TradeFilterPipeline::from_config(&config),
            selector: TradeSelector::new(config.selection_method, config.max_trades_per_day),
            sizer: PositionSizer::from_config(&config),
            fills: FillSimulator::new(config.fill_rate_pct, config.slippage_pct),
            config,
            store,
            retry: RetryPolicy::default(),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Share an existing cancellation flag.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Handle that cancels the run at the next day boundary when set.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Run the backtest to a terminal status.
    ///
    /// Only an invalid configuration returns `Err`; failed and cancelled runs
    /// return a report carrying their partial logs.
    pub async fn run(&self) -> Result<BacktestReport, BacktestError> {
        self.config.validate()?;

        let mut run = BacktestRun::new(
            BacktestRun::generate_id(Utc::now()),
            self.config.strategy_type.clone(),
            self.config.description.clone(),
            self.config.start_date,
            self.config.end_date,
            self.config.initial_capital,
        );
        run.transition(RunStatus::Running)?;

        info!(
            run_id = %run.id,
            start = %self.config.start_date,
            end = %self.config.end_date,
            capital = %self.config.initial_capital,
            "Starting backtest"
        );

        let mut state = RunState {
            run,
            ledger: PortfolioLedger::new(self.config.initial_capital),
            stats: FilterStats::default(),
            rng: ChaCha8Rng::seed_from_u64(self.config.seed),
        };

        let outcome = self.simulate(&mut state).await;

        let RunState {
            mut run,
            ledger,
            stats,
            ..
        } = state;

        ledger.summarize(&mut run);
        run.filter_rejections = stats.by_key();

        match outcome {
            Ok(()) => {
                run.transition(RunStatus::Completed)?;
                info!(
                    run_id = %run.id,
                    trades = run.total_trades,
                    final_capital = %run.final_capital,
                    return_pct = %run.total_return_pct,
                    "Backtest completed"
                );
            }
            Err(BacktestError::Cancelled) => {
                run.transition(RunStatus::Cancelled)?;
                info!(run_id = %run.id, days = run.days_simulated, "Backtest cancelled");
            }
            Err(e) => {
                error!(run_id = %run.id, error = %e, "Backtest failed");
                run.error = Some(e.to_string());
                run.transition(RunStatus::Failed)?;
            }
        }

        let (equity_curve, trades) = ledger.into_logs();
        Ok(BacktestReport {
            run,
            config: self.config.clone(),
            equity_curve,
            trades,
        })
    }

    async fn simulate(&self, state: &mut RunState) -> Result<(), BacktestError> {
        let as_of = self.config.basket_as_of();
        let basket_selector = TraderBasketSelector::from_config(&self.config);
        let basket = with_retry(&self.retry, "basket selection", || {
            basket_selector.select(self.store.as_ref(), as_of)
        })
        .await?;

        if basket.is_empty() {
            warn!("Trader basket is empty; no trades will be copied");
        }

        let basket = Arc::new(basket);
        let days: Vec<NaiveDate> = self.config.days().collect();

        let fetches = stream::iter(days).map(|day| {
            let store = self.store.clone();
            let basket = basket.clone();
            let retry = self.retry.clone();
            async move {
                let trades = with_retry(&retry, "trades_on_date", || {
                    store.trades_on_date(day, basket.as_slice())
                })
                .await;
                (day, trades)
            }
        });
        let mut fetches = fetches.buffered(self.config.prefetch_days);

        loop {
            if self.cancel.load(Ordering::SeqCst) {
                return Err(BacktestError::Cancelled);
            }

            let Some((day, fetched)) = fetches.next().await else {
                break;
            };

            let candidates = match fetched {
                Ok(candidates) => candidates,
                Err(DataError::Unavailable(date)) => {
                    let message = BacktestError::DataUnavailable(date).to_string();
                    warn!(date = %date, "No historical data, treating as zero candidates");
                    state.run.warnings.push(RunWarning {
                        date,
                        kind: WarningKind::DataUnavailable,
                        trade_id: None,
                        message,
                    });
                    Vec::new()
                }
                Err(e) => return Err(e.into()),
            };

            self.simulate_day(state, day, candidates).await?;
        }

        Ok(())
    }

    async fn simulate_day(
        &self,
        state: &mut RunState,
        day: NaiveDate,
        candidates: Vec<CandidateTrade>,
    ) -> Result<(), BacktestError> {
        let day_capital = state.ledger.begin_day();
        let day_budget = day_capital * self.config.daily_budget_pct;
        let mut remaining = day_budget;

        let fetched = candidates.len();
        let accepted = self.pipeline.apply(candidates, &mut state.stats);
        let selected = self.selector.select(accepted, &mut state.rng);
        let proposals = self.sizer.propose(&selected, day_capital, day_budget);

        let mut entered = 0usize;
        for (candidate, proposal) in selected.iter().zip(proposals) {
            if let SizingOutcome::FellBackTo { method, reason } = &proposal.outcome {
                warn!(
                    date = %day,
                    trade = %candidate.trade_id,
                    method = method.as_str(),
                    reason = %reason,
                    "Sizing fell back"
                );
                state.run.warnings.push(RunWarning {
                    date: day,
                    kind: WarningKind::SizingFallback,
                    trade_id: Some(candidate.trade_id.clone()),
                    message: format!(
                        "{} sizing fell back to {}: {}",
                        self.sizer.method().as_str(),
                        method.as_str(),
                        reason
                    ),
                });
            }

            if proposal.stake <= Decimal::ZERO {
                debug!(date = %day, trade = %candidate.trade_id, "Sized to zero");
                state
                    .ledger
                    .record_skip(candidate, Decimal::ZERO, SkipReason::ZeroStake);
                continue;
            }

            let stake = self
                .sizer
                .clamp(proposal.stake, remaining, state.ledger.available());
            if stake.is_zero() {
                debug!(date = %day, trade = %candidate.trade_id, remaining = %remaining, "Insufficient budget");
                state
                    .ledger
                    .record_skip(candidate, Decimal::ZERO, SkipReason::InsufficientBudget);
                continue;
            }

            // Budget is spent at sizing, filled or not
            remaining -= stake;
            if remaining < Decimal::ZERO {
                return Err(BacktestError::fault(format!(
                    "Daily budget overspent on {} by {}",
                    day, -remaining
                )));
            }

            match self.fills.simulate(candidate.entry_price, &mut state.rng) {
                Some(price) => {
                    state.ledger.open(candidate, stake, price)?;
                    entered += 1;
                }
                None => state.ledger.record_skip(candidate, stake, SkipReason::NotFilled),
            }
        }

        let settled = self.settle_open_positions(state, day).await?;
        let point = state.ledger.close_day(day)?;

        debug!(
            date = %day,
            candidates = fetched,
            selected = selected.len(),
            entered,
            settled,
            spent = %(day_budget - remaining),
            capital = %point.capital,
            "Simulated day"
        );

        Ok(())
    }

    /// Settle every open position whose market resolved by the end of `day`.
    async fn settle_open_positions(
        &self,
        state: &mut RunState,
        day: NaiveDate,
    ) -> Result<usize, BacktestError> {
        let cutoff = end_of_day(day);
        let open = state.ledger.open_positions().to_vec();
        let mut settled = 0;

        for position in open {
            let resolution = with_retry(&self.retry, "resolution", || {
                self.store.resolution(&position.condition_id, cutoff)
            })
            .await?;

            if let Some(resolution) = resolution {
                state.ledger.settle(position.index, &resolution)?;
                settled += 1;
            }
        }

        Ok(settled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::InMemoryStore;
    use crate::models::{
        MarketRecord, Resolution, TradeOutcome, TradeRecord, TradeSide, TraderSnapshot,
    };
    use crate::trading::{BasketPolicy, SelectionMethod, SizingMethod};
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone};
    use rust_decimal_macros::dec;

    const WALLET: &str = "0xtrader";

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    fn at(d: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, d, hour, 0, 0).unwrap()
    }

    fn buy(id: &str, market: &str, price: Decimal, created_at: DateTime<Utc>) -> TradeRecord {
        TradeRecord {
            id: id.to_string(),
            wallet: WALLET.to_string(),
            condition_id: market.to_string(),
            outcome: "Yes".to_string(),
            side: TradeSide::Buy,
            price,
            size_usd: dec!(100),
            model_score: None,
            created_at,
        }
    }

    fn market(id: &str, winner: &str, resolved_at: DateTime<Utc>) -> MarketRecord {
        MarketRecord {
            winning_outcome: Some(winner.to_string()),
            resolved_at: Some(resolved_at),
            ..MarketRecord::new(id)
        }
    }

    /// Twenty resolved trades in May: 15 winners, a 0.75 win rate by June.
    fn track_record() -> (Vec<TradeRecord>, Vec<MarketRecord>) {
        let mut trades = Vec::new();
        let mut markets = Vec::new();
        for i in 0..20u32 {
            let created = Utc.with_ymd_and_hms(2025, 5, 1 + i, 12, 0, 0).unwrap();
            let id = format!("hist-{}", i);
            trades.push(buy(&id, &id, dec!(0.50), created));
            let winner = if i < 15 { "Yes" } else { "No" };
            markets.push(market(&id, winner, created + Duration::hours(6)));
        }
        (trades, markets)
    }

    fn config(start: u32, end: u32) -> BacktestConfig {
        BacktestConfig {
            start_date: day(start),
            end_date: day(end),
            initial_capital: dec!(1000),
            min_resolved_trades: Some(10),
            min_trade_history: 10,
            basket_policy: BasketPolicy::SpecificWallets,
            wallets: vec![WALLET.to_string()],
            ..Default::default()
        }
    }

    fn runner(config: BacktestConfig, store: impl HistoricalDataStore + 'static) -> BacktestRunner {
        BacktestRunner::new(config, Arc::new(store)).with_retry_policy(RetryPolicy::immediate())
    }

    #[tokio::test]
    async fn test_only_in_band_trade_reaches_selection() {
        let (mut trades, mut markets) = track_record();
        trades.push(buy("cheap", "m-cheap", dec!(0.05), at(2, 10)));
        trades.push(buy("mid", "m-mid", dec!(0.25), at(3, 10)));
        trades.push(buy("rich", "m-rich", dec!(0.60), at(4, 10)));
        markets.push(market("m-mid", "Yes", at(5, 10)));

        let config = BacktestConfig {
            price_min: dec!(0.10),
            price_max: dec!(0.40),
            min_edge: Some(dec!(0.05)),
            ..config(1, 6)
        };

        let report = runner(config, InMemoryStore::new(trades, markets)).run().await.unwrap();

        assert_eq!(report.run.status, RunStatus::Completed);
        assert_eq!(report.trades.len(), 1);
        assert_eq!(report.trades[0].trade_id, "mid");
        assert_eq!(report.trades[0].outcome, TradeOutcome::Won);
        assert_eq!(report.run.filter_rejections.get("price_band"), Some(&2));
        assert_eq!(report.equity_curve.len(), 6);
    }

    #[tokio::test]
    async fn test_slippage_scenario_fills_at_exact_price() {
        let (mut trades, markets) = track_record();
        trades.push(buy("t1", "m-open", dec!(0.50), at(2, 9)));

        let config = BacktestConfig {
            fill_rate_pct: 1.0,
            slippage_pct: dec!(0.04),
            min_edge: None,
            ..config(2, 2)
        };

        let report = runner(config, InMemoryStore::new(trades, markets)).run().await.unwrap();
        assert_eq!(report.trades[0].effective_price, Some(dec!(0.52)));
        assert_eq!(report.trades[0].outcome, TradeOutcome::Pending);
        assert_eq!(report.run.pending_trades, 1);
        // Unrealized positions do not move capital
        assert_eq!(report.run.final_capital, dec!(1000));
    }

    #[tokio::test]
    async fn test_exhausted_budget_skips_second_trade() {
        let (mut trades, markets) = track_record();
        trades.push(buy("first", "m-1", dec!(0.30), at(2, 9)));
        trades.push(buy("second", "m-2", dec!(0.30), at(2, 11)));

        let config = BacktestConfig {
            daily_budget_pct: dec!(0.1),
            fixed_position_usd: Some(dec!(100)),
            selection_method: SelectionMethod::Chronological,
            ..config(2, 2)
        };

        let report = runner(config, InMemoryStore::new(trades, markets)).run().await.unwrap();

        assert_eq!(report.run.status, RunStatus::Completed);
        assert_eq!(report.trades.len(), 2);
        assert_eq!(report.trades[0].position_size_usd, dec!(100));
        assert_eq!(report.trades[1].outcome, TradeOutcome::Skipped);
        assert_eq!(report.trades[1].skip_reason, Some(SkipReason::InsufficientBudget));
    }

    #[tokio::test]
    async fn test_fixed_sizing_spends_exactly_n_times_s() {
        let (mut trades, markets) = track_record();
        for (i, hour) in [9, 10, 11, 12].into_iter().enumerate() {
            trades.push(buy(&format!("t{}", i), &format!("m{}", i), dec!(0.30), at(2, hour)));
        }

        let config = BacktestConfig {
            daily_budget_pct: dec!(0.5),
            fixed_position_usd: Some(dec!(40)),
            ..config(2, 2)
        };

        let report = runner(config, InMemoryStore::new(trades, markets)).run().await.unwrap();
        assert_eq!(report.trades.len(), 4);
        assert_eq!(report.total_staked(), dec!(160));
    }

    #[tokio::test]
    async fn test_kelly_stakes_stay_within_bounds() {
        let (mut trades, mut markets) = track_record();
        for d in 2..6u32 {
            for (i, price) in [dec!(0.20), dec!(0.45), dec!(0.60)].into_iter().enumerate() {
                let id = format!("k{}-{}", d, i);
                trades.push(buy(&id, &id, price, at(d, 9 + i as u32)));
                let winner = if i == 1 { "No" } else { "Yes" };
                markets.push(market(&id, winner, at(d, 20)));
            }
        }

        let config = BacktestConfig {
            sizing_method: SizingMethod::Kelly,
            daily_budget_pct: dec!(0.3),
            max_position_usd: None,
            min_edge: None,
            ..config(2, 5)
        };

        let report = runner(config.clone(), InMemoryStore::new(trades, markets))
            .run()
            .await
            .unwrap();
        assert_eq!(report.run.status, RunStatus::Completed);

        let mut capital = config.initial_capital;
        for point in &report.equity_curve {
            let day_start = capital;
            let spent: Decimal = report
                .trades
                .iter()
                .filter(|t| t.entered_at.date_naive() == point.date)
                .map(|t| {
                    let kelly_cap = day_start * dec!(0.25) * t.edge.max(Decimal::ZERO)
                        / (Decimal::ONE - t.entry_price);
                    assert!(t.position_size_usd <= kelly_cap, "{} over Kelly", t.trade_id);
                    t.position_size_usd
                })
                .sum();
            assert!(spent <= day_start * config.daily_budget_pct);
            capital = point.capital;
        }
    }

    #[tokio::test]
    async fn test_future_trades_never_leak_into_stats() {
        let (mut trades, mut markets) = track_record();
        trades.push(buy("today", "m-today", dec!(0.40), at(2, 9)));
        // Forty more winners after the run ends would push the win rate up
        for i in 0..40u32 {
            let id = format!("future-{}", i);
            trades.push(buy(&id, &id, dec!(0.50), at(20, 1) + Duration::minutes(i as i64)));
            markets.push(market(&id, "Yes", at(21, 1)));
        }

        let config = BacktestConfig {
            min_edge: None,
            ..config(2, 2)
        };

        let report = runner(config, InMemoryStore::new(trades, markets)).run().await.unwrap();
        let entry = &report.trades[0];
        assert_eq!(entry.trader_resolved_trades, 20);
        assert_eq!(entry.trader_win_rate, dec!(0.75));
    }

    #[tokio::test]
    async fn test_random_selection_reproduces_trade_log() {
        let (mut trades, mut markets) = track_record();
        for d in 2..8u32 {
            for i in 0..6u32 {
                let id = format!("r{}-{}", d, i);
                trades.push(buy(&id, &id, dec!(0.35), at(d, 8 + i)));
                markets.push(market(&id, if i % 2 == 0 { "Yes" } else { "No" }, at(d, 23)));
            }
        }

        let config = BacktestConfig {
            selection_method: SelectionMethod::Random,
            max_trades_per_day: 3,
            fill_rate_pct: 0.7,
            seed: 1234,
            ..config(2, 7)
        };

        let store = InMemoryStore::new(trades, markets);
        let first = runner(config.clone(), store.clone()).run().await.unwrap();
        let second = runner(config, store).run().await.unwrap();

        assert_ne!(first.run.id, second.run.id);
        assert_eq!(first.trades, second.trades);
        assert_eq!(first.equity_curve, second.equity_curve);
        assert!(first.trades.len() <= 6 * 3);
    }

    #[tokio::test]
    async fn test_data_gaps_are_warnings() {
        let (trades, markets) = track_record();
        let store = InMemoryStore::new(trades, markets).mark_unavailable(day(3));

        let report = runner(config(2, 4), store).run().await.unwrap();
        assert_eq!(report.run.status, RunStatus::Completed);
        assert_eq!(report.equity_curve.len(), 3);
        assert_eq!(report.run.warnings.len(), 1);
        assert_eq!(report.run.warnings[0].kind, WarningKind::DataUnavailable);
    }

    #[tokio::test]
    async fn test_conviction_sizing_without_scores_warns() {
        let (mut trades, markets) = track_record();
        trades.push(buy("t1", "m-1", dec!(0.30), at(2, 9)));

        let config = BacktestConfig {
            sizing_method: SizingMethod::Conviction,
            use_conviction: false,
            ..config(2, 2)
        };

        let report = runner(config, InMemoryStore::new(trades, markets)).run().await.unwrap();
        assert_eq!(report.run.warnings.len(), 1);
        assert_eq!(report.run.warnings[0].kind, WarningKind::SizingFallback);
        assert_eq!(report.run.warnings[0].trade_id.as_deref(), Some("t1"));
        // FIXED fallback: 1000 * 0.5 / 10
        assert_eq!(report.trades[0].position_size_usd, dec!(50));
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected_before_running() {
        let config = BacktestConfig {
            price_min: dec!(0.5),
            price_max: dec!(0.2),
            ..config(2, 4)
        };

        let result = runner(config, InMemoryStore::default()).run().await;
        assert!(matches!(result, Err(BacktestError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_zero_priced_trade_never_reaches_the_ledger() {
        let (mut trades, markets) = track_record();
        trades.push(buy("ok", "m-ok", dec!(0.30), at(2, 9)));
        trades.push(buy("free", "m-free", dec!(0), at(3, 9)));

        let report = runner(config(2, 5), InMemoryStore::new(trades, markets)).run().await.unwrap();

        assert_eq!(report.run.status, RunStatus::Completed);
        assert!(report.run.error.is_none());
        assert_eq!(report.equity_curve.len(), 4);
        assert_eq!(report.trades.len(), 1);
        assert_eq!(report.trades[0].trade_id, "ok");
        assert_eq!(report.run.filter_rejections.get("price_band"), Some(&1));
    }

    #[tokio::test]
    async fn test_resolution_in_last_second_of_end_date_settles() {
        let (mut trades, mut markets) = track_record();
        trades.push(buy("late", "m-late", dec!(0.30), at(2, 9)));
        let last_second = at(2, 23) + Duration::minutes(59) + Duration::seconds(59);
        markets.push(market("m-late", "Yes", last_second + Duration::milliseconds(500)));

        let report = runner(config(2, 2), InMemoryStore::new(trades, markets)).run().await.unwrap();

        assert_eq!(report.trades[0].outcome, TradeOutcome::Won);
        assert_eq!(report.run.pending_trades, 0);
        assert!(report.run.final_capital > dec!(1000));
    }

    #[tokio::test]
    async fn test_zero_weight_trade_is_not_a_budget_skip() {
        let (mut trades, markets) = track_record();
        trades.push(buy("edge", "m-edge", dec!(0.30), at(2, 9)));
        // 0.75 win rate against a 0.90 price
        trades.push(buy("no-edge", "m-no-edge", dec!(0.90), at(2, 10)));

        let config = BacktestConfig {
            sizing_method: SizingMethod::Proportional,
            min_edge: None,
            max_position_usd: Some(dec!(100)),
            ..config(2, 2)
        };

        let report = runner(config, InMemoryStore::new(trades, markets)).run().await.unwrap();

        let entered = report.trades.iter().find(|t| t.trade_id == "edge").unwrap();
        assert_eq!(entered.position_size_usd, dec!(100));

        let skipped = report.trades.iter().find(|t| t.trade_id == "no-edge").unwrap();
        assert_eq!(skipped.outcome, TradeOutcome::Skipped);
        assert_eq!(skipped.skip_reason, Some(SkipReason::ZeroStake));
        assert_eq!(skipped.position_size_usd, Decimal::ZERO);
    }

    /// Store that raises the cancel flag while serving a given day.
    struct CancellingStore {
        inner: InMemoryStore,
        cancel_on: NaiveDate,
        flag: Arc<AtomicBool>,
    }

    #[async_trait]
    impl HistoricalDataStore for CancellingStore {
        async fn trades_on_date(
            &self,
            date: NaiveDate,
            basket: &[String],
        ) -> Result<Vec<CandidateTrade>, DataError> {
            if date == self.cancel_on {
                self.flag.store(true, Ordering::SeqCst);
            }
            self.inner.trades_on_date(date, basket).await
        }

        async fn trader_snapshot(
            &self,
            wallet: &str,
            as_of: DateTime<Utc>,
        ) -> Result<TraderSnapshot, DataError> {
            self.inner.trader_snapshot(wallet, as_of).await
        }

        async fn trader_universe(
            &self,
            as_of: DateTime<Utc>,
        ) -> Result<Vec<TraderSnapshot>, DataError> {
            self.inner.trader_universe(as_of).await
        }

        async fn resolution(
            &self,
            condition_id: &str,
            as_of: DateTime<Utc>,
        ) -> Result<Option<Resolution>, DataError> {
            self.inner.resolution(condition_id, as_of).await
        }
    }

    /// Store whose trade query fails permanently from a given day.
    struct BrokenStore {
        inner: InMemoryStore,
        broken_from: NaiveDate,
    }

    #[async_trait]
    impl HistoricalDataStore for BrokenStore {
        async fn trades_on_date(
            &self,
            date: NaiveDate,
            basket: &[String],
        ) -> Result<Vec<CandidateTrade>, DataError> {
            if date >= self.broken_from {
                return Err(DataError::Backend("database disk image is malformed".to_string()));
            }
            self.inner.trades_on_date(date, basket).await
        }

        async fn trader_snapshot(
            &self,
            wallet: &str,
            as_of: DateTime<Utc>,
        ) -> Result<TraderSnapshot, DataError> {
            self.inner.trader_snapshot(wallet, as_of).await
        }

        async fn trader_universe(
            &self,
            as_of: DateTime<Utc>,
        ) -> Result<Vec<TraderSnapshot>, DataError> {
            self.inner.trader_universe(as_of).await
        }

        async fn resolution(
            &self,
            condition_id: &str,
            as_of: DateTime<Utc>,
        ) -> Result<Option<Resolution>, DataError> {
            self.inner.resolution(condition_id, as_of).await
        }
    }

    #[tokio::test]
    async fn test_backend_error_fails_with_partial_logs() {
        let (mut trades, markets) = track_record();
        trades.push(buy("ok", "m-ok", dec!(0.30), at(2, 9)));
        let store = BrokenStore {
            inner: InMemoryStore::new(trades, markets),
            broken_from: day(3),
        };

        let report = runner(config(2, 5), store).run().await.unwrap();

        assert_eq!(report.run.status, RunStatus::Failed);
        assert!(report.run.error.as_deref().unwrap_or("").contains("malformed"));
        assert!(report.run.completed_at.is_some());
        // Day 2 completed before the failure
        assert_eq!(report.equity_curve.len(), 1);
        assert_eq!(report.trades[0].trade_id, "ok");
    }

    #[tokio::test]
    async fn test_cancel_keeps_processed_days() {
        let (mut trades, mut markets) = track_record();
        trades.push(buy("t1", "m-1", dec!(0.30), at(2, 9)));
        markets.push(market("m-1", "Yes", at(3, 9)));

        let flag = Arc::new(AtomicBool::new(false));
        let store = CancellingStore {
            inner: InMemoryStore::new(trades, markets),
            cancel_on: day(4),
            flag: flag.clone(),
        };

        let config = BacktestConfig {
            prefetch_days: 1,
            ..config(2, 10)
        };
        let runner = runner(config, store).with_cancel_flag(flag);

        let report = runner.run().await.unwrap();
        assert_eq!(report.run.status, RunStatus::Cancelled);

        let days: Vec<NaiveDate> = report.equity_curve.iter().map(|p| p.date).collect();
        assert_eq!(days, vec![day(2), day(3), day(4)]);
        assert_eq!(report.trades[0].outcome, TradeOutcome::Won);
        assert!(report.run.completed_at.is_some());
    }

    #[test]
    fn test_cancel_handle_is_shared() {
        let runner = BacktestRunner::new(config(2, 3), Arc::new(InMemoryStore::default()));
        let handle = runner.cancel_handle();
        handle.store(true, Ordering::SeqCst);

        let report = tokio_test::assert_ok!(tokio_test::block_on(runner.run()));
        assert_eq!(report.run.status, RunStatus::Cancelled);
        assert!(report.equity_curve.is_empty());
    }
}
