//! Realized-equity portfolio ledger: open stakes, settlements, equity curve.
//!
//! Capital moves only when a position settles on market resolution. Open
//! positions reserve their stake, which is unavailable for new entries until
//! they settle.

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::error::BacktestError;
use crate::metrics::MetricsCalculator;
use crate::models::{
    BacktestRun, CandidateTrade, EquityPoint, ExecutedTrade, Resolution, SkipReason, TradeOutcome,
};

/// An entered position awaiting resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenPosition {
    /// Index of the entry in the trade log
    pub index: usize,
    pub condition_id: String,
}

/// Portfolio state for a single run.
#[derive(Debug, Clone)]
pub struct PortfolioLedger {
    initial_capital: Decimal,
    capital: Decimal,
    committed: Decimal,
    realized_pnl: Decimal,
    day_pnl: Decimal,
    trades: Vec<ExecutedTrade>,
    open: Vec<OpenPosition>,
    equity_curve: Vec<EquityPoint>,
}

impl PortfolioLedger {
    pub fn new(initial_capital: Decimal) -> Self {
        Self {
            initial_capital,
            capital: initial_capital,
            committed: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            day_pnl: Decimal::ZERO,
            trades: Vec::new(),
            open: Vec::new(),
            equity_curve: Vec::new(),
        }
    }

    /// Realized capital.
    pub fn capital(&self) -> Decimal {
        self.capital
    }

    /// Stake reserved by open positions.
    pub fn committed(&self) -> Decimal {
        self.committed
    }

    /// Capital free for new entries.
    pub fn available(&self) -> Decimal {
        self.capital - self.committed
    }

    pub fn trades(&self) -> &[ExecutedTrade] {
        &self.trades
    }

    pub fn open_positions(&self) -> &[OpenPosition] {
        &self.open
    }

    /// Start a simulated day. Returns capital at the start of the day.
    pub fn begin_day(&mut self) -> Decimal {
        self.day_pnl = Decimal::ZERO;
        self.capital
    }

    /// Log a selected trade that was not entered.
    pub fn record_skip(&mut self, candidate: &CandidateTrade, stake: Decimal, reason: SkipReason) {
        self.trades
            .push(ExecutedTrade::skipped(candidate, stake, reason, self.capital));
    }

    /// Enter a filled position.
    pub fn open(
        &mut self,
        candidate: &CandidateTrade,
        stake: Decimal,
        effective_price: Decimal,
    ) -> Result<(), BacktestError> {
        if stake <= Decimal::ZERO {
            return Err(BacktestError::fault(format!(
                "Non-positive stake {} for {}",
                stake, candidate.trade_id
            )));
        }
        if stake > self.available() {
            return Err(BacktestError::fault(format!(
                "Stake {} for {} exceeds available capital {}",
                stake,
                candidate.trade_id,
                self.available()
            )));
        }
        if effective_price <= Decimal::ZERO || effective_price >= Decimal::ONE {
            return Err(BacktestError::fault(format!(
                "Effective price {} for {} outside (0, 1)",
                effective_price, candidate.trade_id
            )));
        }

        let mut entry = ExecutedTrade::from_candidate(candidate, stake, self.capital);
        entry.effective_price = Some(effective_price);

        self.open.push(OpenPosition {
            index: self.trades.len(),
            condition_id: candidate.condition_id.clone(),
        });
        self.trades.push(entry);
        self.committed += stake;

        Ok(())
    }

    /// Settle the open position at `index` against its market's resolution.
    ///
    /// Returns the realized P&L.
    pub fn settle(&mut self, index: usize, resolution: &Resolution) -> Result<Decimal, BacktestError> {
        let Some(slot) = self.open.iter().position(|p| p.index == index) else {
            return Err(BacktestError::fault(format!("No open position at log index {}", index)));
        };
        let Some(entry) = self.trades.get_mut(index) else {
            return Err(BacktestError::fault(format!("Trade log has no entry {}", index)));
        };
        let Some(price) = entry.effective_price else {
            return Err(BacktestError::fault(format!("Open position {} was never filled", entry.trade_id)));
        };

        let won = entry.outcome_label.eq_ignore_ascii_case(&resolution.winning_outcome);
        let pnl = MetricsCalculator::binary_pnl(entry.position_size_usd, price, won);

        self.capital += pnl;
        self.committed -= entry.position_size_usd;
        self.realized_pnl += pnl;
        self.day_pnl += pnl;

        entry.outcome = if won { TradeOutcome::Won } else { TradeOutcome::Lost };
        entry.resolved_at = Some(resolution.resolved_at);
        entry.pnl = pnl;
        entry.capital_after = self.capital;

        self.open.remove(slot);

        if self.capital < Decimal::ZERO {
            return Err(BacktestError::fault(format!(
                "Capital went negative ({}) settling {}",
                self.capital, entry.trade_id
            )));
        }

        Ok(pnl)
    }

    /// Close a simulated day, appending its equity point.
    ///
    /// Fails if capital no longer equals initial capital plus the realized
    /// P&L of the trade log.
    pub fn close_day(&mut self, date: NaiveDate) -> Result<EquityPoint, BacktestError> {
        let logged: Decimal = self
            .trades
            .iter()
            .filter(|t| t.outcome.is_resolved())
            .map(|t| t.pnl)
            .sum();

        if self.capital != self.initial_capital + logged || logged != self.realized_pnl {
            return Err(BacktestError::fault(format!(
                "Capital {} does not trace to initial {} plus realized {}",
                self.capital, self.initial_capital, logged
            )));
        }

        let point = EquityPoint {
            date,
            capital: self.capital,
            daily_pnl: self.day_pnl,
        };
        self.equity_curve.push(point.clone());
        Ok(point)
    }

    /// Fill the summary statistics of `run` from the ledger.
    pub fn summarize(&self, run: &mut BacktestRun) {
        let winners: Vec<&ExecutedTrade> = self
            .trades
            .iter()
            .filter(|t| t.outcome == TradeOutcome::Won)
            .collect();
        let losers: Vec<&ExecutedTrade> = self
            .trades
            .iter()
            .filter(|t| t.outcome == TradeOutcome::Lost)
            .collect();

        run.winning_trades = winners.len();
        run.losing_trades = losers.len();
        run.total_trades = winners.len() + losers.len();
        run.skipped_trades = self.count(TradeOutcome::Skipped);
        run.pending_trades = self.count(TradeOutcome::Pending);

        run.win_rate = if run.total_trades > 0 {
            winners.len() as f64 / run.total_trades as f64
        } else {
            0.0
        };

        let gross_profit: Decimal = winners.iter().map(|t| t.pnl).sum();
        let gross_loss: Decimal = losers.iter().map(|t| t.pnl.abs()).sum();

        run.avg_win = if winners.is_empty() {
            Decimal::ZERO
        } else {
            gross_profit / Decimal::from(winners.len())
        };
        run.avg_loss = if losers.is_empty() {
            Decimal::ZERO
        } else {
            gross_loss / Decimal::from(losers.len())
        };
        run.profit_factor = if gross_loss > Decimal::ZERO {
            gross_profit.to_f64().unwrap_or(0.0) / gross_loss.to_f64().unwrap_or(1.0)
        } else if gross_profit > Decimal::ZERO {
            f64::INFINITY
        } else {
            0.0
        };

        run.final_capital = self.capital;
        run.total_return_pct = if self.initial_capital > Decimal::ZERO {
            ((self.capital - self.initial_capital) / self.initial_capital * Decimal::ONE_HUNDRED)
                .round_dp(4)
        } else {
            Decimal::ZERO
        };
        run.sharpe_ratio = MetricsCalculator::sharpe_ratio(self.initial_capital, &self.equity_curve);
        run.max_drawdown_pct = MetricsCalculator::max_drawdown_pct(self.initial_capital, &self.equity_curve);
        run.days_simulated = self.equity_curve.len();
    }

    fn count(&self, outcome: TradeOutcome) -> usize {
        self.trades.iter().filter(|t| t.outcome == outcome).count()
    }

    /// Consume the ledger into its logs.
    pub fn into_logs(self) -> (Vec<EquityPoint>, Vec<ExecutedTrade>) {
        (self.equity_curve, self.trades)
    }
}
