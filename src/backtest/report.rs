//! Backtest output: the run summary plus its full logs.

use std::fmt;

use rust_decimal::Decimal;

use super::BacktestConfig;
use crate::models::{BacktestRun, EquityPoint, ExecutedTrade, TradeOutcome};

/// Everything a run produced, persisted and retrievable by run id.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestReport {
    pub run: BacktestRun,
    pub config: BacktestConfig,
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<ExecutedTrade>,
}

impl BacktestReport {
    /// Trades that settled WON or LOST.
    pub fn resolved_trades(&self) -> impl Iterator<Item = &ExecutedTrade> {
        self.trades.iter().filter(|t| t.outcome.is_resolved())
    }

    /// Total stake of entered positions.
    pub fn total_staked(&self) -> Decimal {
        self.trades
            .iter()
            .filter(|t| t.outcome != TradeOutcome::Skipped)
            .map(|t| t.position_size_usd)
            .sum()
    }

    /// Write the trade log as a fixed-width table.
    pub fn write_trade_log(&self, f: &mut impl fmt::Write) -> fmt::Result {
        writeln!(
            f,
            "{:<20} {:<12} {:>7} {:>7} {:>9} {:<10} {:>10}",
            "Entered", "Wallet", "Price", "Fill", "Stake", "Outcome", "P&L"
        )?;
        for t in &self.trades {
            let fill = t
                .effective_price
                .map(|p| format!("{:.3}", p))
                .unwrap_or_else(|| "-".to_string());
            let outcome = match t.skip_reason {
                Some(reason) => reason.as_str().to_string(),
                None => t.outcome.as_str().to_string(),
            };
            writeln!(
                f,
                "{:<20} {:<12} {:>7.3} {:>7} {:>9.2} {:<10} {:>10.2}",
                t.entered_at.format("%Y-%m-%d %H:%M"),
                short_wallet(&t.wallet),
                t.entry_price,
                fill,
                t.position_size_usd,
                outcome,
                t.pnl
            )?;
        }
        Ok(())
    }
}

fn short_wallet(wallet: &str) -> String {
    let chars: Vec<char> = wallet.chars().collect();
    if chars.len() > 10 {
        let head: String = chars[..6].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}..{}", head, tail)
    } else {
        wallet.to_string()
    }
}

impl fmt::Display for BacktestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let run = &self.run;

        writeln!(f, "\n{:=^60}", " BACKTEST RESULTS ")?;
        writeln!(f)?;
        writeln!(f, "Run:         {} ({})", run.id, run.status.as_str())?;
        writeln!(f, "Strategy:    {}", run.strategy_type)?;
        writeln!(f, "Period:      {} to {} ({} days simulated)", run.start_date, run.end_date, run.days_simulated)?;
        writeln!(
            f,
            "Rules:       {} selection, {} sizing, {}% daily budget",
            self.config.selection_method.as_str(),
            self.config.sizing_method.as_str(),
            self.config.daily_budget_pct * Decimal::ONE_HUNDRED
        )?;
        if let Some(error) = &run.error {
            writeln!(f, "Error:       {}", error)?;
        }
        writeln!(f)?;
        writeln!(f, "--- Capital ---")?;
        writeln!(f, "Initial:     ${:.2}", run.initial_capital)?;
        writeln!(f, "Final:       ${:.2}", run.final_capital)?;
        writeln!(f, "Return:      {:.2}%", run.total_return_pct)?;
        writeln!(f, "Staked:      ${:.2}", self.total_staked())?;
        writeln!(f)?;
        writeln!(f, "--- Trades ---")?;
        writeln!(
            f,
            "Resolved:    {} ({} pending, {} skipped)",
            run.total_trades, run.pending_trades, run.skipped_trades
        )?;
        writeln!(f, "Winners:     {} ({:.1}%)", run.winning_trades, run.win_rate * 100.0)?;
        writeln!(f, "Losers:      {}", run.losing_trades)?;
        writeln!(f, "Avg Win:     ${:.2}", run.avg_win)?;
        writeln!(f, "Avg Loss:    ${:.2}", run.avg_loss)?;
        writeln!(f, "Profit Factor: {:.2}", run.profit_factor)?;
        writeln!(f)?;
        writeln!(f, "--- Risk Metrics ---")?;
        writeln!(f, "Max Drawdown: {:.2}%", run.max_drawdown_pct)?;
        writeln!(f, "Sharpe Ratio: {:.3} (daily, unannualized)", run.sharpe_ratio)?;

        if !run.filter_rejections.is_empty() {
            writeln!(f)?;
            writeln!(f, "--- Filter Rejections ---")?;
            for (reason, count) in &run.filter_rejections {
                writeln!(f, "{:<16} {}", reason, count)?;
            }
        }

        if !run.warnings.is_empty() {
            writeln!(f)?;
            writeln!(f, "--- Warnings ({}) ---", run.warnings.len())?;
            for w in run.warnings.iter().take(10) {
                writeln!(f, "{} [{}] {}", w.date, w.kind.as_str(), w.message)?;
            }
            if run.warnings.len() > 10 {
                writeln!(f, "... and {} more", run.warnings.len() - 10)?;
            }
        }

        writeln!(f, "{:=^60}", "")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CandidateTrade, ConfidenceTier, SkipReason};
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn report() -> BacktestReport {
        let config = BacktestConfig::default();
        let run = BacktestRun::new(
            "bt_20250101_000000_abcdef".to_string(),
            config.strategy_type.clone(),
            String::new(),
            config.start_date,
            config.end_date,
            config.initial_capital,
        );
        let candidate = CandidateTrade {
            trade_id: "t1".to_string(),
            wallet: "0x1234567890abcdef".to_string(),
            condition_id: "0xc".to_string(),
            outcome: "Yes".to_string(),
            timestamp: Utc.with_ymd_and_hms(2025, 1, 2, 9, 30, 0).unwrap(),
            entry_price: dec!(0.25),
            trader_win_rate: dec!(0.6),
            trader_resolved_trades: 40,
            edge: dec!(0.35),
            trade_size_usd: dec!(80),
            confidence: ConfidenceTier::Medium,
            conviction_z: None,
            model_score: None,
            market_category: None,
            bet_structure: None,
        };

        BacktestReport {
            run,
            config,
            equity_curve: Vec::new(),
            trades: vec![ExecutedTrade::skipped(
                &candidate,
                Decimal::ZERO,
                SkipReason::InsufficientBudget,
                dec!(1000),
            )],
        }
    }

    #[test]
    fn test_display_includes_summary_and_errors() {
        let mut report = report();
        report.run.error = Some("Simulation fault: boom".to_string());

        let text = report.to_string();
        assert!(text.contains("BACKTEST RESULTS"));
        assert!(text.contains("bt_20250101_000000_abcdef (pending)"));
        assert!(text.contains("Simulation fault: boom"));
        assert!(report.resolved_trades().next().is_none());
        assert_eq!(report.total_staked(), Decimal::ZERO);
    }

    #[test]
    fn test_trade_log_shows_skip_reason() {
        let mut log = String::new();
        report().write_trade_log(&mut log).unwrap();

        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("2025-01-02 09:30"));
        assert!(lines[1].contains("0x1234..cdef"));
        assert!(lines[1].contains("insufficient_budget"));
    }

    #[test]
    fn test_short_wallet_counts_characters() {
        assert_eq!(short_wallet("0x1234567890abcdef"), "0x1234..cdef");
        assert_eq!(short_wallet("0xaéééééééé"), "0xaééé..éééé");
        assert_eq!(short_wallet("wälléts"), "wälléts");
    }
}
