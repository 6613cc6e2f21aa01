//! Backtest configuration.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::BacktestError;
use crate::models::ConfidenceTier;
use crate::trading::{BasketPolicy, SelectionMethod, SizingMethod};

/// Immutable input to a backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// Free-form strategy label (e.g., "FOLLOW_WINNERS")
    pub strategy_type: String,

    /// Description stored with the run
    pub description: String,

    /// First simulated day (inclusive)
    pub start_date: NaiveDate,

    /// Last simulated day (inclusive)
    pub end_date: NaiveDate,

    /// Starting capital in USDC
    pub initial_capital: Decimal,

    /// Adverse slippage applied to fills (0.04 = 4%)
    pub slippage_pct: Decimal,

    /// Probability that a sized trade executes (0.0 to 1.0)
    pub fill_rate_pct: f64,

    /// Seed for random selection and fill draws
    pub seed: u64,

    // === Trader qualification ===
    /// Minimum trader win rate; `None` disables the check
    pub min_win_rate: Option<Decimal>,

    /// Minimum resolved trades; `None` disables the check
    pub min_resolved_trades: Option<u32>,

    /// Minimum edge (win rate - entry price); `None` disables the check
    pub min_edge: Option<Decimal>,

    // === Trade filters ===
    /// Entry price lower bound (inclusive)
    pub price_min: Decimal,

    /// Entry price upper bound (exclusive)
    pub price_max: Decimal,

    /// Accepted confidence tiers; empty accepts all
    pub confidence_tiers: Vec<ConfidenceTier>,

    /// Original trade size lower bound in USDC
    pub trade_size_min: Decimal,

    /// Original trade size upper bound in USDC; zero means unbounded
    pub trade_size_max: Decimal,

    pub use_conviction: bool,
    pub min_conviction_z: f64,

    pub use_model_score: bool,
    pub min_model_score: f64,

    /// Accepted market categories; empty accepts all
    pub market_categories: Vec<String>,

    /// Accepted bet structures; empty accepts all
    pub bet_structures: Vec<String>,

    // === Selection ===
    pub max_trades_per_day: usize,
    pub selection_method: SelectionMethod,

    // === Sizing ===
    pub sizing_method: SizingMethod,

    /// Fraction of capital spendable per day (0.0 exclusive to 1.0)
    pub daily_budget_pct: Decimal,

    /// Stake for FIXED sizing; `None` splits the budget over max_trades_per_day
    pub fixed_position_usd: Option<Decimal>,

    /// Fraction of full Kelly (0.25 for quarter Kelly)
    pub kelly_fraction: Decimal,

    /// Smallest stake worth entering in USDC
    pub min_position_usd: Decimal,

    /// Largest stake per trade in USDC; `None` for no cap
    pub max_position_usd: Option<Decimal>,

    // === Basket ===
    pub basket_policy: BasketPolicy,

    /// Traders to take for count-based policies
    pub trader_count: usize,

    /// Resolved trades a trader needs to enter the basket
    pub min_trade_history: u32,

    /// Wallets for `SpecificWallets`
    pub wallets: Vec<String>,

    // === Runtime ===
    /// Days of historical data fetched ahead of the simulation
    pub prefetch_days: usize,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            strategy_type: "FOLLOW_WINNERS".to_string(),
            description: String::new(),
            start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap_or_default(),
            end_date: NaiveDate::from_ymd_opt(2025, 6, 30).unwrap_or_default(),
            initial_capital: dec!(1000),
            slippage_pct: dec!(0.04),       // 4% slippage
            fill_rate_pct: 1.0,
            seed: 42,

            min_win_rate: Some(dec!(0.55)),
            min_resolved_trades: Some(30),
            min_edge: Some(dec!(0.05)),

            price_min: Decimal::ZERO,
            price_max: Decimal::ONE,
            confidence_tiers: Vec::new(),
            trade_size_min: Decimal::ZERO,
            trade_size_max: Decimal::ZERO,
            use_conviction: false,
            min_conviction_z: 0.0,
            use_model_score: false,
            min_model_score: 0.5,
            market_categories: Vec::new(),
            bet_structures: Vec::new(),

            max_trades_per_day: 10,
            selection_method: SelectionMethod::Chronological,

            sizing_method: SizingMethod::Fixed,
            daily_budget_pct: dec!(0.5),    // 10 trades x 5% of capital
            fixed_position_usd: None,
            kelly_fraction: dec!(0.25),     // Quarter Kelly
            min_position_usd: dec!(1),
            max_position_usd: Some(dec!(100)),

            basket_policy: BasketPolicy::All,
            trader_count: 50,
            min_trade_history: 30,
            wallets: Vec::new(),

            prefetch_days: 4,
        }
    }
}

impl BacktestConfig {
    /// Check every invariant before a run starts.
    pub fn validate(&self) -> Result<(), BacktestError> {
        if self.start_date > self.end_date {
            return Err(BacktestError::config(format!(
                "Start date {} is after end date {}",
                self.start_date, self.end_date
            )));
        }
        if self.initial_capital <= Decimal::ZERO {
            return Err(BacktestError::config("Initial capital must be positive"));
        }
        if self.slippage_pct < Decimal::ZERO {
            return Err(BacktestError::config("Slippage cannot be negative"));
        }
        if !(0.0..=1.0).contains(&self.fill_rate_pct) {
            return Err(BacktestError::config(format!(
                "Fill rate {} outside [0, 1]",
                self.fill_rate_pct
            )));
        }

        if self.price_min < Decimal::ZERO || self.price_max > Decimal::ONE {
            return Err(BacktestError::config("Price band must lie within [0, 1]"));
        }
        if self.price_min > self.price_max {
            return Err(BacktestError::config(format!(
                "Inverted price band: {} > {}",
                self.price_min, self.price_max
            )));
        }
        if self.trade_size_min < Decimal::ZERO {
            return Err(BacktestError::config("Trade size minimum cannot be negative"));
        }
        if self.trade_size_max > Decimal::ZERO && self.trade_size_max < self.trade_size_min {
            return Err(BacktestError::config(format!(
                "Inverted trade size band: {} > {}",
                self.trade_size_min, self.trade_size_max
            )));
        }
        if !self.min_conviction_z.is_finite() {
            return Err(BacktestError::config("Conviction floor must be finite"));
        }
        if !(0.0..=1.0).contains(&self.min_model_score) {
            return Err(BacktestError::config("Model score floor outside [0, 1]"));
        }

        if self.max_trades_per_day == 0 {
            return Err(BacktestError::config("max_trades_per_day must be positive"));
        }
        if self.daily_budget_pct <= Decimal::ZERO || self.daily_budget_pct > Decimal::ONE {
            return Err(BacktestError::config(format!(
                "Daily budget {} outside (0, 1]",
                self.daily_budget_pct
            )));
        }
        if self.kelly_fraction <= Decimal::ZERO || self.kelly_fraction > Decimal::ONE {
            return Err(BacktestError::config("Kelly fraction outside (0, 1]"));
        }
        if matches!(self.fixed_position_usd, Some(size) if size <= Decimal::ZERO) {
            return Err(BacktestError::config("Fixed position size must be positive"));
        }
        if self.min_position_usd < Decimal::ZERO {
            return Err(BacktestError::config("Minimum position cannot be negative"));
        }
        if let Some(max) = self.max_position_usd {
            if max <= Decimal::ZERO || max < self.min_position_usd {
                return Err(BacktestError::config(format!(
                    "Maximum position {} below minimum {}",
                    max, self.min_position_usd
                )));
            }
        }

        if self.basket_policy.is_count_based() && self.trader_count == 0 {
            return Err(BacktestError::config("trader_count must be positive"));
        }
        if self.prefetch_days == 0 {
            return Err(BacktestError::config("prefetch_days must be at least 1"));
        }

        Ok(())
    }

    /// Simulated days, start to end inclusive.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start_date
            .iter_days()
            .take_while(move |day| *day <= self.end_date)
    }

    /// Instant the trader basket is frozen at.
    pub fn basket_as_of(&self) -> DateTime<Utc> {
        start_of_day(self.start_date)
    }
}

/// 00:00:00 UTC on `day`.
pub fn start_of_day(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(chrono::NaiveTime::MIN).and_utc()
}

/// Last representable instant of `day`, one nanosecond before the next midnight.
pub fn end_of_day(day: NaiveDate) -> DateTime<Utc> {
    start_of_day(day) + chrono::Duration::days(1) - chrono::Duration::nanoseconds(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(BacktestConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_inverted_dates() {
        let config = BacktestConfig {
            start_date: NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(BacktestError::Configuration(_))));
    }

    #[test]
    fn test_rejects_inverted_price_band() {
        let config = BacktestConfig {
            price_min: dec!(0.6),
            price_max: dec!(0.4),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Inverted price band"));
    }

    #[test]
    fn test_rejects_zero_trader_count_for_ranked_basket() {
        let config = BacktestConfig {
            basket_policy: BasketPolicy::TopByWinRate,
            trader_count: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        // A literal wallet list does not use the count
        let config = BacktestConfig {
            basket_policy: BasketPolicy::SpecificWallets,
            trader_count: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_budget_outside_unit_interval() {
        for pct in [dec!(0), dec!(1.5), dec!(-0.1)] {
            let config = BacktestConfig {
                daily_budget_pct: pct,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "budget {} accepted", pct);
        }

        let config = BacktestConfig {
            daily_budget_pct: dec!(1),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_end_of_day_covers_sub_second_instants() {
        let day = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let late = start_of_day(day) + chrono::Duration::milliseconds(86_399_500);

        assert!(late <= end_of_day(day));
        assert!(end_of_day(day) < start_of_day(day.succ_opt().unwrap()));
        assert_eq!(end_of_day(day).timestamp(), start_of_day(day).timestamp() + 86_399);
    }

    #[test]
    fn test_days_are_inclusive() {
        let config = BacktestConfig {
            start_date: NaiveDate::from_ymd_opt(2025, 1, 30).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 2, 2).unwrap(),
            ..Default::default()
        };
        let days: Vec<_> = config.days().collect();
        assert_eq!(days.len(), 4);
        assert_eq!(days[0], config.start_date);
        assert_eq!(days[3], config.end_date);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: BacktestConfig = serde_json::from_str(
            r#"{"start_date": "2025-03-01", "end_date": "2025-03-31", "sizing_method": "kelly"}"#,
        )
        .unwrap();

        assert_eq!(config.sizing_method, SizingMethod::Kelly);
        assert_eq!(config.initial_capital, dec!(1000));
        assert_eq!(config.max_trades_per_day, 10);
    }
}
