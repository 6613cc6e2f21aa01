//! Calculator for point-in-time trader statistics and run performance: win rate,
//! conviction, Sharpe ratio, max drawdown.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use statrs::statistics::Statistics;

use crate::models::{EquityPoint, HistoryEntry, TradeSide, TraderSnapshot};

/// Conviction z-scores beyond this magnitude are treated as bad data.
const MAX_CONVICTION_Z: f64 = 10.0;

/// Calculator for trader and run statistics.
pub struct MetricsCalculator;

impl MetricsCalculator {
    /// Compute a trader's statistics as known at `as_of`.
    ///
    /// Entries created after `as_of`, and resolutions after `as_of`, are ignored
    /// even if the caller passed them in.
    pub fn trader_snapshot(
        wallet: &str,
        as_of: DateTime<Utc>,
        history: &[HistoryEntry],
    ) -> TraderSnapshot {
        let mut snapshot = TraderSnapshot::empty(wallet, as_of);

        for entry in history {
            let trade = &entry.trade;
            if trade.wallet != wallet || trade.created_at > as_of {
                continue;
            }

            snapshot.total_volume += trade.size_usd;

            if trade.side != TradeSide::Buy {
                continue;
            }

            let Some(resolution) = entry.resolution.as_ref().filter(|r| r.resolved_at <= as_of)
            else {
                continue;
            };

            let won = trade.is_winner(&resolution.winning_outcome);
            snapshot.resolved_trades += 1;
            if won {
                snapshot.winning_trades += 1;
            }
            snapshot.total_profit += Self::binary_pnl(trade.size_usd, trade.price, won);
        }

        if snapshot.resolved_trades > 0 {
            snapshot.win_rate =
                Decimal::from(snapshot.winning_trades) / Decimal::from(snapshot.resolved_trades);
        }

        snapshot
    }

    /// P&L of a binary-outcome position: a winner pays $1 per share.
    pub fn binary_pnl(stake: Decimal, price: Decimal, won: bool) -> Decimal {
        if !won {
            return -stake;
        }
        if price <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        stake * (Decimal::ONE / price - Decimal::ONE)
    }

    /// Conviction z-score of a trade size against the trader's earlier sizes.
    ///
    /// Needs at least two earlier trades with some spread.
    pub fn conviction_z(size: Decimal, prior_sizes: &[Decimal]) -> Option<f64> {
        if prior_sizes.len() < 2 {
            return None;
        }

        let sizes: Vec<f64> = prior_sizes.iter().filter_map(|s| s.to_f64()).collect();
        if sizes.len() < 2 {
            return None;
        }

        let mean = sizes.clone().mean();
        let std_dev = sizes.std_dev();
        if std_dev.is_nan() || std_dev <= 0.0 {
            return None;
        }

        let z = (size.to_f64()? - mean) / std_dev;
        (z.is_finite() && z.abs() <= MAX_CONVICTION_Z).then_some(z)
    }

    /// Day-over-day returns, with `initial_capital` as the day-zero value.
    pub fn daily_returns(initial_capital: Decimal, curve: &[EquityPoint]) -> Vec<f64> {
        let mut values = Vec::with_capacity(curve.len() + 1);
        values.push(initial_capital.to_f64().unwrap_or(0.0));
        values.extend(curve.iter().map(|p| p.capital.to_f64().unwrap_or(0.0)));

        values
            .windows(2)
            .filter_map(|w| (w[0] > 0.0).then(|| (w[1] - w[0]) / w[0]))
            .collect()
    }

    /// Unannualized Sharpe ratio: mean / stddev of daily returns.
    pub fn sharpe_ratio(initial_capital: Decimal, curve: &[EquityPoint]) -> f64 {
        let returns = Self::daily_returns(initial_capital, curve);
        if returns.len() < 2 {
            return 0.0;
        }

        let mean = returns.clone().mean();
        let std_dev = returns.std_dev();

        if std_dev > 0.0 {
            mean / std_dev
        } else {
            0.0
        }
    }

    /// Largest peak-to-trough decline of the curve, in percent.
    pub fn max_drawdown_pct(initial_capital: Decimal, curve: &[EquityPoint]) -> f64 {
        let mut peak = initial_capital;
        let mut max_dd = 0.0f64;

        for point in curve {
            if point.capital > peak {
                peak = point.capital;
            }

            if peak > Decimal::ZERO {
                let dd = ((peak - point.capital) / peak).to_f64().unwrap_or(0.0);
                if dd > max_dd {
                    max_dd = dd;
                }
            }
        }

        max_dd * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Resolution, TradeRecord};
    use chrono::{Duration, NaiveDate, TimeZone};
    use rust_decimal_macros::dec;

    fn entry(
        id: &str,
        price: Decimal,
        created_at: DateTime<Utc>,
        resolved: Option<(DateTime<Utc>, &str)>,
    ) -> HistoryEntry {
        HistoryEntry {
            trade: TradeRecord {
                id: id.to_string(),
                wallet: "0xw".to_string(),
                condition_id: format!("0x{}", id),
                outcome: "Yes".to_string(),
                side: TradeSide::Buy,
                price,
                size_usd: dec!(10),
                model_score: None,
                created_at,
            },
            resolution: resolved.map(|(at, winner)| Resolution {
                resolved_at: at,
                winning_outcome: winner.to_string(),
            }),
        }
    }

    fn point(day: u32, capital: Decimal) -> EquityPoint {
        EquityPoint {
            date: NaiveDate::from_ymd_opt(2025, 1, day).unwrap(),
            capital,
            daily_pnl: Decimal::ZERO,
        }
    }

    #[test]
    fn test_snapshot_ignores_future_resolutions() {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let history = vec![
            entry("a", dec!(0.5), t0, Some((t0 + Duration::days(1), "Yes"))),
            entry("b", dec!(0.5), t0, Some((t0 + Duration::days(2), "No"))),
            entry("c", dec!(0.5), t0, Some((t0 + Duration::days(10), "Yes"))),
            // Created after the as-of instant
            entry("d", dec!(0.5), t0 + Duration::days(5), Some((t0 + Duration::days(6), "Yes"))),
        ];

        let as_of = t0 + Duration::days(3);
        let snapshot = MetricsCalculator::trader_snapshot("0xw", as_of, &history);

        assert_eq!(snapshot.resolved_trades, 2);
        assert_eq!(snapshot.winning_trades, 1);
        assert_eq!(snapshot.win_rate, dec!(0.5));
        // +10 on the winner at 0.5, -10 on the loser
        assert_eq!(snapshot.total_profit, Decimal::ZERO);
        assert_eq!(snapshot.total_volume, dec!(30));
    }

    #[test]
    fn test_binary_pnl() {
        assert_eq!(MetricsCalculator::binary_pnl(dec!(100), dec!(0.25), true), dec!(300));
        assert_eq!(MetricsCalculator::binary_pnl(dec!(100), dec!(0.25), false), dec!(-100));
        assert_eq!(MetricsCalculator::binary_pnl(dec!(100), dec!(0), true), Decimal::ZERO);
    }

    #[test]
    fn test_conviction_z() {
        let prior = vec![dec!(10), dec!(20), dec!(30)];
        // mean 20, sample stddev 10
        let z = MetricsCalculator::conviction_z(dec!(40), &prior).unwrap();
        assert!((z - 2.0).abs() < 1e-9);

        assert!(MetricsCalculator::conviction_z(dec!(40), &[dec!(10)]).is_none());
        assert!(MetricsCalculator::conviction_z(dec!(40), &[dec!(10), dec!(10)]).is_none());
        // Far outside the sanity bound
        assert!(MetricsCalculator::conviction_z(dec!(100000), &prior).is_none());
    }

    #[test]
    fn test_max_drawdown() {
        let curve = vec![
            point(1, dec!(1100)),
            point(2, dec!(1500)),
            point(3, dec!(1000)),
            point(4, dec!(1200)),
        ];

        let dd = MetricsCalculator::max_drawdown_pct(dec!(1000), &curve);
        // (1500 - 1000) / 1500
        assert!((dd - 33.333).abs() < 0.01);
    }

    #[test]
    fn test_sharpe_flat_curve_is_zero() {
        let curve = vec![point(1, dec!(1000)), point(2, dec!(1000)), point(3, dec!(1000))];
        assert_eq!(MetricsCalculator::sharpe_ratio(dec!(1000), &curve), 0.0);
    }

    #[test]
    fn test_sharpe_positive_for_rising_curve() {
        let curve = vec![point(1, dec!(1010)), point(2, dec!(1030)), point(3, dec!(1040))];
        let sharpe = MetricsCalculator::sharpe_ratio(dec!(1000), &curve);
        assert!(sharpe > 0.0);
    }
}
