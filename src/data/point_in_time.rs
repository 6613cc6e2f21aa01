//! Candidate assembly shared by all stores.

use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::metrics::MetricsCalculator;
use crate::models::{
    CandidateTrade, ConfidenceTier, HistoryEntry, MarketRecord, TradeRecord, TradeSide,
};

/// Enrich a day's raw trades with each trader's state at the moment of the trade.
///
/// `histories` maps wallet to that wallet's history; entries later than a
/// given trade are never consulted for it.
pub fn build_candidates(
    day_trades: &[TradeRecord],
    histories: &HashMap<String, Vec<HistoryEntry>>,
    markets: &HashMap<String, MarketRecord>,
) -> Vec<CandidateTrade> {
    let empty = Vec::new();

    let mut trades: Vec<&TradeRecord> = day_trades
        .iter()
        .filter(|t| t.side == TradeSide::Buy)
        .collect();
    trades.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.wallet.cmp(&b.wallet))
            .then_with(|| a.id.cmp(&b.id))
    });

    trades
        .into_iter()
        .map(|trade| {
            let history = histories.get(&trade.wallet).unwrap_or(&empty);
            let snapshot = MetricsCalculator::trader_snapshot(&trade.wallet, trade.created_at, history);

            let prior_sizes: Vec<Decimal> = history
                .iter()
                .filter(|e| e.trade.side == TradeSide::Buy && e.trade.created_at < trade.created_at)
                .map(|e| e.trade.size_usd)
                .collect();

            let market = markets.get(&trade.condition_id);

            CandidateTrade {
                trade_id: trade.id.clone(),
                wallet: trade.wallet.clone(),
                condition_id: trade.condition_id.clone(),
                outcome: trade.outcome.clone(),
                timestamp: trade.created_at,
                entry_price: trade.price,
                trader_win_rate: snapshot.win_rate,
                trader_resolved_trades: snapshot.resolved_trades,
                edge: snapshot.win_rate - trade.price,
                trade_size_usd: trade.size_usd,
                confidence: ConfidenceTier::from_resolved_count(snapshot.resolved_trades),
                conviction_z: MetricsCalculator::conviction_z(trade.size_usd, &prior_sizes),
                model_score: trade.model_score,
                market_category: market.and_then(|m| m.category.clone()),
                bet_structure: market.and_then(|m| m.bet_structure.clone()),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Resolution;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn trade(id: &str, side: TradeSide, size: Decimal, at: DateTime<Utc>) -> TradeRecord {
        TradeRecord {
            id: id.to_string(),
            wallet: "0xw".to_string(),
            condition_id: format!("m-{}", id),
            outcome: "Yes".to_string(),
            side,
            price: dec!(0.40),
            size_usd: size,
            model_score: Some(0.7),
            created_at: at,
        }
    }

    #[test]
    fn test_candidates_use_state_at_trade_time() {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 10, 12, 0, 0).unwrap();

        let past = [
            (trade("p1", TradeSide::Buy, dec!(10), t0 - Duration::days(3)), true),
            (trade("p2", TradeSide::Buy, dec!(20), t0 - Duration::days(2)), false),
        ];
        let mut history: Vec<HistoryEntry> = past
            .iter()
            .map(|(t, won)| HistoryEntry {
                trade: t.clone(),
                resolution: Some(Resolution {
                    resolved_at: t.created_at + Duration::hours(1),
                    winning_outcome: if *won { "Yes" } else { "No" }.to_string(),
                }),
            })
            .collect();

        let today_early = trade("d1", TradeSide::Buy, dec!(30), t0);
        let today_sell = trade("d2", TradeSide::Sell, dec!(30), t0 + Duration::hours(1));
        history.push(HistoryEntry { trade: today_early.clone(), resolution: None });

        let histories = HashMap::from([("0xw".to_string(), history)]);
        let markets = HashMap::from([(
            "m-d1".to_string(),
            MarketRecord {
                category: Some("sports".to_string()),
                ..MarketRecord::new("m-d1")
            },
        )]);

        let candidates = build_candidates(&[today_sell, today_early], &histories, &markets);

        // SELL trades are not candidates
        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert_eq!(c.trade_id, "d1");
        assert_eq!(c.trader_resolved_trades, 2);
        assert_eq!(c.trader_win_rate, dec!(0.5));
        assert_eq!(c.edge, dec!(0.10));
        assert_eq!(c.market_category.as_deref(), Some("sports"));
        // 30 against prior sizes 10 and 20
        let z = c.conviction_z.unwrap();
        assert!((z - 2.1213).abs() < 0.001);
    }
}
