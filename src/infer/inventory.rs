use serde::{Deserialize, Serialize};

use crate::config::inventory::{DEFAULT_REBALANCE_RATIO, REBALANCE_TRIGGER};
use crate::stats;
use crate::types::{InventoryState, TradeRecord};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryParams {
    /// Median majority fraction at which the trader bought the minority side.
    pub rebalance_ratio: f64,
    pub rebalance_events: usize,
    pub max_up_shares: f64,
    pub max_down_shares: f64,
    pub max_total_shares: f64,
}

/// Inventory held just before each trade, replaying from flat.
pub fn pre_trade_states(trades: &[&TradeRecord]) -> Vec<InventoryState> {
    let mut inv = InventoryState::default();
    trades
        .iter()
        .map(|t| {
            let before = inv;
            inv.apply(t.side, t.shares);
            before
        })
        .collect()
}

/// Inventory held just after each trade, going flat whenever the gap to the
/// previous trade exceeds `inactivity_ms`.
pub fn post_trade_states_with_resets(trades: &[&TradeRecord], inactivity_ms: i64) -> Vec<InventoryState> {
    let mut inv = InventoryState::default();
    let mut last_ts: Option<i64> = None;
    trades
        .iter()
        .map(|t| {
            if last_ts.is_some_and(|prev| t.timestamp_ms - prev > inactivity_ms) {
                inv.reset();
            }
            last_ts = Some(t.timestamp_ms);
            inv.apply(t.side, t.shares);
            inv
        })
        .collect()
}

pub fn inventory_for(trades: &[&TradeRecord]) -> InventoryParams {
    let mut inv = InventoryState::default();
    let mut max_up: f64 = 0.0;
    let mut max_down: f64 = 0.0;
    let mut max_total: f64 = 0.0;
    let mut event_ratios = Vec::new();

    for trade in trades {
        if let (Some(majority), Some(minority)) = (inv.majority_fraction(), inv.minority_side()) {
            if majority > REBALANCE_TRIGGER && trade.side == minority {
                event_ratios.push(majority);
            }
        }
        inv.apply(trade.side, trade.shares);
        max_up = max_up.max(inv.shares_up);
        max_down = max_down.max(inv.shares_down);
        max_total = max_total.max(inv.total());
    }

    InventoryParams {
        rebalance_ratio: stats::median(&event_ratios).unwrap_or(DEFAULT_REBALANCE_RATIO),
        rebalance_events: event_ratios.len(),
        max_up_shares: max_up,
        max_down_shares: max_down,
        max_total_shares: max_total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Bot, Side};

    fn trade(ts: i64, side: Side, shares: f64) -> TradeRecord {
        TradeRecord::new(ts, "BTC_1h", Bot::Watch, side, shares, 0.5, 0.5, None)
    }

    #[test]
    fn rebalance_is_a_minority_buy_past_trigger() {
        let trades = [
            trade(0, Side::Up, 8.0),
            trade(1_000, Side::Down, 2.0), // 100% UP before: event at 1.0
            trade(2_000, Side::Down, 2.0), // 80% UP before: event at 0.8
            trade(3_000, Side::Up, 1.0),
        ];
        let refs: Vec<&TradeRecord> = trades.iter().collect();
        let p = inventory_for(&refs);
        assert_eq!(p.rebalance_events, 2);
        assert!((p.rebalance_ratio - 0.9).abs() < 1e-12);
        assert_eq!(p.max_up_shares, 9.0);
        assert_eq!(p.max_down_shares, 4.0);
        assert_eq!(p.max_total_shares, 13.0);
    }

    #[test]
    fn no_events_uses_default_ratio() {
        let trades = [trade(0, Side::Up, 1.0), trade(1_000, Side::Down, 1.0)];
        let refs: Vec<&TradeRecord> = trades.iter().collect();
        assert_eq!(inventory_for(&refs).rebalance_ratio, DEFAULT_REBALANCE_RATIO);
    }

    #[test]
    fn replays_differ_by_reset_and_offset() {
        let trades = [trade(0, Side::Up, 2.0), trade(10_000, Side::Down, 3.0), trade(20_000, Side::Up, 1.0)];
        let refs: Vec<&TradeRecord> = trades.iter().collect();
        let pre = pre_trade_states(&refs);
        assert_eq!(pre[0].total(), 0.0);
        assert_eq!(pre[2].total(), 5.0);

        let post = post_trade_states_with_resets(&refs, 5_000);
        let totals: Vec<f64> = post.iter().map(InventoryState::total).collect();
        assert_eq!(totals, vec![2.0, 3.0, 1.0]);
    }
}
