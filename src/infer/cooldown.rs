use serde::{Deserialize, Serialize};

use crate::config::cooldown::{
    LOCKOUT_RATIO, LOCKOUT_SHARE, MEDIAN_OVER_MIN, MIN_MEDIAN_MS, PRICE_GATE_MIN_MOVE,
};
use crate::infer::inventory::pre_trade_states;
use crate::stats;
use crate::types::TradeRecord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CooldownParams {
    pub has_time_cooldown: bool,
    pub cooldown_ms: Option<f64>,
    pub has_price_gate: bool,
    pub price_move_threshold: Option<f64>,
    pub has_inventory_lockout: bool,
    /// Share of trades placed with a pre-trade majority fraction above 0.9.
    pub lockout_share: f64,
}

pub fn cooldown_for(trades: &[&TradeRecord]) -> CooldownParams {
    let diffs: Vec<f64> = trades
        .windows(2)
        .map(|w| (w[1].timestamp_ms - w[0].timestamp_ms) as f64)
        .collect();
    let cooldown_ms = time_cooldown(&diffs);

    let moves: Vec<f64> = trades
        .iter()
        .filter_map(|t| t.features.delta_5s.map(|d| d.side.abs()))
        .collect();
    let price_move_threshold = stats::median(&moves)
        .filter(|m| *m > PRICE_GATE_MIN_MOVE)
        .map(|m| m * 0.5);

    let lopsided = pre_trade_states(trades)
        .iter()
        .filter(|s| s.majority_fraction().is_some_and(|f| f > LOCKOUT_RATIO))
        .count();
    let lockout_share = stats::ratio(lopsided, trades.len());

    CooldownParams {
        has_time_cooldown: cooldown_ms.is_some(),
        cooldown_ms,
        has_price_gate: price_move_threshold.is_some(),
        price_move_threshold,
        has_inventory_lockout: lockout_share > LOCKOUT_SHARE,
        lockout_share,
    }
}

/// Half the median gap, when the median clearly exceeds the minimum gap and
/// a second.
pub fn time_cooldown(diffs_ms: &[f64]) -> Option<f64> {
    let min = stats::percentile(diffs_ms, 0.0)?;
    let median = stats::median(diffs_ms)?;
    (median > MEDIAN_OVER_MIN * min && median > MIN_MEDIAN_MS).then_some(0.5 * median)
}
