use serde::{Deserialize, Serialize};

use crate::config::unwind::{DROP_RATIO, EARLY_SHARE, START_RATIO};
use crate::infer::inventory::post_trade_states_with_resets;
use crate::infer::reset::inactivity_threshold_ms;
use crate::types::TradeRecord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnwindParams {
    pub has_unwind: bool,
    pub unwind_start_ratio: Option<f64>,
    pub early_max_inventory: f64,
    pub late_min_inventory: f64,
}

/// Compare peak inventory over the first 80% of trades with the trough over
/// the last 20%, replaying with the market's inactivity resets.
pub fn unwind_for(market: &str, trades: &[&TradeRecord]) -> Option<UnwindParams> {
    let totals: Vec<f64> = post_trade_states_with_resets(trades, inactivity_threshold_ms(market))
        .iter()
        .map(|s| s.total())
        .collect();
    let split = ((totals.len() as f64) * EARLY_SHARE).floor() as usize;
    if split == 0 || split >= totals.len() {
        return None;
    }
    let early_max_inventory = totals[..split].iter().copied().fold(0.0, f64::max);
    let late_min_inventory = totals[split..].iter().copied().fold(f64::INFINITY, f64::min);
    let has_unwind = early_max_inventory > 0.0 && late_min_inventory < DROP_RATIO * early_max_inventory;

    Some(UnwindParams {
        has_unwind,
        unwind_start_ratio: has_unwind.then_some(START_RATIO),
        early_max_inventory,
        late_min_inventory,
    })
}
