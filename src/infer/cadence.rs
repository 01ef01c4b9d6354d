use serde::{Deserialize, Serialize};

use crate::stats;
use crate::types::TradeRecord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CadenceParams {
    pub min_inter_trade_ms: f64,
    pub median_inter_trade_ms: f64,
    pub p95_inter_trade_ms: f64,
    /// Most trades in any `[t, t+1s)` window anchored at a trade.
    pub max_trades_per_sec: usize,
    pub max_trades_per_min: usize,
}

pub fn cadence_for(trades: &[&TradeRecord]) -> Option<CadenceParams> {
    let timestamps: Vec<i64> = trades.iter().map(|t| t.timestamp_ms).collect();
    cadence_from_timestamps(&timestamps)
}

/// Needs at least two (sorted) timestamps.
pub fn cadence_from_timestamps(timestamps: &[i64]) -> Option<CadenceParams> {
    if timestamps.len() < 2 {
        return None;
    }
    let diffs: Vec<f64> = timestamps.windows(2).map(|w| (w[1] - w[0]) as f64).collect();

    Some(CadenceParams {
        min_inter_trade_ms: stats::percentile(&diffs, 0.0)?,
        median_inter_trade_ms: stats::median(&diffs)?,
        p95_inter_trade_ms: stats::percentile(&diffs, 95.0)?,
        max_trades_per_sec: max_in_window(timestamps, 1_000),
        max_trades_per_min: max_in_window(timestamps, 60_000),
    })
}

fn max_in_window(timestamps: &[i64], window_ms: i64) -> usize {
    timestamps
        .iter()
        .enumerate()
        .map(|(i, &start)| timestamps[i..].partition_point(|&t| t < start + window_ms))
        .max()
        .unwrap_or(0)
}
