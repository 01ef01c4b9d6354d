use std::collections::HashMap;

use crate::types::{Side, TapeRow};

/// Per-market tape sorted by timestamp, for nearest / as-of lookups.
///
/// All lookups are binary searches over the market's snapshot vector, so the
/// feature engineer and the replay never scan the whole tape per trade.
#[derive(Debug, Default)]
pub struct TapeIndex {
    markets: HashMap<String, Vec<TapeRow>>,
}

impl TapeIndex {
    pub fn new(tape: &[TapeRow]) -> Self {
        let mut markets: HashMap<String, Vec<TapeRow>> = HashMap::new();
        for row in tape {
            markets.entry(row.market.clone()).or_default().push(row.clone());
        }
        for rows in markets.values_mut() {
            rows.sort_by_key(|r| r.timestamp_ms);
        }
        Self { markets }
    }

    pub fn rows(&self, market: &str) -> &[TapeRow] {
        self.markets.get(market).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn market_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.markets.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Snapshot closest to `ts`, ties going to the earlier one. None when the
    /// closest snapshot is more than `max_gap_ms` away.
    pub fn nearest(&self, market: &str, ts: i64, max_gap_ms: i64) -> Option<&TapeRow> {
        let rows = self.rows(market);
        if rows.is_empty() {
            return None;
        }
        let idx = rows.partition_point(|r| r.timestamp_ms < ts);
        let before = idx.checked_sub(1).map(|i| &rows[i]);
        let after = rows.get(idx);
        let best = match (before, after) {
            (Some(b), Some(a)) => {
                if (ts - b.timestamp_ms) <= (a.timestamp_ms - ts) {
                    b
                } else {
                    a
                }
            }
            (Some(b), None) => b,
            (None, Some(a)) => a,
            (None, None) => return None,
        };
        if (best.timestamp_ms - ts).abs() > max_gap_ms {
            return None;
        }
        Some(best)
    }

    /// Latest snapshot at or before `ts`.
    pub fn at_or_before(&self, market: &str, ts: i64) -> Option<&TapeRow> {
        let rows = self.rows(market);
        let idx = rows.partition_point(|r| r.timestamp_ms <= ts);
        idx.checked_sub(1).map(|i| &rows[i])
    }

    /// Snapshots with `start <= timestamp <= end`.
    pub fn range(&self, market: &str, start: i64, end: i64) -> &[TapeRow] {
        let rows = self.rows(market);
        let lo = rows.partition_point(|r| r.timestamp_ms < start);
        let hi = rows.partition_point(|r| r.timestamp_ms <= end);
        if lo >= hi {
            return &[];
        }
        &rows[lo..hi]
    }

    /// Population std of `side`'s price over `[ts - window_ms, ts]`; needs two samples.
    pub fn side_volatility(&self, market: &str, side: Side, ts: i64, window_ms: i64) -> Option<f64> {
        let window = self.range(market, ts - window_ms, ts);
        if window.len() < 2 {
            return None;
        }
        let prices: Vec<f64> = window.iter().map(|r| r.side_price(side)).collect();
        crate::stats::std_dev(&prices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(ts: i64, up: f64) -> TapeRow {
        TapeRow {
            market: "BTC_15m".to_string(),
            timestamp_ms: ts,
            price_up: up,
            price_down: 1.0 - up,
        }
    }

    fn index() -> TapeIndex {
        TapeIndex::new(&[row(3_000, 0.52), row(0, 0.50), row(1_000, 0.51)])
    }

    #[test]
    fn nearest_prefers_earlier_on_tie_and_respects_gap() {
        let idx = index();
        assert_eq!(idx.nearest("BTC_15m", 2_000, 5_000).unwrap().timestamp_ms, 1_000);
        assert_eq!(idx.nearest("BTC_15m", 2_600, 5_000).unwrap().timestamp_ms, 3_000);
        assert!(idx.nearest("BTC_15m", 9_000, 5_000).is_none());
        assert!(idx.nearest("ETH_15m", 0, 5_000).is_none());
    }

    #[test]
    fn at_or_before_includes_exact_timestamp() {
        let idx = index();
        assert_eq!(idx.at_or_before("BTC_15m", 1_000).unwrap().timestamp_ms, 1_000);
        assert_eq!(idx.at_or_before("BTC_15m", 2_999).unwrap().timestamp_ms, 1_000);
        assert!(idx.at_or_before("BTC_15m", -1).is_none());
    }

    #[test]
    fn volatility_needs_two_samples() {
        let idx = index();
        assert!(idx.side_volatility("BTC_15m", Side::Up, 0, 500).is_none());
        let vol = idx.side_volatility("BTC_15m", Side::Up, 1_000, 1_000).unwrap();
        assert!((vol - 0.005).abs() < 1e-12, "vol={vol}");
    }
}
