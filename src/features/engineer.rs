use std::collections::HashMap;

use tracing::{info, warn};

use crate::config::{
    BURST_WINDOWS_MS, NEAREST_SNAPSHOT_MAX_MS, PRICE_CHANGE_WINDOWS_MS, VOLATILITY_WINDOWS_MS,
};
use crate::features::TapeIndex;
use crate::types::{PriceDelta, Side, TradeFeatures, TradeRecord};

/// Attach derived signals to every WATCH trade, then left-join them onto the
/// full trade set by `(timestamp, market)`.
///
/// Each WATCH trade keeps its own features. Non-WATCH rows are never dropped or
/// duplicated; one that shares a key with a WATCH trade picks up the first such
/// trade's features, as a key join would.
pub fn engineer_features(tape: &TapeIndex, trades: &mut [TradeRecord], watch_bot: &str) {
    let watch_idx: Vec<usize> = trades
        .iter()
        .enumerate()
        .filter(|(_, t)| t.bot.is(watch_bot))
        .map(|(i, _)| i)
        .collect();

    if watch_idx.is_empty() {
        warn!("[FEATURES] no {watch_bot} trades found, skipping feature engineering");
        return;
    }
    info!("[FEATURES] computing features for {} {watch_bot} trades", watch_idx.len());

    // Same-market WATCH timestamps, sorted, for burst counting.
    let mut watch_times: HashMap<&str, Vec<i64>> = HashMap::new();
    for &i in &watch_idx {
        watch_times.entry(trades[i].market.as_str()).or_default().push(trades[i].timestamp_ms);
    }
    for times in watch_times.values_mut() {
        times.sort_unstable();
    }

    let own: Vec<(usize, TradeFeatures)> = watch_idx
        .iter()
        .map(|&i| {
            let trade = &trades[i];
            let times = watch_times.get(trade.market.as_str()).map(Vec::as_slice).unwrap_or(&[]);
            (i, compute_trade_features(tape, trade, times))
        })
        .collect();

    let mut by_key: HashMap<(i64, String), TradeFeatures> = HashMap::new();
    for (i, features) in &own {
        let trade = &trades[*i];
        by_key.entry((trade.timestamp_ms, trade.market.clone())).or_insert_with(|| features.clone());
    }

    let mut attached = own.len();
    for (i, features) in own {
        trades[i].features = features;
    }
    for trade in trades.iter_mut().filter(|t| !t.bot.is(watch_bot)) {
        if let Some(f) = by_key.get(&(trade.timestamp_ms, trade.market.clone())) {
            trade.features = f.clone();
            attached += 1;
        }
    }
    info!("[FEATURES] feature engineering complete ({attached} rows enriched)");
}

/// Features for a single trade. `watch_times` are the sorted timestamps of the
/// market's WATCH trades.
pub fn compute_trade_features(tape: &TapeIndex, trade: &TradeRecord, watch_times: &[i64]) -> TradeFeatures {
    let mut f = TradeFeatures::default();

    for window_ms in PRICE_CHANGE_WINDOWS_MS {
        f.set_delta(window_ms, price_delta(tape, trade, window_ms));
    }
    for window_ms in VOLATILITY_WINDOWS_MS {
        f.set_volatility(
            window_ms,
            tape.side_volatility(&trade.market, trade.side, trade.timestamp_ms, window_ms),
        );
    }

    f.distance_from_50 = Some((trade.price_up - 0.5).abs());

    let burst = |window_ms: i64| {
        let lo = watch_times.partition_point(|&t| t < trade.timestamp_ms - window_ms);
        let hi = watch_times.partition_point(|&t| t <= trade.timestamp_ms);
        hi.saturating_sub(lo) as u32
    };
    f.trades_per_10s = Some(burst(BURST_WINDOWS_MS[0]));
    f.trades_per_60s = Some(burst(BURST_WINDOWS_MS[1]));
    f
}

fn price_delta(tape: &TapeIndex, trade: &TradeRecord, window_ms: i64) -> Option<PriceDelta> {
    let current = tape.nearest(&trade.market, trade.timestamp_ms, NEAREST_SNAPSHOT_MAX_MS)?;
    let before = tape.at_or_before(&trade.market, trade.timestamp_ms - window_ms)?;
    let up = current.price_up - before.price_up;
    let down = current.price_down - before.price_down;
    let side = match trade.side {
        Side::Up => up,
        Side::Down => down,
    };
    Some(PriceDelta { up, down, side })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Bot, TapeRow};

    fn tape() -> TapeIndex {
        let rows: Vec<TapeRow> = (0..=10)
            .map(|i| TapeRow {
                market: "BTC_15m".to_string(),
                timestamp_ms: i * 1_000,
                price_up: 0.40 + 0.01 * i as f64,
                price_down: 0.60 - 0.01 * i as f64,
            })
            .collect();
        TapeIndex::new(&rows)
    }

    fn trade(ts: i64, bot: Bot, side: Side) -> TradeRecord {
        let up = 0.40 + 0.01 * (ts / 1_000) as f64;
        TradeRecord::new(ts, "BTC_15m", bot, side, 5.0, up, 1.0 - up, None)
    }

    #[test]
    fn deltas_use_as_of_snapshot_and_side_selection() {
        let t = trade(6_000, Bot::Watch, Side::Down);
        let f = compute_trade_features(&tape(), &t, &[6_000]);
        let d5 = f.delta_5s.unwrap();
        assert!((d5.up - 0.05).abs() < 1e-9);
        assert!((d5.down + 0.05).abs() < 1e-9);
        assert_eq!(d5.side, d5.down);
        // No snapshot 30s before the trade.
        assert!(f.delta_30s.is_none());
        assert!((f.distance_from_50.unwrap() - 0.04).abs() < 1e-9);
    }

    #[test]
    fn trade_far_from_tape_has_no_deltas() {
        let t = trade(60_000, Bot::Watch, Side::Up);
        let f = compute_trade_features(&tape(), &t, &[60_000]);
        assert!(f.delta_1s.is_none());
        assert!(f.delta_5s.is_none());
        assert!(f.volatility_5s.is_none());
    }

    #[test]
    fn burst_counts_include_current_trade() {
        let times = [0, 4_000, 9_000, 10_000, 50_000];
        let t = trade(10_000, Bot::Watch, Side::Up);
        let f = compute_trade_features(&tape(), &t, &times);
        assert_eq!(f.trades_per_10s, Some(4));
        assert_eq!(f.trades_per_60s, Some(4));
    }

    #[test]
    fn join_keeps_every_row_and_skips_unmatched_paper_rows() {
        let mut trades = vec![
            trade(5_000, Bot::Watch, Side::Up),
            trade(5_000, Bot::Paper, Side::Down),
            trade(7_000, Bot::Paper, Side::Up),
        ];
        engineer_features(&tape(), &mut trades, "WATCH");
        assert_eq!(trades.len(), 3);
        assert!(trades[0].features.delta_1s.is_some());
        // Same (timestamp, market) key as the WATCH trade: joined.
        assert_eq!(trades[1].features, trades[0].features);
        assert_eq!(trades[2].features, TradeFeatures::default());
    }

    #[test]
    fn simultaneous_watch_trades_keep_their_own_side_delta() {
        let mut trades = vec![
            trade(6_000, Bot::Watch, Side::Up),
            trade(6_000, Bot::Watch, Side::Down),
            trade(6_000, Bot::Paper, Side::Down),
        ];
        engineer_features(&tape(), &mut trades, "WATCH");

        let up = trades[0].features.delta_5s.unwrap();
        let down = trades[1].features.delta_5s.unwrap();
        assert!((up.side - 0.05).abs() < 1e-9);
        assert!((down.side + 0.05).abs() < 1e-9);
        // Non-WATCH row joins onto the first WATCH trade with its key.
        assert_eq!(trades[2].features, trades[0].features);
    }

    #[test]
    fn no_watch_trades_leaves_rows_untouched() {
        let mut trades = vec![trade(5_000, Bot::Paper, Side::Up)];
        engineer_features(&tape(), &mut trades, "WATCH");
        assert_eq!(trades[0].features, TradeFeatures::default());
    }
}
