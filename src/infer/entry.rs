use serde::{Deserialize, Serialize};

use crate::config::entry::{
    MAX_BAND_WIDTH, MIN_SIDE_DELTAS, MIN_VALID_DELTAS, MOMENTUM_THRESHOLD, MOMENTUM_WINDOW_S,
    PERCENTILE_PAIRS,
};
use crate::stats;
use crate::types::{Side, TradeRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryMode {
    None,
    /// Trades follow the 5s move of the UP price.
    Momentum,
    /// Trades fade the 5s move of the UP price.
    Reversion,
    /// Price alone does not explain where trades land.
    InventoryGated,
}

impl std::fmt::Display for EntryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EntryMode::None => "none",
            EntryMode::Momentum => "momentum",
            EntryMode::Reversion => "reversion",
            EntryMode::InventoryGated => "inventory_gated",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryParams {
    pub up_price_min: Option<f64>,
    pub up_price_max: Option<f64>,
    pub down_price_min: Option<f64>,
    pub down_price_max: Option<f64>,
    /// Percentile pair that produced each band; `(0, 100)` is the min/max fallback.
    pub up_band_percentiles: Option<(f64, f64)>,
    pub down_band_percentiles: Option<(f64, f64)>,
    pub momentum_window_s: f64,
    pub momentum_threshold: f64,
    pub mode: EntryMode,
}

impl EntryParams {
    pub fn band(&self, side: Side) -> Option<(f64, f64)> {
        match side {
            Side::Up => self.up_price_min.zip(self.up_price_max),
            Side::Down => self.down_price_min.zip(self.down_price_max),
        }
    }

    pub fn in_band(&self, side: Side, price: f64) -> bool {
        self.band(side).is_some_and(|(lo, hi)| lo <= price && price <= hi)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Band {
    lo: f64,
    hi: f64,
    percentiles: (f64, f64),
}

/// Tightest percentile band of width <= MAX_BAND_WIDTH, else the min/max range
/// if it fits, else None.
fn fit_band(prices: &[f64]) -> Option<Band> {
    for &(p_lo, p_hi) in PERCENTILE_PAIRS.iter() {
        let (Some(lo), Some(hi)) = (stats::percentile(prices, p_lo), stats::percentile(prices, p_hi)) else {
            return None;
        };
        if hi - lo <= MAX_BAND_WIDTH {
            return Some(Band { lo, hi, percentiles: (p_lo, p_hi) });
        }
    }
    let lo = stats::percentile(prices, 0.0)?;
    let hi = stats::percentile(prices, 100.0)?;
    (hi - lo <= MAX_BAND_WIDTH).then_some(Band { lo, hi, percentiles: (0.0, 100.0) })
}

/// Entry rules for one market's WATCH trades, in time order.
pub fn entry_rules_for(trades: &[&TradeRecord]) -> EntryParams {
    let side_prices = |side: Side| -> Vec<f64> {
        trades.iter().filter(|t| t.side == side).map(|t| t.side_px_at_trade).collect()
    };
    let up_prices = side_prices(Side::Up);
    let down_prices = side_prices(Side::Down);

    let up_band = (!up_prices.is_empty()).then(|| fit_band(&up_prices));
    let down_band = (!down_prices.is_empty()).then(|| fit_band(&down_prices));

    // A traded side whose band could not be fitted gates the whole market.
    let gated = matches!(up_band, Some(None)) || matches!(down_band, Some(None));
    if gated {
        return EntryParams {
            up_price_min: None,
            up_price_max: None,
            down_price_min: None,
            down_price_max: None,
            up_band_percentiles: None,
            down_band_percentiles: None,
            momentum_window_s: MOMENTUM_WINDOW_S,
            momentum_threshold: 0.0,
            mode: EntryMode::InventoryGated,
        };
    }

    let up_band = up_band.flatten();
    let down_band = down_band.flatten();
    let mode = classify_mode(trades);

    EntryParams {
        up_price_min: up_band.map(|b| b.lo),
        up_price_max: up_band.map(|b| b.hi),
        down_price_min: down_band.map(|b| b.lo),
        down_price_max: down_band.map(|b| b.hi),
        up_band_percentiles: up_band.map(|b| b.percentiles),
        down_band_percentiles: down_band.map(|b| b.percentiles),
        momentum_window_s: MOMENTUM_WINDOW_S,
        momentum_threshold: if mode == EntryMode::None { 0.0 } else { MOMENTUM_THRESHOLD },
        mode,
    }
}

/// Compare median 5s side-deltas of UP trades and DOWN trades.
fn classify_mode(trades: &[&TradeRecord]) -> EntryMode {
    let deltas = |side: Option<Side>| -> Vec<f64> {
        trades
            .iter()
            .filter(|t| side.map_or(true, |s| t.side == s))
            .filter_map(|t| t.features.delta_5s.map(|d| d.side))
            .collect()
    };
    let valid = deltas(None);
    if valid.len() <= MIN_VALID_DELTAS {
        return EntryMode::None;
    }
    let up = deltas(Some(Side::Up));
    let down = deltas(Some(Side::Down));
    if up.len() <= MIN_SIDE_DELTAS || down.len() <= MIN_SIDE_DELTAS {
        return EntryMode::None;
    }

    let (Some(up_median), Some(down_median)) = (stats::median(&up), stats::median(&down)) else {
        return EntryMode::None;
    };
    if up_median > MOMENTUM_THRESHOLD && down_median < -MOMENTUM_THRESHOLD {
        EntryMode::Momentum
    } else if up_median < -MOMENTUM_THRESHOLD && down_median > MOMENTUM_THRESHOLD {
        EntryMode::Reversion
    } else {
        EntryMode::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Bot, PriceDelta};

    fn trade(ts: i64, side: Side, side_px: f64, delta: Option<f64>) -> TradeRecord {
        let (up, down) = match side {
            Side::Up => (side_px, 1.0 - side_px),
            Side::Down => (1.0 - side_px, side_px),
        };
        let mut t = TradeRecord::new(ts, "BTC_15m", Bot::Watch, side, 5.0, up, down, None);
        t.features.delta_5s = delta.map(|d| PriceDelta { up: d, down: -d, side: d });
        t
    }

    fn refs(trades: &[TradeRecord]) -> Vec<&TradeRecord> {
        trades.iter().collect()
    }

    #[test]
    fn tightest_band_wins_and_is_within_width_limit() {
        let trades: Vec<TradeRecord> = (0..10)
            .map(|i| trade(i * 1000, Side::Up, 0.30 + 0.02 * i as f64, None))
            .collect();
        let p = entry_rules_for(&refs(&trades));
        assert_eq!(p.up_band_percentiles, Some((40.0, 60.0)));
        let (lo, hi) = p.band(Side::Up).unwrap();
        assert!(hi - lo <= MAX_BAND_WIDTH);
        assert!((lo - 0.372).abs() < 1e-9, "lo={lo}");
        assert!((hi - 0.408).abs() < 1e-9, "hi={hi}");
        assert!(p.band(Side::Down).is_none());
        assert_eq!(p.mode, EntryMode::None);
    }

    #[test]
    fn bimodal_extremes_are_inventory_gated() {
        let mut trades = Vec::new();
        for i in 0..6 {
            trades.push(trade(i * 1000, Side::Up, 0.01, None));
            trades.push(trade(i * 1000 + 500, Side::Up, 0.99, None));
        }
        let p = entry_rules_for(&refs(&trades));
        assert_eq!(p.mode, EntryMode::InventoryGated);
        assert!(p.up_price_min.is_none() && p.up_price_max.is_none());
        assert!(p.down_price_min.is_none() && p.down_price_max.is_none());
    }

    #[test]
    fn momentum_needs_both_sides_past_threshold() {
        let mut trades = Vec::new();
        for i in 0..6 {
            trades.push(trade(i * 2000, Side::Up, 0.45, Some(0.01)));
            trades.push(trade(i * 2000 + 1000, Side::Down, 0.55, Some(-0.01)));
        }
        let p = entry_rules_for(&refs(&trades));
        assert_eq!(p.mode, EntryMode::Momentum);
        assert_eq!(p.momentum_threshold, MOMENTUM_THRESHOLD);

        let flipped: Vec<TradeRecord> = trades
            .iter()
            .map(|t| {
                let d = t.features.delta_5s.unwrap().side;
                trade(t.timestamp_ms, t.side, t.side_px_at_trade, Some(-d))
            })
            .collect();
        assert_eq!(entry_rules_for(&refs(&flipped)).mode, EntryMode::Reversion);
    }

    #[test]
    fn too_few_deltas_means_no_mode() {
        let mut trades = Vec::new();
        for i in 0..5 {
            trades.push(trade(i * 2000, Side::Up, 0.45, Some(0.01)));
            trades.push(trade(i * 2000 + 1000, Side::Down, 0.55, Some(-0.01)));
        }
        assert_eq!(entry_rules_for(&refs(&trades)).mode, EntryMode::None);
    }
}
