use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::sizing::{
    inventory_bucket_count, MIN_VOLATILITY_COVERAGE, N_PRICE_BUCKETS, N_VOLATILITY_BUCKETS,
    PRICE_BUCKET_WIDTH,
};
use crate::infer::inventory::pre_trade_states;
use crate::stats;
use crate::types::TradeRecord;

/// Cell coordinates of a size table. The 1D table leaves both conditioning
/// buckets empty, the 2D table sets the inventory bucket, the 3D table both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SizeKey {
    pub price_bucket: usize,
    pub inventory_bucket: Option<usize>,
    pub volatility_bucket: Option<usize>,
}

impl SizeKey {
    pub fn price(price_bucket: usize) -> Self {
        Self { price_bucket, inventory_bucket: None, volatility_bucket: None }
    }

    pub fn price_inventory(price_bucket: usize, inventory_bucket: usize) -> Self {
        Self { price_bucket, inventory_bucket: Some(inventory_bucket), volatility_bucket: None }
    }

    pub fn full(price_bucket: usize, inventory_bucket: usize, volatility_bucket: usize) -> Self {
        Self {
            price_bucket,
            inventory_bucket: Some(inventory_bucket),
            volatility_bucket: Some(volatility_bucket),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SizeCell {
    pub median_size: f64,
    pub n_trades: usize,
}

/// Flat form of one table cell, used on the wire since JSON object keys must
/// be strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizeEntry {
    pub price_bucket: usize,
    pub inventory_bucket: Option<usize>,
    pub volatility_bucket: Option<usize>,
    pub median_size: f64,
    pub n_trades: usize,
}

/// Median shares per populated cell. Empty cells are absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<SizeEntry>", into = "Vec<SizeEntry>")]
pub struct SizeTable {
    cells: BTreeMap<SizeKey, SizeCell>,
}

impl From<Vec<SizeEntry>> for SizeTable {
    fn from(entries: Vec<SizeEntry>) -> Self {
        let cells = entries
            .into_iter()
            .map(|e| {
                let key = SizeKey {
                    price_bucket: e.price_bucket,
                    inventory_bucket: e.inventory_bucket,
                    volatility_bucket: e.volatility_bucket,
                };
                (key, SizeCell { median_size: e.median_size, n_trades: e.n_trades })
            })
            .collect();
        Self { cells }
    }
}

impl From<SizeTable> for Vec<SizeEntry> {
    fn from(table: SizeTable) -> Self {
        table
            .cells
            .into_iter()
            .map(|(key, cell)| SizeEntry {
                price_bucket: key.price_bucket,
                inventory_bucket: key.inventory_bucket,
                volatility_bucket: key.volatility_bucket,
                median_size: cell.median_size,
                n_trades: cell.n_trades,
            })
            .collect()
    }
}

impl SizeTable {
    fn from_groups(groups: BTreeMap<SizeKey, Vec<f64>>) -> Self {
        let cells = groups
            .into_iter()
            .filter_map(|(key, sizes)| {
                let median_size = stats::median(&sizes)?;
                Some((key, SizeCell { median_size, n_trades: sizes.len() }))
            })
            .collect();
        Self { cells }
    }

    pub fn get(&self, key: &SizeKey) -> Option<f64> {
        self.cells.get(key).map(|c| c.median_size)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SizeKey, &SizeCell)> {
        self.cells.iter()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn medians(&self) -> Vec<f64> {
        self.cells.values().map(|c| c.median_size).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeParams {
    pub conditioning_vars: Vec<String>,
    pub n_price_buckets: usize,
    pub n_inventory_buckets: usize,
    pub n_volatility_buckets: Option<usize>,
    /// Quantile edges over the pre-trade up/down ratio.
    pub inventory_edges: Vec<f64>,
    /// Tertile edges over `volatility_5s`; empty without volatility conditioning.
    pub volatility_edges: Vec<f64>,
    /// 3D when volatility conditioning applies, else the 2D table.
    pub size_table: SizeTable,
    pub size_table_2d: SizeTable,
    pub size_table_1d: SizeTable,
}

impl SizeParams {
    pub fn has_volatility(&self) -> bool {
        self.n_volatility_buckets.is_some()
    }

    pub fn inventory_bucket(&self, up_down_ratio: f64) -> usize {
        stats::bucket_index(&self.inventory_edges, up_down_ratio)
    }

    pub fn volatility_bucket(&self, volatility: f64) -> usize {
        stats::bucket_index(&self.volatility_edges, volatility)
    }
}

/// Right-closed 0.05 buckets over `[0, 1]`; the lowest bucket includes 0.
pub fn price_bucket(price: f64) -> usize {
    let idx = (price / PRICE_BUCKET_WIDTH - 1e-9).ceil() as i64 - 1;
    idx.clamp(0, N_PRICE_BUCKETS as i64 - 1) as usize
}

/// Sizing tables for one market's WATCH trades.
pub fn sizing_for(trades: &[&TradeRecord]) -> SizeParams {
    build_size_params(trades, inventory_bucket_count(trades.len()))
}

pub fn build_size_params(trades: &[&TradeRecord], n_inventory_buckets: usize) -> SizeParams {
    let ratios: Vec<f64> = pre_trade_states(trades).iter().map(|s| s.up_down_ratio()).collect();
    let inventory_edges = stats::quantile_edges(&ratios, n_inventory_buckets);

    let volatilities: Vec<f64> = trades.iter().filter_map(|t| t.features.volatility_5s).collect();
    let coverage = volatilities.len() as f64 / trades.len().max(1) as f64;
    let volatility_edges = if !trades.is_empty() && coverage >= MIN_VOLATILITY_COVERAGE {
        stats::quantile_edges(&volatilities, N_VOLATILITY_BUCKETS)
    } else {
        Vec::new()
    };
    let use_volatility = !volatility_edges.is_empty();

    let mut groups_1d: BTreeMap<SizeKey, Vec<f64>> = BTreeMap::new();
    let mut groups_2d: BTreeMap<SizeKey, Vec<f64>> = BTreeMap::new();
    let mut groups_3d: BTreeMap<SizeKey, Vec<f64>> = BTreeMap::new();

    for (trade, ratio) in trades.iter().zip(&ratios) {
        let pb = price_bucket(trade.side_px_at_trade);
        let ib = stats::bucket_index(&inventory_edges, *ratio);
        groups_1d.entry(SizeKey::price(pb)).or_default().push(trade.shares);
        groups_2d.entry(SizeKey::price_inventory(pb, ib)).or_default().push(trade.shares);
        if use_volatility {
            if let Some(vol) = trade.features.volatility_5s {
                let vb = stats::bucket_index(&volatility_edges, vol);
                groups_3d.entry(SizeKey::full(pb, ib, vb)).or_default().push(trade.shares);
            }
        }
    }

    let size_table_1d = SizeTable::from_groups(groups_1d);
    let size_table_2d = SizeTable::from_groups(groups_2d);
    let mut conditioning_vars = vec!["price_bucket".to_string(), "inventory_bucket".to_string()];
    let (size_table, n_volatility_buckets) = if use_volatility {
        conditioning_vars.push("volatility_bucket".to_string());
        (SizeTable::from_groups(groups_3d), Some(volatility_edges.len() - 1))
    } else {
        (size_table_2d.clone(), None)
    };

    SizeParams {
        conditioning_vars,
        n_price_buckets: N_PRICE_BUCKETS,
        n_inventory_buckets: inventory_edges.len().saturating_sub(1).max(1),
        n_volatility_buckets,
        inventory_edges,
        volatility_edges,
        size_table,
        size_table_2d,
        size_table_1d,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Bot, Side};

    fn trade(ts: i64, side: Side, side_px: f64, shares: f64) -> TradeRecord {
        let (up, down) = match side {
            Side::Up => (side_px, 1.0 - side_px),
            Side::Down => (1.0 - side_px, side_px),
        };
        TradeRecord::new(ts, "BTC_15m", Bot::Watch, side, shares, up, down, None)
    }

    #[test]
    fn price_buckets_are_right_closed() {
        assert_eq!(price_bucket(0.0), 0);
        assert_eq!(price_bucket(0.05), 0);
        assert_eq!(price_bucket(0.0501), 1);
        assert_eq!(price_bucket(0.40), 7);
        assert_eq!(price_bucket(0.60), 11);
        assert_eq!(price_bucket(1.0), 19);
        assert_eq!(price_bucket(1.2), 19);
    }

    #[test]
    fn two_trade_scenario_fills_two_cells() {
        let trades = [trade(0, Side::Up, 0.40, 5.0), trade(1_000, Side::Down, 0.60, 5.0)];
        let refs: Vec<&TradeRecord> = trades.iter().collect();
        let params = build_size_params(&refs, 2);

        assert!(!params.has_volatility());
        assert_eq!(params.size_table.len(), 2);
        let cells: Vec<(usize, f64)> = params
            .size_table
            .iter()
            .map(|(k, c)| (k.price_bucket, c.median_size))
            .collect();
        assert_eq!(cells, vec![(7, 5.0), (11, 5.0)]);
        assert_eq!(params.size_table.get(&SizeKey::price_inventory(7, 0)), Some(5.0));
        assert_eq!(params.size_table.get(&SizeKey::price_inventory(11, 1)), Some(5.0));
        assert_eq!(params.size_table_1d.get(&SizeKey::price(7)), Some(5.0));
    }

    #[test]
    fn volatility_coverage_enables_third_dimension() {
        let trades: Vec<TradeRecord> = (0..12)
            .map(|i| {
                let mut t = trade(i * 1_000, Side::Up, 0.42, 2.0 + i as f64);
                t.features.volatility_5s = Some(0.001 * (i + 1) as f64);
                t
            })
            .collect();
        let refs: Vec<&TradeRecord> = trades.iter().collect();
        let params = sizing_for(&refs);
        assert_eq!(params.n_volatility_buckets, Some(3));
        assert_eq!(params.conditioning_vars.len(), 3);
        assert!(params.size_table.iter().all(|(k, _)| k.volatility_bucket.is_some()));
        assert!(params.size_table_2d.iter().all(|(k, _)| k.volatility_bucket.is_none()));
    }

    #[test]
    fn table_serializes_as_cell_list() {
        let trades = [trade(0, Side::Up, 0.40, 5.0), trade(1_000, Side::Down, 0.60, 5.0)];
        let refs: Vec<&TradeRecord> = trades.iter().collect();
        let params = build_size_params(&refs, 2);
        let json = serde_json::to_value(&params.size_table).unwrap();
        let cells = json.as_array().unwrap();
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[0]["price_bucket"], 7);
        assert_eq!(cells[0]["median_size"], 5.0);
        let back: SizeTable = serde_json::from_value(json).unwrap();
        assert_eq!(back, params.size_table);
    }
}
