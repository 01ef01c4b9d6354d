use std::collections::{BTreeMap, HashMap};

use tracing::{debug, trace};

use crate::config::sizing::DEFAULT_SIZE;
use crate::infer::entry::EntryMode;
use crate::infer::reset::inactivity_threshold_ms;
use crate::infer::sizing::{price_bucket, SizeKey};
use crate::infer::MarketProfile;
use crate::stats;
use crate::types::{InventoryState, Side};

/// A trade the policy decided to place.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedTrade {
    pub timestamp_ms: i64,
    pub market: String,
    pub side: Side,
    pub shares: f64,
    pub price: f64,
    pub inventory_after: InventoryState,
}

#[derive(Debug, Default, Clone, Copy)]
struct MarketState {
    inventory: InventoryState,
    last_trade_ms: Option<i64>,
}

/// Replays inferred profiles as a trading policy.
///
/// `should_trade` and `get_size` only read state; `execute_trade` and
/// `expire_inventory` are the only places inventory and cadence state change.
/// State is kept per market, so switching markets starts from flat inventory.
pub struct PolicySimulator<'p> {
    profiles: &'p BTreeMap<String, MarketProfile>,
    state: HashMap<String, MarketState>,
}

impl<'p> PolicySimulator<'p> {
    pub fn new(profiles: &'p BTreeMap<String, MarketProfile>) -> Self {
        Self { profiles, state: HashMap::new() }
    }

    pub fn inventory(&self, market: &str) -> InventoryState {
        self.state.get(market).map(|s| s.inventory).unwrap_or_default()
    }

    /// Flatten a market's inventory once it has been idle longer than its
    /// reset threshold. Returns true when inventory was cleared.
    pub fn expire_inventory(&mut self, market: &str, t: i64) -> bool {
        let threshold = self
            .profiles
            .get(market)
            .and_then(|p| p.reset_params.as_ref())
            .map_or_else(|| inactivity_threshold_ms(market), |r| r.inactivity_reset_ms);
        let Some(state) = self.state.get_mut(market) else { return false };
        let Some(last) = state.last_trade_ms else { return false };
        if t - last <= threshold || state.inventory.total() == 0.0 {
            return false;
        }
        debug!("[SIM] {market}: idle {}ms > {threshold}ms, inventory reset", t - last);
        state.inventory.reset();
        true
    }

    /// Side to buy at `t`, if any. UP is tried first, then DOWN.
    ///
    /// `delta_5s` is the UP-price change over the last 5s; `None` skips the
    /// momentum/reversion gate.
    pub fn should_trade(&self, market: &str, t: i64, up_px: f64, down_px: f64, delta_5s: Option<f64>) -> Option<Side> {
        let profile = self.profiles.get(market)?;
        let entry = profile.entry_params.as_ref()?;
        let state = self.state.get(market).copied().unwrap_or_default();

        if let (Some(cadence), Some(last)) = (&profile.cadence_params, state.last_trade_ms) {
            if ((t - last) as f64) < cadence.min_inter_trade_ms {
                return None;
            }
        }

        for (side, price) in [(Side::Up, up_px), (Side::Down, down_px)] {
            if !entry.in_band(side, price) {
                continue;
            }
            let gated = match (entry.mode, delta_5s) {
                (EntryMode::Momentum, Some(d)) => d < entry.momentum_threshold,
                (EntryMode::Reversion, Some(d)) => d > -entry.momentum_threshold,
                _ => false,
            };
            if gated {
                continue;
            }
            if let Some(limits) = &profile.inventory_params {
                let side_max = match side {
                    Side::Up => limits.max_up_shares,
                    Side::Down => limits.max_down_shares,
                };
                if state.inventory.total() >= limits.max_total_shares || state.inventory.shares(side) >= side_max {
                    continue;
                }
            }
            return Some(side);
        }
        None
    }

    /// Shares to buy, from the most specific populated size-table cell.
    pub fn get_size(&self, market: &str, side: Side, price: f64, volatility: Option<f64>) -> f64 {
        let Some(sizing) = self.profiles.get(market).and_then(|p| p.size_params.as_ref()) else {
            return DEFAULT_SIZE;
        };
        let inventory = self.inventory(market);
        let pb = price_bucket(price);
        let ib = sizing.inventory_bucket(inventory.up_down_ratio());

        if sizing.has_volatility() {
            if let Some(vol) = volatility {
                let key = SizeKey::full(pb, ib, sizing.volatility_bucket(vol));
                if let Some(size) = sizing.size_table.get(&key) {
                    return size;
                }
            }
        }
        if let Some(size) = sizing.size_table_2d.get(&SizeKey::price_inventory(pb, ib)) {
            return size;
        }
        for other in (0..sizing.n_inventory_buckets).filter(|&b| b != ib) {
            if let Some(size) = sizing.size_table_2d.get(&SizeKey::price_inventory(pb, other)) {
                return size;
            }
        }
        if let Some(size) = sizing.size_table_1d.get(&SizeKey::price(pb)) {
            return size;
        }
        trace!("[SIM] {market} {side}: no cell for price bucket {pb}, using table median");
        stats::median(&sizing.size_table.medians()).unwrap_or(DEFAULT_SIZE)
    }

    pub fn execute_trade(&mut self, market: &str, t: i64, side: Side, shares: f64, price: f64) -> SimulatedTrade {
        let state = self.state.entry(market.to_string()).or_default();
        state.inventory.apply(side, shares);
        state.last_trade_ms = Some(t);
        SimulatedTrade {
            timestamp_ms: t,
            market: market.to_string(),
            side,
            shares,
            price,
            inventory_after: state.inventory,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infer::cadence::CadenceParams;
    use crate::infer::entry::EntryParams;
    use crate::infer::inventory::InventoryParams;
    use crate::infer::reset::reset_for;
    use crate::infer::sizing::build_size_params;
    use crate::types::{Bot, TradeRecord};

    fn entry(mode: EntryMode) -> EntryParams {
        EntryParams {
            up_price_min: Some(0.40),
            up_price_max: Some(0.50),
            down_price_min: Some(0.50),
            down_price_max: Some(0.60),
            up_band_percentiles: Some((40.0, 60.0)),
            down_band_percentiles: Some((40.0, 60.0)),
            momentum_window_s: 5.0,
            momentum_threshold: 0.005,
            mode,
        }
    }

    fn profiles(mode: EntryMode) -> BTreeMap<String, MarketProfile> {
        let profile = MarketProfile {
            entry_params: Some(entry(mode)),
            cadence_params: Some(CadenceParams {
                min_inter_trade_ms: 1_000.0,
                median_inter_trade_ms: 2_000.0,
                p95_inter_trade_ms: 5_000.0,
                max_trades_per_sec: 1,
                max_trades_per_min: 10,
            }),
            inventory_params: Some(InventoryParams {
                rebalance_ratio: 0.75,
                rebalance_events: 0,
                max_up_shares: 10.0,
                max_down_shares: 10.0,
                max_total_shares: 15.0,
            }),
            ..MarketProfile::default()
        };
        BTreeMap::from([("BTC_15m".to_string(), profile)])
    }

    #[test]
    fn bands_cadence_and_limits_gate_trades() {
        let p = profiles(EntryMode::None);
        let mut sim = PolicySimulator::new(&p);
        assert_eq!(sim.should_trade("BTC_15m", 0, 0.45, 0.55, None), Some(Side::Up));
        assert_eq!(sim.should_trade("BTC_15m", 0, 0.30, 0.55, None), Some(Side::Down));
        assert_eq!(sim.should_trade("BTC_15m", 0, 0.30, 0.70, None), None);
        assert_eq!(sim.should_trade("ETH_1h", 0, 0.45, 0.55, None), None);

        sim.execute_trade("BTC_15m", 0, Side::Up, 10.0, 0.45);
        // Cadence minimum not yet elapsed.
        assert_eq!(sim.should_trade("BTC_15m", 500, 0.45, 0.55, None), None);
        // UP is at its limit, DOWN still allowed.
        assert_eq!(sim.should_trade("BTC_15m", 1_000, 0.45, 0.55, None), Some(Side::Down));
        sim.execute_trade("BTC_15m", 1_000, Side::Down, 5.0, 0.55);
        assert_eq!(sim.should_trade("BTC_15m", 2_000, 0.45, 0.55, None), None);
    }

    #[test]
    fn momentum_and_reversion_gates() {
        let p = profiles(EntryMode::Momentum);
        let sim = PolicySimulator::new(&p);
        assert_eq!(sim.should_trade_with_delta(0.45, Some(0.01)), Some(Side::Up));
        assert_eq!(sim.should_trade_with_delta(0.45, Some(0.0)), None);
        assert_eq!(sim.should_trade_with_delta(0.45, None), Some(Side::Up));

        let p = profiles(EntryMode::Reversion);
        let sim = PolicySimulator::new(&p);
        assert_eq!(sim.should_trade_with_delta(0.45, Some(-0.01)), Some(Side::Up));
        assert_eq!(sim.should_trade_with_delta(0.45, Some(0.01)), None);
    }

    #[test]
    fn size_lookup_falls_back_through_tables() {
        let trades = [
            TradeRecord::new(0, "BTC_15m", Bot::Watch, Side::Up, 5.0, 0.40, 0.60, None),
            TradeRecord::new(1_000, "BTC_15m", Bot::Watch, Side::Down, 7.0, 0.40, 0.60, None),
        ];
        let refs: Vec<&TradeRecord> = trades.iter().collect();
        let mut p = profiles(EntryMode::None);
        if let Some(profile) = p.get_mut("BTC_15m") {
            profile.size_params = Some(build_size_params(&refs, 2));
        }
        let mut sim = PolicySimulator::new(&p);

        // Flat inventory sits in bucket 0: exact 2D hit.
        assert_eq!(sim.get_size("BTC_15m", Side::Up, 0.40, None), 5.0);
        // Price bucket 11 only exists under inventory bucket 1.
        assert_eq!(sim.get_size("BTC_15m", Side::Down, 0.60, None), 7.0);
        // Unseen price bucket: median of the table.
        assert_eq!(sim.get_size("BTC_15m", Side::Up, 0.90, None), 6.0);
        // No sizing at all.
        assert_eq!(sim.get_size("ETH_1h", Side::Up, 0.40, None), DEFAULT_SIZE);

        sim.execute_trade("BTC_15m", 0, Side::Up, 5.0, 0.40);
        assert_eq!(sim.get_size("BTC_15m", Side::Up, 0.40, None), 5.0);
    }

    #[test]
    fn idle_market_resets_inventory() {
        let mut p = profiles(EntryMode::None);
        if let Some(profile) = p.get_mut("BTC_15m") {
            let seen = [
                TradeRecord::new(0, "BTC_15m", Bot::Watch, Side::Up, 1.0, 0.45, 0.55, None),
                TradeRecord::new(60_000, "BTC_15m", Bot::Watch, Side::Up, 1.0, 0.45, 0.55, None),
            ];
            let refs: Vec<&TradeRecord> = seen.iter().collect();
            profile.reset_params = Some(reset_for("BTC_15m", &refs));
        }
        let mut sim = PolicySimulator::new(&p);
        sim.execute_trade("BTC_15m", 0, Side::Up, 10.0, 0.45);
        sim.execute_trade("BTC_15m", 1_000, Side::Down, 5.0, 0.55);
        assert_eq!(sim.should_trade("BTC_15m", 2_000, 0.45, 0.55, None), None);

        // Within the 30 min threshold nothing changes.
        assert!(!sim.expire_inventory("BTC_15m", 1_000 + 30 * 60_000));
        assert_eq!(sim.inventory("BTC_15m").total(), 15.0);

        assert!(sim.expire_inventory("BTC_15m", 1_000 + 30 * 60_000 + 1));
        assert_eq!(sim.inventory("BTC_15m").total(), 0.0);
        assert_eq!(sim.should_trade("BTC_15m", 1_000 + 30 * 60_000 + 1, 0.45, 0.55, None), Some(Side::Up));
        assert!(!sim.expire_inventory("ETH_1h", 10 * 60 * 60_000));
    }

    impl PolicySimulator<'_> {
        fn should_trade_with_delta(&self, up_px: f64, delta: Option<f64>) -> Option<Side> {
            self.should_trade("BTC_15m", 0, up_px, 1.0 - up_px, delta)
        }
    }
}
