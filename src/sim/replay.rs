use std::collections::BTreeMap;

use tracing::info;

use crate::features::TapeIndex;
use crate::infer::MarketProfile;
use crate::sim::simulator::{PolicySimulator, SimulatedTrade};

const DELTA_WINDOW_MS: i64 = 5_000;
const VOLATILITY_WINDOW_MS: i64 = 5_000;

/// Walk every profiled market's tape in time order and let the policy trade.
pub fn simulate_policy(tape: &TapeIndex, profiles: &BTreeMap<String, MarketProfile>) -> Vec<SimulatedTrade> {
    let mut sim = PolicySimulator::new(profiles);
    let mut trades = Vec::new();

    for market in tape.market_ids() {
        let Some(profile) = profiles.get(&market) else { continue };
        if profile.entry_params.is_none() {
            continue;
        }
        let mut skipped = 0usize;
        let mut resets = 0usize;
        let before = trades.len();

        let rows = tape.rows(&market);
        for (i, row) in rows.iter().enumerate() {
            if let Some(q) = &profile.quality_filter_params {
                let prev = i.checked_sub(1).map(|j| &rows[j]);
                if !q.accepts(prev, row) {
                    skipped += 1;
                    continue;
                }
            }
            let t = row.timestamp_ms;
            if sim.expire_inventory(&market, t) {
                resets += 1;
            }
            let delta_5s = tape
                .at_or_before(&market, t - DELTA_WINDOW_MS)
                .map(|prev| row.price_up - prev.price_up);

            let Some(side) = sim.should_trade(&market, t, row.price_up, row.price_down, delta_5s) else {
                continue;
            };
            let price = row.side_price(side);
            let volatility = tape.side_volatility(&market, side, t, VOLATILITY_WINDOW_MS);
            let shares = sim.get_size(&market, side, price, volatility);
            trades.push(sim.execute_trade(&market, t, side, shares, price));
        }

        let inv = sim.inventory(&market);
        info!(
            "[SIM] {market}: {} simulated trades | skipped {skipped} ticks | {resets} resets | inventory up={:.1} down={:.1}",
            trades.len() - before,
            inv.shares_up,
            inv.shares_down,
        );
    }
    trades
}
