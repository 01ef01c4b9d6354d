use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::risk::{SESSION_15M_MS, SESSION_DEFAULT_MS};
use crate::types::{is_15m_market, InventoryState, Side, TradeRecord};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskParams {
    pub session_ms: i64,
    pub max_trades_per_session: usize,
    /// Largest post-trade share of inventory held by one leg.
    pub max_majority_fraction: f64,
    pub total_up_shares: f64,
    pub total_down_shares: f64,
    pub up_exposure_usd: f64,
    pub down_exposure_usd: f64,
}

pub fn session_ms(market: &str) -> i64 {
    if is_15m_market(market) {
        SESSION_15M_MS
    } else {
        SESSION_DEFAULT_MS
    }
}

pub fn risk_for(market: &str, trades: &[&TradeRecord]) -> RiskParams {
    let session_ms = session_ms(market);

    let mut per_session: HashMap<i64, usize> = HashMap::new();
    for t in trades {
        *per_session.entry(t.timestamp_ms.div_euclid(session_ms)).or_default() += 1;
    }

    let mut inv = InventoryState::default();
    let mut max_majority_fraction: f64 = 0.0;
    let mut up_exposure_usd = 0.0;
    let mut down_exposure_usd = 0.0;
    for t in trades {
        inv.apply(t.side, t.shares);
        if let Some(f) = inv.majority_fraction() {
            max_majority_fraction = max_majority_fraction.max(f);
        }
        let cost = t.shares * t.fill_px.unwrap_or(t.side_px_at_trade);
        match t.side {
            Side::Up => up_exposure_usd += cost,
            Side::Down => down_exposure_usd += cost,
        }
    }

    RiskParams {
        session_ms,
        max_trades_per_session: per_session.values().copied().max().unwrap_or(0),
        max_majority_fraction,
        total_up_shares: inv.shares_up,
        total_down_shares: inv.shares_down,
        up_exposure_usd,
        down_exposure_usd,
    }
}
