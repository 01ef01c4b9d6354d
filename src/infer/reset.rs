use serde::{Deserialize, Serialize};

use crate::config::reset::{INACTIVITY_15M_MS, INACTIVITY_DEFAULT_MS};
use crate::types::{is_15m_market, TradeRecord};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetParams {
    pub resets_on_market_switch: bool,
    pub inactivity_reset_ms: i64,
    pub max_gap_ms: i64,
    pub max_gap_exceeds_threshold: bool,
}

pub fn inactivity_threshold_ms(market: &str) -> i64 {
    if is_15m_market(market) {
        INACTIVITY_15M_MS
    } else {
        INACTIVITY_DEFAULT_MS
    }
}

pub fn reset_for(market: &str, trades: &[&TradeRecord]) -> ResetParams {
    let inactivity_reset_ms = inactivity_threshold_ms(market);
    let max_gap_ms = trades
        .windows(2)
        .map(|w| w[1].timestamp_ms - w[0].timestamp_ms)
        .max()
        .unwrap_or(0);
    ResetParams {
        resets_on_market_switch: true,
        inactivity_reset_ms,
        max_gap_ms,
        max_gap_exceeds_threshold: max_gap_ms > inactivity_reset_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Bot, Side};

    #[test]
    fn threshold_depends_on_timeframe() {
        let trades = [
            TradeRecord::new(0, "ETH_15m", Bot::Watch, Side::Up, 1.0, 0.5, 0.5, None),
            TradeRecord::new(45 * 60_000, "ETH_15m", Bot::Watch, Side::Up, 1.0, 0.5, 0.5, None),
        ];
        let refs: Vec<&TradeRecord> = trades.iter().collect();
        let short = reset_for("ETH_15m", &refs);
        assert_eq!(short.inactivity_reset_ms, 30 * 60_000);
        assert!(short.max_gap_exceeds_threshold);

        let long = reset_for("ETH_1h", &refs);
        assert_eq!(long.inactivity_reset_ms, 2 * 60 * 60_000);
        assert!(!long.max_gap_exceeds_threshold);
    }
}
