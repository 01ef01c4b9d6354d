use serde::{Deserialize, Serialize};

use crate::config::quality::{MIN_PRICE_GAP, MIN_PRICE_SUM_DEVIATION, TIMESTAMP_JUMP_MS};
use crate::stats;
use crate::types::{TapeRow, TradeRecord};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityFilterParams {
    pub max_price_sum_deviation: f64,
    pub timestamp_jump_ms: i64,
    pub price_gap_threshold: f64,
    pub n_ticks: usize,
    pub ticks_over_sum_deviation: usize,
    pub ticks_over_timestamp_jump: usize,
    pub ticks_over_price_gap: usize,
}

impl QualityFilterParams {
    /// Whether a tick is clean enough to trade on. `prev` is the tick just
    /// before it on the market's tape; the first tick after a timestamp jump
    /// or a price gap is rejected.
    pub fn accepts(&self, prev: Option<&TapeRow>, row: &TapeRow) -> bool {
        if row.price_sum_deviation() > self.max_price_sum_deviation {
            return false;
        }
        match prev {
            Some(p) => {
                row.timestamp_ms - p.timestamp_ms <= self.timestamp_jump_ms
                    && (row.price_up - p.price_up).abs() <= self.price_gap_threshold
            }
            None => true,
        }
    }
}

/// Filters calibrated on the trade rows, plus how many of the market's tape
/// ticks each one would reject.
pub fn quality_for(trades: &[&TradeRecord], tape: &[TapeRow]) -> QualityFilterParams {
    let deviations: Vec<f64> = trades
        .iter()
        .map(|t| (t.price_up + t.price_down - 1.0).abs())
        .collect();
    let max_price_sum_deviation = stats::median(&deviations)
        .map_or(MIN_PRICE_SUM_DEVIATION, |m| MIN_PRICE_SUM_DEVIATION.max(2.0 * m));

    let max_tick_move = tape
        .windows(2)
        .map(|w| (w[1].price_up - w[0].price_up).abs())
        .fold(0.0, f64::max);
    let price_gap_threshold = MIN_PRICE_GAP.max(0.5 * max_tick_move);

    let ticks_over_sum_deviation = tape
        .iter()
        .filter(|r| r.price_sum_deviation() > max_price_sum_deviation)
        .count();
    let ticks_over_timestamp_jump = tape
        .windows(2)
        .filter(|w| w[1].timestamp_ms - w[0].timestamp_ms > TIMESTAMP_JUMP_MS)
        .count();
    let ticks_over_price_gap = tape
        .windows(2)
        .filter(|w| (w[1].price_up - w[0].price_up).abs() > price_gap_threshold)
        .count();

    QualityFilterParams {
        max_price_sum_deviation,
        timestamp_jump_ms: TIMESTAMP_JUMP_MS,
        price_gap_threshold,
        n_ticks: tape.len(),
        ticks_over_sum_deviation,
        ticks_over_timestamp_jump,
        ticks_over_price_gap,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Bot, Side};

    fn row(ts: i64, up: f64, down: f64) -> TapeRow {
        TapeRow { market: "BTC_1h".to_string(), timestamp_ms: ts, price_up: up, price_down: down }
    }

    #[test]
    fn floors_apply_on_clean_data() {
        let tape = [row(0, 0.50, 0.50), row(1_000, 0.52, 0.48), row(120_000, 0.53, 0.47)];
        let trade = TradeRecord::new(1_000, "BTC_1h", Bot::Watch, Side::Up, 1.0, 0.52, 0.48, None);
        let p = quality_for(&[&trade], &tape);
        assert_eq!(p.max_price_sum_deviation, MIN_PRICE_SUM_DEVIATION);
        assert_eq!(p.price_gap_threshold, MIN_PRICE_GAP);
        assert_eq!(p.ticks_over_timestamp_jump, 1);
        assert_eq!(p.ticks_over_sum_deviation, 0);
        assert!(p.accepts(None, &tape[0]));
        assert!(p.accepts(Some(&tape[0]), &tape[1]));
        // 119s of silence before the third tick.
        assert!(!p.accepts(Some(&tape[1]), &tape[2]));
    }

    #[test]
    fn large_moves_raise_thresholds() {
        let tape = [row(0, 0.10, 0.90), row(1_000, 0.90, 0.10), row(2_000, 0.60, 0.60)];
        let trade = TradeRecord::new(2_000, "BTC_1h", Bot::Watch, Side::Up, 1.0, 0.60, 0.60, None);
        let p = quality_for(&[&trade], &tape);
        assert!((p.max_price_sum_deviation - 0.4).abs() < 1e-9);
        assert!((p.price_gap_threshold - 0.4).abs() < 1e-9);
        assert_eq!(p.ticks_over_price_gap, 1);
        assert!(!p.accepts(None, &row(0, 0.8, 0.8)));
        // 0.8 jump exceeds the 0.4 gap threshold, the 0.3 move does not.
        assert!(!p.accepts(Some(&tape[0]), &tape[1]));
        assert!(p.accepts(Some(&tape[1]), &tape[2]));
    }
}
