use serde::{Deserialize, Serialize};

use crate::config::side_selection::{
    EDGE_BAND, LOSING_SIDE_DEGRADATION, LOSING_SIDE_MAJORITY, LOSING_SIDE_RECENT,
    LOSING_SIDE_WARN_RATE, MIXED_MARGIN, MOMENTUM_DEADZONE,
};
use crate::infer::inventory::pre_trade_states;
use crate::stats;
use crate::types::{Side, TradeRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideSelectionMode {
    InventoryDriven,
    Alternation,
    EdgeDriven,
    MomentumDriven,
    FixedPreference,
    Mixed,
}

impl std::fmt::Display for SideSelectionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SideSelectionMode::InventoryDriven => "inventory_driven",
            SideSelectionMode::Alternation => "alternation",
            SideSelectionMode::EdgeDriven => "edge_driven",
            SideSelectionMode::MomentumDriven => "momentum_driven",
            SideSelectionMode::FixedPreference => "fixed_preference",
            SideSelectionMode::Mixed => "mixed",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideScores {
    pub inventory_driven: f64,
    pub alternation: f64,
    pub edge_driven: f64,
    pub momentum_driven: f64,
    pub fixed_preference: f64,
}

impl SideScores {
    /// Scores in tie-break order.
    fn ranked(&self) -> [(SideSelectionMode, f64); 5] {
        [
            (SideSelectionMode::InventoryDriven, self.inventory_driven),
            (SideSelectionMode::Alternation, self.alternation),
            (SideSelectionMode::EdgeDriven, self.edge_driven),
            (SideSelectionMode::MomentumDriven, self.momentum_driven),
            (SideSelectionMode::FixedPreference, self.fixed_preference),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideSelectionParams {
    pub mode: SideSelectionMode,
    pub scores: SideScores,
    /// Winning score minus runner-up.
    pub confidence_gap: f64,
    /// Set to `inventory_first` when the mode is mixed.
    pub tie_break: Option<String>,
    pub preferred_side: Option<Side>,
    pub losing_side_accumulation_rate: f64,
    pub losing_side_warning: bool,
}

pub fn side_selection_for(trades: &[&TradeRecord]) -> SideSelectionParams {
    let scores = score_modes(trades);

    let mut best = (SideSelectionMode::InventoryDriven, f64::NEG_INFINITY);
    for (mode, score) in scores.ranked() {
        if score > best.1 {
            best = (mode, score);
        }
    }
    let runner_up = scores
        .ranked()
        .iter()
        .filter(|(mode, _)| *mode != best.0)
        .map(|(_, s)| *s)
        .fold(f64::NEG_INFINITY, f64::max);
    let confidence_gap = best.1 - runner_up;
    let mixed = confidence_gap < MIXED_MARGIN;

    let up = trades.iter().filter(|t| t.side == Side::Up).count();
    let down = trades.len() - up;
    let preferred_side = match up.cmp(&down) {
        std::cmp::Ordering::Greater => Some(Side::Up),
        std::cmp::Ordering::Less => Some(Side::Down),
        std::cmp::Ordering::Equal => None,
    };

    let losing_side_accumulation_rate = losing_side_rate(trades);

    SideSelectionParams {
        mode: if mixed { SideSelectionMode::Mixed } else { best.0 },
        scores,
        confidence_gap,
        tie_break: mixed.then(|| "inventory_first".to_string()),
        preferred_side,
        losing_side_accumulation_rate,
        losing_side_warning: losing_side_accumulation_rate > LOSING_SIDE_WARN_RATE,
    }
}

fn score_modes(trades: &[&TradeRecord]) -> SideScores {
    let n = trades.len();
    let pre = pre_trade_states(trades);

    let inventory_hits = trades
        .iter()
        .zip(&pre)
        .skip(1)
        .filter(|(t, inv)| inv.minority_side() == Some(t.side))
        .count();
    let inventory_driven = stats::ratio(inventory_hits, n.saturating_sub(1));

    let switches = trades.windows(2).filter(|w| w[0].side != w[1].side).count();
    let alternation = stats::ratio(switches, n.saturating_sub(1));

    let near_fifty = trades.iter().filter(|t| (t.price_up - 0.5).abs() < EDGE_BAND).count();
    let edge_driven = stats::ratio(near_fifty, n);

    let with_delta: Vec<f64> = trades.iter().filter_map(|t| t.features.delta_5s.map(|d| d.side)).collect();
    let aligned = with_delta.iter().filter(|&&d| d > MOMENTUM_DEADZONE).count();
    let momentum_driven = stats::ratio(aligned, with_delta.len());

    let up = trades.iter().filter(|t| t.side == Side::Up).count();
    let fixed_preference = stats::ratio(up, n).max(stats::ratio(n - up, n));

    SideScores { inventory_driven, alternation, edge_driven, momentum_driven, fixed_preference }
}

/// Share of trades placed on a side whose recent prices have degraded while
/// that side already dominates the trade count.
fn losing_side_rate(trades: &[&TradeRecord]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let mut history: [Vec<f64>; 2] = [Vec::new(), Vec::new()];
    let slot = |side: Side| match side {
        Side::Up => 0,
        Side::Down => 1,
    };

    let mut flagged = 0usize;
    for trade in trades {
        let own = &history[slot(trade.side)];
        let other = &history[slot(trade.side.opposite())];
        if own.len() >= LOSING_SIDE_RECENT {
            let recent = &own[own.len() - LOSING_SIDE_RECENT..];
            let degraded = match (stats::mean(recent), stats::mean(own)) {
                (Some(r), Some(all)) => r <= all * (1.0 - LOSING_SIDE_DEGRADATION),
                _ => false,
            };
            let majority = own.len() as f64 >= LOSING_SIDE_MAJORITY * other.len() as f64;
            if degraded && majority {
                flagged += 1;
            }
        }
        history[slot(trade.side)].push(trade.side_px_at_trade);
    }
    flagged as f64 / trades.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Bot;

    fn trade(ts: i64, side: Side, price_up: f64, shares: f64) -> TradeRecord {
        TradeRecord::new(ts, "BTC_15m", Bot::Watch, side, shares, price_up, 1.0 - price_up, None)
    }

    #[test]
    fn strict_alternation_far_from_fifty() {
        let trades: Vec<TradeRecord> = (0..10)
            .map(|i| {
                let (side, shares) = if i % 2 == 0 { (Side::Up, 10.0) } else { (Side::Down, 1.0) };
                trade(i * 1_000, side, 0.8, shares)
            })
            .collect();
        let refs: Vec<&TradeRecord> = trades.iter().collect();
        let p = side_selection_for(&refs);
        assert_eq!(p.scores.alternation, 1.0);
        assert_eq!(p.scores.edge_driven, 0.0);
        assert_eq!(p.mode, SideSelectionMode::Alternation);
        assert!(p.tie_break.is_none());
        assert_eq!(p.preferred_side, None);
    }

    #[test]
    fn close_scores_become_mixed() {
        // Alternating at 0.50: alternation and edge both score 1.0.
        let trades: Vec<TradeRecord> = (0..10)
            .map(|i| {
                let side = if i % 2 == 0 { Side::Up } else { Side::Down };
                trade(i * 1_000, side, 0.5, 1.0)
            })
            .collect();
        let refs: Vec<&TradeRecord> = trades.iter().collect();
        let p = side_selection_for(&refs);
        assert_eq!(p.mode, SideSelectionMode::Mixed);
        assert_eq!(p.tie_break.as_deref(), Some("inventory_first"));
        assert!(p.confidence_gap < MIXED_MARGIN);
    }

    #[test]
    fn losing_side_flags_degrading_majority() {
        // Five UP buys at 0.60 then UP buys sliding to 0.30, no DOWN buys.
        let mut trades: Vec<TradeRecord> = (0..5).map(|i| trade(i * 1_000, Side::Up, 0.60, 1.0)).collect();
        for i in 0..5 {
            trades.push(trade(10_000 + i * 1_000, Side::Up, 0.30, 1.0));
        }
        let refs: Vec<&TradeRecord> = trades.iter().collect();
        let rate = losing_side_rate(&refs);
        assert!(rate > 0.0);
        assert!(side_selection_for(&refs).losing_side_warning);
    }
}
