use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{MatchMode, EPS, SIZE_MDAPE_ALERT_PCT};
use crate::sim::SimulatedTrade;
use crate::stats;
use crate::types::TradeRecord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketValidation {
    pub n_actual: usize,
    pub n_simulated: usize,
    pub n_matched: usize,
    /// matched / simulated
    pub precision: f64,
    /// matched / actual
    pub recall: f64,
    pub side_accuracy: Option<f64>,
    /// Median absolute percentage size error over same-side matches.
    pub size_mdape: Option<f64>,
    pub size_p90_ape: Option<f64>,
    pub needs_sizing_improvement: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalMetrics {
    pub n_markets: usize,
    pub n_actual: usize,
    pub n_simulated: usize,
    pub n_matched: usize,
    pub precision: f64,
    pub recall: f64,
    pub side_accuracy: Option<f64>,
    /// Mean of `|sim/actual - 1| * 100` over same-side matches.
    pub mean_size_ratio_error_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub match_mode: MatchMode,
    pub match_window_ms: i64,
    pub markets: BTreeMap<String, MarketValidation>,
    pub global: GlobalMetrics,
}

/// Pairs of (actual index, simulated index). Both slices must be sorted by time.
pub fn match_trades(
    actual: &[&TradeRecord],
    simulated: &[&SimulatedTrade],
    window_ms: i64,
    mode: MatchMode,
) -> Vec<(usize, usize)> {
    match mode {
        MatchMode::Nearest => match_nearest(actual, simulated, window_ms),
        MatchMode::OneToOne => match_one_to_one(actual, simulated, window_ms),
    }
}

fn match_nearest(actual: &[&TradeRecord], simulated: &[&SimulatedTrade], window_ms: i64) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    for (ai, a) in actual.iter().enumerate() {
        let idx = simulated.partition_point(|s| s.timestamp_ms < a.timestamp_ms);
        let candidates = [idx.checked_sub(1), (idx < simulated.len()).then_some(idx)];
        let best = candidates
            .into_iter()
            .flatten()
            .map(|si| (si, (simulated[si].timestamp_ms - a.timestamp_ms).abs()))
            .filter(|(_, dt)| *dt <= window_ms)
            .min_by_key(|&(si, dt)| (dt, si));
        if let Some((si, _)) = best {
            pairs.push((ai, si));
        }
    }
    pairs
}

fn match_one_to_one(actual: &[&TradeRecord], simulated: &[&SimulatedTrade], window_ms: i64) -> Vec<(usize, usize)> {
    let mut candidates: Vec<(i64, usize, usize)> = Vec::new();
    for (ai, a) in actual.iter().enumerate() {
        let lo = simulated.partition_point(|s| s.timestamp_ms < a.timestamp_ms - window_ms);
        let hi = simulated.partition_point(|s| s.timestamp_ms <= a.timestamp_ms + window_ms);
        for si in lo..hi {
            candidates.push(((simulated[si].timestamp_ms - a.timestamp_ms).abs(), ai, si));
        }
    }
    candidates.sort_unstable();

    let mut actual_used = vec![false; actual.len()];
    let mut sim_used = vec![false; simulated.len()];
    let mut pairs = Vec::new();
    for (_, ai, si) in candidates {
        if actual_used[ai] || sim_used[si] {
            continue;
        }
        actual_used[ai] = true;
        sim_used[si] = true;
        pairs.push((ai, si));
    }
    pairs.sort_unstable();
    pairs
}

fn ape(sim: f64, actual: f64) -> f64 {
    (sim - actual).abs() / actual.abs().max(EPS) * 100.0
}

/// Per-market metrics plus the same-side size ratio errors for the global mean.
fn validate_market(
    actual: &[&TradeRecord],
    simulated: &[&SimulatedTrade],
    window_ms: i64,
    mode: MatchMode,
) -> (MarketValidation, usize, Vec<f64>) {
    let pairs = match_trades(actual, simulated, window_ms, mode);

    let same_side: Vec<(usize, usize)> = pairs
        .iter()
        .copied()
        .filter(|&(ai, si)| actual[ai].side == simulated[si].side)
        .collect();
    let apes: Vec<f64> = same_side
        .iter()
        .map(|&(ai, si)| ape(simulated[si].shares, actual[ai].shares))
        .collect();
    let ratio_errors: Vec<f64> = same_side
        .iter()
        .map(|&(ai, si)| (simulated[si].shares / actual[ai].shares.max(EPS) - 1.0).abs() * 100.0)
        .collect();

    let size_mdape = stats::median(&apes);
    let v = MarketValidation {
        n_actual: actual.len(),
        n_simulated: simulated.len(),
        n_matched: pairs.len(),
        precision: stats::ratio(pairs.len(), simulated.len()),
        recall: stats::ratio(pairs.len(), actual.len()),
        side_accuracy: (!pairs.is_empty()).then(|| same_side.len() as f64 / pairs.len() as f64),
        size_mdape,
        size_p90_ape: stats::percentile(&apes, 90.0),
        needs_sizing_improvement: size_mdape.is_some_and(|m| m > SIZE_MDAPE_ALERT_PCT),
    };
    (v, same_side.len(), ratio_errors)
}

/// Score simulated trades against actual WATCH trades, market by market.
pub fn validate(
    actual_by_market: &BTreeMap<String, Vec<&TradeRecord>>,
    simulated: &[SimulatedTrade],
    window_ms: i64,
    mode: MatchMode,
) -> ValidationReport {
    let mut sim_by_market: BTreeMap<&str, Vec<&SimulatedTrade>> = BTreeMap::new();
    for s in simulated {
        sim_by_market.entry(s.market.as_str()).or_default().push(s);
    }
    for rows in sim_by_market.values_mut() {
        rows.sort_by_key(|s| s.timestamp_ms);
    }

    let mut markets = BTreeMap::new();
    let mut all_ratio_errors = Vec::new();
    let mut same_side_total = 0usize;
    for (market, actual) in actual_by_market {
        let sims = sim_by_market.get(market.as_str()).map(Vec::as_slice).unwrap_or(&[]);
        let (v, n_same_side, ratio_errors) = validate_market(actual, sims, window_ms, mode);
        same_side_total += n_same_side;
        all_ratio_errors.extend(ratio_errors);

        if v.needs_sizing_improvement {
            warn!(
                "[VALIDATE] {market}: size MdAPE {:.1}% > {SIZE_MDAPE_ALERT_PCT}%, sizing model needs improvement",
                v.size_mdape.unwrap_or_default()
            );
        }
        markets.insert(market.clone(), v);
    }

    let n_actual: usize = markets.values().map(|v| v.n_actual).sum();
    let n_simulated: usize = markets.values().map(|v| v.n_simulated).sum();
    let n_matched: usize = markets.values().map(|v| v.n_matched).sum();
    let global = GlobalMetrics {
        n_markets: markets.len(),
        n_actual,
        n_simulated,
        n_matched,
        precision: stats::ratio(n_matched, n_simulated),
        recall: stats::ratio(n_matched, n_actual),
        side_accuracy: (n_matched > 0).then(|| same_side_total as f64 / n_matched as f64),
        mean_size_ratio_error_pct: stats::mean(&all_ratio_errors),
    };

    info!(
        markets = global.n_markets,
        actual = n_actual,
        simulated = n_simulated,
        matched = n_matched,
        "[VALIDATE] recall={:.3} precision={:.3} side_acc={} size_ratio_err={}",
        global.recall,
        global.precision,
        global.side_accuracy.map_or("-".to_string(), |a| format!("{a:.3}")),
        global.mean_size_ratio_error_pct.map_or("-".to_string(), |e| format!("{e:.1}%")),
    );

    ValidationReport { match_mode: mode, match_window_ms: window_ms, markets, global }
}
