use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::min_samples;
use crate::features::TapeIndex;
use crate::infer::InferredParams;
use crate::stats;
use crate::types::{Side, TradeRecord};
use crate::validate::MarketValidation;

/// How far a market's parameters can be trusted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Confidence {
    pub n_watch_trades: usize,
    /// In-band share of trades, averaged over sides with a band and trades.
    pub precision: Option<f64>,
    /// In-band trades over in-band tape ticks, both sides pooled.
    pub recall: Option<f64>,
    /// Population variance of the primary size-table cells.
    pub size_variance: f64,
    pub sim_precision: Option<f64>,
    pub sim_recall: Option<f64>,
    pub side_accuracy: Option<f64>,
    pub size_mdape: Option<f64>,
    pub size_p90_ape: Option<f64>,
    /// Winning side-selection score minus the runner-up.
    pub side_selection_gap: Option<f64>,
    #[serde(default)]
    pub needs_sizing_improvement: bool,
}

/// Confidence for every market with enough WATCH trades, measured against the
/// (post-fallback) parameters in `params`.
pub fn compute_confidence(
    params: &InferredParams,
    by_market: &BTreeMap<String, Vec<&TradeRecord>>,
    tape: &TapeIndex,
) -> BTreeMap<String, Confidence> {
    by_market
        .iter()
        .filter(|(_, trades)| trades.len() >= min_samples::CONFIDENCE)
        .map(|(market, trades)| (market.clone(), confidence_for(params, market, trades, tape)))
        .collect()
}

fn confidence_for(params: &InferredParams, market: &str, trades: &[&TradeRecord], tape: &TapeIndex) -> Confidence {
    let mut precisions = Vec::new();
    let mut in_band_trades = 0usize;
    let mut in_band_ticks = 0usize;

    if let Some(entry) = params.entry.get(market) {
        for side in [Side::Up, Side::Down] {
            let Some((lo, hi)) = entry.band(side) else { continue };
            let in_band = |p: f64| lo <= p && p <= hi;

            let prices: Vec<f64> = trades.iter().filter(|t| t.side == side).map(|t| t.side_px_at_trade).collect();
            let hits = prices.iter().filter(|&&p| in_band(p)).count();
            if !prices.is_empty() {
                precisions.push(hits as f64 / prices.len() as f64);
            }
            in_band_trades += hits;
            in_band_ticks += tape.rows(market).iter().filter(|r| in_band(r.side_price(side))).count();
        }
    }

    let recall = (in_band_ticks > 0).then(|| (in_band_trades as f64 / in_band_ticks as f64).clamp(0.0, 1.0));

    let size_variance = params
        .sizing
        .get(market)
        .map(|s| s.size_table.medians())
        .filter(|cells| cells.len() >= 2)
        .and_then(|cells| stats::variance(&cells))
        .unwrap_or(0.0);

    Confidence {
        n_watch_trades: trades.len(),
        precision: stats::mean(&precisions),
        recall,
        size_variance,
        side_selection_gap: params.side_selection.get(market).map(|s| s.confidence_gap),
        ..Confidence::default()
    }
}

/// Fold simulator validation into the confidence records.
pub fn merge_validation(confidence: &mut BTreeMap<String, Confidence>, validation: &BTreeMap<String, MarketValidation>) {
    for (market, v) in validation {
        let Some(c) = confidence.get_mut(market) else { continue };
        c.sim_precision = Some(v.precision);
        c.sim_recall = Some(v.recall);
        c.side_accuracy = v.side_accuracy;
        c.size_mdape = v.size_mdape;
        c.size_p90_ape = v.size_p90_ape;
        c.needs_sizing_improvement = v.needs_sizing_improvement;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infer::{infer_all, watch_trades_by_market};
    use crate::types::{Bot, TapeRow};

    #[test]
    fn precision_recall_and_variance() {
        let trades: Vec<TradeRecord> = (0..10)
            .map(|i| {
                let up = 0.40 + 0.01 * (i % 5) as f64;
                TradeRecord::new(i * 1_000, "BTC_15m", Bot::Watch, Side::Up, 1.0 + i as f64, up, 1.0 - up, None)
            })
            .collect();
        let tape: Vec<TapeRow> = (0..40)
            .map(|i| {
                let up = 0.30 + 0.005 * i as f64;
                TapeRow { market: "BTC_15m".into(), timestamp_ms: i * 500, price_up: up, price_down: 1.0 - up }
            })
            .collect();
        let index = TapeIndex::new(&tape);
        let params = infer_all(&index, &trades, "WATCH");
        let by_market = watch_trades_by_market(&trades, "WATCH");
        let conf = compute_confidence(&params, &by_market, &index);

        let c = &conf["BTC_15m"];
        assert_eq!(c.n_watch_trades, 10);
        let precision = c.precision.unwrap();
        assert!(precision > 0.0 && precision <= 1.0);
        let recall = c.recall.unwrap();
        assert!((0.0..=1.0).contains(&recall));
        assert!(c.size_variance > 0.0);
        assert!(c.sim_precision.is_none());
        let gap = params.side_selection.get("BTC_15m").map(|s| s.confidence_gap);
        assert!(gap.is_some());
        assert_eq!(c.side_selection_gap, gap);
    }

    #[test]
    fn small_markets_have_no_confidence() {
        let trades: Vec<TradeRecord> = (0..4)
            .map(|i| TradeRecord::new(i * 1_000, "ETH_1h", Bot::Watch, Side::Down, 1.0, 0.5, 0.5, None))
            .collect();
        let params = infer_all(&TapeIndex::default(), &trades, "WATCH");
        let by_market = watch_trades_by_market(&trades, "WATCH");
        assert!(compute_confidence(&params, &by_market, &TapeIndex::default()).is_empty());
    }

    #[test]
    fn validation_fills_sim_fields_for_known_markets_only() {
        let mut conf = BTreeMap::from([("BTC_15m".to_string(), Confidence { n_watch_trades: 12, ..Confidence::default() })]);
        let v = MarketValidation {
            n_actual: 12,
            n_simulated: 8,
            n_matched: 6,
            precision: 0.75,
            recall: 0.5,
            side_accuracy: Some(1.0),
            size_mdape: Some(40.0),
            size_p90_ape: Some(55.0),
            needs_sizing_improvement: true,
        };
        let validation = BTreeMap::from([("BTC_15m".to_string(), v.clone()), ("ETH_1h".to_string(), v)]);
        merge_validation(&mut conf, &validation);

        assert_eq!(conf.len(), 1);
        let c = &conf["BTC_15m"];
        assert_eq!(c.sim_precision, Some(0.75));
        assert_eq!(c.sim_recall, Some(0.5));
        assert_eq!(c.size_mdape, Some(40.0));
        assert_eq!(c.size_p90_ape, Some(55.0));
        assert!(c.needs_sizing_improvement);
    }
}
