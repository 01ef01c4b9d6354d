use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::fallback::FallbackSource;
use crate::infer::MarketProfile;
use crate::validate::ValidationReport;

fn fmt_band(band: Option<(f64, f64)>) -> String {
    band.map_or_else(|| "-".to_string(), |(lo, hi)| format!("[{lo:.3}, {hi:.3}]"))
}

fn fmt_opt(v: Option<f64>, decimals: usize) -> String {
    v.map_or_else(|| "-".to_string(), |x| format!("{x:.decimals$}"))
}

/// One block of log lines per market, then the pooled validation numbers.
pub fn log_summary(profiles: &BTreeMap<String, MarketProfile>, validation: &ValidationReport) {
    info!("[REPORT] ===== WATCH profile: {} markets =====", profiles.len());

    for (market, p) in profiles {
        let n_trades = p.confidence.as_ref().map_or(0, |c| c.n_watch_trades);
        info!(market = %market, trades = n_trades, "[REPORT] {market} ({n_trades} WATCH trades)");

        if let Some(e) = &p.entry_params {
            info!(
                "[REPORT]   entry: mode={} up={} down={}",
                e.mode,
                fmt_band(e.band(crate::types::Side::Up)),
                fmt_band(e.band(crate::types::Side::Down)),
            );
        }
        if let Some(s) = &p.size_params {
            info!(
                "[REPORT]   sizing: {} cells over {:?} (1d={}, 2d={})",
                s.size_table.len(),
                s.conditioning_vars,
                s.size_table_1d.len(),
                s.size_table_2d.len(),
            );
        }
        if let Some(c) = &p.cadence_params {
            info!(
                "[REPORT]   cadence: min={:.0}ms median={:.0}ms p95={:.0}ms max/s={} max/min={}",
                c.min_inter_trade_ms, c.median_inter_trade_ms, c.p95_inter_trade_ms, c.max_trades_per_sec, c.max_trades_per_min,
            );
        }
        if let Some(i) = &p.inventory_params {
            info!(
                "[REPORT]   inventory: rebalance_ratio={:.2} max_up={:.1} max_down={:.1} max_total={:.1}",
                i.rebalance_ratio, i.max_up_shares, i.max_down_shares, i.max_total_shares,
            );
        }
        if let Some(s) = &p.side_selection_params {
            info!("[REPORT]   side selection: {:?} (gap {:.2})", s.mode, s.confidence_gap);
            if s.losing_side_warning {
                warn!(
                    "[REPORT]   {market}: accumulating the losing side on {:.0}% of trades",
                    s.losing_side_accumulation_rate * 100.0
                );
            }
        }
        if let Some(c) = &p.confidence {
            info!(
                "[REPORT]   confidence: precision={} recall={} size_var={:.2} sim_precision={} sim_recall={} size_mdape={} size_p90_ape={}",
                fmt_opt(c.precision, 3),
                fmt_opt(c.recall, 3),
                c.size_variance,
                fmt_opt(c.sim_precision, 3),
                fmt_opt(c.sim_recall, 3),
                fmt_opt(c.size_mdape, 1),
                fmt_opt(c.size_p90_ape, 1),
            );
        }
        for (group, source) in &p.fallback {
            match source {
                FallbackSource::Own => {}
                FallbackSource::SameAsset(from) => info!("[REPORT]   {group} borrowed from {from} (same asset)"),
                FallbackSource::Global(from) => info!("[REPORT]   {group} borrowed from {from} (global template)"),
            }
        }
    }

    let g = &validation.global;
    info!(
        "[REPORT] validation ({:?}, ±{}ms): recall={:.3} precision={:.3} side_acc={} size_ratio_err={}",
        validation.match_mode,
        validation.match_window_ms,
        g.recall,
        g.precision,
        fmt_opt(g.side_accuracy, 3),
        fmt_opt(g.mean_size_ratio_error_pct, 1),
    );
}
