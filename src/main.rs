mod config;
mod db;
mod error;
mod fallback;
mod features;
mod infer;
mod loader;
mod report;
mod sim;
mod stats;
mod types;
mod validate;

use std::path::Path;

use chrono::Utc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::db::{write_diff_reports, HistoryStore};
use crate::error::Result;
use crate::fallback::{apply_fallback, compute_confidence, merge_validation};
use crate::features::{engineer_features, TapeIndex};
use crate::infer::{build_profiles, infer_all, watch_trades_by_market};
use crate::report::{log_summary, OutputWriter};

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    let run_at = Utc::now();
    info!(
        tape = %cfg.tape_path,
        watch_bot = %cfg.watch_bot,
        match_mode = ?cfg.match_mode,
        "Profiling {} trades from {}",
        cfg.watch_bot,
        cfg.tape_path
    );

    // --- Load + features ---
    let mut data = loader::load_all_csvs(&cfg.tape_path)?;
    loader::audit(&data, &cfg.watch_bot);
    let tape = TapeIndex::new(&data.tape);
    engineer_features(&tape, &mut data.trades, &cfg.watch_bot);
    let trades = data.trades;

    // --- Inference, fallback, confidence ---
    let inferred = infer_all(&tape, &trades, &cfg.watch_bot);
    let (params, provenance) = apply_fallback(&inferred, cfg.fallback_min_trades);
    let by_market = watch_trades_by_market(&trades, &cfg.watch_bot);
    let mut confidence = compute_confidence(&params, &by_market, &tape);

    // --- Simulate + validate against what WATCH actually did ---
    let mut profiles = build_profiles(&params, confidence.clone(), provenance);
    let simulated = sim::simulate_policy(&tape, &profiles);
    let validation = validate::validate(&by_market, &simulated, cfg.match_window_ms, cfg.match_mode);

    merge_validation(&mut confidence, &validation.markets);
    for (market, profile) in profiles.iter_mut() {
        profile.confidence = confidence.get(market).cloned();
    }

    // --- Outputs ---
    log_summary(&profiles, &validation);
    let out = OutputWriter::new(&cfg.output_dir)?;
    out.write_params(&profiles)?;
    out.write_validation(&validation)?;
    out.append_history(run_at, &profiles)?;

    // --- Run-over-run history ---
    let n_watch_trades: usize = by_market.values().map(Vec::len).sum();
    let store = HistoryStore::open(&cfg.db_path).await?;
    let run_id = store.record_run(run_at, &profiles, n_watch_trades).await?;
    match store.previous_run(run_id).await? {
        Some(prev) => {
            let diff = store.diff_runs(prev.id, run_id).await?;
            info!("[HISTORY] comparing run {run_id} against run {} ({})", prev.id, prev.run_at);
            write_diff_reports(Path::new(&cfg.output_dir), &diff)?;
        }
        None => info!("[HISTORY] first recorded run, no diff written"),
    }

    info!("Done: {} markets profiled, {} simulated trades", profiles.len(), simulated.len());
    Ok(())
}
