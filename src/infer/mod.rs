//! Per-market parameter inference over WATCH trades.
//!
//! Each routine works on one market's trades in time order and either skips
//! the market (too few samples) or returns a parameter record. Records are
//! collected into one map per group and merged into profiles later.

pub mod cadence;
pub mod cooldown;
pub mod entry;
pub mod execution;
pub mod inventory;
pub mod profile;
pub mod quality;
pub mod reset;
pub mod risk;
pub mod side_selection;
pub mod sizing;
pub mod unwind;

use std::collections::{BTreeMap, BTreeSet};

use tracing::info;

use crate::config::min_samples;
use crate::features::TapeIndex;
use crate::types::TradeRecord;

pub use profile::{build_profiles, MarketProfile, ParamGroup};

/// One map per parameter group, keyed by market.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InferredParams {
    pub entry: BTreeMap<String, entry::EntryParams>,
    pub sizing: BTreeMap<String, sizing::SizeParams>,
    pub inventory: BTreeMap<String, inventory::InventoryParams>,
    pub cadence: BTreeMap<String, cadence::CadenceParams>,
    pub side_selection: BTreeMap<String, side_selection::SideSelectionParams>,
    pub execution: BTreeMap<String, execution::ExecutionParams>,
    pub cooldown: BTreeMap<String, cooldown::CooldownParams>,
    pub risk: BTreeMap<String, risk::RiskParams>,
    pub unwind: BTreeMap<String, unwind::UnwindParams>,
    pub reset: BTreeMap<String, reset::ResetParams>,
    pub quality: BTreeMap<String, quality::QualityFilterParams>,
    /// WATCH trade count of every market with at least one WATCH trade.
    pub n_watch_trades: BTreeMap<String, usize>,
}

impl InferredParams {
    /// Every market that has a WATCH trade or any group.
    pub fn markets(&self) -> BTreeSet<String> {
        let mut out: BTreeSet<String> = self.n_watch_trades.keys().cloned().collect();
        for group in ParamGroup::ALL {
            out.extend(self.group_markets(group));
        }
        out
    }

    pub fn has(&self, group: ParamGroup, market: &str) -> bool {
        match group {
            ParamGroup::Entry => self.entry.contains_key(market),
            ParamGroup::Sizing => self.sizing.contains_key(market),
            ParamGroup::Inventory => self.inventory.contains_key(market),
            ParamGroup::Cadence => self.cadence.contains_key(market),
            ParamGroup::SideSelection => self.side_selection.contains_key(market),
            ParamGroup::Execution => self.execution.contains_key(market),
            ParamGroup::Cooldown => self.cooldown.contains_key(market),
            ParamGroup::Risk => self.risk.contains_key(market),
            ParamGroup::Unwind => self.unwind.contains_key(market),
            ParamGroup::Reset => self.reset.contains_key(market),
            ParamGroup::QualityFilter => self.quality.contains_key(market),
        }
    }

    fn group_markets(&self, group: ParamGroup) -> Vec<String> {
        fn keys<T>(m: &BTreeMap<String, T>) -> Vec<String> {
            m.keys().cloned().collect()
        }
        match group {
            ParamGroup::Entry => keys(&self.entry),
            ParamGroup::Sizing => keys(&self.sizing),
            ParamGroup::Inventory => keys(&self.inventory),
            ParamGroup::Cadence => keys(&self.cadence),
            ParamGroup::SideSelection => keys(&self.side_selection),
            ParamGroup::Execution => keys(&self.execution),
            ParamGroup::Cooldown => keys(&self.cooldown),
            ParamGroup::Risk => keys(&self.risk),
            ParamGroup::Unwind => keys(&self.unwind),
            ParamGroup::Reset => keys(&self.reset),
            ParamGroup::QualityFilter => keys(&self.quality),
        }
    }

    /// Overwrite `to`'s record for `group` with a clone of `from`'s record in
    /// `source`. Returns false when `source` has no such record.
    pub fn copy_group(&mut self, source: &InferredParams, group: ParamGroup, from: &str, to: &str) -> bool {
        fn copy<T: Clone>(src: &BTreeMap<String, T>, dst: &mut BTreeMap<String, T>, from: &str, to: &str) -> bool {
            match src.get(from) {
                Some(v) => {
                    dst.insert(to.to_string(), v.clone());
                    true
                }
                None => false,
            }
        }
        match group {
            ParamGroup::Entry => copy(&source.entry, &mut self.entry, from, to),
            ParamGroup::Sizing => copy(&source.sizing, &mut self.sizing, from, to),
            ParamGroup::Inventory => copy(&source.inventory, &mut self.inventory, from, to),
            ParamGroup::Cadence => copy(&source.cadence, &mut self.cadence, from, to),
            ParamGroup::SideSelection => copy(&source.side_selection, &mut self.side_selection, from, to),
            ParamGroup::Execution => copy(&source.execution, &mut self.execution, from, to),
            ParamGroup::Cooldown => copy(&source.cooldown, &mut self.cooldown, from, to),
            ParamGroup::Risk => copy(&source.risk, &mut self.risk, from, to),
            ParamGroup::Unwind => copy(&source.unwind, &mut self.unwind, from, to),
            ParamGroup::Reset => copy(&source.reset, &mut self.reset, from, to),
            ParamGroup::QualityFilter => copy(&source.quality, &mut self.quality, from, to),
        }
    }
}

/// WATCH trades grouped by market, stable-sorted by timestamp.
pub fn watch_trades_by_market<'a>(trades: &'a [TradeRecord], watch_bot: &str) -> BTreeMap<String, Vec<&'a TradeRecord>> {
    let mut by_market: BTreeMap<String, Vec<&TradeRecord>> = BTreeMap::new();
    for t in trades.iter().filter(|t| t.bot.is(watch_bot)) {
        by_market.entry(t.market.clone()).or_default().push(t);
    }
    for rows in by_market.values_mut() {
        rows.sort_by_key(|t| t.timestamp_ms);
    }
    by_market
}

fn per_market<'a, T>(
    by_market: &BTreeMap<String, Vec<&'a TradeRecord>>,
    min_trades: usize,
    mut infer: impl FnMut(&str, &[&'a TradeRecord]) -> Option<T>,
) -> BTreeMap<String, T> {
    by_market
        .iter()
        .filter(|(_, trades)| trades.len() >= min_trades)
        .filter_map(|(market, trades)| infer(market, trades).map(|p| (market.clone(), p)))
        .collect()
}

/// Run every inference routine over the WATCH trades in `trades`.
pub fn infer_all(tape: &TapeIndex, trades: &[TradeRecord], watch_bot: &str) -> InferredParams {
    let by_market = watch_trades_by_market(trades, watch_bot);
    if by_market.is_empty() {
        info!("[INFER] no {watch_bot} trades, nothing to infer");
        return InferredParams::default();
    }

    let params = InferredParams {
        entry: per_market(&by_market, min_samples::ENTRY, |_, t| Some(entry::entry_rules_for(t))),
        sizing: per_market(&by_market, min_samples::SIZING, |_, t| Some(sizing::sizing_for(t))),
        inventory: per_market(&by_market, min_samples::INVENTORY, |_, t| Some(inventory::inventory_for(t))),
        cadence: per_market(&by_market, min_samples::CADENCE, |_, t| cadence::cadence_for(t)),
        side_selection: per_market(&by_market, min_samples::SIDE_SELECTION, |_, t| {
            Some(side_selection::side_selection_for(t))
        }),
        execution: per_market(&by_market, min_samples::EXECUTION, |_, t| execution::execution_for(t)),
        cooldown: per_market(&by_market, min_samples::COOLDOWN, |_, t| Some(cooldown::cooldown_for(t))),
        risk: per_market(&by_market, min_samples::RISK, |m, t| Some(risk::risk_for(m, t))),
        unwind: per_market(&by_market, min_samples::UNWIND, unwind::unwind_for),
        reset: per_market(&by_market, min_samples::RESET, |m, t| Some(reset::reset_for(m, t))),
        quality: per_market(&by_market, min_samples::QUALITY, |m, t| {
            Some(quality::quality_for(t, tape.rows(m)))
        }),
        n_watch_trades: by_market.iter().map(|(m, t)| (m.clone(), t.len())).collect(),
    };

    info!(
        markets = by_market.len(),
        entry = params.entry.len(),
        sizing = params.sizing.len(),
        inventory = params.inventory.len(),
        cadence = params.cadence.len(),
        side_selection = params.side_selection.len(),
        execution = params.execution.len(),
        "[INFER] inferred parameters for {} markets",
        params.markets().len()
    );
    for (market, entry) in &params.entry {
        info!(
            "[INFER]   {market}: mode={} up={:?} down={:?} n={}",
            entry.mode,
            entry.band(crate::types::Side::Up),
            entry.band(crate::types::Side::Down),
            params.n_watch_trades.get(market).copied().unwrap_or(0),
        );
    }
    params
}
