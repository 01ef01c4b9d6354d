use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::fallback::{Confidence, FallbackSource};
use crate::infer::cadence::CadenceParams;
use crate::infer::cooldown::CooldownParams;
use crate::infer::entry::EntryParams;
use crate::infer::execution::ExecutionParams;
use crate::infer::inventory::InventoryParams;
use crate::infer::quality::QualityFilterParams;
use crate::infer::reset::ResetParams;
use crate::infer::risk::RiskParams;
use crate::infer::side_selection::SideSelectionParams;
use crate::infer::sizing::SizeParams;
use crate::infer::unwind::UnwindParams;
use crate::infer::InferredParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamGroup {
    Entry,
    Sizing,
    Inventory,
    Cadence,
    SideSelection,
    Execution,
    Cooldown,
    Risk,
    Unwind,
    Reset,
    QualityFilter,
}

impl ParamGroup {
    pub const ALL: [ParamGroup; 11] = [
        ParamGroup::Entry,
        ParamGroup::Sizing,
        ParamGroup::Inventory,
        ParamGroup::Cadence,
        ParamGroup::SideSelection,
        ParamGroup::Execution,
        ParamGroup::Cooldown,
        ParamGroup::Risk,
        ParamGroup::Unwind,
        ParamGroup::Reset,
        ParamGroup::QualityFilter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ParamGroup::Entry => "entry",
            ParamGroup::Sizing => "sizing",
            ParamGroup::Inventory => "inventory",
            ParamGroup::Cadence => "cadence",
            ParamGroup::SideSelection => "side_selection",
            ParamGroup::Execution => "execution",
            ParamGroup::Cooldown => "cooldown",
            ParamGroup::Risk => "risk",
            ParamGroup::Unwind => "unwind",
            ParamGroup::Reset => "reset",
            ParamGroup::QualityFilter => "quality_filter",
        }
    }
}

impl std::fmt::Display for ParamGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything known about one market after inference, fallback and scoring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketProfile {
    pub entry_params: Option<EntryParams>,
    pub size_params: Option<SizeParams>,
    pub inventory_params: Option<InventoryParams>,
    pub cadence_params: Option<CadenceParams>,
    pub side_selection_params: Option<SideSelectionParams>,
    pub execution_params: Option<ExecutionParams>,
    pub cooldown_params: Option<CooldownParams>,
    pub risk_params: Option<RiskParams>,
    pub unwind_params: Option<UnwindParams>,
    pub reset_params: Option<ResetParams>,
    pub quality_filter_params: Option<QualityFilterParams>,
    pub confidence: Option<Confidence>,
    /// Groups whose values were borrowed, and from where.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fallback: BTreeMap<ParamGroup, FallbackSource>,
}

impl MarketProfile {
    pub fn has_any_params(&self) -> bool {
        ParamGroup::ALL.iter().any(|g| self.has(*g))
    }

    pub fn has(&self, group: ParamGroup) -> bool {
        match group {
            ParamGroup::Entry => self.entry_params.is_some(),
            ParamGroup::Sizing => self.size_params.is_some(),
            ParamGroup::Inventory => self.inventory_params.is_some(),
            ParamGroup::Cadence => self.cadence_params.is_some(),
            ParamGroup::SideSelection => self.side_selection_params.is_some(),
            ParamGroup::Execution => self.execution_params.is_some(),
            ParamGroup::Cooldown => self.cooldown_params.is_some(),
            ParamGroup::Risk => self.risk_params.is_some(),
            ParamGroup::Unwind => self.unwind_params.is_some(),
            ParamGroup::Reset => self.reset_params.is_some(),
            ParamGroup::QualityFilter => self.quality_filter_params.is_some(),
        }
    }
}

/// Merge the per-group maps into one profile per market. Markets that end up
/// with no parameters at all are left out.
pub fn build_profiles(
    params: &InferredParams,
    mut confidence: BTreeMap<String, Confidence>,
    mut provenance: BTreeMap<String, BTreeMap<ParamGroup, FallbackSource>>,
) -> BTreeMap<String, MarketProfile> {
    let mut profiles = BTreeMap::new();
    for market in params.markets() {
        let profile = MarketProfile {
            entry_params: params.entry.get(&market).cloned(),
            size_params: params.sizing.get(&market).cloned(),
            inventory_params: params.inventory.get(&market).cloned(),
            cadence_params: params.cadence.get(&market).cloned(),
            side_selection_params: params.side_selection.get(&market).cloned(),
            execution_params: params.execution.get(&market).cloned(),
            cooldown_params: params.cooldown.get(&market).cloned(),
            risk_params: params.risk.get(&market).cloned(),
            unwind_params: params.unwind.get(&market).cloned(),
            reset_params: params.reset.get(&market).cloned(),
            quality_filter_params: params.quality.get(&market).cloned(),
            confidence: confidence.remove(&market),
            fallback: provenance.remove(&market).unwrap_or_default(),
        };
        if profile.has_any_params() {
            profiles.insert(market, profile);
        }
    }
    profiles
}
