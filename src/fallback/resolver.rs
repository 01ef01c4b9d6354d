use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::infer::{InferredParams, ParamGroup};
use crate::types::MarketKey;

/// Where a fallback target's group came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", content = "market", rename_all = "snake_case")]
pub enum FallbackSource {
    /// No donor had the group; the market kept its own sparse estimate.
    Own,
    /// Same asset on the other timeframe.
    SameAsset(String),
    /// Best-sampled market overall.
    Global(String),
}

pub type Provenance = BTreeMap<String, BTreeMap<ParamGroup, FallbackSource>>;

/// Eligible market (at least `min_trades` WATCH trades) with the most trades,
/// ties going to the smallest key.
pub fn global_template(params: &InferredParams, min_trades: usize) -> Option<String> {
    params
        .n_watch_trades
        .iter()
        .filter(|(_, &n)| n >= min_trades)
        .max_by(|(ka, na), (kb, nb)| na.cmp(nb).then_with(|| kb.cmp(ka)))
        .map(|(k, _)| k.clone())
}

/// Replace the groups of sparsely-sampled markets (1..min_trades WATCH trades)
/// with donor values. Donors are always read from `params` as inferred, so a
/// target never sees another target's substituted values.
pub fn apply_fallback(params: &InferredParams, min_trades: usize) -> (InferredParams, Provenance) {
    let template = global_template(params, min_trades);
    let mut resolved = params.clone();
    let mut provenance = Provenance::new();

    let targets: Vec<&String> = params
        .n_watch_trades
        .iter()
        .filter(|(_, &n)| n > 0 && n < min_trades)
        .map(|(m, _)| m)
        .collect();

    for target in targets {
        let counterpart = MarketKey::parse(target)
            .counterpart()
            .filter(|cp| cp != target);
        let mut sources = BTreeMap::new();

        for group in ParamGroup::ALL {
            let source = if let Some(cp) = counterpart.as_ref().filter(|cp| params.has(group, cp)) {
                resolved.copy_group(params, group, cp, target);
                Some(FallbackSource::SameAsset(cp.clone()))
            } else if let Some(g) = template.as_ref().filter(|g| *g != target && params.has(group, g)) {
                resolved.copy_group(params, group, g, target);
                Some(FallbackSource::Global(g.clone()))
            } else if params.has(group, target) {
                Some(FallbackSource::Own)
            } else {
                None
            };
            if let Some(source) = source {
                debug!("[FALLBACK] {target}.{group} <- {source:?}");
                sources.insert(group, source);
            }
        }

        if !sources.is_empty() {
            info!(
                "[FALLBACK] {target} ({} trades): {} groups resolved, template={}",
                params.n_watch_trades.get(target.as_str()).copied().unwrap_or(0),
                sources.len(),
                template.as_deref().unwrap_or("-"),
            );
            provenance.insert(target.clone(), sources);
        }
    }

    (resolved, provenance)
}
