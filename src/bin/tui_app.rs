use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

// ---------------------------------------------------------------------------
// Output file shapes (mirror params_latest.json / validation_latest.json)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct EntryView {
    pub mode: String,
    pub up_price_min: Option<f64>,
    pub up_price_max: Option<f64>,
    pub down_price_min: Option<f64>,
    pub down_price_max: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
#[allow(dead_code)]
pub struct ConfidenceView {
    pub n_watch_trades: usize,
    pub precision: Option<f64>,
    pub recall: Option<f64>,
    pub sim_precision: Option<f64>,
    pub sim_recall: Option<f64>,
    pub size_mdape: Option<f64>,
    pub size_p90_ape: Option<f64>,
    pub side_selection_gap: Option<f64>,
    pub needs_sizing_improvement: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ProfileView {
    pub entry_params: Option<EntryView>,
    pub confidence: Option<ConfidenceView>,
    pub fallback: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
#[allow(dead_code)]
pub struct GlobalView {
    pub n_markets: usize,
    pub n_actual: usize,
    pub n_simulated: usize,
    pub n_matched: usize,
    pub precision: f64,
    pub recall: f64,
    pub side_accuracy: Option<f64>,
    pub mean_size_ratio_error_pct: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ValidationView {
    pub match_mode: String,
    pub match_window_ms: i64,
    pub global: GlobalView,
}

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum LoadStatus {
    Loaded,
    Error(String),
    Empty,
}

/// One market as shown in the table, plus its raw JSON for the detail pane.
#[derive(Debug, Clone)]
pub struct MarketEntry {
    pub market: String,
    pub profile: ProfileView,
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub status: LoadStatus,
    pub markets: Vec<MarketEntry>,
    pub validation: Option<ValidationView>,
    pub last_load: std::time::Instant,
    pub output_dir: PathBuf,
}

impl AppState {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            status: LoadStatus::Empty,
            markets: Vec::new(),
            validation: None,
            last_load: std::time::Instant::now(),
            output_dir: output_dir.into(),
        }
    }

    /// Re-read both JSON files. A missing validation file is not an error.
    pub fn reload(&mut self) {
        self.last_load = std::time::Instant::now();
        let params_path = self.output_dir.join("params_latest.json");
        let text = match std::fs::read_to_string(&params_path) {
            Ok(t) => t,
            Err(e) => {
                self.status = LoadStatus::Error(format!("{}: {e}", params_path.display()));
                return;
            }
        };
        match parse_profiles(&text) {
            Ok(markets) => {
                self.status = if markets.is_empty() { LoadStatus::Empty } else { LoadStatus::Loaded };
                self.markets = markets;
            }
            Err(e) => {
                self.status = LoadStatus::Error(format!("parse error: {e}"));
                return;
            }
        }
        self.validation = read_validation(&self.output_dir.join("validation_latest.json"));
    }

    pub fn selected(&self, index: Option<usize>) -> Option<&MarketEntry> {
        index.and_then(|i| self.markets.get(i))
    }
}

pub fn parse_profiles(text: &str) -> serde_json::Result<Vec<MarketEntry>> {
    let raw: BTreeMap<String, serde_json::Value> = serde_json::from_str(text)?;
    raw.into_iter()
        .map(|(market, value)| {
            let profile = serde_json::from_value::<ProfileView>(value.clone())?;
            Ok(MarketEntry { market, profile, raw: value })
        })
        .collect()
}

fn read_validation(path: &Path) -> Option<ValidationView> {
    let text = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&text).ok()
}

/// `group.field = value` lines for every scalar in a profile. Arrays are
/// summarized by length.
pub fn detail_lines(raw: &serde_json::Value) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let Some(groups) = raw.as_object() else { return out };
    for (group, value) in groups {
        match value {
            serde_json::Value::Object(fields) => {
                for (field, v) in fields {
                    out.push((format!("{group}.{field}"), format_value(v)));
                }
            }
            serde_json::Value::Null => {}
            other => out.push((group.clone(), format_value(other))),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

pub fn format_value(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::Null => "—".to_string(),
        serde_json::Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() != 0.0 => format!("{f:.4}"),
            _ => n.to_string(),
        },
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Array(items) => format!("[{} items]", items.len()),
        serde_json::Value::Object(map) => format!("{{{} fields}}", map.len()),
    }
}

pub fn format_band(lo: Option<f64>, hi: Option<f64>) -> String {
    match (lo, hi) {
        (Some(lo), Some(hi)) => format!("{lo:.2}-{hi:.2}"),
        _ => "—".to_string(),
    }
}

pub fn format_ratio(v: Option<f64>) -> String {
    v.map_or("—".to_string(), |x| format!("{:.0}%", x * 100.0))
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{head}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARAMS: &str = r#"{
        "BTC_15m": {
            "entry_params": {"mode": "momentum", "up_price_min": 0.4, "up_price_max": 0.5,
                             "down_price_min": null, "down_price_max": null},
            "cadence_params": {"min_inter_trade_ms": 1000.0, "max_trades_per_min": 3},
            "size_params": null,
            "confidence": {"n_watch_trades": 12, "sim_recall": 0.5}
        },
        "ETH_15m": {"fallback": {"cadence": {"source": "same_asset", "market": "ETH_1h"}}}
    }"#;

    #[test]
    fn profiles_parse_with_missing_groups() {
        let markets = parse_profiles(PARAMS).unwrap();
        assert_eq!(markets.len(), 2);
        let btc = &markets[0].profile;
        assert_eq!(btc.entry_params.as_ref().unwrap().mode, "momentum");
        assert_eq!(btc.confidence.as_ref().unwrap().n_watch_trades, 12);
        assert!(markets[1].profile.entry_params.is_none());
        assert!(markets[1].profile.fallback.contains_key("cadence"));
    }

    #[test]
    fn detail_lines_skip_null_groups() {
        let markets = parse_profiles(PARAMS).unwrap();
        let lines = detail_lines(&markets[0].raw);
        assert!(lines.iter().all(|(k, _)| !k.starts_with("size_params")));
        assert!(lines.contains(&("cadence_params.max_trades_per_min".to_string(), "3".to_string())));
        assert!(lines.contains(&("entry_params.up_price_min".to_string(), "0.4000".to_string())));
    }

    #[test]
    fn formatting() {
        assert_eq!(format_band(Some(0.4), Some(0.5)), "0.40-0.50");
        assert_eq!(format_band(None, Some(0.5)), "—");
        assert_eq!(format_ratio(Some(0.25)), "25%");
        assert_eq!(truncate("BTC_15m", 4), "BTC…");
    }
}
