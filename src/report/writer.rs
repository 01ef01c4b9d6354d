use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::infer::MarketProfile;
use crate::validate::ValidationReport;

pub const PARAMS_LATEST: &str = "params_latest.json";
pub const VALIDATION_LATEST: &str = "validation_latest.json";
pub const PARAMS_HISTORY: &str = "params_history.jsonl";

#[derive(Serialize)]
struct HistoryLine<'a> {
    run_at: DateTime<Utc>,
    params: &'a BTreeMap<String, MarketProfile>,
}

/// Writes the JSON artifacts of one run into a single output directory.
pub struct OutputWriter {
    dir: PathBuf,
}

impl OutputWriter {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        fs::create_dir_all(dir.as_ref())?;
        Ok(Self { dir: dir.as_ref().to_path_buf() })
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    pub fn write_params(&self, profiles: &BTreeMap<String, MarketProfile>) -> Result<PathBuf> {
        let path = self.path(PARAMS_LATEST);
        fs::write(&path, serde_json::to_string_pretty(profiles)?)?;
        info!("[REPORT] wrote {} markets to {}", profiles.len(), path.display());
        Ok(path)
    }

    pub fn write_validation(&self, report: &ValidationReport) -> Result<PathBuf> {
        let path = self.path(VALIDATION_LATEST);
        fs::write(&path, serde_json::to_string_pretty(report)?)?;
        info!("[REPORT] wrote validation to {}", path.display());
        Ok(path)
    }

    /// Append one `{run_at, params}` line; earlier lines are never rewritten.
    pub fn append_history(&self, run_at: DateTime<Utc>, profiles: &BTreeMap<String, MarketProfile>) -> Result<PathBuf> {
        let path = self.path(PARAMS_HISTORY);
        let mut line = serde_json::to_string(&HistoryLine { run_at, params: profiles })?;
        line.push('\n');
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(line.as_bytes())?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infer::cadence::CadenceParams;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("watch-profiler-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn profiles() -> BTreeMap<String, MarketProfile> {
        let profile = MarketProfile {
            cadence_params: Some(CadenceParams {
                min_inter_trade_ms: 1_000.0,
                median_inter_trade_ms: 1_000.0,
                p95_inter_trade_ms: 9_100.0,
                max_trades_per_sec: 1,
                max_trades_per_min: 3,
            }),
            ..MarketProfile::default()
        };
        BTreeMap::from([("BTC_15m".to_string(), profile)])
    }

    #[test]
    fn params_round_trip_through_latest_file() {
        let dir = scratch_dir("latest");
        let writer = OutputWriter::new(&dir).unwrap();
        let path = writer.write_params(&profiles()).unwrap();

        let back: BTreeMap<String, MarketProfile> = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(back, profiles());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn history_appends_one_line_per_run() {
        let dir = scratch_dir("history");
        let writer = OutputWriter::new(&dir).unwrap();
        writer.append_history(Utc::now(), &profiles()).unwrap();
        let path = writer.append_history(Utc::now(), &profiles()).unwrap();

        let text = fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert!(first["run_at"].is_string());
        assert_eq!(first["params"]["BTC_15m"]["cadence_params"]["p95_inter_trade_ms"], 9_100.0);
        let _ = fs::remove_dir_all(&dir);
    }
}
