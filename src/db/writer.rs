use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::info;

use crate::db::models::{DiffRow, DiffSummaryRow, RunParamRow, RunRow};
use crate::error::Result;
use crate::infer::MarketProfile;

pub const DIFF_REPORT: &str = "diff_report.csv";
pub const DIFF_SUMMARY: &str = "diff_summary.csv";

/// Changes smaller than this are treated as float noise.
const CHANGE_EPS: f64 = 1e-9;

const SCHEMA: [&str; 3] = [
    r#"
    CREATE TABLE IF NOT EXISTS runs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        run_at TEXT NOT NULL,
        n_markets INTEGER NOT NULL,
        n_watch_trades INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS run_params (
        run_id INTEGER NOT NULL REFERENCES runs(id),
        market TEXT NOT NULL,
        param TEXT NOT NULL,
        value REAL NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_run_params_run ON run_params(run_id)",
];

/// Run-over-run parameter history in SQLite.
pub struct HistoryStore {
    pool: sqlx::SqlitePool,
}

impl HistoryStore {
    pub async fn open(db_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::new().filename(db_path).create_if_missing(true);
        let pool = SqlitePoolOptions::new().max_connections(1).connect_with(options).await?;
        let store = Self::from_pool(pool).await?;
        info!("[HISTORY] database ready at {db_path}");
        Ok(store)
    }

    pub async fn from_pool(pool: sqlx::SqlitePool) -> Result<Self> {
        for stmt in SCHEMA {
            sqlx::query(stmt).execute(&pool).await?;
        }
        Ok(Self { pool })
    }

    /// Store one run and every numeric leaf of its profiles. Returns the run id.
    pub async fn record_run(
        &self,
        run_at: DateTime<Utc>,
        profiles: &BTreeMap<String, MarketProfile>,
        n_watch_trades: usize,
    ) -> Result<i64> {
        let mut tx = self.pool.begin().await?;
        let run_id = sqlx::query("INSERT INTO runs (run_at, n_markets, n_watch_trades) VALUES (?, ?, ?)")
            .bind(run_at.to_rfc3339())
            .bind(profiles.len() as i64)
            .bind(n_watch_trades as i64)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

        let mut n_params = 0usize;
        for (market, profile) in profiles {
            for (param, value) in flatten_profile(profile)? {
                sqlx::query("INSERT INTO run_params (run_id, market, param, value) VALUES (?, ?, ?, ?)")
                    .bind(run_id)
                    .bind(market.as_str())
                    .bind(param)
                    .bind(value)
                    .execute(&mut *tx)
                    .await?;
                n_params += 1;
            }
        }
        tx.commit().await?;

        info!("[HISTORY] run {run_id}: stored {n_params} params for {} markets", profiles.len());
        Ok(run_id)
    }

    /// Most recent run recorded before `run_id`.
    pub async fn previous_run(&self, run_id: i64) -> Result<Option<RunRow>> {
        let row = sqlx::query_as::<_, RunRow>(
            "SELECT id, run_at, n_markets, n_watch_trades FROM runs WHERE id < ? ORDER BY id DESC LIMIT 1",
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn params_for(&self, run_id: i64) -> Result<Vec<RunParamRow>> {
        let rows = sqlx::query_as::<_, RunParamRow>(
            "SELECT market, param, value FROM run_params WHERE run_id = ? ORDER BY market, param",
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn diff_runs(&self, previous: i64, current: i64) -> Result<Vec<DiffRow>> {
        let prev = self.params_for(previous).await?;
        let cur = self.params_for(current).await?;
        Ok(diff_params(&prev, &cur))
    }
}

/// Numeric leaves of a profile as `(dotted.path, value)`. Array elements use
/// their index as the path segment; strings, bools and nulls are skipped.
pub fn flatten_profile(profile: &MarketProfile) -> Result<Vec<(String, f64)>> {
    let value = serde_json::to_value(profile)?;
    let mut out = Vec::new();
    flatten_value(&value, String::new(), &mut out);
    Ok(out)
}

fn join(path: &str, seg: &str) -> String {
    if path.is_empty() {
        seg.to_string()
    } else {
        format!("{path}.{seg}")
    }
}

fn flatten_value(value: &serde_json::Value, path: String, out: &mut Vec<(String, f64)>) {
    match value {
        serde_json::Value::Number(n) => {
            if let Some(v) = n.as_f64() {
                out.push((path, v));
            }
        }
        serde_json::Value::Object(map) => {
            for (k, v) in map {
                flatten_value(v, join(&path, k), out);
            }
        }
        serde_json::Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                flatten_value(v, join(&path, &i.to_string()), out);
            }
        }
        _ => {}
    }
}

/// Every parameter that changed, appeared or disappeared between two runs.
pub fn diff_params(previous: &[RunParamRow], current: &[RunParamRow]) -> Vec<DiffRow> {
    let index = |rows: &[RunParamRow]| -> BTreeMap<(String, String), f64> {
        rows.iter().map(|r| ((r.market.clone(), r.param.clone()), r.value)).collect()
    };
    let prev = index(previous);
    let cur = index(current);
    let keys: BTreeSet<&(String, String)> = prev.keys().chain(cur.keys()).collect();

    keys.into_iter()
        .filter_map(|key| {
            let p = prev.get(key).copied();
            let c = cur.get(key).copied();
            let abs_change = p.zip(c).map(|(p, c)| (c - p).abs());
            if abs_change.is_some_and(|d| d <= CHANGE_EPS) {
                return None;
            }
            Some(DiffRow {
                market: key.0.clone(),
                param: key.1.clone(),
                previous: p,
                current: c,
                abs_change,
            })
        })
        .collect()
}

pub fn summarize_diff(diff: &[DiffRow]) -> Vec<DiffSummaryRow> {
    let mut by_market: BTreeMap<&str, DiffSummaryRow> = BTreeMap::new();
    for row in diff {
        let entry = by_market.entry(&row.market).or_insert_with(|| DiffSummaryRow {
            market: row.market.clone(),
            changed_params: 0,
            max_abs_change: None,
        });
        entry.changed_params += 1;
        if let Some(d) = row.abs_change {
            entry.max_abs_change = Some(entry.max_abs_change.map_or(d, |m| m.max(d)));
        }
    }
    by_market.into_values().collect()
}

/// Write `diff_report.csv` and `diff_summary.csv` into `dir`.
pub fn write_diff_reports(dir: &Path, diff: &[DiffRow]) -> Result<(PathBuf, PathBuf)> {
    let report_path = dir.join(DIFF_REPORT);
    let mut wtr = csv::Writer::from_path(&report_path)?;
    if diff.is_empty() {
        wtr.write_record(["market", "param", "previous", "current", "abs_change"])?;
    }
    for row in diff {
        wtr.serialize(row)?;
    }
    wtr.flush()?;

    let summary = summarize_diff(diff);
    let summary_path = dir.join(DIFF_SUMMARY);
    let mut wtr = csv::Writer::from_path(&summary_path)?;
    if summary.is_empty() {
        wtr.write_record(["market", "changed_params", "max_abs_change"])?;
    }
    for row in &summary {
        wtr.serialize(row)?;
    }
    wtr.flush()?;

    info!(
        "[HISTORY] {} changed params across {} markets -> {}",
        diff.len(),
        summary.len(),
        report_path.display()
    );
    Ok((report_path, summary_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infer::cadence::CadenceParams;

    fn profile(p95: f64) -> MarketProfile {
        MarketProfile {
            cadence_params: Some(CadenceParams {
                min_inter_trade_ms: 1_000.0,
                median_inter_trade_ms: 1_000.0,
                p95_inter_trade_ms: p95,
                max_trades_per_sec: 1,
                max_trades_per_min: 3,
            }),
            ..MarketProfile::default()
        }
    }

    async fn memory_store() -> HistoryStore {
        let pool = SqlitePoolOptions::new().max_connections(1).connect("sqlite::memory:").await.unwrap();
        HistoryStore::from_pool(pool).await.unwrap()
    }

    #[test]
    fn flatten_keeps_numeric_leaves_only() {
        let leaves = flatten_profile(&profile(9_100.0)).unwrap();
        assert!(leaves.contains(&("cadence_params.p95_inter_trade_ms".to_string(), 9_100.0)));
        assert!(leaves.contains(&("cadence_params.max_trades_per_min".to_string(), 3.0)));
        assert_eq!(leaves.len(), 5);
    }

    #[test]
    fn diff_reports_changes_additions_and_removals() {
        let row = |market: &str, param: &str, value: f64| RunParamRow {
            market: market.to_string(),
            param: param.to_string(),
            value,
        };
        let prev = vec![row("BTC_15m", "a", 1.0), row("BTC_15m", "b", 2.0), row("ETH_1h", "a", 5.0)];
        let cur = vec![row("BTC_15m", "a", 1.5), row("BTC_15m", "b", 2.0), row("BTC_15m", "c", 3.0)];

        let diff = diff_params(&prev, &cur);
        assert_eq!(diff.len(), 3);
        assert_eq!(diff[0].param, "a");
        assert_eq!(diff[0].abs_change, Some(0.5));
        assert_eq!(diff[1].param, "c");
        assert_eq!(diff[1].previous, None);
        assert_eq!(diff[2].market, "ETH_1h");
        assert_eq!(diff[2].current, None);

        let summary = summarize_diff(&diff);
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].changed_params, 2);
        assert_eq!(summary[0].max_abs_change, Some(0.5));
        assert_eq!(summary[1].max_abs_change, None);
    }

    #[tokio::test]
    async fn second_run_diffs_against_first() {
        let store = memory_store().await;
        let first = store
            .record_run(Utc::now(), &BTreeMap::from([("BTC_15m".to_string(), profile(9_100.0))]), 4)
            .await
            .unwrap();
        assert!(store.previous_run(first).await.unwrap().is_none());

        let second = store
            .record_run(Utc::now(), &BTreeMap::from([("BTC_15m".to_string(), profile(8_000.0))]), 5)
            .await
            .unwrap();
        let prev = store.previous_run(second).await.unwrap().unwrap();
        assert_eq!(prev.id, first);
        assert_eq!(prev.n_watch_trades, 4);

        let diff = store.diff_runs(prev.id, second).await.unwrap();
        assert_eq!(diff.len(), 1);
        assert_eq!(diff[0].param, "cadence_params.p95_inter_trade_ms");
        assert_eq!(diff[0].abs_change, Some(1_100.0));
    }

    #[test]
    fn diff_reports_land_as_csv() {
        let dir = std::env::temp_dir().join(format!("watch-profiler-diff-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let diff = vec![DiffRow {
            market: "BTC_15m".to_string(),
            param: "cadence_params.p95_inter_trade_ms".to_string(),
            previous: Some(9_100.0),
            current: Some(8_000.0),
            abs_change: Some(1_100.0),
        }];
        let (report, summary) = write_diff_reports(&dir, &diff).unwrap();

        let report = std::fs::read_to_string(report).unwrap();
        assert!(report.starts_with("market,param,previous,current,abs_change"));
        let summary = std::fs::read_to_string(summary).unwrap();
        assert_eq!(summary.lines().nth(1), Some("BTC_15m,1,1100.0"));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
