/// Row types for the run history tables, read back with `sqlx::query_as`.
use serde::Serialize;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RunRow {
    pub id: i64,
    pub run_at: String,
    pub n_markets: i64,
    pub n_watch_trades: i64,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct RunParamRow {
    pub market: String,
    pub param: String,
    pub value: f64,
}

/// One line of `diff_report.csv`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffRow {
    pub market: String,
    pub param: String,
    pub previous: Option<f64>,
    pub current: Option<f64>,
    /// Empty when the parameter only exists in one of the two runs.
    pub abs_change: Option<f64>,
}

/// One line of `diff_summary.csv`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffSummaryRow {
    pub market: String,
    pub changed_params: usize,
    pub max_abs_change: Option<f64>,
}
