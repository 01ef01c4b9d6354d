use serde::{Deserialize, Serialize};

use crate::config::execution::{
    FIXED_SLIPPAGE_BIAS_MAX, FIXED_SLIPPAGE_STD_MAX, SNAPSHOT_BIAS_MAX, WORST_CASE_STD_MIN,
};
use crate::stats;
use crate::types::TradeRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionModel {
    SnapshotPrice,
    FixedSlippage,
    WorstCase,
    MidPrice,
}

impl std::fmt::Display for ExecutionModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutionModel::SnapshotPrice => "snapshot_price",
            ExecutionModel::FixedSlippage => "fixed_slippage",
            ExecutionModel::WorstCase => "worst_case",
            ExecutionModel::MidPrice => "mid_price",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionParams {
    pub model: ExecutionModel,
    /// Only set for `fixed_slippage`.
    pub slippage_offset: Option<f64>,
    pub median_bias: f64,
    pub bias_std: f64,
    pub n_fills: usize,
}

/// Classify fill-vs-snapshot bias. None when no trade carries a fill price.
pub fn execution_for(trades: &[&TradeRecord]) -> Option<ExecutionParams> {
    let biases: Vec<f64> = trades
        .iter()
        .filter_map(|t| t.fill_px.map(|fill| fill - t.side_px_at_trade))
        .collect();
    let median = stats::median(&biases)?;
    let std = stats::std_dev(&biases)?;

    let (model, slippage_offset) = if median.abs() < SNAPSHOT_BIAS_MAX {
        (ExecutionModel::SnapshotPrice, None)
    } else if median.abs() < FIXED_SLIPPAGE_BIAS_MAX && std < FIXED_SLIPPAGE_STD_MAX {
        (ExecutionModel::FixedSlippage, Some(median))
    } else if std > WORST_CASE_STD_MIN {
        (ExecutionModel::WorstCase, None)
    } else {
        (ExecutionModel::MidPrice, None)
    };

    Some(ExecutionParams { model, slippage_offset, median_bias: median, bias_std: std, n_fills: biases.len() })
}
