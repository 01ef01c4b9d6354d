use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

pub const TAPE_PATH: &str = "logs/live_prices";
pub const OUTPUT_DIR: &str = "output";
pub const DB_PATH: &str = "profiler.db";

/// Bot tag of the trader being profiled.
pub const WATCH_BOT: &str = "WATCH";

/// Floor applied to every ratio denominator.
pub const EPS: f64 = 1e-6;

/// A trade is only paired with a tape snapshot this close to it.
pub const NEAREST_SNAPSHOT_MAX_MS: i64 = 5_000;

/// Lookback windows for price-change features (1s, 5s, 30s).
pub const PRICE_CHANGE_WINDOWS_MS: [i64; 3] = [1_000, 5_000, 30_000];

/// Trailing windows for side-price volatility (5s, 30s).
pub const VOLATILITY_WINDOWS_MS: [i64; 2] = [5_000, 30_000];

/// Trailing windows for trade-burst counts (10s, 60s).
pub const BURST_WINDOWS_MS: [i64; 2] = [10_000, 60_000];

/// Markets below this many WATCH trades borrow parameters from elsewhere.
pub const FALLBACK_MIN_TRADES: usize = 50;

/// Simulated and actual trades further apart than this never match.
pub const MATCH_WINDOW_MS: i64 = 2_000;

/// MdAPE (percent) above which a market's sizing model is flagged.
pub const SIZE_MDAPE_ALERT_PCT: f64 = 30.0;

/// Per-routine minimum WATCH trades before a market is inferred at all.
pub mod min_samples {
    pub const ENTRY: usize = 5;
    pub const SIZING: usize = 10;
    pub const INVENTORY: usize = 10;
    pub const CADENCE: usize = 5;
    pub const SIDE_SELECTION: usize = 10;
    pub const EXECUTION: usize = 5;
    pub const COOLDOWN: usize = 5;
    pub const RISK: usize = 5;
    pub const UNWIND: usize = 10;
    pub const RESET: usize = 5;
    pub const QUALITY: usize = 5;
    pub const CONFIDENCE: usize = 5;
}

/// Entry-band search.
pub mod entry {
    /// Percentile pairs, tightest first.
    pub const PERCENTILE_PAIRS: [(f64, f64); 8] = [
        (40.0, 60.0),
        (35.0, 65.0),
        (30.0, 70.0),
        (25.0, 75.0),
        (20.0, 80.0),
        (15.0, 85.0),
        (10.0, 90.0),
        (5.0, 95.0),
    ];
    pub const MAX_BAND_WIDTH: f64 = 0.90;
    pub const MOMENTUM_THRESHOLD: f64 = 0.005;
    pub const MOMENTUM_WINDOW_S: f64 = 5.0;
    /// Valid 5s deltas needed (strictly more than) before classifying a mode.
    pub const MIN_VALID_DELTAS: usize = 10;
    pub const MIN_SIDE_DELTAS: usize = 5;
}

/// Sizing table layout.
pub mod sizing {
    pub const PRICE_BUCKET_WIDTH: f64 = 0.05;
    pub const N_PRICE_BUCKETS: usize = 20;
    pub const N_VOLATILITY_BUCKETS: usize = 3;
    /// Share of rows that must carry volatility before a 3D table is built.
    pub const MIN_VOLATILITY_COVERAGE: f64 = 0.5;
    pub const DEFAULT_SIZE: f64 = 1.0;

    /// 6 inventory buckets for small samples, up to 8 for large ones.
    pub fn inventory_bucket_count(n_trades: usize) -> usize {
        if n_trades < 100 {
            6
        } else if n_trades < 200 {
            7
        } else {
            8
        }
    }
}

pub mod inventory {
    pub const REBALANCE_TRIGGER: f64 = 0.7;
    pub const DEFAULT_REBALANCE_RATIO: f64 = 0.75;
}

pub mod side_selection {
    pub const EDGE_BAND: f64 = 0.1;
    pub const MOMENTUM_DEADZONE: f64 = 0.001;
    pub const MIXED_MARGIN: f64 = 0.1;
    pub const LOSING_SIDE_RECENT: usize = 5;
    pub const LOSING_SIDE_DEGRADATION: f64 = 0.05;
    pub const LOSING_SIDE_MAJORITY: f64 = 1.2;
    /// Flagged-trade rate above which the losing-side warning is raised.
    pub const LOSING_SIDE_WARN_RATE: f64 = 0.1;
}

pub mod execution {
    pub const SNAPSHOT_BIAS_MAX: f64 = 0.001;
    pub const FIXED_SLIPPAGE_BIAS_MAX: f64 = 0.01;
    pub const FIXED_SLIPPAGE_STD_MAX: f64 = 0.01;
    pub const WORST_CASE_STD_MIN: f64 = 0.05;
}

pub mod cooldown {
    pub const MEDIAN_OVER_MIN: f64 = 1.5;
    pub const MIN_MEDIAN_MS: f64 = 1_000.0;
    pub const PRICE_GATE_MIN_MOVE: f64 = 0.01;
    pub const LOCKOUT_RATIO: f64 = 0.9;
    pub const LOCKOUT_SHARE: f64 = 0.2;
}

pub mod risk {
    pub const SESSION_15M_MS: i64 = 15 * 60 * 1_000;
    pub const SESSION_DEFAULT_MS: i64 = 60 * 60 * 1_000;
}

pub mod unwind {
    pub const EARLY_SHARE: f64 = 0.8;
    pub const DROP_RATIO: f64 = 0.8;
    pub const START_RATIO: f64 = 0.8;
}

pub mod reset {
    pub const INACTIVITY_15M_MS: i64 = 30 * 60 * 1_000;
    pub const INACTIVITY_DEFAULT_MS: i64 = 2 * 60 * 60 * 1_000;
}

pub mod quality {
    pub const MIN_PRICE_SUM_DEVIATION: f64 = 0.05;
    pub const TIMESTAMP_JUMP_MS: i64 = 60_000;
    pub const MIN_PRICE_GAP: f64 = 0.2;
}

/// How simulated trades are paired with actual trades during validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Each actual trade takes its nearest simulated trade; one simulated trade
    /// may be claimed by several actual trades.
    Nearest,
    /// Greedy by smallest time gap; every simulated trade is used at most once.
    OneToOne,
}

impl std::str::FromStr for MatchMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nearest" => Ok(MatchMode::Nearest),
            "one_to_one" | "one-to-one" => Ok(MatchMode::OneToOne),
            other => Err(AppError::Config(format!(
                "MATCH_MODE must be 'nearest' or 'one_to_one', got '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// CSV file or directory of CSV exports (TAPE_PATH)
    pub tape_path: String,
    /// Where params/validation/diff artifacts are written (OUTPUT_DIR)
    pub output_dir: String,
    /// SQLite file holding run history (DB_PATH)
    pub db_path: String,
    pub log_level: String,
    /// Bot tag treated as the observed trader (WATCH_BOT)
    pub watch_bot: String,
    /// Markets below this many WATCH trades are fallback targets (FALLBACK_MIN_TRADES)
    pub fallback_min_trades: usize,
    /// Matching tolerance in milliseconds (MATCH_WINDOW_MS)
    pub match_window_ms: i64,
    /// `nearest` or `one_to_one` (MATCH_MODE)
    pub match_mode: MatchMode,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            tape_path: std::env::var("TAPE_PATH").unwrap_or_else(|_| TAPE_PATH.to_string()),
            output_dir: std::env::var("OUTPUT_DIR").unwrap_or_else(|_| OUTPUT_DIR.to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| DB_PATH.to_string()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            watch_bot: std::env::var("WATCH_BOT")
                .unwrap_or_else(|_| WATCH_BOT.to_string())
                .to_ascii_uppercase(),
            fallback_min_trades: std::env::var("FALLBACK_MIN_TRADES")
                .unwrap_or_else(|_| FALLBACK_MIN_TRADES.to_string())
                .parse::<usize>()
                .map_err(|_| {
                    AppError::Config("FALLBACK_MIN_TRADES must be a non-negative integer".to_string())
                })?,
            match_window_ms: std::env::var("MATCH_WINDOW_MS")
                .unwrap_or_else(|_| MATCH_WINDOW_MS.to_string())
                .parse::<i64>()
                .map_err(|_| AppError::Config("MATCH_WINDOW_MS must be an integer".to_string()))?,
            match_mode: std::env::var("MATCH_MODE")
                .unwrap_or_else(|_| "nearest".to_string())
                .parse::<MatchMode>()?,
        })
    }
}
