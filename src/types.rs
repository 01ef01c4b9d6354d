use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Sides and bots
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Up,
    Down,
}

impl Side {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "UP" => Some(Side::Up),
            "DOWN" => Some(Side::Down),
            _ => None,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Side::Up => Side::Down,
            Side::Down => Side::Up,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Up => write!(f, "UP"),
            Side::Down => write!(f, "DOWN"),
        }
    }
}

/// Originating bot of a trade-log row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Bot {
    Watch,
    Paper,
    Other(String),
}

impl Bot {
    pub fn parse(s: &str) -> Self {
        let name = s.trim().to_ascii_uppercase();
        match name.as_str() {
            "WATCH" | "WATCHER" => Bot::Watch,
            "PAPER" => Bot::Paper,
            _ => Bot::Other(name),
        }
    }

    /// True when this bot carries the configured watch tag.
    pub fn is(&self, tag: &str) -> bool {
        match self {
            Bot::Watch => tag.eq_ignore_ascii_case("WATCH"),
            Bot::Paper => tag.eq_ignore_ascii_case("PAPER"),
            Bot::Other(name) => name.eq_ignore_ascii_case(tag),
        }
    }
}

impl std::fmt::Display for Bot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Bot::Watch => write!(f, "WATCH"),
            Bot::Paper => write!(f, "PAPER"),
            Bot::Other(name) => write!(f, "{name}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tape and trades
// ---------------------------------------------------------------------------

/// One price snapshot of a binary market.
#[derive(Debug, Clone, PartialEq)]
pub struct TapeRow {
    pub market: String,
    /// Epoch milliseconds.
    pub timestamp_ms: i64,
    pub price_up: f64,
    pub price_down: f64,
}

impl TapeRow {
    pub fn side_price(&self, side: Side) -> f64 {
        match side {
            Side::Up => self.price_up,
            Side::Down => self.price_down,
        }
    }

    /// `|price_up + price_down - 1|`
    pub fn price_sum_deviation(&self) -> f64 {
        (self.price_up + self.price_down - 1.0).abs()
    }
}

/// Change in price between a trade and the snapshot one window earlier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceDelta {
    pub up: f64,
    pub down: f64,
    /// Delta of the trade's own side.
    pub side: f64,
}

/// Derived signals attached to a trade. Every field is optional: `None` means
/// the tape did not have enough evidence around the trade.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradeFeatures {
    pub delta_1s: Option<PriceDelta>,
    pub delta_5s: Option<PriceDelta>,
    pub delta_30s: Option<PriceDelta>,
    pub volatility_5s: Option<f64>,
    pub volatility_30s: Option<f64>,
    pub distance_from_50: Option<f64>,
    pub trades_per_10s: Option<u32>,
    pub trades_per_60s: Option<u32>,
}

impl TradeFeatures {
    pub fn set_delta(&mut self, window_ms: i64, delta: Option<PriceDelta>) {
        match window_ms {
            1_000 => self.delta_1s = delta,
            5_000 => self.delta_5s = delta,
            30_000 => self.delta_30s = delta,
            _ => {}
        }
    }

    pub fn set_volatility(&mut self, window_ms: i64, vol: Option<f64>) {
        match window_ms {
            5_000 => self.volatility_5s = vol,
            30_000 => self.volatility_30s = vol,
            _ => {}
        }
    }
}

/// An executed order from the trade log. Immutable once parsed apart from the
/// post-hoc feature attachment.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
    pub timestamp_ms: i64,
    pub market: String,
    pub bot: Bot,
    pub side: Side,
    pub shares: f64,
    /// Tape prices on the trade row.
    pub price_up: f64,
    pub price_down: f64,
    pub side_px_at_trade: f64,
    /// Executed price, when the annotation carried one.
    pub fill_px: Option<f64>,
    pub features: TradeFeatures,
}

impl TradeRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        timestamp_ms: i64,
        market: impl Into<String>,
        bot: Bot,
        side: Side,
        shares: f64,
        price_up: f64,
        price_down: f64,
        fill_px: Option<f64>,
    ) -> Self {
        let side_px_at_trade = match side {
            Side::Up => price_up,
            Side::Down => price_down,
        };
        Self {
            timestamp_ms,
            market: market.into(),
            bot,
            side,
            shares,
            price_up,
            price_down,
            side_px_at_trade,
            fill_px,
            features: TradeFeatures::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Inventory
// ---------------------------------------------------------------------------

/// Per-market holdings. Only buys exist in this model, so both legs only grow
/// until a reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct InventoryState {
    pub shares_up: f64,
    pub shares_down: f64,
}

impl InventoryState {
    pub fn apply(&mut self, side: Side, shares: f64) {
        match side {
            Side::Up => self.shares_up += shares,
            Side::Down => self.shares_down += shares,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn total(&self) -> f64 {
        self.shares_up + self.shares_down
    }

    pub fn shares(&self, side: Side) -> f64 {
        match side {
            Side::Up => self.shares_up,
            Side::Down => self.shares_down,
        }
    }

    /// `up / max(down, eps)` — the sizing-table conditioning variable.
    pub fn up_down_ratio(&self) -> f64 {
        self.shares_up / self.shares_down.max(crate::config::EPS)
    }

    /// Share of the total held by the larger leg; `None` while flat.
    pub fn majority_fraction(&self) -> Option<f64> {
        let total = self.total();
        if total <= 0.0 {
            return None;
        }
        Some(self.shares_up.max(self.shares_down) / total)
    }

    /// Side holding fewer shares; `None` when both legs are equal.
    pub fn minority_side(&self) -> Option<Side> {
        if self.shares_up < self.shares_down {
            Some(Side::Up)
        } else if self.shares_down < self.shares_up {
            Some(Side::Down)
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Market keys
// ---------------------------------------------------------------------------

/// Asset/timeframe view of a market key such as `BTC_15m` or `ETH_1h`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketKey {
    pub asset: Option<String>,
    pub timeframe: Option<String>,
}

impl MarketKey {
    pub fn parse(market: &str) -> Self {
        let parts: Vec<&str> = market.split('_').collect();
        if parts.len() >= 2 && !parts[0].is_empty() && !parts[1].is_empty() {
            return Self {
                asset: Some(parts[0].to_ascii_uppercase()),
                timeframe: Some(parts[1].to_ascii_lowercase()),
            };
        }

        let upper = market.to_ascii_uppercase();
        let asset = if upper.contains("BTC") {
            Some("BTC".to_string())
        } else if upper.contains("ETH") {
            Some("ETH".to_string())
        } else {
            None
        };
        let lower = market.to_ascii_lowercase();
        let timeframe = if lower.contains("15") {
            Some("15m".to_string())
        } else if lower.contains("1h") || lower.contains("1 hour") {
            Some("1h".to_string())
        } else {
            None
        };
        Self { asset, timeframe }
    }

    /// Same asset on the other timeframe (`15m` ↔ `1h`).
    pub fn counterpart(&self) -> Option<String> {
        let asset = self.asset.as_ref()?;
        let timeframe = self.timeframe.as_ref()?;
        let other = if timeframe == "15m" { "1h" } else { "15m" };
        Some(format!("{asset}_{other}"))
    }
}

/// True for 15-minute markets, which use shorter session and inactivity windows.
pub fn is_15m_market(market: &str) -> bool {
    market.to_ascii_lowercase().contains("15m")
}
