use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{AppError, Result};
use crate::loader::notes::parse_note;
use crate::types::{Bot, Side, TapeRow, TradeRecord};

/// Tape snapshots and trade rows read from one or more CSV exports.
#[derive(Debug, Default)]
pub struct LoadedData {
    pub tape: Vec<TapeRow>,
    pub trades: Vec<TradeRecord>,
    pub stats: LoadStats,
}

#[derive(Debug, Default)]
pub struct LoadStats {
    pub files: usize,
    pub rows_total: usize,
    pub rejected_no_timestamp: usize,
    pub rejected_no_market: usize,
    pub rejected_no_prices: usize,
    pub unparsed_notes: usize,
    /// Sample of annotations that looked like trades but did not parse.
    pub unparsed_samples: Vec<String>,
}

/// Resolved column positions for one CSV header.
#[derive(Debug, Default)]
struct Columns {
    timestamp: Option<usize>,
    date: Option<usize>,
    market: Option<usize>,
    price_up: Option<usize>,
    price_down: Option<usize>,
    notes: Option<usize>,
    bot: Option<usize>,
    side: Option<usize>,
    shares: Option<usize>,
    fill_px: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &csv::StringRecord) -> Self {
        let find = |names: &[&str]| {
            headers
                .iter()
                .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
        };
        Self {
            timestamp: find(&["Timestamp", "timestamp_ms"]),
            date: find(&["Date"]),
            market: find(&["market", "Market Key"]),
            price_up: find(&["Price UP ($)", "Market Price UP ($)", "price_up"]),
            price_down: find(&["Price DOWN ($)", "Market Price DOWN ($)", "price_down"]),
            notes: find(&["Notes", "Note"]),
            bot: find(&["bot"]),
            side: find(&["side", "Outcome"]),
            shares: find(&["shares", "Size (Shares)"]),
            fill_px: find(&["fill_px", "Price per Share ($)"]),
        }
    }
}

/// Load every CSV under `path` (a single file or a directory).
pub fn load_all_csvs(path: &str) -> Result<LoadedData> {
    let files = csv_files(Path::new(path))?;
    if files.is_empty() {
        return Err(AppError::Load(format!("no CSV files found under {path}")));
    }

    let mut data = LoadedData::default();
    for file in &files {
        let reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(file)?;
        read_csv(reader, &mut data)?;
        data.stats.files += 1;
        debug!(file = %file.display(), "[LOADER] read file");
    }

    data.tape.sort_by(|a, b| a.market.cmp(&b.market).then(a.timestamp_ms.cmp(&b.timestamp_ms)));
    data.trades.sort_by(|a, b| a.market.cmp(&b.market).then(a.timestamp_ms.cmp(&b.timestamp_ms)));
    Ok(data)
}

fn csv_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(path)? {
        let p = entry?.path();
        if p.extension().is_some_and(|e| e.eq_ignore_ascii_case("csv")) {
            files.push(p);
        }
    }
    files.sort();
    Ok(files)
}

/// Append the rows of one CSV export to `data`.
pub fn read_csv<R: std::io::Read>(mut reader: csv::Reader<R>, data: &mut LoadedData) -> Result<()> {
    let cols = Columns::from_headers(reader.headers()?);
    if cols.market.is_none() || (cols.timestamp.is_none() && cols.date.is_none()) {
        return Err(AppError::Load(
            "CSV header needs a market column and a Timestamp or Date column".to_string(),
        ));
    }

    for record in reader.records() {
        let record = record?;
        data.stats.rows_total += 1;
        let field = |idx: Option<usize>| idx.and_then(|i| record.get(i)).map(str::trim).filter(|s| !s.is_empty());

        let Some(timestamp_ms) = field(cols.timestamp)
            .and_then(parse_timestamp_ms)
            .or_else(|| field(cols.date).and_then(parse_timestamp_ms))
        else {
            data.stats.rejected_no_timestamp += 1;
            continue;
        };
        let Some(market) = field(cols.market) else {
            data.stats.rejected_no_market += 1;
            continue;
        };
        let price_up = field(cols.price_up).and_then(parse_price);
        let price_down = field(cols.price_down).and_then(parse_price);
        let (Some(price_up), Some(price_down)) = (price_up, price_down) else {
            data.stats.rejected_no_prices += 1;
            continue;
        };

        data.tape.push(TapeRow {
            market: market.to_string(),
            timestamp_ms,
            price_up,
            price_down,
        });

        let explicit = match (field(cols.bot), field(cols.side), field(cols.shares)) {
            (Some(bot), Some(side), Some(shares)) => Side::parse(side).zip(parse_price(shares)).map(|(side, shares)| {
                (Bot::parse(bot), side, shares, field(cols.fill_px).and_then(parse_price))
            }),
            _ => None,
        };

        let parsed = explicit.or_else(|| {
            let note = field(cols.notes)?;
            match parse_note(note) {
                Some(n) => Some((n.bot, n.side, n.shares, n.fill_px)),
                None => {
                    if looks_like_trade(note) {
                        data.stats.unparsed_notes += 1;
                        if data.stats.unparsed_samples.len() < 10 {
                            data.stats.unparsed_samples.push(note.to_string());
                        }
                    }
                    None
                }
            }
        });

        if let Some((bot, side, shares, fill_px)) = parsed {
            if shares > 0.0 {
                data.trades.push(TradeRecord::new(
                    timestamp_ms,
                    market,
                    bot,
                    side,
                    shares,
                    price_up,
                    price_down,
                    fill_px,
                ));
            }
        }
    }
    Ok(())
}

fn looks_like_trade(note: &str) -> bool {
    let upper = note.to_ascii_uppercase();
    upper.contains("BUY") || upper.contains(" UP") || upper.contains("DOWN")
}

/// Epoch milliseconds from an integer (ms, or seconds when small) or an RFC 3339 string.
pub fn parse_timestamp_ms(raw: &str) -> Option<i64> {
    if let Ok(v) = raw.parse::<f64>() {
        if !v.is_finite() {
            return None;
        }
        return Some(if v.abs() < 1e11 { (v * 1000.0).round() as i64 } else { v.round() as i64 });
    }
    chrono::DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.timestamp_millis())
}

fn parse_price(raw: &str) -> Option<f64> {
    raw.trim_start_matches('$').parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Log row/market counts and how often the `up + down ≈ 1` invariant is off.
pub fn audit(data: &LoadedData, watch_bot: &str) {
    let markets: BTreeSet<&str> = data.tape.iter().map(|r| r.market.as_str()).collect();
    let deviating = data
        .tape
        .iter()
        .filter(|r| r.price_sum_deviation() > crate::config::quality::MIN_PRICE_SUM_DEVIATION)
        .count();
    let watch = data.trades.iter().filter(|t| t.bot.is(watch_bot)).count();

    info!(
        files = data.stats.files,
        rows = data.stats.rows_total,
        snapshots = data.tape.len(),
        markets = markets.len(),
        trades = data.trades.len(),
        watch_trades = watch,
        "[LOADER] {} snapshots across {} markets, {} trades ({} {watch_bot})",
        data.tape.len(),
        markets.len(),
        data.trades.len(),
        watch,
    );
    info!(
        "[LOADER] rejected: no_timestamp={} no_market={} no_prices={} | unparsed notes={}",
        data.stats.rejected_no_timestamp,
        data.stats.rejected_no_market,
        data.stats.rejected_no_prices,
        data.stats.unparsed_notes,
    );
    for sample in &data.stats.unparsed_samples {
        debug!("[LOADER]   unparsed note: \"{sample}\"");
    }
    if !data.tape.is_empty() {
        let share = deviating as f64 / data.tape.len() as f64;
        if share > 0.01 {
            warn!("[LOADER] {:.1}% of snapshots have |up+down-1| > 0.05", share * 100.0);
        }
    }
}
