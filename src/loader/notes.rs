use crate::types::{Bot, Side};

/// Structured fields pulled out of a free-text trade annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedNote {
    pub bot: Bot,
    pub side: Side,
    pub shares: f64,
    pub fill_px: Option<f64>,
}

/// Parse annotations such as `WATCH BUY UP 12.5 @ 0.4321` or
/// `[PAPER] bought DOWN 10 shares @ $0.55`.
///
/// The bot is the first word, the side is the first `UP`/`DOWN` token, shares
/// is the first bare number and the fill price is the number following `@`.
/// Returns None when the note is not a trade.
pub fn parse_note(note: &str) -> Option<ParsedNote> {
    let tokens: Vec<String> = note
        .replace('@', " @ ")
        .split(|c: char| c.is_whitespace() || c == ',' || c == '|')
        .map(|t| t.trim_matches(|c: char| matches!(c, '[' | ']' | '(' | ')' | ':')).to_string())
        .filter(|t| !t.is_empty())
        .collect();

    let bot_token = tokens.first()?;
    if parse_number(bot_token).is_some() || Side::parse(bot_token).is_some() {
        return None;
    }
    let bot = Bot::parse(bot_token);

    let mut side = None;
    let mut shares = None;
    let mut fill_px = None;
    let mut after_at = false;

    for token in tokens.iter().skip(1) {
        if token == "@" {
            after_at = true;
            continue;
        }
        if side.is_none() {
            if let Some(s) = Side::parse(token) {
                side = Some(s);
                continue;
            }
        }
        if let Some(value) = parse_number(token) {
            if after_at {
                if fill_px.is_none() {
                    fill_px = Some(value);
                }
                after_at = false;
            } else if shares.is_none() {
                shares = Some(value);
            }
        } else {
            after_at = false;
        }
    }

    let shares = shares.filter(|s| *s > 0.0)?;
    Some(ParsedNote { bot, side: side?, shares, fill_px })
}

fn parse_number(token: &str) -> Option<f64> {
    let cleaned = token.trim_start_matches('$').trim_end_matches("sh");
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_watch_note() {
        let n = parse_note("WATCH BUY UP 12.5 @ 0.4321").unwrap();
        assert_eq!(n.bot, Bot::Watch);
        assert_eq!(n.side, Side::Up);
        assert!((n.shares - 12.5).abs() < 1e-12);
        assert_eq!(n.fill_px, Some(0.4321));
    }

    #[test]
    fn parses_bracketed_note_with_dollar_price() {
        let n = parse_note("[PAPER] bought DOWN 10 shares @ $0.55").unwrap();
        assert_eq!(n.bot, Bot::Paper);
        assert_eq!(n.side, Side::Down);
        assert_eq!(n.shares, 10.0);
        assert_eq!(n.fill_px, Some(0.55));
    }

    #[test]
    fn missing_fill_price_is_none() {
        let n = parse_note("WATCH: UP 3").unwrap();
        assert_eq!(n.fill_px, None);
        assert_eq!(n.shares, 3.0);
    }

    #[test]
    fn non_trade_notes_are_rejected() {
        assert!(parse_note("").is_none());
        assert!(parse_note("market switched").is_none());
        assert!(parse_note("WATCH UP @ 0.4").is_none());
        assert!(parse_note("WATCH BUY 5 @ 0.4").is_none());
    }
}
