mod tui_app;

use std::io;
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use tui_app::{detail_lines, format_band, format_ratio, truncate, AppState, LoadStatus};

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> io::Result<()> {
    let output_dir = std::env::var("OUTPUT_DIR").unwrap_or_else(|_| "output".to_string());
    let mut app = AppState::new(output_dir);
    app.reload();

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut market_state = TableState::default();
    market_state.select((!app.markets.is_empty()).then_some(0));

    let result = run_loop(&mut terminal, &mut app, &mut market_state);

    // Restore terminal regardless of result
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut AppState,
    market_state: &mut TableState,
) -> io::Result<()> {
    let reload_interval = Duration::from_secs(10);

    loop {
        terminal.draw(|f| render(f, app, market_state))?;

        let timeout = reload_interval
            .checked_sub(app.last_load.elapsed())
            .unwrap_or(Duration::ZERO);

        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Char('Q') => return Ok(()),
                        KeyCode::Char('r') | KeyCode::Char('R') => reload(app, market_state),
                        KeyCode::Down | KeyCode::Char('j') => {
                            let max = app.markets.len().saturating_sub(1);
                            let next = market_state.selected().map_or(0, |i| (i + 1).min(max));
                            market_state.select(Some(next));
                        }
                        KeyCode::Up | KeyCode::Char('k') => {
                            let prev = market_state.selected().map_or(0, |i| i.saturating_sub(1));
                            market_state.select(Some(prev));
                        }
                        _ => {}
                    }
                }
            }
        }

        if app.last_load.elapsed() >= reload_interval {
            reload(app, market_state);
        }
    }
}

/// Reload and keep the selection inside the (possibly shorter) market list.
fn reload(app: &mut AppState, market_state: &mut TableState) {
    app.reload();
    let selected = match (market_state.selected(), app.markets.len()) {
        (_, 0) => None,
        (Some(i), n) => Some(i.min(n - 1)),
        (None, _) => Some(0),
    };
    market_state.select(selected);
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render(f: &mut Frame, app: &AppState, market_state: &mut TableState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // header
            Constraint::Min(0),    // body
            Constraint::Length(1), // footer
        ])
        .split(f.area());

    render_header(f, app, chunks[0]);

    let halves = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(chunks[1]);
    render_markets_table(f, app, market_state, halves[0]);
    render_detail(f, app, market_state.selected(), halves[1]);

    render_footer(f, chunks[2]);
}

fn render_header(f: &mut Frame, app: &AppState, area: Rect) {
    let (status_text, status_color) = match &app.status {
        LoadStatus::Loaded => ("● loaded".to_string(), Color::Green),
        LoadStatus::Empty => ("◌ no markets".to_string(), Color::Yellow),
        LoadStatus::Error(e) => (format!("✗ {}", truncate(e, 50)), Color::Red),
    };

    let mut spans = vec![
        Span::styled(" WATCH Profile  ", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::styled(status_text, Style::default().fg(status_color)),
        Span::raw("  │  "),
        Span::styled(format!("{} markets", app.markets.len()), Style::default().fg(Color::White)),
    ];
    if let Some(v) = &app.validation {
        let g = &v.global;
        spans.push(Span::raw("  │  "));
        spans.push(Span::styled(
            format!(
                "{} ±{}ms  recall {}  precision {}  side {}  matched {}/{} (sim {})",
                v.match_mode,
                v.match_window_ms,
                format_ratio(Some(g.recall)),
                format_ratio(Some(g.precision)),
                format_ratio(g.side_accuracy),
                g.n_matched,
                g.n_actual,
                g.n_simulated,
            ),
            Style::default().fg(Color::White),
        ));
        if let Some(err) = g.mean_size_ratio_error_pct {
            spans.push(Span::styled(format!("  size err {err:.0}%"), Style::default().fg(Color::DarkGray)));
        }
    }

    let paragraph = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::DarkGray)));
    f.render_widget(paragraph, area);
}

fn render_markets_table(f: &mut Frame, app: &AppState, state: &mut TableState, area: Rect) {
    let header_cells = ["Market", "N", "Mode", "UP band", "DOWN band", "Recall", "MdAPE"]
        .iter()
        .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)));
    let header = Row::new(header_cells).height(1);

    let rows: Vec<Row> = app
        .markets
        .iter()
        .map(|m| {
            let entry = m.profile.entry_params.as_ref();
            let conf = m.profile.confidence.as_ref();
            let n = conf.map_or("—".to_string(), |c| c.n_watch_trades.to_string());
            let mode = entry.map_or("—".to_string(), |e| e.mode.clone());
            let up = entry.map_or("—".to_string(), |e| format_band(e.up_price_min, e.up_price_max));
            let down = entry.map_or("—".to_string(), |e| format_band(e.down_price_min, e.down_price_max));
            let mdape = conf.and_then(|c| c.size_mdape);
            let mdape_color = match (mdape, conf.is_some_and(|c| c.needs_sizing_improvement)) {
                (_, true) => Color::Red,
                (Some(_), false) => Color::Green,
                (None, false) => Color::DarkGray,
            };
            let market_color = if m.profile.fallback.is_empty() { Color::White } else { Color::LightBlue };

            Row::new(vec![
                Cell::from(truncate(&m.market, 12)).style(Style::default().fg(market_color)),
                Cell::from(n).style(Style::default().fg(Color::DarkGray)),
                Cell::from(mode),
                Cell::from(up).style(Style::default().fg(Color::Cyan)),
                Cell::from(down).style(Style::default().fg(Color::Cyan)),
                Cell::from(format_ratio(conf.and_then(|c| c.sim_recall))),
                Cell::from(mdape.map_or("—".to_string(), |v| format!("{v:.0}%"))).style(Style::default().fg(mdape_color)),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Min(8),
            Constraint::Length(5),
            Constraint::Length(15),
            Constraint::Length(9),
            Constraint::Length(9),
            Constraint::Length(6),
            Constraint::Length(6),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(Span::styled(" MARKETS ", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))),
    )
    .row_highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD));

    f.render_stateful_widget(table, area, state);
}

fn render_detail(f: &mut Frame, app: &AppState, selected: Option<usize>, area: Rect) {
    let (title, lines) = match app.selected(selected) {
        Some(m) => {
            let mut lines: Vec<Line> = detail_lines(&m.raw)
                .into_iter()
                .map(|(k, v)| {
                    Line::from(vec![
                        Span::styled(format!("{k:<44}"), Style::default().fg(Color::DarkGray)),
                        Span::raw(v),
                    ])
                })
                .collect();
            if lines.is_empty() {
                lines.push(Line::from("no parameters"));
            }
            (format!(" {} ", m.market), lines)
        }
        None => (" DETAIL ".to_string(), vec![Line::from("select a market")]),
    };

    let paragraph = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray))
            .title(Span::styled(title, Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))),
    );
    f.render_widget(paragraph, area);
}

fn render_footer(f: &mut Frame, area: Rect) {
    let line = Line::from(vec![
        Span::styled(" [q] ", Style::default().fg(Color::Yellow)),
        Span::raw("quit  "),
        Span::styled("[r] ", Style::default().fg(Color::Yellow)),
        Span::raw("reload  "),
        Span::styled("[↑↓ / j k] ", Style::default().fg(Color::Yellow)),
        Span::raw("select market  "),
        Span::styled("auto-reload: 10s", Style::default().fg(Color::DarkGray)),
    ]);
    f.render_widget(Paragraph::new(line).style(Style::default().fg(Color::White)), area);
}
