// src/tui/ui.rs
use super::{App, InputLine, InputTarget, GRID_COLUMNS};
use crate::core::navigation::Surface;
use crate::core::session::Session;
use crate::core::view::{QuoteCard, RenderTarget, WorkspaceSurface};
use crate::types::Bias;
use crate::utils::format;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{
        Axis, Block, Borders, Chart, Dataset, GraphType, List, ListItem, Paragraph, Row, Table,
        TableState, Wrap,
    },
    Frame,
};

const CARD_HEIGHT: u16 = 6;

pub fn draw(f: &mut Frame, session: &Session, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(10),
            Constraint::Length(7),
            Constraint::Length(1),
        ])
        .split(f.size());

    draw_status(f, chunks[0], session);
    match session.nav().active() {
        Surface::Grid => draw_grid(f, chunks[1], session),
        Surface::Workspace => draw_workspace(f, chunks[1], session),
        Surface::Positions => draw_positions(f, chunks[1], session),
        Surface::Analytics => draw_analytics(f, chunks[1], session),
    }
    draw_notices(f, chunks[2], session);
    draw_footer(f, chunks[3], session, app);
}

fn flag(ok: bool, on: &'static str, off: &'static str) -> Span<'static> {
    if ok {
        Span::styled(on, Style::default().fg(Color::Green))
    } else {
        Span::styled(off, Style::default().fg(Color::Red))
    }
}

fn bias_style(bias: Option<Bias>) -> Style {
    match bias {
        Some(Bias::Bullish) => Style::default().fg(Color::Green),
        Some(Bias::Bearish) => Style::default().fg(Color::Red),
        _ => Style::default().fg(Color::Gray),
    }
}

fn bias_label(bias: Option<Bias>) -> &'static str {
    bias.map(|b| b.as_str()).unwrap_or(format::PLACEHOLDER)
}

fn draw_status(f: &mut Frame, area: Rect, session: &Session) {
    let status = &session.view().status;
    let title = match session.scope() {
        Some(scope) => format!("Trade Desk [{}]", scope.symbol()),
        None => format!("Trade Desk [{}]", session.nav().active().title()),
    };

    let header = Paragraph::new(Line::from(vec![
        Span::styled(title, Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(" | Balance: "),
        Span::styled(
            status.balance.clone(),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ),
        Span::raw(" | Equity: "),
        Span::styled(
            status.equity.clone(),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!(" | {} | Broker: ", status.broker_time)),
        flag(status.connected, "Connected", "Disconnected"),
        Span::raw(" | Stream: "),
        flag(status.streaming, "LIVE", "POLLING"),
    ]))
    .block(Block::default().borders(Borders::ALL).title("Account"));
    f.render_widget(header, area);
}

fn card_widget(card: &RenderTarget<QuoteCard>) -> Paragraph<'_> {
    let view = &card.view;
    let border = if view.hovered {
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    };
    Paragraph::new(vec![
        Line::from(vec![
            Span::styled(
                view.price.clone(),
                Style::default().add_modifier(Modifier::BOLD),
            ),
            Span::raw("  "),
            Span::styled(bias_label(view.bias), bias_style(view.bias)),
        ]),
        Line::from(format!("RSI {}  ATR {}", view.rsi, view.atr)),
        Line::from(format!("Volatility {}", view.atr_status)),
    ])
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(border)
            .title(view.symbol.clone()),
    )
}

fn draw_grid(f: &mut Frame, area: Rect, session: &Session) {
    let grid = &session.view().grid;
    let cards = grid.cards();
    if cards.is_empty() {
        let waiting = Paragraph::new("Waiting for market data...")
            .block(Block::default().borders(Borders::ALL).title("Market"));
        f.render_widget(waiting, area);
        return;
    }

    let visible_rows = (area.height / CARD_HEIGHT).max(1) as usize;
    let hovered = cards.iter().position(|c| c.view.hovered).unwrap_or(0);
    // Прокрутка так, чтобы строка с курсором была видна
    let first_row = (hovered / GRID_COLUMNS + 1).saturating_sub(visible_rows);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints(vec![Constraint::Length(CARD_HEIGHT); visible_rows])
        .split(area);

    for (row_idx, row_area) in rows.iter().enumerate() {
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints(vec![Constraint::Ratio(1, GRID_COLUMNS as u32); GRID_COLUMNS])
            .split(*row_area);
        for (col_idx, cell) in columns.iter().enumerate() {
            let idx = (first_row + row_idx) * GRID_COLUMNS + col_idx;
            if let Some(card) = cards.get(idx) {
                f.render_widget(card_widget(card), *cell);
            }
        }
    }
}

fn draw_line_chart(f: &mut Frame, area: Rect, title: String, points: &[(f64, f64)], empty: &str) {
    let block = Block::default().borders(Borders::ALL).title(title);
    if points.is_empty() {
        f.render_widget(Paragraph::new(empty.to_string()).block(block), area);
        return;
    }

    let (min_y, max_y) = points.iter().fold((f64::MAX, f64::MIN), |(lo, hi), (_, y)| {
        (lo.min(*y), hi.max(*y))
    });
    let pad = ((max_y - min_y) * 0.05).max(f64::EPSILON);
    let max_x = points.last().map(|(x, _)| *x).unwrap_or(1.0).max(1.0);

    let dataset = Dataset::default()
        .marker(symbols::Marker::Braille)
        .graph_type(GraphType::Line)
        .style(Style::default().fg(Color::Cyan))
        .data(points);

    let chart = Chart::new(vec![dataset])
        .block(block)
        .x_axis(Axis::default().bounds([points[0].0, max_x]))
        .y_axis(
            Axis::default()
                .bounds([min_y - pad, max_y + pad])
                .labels(vec![
                    Span::raw(format!("{:.5}", min_y)),
                    Span::raw(format!("{:.5}", max_y)),
                ]),
        );
    f.render_widget(chart, area);
}

fn ticket_lines(ws: &WorkspaceSurface) -> Vec<Line<'_>> {
    let draft = &ws.draft;
    let price = if draft.kind.is_pending() {
        format::price(draft.price)
    } else {
        "Market".to_string()
    };
    let side = if draft.kind.is_buy() {
        Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)
    };
    vec![
        Line::from(vec![Span::raw("Order: "), Span::styled(draft.kind.as_str(), side)]),
        Line::from(format!("Volume: {}", draft.volume)),
        Line::from(format!("Price:  {}", price)),
        Line::from(format!(
            "SL {} / TP {}",
            format::price(Some(draft.sl)),
            format::price(Some(draft.tp))
        )),
    ]
}

fn draw_workspace(f: &mut Frame, area: Rect, session: &Session) {
    let Some(ws) = session.view().workspace.as_ref() else {
        return;
    };
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
        .split(area);

    draw_line_chart(
        f,
        columns[0],
        format!("{} {}", ws.symbol, ws.timeframe),
        &ws.chart,
        "Loading chart...",
    );

    let panel = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(7),
            Constraint::Length(6),
            Constraint::Min(3),
        ])
        .split(columns[1]);

    let readout = Paragraph::new(vec![
        Line::from(vec![
            Span::raw("Bid "),
            Span::styled(ws.bid.clone(), Style::default().fg(Color::Red)),
            Span::raw("  Ask "),
            Span::styled(ws.ask.clone(), Style::default().fg(Color::Green)),
        ]),
        Line::from(format!("Close {}", ws.close)),
        Line::from(vec![
            Span::raw("Bias "),
            Span::styled(bias_label(ws.bias), bias_style(ws.bias)),
        ]),
        Line::from(ws.indicators.clone()),
        Line::from(ws.structure.clone()),
    ])
    .wrap(Wrap { trim: true })
    .block(Block::default().borders(Borders::ALL).title("Quote"));
    f.render_widget(readout, panel[0]);

    let ticket = Paragraph::new(ticket_lines(ws))
        .block(Block::default().borders(Borders::ALL).title("Trade"));
    f.render_widget(ticket, panel[1]);

    let analysis = Paragraph::new(
        ws.analysis
            .clone()
            .unwrap_or_else(|| "Press z for AI analysis".to_string()),
    )
    .wrap(Wrap { trim: true })
    .block(Block::default().borders(Borders::ALL).title("Analysis"));
    f.render_widget(analysis, panel[2]);
}

fn draw_positions(f: &mut Frame, area: Rect, session: &Session) {
    let positions = &session.view().positions;
    let header = Row::new(vec![
        "Ticket", "Symbol", "Type", "Volume", "Open", "SL", "TP", "Profit",
    ])
    .style(Style::default().add_modifier(Modifier::BOLD));

    let rows: Vec<Row> = positions
        .rows
        .iter()
        .map(|p| {
            let profit = if p.losing {
                Style::default().fg(Color::Red)
            } else {
                Style::default().fg(Color::Green)
            };
            let kind = if p.pending {
                format!("{} (pending)", p.side)
            } else {
                p.side.clone()
            };
            Row::new(vec![
                Span::raw(p.ticket.to_string()),
                Span::raw(p.symbol.clone()),
                Span::raw(kind),
                Span::raw(p.volume.clone()),
                Span::raw(p.open_price.clone()),
                Span::raw(p.sl.clone()),
                Span::raw(p.tp.clone()),
                Span::styled(p.profit.clone(), profit),
            ])
        })
        .collect();

    let widths = [
        Constraint::Length(12),
        Constraint::Length(12),
        Constraint::Length(20),
        Constraint::Length(8),
        Constraint::Length(12),
        Constraint::Length(12),
        Constraint::Length(12),
        Constraint::Length(12),
    ];
    let title = if positions.rows.is_empty() {
        "Positions (none)".to_string()
    } else {
        format!("Positions ({})", positions.rows.len())
    };
    let table = Table::new(rows, widths)
        .header(header)
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
        .block(Block::default().borders(Borders::ALL).title(title));

    let mut state = TableState::default();
    if !positions.rows.is_empty() {
        state.select(Some(positions.cursor()));
    }
    f.render_stateful_widget(table, area, &mut state);
}

fn draw_analytics(f: &mut Frame, area: Rect, session: &Session) {
    let analytics = &session.view().analytics;
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Percentage(50),
            Constraint::Min(5),
        ])
        .split(area);

    let summary = if analytics.loading {
        Line::from("Loading history...")
    } else {
        Line::from(vec![
            Span::raw("Total PnL "),
            Span::styled(
                analytics.total_profit.clone(),
                Style::default().add_modifier(Modifier::BOLD),
            ),
            Span::raw(format!(
                " | Trades {} | Win rate {}",
                analytics.trade_count, analytics.win_rate
            )),
        ])
    };
    f.render_widget(
        Paragraph::new(summary).block(Block::default().borders(Borders::ALL).title("Summary")),
        chunks[0],
    );

    draw_line_chart(
        f,
        chunks[1],
        "Equity curve".to_string(),
        &analytics.curve,
        "No closed trades in window",
    );

    let history: Vec<ListItem> = analytics
        .history
        .iter()
        .map(|h| {
            ListItem::new(format!(
                "{} #{} {} {} {} @ {} {} {}",
                h.time, h.ticket, h.symbol, h.side, h.volume, h.price, h.state, h.comment
            ))
        })
        .collect();
    f.render_widget(
        List::new(history).block(Block::default().borders(Borders::ALL).title("Order history")),
        chunks[2],
    );
}

fn draw_notices(f: &mut Frame, area: Rect, session: &Session) {
    let notices: Vec<ListItem> = session
        .view()
        .notices()
        .rev()
        .map(|n| ListItem::new(Line::from(Span::raw(n.as_str()))))
        .collect();
    f.render_widget(
        List::new(notices).block(Block::default().borders(Borders::ALL).title("Notices")),
        area,
    );
}

fn draw_footer(f: &mut Frame, area: Rect, session: &Session, app: &App) {
    let text = match &app.input {
        Some(InputLine {
            target: InputTarget::Symbol,
            buffer,
        }) => format!("Symbol: {}_   [Enter] add  [Tab] search  [Esc] cancel", buffer),
        Some(InputLine {
            target: InputTarget::Draft(field),
            buffer,
        }) => format!(
            "{}: {}_   [Enter] set (empty clears)  [Esc] cancel",
            field.label(),
            buffer
        ),
        None => match session.nav().active() {
            Surface::Grid => {
                "[arrows] move [Enter] open [/] symbol [c/i] popout [p] positions [a] analytics [q] quit"
            }
            Surface::Workspace => {
                "[k] type [up/down] volume [P/S/T] price/SL/TP [Enter] send [t] tf [z] AI [c/i] popout [Esc] back"
            }
            Surface::Positions => "[up/down] select [x] close [e] SL to break-even [g] grid [a] analytics [q] quit",
            Surface::Analytics => "[r] refresh [g] grid [p] positions [q] quit",
        }
        .to_string(),
    };
    f.render_widget(
        Paragraph::new(text).style(Style::default().fg(Color::DarkGray)),
        area,
    );
}
