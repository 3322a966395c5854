// src/core/view.rs
//! Render-target models for every surface and the rules deciding which of
//! them repaint for a given update. The terminal painter in `tui` only reads
//! these models.

use crate::core::navigation::{Navigator, Surface};
use crate::core::orders::OrderDraft;
use crate::core::store::StateStore;
use crate::types::{Bias, PositionStatus, Quote, Timeframe};
use crate::utils::format;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};

const MAX_NOTICES: usize = 20;

/// Цель рендера с постоянной идентичностью: обновляется на месте.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderTarget<T> {
    pub id: u64,
    pub paints: u64,
    pub view: T,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuoteCard {
    pub symbol: String,
    pub price: String,
    pub bias: Option<Bias>,
    pub rsi: String,
    pub atr: String,
    pub atr_status: String,
    /// Transient UI state, survives data repaints.
    pub hovered: bool,
}

impl QuoteCard {
    fn fill(&mut self, quote: &Quote) {
        self.price = format::price(quote.close);
        self.bias = quote.bias;
        self.rsi = format::indicator(quote.rsi, 1);
        self.atr = format::indicator(quote.atr, 2);
        self.atr_status = format::text(quote.atr_status.as_deref());
    }
}

#[derive(Debug, Default)]
pub struct GridSurface {
    cards: Vec<RenderTarget<QuoteCard>>,
    index: HashMap<String, usize>,
    cursor: usize,
}

impl GridSurface {
    pub fn cards(&self) -> &[RenderTarget<QuoteCard>] {
        &self.cards
    }

    pub fn card(&self, symbol: &str) -> Option<&RenderTarget<QuoteCard>> {
        self.index.get(symbol).map(|&i| &self.cards[i])
    }

    pub fn hovered_symbol(&self) -> Option<&str> {
        self.cards
            .get(self.cursor)
            .map(|card| card.view.symbol.as_str())
    }

    fn move_cursor(&mut self, delta: i64) {
        if self.cards.is_empty() {
            return;
        }
        let last = self.cards.len() as i64 - 1;
        let next = (self.cursor as i64 + delta).clamp(0, last) as usize;
        if let Some(card) = self.cards.get_mut(self.cursor) {
            card.view.hovered = false;
        }
        self.cursor = next;
        if let Some(card) = self.cards.get_mut(self.cursor) {
            card.view.hovered = true;
        }
    }

    /// Create-or-update-in-place; cards are never removed on data updates.
    fn upsert(&mut self, symbol: &str, quote: &Quote, next_id: &mut u64) {
        match self.index.get(symbol) {
            Some(&i) => {
                let card = &mut self.cards[i];
                card.view.fill(quote);
                card.paints += 1;
            }
            None => {
                let mut view = QuoteCard {
                    symbol: symbol.to_string(),
                    price: String::new(),
                    bias: None,
                    rsi: String::new(),
                    atr: String::new(),
                    atr_status: String::new(),
                    hovered: self.cards.len() == self.cursor,
                };
                view.fill(quote);
                *next_id += 1;
                self.index.insert(symbol.to_string(), self.cards.len());
                self.cards.push(RenderTarget {
                    id: *next_id,
                    paints: 1,
                    view,
                });
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkspaceSurface {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub bid: String,
    pub ask: String,
    pub close: String,
    pub bias: Option<Bias>,
    pub indicators: String,
    pub structure: String,
    /// (index, close) для painter'а графика.
    pub chart: Vec<(f64, f64)>,
    pub analysis: Option<String>,
    pub draft: OrderDraft,
    pub quote_paints: u64,
}

impl WorkspaceSurface {
    fn open(symbol: &str, timeframe: Timeframe, draft: OrderDraft) -> Self {
        Self {
            symbol: symbol.to_string(),
            timeframe,
            bid: format::PLACEHOLDER.to_string(),
            ask: format::PLACEHOLDER.to_string(),
            close: format::PLACEHOLDER.to_string(),
            bias: None,
            indicators: String::new(),
            structure: String::new(),
            chart: Vec::new(),
            analysis: None,
            draft,
            quote_paints: 0,
        }
    }

    fn fill_quote(&mut self, quote: Option<&Quote>) {
        let empty = Quote::default();
        let quote = quote.unwrap_or(&empty);
        self.bid = format::price(quote.bid);
        self.ask = format::price(quote.ask);
        self.close = format::price(quote.close);
        self.bias = quote.bias;
        self.indicators = format!(
            "RSI {} | ATR {} | EMA20 {} | EMA50 {}",
            format::indicator(quote.rsi, 1),
            format::indicator(quote.atr, 2),
            format::indicator(quote.ema20, 5),
            format::indicator(quote.ema50, 5)
        );
        self.structure = format!(
            "ATR {} | Liquidity {} | FVG {}",
            format::text(quote.atr_status.as_deref()),
            format::text(quote.liquidity_state.as_deref()),
            format::text(quote.fvg_state.as_deref())
        );
        self.quote_paints += 1;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionRow {
    pub ticket: u64,
    pub symbol: String,
    pub side: String,
    pub volume: String,
    pub open_price: String,
    pub sl: String,
    pub tp: String,
    pub profit: String,
    pub losing: bool,
    pub pending: bool,
}

#[derive(Debug, Default)]
pub struct PositionsSurface {
    pub rows: Vec<PositionRow>,
    /// Версия набора позиций в store, которую показывают строки.
    pub painted_version: u64,
    pub stale: bool,
    cursor: usize,
}

impl PositionsSurface {
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn selected_ticket(&self) -> Option<u64> {
        self.rows.get(self.cursor).map(|row| row.ticket)
    }

    fn paint(&mut self, store: &StateStore) {
        let selected = self.selected_ticket();
        self.rows = store
            .positions()
            .iter()
            .map(|p| PositionRow {
                ticket: p.ticket,
                symbol: p.symbol.clone(),
                side: p.side.as_str().to_string(),
                volume: p.volume.to_string(),
                open_price: format::price(Some(p.open_price)),
                sl: stop_level(p.sl),
                tp: stop_level(p.tp),
                profit: format::signed_money(p.profit),
                losing: p.profit < Decimal::ZERO,
                pending: p.status() == PositionStatus::Pending,
            })
            .collect();
        self.painted_version = store.positions_version();
        self.stale = false;
        // Курсор следует за тикетом, а не за номером строки
        self.cursor = selected
            .and_then(|ticket| self.rows.iter().position(|row| row.ticket == ticket))
            .unwrap_or_else(|| self.cursor.min(self.rows.len().saturating_sub(1)));
    }
}

fn stop_level(level: Decimal) -> String {
    if level.is_zero() {
        format::PLACEHOLDER.to_string()
    } else {
        format::price(Some(level))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRow {
    pub ticket: u64,
    pub time: String,
    pub symbol: String,
    pub side: String,
    pub volume: String,
    pub price: String,
    pub state: String,
    pub comment: String,
}

#[derive(Debug, Default)]
pub struct AnalyticsSurface {
    pub loading: bool,
    pub total_profit: String,
    pub trade_count: String,
    pub win_rate: String,
    /// (trade #, cumulative PnL)
    pub curve: Vec<(f64, f64)>,
    pub history: Vec<HistoryRow>,
}

impl AnalyticsSurface {
    fn paint(&mut self, store: &StateStore) {
        match store.analytics() {
            Some(summary) => {
                self.total_profit = format::signed_money(summary.total_profit);
                self.trade_count = format!("{} ({} wins)", summary.trade_count, summary.wins);
                self.win_rate = format!("{:.1}%", summary.win_rate);
                self.curve = summary
                    .equity_curve
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (i as f64 + 1.0, decimal_to_f64(*v)))
                    .collect();
            }
            None => {
                self.total_profit = format::PLACEHOLDER.to_string();
                self.trade_count = format::PLACEHOLDER.to_string();
                self.win_rate = format::PLACEHOLDER.to_string();
                self.curve.clear();
            }
        }
        self.history = store
            .order_history()
            .iter()
            .map(|entry| HistoryRow {
                ticket: entry.ticket,
                time: format::unix_time(entry.time),
                symbol: entry.symbol.clone(),
                side: entry.side.as_str().to_string(),
                volume: entry.volume.to_string(),
                price: format::price(Some(entry.price)),
                state: entry.state.clone(),
                comment: entry.comment.clone(),
            })
            .collect();
    }
}

fn decimal_to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusReadout {
    pub balance: String,
    pub equity: String,
    pub broker_time: String,
    /// Broker terminal link (from STATUS).
    pub connected: bool,
    /// Live stream link.
    pub streaming: bool,
    pub paints: u64,
}

impl Default for StatusReadout {
    fn default() -> Self {
        Self {
            balance: format::PLACEHOLDER.to_string(),
            equity: format::PLACEHOLDER.to_string(),
            broker_time: format::PLACEHOLDER.to_string(),
            connected: false,
            streaming: false,
            paints: 0,
        }
    }
}

pub struct ViewController {
    pub grid: GridSurface,
    pub workspace: Option<WorkspaceSurface>,
    pub positions: PositionsSurface,
    pub analytics: AnalyticsSurface,
    pub status: StatusReadout,
    notices: VecDeque<String>,
    next_id: u64,
    dirty: bool,
    default_volume: Decimal,
    volume_step: Decimal,
}

impl ViewController {
    pub fn new(default_volume: Decimal, volume_step: Decimal) -> Self {
        Self {
            grid: GridSurface::default(),
            workspace: None,
            positions: PositionsSurface::default(),
            analytics: AnalyticsSurface::default(),
            status: StatusReadout::default(),
            notices: VecDeque::new(),
            next_id: 0,
            dirty: true,
            default_volume,
            volume_step,
        }
    }

    /// Сбрасывает флаг "нужно перерисовать кадр".
    pub fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }

    pub fn notices(&self) -> impl DoubleEndedIterator<Item = &String> {
        self.notices.iter()
    }

    pub fn notify(&mut self, message: impl Into<String>) {
        self.notices.push_back(message.into());
        if self.notices.len() > MAX_NOTICES {
            self.notices.pop_front();
        }
        self.dirty = true;
    }

    /// Only the touched symbols repaint, and only on visible surfaces.
    pub fn on_market_data(&mut self, store: &StateStore, nav: &Navigator, touched: &[String]) {
        if nav.is_visible(Surface::Grid) {
            for symbol in touched {
                if let Some(quote) = store.quote(symbol) {
                    self.grid.upsert(symbol, quote, &mut self.next_id);
                }
            }
            self.dirty |= !touched.is_empty();
        }

        if let (Some(selected), Some(ws)) = (nav.selected(), self.workspace.as_mut()) {
            if touched.iter().any(|s| s == selected) && ws.symbol == selected {
                ws.fill_quote(store.quote(selected));
                self.dirty = true;
            }
        }
    }

    pub fn on_status(&mut self, store: &StateStore) {
        let status = store.status();
        self.status.balance = format::money(status.balance);
        self.status.equity = format::money(status.equity);
        self.status.broker_time = status
            .broker_time()
            .map(|t| t.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| format::PLACEHOLDER.to_string());
        self.status.connected = status.connected;
        self.status.streaming = store.stream_connected();
        self.status.paints += 1;
        self.dirty = true;
    }

    pub fn on_connectivity(&mut self, store: &StateStore) {
        self.status.streaming = store.stream_connected();
        self.status.paints += 1;
        self.dirty = true;
    }

    pub fn on_positions(&mut self, store: &StateStore, nav: &Navigator) {
        if nav.is_visible(Surface::Positions) {
            self.positions.paint(store);
            self.dirty = true;
        } else {
            self.positions.stale = true;
        }
    }

    pub fn on_chart(&mut self, store: &StateStore, nav: &Navigator) {
        let (Some(selected), Some(ws)) = (nav.selected(), self.workspace.as_mut()) else {
            return;
        };
        if let Some(series) = store.chart() {
            if series.symbol == selected && series.timeframe == ws.timeframe {
                ws.chart = series
                    .candles
                    .iter()
                    .enumerate()
                    .map(|(i, c)| (i as f64, c.close))
                    .collect();
                self.dirty = true;
            }
        }
    }

    pub fn on_analytics(&mut self, store: &StateStore, nav: &Navigator) {
        if nav.is_visible(Surface::Analytics) {
            self.analytics.loading = false;
            self.analytics.paint(store);
            self.dirty = true;
        }
    }

    pub fn on_analysis(&mut self, nav: &Navigator, symbol: &str, text: String) {
        if let (Some(selected), Some(ws)) = (nav.selected(), self.workspace.as_mut()) {
            if selected == symbol {
                ws.analysis = Some(text);
                self.dirty = true;
            }
        }
    }

    /// Full repaint of the destination surface from current state.
    pub fn enter(&mut self, store: &StateStore, nav: &Navigator) {
        match nav.active() {
            Surface::Grid => {
                self.workspace = None;
                for (symbol, quote) in store.quotes() {
                    self.grid.upsert(symbol, quote, &mut self.next_id);
                }
            }
            Surface::Workspace => {
                if let Some(symbol) = nav.selected() {
                    let mut draft = OrderDraft::new(self.default_volume, self.volume_step);
                    draft.prefill(store.quote(symbol));
                    let mut ws = WorkspaceSurface::open(symbol, nav.timeframe(), draft);
                    ws.fill_quote(store.quote(symbol));
                    self.workspace = Some(ws);
                }
            }
            Surface::Positions => self.positions.paint(store),
            Surface::Analytics => {
                self.analytics.loading = true;
                self.analytics.paint(store);
            }
        }
        self.on_status(store);
        self.dirty = true;
    }

    /// Смена таймфрейма: график очищается до прихода нового.
    pub fn retime_workspace(&mut self, timeframe: Timeframe) {
        if let Some(ws) = self.workspace.as_mut() {
            ws.timeframe = timeframe;
            ws.chart.clear();
            self.dirty = true;
        }
    }

    pub fn move_cursor(&mut self, nav: &Navigator, delta: i64) {
        match nav.active() {
            Surface::Grid => self.grid.move_cursor(delta),
            Surface::Positions => {
                if !self.positions.rows.is_empty() {
                    let last = self.positions.rows.len() as i64 - 1;
                    self.positions.cursor =
                        (self.positions.cursor as i64 + delta).clamp(0, last) as usize;
                }
            }
            _ => return,
        }
        self.dirty = true;
    }

    pub fn draft_mut(&mut self) -> Option<&mut OrderDraft> {
        self.dirty = true;
        self.workspace.as_mut().map(|ws| &mut ws.draft)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::analytics::summarize;
    use crate::types::{AccountStatus, MarketDataPatch, OrderKind, Position, TradeRecord};

    fn dec(raw: &str) -> Decimal {
        raw.parse().unwrap()
    }

    fn quote(close: &str) -> Quote {
        Quote {
            close: Some(dec(close)),
            bid: Some(dec(close)),
            ..Default::default()
        }
    }

    fn merge(store: &mut StateStore, entries: &[(&str, &str)]) -> Vec<String> {
        let patch = MarketDataPatch(
            entries
                .iter()
                .map(|(s, c)| (s.to_string(), quote(c)))
                .collect(),
        );
        store.merge_market_data(&patch)
    }

    fn position(ticket: u64) -> Position {
        Position {
            ticket,
            symbol: "EURUSD".to_string(),
            side: OrderKind::Sell,
            volume: dec("0.2"),
            open_price: dec("1.0850"),
            sl: Decimal::ZERO,
            tp: dec("1.0700"),
            profit: dec("-4.10"),
            status: None,
        }
    }

    fn controller() -> ViewController {
        ViewController::new(dec("0.01"), dec("0.01"))
    }

    #[test]
    fn partial_repaint_leaves_other_cards_untouched() {
        let mut store = StateStore::new();
        let nav = Navigator::new(Timeframe::M5);
        let mut view = controller();

        let touched = merge(&mut store, &[("A", "1"), ("B", "2"), ("C", "3")]);
        view.on_market_data(&store, &nav, &touched);
        view.grid.move_cursor(2);
        let c_before = view.grid.card("C").cloned().unwrap();
        let a_id = view.grid.card("A").unwrap().id;

        let touched = merge(&mut store, &[("A", "1.5"), ("B", "2.5")]);
        view.on_market_data(&store, &nav, &touched);

        assert_eq!(view.grid.card("C"), Some(&c_before));
        assert!(view.grid.card("C").unwrap().view.hovered);
        let a = view.grid.card("A").unwrap();
        assert_eq!(a.id, a_id);
        assert_eq!(a.paints, 2);
        assert_eq!(a.view.price, "1.5");
    }

    #[test]
    fn new_symbols_are_appended_and_never_removed() {
        let mut store = StateStore::new();
        let nav = Navigator::new(Timeframe::M5);
        let mut view = controller();

        let touched = merge(&mut store, &[("XAUUSD", "2350"), ("EURUSD", "1.08")]);
        view.on_market_data(&store, &nav, &touched);
        let touched = merge(&mut store, &[("BTCUSD", "65000")]);
        view.on_market_data(&store, &nav, &touched);

        let symbols: Vec<&str> = view
            .grid
            .cards()
            .iter()
            .map(|c| c.view.symbol.as_str())
            .collect();
        assert_eq!(symbols, vec!["XAUUSD", "EURUSD", "BTCUSD"]);
    }

    #[test]
    fn hidden_grid_is_not_repainted_until_entered() {
        let mut store = StateStore::new();
        let mut nav = Navigator::new(Timeframe::M5);
        let mut view = controller();
        nav.show(Surface::Positions);

        let touched = merge(&mut store, &[("EURUSD", "1.08")]);
        view.on_market_data(&store, &nav, &touched);
        assert!(view.grid.cards().is_empty());

        nav.show(Surface::Grid);
        view.enter(&store, &nav);
        assert_eq!(view.grid.card("EURUSD").unwrap().view.price, "1.08");
    }

    #[test]
    fn workspace_readout_refreshes_only_for_its_symbol() {
        let mut store = StateStore::new();
        let mut nav = Navigator::new(Timeframe::M5);
        let mut view = controller();
        merge(&mut store, &[("EURUSD", "1.08"), ("XAUUSD", "2350")]);
        nav.open_workspace(Some("EURUSD"));
        view.enter(&store, &nav);
        let paints = view.workspace.as_ref().unwrap().quote_paints;

        let touched = merge(&mut store, &[("XAUUSD", "2351")]);
        view.on_market_data(&store, &nav, &touched);
        assert_eq!(view.workspace.as_ref().unwrap().quote_paints, paints);

        let touched = merge(&mut store, &[("EURUSD", "1.0812")]);
        view.on_market_data(&store, &nav, &touched);
        let ws = view.workspace.as_ref().unwrap();
        assert_eq!(ws.quote_paints, paints + 1);
        assert_eq!(ws.bid, "1.0812");
        // Сетка под модальной панелью не трогается
        assert!(view.grid.cards().is_empty());
    }

    #[test]
    fn hidden_positions_render_latest_push_on_entry() {
        let mut store = StateStore::new();
        let mut nav = Navigator::new(Timeframe::M5);
        let mut view = controller();

        store.replace_positions(vec![position(1), position(2)]);
        view.on_positions(&store, &nav);
        store.replace_positions(vec![position(3)]);
        view.on_positions(&store, &nav);
        assert!(view.positions.stale);
        assert!(view.positions.rows.is_empty());

        nav.show(Surface::Positions);
        view.enter(&store, &nav);
        assert!(!view.positions.stale);
        assert_eq!(view.positions.rows.len(), 1);
        assert_eq!(view.positions.rows[0].ticket, 3);
        assert_eq!(view.positions.painted_version, store.positions_version());
        assert_eq!(view.positions.rows[0].sl, "-");
        assert!(view.positions.rows[0].losing);
    }

    #[test]
    fn positions_cursor_stays_on_selected_ticket() {
        let mut store = StateStore::new();
        let mut nav = Navigator::new(Timeframe::M5);
        let mut view = controller();
        nav.show(Surface::Positions);

        store.replace_positions(vec![position(7), position(8)]);
        view.enter(&store, &nav);
        view.move_cursor(&nav, 1);
        assert_eq!(view.positions.selected_ticket(), Some(8));

        store.replace_positions(vec![position(8), position(9)]);
        view.on_positions(&store, &nav);
        assert_eq!(view.positions.selected_ticket(), Some(8));
        assert_eq!(view.positions.cursor(), 0);

        // Выбранный тикет закрыт: курсор остаётся в пределах таблицы
        view.move_cursor(&nav, 1);
        store.replace_positions(vec![position(8)]);
        view.on_positions(&store, &nav);
        assert_eq!(view.positions.selected_ticket(), Some(8));
    }

    #[test]
    fn status_always_repaints_and_connectivity_flips_alone() {
        let mut store = StateStore::new();
        let mut view = controller();
        store.replace_status(AccountStatus {
            balance: dec("100000"),
            equity: dec("99850.5"),
            server_time: None,
            connected: true,
        });
        view.on_status(&store);
        assert_eq!(view.status.equity, "$99850.50");
        assert!(view.status.connected);
        assert!(!view.status.streaming);

        store.set_connectivity(true);
        view.on_connectivity(&store);
        assert!(view.status.streaming);
        assert!(view.status.connected);
        assert_eq!(view.status.balance, "$100000.00");
    }

    #[test]
    fn analytics_paints_summary_when_visible() {
        let mut store = StateStore::new();
        let mut nav = Navigator::new(Timeframe::M5);
        let mut view = controller();
        nav.show(Surface::Analytics);
        view.enter(&store, &nav);
        assert!(view.analytics.loading);

        let records: Vec<TradeRecord> = [-10i64, 0, 25, -40, 100]
            .iter()
            .enumerate()
            .map(|(i, p)| TradeRecord {
                ticket: i as u64,
                symbol: "XAUUSD".into(),
                profit: Decimal::from(*p),
                time: 0,
            })
            .collect();
        store.replace_analytics(summarize(&records));
        view.on_analytics(&store, &nav);

        assert!(!view.analytics.loading);
        assert_eq!(view.analytics.total_profit, "+$75.00");
        assert_eq!(view.analytics.win_rate, "50.0%");
        let curve: Vec<f64> = view.analytics.curve.iter().map(|(_, v)| *v).collect();
        assert_eq!(curve, vec![100.0, 60.0, 85.0, 75.0]);
    }

    #[test]
    fn notices_are_capped() {
        let mut view = controller();
        for i in 0..30 {
            view.notify(format!("n{}", i));
        }
        assert_eq!(view.notices().count(), MAX_NOTICES);
        assert_eq!(view.notices().next().map(String::as_str), Some("n10"));
        // Панель уведомлений рисует от новых к старым
        assert_eq!(view.notices().rev().next().map(String::as_str), Some("n29"));
    }
}
