// src/core/store.rs
use crate::core::analytics::AnalyticsSummary;
use crate::types::{
    AccountStatus, Candle, MarketDataPatch, OrderHistoryEntry, Position, Quote, Timeframe,
};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Последний загруженный график (symbol, timeframe).
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSeries {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub candles: Vec<Candle>,
}

/// Локальный снимок серверного состояния. Методы `merge_*` / `replace_*`
/// единственные точки записи; рендер только читает.
#[derive(Debug)]
pub struct StateStore {
    quotes: HashMap<String, Quote>,
    // Порядок вставки: сетка не должна прыгать
    order: Vec<String>,
    status: AccountStatus,
    stream_connected: bool,
    positions: Vec<Position>,
    positions_version: u64,
    chart: Option<ChartSeries>,
    analytics: Option<AnalyticsSummary>,
    order_history: Vec<OrderHistoryEntry>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self {
            quotes: HashMap::new(),
            order: Vec::new(),
            status: AccountStatus {
                balance: Decimal::ZERO,
                equity: Decimal::ZERO,
                server_time: None,
                connected: false,
            },
            stream_connected: false,
            positions: Vec::new(),
            positions_version: 0,
            chart: None,
            analytics: None,
            order_history: Vec::new(),
        }
    }
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shallow field-wise merge. Returns the symbols touched by this patch,
    /// in patch order.
    pub fn merge_market_data(&mut self, patch: &MarketDataPatch) -> Vec<String> {
        let mut touched = Vec::with_capacity(patch.0.len());
        for (symbol, update) in &patch.0 {
            match self.quotes.get_mut(symbol) {
                Some(existing) => existing.merge(update),
                None => {
                    self.quotes.insert(symbol.clone(), update.clone());
                    self.order.push(symbol.clone());
                }
            }
            touched.push(symbol.clone());
        }
        touched
    }

    pub fn replace_status(&mut self, status: AccountStatus) {
        self.status = status;
    }

    /// Stream connectivity. Kept apart from `status.connected`, which is the
    /// broker terminal link reported by the server.
    pub fn set_connectivity(&mut self, connected: bool) {
        self.stream_connected = connected;
    }

    pub fn replace_positions(&mut self, positions: Vec<Position>) {
        self.positions = positions;
        self.positions_version += 1;
    }

    pub fn replace_chart(&mut self, series: ChartSeries) {
        self.chart = Some(series);
    }

    pub fn clear_chart(&mut self) {
        self.chart = None;
    }

    pub fn replace_analytics(&mut self, summary: AnalyticsSummary) {
        self.analytics = Some(summary);
    }

    pub fn replace_order_history(&mut self, entries: Vec<OrderHistoryEntry>) {
        self.order_history = entries;
    }

    pub fn quote(&self, symbol: &str) -> Option<&Quote> {
        self.quotes.get(symbol)
    }

    /// Котировки в порядке первого появления.
    pub fn quotes(&self) -> impl Iterator<Item = (&str, &Quote)> {
        self.order
            .iter()
            .filter_map(move |s| self.quotes.get(s).map(|q| (s.as_str(), q)))
    }

    pub fn symbols(&self) -> &[String] {
        &self.order
    }

    pub fn status(&self) -> &AccountStatus {
        &self.status
    }

    pub fn stream_connected(&self) -> bool {
        self.stream_connected
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn positions_version(&self) -> u64 {
        self.positions_version
    }

    pub fn position(&self, ticket: u64) -> Option<&Position> {
        self.positions.iter().find(|p| p.ticket == ticket)
    }

    pub fn chart(&self) -> Option<&ChartSeries> {
        self.chart.as_ref()
    }

    pub fn analytics(&self) -> Option<&AnalyticsSummary> {
        self.analytics.as_ref()
    }

    pub fn order_history(&self) -> &[OrderHistoryEntry] {
        &self.order_history
    }
}
