// src/core/session.rs
//! One dashboard session: owns the store, navigation, view models, timers and
//! popouts. Every input (stream frame, poll tick, pull result, key command)
//! arrives as a [`SessionEvent`] and is handled to completion before the next.

use crate::config::AppConfig;
use crate::connectors::messages::StreamMessage;
use crate::connectors::stream::StreamEvent;
use crate::connectors::traits::DashboardApi;
use crate::core::analytics::summarize;
use crate::core::navigation::{Navigator, Surface};
use crate::core::orders::DraftField;
use crate::core::popout::{PopoutBridge, PopoutTarget};
use crate::core::scheduler::{PollConcern, PollScheduler};
use crate::core::store::{ChartSeries, StateStore};
use crate::core::view::ViewController;
use crate::error::ApiError;
use crate::types::{
    AccountStatus, Advice, Candle, MarketDataPatch, OrderHistoryEntry, OrderReceipt, Position,
    Timeframe, TradeRecord,
};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Show(Surface),
    /// `None` = карточка под курсором.
    OpenWorkspace(Option<String>),
    CloseWorkspace,
    CycleTimeframe,
    MoveCursor(i64),
    CycleOrderKind,
    AdjustVolume(i64),
    /// Ввод цены / SL / TP в тикете; пустая строка сбрасывает поле.
    EditDraft(DraftField, String),
    SubmitOrder,
    ClosePosition,
    BreakEven,
    AddSymbol(String),
    SearchSymbols(String),
    Analyze,
    PopoutChart,
    PopoutInfo,
    Quit,
}

/// Results of background pulls.
#[derive(Debug)]
pub enum Pulled {
    Status(Result<AccountStatus, ApiError>),
    Market(Result<MarketDataPatch, ApiError>),
    Positions(Result<Vec<Position>, ApiError>),
    Chart {
        epoch: u64,
        symbol: String,
        timeframe: Timeframe,
        result: Result<Vec<Candle>, ApiError>,
    },
    Analytics {
        epoch: u64,
        trades: Result<Vec<TradeRecord>, ApiError>,
        orders: Result<Vec<OrderHistoryEntry>, ApiError>,
    },
}

/// Results of user-initiated requests.
#[derive(Debug)]
pub enum Outcome {
    OrderPlaced {
        symbol: String,
        result: Result<OrderReceipt, ApiError>,
    },
    PositionClosed {
        ticket: u64,
        result: Result<(), ApiError>,
    },
    StopMoved {
        ticket: u64,
        result: Result<(), ApiError>,
    },
    SymbolAdded {
        symbol: String,
        result: Result<(), ApiError>,
    },
    SearchResults {
        query: String,
        result: Result<Vec<String>, ApiError>,
    },
    Analysis {
        symbol: String,
        result: Result<Advice, ApiError>,
    },
}

#[derive(Debug)]
pub enum SessionEvent {
    Stream(StreamEvent),
    Command(Command),
    PollDue { concern: PollConcern, epoch: u64 },
    Pulled(Pulled),
    Outcome(Outcome),
}

pub struct Session {
    api: Arc<dyn DashboardApi>,
    events: mpsc::Sender<SessionEvent>,
    store: StateStore,
    nav: Navigator,
    view: ViewController,
    scheduler: PollScheduler,
    popouts: PopoutBridge,
    // Popout-сессия видит только свой символ
    scope: Option<PopoutTarget>,
    running: bool,
}

impl Session {
    pub fn new(
        config: &AppConfig,
        api: Arc<dyn DashboardApi>,
        popouts: PopoutBridge,
        scope: Option<PopoutTarget>,
        events: mpsc::Sender<SessionEvent>,
    ) -> Self {
        let timeframe = match &scope {
            Some(PopoutTarget::Chart { timeframe, .. }) => *timeframe,
            _ => config.ui.default_timeframe,
        };
        Self {
            api,
            scheduler: PollScheduler::new(config.polling.clone(), events.clone()),
            events,
            store: StateStore::new(),
            nav: Navigator::new(timeframe),
            view: ViewController::new(config.ui.default_volume, config.ui.volume_step),
            popouts,
            scope,
            running: true,
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn nav(&self) -> &Navigator {
        &self.nav
    }

    pub fn view(&self) -> &ViewController {
        &self.view
    }

    pub fn scope(&self) -> Option<&PopoutTarget> {
        self.scope.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn take_dirty(&mut self) -> bool {
        self.view.take_dirty()
    }

    /// Arms the timers and issues the initial pulls. The stream is not up
    /// yet, so market polling starts in fallback mode.
    pub fn start(&mut self) {
        self.scheduler.start_status();
        self.scheduler.set_market_fallback(true);
        self.pull_status();
        self.pull_market();
        self.pull_positions();

        match self.scope.clone() {
            Some(PopoutTarget::Chart { symbol, .. }) => {
                info!("Chart popout session for {}", symbol);
                self.open_workspace(Some(symbol));
            }
            Some(PopoutTarget::Info { symbol }) => {
                info!("Info popout session for {}", symbol);
                self.view.enter(&self.store, &self.nav);
            }
            None => self.view.enter(&self.store, &self.nav),
        }
    }

    pub fn shutdown(&mut self) {
        self.running = false;
        self.scheduler.shutdown();
    }

    pub fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Stream(event) => self.on_stream(event),
            SessionEvent::Command(command) => self.on_command(command),
            SessionEvent::PollDue { concern, epoch } => self.on_poll_due(concern, epoch),
            SessionEvent::Pulled(pulled) => self.on_pulled(pulled),
            SessionEvent::Outcome(outcome) => self.on_outcome(outcome),
        }
    }

    // --- Stream ---

    fn on_stream(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Connected => {
                self.store.set_connectivity(true);
                self.view.on_connectivity(&self.store);
                self.scheduler.set_market_fallback(false);
                self.view.notify("Live stream connected");
                // После переподключения: полный ресинк
                self.pull_status();
                self.pull_market();
                self.pull_positions();
            }
            StreamEvent::Disconnected => {
                let was_connected = self.store.stream_connected();
                self.store.set_connectivity(false);
                self.view.on_connectivity(&self.store);
                self.scheduler.set_market_fallback(true);
                if was_connected {
                    self.view.notify("Stream lost, reconnecting...");
                }
            }
            StreamEvent::Message(message) => {
                debug!("Stream {} received", message.kind());
                match message {
                    StreamMessage::MarketData(patch) => self.apply_market(patch),
                    StreamMessage::Status(status) => self.apply_status(status),
                    StreamMessage::Positions(positions) => self.apply_positions(positions),
                }
            }
        }
    }

    fn apply_market(&mut self, mut patch: MarketDataPatch) {
        if let Some(scope) = &self.scope {
            patch.retain_symbol(scope.symbol());
        }
        if patch.is_empty() {
            return;
        }
        let touched = self.store.merge_market_data(&patch);
        self.view.on_market_data(&self.store, &self.nav, &touched);
    }

    fn apply_status(&mut self, status: AccountStatus) {
        self.store.replace_status(status);
        self.view.on_status(&self.store);
    }

    fn apply_positions(&mut self, mut positions: Vec<Position>) {
        if let Some(scope) = &self.scope {
            positions.retain(|p| p.symbol == scope.symbol());
        }
        self.store.replace_positions(positions);
        self.view.on_positions(&self.store, &self.nav);
    }

    // --- Polling ---

    fn on_poll_due(&mut self, concern: PollConcern, epoch: u64) {
        match concern {
            PollConcern::Status => self.pull_status(),
            PollConcern::Market => {
                // Тик мог прийти уже после восстановления стрима
                if self.store.stream_connected() {
                    return;
                }
                self.pull_market();
                self.pull_positions();
            }
            PollConcern::Chart => {
                if self.scheduler.is_current_chart(epoch) {
                    self.pull_chart(epoch);
                } else {
                    debug!("Dropping stale chart tick (epoch {})", epoch);
                }
            }
        }
    }

    fn on_pulled(&mut self, pulled: Pulled) {
        match pulled {
            Pulled::Status(Ok(status)) => self.apply_status(status),
            Pulled::Market(Ok(patch)) => self.apply_market(patch),
            Pulled::Positions(Ok(positions)) => self.apply_positions(positions),
            Pulled::Status(Err(e)) => warn!("Status poll failed: {}", e),
            Pulled::Market(Err(e)) => warn!("Market poll failed: {}", e),
            Pulled::Positions(Err(e)) => warn!("Positions poll failed: {}", e),
            Pulled::Chart {
                epoch,
                symbol,
                timeframe,
                result,
            } => {
                let current = self.scheduler.is_current_chart(epoch)
                    && self.nav.selected() == Some(symbol.as_str())
                    && self.nav.timeframe() == timeframe;
                if !current {
                    debug!("Discarding stale chart {} {} (epoch {})", symbol, timeframe, epoch);
                    return;
                }
                match result {
                    Ok(candles) => {
                        self.store.replace_chart(ChartSeries {
                            symbol,
                            timeframe,
                            candles,
                        });
                        self.view.on_chart(&self.store, &self.nav);
                    }
                    Err(e) => warn!("Chart pull failed for {} {}: {}", symbol, timeframe, e),
                }
            }
            Pulled::Analytics {
                epoch,
                trades,
                orders,
            } => {
                if !self.scheduler.is_current_analytics(epoch) {
                    debug!("Discarding stale analytics (epoch {})", epoch);
                    return;
                }
                match trades {
                    Ok(records) => self.store.replace_analytics(summarize(&records)),
                    Err(e) => {
                        warn!("Trade history pull failed: {}", e);
                        self.view
                            .notify(format!("Analytics unavailable: {}", e.user_message()));
                    }
                }
                match orders {
                    Ok(entries) => self.store.replace_order_history(entries),
                    Err(e) => warn!("Order history pull failed: {}", e),
                }
                self.view.on_analytics(&self.store, &self.nav);
            }
        }
    }

    // --- Commands ---

    fn on_command(&mut self, command: Command) {
        debug!("Command: {:?}", command);
        match command {
            Command::Show(target) => self.show(target),
            Command::OpenWorkspace(symbol) => {
                let symbol = symbol.or_else(|| self.focused_symbol());
                self.open_workspace(symbol);
            }
            Command::CloseWorkspace => self.close_workspace(),
            Command::CycleTimeframe => {
                if let Some(timeframe) = self.nav.cycle_timeframe() {
                    self.store.clear_chart();
                    self.view.retime_workspace(timeframe);
                    let epoch = self.scheduler.arm_chart();
                    self.pull_chart(epoch);
                }
            }
            Command::MoveCursor(delta) => self.view.move_cursor(&self.nav, delta),
            Command::CycleOrderKind => {
                if let Some(draft) = self.view.draft_mut() {
                    draft.cycle_kind();
                }
            }
            Command::AdjustVolume(steps) => {
                if let Some(draft) = self.view.draft_mut() {
                    draft.adjust_volume(steps);
                }
            }
            Command::EditDraft(field, raw) => {
                if let Some(draft) = self.view.draft_mut() {
                    if let Err(e) = draft.set_field(field, &raw) {
                        self.view.notify(e.to_string());
                    }
                }
            }
            Command::SubmitOrder => self.submit_order(),
            Command::ClosePosition => self.close_position(),
            Command::BreakEven => self.move_stop_to_break_even(),
            Command::AddSymbol(symbol) => self.add_symbol(symbol),
            Command::SearchSymbols(query) => self.search_symbols(query),
            Command::Analyze => self.analyze(),
            Command::PopoutChart => self.popout(true),
            Command::PopoutInfo => self.popout(false),
            Command::Quit => self.shutdown(),
        }
    }

    fn show(&mut self, target: Surface) {
        if !self.nav.show(target) {
            return;
        }
        self.scheduler.cancel_analytics();
        self.view.enter(&self.store, &self.nav);
        if target == Surface::Analytics {
            let epoch = self.scheduler.begin_analytics();
            self.pull_analytics(epoch);
        }
    }

    fn open_workspace(&mut self, symbol: Option<String>) {
        if !self.nav.open_workspace(symbol.as_deref()) {
            return;
        }
        self.scheduler.cancel_analytics();
        self.store.clear_chart();
        self.view.enter(&self.store, &self.nav);
        let epoch = self.scheduler.arm_chart();
        self.pull_chart(epoch);
    }

    fn close_workspace(&mut self) {
        if matches!(self.scope, Some(PopoutTarget::Chart { .. })) {
            self.shutdown();
            return;
        }
        if self.nav.close_workspace() {
            self.scheduler.cancel_chart();
            self.store.clear_chart();
            self.view.enter(&self.store, &self.nav);
        }
    }

    /// Символ workspace, иначе карточка под курсором.
    fn focused_symbol(&self) -> Option<String> {
        match self.nav.active() {
            Surface::Workspace => self.nav.selected().map(str::to_string),
            Surface::Grid => self.view.grid.hovered_symbol().map(str::to_string),
            _ => None,
        }
    }

    fn submit_order(&mut self) {
        let Some(workspace) = self.view.workspace.as_ref() else {
            return;
        };
        let order = match workspace.draft.validate(self.nav.selected()) {
            Ok(order) => order,
            Err(e) => {
                self.view.notify(e.to_string());
                return;
            }
        };

        info!(
            "Placing {} {} {} @ {}",
            order.action.as_str(),
            order.volume,
            order.symbol,
            order.price
        );
        self.view.notify(format!(
            "Sending {} {} {}...",
            order.action.as_str(),
            order.volume,
            order.symbol
        ));
        self.spawn_request(move |api| async move {
            let result = api.place_order(&order).await;
            SessionEvent::Outcome(Outcome::OrderPlaced {
                symbol: order.symbol,
                result,
            })
        });
    }

    fn close_position(&mut self) {
        if !self.nav.is_visible(Surface::Positions) {
            return;
        }
        let Some(ticket) = self.view.positions.selected_ticket() else {
            return;
        };
        info!("Closing position #{}", ticket);
        self.spawn_request(move |api| async move {
            let result = api.close_position(ticket).await;
            SessionEvent::Outcome(Outcome::PositionClosed { ticket, result })
        });
    }

    fn move_stop_to_break_even(&mut self) {
        if !self.nav.is_visible(Surface::Positions) {
            return;
        }
        let Some(position) = self
            .view
            .positions
            .selected_ticket()
            .and_then(|ticket| self.store.position(ticket))
        else {
            return;
        };
        let (ticket, sl, tp) = (position.ticket, position.open_price, position.tp);
        info!("Moving SL to break-even for #{} ({})", ticket, sl);
        self.spawn_request(move |api| async move {
            let result = api.modify_position(ticket, sl, tp).await;
            SessionEvent::Outcome(Outcome::StopMoved { ticket, result })
        });
    }

    fn add_symbol(&mut self, symbol: String) {
        let symbol = symbol.trim().to_string();
        if symbol.is_empty() {
            self.view.notify("Enter a symbol to add");
            return;
        }
        self.spawn_request(move |api| async move {
            let result = api.add_symbol(&symbol).await;
            SessionEvent::Outcome(Outcome::SymbolAdded { symbol, result })
        });
    }

    fn search_symbols(&mut self, query: String) {
        let query = query.trim().to_string();
        if query.is_empty() {
            return;
        }
        self.spawn_request(move |api| async move {
            let result = api.search_symbols(&query).await;
            SessionEvent::Outcome(Outcome::SearchResults { query, result })
        });
    }

    fn analyze(&mut self) {
        let Some(symbol) = self.nav.selected().map(str::to_string) else {
            self.view.notify("Open a symbol first");
            return;
        };
        self.view
            .on_analysis(&self.nav, &symbol, "Analyzing...".to_string());
        self.spawn_request(move |api| async move {
            let result = api.analyze_symbol(&symbol).await;
            SessionEvent::Outcome(Outcome::Analysis { symbol, result })
        });
    }

    fn popout(&mut self, chart: bool) {
        let Some(symbol) = self.focused_symbol() else {
            self.view.notify("Select a symbol first");
            return;
        };
        let result = if chart {
            self.popouts.open_chart(&symbol, self.nav.timeframe())
        } else {
            self.popouts.open_info(&symbol)
        };
        match result {
            Ok(id) => {
                debug!("Popout {} opened for {}", id, symbol);
                self.view.notify(format!(
                    "Opened popout for {} ({} this session)",
                    symbol,
                    self.popouts.opened().len()
                ));
            }
            Err(e) => self.view.notify(e.to_string()),
        }
    }

    fn on_outcome(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::OrderPlaced { symbol, result } => match result {
                Ok(receipt) => {
                    info!("Order placed for {}: ticket #{}", symbol, receipt.ticket);
                    self.view
                        .notify(format!("Order placed! Ticket: {}", receipt.ticket));
                    // В popout окно остаётся открытым
                    if self.scope.is_none() && self.nav.selected() == Some(symbol.as_str()) {
                        self.close_workspace();
                    }
                    self.pull_positions();
                }
                Err(e) => {
                    warn!("Order for {} rejected: {}", symbol, e);
                    self.view.notify(format!("Error: {}", e.user_message()));
                }
            },
            Outcome::PositionClosed { ticket, result } => {
                self.report(result, format!("Position #{} closed", ticket));
            }
            Outcome::StopMoved { ticket, result } => {
                self.report(result, format!("SL moved to break-even for #{}", ticket));
            }
            Outcome::SymbolAdded { symbol, result } => {
                if result.is_ok() {
                    self.pull_market();
                }
                self.report(result, format!("Added {}", symbol));
            }
            Outcome::SearchResults { query, result } => match result {
                Ok(found) if found.is_empty() => {
                    self.view.notify(format!("No symbols match '{}'", query))
                }
                Ok(found) => self
                    .view
                    .notify(format!("'{}': {}", query, found.join(", "))),
                Err(e) => self
                    .view
                    .notify(format!("Search failed: {}", e.user_message())),
            },
            Outcome::Analysis { symbol, result } => {
                let text = match result {
                    Ok(advice) => advice.summary(),
                    Err(e) => {
                        warn!("Analysis for {} failed: {}", symbol, e);
                        format!("Analysis failed: {}", e.user_message())
                    }
                };
                // Ответ для уже закрытого символа просто выбрасывается
                self.view.on_analysis(&self.nav, &symbol, text);
            }
        }
    }

    fn report(&mut self, result: Result<(), ApiError>, success: String) {
        match result {
            Ok(()) => {
                info!("{}", success);
                self.view.notify(success);
                self.pull_positions();
            }
            Err(e) => {
                warn!("Request failed: {}", e);
                self.view.notify(format!("Error: {}", e.user_message()));
            }
        }
    }

    // --- Pulls ---

    fn spawn_request<F, Fut>(&self, request: F)
    where
        F: FnOnce(Arc<dyn DashboardApi>) -> Fut,
        Fut: Future<Output = SessionEvent> + Send + 'static,
    {
        let events = self.events.clone();
        let task = request(Arc::clone(&self.api));
        tokio::spawn(async move {
            if events.send(task.await).await.is_err() {
                debug!("Session closed before request completed");
            }
        });
    }

    fn pull_status(&self) {
        self.spawn_request(|api| async move {
            SessionEvent::Pulled(Pulled::Status(api.fetch_status().await))
        });
    }

    fn pull_market(&self) {
        self.spawn_request(|api| async move {
            SessionEvent::Pulled(Pulled::Market(api.fetch_market_data().await))
        });
    }

    fn pull_positions(&self) {
        self.spawn_request(|api| async move {
            SessionEvent::Pulled(Pulled::Positions(api.fetch_positions().await))
        });
    }

    fn pull_chart(&self, epoch: u64) {
        let Some(symbol) = self.nav.selected().map(str::to_string) else {
            return;
        };
        let timeframe = self.nav.timeframe();
        self.spawn_request(move |api| async move {
            let result = api.fetch_chart(&symbol, timeframe).await;
            SessionEvent::Pulled(Pulled::Chart {
                epoch,
                symbol,
                timeframe,
                result,
            })
        });
    }

    fn pull_analytics(&self, epoch: u64) {
        let days = self.scheduler.analytics_window_days();
        self.spawn_request(move |api| async move {
            let (trades, orders) = tokio::join!(
                api.fetch_trade_history(days),
                api.fetch_order_history(days)
            );
            SessionEvent::Pulled(Pulled::Analytics {
                epoch,
                trades,
                orders,
            })
        });
    }
}
