use crate::error::{ApiError, StreamError};
use crate::types::{
    AccountStatus, Advice, Candle, MarketDataPatch, OrderHistoryEntry, OrderReceipt,
    OrderRequest, Position, Timeframe, TradeRecord,
};
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Один кадр транспорта, уже без протокольных деталей.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Text(String),
    /// Ping/pong/binary: стрим их не использует.
    Ignored,
}

/// Открытое потоковое соединение. `None` = соединение закрыто.
#[async_trait]
pub trait FrameSource: Send {
    async fn next_frame(&mut self) -> Option<Result<Frame, StreamError>>;
}

#[async_trait]
pub trait StreamConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn FrameSource>, StreamError>;
}

/// Pull endpoints of the dashboard server (one-shot request/response).
#[async_trait]
pub trait DashboardApi: Send + Sync {
    async fn fetch_status(&self) -> Result<AccountStatus, ApiError>;

    async fn fetch_market_data(&self) -> Result<MarketDataPatch, ApiError>;

    async fn search_symbols(&self, query: &str) -> Result<Vec<String>, ApiError>;

    async fn fetch_chart(&self, symbol: &str, timeframe: Timeframe)
        -> Result<Vec<Candle>, ApiError>;

    /// Closed deals for the trailing `days` window, newest first.
    async fn fetch_trade_history(&self, days: u32) -> Result<Vec<TradeRecord>, ApiError>;

    async fn fetch_positions(&self) -> Result<Vec<Position>, ApiError>;

    async fn fetch_order_history(&self, days: u32) -> Result<Vec<OrderHistoryEntry>, ApiError>;

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderReceipt, ApiError>;

    async fn close_position(&self, ticket: u64) -> Result<(), ApiError>;

    async fn modify_position(&self, ticket: u64, sl: Decimal, tp: Decimal)
        -> Result<(), ApiError>;

    async fn add_symbol(&self, symbol: &str) -> Result<(), ApiError>;

    async fn analyze_symbol(&self, symbol: &str) -> Result<Advice, ApiError>;
}
