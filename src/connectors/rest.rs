// src/connectors/rest.rs
use crate::connectors::traits::DashboardApi;
use crate::error::ApiError;
use crate::types::{
    AccountStatus, Advice, Candle, MarketDataPatch, OrderHistoryEntry, OrderReceipt,
    OrderRequest, Position, Timeframe, TradeRecord,
};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct RestClient {
    http_client: Client,
    base_url: String,
}

/// Тело ошибки FastAPI (`detail`) или торгового ответа (`message`).
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

impl ErrorBody {
    fn text(&self) -> Option<String> {
        if let Some(message) = &self.message {
            return Some(message.clone());
        }
        match &self.detail {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
            None => None,
        }
    }
}

#[derive(Serialize)]
struct TicketBody {
    ticket: u64,
}

#[derive(Serialize)]
struct ModifyBody {
    ticket: u64,
    sl: Decimal,
    tp: Decimal,
}

impl RestClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let http_client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn request(&self, method: Method, endpoint: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!("{} {}", method, url);
        self.http_client.request(method, url)
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let response = checked(builder.send().await?).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Торговые эндпоинты отвечают 200 даже на отказ брокера:
    /// `{"status": "error", "message": "..."}`.
    async fn send_action(&self, builder: RequestBuilder) -> Result<serde_json::Value, ApiError> {
        let value: serde_json::Value = self.send_json(builder).await?;
        let body: ErrorBody = serde_json::from_value(value.clone()).unwrap_or_default();
        if body.status.as_deref() == Some("error") {
            return Err(ApiError::Rejected {
                status: 200,
                message: body.text().unwrap_or_else(|| "request failed".to_string()),
            });
        }
        Ok(value)
    }
}

async fn checked(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let raw = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&raw)
        .ok()
        .and_then(|body| body.text())
        .unwrap_or_else(|| {
            if raw.is_empty() {
                status.to_string()
            } else {
                raw
            }
        });
    Err(ApiError::Rejected {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl DashboardApi for RestClient {
    async fn fetch_status(&self) -> Result<AccountStatus, ApiError> {
        self.send_json(self.request(Method::GET, "/status")).await
    }

    async fn fetch_market_data(&self) -> Result<MarketDataPatch, ApiError> {
        self.send_json(self.request(Method::GET, "/market_data"))
            .await
    }

    async fn search_symbols(&self, query: &str) -> Result<Vec<String>, ApiError> {
        let builder = self
            .request(Method::GET, "/symbols/search")
            .query(&[("query", query)]);
        self.send_json(builder).await
    }

    async fn fetch_chart(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Vec<Candle>, ApiError> {
        let builder = self
            .request(Method::GET, "/chart")
            .query(&[("symbol", symbol), ("timeframe", timeframe.as_str())]);
        self.send_json(builder).await
    }

    async fn fetch_trade_history(&self, days: u32) -> Result<Vec<TradeRecord>, ApiError> {
        let builder = self
            .request(Method::GET, "/history/trades")
            .query(&[("days", days)]);
        self.send_json(builder).await
    }

    async fn fetch_positions(&self) -> Result<Vec<Position>, ApiError> {
        self.send_json(self.request(Method::GET, "/positions")).await
    }

    async fn fetch_order_history(&self, days: u32) -> Result<Vec<OrderHistoryEntry>, ApiError> {
        let builder = self
            .request(Method::GET, "/history/orders")
            .query(&[("days", days)]);
        self.send_json(builder).await
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderReceipt, ApiError> {
        info!(
            "🚀 Sending Order: {} {} {} @ {}",
            order.action.as_str(),
            order.volume,
            order.symbol,
            order.price
        );
        let value = self
            .send_action(self.request(Method::POST, "/trade").json(order))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn close_position(&self, ticket: u64) -> Result<(), ApiError> {
        info!("Closing position #{}", ticket);
        self.send_action(
            self.request(Method::POST, "/positions/close")
                .json(&TicketBody { ticket }),
        )
        .await?;
        Ok(())
    }

    async fn modify_position(&self, ticket: u64, sl: Decimal, tp: Decimal) -> Result<(), ApiError> {
        info!("Modifying position #{}: SL {} TP {}", ticket, sl, tp);
        self.send_action(
            self.request(Method::POST, "/positions/modify")
                .json(&ModifyBody { ticket, sl, tp }),
        )
        .await?;
        Ok(())
    }

    async fn add_symbol(&self, symbol: &str) -> Result<(), ApiError> {
        let builder = self
            .request(Method::POST, "/symbols")
            .query(&[("symbol", symbol)]);
        self.send_action(builder).await?;
        Ok(())
    }

    async fn analyze_symbol(&self, symbol: &str) -> Result<Advice, ApiError> {
        let endpoint = format!("/analyze/{}", symbol);
        self.send_json(self.request(Method::POST, &endpoint)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_prefers_message_then_detail() {
        let body: ErrorBody =
            serde_json::from_str(r#"{"status": "error", "message": "No money"}"#).unwrap();
        assert_eq!(body.text().as_deref(), Some("No money"));

        let body: ErrorBody =
            serde_json::from_str(r#"{"detail": "FTMO MAX LOSS HIT"}"#).unwrap();
        assert_eq!(body.text().as_deref(), Some("FTMO MAX LOSS HIT"));

        let body: ErrorBody = serde_json::from_str(r#"{"detail": [{"loc": ["body"]}]}"#).unwrap();
        assert!(body.text().unwrap().contains("loc"));
    }

    #[test]
    fn base_url_is_trimmed() {
        let client = RestClient::new("http://127.0.0.1:8000/api/").unwrap();
        assert_eq!(client.base_url, "http://127.0.0.1:8000/api");
    }
}
