// src/connectors/messages.rs
use crate::types::{AccountStatus, MarketDataPatch, Position};
use serde::Deserialize;

/// Конверт стрима: `{"type": "...", "data": ...}`.
/// Канал только на приём, исходящих сообщений нет.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum StreamMessage {
    /// Частичное обновление: мержится поле за полем.
    #[serde(rename = "MARKET_DATA")]
    MarketData(MarketDataPatch),
    /// Полная замена.
    #[serde(rename = "STATUS")]
    Status(AccountStatus),
    /// Полная замена всего набора позиций.
    #[serde(rename = "POSITIONS")]
    Positions(Vec<Position>),
}

impl StreamMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            StreamMessage::MarketData(_) => "MARKET_DATA",
            StreamMessage::Status(_) => "STATUS",
            StreamMessage::Positions(_) => "POSITIONS",
        }
    }
}

pub fn parse_stream_message(text: &str) -> Result<StreamMessage, serde_json::Error> {
    serde_json::from_str(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OrderKind;

    #[test]
    fn classifies_each_envelope_type() {
        let md = parse_stream_message(
            r#"{"type": "MARKET_DATA", "data": {"EURUSD": {"bid": 1.0841, "ask": 1.0843}}}"#,
        )
        .unwrap();
        assert_eq!(md.kind(), "MARKET_DATA");

        let status = parse_stream_message(
            r#"{"type": "STATUS", "data": {"balance": 100000, "equity": 99850.5, "connected": true}}"#,
        )
        .unwrap();
        match status {
            StreamMessage::Status(s) => assert!(s.connected),
            other => panic!("unexpected {:?}", other),
        }

        let positions = parse_stream_message(
            r#"{"type": "POSITIONS", "data": [{"ticket": 1, "symbol": "XAUUSD", "side": "SELL", "volume": 0.5, "open_price": 2350.1, "profit": -12.4}]}"#,
        )
        .unwrap();
        match positions {
            StreamMessage::Positions(list) => {
                assert_eq!(list.len(), 1);
                assert_eq!(list[0].side, OrderKind::Sell);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn rejects_unknown_type_and_broken_payloads() {
        assert!(parse_stream_message(r#"{"type": "HEARTBEAT", "data": {}}"#).is_err());
        assert!(parse_stream_message(r#"{"type": "STATUS", "data": {"balance": "abc"}}"#).is_err());
        assert!(parse_stream_message("not json").is_err());
        assert!(parse_stream_message(r#"{"data": {}}"#).is_err());
    }
}
