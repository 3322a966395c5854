// src/types.rs
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Направление рынка по EMA-структуре (BULLISH / BEARISH / RANGE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Bias {
    #[serde(alias = "UP")]
    Bullish,
    #[serde(alias = "DOWN")]
    Bearish,
    #[serde(alias = "NEUTRAL")]
    Range,
    #[serde(other)]
    Unknown,
}

impl Bias {
    pub fn as_str(&self) -> &'static str {
        match self {
            Bias::Bullish => "BULLISH",
            Bias::Bearish => "BEARISH",
            Bias::Range => "RANGE",
            Bias::Unknown => "?",
        }
    }
}

/// Котировка символа. Каждое поле опционально: сервер присылает
/// частичные обновления, и отсутствующее поле означает "без изменений".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    #[serde(default)]
    pub close: Option<Decimal>,
    #[serde(default)]
    pub bid: Option<Decimal>,
    #[serde(default)]
    pub ask: Option<Decimal>,
    #[serde(default)]
    pub bias: Option<Bias>,
    #[serde(default)]
    pub rsi: Option<f64>,
    #[serde(default)]
    pub atr: Option<f64>,
    #[serde(default)]
    pub ema20: Option<f64>,
    #[serde(default)]
    pub ema50: Option<f64>,
    #[serde(default)]
    pub atr_status: Option<String>,
    #[serde(default)]
    pub liquidity_state: Option<String>,
    #[serde(default)]
    pub fvg_state: Option<String>,
}

impl Quote {
    /// Field-wise last-write-wins. `None` in the update never clears a value.
    pub fn merge(&mut self, update: &Quote) {
        fn take<T: Clone>(slot: &mut Option<T>, incoming: &Option<T>) {
            if let Some(v) = incoming {
                *slot = Some(v.clone());
            }
        }

        take(&mut self.close, &update.close);
        take(&mut self.bid, &update.bid);
        take(&mut self.ask, &update.ask);
        take(&mut self.bias, &update.bias);
        take(&mut self.rsi, &update.rsi);
        take(&mut self.atr, &update.atr);
        take(&mut self.ema20, &update.ema20);
        take(&mut self.ema50, &update.ema50);
        take(&mut self.atr_status, &update.atr_status);
        take(&mut self.liquidity_state, &update.liquidity_state);
        take(&mut self.fvg_state, &update.fvg_state);
    }

    #[cfg(test)]
    pub fn field_count(&self) -> usize {
        [
            self.close.is_some(),
            self.bid.is_some(),
            self.ask.is_some(),
            self.bias.is_some(),
            self.rsi.is_some(),
            self.atr.is_some(),
            self.ema20.is_some(),
            self.ema50.is_some(),
            self.atr_status.is_some(),
            self.liquidity_state.is_some(),
            self.fvg_state.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }
}

/// Частичный пуш MARKET_DATA: `{ "EURUSD": {...}, "XAUUSD": {...} }`.
/// Порядок ключей сохраняется, чтобы новые карточки в сетке
/// появлялись в том же порядке, что и на сервере.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarketDataPatch(pub Vec<(String, Quote)>);

impl MarketDataPatch {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Оставляет только один символ (для popout-сессий).
    pub fn retain_symbol(&mut self, symbol: &str) {
        self.0.retain(|(s, _)| s == symbol);
    }
}

impl<'de> Deserialize<'de> for MarketDataPatch {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct PatchVisitor;

        impl<'de> Visitor<'de> for PatchVisitor {
            type Value = MarketDataPatch;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of symbol -> partial quote")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries: Vec<(String, Quote)> =
                    Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((symbol, quote)) = map.next_entry::<String, Quote>()? {
                    match entries.iter_mut().find(|entry| entry.0 == symbol) {
                        Some((_, existing)) => existing.merge(&quote),
                        None => entries.push((symbol, quote)),
                    }
                }
                Ok(MarketDataPatch(entries))
            }
        }

        deserializer.deserialize_map(PatchVisitor)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountStatus {
    pub balance: Decimal,
    pub equity: Decimal,
    /// Время брокера (unix seconds).
    #[serde(default)]
    pub server_time: Option<i64>,
    #[serde(default)]
    pub connected: bool,
}

impl AccountStatus {
    pub fn broker_time(&self) -> Option<DateTime<Utc>> {
        self.server_time
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderKind {
    Buy,
    Sell,
    BuyLimit,
    SellLimit,
    BuyStop,
    SellStop,
}

impl OrderKind {
    pub const ALL: [OrderKind; 6] = [
        OrderKind::Buy,
        OrderKind::Sell,
        OrderKind::BuyLimit,
        OrderKind::SellLimit,
        OrderKind::BuyStop,
        OrderKind::SellStop,
    ];

    pub fn is_pending(&self) -> bool {
        !matches!(self, OrderKind::Buy | OrderKind::Sell)
    }

    pub fn is_buy(&self) -> bool {
        matches!(
            self,
            OrderKind::Buy | OrderKind::BuyLimit | OrderKind::BuyStop
        )
    }

    pub fn next(&self) -> OrderKind {
        let idx = Self::ALL.iter().position(|k| k == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderKind::Buy => "BUY",
            OrderKind::Sell => "SELL",
            OrderKind::BuyLimit => "BUY_LIMIT",
            OrderKind::SellLimit => "SELL_LIMIT",
            OrderKind::BuyStop => "BUY_STOP",
            OrderKind::SellStop => "SELL_STOP",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionStatus {
    Open,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub ticket: u64,
    pub symbol: String,
    #[serde(alias = "type")]
    pub side: OrderKind,
    pub volume: Decimal,
    #[serde(alias = "price_open")]
    pub open_price: Decimal,
    #[serde(default)]
    pub sl: Decimal,
    #[serde(default)]
    pub tp: Decimal,
    #[serde(default)]
    pub profit: Decimal,
    #[serde(default)]
    pub status: Option<PositionStatus>,
}

impl Position {
    pub fn status(&self) -> PositionStatus {
        self.status.unwrap_or(if self.side.is_pending() {
            PositionStatus::Pending
        } else {
            PositionStatus::Open
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderHistoryEntry {
    pub ticket: u64,
    pub symbol: String,
    #[serde(alias = "type")]
    pub side: OrderKind,
    pub volume: Decimal,
    pub price: Decimal,
    pub state: String,
    #[serde(default)]
    pub comment: String,
    pub time: i64,
}

/// Закрытая сделка для аналитики.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub ticket: u64,
    #[serde(default)]
    pub symbol: String,
    pub profit: Decimal,
    pub time: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    H1,
    H4,
    D1,
}

impl Timeframe {
    const ORDER: [Timeframe; 6] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "M1",
            Timeframe::M5 => "M5",
            Timeframe::M15 => "M15",
            Timeframe::H1 => "H1",
            Timeframe::H4 => "H4",
            Timeframe::D1 => "D1",
        }
    }

    pub fn parse(raw: &str) -> Option<Timeframe> {
        Self::ORDER
            .iter()
            .copied()
            .find(|tf| tf.as_str().eq_ignore_ascii_case(raw))
    }

    pub fn next(&self) -> Timeframe {
        let idx = Self::ORDER.iter().position(|t| t == self).unwrap_or(0);
        Self::ORDER[(idx + 1) % Self::ORDER.len()]
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ответ `/analyze/{symbol}`. Сервер либо возвращает план
/// (action/confidence/entry/sl/tp), либо `advice` = WAIT / ERROR / AI DISABLED.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Advice {
    #[serde(default)]
    pub advice: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub confidence: Option<String>,
    #[serde(default)]
    pub entry: Option<Decimal>,
    #[serde(default)]
    pub sl: Option<Decimal>,
    #[serde(default)]
    pub tp: Option<Decimal>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl Advice {
    pub fn summary(&self) -> String {
        let reason = self.reason.as_deref().unwrap_or("");
        if let Some(advice) = &self.advice {
            return format!("{}: {}", advice, reason);
        }
        let entry = self
            .entry
            .map(|e| e.to_string())
            .unwrap_or_else(|| "Market".to_string());
        format!(
            "{} ({}) entry {} | SL {} | TP {} | {}",
            self.action.as_deref().unwrap_or("-"),
            self.confidence.as_deref().unwrap_or("-"),
            entry,
            self.sl.map(|v| v.to_string()).unwrap_or_else(|| "-".into()),
            self.tp.map(|v| v.to_string()).unwrap_or_else(|| "-".into()),
            reason
        )
    }
}

/// Ордер, прошедший локальную валидацию (см. `core::orders`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub action: OrderKind,
    pub volume: Decimal,
    pub price: Decimal,
    pub sl: Decimal,
    pub tp: Decimal,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OrderReceipt {
    pub ticket: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(raw: &str) -> Decimal {
        raw.parse().unwrap()
    }

    #[test]
    fn merge_keeps_absent_fields() {
        let mut quote = Quote {
            close: Some(dec("1.1000")),
            rsi: Some(55.0),
            bias: Some(Bias::Bullish),
            ..Default::default()
        };
        quote.merge(&Quote {
            close: Some(dec("1.1010")),
            ..Default::default()
        });

        assert_eq!(quote.close, Some(dec("1.1010")));
        assert_eq!(quote.rsi, Some(55.0));
        assert_eq!(quote.bias, Some(Bias::Bullish));
    }

    #[test]
    fn patch_preserves_key_order_and_ignores_nulls() {
        let raw = r#"{"XAUUSD": {"close": 2350.5, "rsi": null}, "EURUSD": {"bid": "1.0841"}, "BTCUSD": {}}"#;
        let patch: MarketDataPatch = serde_json::from_str(raw).unwrap();

        let order: Vec<&str> = patch.0.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(order, vec!["XAUUSD", "EURUSD", "BTCUSD"]);
        assert_eq!(patch.0[0].1.rsi, None);
        assert_eq!(patch.0[1].1.bid, Some(dec("1.0841")));
    }

    #[test]
    fn bias_accepts_aliases_and_unknown_tags() {
        let q: Quote = serde_json::from_str(r#"{"bias": "UP"}"#).unwrap();
        assert_eq!(q.bias, Some(Bias::Bullish));
        let q: Quote = serde_json::from_str(r#"{"bias": "SIDEWAYS"}"#).unwrap();
        assert_eq!(q.bias, Some(Bias::Unknown));
    }

    #[test]
    fn position_status_falls_back_to_side() {
        let raw = r#"{"ticket": 7, "symbol": "EURUSD", "type": "BUY_LIMIT", "volume": 0.1, "price_open": 1.08}"#;
        let pos: Position = serde_json::from_str(raw).unwrap();
        assert_eq!(pos.status(), PositionStatus::Pending);
        assert_eq!(pos.side, OrderKind::BuyLimit);
    }

    #[test]
    fn timeframe_cycles_and_parses() {
        assert_eq!(Timeframe::D1.next(), Timeframe::M1);
        assert_eq!(Timeframe::parse("h4"), Some(Timeframe::H4));
        assert_eq!(Timeframe::parse("W1"), None);
    }
}
