// src/core/orders.rs
use crate::error::ValidationError;
use crate::types::{OrderKind, OrderRequest, Quote};
use crate::utils::precision::{normalize_volume, step_volume};
use rust_decimal::Decimal;

/// Поле тикета, которое пользователь вводит вручную.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftField {
    Price,
    StopLoss,
    TakeProfit,
}

impl DraftField {
    pub fn label(&self) -> &'static str {
        match self {
            DraftField::Price => "Price",
            DraftField::StopLoss => "SL",
            DraftField::TakeProfit => "TP",
        }
    }
}

/// Тикет ордера в workspace. Проверяется локально, до отправки на сервер.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderDraft {
    pub kind: OrderKind,
    pub volume: Decimal,
    pub volume_step: Decimal,
    /// Цена для отложенных ордеров; подставляется из последнего close.
    pub price: Option<Decimal>,
    pub sl: Decimal,
    pub tp: Decimal,
}

impl OrderDraft {
    pub fn new(volume: Decimal, volume_step: Decimal) -> Self {
        Self {
            kind: OrderKind::Buy,
            volume,
            volume_step,
            price: None,
            sl: Decimal::ZERO,
            tp: Decimal::ZERO,
        }
    }

    pub fn cycle_kind(&mut self) {
        self.kind = self.kind.next();
    }

    pub fn adjust_volume(&mut self, steps: i64) {
        self.volume = step_volume(self.volume, self.volume_step, steps);
    }

    /// Автозаполнение цены, как в панели сделки: last close.
    pub fn prefill(&mut self, quote: Option<&Quote>) {
        if let Some(close) = quote.and_then(|q| q.close) {
            self.price = Some(close);
        }
    }

    /// Empty input clears the field: no price, SL/TP back to 0.
    /// Sign is not checked here, `validate` rejects negative stops.
    pub fn set_field(&mut self, field: DraftField, raw: &str) -> Result<(), ValidationError> {
        let raw = raw.trim();
        let value = if raw.is_empty() {
            None
        } else {
            let parsed = raw
                .parse::<Decimal>()
                .map_err(|_| ValidationError::InvalidNumber(raw.to_string()))?;
            Some(parsed)
        };
        match field {
            DraftField::Price => self.price = value,
            DraftField::StopLoss => self.sl = value.unwrap_or(Decimal::ZERO),
            DraftField::TakeProfit => self.tp = value.unwrap_or(Decimal::ZERO),
        }
        Ok(())
    }

    pub fn validate(&self, symbol: Option<&str>) -> Result<OrderRequest, ValidationError> {
        let symbol = symbol
            .filter(|s| !s.trim().is_empty())
            .ok_or(ValidationError::MissingSymbol)?;

        let volume = normalize_volume(self.volume, self.volume_step);
        if volume <= Decimal::ZERO {
            return Err(ValidationError::InvalidVolume);
        }

        if self.sl < Decimal::ZERO || self.tp < Decimal::ZERO {
            return Err(ValidationError::NegativeStops);
        }

        // Маркет-ордер: цену ставит сервер (0 = по рынку)
        let price = if self.kind.is_pending() {
            match self.price {
                Some(p) if p > Decimal::ZERO => p,
                _ => return Err(ValidationError::MissingPrice(self.kind.as_str())),
            }
        } else {
            Decimal::ZERO
        };

        Ok(OrderRequest {
            symbol: symbol.to_string(),
            action: self.kind,
            volume,
            price,
            sl: self.sl,
            tp: self.tp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(raw: &str) -> Decimal {
        raw.parse().unwrap()
    }

    fn draft() -> OrderDraft {
        OrderDraft::new(dec("0.01"), dec("0.01"))
    }

    #[test]
    fn market_order_sends_zero_price() {
        let order = draft().validate(Some("EURUSD")).unwrap();
        assert_eq!(order.action, OrderKind::Buy);
        assert_eq!(order.price, Decimal::ZERO);
        assert_eq!(order.volume, dec("0.01"));
    }

    #[test]
    fn missing_fields_are_rejected_locally() {
        assert_eq!(
            draft().validate(None),
            Err(ValidationError::MissingSymbol)
        );
        assert_eq!(
            draft().validate(Some("  ")),
            Err(ValidationError::MissingSymbol)
        );

        let mut tiny = draft();
        tiny.volume = dec("0.004");
        assert_eq!(
            tiny.validate(Some("EURUSD")),
            Err(ValidationError::InvalidVolume)
        );

        let mut pending = draft();
        pending.kind = OrderKind::SellLimit;
        assert_eq!(
            pending.validate(Some("EURUSD")),
            Err(ValidationError::MissingPrice("SELL_LIMIT"))
        );

        let mut stops = draft();
        stops.sl = dec("-1");
        assert_eq!(
            stops.validate(Some("EURUSD")),
            Err(ValidationError::NegativeStops)
        );
    }

    #[test]
    fn pending_order_uses_prefilled_close() {
        let mut pending = draft();
        pending.cycle_kind();
        pending.cycle_kind();
        assert_eq!(pending.kind, OrderKind::BuyLimit);

        pending.prefill(Some(&Quote {
            close: Some(dec("2350.5")),
            ..Default::default()
        }));
        let order = pending.validate(Some("XAUUSD")).unwrap();
        assert_eq!(order.price, dec("2350.5"));
    }

    #[test]
    fn typed_fields_replace_prefill_and_empty_clears() {
        let mut d = draft();
        d.kind = OrderKind::SellStop;
        d.prefill(Some(&Quote {
            close: Some(dec("1.0850")),
            ..Default::default()
        }));
        d.set_field(DraftField::Price, " 1.0800 ").unwrap();
        d.set_field(DraftField::StopLoss, "1.0900").unwrap();
        d.set_field(DraftField::TakeProfit, "1.0600").unwrap();
        let order = d.validate(Some("EURUSD")).unwrap();
        assert_eq!(order.price, dec("1.0800"));
        assert_eq!(order.sl, dec("1.0900"));
        assert_eq!(order.tp, dec("1.0600"));

        assert_eq!(
            d.set_field(DraftField::Price, "1.08x"),
            Err(ValidationError::InvalidNumber("1.08x".to_string()))
        );
        assert_eq!(d.price, Some(dec("1.0800")));

        d.set_field(DraftField::Price, "").unwrap();
        d.set_field(DraftField::TakeProfit, "").unwrap();
        assert_eq!(d.price, None);
        assert_eq!(d.tp, Decimal::ZERO);
    }

    #[test]
    fn volume_adjusts_by_lot_step() {
        let mut d = draft();
        d.adjust_volume(4);
        assert_eq!(d.volume, dec("0.05"));
        d.adjust_volume(-10);
        assert_eq!(d.volume, dec("0.01"));
    }
}
