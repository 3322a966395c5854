// src/core/analytics.rs
use crate::types::TradeRecord;
use rust_decimal::Decimal;

#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticsSummary {
    pub total_profit: Decimal,
    pub trade_count: usize,
    pub wins: usize,
    /// Проценты, 0..=100.
    pub win_rate: Decimal,
    /// Накопленный PnL в хронологическом порядке.
    pub equity_curve: Vec<Decimal>,
}

/// Aggregates closed trades. `records` arrive newest-first (as the history
/// endpoint returns them). Zero-profit records (balance operations, breakeven
/// bookkeeping) do not count as trades.
pub fn summarize(records: &[TradeRecord]) -> AnalyticsSummary {
    let mut total_profit = Decimal::ZERO;
    let mut wins = 0usize;
    let mut equity_curve = Vec::with_capacity(records.len());

    for record in records.iter().rev().filter(|r| !r.profit.is_zero()) {
        total_profit += record.profit;
        if record.profit > Decimal::ZERO {
            wins += 1;
        }
        equity_curve.push(total_profit);
    }

    let trade_count = equity_curve.len();
    let win_rate = if trade_count == 0 {
        Decimal::ZERO
    } else {
        Decimal::from(wins as u64) * Decimal::ONE_HUNDRED / Decimal::from(trade_count as u64)
    };

    AnalyticsSummary {
        total_profit,
        trade_count,
        wins,
        win_rate,
        equity_curve,
    }
}
