// src/utils/format.rs
//! Display helpers. A missing value renders as a dash, never as zero:
//! "not computed yet" must stay distinguishable from "computed as zero".

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

pub const PLACEHOLDER: &str = "-";

pub fn price(value: Option<Decimal>) -> String {
    match value {
        Some(v) => format!("{:.5}", v).trim_end_matches('0').trim_end_matches('.').to_string(),
        None => PLACEHOLDER.to_string(),
    }
}

pub fn money(value: Decimal) -> String {
    format!("${:.2}", value)
}

pub fn signed_money(value: Decimal) -> String {
    if value.is_sign_negative() && !value.is_zero() {
        format!("-${:.2}", value.abs())
    } else {
        format!("+${:.2}", value)
    }
}

pub fn indicator(value: Option<f64>, decimals: usize) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{:.*}", decimals, v),
        _ => PLACEHOLDER.to_string(),
    }
}

pub fn text(value: Option<&str>) -> String {
    value.unwrap_or(PLACEHOLDER).to_string()
}

pub fn unix_time(secs: i64) -> String {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| PLACEHOLDER.to_string())
}
