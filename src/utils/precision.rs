// src/utils/precision.rs
use rust_decimal::Decimal;

/// Округляет объём ВНИЗ до ближайшего кратного шагу лота.
/// Пример: volume=0.157, step=0.01 -> 0.15
pub fn normalize_volume(volume: Decimal, step: Decimal) -> Decimal {
    if step.is_zero() {
        return volume;
    }
    ((volume / step).floor() * step).normalize()
}

/// Сдвигает объём на `steps` шагов лота, не опускаясь ниже одного шага.
pub fn step_volume(volume: Decimal, step: Decimal, steps: i64) -> Decimal {
    if step.is_zero() {
        return volume;
    }
    let shifted = normalize_volume(volume, step) + step * Decimal::from(steps);
    if shifted < step {
        step
    } else {
        shifted.normalize()
    }
}
