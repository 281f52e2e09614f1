//! Composite 0-100 strength rating for a detected pump.
//!
//! Three capped components are summed and truncated toward zero:
//! - price change: 40 points, saturating at a 15% move
//! - volume spike: 30 points, saturating at 6x the window average
//! - 24h liquidity: 30 points, saturating at 5M quote volume

use crate::detector::Metrics;

pub const PRICE_CAP: f64 = 40.0;
pub const VOLUME_CAP: f64 = 30.0;
pub const LIQUIDITY_CAP: f64 = 30.0;

const PRICE_SATURATION_PCT: f64 = 15.0;
const SPIKE_SATURATION: f64 = 5.0;
const LIQUIDITY_SATURATION: f64 = 5_000_000.0;

pub fn price_component(change_pct: f64) -> f64 {
    capped(change_pct / PRICE_SATURATION_PCT * PRICE_CAP, PRICE_CAP)
}

pub fn volume_component(vol_now: f64, vol_avg: f64) -> f64 {
    capped((vol_now / vol_avg - 1.0) / SPIKE_SATURATION * VOLUME_CAP, VOLUME_CAP)
}

pub fn liquidity_component(quote_volume_24h: f64) -> f64 {
    capped(quote_volume_24h / LIQUIDITY_SATURATION * LIQUIDITY_CAP, LIQUIDITY_CAP)
}

/// Sum of the components before truncation.
pub fn raw_score(m: &Metrics) -> f64 {
    price_component(m.change_pct)
        + volume_component(m.vol_now, m.vol_avg)
        + liquidity_component(m.quote_volume_24h)
}

pub fn score(m: &Metrics) -> u8 {
    raw_score(m).clamp(0.0, 100.0).trunc() as u8
}

// NaN counts as zero; `f64::min` would otherwise hand back the cap.
fn capped(x: f64, cap: f64) -> f64 {
    if x.is_nan() { 0.0 } else { x.clamp(0.0, cap) }
}
