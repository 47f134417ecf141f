//! Price ↔ tick conversions for a concentrated-liquidity pool.
//!
//! ```text
//! price = 1.0001 ^ tick
//! tick  = floor(ln(price) / ln(1.0001))
//! ```

pub const TICK_BASE: f64 = 1.0001;

/// Spacing of the 0.3% fee tier.
pub const TICK_SPACING: i32 = 60;

pub const MIN_TICK: i32 = -887_272;
pub const MAX_TICK: i32 = 887_272;

/// Converts a price into its (unaligned) tick, clamped to the ledger domain.
///
/// Returns `None` for non-positive or non-finite prices.
pub fn price_to_tick(price: f64) -> Option<i32> {
    if !(price.is_finite() && price > 0.0) {
        return None;
    }
    let raw = (price.ln() / TICK_BASE.ln()).floor();
    Some(raw.clamp(MIN_TICK as f64, MAX_TICK as f64) as i32)
}

pub fn tick_to_price(tick: i32) -> f64 {
    TICK_BASE.powi(tick)
}

/// Floors `tick` to the nearest lower multiple of `spacing`.
pub fn align_down(tick: i32, spacing: i32) -> i32 {
    tick.div_euclid(spacing) * spacing
}

/// Lowest tick that is both aligned and inside the ledger domain.
pub fn min_usable_tick(spacing: i32) -> i32 {
    -(MAX_TICK / spacing) * spacing
}

/// Highest tick that is both aligned and inside the ledger domain.
pub fn max_usable_tick(spacing: i32) -> i32 {
    (MAX_TICK / spacing) * spacing
}
