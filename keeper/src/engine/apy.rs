use alloy::primitives::U256;

const YEAR_MS: f64 = 365.0 * 24.0 * 3_600.0 * 1_000.0;

fn as_f64(v: U256) -> Option<f64> {
    v.to_string().parse::<f64>().ok()
}

/// Compounded annual growth between two `totalAssets` readings, in percent.
///
/// `None` when the previous reading is zero, time did not advance, or the
/// extrapolation is not finite.
pub fn annualized_growth_pct(prev: U256, prev_ts_ms: u64, cur: U256, cur_ts_ms: u64) -> Option<f64> {
    if prev.is_zero() || cur_ts_ms <= prev_ts_ms {
        return None;
    }
    let ratio = as_f64(cur)? / as_f64(prev)?;
    let periods = YEAR_MS / (cur_ts_ms - prev_ts_ms) as f64;
    let pct = (ratio.powf(periods) - 1.0) * 100.0;
    pct.is_finite().then_some(pct)
}
