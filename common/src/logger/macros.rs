use std::time::Duration;

use tracing::{Span, field};

use super::TraceId;

/// Root span for a single keeper cycle.
///
/// `range` and `tx_hash` start empty and are recorded once known.
pub fn cycle_span(cycle: u64, trace_id: &TraceId) -> Span {
    tracing::info_span!(
        "cycle",
        cycle = cycle,
        trace_id = %trace_id,
        range = field::Empty,
        tx_hash = field::Empty
    )
}

/// Child span for one stage of a cycle (fetch, forecast, gate, submit, record).
pub fn stage_span(stage: &'static str) -> Span {
    tracing::debug_span!("stage", stage = stage)
}

pub async fn warn_if_slow<F, T>(label: &'static str, max: Duration, fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    let start = std::time::Instant::now();
    let out = fut.await;
    let elapsed = start.elapsed();
    if elapsed > max {
        tracing::warn!(
            target: "performance",
            label = label,
            elapsed_ms = elapsed.as_millis() as u64,
            "slow operation detected"
        );
    }
    out
}
