use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Minimal counters for operational visibility.
#[derive(Clone, Default)]
pub struct Counters {
    pub cycles: Arc<AtomicU64>,
    pub completed: Arc<AtomicU64>,
    pub skipped: Arc<AtomicU64>,
    pub failed: Arc<AtomicU64>,

    pub gate_rejections: Arc<AtomicU64>,
    pub submissions: Arc<AtomicU64>,
    pub submission_failures: Arc<AtomicU64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CountersSnapshot {
    pub cycles: u64,
    pub completed: u64,
    pub skipped: u64,
    pub failed: u64,
    pub gate_rejections: u64,
    pub submissions: u64,
    pub submission_failures: u64,
}

impl Counters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        CountersSnapshot {
            cycles: load(&self.cycles),
            completed: load(&self.completed),
            skipped: load(&self.skipped),
            failed: load(&self.failed),
            gate_rejections: load(&self.gate_rejections),
            submissions: load(&self.submissions),
            submission_failures: load(&self.submission_failures),
        }
    }
}
