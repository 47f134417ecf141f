use std::fmt;

use alloy::primitives::B256;
use market::{HedgeSignal, TickRange};
use serde::Serialize;

use crate::error::KeeperError;
use crate::gate::ProfitabilityVerdict;

/// How one cycle ended, as seen by the error ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleDisposition {
    /// Ran to a decision: submitted, gate-rejected, or forecast-only.
    Completed,
    /// Model could not produce a range; not counted.
    Skipped,
    /// Dependency failure; counted toward the ceiling.
    Failed,
    /// Shutdown interrupted the cycle before it decided anything.
    Cancelled,
}

impl CycleDisposition {
    pub fn classify(err: &KeeperError) -> Self {
        if matches!(err, KeeperError::Cancelled(_)) {
            CycleDisposition::Cancelled
        } else if err.counts_toward_ceiling() {
            CycleDisposition::Failed
        } else {
            CycleDisposition::Skipped
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CycleDisposition::Completed => "completed",
            CycleDisposition::Skipped => "skipped",
            CycleDisposition::Failed => "failed",
            CycleDisposition::Cancelled => "cancelled",
        }
    }
}

/// Append-only record of one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleOutcome {
    pub cycle: u64,
    pub trace_id: String,
    pub ts_ms: u64,
    pub disposition: CycleDisposition,
    pub range: Option<TickRange>,
    pub hedge: Option<HedgeSignal>,
    pub verdict: Option<ProfitabilityVerdict>,
    pub proof_digest: Option<B256>,
    pub tx_hash: Option<B256>,
    pub error_kind: Option<&'static str>,
    pub error: Option<String>,
}

impl CycleOutcome {
    pub fn new(cycle: u64, trace_id: String, ts_ms: u64) -> Self {
        Self {
            cycle,
            trace_id,
            ts_ms,
            disposition: CycleDisposition::Completed,
            range: None,
            hedge: None,
            verdict: None,
            proof_digest: None,
            tx_hash: None,
            error_kind: None,
            error: None,
        }
    }

    pub fn fail(&mut self, err: &KeeperError) {
        self.disposition = CycleDisposition::classify(err);
        self.error_kind = Some(err.kind());
        self.error = Some(err.to_string());
        if let KeeperError::Submission(e) = err {
            self.tx_hash = self.tx_hash.or(e.tx_hash);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownReason {
    /// Cancellation requested.
    Graceful,
    /// Consecutive-error ceiling reached.
    Fatal { consecutive_errors: u32 },
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Graceful => f.write_str("graceful"),
            ShutdownReason::Fatal { consecutive_errors } => {
                write!(f, "fatal after {consecutive_errors} consecutive errors")
            }
        }
    }
}
