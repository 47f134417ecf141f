use std::fmt;

use alloy::primitives::B256;
use market::ForecastError;
use market::feed::FeedError;
use serde::Serialize;
use thiserror::Error;

use crate::proof::ProofError;

/// Loop-level error taxonomy. Every component error is mapped into one of
/// these at the cycle boundary; only the engine decides what is fatal.
#[derive(Error, Debug)]
pub enum KeeperError {
    #[error("insufficient data: need {required} points, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("model convergence failed: {0}")]
    ModelConvergence(String),

    #[error("price fetch failed after {attempts} attempts: {source}")]
    DataFetch {
        attempts: u32,
        #[source]
        source: FeedError,
    },

    #[error("missing credential: {0}")]
    MissingCredential(String),

    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error("infrastructure error: {0:#}")]
    Infrastructure(#[from] anyhow::Error),

    /// Shutdown was requested while the cycle was waiting on a dependency.
    #[error("cycle cancelled by shutdown during {0}")]
    Cancelled(&'static str),
}

impl KeeperError {
    /// Stable short label for logs and persisted outcomes.
    pub fn kind(&self) -> &'static str {
        match self {
            KeeperError::InsufficientData { .. } => "insufficient_data",
            KeeperError::ModelConvergence(_) => "model_convergence",
            KeeperError::DataFetch { .. } => "data_fetch",
            KeeperError::MissingCredential(_) => "missing_credential",
            KeeperError::Submission(_) => "submission",
            KeeperError::Infrastructure(_) => "infrastructure",
            KeeperError::Cancelled(_) => "cancelled",
        }
    }

    /// Whether this error feeds the consecutive-error ceiling.
    ///
    /// Model-side problems (short or degenerate history) skip the cycle
    /// without counting; dependency failures count.
    pub fn counts_toward_ceiling(&self) -> bool {
        matches!(
            self,
            KeeperError::DataFetch { .. }
                | KeeperError::Submission(_)
                | KeeperError::Infrastructure(_)
        )
    }
}

impl From<ForecastError> for KeeperError {
    fn from(e: ForecastError) -> Self {
        match e {
            ForecastError::InsufficientData { required, actual } => {
                KeeperError::InsufficientData { required, actual }
            }
            ForecastError::ModelConvergence(msg) => KeeperError::ModelConvergence(msg),
            ForecastError::InvalidPrice { index, price } => KeeperError::ModelConvergence(
                format!("invalid price {price} at index {index}"),
            ),
        }
    }
}

impl From<ProofError> for KeeperError {
    fn from(e: ProofError) -> Self {
        match e {
            ProofError::MissingCredential(msg) => KeeperError::MissingCredential(msg),
            other => KeeperError::Infrastructure(anyhow::Error::new(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStage {
    Build,
    Sign,
    Broadcast,
    Confirm,
}

impl fmt::Display for SubmissionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SubmissionStage::Build => "build",
            SubmissionStage::Sign => "sign",
            SubmissionStage::Broadcast => "broadcast",
            SubmissionStage::Confirm => "confirm",
        };
        f.write_str(s)
    }
}

/// Failure of one rebalance submission.
///
/// `tx_hash` is set once the transaction left this process; a
/// confirm-stage failure with a hash means the transaction may still land
/// and must not be blindly resubmitted.
#[derive(Error, Debug, Clone)]
#[error("submission failed at {stage} stage: {cause}")]
pub struct SubmissionError {
    pub stage: SubmissionStage,
    pub tx_hash: Option<B256>,
    pub cause: String,
}

impl SubmissionError {
    pub fn new(stage: SubmissionStage, cause: impl fmt::Display) -> Self {
        Self {
            stage,
            tx_hash: None,
            cause: cause.to_string(),
        }
    }

    /// The raw transaction was handed to the node but the call failed; the
    /// node may still have accepted it.
    pub fn during_broadcast(tx_hash: B256, cause: impl fmt::Display) -> Self {
        Self {
            stage: SubmissionStage::Broadcast,
            tx_hash: Some(tx_hash),
            cause: cause.to_string(),
        }
    }

    pub fn after_broadcast(tx_hash: B256, cause: impl fmt::Display) -> Self {
        Self {
            stage: SubmissionStage::Confirm,
            tx_hash: Some(tx_hash),
            cause: cause.to_string(),
        }
    }

    pub fn broadcast_succeeded(&self) -> bool {
        self.stage == SubmissionStage::Confirm && self.tx_hash.is_some()
    }

    /// True once signed bytes reached the node, whether or not it acknowledged them.
    pub fn may_be_pending(&self) -> bool {
        self.tx_hash.is_some()
    }
}
