pub mod abi;
pub mod evm;

pub use evm::EvmChain;

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use market::TickRange;
use serde::Serialize;

use crate::error::SubmissionError;
use crate::proof::RebalanceProof;

/// Read-only ledger queries.
#[async_trait]
pub trait LedgerReader: Send + Sync {
    /// Latest block height; used as the proof freshness nonce.
    async fn block_number(&self) -> anyhow::Result<u64>;

    /// Vault `totalAssets()`.
    async fn total_assets(&self) -> anyhow::Result<U256>;
}

/// Sends the rebalance call and waits for its receipt.
///
/// Implementations must query a fresh nonce per call and must report a
/// broadcast-then-failed submission with its `tx_hash` set.
#[async_trait]
pub trait ActionSubmitter: Send + Sync {
    async fn submit(
        &self,
        range: &TickRange,
        proof: &RebalanceProof,
    ) -> Result<SubmissionReceipt, SubmissionError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionReceipt {
    pub tx_hash: B256,
    pub block_number: Option<u64>,
    pub gas_used: u64,
    pub effective_gas_price: u128,
    pub sender: Address,
}
