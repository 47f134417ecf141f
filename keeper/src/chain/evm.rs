use std::time::Duration;

use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TxSignerSync;
use alloy::primitives::{Address, B256, TxKind, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::eth::{TransactionInput, TransactionReceipt, TransactionRequest};
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::http::reqwest::Url;
use anyhow::Context;
use async_trait::async_trait;
use market::TickRange;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::abi;
use super::{ActionSubmitter, LedgerReader, SubmissionReceipt};
use crate::error::{SubmissionError, SubmissionStage};
use crate::gate::GasPriceSource;
use crate::proof::RebalanceProof;

/// Used when `eth_estimateGas` fails; the vault call is bounded well below it.
pub const FALLBACK_GAS_LIMIT: u64 = 500_000;

/// Headroom applied on top of the node's gas estimate, in percent.
const GAS_LIMIT_HEADROOM_PCT: u64 = 120;

const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct EvmChain {
    provider: DynProvider,
    vault: Option<Address>,
    signer: Option<PrivateKeySigner>,
    confirmation_timeout: Duration,
}

impl EvmChain {
    pub fn connect(rpc_url: &str, confirmation_timeout: Duration) -> anyhow::Result<Self> {
        let url: Url = rpc_url
            .parse()
            .with_context(|| format!("invalid RPC_URL {rpc_url}"))?;
        let provider = ProviderBuilder::new().connect_http(url).erased();
        Ok(Self::with_provider(provider, confirmation_timeout))
    }

    pub fn with_provider(provider: DynProvider, confirmation_timeout: Duration) -> Self {
        Self {
            provider,
            vault: None,
            signer: None,
            confirmation_timeout,
        }
    }

    pub fn with_vault(mut self, vault: Address) -> Self {
        self.vault = Some(vault);
        self
    }

    pub fn with_signer(mut self, signer: PrivateKeySigner) -> Self {
        self.signer = Some(signer);
        self
    }

    fn vault(&self) -> anyhow::Result<Address> {
        self.vault.context("vault address not configured")
    }

    async fn build(
        &self,
        sender: Address,
        vault: Address,
        range: &TickRange,
        proof: &RebalanceProof,
    ) -> anyhow::Result<TxLegacy> {
        let input = abi::rebalance_calldata(range, proof)?;

        let nonce = self.provider.get_transaction_count(sender).pending().await?;
        let gas_price = self.provider.get_gas_price().await?;
        let chain_id = self.provider.get_chain_id().await?;

        let request = TransactionRequest {
            from: Some(sender),
            to: Some(TxKind::Call(vault)),
            input: TransactionInput::new(input.clone()),
            ..Default::default()
        };
        let gas_limit = match self.provider.estimate_gas(request).await {
            Ok(estimate) => estimate.saturating_mul(GAS_LIMIT_HEADROOM_PCT) / 100,
            Err(e) => {
                warn!(error = %e, fallback = FALLBACK_GAS_LIMIT, "gas estimation failed");
                FALLBACK_GAS_LIMIT
            }
        };

        Ok(TxLegacy {
            chain_id: Some(chain_id),
            nonce,
            gas_price,
            gas_limit,
            to: TxKind::Call(vault),
            value: U256::ZERO,
            input,
        })
    }

    /// Polls for the receipt until `confirmation_timeout` elapses. Query
    /// errors are retried; the transaction may land regardless.
    async fn await_receipt(&self, tx_hash: B256) -> Result<TransactionReceipt, SubmissionError> {
        let deadline = Instant::now() + self.confirmation_timeout;
        loop {
            match self.provider.get_transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => return Ok(receipt),
                Ok(None) => debug!(%tx_hash, "receipt not yet available"),
                Err(e) => warn!(%tx_hash, error = %e, "receipt query failed"),
            }
            if Instant::now() >= deadline {
                return Err(SubmissionError::after_broadcast(
                    tx_hash,
                    format!("no receipt within {}s", self.confirmation_timeout.as_secs()),
                ));
            }
            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl GasPriceSource for EvmChain {
    async fn gas_price_wei(&self) -> anyhow::Result<u128> {
        Ok(self.provider.get_gas_price().await?)
    }
}

#[async_trait]
impl LedgerReader for EvmChain {
    async fn block_number(&self) -> anyhow::Result<u64> {
        Ok(self.provider.get_block_number().await?)
    }

    async fn total_assets(&self) -> anyhow::Result<U256> {
        let request = TransactionRequest {
            to: Some(TxKind::Call(self.vault()?)),
            input: TransactionInput::new(abi::total_assets_calldata()),
            ..Default::default()
        };
        let ret = self.provider.call(request).await?;
        abi::decode_total_assets(&ret)
    }
}

#[async_trait]
impl ActionSubmitter for EvmChain {
    #[instrument(skip_all, fields(tick_lower = range.lower, tick_upper = range.upper))]
    async fn submit(
        &self,
        range: &TickRange,
        proof: &RebalanceProof,
    ) -> Result<SubmissionReceipt, SubmissionError> {
        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| SubmissionError::new(SubmissionStage::Sign, "no signer configured"))?;
        let vault = self
            .vault()
            .map_err(|e| SubmissionError::new(SubmissionStage::Build, e))?;
        let sender = signer.address();

        // build
        let mut tx = self
            .build(sender, vault, range, proof)
            .await
            .map_err(|e| SubmissionError::new(SubmissionStage::Build, format!("{e:#}")))?;

        // sign
        let sig = TxSignerSync::sign_transaction_sync(signer, &mut tx)
            .map_err(|e| SubmissionError::new(SubmissionStage::Sign, e))?;
        let signed: TxEnvelope = tx.into_signed(sig).into();
        let tx_hash: B256 = *signed.tx_hash();
        let raw = signed.encoded_2718();

        // broadcast; the hash is kept on failure since the node may have taken it
        self.provider
            .send_raw_transaction(&raw)
            .await
            .map_err(|e| SubmissionError::during_broadcast(tx_hash, e))?;
        info!(%tx_hash, "rebalance broadcast");

        // confirm
        let receipt = self.await_receipt(tx_hash).await?;

        if !receipt.status() {
            return Err(SubmissionError::after_broadcast(
                tx_hash,
                "transaction reverted",
            ));
        }

        Ok(SubmissionReceipt {
            tx_hash,
            block_number: receipt.block_number,
            gas_used: receipt.gas_used,
            effective_gas_price: receipt.effective_gas_price,
            sender,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{U64, U128};
    use alloy::transports::mock::Asserter;
    use serde_json::json;

    use crate::proof::{self, parse_signing_key};

    const KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const CHAIN_ID: u64 = 31_337;
    const NONCE: u64 = 7;
    const GAS_PRICE: u128 = 1_000_000_000;
    const GAS_ESTIMATE: u64 = 100_000;

    fn vault() -> Address {
        Address::repeat_byte(0x11)
    }

    fn chain(asserter: &Asserter, with_signer: bool) -> EvmChain {
        let provider = ProviderBuilder::new()
            .connect_mocked_client(asserter.clone())
            .erased();
        let chain = EvmChain::with_provider(provider, Duration::from_secs(10)).with_vault(vault());
        if with_signer {
            chain.with_signer(parse_signing_key(Some(KEY)).unwrap())
        } else {
            chain
        }
    }

    fn fixture() -> (TickRange, RebalanceProof) {
        let range = TickRange::new(-600, 600);
        let proof = proof::sign(&range, 19_000_000, Some(KEY)).unwrap();
        (range, proof)
    }

    /// Queues the four build-stage responses in call order.
    fn push_build(asserter: &Asserter) {
        asserter.push_success(&U64::from(NONCE));
        asserter.push_success(&U128::from(GAS_PRICE));
        asserter.push_success(&U64::from(CHAIN_ID));
        asserter.push_success(&U64::from(GAS_ESTIMATE));
    }

    /// Hash of the transaction the adapter is expected to build and sign.
    fn expected_hash(range: &TickRange, proof: &RebalanceProof) -> B256 {
        let signer = parse_signing_key(Some(KEY)).unwrap();
        let mut tx = TxLegacy {
            chain_id: Some(CHAIN_ID),
            nonce: NONCE,
            gas_price: GAS_PRICE,
            gas_limit: GAS_ESTIMATE * 120 / 100,
            to: TxKind::Call(vault()),
            value: U256::ZERO,
            input: abi::rebalance_calldata(range, proof).unwrap(),
        };
        let sig = TxSignerSync::sign_transaction_sync(&signer, &mut tx).unwrap();
        let signed: TxEnvelope = tx.into_signed(sig).into();
        *signed.tx_hash()
    }

    fn receipt_json(tx_hash: B256, status: u8) -> serde_json::Value {
        json!({
            "type": "0x0",
            "status": format!("0x{status:x}"),
            "cumulativeGasUsed": "0x186a0",
            "logs": [],
            "logsBloom": format!("0x{}", "00".repeat(256)),
            "transactionHash": tx_hash,
            "transactionIndex": "0x0",
            "blockHash": B256::repeat_byte(0x22),
            "blockNumber": "0x10",
            "gasUsed": "0x186a0",
            "effectiveGasPrice": "0x3b9aca00",
            "from": parse_signing_key(Some(KEY)).unwrap().address(),
            "to": vault(),
            "contractAddress": null
        })
    }

    #[tokio::test]
    async fn nonce_failure_is_a_build_error_without_hash() {
        let asserter = Asserter::new();
        asserter.push_failure_msg("nonce unavailable");
        let (range, proof) = fixture();

        let err = chain(&asserter, true).submit(&range, &proof).await.unwrap_err();

        assert_eq!(err.stage, SubmissionStage::Build);
        assert!(err.tx_hash.is_none());
        assert!(err.cause.contains("nonce unavailable"), "{}", err.cause);
    }

    #[tokio::test]
    async fn missing_signer_is_a_sign_error() {
        let asserter = Asserter::new();
        let (range, proof) = fixture();

        let err = chain(&asserter, false).submit(&range, &proof).await.unwrap_err();

        assert_eq!(err.stage, SubmissionStage::Sign);
        assert!(err.tx_hash.is_none());
    }

    #[tokio::test]
    async fn rejected_raw_transaction_is_a_broadcast_error_with_hash() {
        let asserter = Asserter::new();
        push_build(&asserter);
        asserter.push_failure_msg("connection reset");
        let (range, proof) = fixture();

        let err = chain(&asserter, true).submit(&range, &proof).await.unwrap_err();

        assert_eq!(err.stage, SubmissionStage::Broadcast);
        assert_eq!(err.tx_hash, Some(expected_hash(&range, &proof)));
        assert!(err.may_be_pending());
        assert!(!err.broadcast_succeeded());
    }

    #[tokio::test]
    async fn reverted_receipt_is_a_confirm_error_with_hash() {
        let asserter = Asserter::new();
        let (range, proof) = fixture();
        let hash = expected_hash(&range, &proof);
        push_build(&asserter);
        asserter.push_success(&hash);
        asserter.push_success(&receipt_json(hash, 0));

        let err = chain(&asserter, true).submit(&range, &proof).await.unwrap_err();

        assert_eq!(err.stage, SubmissionStage::Confirm);
        assert_eq!(err.tx_hash, Some(hash));
        assert!(err.broadcast_succeeded());
        assert_eq!(err.cause, "transaction reverted");
    }

    #[tokio::test(start_paused = true)]
    async fn missing_receipt_times_out_as_confirm_error() {
        let asserter = Asserter::new();
        let (range, proof) = fixture();
        let hash = expected_hash(&range, &proof);
        push_build(&asserter);
        asserter.push_success(&hash);
        // pending on every poll: 0 s through 10 s at a 2 s interval
        for _ in 0..8 {
            asserter.push_success(&serde_json::Value::Null);
        }

        let err = chain(&asserter, true).submit(&range, &proof).await.unwrap_err();

        assert_eq!(err.stage, SubmissionStage::Confirm);
        assert_eq!(err.tx_hash, Some(hash));
        assert!(err.cause.starts_with("no receipt within 10s"), "{}", err.cause);
    }

    #[tokio::test]
    async fn successful_receipt_fills_the_submission_receipt() {
        let asserter = Asserter::new();
        let (range, proof) = fixture();
        let hash = expected_hash(&range, &proof);
        push_build(&asserter);
        asserter.push_success(&hash);
        asserter.push_success(&receipt_json(hash, 1));

        let receipt = chain(&asserter, true).submit(&range, &proof).await.unwrap();

        assert_eq!(receipt.tx_hash, hash);
        assert_eq!(receipt.block_number, Some(16));
        assert_eq!(receipt.gas_used, 100_000);
        assert_eq!(receipt.effective_gas_price, GAS_PRICE);
        assert_eq!(receipt.sender, parse_signing_key(Some(KEY)).unwrap().address());
    }
}
