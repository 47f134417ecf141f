//! Rebalance authorization proofs.
//!
//! The vault verifies `ecrecover(toEthSignedMessageHash(keccak256(
//! abi.encodePacked(int24 lower, int24 upper, uint256 height))))`, so the
//! layout here is fixed: 3 + 3 + 32 bytes, big-endian, two's complement for
//! the ticks, signed with the EIP-191 personal-message prefix over the hash.

use std::str::FromStr;

use alloy::primitives::{Address, B256, Bytes, Signature, U256, keccak256};
use alloy::signers::SignerSync;
use alloy::signers::local::PrivateKeySigner;
use market::TickRange;
use serde::Serialize;
use thiserror::Error;

pub const PACKED_LEN: usize = 3 + 3 + 32;

const INT24_MIN: i32 = -(1 << 23);
const INT24_MAX: i32 = (1 << 23) - 1;

#[derive(Error, Debug)]
pub enum ProofError {
    #[error("missing credential: {0}")]
    MissingCredential(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("tick {0} does not fit in int24")]
    Encoding(i32),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebalanceProof {
    /// 65-byte `r || s || v` signature.
    pub signature: Bytes,
    pub message_hash: B256,
    pub signer: Address,
    pub range: TickRange,
    pub freshness_height: u64,
}

impl RebalanceProof {
    /// Short identifier persisted with cycle outcomes.
    pub fn digest(&self) -> B256 {
        keccak256(&self.signature)
    }

    pub fn recover_signer(&self) -> Result<Address, ProofError> {
        let sig = Signature::try_from(self.signature.as_ref())
            .map_err(|e| ProofError::Signing(e.to_string()))?;
        sig.recover_address_from_msg(self.message_hash.as_slice())
            .map_err(|e| ProofError::Signing(e.to_string()))
    }
}

fn int24_bytes(tick: i32) -> Result<[u8; 3], ProofError> {
    if !(INT24_MIN..=INT24_MAX).contains(&tick) {
        return Err(ProofError::Encoding(tick));
    }
    let be = tick.to_be_bytes();
    Ok([be[1], be[2], be[3]])
}

pub fn encode_packed(range: &TickRange, freshness_height: u64) -> Result<[u8; PACKED_LEN], ProofError> {
    let mut out = [0u8; PACKED_LEN];
    out[0..3].copy_from_slice(&int24_bytes(range.lower)?);
    out[3..6].copy_from_slice(&int24_bytes(range.upper)?);
    out[6..].copy_from_slice(&U256::from(freshness_height).to_be_bytes::<32>());
    Ok(out)
}

pub fn message_hash(range: &TickRange, freshness_height: u64) -> Result<B256, ProofError> {
    Ok(keccak256(encode_packed(range, freshness_height)?))
}

pub fn parse_signing_key(key: Option<&str>) -> Result<PrivateKeySigner, ProofError> {
    let raw = key
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| ProofError::MissingCredential("no signing key configured".into()))?;

    PrivateKeySigner::from_str(raw)
        .map_err(|_| ProofError::MissingCredential("signing key is malformed".into()))
}

pub fn sign_with(
    signer: &PrivateKeySigner,
    range: &TickRange,
    freshness_height: u64,
) -> Result<RebalanceProof, ProofError> {
    let hash = message_hash(range, freshness_height)?;
    let sig = signer
        .sign_message_sync(hash.as_slice())
        .map_err(|e| ProofError::Signing(e.to_string()))?;

    Ok(RebalanceProof {
        signature: Bytes::copy_from_slice(&sig.as_bytes()),
        message_hash: hash,
        signer: signer.address(),
        range: *range,
        freshness_height,
    })
}

/// Parses `key` and signs `(range, freshness_height)`.
pub fn sign(
    range: &TickRange,
    freshness_height: u64,
    key: Option<&str>,
) -> Result<RebalanceProof, ProofError> {
    let signer = parse_signing_key(key)?;
    sign_with(&signer, range, freshness_height)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Hardhat account #0; public test key.
    const KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const ADDR: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    fn range() -> TickRange {
        TickRange::new(-600, 1_200)
    }

    #[test]
    fn packed_layout_is_tight() {
        let bytes = encode_packed(&TickRange::new(-60, 120), 1).unwrap();
        assert_eq!(bytes.len(), 38);
        assert_eq!(&bytes[0..3], &[0xff, 0xff, 0xc4]);
        assert_eq!(&bytes[3..6], &[0x00, 0x00, 0x78]);
        assert!(bytes[6..37].iter().all(|b| *b == 0));
        assert_eq!(bytes[37], 1);
    }

    #[test]
    fn out_of_range_tick_is_an_encoding_error() {
        let r = TickRange::new(-(1 << 23) - 1, 0);
        assert!(matches!(encode_packed(&r, 0), Err(ProofError::Encoding(_))));
    }

    #[test]
    fn signing_is_deterministic() {
        let a = sign(&range(), 19_000_000, Some(KEY)).unwrap();
        let b = sign(&range(), 19_000_000, Some(KEY)).unwrap();
        assert_eq!(a.signature, b.signature);
        assert_eq!(a.signature.len(), 65);
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn different_height_gives_different_signature() {
        let a = sign(&range(), 19_000_000, Some(KEY)).unwrap();
        let b = sign(&range(), 19_000_001, Some(KEY)).unwrap();
        assert_ne!(a.signature, b.signature);
        assert_ne!(a.message_hash, b.message_hash);
    }

    #[test]
    fn different_range_gives_different_signature() {
        let a = sign(&range(), 7, Some(KEY)).unwrap();
        let b = sign(&TickRange::new(-600, 1_260), 7, Some(KEY)).unwrap();
        assert_ne!(a.signature, b.signature);
    }

    #[test]
    fn signature_recovers_to_signer() {
        let proof = sign(&range(), 42, Some(KEY)).unwrap();
        let expected: Address = ADDR.parse().unwrap();
        assert_eq!(proof.signer, expected);
        assert_eq!(proof.recover_signer().unwrap(), expected);
    }

    #[test]
    fn missing_or_malformed_key_is_a_credential_error() {
        assert!(matches!(sign(&range(), 1, None), Err(ProofError::MissingCredential(_))));
        assert!(matches!(sign(&range(), 1, Some("  ")), Err(ProofError::MissingCredential(_))));
        assert!(matches!(
            sign(&range(), 1, Some("0xnothex")),
            Err(ProofError::MissingCredential(_))
        ));
    }
}
