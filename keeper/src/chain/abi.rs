use alloy::primitives::aliases::I24;
use alloy::primitives::{Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use market::TickRange;

use crate::proof::RebalanceProof;

sol! {
    #[derive(Debug, PartialEq, Eq)]
    interface ILiquidityVault {
        function rebalance(bytes zkProof, int24 tickLower, int24 tickUpper) external;
        function totalAssets() external view returns (uint256);
    }
}

fn int24(tick: i32) -> anyhow::Result<I24> {
    I24::try_from(tick).map_err(|_| anyhow::anyhow!("tick {tick} does not fit in int24"))
}

pub fn rebalance_calldata(range: &TickRange, proof: &RebalanceProof) -> anyhow::Result<Bytes> {
    let call = ILiquidityVault::rebalanceCall {
        zkProof: proof.signature.clone(),
        tickLower: int24(range.lower)?,
        tickUpper: int24(range.upper)?,
    };
    Ok(call.abi_encode().into())
}

pub fn total_assets_calldata() -> Bytes {
    ILiquidityVault::totalAssetsCall {}.abi_encode().into()
}

pub fn decode_total_assets(ret: &[u8]) -> anyhow::Result<U256> {
    Ok(ILiquidityVault::totalAssetsCall::abi_decode_returns(ret)?)
}
