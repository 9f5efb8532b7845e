//! Multicall3 batching and pool-view call encoding
//!
//! Calldata builders and return decoders for the batched reads the
//! poller issues: getReserves for reserve-based pools, slot0/liquidity
//! for V3, and the LSD exchange-rate views. Everything funnels through
//! Multicall3 `aggregate3` with allowFailure so one dead pool cannot
//! fail the batch.
//!
//! Author: AI-Generated
//! Created: 2026-02-05

use alloy::primitives::{address, keccak256, Address, Bytes, I256, U256};
use alloy::sol;
use alloy::sol_types::{SolCall, SolValue};
use once_cell::sync::Lazy;

/// Multicall3, same address on every supported chain.
pub const MULTICALL3_ADDRESS: Address = address!("cA11bde05977b3631167028862bE2a173976CA11");

/// keccak256("getReserves()")[..4]
pub const GET_RESERVES_SELECTOR: [u8; 4] = [0x09, 0x02, 0xf1, 0xac];

/// keccak256("slot0()")[..4]
pub const SLOT0_SELECTOR: [u8; 4] = [0x38, 0x50, 0xc7, 0xbd];

/// keccak256("liquidity()")[..4]
pub const LIQUIDITY_SELECTOR: [u8; 4] = [0x1a, 0x68, 0x65, 0x02];

/// Lido-wrapper exchange rate view.
pub static STETH_PER_TOKEN_SELECTOR: Lazy<[u8; 4]> = Lazy::new(|| selector("stEthPerToken()"));

/// Vault-style exchange rate view.
pub static PRICE_PER_SHARE_SELECTOR: Lazy<[u8; 4]> = Lazy::new(|| selector("pricePerShare()"));

fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

fn tick_to_i32(tick: I256) -> Option<i32> {
    i32::try_from(tick).ok()
}

sol! {
    #[derive(Debug)]
    struct Call3 {
        address target;
        bool allowFailure;
        bytes callData;
    }

    #[derive(Debug)]
    struct Result3 {
        bool success;
        bytes returnData;
    }

    function aggregate3(Call3[] calldata calls) external payable returns (Result3[] memory returnData);
}

/// Build `aggregate3` calldata from (target, calldata) pairs, every call
/// allowed to fail individually.
pub fn encode_aggregate3(calls: &[(Address, Vec<u8>)]) -> Vec<u8> {
    let calls: Vec<Call3> = calls
        .iter()
        .map(|(target, data)| Call3 {
            target: *target,
            allowFailure: true,
            callData: Bytes::from(data.clone()),
        })
        .collect();
    aggregate3Call { calls }.abi_encode()
}

/// Decode an `aggregate3` response into per-call results; failed calls
/// come back as None.
pub fn decode_aggregate3(data: &[u8]) -> Option<Vec<Option<Vec<u8>>>> {
    let results = <Vec<Result3>>::abi_decode(data).ok()?;
    Some(
        results
            .into_iter()
            .map(|r| {
                if r.success {
                    Some(r.returnData.to_vec())
                } else {
                    None
                }
            })
            .collect(),
    )
}

pub fn encode_get_reserves() -> Vec<u8> {
    GET_RESERVES_SELECTOR.to_vec()
}

/// (reserve0, reserve1) from a getReserves return. The uint112 words are
/// decoded at full width; the timestamp word is ignored.
pub fn decode_get_reserves(data: &[u8]) -> Option<(U256, U256)> {
    let (r0, r1, _ts) = <(U256, U256, U256)>::abi_decode(data).ok()?;
    Some((r0, r1))
}

pub fn encode_slot0() -> Vec<u8> {
    SLOT0_SELECTOR.to_vec()
}

/// (sqrtPriceX96, tick) from a slot0 return; the observation and fee
/// words are ignored.
pub fn decode_slot0(data: &[u8]) -> Option<(U256, i32)> {
    let (sqrt_price, tick, _a, _b, _c, _d, _e) =
        <(U256, I256, U256, U256, U256, U256, U256)>::abi_decode(data).ok()?;
    Some((sqrt_price, tick_to_i32(tick)?))
}

pub fn encode_liquidity() -> Vec<u8> {
    LIQUIDITY_SELECTOR.to_vec()
}

pub fn decode_liquidity(data: &[u8]) -> Option<u128> {
    let liquidity = <U256>::abi_decode(data).ok()?;
    if liquidity > U256::from(u128::MAX) {
        return None;
    }
    Some(liquidity.to::<u128>())
}

/// Calldata for an LSD rate view by kind.
pub fn encode_rate_call(rate_kind: &str) -> Option<Vec<u8>> {
    match rate_kind {
        "steth-per-token" => Some(STETH_PER_TOKEN_SELECTOR.to_vec()),
        "price-per-share" => Some(PRICE_PER_SHARE_SELECTOR.to_vec()),
        _ => None,
    }
}

/// An exchange rate returned as a 1e18-scaled uint.
pub fn decode_rate(data: &[u8]) -> Option<f64> {
    let raw = <U256>::abi_decode(data).ok()?;
    let rate = crate::math::u256_to_f64(raw) / 1e18;
    if rate.is_finite() && rate > 0.0 {
        Some(rate)
    } else {
        None
    }
}
