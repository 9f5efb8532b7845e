//! On-chain event decoding
//!
//! Raw log payloads to typed pool events. V2 Sync/Swap and V3 Swap carry
//! fixed topics; V3 Mint/Burn topics are derived from their signatures at
//! startup. Data words are decoded as raw 32-byte big-endian values with
//! two's-complement signed fields and sign-extended int24 ticks.
//!
//! Author: AI-Generated
//! Created: 2026-02-04

use alloy::primitives::{b256, keccak256, Address, B256, I256, U256};
use once_cell::sync::Lazy;
use thiserror::Error;

/// keccak256("Sync(uint112,uint112)")
pub const V2_SYNC_TOPIC: B256 =
    b256!("1c411e9a96e071241c2f21f7726b17ae89e3cab4c78be50e062b03a9fffbbad1");

/// keccak256("Swap(address,uint256,uint256,uint256,uint256,address)")
pub const V2_SWAP_TOPIC: B256 =
    b256!("d78ad95fa46c994b6551d0da85fc275fe613ce37657fb8d5e3d130840159d822");

/// keccak256("Swap(address,address,int256,int256,uint160,uint128,int24)")
pub const V3_SWAP_TOPIC: B256 =
    b256!("c42079f94a6350d7e6235f29174924f928cc2ac818eb64fed8004e115fbcca67");

/// keccak256("Mint(address,address,int24,int24,uint128,uint256,uint256)")
pub static V3_MINT_TOPIC: Lazy<B256> =
    Lazy::new(|| keccak256("Mint(address,address,int24,int24,uint128,uint256,uint256)"));

/// keccak256("Burn(address,int24,int24,uint128,uint256,uint256)")
pub static V3_BURN_TOPIC: Lazy<B256> =
    Lazy::new(|| keccak256("Burn(address,int24,int24,uint128,uint256,uint256)"));

/// Undecoded log as delivered by the subscription.
#[derive(Debug, Clone)]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Vec<u8>,
    pub block_number: u64,
    pub log_index: u64,
}

/// Typed payload of one pool event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEvent {
    V2Sync {
        reserve0: U256,
        reserve1: U256,
    },
    V2Swap {
        sender: Address,
        recipient: Address,
        amount0_in: U256,
        amount1_in: U256,
        amount0_out: U256,
        amount1_out: U256,
    },
    V3Swap {
        sender: Address,
        recipient: Address,
        amount0: I256,
        amount1: I256,
        sqrt_price_x96: U256,
        liquidity: u128,
        tick: i32,
    },
    V3Mint {
        owner: Address,
        tick_lower: i32,
        tick_upper: i32,
        amount: u128,
        amount0: U256,
        amount1: U256,
    },
    V3Burn {
        owner: Address,
        tick_lower: i32,
        tick_upper: i32,
        amount: u128,
        amount0: U256,
        amount1: U256,
    },
}

impl PoolEvent {
    /// True for events that replace pool pricing state (debounced);
    /// notifications pass through immediately.
    pub fn is_state_update(&self) -> bool {
        matches!(self, PoolEvent::V2Sync { .. } | PoolEvent::V3Swap { .. })
    }
}

/// A decoded event with its chain coordinates.
#[derive(Debug, Clone)]
pub struct ChainEvent {
    pub pool: Address,
    pub block_number: u64,
    pub log_index: u64,
    pub event: PoolEvent,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("log has no topics")]
    MissingTopic,
    #[error("unknown event topic {0}")]
    UnknownTopic(B256),
    #[error("expected {expected} topics, got {got}")]
    TopicCount { expected: usize, got: usize },
    #[error("expected {expected} data bytes, got {got}")]
    DataLength { expected: usize, got: usize },
    #[error("word {index} out of range for its declared type")]
    ValueRange { index: usize },
}

/// Decode a raw log into a typed pool event.
///
/// Malformed payloads produce errors the bus drops and counts; they never
/// fail the stream.
pub fn decode(raw: &RawLog) -> Result<ChainEvent, DecodeError> {
    let topic0 = raw.topics.first().ok_or(DecodeError::MissingTopic)?;
    let event = if *topic0 == V2_SYNC_TOPIC {
        decode_v2_sync(raw)?
    } else if *topic0 == V2_SWAP_TOPIC {
        decode_v2_swap(raw)?
    } else if *topic0 == V3_SWAP_TOPIC {
        decode_v3_swap(raw)?
    } else if *topic0 == *V3_MINT_TOPIC {
        decode_v3_mint(raw)?
    } else if *topic0 == *V3_BURN_TOPIC {
        decode_v3_burn(raw)?
    } else {
        return Err(DecodeError::UnknownTopic(*topic0));
    };
    Ok(ChainEvent {
        pool: raw.address,
        block_number: raw.block_number,
        log_index: raw.log_index,
        event,
    })
}

/// Sync(uint112 reserve0, uint112 reserve1): two unsigned words.
fn decode_v2_sync(raw: &RawLog) -> Result<PoolEvent, DecodeError> {
    expect_topics(raw, 1)?;
    expect_data(raw, 64)?;
    Ok(PoolEvent::V2Sync {
        reserve0: word(&raw.data, 0),
        reserve1: word(&raw.data, 1),
    })
}

/// Swap(address indexed sender, uint256 amount0In, uint256 amount1In,
///      uint256 amount0Out, uint256 amount1Out, address indexed to)
fn decode_v2_swap(raw: &RawLog) -> Result<PoolEvent, DecodeError> {
    expect_topics(raw, 3)?;
    expect_data(raw, 128)?;
    Ok(PoolEvent::V2Swap {
        sender: address_from_topic(&raw.topics[1]),
        recipient: address_from_topic(&raw.topics[2]),
        amount0_in: word(&raw.data, 0),
        amount1_in: word(&raw.data, 1),
        amount0_out: word(&raw.data, 2),
        amount1_out: word(&raw.data, 3),
    })
}

/// Swap(address indexed sender, address indexed recipient, int256 amount0,
///      int256 amount1, uint160 sqrtPriceX96, uint128 liquidity, int24 tick)
fn decode_v3_swap(raw: &RawLog) -> Result<PoolEvent, DecodeError> {
    expect_topics(raw, 3)?;
    expect_data(raw, 160)?;
    Ok(PoolEvent::V3Swap {
        sender: address_from_topic(&raw.topics[1]),
        recipient: address_from_topic(&raw.topics[2]),
        amount0: signed_word(&raw.data, 0),
        amount1: signed_word(&raw.data, 1),
        sqrt_price_x96: word(&raw.data, 2),
        liquidity: u128_word(&raw.data, 3)?,
        tick: tick_word(&raw.data, 4),
    })
}

/// Mint(address sender, address indexed owner, int24 indexed tickLower,
///      int24 indexed tickUpper, uint128 amount, uint256 amount0, uint256 amount1)
fn decode_v3_mint(raw: &RawLog) -> Result<PoolEvent, DecodeError> {
    expect_topics(raw, 4)?;
    // data: sender, amount, amount0, amount1
    expect_data(raw, 128)?;
    Ok(PoolEvent::V3Mint {
        owner: address_from_topic(&raw.topics[1]),
        tick_lower: tick_from_topic(&raw.topics[2]),
        tick_upper: tick_from_topic(&raw.topics[3]),
        amount: u128_word(&raw.data, 1)?,
        amount0: word(&raw.data, 2),
        amount1: word(&raw.data, 3),
    })
}

/// Burn(address indexed owner, int24 indexed tickLower,
///      int24 indexed tickUpper, uint128 amount, uint256 amount0, uint256 amount1)
fn decode_v3_burn(raw: &RawLog) -> Result<PoolEvent, DecodeError> {
    expect_topics(raw, 4)?;
    expect_data(raw, 96)?;
    Ok(PoolEvent::V3Burn {
        owner: address_from_topic(&raw.topics[1]),
        tick_lower: tick_from_topic(&raw.topics[2]),
        tick_upper: tick_from_topic(&raw.topics[3]),
        amount: u128_word(&raw.data, 0)?,
        amount0: word(&raw.data, 1),
        amount1: word(&raw.data, 2),
    })
}

fn expect_topics(raw: &RawLog, expected: usize) -> Result<(), DecodeError> {
    if raw.topics.len() != expected {
        return Err(DecodeError::TopicCount {
            expected,
            got: raw.topics.len(),
        });
    }
    Ok(())
}

fn expect_data(raw: &RawLog, expected: usize) -> Result<(), DecodeError> {
    if raw.data.len() != expected {
        return Err(DecodeError::DataLength {
            expected,
            got: raw.data.len(),
        });
    }
    Ok(())
}

fn word(data: &[u8], index: usize) -> U256 {
    U256::from_be_slice(&data[index * 32..(index + 1) * 32])
}

fn signed_word(data: &[u8], index: usize) -> I256 {
    I256::from_raw(word(data, index))
}

fn u128_word(data: &[u8], index: usize) -> Result<u128, DecodeError> {
    let w = word(data, index);
    if w > U256::from(u128::MAX) {
        return Err(DecodeError::ValueRange { index });
    }
    Ok(w.to::<u128>())
}

/// Low 24 bits, sign-extended, two's complement.
fn tick_word(data: &[u8], index: usize) -> i32 {
    let w = word(data, index);
    sign_extend_24(w.as_limbs()[0] as u32)
}

fn tick_from_topic(topic: &B256) -> i32 {
    let raw = u32::from_be_bytes([topic[28], topic[29], topic[30], topic[31]]);
    sign_extend_24(raw)
}

fn sign_extend_24(raw: u32) -> i32 {
    let masked = raw & 0x00FF_FFFF;
    ((masked << 8) as i32) >> 8
}

fn address_from_topic(topic: &B256) -> Address {
    Address::from_slice(&topic[12..])
}

// ── Synthesizers ────────────────────────────────────────────────────
// Byte-level encoders for the same layouts. Used by tests and by the
// replay tooling to fabricate logs; kept next to the decoders so the two
// directions cannot drift apart.

pub fn encode_v2_sync(reserve0: U256, reserve1: U256) -> Vec<u8> {
    let mut out = Vec::with_capacity(64);
    out.extend_from_slice(&reserve0.to_be_bytes::<32>());
    out.extend_from_slice(&reserve1.to_be_bytes::<32>());
    out
}

pub fn encode_v3_swap(
    amount0: I256,
    amount1: I256,
    sqrt_price_x96: U256,
    liquidity: u128,
    tick: i32,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(160);
    out.extend_from_slice(&amount0.into_raw().to_be_bytes::<32>());
    out.extend_from_slice(&amount1.into_raw().to_be_bytes::<32>());
    out.extend_from_slice(&sqrt_price_x96.to_be_bytes::<32>());
    out.extend_from_slice(&U256::from(liquidity).to_be_bytes::<32>());
    let tick_word = I256::try_from(tick).expect("i32 fits").into_raw();
    out.extend_from_slice(&tick_word.to_be_bytes::<32>());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sync_log(data: Vec<u8>) -> RawLog {
        RawLog {
            address: Address::repeat_byte(0xaa),
            topics: vec![V2_SYNC_TOPIC],
            data,
            block_number: 100,
            log_index: 3,
        }
    }

    #[test]
    fn test_v2_sync_decode_exact() {
        // 1e18 and 2e18 as 32-byte words.
        let r0 = U256::from(1_000_000_000_000_000_000u128);
        let r1 = U256::from(2_000_000_000_000_000_000u128);
        let decoded = decode(&sync_log(encode_v2_sync(r0, r1))).unwrap();
        assert_eq!(
            decoded.event,
            PoolEvent::V2Sync {
                reserve0: r0,
                reserve1: r1
            }
        );
        assert_eq!(decoded.block_number, 100);
        assert_eq!(decoded.log_index, 3);
    }

    #[test]
    fn test_v2_sync_wrong_length_rejected() {
        let err = decode(&sync_log(vec![0u8; 63])).unwrap_err();
        assert_eq!(
            err,
            DecodeError::DataLength {
                expected: 64,
                got: 63
            }
        );
    }

    #[test]
    fn test_unknown_topic_rejected() {
        let mut log = sync_log(vec![0u8; 64]);
        log.topics = vec![B256::repeat_byte(0x11)];
        assert!(matches!(
            decode(&log).unwrap_err(),
            DecodeError::UnknownTopic(_)
        ));
    }

    #[test]
    fn test_v3_swap_roundtrip() {
        let amount0 = I256::try_from(-5_000_000_000_000i128).unwrap();
        let amount1 = I256::try_from(4_900_000_000_000i128).unwrap();
        let sqrt_p = U256::from(1u64) << 96;
        let liquidity = 777_000_000_000u128;
        let tick = -887_272;

        let data = encode_v3_swap(amount0, amount1, sqrt_p, liquidity, tick);
        assert_eq!(data.len(), 160);

        let log = RawLog {
            address: Address::repeat_byte(0xbb),
            topics: vec![
                V3_SWAP_TOPIC,
                B256::left_padding_from(Address::repeat_byte(1).as_slice()),
                B256::left_padding_from(Address::repeat_byte(2).as_slice()),
            ],
            data: data.clone(),
            block_number: 42,
            log_index: 0,
        };
        let decoded = decode(&log).unwrap();
        match decoded.event {
            PoolEvent::V3Swap {
                amount0: a0,
                amount1: a1,
                sqrt_price_x96,
                liquidity: l,
                tick: t,
                ..
            } => {
                assert_eq!(a0, amount0);
                assert_eq!(a1, amount1);
                assert_eq!(sqrt_price_x96, sqrt_p);
                assert_eq!(l, liquidity);
                assert_eq!(t, tick);
                // Re-encode gives the original bytes.
                assert_eq!(encode_v3_swap(a0, a1, sqrt_price_x96, l, t), data);
            }
            other => panic!("wrong event {:?}", other),
        }
    }

    #[test]
    fn test_tick_sign_extension() {
        assert_eq!(sign_extend_24(0x00_0001), 1);
        assert_eq!(sign_extend_24(0xFF_FFFF), -1);
        // -887272 in 24-bit two's complement.
        let raw = (-887_272i32 as u32) & 0x00FF_FFFF;
        assert_eq!(sign_extend_24(raw), -887_272);
        assert_eq!(sign_extend_24(0x7F_FFFF), 8_388_607);
        assert_eq!(sign_extend_24(0x80_0000), -8_388_608);
    }

    #[test]
    fn test_v3_mint_burn_decode() {
        let owner = Address::repeat_byte(0x33);
        let make_topics = |topic0: B256| {
            vec![
                topic0,
                B256::left_padding_from(owner.as_slice()),
                tick_topic(-600),
                tick_topic(600),
            ]
        };
        let mut mint_data = Vec::new();
        mint_data.extend_from_slice(&B256::left_padding_from(Address::repeat_byte(9).as_slice())[..]);
        mint_data.extend_from_slice(&U256::from(5000u64).to_be_bytes::<32>());
        mint_data.extend_from_slice(&U256::from(111u64).to_be_bytes::<32>());
        mint_data.extend_from_slice(&U256::from(222u64).to_be_bytes::<32>());

        let log = RawLog {
            address: Address::repeat_byte(0xcc),
            topics: make_topics(*V3_MINT_TOPIC),
            data: mint_data,
            block_number: 7,
            log_index: 1,
        };
        match decode(&log).unwrap().event {
            PoolEvent::V3Mint {
                owner: o,
                tick_lower,
                tick_upper,
                amount,
                amount0,
                amount1,
            } => {
                assert_eq!(o, owner);
                assert_eq!(tick_lower, -600);
                assert_eq!(tick_upper, 600);
                assert_eq!(amount, 5000);
                assert_eq!(amount0, U256::from(111u64));
                assert_eq!(amount1, U256::from(222u64));
            }
            other => panic!("wrong event {:?}", other),
        }

        let mut burn_data = Vec::new();
        burn_data.extend_from_slice(&U256::from(4000u64).to_be_bytes::<32>());
        burn_data.extend_from_slice(&U256::from(100u64).to_be_bytes::<32>());
        burn_data.extend_from_slice(&U256::from(200u64).to_be_bytes::<32>());
        let log = RawLog {
            address: Address::repeat_byte(0xcc),
            topics: make_topics(*V3_BURN_TOPIC),
            data: burn_data,
            block_number: 8,
            log_index: 2,
        };
        assert!(matches!(
            decode(&log).unwrap().event,
            PoolEvent::V3Burn { amount: 4000, .. }
        ));
    }

    fn tick_topic(tick: i32) -> B256 {
        B256::from(I256::try_from(tick).unwrap().into_raw().to_be_bytes::<32>())
    }

    #[test]
    fn test_state_update_classification() {
        let sync = PoolEvent::V2Sync {
            reserve0: U256::ZERO,
            reserve1: U256::ZERO,
        };
        assert!(sync.is_state_update());

        let swap = PoolEvent::V2Swap {
            sender: Address::ZERO,
            recipient: Address::ZERO,
            amount0_in: U256::ZERO,
            amount1_in: U256::ZERO,
            amount0_out: U256::ZERO,
            amount1_out: U256::ZERO,
        };
        assert!(!swap.is_state_update());
    }
}
