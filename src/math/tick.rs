//! V3 tick arithmetic
//!
//! sqrt-price lookup for ticks, Q64.96 encoded, matching the on-chain
//! TickMath library bit for bit. Used by the V3 kernel to find range
//! boundaries when stepping a swap across initialized ticks.
//!
//! Author: AI-Generated
//! Created: 2026-02-03

use alloy::primitives::U256;

/// Lowest tick with a representable sqrt price.
pub const MIN_TICK: i32 = -887_272;
/// Highest tick with a representable sqrt price.
pub const MAX_TICK: i32 = 887_272;

/// sqrt(1.0001^tick) * 2^96, computed with the canonical Q128.128
/// multiply-and-shift ladder and truncated to Q64.96 with round-up.
///
/// Out-of-range ticks clamp to the nearest bound; the detectors never
/// construct ticks outside it, but event data is untrusted.
pub fn sqrt_ratio_at_tick(tick: i32) -> U256 {
    let tick = tick.clamp(MIN_TICK, MAX_TICK);
    let abs_tick = tick.unsigned_abs();

    let mut ratio = if abs_tick & 0x1 != 0 {
        u256_hex("fffcb933bd6fad37aa2d162d1a594001")
    } else {
        U256::from(1u64) << 128
    };

    // Each step folds in sqrt(1.0001)^(-2^i) as a Q128.128 constant.
    const STEPS: [(u32, &str); 19] = [
        (0x2, "fff97272373d413259a46990580e213a"),
        (0x4, "fff2e50f5f656932ef12357cf3c7fdcc"),
        (0x8, "ffe5caca7e10e4e61c3624eaa0941cd0"),
        (0x10, "ffcb9843d60f6159c9db58835c926644"),
        (0x20, "ff973b41fa98c081472e6896dfb254c0"),
        (0x40, "ff2ea16466c96a3843ec78b326b52861"),
        (0x80, "fe5dee046a99a2a811c461f1969c3053"),
        (0x100, "fcbe86c7900a88aedcffc83b479aa3a4"),
        (0x200, "f987a7253ac413176f2b074cf7815e54"),
        (0x400, "f3392b0822b70005940c7a398e4b70f3"),
        (0x800, "e7159475a2c29b7443b29c7fa6e889d9"),
        (0x1000, "d097f3bdfd2022b8845ad8f792aa5825"),
        (0x2000, "a9f746462d870fdf8a65dc1f90e061e5"),
        (0x4000, "70d869a156d2a1b890bb3df62baf32f7"),
        (0x8000, "31be135f97d08fd981231505542fcfa6"),
        (0x10000, "9aa508b5b7a84e1c677de54f3e99bc9"),
        (0x20000, "5d6af8dedb81196699c329225ee604"),
        (0x40000, "2216e584f5fa1ea926041bedfe98"),
        (0x80000, "48a170391f7dc42444e8fa2"),
    ];

    for &(bit, constant) in STEPS.iter() {
        if abs_tick & bit != 0 {
            // ratio <= 2^128 and constant < 2^128, so the product fits U256.
            ratio = (ratio * u256_hex(constant)) >> 128;
        }
    }

    if tick > 0 {
        ratio = U256::MAX / ratio;
    }

    // Q128.128 -> Q64.96, rounding up so that the reverse lookup of the
    // truncated price lands back on the same tick.
    let rounded = ratio >> 32;
    if (ratio & ((U256::from(1u64) << 32) - U256::from(1u64))).is_zero() {
        rounded
    } else {
        rounded + U256::from(1u64)
    }
}

/// Canonical tick spacing per fee tier.
pub fn tick_spacing_for_fee(fee_tier: u32) -> i32 {
    match fee_tier {
        100 => 1,
        500 => 10,
        3000 => 60,
        10_000 => 200,
        other => ((other / 50).max(1)) as i32,
    }
}

/// Lower boundary tick of the spacing-aligned range containing `tick`.
pub fn range_lower(tick: i32, spacing: i32) -> i32 {
    let mut lower = tick / spacing * spacing;
    if tick < 0 && tick % spacing != 0 {
        lower -= spacing;
    }
    lower
}

fn u256_hex(hex: &str) -> U256 {
    U256::from_str_radix(hex, 16).expect("static hex constant")
}
