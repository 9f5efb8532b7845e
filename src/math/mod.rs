//! AMM math kernel
//!
//! Exact pricing primitives for each supported DEX family, all on 256-bit
//! integers. Floating point never enters the swap math; it only appears in
//! spot-rate reporting helpers used by prefilters and logging.
//!
//! Author: AI-Generated
//! Created: 2026-02-03

pub mod stable;
pub mod tick;
pub mod v2;
pub mod v3;

use alloy::primitives::{U256, U512};

/// Zero-extend a U256 into a U512 for overflow-free intermediates.
pub fn widen(x: U256) -> U512 {
    let mut limbs = [0u64; 8];
    limbs[..4].copy_from_slice(x.as_limbs());
    U512::from_limbs(limbs)
}

/// Truncate a U512 back to U256. None if the value does not fit.
pub fn narrow(x: U512) -> Option<U256> {
    let limbs = x.as_limbs();
    if limbs[4..].iter().any(|&l| l != 0) {
        return None;
    }
    let mut lo = [0u64; 4];
    lo.copy_from_slice(&limbs[..4]);
    Some(U256::from_limbs(lo))
}

/// floor(a * b / denom) with a 512-bit intermediate.
///
/// Returns zero when denom is zero or the quotient does not fit in 256 bits
/// (the overflow guard: a tripped guard degrades to an inadmissible quote,
/// it never panics).
pub fn mul_div(a: U256, b: U256, denom: U256) -> U256 {
    if denom.is_zero() {
        return U256::ZERO;
    }
    let prod = widen(a) * widen(b);
    narrow(prod / widen(denom)).unwrap_or(U256::ZERO)
}

/// Integer square root of a 512-bit value (Newton's method, floor result).
pub fn isqrt(x: U512) -> U512 {
    if x <= U512::from(1u64) {
        return x;
    }
    // Initial guess >= sqrt(x) so the iteration descends monotonically.
    let shift = (x.bit_len() + 1) / 2;
    let mut guess = U512::from(1u64) << shift;
    loop {
        let next = (guess + x / guess) >> 1;
        if next >= guess {
            return guess;
        }
        guess = next;
    }
}

/// Lossy U256 -> f64 for reporting, spot-rate prefilters, and USD valuation.
pub fn u256_to_f64(x: U256) -> f64 {
    let limbs = x.as_limbs();
    let mut acc = 0.0f64;
    for (i, &limb) in limbs.iter().enumerate() {
        acc += (limb as f64) * 2f64.powi(64 * i as i32);
    }
    acc
}

/// Raw token units -> human units given the token's decimal exponent.
pub fn to_human(x: U256, decimals: u8) -> f64 {
    u256_to_f64(x) / 10f64.powi(decimals as i32)
}

/// Human units -> raw token units, rounded.
pub fn to_raw(amount: f64, decimals: u8) -> U256 {
    if amount <= 0.0 {
        return U256::ZERO;
    }
    let scaled = amount * 10f64.powi(decimals as i32);
    if scaled >= 2f64.powi(127) {
        // Beyond any sane trade size; saturate rather than wrap.
        return U256::from(u128::MAX);
    }
    U256::from(scaled.round() as u128)
}
