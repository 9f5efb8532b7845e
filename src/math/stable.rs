//! Stable-curve pricing (solidly x3y + xy3 invariant)
//!
//! Used by solidly-style stable pools and as the curve approximation for
//! stable-pair pools generally. Amounts are normalized to 18 decimals, the
//! invariant is solved with Newton iterations, and results are scaled back
//! to the output token's decimals.
//!
//! Author: AI-Generated
//! Created: 2026-02-03

use super::{mul_div, v2::fee_numerator, v2::FEE_DENOMINATOR};
use alloy::primitives::U256;

fn one_e18() -> U256 {
    U256::from(10u64).pow(U256::from(18))
}

fn scale_up(amount: U256, decimals: u8) -> U256 {
    let d = decimals.min(18);
    amount * U256::from(10u64).pow(U256::from(18 - d as u64))
}

fn scale_down(amount: U256, decimals: u8) -> U256 {
    let d = decimals.min(18);
    amount / U256::from(10u64).pow(U256::from(18 - d as u64))
}

/// Curve invariant k = x*y*(x^2 + y^2) / 1e54, on 1e18-normalized amounts.
fn k_invariant(x: U256, y: U256) -> U256 {
    let one = one_e18();
    let a = mul_div(x, y, one);
    let b = mul_div(x, x, one) + mul_div(y, y, one);
    mul_div(a, b, one)
}

/// f(x0, y) = x0*y^3 + x0^3*y, normalized.
fn f(x0: U256, y: U256) -> U256 {
    let one = one_e18();
    let y3 = mul_div(mul_div(y, y, one), y, one);
    let x3 = mul_div(mul_div(x0, x0, one), x0, one);
    mul_div(x0, y3, one) + mul_div(x3, y, one)
}

/// df/dy = 3*x0*y^2 + x0^3, normalized.
fn d(x0: U256, y: U256) -> U256 {
    let one = one_e18();
    let y2 = mul_div(y, y, one);
    let x3 = mul_div(mul_div(x0, x0, one), x0, one);
    U256::from(3u64) * mul_div(x0, y2, one) + x3
}

/// Solve f(x0, y) = xy for y by Newton's method.
fn get_y(x0: U256, xy: U256, mut y: U256) -> U256 {
    let one = one_e18();
    for _ in 0..255 {
        let y_prev = y;
        let k = f(x0, y);
        if k < xy {
            let slope = d(x0, y);
            if slope.is_zero() {
                return U256::ZERO;
            }
            let dy = mul_div(xy - k, one, slope) + U256::from(1u64);
            y = y.saturating_add(dy);
        } else {
            let slope = d(x0, y);
            if slope.is_zero() {
                return U256::ZERO;
            }
            let dy = mul_div(k - xy, one, slope);
            y = y.saturating_sub(dy);
        }
        let step = if y > y_prev { y - y_prev } else { y_prev - y };
        if step <= U256::from(1u64) {
            return y;
        }
    }
    y
}

/// Exact output on a stable pool with fee on the input side.
///
/// Reserves and amounts are raw token units with their own decimals; all
/// zero-reserve cases quote zero.
pub fn amount_out(
    amount_in: U256,
    reserve_in: U256,
    reserve_out: U256,
    decimals_in: u8,
    decimals_out: u8,
    fee: f64,
) -> U256 {
    if amount_in.is_zero() || reserve_in.is_zero() || reserve_out.is_zero() {
        return U256::ZERO;
    }
    let after_fee = mul_div(
        amount_in,
        U256::from(fee_numerator(fee)),
        U256::from(FEE_DENOMINATOR),
    );
    if after_fee.is_zero() {
        return U256::ZERO;
    }

    let x_in = scale_up(after_fee, decimals_in);
    let r_in = scale_up(reserve_in, decimals_in);
    let r_out = scale_up(reserve_out, decimals_out);

    let xy = k_invariant(r_in, r_out);
    let y_new = get_y(r_in + x_in, xy, r_out);
    if y_new >= r_out {
        return U256::ZERO;
    }
    scale_down(r_out - y_new, decimals_out)
}

/// Spot rate near the current point, fee included. Derived from a small
/// probe trade; reporting/prefilter only.
pub fn spot_rate(
    reserve_in: U256,
    reserve_out: U256,
    decimals_in: u8,
    decimals_out: u8,
    fee: f64,
) -> f64 {
    if reserve_in.is_zero() || reserve_out.is_zero() {
        return 0.0;
    }
    // Probe with 1/100_000 of the in-side reserve.
    let probe = reserve_in / U256::from(100_000u64);
    if probe.is_zero() {
        return 0.0;
    }
    let out = amount_out(probe, reserve_in, reserve_out, decimals_in, decimals_out, fee);
    let probe_h = super::to_human(probe, decimals_in);
    let out_h = super::to_human(out, decimals_out);
    if probe_h == 0.0 {
        0.0
    } else {
        out_h / probe_h
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::v2;

    fn usdc(x: u64) -> U256 {
        U256::from(x) * U256::from(1_000_000u64)
    }

    #[test]
    fn test_balanced_pool_near_parity() {
        // 1M/1M stable pool, 0.05% fee: 1k in returns just under 1k.
        let out = amount_out(usdc(1000), usdc(1_000_000), usdc(1_000_000), 6, 6, 0.0005);
        assert!(out > usdc(998));
        assert!(out < usdc(1000));
    }

    #[test]
    fn test_flatter_than_constant_product() {
        // Same size and fee: the stable curve slips less than x*y=k.
        let stable = amount_out(usdc(50_000), usdc(1_000_000), usdc(1_000_000), 6, 6, 0.0005);
        let cp = v2::amount_out(usdc(50_000), usdc(1_000_000), usdc(1_000_000), 0.0005);
        assert!(stable > cp, "stable {} should beat cp {}", stable, cp);
    }

    #[test]
    fn test_mixed_decimals() {
        // USDC (6) -> DAI (18), balanced 1M/1M pool.
        let dai_reserve = U256::from(1_000_000u64) * U256::from(10u64).pow(U256::from(18));
        let out = amount_out(usdc(1000), usdc(1_000_000), dai_reserve, 6, 18, 0.0005);
        let one_dai = U256::from(10u64).pow(U256::from(18));
        assert!(out > U256::from(998u64) * one_dai);
        assert!(out < U256::from(1000u64) * one_dai);
    }

    #[test]
    fn test_zero_reserves_quote_zero() {
        assert_eq!(
            amount_out(usdc(1000), U256::ZERO, usdc(1_000_000), 6, 6, 0.0005),
            U256::ZERO
        );
        assert_eq!(
            amount_out(U256::ZERO, usdc(1_000_000), usdc(1_000_000), 6, 6, 0.0005),
            U256::ZERO
        );
    }

    #[test]
    fn test_spot_rate_near_one_for_balanced_pool() {
        let rate = spot_rate(usdc(1_000_000), usdc(1_000_000), 6, 6, 0.0005);
        assert!((rate - 1.0).abs() < 0.01, "rate {}", rate);
    }
}
