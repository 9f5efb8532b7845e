//! Concentrated-liquidity (V3) pricing
//!
//! Exact-input quotes from sqrtPriceX96 and in-range liquidity. When the
//! snapshot carries a tick table the swap is stepped across initialized
//! ticks; otherwise a single-range closed form is used and quotes that
//! leave the spacing-aligned range are flagged as estimated.
//!
//! Author: AI-Generated
//! Created: 2026-02-03

use super::tick::{sqrt_ratio_at_tick, tick_spacing_for_fee, MAX_TICK, MIN_TICK};
use super::{mul_div, narrow, u256_to_f64, widen};
use crate::types::{Quote, TickEntry, V3Snapshot};
use alloy::primitives::U256;

/// V3 fee denominator: fee tiers are hundredths of a bip.
const FEE_DENOMINATOR: u64 = 1_000_000;

/// Spot price of token0 in token1 terms: (sqrtPriceX96 / 2^96)^2.
/// Reporting/prefilter only.
pub fn spot_price(snapshot: &V3Snapshot) -> f64 {
    let sqrt = u256_to_f64(snapshot.sqrt_price_x96) / 2f64.powi(96);
    sqrt * sqrt
}

/// Effective spot rate for the given direction including the fee.
pub fn spot_rate(snapshot: &V3Snapshot, zero_for_one: bool) -> f64 {
    let price = spot_price(snapshot);
    if price == 0.0 {
        return 0.0;
    }
    let rate = if zero_for_one { price } else { 1.0 / price };
    rate * (1.0 - snapshot.fee_fraction())
}

/// Exact-input quote for a V3 pool.
///
/// `zero_for_one` sells token0 for token1 (price moves down).
pub fn amount_out(snapshot: &V3Snapshot, amount_in: U256, zero_for_one: bool) -> Quote {
    if amount_in.is_zero() || !snapshot.is_admissible() {
        return Quote::zero();
    }
    let amount_after_fee = apply_fee(amount_in, snapshot.fee_tier);
    if amount_after_fee.is_zero() {
        return Quote::zero();
    }
    match &snapshot.ticks {
        Some(ticks) if !ticks.is_empty() => {
            stepped_swap(snapshot, ticks, amount_after_fee, zero_for_one)
        }
        _ => single_range_swap(snapshot, amount_after_fee, zero_for_one),
    }
}

/// Input that would move the price one full tick spacing away from the
/// current price. Used as the in-range liquidity equivalent of the
/// reserve-in cap; never degenerate even when the pool sits exactly on a
/// range boundary.
pub fn max_input_bound(snapshot: &V3Snapshot, zero_for_one: bool) -> U256 {
    if !snapshot.is_admissible() {
        return U256::ZERO;
    }
    let spacing = tick_spacing_for_fee(snapshot.fee_tier);
    let liquidity = U256::from(snapshot.liquidity);
    let sqrt_p = snapshot.sqrt_price_x96;
    if zero_for_one {
        let target = sqrt_ratio_at_tick((snapshot.tick - spacing).max(MIN_TICK));
        amount0_delta(target, sqrt_p, liquidity)
    } else {
        let target = sqrt_ratio_at_tick((snapshot.tick + spacing).min(MAX_TICK));
        amount1_delta(sqrt_p, target, liquidity)
    }
}

fn apply_fee(amount_in: U256, fee_tier: u32) -> U256 {
    let fee_num = U256::from(FEE_DENOMINATOR - u64::from(fee_tier.min(999_999)));
    mul_div(amount_in, fee_num, U256::from(FEE_DENOMINATOR))
}

/// token1 owed for moving the price from sqrt_a up to sqrt_b:
/// L * (sqrt_b - sqrt_a) / Q96, floor.
fn amount1_delta(sqrt_a: U256, sqrt_b: U256, liquidity: U256) -> U256 {
    if sqrt_b <= sqrt_a {
        return U256::ZERO;
    }
    mul_div(liquidity, sqrt_b - sqrt_a, U256::from(1u64) << 96)
}

/// token0 owed for moving the price from sqrt_b down to sqrt_a:
/// L * Q96 * (sqrt_b - sqrt_a) / (sqrt_b * sqrt_a), floor.
fn amount0_delta(sqrt_a: U256, sqrt_b: U256, liquidity: U256) -> U256 {
    if sqrt_b <= sqrt_a || sqrt_a.is_zero() {
        return U256::ZERO;
    }
    let shifted = widen(liquidity) << 96;
    let num = shifted * widen(sqrt_b - sqrt_a) / widen(sqrt_b);
    match narrow(num) {
        Some(v) => v / sqrt_a,
        None => U256::ZERO,
    }
}

/// New sqrt price after spending `amount_in` (already fee-adjusted).
fn next_sqrt_price(sqrt_p: U256, liquidity: U256, amount_in: U256, zero_for_one: bool) -> U256 {
    if zero_for_one {
        // sqrt' = L * Q96 * sqrt / (L * Q96 + in * sqrt)
        let l_q96 = widen(liquidity) << 96;
        let denom = l_q96 + widen(amount_in) * widen(sqrt_p);
        if denom.is_zero() {
            return U256::ZERO;
        }
        narrow(l_q96 * widen(sqrt_p) / denom).unwrap_or(U256::ZERO)
    } else {
        // sqrt' = sqrt + in * Q96 / L
        sqrt_p.saturating_add(mul_div(amount_in, U256::from(1u64) << 96, liquidity))
    }
}

/// Output of a swap segment from sqrt_p to sqrt_next within constant L.
fn segment_out(sqrt_p: U256, sqrt_next: U256, liquidity: U256, zero_for_one: bool) -> U256 {
    if zero_for_one {
        amount1_delta(sqrt_next, sqrt_p, liquidity)
    } else {
        amount0_delta(sqrt_p, sqrt_next, liquidity)
    }
}

fn single_range_swap(snapshot: &V3Snapshot, amount_after_fee: U256, zero_for_one: bool) -> Quote {
    let liquidity = U256::from(snapshot.liquidity);
    let sqrt_p = snapshot.sqrt_price_x96;
    let sqrt_next = next_sqrt_price(sqrt_p, liquidity, amount_after_fee, zero_for_one);
    if sqrt_next.is_zero() {
        return Quote::zero();
    }
    let out = segment_out(sqrt_p, sqrt_next, liquidity, zero_for_one);

    // No tick table: trust one tick spacing around the current price and
    // flag anything that moves further, so the profit model can discount it.
    let spacing = tick_spacing_for_fee(snapshot.fee_tier);
    let crossed = if zero_for_one {
        sqrt_next < sqrt_ratio_at_tick((snapshot.tick - spacing).max(MIN_TICK))
    } else {
        sqrt_next > sqrt_ratio_at_tick((snapshot.tick + spacing).min(MAX_TICK))
    };
    if crossed {
        Quote::estimated(out)
    } else {
        Quote::exact(out)
    }
}

fn stepped_swap(
    snapshot: &V3Snapshot,
    ticks: &[TickEntry],
    amount_after_fee: U256,
    zero_for_one: bool,
) -> Quote {
    let mut sqrt_p = snapshot.sqrt_price_x96;
    let mut liquidity = snapshot.liquidity;
    let mut current_tick = snapshot.tick;
    let mut remaining = amount_after_fee;
    let mut total_out = U256::ZERO;
    let mut estimated = false;

    loop {
        if remaining.is_zero() || liquidity == 0 {
            if liquidity == 0 && !remaining.is_zero() {
                estimated = true;
            }
            break;
        }
        let liq = U256::from(liquidity);
        let boundary = next_initialized_tick(ticks, current_tick, zero_for_one);
        let sqrt_next = next_sqrt_price(sqrt_p, liq, remaining, zero_for_one);
        if sqrt_next.is_zero() {
            break;
        }

        match boundary {
            Some(entry) => {
                let sqrt_target = sqrt_ratio_at_tick(entry.tick);
                let crosses = if zero_for_one {
                    sqrt_next < sqrt_target
                } else {
                    sqrt_next > sqrt_target
                };
                if !crosses {
                    total_out = total_out.saturating_add(segment_out(
                        sqrt_p,
                        sqrt_next,
                        liq,
                        zero_for_one,
                    ));
                    break;
                }
                // Consume up to the boundary, cross, continue.
                let in_used = if zero_for_one {
                    amount0_delta(sqrt_target, sqrt_p, liq)
                } else {
                    amount1_delta(sqrt_p, sqrt_target, liq)
                };
                total_out = total_out.saturating_add(segment_out(
                    sqrt_p,
                    sqrt_target,
                    liq,
                    zero_for_one,
                ));
                remaining = remaining.saturating_sub(in_used.max(U256::from(1u64)));
                sqrt_p = sqrt_target;
                liquidity = cross_liquidity(liquidity, entry.liquidity_net, !zero_for_one);
                current_tick = if zero_for_one {
                    entry.tick - 1
                } else {
                    entry.tick
                };
            }
            None => {
                // Ran off the known table: finish in the last range, flagged.
                total_out =
                    total_out.saturating_add(segment_out(sqrt_p, sqrt_next, liq, zero_for_one));
                estimated = true;
                break;
            }
        }
    }

    if estimated {
        Quote::estimated(total_out)
    } else {
        Quote::exact(total_out)
    }
}

/// Next initialized tick strictly below (zero_for_one) or above the
/// current tick. The table is sorted ascending.
fn next_initialized_tick(ticks: &[TickEntry], current: i32, zero_for_one: bool) -> Option<TickEntry> {
    if zero_for_one {
        ticks.iter().rev().find(|t| t.tick <= current).copied()
    } else {
        ticks.iter().find(|t| t.tick > current).copied()
    }
}

/// Apply a tick's net liquidity when crossing it. `upward` means the price
/// moved left to right (token1 in), the direction liquidity_net is signed for.
fn cross_liquidity(liquidity: u128, net: i128, upward: bool) -> u128 {
    let effective = if upward { net } else { net.checked_neg().unwrap_or(i128::MAX) };
    if effective >= 0 {
        liquidity.saturating_add(effective as u128)
    } else {
        liquidity.saturating_sub(effective.unsigned_abs())
    }
}
