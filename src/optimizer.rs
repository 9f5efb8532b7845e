//! Optimal trade-size solver
//!
//! Maximizes net profit of a path-simulation closure over a bounded input
//! interval. Two-hop constant-product paths get an analytical seed; the
//! result is refined with golden-section search, which suits the unimodal
//! rise-peak-fall shape of AMM profit curves better than bisection.
//!
//! Author: AI-Generated
//! Created: 2026-02-04

use crate::math::mul_div;
use crate::types::Quote;
use alloy::primitives::{I256, U256};

/// Golden ratio complement as a rational: (phi - 1) ~ 0.618.
const GOLDEN_NUM: u64 = 618;
const GOLDEN_DEN: u64 = 1_000;

/// Default refinement iterations; constant work per sizing call.
pub const DEFAULT_ITERATIONS: usize = 15;

/// Fraction of the smallest reserve-in a trade may consume.
const IMPACT_CAP_NUM: u64 = 3;
const IMPACT_CAP_DEN: u64 = 10;

/// A sized trade: the optimizer's argmax and its objective value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizedTrade {
    pub amount_in: U256,
    pub expected_out: U256,
    /// Net profit in base-token raw units, flash-loan fee included.
    pub profit: I256,
    /// True if the best quote involved an estimated (range-crossing) hop.
    pub estimated: bool,
}

impl SizedTrade {
    pub fn none() -> Self {
        Self {
            amount_in: U256::ZERO,
            expected_out: U256::ZERO,
            profit: I256::ZERO,
            estimated: false,
        }
    }

    pub fn is_some(&self) -> bool {
        !self.amount_in.is_zero() && self.profit > I256::ZERO
    }
}

/// Sizing engine. One per worker; holds the chain's flash-loan fee.
#[derive(Debug, Clone)]
pub struct Optimizer {
    iterations: usize,
    /// Flash-loan fee in basis points, subtracted from every objective.
    flash_fee_bps: u64,
}

impl Optimizer {
    pub fn new(flash_loan_fee: f64) -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            flash_fee_bps: (flash_loan_fee.clamp(0.0, 1.0) * 10_000.0).round() as u64,
        }
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations.max(1);
        self
    }

    /// The impact cap: 30% of the smallest reserve-in along the path.
    pub fn impact_cap(min_reserve_in: U256) -> U256 {
        mul_div(
            min_reserve_in,
            U256::from(IMPACT_CAP_NUM),
            U256::from(IMPACT_CAP_DEN),
        )
    }

    /// Objective value at `x`: simulate the path, subtract the input and
    /// the flash-loan fee on the input.
    pub fn profit_at(&self, sim: &dyn Fn(U256) -> Quote, x: U256) -> (I256, Quote) {
        let quote = sim(x);
        let flash_cost = mul_div(x, U256::from(self.flash_fee_bps), U256::from(10_000u64));
        let out = I256::from_raw(quote.amount_out);
        let cost = I256::from_raw(x.saturating_add(flash_cost));
        (out.saturating_sub(cost), quote)
    }

    /// Maximize profit over [x_min, min(x_max, impact_cap)].
    ///
    /// `seed` narrows the bracket around an analytical estimate when the
    /// caller has one (two-hop constant-product paths). Returns a zero
    /// trade when the interval is empty or the best profit is non-positive.
    pub fn optimize(
        &self,
        sim: &dyn Fn(U256) -> Quote,
        x_min: U256,
        x_max: U256,
        impact_cap: U256,
        seed: Option<U256>,
    ) -> SizedTrade {
        let hi = x_max.min(impact_cap);
        if hi <= x_min || x_min.is_zero() {
            return SizedTrade::none();
        }

        // Bracket around the seed when it lands inside the interval.
        let (mut a, mut b) = match seed {
            Some(s) if s > x_min && s < hi => {
                let lo = (s / U256::from(2u64)).max(x_min);
                let half = s / U256::from(2u64);
                let up = s.saturating_add(half).min(hi);
                (lo, up)
            }
            _ => (x_min, hi),
        };

        let mut best = SizedTrade::none();
        let consider = |opt: &Self, x: U256, best: &mut SizedTrade| -> I256 {
            let (profit, quote) = opt.profit_at(sim, x);
            if profit > best.profit || best.amount_in.is_zero() {
                *best = SizedTrade {
                    amount_in: x,
                    expected_out: quote.amount_out,
                    profit,
                    estimated: quote.estimated,
                };
            }
            profit
        };

        consider(self, a, &mut best);
        consider(self, b, &mut best);
        if let Some(s) = seed {
            if s >= a && s <= b {
                consider(self, s, &mut best);
            }
        }

        let tolerance = (x_min / U256::from(100u64)).max(U256::from(1u64));
        for _ in 0..self.iterations {
            if b.saturating_sub(a) <= tolerance {
                break;
            }
            let d = mul_div(b - a, U256::from(GOLDEN_NUM), U256::from(GOLDEN_DEN));
            let x1 = b - d;
            let x2 = a + d;
            let f1 = consider(self, x1, &mut best);
            let f2 = consider(self, x2, &mut best);
            if f1 >= f2 {
                b = x2;
            } else {
                a = x1;
            }
        }
        // Final midpoint probe of the shrunken bracket.
        consider(self, a + (b - a) / U256::from(2u64), &mut best);

        if best.profit <= I256::ZERO {
            return SizedTrade::none();
        }
        best
    }
}

/// Bare golden-section maximizer over an integer interval. Exposed for
/// callers with a plain objective (no quote plumbing).
pub fn golden_section(
    f: &dyn Fn(U256) -> I256,
    mut a: U256,
    mut b: U256,
    iterations: usize,
) -> (U256, I256) {
    if b <= a {
        return (a, f(a));
    }
    let tolerance = (a / U256::from(100u64)).max(U256::from(1u64));
    let mut best_x = a;
    let mut best_f = f(a);
    let fb = f(b);
    if fb > best_f {
        best_x = b;
        best_f = fb;
    }
    for _ in 0..iterations {
        if b.saturating_sub(a) <= tolerance {
            break;
        }
        let d = mul_div(b - a, U256::from(GOLDEN_NUM), U256::from(GOLDEN_DEN));
        let x1 = b - d;
        let x2 = a + d;
        let f1 = f(x1);
        let f2 = f(x2);
        if f1 > best_f {
            best_x = x1;
            best_f = f1;
        }
        if f2 > best_f {
            best_x = x2;
            best_f = f2;
        }
        if f1 >= f2 {
            b = x2;
        } else {
            a = x1;
        }
    }
    let mid = a + (b - a) / U256::from(2u64);
    let fm = f(mid);
    if fm > best_f {
        best_x = mid;
        best_f = fm;
    }
    (best_x, best_f)
}
