//! Opportunity detectors
//!
//! Each detector scans a consistent snapshot of the price graph and
//! returns candidate opportunities. Candidates carry raw-unit amounts and
//! spreads; USD pricing, MEV assessment, and scoring happen downstream.
//!
//! Author: AI-Generated
//! Created: 2026-02-04

pub mod cross_dex;
pub mod jit;
pub mod lsd;
pub mod multi_hop;
pub mod stable;
pub mod triangular;
pub mod v2_v3;

use crate::config::ChainConfig;
use crate::graph::{Edge, PriceGraph};
use crate::math::to_raw;
use crate::optimizer::{Optimizer, SizedTrade};
use crate::types::{Hop, Opportunity, OpportunityKind, PairKey, Quote};
use alloy::primitives::U256;
use std::collections::HashMap;
use std::collections::HashSet;

/// Everything a detection pass reads. Built once per block tick from the
/// worker-owned graph; detectors never mutate shared state.
pub struct DetectCtx<'a> {
    pub chain: &'a ChainConfig,
    pub graph: &'a PriceGraph,
    pub optimizer: &'a Optimizer,
    pub current_block: u64,
    /// Pairs the adaptive prioritizer gated in for this block. None scans
    /// everything (startup, tests).
    pub gated_pairs: Option<&'a HashSet<PairKey>>,
    /// Protocol exchange rates for LSDs, keyed by derivative symbol.
    pub lsd_rates: &'a HashMap<String, f64>,
}

impl<'a> DetectCtx<'a> {
    /// Oldest block a usable snapshot may carry.
    pub fn min_block(&self) -> u64 {
        self.current_block
            .saturating_sub(self.chain.detectors.staleness_blocks)
    }

    pub fn should_scan(&self, pair: &PairKey) -> bool {
        match self.gated_pairs {
            Some(set) => set.contains(pair),
            None => true,
        }
    }

    pub fn token_decimals(&self, symbol: &str) -> u8 {
        self.chain.token(symbol).map(|t| t.decimals).unwrap_or(18)
    }

    /// USD value of a raw amount of `symbol`, stable-anchored. None when
    /// no anchor exists; callers suppress rather than guess.
    pub fn amount_usd(&self, symbol: &str, amount: U256) -> Option<f64> {
        self.graph.amount_usd(
            symbol,
            self.token_decimals(symbol),
            amount,
            &self.chain.stable_tokens,
        )
    }

    /// Chain trade bounds converted into raw units of `symbol`.
    pub fn trade_bounds_raw(&self, symbol: &str) -> Option<(U256, U256)> {
        let token = self.chain.token(symbol)?;
        let px = self
            .graph
            .stable_anchored_usd(symbol, &self.chain.stable_tokens)?;
        if px <= 0.0 {
            return None;
        }
        let min = to_raw(self.chain.thresholds.min_trade_usd / px, token.decimals);
        let max = to_raw(self.chain.thresholds.max_trade_usd / px, token.decimals);
        if max.is_zero() {
            return None;
        }
        Some((min.max(U256::from(1u64)), max))
    }
}

/// A detection strategy over the price graph.
pub trait Detector: Send {
    fn name(&self) -> &'static str;
    fn detect(&mut self, ctx: &DetectCtx) -> Vec<Opportunity>;
}

/// Simulate a two-hop round trip start -> other -> start.
pub(crate) fn two_hop_sim<'a>(buy: &'a Edge, sell: &'a Edge) -> impl Fn(U256) -> Quote + 'a {
    move |x: U256| {
        let first = buy.amount_out(x);
        if first.is_zero() {
            return Quote::zero();
        }
        let second = sell.amount_out(first.amount_out);
        Quote {
            amount_out: second.amount_out,
            estimated: first.estimated || second.estimated,
        }
    }
}

/// Size a two-hop round trip with the optimizer. Seeded analytically when
/// both hops are reserve-based.
pub(crate) fn size_two_hop(ctx: &DetectCtx, buy: &Edge, sell: &Edge) -> Option<SizedTrade> {
    let (x_min, x_max) = ctx.trade_bounds_raw(&buy.from)?;

    // Impact cap: 30% of the smallest reserve-in along the path, the sell
    // leg's bound translated into start-token units through the spot rate.
    let buy_bound = buy.max_input_bound();
    let sell_bound_start = {
        let rate = buy.spot_rate();
        if rate > 0.0 {
            let sell_bound = crate::math::to_human(sell.max_input_bound(), sell.decimals_in);
            to_raw(sell_bound / rate, buy.decimals_in)
        } else {
            U256::ZERO
        }
    };
    let smallest = if sell_bound_start.is_zero() {
        buy_bound
    } else {
        buy_bound.min(sell_bound_start)
    };
    let cap = Optimizer::impact_cap(smallest);

    let seed = match (buy.reserves_in_out(), sell.reserves_in_out()) {
        (Some((b_in, b_out)), Some((s_in, s_out)))
            if !buy.dex.family.is_stable_curve() && !sell.dex.family.is_stable_curve() =>
        {
            let s = crate::math::v2::optimal_two_pool_input(
                b_in,
                b_out,
                buy.fee(),
                s_in,
                s_out,
                sell.fee(),
            );
            if s.is_zero() {
                None
            } else {
                Some(s)
            }
        }
        _ => None,
    };

    let sim = two_hop_sim(buy, sell);
    let sized = ctx.optimizer.optimize(&sim, x_min, x_max, cap, seed);
    if sized.is_some() {
        Some(sized)
    } else {
        None
    }
}

/// Simulate an arbitrary edge path, feeding each hop's output forward.
pub(crate) fn path_sim<'a>(edges: &'a [&'a Edge]) -> impl Fn(U256) -> Quote + 'a {
    move |x: U256| {
        let mut amount = x;
        let mut estimated = false;
        for edge in edges {
            let q = edge.amount_out(amount);
            if q.is_zero() {
                return Quote::zero();
            }
            estimated |= q.estimated;
            amount = q.amount_out;
        }
        Quote {
            amount_out: amount,
            estimated,
        }
    }
}

/// Size an arbitrary cycle with the optimizer (no analytical seed).
pub(crate) fn size_path(ctx: &DetectCtx, edges: &[&Edge]) -> Option<SizedTrade> {
    let start = &edges[0].from;
    let (x_min, x_max) = ctx.trade_bounds_raw(start)?;

    // Impact cap: smallest hop bound, translated back into start-token
    // units through the cumulative spot rate up to that hop.
    let mut rate_acc = 1.0f64;
    let mut cap_human = f64::INFINITY;
    for edge in edges {
        let bound = crate::math::to_human(edge.max_input_bound(), edge.decimals_in);
        if rate_acc <= 0.0 {
            return None;
        }
        cap_human = cap_human.min(bound / rate_acc);
        rate_acc *= edge.spot_rate();
    }
    if !cap_human.is_finite() || cap_human <= 0.0 {
        return None;
    }
    let cap = Optimizer::impact_cap(to_raw(cap_human, ctx.token_decimals(start)));

    let sim = path_sim(edges);
    let sized = ctx.optimizer.optimize(&sim, x_min, x_max, cap, None);
    if sized.is_some() {
        Some(sized)
    } else {
        None
    }
}

/// Assemble an opportunity from a sized cycle.
pub(crate) fn build_cycle(
    ctx: &DetectCtx,
    kind: OpportunityKind,
    edges: &[&Edge],
    sized: &SizedTrade,
) -> Opportunity {
    let mut path = vec![edges[0].from.clone()];
    let mut hops = Vec::with_capacity(edges.len());
    let mut spot_product = 1.0;
    let mut block = 0u64;
    let mut min_liquidity = f64::INFINITY;
    for edge in edges {
        path.push(edge.to.clone());
        hops.push(Hop::new(&edge.from, &edge.to, &edge.dex.name, edge.pool));
        spot_product *= edge.spot_rate();
        block = block.max(edge.block());
        min_liquidity = min_liquidity.min(edge.liquidity_usd);
    }
    let mut opp = Opportunity::new(kind, ctx.chain.chain_id, path, hops);
    opp.amount_in = sized.amount_in;
    opp.expected_out = sized.expected_out;
    opp.gross_profit = sized.expected_out.saturating_sub(sized.amount_in);
    opp.spread_percent = (spot_product - 1.0).max(0.0) * 100.0;
    opp.block_number = block;
    opp.min_liquidity_usd = if min_liquidity.is_finite() {
        min_liquidity
    } else {
        0.0
    };
    opp.estimated_quote = sized.estimated;
    opp.flash_loan_available = ctx.chain.flash_loan.available();
    opp
}

/// Assemble an opportunity from a sized two-hop trade.
pub(crate) fn build_two_hop(
    ctx: &DetectCtx,
    kind: OpportunityKind,
    buy: &Edge,
    sell: &Edge,
    sized: &SizedTrade,
) -> Opportunity {
    build_cycle(ctx, kind, &[buy, sell], sized)
}

/// Realized profit of an opportunity as a fraction of its input.
pub(crate) fn realized_profit_fraction(opp: &Opportunity) -> f64 {
    if opp.amount_in.is_zero() {
        return 0.0;
    }
    crate::math::u256_to_f64(opp.gross_profit) / crate::math::u256_to_f64(opp.amount_in)
}

/// Detector tie-break ordering: profit fraction descending, then minimum
/// path liquidity descending, then lexicographic path.
pub(crate) fn rank_opportunities(found: &mut [Opportunity]) {
    found.sort_by(|a, b| {
        realized_profit_fraction(b)
            .partial_cmp(&realized_profit_fraction(a))
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                b.min_liquidity_usd
                    .partial_cmp(&a.min_liquidity_usd)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.path.cmp(&b.path))
    });
}

/// Profit fraction of a sized trade (profit / input), for ranking before
/// USD pricing exists.
pub(crate) fn profit_fraction(sized: &SizedTrade) -> f64 {
    if sized.amount_in.is_zero() {
        return 0.0;
    }
    let profit = crate::math::u256_to_f64(sized.expected_out.saturating_sub(sized.amount_in));
    profit / crate::math::u256_to_f64(sized.amount_in)
}
