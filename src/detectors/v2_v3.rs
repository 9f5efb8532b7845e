//! V2/V3 fee-tier detector
//!
//! Spreads between AMM families on the same pair (constant-product versus
//! concentrated liquidity) and between fee tiers of the same V3 pair.
//! Effective prices include each side's fee; the round trip must clear
//! the configured minimum spread before sizing.
//!
//! Author: AI-Generated
//! Created: 2026-02-04

use super::{build_two_hop, profit_fraction, size_two_hop, DetectCtx, Detector};
use crate::graph::Edge;
use crate::types::{DexFamily, Opportunity, OpportunityKind, PairKey};
use tracing::{debug, info};

pub struct V2V3Detector;

impl V2V3Detector {
    pub fn new() -> Self {
        Self
    }

    /// True when the combination is in scope: family-crossing, or two V3
    /// venues on different fee tiers.
    fn eligible(buy: &Edge, sell: &Edge) -> bool {
        let buy_v3 = buy.dex.family == DexFamily::ConcentratedV3;
        let sell_v3 = sell.dex.family == DexFamily::ConcentratedV3;
        match (buy_v3, sell_v3) {
            (true, true) => {
                let tier = |e: &Edge| e.snapshot.as_v3().map(|s| s.fee_tier);
                tier(buy) != tier(sell)
            }
            (a, b) => a != b,
        }
    }

    fn check_pair(&self, ctx: &DetectCtx, pair: &PairKey) -> Option<Opportunity> {
        let floor = ctx.chain.detectors.cross_dex_min_liquidity_usd;
        let min_spread = 1.0 + ctx.chain.detectors.v2_v3_min_spread;
        let min_block = ctx.min_block();

        let mut best: Option<(f64, Opportunity)> = None;
        for (start, other) in [
            (pair.first(), pair.second()),
            (pair.second(), pair.first()),
        ] {
            let buys: Vec<&Edge> = ctx
                .graph
                .admissible_edges(start, other, floor, min_block)
                .collect();
            let sells: Vec<&Edge> = ctx
                .graph
                .admissible_edges(other, start, floor, min_block)
                .collect();

            for &buy in &buys {
                for &sell in &sells {
                    if buy.pool == sell.pool || !Self::eligible(buy, sell) {
                        continue;
                    }
                    let cycle = buy.spot_rate() * sell.spot_rate();
                    if cycle <= min_spread {
                        continue;
                    }
                    let Some(sized) = size_two_hop(ctx, buy, sell) else {
                        continue;
                    };
                    let fraction = profit_fraction(&sized);
                    if best.as_ref().map(|(f, _)| fraction > *f).unwrap_or(true) {
                        debug!(
                            "{}: v2v3 spread {:.4}% {} -> {}",
                            pair,
                            (cycle - 1.0) * 100.0,
                            buy.dex.name,
                            sell.dex.name
                        );
                        best = Some((
                            fraction,
                            build_two_hop(ctx, OpportunityKind::V2V3, buy, sell, &sized),
                        ));
                    }
                }
            }
        }
        best.map(|(_, o)| o)
    }
}

impl Default for V2V3Detector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for V2V3Detector {
    fn name(&self) -> &'static str {
        "v2-v3"
    }

    fn detect(&mut self, ctx: &DetectCtx) -> Vec<Opportunity> {
        let mut found = Vec::new();
        for pair in ctx.graph.pairs() {
            if !ctx.should_scan(&pair) {
                continue;
            }
            if let Some(opp) = self.check_pair(ctx, &pair) {
                info!(
                    "v2v3 opportunity: {} {} -> {} spread {:.3}%",
                    pair, opp.hops[0].dex, opp.hops[1].dex, opp.spread_percent
                );
                found.push(opp);
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::testkit::*;
    use crate::graph::{EdgeUpsert, PriceGraph};
    use crate::math::tick::sqrt_ratio_at_tick;
    use crate::optimizer::Optimizer;
    use crate::types::{DexDescriptor, PoolSnapshot, V3Snapshot};
    use alloy::primitives::{Address, U256};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn upsert_v3(
        graph: &mut PriceGraph,
        name: &str,
        pool: u8,
        tick: i32,
        fee_tier: u32,
        liquidity: u128,
        block: u64,
    ) {
        let dex = Arc::new(
            DexDescriptor::new(name, crate::types::DexFamily::ConcentratedV3, 0.0)
                .with_fee_tier(fee_tier),
        );
        graph.upsert(EdgeUpsert {
            pair: PairKey::new("WMATIC", "USDC"),
            dex,
            pool: Address::repeat_byte(pool),
            snapshot: PoolSnapshot::V3(V3Snapshot::new(
                sqrt_ratio_at_tick(tick),
                liquidity,
                tick,
                fee_tier,
                block,
            )),
            token0: "WMATIC".into(),
            token1: "USDC".into(),
            decimals0: 18,
            decimals1: 18,
            liquidity_usd: 400_000.0,
            log_index: 0,
        });
    }

    #[test]
    fn test_family_crossing_spread_detected() {
        let chain = chain();
        let mut graph = PriceGraph::new();
        let qs = dex_v2("quickswap", 0.003);
        // V2 pool prices WMATIC at 1.00 USDC; V3 pool at tick 300
        // (~1.0305). Spread ~3% against 0.35% round-trip fees.
        upsert_v2(&mut graph, &qs, 1, "WMATIC", "USDC", e18(1_000_000), e18(1_000_000), 100, 800_000.0);
        upsert_v3(&mut graph, "uniswap-v3", 2, 300, 500, 2_000_000_000_000_000_000_000_000, 100);

        let optimizer = Optimizer::new(0.0);
        let rates = HashMap::new();
        let ctx = ctx_with(&chain, &graph, &optimizer, &rates, 100);
        let found = V2V3Detector::new().detect(&ctx);
        assert_eq!(found.len(), 1);

        let opp = &found[0];
        assert_eq!(opp.kind, OpportunityKind::V2V3);
        // Buy WMATIC on the cheap V2 pool, sell into the rich V3 pool.
        let families: Vec<_> = opp.hops.iter().map(|h| h.dex.clone()).collect();
        assert!(families.contains(&"quickswap".to_string()));
        assert!(families.contains(&"uniswap-v3".to_string()));
        assert!(opp.expected_out > opp.amount_in);
    }

    #[test]
    fn test_tight_spread_rejected() {
        let chain = chain();
        let mut graph = PriceGraph::new();
        let qs = dex_v2("quickswap", 0.003);
        // Tick 10 ~ 0.1% away from parity: below the 0.15% minimum plus fees.
        upsert_v2(&mut graph, &qs, 1, "WMATIC", "USDC", e18(1_000_000), e18(1_000_000), 100, 800_000.0);
        upsert_v3(&mut graph, "uniswap-v3", 2, 10, 500, 2_000_000_000_000_000_000_000_000, 100);

        let optimizer = Optimizer::new(0.0);
        let rates = HashMap::new();
        let ctx = ctx_with(&chain, &graph, &optimizer, &rates, 100);
        assert!(V2V3Detector::new().detect(&ctx).is_empty());
    }

    #[test]
    fn test_intra_v3_fee_tier_spread() {
        let chain = chain();
        let mut graph = PriceGraph::new();
        // Same pair on two tiers of the same venue family, 3% apart.
        upsert_v3(&mut graph, "uniswap-v3-500", 1, 0, 500, 2_000_000_000_000_000_000_000_000, 100);
        upsert_v3(&mut graph, "uniswap-v3-3000", 2, 300, 3000, 2_000_000_000_000_000_000_000_000, 100);

        let optimizer = Optimizer::new(0.0);
        let rates = HashMap::new();
        let ctx = ctx_with(&chain, &graph, &optimizer, &rates, 100);
        let found = V2V3Detector::new().detect(&ctx);
        assert_eq!(found.len(), 1);
        assert!(found[0].expected_out > found[0].amount_in);
    }

    #[test]
    fn test_same_tier_v3_pools_not_eligible() {
        let chain = chain();
        let mut graph = PriceGraph::new();
        upsert_v3(&mut graph, "uniswap-v3", 1, 0, 500, 2_000_000_000_000_000_000_000_000, 100);
        upsert_v3(&mut graph, "sushiswap-v3", 2, 300, 500, 2_000_000_000_000_000_000_000_000, 100);

        let optimizer = Optimizer::new(0.0);
        let rates = HashMap::new();
        let ctx = ctx_with(&chain, &graph, &optimizer, &rates, 100);
        // Same fee tier on both sides: the cross-DEX detector's turf.
        assert!(V2V3Detector::new().detect(&ctx).is_empty());
    }
}
