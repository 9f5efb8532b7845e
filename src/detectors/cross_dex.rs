//! Cross-DEX detector
//!
//! Two-DEX same-pair arbitrage: buy the base token where it is cheap,
//! sell it where it is dear, sized by the optimizer against real AMM
//! output. Emits at most one opportunity per pair, the better of the two
//! trade orientations.
//!
//! Author: AI-Generated
//! Created: 2026-02-04

use super::{build_two_hop, profit_fraction, size_two_hop, DetectCtx, Detector};
use crate::types::{Opportunity, OpportunityKind};
use tracing::{debug, info};

pub struct CrossDexDetector;

impl CrossDexDetector {
    pub fn new() -> Self {
        Self
    }

    /// Best opportunity for one pair, or None.
    fn check_pair(&self, ctx: &DetectCtx, pair: &crate::types::PairKey) -> Option<Opportunity> {
        let floor = ctx.chain.detectors.cross_dex_min_liquidity_usd;
        let min_block = ctx.min_block();

        let mut best: Option<(f64, Opportunity)> = None;
        // Both orientations: start at either leg of the pair.
        for (start, other) in [
            (pair.first(), pair.second()),
            (pair.second(), pair.first()),
        ] {
            let buys: Vec<_> = ctx
                .graph
                .admissible_edges(start, other, floor, min_block)
                .collect();
            let sells: Vec<_> = ctx
                .graph
                .admissible_edges(other, start, floor, min_block)
                .collect();
            if buys.is_empty() || sells.is_empty() {
                continue;
            }

            for &buy in &buys {
                for &sell in &sells {
                    if buy.dex.name == sell.dex.name {
                        continue;
                    }
                    // Buy price below sell price, fees included, or the
                    // round trip cannot close above 1.
                    let cycle = buy.spot_rate() * sell.spot_rate();
                    if cycle <= 1.0 {
                        continue;
                    }

                    let Some(sized) = size_two_hop(ctx, buy, sell) else {
                        continue;
                    };
                    let fraction = profit_fraction(&sized);
                    if best.as_ref().map(|(f, _)| fraction > *f).unwrap_or(true) {
                        let opp =
                            build_two_hop(ctx, OpportunityKind::TwoDex, buy, sell, &sized);
                        debug!(
                            "{}: {} -> {} via {}/{} cycle {:.5} profit {:.4}%",
                            pair,
                            start,
                            other,
                            buy.dex.name,
                            sell.dex.name,
                            cycle,
                            fraction * 100.0
                        );
                        best = Some((fraction, opp));
                    }
                }
            }
        }
        best.map(|(_, opp)| opp)
    }
}

impl Default for CrossDexDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for CrossDexDetector {
    fn name(&self) -> &'static str {
        "cross-dex"
    }

    fn detect(&mut self, ctx: &DetectCtx) -> Vec<Opportunity> {
        let mut found = Vec::new();
        for pair in ctx.graph.pairs() {
            if !ctx.should_scan(&pair) {
                continue;
            }
            if let Some(opp) = self.check_pair(ctx, &pair) {
                info!(
                    "two-dex opportunity: {} via {} -> {} size {} spread {:.3}%",
                    pair,
                    opp.hops[0].dex,
                    opp.hops[1].dex,
                    opp.amount_in,
                    opp.spread_percent
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
    use crate::graph::PriceGraph;
    use crate::optimizer::Optimizer;
    use std::collections::HashMap;

    #[test]
    fn test_two_dex_spread_detected() {
        let chain = chain();
        let mut graph = PriceGraph::new();
        let qs = dex_v2("quickswap", 0.0025);
        let ss = dex_v2("sushiswap", 0.0025);
        // Quickswap 300k, Sushiswap 310k: ~3.3% spread on WMATIC/USDC.
        upsert_v2(&mut graph, &qs, 1, "WMATIC", "USDC", e18(1000), e18(300_000), 100, 600_000.0);
        upsert_v2(&mut graph, &ss, 2, "WMATIC", "USDC", e18(1000), e18(310_000), 100, 620_000.0);

        let optimizer = Optimizer::new(0.0025);
        let rates = HashMap::new();
        let ctx = ctx_with(&chain, &graph, &optimizer, &rates, 100);

        let mut det = CrossDexDetector::new();
        let found = det.detect(&ctx);
        assert_eq!(found.len(), 1);

        let opp = &found[0];
        assert_eq!(opp.kind, crate::types::OpportunityKind::TwoDex);
        assert!(opp.is_valid_cycle());
        assert!(!opp.amount_in.is_zero());
        assert!(opp.expected_out > opp.amount_in);
        assert_ne!(opp.hops[0].dex, opp.hops[1].dex);
        // WMATIC is cheap on quickswap (300) and dear on sushiswap (310):
        // whichever leg runs on quickswap must be the one acquiring WMATIC.
        let quick_hop = opp
            .hops
            .iter()
            .find(|h| h.dex == "quickswap")
            .expect("quickswap leg");
        assert_eq!(quick_hop.to, "WMATIC");
        let sushi_hop = opp
            .hops
            .iter()
            .find(|h| h.dex == "sushiswap")
            .expect("sushiswap leg");
        assert_eq!(sushi_hop.from, "WMATIC");
        assert_eq!(opp.block_number, 100);
    }

    #[test]
    fn test_identical_pools_no_opportunity() {
        let chain = chain();
        let mut graph = PriceGraph::new();
        let qs = dex_v2("quickswap", 0.003);
        let ss = dex_v2("sushiswap", 0.003);
        upsert_v2(&mut graph, &qs, 1, "WMATIC", "USDC", e18(1000), e18(300_000), 100, 600_000.0);
        upsert_v2(&mut graph, &ss, 2, "WMATIC", "USDC", e18(1000), e18(300_000), 100, 600_000.0);

        let optimizer = Optimizer::new(0.0025);
        let rates = HashMap::new();
        let ctx = ctx_with(&chain, &graph, &optimizer, &rates, 100);
        assert!(CrossDexDetector::new().detect(&ctx).is_empty());
    }

    #[test]
    fn test_single_dex_no_opportunity() {
        let chain = chain();
        let mut graph = PriceGraph::new();
        let qs = dex_v2("quickswap", 0.003);
        upsert_v2(&mut graph, &qs, 1, "WMATIC", "USDC", e18(1000), e18(300_000), 100, 600_000.0);

        let optimizer = Optimizer::new(0.0025);
        let rates = HashMap::new();
        let ctx = ctx_with(&chain, &graph, &optimizer, &rates, 100);
        assert!(CrossDexDetector::new().detect(&ctx).is_empty());
    }

    #[test]
    fn test_low_liquidity_edges_pruned() {
        let chain = chain();
        let mut graph = PriceGraph::new();
        let qs = dex_v2("quickswap", 0.0025);
        let ss = dex_v2("sushiswap", 0.0025);
        upsert_v2(&mut graph, &qs, 1, "WMATIC", "USDC", e18(1000), e18(300_000), 100, 600_000.0);
        // Below the cross-dex liquidity floor.
        upsert_v2(&mut graph, &ss, 2, "WMATIC", "USDC", e18(10), e18(3_100), 100, 900.0);

        let optimizer = Optimizer::new(0.0025);
        let rates = HashMap::new();
        let ctx = ctx_with(&chain, &graph, &optimizer, &rates, 100);
        assert!(CrossDexDetector::new().detect(&ctx).is_empty());
    }

    #[test]
    fn test_stale_edges_suppress_detection() {
        let chain = chain();
        let mut graph = PriceGraph::new();
        let qs = dex_v2("quickswap", 0.0025);
        let ss = dex_v2("sushiswap", 0.0025);
        upsert_v2(&mut graph, &qs, 1, "WMATIC", "USDC", e18(1000), e18(300_000), 90, 600_000.0);
        upsert_v2(&mut graph, &ss, 2, "WMATIC", "USDC", e18(1000), e18(310_000), 100, 620_000.0);

        let optimizer = Optimizer::new(0.0025);
        let rates = HashMap::new();
        // Staleness bound is 2 blocks; the quickswap edge sits at 90.
        let ctx = ctx_with(&chain, &graph, &optimizer, &rates, 100);
        assert!(CrossDexDetector::new().detect(&ctx).is_empty());
    }
}
