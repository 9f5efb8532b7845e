//! Triangular detector
//!
//! Three-hop cycles Base -> A -> B -> Base, in two modes: single-DEX
//! (every hop on one venue) and cross-DEX (best venue per hop). Cycles are
//! prefiltered on the spot-rate product before the optimizer prices the
//! real curve, so the sized profit always lands below the spot estimate.
//!
//! Author: AI-Generated
//! Created: 2026-02-04

use super::{build_cycle, rank_opportunities, size_path, DetectCtx, Detector};
use crate::graph::Edge;
use crate::types::{Opportunity, OpportunityKind, PairKey};
use std::collections::HashSet;
use tracing::{debug, info};

pub struct TriangularDetector;

impl TriangularDetector {
    pub fn new() -> Self {
        Self
    }

    /// Best admissible edge for a directed pair, optionally pinned to one
    /// DEX. "Best" is the highest effective spot rate.
    fn best_edge<'a>(
        ctx: &'a DetectCtx,
        from: &str,
        to: &str,
        dex: Option<&str>,
    ) -> Option<&'a Edge> {
        let floor = ctx.chain.detectors.triangular_min_liquidity_usd;
        ctx.graph
            .admissible_edges(from, to, floor, ctx.min_block())
            .filter(|e| dex.map(|d| e.dex.name == d).unwrap_or(true))
            .max_by(|a, b| {
                a.spot_rate()
                    .partial_cmp(&b.spot_rate())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    }

    /// Token pairs (A, B) such that Base->A, A->B, B->Base all exist.
    fn candidate_legs(ctx: &DetectCtx, base: &str) -> Vec<(String, String)> {
        let floor = ctx.chain.detectors.triangular_min_liquidity_usd;
        let min_block = ctx.min_block();
        let firsts: Vec<String> = ctx
            .graph
            .neighbors(base)
            .filter(|(to, _)| *to != base)
            .map(|(to, _)| to.to_string())
            .collect();

        let mut legs = Vec::new();
        for a in &firsts {
            for (b, _) in ctx.graph.neighbors(a) {
                if b == base || b == a {
                    continue;
                }
                if ctx
                    .graph
                    .admissible_edges(b, base, floor, min_block)
                    .next()
                    .is_some()
                {
                    legs.push((a.clone(), b.to_string()));
                }
            }
        }
        legs
    }

    fn scan_mode(
        &self,
        ctx: &DetectCtx,
        base: &str,
        dex_pin: Option<&str>,
        kind: OpportunityKind,
        seen: &mut HashSet<Vec<String>>,
        out: &mut Vec<Opportunity>,
    ) {
        let threshold = 1.0 + ctx.chain.thresholds.min_profit_percent / 100.0;
        for (a, b) in Self::candidate_legs(ctx, base) {
            if !ctx.should_scan(&PairKey::new(base, &a)) {
                continue;
            }
            let Some(e1) = Self::best_edge(ctx, base, &a, dex_pin) else {
                continue;
            };
            let Some(e2) = Self::best_edge(ctx, &a, &b, dex_pin) else {
                continue;
            };
            let Some(e3) = Self::best_edge(ctx, &b, base, dex_pin) else {
                continue;
            };

            // Cross-DEX mode skips cycles that collapse onto one venue;
            // single-DEX mode already covers those.
            if dex_pin.is_none()
                && e1.dex.name == e2.dex.name
                && e2.dex.name == e3.dex.name
            {
                continue;
            }

            // Spot prefilter with fees: only cycles whose product clears
            // the chain's minimum profit percentage get sized.
            let product = e1.spot_rate() * e2.spot_rate() * e3.spot_rate();
            if product <= threshold {
                continue;
            }

            let edges = [e1, e2, e3];
            let Some(sized) = size_path(ctx, &edges) else {
                continue;
            };
            let opp = build_cycle(ctx, kind, &edges, &sized);
            if !seen.insert(opp.path.clone()) {
                continue;
            }
            debug!(
                "triangular cycle {:?} product {:.5} sized profit {}",
                opp.path, product, opp.gross_profit
            );
            out.push(opp);
        }
    }
}

impl Default for TriangularDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for TriangularDetector {
    fn name(&self) -> &'static str {
        "triangular"
    }

    fn detect(&mut self, ctx: &DetectCtx) -> Vec<Opportunity> {
        let mut found = Vec::new();
        let mut seen = HashSet::new();

        let dex_names: Vec<String> = ctx.chain.dexes.iter().map(|d| d.name.clone()).collect();
        for base in &ctx.chain.base_tokens {
            for dex in &dex_names {
                self.scan_mode(
                    ctx,
                    base,
                    Some(dex),
                    OpportunityKind::TriangularSingleDex,
                    &mut seen,
                    &mut found,
                );
            }
            self.scan_mode(
                ctx,
                base,
                None,
                OpportunityKind::TriangularCrossDex,
                &mut seen,
                &mut found,
            );
        }

        rank_opportunities(&mut found);
        if !found.is_empty() {
            info!(
                "triangular: {} cycle(s), best {:?}",
                found.len(),
                found[0].path
            );
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::testkit::*;
    use crate::graph::PriceGraph;
    use crate::math::u256_to_f64;
    use crate::optimizer::Optimizer;
    use alloy::primitives::U256;
    use std::collections::HashMap;

    /// Seed a one-DEX graph whose spot rates are
    /// USDC->WMATIC 1.02, WMATIC->WETH 1.02, WETH->USDC 1.02 before fees.
    /// (Unit prices are synthetic; only the ratios matter.)
    fn profitable_cycle_graph(fee: f64) -> PriceGraph {
        let mut graph = PriceGraph::new();
        let qs = dex_v2("quickswap", fee);
        // Rate from->to = reserve_to / reserve_from.
        upsert_v2(&mut graph, &qs, 1, "USDC", "WMATIC", e18(1_000_000), e18(1_020_000), 100, 2_000_000.0);
        upsert_v2(&mut graph, &qs, 2, "WMATIC", "WETH", e18(1_000_000), e18(1_020_000), 100, 2_000_000.0);
        upsert_v2(&mut graph, &qs, 3, "WETH", "USDC", e18(1_000_000), e18(1_020_000), 100, 2_000_000.0);
        graph
    }

    #[test]
    fn test_single_dex_cycle_detected_and_bounded_by_spot() {
        let chain = chain();
        let graph = profitable_cycle_graph(0.003);
        let optimizer = Optimizer::new(0.0);
        let rates = HashMap::new();
        let ctx = ctx_with(&chain, &graph, &optimizer, &rates, 100);

        let found = TriangularDetector::new().detect(&ctx);
        let cycle = found
            .iter()
            .find(|o| o.kind == OpportunityKind::TriangularSingleDex && o.path[0] == "USDC")
            .expect("profitable USDC cycle");

        assert!(cycle.is_valid_cycle());
        assert_eq!(cycle.path.len(), 4);
        assert!(cycle.expected_out > cycle.amount_in);

        // Spot product: 1.02^3 * (1 - 0.003)^3 ~ 1.0517. The sized profit
        // must be strictly below the spot prediction (price impact).
        let spot_profit_pct = 1.02f64.powi(3) * 0.997f64.powi(3) - 1.0;
        let realized =
            u256_to_f64(cycle.gross_profit) / u256_to_f64(cycle.amount_in);
        assert!(realized > 0.0);
        assert!(
            realized < spot_profit_pct,
            "realized {} must undercut spot {}",
            realized,
            spot_profit_pct
        );
    }

    #[test]
    fn test_cycle_below_threshold_rejected() {
        let chain = chain();
        // 0.1% legs cannot clear three 0.3% fees.
        let mut graph = PriceGraph::new();
        let qs = dex_v2("quickswap", 0.003);
        upsert_v2(&mut graph, &qs, 1, "USDC", "WMATIC", e18(1_000_000), e18(1_001_000), 100, 2_000_000.0);
        upsert_v2(&mut graph, &qs, 2, "WMATIC", "WETH", e18(1_000_000), e18(1_001_000), 100, 2_000_000.0);
        upsert_v2(&mut graph, &qs, 3, "WETH", "USDC", e18(1_000_000), e18(1_001_000), 100, 2_000_000.0);

        let optimizer = Optimizer::new(0.0);
        let rates = HashMap::new();
        let ctx = ctx_with(&chain, &graph, &optimizer, &rates, 100);
        let found = TriangularDetector::new().detect(&ctx);
        assert!(found.is_empty());
    }

    #[test]
    fn test_cross_dex_mode_requires_mixed_venues() {
        let chain = chain();
        let graph = profitable_cycle_graph(0.003);
        let optimizer = Optimizer::new(0.0);
        let rates = HashMap::new();
        let ctx = ctx_with(&chain, &graph, &optimizer, &rates, 100);

        let found = TriangularDetector::new().detect(&ctx);
        // Only one venue exists, so every emitted cycle is single-DEX.
        assert!(found
            .iter()
            .all(|o| o.kind == OpportunityKind::TriangularSingleDex));
    }

    #[test]
    fn test_mixed_venue_cycle_tagged_cross_dex() {
        let chain = chain();
        let mut graph = PriceGraph::new();
        let qs = dex_v2("quickswap", 0.003);
        let ss = dex_v2("sushiswap", 0.003);
        // The middle hop only exists on sushiswap.
        upsert_v2(&mut graph, &qs, 1, "USDC", "WMATIC", e18(1_000_000), e18(1_030_000), 100, 2_000_000.0);
        upsert_v2(&mut graph, &ss, 2, "WMATIC", "WETH", e18(1_000_000), e18(1_030_000), 100, 2_000_000.0);
        upsert_v2(&mut graph, &qs, 3, "WETH", "USDC", e18(1_000_000), e18(1_030_000), 100, 2_000_000.0);

        let optimizer = Optimizer::new(0.0);
        let rates = HashMap::new();
        let ctx = ctx_with(&chain, &graph, &optimizer, &rates, 100);
        let found = TriangularDetector::new().detect(&ctx);
        assert!(found
            .iter()
            .any(|o| o.kind == OpportunityKind::TriangularCrossDex));
    }

    #[test]
    fn test_results_ranked_by_profit() {
        let chain = chain();
        let graph = profitable_cycle_graph(0.003);
        let optimizer = Optimizer::new(0.0);
        let rates = HashMap::new();
        let ctx = ctx_with(&chain, &graph, &optimizer, &rates, 100);

        let found = TriangularDetector::new().detect(&ctx);
        for pair in found.windows(2) {
            let a = u256_to_f64(pair[0].gross_profit) / u256_to_f64(pair[0].amount_in).max(1.0);
            let b = u256_to_f64(pair[1].gross_profit) / u256_to_f64(pair[1].amount_in).max(1.0);
            assert!(a >= b, "ranking must be non-increasing");
        }
    }
}
