//! Multi-hop detector
//!
//! Bounded depth-first enumeration of profitable cycles of 3 to max_hops
//! hops over the unified multi-DEX graph. A per-pass visit budget and an
//! optimistic-rate prune keep the search inside block time on volatile
//! graphs.
//!
//! Author: AI-Generated
//! Created: 2026-02-04

use super::{build_cycle, rank_opportunities, size_path, DetectCtx, Detector};
use crate::graph::Edge;
use crate::types::{Opportunity, OpportunityKind};
use std::collections::HashSet;
use tracing::{debug, info};

/// Generous per-hop rate assumed for unexplored suffix hops when pruning.
/// A prefix that cannot clear the threshold even at this rate is dead.
const OPTIMISTIC_HOP_RATE: f64 = 1.02;

pub struct MultiHopDetector;

impl MultiHopDetector {
    pub fn new() -> Self {
        Self
    }

    /// Best admissible edge per neighbor, highest effective rate first.
    fn ranked_neighbors<'a>(ctx: &DetectCtx<'a>, from: &str) -> Vec<&'a Edge> {
        let floor = ctx.chain.detectors.multi_hop_min_liquidity_usd;
        let min_block = ctx.min_block();
        let mut edges: Vec<&Edge> = Vec::new();
        for (to, _) in ctx.graph.neighbors(from) {
            if let Some(best) = ctx
                .graph
                .admissible_edges(from, to, floor, min_block)
                .max_by(|a, b| {
                    a.spot_rate()
                        .partial_cmp(&b.spot_rate())
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
            {
                edges.push(best);
            }
        }
        edges.sort_by(|a, b| {
            b.spot_rate()
                .partial_cmp(&a.spot_rate())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        edges
    }

    #[allow(clippy::too_many_arguments)]
    fn dfs<'a>(
        &self,
        ctx: &DetectCtx<'a>,
        base: &str,
        node: &str,
        stack: &mut Vec<&'a Edge>,
        product: f64,
        visited: &mut HashSet<String>,
        budget: &mut usize,
        out: &mut Vec<Opportunity>,
    ) {
        if *budget == 0 {
            return;
        }
        let max_hops = ctx.chain.detectors.max_hops;
        let threshold = 1.0 + ctx.chain.thresholds.min_profit_percent / 100.0;

        // Optimistic prune: even perfect remaining hops cannot save this
        // prefix.
        let remaining = max_hops.saturating_sub(stack.len());
        if product * OPTIMISTIC_HOP_RATE.powi(remaining as i32) <= threshold {
            return;
        }

        // Try to close the cycle back to base (minimum 3 hops total).
        if stack.len() >= 2 {
            let floor = ctx.chain.detectors.multi_hop_min_liquidity_usd;
            if let Some(closing) = ctx
                .graph
                .admissible_edges(node, base, floor, ctx.min_block())
                .max_by(|a, b| {
                    a.spot_rate()
                        .partial_cmp(&b.spot_rate())
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
            {
                *budget = budget.saturating_sub(1);
                let full_product = product * closing.spot_rate();
                if full_product > threshold {
                    stack.push(closing);
                    let edges: Vec<&Edge> = stack.clone();
                    if let Some(sized) = size_path(ctx, &edges) {
                        let opp =
                            build_cycle(ctx, OpportunityKind::MultiHop, &edges, &sized);
                        debug!(
                            "multi-hop cycle {:?} product {:.5}",
                            opp.path, full_product
                        );
                        out.push(opp);
                    }
                    stack.pop();
                }
            }
        }

        if stack.len() + 1 >= max_hops || *budget == 0 {
            return;
        }

        for edge in Self::ranked_neighbors(ctx, node) {
            // The starting base is the only permitted repeat, and only as
            // the closing hop handled above.
            if visited.contains(&edge.to) || edge.to == base {
                continue;
            }
            visited.insert(edge.to.clone());
            stack.push(edge);
            self.dfs(
                ctx,
                base,
                &edge.to.clone(),
                stack,
                product * edge.spot_rate(),
                visited,
                budget,
                out,
            );
            stack.pop();
            visited.remove(&edge.to);
            if *budget == 0 {
                return;
            }
        }
    }
}

impl Default for MultiHopDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for MultiHopDetector {
    fn name(&self) -> &'static str {
        "multi-hop"
    }

    fn detect(&mut self, ctx: &DetectCtx) -> Vec<Opportunity> {
        let mut out = Vec::new();
        let mut budget = ctx.chain.detectors.max_cycles_per_pass;
        for base in &ctx.chain.base_tokens {
            let mut visited = HashSet::from([base.clone()]);
            let mut stack = Vec::new();
            self.dfs(
                ctx,
                base,
                base,
                &mut stack,
                1.0,
                &mut visited,
                &mut budget,
                &mut out,
            );
        }
        rank_opportunities(&mut out);
        if !out.is_empty() {
            info!("multi-hop: {} cycle(s) within budget", out.len());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::testkit::*;
    use crate::graph::PriceGraph;
    use crate::optimizer::Optimizer;
    use std::collections::HashMap;

    /// Ring USDC -> WMATIC -> WETH -> WBTC -> USDC with a 2% edge each.
    fn four_hop_graph() -> (crate::config::ChainConfig, PriceGraph) {
        let mut chain = chain();
        chain.tokens.push(crate::types::Token::new(
            "WBTC",
            alloy::primitives::Address::repeat_byte(4),
            18,
            crate::types::TokenClass::BlueChip,
        ));
        let mut graph = PriceGraph::new();
        let qs = dex_v2("quickswap", 0.003);
        upsert_v2(&mut graph, &qs, 1, "USDC", "WMATIC", e18(1_000_000), e18(1_020_000), 100, 800_000.0);
        upsert_v2(&mut graph, &qs, 2, "WMATIC", "WETH", e18(1_000_000), e18(1_020_000), 100, 800_000.0);
        upsert_v2(&mut graph, &qs, 3, "WETH", "WBTC", e18(1_000_000), e18(1_020_000), 100, 800_000.0);
        upsert_v2(&mut graph, &qs, 4, "WBTC", "USDC", e18(1_000_000), e18(1_020_000), 100, 800_000.0);
        (chain, graph)
    }

    #[test]
    fn test_four_hop_cycle_found() {
        let (chain, graph) = four_hop_graph();
        let optimizer = Optimizer::new(0.0);
        let rates = HashMap::new();
        let ctx = ctx_with(&chain, &graph, &optimizer, &rates, 100);

        let found = MultiHopDetector::new().detect(&ctx);
        let four = found
            .iter()
            .find(|o| o.path.len() == 5 && o.path[0] == "USDC")
            .expect("four-hop USDC cycle");
        assert!(four.is_valid_cycle());
        assert!(four.expected_out > four.amount_in);
    }

    #[test]
    fn test_no_intermediate_repeats() {
        let (chain, graph) = four_hop_graph();
        let optimizer = Optimizer::new(0.0);
        let rates = HashMap::new();
        let ctx = ctx_with(&chain, &graph, &optimizer, &rates, 100);

        for opp in MultiHopDetector::new().detect(&ctx) {
            assert!(opp.is_valid_cycle(), "bad cycle {:?}", opp.path);
            assert!(opp.path.len() <= chain.detectors.max_hops + 1);
        }
    }

    #[test]
    fn test_budget_caps_enumeration() {
        let (mut chain, graph) = four_hop_graph();
        chain.detectors.max_cycles_per_pass = 1;
        let optimizer = Optimizer::new(0.0);
        let rates = HashMap::new();
        let ctx = ctx_with(&chain, &graph, &optimizer, &rates, 100);

        let found = MultiHopDetector::new().detect(&ctx);
        assert!(found.len() <= 1);
    }

    #[test]
    fn test_liquidity_floor_prunes_path() {
        let (chain, mut graph) = four_hop_graph();
        // Rebuild the WETH->WBTC leg with liquidity below the multi-hop
        // floor; the 4-hop cycle through it must disappear.
        let qs = dex_v2("quickswap", 0.003);
        upsert_v2(&mut graph, &qs, 3, "WETH", "WBTC", e18(1_000_000), e18(1_020_000), 101, 100.0);

        let optimizer = Optimizer::new(0.0);
        let rates = HashMap::new();
        let ctx = ctx_with(&chain, &graph, &optimizer, &rates, 101);
        let found = MultiHopDetector::new().detect(&ctx);
        assert!(found
            .iter()
            .all(|o| !(o.path.contains(&"WBTC".to_string()) && o.path[0] == "USDC")));
    }
}
