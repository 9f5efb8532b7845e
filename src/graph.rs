//! Price graph
//!
//! Token-keyed directed multigraph of DEX edges for one chain. Each pool
//! contributes a forward and a reverse edge carrying the same snapshot,
//! since AMM pricing is asymmetric after fees. Owned by the chain worker
//! task; all mutation goes through it.
//!
//! Author: AI-Generated
//! Created: 2026-02-03

use crate::math::{self, stable, v2, v3};
use crate::types::{DexFamily, DexRef, PairKey, PoolSnapshot, Quote};
use alloy::primitives::{Address, U256};
use std::collections::HashMap;
use tracing::debug;

/// One directed edge: swap `from` into `to` on a specific pool.
#[derive(Debug, Clone)]
pub struct Edge {
    pub pair: PairKey,
    pub from: String,
    pub to: String,
    pub dex: DexRef,
    pub pool: Address,
    pub snapshot: PoolSnapshot,
    /// True when `from` is the pool's token0.
    pub zero_for_one: bool,
    pub decimals_in: u8,
    pub decimals_out: u8,
    /// USD-valued pool liquidity. Derived by the price source, not
    /// authoritative.
    pub liquidity_usd: f64,
    pub log_index: u64,
}

impl Edge {
    pub fn block(&self) -> u64 {
        self.snapshot.block()
    }

    /// Swap fee fraction for this hop. V3 edges read their fee tier.
    pub fn fee(&self) -> f64 {
        match &self.snapshot {
            PoolSnapshot::V3(s) => s.fee_fraction(),
            PoolSnapshot::V2(_) => self.dex.fee,
        }
    }

    /// Reserves oriented for this direction, for reserve-based pools.
    pub fn reserves_in_out(&self) -> Option<(U256, U256)> {
        let snap = self.snapshot.as_v2()?;
        if self.zero_for_one {
            Some((snap.reserve0, snap.reserve1))
        } else {
            Some((snap.reserve1, snap.reserve0))
        }
    }

    /// Exact output for the edge's family. Never panics; inadmissible
    /// state quotes zero.
    pub fn amount_out(&self, amount_in: U256) -> Quote {
        match (&self.snapshot, self.dex.family) {
            (PoolSnapshot::V3(snap), _) => v3::amount_out(snap, amount_in, self.zero_for_one),
            (PoolSnapshot::V2(_), DexFamily::StableCurve) => {
                let (r_in, r_out) = match self.reserves_in_out() {
                    Some(r) => r,
                    None => return Quote::zero(),
                };
                Quote::exact(stable::amount_out(
                    amount_in,
                    r_in,
                    r_out,
                    self.decimals_in,
                    self.decimals_out,
                    self.dex.fee,
                ))
            }
            (PoolSnapshot::V2(_), _) => {
                let (r_in, r_out) = match self.reserves_in_out() {
                    Some(r) => r,
                    None => return Quote::zero(),
                };
                Quote::exact(v2::amount_out(amount_in, r_in, r_out, self.dex.fee))
            }
        }
    }

    /// Decimal-adjusted effective rate (human out-units per human in-unit)
    /// including the fee. Prefilters and logging only.
    pub fn spot_rate(&self) -> f64 {
        let decimal_adjust = 10f64.powi(self.decimals_in as i32 - self.decimals_out as i32);
        match (&self.snapshot, self.dex.family) {
            (PoolSnapshot::V3(snap), _) => {
                v3::spot_rate(snap, self.zero_for_one) * decimal_adjust
            }
            (PoolSnapshot::V2(_), DexFamily::StableCurve) => {
                let (r_in, r_out) = match self.reserves_in_out() {
                    Some(r) => r,
                    None => return 0.0,
                };
                stable::spot_rate(r_in, r_out, self.decimals_in, self.decimals_out, self.dex.fee)
            }
            (PoolSnapshot::V2(_), _) => {
                let (r_in, r_out) = match self.reserves_in_out() {
                    Some(r) => r,
                    None => return 0.0,
                };
                v2::spot_rate(r_in, r_out, self.dex.fee) * decimal_adjust
            }
        }
    }

    /// Largest input the optimizer may consider on this edge: the oriented
    /// reserve for reserve-based pools, the in-range equivalent for V3.
    pub fn max_input_bound(&self) -> U256 {
        match &self.snapshot {
            PoolSnapshot::V2(_) => self
                .reserves_in_out()
                .map(|(r_in, _)| r_in)
                .unwrap_or(U256::ZERO),
            PoolSnapshot::V3(snap) => v3::max_input_bound(snap, self.zero_for_one),
        }
    }

}

/// Everything the graph needs to (re)index one pool.
#[derive(Debug, Clone)]
pub struct EdgeUpsert {
    pub pair: PairKey,
    pub dex: DexRef,
    pub pool: Address,
    pub snapshot: PoolSnapshot,
    /// Symbol of the pool's token0 (must be one leg of `pair`).
    pub token0: String,
    pub token1: String,
    pub decimals0: u8,
    pub decimals1: u8,
    pub liquidity_usd: f64,
    pub log_index: u64,
}

/// Per-chain directed multigraph: token -> neighbor -> edges across DEXes.
#[derive(Debug, Default)]
pub struct PriceGraph {
    edges: HashMap<String, HashMap<String, Vec<Edge>>>,
    /// Monotone (block, log_index) watermark per pool address.
    watermarks: HashMap<Address, (u64, u64)>,
    /// Bumped on every accepted mutation; quote caches key on it.
    epoch: u64,
}

impl PriceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Insert or refresh both directed edges for a pool.
    ///
    /// Updates older than the stored (block, log_index) watermark for the
    /// pool are discarded. Inadmissible snapshots (zero reserves, empty
    /// liquidity) prune the pool's edges instead of storing them.
    /// Returns true if the graph changed.
    pub fn upsert(&mut self, up: EdgeUpsert) -> bool {
        let incoming = (up.snapshot.block(), up.log_index);
        if let Some(&stored) = self.watermarks.get(&up.pool) {
            if incoming < stored {
                debug!(
                    pool = %up.pool,
                    "discarding stale update: {:?} < {:?}",
                    incoming,
                    stored
                );
                return false;
            }
        }
        self.watermarks.insert(up.pool, incoming);

        if !up.snapshot.is_admissible() {
            // Zero-reserve pools are pruned, never kept with zeros.
            self.drop_pool_edges(&up.token0, &up.token1, up.pool);
            self.epoch += 1;
            return true;
        }

        let forward = Edge {
            pair: up.pair.clone(),
            from: up.token0.clone(),
            to: up.token1.clone(),
            dex: up.dex.clone(),
            pool: up.pool,
            snapshot: up.snapshot.clone(),
            zero_for_one: true,
            decimals_in: up.decimals0,
            decimals_out: up.decimals1,
            liquidity_usd: up.liquidity_usd,
            log_index: up.log_index,
        };
        let reverse = Edge {
            pair: up.pair,
            from: up.token1.clone(),
            to: up.token0.clone(),
            dex: up.dex,
            pool: up.pool,
            snapshot: up.snapshot,
            zero_for_one: false,
            decimals_in: up.decimals1,
            decimals_out: up.decimals0,
            liquidity_usd: up.liquidity_usd,
            log_index: up.log_index,
        };
        self.put_edge(forward);
        self.put_edge(reverse);
        self.epoch += 1;
        true
    }

    fn put_edge(&mut self, edge: Edge) {
        let list = self
            .edges
            .entry(edge.from.clone())
            .or_default()
            .entry(edge.to.clone())
            .or_default();
        match list.iter_mut().find(|e| e.pool == edge.pool) {
            Some(slot) => *slot = edge,
            None => list.push(edge),
        }
    }

    fn drop_pool_edges(&mut self, token0: &str, token1: &str, pool: Address) {
        for (a, b) in [(token0, token1), (token1, token0)] {
            if let Some(inner) = self.edges.get_mut(a) {
                if let Some(list) = inner.get_mut(b) {
                    list.retain(|e| e.pool != pool);
                    if list.is_empty() {
                        inner.remove(b);
                    }
                }
                if inner.is_empty() {
                    self.edges.remove(a);
                }
            }
        }
    }

    /// Remove every pool a DEX quotes on a pair, both directions.
    pub fn remove(&mut self, pair: &PairKey, dex_name: &str) {
        let (a, b) = (pair.first().to_string(), pair.second().to_string());
        let mut changed = false;
        for (x, y) in [(&a, &b), (&b, &a)] {
            if let Some(inner) = self.edges.get_mut(x.as_str()) {
                if let Some(list) = inner.get_mut(y.as_str()) {
                    let before = list.len();
                    list.retain(|e| e.dex.name != dex_name);
                    changed |= list.len() != before;
                    if list.is_empty() {
                        inner.remove(y.as_str());
                    }
                }
                if inner.is_empty() {
                    self.edges.remove(x.as_str());
                }
            }
        }
        if changed {
            self.epoch += 1;
        }
    }

    /// Outgoing neighbors of a token with their edge lists.
    pub fn neighbors(&self, token: &str) -> impl Iterator<Item = (&str, &[Edge])> {
        self.edges
            .get(token)
            .into_iter()
            .flat_map(|inner| inner.iter().map(|(to, list)| (to.as_str(), list.as_slice())))
    }

    /// Edges for a directed token pair, one per quoting pool.
    pub fn edges(&self, from: &str, to: &str) -> &[Edge] {
        self.edges
            .get(from)
            .and_then(|inner| inner.get(to))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Edges for a directed pair that clear the caller's liquidity floor
    /// and staleness bound.
    pub fn admissible_edges(
        &self,
        from: &str,
        to: &str,
        min_liquidity_usd: f64,
        min_block: u64,
    ) -> impl Iterator<Item = &Edge> {
        self.edges(from, to)
            .iter()
            .filter(move |e| e.liquidity_usd >= min_liquidity_usd && e.block() >= min_block)
    }

    /// All distinct pair keys currently carrying edges.
    pub fn pairs(&self) -> Vec<PairKey> {
        let mut keys: Vec<PairKey> = self
            .edges
            .values()
            .flat_map(|inner| inner.values())
            .flat_map(|list| list.iter().map(|e| e.pair.clone()))
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.edges.keys().map(|s| s.as_str())
    }

    /// Number of directed edges (each pool counts twice).
    pub fn edge_count(&self) -> usize {
        self.edges
            .values()
            .flat_map(|inner| inner.values())
            .map(|list| list.len())
            .sum()
    }

    /// Highest block observed across all edges.
    pub fn freshest_block(&self) -> u64 {
        self.watermarks.values().map(|&(b, _)| b).max().unwrap_or(0)
    }

    /// USD value of a token derived from its freshest stable-paired edge.
    /// Never a hardcoded constant; None when no stable pairing exists.
    pub fn stable_anchored_usd(&self, token: &str, stables: &[String]) -> Option<f64> {
        let mut best: Option<(u64, f64)> = None;
        for stable_sym in stables {
            if stable_sym == token {
                return Some(1.0);
            }
            for edge in self.edges(token, stable_sym) {
                let rate = edge.spot_rate();
                if rate <= 0.0 {
                    continue;
                }
                // Undo the fee so the anchor is a mid price.
                let mid = rate / (1.0 - edge.fee()).max(1e-9);
                let block = edge.block();
                if best.map(|(b, _)| block > b).unwrap_or(true) {
                    best = Some((block, mid));
                }
            }
        }
        best.map(|(_, price)| price)
    }

    /// Lowest USD liquidity along a sequence of edges.
    pub fn min_liquidity_usd(edges: &[&Edge]) -> f64 {
        edges
            .iter()
            .map(|e| e.liquidity_usd)
            .fold(f64::INFINITY, f64::min)
    }

    /// Convenience for the detectors: human-unit USD value of an amount of
    /// `token` given the stable anchor set.
    pub fn amount_usd(
        &self,
        token: &str,
        decimals: u8,
        amount: U256,
        stables: &[String],
    ) -> Option<f64> {
        let px = self.stable_anchored_usd(token, stables)?;
        Some(math::to_human(amount, decimals) * px)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DexDescriptor, DexFamily, V2Snapshot};
    use std::sync::Arc;

    fn e18(x: u64) -> U256 {
        U256::from(x) * U256::from(10u64).pow(U256::from(18))
    }

    fn dex(name: &str) -> DexRef {
        Arc::new(DexDescriptor::new(name, DexFamily::ConstantProductV2, 0.003))
    }

    fn pool_addr(n: u8) -> Address {
        Address::repeat_byte(n)
    }

    fn upsert(name: &str, pool: u8, r0: u64, r1: u64, block: u64) -> EdgeUpsert {
        EdgeUpsert {
            pair: PairKey::new("WETH", "USDC"),
            dex: dex(name),
            pool: pool_addr(pool),
            snapshot: PoolSnapshot::V2(V2Snapshot::new(e18(r0), e18(r1), block)),
            token0: "WETH".into(),
            token1: "USDC".into(),
            decimals0: 18,
            decimals1: 18,
            liquidity_usd: 500_000.0,
            log_index: 0,
        }
    }

    #[test]
    fn test_upsert_creates_both_directions() {
        let mut g = PriceGraph::new();
        assert!(g.upsert(upsert("quickswap", 1, 100, 300_000, 10)));

        assert_eq!(g.edges("WETH", "USDC").len(), 1);
        assert_eq!(g.edges("USDC", "WETH").len(), 1);
        assert_eq!(g.edge_count(), 2);

        let fwd = &g.edges("WETH", "USDC")[0];
        let rev = &g.edges("USDC", "WETH")[0];
        assert!(fwd.zero_for_one);
        assert!(!rev.zero_for_one);
        // Same pool, same block on both directions.
        assert_eq!(fwd.block(), rev.block());
    }

    #[test]
    fn test_stale_update_discarded() {
        let mut g = PriceGraph::new();
        g.upsert(upsert("quickswap", 1, 100, 300_000, 10));
        assert!(!g.upsert(upsert("quickswap", 1, 999, 999, 9)));

        let edge = &g.edges("WETH", "USDC")[0];
        let (r_in, _) = edge.reserves_in_out().unwrap();
        assert_eq!(r_in, e18(100));
    }

    #[test]
    fn test_idempotent_reapply() {
        let mut g = PriceGraph::new();
        g.upsert(upsert("quickswap", 1, 100, 300_000, 10));
        let before: Vec<_> = g
            .edges("WETH", "USDC")
            .iter()
            .map(|e| e.snapshot.clone())
            .collect();

        // Same event applied twice: accepted, state unchanged.
        assert!(g.upsert(upsert("quickswap", 1, 100, 300_000, 10)));
        let after: Vec<_> = g
            .edges("WETH", "USDC")
            .iter()
            .map(|e| e.snapshot.clone())
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_zero_reserve_prunes_edge() {
        let mut g = PriceGraph::new();
        g.upsert(upsert("quickswap", 1, 100, 300_000, 10));
        g.upsert(upsert("quickswap", 1, 0, 300_000, 11));
        assert!(g.edges("WETH", "USDC").is_empty());
        assert!(g.edges("USDC", "WETH").is_empty());
    }

    #[test]
    fn test_multiple_dexes_per_pair() {
        let mut g = PriceGraph::new();
        g.upsert(upsert("quickswap", 1, 100, 300_000, 10));
        g.upsert(upsert("sushiswap", 2, 100, 310_000, 10));
        assert_eq!(g.edges("WETH", "USDC").len(), 2);

        g.remove(&PairKey::new("WETH", "USDC"), "quickswap");
        assert_eq!(g.edges("WETH", "USDC").len(), 1);
        assert_eq!(g.edges("WETH", "USDC")[0].dex.name, "sushiswap");
    }

    #[test]
    fn test_neighbors_iteration() {
        let mut g = PriceGraph::new();
        g.upsert(upsert("quickswap", 1, 100, 300_000, 10));
        let neighbors: Vec<_> = g.neighbors("WETH").map(|(to, _)| to.to_string()).collect();
        assert_eq!(neighbors, vec!["USDC".to_string()]);
    }

    #[test]
    fn test_liquidity_filter() {
        let mut g = PriceGraph::new();
        let mut up = upsert("quickswap", 1, 100, 300_000, 10);
        up.liquidity_usd = 900.0;
        g.upsert(up);

        assert_eq!(g.admissible_edges("WETH", "USDC", 1000.0, 0).count(), 0);
        assert_eq!(g.admissible_edges("WETH", "USDC", 500.0, 0).count(), 1);
        // Staleness bound also gates.
        assert_eq!(g.admissible_edges("WETH", "USDC", 500.0, 11).count(), 0);
    }

    #[test]
    fn test_stable_anchor_price() {
        let mut g = PriceGraph::new();
        g.upsert(upsert("quickswap", 1, 100, 300_000, 10));
        let stables = vec!["USDC".to_string()];
        let px = g.stable_anchored_usd("WETH", &stables).unwrap();
        // 300000/100 = 3000, fee undone.
        assert!((px - 3000.0).abs() < 1.0, "px {}", px);
        assert_eq!(g.stable_anchored_usd("USDC", &stables), Some(1.0));
        assert_eq!(g.stable_anchored_usd("WBTC", &stables), None);
    }
}
