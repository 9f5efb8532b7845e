//! JIT liquidity detector
//!
//! Pairs V3 Burn events with a prior Mint by pool+owner+tick-range inside
//! a bounded block window. A removal of at least the configured share of
//! the added liquidity is a JIT play; the token delta approximates the
//! fees it captured. Per-pool frequency feeds a likelihood estimate for
//! incoming large trades.
//!
//! Author: AI-Generated
//! Created: 2026-02-04

use super::{DetectCtx, Detector};
use crate::events::{ChainEvent, PoolEvent};
use crate::types::{Hop, Opportunity, OpportunityKind, Recommendation};
use alloy::primitives::{Address, U256};
use std::collections::HashMap;
use tracing::{debug, info};

type PositionKey = (Address, Address, i32, i32); // pool, owner, tick range

#[derive(Debug, Clone)]
struct MintRecord {
    liquidity: u128,
    amount0: U256,
    amount1: U256,
    block: u64,
}

/// One observed mint-then-burn round trip.
#[derive(Debug, Clone)]
pub struct JitEvent {
    pub pool: Address,
    pub owner: Address,
    pub block: u64,
    /// Removed liquidity over added liquidity.
    pub removal_ratio: f64,
    /// tokens removed - tokens added, per side. The position's fee take.
    pub fees0: U256,
    pub fees1: U256,
}

/// Tracks open mints and completed JIT round trips. Fed from the event
/// stream by the worker, drained by the detector each pass.
pub struct JitDetector {
    block_window: u64,
    removal_ratio: f64,
    open_mints: HashMap<PositionKey, MintRecord>,
    pending: Vec<JitEvent>,
    per_pool_count: HashMap<Address, u32>,
    observed_blocks: u64,
}

impl JitDetector {
    pub fn new(block_window: u64, removal_ratio: f64) -> Self {
        Self {
            block_window,
            removal_ratio,
            open_mints: HashMap::new(),
            pending: Vec::new(),
            per_pool_count: HashMap::new(),
            observed_blocks: 0,
        }
    }

    /// Feed one chain event. Only V3 Mint/Burn are relevant.
    pub fn on_event(&mut self, ev: &ChainEvent) {
        match &ev.event {
            PoolEvent::V3Mint {
                owner,
                tick_lower,
                tick_upper,
                amount,
                amount0,
                amount1,
            } => {
                let key = (ev.pool, *owner, *tick_lower, *tick_upper);
                self.open_mints.insert(
                    key,
                    MintRecord {
                        liquidity: *amount,
                        amount0: *amount0,
                        amount1: *amount1,
                        block: ev.block_number,
                    },
                );
            }
            PoolEvent::V3Burn {
                owner,
                tick_lower,
                tick_upper,
                amount,
                amount0,
                amount1,
            } => {
                let key = (ev.pool, *owner, *tick_lower, *tick_upper);
                let Some(mint) = self.open_mints.get(&key) else {
                    return;
                };
                if ev.block_number.saturating_sub(mint.block) > self.block_window {
                    return;
                }
                if mint.liquidity == 0 {
                    return;
                }
                let ratio = *amount as f64 / mint.liquidity as f64;
                if ratio < self.removal_ratio {
                    return;
                }
                let mint = self.open_mints.remove(&key).expect("present");
                let jit = JitEvent {
                    pool: ev.pool,
                    owner: *owner,
                    block: ev.block_number,
                    removal_ratio: ratio,
                    fees0: amount0.saturating_sub(mint.amount0),
                    fees1: amount1.saturating_sub(mint.amount1),
                };
                debug!(
                    pool = %jit.pool,
                    "jit round trip: removal {:.0}% fees ({}, {})",
                    ratio * 100.0,
                    jit.fees0,
                    jit.fees1
                );
                *self.per_pool_count.entry(ev.pool).or_insert(0) += 1;
                self.pending.push(jit);
            }
            _ => {}
        }
    }

    /// Expire mints that outlived the pairing window.
    pub fn on_block(&mut self, block: u64) {
        self.observed_blocks += 1;
        let window = self.block_window;
        self.open_mints
            .retain(|_, m| block.saturating_sub(m.block) <= window);
    }

    pub fn jit_count(&self, pool: &Address) -> u32 {
        self.per_pool_count.get(pool).copied().unwrap_or(0)
    }

    /// Probability estimate that a large trade on this pool gets JIT'd,
    /// from observed per-pool frequency.
    pub fn jit_likelihood(&self, pool: &Address, trade_usd: f64, large_swap_usd: f64) -> f64 {
        if trade_usd < large_swap_usd {
            return 0.0;
        }
        let count = self.jit_count(pool) as f64;
        let blocks = self.observed_blocks.max(1) as f64;
        // Frequency per 100 blocks, saturating well below certainty.
        (count * 100.0 / blocks).min(0.9)
    }
}

impl Detector for JitDetector {
    fn name(&self) -> &'static str {
        "jit"
    }

    /// Drain completed round trips into opportunity records. The fee take
    /// is valued against the stable anchor; pools the graph cannot map to
    /// a pair are dropped.
    fn detect(&mut self, ctx: &DetectCtx) -> Vec<Opportunity> {
        let pending = std::mem::take(&mut self.pending);
        let mut out = Vec::new();
        for jit in pending {
            // Map the pool back to its tokens through the graph.
            let edge = ctx.graph.pairs().into_iter().find_map(|pair| {
                ctx.graph
                    .edges(pair.first(), pair.second())
                    .iter()
                    .find(|e| e.pool == jit.pool)
                    .cloned()
            });
            let Some(edge) = edge else {
                continue;
            };

            let fees_usd = ctx
                .amount_usd(&edge.from, jit.fees0)
                .unwrap_or(0.0)
                + ctx.amount_usd(&edge.to, jit.fees1).unwrap_or(0.0);

            let path = vec![edge.from.clone(), edge.to.clone()];
            let hops = vec![Hop::new(&edge.from, &edge.to, &edge.dex.name, jit.pool)];
            let mut opp =
                Opportunity::new(OpportunityKind::JitArb, ctx.chain.chain_id, path, hops);
            opp.block_number = jit.block;
            opp.net_profit_usd = fees_usd;
            opp.min_liquidity_usd = edge.liquidity_usd;
            opp.recommendation = Recommendation::Evaluate;
            info!(
                pool = %jit.pool,
                "jit event: owner {} removal {:.0}% fees ~${:.2}",
                jit.owner,
                jit.removal_ratio * 100.0,
                fees_usd
            );
            out.push(opp);
        }
        out
    }
}
