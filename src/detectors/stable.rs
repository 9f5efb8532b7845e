//! Stablecoin detectors
//!
//! Peg deviation tracking plus stable-to-stable spread arbitrage. Any
//! quoted stable price outside the peg band produces a depeg record;
//! severe depegs raise an alert for the worker to fan out. Venue-to-venue
//! spreads above the stable threshold become sized opportunities.
//!
//! Author: AI-Generated
//! Created: 2026-02-04

use super::{build_two_hop, profit_fraction, size_two_hop, DetectCtx, Detector};
use crate::types::{Opportunity, OpportunityKind, PairKey};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// A stable price observed off peg.
#[derive(Debug, Clone)]
pub struct DepegAlert {
    pub chain_id: u64,
    pub pair: PairKey,
    pub dex: String,
    /// Mid price of the pair (fee removed).
    pub price: f64,
    /// Absolute deviation from 1.0.
    pub deviation: f64,
    pub severe: bool,
    pub block: u64,
}

pub struct StableDetector {
    /// Severe depegs go out-of-band to the worker; regular records only
    /// log.
    alert_tx: Option<mpsc::UnboundedSender<DepegAlert>>,
}

impl StableDetector {
    pub fn new(alert_tx: Option<mpsc::UnboundedSender<DepegAlert>>) -> Self {
        Self { alert_tx }
    }

    fn stable_pairs(ctx: &DetectCtx) -> Vec<PairKey> {
        let stables = &ctx.chain.stable_tokens;
        let mut pairs = Vec::new();
        for (i, a) in stables.iter().enumerate() {
            for b in stables.iter().skip(i + 1) {
                pairs.push(PairKey::new(a, b));
            }
        }
        pairs
    }

    fn scan_depegs(&self, ctx: &DetectCtx, pair: &PairKey) {
        let eps = ctx.chain.detectors.depeg_epsilon;
        let severe_eps = ctx.chain.detectors.severe_depeg_epsilon;
        let floor = ctx.chain.detectors.stable_min_liquidity_usd;
        for edge in
            ctx.graph
                .admissible_edges(pair.first(), pair.second(), floor, ctx.min_block())
        {
            let rate = edge.spot_rate();
            if rate <= 0.0 {
                continue;
            }
            let mid = rate / (1.0 - edge.fee()).max(1e-9);
            let deviation = (mid - 1.0).abs();
            if deviation <= eps {
                continue;
            }
            let severe = deviation >= severe_eps;
            if severe {
                warn!(
                    "severe stable depeg: {} on {} mid {:.5} ({:.2}%)",
                    pair,
                    edge.dex.name,
                    mid,
                    deviation * 100.0
                );
                if let Some(tx) = &self.alert_tx {
                    let _ = tx.send(DepegAlert {
                        chain_id: ctx.chain.chain_id,
                        pair: pair.clone(),
                        dex: edge.dex.name.clone(),
                        price: mid,
                        deviation,
                        severe,
                        block: edge.block(),
                    });
                }
            } else {
                debug!(
                    "stable depeg: {} on {} mid {:.5} ({:.2}%)",
                    pair,
                    edge.dex.name,
                    mid,
                    deviation * 100.0
                );
            }
        }
    }

    fn scan_spreads(&self, ctx: &DetectCtx, pair: &PairKey) -> Option<Opportunity> {
        let floor = ctx.chain.detectors.stable_min_liquidity_usd;
        let threshold = 1.0 + ctx.chain.detectors.stable_spread_min;
        let min_block = ctx.min_block();

        let mut best: Option<(f64, Opportunity)> = None;
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
            for &buy in &buys {
                for &sell in &sells {
                    if buy.pool == sell.pool {
                        continue;
                    }
                    let cycle = buy.spot_rate() * sell.spot_rate();
                    if cycle <= threshold {
                        continue;
                    }
                    let Some(sized) = size_two_hop(ctx, buy, sell) else {
                        continue;
                    };
                    let fraction = profit_fraction(&sized);
                    if best.as_ref().map(|(f, _)| fraction > *f).unwrap_or(true) {
                        best = Some((
                            fraction,
                            build_two_hop(ctx, OpportunityKind::Stable, buy, sell, &sized),
                        ));
                    }
                }
            }
        }
        best.map(|(_, o)| o)
    }
}

impl Detector for StableDetector {
    fn name(&self) -> &'static str {
        "stable"
    }

    fn detect(&mut self, ctx: &DetectCtx) -> Vec<Opportunity> {
        let mut found = Vec::new();
        for pair in Self::stable_pairs(ctx) {
            if !ctx.should_scan(&pair) {
                continue;
            }
            self.scan_depegs(ctx, &pair);
            if let Some(opp) = self.scan_spreads(ctx, &pair) {
                info!(
                    "stable spread: {} {} -> {} spread {:.3}%",
                    pair, opp.hops[0].dex, opp.hops[1].dex, opp.spread_percent
                );
                found.push(opp);
            }
        }
        found
    }
}
