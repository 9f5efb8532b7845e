//! Liquid-staking derivative detectors
//!
//! Compares each LSD's protocol exchange rate (stEthPerToken-style or
//! pricePerShare-style, fetched by the price source) against DEX quotes.
//! Emits protocol-vs-DEX and cross-DEX variants; opportunities inside the
//! post-report rebase window carry a flag instead of being suppressed.
//!
//! Author: AI-Generated
//! Created: 2026-02-04

use super::{build_two_hop, profit_fraction, size_two_hop, DetectCtx, Detector};
use crate::config::LsdConfig;
use crate::graph::Edge;
use crate::math::mul_div;
use crate::optimizer::Optimizer;
use crate::types::{Hop, Opportunity, OpportunityKind, PairKey, Quote};
use alloy::primitives::U256;
use chrono::{Timelike, Utc};
use tracing::{debug, info};

pub struct LsdDetector;

impl LsdDetector {
    pub fn new() -> Self {
        Self
    }

    /// True when the current wall-clock time falls inside the LSD's
    /// post-oracle-report rebase window.
    fn in_rebase_window(lsd: &LsdConfig) -> bool {
        let Some(report_hour) = lsd.report_hour_utc else {
            return false;
        };
        let now = Utc::now();
        let minutes_since_report = if now.hour() as i64 >= report_hour as i64 {
            (now.hour() as i64 - report_hour as i64) * 60 + now.minute() as i64
        } else {
            return false;
        };
        minutes_since_report >= 0 && (minutes_since_report as u64) < lsd.rebase_window_minutes
    }

    /// Protocol-vs-DEX: value the DEX leg's output at the protocol rate
    /// and size the difference.
    fn protocol_vs_dex(
        &self,
        ctx: &DetectCtx,
        lsd: &LsdConfig,
        proto_rate: f64,
    ) -> Option<Opportunity> {
        let floor = ctx.chain.detectors.stable_min_liquidity_usd;
        let min_block = ctx.min_block();
        // Buy the derivative with the underlying on the DEX, then value the
        // position at the protocol rate (underlying per derivative).
        let edge = ctx
            .graph
            .admissible_edges(&lsd.underlying, &lsd.symbol, floor, min_block)
            .max_by(|a, b| {
                a.spot_rate()
                    .partial_cmp(&b.spot_rate())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })?;

        // dex_rate: derivative per underlying. Protocol value of that
        // derivative: dex_rate * proto_rate underlying. Requires the gap to
        // clear the DEX fee before sizing.
        let gap = edge.spot_rate() * proto_rate - 1.0;
        let min_gap = ctx.chain.thresholds.min_profit_percent / 100.0;
        if gap <= min_gap {
            return None;
        }

        let rate_scaled = U256::from((proto_rate * 1e18) as u128);
        let decimals_lsd = ctx.token_decimals(&lsd.symbol);
        let decimals_under = ctx.token_decimals(&lsd.underlying);
        let sim = |x: U256| -> Quote {
            let bought = edge.amount_out(x);
            if bought.is_zero() {
                return Quote::zero();
            }
            // Redeem at the protocol rate, adjusting decimals.
            let mut value = mul_div(bought.amount_out, rate_scaled, U256::from(10u64).pow(U256::from(18)));
            if decimals_under > decimals_lsd {
                value = value * U256::from(10u64).pow(U256::from((decimals_under - decimals_lsd) as u64));
            } else if decimals_lsd > decimals_under {
                value = value / U256::from(10u64).pow(U256::from((decimals_lsd - decimals_under) as u64));
            }
            Quote {
                amount_out: value,
                estimated: bought.estimated,
            }
        };

        let (x_min, x_max) = ctx.trade_bounds_raw(&lsd.underlying)?;
        let cap = Optimizer::impact_cap(edge.max_input_bound());
        let sized = ctx.optimizer.optimize(&sim, x_min, x_max, cap, None);
        if !sized.is_some() {
            return None;
        }

        let path = vec![lsd.underlying.clone(), lsd.symbol.clone(), lsd.underlying.clone()];
        let hops = vec![
            Hop::new(&lsd.underlying, &lsd.symbol, &edge.dex.name, edge.pool),
            Hop::new(&lsd.symbol, &lsd.underlying, "protocol", lsd.rate_contract),
        ];
        let mut opp = Opportunity::new(
            OpportunityKind::LsdProtocolDex,
            ctx.chain.chain_id,
            path,
            hops,
        );
        opp.amount_in = sized.amount_in;
        opp.expected_out = sized.expected_out;
        opp.gross_profit = sized.expected_out.saturating_sub(sized.amount_in);
        opp.spread_percent = gap * 100.0;
        opp.block_number = edge.block();
        opp.min_liquidity_usd = edge.liquidity_usd;
        opp.estimated_quote = sized.estimated;
        opp.flash_loan_available = ctx.chain.flash_loan.available();
        opp.rebase_window = Self::in_rebase_window(lsd);
        debug!(
            "lsd protocol-vs-dex: {} gap {:.3}% via {}",
            lsd.symbol,
            gap * 100.0,
            edge.dex.name
        );
        Some(opp)
    }

    /// Cross-DEX (including curve-pool-vs-DEX) round trips on the LSD pair.
    fn cross_dex(&self, ctx: &DetectCtx, lsd: &LsdConfig) -> Option<Opportunity> {
        let pair = PairKey::new(&lsd.symbol, &lsd.underlying);
        let floor = ctx.chain.detectors.stable_min_liquidity_usd;
        let min_block = ctx.min_block();
        let threshold = 1.0 + ctx.chain.thresholds.min_profit_percent / 100.0;

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
                    if buy.pool == sell.pool || buy.dex.name == sell.dex.name {
                        continue;
                    }
                    if buy.spot_rate() * sell.spot_rate() <= threshold {
                        continue;
                    }
                    let Some(sized) = size_two_hop(ctx, buy, sell) else {
                        continue;
                    };
                    let fraction = profit_fraction(&sized);
                    if best.as_ref().map(|(f, _)| fraction > *f).unwrap_or(true) {
                        let mut opp =
                            build_two_hop(ctx, OpportunityKind::LsdCrossDex, buy, sell, &sized);
                        opp.rebase_window = Self::in_rebase_window(lsd);
                        best = Some((fraction, opp));
                    }
                }
            }
        }
        best.map(|(_, o)| o)
    }
}

impl Default for LsdDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for LsdDetector {
    fn name(&self) -> &'static str {
        "lsd"
    }

    fn detect(&mut self, ctx: &DetectCtx) -> Vec<Opportunity> {
        let mut found = Vec::new();
        for lsd in &ctx.chain.lsds {
            if !ctx.should_scan(&PairKey::new(&lsd.symbol, &lsd.underlying)) {
                continue;
            }
            // A reverted or missing rate view omits the protocol leg for
            // this cycle; DEX-to-DEX still runs.
            if let Some(&proto_rate) = ctx.lsd_rates.get(&lsd.symbol) {
                if proto_rate > 0.0 {
                    if let Some(opp) = self.protocol_vs_dex(ctx, lsd, proto_rate) {
                        info!(
                            "lsd opportunity: {} protocol-vs-dex spread {:.3}%",
                            lsd.symbol, opp.spread_percent
                        );
                        found.push(opp);
                    }
                }
            }
            if let Some(opp) = self.cross_dex(ctx, lsd) {
                info!(
                    "lsd opportunity: {} cross-dex spread {:.3}%",
                    lsd.symbol, opp.spread_percent
                );
                found.push(opp);
            }
        }
        found
    }
}
