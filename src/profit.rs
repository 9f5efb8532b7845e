//! Profit and gas model
//!
//! Converts a sized opportunity's raw-unit profit into net USD: dynamic
//! stable-anchored token pricing, L1+L2 gas, flash-loan fee, and a
//! per-pair slippage allowance. Opportunities that cannot be priced or
//! that land under the chain threshold are suppressed, never emitted with
//! caveats.
//!
//! Author: AI-Generated
//! Created: 2026-02-05

use crate::config::ChainConfig;
use crate::graph::PriceGraph;
use crate::math::to_human;
use crate::types::{Opportunity, OpportunityKind, TokenClass};
use alloy::primitives::U256;
use std::sync::Arc;
use tracing::{debug, trace};

/// Chain-collaborator hook for rollup L1 data fees. The core treats it as
/// opaque: bytes in, wei out.
pub trait L1FeeEstimator: Send + Sync {
    fn l2_l1_fee(&self, tx_size_bytes: usize) -> U256;
}

/// Flat per-byte fallback estimator driven by config.
pub struct FlatL1Fee {
    pub wei_per_byte: u64,
}

impl L1FeeEstimator for FlatL1Fee {
    fn l2_l1_fee(&self, tx_size_bytes: usize) -> U256 {
        U256::from(self.wei_per_byte) * U256::from(tx_size_bytes as u64)
    }
}

/// Rough calldata footprint of an arbitrage transaction.
fn tx_size_bytes(hops: usize) -> usize {
    200 + 96 * hops
}

/// USD pricing outcome for one opportunity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PricingOutcome {
    Priced,
    /// No stable anchor for a needed token.
    Unpriceable,
    /// Net USD under the chain's minimum (threshold is inclusive).
    BelowThreshold,
    /// Snapshot age exceeded the staleness bound.
    Stale,
}

pub struct ProfitModel {
    l1_estimator: Option<Arc<dyn L1FeeEstimator>>,
}

impl ProfitModel {
    pub fn new() -> Self {
        Self { l1_estimator: None }
    }

    pub fn with_l1_estimator(mut self, estimator: Arc<dyn L1FeeEstimator>) -> Self {
        self.l1_estimator = Some(estimator);
        self
    }

    /// Slippage allowance fraction for a path: the worst token class along
    /// it, plus 10% per hop beyond the second, clamped to [0.05%, 3%].
    pub fn slippage_allowance(&self, chain: &ChainConfig, opp: &Opportunity) -> f64 {
        let mut base: f64 = 0.0;
        for symbol in &opp.path {
            let class = chain
                .token(symbol)
                .map(|t| t.class)
                .unwrap_or(TokenClass::Volatile);
            base = base.max(class.slippage_allowance());
        }
        let extra_hops = opp.hops.len().saturating_sub(2) as f64;
        (base * (1.0 + 0.1 * extra_hops)).clamp(0.0005, 0.03)
    }

    /// Gas cost in USD for the opportunity's hop count.
    fn gas_cost_usd(&self, chain: &ChainConfig, hops: usize, native_usd: f64) -> f64 {
        let units = chain.gas.base_units + chain.gas.units_per_hop * hops as u64;
        let l2_wei = units as f64 * chain.gas.gas_price_gwei * 1e9;
        let l1_wei = if chain.gas.has_l1_data_fee {
            let size = tx_size_bytes(hops);
            match &self.l1_estimator {
                Some(est) => crate::math::u256_to_f64(est.l2_l1_fee(size)),
                None => chain.gas.l1_fee_per_byte_wei as f64 * size as f64,
            }
        } else {
            0.0
        };
        (l2_wei + l1_wei) / 1e18 * native_usd
    }

    /// Price an opportunity in USD, in place. JIT records pass through
    /// already valued.
    pub fn evaluate(
        &self,
        opp: &mut Opportunity,
        graph: &PriceGraph,
        chain: &ChainConfig,
        current_block: u64,
    ) -> PricingOutcome {
        if opp.kind == OpportunityKind::JitArb {
            return PricingOutcome::Priced;
        }

        let age = current_block.saturating_sub(opp.block_number);
        if age > chain.detectors.staleness_blocks {
            return PricingOutcome::Stale;
        }

        let base = match opp.path.first() {
            Some(sym) => sym.clone(),
            None => return PricingOutcome::Unpriceable,
        };
        let stables = &chain.stable_tokens;
        let Some(base_usd) = graph.stable_anchored_usd(&base, stables) else {
            trace!("{}: no stable anchor for {}", opp.kind, base);
            return PricingOutcome::Unpriceable;
        };
        let Some(native_usd) = graph.stable_anchored_usd(&chain.native_token, stables) else {
            trace!("{}: no stable anchor for native token", opp.kind);
            return PricingOutcome::Unpriceable;
        };

        let decimals = chain.token(&base).map(|t| t.decimals).unwrap_or(18);
        let mut gross_usd = to_human(opp.gross_profit, decimals) * base_usd;
        if opp.estimated_quote {
            // Range-crossing V3 quotes carry a safety margin.
            gross_usd *= 1.0 - chain.detectors.estimated_quote_discount;
        }

        let amount_in_usd = to_human(opp.amount_in, decimals) * base_usd;
        let gas_usd = self.gas_cost_usd(chain, opp.hops.len(), native_usd);
        let flash_usd = amount_in_usd * chain.flash_loan.effective_fee();
        let slippage_usd = amount_in_usd * self.slippage_allowance(chain, opp);

        opp.gas_cost_usd = gas_usd;
        opp.net_profit_usd = gross_usd - gas_usd - flash_usd - slippage_usd;
        opp.flash_loan_available = chain.flash_loan.available();

        debug!(
            "{} {:?}: gross ${:.2} gas ${:.2} flash ${:.2} slip ${:.2} net ${:.2}",
            opp.kind, opp.path, gross_usd, gas_usd, flash_usd, slippage_usd, opp.net_profit_usd
        );

        if opp.net_profit_usd >= chain.thresholds.min_profit_usd {
            PricingOutcome::Priced
        } else {
            PricingOutcome::BelowThreshold
        }
    }
}

impl Default for ProfitModel {
    fn default() -> Self {
        Self::new()
    }
}
