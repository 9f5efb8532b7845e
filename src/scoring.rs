//! Scorer and ranker
//!
//! Composite 0..100 score from five weighted sub-scores with reconfigurable,
//! renormalized weights, then the tier banding used by consumers to sort
//! their attention.
//!
//! Author: AI-Generated
//! Created: 2026-02-05

use crate::config::ChainConfig;
use crate::types::{Opportunity, ScoreTier, TokenClass};

/// Sub-score weights. Renormalized to sum to 1 before use, so partial
/// overrides keep relative meaning.
#[derive(Debug, Clone)]
pub struct ScoreWeights {
    pub profit: f64,
    pub liquidity: f64,
    pub execution: f64,
    pub freshness: f64,
    pub token_quality: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            profit: 0.40,
            liquidity: 0.25,
            execution: 0.20,
            freshness: 0.10,
            token_quality: 0.05,
        }
    }
}

impl ScoreWeights {
    fn normalized(&self) -> [f64; 5] {
        let sum = self.profit + self.liquidity + self.execution + self.freshness
            + self.token_quality;
        if sum <= 0.0 {
            // Degenerate config collapses to equal weighting.
            return [0.2; 5];
        }
        [
            self.profit / sum,
            self.liquidity / sum,
            self.execution / sum,
            self.freshness / sum,
            self.token_quality / sum,
        ]
    }
}

pub struct Scorer {
    weights: ScoreWeights,
}

impl Scorer {
    pub fn new(weights: ScoreWeights) -> Self {
        Self { weights }
    }

    fn profit_score(net_usd: f64) -> f64 {
        // Saturating curve: $20 net is already a strong signal.
        100.0 * (1.0 - (-net_usd.max(0.0) / 20.0).exp())
    }

    fn liquidity_score(min_liquidity_usd: f64) -> f64 {
        100.0 * (min_liquidity_usd / 100_000.0).clamp(0.0, 1.0)
    }

    fn freshness_score(age_blocks: u64) -> f64 {
        (100.0 - 20.0 * age_blocks as f64).max(0.0)
    }

    fn token_quality_score(chain: &ChainConfig, opp: &Opportunity) -> f64 {
        if opp.path.is_empty() {
            return 0.0;
        }
        let quality = |class: TokenClass| match class {
            TokenClass::Stable => 100.0,
            TokenClass::Native => 90.0,
            TokenClass::BlueChip => 80.0,
            TokenClass::Volatile => 50.0,
            TokenClass::Meme => 20.0,
        };
        let total: f64 = opp
            .path
            .iter()
            .map(|sym| {
                chain
                    .token(sym)
                    .map(|t| quality(t.class))
                    .unwrap_or(40.0)
            })
            .sum();
        total / opp.path.len() as f64
    }

    /// Fill `score` and `tier` in place.
    pub fn score(&self, opp: &mut Opportunity, chain: &ChainConfig, current_block: u64) {
        let [w_profit, w_liq, w_exec, w_fresh, w_quality] = self.weights.normalized();
        let age = current_block.saturating_sub(opp.block_number);

        let score = w_profit * Self::profit_score(opp.net_profit_usd)
            + w_liq * Self::liquidity_score(opp.min_liquidity_usd)
            + w_exec * opp.mev.success_probability * 100.0
            + w_fresh * Self::freshness_score(age)
            + w_quality * Self::token_quality_score(chain, opp);

        opp.score = score.clamp(0.0, 100.0);
        opp.tier = ScoreTier::from_score(opp.score);
    }

    /// Sort a batch best-first by score, then EV.
    pub fn rank(&self, opportunities: &mut [Opportunity]) {
        opportunities.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    b.mev
                        .risk_adjusted_ev_usd
                        .partial_cmp(&a.mev.risk_adjusted_ev_usd)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
        });
    }
}

impl Default for Scorer {
    fn default() -> Self {
        Self::new(ScoreWeights::default())
    }
}
