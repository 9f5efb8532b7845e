//! MEV / execution simulator
//!
//! Per opportunity: competitor estimate, win probability, the three MEV
//! risk components, capped loss estimate, staleness factor, a weighted
//! success probability, risk-adjusted expected value, and the final
//! recommendation with hard SKIP overrides.
//!
//! Author: AI-Generated
//! Created: 2026-02-05

use crate::types::{MevAssessment, Opportunity, Recommendation};
use tracing::debug;

/// Risk component weights and recommendation thresholds.
#[derive(Debug, Clone)]
pub struct MevConfig {
    pub frontrun_weight: f64,
    pub backrun_weight: f64,
    pub sandwich_weight: f64,
    /// Profit above which frontrunning becomes a concern, USD.
    pub frontrun_profit_usd: f64,
    /// Trade size above which backrunning becomes a concern, USD.
    pub backrun_trade_usd: f64,
    /// Trade and profit floors for sandwich exposure, USD.
    pub sandwich_trade_usd: f64,
    pub sandwich_profit_usd: f64,
    /// Success-probability mix: timing, competition, MEV, price
    /// stability, slippage, profit.
    pub success_weights: [f64; 6],
    pub execute_threshold: f64,
    pub caution_threshold: f64,
    pub evaluate_threshold: f64,
    /// Hard SKIP overrides.
    pub max_risk_score: f64,
    pub max_competitors: u32,
}

impl Default for MevConfig {
    fn default() -> Self {
        Self {
            frontrun_weight: 0.40,
            backrun_weight: 0.30,
            sandwich_weight: 0.30,
            frontrun_profit_usd: 5.0,
            backrun_trade_usd: 500.0,
            sandwich_trade_usd: 1_000.0,
            sandwich_profit_usd: 10.0,
            success_weights: [0.15, 0.25, 0.20, 0.15, 0.15, 0.10],
            execute_threshold: 0.70,
            caution_threshold: 0.50,
            evaluate_threshold: 0.30,
            max_risk_score: 0.80,
            max_competitors: 25,
        }
    }
}

/// Inputs the worker supplies per pass.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionContext {
    pub current_block: u64,
    pub block_time_secs: f64,
    /// Where the current gas price sits in its recent distribution, [0, 1].
    pub gas_price_percentile: f64,
    /// Block-interval regularity from the predictor, [0, 1].
    pub price_stability: f64,
}

pub struct ExecutionSimulator {
    config: MevConfig,
}

impl ExecutionSimulator {
    pub fn new(config: MevConfig) -> Self {
        Self { config }
    }

    /// Expected competitor count, monotone in expected profit.
    fn competitor_count(&self, profit_usd: f64) -> u32 {
        if profit_usd <= 1.0 {
            return 0;
        }
        ((profit_usd.ln() * 3.0).floor() as u32).min(50)
    }

    /// Win probability decays with competitors and with how hot the gas
    /// market already is.
    fn win_probability(&self, competitors: u32, gas_price_percentile: f64) -> f64 {
        let competition = 1.0 / (1.0 + competitors as f64 * 0.25);
        let gas_drag = 1.0 - 0.5 * gas_price_percentile.clamp(0.0, 1.0);
        (competition * gas_drag).clamp(0.0, 1.0)
    }

    /// Assess one opportunity in place: fills `mev`, `confidence`, and
    /// `recommendation`.
    pub fn assess(&self, opp: &mut Opportunity, ctx: &ExecutionContext, trade_usd: f64) {
        let cfg = &self.config;
        let profit = opp.net_profit_usd.max(0.0);

        let competitors = self.competitor_count(profit);
        let win = self.win_probability(competitors, ctx.gas_price_percentile);

        let frontrun = if profit > cfg.frontrun_profit_usd {
            cfg.frontrun_weight * (profit / 100.0).min(1.0)
        } else {
            0.0
        };
        let backrun = if trade_usd > cfg.backrun_trade_usd {
            cfg.backrun_weight * (trade_usd / 10_000.0).min(1.0)
        } else {
            0.0
        };
        let sandwich =
            if trade_usd > cfg.sandwich_trade_usd && profit > cfg.sandwich_profit_usd {
                cfg.sandwich_weight * (trade_usd / 20_000.0).min(1.0)
            } else {
                0.0
            };
        // Component weights sum to 1, so the sum is already in [0, 1].
        let risk_score = (frontrun + backrun + sandwich).clamp(0.0, 1.0);
        let potential_loss = (risk_score * profit).min(profit);

        let age_blocks = ctx.current_block.saturating_sub(opp.block_number) as f64;
        let staleness = age_blocks / ctx.block_time_secs.max(0.1);
        let timing_score = 1.0 / (1.0 + staleness);

        // Thin liquidity relative to trade size is where slippage bites.
        let slippage_score = if opp.min_liquidity_usd > 0.0 {
            (1.0 - (trade_usd / opp.min_liquidity_usd) * 5.0).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let profit_score = (profit / 50.0).min(1.0);

        let [w_timing, w_comp, w_mev, w_stab, w_slip, w_profit] = cfg.success_weights;
        let success = (w_timing * timing_score
            + w_comp * win
            + w_mev * (1.0 - risk_score)
            + w_stab * ctx.price_stability.clamp(0.0, 1.0)
            + w_slip * slippage_score
            + w_profit * profit_score)
            .clamp(0.0, 1.0);

        let ev = success * opp.net_profit_usd - (1.0 - success) * opp.gas_cost_usd
            - potential_loss;

        let recommendation = if risk_score > cfg.max_risk_score
            || competitors > cfg.max_competitors
        {
            Recommendation::Skip
        } else if success >= cfg.execute_threshold {
            Recommendation::Execute
        } else if success >= cfg.caution_threshold {
            Recommendation::ExecuteWithCaution
        } else if success >= cfg.evaluate_threshold {
            Recommendation::Evaluate
        } else {
            Recommendation::Skip
        };

        debug!(
            "{:?}: competitors {} win {:.2} risk {:.2} success {:.2} ev ${:.2} -> {}",
            opp.path, competitors, win, risk_score, success, ev, recommendation
        );

        opp.mev = MevAssessment {
            competitor_count: competitors,
            win_probability: win,
            frontrun_risk: frontrun,
            backrun_risk: backrun,
            sandwich_risk: sandwich,
            risk_score,
            potential_loss_usd: potential_loss,
            staleness_factor: staleness,
            success_probability: success,
            risk_adjusted_ev_usd: ev,
        };
        opp.confidence = success;
        opp.recommendation = recommendation;
    }
}

impl Default for ExecutionSimulator {
    fn default() -> Self {
        Self::new(MevConfig::default())
    }
}
