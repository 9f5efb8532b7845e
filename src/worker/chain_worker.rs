//! Chain worker
//!
//! One worker owns the full pipeline for one chain: the event bus and
//! poller feed a single-owner price graph; block ticks run the gated
//! detector pass and pipe candidates through pricing, MEV assessment,
//! and scoring before the coordinator's merged stream. All cross-task
//! traffic is message passing; the graph never leaves this task.
//!
//! Author: AI-Generated
//! Created: 2026-02-06

use super::WorkerMessage;
use crate::config::ChainConfig;
use crate::cooldown::RouteCooldown;
use crate::blocktime::BlockTimePredictor;
use crate::detectors::{
    cross_dex::CrossDexDetector, jit::JitDetector, lsd::LsdDetector, multi_hop::MultiHopDetector,
    stable::StableDetector, triangular::TriangularDetector, v2_v3::V2V3Detector, DetectCtx,
    Detector,
};
use crate::events::{BusConfig, EventBus, PoolEvent, RawLog};
use crate::graph::{EdgeUpsert, PriceGraph};
use crate::math::{to_human, u256_to_f64};
use crate::mev::{ExecutionContext, ExecutionSimulator, MevConfig};
use crate::optimizer::Optimizer;
use crate::prioritizer::{AdaptivePrioritizer, PrioritizerConfig, TierChange};
use crate::profit::{PricingOutcome, ProfitModel};
use crate::rpc::EndpointPool;
use crate::scoring::{ScoreWeights, Scorer};
use crate::source::{PolledPriceSource, PollerConfig, PriceSource, SourceUpdate};
use crate::stats::ScanStats;
use crate::types::{now_unix, Opportunity, PairKey, PoolSnapshot};
use alloy::primitives::Address;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Initial route-cooldown length in blocks.
const ROUTE_COOLDOWN_BLOCKS: u64 = 10;

/// The worker's single-owner state and pipeline. Separated from the task
/// wiring so tests can drive it with synthetic updates.
pub struct WorkerCore {
    chain: ChainConfig,
    graph: PriceGraph,
    optimizer: Optimizer,
    detectors: Vec<Box<dyn Detector>>,
    jit: JitDetector,
    prioritizer: AdaptivePrioritizer,
    predictor: BlockTimePredictor,
    profit: ProfitModel,
    simulator: ExecutionSimulator,
    scorer: Scorer,
    cooldown: RouteCooldown,
    pub stats: Arc<ScanStats>,
    lsd_rates: HashMap<String, f64>,
    /// Accumulated swap volume per pair, USD, from large-swap tracking.
    volume_usd: HashMap<PairKey, f64>,
    out: mpsc::Sender<WorkerMessage>,
    tier_events: mpsc::UnboundedReceiver<TierChange>,
    current_block: u64,
}

impl WorkerCore {
    pub fn new(chain: ChainConfig, out: mpsc::Sender<WorkerMessage>) -> Self {
        let (tier_tx, tier_events) = mpsc::unbounded_channel();
        let (depeg_tx, mut depeg_rx) = mpsc::unbounded_channel();
        // Severe depegs are alert-channel traffic; surface them in the log
        // stream from a detached drain.
        tokio::spawn(async move {
            while let Some(alert) = depeg_rx.recv().await {
                warn!(
                    "depeg alert: chain {} {} on {} at {:.4}",
                    alert.chain_id, alert.pair, alert.dex, alert.price
                );
            }
        });

        let optimizer = Optimizer::new(chain.flash_loan.effective_fee());
        let detectors: Vec<Box<dyn Detector>> = vec![
            Box::new(CrossDexDetector::new()),
            Box::new(TriangularDetector::new()),
            Box::new(MultiHopDetector::new()),
            Box::new(V2V3Detector::new()),
            Box::new(StableDetector::new(Some(depeg_tx))),
            Box::new(LsdDetector::new()),
        ];
        let jit = JitDetector::new(
            chain.detectors.jit_block_window,
            chain.detectors.jit_removal_ratio,
        );
        let predictor = BlockTimePredictor::new(chain.block_time_ms);
        Self {
            prioritizer: AdaptivePrioritizer::new(PrioritizerConfig::default(), Some(tier_tx)),
            predictor,
            optimizer,
            detectors,
            jit,
            graph: PriceGraph::new(),
            profit: ProfitModel::new(),
            simulator: ExecutionSimulator::new(MevConfig::default()),
            scorer: Scorer::new(ScoreWeights::default()),
            cooldown: RouteCooldown::new(ROUTE_COOLDOWN_BLOCKS),
            stats: Arc::new(ScanStats::default()),
            lsd_rates: HashMap::new(),
            volume_usd: HashMap::new(),
            chain,
            out,
            tier_events,
            current_block: 0,
        }
    }

    /// Route one source update through the pipeline.
    pub async fn handle_update(&mut self, update: SourceUpdate) {
        match update {
            SourceUpdate::Pool { address, snapshot } => {
                self.apply_pool_update(address, snapshot);
            }
            SourceUpdate::Block {
                number,
                observed_ms,
            } => {
                self.on_block(number, observed_ms).await;
            }
            SourceUpdate::LsdRate { symbol, rate } => {
                self.lsd_rates.insert(symbol, rate);
            }
            SourceUpdate::PoolEvent(event) => {
                self.jit.on_event(&event);
                self.track_swap(&event);
            }
        }
        // Tier-change events are informational; drain and count.
        while let Ok(change) = self.tier_events.try_recv() {
            ScanStats::bump(&self.stats.tier_changes);
            debug!(
                "tier change: {} {:?} -> {:?} ({})",
                change.pair, change.old_tier, change.new_tier, change.reason
            );
        }
    }

    fn apply_pool_update(&mut self, address: Address, snapshot: PoolSnapshot) {
        let Some(pool) = self
            .chain
            .pools
            .iter()
            .find(|p| p.address == address)
            .cloned()
        else {
            return;
        };
        let Some(dex) = self.chain.dexes.iter().find(|d| d.name == pool.dex) else {
            return;
        };
        let (Some(token0), Some(token1)) = (
            self.chain.token(&pool.token0).cloned(),
            self.chain.token(&pool.token1).cloned(),
        ) else {
            return;
        };

        let liquidity_usd = self.estimate_liquidity_usd(&token0.symbol, &token1.symbol, &snapshot);
        self.graph.upsert(EdgeUpsert {
            pair: PairKey::new(&token0.symbol, &token1.symbol),
            dex: Arc::new(dex.clone()),
            pool: address,
            snapshot,
            token0: token0.symbol.clone(),
            token1: token1.symbol.clone(),
            decimals0: token0.decimals,
            decimals1: token1.decimals,
            liquidity_usd,
            log_index: 0,
        });
    }

    /// USD value of both pool sides via the stable anchors already in the
    /// graph. One missing side is mirrored from the other; two missing
    /// sides leave the pool unvalued until an anchor appears.
    fn estimate_liquidity_usd(&self, token0: &str, token1: &str, snapshot: &PoolSnapshot) -> f64 {
        let stables = &self.chain.stable_tokens;
        let dec0 = self.chain.token(token0).map(|t| t.decimals).unwrap_or(18);
        let dec1 = self.chain.token(token1).map(|t| t.decimals).unwrap_or(18);
        let (amount0, amount1) = match snapshot {
            PoolSnapshot::V2(s) => (
                to_human(s.reserve0, dec0),
                to_human(s.reserve1, dec1),
            ),
            PoolSnapshot::V3(s) => {
                // Virtual in-range reserves: L/sqrtP and L*sqrtP.
                let sqrt = u256_to_f64(s.sqrt_price_x96) / 2f64.powi(96);
                if sqrt <= 0.0 {
                    return 0.0;
                }
                let l = s.liquidity as f64;
                (
                    l / sqrt / 10f64.powi(dec0 as i32),
                    l * sqrt / 10f64.powi(dec1 as i32),
                )
            }
        };
        let px0 = self.graph.stable_anchored_usd(token0, stables);
        let px1 = self.graph.stable_anchored_usd(token1, stables);
        match (px0, px1) {
            (Some(p0), Some(p1)) => amount0 * p0 + amount1 * p1,
            (Some(p0), None) => amount0 * p0 * 2.0,
            (None, Some(p1)) => amount1 * p1 * 2.0,
            (None, None) => 0.0,
        }
    }

    /// Large-swap tracking: V2 swap notifications are valued and counted;
    /// the USD notional accrues to the pair's volume for tier seeding.
    fn track_swap(&mut self, event: &crate::events::ChainEvent) {
        let PoolEvent::V2Swap {
            amount0_in,
            amount1_in,
            ..
        } = &event.event
        else {
            return;
        };
        let Some(pool) = self.chain.pools.iter().find(|p| p.address == event.pool) else {
            return;
        };
        let (symbol, amount) = if amount0_in.is_zero() {
            (pool.token1.clone(), *amount1_in)
        } else {
            (pool.token0.clone(), *amount0_in)
        };
        let decimals = self.chain.token(&symbol).map(|t| t.decimals).unwrap_or(18);
        let Some(usd) = self.graph.amount_usd(
            &symbol,
            decimals,
            amount,
            &self.chain.stable_tokens,
        ) else {
            return;
        };
        let pair = PairKey::new(&pool.token0, &pool.token1);
        *self.volume_usd.entry(pair).or_insert(0.0) += usd;
        if usd >= self.chain.detectors.large_swap_usd {
            ScanStats::bump(&self.stats.large_swaps_seen);
            let jit_risk = self.jit.jit_likelihood(
                &event.pool,
                usd,
                self.chain.detectors.large_swap_usd,
            );
            debug!(
                pool = %event.pool,
                "large swap: ~${:.0} {} (jit likelihood {:.2})",
                usd,
                symbol,
                jit_risk
            );
        }
    }

    async fn on_block(&mut self, number: u64, observed_ms: u64) {
        self.current_block = number;
        self.predictor.record_block(number, observed_ms);
        self.jit.on_block(number);

        let now_ms = now_unix() * 1_000;
        // First sighting of each pair seeds its tier from market stats.
        for pair in self.graph.pairs() {
            let liquidity = self
                .graph
                .edges(pair.first(), pair.second())
                .iter()
                .map(|e| e.liquidity_usd)
                .fold(0.0f64, f64::max);
            let volume = self.volume_usd.get(&pair).copied().unwrap_or(0.0);
            self.prioritizer.register(&pair, volume, liquidity, now_ms);
        }
        self.prioritizer.decay(now_ms);
        if number % 500 == 0 {
            self.cooldown.cleanup(number);
        }

        self.detect_pass(number, now_ms).await;
        self.publish_pair_prices(number).await;

        let submit_in = self.predictor.optimal_submission_window(observed_ms);
        debug!(
            "block {}: interval ~{:.0} ms ({:?}), submit in {} ms",
            number,
            self.predictor.average_interval_ms(),
            self.predictor.confidence(),
            submit_in
        );
    }

    async fn detect_pass(&mut self, block: u64, now_ms: u64) {
        ScanStats::bump(&self.stats.detection_passes);
        let gated = self.prioritizer.gated_snapshot(block);

        let mut batch: Vec<Opportunity> = Vec::new();
        {
            let ctx = DetectCtx {
                chain: &self.chain,
                graph: &self.graph,
                optimizer: &self.optimizer,
                current_block: block,
                gated_pairs: if self.prioritizer.is_empty() {
                    None
                } else {
                    Some(&gated)
                },
                lsd_rates: &self.lsd_rates,
            };
            for detector in self.detectors.iter_mut() {
                batch.extend(detector.detect(&ctx));
            }
            batch.extend(self.jit.detect(&ctx));
        }

        let mut emitted = Vec::new();
        for mut opp in batch {
            if self.cooldown.is_suppressed(&opp, block) {
                ScanStats::bump(&self.stats.suppressed_cooldown);
                continue;
            }
            match self
                .profit
                .evaluate(&mut opp, &self.graph, &self.chain, block)
            {
                PricingOutcome::Priced => {
                    let trade_usd = opp
                        .path
                        .first()
                        .and_then(|base| {
                            let decimals =
                                self.chain.token(base).map(|t| t.decimals).unwrap_or(18);
                            self.graph.amount_usd(
                                base,
                                decimals,
                                opp.amount_in,
                                &self.chain.stable_tokens,
                            )
                        })
                        .unwrap_or(0.0);
                    let exec_ctx = ExecutionContext {
                        current_block: block,
                        block_time_secs: self.chain.block_time_secs(),
                        gas_price_percentile: 0.5,
                        price_stability: self.predictor.stability(),
                    };
                    self.simulator.assess(&mut opp, &exec_ctx, trade_usd);
                    self.scorer.score(&mut opp, &self.chain, block);
                    if let Some(pair) = opp.entry_pair() {
                        self.prioritizer.record_opportunity(&pair, now_ms);
                    }
                    self.cooldown.record_emitted(&opp);
                    emitted.push(opp);
                }
                PricingOutcome::BelowThreshold => {
                    self.cooldown.record_rejection(&opp, block);
                    ScanStats::bump(&self.stats.suppressed_below_threshold);
                }
                PricingOutcome::Unpriceable => {
                    ScanStats::bump(&self.stats.suppressed_unpriceable);
                }
                PricingOutcome::Stale => {
                    ScanStats::bump(&self.stats.suppressed_stale);
                }
            }
        }

        self.scorer.rank(&mut emitted);
        for opp in emitted {
            ScanStats::bump(&self.stats.opportunities_emitted);
            let _ = self.out.send(WorkerMessage::Opportunity(opp)).await;
        }
    }

    /// Publish base-pair mid prices for the coordinator's cross-chain
    /// join.
    async fn publish_pair_prices(&self, block: u64) {
        for base in &self.chain.base_tokens {
            if self.chain.stable_tokens.contains(base) {
                continue;
            }
            let Some(price) = self
                .graph
                .stable_anchored_usd(base, &self.chain.stable_tokens)
            else {
                continue;
            };
            for stable in &self.chain.stable_tokens {
                let pair = PairKey::new(base, stable);
                if self.graph.edges(pair.first(), pair.second()).is_empty() {
                    continue;
                }
                let _ = self
                    .out
                    .send(WorkerMessage::PairPrice {
                        chain_id: self.chain.chain_id,
                        pair,
                        mid_price: price,
                        block,
                    })
                    .await;
                break;
            }
        }
    }
}

/// Run one chain's full pipeline until shutdown. Fails loudly on a bad
/// config; the coordinator handles restarts for runtime crashes.
pub async fn run_chain_worker(
    chain: ChainConfig,
    raw_logs: mpsc::Receiver<RawLog>,
    out: mpsc::Sender<WorkerMessage>,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    chain
        .validate()
        .with_context(|| format!("worker {} refused to start", chain.name))?;
    info!(
        "worker {} starting: {} dexes, {} tokens, {} pools",
        chain.name,
        chain.dexes.len(),
        chain.tokens.len(),
        chain.pools.len()
    );

    let rpc = Arc::new(EndpointPool::new(&chain.rpc_endpoints, chain.rate_limit_rpm));
    let mut bus = EventBus::new(BusConfig {
        debounce: Duration::from_millis(100),
        drain_deadline: Duration::from_secs(2),
    });
    let bus_events = bus.subscribe();
    let bus_stats = bus.stats();
    let bus_task = tokio::spawn(bus.run(raw_logs, shutdown.clone()));

    let (source_tx, mut source_rx) = mpsc::channel::<SourceUpdate>(1024);
    let source = PolledPriceSource::new(
        chain.clone(),
        PollerConfig::default(),
        Arc::clone(&rpc),
        source_tx,
        bus_events,
    );
    source.start().await?;

    let mut core = WorkerCore::new(chain.clone(), out);
    let mut shutdown = shutdown;
    let mut stats_tick = tokio::time::interval(Duration::from_secs(60));
    loop {
        tokio::select! {
            maybe_update = source_rx.recv() => {
                match maybe_update {
                    Some(update) => core.handle_update(update).await,
                    None => break,
                }
            }
            _ = stats_tick.tick() => {
                core.stats.report(&chain.name);
                let (decoded, failures, coalesced, forwarded, dropped) = bus_stats.snapshot();
                debug!(
                    "{} bus: decoded={} failures={} coalesced={} forwarded={} ooo_dropped={}",
                    chain.name, decoded, failures, coalesced, forwarded, dropped
                );
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    // Cooperative shutdown: stop the poller, drain briefly, flush stats,
    // then hard-stop the bus task.
    source.stop().await;
    let drain_deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while let Ok(Some(update)) =
        tokio::time::timeout_at(drain_deadline, source_rx.recv()).await
    {
        core.handle_update(update).await;
    }
    core.stats.report(&chain.name);
    if tokio::time::timeout(Duration::from_secs(5), bus_task)
        .await
        .is_err()
    {
        warn!("{}: event bus did not stop within the hard timeout", chain.name);
    }
    info!("worker {} stopped", chain.name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::types::{V2Snapshot};
    use alloy::primitives::U256;

    fn e18(x: u64) -> U256 {
        U256::from(x) * U256::from(10u64).pow(U256::from(18))
    }

    fn worker_chain() -> ChainConfig {
        let mut chain = crate::config::tests::test_chain();
        chain.dexes.push(crate::types::DexDescriptor::new(
            "sushiswap",
            crate::types::DexFamily::ConstantProductV2,
            0.0025,
        ));
        chain.dexes[0].fee = 0.0025;
        for (addr, dex) in [(0x0A, "quickswap"), (0x0B, "sushiswap")] {
            chain.pools.push(PoolConfig {
                address: Address::repeat_byte(addr),
                dex: dex.into(),
                token0: "WMATIC".into(),
                token1: "USDC".into(),
            });
        }
        chain
    }

    fn pool_update(addr: u8, r0: u64, r1: u64, block: u64) -> SourceUpdate {
        SourceUpdate::Pool {
            address: Address::repeat_byte(addr),
            snapshot: PoolSnapshot::V2(V2Snapshot::new(e18(r0), e18(r1), block)),
        }
    }

    #[tokio::test]
    async fn test_worker_core_detects_over_spread() {
        let (tx, mut rx) = mpsc::channel(64);
        let mut core = WorkerCore::new(worker_chain(), tx);

        // Two venues, ~3.3% spread, deep pools. Block 99 puts a freshly
        // registered NORMAL pair on its scan schedule (99 % 3 == 0).
        core.handle_update(pool_update(0x0A, 1_000, 300_000, 99)).await;
        core.handle_update(pool_update(0x0B, 1_000, 310_000, 99)).await;
        // Re-apply so liquidity valuations see the anchors.
        core.handle_update(pool_update(0x0A, 1_000, 300_000, 99)).await;
        core.handle_update(pool_update(0x0B, 1_000, 310_000, 99)).await;
        core.handle_update(SourceUpdate::Block {
            number: 99,
            observed_ms: 1_000_000,
        })
        .await;

        let mut opportunities = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            if let WorkerMessage::Opportunity(opp) = msg {
                opportunities.push(opp);
            }
        }
        assert!(
            !opportunities.is_empty(),
            "expected at least one opportunity"
        );
        let best = &opportunities[0];
        assert_eq!(best.chain_id, 137);
        assert!(best.net_profit_usd > 0.0);
        assert!(best.score > 0.0);
        assert!(best.confidence > 0.0);
    }

    #[tokio::test]
    async fn test_worker_core_quiet_market_emits_nothing() {
        let (tx, mut rx) = mpsc::channel(64);
        let mut core = WorkerCore::new(worker_chain(), tx);
        core.handle_update(pool_update(0x0A, 1_000, 300_000, 99)).await;
        core.handle_update(pool_update(0x0B, 1_000, 300_000, 99)).await;
        core.handle_update(SourceUpdate::Block {
            number: 99,
            observed_ms: 1_000_000,
        })
        .await;

        while let Ok(msg) = rx.try_recv() {
            assert!(
                !matches!(msg, WorkerMessage::Opportunity(_)),
                "flat market must not produce opportunities"
            );
        }
    }

    #[tokio::test]
    async fn test_pair_prices_published_for_cross_chain_join() {
        let (tx, mut rx) = mpsc::channel(64);
        let mut core = WorkerCore::new(worker_chain(), tx);
        core.handle_update(pool_update(0x0A, 1_000, 300_000, 100)).await;
        core.handle_update(SourceUpdate::Block {
            number: 100,
            observed_ms: 1_000_000,
        })
        .await;

        let mut saw_price = false;
        while let Ok(msg) = rx.try_recv() {
            if let WorkerMessage::PairPrice {
                chain_id,
                mid_price,
                ..
            } = msg
            {
                assert_eq!(chain_id, 137);
                assert!(mid_price > 0.0);
                saw_price = true;
            }
        }
        assert!(saw_price, "worker should publish pair prices each block");
    }

    #[tokio::test]
    async fn test_lsd_rate_updates_tracked() {
        let (tx, _rx) = mpsc::channel(64);
        let mut core = WorkerCore::new(worker_chain(), tx);
        core.handle_update(SourceUpdate::LsdRate {
            symbol: "STETH".into(),
            rate: 1.04,
        })
        .await;
        assert_eq!(core.lsd_rates.get("STETH"), Some(&1.04));
    }

    #[tokio::test]
    async fn test_invalid_config_refuses_start() {
        let mut chain = worker_chain();
        chain.base_tokens.push("NOPE".into());
        let (_log_tx, log_rx) = mpsc::channel(1);
        let (out_tx, _out_rx) = mpsc::channel(1);
        let (_sd_tx, sd_rx) = watch::channel(false);
        let err = run_chain_worker(chain, log_rx, out_tx, sd_rx)
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("refused to start"));
    }
}
