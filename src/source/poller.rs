//! Polled price source
//!
//! Seeds pool state with a Multicall3 bulk read, then keeps it current
//! from the event bus, with a periodic re-poll to repair drift from
//! missed events. Exposes the PriceSource snapshot view and pushes every
//! accepted update to the worker channel. When all RPC endpoints are
//! cooling down the poller skips its cycle and the chain degrades to
//! event-only mode until one recovers.
//!
//! Author: AI-Generated
//! Created: 2026-02-06

use super::cache::QuoteCache;
use super::{PriceMap, PriceSource, SourceUpdate};
use crate::config::{ChainConfig, PoolConfig};
use crate::events::{ChainEvent, PoolEvent};
use crate::rpc::multicall::{
    decode_aggregate3, decode_get_reserves, decode_liquidity, decode_rate, decode_slot0,
    encode_aggregate3, encode_get_reserves, encode_liquidity, encode_rate_call, encode_slot0,
    MULTICALL3_ADDRESS,
};
use crate::rpc::EndpointPool;
use crate::types::{DexFamily, PairKey, PoolSnapshot, V2Snapshot, V3Snapshot};
use alloy::primitives::{Address, U256};
use anyhow::{Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub poll_interval: Duration,
    pub quote_cache_ttl: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            quote_cache_ttl: Duration::from_secs(3),
        }
    }
}

struct TrackedPool {
    config: PoolConfig,
    family: DexFamily,
    fee_tier: u32,
}

pub struct PolledPriceSource {
    chain: ChainConfig,
    config: PollerConfig,
    rpc: Arc<EndpointPool>,
    pools: HashMap<Address, TrackedPool>,
    updates_tx: mpsc::Sender<SourceUpdate>,
    /// Latest snapshot per pair and DEX, for the PriceSource view.
    state: DashMap<PairKey, HashMap<String, PoolSnapshot>>,
    cache: Mutex<QuoteCache>,
    shutdown_tx: watch::Sender<bool>,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    /// Bus subscription, consumed once by start().
    events_rx: Mutex<Option<mpsc::Receiver<ChainEvent>>>,
    /// Back-reference so start() can hand an owned Arc to the task.
    self_ref: Weak<Self>,
}

impl PolledPriceSource {
    pub fn new(
        chain: ChainConfig,
        config: PollerConfig,
        rpc: Arc<EndpointPool>,
        updates_tx: mpsc::Sender<SourceUpdate>,
        events_rx: mpsc::Receiver<ChainEvent>,
    ) -> Arc<Self> {
        let mut pools = HashMap::new();
        for pool in &chain.pools {
            let Some(dex) = chain.dexes.iter().find(|d| d.name == pool.dex) else {
                continue;
            };
            pools.insert(
                pool.address,
                TrackedPool {
                    config: pool.clone(),
                    family: dex.family,
                    fee_tier: dex.fee_tier.unwrap_or(3000),
                },
            );
        }
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new_cyclic(|weak| Self {
            cache: Mutex::new(QuoteCache::new(config.quote_cache_ttl)),
            chain,
            config,
            rpc,
            pools,
            updates_tx,
            state: DashMap::new(),
            shutdown_tx,
            task: Mutex::new(None),
            events_rx: Mutex::new(Some(events_rx)),
            self_ref: weak.clone(),
        })
    }

    fn pair_of(&self, address: &Address) -> Option<PairKey> {
        self.pools
            .get(address)
            .map(|p| PairKey::new(&p.config.token0, &p.config.token1))
    }

    async fn record(&self, address: Address, snapshot: PoolSnapshot) {
        let Some(tracked) = self.pools.get(&address) else {
            return;
        };
        let pair = PairKey::new(&tracked.config.token0, &tracked.config.token1);
        self.state
            .entry(pair.clone())
            .or_default()
            .insert(tracked.config.dex.clone(), snapshot.clone());
        // On-chain movement invalidates any external quotes for the pair.
        self.cache.lock().await.invalidate_pair(&pair);
        let _ = self
            .updates_tx
            .send(SourceUpdate::Pool { address, snapshot })
            .await;
    }

    /// One full poll: block number, batched pool reads, LSD rates.
    async fn poll_once(&self) -> Result<u64> {
        let block = self
            .rpc
            .block_number()
            .await
            .context("poll: eth_blockNumber")?;

        // Batched pool state reads. V3 pools contribute two calls.
        let mut calls: Vec<(Address, Vec<u8>)> = Vec::new();
        let mut layout: Vec<(Address, bool)> = Vec::new(); // (pool, is_v3)
        for (addr, tracked) in &self.pools {
            if tracked.family.is_reserve_based() {
                calls.push((*addr, encode_get_reserves()));
                layout.push((*addr, false));
            } else {
                calls.push((*addr, encode_slot0()));
                calls.push((*addr, encode_liquidity()));
                layout.push((*addr, true));
            }
        }
        if !calls.is_empty() {
            let payload = encode_aggregate3(&calls);
            let raw = self
                .rpc
                .eth_call(MULTICALL3_ADDRESS, &payload)
                .await
                .context("poll: aggregate3")?;
            let results =
                decode_aggregate3(&raw).context("poll: undecodable aggregate3 response")?;

            let mut cursor = 0usize;
            for (addr, is_v3) in layout {
                if is_v3 {
                    let slot0 = results.get(cursor).and_then(|r| r.clone());
                    let liq = results.get(cursor + 1).and_then(|r| r.clone());
                    cursor += 2;
                    let (Some(slot0), Some(liq)) = (slot0, liq) else {
                        debug!(pool = %addr, "v3 poll failed; snapshot left absent");
                        continue;
                    };
                    let (Some((sqrt_price, tick)), Some(liquidity)) =
                        (decode_slot0(&slot0), decode_liquidity(&liq))
                    else {
                        continue;
                    };
                    let fee_tier = self.pools.get(&addr).map(|p| p.fee_tier).unwrap_or(3000);
                    self.record(
                        addr,
                        PoolSnapshot::V3(V3Snapshot::new(sqrt_price, liquidity, tick, fee_tier, block)),
                    )
                    .await;
                } else {
                    let ret = results.get(cursor).and_then(|r| r.clone());
                    cursor += 1;
                    let Some(ret) = ret else {
                        debug!(pool = %addr, "v2 poll failed; snapshot left absent");
                        continue;
                    };
                    let Some((r0, r1)) = decode_get_reserves(&ret) else {
                        continue;
                    };
                    self.record(addr, PoolSnapshot::V2(V2Snapshot::new(r0, r1, block)))
                        .await;
                }
            }
        }

        self.poll_lsd_rates().await;

        let _ = self
            .updates_tx
            .send(SourceUpdate::Block {
                number: block,
                observed_ms: now_ms(),
            })
            .await;
        Ok(block)
    }

    /// LSD protocol rates through the TTL cache, fetched concurrently.
    /// A reverted view just leaves the rate absent for this cycle.
    async fn poll_lsd_rates(&self) {
        let probe = U256::from(1u64);
        let mut fetches = Vec::new();
        for lsd in &self.chain.lsds {
            let cached = {
                let cache = self.cache.lock().await;
                cache.get("protocol", &lsd.symbol, &lsd.underlying, probe)
            };
            if let Some(rate) = cached {
                let _ = self
                    .updates_tx
                    .send(SourceUpdate::LsdRate {
                        symbol: lsd.symbol.clone(),
                        rate,
                    })
                    .await;
                continue;
            }
            let Some(call) = encode_rate_call(&lsd.rate_kind) else {
                continue;
            };
            let rpc = Arc::clone(&self.rpc);
            let contract = lsd.rate_contract;
            let symbol = lsd.symbol.clone();
            let underlying = lsd.underlying.clone();
            fetches.push(async move {
                match rpc.eth_call(contract, &call).await {
                    Ok(ret) => decode_rate(&ret).map(|rate| (symbol, underlying, rate)),
                    Err(err) => {
                        // Revert or transport trouble: omit this LSD for
                        // the cycle, never propagate.
                        debug!("lsd rate call failed for {}: {}", symbol, err);
                        None
                    }
                }
            });
        }

        for fetched in futures::future::join_all(fetches).await.into_iter().flatten() {
            let (symbol, underlying, rate) = fetched;
            {
                let mut cache = self.cache.lock().await;
                cache.put("protocol", &symbol, &underlying, probe, rate);
            }
            let _ = self
                .updates_tx
                .send(SourceUpdate::LsdRate { symbol, rate })
                .await;
        }
    }

    /// Translate a bus event into state. Sync and V3 swaps replace the
    /// snapshot; mints, burns and V2 swaps forward raw.
    async fn apply_event(&self, event: ChainEvent) {
        match &event.event {
            PoolEvent::V2Sync { reserve0, reserve1 } => {
                self.record(
                    event.pool,
                    PoolSnapshot::V2(V2Snapshot::new(*reserve0, *reserve1, event.block_number)),
                )
                .await;
            }
            PoolEvent::V3Swap {
                sqrt_price_x96,
                liquidity,
                tick,
                ..
            } => {
                let fee_tier = self
                    .pools
                    .get(&event.pool)
                    .map(|p| p.fee_tier)
                    .unwrap_or(3000);
                self.record(
                    event.pool,
                    PoolSnapshot::V3(V3Snapshot::new(
                        *sqrt_price_x96,
                        *liquidity,
                        *tick,
                        fee_tier,
                        event.block_number,
                    )),
                )
                .await;
            }
            _ => {
                let _ = self.updates_tx.send(SourceUpdate::PoolEvent(event)).await;
            }
        }
    }

    async fn run(self: Arc<Self>, mut events_rx: mpsc::Receiver<ChainEvent>) {
        let mut shutdown = self.shutdown_tx.subscribe();
        let mut interval = tokio::time::interval(self.config.poll_interval);
        info!(
            "price source started: {} pools, repoll every {:?}",
            self.pools.len(),
            self.config.poll_interval
        );
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if self.rpc.all_cooling().await {
                        warn!("all endpoints cooling; event-only mode this cycle");
                        continue;
                    }
                    match self.poll_once().await {
                        Ok(block) => debug!("repoll complete at block {}", block),
                        Err(err) => warn!("poll failed: {:#}", err),
                    }
                }
                maybe_event = events_rx.recv() => {
                    match maybe_event {
                        Some(event) => self.apply_event(event).await,
                        None => break,
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("price source stopped");
    }
}

#[async_trait]
impl PriceSource for PolledPriceSource {
    async fn snapshot(&self) -> PriceMap {
        self.state
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    async fn start(&self) -> Result<()> {
        let events_rx = self
            .events_rx
            .lock()
            .await
            .take()
            .context("price source already started")?;
        let this = self
            .self_ref
            .upgrade()
            .context("price source dropped before start")?;
        let handle = tokio::spawn(this.run(events_rx));
        *self.task.lock().await = Some(handle);
        Ok(())
    }

    async fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.task.lock().await.take() {
            let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;
        }
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
