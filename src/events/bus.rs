//! Event bus
//!
//! Consumes raw logs, decodes them, enforces per-pool block/log-index
//! ordering, debounces state updates per pool, and fans the results out to
//! subscriber channels. Notification events (V2 Swap, V3 Mint/Burn) pass
//! through immediately; only pricing-state updates are coalesced.
//!
//! Author: AI-Generated
//! Created: 2026-02-04

use super::decoder::{decode, ChainEvent, RawLog};
use alloy::primitives::Address;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Tunables for the bus.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Coalescing window per pool for state updates.
    pub debounce: Duration,
    /// Drain deadline honored on shutdown.
    pub drain_deadline: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(100),
            drain_deadline: Duration::from_secs(2),
        }
    }
}

/// Shared counters. Cheap to clone, read from anywhere.
#[derive(Debug, Default)]
pub struct BusStats {
    pub decoded: AtomicU64,
    pub decode_failures: AtomicU64,
    pub coalesced: AtomicU64,
    pub forwarded: AtomicU64,
    pub out_of_order_dropped: AtomicU64,
}

impl BusStats {
    pub fn snapshot(&self) -> (u64, u64, u64, u64, u64) {
        (
            self.decoded.load(Ordering::Relaxed),
            self.decode_failures.load(Ordering::Relaxed),
            self.coalesced.load(Ordering::Relaxed),
            self.forwarded.load(Ordering::Relaxed),
            self.out_of_order_dropped.load(Ordering::Relaxed),
        )
    }
}

struct PendingUpdate {
    event: ChainEvent,
    deadline: Instant,
    coalesced: u64,
}

/// Decode + debounce + fan-out task.
pub struct EventBus {
    config: BusConfig,
    stats: Arc<BusStats>,
    subscribers: Vec<mpsc::Sender<ChainEvent>>,
    /// Latest pending state update per pool, waiting out its window.
    pending: HashMap<Address, PendingUpdate>,
    /// Highest (block, log_index) applied per pool.
    watermarks: HashMap<Address, (u64, u64)>,
}

impl EventBus {
    pub fn new(config: BusConfig) -> Self {
        Self {
            config,
            stats: Arc::new(BusStats::default()),
            subscribers: Vec::new(),
            pending: HashMap::new(),
            watermarks: HashMap::new(),
        }
    }

    pub fn stats(&self) -> Arc<BusStats> {
        Arc::clone(&self.stats)
    }

    /// Register a subscriber. All decoded events are fanned out to every
    /// subscriber; consumers filter for what they care about.
    pub fn subscribe(&mut self) -> mpsc::Receiver<ChainEvent> {
        let (tx, rx) = mpsc::channel(1024);
        self.subscribers.push(tx);
        rx
    }

    /// Run until the raw-log stream closes or shutdown flips. Pending
    /// updates are flushed before exit, bounded by the drain deadline.
    pub async fn run(mut self, mut raw_rx: mpsc::Receiver<RawLog>, mut shutdown: watch::Receiver<bool>) {
        let mut tick = tokio::time::interval(self.config.debounce.max(Duration::from_millis(10)) / 2);
        loop {
            tokio::select! {
                maybe_raw = raw_rx.recv() => {
                    match maybe_raw {
                        Some(raw) => self.ingest(raw).await,
                        None => break,
                    }
                }
                _ = tick.tick() => {
                    self.flush_due(Instant::now()).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        // Drain whatever already arrived, then flush pending updates.
        let drain_until = Instant::now() + self.config.drain_deadline;
        loop {
            match tokio::time::timeout_at(drain_until, raw_rx.recv()).await {
                Ok(Some(raw)) => self.ingest(raw).await,
                Ok(None) => break,
                Err(_) => break,
            }
        }
        self.flush_all().await;
        debug!("event bus stopped: {:?}", self.stats.snapshot());
    }

    async fn ingest(&mut self, raw: RawLog) {
        let event = match decode(&raw) {
            Ok(ev) => {
                self.stats.decoded.fetch_add(1, Ordering::Relaxed);
                ev
            }
            Err(err) => {
                // Dropped and counted, never fails the bus.
                self.stats.decode_failures.fetch_add(1, Ordering::Relaxed);
                trace!(pool = %raw.address, "undecodable log: {}", err);
                return;
            }
        };

        if !event.event.is_state_update() {
            self.forward(event).await;
            return;
        }

        let coords = (event.block_number, event.log_index);
        if let Some(&applied) = self.watermarks.get(&event.pool) {
            if coords < applied {
                self.stats.out_of_order_dropped.fetch_add(1, Ordering::Relaxed);
                trace!(pool = %event.pool, "out-of-order update dropped: {:?} < {:?}", coords, applied);
                return;
            }
        }

        let deadline = Instant::now() + self.config.debounce;
        match self.pending.get_mut(&event.pool) {
            Some(slot) => {
                // Within the window: keep only the newest, tally the rest.
                if (event.block_number, event.log_index)
                    >= (slot.event.block_number, slot.event.log_index)
                {
                    slot.event = event;
                }
                slot.coalesced += 1;
                self.stats.coalesced.fetch_add(1, Ordering::Relaxed);
            }
            None => {
                self.pending.insert(
                    event.pool,
                    PendingUpdate {
                        event,
                        deadline,
                        coalesced: 0,
                    },
                );
            }
        }
    }

    async fn flush_due(&mut self, now: Instant) {
        let due: Vec<Address> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(addr, _)| *addr)
            .collect();
        for addr in due {
            if let Some(pending) = self.pending.remove(&addr) {
                self.apply(pending).await;
            }
        }
    }

    async fn flush_all(&mut self) {
        let all: Vec<Address> = self.pending.keys().copied().collect();
        for addr in all {
            if let Some(pending) = self.pending.remove(&addr) {
                self.apply(pending).await;
            }
        }
    }

    async fn apply(&mut self, pending: PendingUpdate) {
        self.watermarks.insert(
            pending.event.pool,
            (pending.event.block_number, pending.event.log_index),
        );
        if pending.coalesced > 0 {
            trace!(
                pool = %pending.event.pool,
                "applied update after coalescing {} earlier ones",
                pending.coalesced
            );
        }
        self.forward(pending.event).await;
    }

    async fn forward(&mut self, event: ChainEvent) {
        self.stats.forwarded.fetch_add(1, Ordering::Relaxed);
        for sub in &self.subscribers {
            if sub.send(event.clone()).await.is_err() {
                warn!("event subscriber dropped its receiver");
            }
        }
        self.subscribers.retain(|s| !s.is_closed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::decoder::{encode_v2_sync, V2_SYNC_TOPIC};
    use alloy::primitives::U256;

    fn sync_raw(pool: u8, r0: u64, block: u64, log_index: u64) -> RawLog {
        RawLog {
            address: Address::repeat_byte(pool),
            topics: vec![V2_SYNC_TOPIC],
            data: encode_v2_sync(U256::from(r0), U256::from(1_000u64)),
            block_number: block,
            log_index,
        }
    }

    async fn run_bus(
        config: BusConfig,
        logs: Vec<RawLog>,
    ) -> (Vec<ChainEvent>, Arc<BusStats>) {
        let mut bus = EventBus::new(config);
        let stats = bus.stats();
        let mut out = bus.subscribe();
        let (tx, rx) = mpsc::channel(64);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(bus.run(rx, shutdown_rx));
        for log in logs {
            tx.send(log).await.unwrap();
        }
        drop(tx);
        handle.await.unwrap();

        let mut events = Vec::new();
        while let Ok(ev) = out.try_recv() {
            events.push(ev);
        }
        (events, stats)
    }

    #[tokio::test]
    async fn test_debounce_keeps_latest_per_pool() {
        let config = BusConfig {
            debounce: Duration::from_millis(50),
            drain_deadline: Duration::from_millis(100),
        };
        // Three rapid updates for one pool within the window.
        let logs = vec![
            sync_raw(1, 100, 10, 0),
            sync_raw(1, 200, 10, 1),
            sync_raw(1, 300, 10, 2),
        ];
        let (events, stats) = run_bus(config, logs).await;

        assert_eq!(events.len(), 1);
        match &events[0].event {
            crate::events::decoder::PoolEvent::V2Sync { reserve0, .. } => {
                assert_eq!(*reserve0, U256::from(300u64));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(stats.coalesced.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_pools_debounced_independently() {
        let config = BusConfig {
            debounce: Duration::from_millis(50),
            drain_deadline: Duration::from_millis(100),
        };
        let logs = vec![sync_raw(1, 100, 10, 0), sync_raw(2, 500, 10, 0)];
        let (events, _) = run_bus(config, logs).await;
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn test_out_of_order_update_dropped_after_apply() {
        // Tiny debounce so the first update applies before the stale one
        // arrives.
        let config = BusConfig {
            debounce: Duration::from_millis(1),
            drain_deadline: Duration::from_millis(100),
        };
        let mut bus = EventBus::new(config);
        let stats = bus.stats();
        let mut out = bus.subscribe();
        let (tx, rx) = mpsc::channel(64);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(bus.run(rx, shutdown_rx));

        tx.send(sync_raw(1, 100, 20, 5)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        // Older coordinates for the same pool.
        tx.send(sync_raw(1, 999, 19, 0)).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        let mut events = Vec::new();
        while let Ok(ev) = out.try_recv() {
            events.push(ev);
        }
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].block_number, 20);
        assert_eq!(stats.out_of_order_dropped.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_undecodable_log_counted_not_fatal() {
        let config = BusConfig::default();
        let bad = RawLog {
            address: Address::repeat_byte(1),
            topics: vec![],
            data: vec![],
            block_number: 1,
            log_index: 0,
        };
        let (events, stats) = run_bus(config, vec![bad, sync_raw(2, 100, 2, 0)]).await;
        assert_eq!(events.len(), 1);
        assert_eq!(stats.decode_failures.load(Ordering::Relaxed), 1);
        assert_eq!(stats.decoded.load(Ordering::Relaxed), 1);
    }
}
