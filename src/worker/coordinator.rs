//! Coordinator
//!
//! Starts one worker per enabled chain with a staggered launch, restarts
//! crashed workers behind a cooldown (bounded by a crash-loop threshold),
//! merges their ranked streams into the sink, and joins per-chain pair
//! prices for cross-chain discrepancies net of bridge cost.
//!
//! Author: AI-Generated
//! Created: 2026-02-06

use super::{run_chain_worker, WorkerMessage};
use crate::config::AppConfig;
use crate::events::RawLog;
use crate::types::{Opportunity, PairKey};
use anyhow::Result;
use rand::Rng;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Cooldown before a crashed worker restarts.
const RESTART_COOLDOWN: Duration = Duration::from_secs(5);
/// A worker crashing this often is fatal for its chain.
const CRASH_LOOP_LIMIT: usize = 10;
const CRASH_LOOP_WINDOW: Duration = Duration::from_secs(5 * 60);
/// Total budget for parallel worker shutdown.
const SHUTDOWN_BUDGET: Duration = Duration::from_secs(10);
/// Cross-chain prices older than this do not join.
const PRICE_JOIN_WINDOW: Duration = Duration::from_secs(30);

pub struct Coordinator {
    config: AppConfig,
}

impl Coordinator {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// Run all enabled chains until `shutdown` flips. `log_feeds` maps
    /// chain id to its raw-log subscription; chains without a feed run
    /// poll-only.
    pub async fn run(
        self,
        mut log_feeds: HashMap<u64, mpsc::Receiver<RawLog>>,
        mut shutdown: watch::Receiver<bool>,
        sink_tx: mpsc::Sender<Opportunity>,
    ) -> Result<()> {
        let (merged_tx, merged_rx) = mpsc::channel::<WorkerMessage>(1024);
        let (worker_shutdown_tx, worker_shutdown_rx) = watch::channel(false);

        let mut supervisors = JoinSet::new();
        let stagger = Duration::from_secs_f64(self.config.launch_stagger_secs.max(0.0));
        for chain in self.config.enabled_chains().cloned().collect::<Vec<_>>() {
            let feed = log_feeds.remove(&chain.chain_id);
            let merged_tx = merged_tx.clone();
            let worker_shutdown = worker_shutdown_rx.clone();
            let name = chain.name.clone();
            supervisors.spawn(supervise_worker(chain, feed, merged_tx, worker_shutdown));
            info!("scheduled worker {}", name);

            // Staggered launch with jitter avoids RPC stampedes.
            let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..500));
            tokio::time::sleep(stagger + jitter).await;
        }
        drop(merged_tx);

        let bridge_cost = self.config.bridge_cost_fraction;
        let merge_task = tokio::spawn(merge_streams(merged_rx, sink_tx, bridge_cost));

        // Wait for the stop signal, then cancel workers in parallel.
        let _ = shutdown.changed().await;
        info!("coordinator shutting down");
        let _ = worker_shutdown_tx.send(true);

        let deadline = Instant::now() + SHUTDOWN_BUDGET;
        loop {
            match tokio::time::timeout_at(deadline, supervisors.join_next()).await {
                Ok(Some(_)) => continue,
                Ok(None) => break,
                Err(_) => {
                    warn!("shutdown budget exhausted; aborting remaining workers");
                    supervisors.abort_all();
                    break;
                }
            }
        }
        let _ = merge_task.await;
        info!("coordinator stopped");
        Ok(())
    }
}

/// Run one chain's worker, restarting on crash with a cooldown until the
/// crash-loop threshold trips.
async fn supervise_worker(
    chain: crate::config::ChainConfig,
    mut feed: Option<mpsc::Receiver<RawLog>>,
    out: mpsc::Sender<WorkerMessage>,
    shutdown: watch::Receiver<bool>,
) {
    let mut crash_times: Vec<Instant> = Vec::new();
    loop {
        let raw_logs = match feed.take() {
            Some(rx) => rx,
            None => {
                // Subscriptions cannot be re-split after a crash; the
                // worker continues on polling alone.
                let (_tx, rx) = mpsc::channel(1);
                rx
            }
        };
        let result = tokio::spawn(run_chain_worker(
            chain.clone(),
            raw_logs,
            out.clone(),
            shutdown.clone(),
        ))
        .await;

        if *shutdown.borrow() {
            return;
        }
        match result {
            Ok(Ok(())) => return,
            Ok(Err(err)) => {
                // Init-time configuration failures are fatal, not
                // restartable.
                error!("worker {} failed: {:#}", chain.name, err);
                return;
            }
            Err(join_err) if join_err.is_panic() => {
                warn!("worker {} panicked; restarting after cooldown", chain.name);
            }
            Err(_) => return,
        }

        let now = Instant::now();
        crash_times.retain(|t| now.duration_since(*t) < CRASH_LOOP_WINDOW);
        crash_times.push(now);
        if crash_times.len() >= CRASH_LOOP_LIMIT {
            error!(
                "worker {} crash-looped ({} crashes in {:?}); giving up",
                chain.name,
                crash_times.len(),
                CRASH_LOOP_WINDOW
            );
            return;
        }
        tokio::time::sleep(RESTART_COOLDOWN).await;
    }
}

/// Merge worker streams: opportunities flow to the sink; pair prices join
/// across chains for bridge-netted discrepancies.
async fn merge_streams(
    mut rx: mpsc::Receiver<WorkerMessage>,
    sink_tx: mpsc::Sender<Opportunity>,
    bridge_cost_fraction: f64,
) {
    let mut prices: HashMap<PairKey, HashMap<u64, (f64, Instant)>> = HashMap::new();
    while let Some(message) = rx.recv().await {
        match message {
            WorkerMessage::Opportunity(opp) => {
                if sink_tx.send(opp).await.is_err() {
                    warn!("sink receiver dropped; stopping merge");
                    return;
                }
            }
            WorkerMessage::PairPrice {
                chain_id,
                pair,
                mid_price,
                ..
            } => {
                if mid_price <= 0.0 {
                    continue;
                }
                let now = Instant::now();
                let entry = prices.entry(pair.clone()).or_default();
                entry.insert(chain_id, (mid_price, now));
                entry.retain(|_, (_, at)| now.duration_since(*at) < PRICE_JOIN_WINDOW);

                for (&other_chain, &(other_price, _)) in entry.iter() {
                    if other_chain == chain_id {
                        continue;
                    }
                    let gap = cross_chain_gap(mid_price, other_price, bridge_cost_fraction);
                    if gap > 0.0 {
                        info!(
                            "cross-chain: {} {:.4} on {} vs {:.4} on {} (+{:.2}% after bridge)",
                            pair,
                            mid_price,
                            chain_id,
                            other_price,
                            other_chain,
                            gap * 100.0
                        );
                    }
                }
            }
        }
    }
}

/// Price gap between two chains net of the bridge cost, as a fraction.
/// Non-positive means no cross-chain edge exists.
fn cross_chain_gap(price_a: f64, price_b: f64, bridge_cost_fraction: f64) -> f64 {
    if price_a <= 0.0 || price_b <= 0.0 {
        return 0.0;
    }
    let low = price_a.min(price_b);
    let high = price_a.max(price_b);
    (high - low) / low - bridge_cost_fraction
}
