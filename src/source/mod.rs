//! Price source: poll-seeded, event-maintained pool state.

pub mod cache;
pub mod poller;

use crate::events::ChainEvent;
use crate::types::{PairKey, PoolSnapshot};
use alloy::primitives::Address;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// Pair -> DEX name -> latest snapshot.
pub type PriceMap = HashMap<PairKey, HashMap<String, PoolSnapshot>>;

/// What a price source pushes to its consumer (the chain worker).
#[derive(Debug, Clone)]
pub enum SourceUpdate {
    /// Fresh snapshot for one tracked pool.
    Pool {
        address: Address,
        snapshot: PoolSnapshot,
    },
    /// A new head was observed.
    Block { number: u64, observed_ms: u64 },
    /// Protocol exchange rate for an LSD, 1.0-scaled.
    LsdRate { symbol: String, rate: f64 },
    /// Raw pool event the worker consumes directly (V3 Mint/Burn for the
    /// JIT detector, V2 Swap for large-swap tracking).
    PoolEvent(ChainEvent),
}

/// Live pool state for one chain.
///
/// A missing snapshot is exposed as absent, never as stale data.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Consistent copy of the current state.
    async fn snapshot(&self) -> PriceMap;
    /// Begin polling and event consumption.
    async fn start(&self) -> Result<()>;
    /// Cooperative stop; idempotent.
    async fn stop(&self);
}

pub use cache::QuoteCache;
pub use poller::{PolledPriceSource, PollerConfig};
