//! Per-chain workers and the cross-chain coordinator.

pub mod chain_worker;
pub mod coordinator;

use crate::types::{Opportunity, PairKey};

/// What workers push onto the coordinator's merged stream.
#[derive(Debug, Clone)]
pub enum WorkerMessage {
    /// A fully scored opportunity, tagged with its chain id.
    Opportunity(Opportunity),
    /// Per-block mid price of a base pair, for the coordinator's
    /// cross-chain join.
    PairPrice {
        chain_id: u64,
        pair: PairKey,
        mid_price: f64,
        block: u64,
    },
}

pub use chain_worker::{run_chain_worker, WorkerCore};
pub use coordinator::Coordinator;
