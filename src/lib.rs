//! Multi-Chain DEX Arbitrage Opportunity Detector
//!
//! Detection engine only: price graph, AMM math, cross-DEX / triangular /
//! multi-hop / V2-vs-V3 search, optimal sizing, profit and MEV scoring,
//! adaptive pair prioritization, and per-chain worker orchestration.
//! Execution, signing, and alert delivery are external consumers of the
//! opportunity sink.
//!
//! Author: AI-Generated
//! Created: 2026-02-03

pub mod blocktime;
pub mod config;
pub mod cooldown;
pub mod detectors;
pub mod events;
pub mod graph;
pub mod math;
pub mod mev;
pub mod optimizer;
pub mod prioritizer;
pub mod profit;
pub mod rpc;
pub mod scoring;
pub mod sink;
pub mod source;
pub mod stats;
pub mod types;
pub mod worker;

// Re-export the types most callers touch.
pub use config::{load_config, AppConfig, ChainConfig};
pub use graph::PriceGraph;
pub use types::{Opportunity, OpportunityKind, PairKey, Recommendation, ScoreTier};
pub use worker::{Coordinator, WorkerMessage};
