//! Adaptive pair prioritizer
//!
//! Every pair lives in a scan tier. Hot pairs are scanned every block,
//! colder tiers on a block-modulo schedule. Opportunities promote a pair
//! straight to HOT; sustained silence decays it one tier at a time down
//! to COLD. Records are never destroyed during a session.
//!
//! Author: AI-Generated
//! Created: 2026-02-05

use crate::types::PairKey;
use dashmap::DashMap;
use std::collections::HashSet;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PairTier {
    Hot = 1,
    Warm = 2,
    Normal = 3,
    Cold = 4,
}

impl PairTier {
    /// A pair is scanned on block B iff B % frequency == 0.
    pub fn frequency(&self) -> u64 {
        match self {
            PairTier::Hot => 1,
            PairTier::Warm => 2,
            PairTier::Normal => 3,
            PairTier::Cold => 5,
        }
    }

    /// How long a pair may sit in this tier without an opportunity before
    /// demotion. COLD is the floor.
    fn max_age_ms(&self, cfg: &PrioritizerConfig) -> Option<u64> {
        match self {
            PairTier::Hot => Some(cfg.hot_max_age_ms),
            PairTier::Warm => Some(cfg.warm_max_age_ms),
            PairTier::Normal => Some(cfg.normal_max_age_ms),
            PairTier::Cold => None,
        }
    }

    fn demoted(&self) -> PairTier {
        match self {
            PairTier::Hot => PairTier::Warm,
            PairTier::Warm => PairTier::Normal,
            PairTier::Normal | PairTier::Cold => PairTier::Cold,
        }
    }
}

/// Emitted on every tier transition.
#[derive(Debug, Clone)]
pub struct TierChange {
    pub pair: PairKey,
    pub old_tier: PairTier,
    pub new_tier: PairTier,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct PrioritizerConfig {
    pub hot_max_age_ms: u64,
    pub warm_max_age_ms: u64,
    pub normal_max_age_ms: u64,
    /// Initial-tier boundaries.
    pub hot_volume_usd: f64,
    pub cold_liquidity_usd: f64,
}

impl Default for PrioritizerConfig {
    fn default() -> Self {
        Self {
            hot_max_age_ms: 5 * 60 * 1_000,
            warm_max_age_ms: 15 * 60 * 1_000,
            normal_max_age_ms: 30 * 60 * 1_000,
            hot_volume_usd: 100_000.0,
            cold_liquidity_usd: 10_000.0,
        }
    }
}

#[derive(Debug, Clone)]
struct PairRecord {
    tier: PairTier,
    /// Last promotion-worthy activity (registration or opportunity).
    last_activity_ms: u64,
    opportunities_seen: u64,
}

/// Tier table. Mutated only by its owning worker task; detection passes
/// read a gated snapshot taken at the start of each block.
pub struct AdaptivePrioritizer {
    config: PrioritizerConfig,
    table: DashMap<PairKey, PairRecord>,
    events: Option<mpsc::UnboundedSender<TierChange>>,
}

impl AdaptivePrioritizer {
    pub fn new(config: PrioritizerConfig, events: Option<mpsc::UnboundedSender<TierChange>>) -> Self {
        Self {
            config,
            table: DashMap::new(),
            events,
        }
    }

    fn emit(&self, pair: &PairKey, old: PairTier, new: PairTier, reason: &str) {
        debug!("tier change: {} {:?} -> {:?} ({})", pair, old, new, reason);
        if let Some(tx) = &self.events {
            let _ = tx.send(TierChange {
                pair: pair.clone(),
                old_tier: old,
                new_tier: new,
                reason: reason.to_string(),
            });
        }
    }

    /// First sighting of a pair. Initial tier from its market stats:
    /// HOT on real volume, COLD on thin liquidity, NORMAL otherwise.
    pub fn register(&self, pair: &PairKey, volume_usd: f64, liquidity_usd: f64, now_ms: u64) {
        if self.table.contains_key(pair) {
            return;
        }
        let tier = if volume_usd > self.config.hot_volume_usd {
            PairTier::Hot
        } else if liquidity_usd < self.config.cold_liquidity_usd {
            PairTier::Cold
        } else {
            PairTier::Normal
        };
        self.table.insert(
            pair.clone(),
            PairRecord {
                tier,
                last_activity_ms: now_ms,
                opportunities_seen: 0,
            },
        );
    }

    pub fn tier(&self, pair: &PairKey) -> Option<PairTier> {
        self.table.get(pair).map(|r| r.tier)
    }

    /// An opportunity on the pair promotes it straight to HOT.
    pub fn record_opportunity(&self, pair: &PairKey, now_ms: u64) {
        let Some(mut record) = self.table.get_mut(pair) else {
            return;
        };
        record.opportunities_seen += 1;
        record.last_activity_ms = now_ms;
        if record.tier != PairTier::Hot {
            let old = record.tier;
            record.tier = PairTier::Hot;
            drop(record);
            self.emit(pair, old, PairTier::Hot, "opportunity");
        }
    }

    /// Demote every pair that outstayed its tier's staleness budget.
    /// One step per call; records are never removed.
    pub fn decay(&self, now_ms: u64) {
        let mut changes = Vec::new();
        for mut entry in self.table.iter_mut() {
            let Some(max_age) = entry.tier.max_age_ms(&self.config) else {
                continue;
            };
            if now_ms.saturating_sub(entry.last_activity_ms) > max_age {
                let old = entry.tier;
                entry.tier = old.demoted();
                entry.last_activity_ms = now_ms;
                changes.push((entry.key().clone(), old, entry.tier));
            }
        }
        for (pair, old, new) in changes {
            self.emit(&pair, old, new, "staleness decay");
        }
    }

    /// Block-modulo gate for one pair.
    pub fn should_scan(&self, pair: &PairKey, block: u64) -> bool {
        match self.tier(pair) {
            Some(tier) => block % tier.frequency() == 0,
            // Unregistered pairs scan until first classification.
            None => true,
        }
    }

    /// Consistent view of the pairs gated in for this block. Detection
    /// passes read this snapshot, not the live table.
    pub fn gated_snapshot(&self, block: u64) -> HashSet<PairKey> {
        self.table
            .iter()
            .filter(|entry| block % entry.tier.frequency() == 0)
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> PairKey {
        PairKey::new("WETH", "USDC")
    }

    fn prioritizer() -> AdaptivePrioritizer {
        AdaptivePrioritizer::new(PrioritizerConfig::default(), None)
    }

    #[test]
    fn test_initial_tier_classification() {
        let p = prioritizer();
        p.register(&PairKey::new("WETH", "USDC"), 500_000.0, 1_000_000.0, 0);
        p.register(&PairKey::new("PEPE", "USDC"), 100.0, 2_000.0, 0);
        p.register(&PairKey::new("LINK", "USDC"), 20_000.0, 80_000.0, 0);

        assert_eq!(p.tier(&PairKey::new("WETH", "USDC")), Some(PairTier::Hot));
        assert_eq!(p.tier(&PairKey::new("PEPE", "USDC")), Some(PairTier::Cold));
        assert_eq!(p.tier(&PairKey::new("LINK", "USDC")), Some(PairTier::Normal));
    }

    #[test]
    fn test_opportunity_promotes_to_hot() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let p = AdaptivePrioritizer::new(PrioritizerConfig::default(), Some(tx));
        p.register(&pair(), 1_000.0, 50_000.0, 0);
        assert_eq!(p.tier(&pair()), Some(PairTier::Normal));

        p.record_opportunity(&pair(), 1_000);
        assert_eq!(p.tier(&pair()), Some(PairTier::Hot));

        let change = rx.try_recv().unwrap();
        assert_eq!(change.old_tier, PairTier::Normal);
        assert_eq!(change.new_tier, PairTier::Hot);
        assert_eq!(change.reason, "opportunity");
    }

    #[test]
    fn test_decay_one_step_at_a_time() {
        let p = prioritizer();
        p.register(&pair(), 500_000.0, 1_000_000.0, 0);
        assert_eq!(p.tier(&pair()), Some(PairTier::Hot));

        // Past the HOT budget (5 min): exactly one step down.
        p.decay(6 * 60 * 1_000);
        assert_eq!(p.tier(&pair()), Some(PairTier::Warm));

        // Within the WARM budget: no further demotion.
        p.decay(10 * 60 * 1_000);
        assert_eq!(p.tier(&pair()), Some(PairTier::Warm));

        // Past the WARM budget from the last transition.
        p.decay(25 * 60 * 1_000);
        assert_eq!(p.tier(&pair()), Some(PairTier::Normal));
    }

    #[test]
    fn test_cold_is_floor_and_never_dropped() {
        let p = prioritizer();
        p.register(&pair(), 0.0, 0.0, 0);
        assert_eq!(p.tier(&pair()), Some(PairTier::Cold));
        p.decay(24 * 60 * 60 * 1_000);
        assert_eq!(p.tier(&pair()), Some(PairTier::Cold));
        assert_eq!(p.len(), 1);
    }

    #[test]
    fn test_block_modulo_gating() {
        let p = prioritizer();
        p.register(&pair(), 500_000.0, 1_000_000.0, 0);

        // HOT scans every block.
        for block in [100, 101, 102] {
            assert!(p.should_scan(&pair(), block));
        }

        // Demote to WARM: frequency 2.
        p.decay(6 * 60 * 1_000);
        assert_eq!(p.tier(&pair()), Some(PairTier::Warm));
        assert!(p.should_scan(&pair(), 100));
        assert!(!p.should_scan(&pair(), 101));
        assert!(p.should_scan(&pair(), 102));
    }

    #[test]
    fn test_gated_snapshot_matches_should_scan() {
        let p = prioritizer();
        let hot = PairKey::new("WETH", "USDC");
        let cold = PairKey::new("PEPE", "USDC");
        p.register(&hot, 500_000.0, 1_000_000.0, 0);
        p.register(&cold, 0.0, 0.0, 0);

        // Block 101: HOT passes (101 % 1), COLD fails (101 % 5 != 0).
        let snapshot = p.gated_snapshot(101);
        assert!(snapshot.contains(&hot));
        assert!(!snapshot.contains(&cold));

        // Block 105: COLD passes.
        let snapshot = p.gated_snapshot(105);
        assert!(snapshot.contains(&cold));
    }

    #[test]
    fn test_reregistration_keeps_existing_record() {
        let p = prioritizer();
        p.register(&pair(), 500_000.0, 1_000_000.0, 0);
        p.record_opportunity(&pair(), 10);
        // A later registration attempt must not reset the tier.
        p.register(&pair(), 0.0, 0.0, 20);
        assert_eq!(p.tier(&pair()), Some(PairTier::Hot));
    }
}
