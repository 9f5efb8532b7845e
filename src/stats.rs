//! Per-worker scan statistics
//!
//! Cheap atomic counters incremented along the hot path and flushed to
//! the log periodically and on shutdown.
//!
//! Author: AI-Generated
//! Created: 2026-02-06

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

#[derive(Debug, Default)]
pub struct ScanStats {
    pub detection_passes: AtomicU64,
    pub opportunities_emitted: AtomicU64,
    pub suppressed_below_threshold: AtomicU64,
    pub suppressed_unpriceable: AtomicU64,
    pub suppressed_stale: AtomicU64,
    pub suppressed_cooldown: AtomicU64,
    pub large_swaps_seen: AtomicU64,
    pub tier_changes: AtomicU64,
    pub cross_chain_hits: AtomicU64,
}

impl ScanStats {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// One-line summary for the periodic flush and shutdown.
    pub fn report(&self, label: &str) {
        info!(
            "{} stats: passes={} emitted={} below_threshold={} unpriceable={} stale={} cooldown={} large_swaps={} tier_changes={} cross_chain={}",
            label,
            self.detection_passes.load(Ordering::Relaxed),
            self.opportunities_emitted.load(Ordering::Relaxed),
            self.suppressed_below_threshold.load(Ordering::Relaxed),
            self.suppressed_unpriceable.load(Ordering::Relaxed),
            self.suppressed_stale.load(Ordering::Relaxed),
            self.suppressed_cooldown.load(Ordering::Relaxed),
            self.large_swaps_seen.load(Ordering::Relaxed),
            self.tier_changes.load(Ordering::Relaxed),
            self.cross_chain_hits.load(Ordering::Relaxed),
        );
    }
}
