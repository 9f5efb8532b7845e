//! Route-level cooldown
//!
//! Suppresses routes that keep sizing positive but fail to clear the USD
//! threshold, with escalating backoff. Structurally dead spreads (fee
//! combinations that can never profit) quickly reach the cap instead of
//! being re-sized every block; a single emission resets the route.
//!
//! Author: AI-Generated
//! Created: 2026-02-05

use crate::types::Opportunity;
use std::collections::HashMap;
use tracing::{debug, info};

/// Escalation multiplier per consecutive rejection.
const ESCALATION_FACTOR: u64 = 5;

/// Cooldown cap in blocks (about an hour on a 2 s chain).
const DEFAULT_MAX_COOLDOWN: u64 = 1_800;

struct CooldownEntry {
    last_rejected_block: u64,
    cooldown_blocks: u64,
    rejection_count: u32,
}

/// Route signature: the token path plus the venue per hop.
fn route_key(opp: &Opportunity) -> String {
    let mut key = opp.path.join(">");
    key.push('|');
    let dexes: Vec<&str> = opp.hops.iter().map(|h| h.dex.as_str()).collect();
    key.push_str(&dexes.join(">"));
    key
}

pub struct RouteCooldown {
    entries: HashMap<String, CooldownEntry>,
    initial_cooldown: u64,
    max_cooldown: u64,
}

impl RouteCooldown {
    /// `initial_cooldown` blocks after the first rejection; 0 disables.
    pub fn new(initial_cooldown: u64) -> Self {
        Self {
            entries: HashMap::new(),
            initial_cooldown,
            max_cooldown: DEFAULT_MAX_COOLDOWN,
        }
    }

    /// True while the opportunity's route sits in cooldown.
    pub fn is_suppressed(&self, opp: &Opportunity, current_block: u64) -> bool {
        if self.initial_cooldown == 0 {
            return false;
        }
        match self.entries.get(&route_key(opp)) {
            Some(entry) => {
                current_block < entry.last_rejected_block + entry.cooldown_blocks
            }
            None => false,
        }
    }

    /// The route sized positive but the pipeline rejected it. Escalates
    /// initial -> x5 -> x25 -> ... up to the cap.
    pub fn record_rejection(&mut self, opp: &Opportunity, block: u64) {
        if self.initial_cooldown == 0 {
            return;
        }
        let entry = self
            .entries
            .entry(route_key(opp))
            .or_insert(CooldownEntry {
                last_rejected_block: block,
                cooldown_blocks: 0,
                rejection_count: 0,
            });
        entry.rejection_count += 1;
        entry.last_rejected_block = block;
        let escalated = self.initial_cooldown.saturating_mul(
            ESCALATION_FACTOR.saturating_pow(entry.rejection_count.saturating_sub(1)),
        );
        entry.cooldown_blocks = escalated.min(self.max_cooldown);
        debug!(
            "route cooldown: {:?} rejection #{} suppressed {} blocks",
            opp.path, entry.rejection_count, entry.cooldown_blocks
        );
    }

    /// The route cleared the pipeline: instant reset.
    pub fn record_emitted(&mut self, opp: &Opportunity) {
        if self.entries.remove(&route_key(opp)).is_some() {
            info!("route cooldown reset: {:?} cleared the threshold", opp.path);
        }
    }

    /// Drop expired entries; call every few hundred blocks.
    pub fn cleanup(&mut self, current_block: u64) {
        let before = self.entries.len();
        self.entries
            .retain(|_, e| current_block < e.last_rejected_block + e.cooldown_blocks);
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!("route cooldown cleanup: {} expired entries", removed);
        }
    }

    pub fn active_count(&self) -> usize {
        self.entries.len()
    }
}
