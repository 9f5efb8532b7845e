//! Short-TTL quote cache
//!
//! Caches external quote lookups (aggregator routes, LSD protocol rates)
//! keyed by (provider, from, to, amount). Entries expire by TTL and are
//! invalidated eagerly when an on-chain update touches their pair.
//!
//! Author: AI-Generated
//! Created: 2026-02-05

use crate::types::PairKey;
use alloy::primitives::U256;
use std::collections::HashMap;
use std::time::{Duration, Instant};

type Key = (String, String, String, U256);

pub struct QuoteCache {
    ttl: Duration,
    entries: HashMap<Key, (f64, Instant)>,
}

impl QuoteCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, provider: &str, from: &str, to: &str, amount: U256) -> Option<f64> {
        self.get_at(provider, from, to, amount, Instant::now())
    }

    pub fn put(&mut self, provider: &str, from: &str, to: &str, amount: U256, value: f64) {
        self.put_at(provider, from, to, amount, value, Instant::now());
    }

    fn key(provider: &str, from: &str, to: &str, amount: U256) -> Key {
        (
            provider.to_string(),
            from.to_string(),
            to.to_string(),
            amount,
        )
    }

    pub fn get_at(
        &self,
        provider: &str,
        from: &str,
        to: &str,
        amount: U256,
        now: Instant,
    ) -> Option<f64> {
        let (value, inserted) = self.entries.get(&Self::key(provider, from, to, amount))?;
        if now.duration_since(*inserted) > self.ttl {
            return None;
        }
        Some(*value)
    }

    pub fn put_at(
        &mut self,
        provider: &str,
        from: &str,
        to: &str,
        amount: U256,
        value: f64,
        now: Instant,
    ) {
        self.entries
            .insert(Self::key(provider, from, to, amount), (value, now));
    }

    /// Drop every entry touching either leg of a pair. Called when an
    /// on-chain update lands for it.
    pub fn invalidate_pair(&mut self, pair: &PairKey) {
        self.entries.retain(|(_, from, to, _), _| {
            !pair.contains(from) && !pair.contains(to)
        });
    }

    /// Timestamp sweep of expired entries; trivially safe garbage
    /// collection.
    pub fn sweep(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, (_, inserted)| now.duration_since(*inserted) <= ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
