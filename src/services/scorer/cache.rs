//! Caller-side result cache keyed by entity id.
//!
//! An entry is fresh only while younger than the TTL and scored with the
//! weight snapshot that is current at lookup time. Stale entries are
//! dropped on lookup. Inserting past `capacity` first sweeps expired
//! entries, then evicts the oldest.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::domain::models::ConfidenceResult;

#[derive(Debug, Clone)]
struct CachedResult {
    result: ConfidenceResult,
    cached_at: Instant,
    /// Insertion order, for oldest-first eviction.
    seq: u64,
}

#[derive(Debug)]
pub struct ResultCache {
    entries: DashMap<String, CachedResult>,
    ttl: Duration,
    capacity: usize,
    next_seq: AtomicU64,
}

impl ResultCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            capacity: capacity.max(1),
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cache `result`, replacing any previous entry for the same entity.
    pub fn insert(&self, result: ConfidenceResult) {
        let entity_id = result.entity_id.clone();
        self.entries.insert(
            entity_id.clone(),
            CachedResult {
                result,
                cached_at: Instant::now(),
                seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            },
        );
        if self.entries.len() > self.capacity {
            self.shrink(&entity_id);
        }
    }

    fn shrink(&self, keep: &str) {
        let ttl = self.ttl;
        self.entries
            .retain(|key, cached| key == keep || cached.cached_at.elapsed() < ttl);

        while self.entries.len() > self.capacity {
            let oldest = self
                .entries
                .iter()
                .filter(|entry| entry.key() != keep)
                .min_by_key(|entry| entry.value().seq)
                .map(|entry| entry.key().clone());
            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                    tracing::trace!(entity_id = %key, "Evicted oldest cached result");
                }
                None => break,
            }
        }
    }

    /// Fresh cached result for `entity_id` under weights `current_version`.
    pub fn get(&self, entity_id: &str, current_version: u64) -> Option<ConfidenceResult> {
        let is_fresh = |cached: &CachedResult| {
            cached.cached_at.elapsed() < self.ttl && cached.result.weights_version == current_version
        };

        if let Some(entry) = self.entries.get(entity_id) {
            if is_fresh(&entry) {
                return Some(entry.result.clone());
            }
        } else {
            return None;
        }

        // A concurrent insert may have refreshed the entry since the read.
        if self.entries.remove_if(entity_id, |_, cached| !is_fresh(cached)).is_some() {
            tracing::trace!(entity_id, "Evicted stale cached result");
        }
        None
    }

    pub fn invalidate(&self, entity_id: &str) {
        self.entries.remove(entity_id);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
