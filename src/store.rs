//! Cardinality-bounded concurrent counter store keyed by collapsed stack
//! signature.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

/// Concurrency-safe mapping from signature to a monotonically increasing
/// count, holding at most `max_stored_stacks` distinct keys.
///
/// Uses `DashMap` with per-key atomic counters so the sampler's hot path
/// never takes a store-wide lock. `dump` may interleave with concurrent
/// `record` calls; a partially updated view is acceptable for statistical
/// profiling.
pub struct AggregateStore {
    stacks: DashMap<String, AtomicU64>,
    max_stored_stacks: usize,
}

impl AggregateStore {
    /// Creates an empty store with the given cardinality bound.
    pub fn new(max_stored_stacks: usize) -> Self {
        Self {
            stacks: DashMap::new(),
            max_stored_stacks,
        }
    }

    /// Records one occurrence of `signature`.
    ///
    /// Existing keys always increment. A new key is inserted only while the
    /// distinct-key count is below the bound; otherwise the sample is
    /// dropped and `false` is returned. Inserts come from the single sampler
    /// context, so the capacity check cannot race with another insert.
    pub fn record(&self, signature: &str) -> bool {
        if let Some(counter) = self.stacks.get(signature) {
            counter.fetch_add(1, Ordering::Relaxed);
            return true;
        }

        if self.stacks.len() >= self.max_stored_stacks {
            return false;
        }

        self.stacks
            .entry(signature.to_owned())
            .or_default()
            .fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Number of distinct signatures currently held.
    pub fn len(&self) -> usize {
        self.stacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }

    /// Enumerates (signature, count) pairs. Order is unspecified.
    pub fn dump(&self) -> Vec<(String, u64)> {
        self.stacks
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
            .collect()
    }

    /// Clears all entries. Sampling state is not this store's concern.
    pub fn reset(&self) {
        self.stacks.clear();
    }
}
