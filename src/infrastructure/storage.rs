//! Storage implementations for per-identifier state.
//!
//! Provides concurrent, sharded storage with optional bounded size.

use crate::application::metrics::Metrics;
use crate::application::ports::{EvictionCandidate, EvictionPolicy, Storage};
use ahash::RandomState;
use dashmap::DashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Number of entries sampled when looking for an eviction victim.
const EVICTION_SAMPLE_SIZE: usize = 32;

/// A stored value together with its access stamp.
#[derive(Debug)]
struct Slot<V> {
    value: V,
    last_access: u64,
}

/// Thread-safe sharded storage backed by DashMap.
///
/// DashMap provides fine-grained per-shard locking, so evaluations for
/// different identifiers rarely contend. With an eviction policy attached,
/// inserting a new key first evicts sampled victims until the policy is
/// satisfied; the bound is approximate under concurrent inserts.
pub struct ShardedStorage<K, V>
where
    K: Eq + Hash + Clone,
{
    map: DashMap<K, Slot<V>, RandomState>,
    ticks: AtomicU64,
    eviction: Option<Arc<dyn EvictionPolicy<K>>>,
    metrics: Option<Metrics>,
}

impl<K, V> ShardedStorage<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Create a new unbounded storage instance.
    pub fn new() -> Self {
        Self {
            map: DashMap::with_hasher(RandomState::new()),
            ticks: AtomicU64::new(0),
            eviction: None,
            metrics: None,
        }
    }

    /// Bound the storage with an eviction policy.
    pub fn with_eviction_policy(mut self, policy: Arc<dyn EvictionPolicy<K>>) -> Self {
        self.eviction = Some(policy);
        self
    }

    /// Count evictions in `metrics`.
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn next_tick(&self) -> u64 {
        self.ticks.fetch_add(1, Ordering::Relaxed)
    }

    /// Evict until the policy allows one more entry.
    ///
    /// Must not be called while holding a guard into the map.
    fn evict_if_needed(&self) {
        let Some(policy) = &self.eviction else {
            return;
        };

        while policy.should_evict(self.map.len()) {
            let candidates: Vec<EvictionCandidate<K>> = self
                .map
                .iter()
                .take(EVICTION_SAMPLE_SIZE)
                .map(|entry| EvictionCandidate {
                    key: entry.key().clone(),
                    last_access: entry.value().last_access,
                })
                .collect();

            let Some(victim) = policy.select_victim(&candidates) else {
                break;
            };
            if self.map.remove(&victim).is_some() {
                if let Some(metrics) = &self.metrics {
                    metrics.record_eviction();
                }
            }
        }
    }
}

impl<K, V> Default for ShardedStorage<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for ShardedStorage<K, V>
where
    K: Eq + Hash + Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardedStorage")
            .field("len", &self.map.len())
            .field("eviction", &self.eviction)
            .finish()
    }
}

impl<K, V> Storage<K, V> for ShardedStorage<K, V>
where
    K: Hash + Eq + Clone + Send + Sync,
    V: Send + Sync,
{
    fn with_entry_mut<F, R>(&self, key: K, factory: impl FnOnce() -> V, accessor: F) -> R
    where
        F: FnOnce(&mut V) -> R,
    {
        if self.eviction.is_some() && !self.map.contains_key(&key) {
            self.evict_if_needed();
        }

        let tick = self.next_tick();
        let mut slot = self.map.entry(key).or_insert_with(|| Slot {
            value: factory(),
            last_access: tick,
        });
        slot.last_access = tick;
        accessor(&mut slot.value)
    }

    fn with_existing_mut<F, R>(&self, key: &K, accessor: F) -> Option<R>
    where
        F: FnOnce(&mut V) -> R,
    {
        self.map
            .get_mut(key)
            .map(|mut slot| accessor(&mut slot.value))
    }

    fn remove(&self, key: &K) -> bool {
        self.map.remove(key).is_some()
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    fn clear(&self) {
        self.map.clear()
    }

    fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&K, &V),
    {
        for entry in self.map.iter() {
            f(entry.key(), &entry.value().value);
        }
    }

    fn retain<F>(&self, mut f: F)
    where
        F: FnMut(&K, &mut V) -> bool,
    {
        self.map.retain(|key, slot| f(key, &mut slot.value));
    }
}
