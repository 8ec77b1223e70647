//! LRU (Least Recently Used) eviction adapter.

use crate::application::ports::{EvictionCandidate, EvictionPolicy};

/// LRU eviction policy with entry count limit.
///
/// Evicts the least recently accessed entry when the limit is reached.
/// Uses approximate sampling for performance.
#[derive(Debug, Clone)]
pub struct LruEviction {
    /// Maximum number of entries before eviction
    max_entries: usize,
}

impl LruEviction {
    /// Create a new LRU eviction policy with the given entry limit.
    pub fn new(max_entries: usize) -> Self {
        Self { max_entries }
    }

    /// Maximum number of entries.
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }
}

impl<K> EvictionPolicy<K> for LruEviction
where
    K: Clone,
{
    fn select_victim(&self, candidates: &[EvictionCandidate<K>]) -> Option<K> {
        candidates
            .iter()
            .min_by_key(|candidate| candidate.last_access)
            .map(|candidate| candidate.key.clone())
    }

    fn should_evict(&self, current_entries: usize) -> bool {
        current_entries >= self.max_entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(key: &str, last_access: u64) -> EvictionCandidate<String> {
        EvictionCandidate {
            key: key.to_string(),
            last_access,
        }
    }

    #[test]
    fn test_lru_select_oldest() {
        let policy = LruEviction::new(10);
        let candidates = vec![candidate("key1", 30), candidate("key2", 10), candidate("key3", 20)];

        assert_eq!(policy.select_victim(&candidates), Some("key2".to_string()));
    }

    #[test]
    fn test_lru_should_evict() {
        let policy = LruEviction::new(100);

        assert!(!<LruEviction as EvictionPolicy<String>>::should_evict(&policy, 99));
        assert!(<LruEviction as EvictionPolicy<String>>::should_evict(&policy, 100));
        assert!(<LruEviction as EvictionPolicy<String>>::should_evict(&policy, 101));
    }

    #[test]
    fn test_lru_empty_candidates() {
        let policy = LruEviction::new(10);
        let candidates: Vec<EvictionCandidate<String>> = vec![];

        assert_eq!(policy.select_victim(&candidates), None);
    }

    #[test]
    fn test_lru_many_candidates() {
        let policy = LruEviction::new(1000);
        let candidates: Vec<_> = (0..100u64)
            .map(|i| candidate(&format!("key{}", i), 1_000 - i))
            .collect();

        assert_eq!(policy.select_victim(&candidates), Some("key99".to_string()));
    }

    #[test]
    fn test_lru_zero_max_entries() {
        let policy = LruEviction::new(0);
        assert!(<LruEviction as EvictionPolicy<String>>::should_evict(&policy, 0));
    }
}
