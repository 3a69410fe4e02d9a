//! Partitioning functions for spreading entities across the shards of the window store.
use std::hash::Hasher;

use seahash::SeaHasher;

/// Stable 64 bit hash of an entity id.
/// Unlike `DefaultHasher` the result does not change between releases or processes.
pub fn stable_hash(entity_id: &str) -> u64 {
    let mut hasher = SeaHasher::new();
    hasher.write(entity_id.as_bytes());
    hasher.finish()
}

/// Select one of `shards` for an entity by using its stable hash
/// as a wrapping index.
///
/// **PANIC:** if `shards` is zero
pub fn index_select(entity_id: &str, shards: usize) -> usize {
    assert!(shards > 0, "Need at least one shard");
    let hash = stable_hash(entity_id);
    // the remainder is smaller than `shards` and thus fits
    (hash % shards as u64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_shard_takes_everything() {
        for id in ["A", "B", "", "some-long-entity-id"] {
            assert_eq!(index_select(id, 1), 0);
        }
    }

    #[test]
    fn selection_is_stable_and_in_range() {
        for i in 0..200 {
            let id = format!("entity-{i}");
            let shard = index_select(&id, 7);
            assert!(shard < 7);
            assert_eq!(shard, index_select(&id, 7));
        }
    }

    #[test]
    fn spreads_keys() {
        let used: std::collections::HashSet<usize> = (0..200)
            .map(|i| index_select(&format!("entity-{i}"), 4))
            .collect();
        assert_eq!(used.len(), 4);
    }
}
