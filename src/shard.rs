//! Channel name to registry shard routing.
//!
//! The log partitions records with its own hash (see [`crate::log::partition_for_key`]).
//! Both hashes route one name to one lane/shard, but the two indices are not
//! required to be equal and nothing here assumes they are.

use twox_hash::XxHash64;

const SHARD_SEED: u64 = 0;

/// Stable, non-cryptographic hash of a channel name
pub fn hash_name(name: &str) -> u64 {
    XxHash64::oneshot(SHARD_SEED, name.as_bytes())
}

/// Registry shard that owns `name` when there are `workers` shards.
///
/// # Panics
/// Panics if `workers` is zero.
pub fn shard_index(name: &str, workers: usize) -> usize {
    assert!(workers > 0, "shard count must be non-zero");
    (hash_name(name) % workers as u64) as usize
}
