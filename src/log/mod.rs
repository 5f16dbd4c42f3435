//! The partitioned log the broker produces to and consumes from.
//!
//! [`Log`] is the seam between the broker and a concrete log. [`MemoryLog`]
//! is an in-process implementation with bounded per-partition retention.

mod memory;
mod partition;

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use twox_hash::XxHash32;

pub use memory::MemoryLog;

const PARTITIONER_SEED: u32 = 0x9747_b28c;

/// Topic creation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSpec {
    pub name: String,
    pub partitions: u32,
}

/// A consumed record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
    /// Channel name the record was produced under
    pub key: String,
    pub value: Bytes,
}

/// Where an acknowledged record landed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordMetadata {
    pub partition: u32,
    pub offset: u64,
}

/// Reads one partition from the point it was opened.
#[async_trait]
pub trait PartitionReader: Send {
    /// Wait for the next record. `Ok(None)` means the partition is gone.
    async fn next(&mut self) -> Result<Option<Record>>;
}

#[async_trait]
pub trait Log: Send + Sync {
    /// Create a topic. Creating an existing topic with the same partition
    /// count succeeds.
    async fn create_topic(&self, spec: &TopicSpec) -> Result<()>;

    async fn delete_topic(&self, topic: &str) -> Result<()>;

    /// Append `value` under `key`, returning once the log has acknowledged it.
    async fn produce(&self, topic: &str, key: &str, value: Bytes) -> Result<RecordMetadata>;

    /// Open a reader positioned at the current end of a partition.
    async fn tail(&self, topic: &str, partition: u32) -> Result<Box<dyn PartitionReader>>;

    async fn close(&self) -> Result<()>;
}

/// Partition a keyed record is written to.
///
/// Independent from [`crate::shard::shard_index`]; see the `shard` module.
pub fn partition_for_key(key: &str, partitions: u32) -> u32 {
    debug_assert!(partitions > 0);
    XxHash32::oneshot(PARTITIONER_SEED, key.as_bytes()) % partitions
}
