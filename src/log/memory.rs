use super::partition::Partition;
use super::{partition_for_key, Log, PartitionReader, RecordMetadata, TopicSpec};
use crate::error::{Error, Result};
use crate::topic::validate_topic_name;
use crate::FanoutConfig;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

struct TopicLog {
    partitions: Vec<Partition>,
}

/// In-process partitioned log.
///
/// Records are acknowledged as soon as they are appended. Each partition keeps
/// the most recent `retention` records.
pub struct MemoryLog {
    topics: RwLock<HashMap<String, Arc<TopicLog>>>,
    retention: usize,
    closed: AtomicBool,
}

impl MemoryLog {
    /// Create an empty log keeping `retention` records per partition
    pub fn new(retention: usize) -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
            retention: retention.max(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Create a log sized from the fan-out configuration
    pub fn from_config(config: &FanoutConfig) -> Self {
        info!(
            "Creating in-memory log (bootstrap {:?}, retention {})",
            config.brokers, config.partition_retention
        );
        Self::new(config.partition_retention)
    }

    /// Names of existing topics, sorted
    pub fn topic_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.topics.read().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Partition count of `topic`, if it exists
    pub fn partition_count(&self, topic: &str) -> Option<u32> {
        self.topics
            .read()
            .get(topic)
            .map(|t| t.partitions.len() as u32)
    }

    /// Next offset per partition of `topic`
    pub fn high_watermarks(&self, topic: &str) -> Result<Vec<u64>> {
        let topic_log = self.topic(topic)?;
        Ok(topic_log.partitions.iter().map(Partition::high_watermark).collect())
    }

    fn topic(&self, topic: &str) -> Result<Arc<TopicLog>> {
        self.ensure_open()?;
        self.topics
            .read()
            .get(topic)
            .cloned()
            .ok_or_else(|| Error::UnknownTopic(topic.to_string()))
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl Log for MemoryLog {
    async fn create_topic(&self, spec: &TopicSpec) -> Result<()> {
        self.ensure_open()?;
        validate_topic_name(&spec.name)?;
        if spec.partitions == 0 {
            return Err(Error::Log(format!(
                "topic {} needs at least one partition",
                spec.name
            )));
        }

        let mut topics = self.topics.write();
        if let Some(existing) = topics.get(&spec.name) {
            let existing = existing.partitions.len() as u32;
            if existing != spec.partitions {
                return Err(Error::Log(format!(
                    "topic {} exists with {} partitions, requested {}",
                    spec.name, existing, spec.partitions
                )));
            }
            debug!("Topic {} already exists", spec.name);
            return Ok(());
        }

        let partitions = (0..spec.partitions)
            .map(|i| Partition::new(&spec.name, i, self.retention))
            .collect();
        topics.insert(spec.name.clone(), Arc::new(TopicLog { partitions }));
        info!("Created topic {} with {} partitions", spec.name, spec.partitions);
        Ok(())
    }

    async fn delete_topic(&self, topic: &str) -> Result<()> {
        self.ensure_open()?;
        if self.topics.write().remove(topic).is_none() {
            return Err(Error::UnknownTopic(topic.to_string()));
        }
        info!("Deleted topic {}", topic);
        Ok(())
    }

    async fn produce(&self, topic: &str, key: &str, value: Bytes) -> Result<RecordMetadata> {
        let topic_log = self.topic(topic)?;
        let partition = partition_for_key(key, topic_log.partitions.len() as u32);
        let offset = topic_log.partitions[partition as usize].append(key, value);
        debug!("Appended {}[{}]@{} key={}", topic, partition, offset, key);
        Ok(RecordMetadata { partition, offset })
    }

    async fn tail(&self, topic: &str, partition: u32) -> Result<Box<dyn PartitionReader>> {
        let topic_log = self.topic(topic)?;
        let reader = topic_log
            .partitions
            .get(partition as usize)
            .ok_or_else(|| Error::UnknownPartition {
                topic: topic.to_string(),
                partition,
            })?
            .tail();
        Ok(Box::new(reader))
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.topics.write().clear();
            info!("In-memory log closed");
        }
        Ok(())
    }
}
