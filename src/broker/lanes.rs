//! Consumption lanes: one task per partition per topic, feeding the [`Node`].
//!
//! Every topic's lanes share a child of the supervisor's root token, so a
//! single topic can be stopped on its own and `shutdown` stops them all.

use crate::error::Result;
use crate::log::{Log, PartitionReader};
use crate::node::Node;
use crate::ChannelKey;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const READ_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Lanes running for one topic
struct TopicLanes {
    cancel: CancellationToken,
    joins: Vec<JoinHandle<()>>,
}

/// Owns every running lane, keyed by topic
pub(crate) struct LaneSupervisor {
    root: CancellationToken,
    lanes: Mutex<HashMap<String, TopicLanes>>,
}

impl LaneSupervisor {
    pub fn new() -> Self {
        Self {
            root: CancellationToken::new(),
            lanes: Mutex::new(HashMap::new()),
        }
    }

    /// Open a reader at the tail of each partition of `topic`.
    ///
    /// Records produced after this returns are seen by the readers, whether
    /// or not lanes are spawned for them yet.
    pub async fn open(
        &self,
        topic: &str,
        partitions: u32,
        log: &Arc<dyn Log>,
    ) -> Result<Vec<Box<dyn PartitionReader>>> {
        let mut readers = Vec::with_capacity(partitions as usize);
        for partition in 0..partitions {
            readers.push(log.tail(topic, partition).await?);
        }
        Ok(readers)
    }

    /// Spawn one lane per reader, indexed by partition
    pub fn spawn(&self, topic: &str, readers: Vec<Box<dyn PartitionReader>>, node: &Arc<Node>) {
        let count = readers.len();
        let cancel = self.root.child_token();
        let joins = readers
            .into_iter()
            .enumerate()
            .map(|(partition, reader)| {
                tokio::spawn(run_lane(
                    topic.to_string(),
                    partition as u32,
                    reader,
                    node.clone(),
                    cancel.clone(),
                ))
            })
            .collect();

        let previous = self
            .lanes
            .lock()
            .insert(topic.to_string(), TopicLanes { cancel, joins });
        if let Some(previous) = previous {
            warn!("Replacing lanes already running for topic {}", topic);
            previous.cancel.cancel();
        }

        info!("Started {} lanes for topic {}", count, topic);
    }

    /// Number of lane tasks that have not finished
    pub fn running(&self) -> usize {
        self.lanes
            .lock()
            .values()
            .flat_map(|t| t.joins.iter())
            .filter(|j| !j.is_finished())
            .count()
    }

    /// Cancel every lane and wait for all of them to exit
    pub async fn shutdown(&self) {
        self.root.cancel();

        let lanes: Vec<(String, TopicLanes)> = self.lanes.lock().drain().collect();
        for (topic, lanes) in lanes {
            for join in lanes.joins {
                if let Err(e) = join.await {
                    error!("Lane for topic {} ended abnormally: {}", topic, e);
                }
            }
            debug!("Lanes for topic {} stopped", topic);
        }
    }
}

async fn run_lane(
    topic: String,
    partition: u32,
    mut reader: Box<dyn PartitionReader>,
    node: Arc<Node>,
    cancel: CancellationToken,
) {
    debug!("Lane {}[{}] running", topic, partition);
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = reader.next() => next,
        };

        match next {
            Ok(Some(record)) => {
                let key = ChannelKey::new(topic.as_str(), record.key);
                node.dispatch(&key, &record.value);
            }
            Ok(None) => {
                info!("Partition {}[{}] closed, lane exiting", topic, partition);
                break;
            }
            Err(e) => {
                error!("Lane {}[{}] read failed: {}", topic, partition, e);
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(READ_RETRY_DELAY) => {}
                }
            }
        }
    }
    debug!("Lane {}[{}] stopped", topic, partition);
}
