mod lanes;

use crate::error::{Error, Result};
use crate::log::{Log, RecordMetadata, TopicSpec};
use crate::node::Node;
use crate::topic::{validate_topic_name, Admission, TopicRegistry};
use crate::{validate_channel_name, FanoutConfig, Stats};
use bytes::Bytes;
use lanes::LaneSupervisor;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Owns topic lifecycle against the log and the lanes that consume it
pub struct Broker {
    log: Arc<dyn Log>,
    node: Arc<Node>,
    topics: TopicRegistry,
    lanes: LaneSupervisor,
    messages_published: AtomicU64,
    closed: AtomicBool,
    config: FanoutConfig,
}

impl Broker {
    /// Create a new broker instance
    pub fn new(config: FanoutConfig, log: Arc<dyn Log>, node: Arc<Node>) -> Result<Self> {
        info!("Creating new broker with config: {:?}", config);
        config.validate()?;

        if node.workers() != config.workers {
            return Err(Error::InvalidConfig(format!(
                "node has {} shards but config has {} workers",
                node.workers(),
                config.workers
            )));
        }

        Ok(Self {
            log,
            node,
            topics: TopicRegistry::new(config.max_topics),
            lanes: LaneSupervisor::new(),
            messages_published: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            config,
        })
    }

    /// Make sure `topic` exists on the log, is counted against the cap, and
    /// has lanes consuming it.
    ///
    /// Returns `true` only for the call that admitted the topic. Lane readers
    /// are opened before the topic becomes visible as known, so a publish that
    /// takes the fast path never produces ahead of them.
    pub async fn ensure_topic(&self, topic: &str) -> Result<bool> {
        if self.topics.contains(topic) {
            return Ok(false);
        }
        if self.is_closed() {
            return Err(Error::Closed);
        }
        validate_topic_name(topic)?;

        if self.topics.is_full() {
            warn!("Refusing topic {}: {} topics already live", topic, self.topics.capacity());
            return Err(Error::TopicCapacityExceeded {
                max: self.topics.capacity(),
            });
        }

        let spec = TopicSpec {
            name: topic.to_string(),
            partitions: self.config.partitions(),
        };
        match tokio::time::timeout(self.config.topic_create_timeout, self.log.create_topic(&spec)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("Failed to create topic {}: {}", topic, e);
                return Err(e);
            }
            Err(_) => {
                error!(
                    "Creating topic {} timed out after {:?}",
                    topic, self.config.topic_create_timeout
                );
                return Err(Error::TopicCreateTimeout(topic.to_string()));
            }
        }

        let readers = self
            .lanes
            .open(topic, self.config.partitions(), &self.log)
            .await?;

        // Another caller may have filled the last slot while the request was
        // in flight.
        match self.topics.try_admit(topic) {
            Admission::Admitted => {
                info!("Admitted topic {} ({}/{})", topic, self.topics.len(), self.topics.capacity());
                self.lanes.spawn(topic, readers, &self.node);
                Ok(true)
            }
            Admission::AlreadyKnown => Ok(false),
            Admission::Full => {
                warn!("Topic {} lost the race for the last slot, deleting it", topic);
                let log = self.log.clone();
                let topic = topic.to_string();
                tokio::spawn(async move {
                    if let Err(e) = log.delete_topic(&topic).await {
                        error!("Failed to delete rejected topic {}: {}", topic, e);
                    }
                });
                Err(Error::TopicCapacityExceeded {
                    max: self.topics.capacity(),
                })
            }
        }
    }

    /// Produce `payload` to `topic` keyed by the channel `name`, waiting for
    /// the log to acknowledge it
    pub async fn publish(&self, topic: &str, name: &str, payload: Bytes) -> Result<RecordMetadata> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        validate_channel_name(name)?;
        self.ensure_topic(topic).await?;

        debug!("Publishing {} bytes to {}/{}", payload.len(), topic, name);
        let metadata = self.log.produce(topic, name, payload).await?;
        self.messages_published.fetch_add(1, Ordering::Relaxed);
        Ok(metadata)
    }

    /// Stop every lane, wait for them to exit, then close the log
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!("Closing broker");
        self.lanes.shutdown().await;
        self.log.close().await
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Topics admitted so far, sorted
    pub fn topics(&self) -> Vec<String> {
        self.topics.names()
    }

    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    pub fn config(&self) -> &FanoutConfig {
        &self.config
    }

    /// Get broker and registry statistics
    pub fn stats(&self) -> Stats {
        Stats {
            topics: self.topics.len(),
            lanes: self.lanes.running(),
            messages_published: self.messages_published.load(Ordering::Relaxed),
            ..self.node.stats()
        }
    }
}
