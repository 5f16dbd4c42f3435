//! Real-time fan-out of channel events to live subscribers.
//!
//! Publishers produce events to a partitioned log keyed by channel name. One
//! consumption lane per partition feeds an in-process, hash-sharded subscriber
//! registry which writes each event to every stream currently attached to the
//! channel. All traffic for one channel name flows through one lane, so
//! subscribers see a channel's events in the order they were produced.

pub mod broker;
pub mod client;
pub mod error;
pub mod log;
pub mod message;
pub mod node;
pub mod shard;
mod topic;

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

pub use broker::Broker;
pub use client::{Publisher, StreamAdapter, Subscription};
pub use error::{Error, Result};
pub use log::{Log, MemoryLog, PartitionReader, Record, RecordMetadata, TopicSpec};
pub use message::{ContentEvent, EventMessage, ObjectEvent, ObjectEventType};
pub use node::{Node, Subscriber};
pub use topic::validate_topic_name;

/// Configuration supplied once at startup
#[derive(Debug, Clone)]
pub struct FanoutConfig {
    /// Addresses of the log brokers
    pub brokers: Vec<String>,
    /// Number of registry shards, and partitions per topic
    pub workers: usize,
    /// Maximum number of topics that may be live at once
    pub max_topics: usize,
    /// Upper bound on a topic creation round-trip
    pub topic_create_timeout: Duration,
    /// Messages buffered per subscriber before deliveries are dropped
    pub subscriber_buffer: usize,
    /// Records retained per partition by the in-memory log
    pub partition_retention: usize,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_string()],
            workers: 8,
            max_topics: 16,
            topic_create_timeout: Duration::from_secs(1),
            subscriber_buffer: 256,
            partition_retention: 1024,
        }
    }
}

impl FanoutConfig {
    /// Build a configuration from `FANOUT_*` environment variables, falling
    /// back to the defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(brokers) = env::var("FANOUT_BROKERS") {
            config.brokers = brokers
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(workers) = env_number("FANOUT_WORKERS")? {
            config.workers = workers as usize;
        }
        if let Some(max_topics) = env_number("FANOUT_MAX_TOPICS")? {
            config.max_topics = max_topics as usize;
        }
        if let Some(ms) = env_number("FANOUT_TOPIC_TIMEOUT_MS")? {
            config.topic_create_timeout = Duration::from_millis(ms);
        }
        if let Some(buffer) = env_number("FANOUT_SUBSCRIBER_BUFFER")? {
            config.subscriber_buffer = buffer as usize;
        }
        if let Some(retention) = env_number("FANOUT_PARTITION_RETENTION")? {
            config.partition_retention = retention as usize;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the broker cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.brokers.is_empty() {
            return Err(Error::InvalidConfig("at least one broker address is required".into()));
        }
        if self.workers == 0 {
            return Err(Error::InvalidConfig("workers cannot be zero".into()));
        }
        if self.workers > u32::MAX as usize {
            return Err(Error::InvalidConfig("workers must fit a partition index".into()));
        }
        if self.max_topics == 0 {
            return Err(Error::InvalidConfig("max_topics cannot be zero".into()));
        }
        if self.topic_create_timeout.is_zero() {
            return Err(Error::InvalidConfig("topic_create_timeout cannot be zero".into()));
        }
        if self.subscriber_buffer == 0 {
            return Err(Error::InvalidConfig("subscriber_buffer cannot be zero".into()));
        }
        if self.partition_retention == 0 {
            return Err(Error::InvalidConfig("partition_retention cannot be zero".into()));
        }
        Ok(())
    }

    /// Partitions created for every topic; always equal to `workers`
    pub fn partitions(&self) -> u32 {
        self.workers as u32
    }
}

fn env_number(key: &str) -> Result<Option<u64>> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::InvalidConfig(format!("{key} must be a non-negative integer, got {raw:?}"))),
        Err(_) => Ok(None),
    }
}

/// Unique identifier for an attached subscriber
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SubscriberId(Uuid);

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriberId {
    /// Create a new random subscriber ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the string representation of the subscriber ID
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A mailbox: a coarse topic plus a routing name such as a user id
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ChannelKey {
    topic: String,
    name: String,
}

impl ChannelKey {
    /// Create a channel key without validation
    pub fn new(topic: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            name: name.into(),
        }
    }

    /// Create a channel key, rejecting names the log cannot carry
    pub fn parse(topic: &str, name: &str) -> Result<Self> {
        validate_topic_name(topic)?;
        validate_channel_name(name)?;
        Ok(Self::new(topic, name))
    }

    /// Get the topic
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Get the channel name
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.topic, self.name)
    }
}

/// Statistics about the fan-out layer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    /// Topics currently admitted
    pub topics: usize,
    /// Consumption lanes currently running
    pub lanes: usize,
    /// Channels with at least one subscriber
    pub channels: usize,
    /// Subscribers currently attached
    pub subscribers: usize,
    /// Records acknowledged by the log
    pub messages_published: u64,
    /// Successful writes to subscriber transports
    pub messages_delivered: u64,
    /// Writes dropped because a transport was full or closed
    pub delivery_failures: u64,
    /// Consumed records that could not be decoded
    pub decode_failures: u64,
}

/// Maximum length for channel names
pub const MAX_NAME_LENGTH: usize = 256;

/// Check that `name` can be used as a channel name (non-empty, at most
/// [`MAX_NAME_LENGTH`] bytes)
pub fn validate_channel_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidChannel("Channel name cannot be empty".into()));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(Error::InvalidChannel(format!(
            "Channel name longer than {MAX_NAME_LENGTH} bytes"
        )));
    }
    Ok(())
}
