//! The boundary upstream delivery layers talk to.
//!
//! [`StreamAdapter`] turns publish requests into broker calls and subscribe
//! requests into registry attachments whose deliveries surface as a stream.

mod publisher;
mod subscriber;

use crate::error::Result;
use crate::log::{Log, MemoryLog, RecordMetadata};
use crate::message::EventMessage;
use crate::node::{Node, Subscriber};
use crate::{validate_channel_name, Broker, ChannelKey, FanoutConfig, Stats};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use publisher::Publisher;
pub use subscriber::Subscription;

/// Publish/subscribe entry point wired to one broker and its registry
#[derive(Clone)]
pub struct StreamAdapter {
    broker: Arc<Broker>,
    subscriber_buffer: usize,
}

impl StreamAdapter {
    /// Build a registry and broker over `log`
    pub fn new(config: FanoutConfig, log: Arc<dyn Log>) -> Result<Self> {
        config.validate()?;
        let node = Arc::new(Node::new(config.workers));
        let broker = Arc::new(Broker::new(config, log, node)?);
        Ok(Self::from_broker(broker))
    }

    /// Build everything over a fresh [`MemoryLog`]
    pub fn in_memory(config: FanoutConfig) -> Result<Self> {
        let log = Arc::new(MemoryLog::from_config(&config));
        Self::new(config, log)
    }

    pub fn from_broker(broker: Arc<Broker>) -> Self {
        let subscriber_buffer = broker.config().subscriber_buffer;
        Self {
            broker,
            subscriber_buffer,
        }
    }

    /// Encode `message` and publish it to `channel`
    pub async fn publish(&self, channel: &ChannelKey, message: &EventMessage) -> Result<RecordMetadata> {
        self.publisher().publish(channel, message).await
    }

    pub fn publisher(&self) -> Publisher {
        Publisher::new(self.broker.clone())
    }

    /// Attach a new subscriber to `channel`.
    ///
    /// Only messages consumed after this call are delivered.
    pub fn subscribe(&self, channel: ChannelKey) -> Result<Subscription> {
        validate_channel_name(channel.name())?;
        let (subscriber, rx) = Subscriber::channel(self.subscriber_buffer);
        let id = subscriber.id();
        let node = self.broker.node().clone();
        node.attach(channel.clone(), subscriber);
        info!("Subscriber {} attached to {}", id, channel);
        Ok(Subscription::new(channel, id, rx, node))
    }

    /// Subscribe to `channel` and hand every message to `sink` until `cancel`
    /// fires or `sink` fails. The subscriber is detached on return.
    pub async fn serve<F>(&self, channel: ChannelKey, cancel: CancellationToken, mut sink: F) -> Result<()>
    where
        F: FnMut(Arc<EventMessage>) -> Result<()>,
    {
        let mut subscription = self.subscribe(channel)?;
        loop {
            let message = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Subscription {} cancelled", subscription.id());
                    return Ok(());
                }
                message = subscription.recv() => message,
            };

            let Some(message) = message else {
                return Ok(());
            };
            if let Err(e) = sink(message) {
                warn!("Stream for subscriber {} failed: {}", subscription.id(), e);
                return Err(e);
            }
        }
    }

    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    pub fn stats(&self) -> Stats {
        self.broker.stats()
    }

    /// Close the broker, stopping its lanes
    pub async fn close(&self) -> Result<()> {
        self.broker.close().await
    }
}
