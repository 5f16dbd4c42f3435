use crate::error::Result;
use crate::log::RecordMetadata;
use crate::message::EventMessage;
use crate::{Broker, ChannelKey};
use std::sync::Arc;
use tracing::debug;

/// Cloneable handle for publishing events to channels
#[derive(Clone)]
pub struct Publisher {
    broker: Arc<Broker>,
}

impl Publisher {
    pub fn new(broker: Arc<Broker>) -> Self {
        Self { broker }
    }

    /// Publish a message to a channel, waiting for the log to acknowledge it
    pub async fn publish(&self, channel: &ChannelKey, message: &EventMessage) -> Result<RecordMetadata> {
        let payload = message.encode()?;
        debug!("Publishing message to {} (size: {} bytes)", channel, payload.len());
        self.broker
            .publish(channel.topic(), channel.name(), payload)
            .await
    }

    /// Publish messages in order, stopping at the first failure
    pub async fn publish_batch(&self, messages: &[(ChannelKey, EventMessage)]) -> Result<Vec<RecordMetadata>> {
        debug!("Publishing batch of {} messages", messages.len());
        let mut acks = Vec::with_capacity(messages.len());
        for (channel, message) in messages {
            acks.push(self.publish(channel, message).await?);
        }
        Ok(acks)
    }
}
