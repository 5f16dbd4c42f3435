use crate::error::{Error, Result};
use crate::message::EventMessage;
use crate::node::Node;
use crate::{ChannelKey, SubscriberId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// A live subscription to one channel.
///
/// The subscriber stays attached to the registry for as long as this value
/// lives; dropping it detaches on every exit path.
pub struct Subscription {
    key: ChannelKey,
    id: SubscriberId,
    rx: mpsc::Receiver<Arc<EventMessage>>,
    node: Arc<Node>,
}

impl Subscription {
    pub(crate) fn new(
        key: ChannelKey,
        id: SubscriberId,
        rx: mpsc::Receiver<Arc<EventMessage>>,
        node: Arc<Node>,
    ) -> Self {
        Self { key, id, rx, node }
    }

    pub fn channel(&self) -> &ChannelKey {
        &self.key
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next message. `None` once the stream can no longer
    /// produce messages.
    pub async fn recv(&mut self) -> Option<Arc<EventMessage>> {
        self.rx.recv().await
    }

    /// Take a message if one is already buffered
    pub fn try_recv(&mut self) -> Option<Arc<EventMessage>> {
        self.rx.try_recv().ok()
    }

    /// Receive a message with timeout
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Result<Arc<EventMessage>> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(message)) => Ok(message),
            Ok(None) => Err(Error::Closed),
            Err(_) => Err(Error::Timeout),
        }
    }

    /// Drain up to `max_messages` already-buffered messages
    pub fn recv_batch(&mut self, max_messages: usize) -> Vec<Arc<EventMessage>> {
        let mut messages = Vec::with_capacity(max_messages);
        while messages.len() < max_messages {
            match self.rx.try_recv() {
                Ok(message) => messages.push(message),
                Err(_) => break,
            }
        }
        messages
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.node.detach(&self.key, &self.id);
        debug!("Subscription {} to {} ended", self.id, self.key);
    }
}
