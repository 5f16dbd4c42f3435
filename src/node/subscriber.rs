use crate::error::{Error, Result};
use crate::message::EventMessage;
use crate::SubscriberId;
use std::sync::Arc;
use tokio::sync::mpsc;

/// A live stream attached to a channel.
///
/// The transport is the sending half of a bounded channel whose receiver is
/// held by the subscribing connection. Cloning is cheap.
///
/// Delivery never waits for buffer space: a message that arrives while the
/// buffer is full is dropped and counted as a delivery failure. A subscriber
/// that falls behind even briefly can therefore see gaps in its channel's
/// sequence, though the messages it does get stay in order.
#[derive(Debug, Clone)]
pub struct Subscriber {
    id: SubscriberId,
    transport: mpsc::Sender<Arc<EventMessage>>,
}

impl Subscriber {
    pub fn new(id: SubscriberId, transport: mpsc::Sender<Arc<EventMessage>>) -> Self {
        Self { id, transport }
    }

    /// Create a subscriber with a fresh id and a transport of `capacity`
    /// messages, returning the receiving half alongside it
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Arc<EventMessage>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(SubscriberId::new(), tx), rx)
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Whether the receiving side has gone away
    pub fn is_closed(&self) -> bool {
        self.transport.is_closed()
    }

    /// Write a message without waiting for buffer space
    pub fn deliver(&self, message: Arc<EventMessage>) -> Result<()> {
        self.transport.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => Error::SubscriberLagging(self.id.as_str()),
            mpsc::error::TrySendError::Closed(_) => Error::SubscriberClosed(self.id.as_str()),
        })
    }
}
