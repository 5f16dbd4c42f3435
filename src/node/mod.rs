//! In-process subscriber registry.
//!
//! Channels are spread over a fixed number of shards by [`shard_index`]. Each
//! shard has its own lock, so attaches and dispatches on different shards
//! never contend.

mod subscriber;

use crate::message::EventMessage;
use crate::shard::shard_index;
use crate::{ChannelKey, Stats, SubscriberId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

pub use subscriber::Subscriber;

type Channels = HashMap<ChannelKey, HashMap<SubscriberId, Subscriber>>;

#[derive(Default)]
struct Shard {
    channels: RwLock<Channels>,
}

/// Statistics counters for the registry
#[derive(Default)]
struct Counters {
    messages_delivered: AtomicU64,
    delivery_failures: AtomicU64,
    decode_failures: AtomicU64,
}

/// The registry of live subscribers, keyed by channel
pub struct Node {
    shards: Box<[Shard]>,
    counters: Counters,
}

impl Node {
    /// Create a registry with `workers` shards (at least one)
    pub fn new(workers: usize) -> Self {
        let shards = (0..workers.max(1)).map(|_| Shard::default()).collect();
        Self {
            shards,
            counters: Counters::default(),
        }
    }

    /// Number of shards
    pub fn workers(&self) -> usize {
        self.shards.len()
    }

    /// Shard that owns channels named `name`
    pub fn shard_of(&self, name: &str) -> usize {
        shard_index(name, self.shards.len())
    }

    fn shard(&self, key: &ChannelKey) -> &Shard {
        &self.shards[self.shard_of(key.name())]
    }

    /// Register `subscriber` for messages on `key`
    pub fn attach(&self, key: ChannelKey, subscriber: Subscriber) {
        debug!("Attaching subscriber {} to {}", subscriber.id(), key);
        let mut channels = self.shard(&key).channels.write();
        channels
            .entry(key)
            .or_default()
            .insert(subscriber.id(), subscriber);
    }

    /// Remove a subscriber. Returns false if it was not attached.
    pub fn detach(&self, key: &ChannelKey, id: &SubscriberId) -> bool {
        let mut channels = self.shard(key).channels.write();
        let Some(subscribers) = channels.get_mut(key) else {
            return false;
        };
        let removed = subscribers.remove(id).is_some();
        if subscribers.is_empty() {
            channels.remove(key);
        }
        if removed {
            debug!("Detached subscriber {} from {}", id, key);
        }
        removed
    }

    /// Deliver an encoded message to every subscriber of `key`.
    ///
    /// Subscribers are snapshotted under the read lock and written to after it
    /// is released. A failed write is logged and does not stop delivery to the
    /// rest. Returns the number of successful deliveries.
    pub fn dispatch(&self, key: &ChannelKey, payload: &[u8]) -> usize {
        let snapshot: Vec<Subscriber> = {
            let channels = self.shard(key).channels.read();
            match channels.get(key) {
                Some(subscribers) => subscribers.values().cloned().collect(),
                None => return 0,
            }
        };

        let message = match EventMessage::decode(payload) {
            Ok(message) => Arc::new(message),
            Err(e) => {
                self.counters.decode_failures.fetch_add(1, Ordering::Relaxed);
                warn!("Dropping undecodable message on {}: {}", key, e);
                return 0;
            }
        };

        let mut delivered = 0;
        for subscriber in &snapshot {
            match subscriber.deliver(message.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    self.counters.delivery_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(error = e.as_label(), "Delivery to {} on {} failed: {}", subscriber.id(), key, e);
                }
            }
        }

        self.counters
            .messages_delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
        debug!("Dispatched message on {} to {}/{} subscribers", key, delivered, snapshot.len());
        delivered
    }

    /// Subscribers currently attached to `key`
    pub fn subscriber_count(&self, key: &ChannelKey) -> usize {
        self.shard(key)
            .channels
            .read()
            .get(key)
            .map_or(0, HashMap::len)
    }

    /// Channels with at least one subscriber
    pub fn channel_count(&self) -> usize {
        self.shards.iter().map(|s| s.channels.read().len()).sum()
    }

    /// Registry statistics; topic, lane and publish fields are left at zero
    pub fn stats(&self) -> Stats {
        let (channels, subscribers) = self.shards.iter().fold((0, 0), |(c, s), shard| {
            let shard = shard.channels.read();
            (c + shard.len(), s + shard.values().map(HashMap::len).sum::<usize>())
        });

        Stats {
            channels,
            subscribers,
            messages_delivered: self.counters.messages_delivered.load(Ordering::Relaxed),
            delivery_failures: self.counters.delivery_failures.load(Ordering::Relaxed),
            decode_failures: self.counters.decode_failures.load(Ordering::Relaxed),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ObjectEventType;
    use std::thread;

    fn payload(id: i64) -> bytes::Bytes {
        EventMessage::object(ObjectEventType::Create, id).encode().unwrap()
    }

    #[test]
    fn test_attach_and_dispatch() {
        let node = Node::new(4);
        let key = ChannelKey::new("chat", "42");
        let (a, mut rx_a) = Subscriber::channel(8);
        let (b, mut rx_b) = Subscriber::channel(8);
        node.attach(key.clone(), a);
        node.attach(key.clone(), b);

        assert_eq!(node.dispatch(&key, &payload(7)), 2);

        let expected = EventMessage::object(ObjectEventType::Create, 7);
        assert_eq!(*rx_a.try_recv().unwrap(), expected);
        assert_eq!(*rx_b.try_recv().unwrap(), expected);
        assert!(rx_a.try_recv().is_err());
    }

    #[test]
    fn test_other_channels_receive_nothing() {
        let node = Node::new(4);
        let (a, mut rx_a) = Subscriber::channel(8);
        let (b, mut rx_b) = Subscriber::channel(8);
        node.attach(ChannelKey::new("chat", "42"), a);
        node.attach(ChannelKey::new("notification", "42"), b);

        node.dispatch(&ChannelKey::new("chat", "42"), &payload(1));

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn test_dispatch_without_subscribers_is_noop() {
        let node = Node::new(4);
        assert_eq!(node.dispatch(&ChannelKey::new("chat", "1"), b"not even valid"), 0);
        assert_eq!(node.stats().decode_failures, 0);
    }

    #[test]
    fn test_detach_removes_empty_channel() {
        let node = Node::new(4);
        let key = ChannelKey::new("chat", "42");
        let (a, _rx) = Subscriber::channel(8);
        let id = a.id();
        node.attach(key.clone(), a);
        assert_eq!(node.channel_count(), 1);

        assert!(node.detach(&key, &id));
        assert!(!node.detach(&key, &id));
        assert_eq!(node.subscriber_count(&key), 0);
        assert_eq!(node.channel_count(), 0);
    }

    #[test]
    fn test_failed_delivery_does_not_stop_others() {
        let node = Node::new(2);
        let key = ChannelKey::new("chat", "42");
        let (gone, rx_gone) = Subscriber::channel(8);
        let (full, _rx_full) = Subscriber::channel(1);
        let (live, mut rx_live) = Subscriber::channel(8);
        drop(rx_gone);
        node.attach(key.clone(), gone);
        node.attach(key.clone(), full);
        node.attach(key.clone(), live);

        assert_eq!(node.dispatch(&key, &payload(1)), 2);
        assert_eq!(node.dispatch(&key, &payload(2)), 1);

        assert_eq!(rx_live.try_recv().unwrap().as_ref(), &EventMessage::object(ObjectEventType::Create, 1));
        assert_eq!(rx_live.try_recv().unwrap().as_ref(), &EventMessage::object(ObjectEventType::Create, 2));

        let stats = node.stats();
        assert_eq!(stats.messages_delivered, 3);
        assert_eq!(stats.delivery_failures, 3);
        // Failed subscribers stay attached until their subscription ends.
        assert_eq!(stats.subscribers, 3);
    }

    #[test]
    fn test_undecodable_payload_is_dropped() {
        let node = Node::new(2);
        let key = ChannelKey::new("chat", "42");
        let (a, mut rx) = Subscriber::channel(8);
        node.attach(key.clone(), a);

        assert_eq!(node.dispatch(&key, &[0xff, 0xff, 0xff, 0xff]), 0);
        assert!(rx.try_recv().is_err());
        assert_eq!(node.stats().decode_failures, 1);

        assert_eq!(node.dispatch(&key, &payload(5)), 1);
    }

    #[test]
    fn test_concurrent_attach_detach_dispatch() {
        let node = Arc::new(Node::new(8));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let node = node.clone();
                thread::spawn(move || {
                    let mut receivers = Vec::new();
                    for i in 0..200 {
                        let key = ChannelKey::new("chat", format!("{}", (t * 31 + i) % 17));
                        let (s, rx) = Subscriber::channel(1024);
                        let id = s.id();
                        node.attach(key.clone(), s);
                        node.dispatch(&key, &payload(i as i64));
                        if i % 2 == 0 {
                            node.detach(&key, &id);
                        } else {
                            receivers.push(rx);
                        }
                    }
                    receivers.len()
                })
            })
            .collect();

        let kept: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(node.stats().subscribers, kept);
    }
}
