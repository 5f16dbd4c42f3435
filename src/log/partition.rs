use super::{PartitionReader, Record};
use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::warn;

/// One append-only partition with a bounded retention window.
///
/// Offsets increase by one per record and are never reused. The broadcast
/// buffer holds the last `capacity` records; a reader further behind than
/// that skips ahead. Appends hold the offset lock while sending, so tailing
/// readers observe records in offset order.
pub(super) struct Partition {
    topic: String,
    index: u32,
    next_offset: Mutex<u64>,
    tx: broadcast::Sender<Record>,
}

impl Partition {
    pub fn new(topic: &str, index: u32, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            topic: topic.to_string(),
            index,
            next_offset: Mutex::new(0),
            tx,
        }
    }

    /// Append a record and return its offset
    pub fn append(&self, key: &str, value: Bytes) -> u64 {
        let mut next_offset = self.next_offset.lock();
        let offset = *next_offset;
        *next_offset += 1;

        let record = Record {
            topic: self.topic.clone(),
            partition: self.index,
            offset,
            key: key.to_string(),
            value,
        };
        // No tailing readers is fine; the record is still acknowledged.
        let _ = self.tx.send(record);
        offset
    }

    /// Open a reader that sees records appended from now on
    pub fn tail(&self) -> PartitionTail {
        let _next_offset = self.next_offset.lock();
        PartitionTail {
            topic: self.topic.clone(),
            partition: self.index,
            rx: self.tx.subscribe(),
        }
    }

    /// Offset the next appended record will get
    pub fn high_watermark(&self) -> u64 {
        *self.next_offset.lock()
    }
}

/// Reader over the live end of a [`Partition`]
pub(super) struct PartitionTail {
    topic: String,
    partition: u32,
    rx: broadcast::Receiver<Record>,
}

#[async_trait]
impl PartitionReader for PartitionTail {
    async fn next(&mut self) -> Result<Option<Record>> {
        loop {
            match self.rx.recv().await {
                Ok(record) => return Ok(Some(record)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        topic = %self.topic,
                        partition = self.partition,
                        skipped,
                        "Reader fell behind retention, skipping ahead"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(None),
            }
        }
    }
}
