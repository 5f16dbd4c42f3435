use async_trait::async_trait;
use bytes::Bytes;
use fanout::{
    Broker, Error, FanoutConfig, Log, MemoryLog, Node, PartitionReader, RecordMetadata,
    TopicSpec,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};
use tracing_test::traced_test;

fn config(max_topics: usize) -> FanoutConfig {
    FanoutConfig {
        workers: 4,
        max_topics,
        topic_create_timeout: Duration::from_millis(200),
        ..Default::default()
    }
}

fn broker_over(config: FanoutConfig, log: Arc<dyn Log>) -> Broker {
    let node = Arc::new(Node::new(config.workers));
    Broker::new(config, log, node).expect("Failed to create broker")
}

/// Wraps a [`MemoryLog`], optionally stalling or failing topic creation
struct ScriptedLog {
    inner: MemoryLog,
    create_delay: Duration,
    fail_create: bool,
    creates: AtomicUsize,
    deletes: AtomicUsize,
}

impl ScriptedLog {
    fn new(create_delay: Duration, fail_create: bool) -> Self {
        Self {
            inner: MemoryLog::new(64),
            create_delay,
            fail_create,
            creates: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Log for ScriptedLog {
    async fn create_topic(&self, spec: &TopicSpec) -> fanout::Result<()> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.create_delay).await;
        if self.fail_create {
            return Err(Error::Log("broker unreachable".into()));
        }
        self.inner.create_topic(spec).await
    }

    async fn delete_topic(&self, topic: &str) -> fanout::Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete_topic(topic).await
    }

    async fn produce(&self, topic: &str, key: &str, value: Bytes) -> fanout::Result<RecordMetadata> {
        self.inner.produce(topic, key, value).await
    }

    async fn tail(&self, topic: &str, partition: u32) -> fanout::Result<Box<dyn PartitionReader>> {
        self.inner.tail(topic, partition).await
    }

    async fn close(&self) -> fanout::Result<()> {
        self.inner.close().await
    }
}

#[tokio::test]
async fn test_topic_cap_scenario() {
    let broker = broker_over(config(2), Arc::new(MemoryLog::new(64)));

    assert!(assert_ok!(broker.ensure_topic("chat").await));
    assert!(assert_ok!(broker.ensure_topic("notification").await));

    let err = assert_err!(broker.ensure_topic("metrics").await);
    assert!(matches!(err, Error::TopicCapacityExceeded { max: 2 }));
    assert!(!err.is_transient());

    // Known topics are a no-op success and do not change the count.
    assert!(!assert_ok!(broker.ensure_topic("chat").await));
    assert!(!assert_ok!(broker.ensure_topic("notification").await));
    assert_eq!(broker.topics(), vec!["chat", "notification"]);
    assert_eq!(broker.stats().topics, 2);
}

#[tokio::test]
async fn test_n_topics_fit_exactly() {
    let broker = broker_over(config(5), Arc::new(MemoryLog::new(64)));
    for i in 0..5 {
        assert!(broker.ensure_topic(&format!("topic-{i}")).await.unwrap());
    }
    assert!(matches!(
        broker.ensure_topic("topic-5").await,
        Err(Error::TopicCapacityExceeded { .. })
    ));
    // Each admitted topic gets one lane per partition.
    assert_eq!(broker.stats().lanes, 5 * 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_admission_respects_cap() {
    let log = Arc::new(ScriptedLog::new(Duration::from_millis(20), false));
    let broker = Arc::new(broker_over(config(3), log.clone()));

    let handles: Vec<_> = (0..12)
        .map(|i| {
            let broker = broker.clone();
            tokio::spawn(async move { broker.ensure_topic(&format!("topic-{i}")).await })
        })
        .collect();

    let mut admitted = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(true) => admitted += 1,
            Err(Error::TopicCapacityExceeded { .. }) => rejected += 1,
            other => panic!("unexpected result: {other:?}"),
        }
    }

    assert_eq!(admitted, 3);
    assert_eq!(rejected, 9);
    assert_eq!(broker.topics().len(), 3);

    // Race losers that reached the log are deleted asynchronously.
    let created = log.creates.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(log.deletes.load(Ordering::SeqCst), created - 3);
    assert_eq!(log.inner.topic_names().len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_same_topic_admitted_once() {
    let log = Arc::new(ScriptedLog::new(Duration::from_millis(20), false));
    let broker = Arc::new(broker_over(config(2), log));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let broker = broker.clone();
            tokio::spawn(async move { broker.ensure_topic("chat").await })
        })
        .collect();

    let mut created = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap() {
            created += 1;
        }
    }
    assert_eq!(created, 1);
    assert_eq!(broker.stats().lanes, 4);
}

#[tokio::test]
async fn test_log_failure_propagates_and_keeps_slot() {
    let broker = broker_over(config(1), Arc::new(ScriptedLog::new(Duration::ZERO, true)));

    let err = broker
        .publish("chat", "42", Bytes::from_static(b"x"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Log(_)));
    assert!(err.is_transient());
    assert!(broker.topics().is_empty());
}

#[tokio::test]
async fn test_slow_topic_creation_times_out() {
    let broker = broker_over(
        config(2),
        Arc::new(ScriptedLog::new(Duration::from_secs(5), false)),
    );

    let err = broker.ensure_topic("chat").await.unwrap_err();
    assert!(matches!(err, Error::TopicCreateTimeout(ref t) if t == "chat"));
    assert!(broker.topics().is_empty());
}

#[tokio::test]
async fn test_invalid_topic_rejected_before_log() {
    let log = Arc::new(ScriptedLog::new(Duration::ZERO, false));
    let broker = broker_over(config(2), log.clone());

    assert!(matches!(
        broker.ensure_topic("chat room").await,
        Err(Error::InvalidTopic(_))
    ));
    assert_eq!(log.creates.load(Ordering::SeqCst), 0);
}

#[tokio::test]
#[traced_test]
async fn test_close_stops_lanes() {
    let broker = broker_over(config(2), Arc::new(MemoryLog::new(64)));
    broker
        .publish("chat", "42", Bytes::from_static(b"x"))
        .await
        .unwrap();
    assert_eq!(broker.stats().lanes, 4);
    assert_eq!(broker.stats().messages_published, 1);

    broker.close().await.unwrap();
    broker.close().await.unwrap();

    assert!(broker.is_closed());
    assert_eq!(broker.stats().lanes, 0);
    assert!(matches!(
        broker.publish("chat", "42", Bytes::new()).await,
        Err(Error::Closed)
    ));
    assert!(logs_contain("Closing broker"));
}

#[test]
fn test_mismatched_node_rejected() {
    let config = config(2);
    let node = Arc::new(Node::new(config.workers + 1));
    let result = Broker::new(config, Arc::new(MemoryLog::new(8)), node);
    assert!(matches!(result, Err(Error::InvalidConfig(_))));
}
