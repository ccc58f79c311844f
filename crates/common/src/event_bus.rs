//! Topic-keyed broadcast event bus.
//!
//! Each topic is backed by its own `tokio::sync::broadcast` channel, created
//! lazily on first publish or subscribe. Publishing never waits for
//! subscribers to process anything: a `broadcast::Sender::send` only copies
//! the envelope into the ring buffer, and the whole publish path is guarded
//! by a timeout so a contended topic map cannot stall the producer.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

/// A statically named event topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Topic(pub &'static str);

/// An event together with its topic and publish timestamp.
#[derive(Debug, Clone)]
pub struct EventEnvelope<T: Clone + Send + Sync + Debug + 'static> {
    pub topic: Topic,
    pub payload: T,
    pub ts_ms: u128,
}

/// Fan-out bus over lazily created broadcast topics.
#[derive(Clone)]
pub struct EventBus<T: Clone + Send + Sync + Debug + 'static> {
    inner: Arc<RwLock<TopicMap<T>>>,
    publish_timeout: Duration,
    subscribe_buffer: usize,
}

struct TopicMap<T: Clone + Send + Sync + Debug + 'static> {
    topics: HashMap<&'static str, broadcast::Sender<EventEnvelope<T>>>,
}

impl<T: Clone + Send + Sync + Debug + 'static> Default for EventBus<T> {
    fn default() -> Self {
        Self::new(1024, Duration::from_millis(250))
    }
}

impl<T: Clone + Send + Sync + Debug + 'static> EventBus<T> {
    pub fn new(subscribe_buffer: usize, publish_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(TopicMap {
                topics: HashMap::new(),
            })),
            publish_timeout,
            subscribe_buffer,
        }
    }

    async fn ensure_topic(&self, topic: Topic) {
        let mut inner = self.inner.write().await;
        if !inner.topics.contains_key(topic.0) {
            let (tx, _rx) = broadcast::channel(self.subscribe_buffer);
            inner.topics.insert(topic.0, tx);
            debug!(target: "event_bus", topic = topic.0, "created topic");
        }
    }

    /// Publish `payload` on `topic`. Lost events (no subscribers, lagging
    /// ring buffer, or a publish timeout) are logged and dropped; the caller
    /// is never blocked on consumers.
    pub async fn publish(&self, topic: Topic, payload: T) {
        self.ensure_topic(topic).await;
        let envelope = EventEnvelope {
            topic,
            payload,
            ts_ms: current_ts_ms(),
        };
        let tx = { self.inner.read().await.topics.get(topic.0).cloned() };
        let Some(tx) = tx else {
            warn!(target: "event_bus", topic = topic.0, "topic sender missing");
            return;
        };
        match timeout(self.publish_timeout, async move { tx.send(envelope) }).await {
            Ok(Ok(_)) => {}
            Ok(Err(_)) => {
                debug!(target: "event_bus", topic = topic.0, "no subscribers, event dropped");
            }
            Err(_) => {
                warn!(target: "event_bus", topic = topic.0, "publish timeout");
            }
        }
    }

    /// Subscribe to `topic`, creating it if needed.
    pub async fn subscribe(&self, topic: Topic) -> broadcast::Receiver<EventEnvelope<T>> {
        self.ensure_topic(topic).await;
        let inner = self.inner.read().await;
        match inner.topics.get(topic.0) {
            Some(tx) => tx.subscribe(),
            // ensure_topic just inserted it; losing the race to a removal is
            // impossible since topics are never removed.
            None => unreachable!("topic created by ensure_topic"),
        }
    }

    /// Number of live subscribers on `topic`, 0 if the topic does not exist.
    pub async fn subscriber_count(&self, topic: Topic) -> usize {
        self.inner
            .read()
            .await
            .topics
            .get(topic.0)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }
}

fn current_ts_ms() -> u128 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}
