//! In-process broker with per-topic FIFO logs.
//!
//! A broker models one consumer group on a single partition per topic. A
//! consumer session starts at the group's committed offset and reads ahead
//! with its own cursor; only [`ConsumerTransport::ack`] moves the committed
//! offset, so anything read but not acknowledged is read again by the next
//! session.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::transport::{BrokerError, ConsumerTransport, InboundMessage, ProducerTransport};

/// Shared topic store for [`MemoryProducer`] and [`MemoryConsumer`].
#[derive(Debug, Default)]
pub struct MemoryBroker {
    topics: Mutex<HashMap<String, Vec<Vec<u8>>>>,
    committed: Mutex<HashMap<String, usize>>,
    appended: Notify,
}

impl MemoryBroker {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[must_use]
    pub fn producer(self: &Arc<Self>) -> MemoryProducer {
        MemoryProducer {
            broker: Arc::clone(self),
            started: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn consumer(self: &Arc<Self>) -> MemoryConsumer {
        MemoryConsumer {
            broker: Arc::clone(self),
            started: AtomicBool::new(false),
            cursor: Mutex::new(None),
        }
    }

    /// Appends `payload` to `topic`, bypassing any producer session.
    pub fn append(&self, topic: &str, payload: &[u8]) {
        self.topics
            .lock()
            .entry(topic.to_string())
            .or_default()
            .push(payload.to_vec());
        self.appended.notify_waiters();
    }

    /// Everything published to `topic` so far, oldest first.
    #[must_use]
    pub fn published(&self, topic: &str) -> Vec<Vec<u8>> {
        self.topics.lock().get(topic).cloned().unwrap_or_default()
    }

    /// The group's committed offset for `topic`: the next message a new
    /// session reads.
    #[must_use]
    pub fn committed(&self, topic: &str) -> usize {
        self.committed.lock().get(topic).copied().unwrap_or(0)
    }

    fn commit(&self, topic: &str, next: usize) {
        let mut committed = self.committed.lock();
        let entry = committed.entry(topic.to_string()).or_insert(0);
        *entry = (*entry).max(next);
    }

    fn read_at(&self, topic: &str, offset: usize) -> Option<Vec<u8>> {
        self.topics.lock().get(topic)?.get(offset).cloned()
    }
}

/// Producer session on a [`MemoryBroker`].
#[derive(Debug)]
pub struct MemoryProducer {
    broker: Arc<MemoryBroker>,
    started: AtomicBool,
}

#[async_trait]
impl ProducerTransport for MemoryProducer {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn start(&self) -> Result<(), BrokerError> {
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), BrokerError> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(BrokerError::NotConnected);
        }
        self.broker.append(topic, payload);
        Ok(())
    }

    async fn stop(&self) -> Result<(), BrokerError> {
        self.started.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug)]
struct Cursor {
    topic: String,
    next: usize,
}

/// Consumer session on a [`MemoryBroker`].
#[derive(Debug)]
pub struct MemoryConsumer {
    broker: Arc<MemoryBroker>,
    started: AtomicBool,
    cursor: Mutex<Option<Cursor>>,
}

impl MemoryConsumer {
    /// Takes the next unread message, advancing the cursor.
    fn try_next(&self) -> Result<Option<InboundMessage>, BrokerError> {
        let mut guard = self.cursor.lock();
        let cursor = guard.as_mut().ok_or(BrokerError::NoTopic)?;
        let Some(payload) = self.broker.read_at(&cursor.topic, cursor.next) else {
            return Ok(None);
        };
        let offset = i64::try_from(cursor.next).unwrap_or(i64::MAX);
        cursor.next += 1;
        Ok(Some(InboundMessage {
            topic: cursor.topic.clone(),
            partition: 0,
            offset,
            payload,
        }))
    }
}

#[async_trait]
impl ConsumerTransport for MemoryConsumer {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn start(&self) -> Result<(), BrokerError> {
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<(), BrokerError> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(BrokerError::NotConnected);
        }
        *self.cursor.lock() = Some(Cursor {
            topic: topic.to_string(),
            next: self.broker.committed(topic),
        });
        Ok(())
    }

    async fn recv(&self) -> Result<InboundMessage, BrokerError> {
        loop {
            if !self.started.load(Ordering::SeqCst) {
                return Err(BrokerError::NotConnected);
            }
            // Register interest before checking so an append between the
            // check and the await is not missed.
            let notified = self.broker.appended.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(message) = self.try_next()? {
                return Ok(message);
            }
            notified.await;
        }
    }

    async fn ack(&self, message: &InboundMessage) -> Result<(), BrokerError> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(BrokerError::NotConnected);
        }
        let next = usize::try_from(message.offset)
            .map_err(|_| BrokerError::Transport(format!("invalid offset {}", message.offset)))?;
        self.broker.commit(&message.topic, next + 1);
        Ok(())
    }

    async fn stop(&self) -> Result<(), BrokerError> {
        self.started.store(false, Ordering::SeqCst);
        *self.cursor.lock() = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn publish_requires_started_session() {
        let broker = MemoryBroker::new();
        let producer = broker.producer();
        assert!(matches!(
            producer.publish("t", b"x").await,
            Err(BrokerError::NotConnected)
        ));
        producer.start().await.unwrap();
        producer.publish("t", b"x").await.unwrap();
        assert_eq!(broker.published("t"), vec![b"x".to_vec()]);
    }

    #[tokio::test]
    async fn consumer_reads_in_publish_order_with_offsets() {
        let broker = MemoryBroker::new();
        broker.append("t", b"1");
        broker.append("t", b"2");
        broker.append("other", b"ignored");

        let consumer = broker.consumer();
        consumer.start().await.unwrap();
        consumer.subscribe("t").await.unwrap();

        let first = consumer.recv().await.unwrap();
        let second = consumer.recv().await.unwrap();
        assert_eq!((first.offset, first.payload), (0, b"1".to_vec()));
        assert_eq!((second.offset, second.payload), (1, b"2".to_vec()));
        assert_eq!(second.topic, "t");
    }

    #[tokio::test]
    async fn recv_waits_for_a_later_append() {
        let broker = MemoryBroker::new();
        let consumer = broker.consumer();
        consumer.start().await.unwrap();
        consumer.subscribe("t").await.unwrap();

        let publisher = Arc::clone(&broker);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            publisher.append("t", b"late");
        });

        let message = tokio::time::timeout(Duration::from_secs(1), consumer.recv())
            .await
            .expect("message should arrive")
            .unwrap();
        assert_eq!(message.payload, b"late");
    }

    #[tokio::test]
    async fn recv_without_subscription_is_an_error() {
        let broker = MemoryBroker::new();
        let consumer = broker.consumer();
        consumer.start().await.unwrap();
        assert!(matches!(consumer.recv().await, Err(BrokerError::NoTopic)));
    }

    #[tokio::test]
    async fn unacknowledged_message_is_read_again_by_the_next_session() {
        let broker = MemoryBroker::new();
        broker.append("t", b"1");
        broker.append("t", b"2");

        let first = broker.consumer();
        first.start().await.unwrap();
        first.subscribe("t").await.unwrap();
        let handled = first.recv().await.unwrap();
        first.ack(&handled).await.unwrap();
        let failed = first.recv().await.unwrap();
        assert_eq!(failed.payload, b"2");
        first.stop().await.unwrap();
        assert_eq!(broker.committed("t"), 1);

        let second = broker.consumer();
        second.start().await.unwrap();
        second.subscribe("t").await.unwrap();
        let redelivered = second.recv().await.unwrap();
        assert_eq!((redelivered.offset, redelivered.payload), (1, b"2".to_vec()));
    }

    #[tokio::test]
    async fn ack_never_moves_the_committed_offset_backwards() {
        let broker = MemoryBroker::new();
        broker.append("t", b"1");
        broker.append("t", b"2");
        let consumer = broker.consumer();
        consumer.start().await.unwrap();
        consumer.subscribe("t").await.unwrap();

        let first = consumer.recv().await.unwrap();
        let second = consumer.recv().await.unwrap();
        consumer.ack(&second).await.unwrap();
        consumer.ack(&first).await.unwrap();
        assert_eq!(broker.committed("t"), 2);
    }
}
