//! Outbound half of the stream channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use profile_core::{encode_payload, Payload};
use tracing::{debug, info, warn};

use super::transport::{BrokerError, ProducerTransport};

/// Publishes payloads to a fixed, ordered list of topics.
pub struct MessageProducer {
    transport: Arc<dyn ProducerTransport>,
    topics: Vec<String>,
    connected: AtomicBool,
}

impl MessageProducer {
    #[must_use]
    pub fn new(transport: Arc<dyn ProducerTransport>, topics: Vec<String>) -> Self {
        Self {
            transport,
            topics,
            connected: AtomicBool::new(false),
        }
    }

    /// Topics every [`send`](Self::send) publishes to, in order.
    #[must_use]
    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Opens the broker session.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Transport`] if the session cannot be opened.
    pub async fn connect(&self) -> Result<(), BrokerError> {
        self.transport.start().await?;
        self.connected.store(true, Ordering::SeqCst);
        info!(transport = self.transport.name(), topics = ?self.topics, "producer connected");
        Ok(())
    }

    /// Encodes `payload` and publishes it to every configured topic.
    ///
    /// # Errors
    ///
    /// See [`send_to`](Self::send_to).
    pub async fn send(&self, payload: &Payload) -> Result<(), BrokerError> {
        self.send_to(payload, &self.topics).await
    }

    /// Encodes `payload` once and publishes it to each of `topics` in turn,
    /// waiting for each acknowledgement before the next publish.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Codec`] if encoding fails (nothing is
    /// published), [`BrokerError::NotConnected`] before
    /// [`connect`](Self::connect), or the first publish failure. Topics after
    /// a failed publish are not attempted.
    pub async fn send_to<S: AsRef<str>>(
        &self,
        payload: &Payload,
        topics: &[S],
    ) -> Result<(), BrokerError> {
        if !self.is_connected() {
            return Err(BrokerError::NotConnected);
        }
        let bytes = encode_payload(payload)?;
        if topics.is_empty() {
            warn!("send called with no topics, message dropped");
            return Ok(());
        }
        for topic in topics {
            let topic = topic.as_ref();
            self.transport.publish(topic, &bytes).await?;
            debug!(topic, bytes = bytes.len(), "message published");
            metrics::counter!("broker_messages_published_total", "topic" => topic.to_string())
                .increment(1);
        }
        Ok(())
    }

    /// Flushes and closes the session. Safe to call when not connected.
    ///
    /// # Errors
    ///
    /// Returns the transport's error if the flush fails.
    pub async fn disconnect(&self) -> Result<(), BrokerError> {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.transport.stop().await?;
        info!(transport = self.transport.name(), "producer disconnected");
        Ok(())
    }
}

impl std::fmt::Debug for MessageProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageProducer")
            .field("transport", &self.transport.name())
            .field("topics", &self.topics)
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;
    use crate::broker::memory::MemoryBroker;

    fn topics(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    #[tokio::test]
    async fn send_publishes_once_per_topic() {
        let broker = MemoryBroker::new();
        let producer = MessageProducer::new(Arc::new(broker.producer()), topics(&["a", "b"]));
        producer.connect().await.unwrap();

        producer.send(&Payload::from("hello")).await.unwrap();

        assert_eq!(broker.published("a"), vec![b"hello".to_vec()]);
        assert_eq!(broker.published("b"), vec![b"hello".to_vec()]);
    }

    #[tokio::test]
    async fn structured_payload_is_published_as_json() {
        let broker = MemoryBroker::new();
        let producer = MessageProducer::new(Arc::new(broker.producer()), topics(&["register"]));
        producer.connect().await.unwrap();

        let payload = Payload::from(json!({"event_type": "create", "user_uuid": "abc"}));
        producer.send(&payload).await.unwrap();

        assert_eq!(
            broker.published("register"),
            vec![br#"{"event_type":"create","user_uuid":"abc"}"#.to_vec()]
        );
    }

    #[tokio::test]
    async fn send_before_connect_is_rejected() {
        let broker = MemoryBroker::new();
        let producer = MessageProducer::new(Arc::new(broker.producer()), topics(&["a"]));
        assert!(matches!(
            producer.send(&Payload::from("x")).await,
            Err(BrokerError::NotConnected)
        ));
    }

    /// Records publish order and fails on a chosen topic.
    struct RecordingTransport {
        order: Mutex<Vec<String>>,
        fail_on: &'static str,
    }

    #[async_trait]
    impl ProducerTransport for RecordingTransport {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn start(&self) -> Result<(), BrokerError> {
            Ok(())
        }

        async fn publish(&self, topic: &str, _payload: &[u8]) -> Result<(), BrokerError> {
            self.order.lock().push(topic.to_string());
            if topic == self.fail_on {
                return Err(BrokerError::Transport("leader not available".into()));
            }
            tokio::task::yield_now().await;
            Ok(())
        }

        async fn stop(&self) -> Result<(), BrokerError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn publishes_sequentially_and_stops_at_first_failure() {
        let transport = Arc::new(RecordingTransport {
            order: Mutex::new(Vec::new()),
            fail_on: "b",
        });
        let producer = MessageProducer::new(transport.clone(), topics(&["a", "b", "c"]));
        producer.connect().await.unwrap();

        let err = producer.send(&Payload::from("x")).await.unwrap_err();

        assert!(matches!(err, BrokerError::Transport(_)));
        assert_eq!(*transport.order.lock(), topics(&["a", "b"]));
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let broker = MemoryBroker::new();
        let producer = MessageProducer::new(Arc::new(broker.producer()), topics(&["a"]));
        producer.disconnect().await.unwrap();
        producer.connect().await.unwrap();
        producer.disconnect().await.unwrap();
        producer.disconnect().await.unwrap();
        assert!(!producer.is_connected());
    }
}
