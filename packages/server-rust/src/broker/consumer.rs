//! Inbound half of the stream channel.
//!
//! The consume loop pulls one message, decodes it, and awaits the handler
//! before pulling the next. Nothing is fetched ahead, so the handler sees
//! messages in broker order and a slow handler slows consumption. A message
//! is acknowledged only after its handler succeeds. Decode and handler
//! failures end the loop unacknowledged and are returned to the caller, so
//! the broker delivers the message again to the next session.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use profile_core::decode_payload;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::transport::{BrokerError, ConsumerTransport};

/// The one callback shape the consumer accepts: an async function from a
/// decoded JSON payload to a result.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, payload: serde_json::Value) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> MessageHandler for F
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn handle(&self, payload: serde_json::Value) -> anyhow::Result<()> {
        self(payload).await
    }
}

/// Subscribes to a single topic and feeds its messages to a handler.
pub struct MessageConsumer {
    transport: Arc<dyn ConsumerTransport>,
    topic: Mutex<Option<String>>,
}

impl MessageConsumer {
    #[must_use]
    pub fn new(transport: Arc<dyn ConsumerTransport>) -> Self {
        Self {
            transport,
            topic: Mutex::new(None),
        }
    }

    /// The subscribed topic, once connected.
    #[must_use]
    pub fn topic(&self) -> Option<String> {
        self.topic.lock().clone()
    }

    /// Opens the broker session and subscribes to `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::NoTopic`] for a blank topic, before touching
    /// the broker, or the transport's error if the session or subscription
    /// fails.
    pub async fn connect(&self, topic: &str) -> Result<(), BrokerError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(BrokerError::NoTopic);
        }
        self.transport.start().await?;
        self.transport.subscribe(topic).await?;
        *self.topic.lock() = Some(topic.to_string());
        info!(transport = self.transport.name(), topic, "consumer subscribed");
        Ok(())
    }

    /// Runs the receive loop until `cancel` fires or a message fails.
    ///
    /// Cancellation is observed only while waiting for the next message; a
    /// handler invocation in progress always runs to completion.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::NotConnected`] before [`connect`](Self::connect),
    /// the transport's receive error, [`BrokerError::Codec`] for a payload
    /// that is not JSON, or [`BrokerError::Handler`] for a handler failure.
    pub async fn init_consuming(
        &self,
        handler: &dyn MessageHandler,
        cancel: &CancellationToken,
    ) -> Result<(), BrokerError> {
        let Some(topic) = self.topic() else {
            return Err(BrokerError::NotConnected);
        };
        info!(topic = %topic, "consume loop started");

        loop {
            let message = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!(topic = %topic, "consume loop cancelled");
                    return Ok(());
                }
                message = self.transport.recv() => message?,
            };

            let payload = decode_payload(&message.payload).inspect_err(|e| {
                error!(
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    error = %e,
                    "undecodable message, stopping consumer"
                );
            })?;

            if let Err(e) = handler.handle(payload).await {
                error!(
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    error = %format!("{e:#}"),
                    "handler failed, stopping consumer"
                );
                return Err(BrokerError::Handler(e));
            }

            self.transport.ack(&message).await?;
            debug!(topic = %message.topic, offset = message.offset, "message handled");
            metrics::counter!("broker_messages_consumed_total", "topic" => message.topic)
                .increment(1);
        }
    }

    /// Leaves the subscription and closes the session. Safe to call when not
    /// connected.
    ///
    /// # Errors
    ///
    /// Returns the transport's error if closing fails.
    pub async fn disconnect(&self) -> Result<(), BrokerError> {
        if self.topic.lock().take().is_none() {
            return Ok(());
        }
        self.transport.stop().await?;
        info!(transport = self.transport.name(), "consumer disconnected");
        Ok(())
    }
}

impl std::fmt::Debug for MessageConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageConsumer")
            .field("transport", &self.transport.name())
            .field("topic", &self.topic())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use profile_core::Payload;
    use serde_json::{json, Value};

    use super::*;
    use crate::broker::memory::MemoryBroker;
    use crate::broker::producer::MessageProducer;

    fn consumer_on(broker: &Arc<MemoryBroker>) -> MessageConsumer {
        MessageConsumer::new(Arc::new(broker.consumer()))
    }

    #[tokio::test]
    async fn blank_topic_fails_fast() {
        let broker = MemoryBroker::new();
        let consumer = consumer_on(&broker);
        assert!(matches!(consumer.connect("").await, Err(BrokerError::NoTopic)));
        assert!(matches!(consumer.connect("   ").await, Err(BrokerError::NoTopic)));
        assert!(consumer.topic().is_none());
    }

    #[tokio::test]
    async fn consuming_before_connect_is_rejected() {
        let broker = MemoryBroker::new();
        let consumer = consumer_on(&broker);
        let handler = |_: Value| async { anyhow::Ok(()) };
        let result = consumer
            .init_consuming(&handler, &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(BrokerError::NotConnected)));
    }

    #[tokio::test]
    async fn handler_receives_parsed_mapping() {
        let broker = MemoryBroker::new();
        let producer = MessageProducer::new(Arc::new(broker.producer()), vec!["register".into()]);
        producer.connect().await.unwrap();
        producer
            .send(&Payload::from(json!({"event_type": "create", "user_uuid": "abc"})))
            .await
            .unwrap();

        let consumer = consumer_on(&broker);
        consumer.connect("register").await.unwrap();

        let seen = Mutex::new(Vec::new());
        let cancel = CancellationToken::new();
        let handler = |payload: Value| {
            seen.lock().push(payload);
            cancel.cancel();
            async { anyhow::Ok(()) }
        };
        consumer.init_consuming(&handler, &cancel).await.unwrap();

        assert_eq!(
            *seen.lock(),
            vec![json!({"event_type": "create", "user_uuid": "abc"})]
        );
    }

    #[tokio::test]
    async fn handler_runs_in_order_one_at_a_time() {
        let broker = MemoryBroker::new();
        for i in 1..=3 {
            broker.append("t", format!("{{\"n\":{i}}}").as_bytes());
        }
        let consumer = consumer_on(&broker);
        consumer.connect("t").await.unwrap();

        let in_flight = AtomicUsize::new(0);
        let log = Mutex::new(Vec::new());
        let cancel = CancellationToken::new();
        let handler = |payload: Value| {
            let (in_flight, log, cancel) = (&in_flight, &log, &cancel);
            async move {
                assert_eq!(in_flight.fetch_add(1, Ordering::SeqCst), 0, "overlapping handlers");
                tokio::time::sleep(Duration::from_millis(5)).await;
                let n = payload["n"].as_i64().unwrap_or_default();
                log.lock().push(n);
                in_flight.fetch_sub(1, Ordering::SeqCst);
                if n == 3 {
                    cancel.cancel();
                }
                anyhow::Ok(())
            }
        };
        consumer.init_consuming(&handler, &cancel).await.unwrap();

        assert_eq!(*log.lock(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn handler_error_stops_the_loop() {
        let broker = MemoryBroker::new();
        broker.append("t", b"{\"n\":1}");
        broker.append("t", b"{\"n\":2}");
        let consumer = consumer_on(&broker);
        consumer.connect("t").await.unwrap();

        let calls = AtomicUsize::new(0);
        let handler = |_: Value| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(anyhow::anyhow!("profile store down")) }
        };
        let err = consumer
            .init_consuming(&handler, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, BrokerError::Handler(_)));
        assert!(err.to_string().contains("profile store down"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn malformed_payload_is_a_codec_error() {
        let broker = MemoryBroker::new();
        broker.append("t", b"{not json");
        let consumer = consumer_on(&broker);
        consumer.connect("t").await.unwrap();

        let handler = |_: Value| async { anyhow::Ok(()) };
        let err = consumer
            .init_consuming(&handler, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::Codec(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_an_idle_loop() {
        let broker = MemoryBroker::new();
        let consumer = consumer_on(&broker);
        consumer.connect("quiet").await.unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let handler = |_: Value| async { anyhow::Ok(()) };
        consumer.init_consuming(&handler, &cancel).await.unwrap();
        consumer.disconnect().await.unwrap();
        assert!(consumer.topic().is_none());
    }

    #[tokio::test]
    async fn failed_message_is_redelivered_to_a_fresh_consumer() {
        let broker = MemoryBroker::new();
        broker.append("t", b"{\"n\":1}");
        broker.append("t", b"{\"n\":2}");

        let first = consumer_on(&broker);
        first.connect("t").await.unwrap();
        let handler = |payload: Value| async move {
            if payload["n"] == 2 {
                anyhow::bail!("profile store down");
            }
            anyhow::Ok(())
        };
        let err = first
            .init_consuming(&handler, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::Handler(_)));
        first.disconnect().await.unwrap();

        let second = consumer_on(&broker);
        second.connect("t").await.unwrap();
        let seen = Mutex::new(Vec::new());
        let cancel = CancellationToken::new();
        let handler = |payload: Value| {
            seen.lock().push(payload);
            cancel.cancel();
            async { anyhow::Ok(()) }
        };
        second.init_consuming(&handler, &cancel).await.unwrap();

        assert_eq!(*seen.lock(), vec![json!({"n": 2})]);
        assert_eq!(broker.committed("t"), 2);
    }
}
