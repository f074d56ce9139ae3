//! Kafka transports on `rdkafka`.
//!
//! Clients are created in `start` rather than at construction so a missing
//! broker only fails the service that needs it, when it starts. The consumer
//! never commits on its own: offsets are committed per message through
//! `ack`, after the handler has succeeded.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::{ClientConfig, Offset, TopicPartitionList};
use tracing::{info, warn};

use super::transport::{BrokerError, ConsumerTransport, InboundMessage, ProducerTransport};
use crate::service::config::BrokerConfig;

fn transport_error(context: &str, err: &rdkafka::error::KafkaError) -> BrokerError {
    BrokerError::Transport(format!("{context}: {err}"))
}

fn bootstrap_servers(config: &BrokerConfig) -> Result<String, BrokerError> {
    config
        .bootstrap_servers()
        .ok_or_else(|| BrokerError::Transport("no Kafka host configured".to_string()))
}

// ---------------------------------------------------------------------------
// Producer
// ---------------------------------------------------------------------------

/// Publishes through a [`FutureProducer`].
pub struct KafkaProducerTransport {
    client_config: ClientConfig,
    publish_timeout: Duration,
    producer: RwLock<Option<FutureProducer>>,
}

impl KafkaProducerTransport {
    /// # Errors
    ///
    /// Returns [`BrokerError::Transport`] if no host is configured.
    pub fn new(config: &BrokerConfig) -> Result<Self, BrokerError> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", bootstrap_servers(config)?)
            .set(
                "message.timeout.ms",
                config.publish_timeout.as_millis().to_string(),
            );
        Ok(Self {
            client_config,
            publish_timeout: config.publish_timeout,
            producer: RwLock::new(None),
        })
    }
}

#[async_trait]
impl ProducerTransport for KafkaProducerTransport {
    fn name(&self) -> &'static str {
        "kafka"
    }

    async fn start(&self) -> Result<(), BrokerError> {
        let producer: FutureProducer = self
            .client_config
            .create()
            .map_err(|e| transport_error("failed to create producer", &e))?;
        *self.producer.write() = Some(producer);
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), BrokerError> {
        let producer = self
            .producer
            .read()
            .clone()
            .ok_or(BrokerError::NotConnected)?;
        let record = FutureRecord::<(), [u8]>::to(topic).payload(payload);
        producer
            .send(record, self.publish_timeout)
            .await
            .map(|_| ())
            .map_err(|(e, _)| transport_error("publish failed", &e))
    }

    async fn stop(&self) -> Result<(), BrokerError> {
        let producer = self.producer.write().take();
        let Some(producer) = producer else {
            return Ok(());
        };
        let timeout = self.publish_timeout;
        // flush blocks on librdkafka; keep it off the runtime threads.
        tokio::task::spawn_blocking(move || producer.flush(timeout))
            .await
            .map_err(|e| BrokerError::Transport(format!("flush task failed: {e}")))?
            .map_err(|e| transport_error("flush failed", &e))
    }
}

// ---------------------------------------------------------------------------
// Consumer
// ---------------------------------------------------------------------------

/// Receives through a [`StreamConsumer`] in the configured group.
pub struct KafkaConsumerTransport {
    client_config: ClientConfig,
    consumer: RwLock<Option<Arc<StreamConsumer>>>,
}

impl KafkaConsumerTransport {
    /// # Errors
    ///
    /// Returns [`BrokerError::Transport`] if no host is configured.
    pub fn new(config: &BrokerConfig) -> Result<Self, BrokerError> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", bootstrap_servers(config)?)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", "earliest");
        Ok(Self {
            client_config,
            consumer: RwLock::new(None),
        })
    }

    fn current(&self) -> Result<Arc<StreamConsumer>, BrokerError> {
        self.consumer.read().clone().ok_or(BrokerError::NotConnected)
    }
}

#[async_trait]
impl ConsumerTransport for KafkaConsumerTransport {
    fn name(&self) -> &'static str {
        "kafka"
    }

    async fn start(&self) -> Result<(), BrokerError> {
        let consumer: StreamConsumer = self
            .client_config
            .create()
            .map_err(|e| transport_error("failed to create consumer", &e))?;
        *self.consumer.write() = Some(Arc::new(consumer));
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<(), BrokerError> {
        self.current()?
            .subscribe(&[topic])
            .map_err(|e| transport_error("failed to subscribe", &e))
    }

    async fn recv(&self) -> Result<InboundMessage, BrokerError> {
        let consumer = self.current()?;
        let message = consumer
            .recv()
            .await
            .map_err(|e| transport_error("receive failed", &e))?;
        if message.payload().is_none() {
            warn!(topic = message.topic(), offset = message.offset(), "message without payload");
        }
        Ok(InboundMessage {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            payload: message.payload().unwrap_or_default().to_vec(),
        })
    }

    async fn ack(&self, message: &InboundMessage) -> Result<(), BrokerError> {
        let consumer = self.current()?;
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(
            &message.topic,
            message.partition,
            Offset::Offset(message.offset + 1),
        )
        .map_err(|e| transport_error("invalid offset", &e))?;
        consumer
            .commit(&tpl, CommitMode::Async)
            .map_err(|e| transport_error("offset commit failed", &e))
    }

    async fn stop(&self) -> Result<(), BrokerError> {
        let consumer = self.consumer.write().take();
        if let Some(consumer) = consumer {
            consumer.unsubscribe();
            info!("Kafka consumer unsubscribed");
        }
        Ok(())
    }
}
