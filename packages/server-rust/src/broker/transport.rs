//! Broker transport seam.
//!
//! [`ProducerTransport`] and [`ConsumerTransport`] hide the wire client
//! (Kafka, or the in-process [`MemoryBroker`](super::memory::MemoryBroker))
//! from the producer and consumer that sit on top. Transports move opaque
//! bytes; encoding and decoding happen one layer up.

use async_trait::async_trait;
use profile_core::CodecError;

/// Broker failures surfaced by the producer and consumer.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("broker session is not connected")]
    NotConnected,
    #[error("consumer must subscribe to exactly one topic, got none")]
    NoTopic,
    #[error("broker transport error: {0}")]
    Transport(String),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("message handler failed: {0:#}")]
    Handler(anyhow::Error),
}

/// A message pulled from the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: Vec<u8>,
}

/// Publishing side of a broker session.
#[async_trait]
pub trait ProducerTransport: Send + Sync {
    fn name(&self) -> &'static str;

    /// Opens the session.
    async fn start(&self) -> Result<(), BrokerError>;

    /// Publishes `payload` to `topic` and waits for the acknowledgement.
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), BrokerError>;

    /// Flushes pending publishes and closes the session.
    async fn stop(&self) -> Result<(), BrokerError>;
}

/// Receiving side of a broker session.
#[async_trait]
pub trait ConsumerTransport: Send + Sync {
    fn name(&self) -> &'static str;

    /// Opens the session.
    async fn start(&self) -> Result<(), BrokerError>;

    /// Binds the session to `topic`. Replaces any previous subscription.
    async fn subscribe(&self, topic: &str) -> Result<(), BrokerError>;

    /// Waits for the next message on the subscribed topic.
    async fn recv(&self) -> Result<InboundMessage, BrokerError>;

    /// Marks `message` as processed so the group resumes after it. A
    /// message that is never acknowledged is delivered again to the next
    /// session.
    async fn ack(&self, message: &InboundMessage) -> Result<(), BrokerError>;

    /// Leaves the subscription and closes the session.
    async fn stop(&self) -> Result<(), BrokerError>;
}
