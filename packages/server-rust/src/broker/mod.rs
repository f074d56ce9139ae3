//! Stream channel: a producer/consumer pair over a message broker.
//!
//! - [`transport`]: the [`ProducerTransport`] / [`ConsumerTransport`] seam
//! - [`memory`]: in-process [`MemoryBroker`]
//! - `kafka`: `rdkafka` transports (feature `kafka`)
//! - [`producer`]: [`MessageProducer`], sequential publish to every topic
//! - [`consumer`]: [`MessageConsumer`], single-topic ordered consume loop

pub mod consumer;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod memory;
pub mod producer;
pub mod transport;

use std::sync::Arc;

pub use consumer::{MessageConsumer, MessageHandler};
#[cfg(feature = "kafka")]
pub use kafka::{KafkaConsumerTransport, KafkaProducerTransport};
pub use memory::{MemoryBroker, MemoryConsumer, MemoryProducer};
pub use producer::MessageProducer;
pub use transport::{BrokerError, ConsumerTransport, InboundMessage, ProducerTransport};

use crate::service::config::BrokerConfig;

/// Producer and consumer transports for one service instance.
pub struct Transports {
    pub producer: Arc<dyn ProducerTransport>,
    pub consumer: Arc<dyn ConsumerTransport>,
}

/// Builds the transports selected by `config`.
///
/// A configured host selects Kafka. Otherwise both sides share one
/// in-process [`MemoryBroker`], so produced messages loop back to the
/// local consumer.
///
/// # Errors
///
/// Returns [`BrokerError::Transport`] when a host is configured but the
/// `kafka` feature is disabled.
pub fn transports_from_config(config: &BrokerConfig) -> Result<Transports, BrokerError> {
    if config.host.is_some() {
        #[cfg(feature = "kafka")]
        {
            return Ok(Transports {
                producer: Arc::new(KafkaProducerTransport::new(config)?),
                consumer: Arc::new(KafkaConsumerTransport::new(config)?),
            });
        }
        #[cfg(not(feature = "kafka"))]
        {
            return Err(BrokerError::Transport(
                "built without the `kafka` feature".to_string(),
            ));
        }
    }
    let broker = MemoryBroker::new();
    Ok(Transports {
        producer: Arc::new(broker.producer()),
        consumer: Arc::new(broker.consumer()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_host_selects_memory_transports() {
        let transports = transports_from_config(&BrokerConfig::default()).unwrap();
        assert_eq!(transports.producer.name(), "memory");
        assert_eq!(transports.consumer.name(), "memory");
    }

    #[cfg(not(feature = "kafka"))]
    #[test]
    fn host_without_kafka_feature_is_rejected() {
        let config = BrokerConfig {
            host: Some("kafka".to_string()),
            ..BrokerConfig::default()
        };
        assert!(transports_from_config(&config).is_err());
    }
}
