use serde::Serialize;
use tracing::info;

#[cfg(feature = "kafka")]
use rdkafka::config::ClientConfig;
#[cfg(feature = "kafka")]
use rdkafka::producer::{FutureProducer, FutureRecord};
#[cfg(feature = "kafka")]
use rdkafka::util::Timeout;
#[cfg(feature = "kafka")]
use std::time::Duration;
#[cfg(feature = "kafka")]
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("Failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
    #[cfg(feature = "kafka")]
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),
}

/// Publishes domain events. Without the `kafka` feature, or without brokers
/// configured, events are only logged.
#[derive(Clone)]
pub struct EventProducer {
    #[cfg(feature = "kafka")]
    producer: Option<FutureProducer>,
}

impl EventProducer {
    pub fn disabled() -> Self {
        Self {
            #[cfg(feature = "kafka")]
            producer: None,
        }
    }

    #[cfg(feature = "kafka")]
    pub fn new(brokers: Option<&str>) -> Result<Self, EventError> {
        let Some(brokers) = brokers else {
            return Ok(Self::disabled());
        };
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self { producer: Some(producer) })
    }

    #[cfg(not(feature = "kafka"))]
    pub fn new(brokers: Option<&str>) -> Result<Self, EventError> {
        if brokers.is_some() {
            tracing::warn!("Kafka brokers configured but the `kafka` feature is off; events will only be logged");
        }
        Ok(Self::disabled())
    }

    #[cfg(feature = "kafka")]
    pub fn is_enabled(&self) -> bool {
        self.producer.is_some()
    }

    #[cfg(not(feature = "kafka"))]
    pub fn is_enabled(&self) -> bool {
        false
    }

    pub async fn publish_json<T: Serialize>(&self, topic: &str, key: &str, event: &T) -> Result<(), EventError> {
        let payload = serde_json::to_string(event)?;
        self.publish(topic, key, &payload).await
    }

    pub async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), EventError> {
        #[cfg(feature = "kafka")]
        if let Some(producer) = &self.producer {
            let record = FutureRecord::to(topic).key(key).payload(payload);

            return match producer.send(record, Timeout::After(Duration::from_secs(0))).await {
                Ok(delivery) => {
                    info!(
                        "Sent message to {}/{}: partition {} offset {}",
                        topic, key, delivery.partition, delivery.offset
                    );
                    Ok(())
                }
                Err((e, _msg)) => {
                    error!("Failed to send message to {}: {}", topic, e);
                    Err(e.into())
                }
            };
        }

        info!("Event {} [{}]: {}", topic, key, payload);
        Ok(())
    }
}
