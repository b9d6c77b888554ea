use std::time::Duration;

use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::error::RDKafkaErrorCode;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use tracing::{debug, info};

use crate::models::common::Config;
use crate::models::errors::PublishError;
use crate::storage::EventPublisher;

const ADMIN_TIMEOUT: Duration = Duration::from_secs(30);

pub struct KafkaPublisher {
    producer: FutureProducer,
    admin: AdminClient<DefaultClientContext>,
    topic: String,
    partitions: i32,
    replication_factor: i32,
    queue_timeout: Duration,
}

impl KafkaPublisher {
    pub fn new(config: &Config) -> Result<Self, PublishError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.kafka_broker)
            .set("acks", &config.kafka_acks)
            .set(
                "message.timeout.ms",
                config.kafka_message_timeout_ms.to_string(),
            )
            .create()
            .map_err(|e| PublishError::Client(e.to_string()))?;

        let admin: AdminClient<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", &config.kafka_broker)
            .create()
            .map_err(|e| PublishError::Client(e.to_string()))?;

        info!(
            "Kafka producer configured for {} (topic '{}', acks={})",
            config.kafka_broker, config.kafka_topic, config.kafka_acks
        );

        Ok(Self {
            producer,
            admin,
            topic: config.kafka_topic.clone(),
            partitions: config.kafka_partitions,
            replication_factor: config.kafka_replication_factor,
            queue_timeout: Duration::from_millis(config.kafka_message_timeout_ms),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Waits for in-flight messages to be delivered.
    pub fn flush(&self, timeout: Duration) -> Result<(), PublishError> {
        self.producer
            .flush(Timeout::After(timeout))
            .map_err(|e| PublishError::Client(e.to_string()))
    }
}

impl EventPublisher for KafkaPublisher {
    async fn ensure_topic(&self, topic: &str) -> Result<(), PublishError> {
        let new_topic = NewTopic::new(
            topic,
            self.partitions,
            TopicReplication::Fixed(self.replication_factor),
        );
        let options = AdminOptions::new().operation_timeout(Some(ADMIN_TIMEOUT));

        let results = self
            .admin
            .create_topics([&new_topic], &options)
            .await
            .map_err(|e| PublishError::TopicProvisioning {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;

        for result in results {
            match result {
                Ok(name) => info!("Created topic '{}'", name),
                Err((name, RDKafkaErrorCode::TopicAlreadyExists)) => {
                    info!("Topic '{}' already exists", name)
                }
                Err((name, code)) => {
                    return Err(PublishError::TopicProvisioning {
                        topic: name,
                        reason: code.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    async fn publish(&self, key: &str, payload: &[u8]) -> Result<(), PublishError> {
        let record = FutureRecord::to(&self.topic).key(key).payload(payload);

        match self
            .producer
            .send(record, Timeout::After(self.queue_timeout))
            .await
        {
            Ok(delivery) => {
                debug!(
                    "Delivered message {} to topic '{}': {:?}",
                    key, self.topic, delivery
                );
                Ok(())
            }
            Err((e, _message)) => Err(PublishError::Delivery {
                topic: self.topic.clone(),
                key: key.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}
