pub mod checkpoint;
pub mod kafka;

use std::future::Future;

use crate::models::errors::PublishError;

/// Destination for serialized events.
pub trait EventPublisher {
    /// Creates the topic if it does not exist. An existing topic is not an error.
    fn ensure_topic(&self, topic: &str) -> impl Future<Output = Result<(), PublishError>> + Send;

    /// Sends one message keyed by `key` and waits for the broker to acknowledge it.
    fn publish(
        &self,
        key: &str,
        payload: &[u8],
    ) -> impl Future<Output = Result<(), PublishError>> + Send;
}
