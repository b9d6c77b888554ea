pub mod decoder;
pub mod enricher;
pub mod interface;
pub mod rpc;
pub mod scanner;
pub mod subscriber;
pub mod values;

use std::collections::HashSet;
use std::future::Future;

use alloy_primitives::B256;
use alloy_rpc_types_eth::{Filter, Log};
use futures::stream::BoxStream;
use tracing::{debug, error, info, warn};

use crate::metrics::Metrics;
use crate::models::errors::{DecodeError, PublishError, RpcError, SubscriptionError};
use crate::models::events::{EnrichedEvent, RawLogRecord};
use crate::models::interface::InterfaceDefinition;
use crate::storage::EventPublisher;

/// Live log records followed by at most one terminal error.
pub type LogStream = BoxStream<'static, Result<Log, SubscriptionError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionInfo {
    pub gas_price: Option<u128>,
    pub pending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptInfo {
    pub gas_used: u64,
}

/// Read-only chain queries used by the scanner and the enricher.
pub trait ChainReader {
    fn latest_block_number(&self) -> impl Future<Output = Result<u64, RpcError>> + Send;

    fn logs(&self, filter: &Filter) -> impl Future<Output = Result<Vec<Log>, RpcError>> + Send;

    /// Unix timestamp of the block, `None` if the node does not know it.
    fn block_timestamp(
        &self,
        block_number: u64,
    ) -> impl Future<Output = Result<Option<u64>, RpcError>> + Send;

    fn transaction(
        &self,
        hash: B256,
    ) -> impl Future<Output = Result<Option<TransactionInfo>, RpcError>> + Send;

    fn receipt(&self, hash: B256)
    -> impl Future<Output = Result<Option<ReceiptInfo>, RpcError>> + Send;
}

/// Opens push-based log subscriptions. Each call may establish a fresh connection.
pub trait LogSubscriber {
    fn subscribe(
        &mut self,
        filter: &Filter,
    ) -> impl Future<Output = Result<LogStream, SubscriptionError>> + Send;
}

/// Identity of a log on one particular chain history.
///
/// A log that is reorged out and re-emitted in a different block gets a new
/// block hash, so the replacement never collides with the copy it replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LogKey {
    pub block_number: u64,
    pub block_hash: Option<B256>,
    pub transaction_hash: Option<B256>,
    pub log_index: u64,
}

impl LogKey {
    /// `None` for logs that lack a block number or log index.
    pub fn of(log: &Log) -> Option<Self> {
        Some(Self {
            block_number: log.block_number?,
            block_hash: log.block_hash,
            transaction_hash: log.transaction_hash,
            log_index: log.log_index?,
        })
    }
}

/// Logs already handed to the pipeline during the live phase.
#[derive(Debug, Default)]
pub struct SeenLogs {
    keys: HashSet<LogKey>,
}

impl SeenLogs {
    /// True if this exact log was already processed. Removed copies never count.
    pub fn contains(&self, log: &Log) -> bool {
        !log.removed && LogKey::of(log).is_some_and(|key| self.keys.contains(&key))
    }

    /// Remembers a processed log. A `removed` notice forgets the copy it retracts.
    pub fn record(&mut self, log: &Log) {
        let Some(key) = LogKey::of(log) else {
            return;
        };
        if log.removed {
            self.keys.remove(&key);
        } else {
            self.keys.insert(key);
        }
    }

    pub fn prune_below(&mut self, block_number: u64) {
        self.keys.retain(|key| key.block_number >= block_number);
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Published { block_number: u64 },
    PublishFailed { block_number: u64 },
    Skipped,
}

impl RecordOutcome {
    /// Block of a record that decoded against the interface, whether or not it published.
    pub fn matched_block(&self) -> Option<u64> {
        match self {
            Self::Published { block_number } | Self::PublishFailed { block_number } => {
                Some(*block_number)
            }
            Self::Skipped => None,
        }
    }
}

/// Decode -> enrich -> publish for one log record at a time.
pub struct EventPipeline<'a, C, P> {
    chain: &'a C,
    publisher: &'a P,
    interface: &'a InterfaceDefinition,
    metrics: Option<&'a Metrics>,
}

impl<'a, C, P> EventPipeline<'a, C, P>
where
    C: ChainReader,
    P: EventPublisher,
{
    pub fn new(
        chain: &'a C,
        publisher: &'a P,
        interface: &'a InterfaceDefinition,
        metrics: Option<&'a Metrics>,
    ) -> Self {
        Self {
            chain,
            publisher,
            interface,
            metrics,
        }
    }

    pub fn chain(&self) -> &'a C {
        self.chain
    }

    pub fn metrics(&self) -> Option<&'a Metrics> {
        self.metrics
    }

    pub async fn process(&self, log: Log) -> RecordOutcome {
        let record = match RawLogRecord::try_from(log) {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping log record: {}", e);
                self.record_skip("incomplete_log");
                return RecordOutcome::Skipped;
            }
        };

        if record.removed {
            warn!(
                "Skipping log removed by a reorg (block {}, tx {})",
                record.block_number, record.transaction_hash
            );
            self.record_skip("removed");
            return RecordOutcome::Skipped;
        }

        let decoded = match decoder::decode(&record, self.interface) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(
                    "Skipping log in block {} (tx {}): {}",
                    record.block_number, record.transaction_hash, e
                );
                self.record_skip(match e {
                    DecodeError::UnknownEvent { .. } => "unknown_event",
                    _ => "decode_error",
                });
                return RecordOutcome::Skipped;
            }
        };

        let block_number = decoded.block_number;
        let enriched = enricher::enrich(self.chain, decoded).await;

        match self.publish(&enriched).await {
            Ok(()) => {
                if let Some(metrics) = self.metrics {
                    metrics.events_published.add(1, &metrics.labels());
                    metrics
                        .latest_processed_block
                        .record(block_number, &metrics.labels());
                    if enriched.is_degraded() {
                        metrics.enrichment_degraded.add(1, &metrics.labels());
                    }
                }
                RecordOutcome::Published { block_number }
            }
            Err(e) => {
                error!(
                    "Failed to publish event '{}' from block {} (tx {}): {}",
                    enriched.decoded.event_name,
                    block_number,
                    enriched.decoded.transaction_hash,
                    e
                );
                if let Some(metrics) = self.metrics {
                    metrics.publish_errors.add(1, &metrics.labels());
                }
                RecordOutcome::PublishFailed { block_number }
            }
        }
    }

    async fn publish(&self, event: &EnrichedEvent) -> Result<(), PublishError> {
        let message = event.to_message();
        let payload = serde_json::to_vec(&message)?;

        self.publisher.publish(&message.tx_hash, &payload).await?;

        info!(
            "Published '{}' | block {} | tx {} | gas price {} | fee {} | timestamp {}",
            message.event,
            message.block,
            message.tx_hash,
            message.gas_price,
            message.transaction_fee,
            message.timestamp
        );
        if tracing::enabled!(tracing::Level::DEBUG) {
            if let Ok(pretty) = serde_json::to_string_pretty(&message.data) {
                debug!("Event data for tx {}:\n{}", message.tx_hash, pretty);
            }
        }

        Ok(())
    }

    fn record_skip(&self, reason: &'static str) {
        if let Some(metrics) = self.metrics {
            metrics.record_skip(reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_at(block: u64, block_hash: B256, log_index: u64) -> Log {
        Log {
            block_number: Some(block),
            block_hash: Some(block_hash),
            transaction_hash: Some(B256::repeat_byte(0x01)),
            log_index: Some(log_index),
            ..Default::default()
        }
    }

    #[test]
    fn replayed_log_is_seen() {
        let mut seen = SeenLogs::default();
        let log = log_at(10, B256::repeat_byte(0xaa), 0);
        assert!(!seen.contains(&log));
        seen.record(&log);
        assert!(seen.contains(&log));
    }

    #[test]
    fn reorg_replacement_at_same_position_is_new() {
        let mut seen = SeenLogs::default();
        let original = log_at(10, B256::repeat_byte(0xaa), 0);
        seen.record(&original);

        let mut retraction = original.clone();
        retraction.removed = true;
        assert!(!seen.contains(&retraction));
        seen.record(&retraction);
        assert!(seen.is_empty());

        let replacement = log_at(10, B256::repeat_byte(0xbb), 0);
        assert!(!seen.contains(&replacement));
    }

    #[test]
    fn pruning_keeps_recent_blocks() {
        let mut seen = SeenLogs::default();
        for block in 1..=5 {
            seen.record(&log_at(block, B256::repeat_byte(block as u8), 0));
        }
        seen.prune_below(4);
        assert_eq!(seen.len(), 2);
        assert!(seen.contains(&log_at(4, B256::repeat_byte(4), 0)));
        assert!(!seen.contains(&log_at(3, B256::repeat_byte(3), 0)));
    }
}
