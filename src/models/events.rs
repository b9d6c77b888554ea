use std::collections::BTreeMap;

use alloy_primitives::{Address, B256, Bytes};
use alloy_rpc_types_eth::Log;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::errors::DecodeError;

/// Sentinel for enrichment fields that could not be computed.
pub const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLogRecord {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: u64,
    pub transaction_hash: B256,
    pub log_index: Option<u64>,
    pub removed: bool,
}

impl TryFrom<Log> for RawLogRecord {
    type Error = DecodeError;

    fn try_from(log: Log) -> Result<Self, Self::Error> {
        // Pending logs have neither a block number nor a transaction hash yet.
        let block_number = log.block_number.ok_or_else(|| DecodeError::MissingField {
            field: "blockNumber".to_string(),
        })?;
        let transaction_hash = log
            .transaction_hash
            .ok_or_else(|| DecodeError::MissingField {
                field: "transactionHash".to_string(),
            })?;

        Ok(Self {
            address: log.inner.address,
            topics: log.inner.data.topics().to_vec(),
            data: log.inner.data.data.clone(),
            block_number,
            transaction_hash,
            log_index: log.log_index,
            removed: log.removed,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEvent {
    pub event_name: String,
    /// Sorted by name so serialization is deterministic.
    pub parameters: BTreeMap<String, Value>,
    pub block_number: u64,
    pub transaction_hash: B256,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedEvent {
    pub decoded: DecodedEvent,
    pub timestamp: String,
    pub gas_price: String,
    pub transaction_fee: String,
}

impl EnrichedEvent {
    pub fn is_degraded(&self) -> bool {
        [&self.timestamp, &self.gas_price, &self.transaction_fee]
            .iter()
            .any(|field| field.as_str() == NOT_AVAILABLE)
    }

    pub fn to_message(&self) -> EventMessage {
        EventMessage {
            event: self.decoded.event_name.clone(),
            data: self.decoded.parameters.clone(),
            timestamp: self.timestamp.clone(),
            tx_hash: self.decoded.transaction_hash.to_string(),
            block: self.decoded.block_number,
            gas_price: self.gas_price.clone(),
            transaction_fee: self.transaction_fee.clone(),
        }
    }
}

/// Wire format of a published event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    #[serde(rename = "Evento")]
    pub event: String,
    #[serde(rename = "Dados")]
    pub data: BTreeMap<String, Value>,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "TxHash")]
    pub tx_hash: String,
    #[serde(rename = "Bloco")]
    pub block: u64,
    #[serde(rename = "GasPrice")]
    pub gas_price: String,
    #[serde(rename = "TaxaTransacao")]
    pub transaction_fee: String,
}
