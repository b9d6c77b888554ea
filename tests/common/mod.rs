#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use alloy_dyn_abi::DynSolValue;
use alloy_primitives::{Address, B256, Bytes, LogData, U256, address, keccak256};
use alloy_rpc_types_eth::{Filter, Log};
use futures::StreamExt;

use contract_event_relay::indexer::{
    ChainReader, LogStream, LogSubscriber, ReceiptInfo, TransactionInfo,
};
use contract_event_relay::models::errors::{PublishError, RpcError, SubscriptionError};
use contract_event_relay::models::interface::InterfaceDefinition;
use contract_event_relay::storage::EventPublisher;
use contract_event_relay::utils::retry::RetryConfig;

pub const CONTRACT: Address = address!("0x5FbDB2315678afecb367f032d93F642f64180aa3");
pub const FROM: Address = address!("0x1111111111111111111111111111111111111111");
pub const TO: Address = address!("0x2222222222222222222222222222222222222222");

pub const TRANSFER_ABI: &str = r#"[
    {"type":"event","name":"Transfer","anonymous":false,"inputs":[
        {"name":"from","type":"address","indexed":true},
        {"name":"to","type":"address","indexed":true},
        {"name":"value","type":"uint256","indexed":false}]}
]"#;

pub fn transfer_interface() -> InterfaceDefinition {
    InterfaceDefinition::from_json(TRANSFER_ABI).unwrap()
}

pub fn tx_hash(n: u64) -> B256 {
    B256::from(U256::from(n))
}

pub fn transfer_log(block: u64, log_index: u64, hash: B256, value: u64) -> Log {
    transfer_log_of(block, log_index, hash, U256::from(value))
}

pub fn transfer_log_of(block: u64, log_index: u64, hash: B256, value: U256) -> Log {
    make_log(
        block,
        log_index,
        hash,
        vec![
            keccak256("Transfer(address,address,uint256)"),
            FROM.into_word(),
            TO.into_word(),
        ],
        DynSolValue::Uint(value, 256).abi_encode(),
    )
}

pub fn unknown_log(block: u64, log_index: u64, hash: B256) -> Log {
    make_log(block, log_index, hash, vec![keccak256("Approval(address,address,uint256)")], vec![])
}

pub fn make_log(block: u64, log_index: u64, hash: B256, topics: Vec<B256>, data: Vec<u8>) -> Log {
    Log {
        inner: alloy_primitives::Log {
            address: CONTRACT,
            data: LogData::new_unchecked(topics, Bytes::from(data)),
        },
        block_number: Some(block),
        block_hash: Some(block_hash(block)),
        transaction_hash: Some(hash),
        log_index: Some(log_index),
        ..Default::default()
    }
}

/// Canonical hash of `block` in the mock chain.
pub fn block_hash(block: u64) -> B256 {
    keccak256(block.to_be_bytes())
}

pub fn fast_reconnect(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        base_delay_ms: 1,
        max_delay_ms: 1,
        exponential: 2.0,
    }
}

/// In-memory chain. Logs are served by block range like `eth_getLogs`.
#[derive(Default)]
pub struct MockChain {
    pub latest: Mutex<u64>,
    pub logs: Mutex<Vec<Log>>,
    /// Window queries starting at or after this block fail.
    pub fail_logs_from: Option<u64>,
    pub fail_lookups: bool,
    pub timestamps: HashMap<u64, u64>,
    pub transactions: HashMap<B256, TransactionInfo>,
    pub receipts: HashMap<B256, ReceiptInfo>,
    pub queried_windows: Mutex<Vec<(u64, u64)>>,
    pub transaction_lookups: AtomicUsize,
}

impl MockChain {
    pub fn at_height(latest: u64) -> Self {
        Self {
            latest: Mutex::new(latest),
            ..Default::default()
        }
    }

    pub fn set_latest(&self, latest: u64) {
        *self.latest.lock().unwrap() = latest;
    }

    pub fn add_log(&self, log: Log) {
        self.logs.lock().unwrap().push(log);
    }

    /// Registers a mined transaction with its block timestamp and receipt.
    pub fn with_mined(mut self, hash: B256, block: u64, gas_price: u128, gas_used: u64) -> Self {
        self.timestamps.insert(block, 1_709_294_400);
        self.transactions.insert(
            hash,
            TransactionInfo {
                gas_price: Some(gas_price),
                pending: false,
            },
        );
        self.receipts.insert(hash, ReceiptInfo { gas_used });
        self
    }

    pub fn windows(&self) -> Vec<(u64, u64)> {
        self.queried_windows.lock().unwrap().clone()
    }

    fn lookup_error(method: &str) -> RpcError {
        RpcError::Request {
            method: method.to_string(),
            reason: "node unavailable".to_string(),
        }
    }
}

impl ChainReader for MockChain {
    async fn latest_block_number(&self) -> Result<u64, RpcError> {
        Ok(*self.latest.lock().unwrap())
    }

    async fn logs(&self, filter: &Filter) -> Result<Vec<Log>, RpcError> {
        let from = filter.get_from_block().unwrap_or_default();
        let to = filter.get_to_block().unwrap_or(u64::MAX);
        self.queried_windows.lock().unwrap().push((from, to));

        if self.fail_logs_from.is_some_and(|fail| from >= fail) {
            return Err(Self::lookup_error("get_logs"));
        }

        Ok(self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|log| {
                log.block_number
                    .is_some_and(|block| block >= from && block <= to)
            })
            .cloned()
            .collect())
    }

    async fn block_timestamp(&self, block_number: u64) -> Result<Option<u64>, RpcError> {
        if self.fail_lookups {
            return Err(Self::lookup_error("get_block_by_number"));
        }
        Ok(self.timestamps.get(&block_number).copied())
    }

    async fn transaction(&self, hash: B256) -> Result<Option<TransactionInfo>, RpcError> {
        self.transaction_lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_lookups {
            return Err(Self::lookup_error("get_transaction_by_hash"));
        }
        Ok(self.transactions.get(&hash).copied())
    }

    async fn receipt(&self, hash: B256) -> Result<Option<ReceiptInfo>, RpcError> {
        if self.fail_lookups {
            return Err(Self::lookup_error("get_transaction_receipt"));
        }
        Ok(self.receipts.get(&hash).copied())
    }
}

/// Records every message instead of sending it.
#[derive(Default)]
pub struct MockPublisher {
    pub fail: bool,
    pub topics: Mutex<Vec<String>>,
    pub messages: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MockPublisher {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn messages(&self) -> Vec<(String, Vec<u8>)> {
        self.messages.lock().unwrap().clone()
    }

    pub fn payloads(&self) -> Vec<serde_json::Value> {
        self.messages()
            .iter()
            .map(|(_, payload)| serde_json::from_slice(payload).unwrap())
            .collect()
    }
}

impl EventPublisher for MockPublisher {
    async fn ensure_topic(&self, topic: &str) -> Result<(), PublishError> {
        let mut topics = self.topics.lock().unwrap();
        if !topics.iter().any(|t| t == topic) {
            topics.push(topic.to_string());
        }
        Ok(())
    }

    async fn publish(&self, key: &str, payload: &[u8]) -> Result<(), PublishError> {
        if self.fail {
            return Err(PublishError::Delivery {
                topic: "events".to_string(),
                key: key.to_string(),
                reason: "broker unavailable".to_string(),
            });
        }
        self.messages
            .lock()
            .unwrap()
            .push((key.to_string(), payload.to_vec()));
        Ok(())
    }
}

pub type Session = Result<Vec<Result<Log, SubscriptionError>>, SubscriptionError>;

/// Plays back scripted subscription sessions, one per `subscribe` call.
/// Once the script runs out every further call fails.
#[derive(Default)]
pub struct MockSubscriber {
    pub sessions: VecDeque<Session>,
    pub from_blocks: std::sync::Arc<Mutex<Vec<u64>>>,
}

impl MockSubscriber {
    pub fn new(sessions: Vec<Session>) -> Self {
        Self {
            sessions: sessions.into(),
            ..Default::default()
        }
    }
}

impl LogSubscriber for MockSubscriber {
    async fn subscribe(&mut self, filter: &Filter) -> Result<LogStream, SubscriptionError> {
        self.from_blocks
            .lock()
            .unwrap()
            .push(filter.get_from_block().unwrap_or_default());

        match self.sessions.pop_front() {
            Some(Ok(items)) => Ok(futures::stream::iter(items).boxed()),
            Some(Err(e)) => Err(e),
            None => Err(SubscriptionError::Subscribe(RpcError::Connect {
                url: "ws://mock".to_string(),
                reason: "connection refused".to_string(),
            })),
        }
    }
}
