use alloy_primitives::B256;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Missing required configuration value: {key}")]
    Missing { key: String },
    #[error("Invalid configuration value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

/// The contract interface could not be obtained. Always fatal at startup.
#[derive(Error, Debug)]
pub enum InterfaceError {
    #[error("Interface source unreachable: {0}")]
    Unreachable(String),
    #[error("Malformed interface response: {reason}")]
    Malformed { reason: String },
    #[error("No interface registered for contract {address}: {message}")]
    NotFound { address: String, message: String },
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Unknown event signature: {signature}")]
    UnknownEvent { signature: B256 },
    #[error("Log has no topics")]
    MissingSignature,
    #[error("Log is missing topic {index} for indexed parameter '{param}'")]
    MissingTopic { param: String, index: usize },
    #[error("Log is missing required field: {field}")]
    MissingField { field: String },
    #[error("Failed to decode data of event '{event}': {reason}")]
    InvalidData { event: String, reason: String },
}

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("RPC error calling {method}: {reason}")]
    Request { method: String, reason: String },
    #[error("Failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },
}

#[derive(Error, Debug)]
pub enum SubscriptionError {
    #[error("Failed to open log subscription: {0}")]
    Subscribe(#[source] RpcError),
    #[error("Subscription lagged and dropped {0} logs")]
    Lagged(u64),
    #[error("Subscription closed by the node")]
    Closed,
    #[error("Giving up after {attempts} reconnect attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Failed to provision topic '{topic}': {reason}")]
    TopicProvisioning { topic: String, reason: String },
    #[error("Failed to deliver message with key {key} to topic '{topic}': {reason}")]
    Delivery {
        topic: String,
        key: String,
        reason: String,
    },
    #[error("Failed to create Kafka client: {0}")]
    Client(String),
    #[error("Failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("Checkpoint I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Corrupt checkpoint at {path}: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}
