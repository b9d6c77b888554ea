use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::models::errors::ConfigError;

pub const DEFAULT_BATCH_SIZE: u64 = 50_000;
pub const DEFAULT_ETHERSCAN_API_URL: &str = "https://api-sepolia.etherscan.io/api";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub address: String,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "0.0.0.0".to_string(),
            port: 9100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// 0 retries forever
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Required
    pub ethereum_rpc_url: String,
    pub ethereum_ws_url: String,
    pub contract_address: String,
    pub kafka_broker: String,
    pub kafka_topic: String,
    pub api_key_etherscan: String,

    // Optional
    #[serde(default)]
    pub start_block: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    #[serde(default = "default_etherscan_api_url")]
    pub etherscan_api_url: String,
    #[serde(default = "default_one")]
    pub kafka_partitions: i32,
    #[serde(default = "default_one")]
    pub kafka_replication_factor: i32,
    #[serde(default = "default_acks")]
    pub kafka_acks: String,
    #[serde(default = "default_message_timeout_ms")]
    pub kafka_message_timeout_ms: u64,
    #[serde(default)]
    pub checkpoint_path: Option<String>,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

fn default_batch_size() -> u64 {
    DEFAULT_BATCH_SIZE
}

fn default_etherscan_api_url() -> String {
    DEFAULT_ETHERSCAN_API_URL.to_string()
}

fn default_one() -> i32 {
    1
}

fn default_acks() -> String {
    "all".to_string()
}

fn default_message_timeout_ms() -> u64 {
    30_000
}

impl Config {
    /// Rejects empty required values and values that cannot be used as-is.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("ETHEREUM_RPC_URL", &self.ethereum_rpc_url),
            ("ETHEREUM_WS_URL", &self.ethereum_ws_url),
            ("CONTRACT_ADDRESS", &self.contract_address),
            ("KAFKA_BROKER", &self.kafka_broker),
            ("KAFKA_TOPIC", &self.kafka_topic),
            ("API_KEY_ETHERSCAN", &self.api_key_etherscan),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing {
                    key: key.to_string(),
                });
            }
        }

        self.contract()?;

        for (key, value) in [
            ("ETHEREUM_RPC_URL", &self.ethereum_rpc_url),
            ("ETHEREUM_WS_URL", &self.ethereum_ws_url),
        ] {
            url::Url::parse(value).map_err(|e| ConfigError::Invalid {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        }

        if self.batch_size == 0 {
            return Err(ConfigError::Invalid {
                key: "BATCH_SIZE".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.kafka_partitions < 1 || self.kafka_replication_factor < 1 {
            return Err(ConfigError::Invalid {
                key: "KAFKA_PARTITIONS/KAFKA_REPLICATION_FACTOR".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(())
    }

    pub fn contract(&self) -> Result<Address, ConfigError> {
        self.contract_address
            .trim()
            .parse::<Address>()
            .map_err(|e| ConfigError::Invalid {
                key: "CONTRACT_ADDRESS".to_string(),
                reason: e.to_string(),
            })
    }
}
