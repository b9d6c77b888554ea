use std::path::{Path, PathBuf};

use alloy_primitives::Address;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::models::errors::CheckpointError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointState {
    pub contract: Address,
    pub topic: String,
    pub block_number: u64,
    pub updated_at: i64,
}

/// Last processed block for one (contract, topic) pair, persisted as JSON.
///
/// Writes go to a sibling temp file which is then renamed over the target, so a
/// crash never leaves a half-written checkpoint behind.
pub struct Checkpoint {
    path: PathBuf,
    contract: Address,
    topic: String,
}

impl Checkpoint {
    pub fn new(path: impl Into<PathBuf>, contract: Address, topic: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            contract,
            topic: topic.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the stored block, or `None` when there is no checkpoint for this
    /// contract and topic yet.
    pub async fn load(&self) -> Result<Option<u64>, CheckpointError> {
        let contents = match tokio::fs::read(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No checkpoint at {}, starting fresh", self.path.display());
                return Ok(None);
            }
            Err(e) => return Err(self.io_error(e)),
        };

        let state: CheckpointState =
            serde_json::from_slice(&contents).map_err(|e| CheckpointError::Corrupt {
                path: self.path.display().to_string(),
                source: e,
            })?;

        if state.contract != self.contract || state.topic != self.topic {
            warn!(
                "Ignoring checkpoint at {} written for contract {} / topic '{}'",
                self.path.display(),
                state.contract,
                state.topic
            );
            return Ok(None);
        }

        info!(
            "Loaded checkpoint at block {} from {}",
            state.block_number,
            self.path.display()
        );
        Ok(Some(state.block_number))
    }

    pub async fn save(&self, block_number: u64) -> Result<(), CheckpointError> {
        let state = CheckpointState {
            contract: self.contract,
            topic: self.topic.clone(),
            block_number,
            updated_at: Utc::now().timestamp(),
        };
        let contents = serde_json::to_vec_pretty(&state).map_err(|e| CheckpointError::Corrupt {
            path: self.path.display().to_string(),
            source: e,
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        let temp = self.path.with_extension("tmp");
        tokio::fs::write(&temp, &contents)
            .await
            .map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| self.io_error(e))?;

        debug!("Checkpoint saved at block {}", block_number);
        Ok(())
    }

    fn io_error(&self, source: std::io::Error) -> CheckpointError {
        CheckpointError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

/// First block to scan: the configured start, or the checkpoint if it is further along.
pub fn resume_block(start_block: u64, checkpoint: Option<u64>) -> u64 {
    checkpoint.map_or(start_block, |saved| saved.max(start_block))
}
