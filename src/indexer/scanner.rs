use alloy_primitives::Address;
use alloy_rpc_types_eth::Filter;
use tracing::{debug, error, info, warn};

use crate::indexer::{ChainReader, EventPipeline, SeenLogs};
use crate::models::errors::RpcError;
use crate::storage::EventPublisher;
use crate::storage::checkpoint::Checkpoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockWindow {
    pub from_block: u64,
    pub to_block: u64,
}

/// Consecutive inclusive windows of at most `batch_size + 1` blocks, starting
/// at `from_block`, while the window start is below `head`.
pub fn block_windows(from_block: u64, head: u64, batch_size: u64) -> BlockWindows {
    BlockWindows {
        next_from: from_block,
        head,
        batch_size,
    }
}

#[derive(Debug, Clone)]
pub struct BlockWindows {
    next_from: u64,
    head: u64,
    batch_size: u64,
}

impl Iterator for BlockWindows {
    type Item = BlockWindow;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_from >= self.head {
            return None;
        }
        let window = BlockWindow {
            from_block: self.next_from,
            to_block: self.next_from.saturating_add(self.batch_size).min(self.head),
        };
        // to_block <= head < u64::MAX, so this cannot overflow.
        self.next_from = window.to_block + 1;
        Some(window)
    }
}

/// Result of walking a range of windows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanProgress {
    /// Highest block containing a log that matched the interface.
    pub last_matched_block: Option<u64>,
    /// False when a window query failed and the walk stopped early.
    pub completed: bool,
}

/// Backfills historical events in fixed-size block windows.
pub struct HistoricalScanner<'a, C, P> {
    pipeline: &'a EventPipeline<'a, C, P>,
    contract: Address,
    batch_size: u64,
    checkpoint: Option<&'a Checkpoint>,
}

impl<'a, C, P> HistoricalScanner<'a, C, P>
where
    C: ChainReader,
    P: EventPublisher,
{
    pub fn new(
        pipeline: &'a EventPipeline<'a, C, P>,
        contract: Address,
        batch_size: u64,
        checkpoint: Option<&'a Checkpoint>,
    ) -> Self {
        Self {
            pipeline,
            contract,
            batch_size,
            checkpoint,
        }
    }

    pub fn pipeline(&self) -> &'a EventPipeline<'a, C, P> {
        self.pipeline
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    /// Scans `[from_block, head]` and returns the block the live subscription
    /// should start from: the highest matched block, or the head if nothing matched.
    pub async fn scan(&self, from_block: u64) -> Result<u64, RpcError> {
        let head = self.head().await?;
        info!(
            "Scanning blocks {} to {} for contract {} in batches of {}",
            from_block, head, self.contract, self.batch_size
        );

        let progress = self.scan_windows(from_block, head, None).await;
        let cursor = progress.last_matched_block.unwrap_or(head);

        info!(
            "Historical scan finished{}; live subscription starts at block {}",
            if progress.completed { "" } else { " early" },
            cursor
        );
        Ok(cursor)
    }

    /// Latest block number reported by the chain.
    pub async fn head(&self) -> Result<u64, RpcError> {
        let latest = self.pipeline.chain().latest_block_number().await?;
        if let Some(metrics) = self.pipeline.metrics() {
            metrics.chain_tip_block.record(latest, &metrics.labels());
        }
        Ok(latest)
    }

    /// Walks the windows between `from_block` and `head`. When `seen` is given,
    /// logs it already holds are skipped and every processed log is added to it.
    /// A failed window stops the walk.
    pub async fn scan_windows(
        &self,
        from_block: u64,
        head: u64,
        mut seen: Option<&mut SeenLogs>,
    ) -> ScanProgress {
        let mut progress = ScanProgress::default();

        for window in block_windows(from_block, head, self.batch_size) {
            let filter = Filter::new()
                .address(self.contract)
                .from_block(window.from_block)
                .to_block(window.to_block);

            let logs = match self.pipeline.chain().logs(&filter).await {
                Ok(logs) => logs,
                Err(e) => {
                    error!(
                        "Failed to fetch logs for blocks {} to {}: {}. Stopping historical scan",
                        window.from_block, window.to_block, e
                    );
                    return progress;
                }
            };
            debug!(
                "Blocks {} to {}: {} logs",
                window.from_block,
                window.to_block,
                logs.len()
            );

            for log in logs {
                if let Some(seen) = seen.as_deref_mut() {
                    if seen.contains(&log) {
                        debug!(
                            "Skipping already processed log {:?} in block {:?}",
                            log.log_index, log.block_number
                        );
                        continue;
                    }
                    seen.record(&log);
                }

                let outcome = self.pipeline.process(log).await;
                if let Some(block) = outcome.matched_block() {
                    progress.last_matched_block =
                        Some(progress.last_matched_block.map_or(block, |last| last.max(block)));
                }
            }

            if let Some(checkpoint) = self.checkpoint {
                if let Err(e) = checkpoint.save(window.to_block).await {
                    warn!("Failed to save checkpoint at block {}: {}", window.to_block, e);
                }
            }
        }

        progress.completed = true;
        progress
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn windows(from: u64, head: u64, batch: u64) -> Vec<(u64, u64)> {
        block_windows(from, head, batch)
            .map(|w| (w.from_block, w.to_block))
            .collect()
    }

    #[test]
    fn splits_range_into_inclusive_windows() {
        assert_eq!(windows(100, 250, 100), [(100, 200), (201, 250)]);
    }

    #[test]
    fn single_window_when_batch_covers_range() {
        assert_eq!(windows(0, 10, 50_000), [(0, 10)]);
    }

    #[test]
    fn no_windows_when_start_reaches_head() {
        assert!(windows(250, 250, 100).is_empty());
        assert!(windows(300, 250, 100).is_empty());
    }

    #[test]
    fn windows_are_contiguous_and_bounded() {
        let all = windows(7, 1_000, 33);
        assert_eq!(all.first().map(|w| w.0), Some(7));
        assert_eq!(all.last().map(|w| w.1), Some(1_000));
        for pair in all.windows(2) {
            assert_eq!(pair[1].0, pair[0].1 + 1);
        }
        assert!(all.iter().all(|(from, to)| to - from <= 33));
    }

    #[test]
    fn huge_batch_does_not_overflow() {
        assert_eq!(windows(5, u64::MAX - 1, u64::MAX), [(5, u64::MAX - 1)]);
    }
}
