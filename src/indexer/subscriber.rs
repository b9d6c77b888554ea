use alloy_rpc_types_eth::{Filter, Log};
use futures::StreamExt;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::indexer::scanner::HistoricalScanner;
use crate::indexer::{ChainReader, LogStream, LogSubscriber, RecordOutcome, SeenLogs};
use crate::models::errors::SubscriptionError;
use crate::storage::EventPublisher;
use crate::storage::checkpoint::Checkpoint;
use crate::utils::retry::RetryConfig;

/// Blocks below the cursor whose processed logs are still remembered, covering
/// nodes that replay recent logs on resubscribe and shallow reorgs.
pub const DEDUPE_DEPTH: u64 = 256;

/// Streams new events after the historical scan.
///
/// When the subscription fails, the subscriber waits with backoff, backfills the
/// blocks it missed through the scanner and subscribes again from the cursor.
/// A log is processed once per block hash: replays are skipped, while a
/// replacement re-emitted by a reorg is processed like any new log.
pub struct LiveSubscriber<'a, C, P, S> {
    scanner: &'a HistoricalScanner<'a, C, P>,
    source: S,
    reconnect: RetryConfig,
    checkpoint: Option<&'a Checkpoint>,
    cursor: u64,
    seen: SeenLogs,
}

impl<'a, C, P, S> LiveSubscriber<'a, C, P, S>
where
    C: ChainReader,
    P: EventPublisher,
    S: LogSubscriber,
{
    pub fn new(
        scanner: &'a HistoricalScanner<'a, C, P>,
        source: S,
        reconnect: RetryConfig,
        checkpoint: Option<&'a Checkpoint>,
    ) -> Self {
        Self {
            scanner,
            source,
            reconnect,
            checkpoint,
            cursor: 0,
            seen: SeenLogs::default(),
        }
    }

    /// Block the next subscription will start from.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Runs until the reconnect budget is exhausted. Never returns `Ok` on its own.
    ///
    /// Only failed subscribe calls count against the budget. A stream that drops
    /// after a successful subscribe always gets another reconnect.
    pub async fn listen(&mut self, from_block: u64) -> Result<(), SubscriptionError> {
        self.cursor = from_block;
        let mut failures: u32 = 0;

        loop {
            let filter = Filter::new()
                .address(self.scanner.contract())
                .from_block(self.cursor);

            let interruption = match self.source.subscribe(&filter).await {
                Ok(mut stream) => {
                    info!("Listening for new events from block {}", self.cursor);
                    failures = 0;
                    self.drain(&mut stream).await
                }
                Err(e) => {
                    failures += 1;
                    if self.reconnect.exhausted(failures) {
                        return Err(SubscriptionError::Exhausted {
                            attempts: failures,
                            last: e.to_string(),
                        });
                    }
                    e
                }
            };

            let delay = self.reconnect.delay_for(failures.max(1));
            warn!(
                "Subscription interrupted: {}. Reconnecting in {}ms ({} failed attempts)",
                interruption,
                delay.as_millis(),
                failures
            );
            if let Some(metrics) = self.scanner.pipeline().metrics() {
                metrics.subscription_reconnects.add(1, &metrics.labels());
            }
            sleep(delay).await;

            self.catch_up().await;
        }
    }

    /// Processes the stream until it yields an error or ends.
    async fn drain(&mut self, stream: &mut LogStream) -> SubscriptionError {
        while let Some(item) = stream.next().await {
            match item {
                Ok(log) => self.handle(log).await,
                Err(e) => return e,
            }
        }
        SubscriptionError::Closed
    }

    async fn handle(&mut self, log: Log) {
        if self.seen.contains(&log) {
            debug!(
                "Skipping already processed log {:?} in block {:?}",
                log.log_index, log.block_number
            );
            return;
        }
        self.seen.record(&log);

        let outcome = self.scanner.pipeline().process(log).await;

        if let Some(block) = outcome.matched_block() {
            self.cursor = self.cursor.max(block);
            self.forget_old_logs();
        }
        if let (RecordOutcome::Published { block_number }, Some(checkpoint)) =
            (outcome, self.checkpoint)
        {
            if let Err(e) = checkpoint.save(block_number).await {
                warn!("Failed to save checkpoint at block {}: {}", block_number, e);
            }
        }
    }

    /// Backfills logs emitted while the subscription was down.
    async fn catch_up(&mut self) {
        let head = match self.scanner.head().await {
            Ok(head) => head,
            Err(e) => {
                warn!("Skipping catch-up, chain head unavailable: {}", e);
                return;
            }
        };
        if head <= self.cursor {
            return;
        }

        info!("Catching up on blocks {} to {}", self.cursor, head);
        let progress = self
            .scanner
            .scan_windows(self.cursor, head, Some(&mut self.seen))
            .await;

        if let Some(block) = progress.last_matched_block {
            self.cursor = self.cursor.max(block);
        }
        if progress.completed {
            // Everything up to head has been seen; the subscription covers head onwards.
            self.cursor = self.cursor.max(head);
        }
        self.forget_old_logs();
    }

    fn forget_old_logs(&mut self) {
        self.seen.prune_below(self.cursor.saturating_sub(DEDUPE_DEPTH));
    }
}
