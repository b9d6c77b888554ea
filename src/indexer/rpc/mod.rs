pub mod subscription;

use std::future::IntoFuture;
use std::time::Instant;

use alloy_consensus::Transaction as _;
use alloy_eips::BlockNumberOrTag;
use alloy_primitives::B256;
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_rpc_types_eth::{Filter, Log};
use alloy_transport::TransportResult;
use tracing::warn;
use url::Url;

use crate::indexer::{ChainReader, ReceiptInfo, TransactionInfo};
use crate::metrics::Metrics;
use crate::models::errors::RpcError;
use crate::utils::strip_html;

/// [`ChainReader`] over an HTTP JSON-RPC endpoint.
pub struct AlloyChainReader<'a> {
    provider: DynProvider,
    metrics: Option<&'a Metrics>,
}

impl<'a> AlloyChainReader<'a> {
    pub fn connect_http(rpc_url: &str, metrics: Option<&'a Metrics>) -> Result<Self, RpcError> {
        let url: Url = rpc_url.parse().map_err(|e: url::ParseError| RpcError::Connect {
            url: rpc_url.to_string(),
            reason: e.to_string(),
        })?;
        let provider = ProviderBuilder::new().connect_http(url).erased();
        Ok(Self { provider, metrics })
    }

    pub fn from_provider(provider: DynProvider, metrics: Option<&'a Metrics>) -> Self {
        Self { provider, metrics }
    }

    pub async fn chain_id(&self) -> Result<u64, RpcError> {
        instrumented(self.metrics, "get_chain_id", self.provider.get_chain_id()).await
    }
}

impl ChainReader for AlloyChainReader<'_> {
    async fn latest_block_number(&self) -> Result<u64, RpcError> {
        instrumented(self.metrics, "get_block_number", self.provider.get_block_number()).await
    }

    async fn logs(&self, filter: &Filter) -> Result<Vec<Log>, RpcError> {
        instrumented(self.metrics, "get_logs", self.provider.get_logs(filter)).await
    }

    async fn block_timestamp(&self, block_number: u64) -> Result<Option<u64>, RpcError> {
        let block = instrumented(
            self.metrics,
            "get_block_by_number",
            self.provider
                .get_block_by_number(BlockNumberOrTag::Number(block_number)),
        )
        .await?;
        Ok(block.map(|block| block.header.timestamp))
    }

    async fn transaction(&self, hash: B256) -> Result<Option<TransactionInfo>, RpcError> {
        let transaction = instrumented(
            self.metrics,
            "get_transaction_by_hash",
            self.provider.get_transaction_by_hash(hash),
        )
        .await?;

        Ok(transaction.map(|tx| TransactionInfo {
            // Mined dynamic-fee transactions report the price actually paid.
            gas_price: tx
                .effective_gas_price
                .or_else(|| tx.gas_price())
                .or_else(|| Some(tx.max_fee_per_gas())),
            pending: tx.block_number.is_none(),
        }))
    }

    async fn receipt(&self, hash: B256) -> Result<Option<ReceiptInfo>, RpcError> {
        let receipt = instrumented(
            self.metrics,
            "get_transaction_receipt",
            self.provider.get_transaction_receipt(hash),
        )
        .await?;

        Ok(receipt.map(|receipt| ReceiptInfo {
            gas_used: receipt.gas_used,
        }))
    }
}

/// Awaits an RPC call while recording request count, latency and errors.
async fn instrumented<T, F>(
    metrics: Option<&Metrics>,
    method: &'static str,
    call: F,
) -> Result<T, RpcError>
where
    F: IntoFuture<Output = TransportResult<T>>,
{
    let start = Instant::now();

    if let Some(metrics) = metrics {
        metrics.rpc_requests.add(1, &metrics.method_labels(method));
    }

    let result = call.await;

    if let Some(metrics) = metrics {
        let labels = metrics.method_labels(method);
        metrics
            .rpc_latency
            .record(start.elapsed().as_secs_f64(), &labels);
        if result.is_err() {
            metrics.rpc_errors.add(1, &labels);
        }
    }

    result.map_err(|e| {
        warn!("RPC call {} failed: {}", method, e);
        RpcError::Request {
            method: method.to_string(),
            reason: strip_html(&e.to_string()),
        }
    })
}
