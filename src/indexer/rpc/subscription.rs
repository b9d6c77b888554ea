use alloy_provider::{DynProvider, Provider, ProviderBuilder, WsConnect};
use alloy_pubsub::Subscription;
use alloy_rpc_types_eth::{Filter, Log};
use futures::StreamExt;
use tokio::sync::broadcast::error::RecvError;
use tracing::info;

use crate::indexer::{LogStream, LogSubscriber};
use crate::metrics::Metrics;
use crate::models::errors::{RpcError, SubscriptionError};
use crate::utils::strip_html;

/// [`LogSubscriber`] over a WebSocket JSON-RPC endpoint.
///
/// Every `subscribe` call opens a fresh connection, so a dead socket is
/// replaced on the next reconnect attempt.
pub struct WsLogSubscriber<'a> {
    ws_url: String,
    provider: Option<DynProvider>,
    metrics: Option<&'a Metrics>,
}

impl<'a> WsLogSubscriber<'a> {
    pub fn new(ws_url: impl Into<String>, metrics: Option<&'a Metrics>) -> Self {
        Self {
            ws_url: ws_url.into(),
            provider: None,
            metrics,
        }
    }

    async fn connect(&self) -> Result<DynProvider, RpcError> {
        let provider = ProviderBuilder::new()
            .connect_ws(WsConnect::new(self.ws_url.clone()))
            .await
            .map_err(|e| RpcError::Connect {
                url: self.ws_url.clone(),
                reason: strip_html(&e.to_string()),
            })?;
        info!("Connected to WebSocket endpoint {}", self.ws_url);
        Ok(provider.erased())
    }
}

impl LogSubscriber for WsLogSubscriber<'_> {
    async fn subscribe(&mut self, filter: &Filter) -> Result<LogStream, SubscriptionError> {
        // Drop the previous connection before dialing a new one.
        self.provider = None;

        if let Some(metrics) = self.metrics {
            metrics
                .rpc_requests
                .add(1, &metrics.method_labels("subscribe_logs"));
        }

        let result = match self.connect().await {
            Ok(provider) => provider
                .subscribe_logs(filter)
                .await
                .map(|subscription| (provider, subscription))
                .map_err(|e| RpcError::Request {
                    method: "subscribe_logs".to_string(),
                    reason: strip_html(&e.to_string()),
                }),
            Err(e) => Err(e),
        };

        match result {
            Ok((provider, subscription)) => {
                // The connection lives as long as the provider does.
                self.provider = Some(provider);
                Ok(into_stream(subscription))
            }
            Err(e) => {
                if let Some(metrics) = self.metrics {
                    metrics
                        .rpc_errors
                        .add(1, &metrics.method_labels("subscribe_logs"));
                }
                Err(SubscriptionError::Subscribe(e))
            }
        }
    }
}

/// Yields logs until the subscription fails, then yields the failure once and ends.
fn into_stream(subscription: Subscription<Log>) -> LogStream {
    futures::stream::unfold(Some(subscription), |state| async move {
        let mut subscription = state?;
        match subscription.recv().await {
            Ok(log) => Some((Ok(log), Some(subscription))),
            Err(RecvError::Lagged(skipped)) => {
                Some((Err(SubscriptionError::Lagged(skipped)), None))
            }
            Err(RecvError::Closed) => Some((Err(SubscriptionError::Closed), None)),
        }
    })
    .boxed()
}
