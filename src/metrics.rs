use std::sync::Arc;
use tracing::{error, info};

use axum::{Router, routing::get};
use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Gauge, Histogram, MeterProvider};
use opentelemetry_sdk::metrics::{MetricError, SdkMeterProvider};
use prometheus::{Encoder, TextEncoder};
use std::net::SocketAddr;

pub struct Metrics {
    registry: Arc<prometheus::Registry>,
    _provider: SdkMeterProvider,
    pub topic: String,

    // Pipeline metrics
    pub events_published: Counter<u64>,
    pub events_skipped: Counter<u64>,
    pub publish_errors: Counter<u64>,
    pub enrichment_degraded: Counter<u64>,
    pub latest_processed_block: Gauge<u64>,

    // Chain metrics
    pub chain_tip_block: Gauge<u64>,
    pub subscription_reconnects: Counter<u64>,

    // RPC metrics
    pub rpc_requests: Counter<u64>,
    pub rpc_errors: Counter<u64>,
    pub rpc_latency: Histogram<f64>,
}

impl Metrics {
    pub fn new(topic: String) -> Result<Self, MetricError> {
        let registry = prometheus::Registry::new();

        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()?;

        let provider = SdkMeterProvider::builder().with_reader(exporter).build();
        let meter = provider.meter("relay_metrics");

        let events_published = meter
            .u64_counter("relay_events_published")
            .with_description("Events published to the destination topic")
            .build();

        let events_skipped = meter
            .u64_counter("relay_events_skipped")
            .with_description("Log records skipped because they could not be decoded")
            .build();

        let publish_errors = meter
            .u64_counter("relay_publish_errors")
            .with_description("Events that failed to publish")
            .build();

        let enrichment_degraded = meter
            .u64_counter("relay_enrichment_degraded")
            .with_description("Events published with at least one unavailable enrichment field")
            .build();

        let latest_processed_block = meter
            .u64_gauge("relay_latest_processed_block")
            .with_description("Block number of the latest processed log record")
            .build();

        let chain_tip_block = meter
            .u64_gauge("relay_chain_tip_block")
            .with_description("Latest chain head observed by the scanner or a live catch-up")
            .build();

        let subscription_reconnects = meter
            .u64_counter("relay_subscription_reconnects")
            .with_description("Live subscription reconnect attempts")
            .build();

        let rpc_requests = meter
            .u64_counter("relay_rpc_requests")
            .with_description("Number of RPC requests made")
            .build();

        let rpc_errors = meter
            .u64_counter("relay_rpc_errors")
            .with_description("Number of RPC errors encountered")
            .build();

        let rpc_latency = meter
            .f64_histogram("relay_rpc_latency")
            .with_description("RPC request latency")
            .with_boundaries(vec![
                0.025, 0.05, 0.075, 0.1, 0.15, 0.2, 0.3, 0.5, 1.0, 5.0, 10.0,
            ])
            .with_unit("s")
            .build();

        Ok(Self {
            registry: Arc::new(registry),
            _provider: provider,
            topic,
            events_published,
            events_skipped,
            publish_errors,
            enrichment_degraded,
            latest_processed_block,
            chain_tip_block,
            subscription_reconnects,
            rpc_requests,
            rpc_errors,
            rpc_latency,
        })
    }

    pub fn labels(&self) -> [KeyValue; 1] {
        [KeyValue::new("topic", self.topic.clone())]
    }

    pub fn method_labels(&self, method: &'static str) -> [KeyValue; 2] {
        [
            KeyValue::new("topic", self.topic.clone()),
            KeyValue::new("method", method),
        ]
    }

    pub fn record_skip(&self, reason: &'static str) {
        self.events_skipped.add(
            1,
            &[
                KeyValue::new("topic", self.topic.clone()),
                KeyValue::new("reason", reason),
            ],
        );
    }

    pub async fn start_metrics_server(&self, addr: &str, port: u16) -> anyhow::Result<()> {
        let addr = format!("{addr}:{port}").parse::<SocketAddr>()?;
        let registry = self.registry.clone();

        let app = Router::new().route("/metrics", get(move || metrics_handler(registry.clone())));

        // Only used for logging.
        let access_url = if addr.ip().is_unspecified() {
            format!("http://localhost:{port}/metrics")
        } else {
            format!("http://{}:{port}/metrics", addr.ip())
        };

        info!(
            "Starting metrics server - binding to {} (accessible at {})",
            addr, access_url
        );

        let listener = tokio::net::TcpListener::bind(addr).await?;

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("Metrics server stopped: {}", e);
            }
        });

        Ok(())
    }
}

async fn metrics_handler(registry: Arc<prometheus::Registry>) -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
