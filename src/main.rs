use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{self, EnvFilter};

use contract_event_relay::indexer::EventPipeline;
use contract_event_relay::indexer::interface::{EtherscanSource, resolve_interface};
use contract_event_relay::indexer::rpc::AlloyChainReader;
use contract_event_relay::indexer::rpc::subscription::WsLogSubscriber;
use contract_event_relay::indexer::scanner::HistoricalScanner;
use contract_event_relay::indexer::subscriber::LiveSubscriber;
use contract_event_relay::metrics::Metrics;
use contract_event_relay::storage::EventPublisher;
use contract_event_relay::storage::checkpoint::{Checkpoint, resume_block};
use contract_event_relay::storage::kafka::KafkaPublisher;
use contract_event_relay::utils::load_config;
use contract_event_relay::utils::retry::{RetryConfig, retry};

const FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    println!();
    info!("=========================== INITIALIZING ===========================");

    // Load config
    let config = match load_config("config.yml") {
        Ok(config) => {
            info!("Config loaded successfully");
            config
        }
        Err(e) => {
            error!("Failed to load config: {}", e);
            return Err(anyhow!(e));
        }
    };
    let contract = config.contract()?;

    // Initialize optional metrics
    let metrics = if config.metrics.enabled {
        Some(Metrics::new(config.kafka_topic.clone()).context("Failed to initialize metrics")?)
    } else {
        info!("Metrics are disabled");
        None
    };

    if let Some(metrics) = &metrics {
        metrics
            .start_metrics_server(&config.metrics.address, config.metrics.port)
            .await
            .context("Failed to start metrics server")?;
    }

    // Create RPC provider
    let chain = AlloyChainReader::connect_http(&config.ethereum_rpc_url, metrics.as_ref())?;
    let chain_id = retry(
        || async { chain.chain_id().await.map_err(anyhow::Error::from) },
        &RetryConfig::default(),
        "get_chain_id",
    )
    .await
    .context("Chain endpoint unreachable")?;
    info!("Connected to chain {} via {}", chain_id, config.ethereum_rpc_url);

    // Resolve the contract interface
    let source = EtherscanSource::new(&config.etherscan_api_url, &config.api_key_etherscan)?;
    let interface = match resolve_interface(&source, contract).await {
        Ok(interface) => interface,
        Err(e) => {
            error!("Failed to resolve interface for {}: {}", contract, e);
            return Err(anyhow!(e));
        }
    };

    // Provision the destination topic. Handles existing topics.
    let publisher = KafkaPublisher::new(&config).context("Failed to create Kafka publisher")?;
    retry(
        || async {
            publisher
                .ensure_topic(&config.kafka_topic)
                .await
                .map_err(anyhow::Error::from)
        },
        &RetryConfig::default(),
        "ensure_topic",
    )
    .await
    .with_context(|| format!("Failed to provision topic '{}'", config.kafka_topic))?;

    // Resume from the checkpoint if one exists
    let checkpoint = config
        .checkpoint_path
        .as_ref()
        .map(|path| Checkpoint::new(path, contract, config.kafka_topic.clone()));
    let saved = match &checkpoint {
        Some(checkpoint) => checkpoint.load().await.context("Failed to load checkpoint")?,
        None => None,
    };
    let start_block = resume_block(config.start_block, saved);
    info!("Starting block number: {}", start_block);

    let pipeline = EventPipeline::new(&chain, &publisher, &interface, metrics.as_ref());
    let scanner = HistoricalScanner::new(&pipeline, contract, config.batch_size, checkpoint.as_ref());
    let mut subscriber = LiveSubscriber::new(
        &scanner,
        WsLogSubscriber::new(config.ethereum_ws_url.clone(), metrics.as_ref()),
        RetryConfig::from(&config.reconnect),
        checkpoint.as_ref(),
    );

    info!("============================ STARTING ============================");

    let run = async {
        let cursor = scanner.scan(start_block).await?;
        subscriber.listen(cursor).await?;
        Ok::<(), anyhow::Error>(())
    };

    let outcome = tokio::select! {
        result = run => result,
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C signal, initiating shutdown...");
            Ok(())
        }
    };

    if let Err(e) = publisher.flush(FLUSH_TIMEOUT) {
        warn!("Failed to flush pending messages: {}", e);
    }

    if let Err(e) = &outcome {
        error!("Relay stopped: {:#}", e);
    } else {
        info!("Shutdown complete");
    }
    outcome
}
