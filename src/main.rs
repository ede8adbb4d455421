use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use kafka_proxy::config::loader;
use kafka_proxy::lifecycle::{signals, Shutdown};
use kafka_proxy::net::listener::Listener;
use kafka_proxy::{ProxyConfig, ProxyServer};

#[derive(Parser)]
#[command(name = "kafka-proxy")]
#[command(about = "Protocol-aware filtering proxy for Kafka clusters", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => loader::load_config(path)?,
        None => ProxyConfig::default(),
    };

    kafka_proxy::observability::logging::init(&config.observability.log_level);

    tracing::info!("kafka-proxy v0.1.0 starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.address,
        filters = config.filters.len(),
        send_request_timeout_ms = config.timeouts.send_request_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => kafka_proxy::observability::metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = Listener::bind(&config.listener).await?;
    let server = ProxyServer::new(config);
    let shutdown = Arc::new(Shutdown::new());

    let server_shutdown = Arc::clone(&shutdown);
    let mut server_task =
        tokio::spawn(async move { server.run(listener, &server_shutdown).await });

    tokio::select! {
        result = &mut server_task => {
            result??;
            tracing::info!("Shutdown complete");
            return Ok(());
        }
        _ = signals::shutdown_signal() => {
            tracing::info!("Termination signal received, draining connections");
            shutdown.trigger();
        }
    }

    // Wait for the accept loop to drain its connections; a second signal
    // aborts instead of waiting.
    let drained = tokio::select! {
        result = &mut server_task => {
            result??;
            true
        }
        _ = signals::shutdown_signal() => false,
    };
    if !drained {
        tracing::warn!("Second termination signal received, aborting");
        server_task.abort();
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
