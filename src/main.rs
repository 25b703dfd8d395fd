use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use counter_relay::{server, CounterConnector, RelayConfig};
use osgibroker_client::{BrokerClient, HttpBrokerClient};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "counter_relay", about = "Relays counter events between clients and the osgibroker")]
struct Cli {
    /// Optional TOML config file; RELAY__* variables override it
    #[arg(long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = RelayConfig::load(cli.config.as_deref())?;

    // Logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str())),
        )
        .init();

    info!("Starting counter relay");

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let client: Arc<dyn BrokerClient> = Arc::new(HttpBrokerClient::new(config.client_config())?);

    let connector = config.connector.enabled.then(|| {
        tokio::spawn(CounterConnector::new(client.clone(), &config).run(shutdown.clone()))
    });

    let served = server::run(config, client, shutdown.clone().cancelled_owned()).await;

    // A failed server takes the connector down with it.
    shutdown.cancel();
    if let Some(connector) = connector {
        connector.await?;
    }
    served?;

    info!("Shutting down");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("Received shutdown signal");
            shutdown.cancel();
        }
        Err(e) => error!("Unable to listen for shutdown signal: {}", e),
    }
}
