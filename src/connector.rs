use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use osgibroker_client::{BrokerClient, BrokerRequest, ClientError, EventStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::model::config::{ConnectorSettings, RelayConfig};

/// Query key the status text is published under.
pub const MESSAGE_PARAM: &str = "message";

/// Keep-alive for the coffee-shop display.
///
/// Announces itself once, then long-polls the watched topic and publishes the
/// alive message every time the poll saw events. Stops when the shutdown
/// token is cancelled.
pub struct CounterConnector {
    client: Arc<dyn BrokerClient>,
    base_url: String,
    settings: ConnectorSettings,
    interval: Duration,
}

impl CounterConnector {
    pub fn new(client: Arc<dyn BrokerClient>, config: &RelayConfig) -> Self {
        Self {
            client,
            base_url: config.broker.base_url.clone(),
            settings: config.connector.clone(),
            interval: Duration::from_secs(config.connector.interval_secs),
        }
    }

    /// Overrides the pause between polls.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn poll_request(&self) -> BrokerRequest {
        BrokerRequest::new(
            self.base_url.as_str(),
            self.settings.watch_topic.as_str(),
            self.settings.client_id.as_str(),
        )
        .with_timeout_secs(self.settings.poll_timeout_secs)
    }

    pub fn announce_request(&self, message: &str) -> BrokerRequest {
        BrokerRequest::new(
            self.base_url.as_str(),
            self.settings.announce_topic.as_str(),
            self.settings.client_id.as_str(),
        )
        .as_post()
        .with_param(MESSAGE_PARAM, message)
    }

    /// Publishes `message=<message>` on the announce topic.
    pub async fn announce(&self, message: &str) -> Result<(), ClientError> {
        let reply = read_all(self.client.open(&self.announce_request(message)).await?).await?;
        debug!(
            topic = self.settings.announce_topic.as_str(),
            message,
            reply_len = reply.len(),
            "Announced"
        );
        Ok(())
    }

    /// One long-poll on the watched topic. `true` when the reply held events.
    pub async fn poll_once(&self) -> Result<bool, ClientError> {
        let reply = read_all(self.client.open(&self.poll_request()).await?).await?;
        Ok(has_events(&reply))
    }

    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            client_id = self.settings.client_id.as_str(),
            watch_topic = self.settings.watch_topic.as_str(),
            announce_topic = self.settings.announce_topic.as_str(),
            "Starting counter connector"
        );

        // An empty startup message skips the announcement.
        if !self.settings.startup_message.is_empty() {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Counter connector stopped");
                    return;
                }
                announced = self.announce(&self.settings.startup_message) => {
                    if let Err(e) = announced {
                        warn!("Startup announcement failed: {}", e);
                    }
                }
            }
        }

        loop {
            let polled = tokio::select! {
                _ = shutdown.cancelled() => break,
                polled = self.poll_once() => polled,
            };

            match polled {
                Ok(true) => {
                    if let Err(e) = self.announce(&self.settings.alive_message).await {
                        warn!("Alive announcement failed: {}", e);
                    }
                }
                Ok(false) => debug!("No counter activity"),
                Err(e) => warn!("Counter poll failed: {}", e),
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!("Counter connector stopped");
    }
}

async fn read_all(mut stream: EventStream) -> Result<Vec<u8>, ClientError> {
    let mut body = Vec::new();
    while let Some(chunk) = stream.next().await {
        body.extend_from_slice(&chunk?);
    }
    Ok(body)
}

/// True when the broker reply carries at least one `<event>` element. The
/// `<events>` wrapper alone does not count.
pub fn has_events(reply: &[u8]) -> bool {
    reply.windows(7).any(|w| {
        w.starts_with(b"<event") && matches!(w[6], b'>' | b'/' | b' ' | b'\t' | b'\r' | b'\n')
    })
}
