use std::future::Future;
use std::sync::Arc;

use axum::{routing::get, Router};
use osgibroker_client::BrokerClient;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::info;

use crate::handlers;
use crate::model::config::RelayConfig;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Shared by every request. Read-only once the server is up.
#[derive(Clone)]
pub struct AppState {
    pub client: Arc<dyn BrokerClient>,
    pub config: Arc<RelayConfig>,
}

pub fn router(state: AppState) -> Router {
    let fetch_route = state.config.fetcher.route.clone();
    let send_route = state.config.sender.route.clone();

    Router::new()
        .route(&fetch_route, get(handlers::fetch_event))
        .route(&send_route, get(handlers::send_event))
        .with_state(state)
}

/// Serves both relays on an already bound listener until `shutdown` resolves.
pub async fn serve<F>(
    listener: TcpListener,
    state: AppState,
    shutdown: F,
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!(
        "Relay listening on {} (fetch {}, send {}, broker {})",
        addr, state.config.fetcher.route, state.config.sender.route, state.config.broker.base_url
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

pub async fn run<F>(
    config: RelayConfig,
    client: Arc<dyn BrokerClient>,
    shutdown: F,
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: config.listen_addr.clone(),
            source,
        })?;

    let state = AppState {
        client,
        config: Arc::new(config),
    };

    serve(listener, state, shutdown).await
}
