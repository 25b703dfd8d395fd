use std::convert::Infallible;

use bytes::Bytes;
use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use osgibroker_client::{BrokerClient, BrokerRequest, ClientError, EventStream};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Largest piece forwarded to the caller in one write.
pub const MAX_CHUNK: usize = 4096;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Relay {route} could not open broker stream: {source}")]
    Open {
        route: String,
        #[source]
        source: ClientError,
    },
}

/// Body handed to the HTTP layer. Never fails: a broken upstream just ends it.
pub type RelayBody = BoxStream<'static, Result<Bytes, Infallible>>;

/// Opens the broker stream for one invocation.
///
/// An `Err` means nothing was read; mapping that to a response status is up
/// to the caller.
pub async fn open(
    client: &dyn BrokerClient,
    request: &BrokerRequest,
    route: &str,
) -> Result<RelayBody, RelayError> {
    let request_id = Uuid::new_v4();
    debug!(
        %request_id,
        route,
        topic = request.topic(),
        client_id = request.client_id(),
        "Opening relay"
    );

    let upstream = client.open(request).await.map_err(|source| {
        error!(%request_id, route, "Broker unavailable: {}", source);
        RelayError::Open {
            route: route.to_string(),
            source,
        }
    })?;

    info!(%request_id, route, "Relaying broker stream");
    Ok(forward(upstream, request_id))
}

/// Copies upstream chunks in order, split to at most [`MAX_CHUNK`] bytes.
/// Bytes read before an upstream error are kept; the stream ends there.
pub fn forward(upstream: EventStream, request_id: Uuid) -> RelayBody {
    upstream
        .scan(0usize, move |relayed, chunk| {
            let next = match chunk {
                Ok(bytes) => {
                    *relayed += bytes.len();
                    Some(bytes)
                }
                Err(e) => {
                    warn!(
                        %request_id,
                        relayed = *relayed,
                        "Broker stream ended early: {}",
                        e
                    );
                    None
                }
            };
            future::ready(next)
        })
        .flat_map(|bytes| stream::iter(split_chunks(bytes, MAX_CHUNK)))
        .map(Ok)
        .boxed()
}

/// Splits `bytes` into pieces of at most `max` bytes. A `max` of zero is
/// treated as one.
pub fn split_chunks(mut bytes: Bytes, max: usize) -> Vec<Bytes> {
    let max = max.max(1);
    let mut pieces = Vec::with_capacity(bytes.len().div_ceil(max));
    while bytes.len() > max {
        pieces.push(bytes.split_to(max));
    }
    if !bytes.is_empty() {
        pieces.push(bytes);
    }
    pieces
}
