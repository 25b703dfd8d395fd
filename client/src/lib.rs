use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

pub mod protocol;

pub use protocol::BrokerRequest;

// Client errors
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid broker URL: {0}")]
    InvalidUrl(String),

    #[error("Client setup error: {0}")]
    Setup(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("Broker answered with status {0}")]
    Status(u16),

    #[error("Body read error: {0}")]
    Body(String),
}

impl ClientError {
    fn from_send(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            ClientError::Timeout(error.to_string())
        } else {
            ClientError::Connection(error.to_string())
        }
    }
}

/// Raw broker response body, chunk by chunk, in arrival order.
pub type EventStream = BoxStream<'static, Result<Bytes, ClientError>>;

// Client settings
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Unset means the OS connect timeout applies.
    pub connect_timeout: Option<Duration>,
    /// Unset means the broker's own long-poll timeout is the only bound.
    pub request_timeout: Option<Duration>,
}

#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Sends `request` and hands back the response body as a stream.
    ///
    /// Fails when the broker cannot be reached or answers with a
    /// non-success status; no body bytes are produced in that case.
    async fn open(&self, request: &BrokerRequest) -> Result<EventStream, ClientError>;
}

pub struct HttpBrokerClient {
    http: reqwest::Client,
}

impl HttpBrokerClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }

        let http = builder
            .build()
            .map_err(|e| ClientError::Setup(e.to_string()))?;

        Ok(Self { http })
    }
}

#[async_trait]
impl BrokerClient for HttpBrokerClient {
    async fn open(&self, request: &BrokerRequest) -> Result<EventStream, ClientError> {
        let url = request.url()?;
        debug!(%url, "Opening broker event stream");

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(ClientError::from_send)?;

        let status = response.status();
        if !status.is_success() {
            warn!(
                "Broker rejected request for topic {} from {}: {}",
                request.topic(),
                request.client_id(),
                status
            );
            return Err(ClientError::Status(status.as_u16()));
        }

        let body = response.bytes_stream().map(|chunk| {
            chunk.map_err(|e| {
                if e.is_timeout() {
                    ClientError::Timeout(e.to_string())
                } else {
                    ClientError::Body(e.to_string())
                }
            })
        });

        Ok(body.boxed())
    }
}
