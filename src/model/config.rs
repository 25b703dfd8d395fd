use std::path::Path;
use std::time::Duration;

use ::config::{Config, Environment, File, FileFormat};
use osgibroker_client::ClientConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Prefix for environment overrides, e.g. `RELAY__BROKER__BASE_URL`.
pub const ENV_PREFIX: &str = "RELAY";
const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// What the caller sees when the broker cannot be opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerFailurePolicy {
    /// 200 with an empty body, indistinguishable from "no event".
    #[default]
    Empty,
    /// 502 with an empty body.
    BadGateway,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Address the relay listens on
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Log level (trace, debug, info, warn, error); `RUST_LOG` wins when set
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub on_broker_failure: BrokerFailurePolicy,

    #[serde(default)]
    pub broker: BrokerSettings,

    #[serde(default)]
    pub fetcher: FetcherSettings,

    #[serde(default)]
    pub sender: SenderSettings,

    #[serde(default)]
    pub connector: ConnectorSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerSettings {
    /// Broker REST root; `/event` is appended
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_topic")]
    pub topic: String,

    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,

    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetcherSettings {
    #[serde(default = "default_fetcher_route")]
    pub route: String,

    #[serde(default = "default_fetcher_client_id")]
    pub client_id: String,

    /// Long-poll timeout sent to the broker. One second is its minimum.
    #[serde(default = "default_fetcher_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderSettings {
    #[serde(default = "default_sender_route")]
    pub route: String,

    #[serde(default = "default_sender_client_id")]
    pub client_id: String,

    /// Event name/value pairs published on every call, in order
    #[serde(default = "default_sender_event")]
    pub event: Vec<EventParam>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventParam {
    pub name: String,
    pub value: String,
}

/// Background keep-alive that tells the coffee-shop display the counter app
/// is still in use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorSettings {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_connector_client_id")]
    pub client_id: String,

    /// Topic polled for activity
    #[serde(default = "default_topic")]
    pub watch_topic: String,

    /// Topic the status messages are published to
    #[serde(default = "default_announce_topic")]
    pub announce_topic: String,

    #[serde(default = "default_connector_poll_timeout_secs")]
    pub poll_timeout_secs: u64,

    /// Pause between two polls
    #[serde(default = "default_connector_interval_secs")]
    pub interval_secs: u64,

    #[serde(default = "default_startup_message")]
    pub startup_message: String,

    #[serde(default = "default_alive_message")]
    pub alive_message: String,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_base_url() -> String {
    "http://localhost:8800/osgibroker".to_string()
}

fn default_topic() -> String {
    "counter".to_string()
}

fn default_fetcher_route() -> String {
    "/getevent".to_string()
}

fn default_fetcher_client_id() -> String {
    "counter_large".to_string()
}

fn default_fetcher_timeout_secs() -> u64 {
    1
}

fn default_sender_route() -> String {
    "/sendevent".to_string()
}

fn default_sender_client_id() -> String {
    "counter_mobile".to_string()
}

fn default_sender_event() -> Vec<EventParam> {
    vec![EventParam {
        name: "eventName".to_string(),
        value: "eventValue".to_string(),
    }]
}

fn default_connector_client_id() -> String {
    "counterconnector".to_string()
}

fn default_announce_topic() -> String {
    "cs_counter".to_string()
}

fn default_connector_poll_timeout_secs() -> u64 {
    1
}

fn default_connector_interval_secs() -> u64 {
    5
}

fn default_startup_message() -> String {
    "CONSTRUCTOR".to_string()
}

fn default_alive_message() -> String {
    "RUNNINGSTILL".to_string()
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            log_level: default_log_level(),
            on_broker_failure: BrokerFailurePolicy::default(),
            broker: BrokerSettings::default(),
            fetcher: FetcherSettings::default(),
            sender: SenderSettings::default(),
            connector: ConnectorSettings::default(),
        }
    }
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            topic: default_topic(),
            connect_timeout_secs: None,
            request_timeout_secs: None,
        }
    }
}

impl Default for FetcherSettings {
    fn default() -> Self {
        Self {
            route: default_fetcher_route(),
            client_id: default_fetcher_client_id(),
            timeout_secs: default_fetcher_timeout_secs(),
        }
    }
}

impl Default for SenderSettings {
    fn default() -> Self {
        Self {
            route: default_sender_route(),
            client_id: default_sender_client_id(),
            event: default_sender_event(),
        }
    }
}

impl Default for ConnectorSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            client_id: default_connector_client_id(),
            watch_topic: default_topic(),
            announce_topic: default_announce_topic(),
            poll_timeout_secs: default_connector_poll_timeout_secs(),
            interval_secs: default_connector_interval_secs(),
            startup_message: default_startup_message(),
            alive_message: default_alive_message(),
        }
    }
}

impl RelayConfig {
    /// Defaults, then the optional TOML file, then `RELAY__*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }

        let config: RelayConfig = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetcher.timeout_secs < 1 {
            return Err(ConfigError::Invalid(
                "fetcher.timeout_secs must be at least 1".to_string(),
            ));
        }

        for (key, route) in [
            ("fetcher.route", &self.fetcher.route),
            ("sender.route", &self.sender.route),
        ] {
            if !route.starts_with('/') {
                return Err(ConfigError::Invalid(format!(
                    "{key} must start with '/', got {route:?}"
                )));
            }
        }

        if self.connector.enabled
            && (self.connector.poll_timeout_secs < 1 || self.connector.interval_secs < 1)
        {
            return Err(ConfigError::Invalid(
                "connector.poll_timeout_secs and connector.interval_secs must be at least 1"
                    .to_string(),
            ));
        }

        if self.fetcher.route == self.sender.route {
            return Err(ConfigError::Invalid(format!(
                "fetcher and sender share route {}",
                self.fetcher.route
            )));
        }

        // Same check the client runs per request, surfaced at startup instead.
        osgibroker_client::BrokerRequest::new(
            self.broker.base_url.as_str(),
            self.broker.topic.as_str(),
            self.fetcher.client_id.as_str(),
        )
        .url()
        .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        Ok(())
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            connect_timeout: self.broker.connect_timeout_secs.map(Duration::from_secs),
            request_timeout: self.broker.request_timeout_secs.map(Duration::from_secs),
        }
    }
}
