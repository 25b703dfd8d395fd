//! HTTP relays in front of an osgibroker event endpoint.
//!
//! `GET /getevent` long-polls the broker for the next event on the
//! configured topic and streams the reply back as XML. `GET /sendevent`
//! publishes a fixed event through the broker's `_method=POST` override and
//! streams back whatever the broker answers. Both are stateless one-shot
//! copies of the broker body.
//!
//! An optional [`connector::CounterConnector`] runs alongside the server and
//! tells the coffee-shop display whenever the counter topic sees activity.

pub mod connector;
pub mod handlers;
pub mod model;
pub mod relay;
pub mod server;

pub use connector::CounterConnector;
pub use model::config::{BrokerFailurePolicy, ConfigError, RelayConfig};
pub use relay::RelayError;
pub use server::{AppState, ServerError};
