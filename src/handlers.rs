use axum::{
    body::Body,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderValue, StatusCode},
    response::Response,
};
use osgibroker_client::BrokerRequest;

use crate::model::config::{BrokerFailurePolicy, RelayConfig};
use crate::relay;
use crate::server::AppState;

pub const XML_CONTENT_TYPE: &str = "application/xml";

/// Long-poll read for the display client.
pub fn fetch_request(config: &RelayConfig) -> BrokerRequest {
    BrokerRequest::new(
        config.broker.base_url.as_str(),
        config.broker.topic.as_str(),
        config.fetcher.client_id.as_str(),
    )
    .with_timeout_secs(config.fetcher.timeout_secs)
}

/// Publish on behalf of the mobile client.
pub fn send_request(config: &RelayConfig) -> BrokerRequest {
    config.sender.event.iter().fold(
        BrokerRequest::new(
            config.broker.base_url.as_str(),
            config.broker.topic.as_str(),
            config.sender.client_id.as_str(),
        )
        .as_post(),
        |request, param| request.with_param(param.name.as_str(), param.value.as_str()),
    )
}

pub async fn fetch_event(State(state): State<AppState>) -> Response {
    let request = fetch_request(&state.config);
    relay_response(&state, &request, &state.config.fetcher.route, Some(XML_CONTENT_TYPE)).await
}

pub async fn send_event(State(state): State<AppState>) -> Response {
    let request = send_request(&state.config);
    relay_response(&state, &request, &state.config.sender.route, None).await
}

async fn relay_response(
    state: &AppState,
    request: &BrokerRequest,
    route: &str,
    content_type: Option<&'static str>,
) -> Response {
    // Open failures are already logged with their request id.
    let (status, body) = match relay::open(state.client.as_ref(), request, route).await {
        Ok(body) => (StatusCode::OK, Body::from_stream(body)),
        Err(_) => (failure_status(state.config.on_broker_failure), Body::empty()),
    };

    let mut response = Response::new(body);
    *response.status_mut() = status;
    // Declared even for failures and empty bodies.
    if let Some(content_type) = content_type {
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    }
    response
}

fn failure_status(policy: BrokerFailurePolicy) -> StatusCode {
    match policy {
        BrokerFailurePolicy::Empty => StatusCode::OK,
        BrokerFailurePolicy::BadGateway => StatusCode::BAD_GATEWAY,
    }
}
