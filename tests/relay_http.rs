mod common;

use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{body::Body, extract::State, http::header::CONTENT_TYPE, routing::get, Router};
use bytes::Bytes;
use common::{serve, start_broker, unreachable_base};
use counter_relay::{server, AppState, BrokerFailurePolicy, RelayConfig};
use futures::stream;
use osgibroker_client::{ClientConfig, HttpBrokerClient};
use tokio::net::TcpListener;

async fn start_relay(base_url: String, policy: BrokerFailurePolicy) -> String {
    let mut config = RelayConfig::default();
    config.broker.base_url = base_url;
    config.on_broker_failure = policy;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = AppState {
        client: Arc::new(HttpBrokerClient::new(ClientConfig::default()).unwrap()),
        config: Arc::new(config),
    };
    tokio::spawn(server::serve(listener, state, std::future::pending()));

    format!("http://{addr}")
}

/// Raises its flag when the broker side drops the body it was streaming.
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

// Broker route that never finishes its reply: one event every 20ms.
async fn endless_event(State(dropped): State<Arc<AtomicBool>>) -> Body {
    let flag = DropFlag(dropped);
    Body::from_stream(stream::unfold((0u64, flag), |(n, flag)| async move {
        if n > 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let chunk = Bytes::from(format!("<event>{n}</event>"));
        Some((Ok::<_, Infallible>(chunk), (n + 1, flag)))
    }))
}

#[tokio::test]
async fn fetch_relays_event_as_xml() {
    let (broker, base) = start_broker().await;
    broker.reply(&[b"<event>5</event>"]).await;
    let relay = start_relay(base, BrokerFailurePolicy::Empty).await;

    let response = reqwest::get(format!("{relay}/getevent")).await.unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()[CONTENT_TYPE.as_str()], "application/xml");
    assert_eq!(response.text().await.unwrap(), "<event>5</event>");
}

#[tokio::test]
async fn fetch_sends_one_second_long_poll() {
    let (broker, base) = start_broker().await;
    let relay = start_relay(base, BrokerFailurePolicy::Empty).await;

    let response = reqwest::get(format!("{relay}/getevent")).await.unwrap();
    assert_eq!(response.status(), 200);
    assert!(response.bytes().await.unwrap().is_empty());

    assert_eq!(
        broker.seen().await,
        vec!["/osgibroker/event?topic=counter&clientID=counter_large&timeOut=1"]
    );
}

#[tokio::test]
async fn split_reply_matches_whole_reply() {
    let (broker, base) = start_broker().await;
    broker.reply(&[b"ok"]).await;
    broker.reply(&[b"o", b"k"]).await;
    let relay = start_relay(base, BrokerFailurePolicy::Empty).await;

    let whole = reqwest::get(format!("{relay}/getevent"))
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    let split = reqwest::get(format!("{relay}/getevent"))
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();

    assert_eq!(whole, "ok");
    assert_eq!(whole, split);
}

#[tokio::test]
async fn sequential_calls_do_not_share_state() {
    let (broker, base) = start_broker().await;
    broker.reply(&[b"<event>1</event>"]).await;
    broker.reply(&[b"<event>2</event>"]).await;
    let relay = start_relay(base, BrokerFailurePolicy::Empty).await;

    for expected in ["<event>1</event>", "<event>2</event>", ""] {
        let body = reqwest::get(format!("{relay}/getevent"))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, expected);
    }
    assert_eq!(broker.seen().await.len(), 3);
}

#[tokio::test]
async fn large_reply_is_relayed_intact() {
    let (broker, base) = start_broker().await;
    let payload: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
    broker.reply(&[&payload[..7_000], &payload[7_000..]]).await;
    let relay = start_relay(base, BrokerFailurePolicy::Empty).await;

    let body = reqwest::get(format!("{relay}/getevent"))
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();

    assert_eq!(body.as_ref(), payload.as_slice());
}

#[tokio::test]
async fn send_publishes_placeholder_event() {
    let (broker, base) = start_broker().await;
    broker.reply(&[b"<ok/>"]).await;
    let relay = start_relay(base, BrokerFailurePolicy::Empty).await;

    let response = reqwest::get(format!("{relay}/sendevent")).await.unwrap();

    assert_eq!(response.status(), 200);
    assert!(response.headers().get(CONTENT_TYPE.as_str()).is_none());
    assert_eq!(response.text().await.unwrap(), "<ok/>");
    assert_eq!(
        broker.seen().await,
        vec!["/osgibroker/event?topic=counter&clientID=counter_mobile&_method=POST&eventName=eventValue"]
    );
}

#[tokio::test]
async fn unreachable_broker_gives_empty_ok_by_default() {
    let relay = start_relay(unreachable_base().await, BrokerFailurePolicy::Empty).await;

    let response = reqwest::get(format!("{relay}/getevent")).await.unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()[CONTENT_TYPE.as_str()], "application/xml");
    assert!(response.bytes().await.unwrap().is_empty());
}

#[tokio::test]
async fn unreachable_broker_gives_bad_gateway_when_hardened() {
    let relay = start_relay(unreachable_base().await, BrokerFailurePolicy::BadGateway).await;

    let fetch = reqwest::get(format!("{relay}/getevent")).await.unwrap();
    assert_eq!(fetch.status(), 502);
    assert_eq!(fetch.headers()[CONTENT_TYPE.as_str()], "application/xml");
    assert!(fetch.bytes().await.unwrap().is_empty());

    let send = reqwest::get(format!("{relay}/sendevent")).await.unwrap();
    assert_eq!(send.status(), 502);
    assert!(send.bytes().await.unwrap().is_empty());
}


#[tokio::test]
async fn caller_disconnect_releases_broker_stream() {
    let dropped = Arc::new(AtomicBool::new(false));
    let app = Router::new()
        .route("/osgibroker/event", get(endless_event))
        .with_state(dropped.clone());
    let addr = serve(app).await;
    let relay = start_relay(format!("http://{addr}/osgibroker"), BrokerFailurePolicy::Empty).await;

    let mut response = reqwest::get(format!("{relay}/getevent")).await.unwrap();
    let first = response.chunk().await.unwrap().unwrap();
    assert!(first.starts_with(b"<event>"));
    assert!(!dropped.load(Ordering::SeqCst));

    drop(response);

    for _ in 0..200 {
        if dropped.load(Ordering::SeqCst) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(dropped.load(Ordering::SeqCst), "broker stream outlived the caller");
}
