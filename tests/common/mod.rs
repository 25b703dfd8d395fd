#![allow(dead_code)]

use std::collections::VecDeque;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{body::Body, extract::State, http::Uri, routing::get, Router};
use bytes::Bytes;
use futures::stream;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

// Mock broker: records every request URI and answers from a queue of
// chunked bodies (an empty body once the queue runs dry).
#[derive(Clone, Default)]
pub struct MockBroker {
    seen: Arc<Mutex<Vec<String>>>,
    replies: Arc<Mutex<VecDeque<Vec<Vec<u8>>>>>,
}

impl MockBroker {
    pub async fn reply(&self, chunks: &[&[u8]]) {
        self.replies
            .lock()
            .await
            .push_back(chunks.iter().map(|c| c.to_vec()).collect());
    }

    pub async fn seen(&self) -> Vec<String> {
        self.seen.lock().await.clone()
    }
}

async fn broker_event(State(broker): State<MockBroker>, uri: Uri) -> Body {
    broker.seen.lock().await.push(uri.to_string());
    let chunks = broker.replies.lock().await.pop_front().unwrap_or_default();
    Body::from_stream(stream::iter(
        chunks
            .into_iter()
            .map(|chunk| Ok::<_, Infallible>(Bytes::from(chunk))),
    ))
}

pub async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

pub async fn start_broker() -> (MockBroker, String) {
    let broker = MockBroker::default();
    let app = Router::new()
        .route("/osgibroker/event", get(broker_event))
        .with_state(broker.clone());
    let addr = serve(app).await;
    (broker, format!("http://{addr}/osgibroker"))
}

pub async fn unreachable_base() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/osgibroker")
}
