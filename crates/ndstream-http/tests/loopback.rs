//! Client and server over a real loopback socket.

use std::net::SocketAddr;
use std::sync::Once;
use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post};
use futures::StreamExt;
use ndstream_core::{CancellationToken, MediaFormat};
use ndstream_http::{Ndjson, NdjsonClient, NdjsonRejection, NdjsonStream};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Reading {
    sensor: String,
    value: i64,
}

fn readings(n: i64) -> Vec<Reading> {
    (0..n)
        .map(|value| Reading {
            sensor: format!("s-{value}"),
            value,
        })
        .collect()
}

async fn echo(
    NdjsonStream(records): NdjsonStream<Reading>,
) -> Ndjson<impl futures::Stream<Item = Reading>> {
    let valid = records
        .take_while(|r| futures::future::ready(r.is_ok()))
        .filter_map(|r| async move { r.ok() });
    Ndjson::new(valid).format(MediaFormat::Jsonl)
}

async fn count(
    NdjsonStream(mut records): NdjsonStream<Reading>,
) -> Result<String, NdjsonRejection> {
    let mut n = 0;
    while let Some(record) = records.next().await {
        record?;
        n += 1;
    }
    Ok(n.to_string())
}


static TRACING_INIT: Once = Once::new();

/// Route logs through the test writer; `RUST_LOG=debug` to see them.
fn init_tracing() {
    TRACING_INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();
    });
}

async fn spawn_server() -> SocketAddr {
    init_tracing();
    let app = Router::new()
        .route("/readings", get(|| async { Ndjson::new(futures::stream::iter(readings(25))) }))
        .route(
            "/slow",
            get(|| async {
                let ticks = futures::stream::iter(0..).then(|value| async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    Reading {
                        sensor: "tick".to_string(),
                        value,
                    }
                });
                Ndjson::new(ticks)
            }),
        )
        .route("/echo", post(echo))
        .route("/count", post(count));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn get_streams_all_records() {
    let addr = spawn_server().await;
    let mut client = NdjsonClient::connect(&addr.to_string()).await.unwrap();

    let received: Vec<Reading> = client
        .get("/readings", CancellationToken::new())
        .await
        .unwrap()
        .map(Result::unwrap)
        .collect()
        .await;
    assert_eq!(received, readings(25));
}

#[tokio::test]
async fn infinite_stream_is_read_incrementally() {
    let addr = spawn_server().await;
    let mut client = NdjsonClient::connect(&addr.to_string()).await.unwrap();

    let first: Vec<Reading> = client
        .get("/slow", CancellationToken::new())
        .await
        .unwrap()
        .take(3)
        .map(Result::unwrap)
        .collect()
        .await;
    assert_eq!(first.iter().map(|r| r.value).collect::<Vec<_>>(), vec![0, 1, 2]);
}

#[tokio::test]
async fn reader_cancellation_is_reported() {
    let addr = spawn_server().await;
    let mut client = NdjsonClient::connect(&addr.to_string()).await.unwrap();
    let cancel = CancellationToken::new();

    let mut stream = client.get::<Reading>("/slow", cancel.clone()).await.unwrap();
    assert!(stream.next().await.unwrap().is_ok());
    cancel.cancel();
    let err = stream.next().await.unwrap().unwrap_err();
    assert!(err.is_cancelled());
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn post_streams_request_body() {
    let addr = spawn_server().await;
    let mut client = NdjsonClient::connect(&addr.to_string()).await.unwrap();

    let resp = client
        .post("/count", futures::stream::iter(readings(40)), MediaFormat::Ndjson)
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = http_body_util::BodyExt::collect(resp.into_body()).await.unwrap().to_bytes();
    assert_eq!(&body[..], b"40");
}

#[tokio::test]
async fn echo_round_trip_in_jsonl() {
    let addr = spawn_server().await;
    let mut client = NdjsonClient::connect(&addr.to_string()).await.unwrap();

    let resp = client
        .post("/echo", futures::stream::iter(readings(10)), MediaFormat::Jsonl)
        .await
        .unwrap();
    assert_eq!(
        resp.headers()[http::header::CONTENT_TYPE],
        "application/jsonl; charset=utf-8"
    );

    let echoed: Vec<Reading> = ndstream_http::read_ndjson(
        resp,
        ndstream_core::JsonCodec::default(),
        CancellationToken::new(),
    )
    .unwrap()
    .map(Result::unwrap)
    .collect()
    .await;
    assert_eq!(echoed, readings(10));
}
