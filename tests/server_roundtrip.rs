//! Round trips over a real socket.

use std::time::Duration;

use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use bytes::Bytes;
use futures_util::StreamExt;

use reply_pipeline::http::{handler_fn, App};
use reply_pipeline::pipeline::{hook_fn, AppError, ByteStream, Envelope, Payload};

mod common;

fn app(file: std::path::PathBuf) -> App {
    App::builder()
        .on_send(hook_fn("mark", |_request, payload| async move {
            Ok::<_, AppError>(match payload {
                Payload::Text(text) => Some(Payload::Text(format!("{text}!"))),
                _ => None,
            })
        }))
        .route(Method::GET, "/text", handler_fn(|_| async { Ok::<_, AppError>("hello") }))
        .route(
            Method::GET,
            "/file",
            handler_fn(move |_| {
                let file = file.clone();
                async move { Ok::<_, AppError>(ByteStream::open_file(file, 1024).await?) }
            }),
        )
        .route(
            Method::GET,
            "/no-content",
            handler_fn(|_| async {
                Ok::<_, AppError>(
                    Envelope::new(StatusCode::NO_CONTENT)
                        .header(HeaderName::from_static("hello"), HeaderValue::from_static("world"))
                        .body(common::chunks(&["dropped"])),
                )
            }),
        )
        .route(
            Method::GET,
            "/slow",
            handler_fn(|_| async {
                let chunks = futures_util::stream::iter(0..3).then(|i| async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok::<_, std::io::Error>(Bytes::from(format!("chunk{i};")))
                });
                Ok::<_, AppError>(ByteStream::new(chunks))
            }),
        )
        .build()
}

#[tokio::test]
async fn test_round_trip_over_socket() {
    let contents = b"file contents over the wire\n".repeat(500);
    let path = common::temp_file(&contents);
    let server = common::start_server(app(path.clone())).await;
    let client = reqwest::Client::new();

    let res = client.get(server.url("/text")).send().await.unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::OK);
    assert!(res.headers().contains_key("x-request-id"));
    assert_eq!(res.text().await.unwrap(), "hello!");

    let res = client.get(server.url("/file")).send().await.unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::OK);
    assert_eq!(&res.bytes().await.unwrap()[..], &contents[..]);

    let res = client.get(server.url("/no-content")).send().await.unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::NO_CONTENT);
    assert_eq!(res.headers()["hello"], "world");
    assert!(res.bytes().await.unwrap().is_empty());

    let res = client.get(server.url("/slow")).send().await.unwrap();
    let mut body = res.bytes_stream();
    let mut received = Vec::new();
    while let Some(chunk) = body.next().await {
        received.extend_from_slice(&chunk.unwrap());
    }
    assert_eq!(received, b"chunk0;chunk1;chunk2;");

    let res = client.post(server.url("/text")).send().await.unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::METHOD_NOT_ALLOWED);

    let res = client.get(server.url("/missing")).send().await.unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::NOT_FOUND);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["code"], "RouteNotFound");

    drop(client);
    server.stop().await;
    std::fs::remove_file(&path).unwrap();
}

#[tokio::test]
async fn test_request_id_is_propagated() {
    let path = common::temp_file(b"");
    let server = common::start_server(app(path.clone())).await;

    let res = reqwest::Client::new()
        .get(server.url("/text"))
        .header("x-request-id", "abc-123")
        .send()
        .await
        .unwrap();
    assert_eq!(res.headers()["x-request-id"], "abc-123");

    server.stop().await;
    std::fs::remove_file(&path).unwrap();
}
