// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Tests of the HTTP binding against a local mock collector.

mod common;

use common::helpers::CapturedOutput;
use edge_log::edge::{EdgeConnector, HttpConnector};
use edge_log::{Config, EdgeLog, TransportError};
use edge_log_proto::{AuthRequest, PostLogsRequest, CODE_OK, CODE_UNAUTHORIZED};
use mockito::{Matcher, Server};
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

fn auth_request() -> AuthRequest {
    AuthRequest {
        version: edge_log_proto::PROTOCOL_VERSION.to_string(),
        key_id: "test-key".to_string(),
    }
}

#[tokio::test]
async fn test_authenticate_and_send() {
    let mut server = Server::new_async().await;
    let auth = server
        .mock("POST", "/v1/authenticate")
        .match_body(Matcher::PartialJsonString(
            r#"{"key_id":"test-key"}"#.to_string(),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"code":200,"token_id":"tok-1"}"#)
        .create_async()
        .await;
    let stream = server
        .mock("POST", "/v1/logs/streams")
        .match_body(Matcher::PartialJsonString(
            r#"{"token_id":"tok-1"}"#.to_string(),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"code":200,"stream_id":"s-9"}"#)
        .create_async()
        .await;
    let batch = server
        .mock("POST", "/v1/logs/streams/s-9")
        .match_header("content-encoding", "zstd")
        .match_header("content-type", "application/json")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"code":200}"#)
        .create_async()
        .await;

    let connector = HttpConnector::new(&server.url(), None, TIMEOUT);
    let client = connector.connect().await.expect("connect");
    let response = client.authenticate(auth_request()).await.expect("authenticate");
    assert_eq!(response.code, CODE_OK);
    assert_eq!(response.token_id, "tok-1");

    let mut log_stream = client.open_stream(&response.token_id).await.expect("open stream");
    let ack = log_stream
        .send(PostLogsRequest {
            token_id: response.token_id.clone(),
            ..Default::default()
        })
        .await
        .expect("send");
    assert_eq!(ack.code, CODE_OK);
    assert_eq!(ack.level_override(), None);
    assert_eq!(ack.verbosity_override(), None);

    auth.assert_async().await;
    stream.assert_async().await;
    batch.assert_async().await;
}

#[tokio::test]
async fn test_http_401_means_unauthorized() {
    let mut server = Server::new_async().await;
    let _auth = server
        .mock("POST", "/v1/authenticate")
        .with_status(401)
        .create_async()
        .await;

    let connector = HttpConnector::new(&server.url(), None, TIMEOUT);
    let client = connector.connect().await.expect("connect");
    let response = client.authenticate(auth_request()).await.expect("authenticate");
    assert_eq!(response.code, CODE_UNAUTHORIZED);
}

#[tokio::test]
async fn test_server_error_is_a_status_error() {
    let mut server = Server::new_async().await;
    let _stream = server
        .mock("POST", "/v1/logs/streams")
        .with_status(503)
        .create_async()
        .await;

    let connector = HttpConnector::new(&server.url(), None, TIMEOUT);
    let client = connector.connect().await.expect("connect");
    match client.open_stream("tok").await {
        Err(TransportError::Status(503)) => {}
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("stream should not open"),
    }
}

#[tokio::test]
async fn test_pipeline_over_http() {
    let mut server = Server::new_async().await;
    let _auth = server
        .mock("POST", "/v1/authenticate")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"code":200,"token_id":"tok-1"}"#)
        .create_async()
        .await;
    let _stream = server
        .mock("POST", "/v1/logs/streams")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"code":200,"stream_id":"s-1"}"#)
        .create_async()
        .await;
    let batch = server
        .mock("POST", "/v1/logs/streams/s-1")
        .match_header("content-encoding", "zstd")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"code":200,"log_level":"error"}"#)
        .expect(1)
        .create_async()
        .await;

    let output = CapturedOutput::default();
    let client = EdgeLog::builder(Config {
        api_key: Some("test-key".to_string()),
        edge_address: server.url(),
        flush_interval: Duration::from_secs(3600),
        ..Default::default()
    })
    .writer(output.clone())
    .start()
    .expect("client should start");

    client.info("over the wire");
    client.raw("raw over the wire");
    assert!(client.flush_timeout(TIMEOUT).await);

    batch.assert_async().await;
    assert_eq!(client.level(), edge_log::Level::Error);
    assert!(output.lines().is_empty());
}
