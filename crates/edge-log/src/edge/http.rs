// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP binding of the collector protocol.
//!
//! | Call | Endpoint |
//! |---|---|
//! | authenticate | `POST /v1/authenticate` |
//! | open stream | `POST /v1/logs/streams` |
//! | send batch | `POST /v1/logs/streams/{stream_id}` (zstd compressed JSON) |

use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;
use edge_log_proto::{
    AuthRequest, AuthResponse, PostLogsRequest, PostLogsResponse, StreamRequest, StreamResponse,
    CODE_OK, CODE_UNAUTHORIZED,
};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::StatusCode;
use tracing::debug;
use zstd::stream::write::Encoder;

use super::transport::{EdgeClient, EdgeConnector, LogStream};
use crate::error::TransportError;

const COMPRESSION_LEVEL: i32 = 3;

#[derive(Debug, Clone)]
pub struct HttpConnector {
    address: String,
    cert: Option<String>,
    timeout: Duration,
}

impl HttpConnector {
    #[must_use]
    pub fn new(address: &str, cert: Option<String>, timeout: Duration) -> Self {
        Self {
            address: address.trim_end_matches('/').to_string(),
            cert,
            timeout,
        }
    }

    fn build_client(&self) -> Result<reqwest::Client, TransportError> {
        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(self.timeout)
            .pool_idle_timeout(Some(Duration::from_secs(270)))
            .tcp_keepalive(Some(Duration::from_secs(120)));

        if let Some(pem) = &self.cert {
            let cert = reqwest::Certificate::from_pem(pem.as_bytes())
                .map_err(|e| TransportError::Credentials(e.to_string()))?;
            builder = builder.add_root_certificate(cert);
        }

        Ok(builder.build()?)
    }
}

#[async_trait]
impl EdgeConnector for HttpConnector {
    async fn connect(&self) -> Result<Box<dyn EdgeClient>, TransportError> {
        let client = self.build_client()?;
        debug!("Created edge client for {}", self.address);
        Ok(Box::new(HttpEdgeClient {
            client,
            address: self.address.clone(),
        }))
    }
}

struct HttpEdgeClient {
    client: reqwest::Client,
    address: String,
}

#[async_trait]
impl EdgeClient for HttpEdgeClient {
    async fn authenticate(&self, request: AuthRequest) -> Result<AuthResponse, TransportError> {
        let resp = self
            .client
            .post(format!("{}/v1/authenticate", self.address))
            .json(&request)
            .send()
            .await?;

        // a rejected key may also come back as a bare HTTP 401
        if resp.status() == StatusCode::UNAUTHORIZED {
            return Ok(AuthResponse {
                code: CODE_UNAUTHORIZED,
                ..Default::default()
            });
        }
        if !resp.status().is_success() {
            return Err(TransportError::Status(resp.status().as_u16()));
        }
        Ok(resp.json::<AuthResponse>().await?)
    }

    async fn open_stream(&self, token: &str) -> Result<Box<dyn LogStream>, TransportError> {
        let resp = self
            .client
            .post(format!("{}/v1/logs/streams", self.address))
            .json(&StreamRequest {
                token_id: token.to_string(),
            })
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(TransportError::Status(resp.status().as_u16()));
        }
        let stream = resp.json::<StreamResponse>().await?;
        if stream.code != CODE_OK {
            return Err(TransportError::Status(stream.code));
        }

        Ok(Box::new(HttpLogStream {
            client: self.client.clone(),
            url: format!("{}/v1/logs/streams/{}", self.address, stream.stream_id),
        }))
    }
}

struct HttpLogStream {
    client: reqwest::Client,
    url: String,
}

fn headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(CONTENT_ENCODING, HeaderValue::from_static("zstd"));
    headers
}

/// Serializes and compresses a batch.
pub fn encode_body(request: &PostLogsRequest) -> Result<Vec<u8>, TransportError> {
    let json = serde_json::to_vec(request).map_err(|e| TransportError::Encode(e.to_string()))?;
    let mut encoder = Encoder::new(Vec::new(), COMPRESSION_LEVEL)
        .map_err(|e| TransportError::Encode(e.to_string()))?;
    encoder
        .write_all(&json)
        .map_err(|e| TransportError::Encode(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| TransportError::Encode(e.to_string()))
}

#[async_trait]
impl LogStream for HttpLogStream {
    async fn send(&mut self, request: PostLogsRequest) -> Result<PostLogsResponse, TransportError> {
        let body = encode_body(&request)?;
        let resp = self
            .client
            .post(&self.url)
            .headers(headers())
            .body(body)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(TransportError::Status(resp.status().as_u16()));
        }
        Ok(resp.json::<PostLogsResponse>().await?)
    }
}
