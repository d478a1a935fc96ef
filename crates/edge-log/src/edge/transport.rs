// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Seams between the transmitter and the wire binding.
//!
//! The transmitter only sees these traits, so the session state machine can
//! be driven by an in-memory collector in tests and by
//! [`super::http::HttpConnector`] in production.

use async_trait::async_trait;
use edge_log_proto::{AuthRequest, AuthResponse, PostLogsRequest, PostLogsResponse};

use crate::error::TransportError;

/// Builds a client for the collector, with its trust material.
#[async_trait]
pub trait EdgeConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn EdgeClient>, TransportError>;
}

#[async_trait]
pub trait EdgeClient: Send + Sync {
    /// Exchanges the API key for a token. The response code tells accepted
    /// keys from rejected ones.
    async fn authenticate(&self, request: AuthRequest) -> Result<AuthResponse, TransportError>;

    /// Opens a log stream for `token`.
    async fn open_stream(&self, token: &str) -> Result<Box<dyn LogStream>, TransportError>;
}

/// An open log stream. One batch in flight at a time.
#[async_trait]
pub trait LogStream: Send {
    async fn send(&mut self, request: PostLogsRequest) -> Result<PostLogsResponse, TransportError>;
}
