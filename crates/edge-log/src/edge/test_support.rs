// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory collector for transmitter unit tests.

#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use edge_log_proto::{
    AuthRequest, AuthResponse, PostLogsRequest, PostLogsResponse, CODE_OK,
};

use super::transport::{EdgeClient, EdgeConnector, LogStream};
use crate::error::TransportError;

#[derive(Debug, Default)]
pub struct Script {
    /// Number of upcoming connects that fail.
    pub connect_failures: u32,
    /// Upcoming auth outcomes: a response code, or `None` for a transport
    /// error. An empty queue answers 200.
    pub auth: VecDeque<Option<u16>>,
    pub stream_failures: u32,
    pub send_failures: u32,
    pub connects: u32,
    pub auths: u32,
    pub streams: u32,
    pub batches: Vec<PostLogsRequest>,
}

#[derive(Clone, Default)]
pub struct ScriptedEdge {
    pub script: Arc<Mutex<Script>>,
}

impl ScriptedEdge {
    pub fn with<F: FnOnce(&mut Script)>(&self, f: F) {
        f(&mut self.script.lock().unwrap());
    }

    pub fn read<T, F: FnOnce(&Script) -> T>(&self, f: F) -> T {
        f(&self.script.lock().unwrap())
    }
}

#[async_trait]
impl EdgeConnector for ScriptedEdge {
    async fn connect(&self) -> Result<Box<dyn EdgeClient>, TransportError> {
        let mut script = self.script.lock().unwrap();
        script.connects += 1;
        if script.connect_failures > 0 {
            script.connect_failures -= 1;
            return Err(TransportError::Status(503));
        }
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl EdgeClient for ScriptedEdge {
    async fn authenticate(&self, _request: AuthRequest) -> Result<AuthResponse, TransportError> {
        let mut script = self.script.lock().unwrap();
        script.auths += 1;
        match script.auth.pop_front() {
            Some(None) => Err(TransportError::Status(503)),
            Some(Some(code)) => Ok(AuthResponse {
                code,
                token_id: "token".to_string(),
            }),
            None => Ok(AuthResponse {
                code: CODE_OK,
                token_id: "token".to_string(),
            }),
        }
    }

    async fn open_stream(&self, _token: &str) -> Result<Box<dyn LogStream>, TransportError> {
        let mut script = self.script.lock().unwrap();
        script.streams += 1;
        if script.stream_failures > 0 {
            script.stream_failures -= 1;
            return Err(TransportError::Status(503));
        }
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl LogStream for ScriptedEdge {
    async fn send(&mut self, request: PostLogsRequest) -> Result<PostLogsResponse, TransportError> {
        let mut script = self.script.lock().unwrap();
        if script.send_failures > 0 {
            script.send_failures -= 1;
            return Err(TransportError::Status(503));
        }
        script.batches.push(request);
        Ok(PostLogsResponse {
            code: CODE_OK,
            ..Default::default()
        })
    }
}
