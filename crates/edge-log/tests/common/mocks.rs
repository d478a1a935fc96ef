// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory collector implementing the transport seams

#![allow(dead_code)]

use async_trait::async_trait;
use edge_log::edge::{EdgeClient, EdgeConnector, LogStream};
use edge_log::TransportError;
use edge_log_proto::{
    AuthRequest, AuthResponse, PostLogsRequest, PostLogsResponse, CODE_OK, CODE_UNAUTHORIZED,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Scripted reaction of the collector to authentication requests.
#[derive(Clone, Copy, Debug)]
pub enum AuthReply {
    Accept,
    Reject,
    Fail,
}

#[derive(Default)]
struct State {
    auth_script: VecDeque<AuthReply>,
    response: PostLogsResponse,
    connects: usize,
    auths: Vec<AuthRequest>,
    batches: Vec<PostLogsRequest>,
}

/// Collector that accepts everything unless scripted otherwise and records
/// every call.
#[derive(Clone)]
pub struct MockCollector {
    state: Arc<Mutex<State>>,
}

impl MockCollector {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                response: PostLogsResponse {
                    code: CODE_OK,
                    ..Default::default()
                },
                ..Default::default()
            })),
        }
    }

    pub fn script_auth(&self, replies: &[AuthReply]) {
        self.state
            .lock()
            .expect("lock poisoned")
            .auth_script
            .extend(replies.iter().copied());
    }

    pub fn respond_with(&self, response: PostLogsResponse) {
        self.state.lock().expect("lock poisoned").response = response;
    }

    pub fn connects(&self) -> usize {
        self.state.lock().expect("lock poisoned").connects
    }

    pub fn auths(&self) -> Vec<AuthRequest> {
        self.state.lock().expect("lock poisoned").auths.clone()
    }

    pub fn batches(&self) -> Vec<PostLogsRequest> {
        self.state.lock().expect("lock poisoned").batches.clone()
    }
}

#[async_trait]
impl EdgeConnector for MockCollector {
    async fn connect(&self) -> Result<Box<dyn EdgeClient>, TransportError> {
        self.state.lock().expect("lock poisoned").connects += 1;
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl EdgeClient for MockCollector {
    async fn authenticate(&self, request: AuthRequest) -> Result<AuthResponse, TransportError> {
        let mut state = self.state.lock().expect("lock poisoned");
        state.auths.push(request);
        match state.auth_script.pop_front().unwrap_or(AuthReply::Accept) {
            AuthReply::Accept => Ok(AuthResponse {
                code: CODE_OK,
                token_id: "token-1".to_string(),
            }),
            AuthReply::Reject => Ok(AuthResponse {
                code: CODE_UNAUTHORIZED,
                ..Default::default()
            }),
            AuthReply::Fail => Err(TransportError::Status(503)),
        }
    }

    async fn open_stream(&self, _token: &str) -> Result<Box<dyn LogStream>, TransportError> {
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl LogStream for MockCollector {
    async fn send(&mut self, request: PostLogsRequest) -> Result<PostLogsResponse, TransportError> {
        let mut state = self.state.lock().expect("lock poisoned");
        state.batches.push(request);
        Ok(state.response.clone())
    }
}
