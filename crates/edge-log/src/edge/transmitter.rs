// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Session with the collector: connect, authenticate, open a stream, send.
//!
//! Every call to [`Transmitter::send`] advances the session as far as it can
//! and either delivers the whole batch or gives it back untouched together
//! with the number of scheduler cycles to wait before the next attempt.
//!
//! ```text
//!   NoClient --connect--> Connected --auth--> Authenticated --open--> Streaming
//!      ^                      |                     |                    |
//!      +--- retry limit ------+                     |                    |
//!                 ^------------- retry limit -------+                    |
//!                                    ^------------- retry limit ---------+
//! ```
//!
//! A failed step bumps the error and retry counters. When the retry counter
//! reaches the limit the session drops back one state, so a step is not
//! retried forever on top of a stale client, token or stream.

use std::sync::Arc;
use std::time::{Duration, Instant};

use edge_log_proto::{
    AuthRequest, Metrics, PostLogsRequest, CODE_OK, CODE_UNAUTHORIZED, PROTOCOL_VERSION,
};
use tracing::{debug, warn};

use super::transport::{EdgeClient, EdgeConnector, LogStream};
use crate::config::runtime::RuntimeSettings;
use crate::error::TransmitError;
use crate::logs::completion::CompletionTracker;
use crate::logs::constants::MAX_BACKOFF_CYCLES;
use crate::logs::encoder::Encoder;
use crate::logs::event::Event;
use crate::tags::TagStore;

/// Scheduler cycles to skip after `retry` consecutive failures of one step.
#[must_use]
pub fn backoff_cycles(retry: u32) -> u32 {
    if retry == 0 {
        return 0;
    }
    (1u32 << (retry - 1).min(31)).min(MAX_BACKOFF_CYCLES)
}

enum Session {
    NoClient,
    Connected {
        client: Box<dyn EdgeClient>,
    },
    Authenticated {
        client: Box<dyn EdgeClient>,
        token: String,
    },
    Streaming {
        client: Box<dyn EdgeClient>,
        token: String,
        stream: Box<dyn LogStream>,
    },
}

/// Observable state of the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    NoClient,
    Connected,
    Authenticated,
    Streaming,
}

impl Session {
    fn state(&self) -> SessionState {
        match self {
            Session::NoClient => SessionState::NoClient,
            Session::Connected { .. } => SessionState::Connected,
            Session::Authenticated { .. } => SessionState::Authenticated,
            Session::Streaming { .. } => SessionState::Streaming,
        }
    }
}

enum Step {
    Advanced,
    Delivered,
    Failed { pause: u32 },
}

/// Queue depths reported to the collector with every batch.
#[derive(Clone, Copy, Debug, Default)]
pub struct QueueDepths {
    pub edge: usize,
    pub local: usize,
}

/// Result of one send attempt.
#[derive(Debug)]
pub struct SendOutcome {
    /// Events that were not delivered, in their original order.
    pub pending: Vec<Arc<Event>>,
    /// Scheduler cycles to skip before the next attempt.
    pub pause: u32,
}

pub struct Transmitter {
    connector: Arc<dyn EdgeConnector>,
    api_key: String,
    session: Session,
    encoder: Encoder,
    tags: Arc<TagStore>,
    settings: Arc<RuntimeSettings>,
    tracker: CompletionTracker,
    retry_limit: u32,
    error_count: u32,
    retry_count: u32,
    latency: Duration,
}

impl Transmitter {
    #[must_use]
    pub fn new(
        connector: Arc<dyn EdgeConnector>,
        api_key: String,
        tags: Arc<TagStore>,
        settings: Arc<RuntimeSettings>,
        tracker: CompletionTracker,
        retry_limit: u32,
    ) -> Self {
        Self {
            connector,
            api_key,
            session: Session::NoClient,
            encoder: Encoder::new(),
            tags,
            settings,
            tracker,
            retry_limit,
            error_count: 0,
            retry_count: 0,
            latency: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Errors since the last delivered batch.
    #[must_use]
    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    /// Consecutive failures of the current step.
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Delivers `events` as one batch, or hands them back.
    pub async fn send(&mut self, events: Vec<Arc<Event>>, depths: QueueDepths) -> SendOutcome {
        loop {
            match self.step(&events, depths).await {
                Step::Advanced => continue,
                Step::Delivered => {
                    return SendOutcome {
                        pending: Vec::new(),
                        pause: 0,
                    }
                }
                Step::Failed { pause } => {
                    return SendOutcome {
                        pending: events,
                        pause,
                    }
                }
            }
        }
    }

    async fn step(&mut self, events: &[Arc<Event>], depths: QueueDepths) -> Step {
        match std::mem::replace(&mut self.session, Session::NoClient) {
            Session::NoClient => self.connect().await,
            Session::Connected { client } => self.authenticate(client).await,
            Session::Authenticated { client, token } => self.open_stream(client, token).await,
            Session::Streaming {
                client,
                token,
                stream,
            } => self.deliver(client, token, stream, events, depths).await,
        }
    }

    /// Bookkeeping shared by every failed step. Returns the pause and whether
    /// the step has hit the retry limit; the pause is sized from the count
    /// before an escalation resets it.
    fn fail(&mut self, error: &TransmitError) -> (u32, bool) {
        warn!("{}", error);
        self.error_count = self.error_count.saturating_add(1);
        self.retry_count += 1;
        let pause = backoff_cycles(self.retry_count);
        let escalate = self.retry_count >= self.retry_limit;
        if escalate {
            self.retry_count = 0;
        }
        (pause, escalate)
    }

    async fn connect(&mut self) -> Step {
        match self.connector.connect().await {
            Ok(client) => {
                self.retry_count = 0;
                self.session = Session::Connected { client };
                Step::Advanced
            }
            Err(e) => {
                let (pause, _) = self.fail(&TransmitError::Connection(e.to_string()));
                Step::Failed { pause }
            }
        }
    }

    async fn authenticate(&mut self, client: Box<dyn EdgeClient>) -> Step {
        let request = AuthRequest {
            version: PROTOCOL_VERSION.to_string(),
            key_id: self.api_key.clone(),
        };
        let start = Instant::now();
        let result = client.authenticate(request).await;
        let error = match result {
            Ok(resp) if resp.code == CODE_OK => {
                self.latency = start.elapsed();
                self.retry_count = 0;
                self.session = Session::Authenticated {
                    client,
                    token: resp.token_id,
                };
                return Step::Advanced;
            }
            Ok(resp) if resp.code == CODE_UNAUTHORIZED => {
                self.settings.latch_unauthorized();
                TransmitError::Unauthorized
            }
            Ok(resp) => {
                TransmitError::Authentication(format!("unexpected response code {}", resp.code))
            }
            Err(e) => TransmitError::Authentication(e.to_string()),
        };

        let (pause, escalate) = self.fail(&error);
        if escalate {
            debug!("Backtracking to a new edge client");
        } else {
            self.session = Session::Connected { client };
        }
        Step::Failed { pause }
    }

    async fn open_stream(&mut self, client: Box<dyn EdgeClient>, token: String) -> Step {
        let result = client.open_stream(&token).await;
        match result {
            Ok(stream) => {
                self.encoder.reset();
                self.retry_count = 0;
                self.session = Session::Streaming {
                    client,
                    token,
                    stream,
                };
                Step::Advanced
            }
            Err(e) => {
                let (pause, escalate) = self.fail(&TransmitError::Stream(e.to_string()));
                if escalate {
                    debug!("Backtracking to a new token");
                    self.session = Session::Connected { client };
                } else {
                    self.session = Session::Authenticated { client, token };
                }
                Step::Failed { pause }
            }
        }
    }

    async fn deliver(
        &mut self,
        client: Box<dyn EdgeClient>,
        token: String,
        mut stream: Box<dyn LogStream>,
        events: &[Arc<Event>],
        depths: QueueDepths,
    ) -> Step {
        let mut logs = self.encoder.encode(events);
        logs.inst_tags = self.tags.take_diff();

        if logs.is_empty() {
            self.session = Session::Streaming {
                client,
                token,
                stream,
            };
            self.error_count = 0;
            self.retry_count = 0;
            return Step::Delivered;
        }

        let lines = logs.line_count();
        let diff = logs.inst_tags.clone();
        let request = PostLogsRequest {
            token_id: token.clone(),
            logs,
            metrics: Metrics {
                latency: i32::try_from(self.latency.as_millis()).unwrap_or(i32::MAX),
                err_count: self.error_count,
                edge_queue_depth: u32::try_from(depths.edge).unwrap_or(u32::MAX),
                local_queue_depth: u32::try_from(depths.local).unwrap_or(u32::MAX),
                pending: u32::try_from(events.len()).unwrap_or(u32::MAX),
            },
        };

        let start = Instant::now();
        let result = stream.send(request).await;
        let error = match result {
            Ok(resp) if resp.code == CODE_OK => {
                self.latency = start.elapsed();
                self.encoder.commit();
                self.settings.apply_override(&resp);
                self.tracker.done(lines);
                self.error_count = 0;
                self.retry_count = 0;
                self.session = Session::Streaming {
                    client,
                    token,
                    stream,
                };
                debug!("Sent {} log lines to edge service", lines);
                return Step::Delivered;
            }
            Ok(resp) => TransmitError::Send(format!("unexpected response code {}", resp.code)),
            Err(e) => TransmitError::Send(e.to_string()),
        };

        self.encoder.rollback();
        if let Some(diff) = diff {
            self.tags.restore(diff);
        }

        let (pause, escalate) = self.fail(&error);
        if escalate {
            debug!("Backtracking to a new log stream");
            self.tags.force_resync();
            self.session = Session::Authenticated { client, token };
        } else {
            self.session = Session::Streaming {
                client,
                token,
                stream,
            };
        }
        Step::Failed { pause }
    }
}
