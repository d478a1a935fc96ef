// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Fan-out of accepted events to the local sink and the transmitter.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::config::runtime::RuntimeSettings;
use crate::logs::completion::CompletionTracker;
use crate::logs::event::Event;
use crate::logs::scheduler::FlushHandle;

/// Message on the router's ingress queue.
#[derive(Debug)]
pub enum Envelope {
    Event(Arc<Event>),
    /// Requests a scheduler cycle once every event queued before it has been
    /// handed to its destinations.
    Flush,
}

/// An event queued for the transmitter.
#[derive(Clone, Debug)]
pub struct Outbound {
    pub event: Arc<Event>,
    /// The router also handed the event to the local sink. Such an event
    /// must not be written locally again if remote delivery is abandoned.
    pub local_copy: bool,
}

/// Destinations of one event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    Local,
    Remote,
    Both,
}

impl Route {
    /// Routing rule, first match wins:
    /// no credentials or a rejected key sends everything local, then
    /// `log_local` duplicates remote events locally.
    #[must_use]
    pub fn decide(has_credentials: bool, unauthorized: bool, log_local: bool) -> Self {
        if !has_credentials || unauthorized {
            Route::Local
        } else if log_local {
            Route::Both
        } else {
            Route::Remote
        }
    }

    #[must_use]
    pub fn destinations(self) -> usize {
        match self {
            Route::Local | Route::Remote => 1,
            Route::Both => 2,
        }
    }
}

/// Producer side of the router.
#[derive(Clone, Debug)]
pub struct RouterHandle {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl RouterHandle {
    /// Queues an event without blocking. Fails only once the router is gone.
    pub fn send(&self, event: Arc<Event>) -> Result<(), mpsc::error::SendError<Envelope>> {
        self.tx.send(Envelope::Event(event))
    }

    pub fn request_flush(&self) -> Result<(), mpsc::error::SendError<Envelope>> {
        self.tx.send(Envelope::Flush)
    }
}

pub struct Router {
    rx: mpsc::UnboundedReceiver<Envelope>,
    local_tx: mpsc::Sender<Arc<Event>>,
    /// `None` when no credentials are configured.
    edge_tx: Option<mpsc::Sender<Outbound>>,
    flush: Option<FlushHandle>,
    settings: Arc<RuntimeSettings>,
    log_local: bool,
    tracker: CompletionTracker,
    cancel_token: CancellationToken,
}

impl Router {
    #[must_use]
    pub fn new(
        local_tx: mpsc::Sender<Arc<Event>>,
        edge_tx: Option<(mpsc::Sender<Outbound>, FlushHandle)>,
        settings: Arc<RuntimeSettings>,
        log_local: bool,
        tracker: CompletionTracker,
        cancel_token: CancellationToken,
    ) -> (Self, RouterHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (edge_tx, flush) = edge_tx.unzip();
        let router = Self {
            rx,
            local_tx,
            edge_tx,
            flush,
            settings,
            log_local,
            tracker,
            cancel_token,
        };
        (router, RouterHandle { tx })
    }

    pub async fn run(mut self) {
        debug!("Log router started");
        loop {
            tokio::select! {
                Some(envelope) = self.rx.recv() => {
                    self.handle(envelope).await;
                }
                () = self.cancel_token.cancelled() => {
                    // events already accepted still count toward a flush
                    self.rx.close();
                    while let Some(envelope) = self.rx.recv().await {
                        self.handle(envelope).await;
                    }
                    debug!("Log router shutting down");
                    break;
                }
                else => break,
            }
        }
    }

    async fn handle(&self, envelope: Envelope) {
        match envelope {
            Envelope::Event(event) => self.route(event).await,
            Envelope::Flush => {
                if let Some(flush) = &self.flush {
                    flush.request();
                }
            }
        }
    }

    async fn route(&self, event: Arc<Event>) {
        let route = Route::decide(
            self.edge_tx.is_some(),
            self.settings.is_unauthorized(),
            self.log_local,
        );
        self.tracker.add(route.destinations() - 1);

        if matches!(route, Route::Local | Route::Both) {
            if let Err(e) = self.local_tx.send(Arc::clone(&event)).await {
                error!("Local sink is gone, dropping event: {}", e);
                self.tracker.done(1);
            }
        }
        if let (Route::Remote | Route::Both, Some(edge_tx)) = (route, &self.edge_tx) {
            let outbound = Outbound {
                event,
                local_copy: route == Route::Both,
            };
            if let Err(e) = edge_tx.send(outbound).await {
                error!("Transmitter is gone, dropping event: {}", e);
                self.tracker.done(1);
            }
        }
    }
}
