// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Periodic batching in front of the transmitter.
//!
//! The scheduler owns the transmitter and the list of undelivered events.
//! Events arriving from the router are only appended; sends happen on the
//! flush interval or when a flush is requested. After a failure the
//! transmitter hands back a pause, and that many wake-ups are skipped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::config::runtime::RuntimeSettings;
use crate::edge::transmitter::{QueueDepths, Transmitter};
use crate::logs::completion::CompletionTracker;
use crate::logs::event::Event;
use crate::logs::router::Outbound;

/// Requests an out-of-band scheduler cycle.
#[derive(Clone, Debug)]
pub struct FlushHandle {
    tx: mpsc::Sender<()>,
}

impl FlushHandle {
    pub(crate) fn channel() -> (Self, mpsc::Receiver<()>) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, rx)
    }

    /// Never blocks. Requests made while one is already queued coalesce.
    pub fn request(&self) {
        // a full queue means a cycle is already due
        let _ = self.tx.try_send(());
    }
}

pub struct BatchScheduler {
    edge_rx: mpsc::Receiver<Outbound>,
    flush_rx: mpsc::Receiver<()>,
    local_tx: mpsc::Sender<Arc<Event>>,
    transmitter: Transmitter,
    settings: Arc<RuntimeSettings>,
    tracker: CompletionTracker,
    interval: Duration,
    pending: Vec<Outbound>,
    pause: u32,
    cancel_token: CancellationToken,
}

impl BatchScheduler {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        capacity: usize,
        transmitter: Transmitter,
        local_tx: mpsc::Sender<Arc<Event>>,
        settings: Arc<RuntimeSettings>,
        tracker: CompletionTracker,
        interval: Duration,
        cancel_token: CancellationToken,
    ) -> (Self, mpsc::Sender<Outbound>, FlushHandle) {
        let (edge_tx, edge_rx) = mpsc::channel(capacity);
        let (flush, flush_rx) = FlushHandle::channel();
        let scheduler = Self {
            edge_rx,
            flush_rx,
            local_tx,
            transmitter,
            settings,
            tracker,
            interval,
            pending: Vec::new(),
            pause: 0,
            cancel_token,
        };
        (scheduler, edge_tx, flush)
    }

    pub async fn run(mut self) {
        debug!("Batch scheduler started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    self.shutdown().await;
                    break;
                }
                Some(outbound) = self.edge_rx.recv() => {
                    self.pending.push(outbound);
                }
                _ = ticker.tick() => {
                    self.cycle().await;
                }
                Some(()) = self.flush_rx.recv() => {
                    self.cycle().await;
                }
            }
        }
    }

    fn drain_queue(&mut self) {
        while let Ok(outbound) = self.edge_rx.try_recv() {
            self.pending.push(outbound);
        }
    }

    fn depths(&self) -> QueueDepths {
        QueueDepths {
            edge: self.edge_rx.len(),
            local: self.local_tx.max_capacity() - self.local_tx.capacity(),
        }
    }

    /// One wake-up: send everything accumulated unless paused.
    async fn cycle(&mut self) {
        self.drain_queue();

        if self.settings.is_unauthorized() {
            self.reroute_local().await;
            return;
        }

        if self.pause > 0 {
            self.pause -= 1;
            return;
        }

        self.pause = self.transmit().await;

        if self.settings.is_unauthorized() {
            self.reroute_local().await;
        }
    }

    /// Hands the backlog to the transmitter, which delivers all of it or
    /// none. Returns the pause requested after a failure.
    async fn transmit(&mut self) -> u32 {
        let depths = self.depths();
        let events = self
            .pending
            .iter()
            .map(|outbound| Arc::clone(&outbound.event))
            .collect();
        let outcome = self.transmitter.send(events, depths).await;
        if outcome.pending.is_empty() {
            self.pending.clear();
        }
        outcome.pause
    }

    /// Once the key is rejected nothing will ever reach the collector, so the
    /// backlog goes to the local sink instead. Events the router already
    /// wrote locally only complete their remote unit.
    async fn reroute_local(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        debug!("Rerouting {} log lines to the local sink", self.pending.len());
        for outbound in std::mem::take(&mut self.pending) {
            if outbound.local_copy {
                self.tracker.done(1);
                continue;
            }
            if let Err(e) = self.local_tx.send(outbound.event).await {
                error!("Local sink is gone, dropping event: {}", e);
                self.tracker.done(1);
            }
        }
    }

    async fn shutdown(&mut self) {
        // the router drops its sender once it has forwarded its own backlog
        while let Some(outbound) = self.edge_rx.recv().await {
            self.pending.push(outbound);
        }

        if !self.pending.is_empty() && !self.settings.is_unauthorized() {
            self.transmit().await;
        }
        if self.settings.is_unauthorized() {
            self.reroute_local().await;
        }

        if !self.pending.is_empty() {
            warn!(
                "Dropping {} undelivered log lines on shutdown",
                self.pending.len()
            );
            self.tracker.done(self.pending.len());
            self.pending.clear();
        }
        debug!("Batch scheduler shutting down");
    }
}
