// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Defaults and limits of the log pipeline.

use std::time::Duration;

/// Collector address used when none is configured.
pub const DEFAULT_EDGE_ADDRESS: &str = "https://localhost:8089";

/// Period of the batch scheduler.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Timeout of a single collector request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Capacity of the queues between the router and each destination worker.
///
/// The router awaits capacity when a queue is full, so this bounds the memory
/// held between workers. The ingress queue from producers is unbounded so
/// that producers never block.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1_000;

/// Consecutive failures of one session step before the transmitter
/// backtracks to the previous step.
pub const RETRY_LIMIT: u32 = 4;

/// Upper bound of the backoff, in scheduler cycles.
pub const MAX_BACKOFF_CYCLES: u32 = 64;

/// Key used by [`crate::EventBuilder::error`].
pub const ERROR_TAG: &str = "error";
