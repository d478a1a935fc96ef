// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The log event pipeline.
//!
//! ```text
//!   producers ──(unbounded)──> Router ──(bounded)──> LocalSink ──> writer
//!                                 │
//!                                 └──(bounded)──> BatchScheduler ──> Transmitter ──> collector
//! ```
//!
//! Each stage is a single tokio task. Every accepted event is counted in the
//! [`completion::CompletionTracker`] once per destination and completed when
//! that destination is done with it, which is what flush-and-wait waits on.

pub mod completion;
pub mod constants;
pub mod encoder;
pub mod event;
pub mod local;
pub mod router;
pub mod scheduler;
