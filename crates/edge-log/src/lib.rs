// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # Edge Log
//!
//! In-process log shipping. Application code emits structured log events;
//! the client writes them to a local sink and/or ships them in batches to an
//! edge collector, without ever blocking the caller.
//!
//! ## Overview
//!
//! - [`client`]: the [`EdgeLog`] handle, event builder and `edge_log!` macro
//! - [`logs`]: router, local sink, batch scheduler, encoder and completion
//!   tracking
//! - [`edge`]: collector session with layered retry and the HTTP binding
//! - [`tags`]: global tags with incremental sync
//! - [`config`]: configuration and runtime thresholds
//! - [`logger`]: formatting of the client's own diagnostics
//!
//! ## Usage
//!
//! ```no_run
//! use edge_log::{Config, EdgeLog, Level};
//!
//! # async fn run() -> Result<(), edge_log::ClientError> {
//! let client = EdgeLog::start(Config::from_env()?)?;
//! client.global([("service", "checkout")]);
//! client.event(Level::Info).tag("order", 42).msg("order placed");
//! client.flush().await;
//! # Ok(())
//! # }
//! ```

#![deny(clippy::all)]
#![deny(clippy::unwrap_used)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod edge;
pub mod error;
pub mod logger;
pub mod logs;
pub mod tags;

pub use client::{Builder, EdgeLog, EventBuilder};
pub use config::log_level::Level;
pub use config::Config;
pub use error::{ClientError, ConfigError, TransmitError, TransportError};
pub use logs::event::{Event, EventKind, Location, Record};
pub use tags::Tags;

/// Version of this client.
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");
