// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wire models for the edge log collector protocol.
//!
//! These types are shared by the client and any collector implementation. All
//! message types derive `serde` serialization so they can be carried as JSON.

#![doc = include_str!("../README.md")]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Protocol version sent with every authentication request.
pub const PROTOCOL_VERSION: &str = "0.1.0";

/// Response code used by the collector for a successful call.
pub const CODE_OK: u16 = 200;

/// Response code used by the collector when the API key is rejected.
pub const CODE_UNAUTHORIZED: u16 = 401;

/// Severity as carried on the wire.
///
/// `None` marks raw lines and, in a [`PostLogsResponse`], the absence of a
/// level override.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    #[default]
    None,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

// Zero numeric fields are left out of a response.
pub(crate) mod skip_zero {
    pub fn is_zero(value: &i32) -> bool {
        *value == 0
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthRequest {
    pub version: String,
    pub key_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthResponse {
    pub code: u16,
    pub token_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamRequest {
    pub token_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamResponse {
    pub code: u16,
    pub stream_id: String,
}

/// The schema of a structured log line: everything that is identical for
/// every occurrence of one call site.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogKey {
    pub file: String,
    pub line: u32,
    pub function: String,
    pub level: Level,
    pub verbosity: i32,
    pub msg: String,
}

/// One occurrence of a structured log line.
///
/// `index` points into the stream's key table: keys received on earlier
/// batches of the same stream followed by the keys of this batch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogVal {
    pub index: u32,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub line_tags: BTreeMap<String, String>,
}

/// An unstructured line, forwarded verbatim.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogRaw {
    pub timestamp: i64,
    pub raw: String,
}

/// One encoded batch of log lines.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Logs {
    pub keys: Vec<LogKey>,
    pub vals: Vec<LogVal>,
    pub raws: Vec<LogRaw>,
    /// Global tags changed since the last acknowledged batch. Absent when
    /// nothing changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inst_tags: Option<BTreeMap<String, String>>,
}

impl Logs {
    /// True when the batch carries nothing worth sending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vals.is_empty() && self.raws.is_empty() && self.inst_tags.is_none()
    }

    /// Number of log lines (structured and raw) in the batch.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.vals.len() + self.raws.len()
    }
}

/// Client-side health reported with every batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Metrics {
    /// Round trip of the last successful call, in milliseconds.
    pub latency: i32,
    /// Errors since the last successful batch.
    pub err_count: u32,
    pub edge_queue_depth: u32,
    pub local_queue_depth: u32,
    /// Lines accumulated by the client but not yet acknowledged.
    pub pending: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostLogsRequest {
    pub token_id: String,
    pub logs: Logs,
    pub metrics: Metrics,
}

/// Acknowledgement of one batch.
///
/// The collector may push down a new severity threshold and verbosity.
/// Verbosity is sent offset by one so that zero means "no change".
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostLogsResponse {
    pub code: u16,
    pub log_level: Level,
    #[serde(skip_serializing_if = "skip_zero::is_zero")]
    pub log_verbosity: i32,
}

impl PostLogsResponse {
    #[must_use]
    pub fn level_override(&self) -> Option<Level> {
        match self.log_level {
            Level::None => None,
            level => Some(level),
        }
    }

    /// Decoded verbosity override. Values that cannot be decoded are
    /// treated as no change.
    #[must_use]
    pub fn verbosity_override(&self) -> Option<i32> {
        match self.log_verbosity {
            0 => None,
            encoded => encoded.checked_sub(1),
        }
    }

    /// Builds an acknowledgement, encoding `verbosity` with the +1 offset.
    #[must_use]
    pub fn ok_with_override(level: Option<Level>, verbosity: Option<i32>) -> Self {
        Self {
            code: CODE_OK,
            log_level: level.unwrap_or_default(),
            log_verbosity: verbosity.map_or(0, |v| v.saturating_add(1)),
        }
    }
}
