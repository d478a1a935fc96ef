// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The unit flowing through the pipeline.

use std::panic::Location as CallerLocation;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::log_level::Level;
use crate::tags::Tags;

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Call site of a structured event.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Location {
    /// File name without directories
    pub file: String,
    pub function: String,
    pub line: u32,
}

impl Location {
    /// Builds a location from the output of `file!()`, `module_path!()` and
    /// `line!()`.
    #[must_use]
    pub fn new(file: &str, function: &str, line: u32) -> Self {
        Self {
            file: basename(file).to_string(),
            function: function.to_string(),
            line,
        }
    }

    /// Location of the caller. Rust has no stable way to name the calling
    /// function, so it is left empty; use the `edge_log!` macro to capture
    /// the module path.
    #[must_use]
    #[track_caller]
    pub fn caller() -> Self {
        let caller = CallerLocation::caller();
        Self::new(caller.file(), "", caller.line())
    }
}

fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// A structured log line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub location: Location,
    pub level: Level,
    pub verbosity: i32,
    pub message: String,
    /// Per-occurrence tags
    pub tags: Tags,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventKind {
    Structured(Record),
    /// An unstructured line, forwarded verbatim. Raw events have no level and
    /// are never filtered.
    Raw(String),
}

/// One log occurrence. Immutable once built; destinations share it through
/// an `Arc`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    pub timestamp_ms: i64,
    pub kind: EventKind,
}

impl Event {
    #[must_use]
    pub fn structured(record: Record) -> Self {
        Self {
            timestamp_ms: now_ms(),
            kind: EventKind::Structured(record),
        }
    }

    #[must_use]
    pub fn raw(text: impl Into<String>) -> Self {
        Self {
            timestamp_ms: now_ms(),
            kind: EventKind::Raw(text.into()),
        }
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp_ms: i64) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }

    /// Level of a structured event, `None` for raw ones.
    #[must_use]
    pub fn level(&self) -> Option<Level> {
        match &self.kind {
            EventKind::Structured(record) => Some(record.level),
            EventKind::Raw(_) => None,
        }
    }
}
