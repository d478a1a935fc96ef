// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Local sink: renders one event per line.
//!
//! Text format:
//!
//! ```text
//! I0314 09:26:53.589 main.rs:42 request served path=/ status=200
//! ```
//!
//! JSON format:
//!
//! ```text
//! {"type":"info","timestamp":"2024-03-14 09:26:53.589","file":"main.rs","line":42,"msg":"request served","tags":{"path":"/"}}
//! ```
//!
//! Raw events are written verbatim in text mode and as
//! `{"type":"raw","timestamp":..,"raw":..}` in JSON mode. Timestamps are UTC.

use std::io::Write;
use std::sync::Arc;

use serde::Serialize;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::logs::completion::CompletionTracker;
use crate::logs::event::{Event, EventKind};
use crate::tags::Tags;

const TEXT_TIMESTAMP: &[FormatItem<'static>] =
    format_description!("[month][day] [hour]:[minute]:[second].[subsecond digits:3]");
const JSON_TIMESTAMP: &[FormatItem<'static>] = format_description!(
    "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]"
);

fn timestamp(ms: i64, format: &[FormatItem<'_>]) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
        .ok()
        .and_then(|dt| dt.format(format).ok())
        .unwrap_or_default()
}

/// Renders `event` as a text line, without the trailing newline.
#[must_use]
pub fn format_text(event: &Event) -> String {
    match &event.kind {
        EventKind::Raw(raw) => raw.clone(),
        EventKind::Structured(record) => {
            let mut line = format!(
                "{}{} {}:{} {}",
                record.level.letter(),
                timestamp(event.timestamp_ms, TEXT_TIMESTAMP),
                record.location.file,
                record.location.line,
                record.message
            );
            for (key, value) in &record.tags {
                line.push_str(&format!(" {key}={value}"));
            }
            line
        }
    }
}

#[derive(Serialize)]
struct JsonLine<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    file: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    msg: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    raw: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tags: Option<&'a Tags>,
}

/// Renders `event` as a JSON object, without the trailing newline.
pub fn format_json(event: &Event) -> Result<String, serde_json::Error> {
    let timestamp = timestamp(event.timestamp_ms, JSON_TIMESTAMP);
    let line = match &event.kind {
        EventKind::Raw(raw) => JsonLine {
            kind: "raw",
            timestamp,
            file: None,
            line: None,
            msg: None,
            raw: Some(raw),
            tags: None,
        },
        EventKind::Structured(record) => JsonLine {
            kind: record.level.as_ref(),
            timestamp,
            file: Some(&record.location.file),
            line: Some(record.location.line),
            msg: Some(&record.message),
            raw: None,
            tags: (!record.tags.is_empty()).then_some(&record.tags),
        },
    };
    serde_json::to_string(&line)
}

pub struct LocalSink {
    rx: mpsc::Receiver<Arc<Event>>,
    writer: Box<dyn Write + Send>,
    json: bool,
    tracker: CompletionTracker,
}

impl LocalSink {
    #[must_use]
    pub fn new(
        capacity: usize,
        writer: Box<dyn Write + Send>,
        json: bool,
        tracker: CompletionTracker,
    ) -> (Self, mpsc::Sender<Arc<Event>>) {
        let (tx, rx) = mpsc::channel(capacity);
        let sink = Self {
            rx,
            writer,
            json,
            tracker,
        };
        (sink, tx)
    }

    /// Writes until every sender is gone. The router and the scheduler hold
    /// the senders and drop them only after draining their own queues, so
    /// nothing accepted before shutdown is lost here.
    pub async fn run(mut self) {
        debug!("Local log sink started");
        while let Some(event) = self.rx.recv().await {
            self.write(&event);
        }
        debug!("Local log sink shutting down");
    }

    fn write(&mut self, event: &Event) {
        let line = if self.json {
            match format_json(event) {
                Ok(line) => line,
                Err(e) => {
                    error!("Failed to render log line as JSON: {}", e);
                    format_text(event)
                }
            }
        } else {
            format_text(event)
        };

        if let Err(e) = writeln!(self.writer, "{line}").and_then(|()| self.writer.flush()) {
            error!("Failed to write local log line: {}", e);
        }
        self.tracker.done(1);
    }
}
