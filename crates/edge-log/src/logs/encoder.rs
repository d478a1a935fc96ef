// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batch encoder with call-site schema deduplication.
//!
//! A structured event is split into its schema ([`LogKey`]: location,
//! message, level, verbosity) and its value ([`LogVal`]: timestamp and
//! tags). Each distinct schema is sent once per stream and afterwards
//! referenced by index, so a hot log statement costs one small value per
//! occurrence.
//!
//! Indices assigned while a batch is in flight are staged. They become part
//! of the stream's table only when the batch is acknowledged
//! ([`Encoder::commit`]); a failed send calls [`Encoder::rollback`] so the
//! retried batch carries its schemas again.

use std::collections::HashMap;
use std::sync::Arc;

use edge_log_proto::{LogKey, LogRaw, LogVal, Logs};

use super::event::{Event, EventKind, Record};

/// Identity of a schema: events sharing file, line, function and message
/// share an index.
fn lookup_key(record: &Record) -> String {
    format!(
        "{}:{}:{}:{}",
        record.location.file, record.location.line, record.location.function, record.message
    )
}

#[derive(Debug, Default)]
pub struct Encoder {
    committed: HashMap<String, u32>,
    staged: HashMap<String, u32>,
}

impl Encoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_index(&self) -> u32 {
        u32::try_from(self.committed.len() + self.staged.len()).unwrap_or(u32::MAX)
    }

    /// Appends one event to `logs`.
    pub fn append(&mut self, logs: &mut Logs, event: &Event) {
        match &event.kind {
            EventKind::Raw(raw) => logs.raws.push(LogRaw {
                timestamp: event.timestamp_ms,
                raw: raw.clone(),
            }),
            EventKind::Structured(record) => {
                let key = lookup_key(record);
                let index = match self.committed.get(&key).or_else(|| self.staged.get(&key)) {
                    Some(index) => *index,
                    None => {
                        let index = self.next_index();
                        self.staged.insert(key, index);
                        logs.keys.push(LogKey {
                            file: record.location.file.clone(),
                            line: record.location.line,
                            function: record.location.function.clone(),
                            level: record.level.into(),
                            verbosity: record.verbosity,
                            msg: record.message.clone(),
                        });
                        index
                    }
                };
                logs.vals.push(LogVal {
                    index,
                    timestamp: event.timestamp_ms,
                    line_tags: record.tags.clone(),
                });
            }
        }
    }

    /// Encodes `events` in order into a fresh batch.
    pub fn encode(&mut self, events: &[Arc<Event>]) -> Logs {
        let mut logs = Logs::default();
        for event in events {
            self.append(&mut logs, event);
        }
        logs
    }

    /// Number of schemas the collector holds for the current stream.
    #[must_use]
    pub fn committed_len(&self) -> usize {
        self.committed.len()
    }

    /// The last batch was acknowledged.
    pub fn commit(&mut self) {
        self.committed.extend(self.staged.drain());
    }

    /// The last batch was not acknowledged.
    pub fn rollback(&mut self) {
        self.staged.clear();
    }

    /// A new stream starts with an empty table.
    pub fn reset(&mut self) {
        self.committed.clear();
        self.staged.clear();
    }
}
