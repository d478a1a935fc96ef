// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Diagnostic output of the client itself.
//!
//! The client reports its own failures (connection errors, retries,
//! unauthorized keys) through `tracing`, never through its own pipeline.
//! This module provides a formatter that prefixes those lines with
//! `EDGE_LOG` so they can be told apart from application output:
//!
//! ```text
//! EDGE_LOG | WARN | token error: connection refused
//! EDGE_LOG | DEBUG | transmitter{attempt=3}: Sent batch lines=42
//! ```

use std::fmt;
use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        write!(&mut writer, "EDGE_LOG | {} | ", metadata.level())?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;

                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{fields}}}")?;
                    }
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Builds the filter for diagnostic output.
///
/// `RUST_LOG` wins when set; otherwise `default_level` applies to this
/// crate and noisy transport crates are held at `warn`.
#[must_use]
pub fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{default_level},hyper=warn,reqwest=warn,rustls=warn,h2=warn"
        ))
    })
}

/// Installs a global subscriber writing diagnostics to stderr.
///
/// Returns `false` when a global subscriber was already installed.
pub fn init(default_level: &str) -> bool {
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(env_filter(default_level))
        .with_writer(std::io::stderr)
        .event_format(Formatter)
        .finish();

    tracing::subscriber::set_global_default(subscriber).is_ok()
}
