// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Thresholds and flags that change while the client runs.
//!
//! Producers read these on every call, so they are plain atomics rather
//! than anything behind a lock.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU8, Ordering};

use edge_log_proto::PostLogsResponse;
use tracing::{debug, warn};

use super::log_level::Level;

#[derive(Debug)]
pub struct RuntimeSettings {
    level: AtomicU8,
    verbosity: AtomicI32,
    unauthorized: AtomicBool,
}

impl RuntimeSettings {
    #[must_use]
    pub fn new(level: Level, verbosity: i32) -> Self {
        Self {
            level: AtomicU8::new(level as u8),
            verbosity: AtomicI32::new(verbosity),
            unauthorized: AtomicBool::new(false),
        }
    }

    pub fn level(&self) -> Level {
        Level::from_u8(self.level.load(Ordering::Relaxed))
    }

    pub fn set_level(&self, level: Level) {
        self.level.store(level as u8, Ordering::Relaxed);
    }

    pub fn verbosity(&self) -> i32 {
        self.verbosity.load(Ordering::Relaxed)
    }

    pub fn set_verbosity(&self, verbosity: i32) {
        self.verbosity.store(verbosity, Ordering::Relaxed);
    }

    /// Acceptance filter for structured events.
    pub fn accepts(&self, level: Level, verbosity: i32) -> bool {
        level >= self.level() && verbosity <= self.verbosity()
    }

    /// Records that the collector rejected the API key. Never cleared.
    pub fn latch_unauthorized(&self) {
        if !self.unauthorized.swap(true, Ordering::AcqRel) {
            warn!("API key rejected by the edge service, logging locally from now on");
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.unauthorized.load(Ordering::Acquire)
    }

    /// Applies a level/verbosity pushed down with a batch acknowledgement.
    pub fn apply_override(&self, response: &PostLogsResponse) {
        if let Some(level) = response.level_override().and_then(Level::from_wire) {
            if level != self.level() {
                debug!("Log level changed by edge service to {}", level);
            }
            self.set_level(level);
        }
        if let Some(verbosity) = response.verbosity_override() {
            if verbosity != self.verbosity() {
                debug!("Log verbosity changed by edge service to {}", verbosity);
            }
            self.set_verbosity(verbosity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edge_log_proto::Level as WireLevel;

    #[test]
    fn test_accepts() {
        let settings = RuntimeSettings::new(Level::Info, 1);
        assert!(!settings.accepts(Level::Debug, 0));
        assert!(settings.accepts(Level::Info, 0));
        assert!(settings.accepts(Level::Error, 1));
        assert!(!settings.accepts(Level::Error, 2));
    }

    #[test]
    fn test_unauthorized_latch() {
        let settings = RuntimeSettings::new(Level::Debug, 0);
        assert!(!settings.is_unauthorized());
        settings.latch_unauthorized();
        settings.latch_unauthorized();
        assert!(settings.is_unauthorized());
    }

    #[test]
    fn test_apply_override() {
        let settings = RuntimeSettings::new(Level::Debug, 0);

        settings.apply_override(&PostLogsResponse::ok_with_override(None, None));
        assert_eq!(settings.level(), Level::Debug);
        assert_eq!(settings.verbosity(), 0);

        settings.apply_override(&PostLogsResponse::ok_with_override(
            Some(WireLevel::Warn),
            Some(3),
        ));
        assert_eq!(settings.level(), Level::Warn);
        assert_eq!(settings.verbosity(), 3);

        // verbosity zero is a real value, not "no change"
        settings.apply_override(&PostLogsResponse::ok_with_override(None, Some(0)));
        assert_eq!(settings.level(), Level::Warn);
        assert_eq!(settings.verbosity(), 0);
    }
}
