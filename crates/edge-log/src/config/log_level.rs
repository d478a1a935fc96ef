// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Severity of a log event.
//!
//! Levels are ordered from least to most severe. The severity threshold of a
//! client discards structured events below it.
//!
//! # Configuration
//!
//! The threshold can be set via:
//! - **Environment variable**: `EDGE_LOG_LEVEL=warn`
//! - **Programmatically**: `EdgeLog::set_level(Level::Warn)`
//! - **Remotely**: the collector may push a new level with any batch
//!   acknowledgement.

use std::str::FromStr;

use edge_log_proto::Level as WireLevel;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::error;

/// Severity of a structured log event.
///
/// Raw (unstructured) events carry no level at all; see
/// [`crate::logs::event::EventKind`].
///
/// # Parsing
///
/// ```
/// use edge_log::Level;
/// use std::str::FromStr;
///
/// assert_eq!(Level::from_str("warn").unwrap(), Level::Warn);
/// assert_eq!(Level::from_str("FATAL").unwrap(), Level::Fatal);
/// assert!(Level::from_str("verbose").is_err());
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Level {
    /// Lowest severity. The default threshold, so nothing is filtered.
    #[default]
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
    /// Emitting a fatal event flushes the pipeline and then panics.
    Fatal = 4,
}

impl AsRef<str> for Level {
    fn as_ref(&self) -> &str {
        match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}

impl Level {
    /// Single letter used as the line prefix of the text format.
    #[must_use]
    pub fn letter(self) -> char {
        match self {
            Level::Debug => 'D',
            Level::Info => 'I',
            Level::Warn => 'W',
            Level::Error => 'E',
            Level::Fatal => 'F',
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => Level::Debug,
            1 => Level::Info,
            2 => Level::Warn,
            3 => Level::Error,
            _ => Level::Fatal,
        }
    }

    /// Converts a wire level. `None` means "no level" and has no counterpart.
    #[must_use]
    pub fn from_wire(level: WireLevel) -> Option<Self> {
        match level {
            WireLevel::None => None,
            WireLevel::Debug => Some(Level::Debug),
            WireLevel::Info => Some(Level::Info),
            WireLevel::Warn => Some(Level::Warn),
            WireLevel::Error => Some(Level::Error),
            WireLevel::Fatal => Some(Level::Fatal),
        }
    }
}

impl From<Level> for WireLevel {
    fn from(level: Level) -> Self {
        match level {
            Level::Debug => WireLevel::Debug,
            Level::Info => WireLevel::Info,
            Level::Warn => WireLevel::Warn,
            Level::Error => WireLevel::Error,
            Level::Fatal => WireLevel::Fatal,
        }
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warn" | "warning" => Ok(Level::Warn),
            "error" => Ok(Level::Error),
            "fatal" => Ok(Level::Fatal),
            _ => Err(format!(
                "Invalid log level: '{s}'. Valid levels are: debug, info, warn, error, fatal",
            )),
        }
    }
}

/// Lenient deserialization: an invalid or non-string value logs an error and
/// falls back to the default level instead of failing the whole config.
impl<'de> Deserialize<'de> for Level {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;

        if let Value::String(s) = value {
            match Level::from_str(&s) {
                Ok(level) => Ok(level),
                Err(e) => {
                    error!("{}", e);
                    Ok(Level::default())
                }
            }
        } else {
            error!("Expected a string for log level, got {:?}", value);
            Ok(Level::default())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!(Level::from_str("debug").unwrap(), Level::Debug);
        assert_eq!(Level::from_str("INFO").unwrap(), Level::Info);
        assert_eq!(Level::from_str(" Warning ").unwrap(), Level::Warn);
        assert_eq!(Level::from_str("eRRoR").unwrap(), Level::Error);
    }

    #[test]
    fn test_parse_invalid() {
        let err = Level::from_str("loud").unwrap_err();
        assert!(err.contains("loud"));
    }

    #[test]
    fn test_deserialize_lenient() {
        let level: Level = serde_json::from_value(json!("error")).unwrap();
        assert_eq!(level, Level::Error);

        let level: Level = serde_json::from_value(json!("nope")).unwrap();
        assert_eq!(level, Level::Debug);

        let level: Level = serde_json::from_value(json!(3)).unwrap();
        assert_eq!(level, Level::Debug);
    }

    #[test]
    fn test_u8_round_trip() {
        for level in [Level::Debug, Level::Info, Level::Warn, Level::Error, Level::Fatal] {
            assert_eq!(Level::from_u8(level as u8), level);
        }
    }

    #[test]
    fn test_wire_conversion() {
        assert_eq!(WireLevel::from(Level::Warn), WireLevel::Warn);
        assert_eq!(Level::from_wire(WireLevel::None), None);
        assert_eq!(Level::from_wire(WireLevel::Fatal), Some(Level::Fatal));
    }
}
