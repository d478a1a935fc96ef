// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types for the edge log client.
//!
//! None of these ever reach code that produces log events: producers are
//! never blocked and never see a delivery failure. They surface through the
//! diagnostic log and through the start-up API only.

/// Failure of the transport binding itself (HTTP, encoding, decoding).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status: {0}")]
    Status(u16),

    #[error("encode error: {0}")]
    Encode(String),

    #[error("invalid trust material: {0}")]
    Credentials(String),
}

/// Failure of one step of the edge session, tagged with the layer it
/// happened at.
#[derive(Debug, thiserror::Error)]
pub enum TransmitError {
    #[error("edge client error: {0}")]
    Connection(String),

    #[error("token error: {0}")]
    Authentication(String),

    #[error("unauthorized request")]
    Unauthorized,

    #[error("log stream error: {0}")]
    Stream(String),

    #[error("error sending logs: {0}")]
    Send(String),
}

/// Errors raised while loading or validating the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors raised by the client API.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("No tokio runtime available to spawn the pipeline workers")]
    NoRuntime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = TransmitError::Authentication("timed out".to_string());
        assert_eq!(error.to_string(), "token error: timed out");
        assert_eq!(TransmitError::Unauthorized.to_string(), "unauthorized request");
    }

    #[test]
    fn test_config_error_converts() {
        let error: ClientError = ConfigError::Invalid("missing address".to_string()).into();
        assert_eq!(error.to_string(), "Invalid configuration: missing address");
    }
}
