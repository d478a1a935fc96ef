// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Remote delivery to the edge collector.

pub mod http;
pub mod transmitter;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

pub use http::HttpConnector;
pub use transmitter::{SendOutcome, SessionState, Transmitter};
pub use transport::{EdgeClient, EdgeConnector, LogStream};
