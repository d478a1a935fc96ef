// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Process-wide ("global") tags and their incremental sync to the collector.

pub mod store;

pub use store::TagStore;

use std::collections::BTreeMap;

/// Tags as carried by events and batches. Ordered so that rendering and
/// encoding are deterministic.
pub type Tags = BTreeMap<String, String>;
